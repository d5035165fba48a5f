//! Terrain navigation filter interface
//!
//! The filter itself lives outside this crate. Request handlers drive it
//! through [`FilterApi`]; servers share one instance between families.
//! Both request families decode into [`Request`] and reply from the
//! [`Response`] that [`dispatch`] produces.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::{InitParams, Measurement, Pose};

/// Which pose estimate to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateKind {
    /// Maximum likelihood estimate
    Mle,
    /// Minimum mean square error estimate
    Mmse,
}

/// Operations a TRN filter exposes to request handlers.
pub trait FilterApi: Send {
    /// Initialize from map, vehicle config and particle files.
    fn initialize(&mut self, params: &InitParams);

    /// Filter is initialized and ready for updates.
    fn is_initialized(&self) -> bool;

    /// Apply a measurement; results are written back into `meas`.
    fn meas_update(&mut self, meas: &mut Measurement, data_type: i32);

    /// Apply a motion update.
    fn motion_update(&mut self, pose: &Pose);

    /// Compute an estimate at `pose.time`, overwriting `pose`.
    fn estimate_pose(&mut self, pose: &mut Pose, kind: EstimateKind);

    /// Last measurement was accepted.
    fn last_meas_successful(&self) -> bool;

    /// Number of filter reinitializations.
    fn num_reinits(&self) -> i32;

    /// Filter type code.
    fn filter_type(&self) -> i32;

    /// Filter state code.
    fn filter_state(&self) -> i32;

    /// Measurements are queued awaiting a motion update.
    fn outstanding_meas(&self) -> bool;

    /// Filter has converged.
    fn is_converged(&self) -> bool;

    /// Reinitialize the filter.
    fn reinit_filter(&mut self, low_info_transition: bool);

    /// Set the modified weighting scheme.
    fn set_modified_weighting(&mut self, scheme: i32);

    /// Enable or disable automatic reinitialization.
    fn set_filter_reinit(&mut self, enable: bool);

    /// Enable or disable measurement attitude interpolation.
    fn set_interp_meas_attitude(&mut self, enable: bool);

    /// Set the map interpolation method.
    fn set_map_interp_method(&mut self, method: i32);

    /// Set the vehicle drift rate.
    fn set_vehicle_drift_rate(&mut self, rate: f64);

    /// Select the high-grade (`true`) or low-grade filter.
    fn use_high_grade_filter(&mut self, high: bool);
}

/// Filter shared between families and the server
pub type SharedFilter = Arc<Mutex<dyn FilterApi>>;

/// Wrap a filter for sharing
pub fn shared<F: FilterApi + 'static>(filter: F) -> SharedFilter {
    Arc::new(Mutex::new(filter))
}

/// Filter status queries answered with an ACK carrying the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Last measurement accepted (0/1)
    LastMeas,
    /// Reinitialization count
    NumReinits,
    /// Filter type code
    FilterType,
    /// Filter state code
    FilterState,
    /// Measurements outstanding (0/1)
    OutstandingMeas,
    /// Converged (0/1)
    IsConverged,
    /// Initialized (0/1)
    IsInitialized,
}

/// Decoded filter request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Initialize the filter
    Init(InitParams),
    /// Measurement update
    Meas {
        /// Sensor type parameter
        param: i32,
        /// Measurement set
        meas: Measurement,
    },
    /// Motion update
    Motion(Pose),
    /// Pose estimate request
    Estimate(EstimateKind, Pose),
    /// Status query
    Query(Query),
    /// Reinitialize the filter
    Reinit,
    /// Set modified weighting
    SetWeighting(i32),
    /// Enable automatic reinitialization
    SetFilterReinit(bool),
    /// Enable measurement attitude interpolation
    SetInterpAttitude(bool),
    /// Set map interpolation method
    SetInterpMethod(i32),
    /// Set vehicle drift rate
    SetDriftRate(f64),
    /// Select filter grade (0 = high grade)
    FilterGrade(i32),
    /// Liveness check
    Ping,
}

/// Reply produced for a request
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Request accepted
    Ack,
    /// Request refused
    Nack,
    /// Accepted, with a status value
    Value(i32),
    /// Updated measurement set
    Meas {
        /// Sensor type parameter
        param: i32,
        /// Measurement set
        meas: Measurement,
    },
    /// Pose estimate
    Estimate(EstimateKind, Pose),
    /// Ping reply
    Pong,
}

/// Apply a request to the filter.
pub fn dispatch(filter: &mut dyn FilterApi, request: Request) -> Response {
    match request {
        Request::Init(params) => {
            filter.initialize(&params);
            if filter.is_initialized() {
                Response::Ack
            } else {
                Response::Nack
            }
        }
        Request::Meas { param, mut meas } => {
            filter.meas_update(&mut meas, param);
            Response::Meas { param, meas }
        }
        Request::Motion(pose) => {
            filter.motion_update(&pose);
            Response::Ack
        }
        Request::Estimate(kind, mut pose) => {
            filter.estimate_pose(&mut pose, kind);
            Response::Estimate(kind, pose)
        }
        Request::Query(query) => Response::Value(match query {
            Query::LastMeas => i32::from(filter.last_meas_successful()),
            Query::NumReinits => filter.num_reinits(),
            Query::FilterType => filter.filter_type(),
            Query::FilterState => filter.filter_state(),
            Query::OutstandingMeas => i32::from(filter.outstanding_meas()),
            Query::IsConverged => i32::from(filter.is_converged()),
            Query::IsInitialized => i32::from(filter.is_initialized()),
        }),
        Request::Reinit => {
            filter.reinit_filter(true);
            Response::Ack
        }
        Request::SetWeighting(scheme) => {
            filter.set_modified_weighting(scheme);
            Response::Ack
        }
        Request::SetFilterReinit(enable) => {
            filter.set_filter_reinit(enable);
            Response::Ack
        }
        Request::SetInterpAttitude(enable) => {
            filter.set_interp_meas_attitude(enable);
            Response::Ack
        }
        Request::SetInterpMethod(method) => {
            filter.set_map_interp_method(method);
            Response::Ack
        }
        Request::SetDriftRate(rate) => {
            filter.set_vehicle_drift_rate(rate);
            Response::Ack
        }
        Request::FilterGrade(grade) => {
            filter.use_high_grade_filter(grade == 0);
            Response::Ack
        }
        Request::Ping => Response::Pong,
    }
}
