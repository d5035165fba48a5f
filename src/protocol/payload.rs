//! Filter value objects carried in message payloads
//!
//! `Pose` and `Measurement` are the inputs and outputs of the TRN filter. Both
//! framed messages and legacy commsT messages carry them in the same
//! little-endian layouts defined here.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Error, Result};

/// Number of pose covariance terms
pub const N_COVAR: usize = 45;

const POSE_DOUBLES: usize = 25;

/// Vehicle pose (position, velocity, attitude, covariance)
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    /// North position (m)
    pub x: f64,
    /// East position (m)
    pub y: f64,
    /// Down position (m)
    pub z: f64,
    /// Body-frame velocity x (m/s)
    pub vx: f64,
    /// Body-frame velocity y (m/s)
    pub vy: f64,
    /// Body-frame velocity z (m/s)
    pub vz: f64,
    /// Velocity error estimate
    pub ve: f64,
    /// Water-relative velocity x
    pub vw_x: f64,
    /// Water-relative velocity y
    pub vw_y: f64,
    /// Water-relative velocity z
    pub vw_z: f64,
    /// Navigation velocity x
    pub vn_x: f64,
    /// Navigation velocity y
    pub vn_y: f64,
    /// Navigation velocity z
    pub vn_z: f64,
    /// Angular rate x (rad/s)
    pub wx: f64,
    /// Angular rate y (rad/s)
    pub wy: f64,
    /// Angular rate z (rad/s)
    pub wz: f64,
    /// Acceleration x
    pub ax: f64,
    /// Acceleration y
    pub ay: f64,
    /// Acceleration z
    pub az: f64,
    /// Roll (rad)
    pub phi: f64,
    /// Pitch (rad)
    pub theta: f64,
    /// Heading (rad)
    pub psi: f64,
    /// Heading bias estimate
    pub psi_berg: f64,
    /// Heading bias rate estimate
    pub psi_dot_berg: f64,
    /// Pose time (epoch seconds)
    pub time: f64,
    /// Covariance terms
    pub covariance: [f64; N_COVAR],
    /// DVL lock valid
    pub dvl_valid: bool,
    /// GPS fix valid
    pub gps_valid: bool,
    /// DVL bottom lock
    pub bottom_lock: bool,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            ve: 0.0,
            vw_x: 0.0,
            vw_y: 0.0,
            vw_z: 0.0,
            vn_x: 0.0,
            vn_y: 0.0,
            vn_z: 0.0,
            wx: 0.0,
            wy: 0.0,
            wz: 0.0,
            ax: 0.0,
            ay: 0.0,
            az: 0.0,
            phi: 0.0,
            theta: 0.0,
            psi: 0.0,
            psi_berg: 0.0,
            psi_dot_berg: 0.0,
            time: 0.0,
            covariance: [0.0; N_COVAR],
            dvl_valid: false,
            gps_valid: false,
            bottom_lock: false,
        }
    }
}

impl Pose {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = (POSE_DOUBLES + N_COVAR) * 8 + 3;

    /// Append the encoded pose to `out`
    pub fn encode_into(&self, out: &mut BytesMut) {
        out.reserve(Self::ENCODED_LEN);
        for value in self.scalars() {
            out.put_f64_le(value);
        }
        for value in self.covariance {
            out.put_f64_le(value);
        }
        out.put_u8(u8::from(self.dvl_valid));
        out.put_u8(u8::from(self.gps_valid));
        out.put_u8(u8::from(self.bottom_lock));
    }

    /// Encode to a new buffer
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(Self::ENCODED_LEN);
        self.encode_into(&mut out);
        out.freeze()
    }

    /// Decode a pose from the front of `buf`, advancing it
    pub fn decode_from(buf: &mut &[u8]) -> Result<Self> {
        ensure(buf, Self::ENCODED_LEN, "pose")?;

        let mut scalars = [0.0; POSE_DOUBLES];
        for value in &mut scalars {
            *value = buf.get_f64_le();
        }
        let mut covariance = [0.0; N_COVAR];
        for value in &mut covariance {
            *value = buf.get_f64_le();
        }
        let [
            x,
            y,
            z,
            vx,
            vy,
            vz,
            ve,
            vw_x,
            vw_y,
            vw_z,
            vn_x,
            vn_y,
            vn_z,
            wx,
            wy,
            wz,
            ax,
            ay,
            az,
            phi,
            theta,
            psi,
            psi_berg,
            psi_dot_berg,
            time,
        ] = scalars;

        Ok(Self {
            x,
            y,
            z,
            vx,
            vy,
            vz,
            ve,
            vw_x,
            vw_y,
            vw_z,
            vn_x,
            vn_y,
            vn_z,
            wx,
            wy,
            wz,
            ax,
            ay,
            az,
            phi,
            theta,
            psi,
            psi_berg,
            psi_dot_berg,
            time,
            covariance,
            dvl_valid: buf.get_u8() != 0,
            gps_valid: buf.get_u8() != 0,
            bottom_lock: buf.get_u8() != 0,
        })
    }

    fn scalars(&self) -> [f64; POSE_DOUBLES] {
        [
            self.x,
            self.y,
            self.z,
            self.vx,
            self.vy,
            self.vz,
            self.ve,
            self.vw_x,
            self.vw_y,
            self.vw_z,
            self.vn_x,
            self.vn_y,
            self.vn_z,
            self.wx,
            self.wy,
            self.wz,
            self.ax,
            self.ay,
            self.az,
            self.phi,
            self.theta,
            self.psi,
            self.psi_berg,
            self.psi_dot_berg,
            self.time,
        ]
    }
}

/// Measurement sensor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SensorType {
    /// Doppler velocity log beams
    Dvl = 1,
    /// Multibeam sonar
    Multibeam = 2,
    /// Single beam altimeter
    SingleBeam = 3,
    /// Homer beacon
    Homer = 4,
    /// Imagenex DeltaT multibeam
    DeltaT = 5,
}

impl SensorType {
    /// Convert from the wire value
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Dvl),
            2 => Some(Self::Multibeam),
            3 => Some(Self::SingleBeam),
            4 => Some(Self::Homer),
            5 => Some(Self::DeltaT),
            _ => None,
        }
    }

    /// Convert to the wire value
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Sensors that report per-beam cross/along/altitude components
    #[must_use]
    pub const fn has_components(self) -> bool {
        matches!(self, Self::Multibeam | Self::Homer)
    }
}

/// Sonar measurement set for one ping
///
/// # Wire Format
///
/// ```text
/// f64 time | i32 type | f64 phi, theta, psi, x, y, z | u32 ping | i32 n
/// u8 status[n]
/// f64 ranges[n]                        (all sensors)
/// f64 cross[n], along[n], altitudes[n] (multibeam, homer)
/// i32 beam_nums[n]                     (multibeam)
/// f64 covariance[n]                    (present when type > 0)
/// ```
///
/// A negative type on the wire signals that covariances are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Ping time (epoch seconds)
    pub time: f64,
    /// Sensor type
    pub data_type: SensorType,
    /// Roll (rad)
    pub phi: f64,
    /// Pitch (rad)
    pub theta: f64,
    /// Heading (rad)
    pub psi: f64,
    /// North position (m)
    pub x: f64,
    /// East position (m)
    pub y: f64,
    /// Down position (m)
    pub z: f64,
    /// Sonar ping number
    pub ping_number: u32,
    /// Per-beam validity
    pub status: Vec<bool>,
    /// Per-beam ranges
    pub ranges: Vec<f64>,
    /// Per-beam cross-track distances
    pub cross_track: Vec<f64>,
    /// Per-beam along-track distances
    pub along_track: Vec<f64>,
    /// Per-beam altitudes
    pub altitudes: Vec<f64>,
    /// Per-beam beam numbers
    pub beam_nums: Vec<i32>,
    /// Per-beam range covariance
    pub covariance: Option<Vec<f64>>,
}

impl Measurement {
    /// Create an empty measurement set for a sensor
    #[must_use]
    pub fn new(data_type: SensorType) -> Self {
        Self {
            time: 0.0,
            data_type,
            phi: 0.0,
            theta: 0.0,
            psi: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            ping_number: 0,
            status: Vec::new(),
            ranges: Vec::new(),
            cross_track: Vec::new(),
            along_track: Vec::new(),
            altitudes: Vec::new(),
            beam_nums: Vec::new(),
            covariance: None,
        }
    }

    /// Number of beams
    #[must_use]
    pub fn num_meas(&self) -> usize {
        self.ranges.len()
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let n = self.num_meas();
        let mut len = 8 + 4 + 6 * 8 + 4 + 4 + n + n * 8;
        if self.data_type.has_components() {
            len += 3 * n * 8;
        }
        if self.data_type == SensorType::Multibeam {
            len += n * 4;
        }
        if self.covariance.is_some() {
            len += n * 8;
        }
        len
    }

    /// Check that every per-beam array matches the beam count
    pub fn validate(&self) -> Result<()> {
        let n = self.num_meas();
        let mut lens = vec![("status", self.status.len())];
        if self.data_type.has_components() {
            lens.push(("cross_track", self.cross_track.len()));
            lens.push(("along_track", self.along_track.len()));
            lens.push(("altitudes", self.altitudes.len()));
        }
        if self.data_type == SensorType::Multibeam {
            lens.push(("beam_nums", self.beam_nums.len()));
        }
        if let Some(cov) = &self.covariance {
            lens.push(("covariance", cov.len()));
        }
        if i32::try_from(n).is_err() {
            return Err(malformed("measurement", format!("{n} beams")));
        }

        match lens.into_iter().find(|(_, len)| *len != n) {
            Some((field, len)) => Err(malformed(
                "measurement",
                format!("{field} has {len} entries, expected {n}"),
            )),
            None => Ok(()),
        }
    }

    /// Append the encoded measurement to `out`
    pub fn encode_into(&self, out: &mut BytesMut) -> Result<()> {
        self.validate()?;
        out.reserve(self.encoded_len());

        let wire_type = if self.covariance.is_some() {
            self.data_type.as_i32()
        } else {
            -self.data_type.as_i32()
        };

        out.put_f64_le(self.time);
        out.put_i32_le(wire_type);
        for value in [self.phi, self.theta, self.psi, self.x, self.y, self.z] {
            out.put_f64_le(value);
        }
        out.put_u32_le(self.ping_number);
        // validate() bounds the beam count to i32
        out.put_i32_le(self.num_meas() as i32);

        for valid in &self.status {
            out.put_u8(u8::from(*valid));
        }
        put_f64s(out, &self.ranges);
        if self.data_type.has_components() {
            put_f64s(out, &self.cross_track);
            put_f64s(out, &self.along_track);
            put_f64s(out, &self.altitudes);
        }
        if self.data_type == SensorType::Multibeam {
            for beam in &self.beam_nums {
                out.put_i32_le(*beam);
            }
        }
        if let Some(cov) = &self.covariance {
            put_f64s(out, cov);
        }
        Ok(())
    }

    /// Encode to a new buffer
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut out)?;
        Ok(out.freeze())
    }

    /// Decode a measurement from the front of `buf`, advancing it
    pub fn decode_from(buf: &mut &[u8]) -> Result<Self> {
        const FIXED: usize = 8 + 4 + 6 * 8 + 4 + 4;
        ensure(buf, FIXED, "measurement")?;

        let time = buf.get_f64_le();
        let wire_type = buf.get_i32_le();
        let data_type = SensorType::from_i32(wire_type.saturating_abs())
            .ok_or_else(|| malformed("measurement", format!("unknown sensor type {wire_type}")))?;
        let has_cov = wire_type > 0;
        let phi = buf.get_f64_le();
        let theta = buf.get_f64_le();
        let psi = buf.get_f64_le();
        let x = buf.get_f64_le();
        let y = buf.get_f64_le();
        let z = buf.get_f64_le();
        let ping_number = buf.get_u32_le();
        let num_meas = buf.get_i32_le();
        let n = usize::try_from(num_meas)
            .map_err(|_| malformed("measurement", format!("negative beam count {num_meas}")))?;

        let mut meas = Self {
            time,
            data_type,
            phi,
            theta,
            psi,
            x,
            y,
            z,
            ping_number,
            ..Self::new(data_type)
        };

        // the remaining length must cover every array before allocating
        let per_beam = 1
            + 8
            + if data_type.has_components() { 24 } else { 0 }
            + if data_type == SensorType::Multibeam { 4 } else { 0 }
            + if has_cov { 8 } else { 0 };
        let needed = n
            .checked_mul(per_beam)
            .ok_or_else(|| malformed("measurement", format!("beam count {n} overflows")))?;
        ensure(buf, needed, "measurement")?;

        meas.status = (0..n).map(|_| buf.get_u8() != 0).collect();
        meas.ranges = get_f64s(buf, n);
        if data_type.has_components() {
            meas.cross_track = get_f64s(buf, n);
            meas.along_track = get_f64s(buf, n);
            meas.altitudes = get_f64s(buf, n);
        }
        if data_type == SensorType::Multibeam {
            meas.beam_nums = (0..n).map(|_| buf.get_i32_le()).collect();
        }
        if has_cov {
            meas.covariance = Some(get_f64s(buf, n));
        }
        Ok(meas)
    }
}

/// Filter initialization parameters (file names on the server host)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitParams {
    /// Terrain map file
    pub map: String,
    /// Vehicle config file
    pub cfg: String,
    /// Particle file
    pub particles: String,
    /// Log directory
    pub log_dir: String,
}

impl InitParams {
    /// Append as four null-terminated strings
    pub fn encode_into(&self, out: &mut BytesMut) {
        for s in [&self.map, &self.cfg, &self.particles, &self.log_dir] {
            out.put_slice(s.as_bytes());
            out.put_u8(0);
        }
    }

    /// Decode four null-terminated strings from the front of `buf`
    pub fn decode_from(buf: &mut &[u8]) -> Result<Self> {
        let mut fields: [String; 4] = Default::default();
        for field in &mut fields {
            let end = buf
                .iter()
                .position(|b| *b == 0)
                .ok_or_else(|| malformed("init", "unterminated string".to_string()))?;
            *field = String::from_utf8_lossy(&buf[..end]).into_owned();
            buf.advance(end + 1);
        }
        let [map, cfg, particles, log_dir] = fields;
        Ok(Self {
            map,
            cfg,
            particles,
            log_dir,
        })
    }
}

pub(crate) fn ensure(buf: &[u8], needed: usize, what: &'static str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(malformed(
            what,
            format!("need {needed} bytes, got {}", buf.remaining()),
        ));
    }
    Ok(())
}

pub(crate) fn malformed(what: &'static str, reason: String) -> Error {
    Error::MalformedPayload { what, reason }
}

fn put_f64s(out: &mut BytesMut, values: &[f64]) {
    for value in values {
        out.put_f64_le(*value);
    }
}

fn get_f64s(buf: &mut &[u8], n: usize) -> Vec<f64> {
    (0..n).map(|_| buf.get_f64_le()).collect()
}
