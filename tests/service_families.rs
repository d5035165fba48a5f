use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use trnlink::protocol::{
    self, DecodeOptions, HEADER_SIZE, InitParams, Measurement, Message, MessageId, Pose,
    SensorType,
};
use trnlink::service::{
    COMMS_MSG_SIZE, CommsBody, CommsFamily, CommsKind, CommsMessage, EstimateKind, FamilyKind,
    FamilyTable, FilterApi, FramedFamily, PING_REPLY_PARAM, ServiceError, SharedFilter,
    StreamPeer,
};

#[derive(Debug, Default)]
struct SimFilter {
    initialized: bool,
    meas_count: i32,
    motion_count: i32,
    reinits: i32,
}

impl FilterApi for SimFilter {
    fn initialize(&mut self, params: &InitParams) {
        self.initialized = !params.map.is_empty() && !params.cfg.is_empty();
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn meas_update(&mut self, meas: &mut Measurement, _data_type: i32) {
        self.meas_count += 1;
        for range in &mut meas.ranges {
            *range *= 2.0;
        }
    }

    fn motion_update(&mut self, _pose: &Pose) {
        self.motion_count += 1;
    }

    fn estimate_pose(&mut self, pose: &mut Pose, kind: EstimateKind) {
        pose.x = 4_063_000.0;
        pose.y = 590_000.0;
        pose.z = if kind == EstimateKind::Mle { 10.0 } else { 20.0 };
    }

    fn last_meas_successful(&self) -> bool {
        self.meas_count > 0
    }

    fn num_reinits(&self) -> i32 {
        self.reinits
    }

    fn filter_type(&self) -> i32 {
        1
    }

    fn filter_state(&self) -> i32 {
        0
    }

    fn outstanding_meas(&self) -> bool {
        false
    }

    fn is_converged(&self) -> bool {
        self.meas_count > 1
    }

    fn reinit_filter(&mut self, _low_info_transition: bool) {
        self.reinits += 1;
    }

    fn set_modified_weighting(&mut self, _scheme: i32) {}

    fn set_filter_reinit(&mut self, _enable: bool) {}

    fn set_interp_meas_attitude(&mut self, _enable: bool) {}

    fn set_map_interp_method(&mut self, _method: i32) {}

    fn set_vehicle_drift_rate(&mut self, _rate: f64) {}

    fn use_high_grade_filter(&mut self, _high: bool) {}
}

/// Serve one TCP client through `kind` until it hangs up.
fn serve(kind: FamilyKind, filter: SharedFilter) -> (u16, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let mut table = FamilyTable::new()
            .with(FramedFamily::new(Arc::clone(&filter)))
            .with(CommsFamily::new(filter));

        let (stream, addr) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let mut peer = StreamPeer::new(stream, addr.to_string());

        let mut served = 0;
        loop {
            match table.serve(kind, &mut peer) {
                Ok(Some(_)) => served += 1,
                Ok(None) => {}
                Err(ServiceError::PeerClosed) => break served,
                Err(err) => panic!("serve failed: {err}"),
            }
        }
    });
    (port, handle)
}

fn sim_filter() -> (Arc<Mutex<SimFilter>>, SharedFilter) {
    let filter = Arc::new(Mutex::new(SimFilter::default()));
    let shared: SharedFilter = filter.clone();
    (filter, shared)
}

fn framed_request(stream: &mut TcpStream, request: &Message) -> Message {
    stream.write_all(&request.encode()).unwrap();

    let mut frame = vec![0u8; HEADER_SIZE];
    stream.read_exact(&mut frame).unwrap();
    let data_len = u32::from_le_bytes(frame[10..14].try_into().unwrap()) as usize;
    frame.resize(HEADER_SIZE + data_len, 0);
    stream.read_exact(&mut frame[HEADER_SIZE..]).unwrap();
    protocol::decode_with(&frame, DecodeOptions::verified()).unwrap()
}

fn comms_request(stream: &mut TcpStream, request: &CommsMessage) -> CommsMessage {
    stream.write_all(&request.to_padded().unwrap()).unwrap();
    let mut reply = vec![0u8; COMMS_MSG_SIZE];
    stream.read_exact(&mut reply).unwrap();
    CommsMessage::decode(&reply).unwrap()
}

#[test]
fn framed_session_over_tcp() {
    let (filter, shared) = sim_filter();
    let (port, server) = serve(FamilyKind::Framed, shared);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let reply = framed_request(&mut stream, &Message::build_typed(MessageId::Ping, 0));
    assert_eq!(reply.msg_id(), Some(MessageId::Ack));
    assert_eq!(reply.param().unwrap(), PING_REPLY_PARAM);

    let init = InitParams {
        map: "PortTiles".into(),
        cfg: "mappingAUV_specs.cfg".into(),
        particles: "particles.cfg".into(),
        log_dir: "trn-log".into(),
    };
    let reply = framed_request(&mut stream, &Message::build_init(&init).unwrap());
    assert_eq!(reply.msg_id(), Some(MessageId::Ack));

    let mut meas = Measurement::new(SensorType::Dvl);
    meas.ranges = vec![10.0, 11.0, 12.0, 13.0];
    meas.status = vec![true; 4];
    let request = Message::build_meas(MessageId::Meas, 1, &meas).unwrap();
    let (param, updated) = framed_request(&mut stream, &request).meas().unwrap();
    assert_eq!(param, 1);
    assert_eq!(updated.ranges, vec![20.0, 22.0, 24.0, 26.0]);

    let reply = framed_request(&mut stream, &Message::build_pose(MessageId::Mle, &Pose::default()));
    assert_eq!(reply.msg_id(), Some(MessageId::Mle));
    assert!((reply.pose().unwrap().z - 10.0).abs() < f64::EPSILON);

    let reply = framed_request(&mut stream, &Message::build_typed(MessageId::LastMeas, 0));
    assert_eq!(reply.param().unwrap(), 1);

    drop(stream);
    assert_eq!(server.join().unwrap(), 5);
    assert_eq!(filter.lock().meas_count, 1);
}

#[test]
fn framed_garbage_is_skipped() {
    let (_, shared) = sim_filter();
    let (port, server) = serve(FamilyKind::Framed, shared);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    stream.write_all(b"noise before the frame").unwrap();
    let reply = framed_request(&mut stream, &Message::build_typed(MessageId::IsConv, 0));
    assert_eq!(reply.msg_id(), Some(MessageId::Ack));
    assert_eq!(reply.param().unwrap(), 0);

    drop(stream);
    assert_eq!(server.join().unwrap(), 1);
}

#[test]
fn comms_session_over_tcp() {
    let (filter, shared) = sim_filter();
    let (port, server) = serve(FamilyKind::Comms, shared);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let reply = comms_request(&mut stream, &CommsMessage::new(CommsKind::Ping, 0));
    assert_eq!(reply, CommsMessage::ack());

    let reply = comms_request(
        &mut stream,
        &CommsMessage::with_pose(CommsKind::Motn, Pose::default()),
    );
    assert_eq!(reply.kind, CommsKind::Ack);

    let reply = comms_request(
        &mut stream,
        &CommsMessage::with_pose(CommsKind::Mmse, Pose::default()),
    );
    let CommsBody::Pose(pose) = &reply.body else {
        panic!("expected a pose, got {reply}");
    };
    assert!((pose.z - 20.0).abs() < f64::EPSILON);

    let reply = comms_request(&mut stream, &CommsMessage::new(CommsKind::FiltReinit, 0));
    assert_eq!(reply.kind, CommsKind::Ack);
    let reply = comms_request(&mut stream, &CommsMessage::new(CommsKind::NReinits, 0));
    assert_eq!(reply, CommsMessage::new(CommsKind::Ack, 1));

    let reply = comms_request(&mut stream, &CommsMessage::new(CommsKind::Bye, 0));
    assert_eq!(reply.kind, CommsKind::Nack);

    drop(stream);
    assert_eq!(server.join().unwrap(), 6);
    assert_eq!(filter.lock().motion_count, 1);
}
