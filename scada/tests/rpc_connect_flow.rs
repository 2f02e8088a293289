//! End-to-end tests for the RPC engine: a real `RpcIo` talking over
//! loopback UDP to a hand-rolled device simulator that only speaks enough
//! of the Connect protocol to drive the scenarios below.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pn_ar::{ArManager, NoopDiscoveryHandle};
use pn_cyclic::FrameIndex;
use pn_rpc::{build_connect_response, parse_connect_request, AssignedIocr};
use pn_types::constants::RPC_PORT;
use pn_types::{ArState, DeviceIp, DeviceMac, Slot, SlotDirection, SlotId, StationName};
use scada::rpc_io::RpcIo;
use scada_core::clock::now_ms;
use scada_core::error::PnioStatus;

fn dap_and_sensor_slots() -> Vec<Slot> {
    vec![
        Slot {
            id: SlotId::DAP,
            module_ident: 0,
            submodule_ident: 0,
            data_length: 0,
            direction: SlotDirection::Input,
            type_tag: String::new(),
        },
        Slot {
            id: SlotId::new(1, 1),
            module_ident: 0x0040,
            submodule_ident: 0x0041,
            data_length: 5,
            direction: SlotDirection::Input,
            type_tag: "level-sensor".to_string(),
        },
    ]
}

/// Drive `manager`'s housekeeping tick (CONNECT_CNF -> PRMSRV, timeouts)
/// on a background thread for the lifetime of the returned guard.
struct Housekeeping {
    running: Arc<std::sync::atomic::AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Housekeeping {
    fn spawn(manager: Arc<ArManager>) -> Self {
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let thread_running = running.clone();
        let join = std::thread::spawn(move || {
            while thread_running.load(std::sync::atomic::Ordering::Relaxed) {
                manager.housekeeping_tick(now_ms());
                std::thread::sleep(Duration::from_millis(10));
            }
        });
        Housekeeping { running, join: Some(join) }
    }
}

impl Drop for Housekeeping {
    fn drop(&mut self) {
        self.running.store(false, std::sync::atomic::Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn wait_for_state(manager: &ArManager, ar_uuid: pn_types::ArUuid, target: ArState, within: Duration) -> ArState {
    let deadline = Instant::now() + within;
    loop {
        let state = manager.with_ar(ar_uuid, |ar, _policy| ar.state).unwrap();
        if state == target || Instant::now() >= deadline {
            return state;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Scenario 1: a freshly created AR reaches PRMSRV as soon as the device
/// accepts the first Connect Request, with its IOCR carrying the
/// device-assigned frame id.
#[test]
fn connect_happy_path_reaches_prmsrv() {
    let controller_addr = Ipv4Addr::new(127, 0, 0, 21);
    let device_addr = Ipv4Addr::new(127, 0, 0, 22);

    let manager = Arc::new(ArManager::new());
    let frame_index = Arc::new(FrameIndex::new());

    let ar_uuid = manager
        .create_ar(
            DeviceMac::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            DeviceIp::new(device_addr),
            StationName::new("rtu-tank-1").unwrap(),
            dap_and_sensor_slots(),
            1000,
            now_ms(),
        )
        .unwrap();

    let device_socket = UdpSocket::bind((device_addr, RPC_PORT)).unwrap();
    device_socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut rpc_io = RpcIo::start_bound(
        &controller_addr.to_string(),
        manager.clone(),
        frame_index.clone(),
        Arc::new(NoopDiscoveryHandle),
    )
    .unwrap();
    let _housekeeping = Housekeeping::spawn(manager.clone());

    let mut buf = [0u8; 1500];
    let (n, from) = device_socket
        .recv_from(&mut buf)
        .expect("device never received a Connect Request");
    let request = parse_connect_request(&buf[..n]).unwrap();
    assert_eq!(request.station_name.as_str(), "rtu-tank-1");
    assert_eq!(request.iocrs.len(), 1);
    assert_eq!(request.iocrs[0].direction, SlotDirection::Input);
    assert_eq!(request.expected_modules.len(), 2);

    let response = build_connect_response(
        1,
        PnioStatus::default(),
        request.ar_uuid,
        request.session_key,
        &[AssignedIocr {
            reference_id: request.iocrs[0].reference_id,
            frame_id: 0x8001,
        }],
    )
    .unwrap();
    device_socket.send_to(&response, from).unwrap();

    let state = wait_for_state(&manager, ar_uuid, ArState::PrmSrv, Duration::from_secs(2));
    assert_eq!(state, ArState::PrmSrv);

    manager
        .with_ar(ar_uuid, |ar, _policy| {
            assert_eq!(ar.iocrs.len(), 1);
            assert_eq!(ar.iocrs[0].frame_id, 0x8001);
        })
        .unwrap();

    rpc_io.stop();
}

/// Scenario 2: the device only accepts the lowercased station name. The
/// first attempt (standard casing) is rejected with the AR-block
/// station-name error; the engine must retry with `LOWERCASE` within the
/// ladder's attempt budget and still reach PRMSRV.
#[test]
fn resilient_connect_retries_with_lowercase_name() {
    let controller_addr = Ipv4Addr::new(127, 0, 0, 31);
    let device_addr = Ipv4Addr::new(127, 0, 0, 32);

    let manager = Arc::new(ArManager::new());
    let frame_index = Arc::new(FrameIndex::new());

    let ar_uuid = manager
        .create_ar(
            DeviceMac::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]),
            DeviceIp::new(device_addr),
            StationName::new("RTU-Tank-1").unwrap(),
            dap_and_sensor_slots(),
            1000,
            now_ms(),
        )
        .unwrap();

    let device_socket = UdpSocket::bind((device_addr, RPC_PORT)).unwrap();
    // A rejected attempt sits in ABORT for `pn_ar::ar::ABORT_RETRY_MS` before
    // the next attempt is dispatched, regardless of how small the backoff
    // delay itself is; give the retry comfortably longer than that to land.
    device_socket
        .set_read_timeout(Some(Duration::from_millis(pn_ar::ar::ABORT_RETRY_MS + 2_000)))
        .unwrap();

    let mut rpc_io = RpcIo::start_bound(
        &controller_addr.to_string(),
        manager.clone(),
        frame_index.clone(),
        Arc::new(NoopDiscoveryHandle),
    )
    .unwrap();
    let _housekeeping = Housekeeping::spawn(manager.clone());

    let mut accepted_name = None;
    let mut buf = [0u8; 1500];

    for attempt in 0..3 {
        let (n, from) = device_socket
            .recv_from(&mut buf)
            .unwrap_or_else(|e| panic!("no Connect Request on attempt {attempt}: {e}"));
        let request = parse_connect_request(&buf[..n]).unwrap();

        if request.station_name.as_str() == "rtu-tank-1" {
            accepted_name = Some(request.station_name.as_str().to_string());
            let response = build_connect_response(
                1,
                PnioStatus::default(),
                request.ar_uuid,
                request.session_key,
                &[AssignedIocr {
                    reference_id: request.iocrs[0].reference_id,
                    frame_id: 0x9001,
                }],
            )
            .unwrap();
            device_socket.send_to(&response, from).unwrap();
            break;
        }

        let rejection = PnioStatus {
            error_code: 0xDB,
            error_decode: pn_rpc::pnio_status::ERROR_DECODE_PNIOCM,
            error_code1: 0x01,
            error_code2: 0x01,
        };
        let response = build_connect_response(1, rejection, request.ar_uuid, request.session_key, &[]).unwrap();
        device_socket.send_to(&response, from).unwrap();
    }

    assert_eq!(accepted_name.as_deref(), Some("rtu-tank-1"));

    let state = wait_for_state(&manager, ar_uuid, ArState::PrmSrv, Duration::from_secs(10));
    assert_eq!(state, ArState::PrmSrv);
    manager
        .with_ar(ar_uuid, |ar, _policy| assert_eq!(ar.station_name.as_str(), "rtu-tank-1"))
        .unwrap();

    rpc_io.stop();
}
