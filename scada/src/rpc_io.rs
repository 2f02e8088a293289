//! The PROFINET RPC engine: one UDP socket driving Connect/Control
//! request/response traffic for every managed AR.

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use pn_ar::{ArManager, DiscoveryHandle, Iocr, NoopDiscoveryHandle, PolicyOutcome};
use pn_cyclic::FrameIndex;
use pn_rpc::{
    build_connect_request, build_control_request, build_control_response, is_success,
    parse_connect_response, parse_control_request, parse_control_response, rpc_analyze_error,
    AssignedIocr, ConnectRequestParams, ControlCommand, ExpectedModuleEntry, IocrSpec, Opnum,
    Originator, PacketType, RecoveryAction, RpcHeader,
};
use pn_types::constants::RPC_PORT;
use pn_types::{ArState, ArUuid, DeviceIp, Slot, SlotDirection, StationName};
use scada_core::clock::now_ms;
use scada_core::error::PnioStatus;
use scada_core::ScadaResult;

/// Placeholder status code for an AppReady the controller rejects (the
/// device's own identity check failed). Real PNIO-CM stacks use vendor- or
/// profile-specific codes for this case; `0xDB` is this controller's own
/// placeholder.
const APP_READY_REJECTED_CODE: u8 = 0xDB;

/// Owns the UDP socket and drives both the outbound connect/control scan
/// and inbound response/request handling from a single thread.
pub struct RpcIo {
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

struct EngineState {
    socket: UdpSocket,
    manager: Arc<ArManager>,
    frame_index: Arc<FrameIndex>,
    discovery: Arc<dyn DiscoveryHandle>,
    pending_by_ip: HashMap<DeviceIp, ArUuid>,
    last_state: HashMap<ArUuid, ArState>,
    prm_end_sent: HashSet<ArUuid>,
    sequence: u32,
}

impl RpcIo {
    /// Bind the RPC UDP socket and spawn the engine thread, with no
    /// discovery collaborator (a [`NoopDiscoveryHandle`] always reports "no
    /// answer" for re-identify requests).
    pub fn start(manager: Arc<ArManager>, frame_index: Arc<FrameIndex>) -> ScadaResult<Self> {
        Self::start_with_discovery(manager, frame_index, Arc::new(NoopDiscoveryHandle))
    }

    /// Bind the RPC UDP socket and spawn the engine thread, calling into
    /// `discovery` to re-identify a device's IP after a full resilient-connect
    /// ladder round has failed.
    pub fn start_with_discovery(
        manager: Arc<ArManager>,
        frame_index: Arc<FrameIndex>,
        discovery: Arc<dyn DiscoveryHandle>,
    ) -> ScadaResult<Self> {
        Self::start_bound("0.0.0.0", manager, frame_index, discovery)
    }

    /// Like [`Self::start_with_discovery`], but binding the RPC socket to
    /// `bind_addr` instead of the wildcard address. Exists so integration
    /// tests can run a controller and a simulated device side by side on
    /// distinct loopback addresses without fighting over the wildcard bind.
    pub fn start_bound(
        bind_addr: &str,
        manager: Arc<ArManager>,
        frame_index: Arc<FrameIndex>,
        discovery: Arc<dyn DiscoveryHandle>,
    ) -> ScadaResult<Self> {
        let socket = UdpSocket::bind((bind_addr, RPC_PORT))?;
        socket.set_read_timeout(Some(Duration::from_millis(200)))?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let join = std::thread::Builder::new()
            .name("pn-rpc-engine".to_string())
            .spawn(move || {
                let mut state = EngineState {
                    socket,
                    manager,
                    frame_index,
                    discovery,
                    pending_by_ip: HashMap::new(),
                    last_state: HashMap::new(),
                    prm_end_sent: HashSet::new(),
                    sequence: 0,
                };
                run_engine_loop(&mut state, &thread_running);
            })?;

        Ok(RpcIo {
            running,
            join: Some(join),
        })
    }

    /// Stop the engine thread. Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RpcIo {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_engine_loop(state: &mut EngineState, running: &Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        let mut handled: HashSet<ArUuid> = HashSet::new();
        receive_one(state, &mut handled);
        scan_ars(state, &handled);
    }
    debug!("pn-rpc engine stopped");
}

fn receive_one(state: &mut EngineState, handled: &mut HashSet<ArUuid>) {
    let mut buf = [0u8; 1500];
    let (n, from) = match state.socket.recv_from(&mut buf) {
        Ok(v) => v,
        Err(e)
        if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            return
        }
        Err(e) => {
            warn!("pn-rpc: recv error: {e}");
            return;
        }
    };
    let datagram = &buf[..n];

    let header = match RpcHeader::decode(datagram) {
        Ok(h) => h,
        Err(e) => {
            debug!("pn-rpc: dropping malformed datagram from {from}: {e}");
            return;
        }
    };

    match (header.ptype, header.opnum) {
        (PacketType::Response, Opnum::Connect) => handle_connect_response(state, &header, datagram, from, handled),
        (PacketType::Response, Opnum::Control) => handle_control_response(state, &header, datagram, handled),
        (PacketType::Request, Opnum::Control) => handle_control_request(state, datagram, from),
        _ => {}
    }
}

fn handle_connect_response(
    state: &mut EngineState,
    _header: &RpcHeader,
    datagram: &[u8],
    from: SocketAddr,
    handled: &mut HashSet<ArUuid>,
) {
    let confirmation = match parse_connect_response(datagram) {
        Ok(c) => c,
        Err(e) => {
            debug!("pn-rpc: failed to parse connect response from {from}: {e}");
            return;
        }
    };

    let from_ip = match from.ip() {
        std::net::IpAddr::V4(v4) => DeviceIp::new(v4),
        std::net::IpAddr::V6(_) => return,
    };

    let ar_uuid = match confirmation.ar_uuid.or_else(|| state.pending_by_ip.get(&from_ip).copied()) {
        Some(u) => u,
        None => {
            debug!("pn-rpc: connect response from {from} matches no pending AR");
            return;
        }
    };
    state.pending_by_ip.remove(&from_ip);
    handled.insert(ar_uuid);

    if is_success(&confirmation.status) {
        let frame_index = state.frame_index.clone();
        let result = state.manager.with_ar(ar_uuid, |ar, policy| {
            for assigned in &confirmation.assigned_iocrs {
                apply_assigned_iocr(ar, assigned, &frame_index);
            }
            ar.on_connect_success(now_ms());
            policy.reset();
        });
        if result.is_err() {
            debug!("pn-rpc: connect response for unknown AR {ar_uuid}");
        }
    } else {
        let action = rpc_analyze_error(&confirmation.status);
        let now = now_ms();
        let _ = state.manager.with_ar(ar_uuid, |ar, _policy| {
            ar.on_connect_failure(now);
        });
        record_failure_and_schedule(state, ar_uuid, Some(action));
    }
}

/// Record a connect failure against `ar_uuid`'s resilient-connect policy,
/// schedule the next attempt from the returned backoff delay, and issue a
/// rediscovery request if a full ladder round just completed.
fn record_failure_and_schedule(state: &EngineState, ar_uuid: ArUuid, action: Option<RecoveryAction>) {
    let now = now_ms();
    let result = state.manager.with_ar(ar_uuid, |ar, policy| {
        let outcome = policy.record_failure(action);
        match outcome {
            PolicyOutcome::Retry { delay, .. } | PolicyOutcome::RediscoverThenRetry { delay, .. } => {
                ar.schedule_next_attempt(now, delay);
            }
            PolicyOutcome::GiveUp => {}
        }
        (outcome, ar.station_name.clone())
    });

    if let Ok((PolicyOutcome::RediscoverThenRetry { .. }, station_name)) = result {
        rediscover(state, ar_uuid, &station_name);
    }
}

/// Ask the discovery collaborator to re-resolve `station_name`'s IP, and
/// apply the answer to the AR if one comes back before the collaborator's
/// own timeout.
fn rediscover(state: &EngineState, ar_uuid: ArUuid, station_name: &StationName) {
    match state.discovery.identify(station_name) {
        Ok(Some(ip)) => {
            let applied = state.manager.with_ar(ar_uuid, |ar, _policy| {
                ar.device_ip = ip;
            });
            if applied.is_ok() {
                debug!("pn-rpc: rediscovered {station_name} at {ip}");
            }
        }
        Ok(None) => debug!("pn-rpc: rediscovery for {station_name} got no answer"),
        Err(e) => warn!("pn-rpc: rediscovery for {station_name} failed: {e}"),
    }
}

fn apply_assigned_iocr(ar: &mut pn_ar::Ar, assigned: &AssignedIocr, frame_index: &FrameIndex) {
    let direction = match assigned.reference_id {
        1 => SlotDirection::Input,
        _ => SlotDirection::Output,
    };

    let iocr = match ar.iocrs.iter_mut().find(|i| i.reference_id == assigned.reference_id) {
        Some(existing) => existing,
        None => {
            let payload_length = pn_ar::strategy::payload_length_for(&ar.slots, direction);
            let submodule_count = pn_ar::submodule_count_for(&ar.slots, direction);
            ar.iocrs.push(Iocr::new(direction, assigned.reference_id, payload_length, submodule_count, 3, 1, 1));
            ar.iocrs.last_mut().expect("just pushed")
        }
    };
    iocr.assign_frame_id(assigned.frame_id);
    frame_index.register(assigned.frame_id, ar.ar_uuid);
}

fn handle_control_response(
    state: &mut EngineState,
    header: &RpcHeader,
    datagram: &[u8],
    handled: &mut HashSet<ArUuid>,
) {
    let ar_uuid = header.object_uuid;
    let confirmation = match parse_control_response(datagram) {
        Ok(c) => c,
        Err(e) => {
            debug!("pn-rpc: failed to parse control response for {ar_uuid}: {e}");
            return;
        }
    };
    if confirmation.command != Some(ControlCommand::PrmEnd) {
        return;
    }
    handled.insert(ar_uuid);

    let ok = is_success(&confirmation.status);
    let _ = state.manager.with_ar(ar_uuid, |ar, _policy| {
        ar.on_prm_end(ok, now_ms());
    });
}

fn handle_control_request(state: &mut EngineState, datagram: &[u8], from: SocketAddr) {
    let request = match parse_control_request(datagram) {
        Ok(r) => r,
        Err(e) => {
            debug!("pn-rpc: failed to parse control request from {from}: {e}");
            return;
        }
    };
    if request.command != ControlCommand::ApplicationReady {
        return;
    }

    let accepted = state
        .manager
        .with_ar(request.ar_uuid, |ar, _policy| {
            ar.on_app_ready(request.ar_uuid, request.session_key, now_ms())
        })
        .unwrap_or(false);

    let status = if accepted {
        PnioStatus::default()
    } else {
        PnioStatus {
            error_code: pn_rpc::pnio_status::ERROR_DECODE_PNIOCM,
            error_decode: pn_rpc::pnio_status::ERROR_DECODE_PNIOCM,
            error_code1: APP_READY_REJECTED_CODE,
            error_code2: 0,
        }
    };

    state.sequence = state.sequence.wrapping_add(1);
    match build_control_response(
        request.ar_uuid,
        request.session_key,
        ControlCommand::ApplicationReady,
        status,
        state.sequence,
    ) {
        Ok(pdu) => {
            if let Err(e) = state.socket.send_to(&pdu, from) {
                warn!("pn-rpc: failed to send control response to {from}: {e}");
            }
        }
        Err(e) => warn!("pn-rpc: failed to build control response: {e}"),
    }
}

fn scan_ars(state: &mut EngineState, handled: &HashSet<ArUuid>) {
    let snapshot = state.manager.snapshot_states();

    for (ar_uuid, ar_state, _retry_count) in &snapshot {
        let previously = state.last_state.insert(*ar_uuid, *ar_state);
        if previously == Some(ArState::ConnectReq) && *ar_state == ArState::Abort && !handled.contains(ar_uuid) {
            record_failure_and_schedule(state, *ar_uuid, None);
        }
    }

    let now = now_ms();
    for (ar_uuid, ar_state, _) in snapshot {
        match ar_state {
            ArState::Init => {
                let due = state.manager.with_ar(ar_uuid, |ar, _policy| ar.attempt_is_due(now)).unwrap_or(true);
                if due {
                    send_connect_request(state, ar_uuid);
                }
            }
            ArState::PrmSrv => {
                if state.prm_end_sent.insert(ar_uuid) {
                    send_prm_end(state, ar_uuid);
                }
            }
            _ => {
                state.prm_end_sent.remove(&ar_uuid);
            }
        }
    }
}

fn build_iocr_specs(slots: &[Slot], strategy: pn_ar::Strategy) -> Vec<IocrSpec> {
    if !pn_ar::includes_iocrs(strategy) {
        return Vec::new();
    }
    let mut specs = Vec::new();
    let input_len = pn_ar::strategy::payload_length_for(slots, SlotDirection::Input);
    if input_len > 0 {
        specs.push(IocrSpec {
            direction: SlotDirection::Input,
            reference_id: 1,
            proposed_frame_id: 0,
            payload_length: input_len,
            watchdog_factor: 3,
            reduction_ratio: 1,
            phase: 1,
        });
    }
    let output_len = pn_ar::strategy::payload_length_for(slots, SlotDirection::Output);
    if output_len > 0 {
        specs.push(IocrSpec {
            direction: SlotDirection::Output,
            reference_id: 2,
            proposed_frame_id: 0,
            payload_length: output_len,
            watchdog_factor: 3,
            reduction_ratio: 1,
            phase: 1,
        });
    }
    specs
}

fn send_connect_request(state: &mut EngineState, ar_uuid: ArUuid) {
    let built = state.manager.with_ar(ar_uuid, |ar, policy| {
        let strategy = policy.current_strategy();
        let wire_name = pn_ar::apply_name(strategy, &ar.station_name);
        let iocrs = build_iocr_specs(&ar.slots, strategy);
        let expected_modules: Vec<ExpectedModuleEntry> = pn_ar::build_expected_modules(strategy, &ar.slots);
        let params = ConnectRequestParams {
            ar_uuid: ar.ar_uuid,
            session_key: ar.session_key,
            station_name: wire_name,
            iocrs,
            expected_modules,
        };
        (params, ar.device_ip)
    });

    let (params, device_ip) = match built {
        Ok(v) => v,
        Err(_) => return,
    };

    state.sequence = state.sequence.wrapping_add(1);
    let pdu = match build_connect_request(&params, state.sequence) {
        Ok(p) => p,
        Err(e) => {
            warn!("pn-rpc: failed to build connect request for {ar_uuid}: {e}");
            return;
        }
    };

    if let Err(e) = state.socket.send_to(&pdu, (device_ip.addr(), RPC_PORT)) {
        warn!("pn-rpc: failed to send connect request for {ar_uuid}: {e}");
        return;
    }
    state.pending_by_ip.insert(device_ip, ar_uuid);

    let _ = state.manager.with_ar(ar_uuid, |ar, _policy| {
        ar.state = ArState::ConnectReq;
        ar.touch_activity(now_ms());
    });
}

fn send_prm_end(state: &mut EngineState, ar_uuid: ArUuid) {
    let found = state
        .manager
        .with_ar(ar_uuid, |ar, _policy| (ar.device_ip, ar.session_key));
    let (device_ip, session_key) = match found {
        Ok(v) => v,
        Err(_) => return,
    };

    state.sequence = state.sequence.wrapping_add(1);
    let pdu = match build_control_request(ar_uuid, session_key, ControlCommand::PrmEnd, Originator::Controller, state.sequence) {
        Ok(p) => p,
        Err(e) => {
            warn!("pn-rpc: failed to build PrmEnd request for {ar_uuid}: {e}");
            return;
        }
    };
    if let Err(e) = state.socket.send_to(&pdu, (device_ip.addr(), RPC_PORT)) {
        warn!("pn-rpc: failed to send PrmEnd request for {ar_uuid}: {e}");
    }
}
