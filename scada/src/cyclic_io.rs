//! The cyclic real-time exchange: raw-Ethernet send/receive threads that
//! keep every AR's IOCR buffers moving at the configured cycle time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};
use pn_ar::ArManager;
use pn_cyclic::{codec, dispatch_input_frame, emit_output_frame, parse_frame, FrameIndex};
use pn_types::{ActuatorOutput, ArState, DeviceMac, SlotDirection, StationName};
use pnet_datalink::{Channel, Config as DatalinkConfig, DataLinkReceiver, DataLinkSender};
use scada_core::clock::now_ms;
use scada_core::{ScadaError, ScadaResult};
use scada_registry::Registry;

/// Owns the send and receive threads for the cyclic real-time exchange.
pub struct CyclicIo {
    running: Arc<AtomicBool>,
    send_join: Option<JoinHandle<()>>,
    recv_join: Option<JoinHandle<()>>,
}

impl CyclicIo {
    /// Open the named interface and spawn the send/receive threads.
    pub fn start(
        interface_name: &str,
        controller_mac: DeviceMac,
        manager: Arc<ArManager>,
        frame_index: Arc<FrameIndex>,
        registry: Arc<dyn Registry>,
        cycle: Duration,
    ) -> ScadaResult<Self> {
        let interface = pnet_datalink::interfaces()
            .into_iter()
            .find(|i| i.name == interface_name)
            .ok_or_else(|| ScadaError::NotFound(format!("no such network interface: {interface_name}")))?;

        let config = DatalinkConfig {
            read_timeout: Some(Duration::from_millis(500)),
            ..DatalinkConfig::default()
        };

        let (tx, rx) = match pnet_datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err(ScadaError::Internal("unsupported datalink channel type".into())),
            Err(e) => return Err(ScadaError::Io(e)),
        };

        let running = Arc::new(AtomicBool::new(true));

        let send_running = running.clone();
        let send_manager = manager.clone();
        let send_registry = registry.clone();
        let send_join = std::thread::Builder::new()
            .name("pn-cyclic-send".to_string())
            .spawn(move || {
                run_send_loop(tx, controller_mac, send_manager, send_registry, cycle, send_running);
            })?;

        let recv_running = running.clone();
        let recv_join = std::thread::Builder::new()
            .name("pn-cyclic-recv".to_string())
            .spawn(move || {
                run_recv_loop(rx, manager, frame_index, registry, recv_running);
            })?;

        Ok(CyclicIo {
            running,
            send_join: Some(send_join),
            recv_join: Some(recv_join),
        })
    }

    /// Stop both threads. Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(join) = self.send_join.take() {
            let _ = join.join();
        }
        if let Some(join) = self.recv_join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CyclicIo {
    fn drop(&mut self) {
        self.stop();
    }
}

fn fill_output_buffer(
    iocr: &mut pn_ar::Iocr,
    slots: &[pn_types::Slot],
    station: &StationName,
    registry: &dyn Registry,
) {
    let mut offset = 0usize;
    for slot in pn_ar::cyclic_slots(slots).filter(|s| s.direction == SlotDirection::Output) {
        let output = registry
            .get_actuator(station, slot.id)
            .unwrap_or_else(|_| ActuatorOutput::off());
        let encoded = codec::encode_output_slot(&output);
        let end = (offset + encoded.len()).min(iocr.buffer.len());
        if offset < end {
            iocr.buffer[offset..end].copy_from_slice(&encoded[..end - offset]);
        }
        offset += encoded.len();
    }
}

fn run_send_loop(
    mut tx: Box<dyn DataLinkSender>,
    controller_mac: DeviceMac,
    manager: Arc<ArManager>,
    registry: Arc<dyn Registry>,
    cycle: Duration,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        let loop_start = Instant::now();

        for ar_uuid in manager.ar_uuids() {
            let _ = manager.with_ar(ar_uuid, |ar, _policy| {
                if ar.state != ArState::Run {
                    return;
                }
                let device_mac = ar.device_mac;
                let station = ar.station_name.clone();
                let slots = ar.slots.clone();
                for iocr in ar.iocrs.iter_mut().filter(|i| i.direction == SlotDirection::Output && i.frame_id != 0) {
                    fill_output_buffer(iocr, &slots, &station, registry.as_ref());
                    let iops = iocr.iops();
                    let frame = emit_output_frame(iocr, device_mac, controller_mac, &iops);
                    if let Some(Err(e)) = tx.send_to(&frame, None) {
                        warn!("pn-cyclic: send failed for {station}: {e}");
                    }
                }
            });
        }

        let elapsed = loop_start.elapsed();
        if elapsed < cycle {
            std::thread::sleep(cycle - elapsed);
        }
    }
    debug!("pn-cyclic send loop stopped");
}

fn decode_and_publish(manager: &ArManager, ar_uuid: pn_types::ArUuid, frame_id: u16, registry: &dyn Registry) {
    let _ = manager.with_ar(ar_uuid, |ar, _policy| {
        let station = ar.station_name.clone();
        let slots = ar.slots.clone();
        let Some(iocr) = ar.iocrs.iter().find(|i| i.frame_id == frame_id) else {
            return;
        };
        let mut offset = 0usize;
        for slot in pn_ar::cyclic_slots(&slots).filter(|s| s.direction == SlotDirection::Input) {
            if offset + codec::INPUT_SLOT_LEN > iocr.buffer.len() {
                break;
            }
            let chunk = &iocr.buffer[offset..offset + codec::INPUT_SLOT_LEN];
            match codec::decode_input_slot(chunk) {
                Ok(reading) => {
                    if let Err(e) = registry.update_sensor(&station, slot.id, reading) {
                        warn!("pn-cyclic: failed to publish sensor reading for {station}/{}: {e}", slot.id);
                    }
                }
                Err(e) => warn!("pn-cyclic: failed to decode input slot for {station}/{}: {e}", slot.id),
            }
            offset += codec::INPUT_SLOT_LEN;
        }
    });
}

fn run_recv_loop(
    mut rx: Box<dyn DataLinkReceiver>,
    manager: Arc<ArManager>,
    frame_index: Arc<FrameIndex>,
    registry: Arc<dyn Registry>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        let raw = match rx.next() {
            Ok(raw) => raw,
            Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => {
                warn!("pn-cyclic: receive error: {e}");
                continue;
            }
        };

        if raw.len() < 16 {
            continue;
        }
        let ethertype = u16::from_be_bytes([raw[12], raw[13]]);
        if ethertype != pn_types::constants::ETHERTYPE_PROFINET_RT {
            continue;
        }
        let frame_id = u16::from_be_bytes([raw[14], raw[15]]);

        let Some(ar_uuid) = frame_index.lookup(frame_id) else {
            continue;
        };

        let iocr_shape = manager.with_ar(ar_uuid, |ar, _policy| {
            ar.iocrs
                .iter()
                .find(|i| i.direction == SlotDirection::Input && i.frame_id == frame_id)
                .map(|i| (i.payload_length as usize, i.submodule_count as usize))
        });
        let Ok(Some((payload_len, iops_len))) = iocr_shape else {
            continue;
        };

        let parsed = match parse_frame(raw, payload_len, iops_len) {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(e) => {
                debug!("pn-cyclic: malformed frame {frame_id}: {e}");
                continue;
            }
        };

        let now = now_ms();
        match dispatch_input_frame(&frame_index, &manager, &parsed, now, now.saturating_mul(1000)) {
            Ok(true) => decode_and_publish(&manager, ar_uuid, frame_id, registry.as_ref()),
            Ok(false) => {}
            Err(e) => warn!("pn-cyclic: dispatch failed for frame {frame_id}: {e}"),
        }
    }
    debug!("pn-cyclic receive loop stopped");
}
