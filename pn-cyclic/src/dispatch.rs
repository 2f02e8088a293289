//! Input-frame dispatch by frame id.

use std::collections::HashMap;

use pn_ar::ArManager;
use pn_types::{ArUuid, SlotDirection};
use scada_core::sync::RwLock;
use scada_core::ScadaResult;

use crate::frame::ParsedFrame;

/// Maps a device-assigned frame id to the AR that owns it. Rebuilt
/// incrementally as ARs connect and disconnect; read on every received
/// frame, so it is a `RwLock` rather than the AR manager's own `Mutex`.
#[derive(Default)]
pub struct FrameIndex {
    map: RwLock<HashMap<u16, ArUuid>>,
}

impl FrameIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frame id as belonging to `ar_uuid`, e.g. after a
    /// successful Connect Response assigns it.
    pub fn register(&self, frame_id: u16, ar_uuid: ArUuid) {
        self.map.write().insert(frame_id, ar_uuid);
    }

    /// Remove every frame id owned by `ar_uuid`, e.g. on AR deletion or
    /// ABORT.
    pub fn unregister_ar(&self, ar_uuid: ArUuid) {
        self.map.write().retain(|_, v| *v != ar_uuid);
    }

    /// Resolve a frame id to its owning AR, if any.
    pub fn lookup(&self, frame_id: u16) -> Option<ArUuid> {
        self.map.read().get(&frame_id).copied()
    }
}

/// Dispatch one parsed cyclic frame: find the AR and INPUT IOCR whose
/// frame id matches, copy the payload into its buffer, record the frame
/// arrival time, and refresh the AR's watchdog. Returns `true` if the
/// frame was dispatched, `false` if its frame id is unknown (dropped
/// silently).
pub fn dispatch_input_frame(
    index: &FrameIndex,
    manager: &ArManager,
    frame: &ParsedFrame,
    now_ms: u64,
    now_us: u64,
) -> ScadaResult<bool> {
    let Some(ar_uuid) = index.lookup(frame.frame_id) else {
        return Ok(false);
    };

    manager.with_ar(ar_uuid, |ar, _policy| {
        let matched = ar.iocrs.iter_mut().find(|iocr| {
            iocr.frame_id == frame.frame_id && iocr.direction == SlotDirection::Input
        });
        let Some(iocr) = matched else {
            return false;
        };
        iocr.buffer.copy_from_slice(&frame.payload[..iocr.buffer.len().min(frame.payload.len())]);
        iocr.last_frame_time_us = now_us;
        ar.touch_activity(now_ms);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pn_types::{DeviceIp, DeviceMac, StationName};
    use std::net::Ipv4Addr;

    fn setup() -> (FrameIndex, ArManager, ArUuid) {
        let manager = ArManager::new();
        let ar_uuid = manager
            .create_ar(
                DeviceMac::new([2, 0, 0, 0, 0, 1]),
                DeviceIp::new(Ipv4Addr::new(192, 168, 1, 100)),
                StationName::new("rtu-tank-1").unwrap(),
                Vec::new(),
                1000,
                0,
            )
            .unwrap();
        manager
            .with_ar(ar_uuid, |ar, _| {
                let mut iocr = pn_ar::Iocr::new(SlotDirection::Input, 1, 5, 1, 3, 1, 1);
                iocr.assign_frame_id(0x8001);
                ar.iocrs.push(iocr);
            })
            .unwrap();
        let index = FrameIndex::new();
        index.register(0x8001, ar_uuid);
        (index, manager, ar_uuid)
    }

    #[test]
    fn known_frame_id_updates_buffer_and_activity() {
        let (index, manager, ar_uuid) = setup();
        let frame = ParsedFrame {
            dst_mac: DeviceMac::new([2, 0, 0, 0, 0, 9]),
            src_mac: DeviceMac::new([2, 0, 0, 0, 0, 1]),
            frame_id: 0x8001,
            payload: vec![0x3f, 0x80, 0x00, 0x00, 0x80],
            iops: vec![0x80],
            cycle_counter: 1,
            data_status: 0x35,
            transfer_status: 0,
        };
        let dispatched = dispatch_input_frame(&index, &manager, &frame, 500, 500_000).unwrap();
        assert!(dispatched);
        manager
            .with_ar(ar_uuid, |ar, _| {
                assert_eq!(ar.iocrs[0].buffer, frame.payload);
                assert_eq!(ar.last_activity_ms, 500);
            })
            .unwrap();
    }

    #[test]
    fn unknown_frame_id_is_dropped() {
        let (index, manager, _) = setup();
        let frame = ParsedFrame {
            dst_mac: DeviceMac::new([0; 6]),
            src_mac: DeviceMac::new([0; 6]),
            frame_id: 0x9999,
            payload: vec![0; 5],
            iops: vec![0x80],
            cycle_counter: 0,
            data_status: 0,
            transfer_status: 0,
        };
        assert!(!dispatch_input_frame(&index, &manager, &frame, 0, 0).unwrap());
    }
}
