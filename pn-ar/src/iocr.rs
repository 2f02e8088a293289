//! IOCR state carried inside an AR.

use pn_types::SlotDirection;

/// IOPS value for "data valid, good quality", the only value this
/// controller ever sends.
pub const IOPS_GOOD: u8 = 0x80;

/// One I/O Communication Relationship. Each IOCR owns its payload buffer and
/// its own monotonic cycle counter; counters are per-IOCR, never per-AR.
#[derive(Debug, Clone)]
pub struct Iocr {
    /// Input (device -> controller) or output (controller -> device).
    pub direction: SlotDirection,
    /// Reference id used to correlate Connect Request/Response and later
    /// control traffic.
    pub reference_id: u16,
    /// Device-assigned frame id. Zero until a successful Connect Response
    /// has been applied; the controller's own proposal is always
    /// overwritten.
    pub frame_id: u16,
    /// Cyclic payload length in bytes.
    pub payload_length: u16,
    /// Number of cyclic submodules this IOCR carries, one IOPS byte each.
    pub submodule_count: u16,
    /// Watchdog factor, as agreed in the Connect handshake.
    pub watchdog_factor: u8,
    /// Reduction ratio.
    pub reduction_ratio: u16,
    /// Phase, always >= 1.
    pub phase: u16,
    /// Heap-owned cyclic payload buffer, sized to `payload_length`.
    pub buffer: Vec<u8>,
    /// Per-IOCR monotonic 16-bit cycle counter.
    pub cycle_counter: u16,
    /// Wall-clock microseconds of the last frame carrying this IOCR's frame
    /// id (input IOCRs only).
    pub last_frame_time_us: u64,
}

impl Iocr {
    /// Construct an IOCR from its negotiated parameters, with a
    /// zero-initialized buffer of the negotiated length.
    pub fn new(
        direction: SlotDirection,
        reference_id: u16,
        payload_length: u16,
        submodule_count: u16,
        watchdog_factor: u8,
        reduction_ratio: u16,
        phase: u16,
    ) -> Self {
        Self {
            direction,
            reference_id,
            frame_id: 0,
            payload_length,
            submodule_count,
            watchdog_factor,
            reduction_ratio,
            phase,
            buffer: vec![0u8; payload_length as usize],
            cycle_counter: 0,
            last_frame_time_us: 0,
        }
    }

    /// This IOCR's IOPS region: one status byte per submodule, all "good".
    pub fn iops(&self) -> Vec<u8> {
        vec![IOPS_GOOD; self.submodule_count as usize]
    }

    /// Apply the device-assigned frame id from a Connect Response.
    pub fn assign_frame_id(&mut self, frame_id: u16) {
        self.frame_id = frame_id;
    }

    /// Advance the cycle counter by one, wrapping at 16 bits. Called by
    /// exactly one thread: the cyclic send thread for this IOCR.
    pub fn advance_cycle_counter(&mut self) -> u16 {
        self.cycle_counter = self.cycle_counter.wrapping_add(1);
        self.cycle_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_counter_wraps() {
        let mut iocr = Iocr::new(SlotDirection::Output, 1, 4, 1, 3, 1, 1);
        iocr.cycle_counter = u16::MAX;
        assert_eq!(iocr.advance_cycle_counter(), 0);
    }

    #[test]
    fn iops_has_one_byte_per_submodule() {
        let iocr = Iocr::new(SlotDirection::Output, 1, 4, 3, 3, 1, 1);
        assert_eq!(iocr.iops(), vec![IOPS_GOOD, IOPS_GOOD, IOPS_GOOD]);
    }
}
