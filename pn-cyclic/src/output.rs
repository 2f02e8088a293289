//! Output-frame emission for `RUN` ARs.

use pn_ar::Iocr;
use pn_types::DeviceMac;

use crate::frame::build_output_frame;

/// Build the next output frame for `iocr`, advancing its cycle counter by
/// one. `iocr.buffer` must already hold this tick's packed cyclic
/// payload (the caller fills it from the registry before calling this).
pub fn emit_output_frame(iocr: &mut Iocr, dst_mac: DeviceMac, src_mac: DeviceMac, iops: &[u8]) -> Vec<u8> {
    let cycle_counter = iocr.advance_cycle_counter();
    build_output_frame(dst_mac, src_mac, iocr.frame_id, &iocr.buffer, iops, cycle_counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pn_types::SlotDirection;

    #[test]
    fn emitted_frames_have_monotonic_cycle_counters() {
        let mut iocr = Iocr::new(SlotDirection::Output, 1, 4, 1, 3, 1, 1);
        iocr.assign_frame_id(0x8002);
        let dst = DeviceMac::new([2, 0, 0, 0, 0, 1]);
        let src = DeviceMac::new([2, 0, 0, 0, 0, 2]);

        let mut counters = Vec::new();
        for _ in 0..10 {
            let frame = emit_output_frame(&mut iocr, dst, src, &[0x80]);
            // cycle counter sits right after payload(4) + iops(1), at the
            // fixed offset within the cyclic body.
            let body_start = 6 + 6 + 2 + 2; // eth header + frame id
            let counter_offset = body_start + 4 + 1;
            let counter = u16::from_be_bytes([frame[counter_offset], frame[counter_offset + 1]]);
            counters.push(counter);
        }
        for window in counters.windows(2) {
            assert_eq!(window[1], window[0] + 1);
        }
    }
}
