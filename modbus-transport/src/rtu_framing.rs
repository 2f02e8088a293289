//! RTU ADU framing: slave address + PDU + CRC16.

use std::time::Duration;

use modbus_core::{modbus_crc16_bytes, verify_crc16};
use scada_core::ScadaError;

/// Build a full RTU ADU: slave address, PDU, then the CRC16 trailer
/// (low byte first on the wire).
pub fn build_rtu_adu(slave_addr: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + 2);
    frame.push(slave_addr);
    frame.extend_from_slice(pdu);
    let crc = modbus_crc16_bytes(&frame);
    frame.extend_from_slice(&crc);
    frame
}

/// Validate and split a received RTU frame into `(slave_addr, pdu)`.
/// Frames with a bad CRC are rejected.
pub fn parse_rtu_adu(frame: &[u8]) -> Result<(u8, &[u8]), ScadaError> {
    if frame.len() < 4 {
        return Err(ScadaError::protocol("RTU frame shorter than addr+PDU+CRC"));
    }
    if !verify_crc16(frame) {
        return Err(ScadaError::protocol("RTU frame CRC mismatch"));
    }
    let slave_addr = frame[0];
    let pdu = &frame[1..frame.len() - 2];
    Ok((slave_addr, pdu))
}

/// The minimum silence between RTU frames: 3.5 character times at
/// `baud`, with an 11-bit character (1 start + 8 data + parity/stop
/// framing) as is standard for Modbus RTU. Below 19200 baud this scales
/// with the line rate; at or above it, Modbus RTU fixes it at 1.75 ms.
pub fn inter_frame_gap(baud: u32) -> Duration {
    if baud >= 19_200 {
        return Duration::from_micros(1_750);
    }
    let bits = 3.5 * 11.0;
    let seconds = bits / baud as f64;
    Duration::from_secs_f64(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtu_adu_round_trips() {
        let pdu = [0x03, 0x00, 0x00, 0x00, 0x0A];
        let frame = build_rtu_adu(1, &pdu);
        let (slave_addr, parsed_pdu) = parse_rtu_adu(&frame).unwrap();
        assert_eq!(slave_addr, 1);
        assert_eq!(parsed_pdu, &pdu);
    }

    #[test]
    fn corrupted_frame_fails_crc() {
        let pdu = [0x03, 0x00, 0x00, 0x00, 0x0A];
        let mut frame = build_rtu_adu(1, &pdu);
        frame[1] ^= 0xFF;
        assert!(parse_rtu_adu(&frame).is_err());
    }

    #[test]
    fn gap_above_19200_baud_is_fixed_at_1750_micros() {
        assert_eq!(inter_frame_gap(19_200), Duration::from_micros(1_750));
        assert_eq!(inter_frame_gap(115_200), Duration::from_micros(1_750));
    }

    #[test]
    fn gap_scales_down_for_slower_baud() {
        let gap = inter_frame_gap(9_600);
        assert!(gap > Duration::from_micros(1_750));
    }
}
