//! TCP ADU framing: the 7-byte MBAP header plus PDU.

use byteorder::{BigEndian, ByteOrder};
use scada_core::ScadaError;

/// Length of the MBAP header in bytes.
pub const MBAP_HEADER_LEN: usize = 7;

/// Protocol identifier; always `0` for Modbus.
pub const PROTOCOL_ID: u16 = 0;

/// A decoded MBAP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Echoed back by the server; used to match requests and responses.
    pub transaction_id: u16,
    /// Byte count of unit_id + PDU that follows the length field.
    pub length: u16,
    /// Addresses a sub-device behind a gateway; `0xFF` for TCP-direct.
    pub unit_id: u8,
}

/// Build a full TCP ADU: MBAP header followed by `pdu`.
pub fn build_tcp_adu(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let length = (pdu.len() + 1) as u16;
    let mut out = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    let mut header = [0u8; 6];
    BigEndian::write_u16(&mut header[0..2], transaction_id);
    BigEndian::write_u16(&mut header[2..4], PROTOCOL_ID);
    BigEndian::write_u16(&mut header[4..6], length);
    out.extend_from_slice(&header);
    out.push(unit_id);
    out.extend_from_slice(pdu);
    out
}

/// Parse a full TCP ADU into its header and PDU slice.
pub fn parse_tcp_adu(adu: &[u8]) -> Result<(MbapHeader, &[u8]), ScadaError> {
    if adu.len() < MBAP_HEADER_LEN {
        return Err(ScadaError::protocol("MBAP frame shorter than the 7-byte header"));
    }
    let transaction_id = BigEndian::read_u16(&adu[0..2]);
    let protocol_id = BigEndian::read_u16(&adu[2..4]);
    if protocol_id != PROTOCOL_ID {
        return Err(ScadaError::protocol(format!(
            "unexpected MBAP protocol_id {protocol_id}"
        )));
    }
    let length = BigEndian::read_u16(&adu[4..6]);
    let unit_id = adu[6];
    let pdu_len = (length as usize).saturating_sub(1);
    let pdu_start = MBAP_HEADER_LEN;
    let pdu_end = pdu_start + pdu_len;
    if adu.len() < pdu_end {
        return Err(ScadaError::protocol("MBAP length field exceeds frame bytes"));
    }
    Ok((
        MbapHeader {
            transaction_id,
            length,
            unit_id,
        },
        &adu[pdu_start..pdu_end],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adu_round_trips() {
        let pdu = [0x03, 0x00, 0x00, 0x00, 0x0A];
        let adu = build_tcp_adu(7, 1, &pdu);
        let (header, parsed_pdu) = parse_tcp_adu(&adu).unwrap();
        assert_eq!(header.transaction_id, 7);
        assert_eq!(header.unit_id, 1);
        assert_eq!(header.length, (pdu.len() + 1) as u16);
        assert_eq!(parsed_pdu, &pdu);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let pdu = [0x03, 0x00];
        let mut adu = build_tcp_adu(1, 1, &pdu);
        adu.truncate(adu.len() - 1);
        assert!(parse_tcp_adu(&adu).is_err());
    }
}
