//! Real-time cyclic Ethernet frame construction and parsing.

use byteorder::{BigEndian, ByteOrder};
use pn_types::constants::{ETHERNET_MIN_FRAME_LEN, ETHERTYPE_PROFINET_RT};
use pn_types::DeviceMac;
use scada_core::ScadaError;

/// Data-status byte for a healthy, primary, running provider.
pub const DATA_STATUS_GOOD: u8 = 0x35;
/// Transfer-status byte for a normally-transferred frame.
pub const TRANSFER_STATUS_OK: u8 = 0x00;

const ETH_HEADER_LEN: usize = 6 + 6 + 2; // dst + src + ethertype
const FRAME_ID_LEN: usize = 2;
const CYCLE_COUNTER_LEN: usize = 2;
const STATUS_LEN: usize = 2; // data_status + transfer_status

/// Build one cyclic output frame.
///
/// `payload` is the IOCR's packed cyclic data; `iops` carries one byte per
/// submodule, appended immediately after the payload. The frame is
/// zero-padded to the Ethernet minimum length pre-FCS.
pub fn build_output_frame(
    dst_mac: DeviceMac,
    src_mac: DeviceMac,
    frame_id: u16,
    payload: &[u8],
    iops: &[u8],
    cycle_counter: u16,
) -> Vec<u8> {
    let body_len = FRAME_ID_LEN + payload.len() + iops.len() + CYCLE_COUNTER_LEN + STATUS_LEN;
    let total_len = (ETH_HEADER_LEN + body_len).max(ETHERNET_MIN_FRAME_LEN);
    let mut frame = Vec::with_capacity(total_len);

    frame.extend_from_slice(&dst_mac.octets());
    frame.extend_from_slice(&src_mac.octets());
    frame.extend_from_slice(&ETHERTYPE_PROFINET_RT.to_be_bytes());
    frame.extend_from_slice(&frame_id.to_be_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(iops);
    frame.extend_from_slice(&cycle_counter.to_be_bytes());
    frame.push(DATA_STATUS_GOOD);
    frame.push(TRANSFER_STATUS_OK);

    frame.resize(total_len, 0);
    frame
}

/// A parsed cyclic input frame.
#[derive(Debug, Clone)]
pub struct ParsedFrame {
    /// Destination MAC, expected to be the controller's own.
    pub dst_mac: DeviceMac,
    /// Source MAC, the originating device.
    pub src_mac: DeviceMac,
    /// Frame id, used to look up the owning IOCR.
    pub frame_id: u16,
    /// Cyclic payload, exactly `payload_len` bytes.
    pub payload: Vec<u8>,
    /// One IOPS byte per submodule, exactly `iops_len` bytes.
    pub iops: Vec<u8>,
    /// Per-IOCR cycle counter as sent by the provider.
    pub cycle_counter: u16,
    /// Data-status byte.
    pub data_status: u8,
    /// Transfer-status byte.
    pub transfer_status: u8,
}

/// Parse a raw Ethernet frame as cyclic PROFINET RT data. The caller must
/// supply the negotiated `payload_len`/`iops_len` for whichever IOCR this
/// frame id resolves to (frames carry no inline length field; the layout
/// is fixed by the Connect handshake). Returns `None` if the frame's
/// EtherType is not PROFINET RT (this is not an error: other traffic shares
/// the same raw socket).
pub fn parse_frame(
    raw: &[u8],
    payload_len: usize,
    iops_len: usize,
) -> Result<Option<ParsedFrame>, ScadaError> {
    if raw.len() < ETH_HEADER_LEN {
        return Err(ScadaError::protocol("frame shorter than an Ethernet header"));
    }
    let ethertype = BigEndian::read_u16(&raw[12..14]);
    if ethertype != ETHERTYPE_PROFINET_RT {
        return Ok(None);
    }

    let needed = ETH_HEADER_LEN + FRAME_ID_LEN + payload_len + iops_len + CYCLE_COUNTER_LEN + STATUS_LEN;
    if raw.len() < needed {
        return Err(ScadaError::protocol(format!(
            "PROFINET RT frame too short: {} < {needed}",
            raw.len()
        )));
    }

    let mut dst = [0u8; 6];
    dst.copy_from_slice(&raw[0..6]);
    let mut src = [0u8; 6];
    src.copy_from_slice(&raw[6..12]);

    let mut offset = ETH_HEADER_LEN;
    let frame_id = BigEndian::read_u16(&raw[offset..offset + FRAME_ID_LEN]);
    offset += FRAME_ID_LEN;
    let payload = raw[offset..offset + payload_len].to_vec();
    offset += payload_len;
    let iops = raw[offset..offset + iops_len].to_vec();
    offset += iops_len;
    let cycle_counter = BigEndian::read_u16(&raw[offset..offset + CYCLE_COUNTER_LEN]);
    offset += CYCLE_COUNTER_LEN;
    let data_status = raw[offset];
    let transfer_status = raw[offset + 1];

    Ok(Some(ParsedFrame {
        dst_mac: DeviceMac::new(dst),
        src_mac: DeviceMac::new(src),
        frame_id,
        payload,
        iops,
        cycle_counter,
        data_status,
        transfer_status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_zero_padded_to_ethernet_minimum() {
        let frame = build_output_frame(
            DeviceMac::new([2, 0, 0, 0, 0, 1]),
            DeviceMac::new([2, 0, 0, 0, 0, 2]),
            0x8001,
            &[1, 2, 3, 4],
            &[0x80],
            7,
        );
        assert_eq!(frame.len(), ETHERNET_MIN_FRAME_LEN);
    }

    #[test]
    fn output_frame_round_trips_through_parse() {
        let payload = [0x3f, 0x80, 0x00, 0x00, 0x80]; // 1.0f32 BE + quality
        let iops = [0x80];
        let frame = build_output_frame(
            DeviceMac::new([2, 0, 0, 0, 0, 1]),
            DeviceMac::new([2, 0, 0, 0, 0, 2]),
            0x8001,
            &payload,
            &iops,
            42,
        );
        let parsed = parse_frame(&frame, payload.len(), iops.len())
            .unwrap()
            .unwrap();
        assert_eq!(parsed.frame_id, 0x8001);
        assert_eq!(parsed.payload, payload);
        assert_eq!(parsed.iops, iops);
        assert_eq!(parsed.cycle_counter, 42);
        assert_eq!(parsed.data_status, DATA_STATUS_GOOD);
    }

    #[test]
    fn non_profinet_ethertype_is_ignored() {
        let mut frame = vec![0u8; ETHERNET_MIN_FRAME_LEN];
        frame[12] = 0x08;
        frame[13] = 0x00; // IPv4
        assert!(parse_frame(&frame, 4, 1).unwrap().is_none());
    }
}
