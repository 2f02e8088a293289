//! Connect Request/Response PDU construction and parsing.
//!
//! Requests carry no NDR wrapping: PNIO blocks begin immediately after the
//! RPC header. Responses carry a leading 4-byte PNIO Status, then a 20-byte
//! NDR prefix (`ArgsMaximum`, `ArgsLength`, `MaxCount`, `Offset`,
//! `ActualCount`, all little-endian), then the blocks.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use pn_types::{ArUuid, SlotDirection, SlotId, StationName};
use scada_core::error::PnioStatus;
use scada_core::ScadaError;

use crate::block::{read_all_blocks, write_block, BlockType, RawBlock};
use crate::header::RpcHeader;
use crate::opnum::Opnum;

/// NDR prefix length on Connect/Control responses.
pub const NDR_PREFIX_LEN: usize = 20;
/// PNIO Status length, leading every response body.
pub const PNIO_STATUS_LEN: usize = 4;

/// One requested I/O Communication Relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IocrSpec {
    /// Input or output.
    pub direction: SlotDirection,
    /// Controller-assigned reference id, used to correlate this IOCR
    /// across the request/response pair and in later Alarm/Control PDUs.
    pub reference_id: u16,
    /// Controller's proposed frame id. The device overwrites this in the
    /// Connect Response; the controller must adopt the device's value.
    pub proposed_frame_id: u16,
    /// Total cyclic payload length for this IOCR, in bytes.
    pub payload_length: u16,
    /// Watchdog factor.
    pub watchdog_factor: u8,
    /// Reduction ratio.
    pub reduction_ratio: u16,
    /// Phase, >= 1.
    pub phase: u16,
}

/// One entry of the expected-module list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedModuleEntry {
    /// (slot, subslot).
    pub slot: SlotId,
    /// Module identifier.
    pub module_ident: u32,
    /// Submodule identifier.
    pub submodule_ident: u32,
    /// Cyclic data length; 0 for acyclic slots such as the DAP.
    pub data_length: u16,
    /// Input or output.
    pub direction: SlotDirection,
}

/// Parameters for a Connect Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequestParams {
    /// AR UUID, generated once per AR.
    pub ar_uuid: ArUuid,
    /// Session key, monotonic per controller.
    pub session_key: u16,
    /// Station name as used on the wire (post name-variation, if any).
    pub station_name: StationName,
    /// Requested IOCRs.
    pub iocrs: Vec<IocrSpec>,
    /// Expected-module list.
    pub expected_modules: Vec<ExpectedModuleEntry>,
}

fn direction_code(d: SlotDirection) -> u8 {
    match d {
        SlotDirection::Input => 1,
        SlotDirection::Output => 2,
    }
}

fn direction_from_code(v: u8) -> Result<SlotDirection, ScadaError> {
    match v {
        1 => Ok(SlotDirection::Input),
        2 => Ok(SlotDirection::Output),
        other => Err(ScadaError::protocol(format!("bad direction code {other}"))),
    }
}

fn write_ar_block(w: &mut Vec<u8>, params: &ConnectRequestParams) -> Result<(), ScadaError> {
    let mut body = Vec::new();
    body.write_all(&params.ar_uuid.to_wire_bytes())?;
    body.write_u16::<BigEndian>(params.session_key)?;
    let name_bytes = params.station_name.as_str().as_bytes();
    body.write_u16::<BigEndian>(name_bytes.len() as u16)?;
    body.write_all(name_bytes)?;
    write_block(w, BlockType::ArBlockReq, &body)
}

fn write_iocr_blocks(w: &mut Vec<u8>, iocrs: &[IocrSpec]) -> Result<(), ScadaError> {
    for iocr in iocrs {
        let mut body = Vec::new();
        body.write_u8(direction_code(iocr.direction))?;
        body.write_u16::<BigEndian>(iocr.reference_id)?;
        body.write_u16::<BigEndian>(iocr.proposed_frame_id)?;
        body.write_u16::<BigEndian>(iocr.payload_length)?;
        body.write_u8(iocr.watchdog_factor)?;
        body.write_u16::<BigEndian>(iocr.reduction_ratio)?;
        body.write_u16::<BigEndian>(iocr.phase)?;
        write_block(w, BlockType::IocrBlockReq, &body)?;
    }
    Ok(())
}

fn write_expected_submodule_block(
    w: &mut Vec<u8>,
    modules: &[ExpectedModuleEntry],
) -> Result<(), ScadaError> {
    let mut body = Vec::new();
    body.write_u16::<BigEndian>(modules.len() as u16)?;
    for m in modules {
        body.write_u16::<BigEndian>(m.slot.slot)?;
        body.write_u16::<BigEndian>(m.slot.subslot)?;
        body.write_u32::<BigEndian>(m.module_ident)?;
        body.write_u32::<BigEndian>(m.submodule_ident)?;
        body.write_u16::<BigEndian>(m.data_length)?;
        body.write_u8(direction_code(m.direction))?;
    }
    write_block(w, BlockType::ExpectedSubmoduleBlock, &body)
}

fn write_alarm_cr_block(w: &mut Vec<u8>) -> Result<(), ScadaError> {
    // Minimal, fixed Alarm CR: one alarm reference, default timeout.
    let mut body = Vec::new();
    body.write_u16::<BigEndian>(1)?; // alarm_cr_type
    body.write_u16::<BigEndian>(0x8892)?; // local alarm reference
    body.write_u16::<BigEndian>(3)?; // max alarm data length / retries
    write_block(w, BlockType::AlarmCrBlockReq, &body)
}

/// Build a complete Connect Request PDU: 80-byte RPC header followed by AR
/// Block, IOCR Block(s), Alarm CR Block, and Expected Submodule Block, with
/// no NDR wrapping.
pub fn build_connect_request(
    params: &ConnectRequestParams,
    sequence_number: u32,
) -> Result<Vec<u8>, ScadaError> {
    let mut blocks = Vec::new();
    write_ar_block(&mut blocks, params)?;
    write_iocr_blocks(&mut blocks, &params.iocrs)?;
    write_alarm_cr_block(&mut blocks)?;
    write_expected_submodule_block(&mut blocks, &params.expected_modules)?;

    let header = RpcHeader::new_request(
        Opnum::Connect,
        ArUuid::from_wire_bytes([0u8; 16]),
        ArUuid::device_interface(),
        sequence_number,
        blocks.len() as u16,
    );

    let mut pdu = Vec::with_capacity(crate::header::HEADER_LEN + blocks.len());
    header.encode(&mut pdu)?;
    pdu.extend_from_slice(&blocks);
    Ok(pdu)
}

/// Parse a Connect Request PDU previously built by
/// [`build_connect_request`] back into its parameters.
pub fn parse_connect_request(pdu: &[u8]) -> Result<ConnectRequestParams, ScadaError> {
    let header = RpcHeader::decode(pdu)?;
    if header.opnum != Opnum::Connect {
        return Err(ScadaError::protocol("not a Connect Request PDU"));
    }
    let body = &pdu[crate::header::HEADER_LEN..];
    let blocks = read_all_blocks(body)?;

    let mut ar_uuid = None;
    let mut session_key = None;
    let mut station_name = None;
    let mut iocrs = Vec::new();
    let mut expected_modules = Vec::new();

    for block in &blocks {
        match block.block_type {
            BlockType::ArBlockReq => {
                let mut c = Cursor::new(block.body.as_slice());
                let mut uuid_buf = [0u8; 16];
                c.read_exact(&mut uuid_buf)?;
                ar_uuid = Some(ArUuid::from_wire_bytes(uuid_buf));
                session_key = Some(c.read_u16::<BigEndian>()?);
                let name_len = c.read_u16::<BigEndian>()? as usize;
                let mut name_buf = vec![0u8; name_len];
                c.read_exact(&mut name_buf)?;
                let name = String::from_utf8(name_buf)
                    .map_err(|_| ScadaError::protocol("station name is not valid UTF-8"))?;
                station_name = Some(
                    StationName::new(name)
                        .map_err(|e| ScadaError::protocol(e.to_string()))?,
                );
            }
            BlockType::IocrBlockReq => {
                iocrs.push(parse_iocr_block_req(&block.body)?);
            }
            BlockType::ExpectedSubmoduleBlock => {
                expected_modules = parse_expected_submodule_block(&block.body)?;
            }
            _ => {}
        }
    }

    Ok(ConnectRequestParams {
        ar_uuid: ar_uuid.ok_or_else(|| ScadaError::protocol("missing AR Block in request"))?,
        session_key: session_key
            .ok_or_else(|| ScadaError::protocol("missing session key in AR Block"))?,
        station_name: station_name
            .ok_or_else(|| ScadaError::protocol("missing station name in AR Block"))?,
        iocrs,
        expected_modules,
    })
}

fn parse_iocr_block_req(body: &[u8]) -> Result<IocrSpec, ScadaError> {
    let mut c = Cursor::new(body);
    let direction = direction_from_code(c.read_u8()?)?;
    let reference_id = c.read_u16::<BigEndian>()?;
    let proposed_frame_id = c.read_u16::<BigEndian>()?;
    let payload_length = c.read_u16::<BigEndian>()?;
    let watchdog_factor = c.read_u8()?;
    let reduction_ratio = c.read_u16::<BigEndian>()?;
    let phase = c.read_u16::<BigEndian>()?;
    Ok(IocrSpec {
        direction,
        reference_id,
        proposed_frame_id,
        payload_length,
        watchdog_factor,
        reduction_ratio,
        phase,
    })
}

fn parse_expected_submodule_block(body: &[u8]) -> Result<Vec<ExpectedModuleEntry>, ScadaError> {
    let mut c = Cursor::new(body);
    let count = c.read_u16::<BigEndian>()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let slot = c.read_u16::<BigEndian>()?;
        let subslot = c.read_u16::<BigEndian>()?;
        let module_ident = c.read_u32::<BigEndian>()?;
        let submodule_ident = c.read_u32::<BigEndian>()?;
        let data_length = c.read_u16::<BigEndian>()?;
        let direction = direction_from_code(c.read_u8()?)?;
        out.push(ExpectedModuleEntry {
            slot: SlotId::new(slot, subslot),
            module_ident,
            submodule_ident,
            data_length,
            direction,
        });
    }
    Ok(out)
}

/// One entry of the device's assigned frame ids, keyed by the IOCR
/// `reference_id` the controller proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignedIocr {
    /// Matches [`IocrSpec::reference_id`] from the request.
    pub reference_id: u16,
    /// Device-assigned frame id; overwrites the controller's proposal.
    pub frame_id: u16,
}

/// A parsed Connect Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfirmation {
    /// Decoded PNIO Status.
    pub status: PnioStatus,
    /// Echoed AR UUID and session key, present when `status` is success.
    pub ar_uuid: Option<ArUuid>,
    /// See [`ConnectRequestParams::session_key`].
    pub session_key: Option<u16>,
    /// Device-assigned frame ids, one per requested IOCR.
    pub assigned_iocrs: Vec<AssignedIocr>,
}

/// Build a synthesized Connect Response, as a simulated device would.
pub fn build_connect_response(
    sequence_number: u32,
    status: PnioStatus,
    ar_uuid: ArUuid,
    session_key: u16,
    assigned_iocrs: &[AssignedIocr],
) -> Result<Vec<u8>, ScadaError> {
    let mut body = Vec::new();
    body.write_u8(status.error_code)?;
    body.write_u8(status.error_decode)?;
    body.write_u8(status.error_code1)?;
    body.write_u8(status.error_code2)?;

    // NDR prefix: ArgsMaximum, ArgsLength, MaxCount, Offset, ActualCount (LE).
    let mut blocks = Vec::new();
    if crate::pnio_status::is_success(&status) {
        let mut ar_res_body = Vec::new();
        ar_res_body.write_all(&ar_uuid.to_wire_bytes())?;
        ar_res_body.write_u16::<BigEndian>(session_key)?;
        write_block(&mut blocks, BlockType::ArBlockRes, &ar_res_body)?;

        for assigned in assigned_iocrs {
            let mut iocr_res_body = Vec::new();
            iocr_res_body.write_u16::<BigEndian>(assigned.reference_id)?;
            iocr_res_body.write_u16::<BigEndian>(assigned.frame_id)?;
            write_block(&mut blocks, BlockType::IocrBlockRes, &iocr_res_body)?;
        }
    }

    body.write_u32::<LittleEndian>(4096)?; // ArgsMaximum
    body.write_u32::<LittleEndian>(blocks.len() as u32)?; // ArgsLength
    body.write_u32::<LittleEndian>(blocks.len() as u32)?; // MaxCount
    body.write_u32::<LittleEndian>(0)?; // Offset
    body.write_u32::<LittleEndian>(blocks.len() as u32)?; // ActualCount
    body.extend_from_slice(&blocks);

    let header = RpcHeader {
        ptype: crate::header::PacketType::Response,
        ..RpcHeader::new_request(
            Opnum::Connect,
            ar_uuid,
            ArUuid::controller_interface(),
            sequence_number,
            body.len() as u16,
        )
    };

    let mut pdu = Vec::with_capacity(crate::header::HEADER_LEN + body.len());
    header.encode(&mut pdu)?;
    pdu.extend_from_slice(&body);
    Ok(pdu)
}

/// Parse a Connect Response PDU.
pub fn parse_connect_response(pdu: &[u8]) -> Result<ConnectConfirmation, ScadaError> {
    let header = RpcHeader::decode(pdu)?;
    let body = &pdu[crate::header::HEADER_LEN..];
    if body.len() < PNIO_STATUS_LEN {
        return Err(ScadaError::protocol("Connect Response missing PNIO Status"));
    }
    let status = crate::pnio_status::decode_pnio_status(&body[..PNIO_STATUS_LEN])?;

    if !crate::pnio_status::is_success(&status) {
        return Ok(ConnectConfirmation {
            status,
            ar_uuid: None,
            session_key: None,
            assigned_iocrs: Vec::new(),
        });
    }

    let after_status = &body[PNIO_STATUS_LEN..];
    if after_status.len() < NDR_PREFIX_LEN {
        return Err(ScadaError::protocol(
            "successful Connect Response missing 20-byte NDR prefix",
        ));
    }
    let blocks_start = NDR_PREFIX_LEN;
    let blocks = read_all_blocks(&after_status[blocks_start..])?;

    let mut ar_uuid = None;
    let mut session_key = None;
    let mut assigned_iocrs = Vec::new();
    for block in &blocks {
        match block.block_type {
            BlockType::ArBlockRes => {
                let (uuid, key) = parse_ar_block_res(block)?;
                ar_uuid = Some(uuid);
                session_key = Some(key);
            }
            BlockType::IocrBlockRes => {
                assigned_iocrs.push(parse_iocr_block_res(block)?);
            }
            _ => {}
        }
    }

    let _ = header;
    Ok(ConnectConfirmation {
        status,
        ar_uuid,
        session_key,
        assigned_iocrs,
    })
}

fn parse_ar_block_res(block: &RawBlock) -> Result<(ArUuid, u16), ScadaError> {
    let mut c = Cursor::new(block.body.as_slice());
    let mut uuid_buf = [0u8; 16];
    c.read_exact(&mut uuid_buf)?;
    let session_key = c.read_u16::<BigEndian>()?;
    Ok((ArUuid::from_wire_bytes(uuid_buf), session_key))
}

fn parse_iocr_block_res(block: &RawBlock) -> Result<AssignedIocr, ScadaError> {
    let mut c = Cursor::new(block.body.as_slice());
    let reference_id = c.read_u16::<BigEndian>()?;
    let frame_id = c.read_u16::<BigEndian>()?;
    Ok(AssignedIocr {
        reference_id,
        frame_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pn_types::SlotDirection;

    fn sample_params() -> ConnectRequestParams {
        ConnectRequestParams {
            ar_uuid: ArUuid::generate(),
            session_key: 1,
            station_name: StationName::new("rtu-tank-1").unwrap(),
            iocrs: vec![IocrSpec {
                direction: SlotDirection::Input,
                reference_id: 1,
                proposed_frame_id: 0,
                payload_length: 5,
                watchdog_factor: 3,
                reduction_ratio: 1,
                phase: 1,
            }],
            expected_modules: vec![
                ExpectedModuleEntry {
                    slot: SlotId::new(0, 1),
                    module_ident: 0,
                    submodule_ident: 0,
                    data_length: 0,
                    direction: SlotDirection::Input,
                },
                ExpectedModuleEntry {
                    slot: SlotId::new(1, 1),
                    module_ident: 0x0040,
                    submodule_ident: 0x0041,
                    data_length: 5,
                    direction: SlotDirection::Input,
                },
            ],
        }
    }

    #[test]
    fn connect_request_round_trips() {
        let params = sample_params();
        let pdu = build_connect_request(&params, 1).unwrap();
        let parsed = parse_connect_request(&pdu).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn connect_request_header_uses_le_drep_and_connect_opnum() {
        let params = sample_params();
        let pdu = build_connect_request(&params, 7).unwrap();
        let header = RpcHeader::decode(&pdu).unwrap();
        assert_eq!(header.drep[0], 0x10);
        assert_eq!(header.opnum, Opnum::Connect);
    }

    #[test]
    fn connect_response_round_trips_with_assigned_frame_id() {
        let ar_uuid = ArUuid::generate();
        let pdu = build_connect_response(
            1,
            PnioStatus::default(),
            ar_uuid,
            1,
            &[AssignedIocr {
                reference_id: 1,
                frame_id: 0x8001,
            }],
        )
            .unwrap();
        let confirmation = parse_connect_response(&pdu).unwrap();
        assert!(crate::pnio_status::is_success(&confirmation.status));
        assert_eq!(confirmation.ar_uuid, Some(ar_uuid));
        assert_eq!(confirmation.session_key, Some(1));
        assert_eq!(confirmation.assigned_iocrs[0].frame_id, 0x8001);
    }
}
