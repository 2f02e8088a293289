//! IOD Control Request/Response: `PrmEnd` (controller -> device) and
//! `ApplicationReady` (device -> controller).
//!
//! Requests carry no NDR wrapping. Responses carry a 4-byte PNIO Status
//! then the 20-byte NDR prefix, exactly as Connect responses do. The
//! response builder addresses the *Controller* Interface UUID
//! (`DEA00002-...`) in the header's Interface UUID field, never the Device
//! Interface UUID, regardless of which side is responding.

use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use pn_types::ArUuid;
use scada_core::error::PnioStatus;
use scada_core::ScadaError;

use crate::block::{read_all_blocks, write_block, BlockType};
use crate::connect::{NDR_PREFIX_LEN, PNIO_STATUS_LEN};
use crate::header::{PacketType, RpcHeader};
use crate::opnum::Opnum;
use crate::pnio_status::{decode_pnio_status, is_success};

/// Which control command an IOD Control PDU carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Controller -> device: parameterization is complete.
    PrmEnd,
    /// Device -> controller: application is ready to run cyclically.
    ApplicationReady,
}

impl ControlCommand {
    fn as_u16(&self) -> u16 {
        match self {
            ControlCommand::PrmEnd => 0x0001,
            ControlCommand::ApplicationReady => 0x0002,
        }
    }

    fn from_u16(v: u16) -> Result<Self, ScadaError> {
        match v {
            0x0001 => Ok(ControlCommand::PrmEnd),
            0x0002 => Ok(ControlCommand::ApplicationReady),
            other => Err(ScadaError::protocol(format!(
                "unknown IOD control command {other:#x}"
            ))),
        }
    }
}

/// Who is sending an IOD Control Request; determines which interface UUID
/// the *request* targets (the response always targets the controller
/// interface, per the module doc above).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Originator {
    /// Controller -> device (PrmEnd).
    Controller,
    /// Device -> controller (ApplicationReady).
    Device,
}

fn control_block_body(ar_uuid: ArUuid, session_key: u16, command: ControlCommand) -> Result<Vec<u8>, ScadaError> {
    let mut body = Vec::new();
    body.write_all(&ar_uuid.to_wire_bytes())?;
    body.write_u16::<BigEndian>(session_key)?;
    body.write_u16::<BigEndian>(command.as_u16())?;
    Ok(body)
}

/// A parsed IOD Control Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    /// AR this control command applies to.
    pub ar_uuid: ArUuid,
    /// Session key, must match the AR's established session.
    pub session_key: u16,
    /// The command carried.
    pub command: ControlCommand,
}

/// Build an IOD Control Request PDU.
pub fn build_control_request(
    ar_uuid: ArUuid,
    session_key: u16,
    command: ControlCommand,
    originator: Originator,
    sequence_number: u32,
) -> Result<Vec<u8>, ScadaError> {
    let body = control_block_body(ar_uuid, session_key, command)?;
    let mut blocks = Vec::new();
    write_block(&mut blocks, BlockType::IodControlReq, &body)?;

    let interface_uuid = match originator {
        Originator::Controller => ArUuid::device_interface(),
        Originator::Device => ArUuid::controller_interface(),
    };

    let header = RpcHeader::new_request(
        Opnum::Control,
        ar_uuid,
        interface_uuid,
        sequence_number,
        blocks.len() as u16,
    );

    let mut pdu = Vec::with_capacity(crate::header::HEADER_LEN + blocks.len());
    header.encode(&mut pdu)?;
    pdu.extend_from_slice(&blocks);
    Ok(pdu)
}

/// Parse an IOD Control Request PDU.
pub fn parse_control_request(pdu: &[u8]) -> Result<ControlRequest, ScadaError> {
    let header = RpcHeader::decode(pdu)?;
    if header.opnum != Opnum::Control {
        return Err(ScadaError::protocol("not an IOD Control Request PDU"));
    }
    let blocks = read_all_blocks(&pdu[crate::header::HEADER_LEN..])?;
    let block = blocks
        .into_iter()
        .find(|b| b.block_type == BlockType::IodControlReq)
        .ok_or_else(|| ScadaError::protocol("missing IOD Control Block in request"))?;
    let mut c = Cursor::new(block.body.as_slice());
    let mut uuid_buf = [0u8; 16];
    c.read_exact(&mut uuid_buf)?;
    let ar_uuid = ArUuid::from_wire_bytes(uuid_buf);
    let session_key = c.read_u16::<BigEndian>()?;
    let command = ControlCommand::from_u16(c.read_u16::<BigEndian>()?)?;
    Ok(ControlRequest {
        ar_uuid,
        session_key,
        command,
    })
}

/// A parsed IOD Control Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlConfirmation {
    /// Decoded PNIO Status.
    pub status: PnioStatus,
    /// Echoed command, present on success.
    pub command: Option<ControlCommand>,
    /// Echoed session key, present on success.
    pub session_key: Option<u16>,
}

/// Build an IOD Control Response PDU. Always targets the Controller
/// Interface UUID, regardless of which side is replying.
pub fn build_control_response(
    ar_uuid: ArUuid,
    session_key: u16,
    command: ControlCommand,
    status: PnioStatus,
    sequence_number: u32,
) -> Result<Vec<u8>, ScadaError> {
    let mut body = Vec::new();
    body.write_u8(status.error_code)?;
    body.write_u8(status.error_decode)?;
    body.write_u8(status.error_code1)?;
    body.write_u8(status.error_code2)?;

    let mut blocks = Vec::new();
    if is_success(&status) {
        let block_body = control_block_body(ar_uuid, session_key, command)?;
        write_block(&mut blocks, BlockType::IodControlRes, &block_body)?;
    }

    body.write_u32::<LittleEndian>(4096)?;
    body.write_u32::<LittleEndian>(blocks.len() as u32)?;
    body.write_u32::<LittleEndian>(blocks.len() as u32)?;
    body.write_u32::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(blocks.len() as u32)?;
    body.extend_from_slice(&blocks);

    let header = RpcHeader {
        ptype: PacketType::Response,
        ..RpcHeader::new_request(
            Opnum::Control,
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

/// Parse an IOD Control Response PDU.
pub fn parse_control_response(pdu: &[u8]) -> Result<ControlConfirmation, ScadaError> {
    let header = RpcHeader::decode(pdu)?;
    if header.interface_uuid != ArUuid::controller_interface() {
        return Err(ScadaError::protocol(
            "IOD Control Response must target the Controller Interface UUID",
        ));
    }
    let body = &pdu[crate::header::HEADER_LEN..];
    if body.len() < PNIO_STATUS_LEN {
        return Err(ScadaError::protocol("IOD Control Response missing PNIO Status"));
    }
    let status = decode_pnio_status(&body[..PNIO_STATUS_LEN])?;
    if !is_success(&status) {
        return Ok(ControlConfirmation {
            status,
            command: None,
            session_key: None,
        });
    }

    let after_status = &body[PNIO_STATUS_LEN..];
    if after_status.len() < NDR_PREFIX_LEN {
        return Err(ScadaError::protocol(
            "successful IOD Control Response missing 20-byte NDR prefix",
        ));
    }
    let blocks = read_all_blocks(&after_status[NDR_PREFIX_LEN..])?;
    let block = blocks
        .into_iter()
        .find(|b| b.block_type == BlockType::IodControlRes)
        .ok_or_else(|| ScadaError::protocol("missing IOD Control Block in response"))?;
    let mut c = Cursor::new(block.body.as_slice());
    let mut uuid_buf = [0u8; 16];
    c.read_exact(&mut uuid_buf)?;
    let session_key = c.read_u16::<BigEndian>()?;
    let command = ControlCommand::from_u16(c.read_u16::<BigEndian>()?)?;

    Ok(ControlConfirmation {
        status,
        command: Some(command),
        session_key: Some(session_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prm_end_request_round_trips() {
        let ar_uuid = ArUuid::generate();
        let pdu = build_control_request(
            ar_uuid,
            5,
            ControlCommand::PrmEnd,
            Originator::Controller,
            3,
        )
            .unwrap();
        let header = RpcHeader::decode(&pdu).unwrap();
        assert_eq!(header.interface_uuid, ArUuid::device_interface());
        let parsed = parse_control_request(&pdu).unwrap();
        assert_eq!(parsed.ar_uuid, ar_uuid);
        assert_eq!(parsed.session_key, 5);
        assert_eq!(parsed.command, ControlCommand::PrmEnd);
    }

    #[test]
    fn app_ready_request_targets_controller_interface() {
        let ar_uuid = ArUuid::generate();
        let pdu = build_control_request(
            ar_uuid,
            5,
            ControlCommand::ApplicationReady,
            Originator::Device,
            1,
        )
            .unwrap();
        let header = RpcHeader::decode(&pdu).unwrap();
        assert_eq!(header.interface_uuid, ArUuid::controller_interface());
    }

    #[test]
    fn control_response_always_targets_controller_interface() {
        let ar_uuid = ArUuid::generate();
        let pdu = build_control_response(
            ar_uuid,
            5,
            ControlCommand::PrmEnd,
            PnioStatus::default(),
            9,
        )
            .unwrap();
        let header = RpcHeader::decode(&pdu).unwrap();
        assert_eq!(header.interface_uuid, ArUuid::controller_interface());
        let confirmation = parse_control_response(&pdu).unwrap();
        assert!(is_success(&confirmation.status));
        assert_eq!(confirmation.command, Some(ControlCommand::PrmEnd));
        assert_eq!(confirmation.session_key, Some(5));
    }
}
