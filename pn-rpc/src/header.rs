//! The fixed 80-byte DCE/RPC header. Every multi-byte field in
//! this header obeys `drep[0]`; the controller always declares
//! `drep[0] = 0x10` (little-endian), so `interface_version`,
//! `sequence_number`, `opnum`, `interface_hint`, `activity_hint` and
//! `fragment_length` are little-endian on the wire. The `object_uuid` and
//! `interface_uuid` fields are a deliberate exception: they are
//! transmitted big-endian in `data1`/`data2`/`data3` despite `drep = LE`.
//! This module applies the same big-endian UUID convention to
//! `activity_uuid`, since it is encoded with the same 16-byte UUID field
//! layout and real device firmware does not special-case it.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use pn_types::ArUuid;
use scada_core::ScadaError;

use crate::opnum::Opnum;

/// Size in bytes of the fixed RPC header.
pub const HEADER_LEN: usize = 80;

/// DCE/RPC packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Request PDU, controller -> device.
    Request = 0,
    /// Response PDU, device -> controller.
    Response = 2,
    /// Fault PDU.
    Fault = 3,
}

impl PacketType {
    fn from_u8(v: u8) -> Result<Self, ScadaError> {
        match v {
            0 => Ok(PacketType::Request),
            2 => Ok(PacketType::Response),
            3 => Ok(PacketType::Fault),
            other => Err(ScadaError::protocol(format!("unknown RPC ptype {other}"))),
        }
    }
}

/// The fixed RPC header.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcHeader {
    /// DCE/RPC wire format version, always 4 for connectionless RPC.
    pub rpc_vers: u8,
    /// Packet type (Request/Response/Fault).
    pub ptype: PacketType,
    /// First flags byte (broadcast/idempotent/maybe/...).
    pub flags1: u8,
    /// Second flags byte, vendor-specific.
    pub flags2: u8,
    /// Data representation; `drep[0] = 0x10` means little-endian header
    /// fields (the only value this codec emits or accepts).
    pub drep: [u8; 4],
    /// DCE/RPC serial number, used to detect duplicate/retransmitted PDUs.
    pub serial: u8,
    /// Target object (here: the AR, identified by its UUID once known; all
    /// zero before an AR is established).
    pub object_uuid: ArUuid,
    /// Target interface (controller interface UUID on requests, device
    /// interface UUID on device-originated requests).
    pub interface_uuid: ArUuid,
    /// Activity (conversation) identifier; fresh per outbound request.
    pub activity_uuid: ArUuid,
    /// Server boot time, informational; 0 if unknown.
    pub server_boot_time: u32,
    /// Interface version.
    pub interface_version: u32,
    /// Monotonically increasing per-request sequence number.
    pub sequence_number: u32,
    /// Operation number.
    pub opnum: Opnum,
    /// Interface hint, usually -1 (0xFFFF) meaning "no hint".
    pub interface_hint: u16,
    /// Activity hint, usually -1 (0xFFFF) meaning "no hint".
    pub activity_hint: u16,
    /// Length of the PDU body following this header.
    pub fragment_length: u16,
    /// Fragment number, 0 for unfragmented PDUs.
    pub fragment_num: u16,
    /// Authentication protocol identifier; 0 (none) for PROFINET RPC.
    pub auth_proto: u8,
}

impl RpcHeader {
    /// Build a request header with drep[0] = 0x10 and no fragmentation,
    /// filling in a fresh activity UUID and the given sequence number.
    pub fn new_request(
        opnum: Opnum,
        object_uuid: ArUuid,
        interface_uuid: ArUuid,
        sequence_number: u32,
        body_len: u16,
    ) -> Self {
        Self {
            rpc_vers: 4,
            ptype: PacketType::Request,
            flags1: 0,
            flags2: 0,
            drep: [0x10, 0x00, 0x00, 0x00],
            serial: 0,
            object_uuid,
            interface_uuid,
            activity_uuid: ArUuid::generate(),
            server_boot_time: 0,
            interface_version: 1,
            sequence_number,
            opnum,
            interface_hint: 0xFFFF,
            activity_hint: 0xFFFF,
            fragment_length: body_len,
            fragment_num: 0,
            auth_proto: 0,
        }
    }

    /// Encode the fixed header. `w` must be positioned at the start of the
    /// PDU; exactly [`HEADER_LEN`] bytes are written.
    pub fn encode(&self, w: &mut impl Write) -> Result<(), ScadaError> {
        if self.drep[0] != 0x10 {
            return Err(ScadaError::protocol(
                "RpcHeader::encode: only drep[0] = 0x10 (little-endian) is supported",
            ));
        }
        w.write_u8(self.rpc_vers)?;
        w.write_u8(self.ptype as u8)?;
        w.write_u8(self.flags1)?;
        w.write_u8(self.flags2)?;
        w.write_all(&self.drep)?;
        w.write_u8(self.serial)?;
        w.write_all(&self.object_uuid.to_wire_bytes())?;
        w.write_all(&self.interface_uuid.to_wire_bytes())?;
        w.write_all(&self.activity_uuid.to_wire_bytes())?;
        w.write_u32::<LittleEndian>(self.server_boot_time)?;
        w.write_u32::<LittleEndian>(self.interface_version)?;
        w.write_u32::<LittleEndian>(self.sequence_number)?;
        w.write_u16::<LittleEndian>(self.opnum.as_u16())?;
        w.write_u16::<LittleEndian>(self.interface_hint)?;
        w.write_u16::<LittleEndian>(self.activity_hint)?;
        w.write_u16::<LittleEndian>(self.fragment_length)?;
        w.write_u16::<LittleEndian>(self.fragment_num)?;
        w.write_u8(self.auth_proto)?;
        Ok(())
    }

    /// Decode the fixed header from the start of `buf`. Returns an error if
    /// fewer than [`HEADER_LEN`] bytes are available or `drep[0] != 0x10`.
    pub fn decode(buf: &[u8]) -> Result<Self, ScadaError> {
        if buf.len() < HEADER_LEN {
            return Err(ScadaError::protocol(format!(
                "RPC PDU too short for header: {} < {}",
                buf.len(),
                HEADER_LEN
            )));
        }
        let mut c = Cursor::new(buf);
        let rpc_vers = c.read_u8()?;
        let ptype = PacketType::from_u8(c.read_u8()?)?;
        let flags1 = c.read_u8()?;
        let flags2 = c.read_u8()?;
        let mut drep = [0u8; 4];
        c.read_exact(&mut drep)?;
        if drep[0] != 0x10 {
            return Err(ScadaError::protocol(format!(
                "unsupported drep[0] = {:#x}, only little-endian (0x10) is handled",
                drep[0]
            )));
        }
        let serial = c.read_u8()?;
        let mut uuid_buf = [0u8; 16];
        c.read_exact(&mut uuid_buf)?;
        let object_uuid = ArUuid::from_wire_bytes(uuid_buf);
        c.read_exact(&mut uuid_buf)?;
        let interface_uuid = ArUuid::from_wire_bytes(uuid_buf);
        c.read_exact(&mut uuid_buf)?;
        let activity_uuid = ArUuid::from_wire_bytes(uuid_buf);
        let server_boot_time = c.read_u32::<LittleEndian>()?;
        let interface_version = c.read_u32::<LittleEndian>()?;
        let sequence_number = c.read_u32::<LittleEndian>()?;
        let opnum = Opnum::from_u16(c.read_u16::<LittleEndian>()?)?;
        let interface_hint = c.read_u16::<LittleEndian>()?;
        let activity_hint = c.read_u16::<LittleEndian>()?;
        let fragment_length = c.read_u16::<LittleEndian>()?;
        let fragment_num = c.read_u16::<LittleEndian>()?;
        let auth_proto = c.read_u8()?;

        Ok(Self {
            rpc_vers,
            ptype,
            flags1,
            flags2,
            drep,
            serial,
            object_uuid,
            interface_uuid,
            activity_uuid,
            server_boot_time,
            interface_version,
            sequence_number,
            opnum,
            interface_hint,
            activity_hint,
            fragment_length,
            fragment_num,
            auth_proto,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = RpcHeader::new_request(
            Opnum::Connect,
            ArUuid::generate(),
            ArUuid::controller_interface(),
            42,
            128,
        );
        let mut buf = Vec::new();
        h.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        let decoded = RpcHeader::decode(&buf).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn rejects_big_endian_drep() {
        let mut h = RpcHeader::new_request(
            Opnum::Connect,
            ArUuid::generate(),
            ArUuid::generate(),
            1,
            0,
        );
        h.drep[0] = 0x00;
        let mut buf = Vec::new();
        assert!(h.encode(&mut buf).is_err());
    }
}
