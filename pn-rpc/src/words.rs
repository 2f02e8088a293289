//! Distinguishes RPC-header words (little-endian, because the controller
//! declares `drep[0] = 0x10`) from PNIO-payload words (always big-endian,
//! regardless of `drep`) at the type level, rather than passing a generic
//! `u16`/`u32` around and hoping every call site remembers which
//! endianness applies.
//!
//! `RpcWord`/`PnioWord` are zero-cost wrappers; their only job is to force
//! every read/write call site to say which endianness convention applies,
//! so a future edit can't silently use the wrong one.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

/// A 16-bit field from the RPC header proper (sequence_number, opnum,
/// interface_hint, activity_hint, ...): little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RpcWord16(pub u16);

/// A 32-bit field from the RPC header proper (fragment_length): little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RpcWord32(pub u32);

/// A 16-bit field from a PNIO block (lengths, addresses, ...): big-endian,
/// independent of the RPC header's `drep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PnioWord16(pub u16);

/// A 32-bit field from a PNIO block: big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PnioWord32(pub u32);

impl RpcWord16 {
    /// Read from an RPC header field position.
    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        Ok(Self(r.read_u16::<LittleEndian>()?))
    }
    /// Write to an RPC header field position.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.0)
    }
}

impl RpcWord32 {
    /// Read from an RPC header field position.
    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        Ok(Self(r.read_u32::<LittleEndian>()?))
    }
    /// Write to an RPC header field position.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.0)
    }
}

impl PnioWord16 {
    /// Read from a PNIO block field position.
    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        Ok(Self(r.read_u16::<BigEndian>()?))
    }
    /// Write to a PNIO block field position.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u16::<BigEndian>(self.0)
    }
}

impl PnioWord32 {
    /// Read from a PNIO block field position.
    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        Ok(Self(r.read_u32::<BigEndian>()?))
    }
    /// Write to a PNIO block field position.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.0)
    }
}

/// Re-exported for call sites that need to decode a raw big-endian-encoded
/// buffer slice without going through a `Read` impl (e.g. chunk parsing).
pub fn be_u16(buf: &[u8]) -> u16 {
    BigEndian::read_u16(buf)
}

/// See [`be_u16`].
pub fn be_u32(buf: &[u8]) -> u32 {
    BigEndian::read_u32(buf)
}
