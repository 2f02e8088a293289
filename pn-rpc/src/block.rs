//! PNIO block framing: every block begins with
//! `(type: u16, length: u16, version_high: u8 = 1, version_low: u8 = 0)`,
//! all big-endian, where `length` excludes the type and length fields
//! themselves. Block *contents* are always big-endian regardless of the
//! RPC header's `drep`.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use scada_core::ScadaError;

/// Block type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// AR Block Request.
    ArBlockReq,
    /// AR Block Response.
    ArBlockRes,
    /// IOCR Block Request.
    IocrBlockReq,
    /// IOCR Block Response.
    IocrBlockRes,
    /// Alarm CR Block Request.
    AlarmCrBlockReq,
    /// Alarm CR Block Response.
    AlarmCrBlockRes,
    /// Expected Submodule Block.
    ExpectedSubmoduleBlock,
    /// Module Diff Block.
    ModuleDiffBlock,
    /// IOD Control Request (PrmEnd / AppReady).
    IodControlReq,
    /// IOD Control Response.
    IodControlRes,
    /// Unrecognized block, kept so decoding can skip over it.
    Unknown(u16),
}

impl BlockType {
    /// The wire code for this block type.
    pub fn as_u16(&self) -> u16 {
        match self {
            BlockType::ArBlockReq => 0x0101,
            BlockType::ArBlockRes => 0x8101,
            BlockType::IocrBlockReq => 0x0102,
            BlockType::IocrBlockRes => 0x8102,
            BlockType::AlarmCrBlockReq => 0x0103,
            BlockType::AlarmCrBlockRes => 0x8103,
            BlockType::ExpectedSubmoduleBlock => 0x0104,
            BlockType::ModuleDiffBlock => 0x0019,
            BlockType::IodControlReq => 0x0110,
            BlockType::IodControlRes => 0x8110,
            BlockType::Unknown(code) => *code,
        }
    }

    /// Parse a wire block type code.
    pub fn from_u16(v: u16) -> Self {
        match v {
            0x0101 => BlockType::ArBlockReq,
            0x8101 => BlockType::ArBlockRes,
            0x0102 => BlockType::IocrBlockReq,
            0x8102 => BlockType::IocrBlockRes,
            0x0103 => BlockType::AlarmCrBlockReq,
            0x8103 => BlockType::AlarmCrBlockRes,
            0x0104 => BlockType::ExpectedSubmoduleBlock,
            0x0019 => BlockType::ModuleDiffBlock,
            0x0110 => BlockType::IodControlReq,
            0x8110 => BlockType::IodControlRes,
            other => BlockType::Unknown(other),
        }
    }
}

/// A decoded block header plus its raw body bytes.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Block type.
    pub block_type: BlockType,
    /// Block version (high, low); fixed at (1, 0) for all blocks this
    /// codec emits.
    pub version: (u8, u8),
    /// Body bytes, i.e. everything after the 6-byte block header.
    pub body: Vec<u8>,
}

/// Write a block: header followed by `body`.
pub fn write_block(w: &mut impl Write, block_type: BlockType, body: &[u8]) -> Result<(), ScadaError> {
    // length excludes the type and length fields themselves,
    // but includes the two version bytes plus the body.
    let length: u16 = (2 + body.len())
        .try_into()
        .map_err(|_| ScadaError::protocol("PNIO block body too large"))?;
    w.write_u16::<BigEndian>(block_type.as_u16())?;
    w.write_u16::<BigEndian>(length)?;
    w.write_u8(1)?; // version_high
    w.write_u8(0)?; // version_low
    w.write_all(body)?;
    Ok(())
}

/// Read one block from the front of `r`, returning it and leaving `r`
/// positioned immediately after the block.
pub fn read_block(r: &mut Cursor<&[u8]>) -> Result<RawBlock, ScadaError> {
    let block_type = BlockType::from_u16(r.read_u16::<BigEndian>()?);
    let length = r.read_u16::<BigEndian>()?;
    if length < 2 {
        return Err(ScadaError::protocol("PNIO block length underflows version field"));
    }
    let version_high = r.read_u8()?;
    let version_low = r.read_u8()?;
    let body_len = (length - 2) as usize;
    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)?;
    Ok(RawBlock {
        block_type,
        version: (version_high, version_low),
        body,
    })
}

/// Read every block remaining in `buf`, in order.
pub fn read_all_blocks(buf: &[u8]) -> Result<Vec<RawBlock>, ScadaError> {
    let mut c = Cursor::new(buf);
    let mut blocks = Vec::new();
    while (c.position() as usize) < buf.len() {
        blocks.push(read_block(&mut c)?);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trips() {
        let body = vec![1, 2, 3, 4, 5];
        let mut buf = Vec::new();
        write_block(&mut buf, BlockType::ArBlockReq, &body).unwrap();
        // type(2) + length(2) + version(2) + body(5) = 11
        assert_eq!(buf.len(), 11);
        let mut c = Cursor::new(buf.as_slice());
        let block = read_block(&mut c).unwrap();
        assert_eq!(block.block_type, BlockType::ArBlockReq);
        assert_eq!(block.body, body);
    }

    #[test]
    fn reads_multiple_blocks() {
        let mut buf = Vec::new();
        write_block(&mut buf, BlockType::ArBlockReq, &[1, 2]).unwrap();
        write_block(&mut buf, BlockType::IocrBlockReq, &[3, 4, 5]).unwrap();
        let blocks = read_all_blocks(&buf).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block_type, BlockType::ArBlockReq);
        assert_eq!(blocks[1].block_type, BlockType::IocrBlockReq);
    }
}
