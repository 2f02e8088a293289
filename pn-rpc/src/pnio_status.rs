//! PNIO Status decode and PNIO-CM error-code mapping.

use std::io::{Cursor, Read};

use byteorder::ReadBytesExt;
use scada_core::error::PnioStatus;
use scada_core::ScadaError;

/// `error_decode` value meaning "PNIO-CM".
pub const ERROR_DECODE_PNIOCM: u8 = 0x81;

/// The block a PNIO-CM error names as having failed (`error_code1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedBlock {
    /// AR Block.
    ArBlock,
    /// IOCR Block.
    IocrBlock,
    /// Alarm CR Block.
    AlarmCrBlock,
    /// Expected Submodule Block.
    ExpectedSubmodule,
    /// Block type not recognized by this codec.
    Other(u8),
}

impl FailedBlock {
    fn from_code1(code1: u8) -> Self {
        match code1 {
            0x01 => FailedBlock::ArBlock,
            0x02 => FailedBlock::IocrBlock,
            0x03 => FailedBlock::AlarmCrBlock,
            0x04 => FailedBlock::ExpectedSubmodule,
            other => FailedBlock::Other(other),
        }
    }
}

/// Recovery action recommended by a PNIO-CM error, consumed by the AR
/// manager's resilient-connect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The device rejected the station name; try a name variation.
    RetryWithNameVariation,
    /// The device rejected a block as too long; try `MINIMAL_CONFIG`.
    ReduceConfiguration,
    /// The device reports a resource is busy; back off and retry as-is.
    BackoffAndRetry,
    /// No specific remedy is known for this error; surface it.
    None,
}

/// Parse the 4-byte PNIO Status and return its decoded recovery action.
pub fn decode_pnio_status(buf: &[u8]) -> Result<PnioStatus, ScadaError> {
    if buf.len() < 4 {
        return Err(ScadaError::protocol("PNIO Status PDU shorter than 4 bytes"));
    }
    let mut c = Cursor::new(buf);
    Ok(PnioStatus {
        error_code: c.read_u8()?,
        error_decode: c.read_u8()?,
        error_code1: c.read_u8()?,
        error_code2: c.read_u8()?,
    })
}

/// Analyze a decoded PNIO status and recommend a recovery action.
pub fn rpc_analyze_error(status: &PnioStatus) -> RecoveryAction {
    if status.error_code == 0x00 {
        return RecoveryAction::None;
    }
    if status.error_decode != ERROR_DECODE_PNIOCM {
        return RecoveryAction::None;
    }
    let failed_block = FailedBlock::from_code1(status.error_code1);
    match (failed_block, status.error_code2) {
        // Station name field rejected inside the AR block.
        (FailedBlock::ArBlock, 0x01) => RecoveryAction::RetryWithNameVariation,
        // Block length rejected.
        (FailedBlock::ArBlock, 0x02) | (FailedBlock::IocrBlock, 0x02) => {
            RecoveryAction::ReduceConfiguration
        }
        // Resource busy.
        (_, 0x03) => RecoveryAction::BackoffAndRetry,
        _ => RecoveryAction::None,
    }
}

/// True if the PNIO status indicates success (`error_code == 0x00`).
pub fn is_success(status: &PnioStatus) -> bool {
    status.error_code == 0x00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_four_bytes() {
        let status = decode_pnio_status(&[0x00, 0x00, 0x00, 0x00]).unwrap();
        assert!(is_success(&status));
    }

    #[test]
    fn maps_station_name_error_to_name_variation() {
        let status = PnioStatus {
            error_code: 0xDB,
            error_decode: ERROR_DECODE_PNIOCM,
            error_code1: 0x01,
            error_code2: 0x01,
        };
        assert_eq!(
            rpc_analyze_error(&status),
            RecoveryAction::RetryWithNameVariation
        );
    }

    #[test]
    fn maps_busy_to_backoff() {
        let status = PnioStatus {
            error_code: 0xDB,
            error_decode: ERROR_DECODE_PNIOCM,
            error_code1: 0x02,
            error_code2: 0x03,
        };
        assert_eq!(rpc_analyze_error(&status), RecoveryAction::BackoffAndRetry);
    }
}
