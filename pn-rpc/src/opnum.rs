//! RPC operation numbers.

use scada_core::ScadaError;

/// PROFINET RPC operation number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opnum {
    /// Establish an AR.
    Connect,
    /// Tear down an AR.
    Release,
    /// Acyclic read.
    Read,
    /// Acyclic write.
    Write,
    /// IOD Control (PrmEnd, AppReady,...).
    Control,
    /// Acyclic implicit read.
    ReadImplicit,
}

impl Opnum {
    /// The wire value of this opnum.
    pub fn as_u16(&self) -> u16 {
        match self {
            Opnum::Connect => 0,
            Opnum::Release => 1,
            Opnum::Read => 2,
            Opnum::Write => 3,
            Opnum::Control => 4,
            Opnum::ReadImplicit => 5,
        }
    }

    /// Parse a wire opnum value.
    pub fn from_u16(v: u16) -> Result<Self, ScadaError> {
        match v {
            0 => Ok(Opnum::Connect),
            1 => Ok(Opnum::Release),
            2 => Ok(Opnum::Read),
            3 => Ok(Opnum::Write),
            4 => Ok(Opnum::Control),
            5 => Ok(Opnum::ReadImplicit),
            other => Err(ScadaError::protocol(format!("unknown RPC opnum {other}"))),
        }
    }
}
