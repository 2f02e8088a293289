//! AR identity and state.

use std::fmt;
use uuid::Uuid;

/// A 128-bit AR UUID. Wraps [`uuid::Uuid`] but forces callers through
/// [`ArUuid::to_wire_bytes`] / [`ArUuid::from_wire_bytes`] instead of the
/// generic byte representation, because PROFINET RPC headers transmit
/// `data1`/`data2`/`data3` big-endian despite `drep = LE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ArUuid(Uuid);

impl ArUuid {
    /// Generate a fresh random AR UUID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The well-known controller interface UUID
    /// `DEA00002-6C97-11D1-8271-00A02442DF7D`.
    pub fn controller_interface() -> Self {
        Self(Uuid::parse_str("dea00002-6c97-11d1-8271-00a02442df7d").unwrap())
    }

    /// The well-known device interface UUID
    /// `DEA00001-6C97-11D1-8271-00A02442DF7D`.
    pub fn device_interface() -> Self {
        Self(Uuid::parse_str("dea00001-6c97-11d1-8271-00a02442df7d").unwrap())
    }

    /// Wire bytes: `data1` (4 bytes), `data2` (2 bytes), `data3` (2 bytes)
    /// each big-endian, followed by the 8 `data4` bytes verbatim. This is
    /// the representation used inside RPC headers and PNIO blocks alike.
    pub fn to_wire_bytes(&self) -> [u8; 16] {
        let (d1, d2, d3, d4) = self.0.as_fields();
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&d1.to_be_bytes());
        out[4..6].copy_from_slice(&d2.to_be_bytes());
        out[6..8].copy_from_slice(&d3.to_be_bytes());
        out[8..16].copy_from_slice(d4);
        out
    }

    /// Parse the wire representation described in [`Self::to_wire_bytes`].
    pub fn from_wire_bytes(bytes: [u8; 16]) -> Self {
        let d1 = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let d2 = u16::from_be_bytes(bytes[4..6].try_into().unwrap());
        let d3 = u16::from_be_bytes(bytes[6..8].try_into().unwrap());
        let d4: [u8; 8] = bytes[8..16].try_into().unwrap();
        Self(Uuid::from_fields(d1, d2, d3, &d4))
    }
}

impl fmt::Display for ArUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// AR lifecycle state.
///
/// `state` monotonically advances `INIT -> CONNECT_REQ -> CONNECT_CNF ->
/// PRMSRV -> READY -> RUN`, except for transitions into `ABORT` or `CLOSE`
/// which may occur from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ArState {
    /// Freshly created, not yet attempting to connect.
    Init,
    /// Connect Request sent, awaiting Connect Confirm.
    ConnectReq,
    /// Connect Confirm received; about to send PrmEnd.
    ConnectCnf,
    /// PrmEnd (parameterization end) RPC sent, awaiting response.
    PrmSrv,
    /// Parameterized; waiting for the device to signal AppReady.
    Ready,
    /// Cyclic data exchange is active.
    Run,
    /// Connection attempt or cyclic watchdog failed; will retry from `Init`
    /// after the retry delay elapses.
    Abort,
    /// Torn down by operator request; terminal until the AR is deleted.
    Close,
}

impl ArState {
    /// True once the AR is exchanging cyclic data.
    pub fn is_run(&self) -> bool {
        matches!(self, ArState::Run)
    }

    /// True if this state is terminal absent external action (`Close`), or
    /// will automatically retry (`Abort`).
    pub fn is_connected_handshake(&self) -> bool {
        matches!(
            self,
            ArState::ConnectReq | ArState::ConnectCnf | ArState::PrmSrv | ArState::Ready
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bytes_round_trip() {
        let id = ArUuid::generate();
        let bytes = id.to_wire_bytes();
        assert_eq!(ArUuid::from_wire_bytes(bytes), id);
    }

    #[test]
    fn controller_uuid_matches_spec() {
        let bytes = ArUuid::controller_interface().to_wire_bytes();
        // data1 = 0xDEA00002 big-endian
        assert_eq!(&bytes[0..4], &[0xDE, 0xA0, 0x00, 0x02]);
    }
}
