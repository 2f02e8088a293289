//! Error taxonomy shared across the core.

use thiserror::Error;

/// Result alias using [`ScadaError`].
pub type ScadaResult<T> = Result<T, ScadaError>;

/// The decoded PNIO Status quadruple. Carried verbatim on
/// [`ScadaError::Protocol`] so callers can recover the PNIO-CM recovery
/// action without a second capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PnioStatus {
    /// `error_code` byte of the PNIO Status.
    pub error_code: u8,
    /// `error_decode` byte; `0x81` means PNIO-CM.
    pub error_decode: u8,
    /// `error_code1`: names the failed block when `error_decode == 0x81`.
    pub error_code1: u8,
    /// `error_code2`: names the faulting field when `error_decode == 0x81`.
    pub error_code2: u8,
}

/// Error taxonomy for the whole core.
///
/// Every public API boundary in this workspace returns `Result<T, ScadaError>`,
/// or a narrower crate-local error with a `From` impl into this one.
#[derive(Debug, Error)]
pub enum ScadaError {
    /// Programming error at an API boundary. Never retried.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    /// Allocation failure surfaced from a capacity-bounded collection.
    #[error("no memory available: {0}")]
    NoMemory(String),
    /// Network or serial syscall failure. Retried at the transport layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Response not observed within the configured deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Decoded PDU violates structural rules or PNIO-CM checks.
    #[error("protocol error: {message} ({status:?})")]
    Protocol {
        /// Human-readable description of the violation.
        message: String,
        /// Decoded PNIO status, when one was available.
        status: Option<PnioStatus>,
    },
    /// Lookup failure: the named entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Attempted to create an entity that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Operation requires a connection that is not currently established.
    #[error("not connected: {0}")]
    NotConnected(String),
    /// A capacity-bounded collection is full.
    #[error("capacity exhausted: {0}")]
    Full(String),
    /// Unexpected internal error; fatal for the affected subsystem.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScadaError {
    /// Construct a [`ScadaError::Protocol`] with no PNIO status attached.
    pub fn protocol(message: impl Into<String>) -> Self {
        ScadaError::Protocol {
            message: message.into(),
            status: None,
        }
    }

    /// Construct a [`ScadaError::Protocol`] carrying a decoded PNIO status.
    pub fn protocol_with_status(message: impl Into<String>, status: PnioStatus) -> Self {
        ScadaError::Protocol {
            message: message.into(),
            status: Some(status),
        }
    }
}
