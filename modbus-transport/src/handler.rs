//! Shared request-handling seam between the TCP and RTU servers.

/// Something that can answer a Modbus request PDU, independent of the
/// transport that carried it. Both [`crate::tcp_server::TcpServer`] and
/// [`crate::rtu_server::RtuServer`] dispatch through the same trait
/// object so the gateway's function-code logic is written once.
pub trait ModbusRequestHandler: Send + Sync {
    /// Handle one request PDU addressed to `unit_id` and return the
    /// response PDU (a normal response or an exception PDU; never
    /// `Err` — framing-level failures are the transport's problem, not
    /// the handler's).
    fn handle_request(&self, unit_id: u8, request_pdu: &[u8]) -> Vec<u8>;
}
