//! Modbus TCP client used by the gateway's downstream poller.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use scada_core::{ScadaError, ScadaResult};

use crate::mbap::{build_tcp_adu, parse_tcp_adu, MBAP_HEADER_LEN};

/// A connected Modbus TCP client, one per downstream slave.
pub struct ModbusTcpClient {
    stream: TcpStream,
    unit_id: u8,
    next_transaction_id: u16,
    timeout: Duration,
}

impl ModbusTcpClient {
    /// Connect to `addr` with a bounded timeout so a slow or unreachable
    /// remote cannot stall the caller.
    pub fn connect(
        addr: impl ToSocketAddrs,
        unit_id: u8,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> ScadaResult<Self> {
        let addr: SocketAddr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ScadaError::InvalidParam("no resolvable address".into()))?;
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        Ok(ModbusTcpClient {
            stream,
            unit_id,
            next_transaction_id: 1,
            timeout,
        })
    }

    /// Send `request_pdu` and wait up to the configured timeout for a
    /// response PDU with a matching transaction id. A mismatched
    /// transaction id is a protocol error, not silently retried.
    pub fn transact(&mut self, request_pdu: &[u8]) -> ScadaResult<Vec<u8>> {
        let transaction_id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);

        let adu = build_tcp_adu(transaction_id, self.unit_id, request_pdu);
        self.stream.write_all(&adu)?;

        let mut header_buf = [0u8; MBAP_HEADER_LEN];
        self.read_exact_with_timeout(&mut header_buf)?;
        let length = u16::from_be_bytes([header_buf[4], header_buf[5]]) as usize;
        let remaining = length.saturating_sub(1);
        let mut pdu_buf = vec![0u8; remaining];
        self.read_exact_with_timeout(&mut pdu_buf)?;

        let mut full = header_buf.to_vec();
        full.extend_from_slice(&pdu_buf);
        let (resp_header, resp_pdu) = parse_tcp_adu(&full)?;

        if resp_header.transaction_id != transaction_id {
            return Err(ScadaError::protocol(format!(
                "transaction id mismatch: sent {transaction_id}, got {}",
                resp_header.transaction_id
            )));
        }

        Ok(resp_pdu.to_vec())
    }

    fn read_exact_with_timeout(&mut self, buf: &mut [u8]) -> ScadaResult<()> {
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut {
                ScadaError::Timeout(format!("no response within {:?}", self.timeout))
            } else {
                ScadaError::Io(e)
            }
        })
    }
}

impl Drop for ModbusTcpClient {
    fn drop(&mut self) {
        debug!("closing modbus tcp client for unit {}", self.unit_id);
    }
}
