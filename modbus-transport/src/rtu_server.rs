//! Modbus RTU server: one thread per serial line.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use scada_core::ScadaResult;
use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::handler::ModbusRequestHandler;
use crate::rtu_framing::{build_rtu_adu, inter_frame_gap, parse_rtu_adu};
use crate::stats::{TransportStats, TransportStatsSnapshot};

/// Configuration for one RTU serial line.
#[derive(Debug, Clone)]
pub struct RtuServerConfig {
    /// OS device path, e.g. `/dev/ttyUSB0`.
    pub device_path: String,
    /// Baud rate.
    pub baud: u32,
    /// Parity setting.
    pub parity: RtuParity,
    /// Number of stop bits.
    pub stop_bits: u8,
    /// This server's slave address; requests to other addresses are ignored.
    pub slave_addr: u8,
}

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtuParity {
    /// No parity bit (8N1).
    None,
    /// Even parity (8E1).
    Even,
    /// Odd parity (8O1).
    Odd,
}

/// A running Modbus RTU server.
pub struct RtuServer {
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<TransportStats>,
}

impl RtuServer {
    /// Open the serial line and spawn the server thread.
    pub fn start(
        config: RtuServerConfig,
        handler: Arc<dyn ModbusRequestHandler>,
    ) -> ScadaResult<Self> {
        let parity = match config.parity {
            RtuParity::None => Parity::None,
            RtuParity::Even => Parity::Even,
            RtuParity::Odd => Parity::Odd,
        };
        let stop_bits = match config.stop_bits {
            1 => StopBits::One,
            _ => StopBits::Two,
        };

        let port = serialport::new(config.device_path.clone(), config.baud)
            .data_bits(DataBits::Eight)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| scada_core::ScadaError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(TransportStats::default());
        let thread_running = running.clone();
        let thread_stats = stats.clone();
        let slave_addr = config.slave_addr;
        let baud = config.baud;

        let join = std::thread::Builder::new()
            .name(format!("modbus-rtu-{}", config.device_path))
            .spawn(move || {
                run_serial_loop(port, slave_addr, baud, handler, thread_running, thread_stats);
            })?;

        Ok(RtuServer {
            running,
            join: Some(join),
            stats,
        })
    }

    /// Current transport counters.
    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the server: idempotent, joins the server thread.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RtuServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_serial_loop(
    mut port: Box<dyn SerialPort>,
    slave_addr: u8,
    baud: u32,
    handler: Arc<dyn ModbusRequestHandler>,
    running: Arc<AtomicBool>,
    stats: Arc<TransportStats>,
) {
    let gap = inter_frame_gap(baud);
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];

    while running.load(Ordering::Relaxed) {
        match port.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                stats.add_bytes_received(n as u64);
                buf.extend_from_slice(&chunk[..n]);
                std::thread::sleep(gap);
                continue;
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("modbus rtu: read error: {e}");
                continue;
            }
        }

        if buf.is_empty() {
            continue;
        }

        let frame = std::mem::take(&mut buf);
        match parse_rtu_adu(&frame) {
            Ok((addr, pdu)) if addr == slave_addr => {
                stats.inc_requests_received();
                let response_pdu = handler.handle_request(addr, pdu);
                let response_frame = build_rtu_adu(addr, &response_pdu);
                if let Err(e) = port.write_all(&response_frame) {
                    warn!("modbus rtu: write error: {e}");
                } else {
                    stats.add_bytes_sent(response_frame.len() as u64);
                    stats.inc_responses_sent();
                }
            }
            Ok(_) => debug!("modbus rtu: frame addressed to another slave, ignoring"),
            Err(_) => stats.inc_crc_errors(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_and_stop_bits_map_to_serialport_enums() {
        assert_eq!(
            match RtuParity::Even {
                RtuParity::None => Parity::None,
                RtuParity::Even => Parity::Even,
                RtuParity::Odd => Parity::Odd,
            },
            Parity::Even
        );
    }
}
