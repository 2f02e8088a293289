#![warn(missing_docs)]

//! Modbus TCP and RTU transports: ADU framing, servers, client
//! transactions, and shared transport counters.

pub mod client;
pub mod handler;
pub mod mbap;
pub mod rtu_framing;
pub mod rtu_server;
pub mod stats;
pub mod tcp_server;

pub use client::ModbusTcpClient;
pub use handler::ModbusRequestHandler;
pub use mbap::{build_tcp_adu, parse_tcp_adu, MbapHeader, MBAP_HEADER_LEN};
pub use rtu_framing::{build_rtu_adu, inter_frame_gap, parse_rtu_adu};
pub use rtu_server::{RtuParity, RtuServer, RtuServerConfig};
pub use stats::{TransportStats, TransportStatsSnapshot};
pub use tcp_server::{TcpServer, TcpServerConfig, MAX_CONNECTIONS_CAP};
