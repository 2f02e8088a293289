#![warn(missing_docs)]

//! The controller facade: one configuration surface over the AR
//! lifecycle manager, the cyclic real-time exchange, and the Modbus
//! gateway.

pub mod config;
pub mod controller;
mod cyclic_io;
pub mod rpc_io;

pub use config::ScadaConfig;
pub use controller::Controller;
pub use pn_ar::DiscoveryHandle;
pub use rpc_io::RpcIo;
