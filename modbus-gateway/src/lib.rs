#![warn(missing_docs)]

//! The Modbus gateway: register map, function-code dispatch, and
//! downstream polling.

pub mod downstream;
pub mod gateway;
pub mod mapping;
pub mod register_map;

pub use downstream::{DownstreamConfig, DownstreamSlave, MAX_CONSECUTIVE_ERRORS, RECONNECT_DELAY};
pub use gateway::{Gateway, GatewayStats, UnmappedPolicy};
pub use mapping::{RegisterMapping, RegisterType, SourceKind};
pub use register_map::{DeviceSlotKind, RegisterMap, INITIAL_CAPACITY, MAX_FILE_BYTES};
