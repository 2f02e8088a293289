#![warn(missing_docs)]

//! Modbus CRC16, PDU framing primitives, function/exception codes, and
//! register data-type conversions shared by the TCP and RTU transports.

pub mod crc;
pub mod datatype;
pub mod exception;
pub mod float;
pub mod function;
pub mod scale;

pub use crc::{modbus_crc16, modbus_crc16_bytes, verify_crc16};
pub use datatype::DataType;
pub use exception::{build_exception_pdu, is_exception_pdu, ExceptionCode};
pub use float::{
    modbus_get_float32_be, modbus_get_float32_le, modbus_get_float64_be, modbus_set_float32_be,
    modbus_set_float32_le, modbus_set_float64_be,
};
pub use function::FunctionCode;
pub use scale::Scale;
