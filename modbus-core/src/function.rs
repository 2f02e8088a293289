//! Modbus function codes handled by the gateway.

use scada_core::ScadaError;

/// A Modbus function code this gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// 0x01.
    ReadCoils,
    /// 0x02.
    ReadDiscreteInputs,
    /// 0x03.
    ReadHoldingRegisters,
    /// 0x04.
    ReadInputRegisters,
    /// 0x05.
    WriteSingleCoil,
    /// 0x06.
    WriteSingleRegister,
    /// 0x0F.
    WriteMultipleCoils,
    /// 0x10.
    WriteMultipleRegisters,
}

impl FunctionCode {
    /// The wire function code byte.
    pub fn as_u8(&self) -> u8 {
        match self {
            FunctionCode::ReadCoils => 0x01,
            FunctionCode::ReadDiscreteInputs => 0x02,
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleCoils => 0x0F,
            FunctionCode::WriteMultipleRegisters => 0x10,
        }
    }

    /// Parse a wire function code byte, rejecting the high (exception) bit.
    pub fn from_u8(v: u8) -> Result<Self, ScadaError> {
        match v {
            0x01 => Ok(FunctionCode::ReadCoils),
            0x02 => Ok(FunctionCode::ReadDiscreteInputs),
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x05 => Ok(FunctionCode::WriteSingleCoil),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            0x0F => Ok(FunctionCode::WriteMultipleCoils),
            0x10 => Ok(FunctionCode::WriteMultipleRegisters),
            other => Err(ScadaError::protocol(format!("unknown Modbus FC {other:#x}"))),
        }
    }

    /// Maximum quantity this FC accepts before `ILLEGAL_DATA_VALUE`.
    pub fn max_quantity(&self) -> u16 {
        match self {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => 2000,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => 125,
            FunctionCode::WriteMultipleCoils => 1968,
            FunctionCode::WriteMultipleRegisters => 123,
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_codes() {
        for fc in [
            FunctionCode::ReadCoils,
            FunctionCode::ReadDiscreteInputs,
            FunctionCode::ReadHoldingRegisters,
            FunctionCode::ReadInputRegisters,
            FunctionCode::WriteSingleCoil,
            FunctionCode::WriteSingleRegister,
            FunctionCode::WriteMultipleCoils,
            FunctionCode::WriteMultipleRegisters,
        ] {
            assert_eq!(FunctionCode::from_u8(fc.as_u8()).unwrap(), fc);
        }
    }
}
