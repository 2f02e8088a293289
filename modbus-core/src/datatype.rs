//! Register data types and their conversion to/from raw `u16` register
//! words.

use scada_core::ScadaError;

use crate::float::{
    modbus_get_float32_be, modbus_get_float32_le, modbus_get_float64_be, modbus_set_float32_be,
    modbus_set_float32_le, modbus_set_float64_be,
};

/// A register mapping's declared wire data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DataType {
    /// Single unsigned 16-bit register.
    Uint16,
    /// Single signed 16-bit register.
    Int16,
    /// Two registers, big-endian (high register first).
    Uint32Be,
    /// Two registers, little-endian (low register first).
    Uint32Le,
    /// Two registers, big-endian.
    Int32Be,
    /// Two registers, little-endian.
    Int32Le,
    /// Two registers, big-endian IEEE-754.
    Float32Be,
    /// Two registers, little-endian (register-swapped) IEEE-754.
    Float32Le,
    /// Four registers, big-endian IEEE-754 double.
    Float64Be,
    /// Four registers, little-endian IEEE-754 double.
    Float64Le,
    /// Fixed-length ASCII text, one character pair per register.
    String,
    /// A single bit, stored as `0`/`1` in one register.
    Bit,
}

impl DataType {
    /// Number of 16-bit registers this type occupies, for the fixed-width
    /// numeric types. `String` has no fixed width (the mapping's own
    /// `register_count` field governs it).
    pub fn fixed_register_count(&self) -> Option<u16> {
        match self {
            DataType::Uint16 | DataType::Int16 | DataType::Bit => Some(1),
            DataType::Uint32Be | DataType::Uint32Le | DataType::Int32Be | DataType::Int32Le => Some(2),
            DataType::Float32Be | DataType::Float32Le => Some(2),
            DataType::Float64Be | DataType::Float64Le => Some(4),
            DataType::String => None,
        }
    }

    /// Encode an `f64` raw value into this type's register words.
    pub fn encode(&self, raw: f64) -> Result<Vec<u16>, ScadaError> {
        match self {
            DataType::Uint16 => Ok(vec![raw as u16]),
            DataType::Int16 => Ok(vec![raw as i16 as u16]),
            DataType::Bit => Ok(vec![if raw != 0.0 { 1 } else { 0 }]),
            DataType::Uint32Be | DataType::Uint32Le | DataType::Int32Be | DataType::Int32Le => {
                let value = raw as i64 as u32;
                let regs = [((value >> 16) & 0xFFFF) as u16, (value & 0xFFFF) as u16];
                Ok(order_32(self, regs))
            }
            DataType::Float32Be => {
                let bytes = modbus_set_float32_be(raw as f32);
                Ok(bytes_to_regs(&bytes))
            }
            DataType::Float32Le => {
                let bytes = modbus_set_float32_le(raw as f32);
                Ok(bytes_to_regs(&bytes))
            }
            DataType::Float64Be => {
                let bytes = modbus_set_float64_be(raw);
                Ok(bytes_to_regs(&bytes))
            }
            DataType::Float64Le => {
                let mut bytes = modbus_set_float64_be(raw);
                bytes.reverse();
                Ok(bytes_to_regs(&bytes))
            }
            DataType::String => Err(ScadaError::InvalidParam(
                "String registers are encoded directly from text, not via encode()".into(),
            )),
        }
    }

    /// Decode this type's register words back to an `f64` raw value.
    pub fn decode(&self, regs: &[u16]) -> Result<f64, ScadaError> {
        let need = self.fixed_register_count().unwrap_or(regs.len() as u16) as usize;
        if regs.len() < need {
            return Err(ScadaError::protocol(format!(
                "not enough registers for {self:?}: need {need}, have {}",
                regs.len()
            )));
        }
        match self {
            DataType::Uint16 => Ok(regs[0] as f64),
            DataType::Int16 => Ok(regs[0] as i16 as f64),
            DataType::Bit => Ok(if regs[0] != 0 { 1.0 } else { 0.0 }),
            DataType::Uint32Be | DataType::Int32Be => {
                let value = ((regs[0] as u32) << 16) | regs[1] as u32;
                decode_signed_if(self, value)
            }
            DataType::Uint32Le | DataType::Int32Le => {
                let value = ((regs[1] as u32) << 16) | regs[0] as u32;
                decode_signed_if(self, value)
            }
            DataType::Float32Be => Ok(modbus_get_float32_be(&regs_to_bytes(&regs[0..2])) as f64),
            DataType::Float32Le => Ok(modbus_get_float32_le(&regs_to_bytes(&regs[0..2])) as f64),
            DataType::Float64Be => Ok(modbus_get_float64_be(&regs_to_bytes(&regs[0..4]))),
            DataType::Float64Le => {
                let mut bytes = regs_to_bytes(&regs[0..4]);
                bytes.reverse();
                Ok(modbus_get_float64_be(&bytes))
            }
            DataType::String => Err(ScadaError::InvalidParam(
                "String registers are decoded directly to text, not via decode()".into(),
            )),
        }
    }
}

impl From<DataType> for u8 {
    fn from(v: DataType) -> u8 {
        match v {
            DataType::Uint16 => 0,
            DataType::Int16 => 1,
            DataType::Uint32Be => 2,
            DataType::Uint32Le => 3,
            DataType::Int32Be => 4,
            DataType::Int32Le => 5,
            DataType::Float32Be => 6,
            DataType::Float32Le => 7,
            DataType::Float64Be => 8,
            DataType::Float64Le => 9,
            DataType::String => 10,
            DataType::Bit => 11,
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = ScadaError;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(DataType::Uint16),
            1 => Ok(DataType::Int16),
            2 => Ok(DataType::Uint32Be),
            3 => Ok(DataType::Uint32Le),
            4 => Ok(DataType::Int32Be),
            5 => Ok(DataType::Int32Le),
            6 => Ok(DataType::Float32Be),
            7 => Ok(DataType::Float32Le),
            8 => Ok(DataType::Float64Be),
            9 => Ok(DataType::Float64Le),
            10 => Ok(DataType::String),
            11 => Ok(DataType::Bit),
            other => Err(ScadaError::protocol(format!("unknown data type code {other}"))),
        }
    }
}

fn decode_signed_if(dt: &DataType, value: u32) -> Result<f64, ScadaError> {
    match dt {
        DataType::Int32Be | DataType::Int32Le => Ok(value as i32 as f64),
        _ => Ok(value as f64),
    }
}

fn order_32(dt: &DataType, be_regs: [u16; 2]) -> Vec<u16> {
    match dt {
        DataType::Uint32Le | DataType::Int32Le => vec![be_regs[1], be_regs[0]],
        _ => vec![be_regs[0], be_regs[1]],
    }
}

fn bytes_to_regs(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect()
}

fn regs_to_bytes(regs: &[u16]) -> Vec<u8> {
    regs.iter().flat_map(|r| r.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float32_be_register_pair_round_trips() {
        let regs = DataType::Float32Be.encode(0.5).unwrap();
        assert_eq!(regs.len(), 2);
        let decoded = DataType::Float32Be.decode(&regs).unwrap();
        assert!((decoded - 0.5).abs() < 1e-6);
    }

    #[test]
    fn uint32_le_swaps_register_order() {
        let value = 0x0001_0002u32;
        let be = DataType::Uint32Be.encode(value as f64).unwrap();
        let le = DataType::Uint32Le.encode(value as f64).unwrap();
        assert_eq!(le, vec![be[1], be[0]]);
    }

    #[test]
    fn int16_round_trips_negative_values() {
        let regs = DataType::Int16.encode(-5.0).unwrap();
        assert_eq!(DataType::Int16.decode(&regs).unwrap(), -5.0);
    }
}
