//! Float/integer register conversions.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Read a big-endian `f32` from two consecutive registers' worth of bytes.
pub fn modbus_get_float32_be(buf: &[u8]) -> f32 {
    BigEndian::read_f32(buf)
}

/// Write `value` as a big-endian `f32` into 4 bytes (two registers).
pub fn modbus_set_float32_be(value: f32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    BigEndian::write_f32(&mut buf, value);
    buf
}

/// Read a little-endian (register-swapped) `f32`.
pub fn modbus_get_float32_le(buf: &[u8]) -> f32 {
    LittleEndian::read_f32(buf)
}

/// Write `value` as a little-endian (register-swapped) `f32`.
pub fn modbus_set_float32_le(value: f32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_f32(&mut buf, value);
    buf
}

/// Read a big-endian `f64` from 8 bytes (four registers).
pub fn modbus_get_float64_be(buf: &[u8]) -> f64 {
    BigEndian::read_f64(buf)
}

/// Write `value` as a big-endian `f64`.
pub fn modbus_set_float64_be(value: f64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_f64(&mut buf, value);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float32_be_round_trips_for_finite_values() {
        for value in [0.0f32, -1.0, 3.14159, f32::MIN, f32::MAX, -0.0] {
            let encoded = modbus_set_float32_be(value);
            assert_eq!(modbus_get_float32_be(&encoded).to_bits(), value.to_bits());
        }
    }

    #[test]
    fn float32_le_round_trips() {
        let value = 42.5f32;
        let encoded = modbus_set_float32_le(value);
        assert_eq!(modbus_get_float32_le(&encoded), value);
    }
}
