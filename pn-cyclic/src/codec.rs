//! Per-submodule cyclic payload encoding.

use byteorder::{BigEndian, ByteOrder};
use pn_types::{ActuatorCommand, ActuatorOutput, DataQuality, SensorReading};
use scada_core::ScadaError;

/// Wire length of one input (sensor) submodule slot: a 32-bit IEEE-754
/// big-endian float followed by a one-byte quality.
pub const INPUT_SLOT_LEN: usize = 5;
/// Wire length of one output (actuator) submodule slot.
pub const OUTPUT_SLOT_LEN: usize = 4;

/// Decode one input submodule slot. The quality byte is stored verbatim
/// in the registry, with no reinterpretation.
pub fn decode_input_slot(buf: &[u8]) -> Result<SensorReading, ScadaError> {
    if buf.len() < INPUT_SLOT_LEN {
        return Err(ScadaError::protocol("input slot shorter than 5 bytes"));
    }
    let value = BigEndian::read_f32(&buf[0..4]);
    let quality = DataQuality(buf[4]);
    Ok(SensorReading {
        value,
        quality,
        iops: 0,
    })
}

/// Encode one input submodule slot, for the simulator and for tests.
pub fn encode_input_slot(value: f32, quality: DataQuality) -> [u8; INPUT_SLOT_LEN] {
    let mut buf = [0u8; INPUT_SLOT_LEN];
    BigEndian::write_f32(&mut buf[0..4], value);
    buf[4] = quality.0;
    buf
}

/// Encode one output (actuator) submodule slot: command byte, duty byte,
/// two reserved zero bytes.
pub fn encode_output_slot(output: &ActuatorOutput) -> [u8; OUTPUT_SLOT_LEN] {
    let command = match output.command {
        ActuatorCommand::Off => 0,
        ActuatorCommand::On => 1,
        ActuatorCommand::Pwm => 2,
    };
    [command, output.pwm_duty, 0, 0]
}

/// Decode one output (actuator) submodule slot.
pub fn decode_output_slot(buf: &[u8]) -> Result<ActuatorOutput, ScadaError> {
    if buf.len() < OUTPUT_SLOT_LEN {
        return Err(ScadaError::protocol("output slot shorter than 4 bytes"));
    }
    let command = match buf[0] {
        0 => ActuatorCommand::Off,
        1 => ActuatorCommand::On,
        2 => ActuatorCommand::Pwm,
        other => {
            return Err(ScadaError::protocol(format!(
                "unknown actuator command byte {other:#x}"
            )))
        }
    };
    Ok(ActuatorOutput {
        command,
        pwm_duty: buf[1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_slot_round_trips() {
        let encoded = encode_input_slot(7.5, DataQuality::GOOD);
        let decoded = decode_input_slot(&encoded).unwrap();
        assert_eq!(decoded.value, 7.5);
        assert!(decoded.quality.is_good());
    }

    #[test]
    fn output_slot_round_trips() {
        let output = ActuatorOutput {
            command: ActuatorCommand::Pwm,
            pwm_duty: 50,
        };
        let encoded = encode_output_slot(&output);
        let decoded = decode_output_slot(&encoded).unwrap();
        assert_eq!(decoded, output);
    }
}
