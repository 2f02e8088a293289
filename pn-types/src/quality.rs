//! Registry value types: sensor readings with an OPC-UA-style quality byte,
//! and actuator commands.

/// OPC-UA-style one-byte data quality. Only bits 6-7 define the category;
/// the remaining bits are reserved and preserved verbatim from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DataQuality(pub u8);

impl DataQuality {
    /// `GOOD` category mask (`0x00`).
    pub const GOOD: DataQuality = DataQuality(0x00);
    /// `UNCERTAIN` category mask (`0x40`).
    pub const UNCERTAIN: DataQuality = DataQuality(0x40);
    /// `BAD` category mask (`0x80`).
    pub const BAD: DataQuality = DataQuality(0x80);
    /// `NOT_CONNECTED` category mask (`0xC0`).
    pub const NOT_CONNECTED: DataQuality = DataQuality(0xC0);

    const CATEGORY_MASK: u8 = 0xC0;

    /// The category bits (6-7), ignoring any reserved bits.
    pub fn category(&self) -> u8 {
        self.0 & Self::CATEGORY_MASK
    }

    /// True if the category is `GOOD`.
    pub fn is_good(&self) -> bool {
        self.category() == Self::GOOD.0
    }
}

impl Default for DataQuality {
    fn default() -> Self {
        DataQuality::NOT_CONNECTED
    }
}

/// A sensor reading stored in the registry: value, quality, and IOPS state.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SensorReading {
    /// Engineering or raw float value (the meaning is defined by the
    /// register map's scaling, not by this type).
    pub value: f32,
    /// OPC-UA-style quality byte.
    pub quality: DataQuality,
    /// IOPS (provider status) byte for the submodule this reading came
    /// from: `0x80` means GOOD in PROFINET terms.
    pub iops: u8,
}

impl SensorReading {
    /// A reading in the `NOT_CONNECTED` state, used before the first
    /// cyclic frame for a slot has arrived.
    pub fn disconnected() -> Self {
        Self {
            value: 0.0,
            quality: DataQuality::NOT_CONNECTED,
            iops: 0x00,
        }
    }
}

/// Actuator command enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ActuatorCommand {
    /// Actuator commanded off.
    Off,
    /// Actuator commanded fully on.
    On,
    /// Actuator commanded to a PWM duty cycle.
    Pwm,
}

/// Commanded actuator output stored in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActuatorOutput {
    /// Command mode.
    pub command: ActuatorCommand,
    /// PWM duty cycle, `0..=100`, meaningful only when `command == Pwm`.
    pub pwm_duty: u8,
}

impl ActuatorOutput {
    /// The all-off output used at startup and on release.
    pub fn off() -> Self {
        Self {
            command: ActuatorCommand::Off,
            pwm_duty: 0,
        }
    }
}
