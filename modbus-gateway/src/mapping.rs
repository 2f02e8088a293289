//! Register map entries and the data sources they bind to.

use modbus_core::DataType;
use scada_core::ScadaError;
use serde::{Deserialize, Serialize};

/// The four Modbus register spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RegisterType {
    /// Read/write, FC 0x03/0x06/0x10.
    Holding,
    /// Read-only, FC 0x04.
    Input,
    /// Read/write single bit, FC 0x01/0x05/0x0F.
    Coil,
    /// Read-only single bit, FC 0x02.
    DiscreteInput,
}

impl RegisterType {
    /// True if this register space is a bit (coil/discrete input) space
    /// rather than a word (holding/input) space.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::DiscreteInput)
    }

    /// True if values in this space are never written by a Modbus master.
    pub fn is_read_only(&self) -> bool {
        matches!(self, RegisterType::Input | RegisterType::DiscreteInput)
    }
}

impl From<RegisterType> for u8 {
    fn from(v: RegisterType) -> u8 {
        match v {
            RegisterType::Holding => 0,
            RegisterType::Input => 1,
            RegisterType::Coil => 2,
            RegisterType::DiscreteInput => 3,
        }
    }
}

impl TryFrom<u8> for RegisterType {
    type Error = ScadaError;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RegisterType::Holding),
            1 => Ok(RegisterType::Input),
            2 => Ok(RegisterType::Coil),
            3 => Ok(RegisterType::DiscreteInput),
            other => Err(ScadaError::protocol(format!("unknown register type {other}"))),
        }
    }
}

/// What backs a mapping's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SourceKind {
    /// A PROFINET cyclic input slot, read via the registry.
    ProfinetSensor,
    /// A PROFINET cyclic output slot, written via `update_actuator`.
    ProfinetActuator,
    /// A PID loop's setpoint field.
    PidSetpoint,
    /// A register on a downstream Modbus slave, via the poller cache.
    ModbusClient,
}

impl From<SourceKind> for u8 {
    fn from(v: SourceKind) -> u8 {
        match v {
            SourceKind::ProfinetSensor => 0,
            SourceKind::ProfinetActuator => 1,
            SourceKind::PidSetpoint => 2,
            SourceKind::ModbusClient => 3,
        }
    }
}

impl TryFrom<u8> for SourceKind {
    type Error = ScadaError;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SourceKind::ProfinetSensor),
            1 => Ok(SourceKind::ProfinetActuator),
            2 => Ok(SourceKind::PidSetpoint),
            3 => Ok(SourceKind::ModbusClient),
            other => Err(ScadaError::protocol(format!("unknown source kind {other}"))),
        }
    }
}

fn default_scale_range() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

/// One entry in the register map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMapping {
    /// Modbus address within its register space.
    pub address: u16,
    /// Which register space this entry belongs to.
    #[serde(rename = "type")]
    pub register_type: RegisterType,
    /// Wire data type (ignored for `Coil`/`DiscreteInput`).
    pub data_type: DataType,
    /// What backs this value.
    pub source: SourceKind,
    /// Station name, for `ProfinetSensor`/`ProfinetActuator` sources.
    #[serde(default)]
    pub rtu_station: Option<String>,
    /// Slot number, for `ProfinetSensor`/`ProfinetActuator` sources
    /// (subslot is always 1).
    #[serde(default)]
    pub slot: Option<u16>,
    /// PID loop name, for `PidSetpoint` sources.
    #[serde(default)]
    pub pid_name: Option<String>,
    /// Downstream client name, for `ModbusClient` sources.
    #[serde(default)]
    pub modbus_client: Option<String>,
    /// Human-readable note.
    #[serde(default)]
    pub description: String,
    /// Whether this entry currently participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower bound of the raw register range covered by scaling.
    #[serde(default)]
    pub raw_min: f64,
    /// Upper bound of the raw register range covered by scaling.
    #[serde(default = "default_scale_range")]
    pub raw_max: f64,
    /// Engineering value at `raw_min`.
    #[serde(default)]
    pub eng_min: f64,
    /// Engineering value at `raw_max`.
    #[serde(default = "default_scale_range")]
    pub eng_max: f64,
    /// Fixed additive offset applied after scaling.
    #[serde(default)]
    pub offset: f64,
}

impl RegisterMapping {
    /// This mapping's scale parameters, as consumed by
    /// [`modbus_core::Scale`].
    pub fn scale(&self) -> modbus_core::Scale {
        modbus_core::Scale {
            raw_min: self.raw_min,
            raw_max: self.raw_max,
            eng_min: self.eng_min,
            eng_max: self.eng_max,
            offset: self.offset,
        }
    }

    /// Registers/coils this mapping occupies, starting at `address`.
    pub fn span(&self) -> u16 {
        if self.register_type.is_bit() {
            1
        } else {
            self.data_type.fixed_register_count().unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_type_round_trips_through_u8() {
        for rt in [
            RegisterType::Holding,
            RegisterType::Input,
            RegisterType::Coil,
            RegisterType::DiscreteInput,
        ] {
            assert_eq!(RegisterType::try_from(u8::from(rt)).unwrap(), rt);
        }
    }

    #[test]
    fn input_and_discrete_input_are_read_only() {
        assert!(RegisterType::Input.is_read_only());
        assert!(RegisterType::DiscreteInput.is_read_only());
        assert!(!RegisterType::Holding.is_read_only());
        assert!(!RegisterType::Coil.is_read_only());
    }
}
