//! The register map: ordered mappings with geometric capacity growth and
//! JSON persistence.

use std::fs;
use std::path::Path;

use log::info;
use scada_core::{ScadaError, ScadaResult};
use scada_registry::Registry;
use serde::{Deserialize, Serialize};

use crate::mapping::{RegisterMapping, RegisterType, SourceKind};

/// Starting capacity for both register and coil spaces.
pub const INITIAL_CAPACITY: usize = 256;

/// Maximum on-disk size of a register map file.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;

#[derive(Serialize, Deserialize)]
struct PersistedMap {
    registers: Vec<RegisterMapping>,
    coils: Vec<RegisterMapping>,
}

/// An ordered, unique-by-`(address, type)` collection of register
/// mappings, split into a word space and a bit space.
pub struct RegisterMap {
    registers: Vec<RegisterMapping>,
    coils: Vec<RegisterMapping>,
    register_capacity: usize,
    coil_capacity: usize,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterMap {
    /// An empty map with the default initial capacity.
    pub fn new() -> Self {
        RegisterMap {
            registers: Vec::with_capacity(INITIAL_CAPACITY),
            coils: Vec::with_capacity(INITIAL_CAPACITY),
            register_capacity: INITIAL_CAPACITY,
            coil_capacity: INITIAL_CAPACITY,
        }
    }

    fn grow_if_needed(vec: &mut Vec<RegisterMapping>, capacity: &mut usize) {
        if vec.len() == *capacity {
            *capacity *= 2;
            vec.reserve(*capacity - vec.len());
        }
    }

    fn space_mut(&mut self, register_type: RegisterType) -> (&mut Vec<RegisterMapping>, &mut usize) {
        if register_type.is_bit() {
            (&mut self.coils, &mut self.coil_capacity)
        } else {
            (&mut self.registers, &mut self.register_capacity)
        }
    }

    fn space(&self, register_type: RegisterType) -> &[RegisterMapping] {
        if register_type.is_bit() {
            &self.coils
        } else {
            &self.registers
        }
    }

    /// Insert a mapping, rejecting a duplicate `(address, type)` pair.
    pub fn insert(&mut self, mapping: RegisterMapping) -> ScadaResult<()> {
        if self
            .space(mapping.register_type)
            .iter()
            .any(|m| m.address == mapping.address && m.register_type == mapping.register_type)
        {
            return Err(ScadaError::AlreadyExists(format!(
                "address {} already mapped in {:?}",
                mapping.address, mapping.register_type
            )));
        }
        let (vec, capacity) = self.space_mut(mapping.register_type);
        Self::grow_if_needed(vec, capacity);
        vec.push(mapping);
        Ok(())
    }

    /// Find the mapping covering `address` in `register_type`'s space.
    pub fn lookup(&self, register_type: RegisterType, address: u16) -> Option<&RegisterMapping> {
        self.space(register_type)
            .iter()
            .find(|m| m.enabled && m.address == address && m.register_type == register_type)
    }

    /// All mappings in a register space, in insertion order.
    pub fn entries(&self, register_type: RegisterType) -> &[RegisterMapping] {
        self.space(register_type)
    }

    /// Counts of enabled mappings by register type, for telemetry.
    pub fn counts_by_type(&self) -> [(RegisterType, usize); 4] {
        let count = |rt: RegisterType| self.space(rt).iter().filter(|m| m.enabled).count();
        [
            (RegisterType::Holding, count(RegisterType::Holding)),
            (RegisterType::Input, count(RegisterType::Input)),
            (RegisterType::Coil, count(RegisterType::Coil)),
            (RegisterType::DiscreteInput, count(RegisterType::DiscreteInput)),
        ]
    }

    /// Load a map from a JSON file, rejecting files over [`MAX_FILE_BYTES`].
    pub fn load_from_json(path: impl AsRef<Path>) -> ScadaResult<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path)?;
        if meta.len() > MAX_FILE_BYTES {
            return Err(ScadaError::InvalidParam(format!(
                "register map file {path:?} exceeds the 1 MiB cap"
            )));
        }
        let text = fs::read_to_string(path)?;
        let persisted: PersistedMap =
        serde_json::from_str(&text).map_err(|e| ScadaError::protocol(format!("invalid register map JSON: {e}")))?;

        let mut map = RegisterMap::new();
        for mapping in persisted.registers {
            map.insert(mapping)?;
        }
        for mapping in persisted.coils {
            map.insert(mapping)?;
        }
        Ok(map)
    }

    /// Write this map to a JSON file.
    pub fn save_to_json(&self, path: impl AsRef<Path>) -> ScadaResult<()> {
        let persisted = PersistedMap {
            registers: self.registers.clone(),
            coils: self.coils.clone(),
        };
        let text = serde_json::to_string_pretty(&persisted)
            .map_err(|e| ScadaError::Internal(format!("failed to serialize register map: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Auto-generate a map from the registry's configured devices. Requires each device's slot list to know
    /// which slots are sensors vs actuators, which the registry itself
    /// does not track — callers pass that mapping explicitly.
    pub fn auto_generate(
        registry: &dyn Registry,
        device_slots: &[(String, Vec<DeviceSlotKind>)],
        sensor_base: u16,
        actuator_base: u16,
    ) -> ScadaResult<Self> {
        let _ = registry.list_devices();
        let mut map = RegisterMap::new();
        let mut next_sensor_addr = sensor_base;
        let mut next_actuator_addr = actuator_base;
        let mut next_coil_addr = 0u16;

        for (station, slots) in device_slots {
            for slot in slots {
                match slot {
                    DeviceSlotKind::Sensor(slot_number) => {
                        map.insert(RegisterMapping {
                            address: next_sensor_addr,
                            register_type: RegisterType::Input,
                            data_type: modbus_core::DataType::Float32Be,
                            source: SourceKind::ProfinetSensor,
                            rtu_station: Some(station.clone()),
                            slot: Some(*slot_number),
                            pid_name: None,
                            modbus_client: None,
                            description: format!("auto: {station} slot {slot_number} sensor"),
                            enabled: true,
                            raw_min: 0.0,
                            raw_max: 1.0,
                            eng_min: 0.0,
                            eng_max: 1.0,
                            offset: 0.0,
                        })?;
                        next_sensor_addr += 2;
                    }
                    DeviceSlotKind::Actuator(slot_number) => {
                        map.insert(RegisterMapping {
                            address: next_actuator_addr,
                            register_type: RegisterType::Holding,
                            data_type: modbus_core::DataType::Uint16,
                            source: SourceKind::ProfinetActuator,
                            rtu_station: Some(station.clone()),
                            slot: Some(*slot_number),
                            pid_name: None,
                            modbus_client: None,
                            description: format!("auto: {station} slot {slot_number} actuator command"),
                            enabled: true,
                            raw_min: 0.0,
                            raw_max: 100.0,
                            eng_min: 0.0,
                            eng_max: 100.0,
                            offset: 0.0,
                        })?;
                        next_actuator_addr += 1;

                        map.insert(RegisterMapping {
                            address: next_coil_addr,
                            register_type: RegisterType::Coil,
                            data_type: modbus_core::DataType::Bit,
                            source: SourceKind::ProfinetActuator,
                            rtu_station: Some(station.clone()),
                            slot: Some(*slot_number),
                            pid_name: None,
                            modbus_client: None,
                            description: format!("auto: {station} slot {slot_number} on/off"),
                            enabled: true,
                            raw_min: 0.0,
                            raw_max: 1.0,
                            eng_min: 0.0,
                            eng_max: 1.0,
                            offset: 0.0,
                        })?;
                        next_coil_addr += 1;
                    }
                }
            }
        }

        info!(
            "auto-generated register map: {} holding, {} input, {} coils",
            map.entries(RegisterType::Holding).len(),
            map.entries(RegisterType::Input).len(),
            map.entries(RegisterType::Coil).len()
        );
        Ok(map)
    }
}

/// One configured PROFINET slot, classified for map auto-generation. The
/// registry itself has no notion of "sensor vs actuator slot"; this is
/// supplied by the caller from the device's static slot configuration.
#[derive(Debug, Clone, Copy)]
pub enum DeviceSlotKind {
    /// An input slot, numbered by `SlotId::slot`.
    Sensor(u16),
    /// An output slot, numbered by `SlotId::slot`.
    Actuator(u16),
}

#[cfg(test)]
mod tests {
    use super::*;
    use scada_registry::InMemoryRegistry;

    fn mapping(address: u16, register_type: RegisterType) -> RegisterMapping {
        RegisterMapping {
            address,
            register_type,
            data_type: modbus_core::DataType::Uint16,
            source: SourceKind::PidSetpoint,
            rtu_station: None,
            slot: None,
            pid_name: Some("loop1".into()),
            modbus_client: None,
            description: String::new(),
            enabled: true,
            raw_min: 0.0,
            raw_max: 1.0,
            eng_min: 0.0,
            eng_max: 1.0,
            offset: 0.0,
        }
    }

    #[test]
    fn duplicate_address_in_same_space_is_rejected() {
        let mut map = RegisterMap::new();
        map.insert(mapping(100, RegisterType::Holding)).unwrap();
        assert!(map.insert(mapping(100, RegisterType::Holding)).is_err());
    }

    #[test]
    fn same_address_in_different_spaces_is_allowed() {
        let mut map = RegisterMap::new();
        map.insert(mapping(100, RegisterType::Holding)).unwrap();
        assert!(map.insert(mapping(100, RegisterType::Coil)).is_ok());
    }

    #[test]
    fn holding_and_input_at_same_address_coexist_and_lookup_independently() {
        let mut map = RegisterMap::new();
        map.insert(mapping(100, RegisterType::Holding)).unwrap();
        map.insert(mapping(100, RegisterType::Input)).unwrap();
        assert_eq!(map.lookup(RegisterType::Holding, 100).unwrap().register_type, RegisterType::Holding);
        assert_eq!(map.lookup(RegisterType::Input, 100).unwrap().register_type, RegisterType::Input);
    }

    #[test]
    fn coil_and_discrete_input_at_same_address_coexist_and_lookup_independently() {
        let mut map = RegisterMap::new();
        map.insert(mapping(5, RegisterType::Coil)).unwrap();
        map.insert(mapping(5, RegisterType::DiscreteInput)).unwrap();
        assert_eq!(map.lookup(RegisterType::Coil, 5).unwrap().register_type, RegisterType::Coil);
        assert_eq!(map.lookup(RegisterType::DiscreteInput, 5).unwrap().register_type, RegisterType::DiscreteInput);
    }

    #[test]
    fn lookup_for_wrong_type_at_mapped_address_returns_none() {
        let mut map = RegisterMap::new();
        map.insert(mapping(100, RegisterType::Holding)).unwrap();
        assert!(map.lookup(RegisterType::Input, 100).is_none());
    }

    #[test]
    fn capacity_doubles_once_exhausted() {
        let mut map = RegisterMap::new();
        map.register_capacity = 2;
        map.registers = Vec::with_capacity(2);
        for i in 0..3u16 {
            map.insert(mapping(i, RegisterType::Holding)).unwrap();
        }
        assert_eq!(map.register_capacity, 4);
    }

    #[test]
    fn auto_generate_emits_sensor_and_actuator_entries() {
        let registry = InMemoryRegistry::new();
        let slots = vec![(
            "rtu-tank-1".to_string(),
            vec![DeviceSlotKind::Sensor(1), DeviceSlotKind::Actuator(9)],
        )];
        let map = RegisterMap::auto_generate(&registry, &slots, 100, 200).unwrap();
        assert_eq!(map.lookup(RegisterType::Input, 100).unwrap().source, SourceKind::ProfinetSensor);
        assert_eq!(map.lookup(RegisterType::Holding, 200).unwrap().source, SourceKind::ProfinetActuator);
        assert!(map.lookup(RegisterType::Coil, 0).is_some());
    }
}
