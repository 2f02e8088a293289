#![warn(missing_docs)]

//! The shared sensor/actuator registry. ARs,
//! the simulator, and the Modbus gateway all consume this through the
//! [`Registry`] trait; the core process owns the concrete store and every
//! other collaborator holds a non-owning handle to it.

use std::collections::HashMap;

use pn_types::{ActuatorOutput, SensorReading, SlotId, StationName};
use scada_core::sync::RwLock;
use scada_core::{ScadaError, ScadaResult};

/// Coarse online/offline state for a configured device, independent of the
/// PROFINET AR state machine (the registry has no PROFINET dependency;
/// the simulator drives the same trait without ever creating an AR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is producing fresh cyclic data.
    Online,
    /// Device is not currently reachable.
    Offline,
}

/// The registry interface consumed by the cyclic exchange engine, the
/// simulator, and the Modbus gateway.
pub trait Registry: Send + Sync {
    /// Register a device so it appears in [`list_devices`](Self::list_devices),
    /// with all slots starting disconnected.
    fn register_device(&self, station: StationName) -> ScadaResult<()>;

    /// Remove a device and every sensor/actuator value keyed to it.
    fn remove_device(&self, station: &StationName) -> ScadaResult<()>;

    /// Current sensor reading for `(station, slot)`. Returns
    /// [`SensorReading::disconnected`] if the slot has never been written,
    /// or `NotFound` if `station` was never registered.
    fn get_sensor(&self, station: &StationName, slot: SlotId) -> ScadaResult<SensorReading>;

    /// Current commanded actuator output for `(station, slot)`. Returns
    /// [`ActuatorOutput::off`] if never written, or `NotFound` if `station`
    /// was never registered.
    fn get_actuator(&self, station: &StationName, slot: SlotId) -> ScadaResult<ActuatorOutput>;

    /// Overwrite the sensor reading for `(station, slot)`.
    fn update_sensor(&self, station: &StationName, slot: SlotId, reading: SensorReading) -> ScadaResult<()>;

    /// Overwrite the commanded actuator output for `(station, slot)`.
    fn update_actuator(&self, station: &StationName, slot: SlotId, output: ActuatorOutput) -> ScadaResult<()>;

    /// Record a device's coarse online/offline state.
    fn set_device_state(&self, station: &StationName, state: DeviceState) -> ScadaResult<()>;

    /// Every registered device's station name.
    fn list_devices(&self) -> Vec<StationName>;

    /// A registered device's coarse state, or `NotFound`.
    fn device_state(&self, station: &StationName) -> ScadaResult<DeviceState>;
}

#[derive(Default)]
struct State {
    sensors: HashMap<(StationName, SlotId), SensorReading>,
    actuators: HashMap<(StationName, SlotId), ActuatorOutput>,
    devices: HashMap<StationName, DeviceState>,
}

/// An in-memory [`Registry`], guarded by a single `RwLock`.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: RwLock<State>,
}

impl InMemoryRegistry {
    /// An empty registry with no devices registered.
    pub fn new() -> Self {
        Self::default()
    }

    fn require_known(state: &State, station: &StationName) -> ScadaResult<()> {
        if state.devices.contains_key(station) {
            Ok(())
        } else {
            Err(ScadaError::NotFound(format!("unknown device '{station}'")))
        }
    }
}

impl Registry for InMemoryRegistry {
    fn register_device(&self, station: StationName) -> ScadaResult<()> {
        let mut state = self.state.write();
        state.devices.insert(station, DeviceState::Offline);
        Ok(())
    }

    fn remove_device(&self, station: &StationName) -> ScadaResult<()> {
        let mut state = self.state.write();
        state.devices.remove(station);
        state.sensors.retain(|(s, _), _| s != station);
        state.actuators.retain(|(s, _), _| s != station);
        Ok(())
    }

    fn get_sensor(&self, station: &StationName, slot: SlotId) -> ScadaResult<SensorReading> {
        let state = self.state.read();
        Self::require_known(&state, station)?;
        Ok(state
            .sensors
            .get(&(station.clone(), slot))
            .copied()
            .unwrap_or_else(SensorReading::disconnected))
    }

    fn get_actuator(&self, station: &StationName, slot: SlotId) -> ScadaResult<ActuatorOutput> {
        let state = self.state.read();
        Self::require_known(&state, station)?;
        Ok(state
            .actuators
            .get(&(station.clone(), slot))
            .copied()
            .unwrap_or_else(ActuatorOutput::off))
    }

    fn update_sensor(&self, station: &StationName, slot: SlotId, reading: SensorReading) -> ScadaResult<()> {
        let mut state = self.state.write();
        Self::require_known(&state, station)?;
        state.sensors.insert((station.clone(), slot), reading);
        Ok(())
    }

    fn update_actuator(&self, station: &StationName, slot: SlotId, output: ActuatorOutput) -> ScadaResult<()> {
        let mut state = self.state.write();
        Self::require_known(&state, station)?;
        state.actuators.insert((station.clone(), slot), output);
        Ok(())
    }

    fn set_device_state(&self, station: &StationName, device_state: DeviceState) -> ScadaResult<()> {
        let mut state = self.state.write();
        Self::require_known(&state, station)?;
        state.devices.insert(station.clone(), device_state);
        Ok(())
    }

    fn list_devices(&self) -> Vec<StationName> {
        self.state.read().devices.keys().cloned().collect()
    }

    fn device_state(&self, station: &StationName) -> ScadaResult<DeviceState> {
        let state = self.state.read();
        state
            .devices
            .get(station)
            .copied()
            .ok_or_else(|| ScadaError::NotFound(format!("unknown device '{station}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pn_types::{ActuatorCommand, DataQuality};

    fn station(name: &str) -> StationName {
        StationName::new(name).unwrap()
    }

    #[test]
    fn unregistered_device_is_not_found() {
        let registry = InMemoryRegistry::new();
        let err = registry.get_sensor(&station("ghost"), SlotId::new(1, 1));
        assert!(matches!(err, Err(ScadaError::NotFound(_))));
    }

    #[test]
    fn unset_slot_reports_disconnected() {
        let registry = InMemoryRegistry::new();
        registry.register_device(station("rtu-tank-1")).unwrap();
        let reading = registry
            .get_sensor(&station("rtu-tank-1"), SlotId::new(1, 1))
            .unwrap();
        assert_eq!(reading.quality, DataQuality::NOT_CONNECTED);
    }

    #[test]
    fn update_then_get_round_trips() {
        let registry = InMemoryRegistry::new();
        let name = station("rtu-tank-1");
        registry.register_device(name.clone()).unwrap();
        let reading = SensorReading {
            value: 7.0,
            quality: DataQuality::GOOD,
            iops: 0x80,
        };
        registry.update_sensor(&name, SlotId::new(1, 1), reading).unwrap();
        assert_eq!(registry.get_sensor(&name, SlotId::new(1, 1)).unwrap(), reading);

        let output = ActuatorOutput {
            command: ActuatorCommand::On,
            pwm_duty: 100,
        };
        registry.update_actuator(&name, SlotId::new(9, 1), output).unwrap();
        assert_eq!(registry.get_actuator(&name, SlotId::new(9, 1)).unwrap(), output);
    }

    #[test]
    fn remove_device_clears_its_values() {
        let registry = InMemoryRegistry::new();
        let name = station("rtu-tank-1");
        registry.register_device(name.clone()).unwrap();
        registry
            .update_sensor(
                &name,
                SlotId::new(1, 1),
                SensorReading {
                    value: 1.0,
                    quality: DataQuality::GOOD,
                    iops: 0x80,
                },
            )
            .unwrap();
        registry.remove_device(&name).unwrap();
        assert!(registry.get_sensor(&name, SlotId::new(1, 1)).is_err());
        assert!(!registry.list_devices().contains(&name));
    }
}
