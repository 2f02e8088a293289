#![warn(missing_docs)]

//! Simulation mode: drives the same [`Registry`] the cyclic exchange
//! engine writes to, with a synthesized sinusoid+noise+trend signal per
//! sensor.

use std::sync::Arc;

use pn_types::{DataQuality, SensorReading, SlotId, StationName};
use rand::Rng;
use scada_core::ScadaResult;
use scada_registry::{DeviceState, Registry};

/// Alarm band around a sensor's nominal range; readings outside it are
/// marked `UNCERTAIN` rather than `GOOD`.
#[derive(Debug, Clone, Copy)]
pub struct AlarmBand {
    /// Low alarm threshold.
    pub low: f32,
    /// High alarm threshold.
    pub high: f32,
}

/// One simulated sensor's signal parameters.
#[derive(Debug, Clone)]
pub struct SimSensorConfig {
    /// Device this sensor belongs to.
    pub station: StationName,
    /// Slot this sensor is read through.
    pub slot: SlotId,
    /// Signal midpoint.
    pub base: f32,
    /// Sinusoid amplitude around `base`.
    pub amplitude: f32,
    /// Sinusoid period, in seconds.
    pub period_s: f32,
    /// Standard deviation of additive Gaussian-ish noise.
    pub noise_std: f32,
    /// Linear drift applied per second of simulated time.
    pub trend_per_sec: f32,
    /// Optional alarm band; values outside it read back `UNCERTAIN`.
    pub alarm_band: Option<AlarmBand>,
}

/// Drives a registry with synthesized values in place of live cyclic
/// exchange. Interchangeable with it behind the [`Registry`] trait.
pub struct Simulator {
    registry: Arc<dyn Registry>,
    sensors: Vec<SimSensorConfig>,
}

impl Simulator {
    /// Build a simulator over `registry`, registering every configured
    /// sensor's device.
    pub fn new(registry: Arc<dyn Registry>, sensors: Vec<SimSensorConfig>) -> ScadaResult<Self> {
        for sensor in &sensors {
            if registry.device_state(&sensor.station).is_err() {
                registry.register_device(sensor.station.clone())?;
            }
            registry.set_device_state(&sensor.station, DeviceState::Online)?;
        }
        Ok(Simulator { registry, sensors })
    }

    /// Advance all sensors to simulated time `elapsed_s` and write the
    /// results into the registry.
    pub fn tick(&self, elapsed_s: f32) -> ScadaResult<()> {
        let mut rng = rand::thread_rng();
        for sensor in &self.sensors {
            let phase = 2.0 * std::f32::consts::PI * elapsed_s / sensor.period_s.max(0.001);
            let noise: f32 = rng.gen_range(-1.0..1.0) * sensor.noise_std;
            let value = sensor.base
            + sensor.amplitude * phase.sin()
            + sensor.trend_per_sec * elapsed_s
            + noise;

            let quality = match sensor.alarm_band {
                Some(band) if value < band.low || value > band.high => DataQuality::UNCERTAIN,
                _ => DataQuality::GOOD,
            };

            self.registry.update_sensor(
                &sensor.station,
                sensor.slot,
                SensorReading {
                    value,
                    quality,
                    iops: 0x80,
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scada_registry::InMemoryRegistry;

    fn sensor() -> SimSensorConfig {
        SimSensorConfig {
            station: StationName::new("rtu-tank-1").unwrap(),
            slot: SlotId::new(1, 1),
            base: 10.0,
            amplitude: 2.0,
            period_s: 60.0,
            noise_std: 0.0,
            trend_per_sec: 0.0,
            alarm_band: Some(AlarmBand { low: 5.0, high: 15.0 }),
        }
    }

    #[test]
    fn tick_writes_a_reading_near_base_at_t_zero() {
        let registry = Arc::new(InMemoryRegistry::new());
        let sim = Simulator::new(registry.clone(), vec![sensor()]).unwrap();
        sim.tick(0.0).unwrap();
        let reading = registry
            .get_sensor(&StationName::new("rtu-tank-1").unwrap(), SlotId::new(1, 1))
            .unwrap();
        assert!((reading.value - 10.0).abs() < 0.01);
        assert_eq!(reading.quality, DataQuality::GOOD);
    }

    #[test]
    fn value_outside_alarm_band_is_uncertain() {
        let mut cfg = sensor();
        cfg.base = 20.0;
        cfg.amplitude = 0.0;
        let registry = Arc::new(InMemoryRegistry::new());
        let sim = Simulator::new(registry.clone(), vec![cfg]).unwrap();
        sim.tick(0.0).unwrap();
        let reading = registry
            .get_sensor(&StationName::new("rtu-tank-1").unwrap(), SlotId::new(1, 1))
            .unwrap();
        assert_eq!(reading.quality, DataQuality::UNCERTAIN);
    }

    #[test]
    fn device_is_marked_online() {
        let registry = Arc::new(InMemoryRegistry::new());
        let _sim = Simulator::new(registry.clone(), vec![sensor()]).unwrap();
        assert_eq!(
            registry.device_state(&StationName::new("rtu-tank-1").unwrap()).unwrap(),
            DeviceState::Online
        );
    }
}
