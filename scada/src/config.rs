//! YAML configuration surface for the controller binary.

use std::collections::HashSet;
use std::time::Duration;

use modbus_gateway::UnmappedPolicy;
use modbus_transport::{RtuParity, RtuServerConfig, TcpServerConfig};
use pn_types::{DeviceIp, DeviceMac, Slot, SlotDirection, SlotId, StationName};
use scada_core::config::Config;
use serde::{Deserialize, Serialize};

/// Top-level controller configuration, loaded from a single YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScadaConfig {
    /// Controller-side network identity.
    pub controller: ControllerNetConfig,
    /// PROFINET devices to manage ARs for.
    pub devices: Vec<DeviceConfig>,
    /// Modbus TCP server, if enabled.
    #[serde(default)]
    pub modbus_tcp: Option<ModbusTcpConfig>,
    /// Modbus RTU serial lines to serve, zero or more.
    #[serde(default)]
    pub modbus_rtu: Vec<ModbusRtuConfig>,
    /// Downstream Modbus TCP slaves to poll.
    #[serde(default)]
    pub downstream: Vec<DownstreamClientConfig>,
    /// Register map source and generation parameters.
    pub register_map: RegisterMapConfig,
    /// Cyclic send/receive period, in milliseconds.
    #[serde(default = "default_cyclic_interval_ms")]
    pub cyclic_interval_ms: u64,
    /// AR housekeeping tick period, in milliseconds.
    #[serde(default = "default_housekeeping_interval_ms")]
    pub housekeeping_interval_ms: u64,
    /// Downstream poller tick period, in milliseconds.
    #[serde(default = "default_gateway_tick_interval_ms")]
    pub gateway_tick_interval_ms: u64,
}

fn default_cyclic_interval_ms() -> u64 {
    4
}

fn default_housekeeping_interval_ms() -> u64 {
    100
}

fn default_gateway_tick_interval_ms() -> u64 {
    100
}

/// Controller-side network identity for the cyclic exchange and RPC
/// engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerNetConfig {
    /// Ethernet interface name used for raw cyclic frames, e.g. `"eth0"`.
    pub interface: String,
    /// Controller's own MAC address on that interface.
    pub mac: DeviceMac,
}

/// One PROFINET device the controller maintains an AR for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Station name as configured (before any resilient-connect
    /// variation is applied on the wire).
    pub station_name: StationName,
    /// Device MAC, from commissioning or discovery.
    pub mac: DeviceMac,
    /// Device IP, from commissioning or discovery.
    pub ip: DeviceIp,
    /// Slot/submodule layout, including the DAP.
    pub slots: Vec<SlotConfig>,
    /// Watchdog timeout in milliseconds for this AR's RUN state.
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: u64,
}

fn default_watchdog_ms() -> u64 {
    300
}

/// One slot entry, mirroring [`pn_types::slot::Slot`] with serde derives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Slot number.
    pub slot: u16,
    /// Subslot number.
    pub subslot: u16,
    /// Module ident number.
    pub module_ident: u32,
    /// Submodule ident number.
    pub submodule_ident: u32,
    /// Cyclic data length in bytes; zero marks an acyclic slot (e.g. DAP).
    pub data_length: u16,
    /// Input or output, from the controller's perspective.
    pub direction: SlotDirectionConfig,
    /// Free-form type tag, carried through for diagnostics.
    #[serde(default)]
    pub type_tag: String,
}

/// Serializable mirror of [`SlotDirection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotDirectionConfig {
    /// Controller reads from the device.
    Input,
    /// Controller writes to the device.
    Output,
}

impl From<SlotDirectionConfig> for SlotDirection {
    fn from(value: SlotDirectionConfig) -> Self {
        match value {
            SlotDirectionConfig::Input => SlotDirection::Input,
            SlotDirectionConfig::Output => SlotDirection::Output,
        }
    }
}

impl From<&SlotConfig> for Slot {
    fn from(value: &SlotConfig) -> Self {
        Slot {
            id: SlotId::new(value.slot, value.subslot),
            module_ident: value.module_ident,
            submodule_ident: value.submodule_ident,
            data_length: value.data_length,
            direction: value.direction.into(),
            type_tag: value.type_tag.clone(),
        }
    }
}

/// Modbus TCP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusTcpConfig {
    /// Address to bind, e.g. `"0.0.0.0"`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port; standard Modbus port is 502.
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// Maximum concurrent clients, hard-capped by the transport itself.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_modbus_port() -> u16 {
    502
}

fn default_max_connections() -> usize {
    16
}

impl From<&ModbusTcpConfig> for TcpServerConfig {
    fn from(value: &ModbusTcpConfig) -> Self {
        TcpServerConfig {
            bind_address: value.bind_address.clone(),
            port: value.port,
            max_connections: value.max_connections,
        }
    }
}

/// Modbus RTU serial line configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusRtuConfig {
    /// OS device path, e.g. `/dev/ttyUSB0`.
    pub device_path: String,
    /// Baud rate.
    pub baud: u32,
    /// Parity setting.
    #[serde(default)]
    pub parity: ModbusParityConfig,
    /// Number of stop bits, 1 or 2.
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// This server's slave address.
    pub slave_addr: u8,
}

fn default_stop_bits() -> u8 {
    1
}

/// Serializable mirror of [`RtuParity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModbusParityConfig {
    /// No parity bit (8N1).
    #[default]
    None,
    /// Even parity (8E1).
    Even,
    /// Odd parity (8O1).
    Odd,
}

impl From<&ModbusRtuConfig> for RtuServerConfig {
    fn from(value: &ModbusRtuConfig) -> Self {
        RtuServerConfig {
            device_path: value.device_path.clone(),
            baud: value.baud,
            parity: match value.parity {
                ModbusParityConfig::None => RtuParity::None,
                ModbusParityConfig::Even => RtuParity::Even,
                ModbusParityConfig::Odd => RtuParity::Odd,
            },
            stop_bits: value.stop_bits,
            slave_addr: value.slave_addr,
        }
    }
}

/// Downstream Modbus TCP slave to poll into the register map's
/// `MODBUS_CLIENT` sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamClientConfig {
    /// Name used from `MODBUS_CLIENT` mappings.
    pub name: String,
    /// `host:port` to connect to.
    pub address: String,
    /// Unit id to address on the remote.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// First holding register address to poll.
    pub start_addr: u16,
    /// Number of holding registers to poll.
    pub quantity: u16,
    /// Polling period, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Whether this client currently participates in polling.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_unit_id() -> u8 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_enabled() -> bool {
    true
}

impl From<&DownstreamClientConfig> for modbus_gateway::DownstreamConfig {
    fn from(value: &DownstreamClientConfig) -> Self {
        modbus_gateway::DownstreamConfig {
            name: value.name.clone(),
            address: value.address.clone(),
            unit_id: value.unit_id,
            start_addr: value.start_addr,
            quantity: value.quantity,
            poll_interval: Duration::from_millis(value.poll_interval_ms),
            enabled: value.enabled,
        }
    }
}

/// Register map source: either loaded verbatim from a JSON file, or
/// synthesized from the configured devices' sensor/actuator slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMapConfig {
    /// When true, build the map from `devices` instead of loading
    /// `path`.
    #[serde(default)]
    pub auto_generate: bool,
    /// JSON file path, used when `auto_generate` is false, or as the
    /// save target after generation.
    #[serde(default)]
    pub path: Option<String>,
    /// First Input-space address used for auto-generated sensor entries.
    #[serde(default = "default_sensor_base")]
    pub sensor_base: u16,
    /// First Holding-space address used for auto-generated actuator
    /// entries.
    #[serde(default = "default_actuator_base")]
    pub actuator_base: u16,
    /// Behavior for addresses inside a valid range but not mapped to
    /// anything.
    #[serde(default)]
    pub unmapped_policy: UnmappedPolicyConfig,
}

fn default_sensor_base() -> u16 {
    0
}

fn default_actuator_base() -> u16 {
    1000
}

/// Serializable mirror of [`UnmappedPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnmappedPolicyConfig {
    /// A hole in the range reads as zero.
    #[default]
    Lenient,
    /// Any hole raises `ILLEGAL_DATA_ADDRESS`.
    Strict,
}

impl From<UnmappedPolicyConfig> for UnmappedPolicy {
    fn from(value: UnmappedPolicyConfig) -> Self {
        match value {
            UnmappedPolicyConfig::Lenient => UnmappedPolicy::Lenient,
            UnmappedPolicyConfig::Strict => UnmappedPolicy::Strict,
        }
    }
}

impl Config for ScadaConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.devices.is_empty() {
            errors.push("at least one device must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.station_name.as_str().to_string()) {
                errors.push(format!("duplicate station name '{}'", device.station_name));
            }
        }

        if self.modbus_tcp.is_none() && self.modbus_rtu.is_empty() {
            errors.push("at least one Modbus TCP or RTU server must be configured".to_string());
        }

        if self.register_map.auto_generate && self.register_map.path.is_none() {
            // A missing path only prevents persistence, not generation;
            // the register map is still usable in memory for this run.
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ScadaConfig {
        ScadaConfig {
            controller: ControllerNetConfig {
                interface: "eth0".to_string(),
                mac: DeviceMac::new([0x02, 0, 0, 0, 0, 0xFF]),
            },
            devices: vec![DeviceConfig {
                station_name: StationName::new("rtu-tank-1").unwrap(),
                mac: DeviceMac::new([0x02, 0, 0, 0, 0, 1]),
                ip: DeviceIp::new(std::net::Ipv4Addr::new(192, 168, 1, 100)),
                slots: vec![SlotConfig {
                    slot: 1,
                    subslot: 1,
                    module_ident: 1,
                    submodule_ident: 1,
                    data_length: 5,
                    direction: SlotDirectionConfig::Input,
                    type_tag: "level-sensor".to_string(),
                }],
                watchdog_ms: 300,
            }],
            modbus_tcp: Some(ModbusTcpConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 502,
                max_connections: 16,
            }),
            modbus_rtu: Vec::new(),
            downstream: Vec::new(),
            register_map: RegisterMapConfig {
                auto_generate: true,
                path: None,
                sensor_base: 0,
                actuator_base: 1000,
                unmapped_policy: UnmappedPolicyConfig::Lenient,
            },
            cyclic_interval_ms: 4,
            housekeeping_interval_ms: 100,
            gateway_tick_interval_ms: 100,
        }
    }

    #[test]
    fn valid_config_has_no_errors() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn empty_devices_is_rejected() {
        let mut config = sample_config();
        config.devices.clear();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("at least one device")));
    }

    #[test]
    fn duplicate_station_names_are_rejected() {
        let mut config = sample_config();
        config.devices.push(config.devices[0].clone());
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("duplicate station name")));
    }

    #[test]
    fn no_modbus_server_is_rejected() {
        let mut config = sample_config();
        config.modbus_tcp = None;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("TCP or RTU")));
    }
}
