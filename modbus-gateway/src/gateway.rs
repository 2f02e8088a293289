//! Function-code dispatch: the seam between a Modbus transport and the
//! register map, registry, and downstream cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;
use modbus_core::{build_exception_pdu, ExceptionCode, FunctionCode};
use modbus_transport::ModbusRequestHandler;
use pn_types::{ActuatorCommand, ActuatorOutput, SlotId, StationName};
use scada_core::sync::{Mutex, RwLock};
use scada_core::ScadaResult;
use scada_registry::Registry;

use crate::downstream::DownstreamSlave;
use crate::mapping::{RegisterMapping, RegisterType, SourceKind};
use crate::register_map::RegisterMap;

/// Whether unmapped addresses inside an otherwise-valid read range raise
/// `ILLEGAL_DATA_ADDRESS` or silently read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// A hole in the range reads as zero, matching the original gateway.
    Lenient,
    /// Any hole raises `ILLEGAL_DATA_ADDRESS`.
    Strict,
}

/// Gateway totals exposed on the telemetry surface.
#[derive(Debug, Default)]
pub struct GatewayStats {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
}

impl GatewayStats {
    /// Snapshot of `(total_requests, total_errors)`.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.total_requests.load(Ordering::Relaxed),
            self.total_errors.load(Ordering::Relaxed),
        )
    }
}

/// The Modbus gateway: register map, registry, downstream slaves, and
/// PID setpoints behind one function-code dispatcher.
pub struct Gateway {
    register_map: Mutex<RegisterMap>,
    registry: Arc<dyn Registry>,
    downstream: Mutex<Vec<DownstreamSlave>>,
    pid_setpoints: RwLock<std::collections::HashMap<String, f64>>,
    stats: GatewayStats,
    unmapped_policy: UnmappedPolicy,
}

impl Gateway {
    /// Build a gateway over an existing register map and registry.
    pub fn new(register_map: RegisterMap, registry: Arc<dyn Registry>, unmapped_policy: UnmappedPolicy) -> Self {
        Gateway {
            register_map: Mutex::new(register_map),
            registry,
            downstream: Mutex::new(Vec::new()),
            pid_setpoints: RwLock::new(std::collections::HashMap::new()),
            stats: GatewayStats::default(),
            unmapped_policy,
        }
    }

    /// Register a downstream slave for polling.
    pub fn add_downstream(&self, slave: DownstreamSlave) {
        self.downstream.lock().push(slave);
    }

    /// Gateway request/error totals.
    pub fn stats(&self) -> (u64, u64) {
        self.stats.snapshot()
    }

    /// Drive the downstream poller.
    /// During the poll the gateway lock is not held: each slave owns its own connection state.
    pub fn tick_downstream(&self) {
        let mut downstream = self.downstream.lock();
        for slave in downstream.iter_mut() {
            slave.tick();
        }
    }

    fn current_setpoint(&self, name: &str) -> f64 {
        self.pid_setpoints.read().get(name).copied().unwrap_or(0.0)
    }

    fn set_setpoint(&self, name: &str, value: f64) {
        self.pid_setpoints.write().insert(name.to_string(), value);
    }

    /// Read one mapping's raw register words, applying scaling from the
    /// configured data source.
    fn read_raw(&self, mapping: &RegisterMapping) -> ScadaResult<f64> {
        let raw = match mapping.source {
            SourceKind::ProfinetSensor => {
                let station = station_of(mapping)?;
                let slot = SlotId::new(mapping.slot.unwrap_or(0), 1);
                self.registry.get_sensor(&station, slot)?.value as f64
            }
            SourceKind::ProfinetActuator => {
                let station = station_of(mapping)?;
                let slot = SlotId::new(mapping.slot.unwrap_or(0), 1);
                let output = self.registry.get_actuator(&station, slot)?;
                match output.command {
                    ActuatorCommand::Off => 0.0,
                    ActuatorCommand::On => 100.0,
                    ActuatorCommand::Pwm => output.pwm_duty as f64,
                }
            }
            SourceKind::PidSetpoint => {
                let name = mapping.pid_name.clone().unwrap_or_default();
                self.current_setpoint(&name)
            }
            SourceKind::ModbusClient => {
                let client_name = mapping.modbus_client.clone().unwrap_or_default();
                let downstream = self.downstream.lock();
                downstream
                    .iter()
                    .find(|s| s.name() == client_name)
                    .map(|s| s.cached(mapping.address) as f64)
                    .unwrap_or(0.0)
            }
        };
        mapping.scale().to_engineering(raw)
    }

    fn write_raw(&self, mapping: &RegisterMapping, eng: f64) -> ScadaResult<()> {
        let raw = mapping.scale().to_raw(eng)?;
        match mapping.source {
            SourceKind::ProfinetActuator => {
                let station = station_of(mapping)?;
                let slot = SlotId::new(mapping.slot.unwrap_or(0), 1);
                let output = if raw > 0.0 {
                    ActuatorOutput {
                        command: ActuatorCommand::On,
                        pwm_duty: raw.clamp(0.0, 100.0) as u8,
                    }
                } else {
                    ActuatorOutput::off()
                };
                self.registry.update_actuator(&station, slot, output)?;
            }
            SourceKind::PidSetpoint => {
                let name = mapping.pid_name.clone().unwrap_or_default();
                self.set_setpoint(&name, raw);
            }
            SourceKind::ModbusClient => {
                warn!("write to MODBUS_CLIENT source '{:?}' not yet forwarded downstream", mapping.modbus_client);
            }
            SourceKind::ProfinetSensor => {
                return Err(scada_core::ScadaError::InvalidParam(
                    "PROFINET_SENSOR mappings are read-only".into(),
                ));
            }
        }
        Ok(())
    }

    fn dispatch(&self, request_pdu: &[u8]) -> Vec<u8> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        let Some(&fc_byte) = request_pdu.first() else {
            self.stats.total_errors.fetch_add(1, Ordering::Relaxed);
            return build_exception_pdu(0, ExceptionCode::IllegalFunction);
        };

        let fc = match FunctionCode::from_u8(fc_byte) {
            Ok(fc) => fc,
            Err(_) => {
                self.stats.total_errors.fetch_add(1, Ordering::Relaxed);
                return build_exception_pdu(fc_byte, ExceptionCode::IllegalFunction);
            }
        };

        let result = match fc {
            FunctionCode::ReadCoils => self.read_bits(request_pdu, RegisterType::Coil),
            FunctionCode::ReadDiscreteInputs => self.read_bits(request_pdu, RegisterType::DiscreteInput),
            FunctionCode::ReadHoldingRegisters => self.read_words(request_pdu, RegisterType::Holding),
            FunctionCode::ReadInputRegisters => self.read_words(request_pdu, RegisterType::Input),
            FunctionCode::WriteSingleCoil => self.write_single_coil(request_pdu),
            FunctionCode::WriteSingleRegister => self.write_single_register(request_pdu),
            FunctionCode::WriteMultipleCoils => self.write_multiple_coils(request_pdu),
            FunctionCode::WriteMultipleRegisters => self.write_multiple_registers(request_pdu),
        };

        match result {
            Ok(pdu) => pdu,
            Err(exc) => {
                self.stats.total_errors.fetch_add(1, Ordering::Relaxed);
                build_exception_pdu(fc_byte, exc)
            }
        }
    }

    fn read_words(&self, pdu: &[u8], register_type: RegisterType) -> Result<Vec<u8>, ExceptionCode> {
        let (start, qty) = parse_addr_qty(pdu)?;
        let fc = if register_type == RegisterType::Holding {
            FunctionCode::ReadHoldingRegisters
        } else {
            FunctionCode::ReadInputRegisters
        };
        if qty == 0 || qty > fc.max_quantity() {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let map = self.register_map.lock();
        let mut regs = Vec::with_capacity(qty as usize);
        for addr in start..start.wrapping_add(qty) {
            match map.lookup(register_type, addr) {
                Some(mapping) => {
                    let eng = self.read_raw(mapping).map_err(|_| ExceptionCode::SlaveDeviceFailure)?;
                    let words = mapping.data_type.encode(eng).map_err(|_| ExceptionCode::SlaveDeviceFailure)?;
                    regs.extend(words.into_iter().take(1));
                }
                None if self.unmapped_policy == UnmappedPolicy::Lenient => regs.push(0),
                None => return Err(ExceptionCode::IllegalDataAddress),
            }
        }

        let mut response = vec![fc.as_u8()];
        response.push((regs.len() * 2) as u8);
        for reg in regs {
            response.extend_from_slice(&reg.to_be_bytes());
        }
        Ok(response)
    }

    fn read_bits(&self, pdu: &[u8], register_type: RegisterType) -> Result<Vec<u8>, ExceptionCode> {
        let (start, qty) = parse_addr_qty(pdu)?;
        let fc = if register_type == RegisterType::Coil {
            FunctionCode::ReadCoils
        } else {
            FunctionCode::ReadDiscreteInputs
        };
        if qty == 0 || qty > fc.max_quantity() {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let map = self.register_map.lock();
        let mut bits = Vec::with_capacity(qty as usize);
        for addr in start..start.wrapping_add(qty) {
            match map.lookup(register_type, addr) {
                Some(mapping) => {
                    let eng = self.read_raw(mapping).map_err(|_| ExceptionCode::SlaveDeviceFailure)?;
                    bits.push(eng != 0.0);
                }
                None if self.unmapped_policy == UnmappedPolicy::Lenient => bits.push(false),
                None => return Err(ExceptionCode::IllegalDataAddress),
            }
        }

        let byte_count = bits.len().div_ceil(8);
        let mut packed = vec![0u8; byte_count];
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                packed[i / 8] |= 1 << (i % 8);
            }
        }

        let mut response = vec![fc.as_u8(), byte_count as u8];
        response.extend(packed);
        Ok(response)
    }

    fn write_single_coil(&self, pdu: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        if pdu.len() < 5 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let address = u16::from_be_bytes([pdu[1], pdu[2]]);
        let raw_value = u16::from_be_bytes([pdu[3], pdu[4]]);
        let on = match raw_value {
            0xFF00 => true,
            0x0000 => false,
            _ => return Err(ExceptionCode::IllegalDataValue),
        };

        let map = self.register_map.lock();
        let mapping = map.lookup(RegisterType::Coil, address).ok_or(ExceptionCode::IllegalDataAddress)?;
        if mapping.register_type.is_read_only() {
            return Err(ExceptionCode::IllegalFunction);
        }
        self.write_raw(mapping, if on { 1.0 } else { 0.0 })
            .map_err(|_| ExceptionCode::SlaveDeviceFailure)?;

        Ok(pdu[..5].to_vec())
    }

    fn write_single_register(&self, pdu: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        if pdu.len() < 5 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let address = u16::from_be_bytes([pdu[1], pdu[2]]);
        let value = u16::from_be_bytes([pdu[3], pdu[4]]);

        let map = self.register_map.lock();
        let mapping = map
            .lookup(RegisterType::Holding, address)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        if mapping.register_type.is_read_only() {
            return Err(ExceptionCode::IllegalFunction);
        }
        let eng = mapping.data_type.decode(&[value]).map_err(|_| ExceptionCode::IllegalDataValue)?;
        self.write_raw(mapping, eng).map_err(|_| ExceptionCode::SlaveDeviceFailure)?;

        Ok(pdu[..5].to_vec())
    }

    fn write_multiple_coils(&self, pdu: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        if pdu.len() < 6 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start = u16::from_be_bytes([pdu[1], pdu[2]]);
        let qty = u16::from_be_bytes([pdu[3], pdu[4]]);
        let byte_count = pdu[5] as usize;
        if qty == 0 || qty > FunctionCode::WriteMultipleCoils.max_quantity() || pdu.len() < 6 + byte_count {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let map = self.register_map.lock();
        for i in 0..qty {
            let addr = start.wrapping_add(i);
            let byte = pdu[6 + (i as usize / 8)];
            let bit = (byte >> (i % 8)) & 1 != 0;
            let mapping = map.lookup(RegisterType::Coil, addr).ok_or(ExceptionCode::IllegalDataAddress)?;
            if mapping.register_type.is_read_only() {
                return Err(ExceptionCode::IllegalFunction);
            }
            self.write_raw(mapping, if bit { 1.0 } else { 0.0 })
                .map_err(|_| ExceptionCode::SlaveDeviceFailure)?;
        }

        Ok(pdu[..5].to_vec())
    }

    fn write_multiple_registers(&self, pdu: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        if pdu.len() < 6 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start = u16::from_be_bytes([pdu[1], pdu[2]]);
        let qty = u16::from_be_bytes([pdu[3], pdu[4]]);
        let byte_count = pdu[5] as usize;
        if qty == 0
        || qty > FunctionCode::WriteMultipleRegisters.max_quantity()
        || byte_count != qty as usize * 2
        || pdu.len() < 6 + byte_count
        {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let map = self.register_map.lock();
        for i in 0..qty as usize {
            let addr = start.wrapping_add(i as u16);
            let value = u16::from_be_bytes([pdu[6 + i * 2], pdu[7 + i * 2]]);
            let mapping = map.lookup(RegisterType::Holding, addr).ok_or(ExceptionCode::IllegalDataAddress)?;
            if mapping.register_type.is_read_only() {
                return Err(ExceptionCode::IllegalFunction);
            }
            let eng = mapping.data_type.decode(&[value]).map_err(|_| ExceptionCode::IllegalDataValue)?;
            self.write_raw(mapping, eng).map_err(|_| ExceptionCode::SlaveDeviceFailure)?;
        }

        Ok(pdu[..5].to_vec())
    }
}

fn station_of(mapping: &RegisterMapping) -> ScadaResult<StationName> {
    let name = mapping.rtu_station.clone().unwrap_or_default();
    StationName::new(name).map_err(|e| scada_core::ScadaError::InvalidParam(e.to_string()))
}

fn parse_addr_qty(pdu: &[u8]) -> Result<(u16, u16), ExceptionCode> {
    if pdu.len() < 5 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let start = u16::from_be_bytes([pdu[1], pdu[2]]);
    let qty = u16::from_be_bytes([pdu[3], pdu[4]]);
    Ok((start, qty))
}

impl ModbusRequestHandler for Gateway {
    fn handle_request(&self, _unit_id: u8, request_pdu: &[u8]) -> Vec<u8> {
        self.dispatch(request_pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scada_registry::InMemoryRegistry;

    fn gateway_with(mapping: RegisterMapping, policy: UnmappedPolicy) -> Gateway {
        let mut map = RegisterMap::new();
        map.insert(mapping).unwrap();
        let registry = Arc::new(InMemoryRegistry::new());
        Gateway::new(map, registry, policy)
    }

    fn sensor_mapping() -> RegisterMapping {
        RegisterMapping {
            address: 100,
            register_type: RegisterType::Holding,
            data_type: modbus_core::DataType::Uint16,
            source: SourceKind::ProfinetSensor,
            rtu_station: Some("rtu-tank-1".into()),
            slot: Some(1),
            pid_name: None,
            modbus_client: None,
            description: String::new(),
            enabled: true,
            raw_min: 0.0,
            raw_max: 14.0,
            eng_min: 0.0,
            eng_max: 14000.0,
            offset: 0.0,
        }
    }

    #[test]
    fn read_through_scales_sensor_value() {
        let gateway = gateway_with(sensor_mapping(), UnmappedPolicy::Lenient);
        gateway
            .registry
            .register_device(StationName::new("rtu-tank-1").unwrap())
            .unwrap();
        gateway
            .registry
            .update_sensor(
                &StationName::new("rtu-tank-1").unwrap(),
                SlotId::new(1, 1),
                pn_types::SensorReading {
                    value: 7.0,
                    quality: pn_types::DataQuality::GOOD,
                    iops: 0x80,
                },
            )
            .unwrap();

        let request = [0x03, 0x00, 0x64, 0x00, 0x01];
        let response = gateway.dispatch(&request);
        assert_eq!(response, vec![0x03, 0x02, 0x1B, 0x58]);
    }

    #[test]
    fn quantity_over_limit_returns_illegal_data_value() {
        let gateway = gateway_with(sensor_mapping(), UnmappedPolicy::Lenient);
        let request = [0x03, 0x00, 0x64, 0x00, 0x7E];
        let response = gateway.dispatch(&request);
        assert_eq!(response, vec![0x83, 0x03]);
    }

    #[test]
    fn strict_policy_raises_illegal_address_for_hole() {
        let gateway = gateway_with(sensor_mapping(), UnmappedPolicy::Strict);
        let request = [0x03, 0x00, 0x00, 0x00, 0x01];
        let response = gateway.dispatch(&request);
        assert_eq!(response, vec![0x83, 0x02]);
    }

    #[test]
    fn lenient_policy_reads_zero_for_hole() {
        let gateway = gateway_with(sensor_mapping(), UnmappedPolicy::Lenient);
        let request = [0x03, 0x00, 0x00, 0x00, 0x01];
        let response = gateway.dispatch(&request);
        assert_eq!(response, vec![0x03, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn write_to_unmapped_address_is_illegal_data_address() {
        let gateway = gateway_with(sensor_mapping(), UnmappedPolicy::Lenient);
        let request = [0x06, 0x00, 0x05, 0x00, 0x32];
        let response = gateway.dispatch(&request);
        assert_eq!(response, vec![0x86, 0x02]);
    }

    #[test]
    fn write_through_turns_actuator_on() {
        let mapping = RegisterMapping {
            address: 200,
            register_type: RegisterType::Holding,
            data_type: modbus_core::DataType::Uint16,
            source: SourceKind::ProfinetActuator,
            rtu_station: Some("rtu-tank-1".into()),
            slot: Some(9),
            pid_name: None,
            modbus_client: None,
            description: String::new(),
            enabled: true,
            raw_min: 0.0,
            raw_max: 100.0,
            eng_min: 0.0,
            eng_max: 100.0,
            offset: 0.0,
        };
        let gateway = gateway_with(mapping, UnmappedPolicy::Lenient);
        gateway
            .registry
            .register_device(StationName::new("rtu-tank-1").unwrap())
            .unwrap();

        let request = [0x06, 0x00, 0xC8, 0x00, 0x32];
        let response = gateway.dispatch(&request);
        assert_eq!(response, request.to_vec());

        let output = gateway
            .registry
            .get_actuator(&StationName::new("rtu-tank-1").unwrap(), SlotId::new(9, 1))
            .unwrap();
        assert_eq!(output.command, ActuatorCommand::On);
        assert_eq!(output.pwm_duty, 50);
    }
}
