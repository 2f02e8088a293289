//! Wires the AR manager, cyclic exchange, and Modbus gateway into one
//! running controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::info;
use modbus_gateway::{DeviceSlotKind, DownstreamSlave, Gateway, RegisterMap};
use modbus_transport::{ModbusRequestHandler, RtuServer, TcpServer};
use pn_ar::{ArManager, DiscoveryHandle, NoopDiscoveryHandle};
use pn_cyclic::FrameIndex;
use pn_types::{ArState, ArUuid, Slot, SlotDirection};
use scada_core::clock::now_ms;
use scada_core::ScadaResult;
use scada_registry::Registry;

use crate::config::ScadaConfig;
use crate::cyclic_io::CyclicIo;
use crate::rpc_io::RpcIo;

/// A fully running controller: AR lifecycle, cyclic exchange, and Modbus
/// gateway, each on its own thread.
pub struct Controller {
    ar_manager: Arc<ArManager>,
    registry: Arc<dyn Registry>,
    gateway: Arc<Gateway>,
    rpc_io: Option<RpcIo>,
    cyclic_io: Option<CyclicIo>,
    tcp_server: Option<TcpServer>,
    rtu_servers: Vec<RtuServer>,
    housekeeping: Option<JoinHandle<()>>,
    gateway_tick: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

fn classify_slots(slots: &[Slot]) -> Vec<DeviceSlotKind> {
    slots
        .iter()
        .filter(|s| !s.is_acyclic())
        .map(|s| match s.direction {
            SlotDirection::Input => DeviceSlotKind::Sensor(s.id.slot),
            SlotDirection::Output => DeviceSlotKind::Actuator(s.id.slot),
        })
        .collect()
}

impl Controller {
    /// Bring up every subsystem described by `config`, driving `registry`,
    /// with no discovery collaborator (re-identify requests always report
    /// "no answer").
    pub fn start(config: &ScadaConfig, registry: Arc<dyn Registry>) -> ScadaResult<Self> {
        Self::start_with_discovery(config, registry, Arc::new(NoopDiscoveryHandle))
    }

    /// Bring up every subsystem described by `config`, driving `registry`,
    /// calling into `discovery` whenever the AR manager needs to re-resolve
    /// a device's IP after a full resilient-connect ladder round fails.
    pub fn start_with_discovery(
        config: &ScadaConfig,
        registry: Arc<dyn Registry>,
        discovery: Arc<dyn DiscoveryHandle>,
    ) -> ScadaResult<Self> {
        let ar_manager = Arc::new(ArManager::new());
        let frame_index = Arc::new(FrameIndex::new());
        let now = now_ms();

        let mut device_slots = Vec::new();
        for device in &config.devices {
            let slots: Vec<Slot> = device.slots.iter().map(Slot::from).collect();
            registry.register_device(device.station_name.clone())?;
            ar_manager.create_ar(
                device.mac,
                device.ip,
                device.station_name.clone(),
                slots.clone(),
                device.watchdog_ms,
                now,
            )?;
            device_slots.push((device.station_name.as_str().to_string(), classify_slots(&slots)));
        }

        let register_map = if config.register_map.auto_generate {
            RegisterMap::auto_generate(
                registry.as_ref(),
                &device_slots,
                config.register_map.sensor_base,
                config.register_map.actuator_base,
            )?
        } else {
            let path = config
                .register_map
                .path
                .as_ref()
                .ok_or_else(|| scada_core::ScadaError::InvalidParam("register_map.path required when auto_generate is false".into()))?;
            RegisterMap::load_from_json(path)?
        };

        let gateway = Arc::new(Gateway::new(
            register_map,
            registry.clone(),
            config.register_map.unmapped_policy.into(),
        ));

        for downstream in &config.downstream {
            gateway.add_downstream(DownstreamSlave::new(downstream.into()));
        }

        let handler: Arc<dyn ModbusRequestHandler> = gateway.clone();

        let tcp_server = match &config.modbus_tcp {
            Some(tcp_config) => Some(TcpServer::start(tcp_config.into(), handler.clone())?),
            None => None,
        };

        let mut rtu_servers = Vec::new();
        for rtu_config in &config.modbus_rtu {
            rtu_servers.push(RtuServer::start(rtu_config.into(), handler.clone())?);
        }

        let rpc_io = Some(RpcIo::start_with_discovery(ar_manager.clone(), frame_index.clone(), discovery)?);
        let cyclic_io = Some(CyclicIo::start(
            &config.controller.interface,
            config.controller.mac,
            ar_manager.clone(),
            frame_index.clone(),
            registry.clone(),
            Duration::from_millis(config.cyclic_interval_ms),
        )?);

        let running = Arc::new(AtomicBool::new(true));

        let housekeeping = {
            let running = running.clone();
            let ar_manager = ar_manager.clone();
            let interval = Duration::from_millis(config.housekeeping_interval_ms);
            std::thread::Builder::new()
                .name("ar-housekeeping".to_string())
                .spawn(move || {
                    while running.load(Ordering::Relaxed) {
                        ar_manager.housekeeping_tick(now_ms());
                        std::thread::sleep(interval);
                    }
                })?
        };

        let gateway_tick = {
            let running = running.clone();
            let gateway = gateway.clone();
            let interval = Duration::from_millis(config.gateway_tick_interval_ms);
            std::thread::Builder::new()
                .name("gateway-tick".to_string())
                .spawn(move || {
                    while running.load(Ordering::Relaxed) {
                        gateway.tick_downstream();
                        std::thread::sleep(interval);
                    }
                })?
        };

        info!("controller started: {} device(s)", config.devices.len());

        Ok(Controller {
            ar_manager,
            registry,
            gateway,
            rpc_io,
            cyclic_io,
            tcp_server,
            rtu_servers,
            housekeeping: Some(housekeeping),
            gateway_tick: Some(gateway_tick),
            running,
        })
    }

    /// Snapshot of every managed AR's state and retry count.
    pub fn ar_states(&self) -> Vec<(ArUuid, ArState, u32)> {
        self.ar_manager.snapshot_states()
    }

    /// Gateway request/error totals.
    pub fn gateway_stats(&self) -> (u64, u64) {
        self.gateway.stats()
    }

    /// The registry backing this controller, for callers that want to
    /// drive a simulator alongside live cyclic exchange, or inspect
    /// current values directly.
    pub fn registry(&self) -> Arc<dyn Registry> {
        self.registry.clone()
    }

    /// Tear down every subsystem, in reverse startup order. Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(join) = self.gateway_tick.take() {
            let _ = join.join();
        }
        if let Some(join) = self.housekeeping.take() {
            let _ = join.join();
        }
        self.cyclic_io.take();
        self.rpc_io.take();
        self.rtu_servers.clear();
        self.tcp_server.take();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}
