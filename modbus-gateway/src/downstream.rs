//! Downstream Modbus client polling and caching.

use std::time::{Duration, Instant};

use log::warn;
use modbus_transport::ModbusTcpClient;
use scada_core::ScadaResult;

/// Consecutive poll failures before a downstream client is marked
/// offline.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Minimum delay before attempting to reconnect a disconnected client.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Static configuration for one downstream slave.
#[derive(Debug, Clone)]
pub struct DownstreamConfig {
    /// Name used to address this client from `MODBUS_CLIENT` mappings.
    pub name: String,
    /// `host:port` to connect to.
    pub address: String,
    /// Unit id to address on the remote.
    pub unit_id: u8,
    /// First holding register address to poll.
    pub start_addr: u16,
    /// Number of holding registers to poll.
    pub quantity: u16,
    /// Polling period.
    pub poll_interval: Duration,
    /// Whether this client currently participates in polling.
    pub enabled: bool,
}

/// Runtime state and cache for one downstream slave.
pub struct DownstreamSlave {
    config: DownstreamConfig,
    client: Option<ModbusTcpClient>,
    cache: Vec<u16>,
    online: bool,
    consecutive_errors: u32,
    last_poll: Option<Instant>,
    last_error: Option<Instant>,
}

impl DownstreamSlave {
    /// A slave with an empty cache, starting disconnected.
    pub fn new(config: DownstreamConfig) -> Self {
        let cache = vec![0u16; config.quantity as usize];
        DownstreamSlave {
            config,
            client: None,
            cache,
            online: false,
            consecutive_errors: 0,
            last_poll: None,
            last_error: None,
        }
    }

    /// This slave's configured name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the slave is currently considered reachable.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Cached register value at `address`, relative to `start_addr`, or
    /// zero if out of range or never successfully polled.
    pub fn cached(&self, address: u16) -> u16 {
        if address < self.config.start_addr {
            return 0;
        }
        let offset = (address - self.config.start_addr) as usize;
        self.cache.get(offset).copied().unwrap_or(0)
    }

    /// Drive one gateway tick: reconnect if due, poll if due.
    pub fn tick(&mut self) {
        if !self.config.enabled {
            return;
        }

        if self.client.is_none() {
            let due = self
                .last_error
                .map(|t| t.elapsed() >= RECONNECT_DELAY)
                .unwrap_or(true);
            if due {
                self.try_connect();
            }
            return;
        }

        let due = self
            .last_poll
            .map(|t| t.elapsed() >= self.config.poll_interval)
            .unwrap_or(true);
        if due {
            self.poll_once();
        }
    }

    fn try_connect(&mut self) {
        match ModbusTcpClient::connect(
            self.config.address.as_str(),
            self.config.unit_id,
            Duration::from_secs(2),
            Duration::from_secs(2),
        ) {
            Ok(client) => {
                self.client = Some(client);
            }
            Err(e) => {
                warn!("downstream '{}' reconnect failed: {e}", self.config.name);
                self.last_error = Some(Instant::now());
            }
        }
    }

    fn poll_once(&mut self) {
        self.last_poll = Some(Instant::now());
        let result = self.read_holding_registers();
        match result {
            Ok(values) => {
                self.cache = values;
                self.online = true;
                self.consecutive_errors = 0;
            }
            Err(e) => {
                warn!("downstream '{}' poll failed: {e}", self.config.name);
                self.last_error = Some(Instant::now());
                self.consecutive_errors += 1;
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    self.online = false;
                    self.client = None;
                }
            }
        }
    }

    fn read_holding_registers(&mut self) -> ScadaResult<Vec<u16>> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| scada_core::ScadaError::NotConnected(self.config.name.clone()))?;

        let mut pdu = vec![0x03];
        pdu.extend_from_slice(&self.config.start_addr.to_be_bytes());
        pdu.extend_from_slice(&self.config.quantity.to_be_bytes());

        let response = client.transact(&pdu)?;
        if response.first() == Some(&0x83) {
            return Err(scada_core::ScadaError::protocol("downstream returned exception"));
        }
        if response.len() < 2 {
            return Err(scada_core::ScadaError::protocol("short downstream response"));
        }
        let byte_count = response[1] as usize;
        let regs = response[2..]
            .chunks_exact(2)
            .take(byte_count / 2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        Ok(regs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DownstreamConfig {
        DownstreamConfig {
            name: "plant-a".into(),
            address: "127.0.0.1:1".into(),
            unit_id: 1,
            start_addr: 0,
            quantity: 10,
            poll_interval: Duration::from_millis(100),
            enabled: true,
        }
    }

    #[test]
    fn starts_offline_with_zeroed_cache() {
        let slave = DownstreamSlave::new(config());
        assert!(!slave.is_online());
        assert_eq!(slave.cached(0), 0);
    }

    #[test]
    fn three_consecutive_errors_marks_offline() {
        let mut slave = DownstreamSlave::new(config());
        slave.online = true;
        // No `client` is ever connected, so each `poll_once` fails with
        // `NotConnected` the same way a real unreachable downstream would.
        for n in 1..=MAX_CONSECUTIVE_ERRORS {
            slave.poll_once();
            assert_eq!(slave.consecutive_errors, n);
        }
        assert!(!slave.is_online());
    }

    #[test]
    fn cached_value_out_of_range_is_zero() {
        let mut slave = DownstreamSlave::new(config());
        slave.cache = vec![42, 43];
        assert_eq!(slave.cached(0), 42);
        assert_eq!(slave.cached(99), 0);
    }
}
