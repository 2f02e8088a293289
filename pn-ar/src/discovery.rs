//! Abstract discovery collaborator.

use std::time::Duration;

use pn_types::{DeviceIp, StationName};
use scada_core::ScadaResult;

/// A collaborator that can resolve a station name to its current IP,
/// without this core implementing DCP itself.
pub trait DiscoveryHandle: Send + Sync {
    /// Attempt to resolve `station_name` to its current device IP. `Ok(None)`
    /// means the device did not respond within the collaborator's own
    /// timeout; this is not an error.
    fn identify(&self, station_name: &StationName) -> ScadaResult<Option<DeviceIp>>;

    /// How long the AR manager should wait for [`identify`](Self::identify)
    /// before treating it as "no answer": the resilient-connect policy
    /// waits this plus 200 ms.
    fn timeout(&self) -> Duration;
}

/// No-op discovery: always reports "no answer". Used when no discovery
/// collaborator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiscoveryHandle;

impl DiscoveryHandle for NoopDiscoveryHandle {
    fn identify(&self, _station_name: &StationName) -> ScadaResult<Option<DeviceIp>> {
        Ok(None)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(0)
    }
}

/// The delay the AR manager waits after issuing an identify request before
/// giving up and proceeding with the stored IP.
pub fn identify_wait(handle: &dyn DiscoveryHandle) -> Duration {
    handle.timeout() + Duration::from_millis(200)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_handle_reports_no_answer() {
        let handle = NoopDiscoveryHandle;
        let name = StationName::new("rtu-tank-1").unwrap();
        assert_eq!(handle.identify(&name).unwrap(), None);
        assert_eq!(identify_wait(&handle), Duration::from_millis(200));
    }
}
