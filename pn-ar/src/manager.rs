//! Owns the AR set and the session-key allocator behind a single lock.

use std::collections::HashMap;

use log::{debug, warn};
use pn_types::{ArUuid, DeviceIp, DeviceMac, Slot, StationName};
use scada_core::sync::Mutex;
use scada_core::{ScadaError, ScadaResult};

use crate::ar::Ar;
use crate::connect_policy::ResilientConnectPolicy;

/// Hard cap on the number of ARs a single manager will hold.
pub const MAX_ARS: usize = 64;

struct ManagedAr {
    ar: Ar,
    policy: ResilientConnectPolicy,
}

struct Inner {
    ars: HashMap<ArUuid, ManagedAr>,
    next_session_key: u16,
}

/// Owns every AR the controller is managing. The per-AR `state` field may
/// be read without this lock by the cyclic send thread, under the rule that
/// transitions out of `RUN` only ever happen on the AR housekeeping thread.
pub struct ArManager {
    inner: Mutex<Inner>,
}

impl ArManager {
    /// An empty manager with a fresh session-key allocator.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ars: HashMap::new(),
                next_session_key: 1,
            }),
        }
    }

    /// Create a new AR in state `INIT` for the given device profile. Fails with `Full` at [`MAX_ARS`], or `AlreadyExists`
    /// if this station name already has an AR.
    pub fn create_ar(
        &self,
        device_mac: DeviceMac,
        device_ip: DeviceIp,
        station_name: StationName,
        slots: Vec<Slot>,
        watchdog_ms: u64,
        now_ms: u64,
    ) -> ScadaResult<ArUuid> {
        let mut inner = self.inner.lock();
        if inner.ars.len() >= MAX_ARS {
            return Err(ScadaError::Full(format!(
                "AR manager at capacity ({MAX_ARS} ARs)"
            )));
        }
        if inner
            .ars
            .values()
            .any(|m| m.ar.station_name == station_name)
        {
            return Err(ScadaError::AlreadyExists(format!(
                "AR already exists for station '{}'",
                station_name
            )));
        }

        let session_key = inner.next_session_key;
        inner.next_session_key = inner.next_session_key.wrapping_add(1).max(1);

        let ar_uuid = ArUuid::generate();
        let ar = Ar::new(
            ar_uuid,
            session_key,
            device_mac,
            device_ip,
            station_name,
            slots,
            watchdog_ms,
            now_ms,
        );
        inner.ars.insert(
            ar_uuid,
            ManagedAr {
                ar,
                policy: ResilientConnectPolicy::new(),
            },
        );
        debug!("AR {ar_uuid} created with session_key={session_key}");
        Ok(ar_uuid)
    }

    /// Tear down an AR and its IOCR buffers.
    pub fn delete_ar(&self, ar_uuid: ArUuid) -> ScadaResult<()> {
        let mut inner = self.inner.lock();
        inner
            .ars
            .remove(&ar_uuid)
            .map(|_| ())
            .ok_or_else(|| ScadaError::NotFound(format!("no AR {ar_uuid}")))
    }

    /// Run `f` with mutable access to the named AR and its connect policy.
    pub fn with_ar<R>(
        &self,
        ar_uuid: ArUuid,
        f: impl FnOnce(&mut Ar, &mut ResilientConnectPolicy) -> R,
    ) -> ScadaResult<R> {
        let mut inner = self.inner.lock();
        let managed = inner
            .ars
            .get_mut(&ar_uuid)
            .ok_or_else(|| ScadaError::NotFound(format!("no AR {ar_uuid}")))?;
        Ok(f(&mut managed.ar, &mut managed.policy))
    }

    /// Snapshot every AR's UUID and state, for telemetry.
    pub fn snapshot_states(&self) -> Vec<(ArUuid, pn_types::ArState, u32)> {
        let inner = self.inner.lock();
        inner
            .ars
            .values()
            .map(|m| (m.ar.ar_uuid, m.ar.state, m.ar.retry_count))
            .collect()
    }

    /// Run the 100 ms housekeeping tick across every AR: advance
    /// `CONNECT_CNF -> PRMSRV` and evaluate time-driven transitions.
    pub fn housekeeping_tick(&self, now_ms: u64) {
        let mut inner = self.inner.lock();
        for managed in inner.ars.values_mut() {
            managed.ar.advance_to_prmsrv();
            if managed.ar.check_health(now_ms) {
                warn!(
                    "AR {} ({}) transitioned to {:?} on housekeeping tick",
                    managed.ar.ar_uuid, managed.ar.station_name, managed.ar.state
                );
            }
        }
    }

    /// All AR UUIDs currently known, in no particular order.
    pub fn ar_uuids(&self) -> Vec<ArUuid> {
        self.inner.lock().ars.keys().copied().collect()
    }
}

impl Default for ArManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pn_types::ArState;
    use std::net::Ipv4Addr;

    fn manager_with_one_ar() -> (ArManager, ArUuid) {
        let manager = ArManager::new();
        let ar_uuid = manager
            .create_ar(
                DeviceMac::new([2, 0, 0, 0, 0, 1]),
                DeviceIp::new(Ipv4Addr::new(192, 168, 1, 100)),
                StationName::new("rtu-tank-1").unwrap(),
                Vec::new(),
                1000,
                0,
            )
            .unwrap();
        (manager, ar_uuid)
    }

    #[test]
    fn duplicate_station_name_rejected() {
        let (manager, _) = manager_with_one_ar();
        let result = manager.create_ar(
            DeviceMac::new([2, 0, 0, 0, 0, 2]),
            DeviceIp::new(Ipv4Addr::new(192, 168, 1, 101)),
            StationName::new("rtu-tank-1").unwrap(),
            Vec::new(),
            1000,
            0,
        );
        assert!(matches!(result, Err(ScadaError::AlreadyExists(_))));
    }

    #[test]
    fn housekeeping_advances_connect_cnf_to_prmsrv() {
        let (manager, ar_uuid) = manager_with_one_ar();
        manager
            .with_ar(ar_uuid, |ar, _| ar.state = ArState::ConnectCnf)
            .unwrap();
        manager.housekeeping_tick(0);
        manager
            .with_ar(ar_uuid, |ar, _| assert_eq!(ar.state, ArState::PrmSrv))
            .unwrap();
    }

    #[test]
    fn capacity_is_enforced() {
        let manager = ArManager::new();
        for i in 0..MAX_ARS {
            manager
                .create_ar(
                    DeviceMac::new([2, 0, 0, 0, 0, i as u8]),
                    DeviceIp::new(Ipv4Addr::new(192, 168, 1, i as u8)),
                    StationName::new(format!("rtu-{i}")).unwrap(),
                    Vec::new(),
                    1000,
                    0,
                )
                .unwrap();
        }
        let overflow = manager.create_ar(
            DeviceMac::new([2, 0, 0, 0, 1, 0]),
            DeviceIp::new(Ipv4Addr::new(192, 168, 2, 1)),
            StationName::new("one-too-many").unwrap(),
            Vec::new(),
            1000,
            0,
        );
        assert!(matches!(overflow, Err(ScadaError::Full(_))));
    }
}
