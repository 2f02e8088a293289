//! The AR entity and its lifecycle transitions.

use pn_types::{ArState, ArUuid, DeviceIp, DeviceMac, Slot, StationName};

use crate::iocr::Iocr;

/// How long an AR must sit in ABORT before it is eligible to retry from
/// INIT.
pub const ABORT_RETRY_MS: u64 = 5_000;
/// Deadline for an incoming AppReady once an AR reaches READY.
pub const READY_TIMEOUT_MS: u64 = 30_000;
/// Deadline for a Connect Response once an AR has sent its Connect Request.
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// One Application Relationship.
#[derive(Debug, Clone)]
pub struct Ar {
    /// Generated once, never changes after creation.
    pub ar_uuid: ArUuid,
    /// Monotonic per controller; unique across the AR set while this AR
    /// exists.
    pub session_key: u16,
    /// Device MAC, updated from the discovery record or a Connect Response.
    pub device_mac: DeviceMac,
    /// Device IP, likewise updatable.
    pub device_ip: DeviceIp,
    /// Station name as currently used on the wire (may differ from the
    /// configured name after a resilient-connect name variation).
    pub station_name: StationName,
    /// Current lifecycle state.
    pub state: ArState,
    /// IOCRs negotiated for this AR.
    pub iocrs: Vec<Iocr>,
    /// Snapshot of the configured slot list at AR creation.
    pub slots: Vec<Slot>,
    /// Watchdog timeout in milliseconds.
    pub watchdog_ms: u64,
    /// Timestamp (process-monotonic ms) of the last activity that counts as
    /// a watchdog feed.
    pub last_activity_ms: u64,
    /// Number of connect attempts made since the AR last left INIT.
    pub retry_count: u32,
    /// Consecutive protocol/IO errors since the last success.
    pub consecutive_errors: u32,
    /// Process-monotonic ms before which a new connect attempt must not be
    /// dispatched, as scheduled from the resilient-connect policy's
    /// exponential backoff delay. `0` means no attempt is currently
    /// scheduled (dispatch immediately).
    pub next_attempt_at_ms: u64,
}

impl Ar {
    /// Create a freshly-initialized AR in state `INIT`.
    pub fn new(
        ar_uuid: ArUuid,
        session_key: u16,
        device_mac: DeviceMac,
        device_ip: DeviceIp,
        station_name: StationName,
        slots: Vec<Slot>,
        watchdog_ms: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            ar_uuid,
            session_key,
            device_mac,
            device_ip,
            station_name,
            state: ArState::Init,
            iocrs: Vec::new(),
            slots,
            watchdog_ms,
            last_activity_ms: now_ms,
            retry_count: 0,
            consecutive_errors: 0,
            next_attempt_at_ms: 0,
        }
    }

    /// Record activity, feeding the watchdog.
    pub fn touch_activity(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    /// Schedule the next connect attempt no earlier than `now_ms + delay`,
    /// as computed by the resilient-connect policy's backoff.
    pub fn schedule_next_attempt(&mut self, now_ms: u64, delay: std::time::Duration) {
        self.next_attempt_at_ms = now_ms.saturating_add(delay.as_millis() as u64);
    }

    /// Whether a connect attempt may be dispatched now, i.e. no backoff
    /// delay is still pending.
    pub fn attempt_is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_attempt_at_ms
    }

    /// `INIT -> CONNECT_CNF` on a successful Connect Response.
    /// Caller has already applied the device's assigned frame ids to
    /// `self.iocrs` and updated `self.device_mac`.
    pub fn on_connect_success(&mut self, now_ms: u64) {
        self.state = ArState::ConnectCnf;
        self.touch_activity(now_ms);
    }

    /// `INIT -> ABORT` on connect failure, or any other connect-timeout
    /// path named in the state table.
    pub fn on_connect_failure(&mut self, now_ms: u64) {
        self.retry_count += 1;
        self.consecutive_errors += 1;
        self.state = ArState::Abort;
        self.touch_activity(now_ms);
    }

    /// `CONNECT_CNF -> PRMSRV` on the AR manager's housekeeping tick.
    pub fn advance_to_prmsrv(&mut self) {
        if self.state == ArState::ConnectCnf {
            self.state = ArState::PrmSrv;
        }
    }

    /// `PRMSRV -> READY` on a successful PrmEnd, or `PRMSRV -> ABORT` on
    /// failure.
    pub fn on_prm_end(&mut self, ok: bool, now_ms: u64) {
        if ok {
            self.state = ArState::Ready;
            self.touch_activity(now_ms);
            self.consecutive_errors = 0;
        } else {
            self.state = ArState::Abort;
            self.consecutive_errors += 1;
            self.touch_activity(now_ms);
        }
    }

    /// `READY -> RUN` when an incoming AppReady matches this AR's
    /// `(ar_uuid, session_key)`.
    pub fn on_app_ready(&mut self, ar_uuid: ArUuid, session_key: u16, now_ms: u64) -> bool {
        if self.state == ArState::Ready && self.ar_uuid == ar_uuid && self.session_key == session_key {
            self.state = ArState::Run;
            self.touch_activity(now_ms);
            self.retry_count = 0;
            true
        } else {
            false
        }
    }

    /// Operator-initiated release: `* -> CLOSE`, regardless of current
    /// state.
    pub fn release(&mut self) {
        self.state = ArState::Close;
    }

    /// Evaluate time-driven transitions: READY/CONNECT_REQ timeouts, RUN
    /// watchdog expiry, and ABORT -> INIT recovery. Returns `true` if the
    /// state changed.
    ///
    /// For an AR in RUN, `now - last_activity_ms > watchdog_ms` drives it
    /// to ABORT.
    pub fn check_health(&mut self, now_ms: u64) -> bool {
        let elapsed = now_ms.saturating_sub(self.last_activity_ms);
        match self.state {
            ArState::ConnectReq if elapsed > CONNECT_TIMEOUT_MS => {
                self.state = ArState::Abort;
                self.consecutive_errors += 1;
                self.touch_activity(now_ms);
                true
            }
            ArState::Ready if elapsed > READY_TIMEOUT_MS => {
                self.state = ArState::Abort;
                self.consecutive_errors += 1;
                self.touch_activity(now_ms);
                true
            }
            ArState::Run if elapsed > self.watchdog_ms => {
                self.state = ArState::Abort;
                self.consecutive_errors += 1;
                self.touch_activity(now_ms);
                true
            }
            ArState::Abort if elapsed >= ABORT_RETRY_MS => {
                self.state = ArState::Init;
                self.touch_activity(now_ms);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pn_types::{DeviceIp, DeviceMac};
    use std::net::Ipv4Addr;

    fn sample_ar() -> Ar {
        Ar::new(
            ArUuid::generate(),
            1,
            DeviceMac::new([0x02, 0, 0, 0, 0, 1]),
            DeviceIp::new(Ipv4Addr::new(192, 168, 1, 100)),
            StationName::new("rtu-tank-1").unwrap(),
            Vec::new(),
            1000,
            0,
        )
    }

    #[test]
    fn run_watchdog_expiry_moves_to_abort() {
        let mut ar = sample_ar();
        ar.state = ArState::Run;
        ar.last_activity_ms = 0;
        assert!(ar.check_health(1001));
        assert_eq!(ar.state, ArState::Abort);
    }

    #[test]
    fn abort_retries_after_exactly_five_seconds() {
        let mut ar = sample_ar();
        ar.state = ArState::Abort;
        ar.last_activity_ms = 1_000;
        assert!(!ar.check_health(1_000 + crate::ar::ABORT_RETRY_MS - 1));
        assert!(ar.check_health(1_000 + crate::ar::ABORT_RETRY_MS));
        assert_eq!(ar.state, ArState::Init);
    }

    #[test]
    fn app_ready_requires_matching_identity() {
        let mut ar = sample_ar();
        ar.state = ArState::Ready;
        let wrong_uuid = ArUuid::generate();
        assert!(!ar.on_app_ready(wrong_uuid, 1, 10));
        assert_eq!(ar.state, ArState::Ready);
        assert!(ar.on_app_ready(ar.ar_uuid, 1, 10));
        assert_eq!(ar.state, ArState::Run);
    }
}
