//! Per-transport counters exposed on the telemetry surface.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one Modbus transport endpoint (a TCP server or an RTU
/// line). All fields are independently atomic; a snapshot is not a
/// single consistent point in time, which matches how the gateway reads
/// them for telemetry.
#[derive(Debug, Default)]
pub struct TransportStats {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    exceptions: AtomicU64,
    timeouts: AtomicU64,
    crc_errors: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// Plain-data snapshot of [`TransportStats`] for telemetry reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    /// Requests received while acting as a server.
    pub requests_received: u64,
    /// Responses sent while acting as a server.
    pub responses_sent: u64,
    /// Requests sent while acting as a client.
    pub requests_sent: u64,
    /// Responses received while acting as a client.
    pub responses_received: u64,
    /// Exception responses sent or received.
    pub exceptions: u64,
    /// Requests that timed out waiting for a response.
    pub timeouts: u64,
    /// RTU frames dropped for a bad CRC.
    pub crc_errors: u64,
    /// Total bytes written to the wire.
    pub bytes_sent: u64,
    /// Total bytes read from the wire.
    pub bytes_received: u64,
}

macro_rules! counter_ops {
    ($($field:ident => $inc:ident),* $(,)?) => {
        impl TransportStats {
            $(
                /// Increment this counter by one.
                pub fn $inc(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter_ops!(
    requests_received => inc_requests_received,
    responses_sent => inc_responses_sent,
    requests_sent => inc_requests_sent,
    responses_received => inc_responses_received,
    exceptions => inc_exceptions,
    timeouts => inc_timeouts,
    crc_errors => inc_crc_errors,
);

impl TransportStats {
    /// Add `n` bytes to the sent counter.
    pub fn add_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Add `n` bytes to the received counter.
    pub fn add_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting.
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            exceptions: self.exceptions.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = TransportStats::default();
        stats.inc_requests_received();
        stats.inc_requests_received();
        stats.inc_crc_errors();
        stats.add_bytes_received(12);
        let snap = stats.snapshot();
        assert_eq!(snap.requests_received, 2);
        assert_eq!(snap.crc_errors, 1);
        assert_eq!(snap.bytes_received, 12);
    }
}
