#![warn(missing_docs)]

//! Shared locking, error, config and logging primitives used by every crate
//! in the SCADA core: the PROFINET AR lifecycle engine, the cyclic exchange
//! engine, and the Modbus gateway.

pub mod backoff;
pub mod config;
pub mod error;

pub use error::{ScadaError, ScadaResult};

/// Debugging utility helpers.
pub mod debug {
    use log::log_enabled;

    /// Prints out the content of a slice in hex and visible char format, at
    /// `trace` level under the `hex` target. Used to dump PNIO-CM PDUs and
    /// Modbus ADUs when diagnosing protocol errors.
    pub fn log_buffer(message: &str, buf: &[u8]) {
        if !log_enabled!(target: "hex", log::Level::Trace) {
            return;
        }

        let line_len = 32;
        let len = buf.len();
        let last_line_padding = if len % line_len == 0 {
            0
        } else {
            line_len - (len % line_len)
        };

        log::trace!(target: "hex", "{}", message);

        let mut char_line = String::new();
        let mut hex_line = format!("{:08x}:", 0);

        for (i, b) in buf.iter().enumerate() {
            if i > 0 && i % line_len == 0 {
                log::trace!(target: "hex", "{} {}", hex_line, char_line);
                hex_line = format!("{:08x}:", i);
                char_line.clear();
            }
            hex_line = format!("{} {:02x}", hex_line, b);
            char_line.push(if (32..=126).contains(b) {
                *b as char
                } else {
                    '.'
            });
        }
        if !char_line.is_empty() {
            for _ in 0..last_line_padding {
                hex_line.push_str(" ");
            }
            log::trace!(target: "hex", "{} {}", hex_line, char_line);
        }
    }
}

/// Tracing macro for obtaining a read lock on a `parking_lot::RwLock`.
#[macro_export]
macro_rules! trace_read_lock {
    ( $x:expr ) => {{
        $x.read()
    }};
}

/// Tracing macro for obtaining a write lock on a `parking_lot::RwLock`.
#[macro_export]
macro_rules! trace_write_lock {
    ( $x:expr ) => {{
        $x.write()
    }};
}

/// Tracing macro for obtaining a lock on a `parking_lot::Mutex`.
#[macro_export]
macro_rules! trace_lock {
    ( $x:expr ) => {{
        $x.lock()
    }};
}

/// Common synchronous locks. Re-exports locks from `parking_lot` used
/// internally so every crate in the workspace agrees on one lock flavor.
pub mod sync {
    /// Read-write lock. Use this if you usually only need to read the value.
    pub type RwLock<T> = parking_lot::RwLock<T>;
    /// Mutually exclusive lock. Use this if you need both read and write often.
    pub type Mutex<T> = parking_lot::Mutex<T>;
}

/// Milliseconds since an arbitrary but monotonic epoch, used for all
/// watchdog and activity timestamps in the core (`last_activity_ms`,
/// `last_error_ms`,...). Backed by `Instant` so it is immune to wall-clock
/// adjustments.
pub mod clock {
    use std::sync::OnceLock;
    use std::time::Instant;

    fn epoch() -> Instant {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        *EPOCH.get_or_init(Instant::now)
    }

    /// Milliseconds elapsed since the process-wide monotonic epoch.
    pub fn now_ms() -> u64 {
        epoch().elapsed().as_millis() as u64
    }
}
