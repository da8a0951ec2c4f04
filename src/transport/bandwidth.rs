use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// bandwidth value that disables shaping
pub const UNLIMITED: u64 = 0;

/// A software traffic shaper for a single stream of sends.
///
/// Before each send, [BandwidthManager::throttle] blocks the calling thread until the previous
///  buffer has 'drained' at the configured rate. If the OS sleeps longer than requested, the
///  difference is carried over and added to the next wait.
#[derive(Debug)]
pub struct BandwidthManager {
    bits_per_second: u64,
    last_call: Option<Instant>,
    last_bits: u64,
    overshoot: Duration,
}

impl BandwidthManager {
    pub fn new(bits_per_second: u64) -> BandwidthManager {
        BandwidthManager {
            bits_per_second,
            last_call: None,
            last_bits: 0,
            overshoot: Duration::ZERO,
        }
    }

    pub fn bits_per_second(&self) -> u64 {
        self.bits_per_second
    }

    pub fn set_bits_per_second(&mut self, bits_per_second: u64) {
        self.bits_per_second = bits_per_second;
    }

    pub fn is_unlimited(&self) -> bool {
        self.bits_per_second == UNLIMITED
    }

    /// Waits as long as the previous buffer requires at the configured rate, and registers
    ///  a buffer of `buffer_len` bytes for the next call. Returns the time actually slept.
    pub fn throttle(&mut self, buffer_len: usize) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }

        let mut slept = Duration::ZERO;
        if let Some(last_call) = self.last_call {
            let required = Duration::from_secs_f64(self.last_bits as f64 / self.bits_per_second as f64) + self.overshoot;
            let elapsed = last_call.elapsed();

            if required > elapsed {
                let requested = required - elapsed;
                let sleep_start = Instant::now();
                thread::sleep(requested);
                slept = sleep_start.elapsed();
                self.overshoot = slept.saturating_sub(requested);
                trace!("throttled for {:?} (requested {:?})", slept, requested);
            }
            else {
                self.overshoot = Duration::ZERO;
            }
        }

        self.last_bits = buffer_len as u64 * 8;
        self.last_call = Some(Instant::now());
        slept
    }
}
