//! Rate limiter for bulk SDO reads.
//!
//! [`SdoPollTimer`] runs on the cyclic lane and decides, once per cycle,
//! whether a bulk configuration read is due. [`SdoReadTrigger`] carries
//! that decision to the administrative lane without blocking: the cycle
//! sets a latch, the service lane takes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Accumulating poll timer.
///
/// Time is kept in whole microseconds so repeated additions of the
/// cycle period never drift.
#[derive(Debug, Clone)]
pub struct SdoPollTimer {
    accumulated_us: u64,
    cycle_us: u64,
}

impl SdoPollTimer {
    pub const fn new(cycle_us: u64) -> Self {
        Self {
            accumulated_us: 0,
            cycle_us,
        }
    }

    /// Advance one cycle against `threshold_sec`.
    ///
    /// The accumulated time is compared before the current period is
    /// added. Returns `true` when it has reached the threshold, resetting
    /// the accumulator to zero; otherwise adds one period and returns
    /// `false`. A NaN threshold never fires; a negative one fires every cycle.
    #[inline]
    pub fn tick(&mut self, threshold_sec: f64) -> bool {
        if !threshold_sec.is_nan() && self.accumulated_us >= threshold_us(threshold_sec) {
            self.accumulated_us = 0;
            true
        } else {
            self.accumulated_us = self.accumulated_us.saturating_add(self.cycle_us);
            false
        }
    }

    /// Time accumulated since the last firing [µs].
    #[inline]
    pub const fn accumulated_us(&self) -> u64 {
        self.accumulated_us
    }

    #[inline]
    pub const fn cycle_us(&self) -> u64 {
        self.cycle_us
    }

    pub fn reset(&mut self) {
        self.accumulated_us = 0;
    }
}

/// Products closer than this to a whole microsecond are conversion noise.
const THRESHOLD_SNAP_US: f64 = 1e-6;

/// Smallest whole-microsecond count that reaches `threshold_sec`, so the
/// timer never fires early. Saturates at 0 and `u64::MAX`.
#[inline]
fn threshold_us(threshold_sec: f64) -> u64 {
    let us = threshold_sec * 1e6;
    let nearest = us.round();
    let whole = if (us - nearest).abs() < THRESHOLD_SNAP_US {
        nearest
    } else {
        us.ceil()
    };
    whole.max(0.0) as u64
}

/// Latching, single-slot trigger between the cyclic and service lanes.
///
/// Firing while a previous trigger is still pending coalesces into one.
#[derive(Debug, Clone, Default)]
pub struct SdoReadTrigger {
    inner: Arc<TriggerState>,
}

#[derive(Debug, Default)]
struct TriggerState {
    pending: AtomicBool,
    fired: AtomicU64,
}

impl SdoReadTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Never blocks.
    #[inline]
    pub fn fire(&self) {
        self.inner.pending.store(true, Ordering::Release);
        self.inner.fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Clear the latch, returning whether it was set.
    #[inline]
    pub fn take(&self) -> bool {
        self.inner.pending.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Times fired since creation.
    pub fn fired(&self) -> u64 {
        self.inner.fired.load(Ordering::Relaxed)
    }
}
