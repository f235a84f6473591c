//! embedded-datalog - Acquisition Pipeline
//!
//! A periodic timer interrupt raises the pending-sample flag; the
//! foreground loop drains it, reads the sensor and the cycle counter, and
//! forwards the sample to the append log. The interrupt context does
//! nothing else - every busy-wait and every byte of card I/O stays in the
//! foreground.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::applog::{AppendLog, LogError};
use crate::volume::Volume;

/// The single hand-off point between the timer interrupt and the
/// foreground loop: a one-slot, overwrite-on-miss signal.
///
/// The interrupt only ever stores `true`; the foreground only ever reads
/// and then stores `false`. A single-word flag keeps both accesses
/// indivisible with respect to the other context, so no lock is needed.
/// Ticks that land while the flag is already raised coalesce into one -
/// a missed tick is simply not observed, never queued or double-counted.
/// This is a documented precision limit of the pipeline, not a defect.
pub struct SampleFlag {
    pending: AtomicBool,
}

impl SampleFlag {
    /// A lowered flag. `const` so the cell can live in a `static`.
    pub const fn new() -> Self {
        SampleFlag {
            pending: AtomicBool::new(false),
        }
    }

    /// Raise the flag. The only operation the timer interrupt performs.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Foreground read-and-clear. Returns whether a tick was pending.
    pub fn take(&self) -> bool {
        if self.pending.load(Ordering::Acquire) {
            self.pending.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Lower the flag without sampling, e.g. on a mode transition.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// The measurement source, e.g. an ADC channel.
pub trait Sensor {
    /// Take one reading.
    fn sample(&mut self) -> u16;
}

/// A monotonic cycle counter used to timestamp records.
pub trait CycleCounter {
    /// The current count.
    fn now(&self) -> u32;
}

/// The foreground half of the pipeline: drains the flag and appends one
/// record per observed tick.
pub struct Sampler<'f, S, C>
where
    S: Sensor,
    C: CycleCounter,
{
    flag: &'f SampleFlag,
    sensor: S,
    counter: C,
}

impl<'f, S, C> Sampler<'f, S, C>
where
    S: Sensor,
    C: CycleCounter,
{
    pub fn new(flag: &'f SampleFlag, sensor: S, counter: C) -> Self {
        Sampler {
            flag,
            sensor,
            counter,
        }
    }

    /// The flag cell, for wiring the timer interrupt.
    pub fn flag(&self) -> &'f SampleFlag {
        self.flag
    }

    /// One drain step. Must be called often enough from the foreground
    /// loop that at most one tick accumulates between calls; see
    /// [`SampleFlag`] for the coalescing rule when it is not.
    ///
    /// Returns whether a record was appended.
    pub fn poll<V>(&mut self, log: &mut AppendLog<V>) -> Result<bool, LogError>
    where
        V: Volume,
    {
        if !self.flag.take() {
            return Ok(false);
        }

        let value = self.sensor.sample();
        let cycle_count = self.counter.now();
        log.write_record(cycle_count, value)?;
        Ok(true)
    }
}
