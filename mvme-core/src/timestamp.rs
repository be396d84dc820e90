//! Extension of the 30-bit on-wire event timestamp into logical run time.
//!
//! MDPP modules stamp each event with the low 30 bits of a 16 MHz counter,
//! which wraps every 2^30 / 16 MHz = 67.108864 s. The high-order time comes
//! from one of two sources per file: either it is inferred by counting
//! wraparounds (a timestamp smaller than the previous one), or the module
//! sends explicit extended-timestamp words. Once an explicit word has been
//! seen, wraparound inference stays off for the rest of the file.

/// Frequency of the module timestamp counter.
pub const CLOCK_HZ: f64 = 16_000_000.0;

/// Width of the on-wire timestamp.
pub const LOW_TIMESTAMP_BITS: u32 = 30;

/// Wall-clock span of one full cycle of the low timestamp counter.
pub const WRAP_PERIOD_SECONDS: f64 = (1u64 << LOW_TIMESTAMP_BITS) as f64 / CLOCK_HZ;

/// Resolved time of one event.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventTime {
    /// On-wire 30-bit timestamp.
    pub low: u32,
    /// High-order time: wraparound count or the last explicit fragment.
    pub extended: u32,
    /// Seconds since the counter started.
    pub seconds: f64,
}

impl EventTime {
    pub fn new(low: u32, extended: u32) -> Self {
        Self {
            low,
            extended,
            seconds: extended as f64 * WRAP_PERIOD_SECONDS + low as f64 / CLOCK_HZ,
        }
    }
}

/// Per-file timestamp extension state.
#[derive(Debug, Clone, Default)]
pub struct TimestampAccumulator {
    last_low_timestamp: u32,
    extended_ticks: u32,
    extension_enabled: bool,
}

impl TimestampAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the low timestamp that ended an event and returns its
    /// resolved time.
    pub fn on_end_of_event(&mut self, low_timestamp: u32) -> EventTime {
        if low_timestamp < self.last_low_timestamp && !self.extension_enabled {
            self.extended_ticks = self.extended_ticks.wrapping_add(1);
        }
        self.last_low_timestamp = low_timestamp;
        EventTime::new(low_timestamp, self.extended_ticks)
    }

    /// Records an explicit high-order time word.
    ///
    /// The value replaces the inferred wraparound count and disables
    /// inference for the remainder of the file.
    pub fn on_extended_fragment(&mut self, value: u16) {
        self.extension_enabled = true;
        self.extended_ticks = value as u32;
    }

    /// Combines a low timestamp with the current high-order time.
    ///
    /// Events without an end-of-event word resolve with `low = 0`.
    pub fn resolve(&self, low_timestamp: u32) -> EventTime {
        EventTime::new(low_timestamp, self.extended_ticks)
    }

    #[inline]
    pub fn last_low_timestamp(&self) -> u32 {
        self.last_low_timestamp
    }

    #[inline]
    pub fn extended_ticks(&self) -> u32 {
        self.extended_ticks
    }

    #[inline]
    pub fn extension_enabled(&self) -> bool {
        self.extension_enabled
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
