//! Event sink contract between the decoder and its consumers.
//!
//! For every event section the decoder calls, in this order:
//! [`EventSink::init_event`], zero or more field setters, then
//! [`EventSink::flush_event`] exactly once. Events never overlap. After the
//! End section [`EventSink::finalize`] receives the decode summary.

use crate::output::OutputError;
use crate::timestamp::EventTime;
use crate::types::{ChannelKind, DecodeSummary, FlagKind, CHANNELS_PER_BANK};

/// Receiver of decoded per-event field values.
pub trait EventSink {
    /// Starts a new event with all fields zeroed.
    fn init_event(&mut self);

    /// Sets the value of `channel` (0-15) in bank `kind`.
    fn set_channel_value(&mut self, kind: ChannelKind, channel: u8, value: u16);

    /// Sets a status flag of `channel` (0-15).
    fn set_flag(&mut self, flag: FlagKind, channel: u8, set: bool);

    /// Sets the on-wire 30-bit timestamp of the event.
    fn set_time(&mut self, low_timestamp: u32);

    /// Sets the explicit high-order time sent by the module.
    fn set_extended_time(&mut self, value: u32);

    /// Completes the current event with its resolved time.
    fn flush_event(&mut self, time: &EventTime) -> Result<(), OutputError>;

    /// Called once per timetick section (once per second of acquisition).
    fn on_timetick(&mut self, _index: u64) -> Result<(), OutputError> {
        Ok(())
    }

    /// Called once after the End section.
    fn finalize(&mut self, _summary: &DecodeSummary) -> Result<(), OutputError> {
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn init_event(&mut self) {
        (**self).init_event()
    }

    fn set_channel_value(&mut self, kind: ChannelKind, channel: u8, value: u16) {
        (**self).set_channel_value(kind, channel, value)
    }

    fn set_flag(&mut self, flag: FlagKind, channel: u8, set: bool) {
        (**self).set_flag(flag, channel, set)
    }

    fn set_time(&mut self, low_timestamp: u32) {
        (**self).set_time(low_timestamp)
    }

    fn set_extended_time(&mut self, value: u32) {
        (**self).set_extended_time(value)
    }

    fn flush_event(&mut self, time: &EventTime) -> Result<(), OutputError> {
        (**self).flush_event(time)
    }

    fn on_timetick(&mut self, index: u64) -> Result<(), OutputError> {
        (**self).on_timetick(index)
    }

    fn finalize(&mut self, summary: &DecodeSummary) -> Result<(), OutputError> {
        (**self).finalize(summary)
    }
}

/// Forwards every call to both sinks, first `A` then `B`.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn init_event(&mut self) {
        self.0.init_event();
        self.1.init_event();
    }

    fn set_channel_value(&mut self, kind: ChannelKind, channel: u8, value: u16) {
        self.0.set_channel_value(kind, channel, value);
        self.1.set_channel_value(kind, channel, value);
    }

    fn set_flag(&mut self, flag: FlagKind, channel: u8, set: bool) {
        self.0.set_flag(flag, channel, set);
        self.1.set_flag(flag, channel, set);
    }

    fn set_time(&mut self, low_timestamp: u32) {
        self.0.set_time(low_timestamp);
        self.1.set_time(low_timestamp);
    }

    fn set_extended_time(&mut self, value: u32) {
        self.0.set_extended_time(value);
        self.1.set_extended_time(value);
    }

    fn flush_event(&mut self, time: &EventTime) -> Result<(), OutputError> {
        self.0.flush_event(time)?;
        self.1.flush_event(time)
    }

    fn on_timetick(&mut self, index: u64) -> Result<(), OutputError> {
        self.0.on_timetick(index)?;
        self.1.on_timetick(index)
    }

    fn finalize(&mut self, summary: &DecodeSummary) -> Result<(), OutputError> {
        self.0.finalize(summary)?;
        self.1.finalize(summary)
    }
}

/// Working record of one MDPP-16 event.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventRecord {
    /// Amplitude (ADC) value per channel.
    pub amplitude: [u16; CHANNELS_PER_BANK],
    /// Time (TDC) value per channel.
    pub time: [u16; CHANNELS_PER_BANK],
    pub pileup: [bool; CHANNELS_PER_BANK],
    pub overflow: [bool; CHANNELS_PER_BANK],
    /// On-wire 30-bit timestamp.
    pub time_stamp: u32,
    /// High-order time resolved at flush.
    pub extended_time: u32,
    /// Seconds since the counter started.
    pub seconds: f64,
}

impl EventRecord {
    #[inline]
    pub fn set_channel_value(&mut self, kind: ChannelKind, channel: u8, value: u16) {
        let idx = channel as usize % CHANNELS_PER_BANK;
        match kind {
            ChannelKind::Amplitude => self.amplitude[idx] = value,
            ChannelKind::Time => self.time[idx] = value,
        }
    }

    #[inline]
    pub fn set_flag(&mut self, flag: FlagKind, channel: u8, set: bool) {
        let idx = channel as usize % CHANNELS_PER_BANK;
        match flag {
            FlagKind::Pileup => self.pileup[idx] = set,
            FlagKind::Overflow => self.overflow[idx] = set,
        }
    }

    /// Copies the resolved time into the record.
    #[inline]
    pub fn apply_time(&mut self, time: &EventTime) {
        self.time_stamp = time.low;
        self.extended_time = time.extended;
        self.seconds = time.seconds;
    }

    /// Pileup flags as a channel bit mask.
    pub fn pileup_mask(&self) -> u16 {
        flags_to_mask(&self.pileup)
    }

    /// Overflow flags as a channel bit mask.
    pub fn overflow_mask(&self) -> u16 {
        flags_to_mask(&self.overflow)
    }
}

fn flags_to_mask(flags: &[bool; CHANNELS_PER_BANK]) -> u16 {
    flags
        .iter()
        .enumerate()
        .filter(|&(_, &set)| set)
        .fold(0u16, |mask, (i, _)| mask | (1 << i))
}

/// Sink that keeps every flushed event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<EventRecord>,
    /// Timetick sections seen.
    pub timeticks: u64,
    /// Summary passed to `finalize`.
    pub summary: Option<DecodeSummary>,
    current: Option<EventRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> &mut EventRecord {
        debug_assert!(self.current.is_some(), "field set outside of an event");
        self.current.get_or_insert_with(EventRecord::default)
    }
}

impl EventSink for MemorySink {
    fn init_event(&mut self) {
        debug_assert!(self.current.is_none(), "previous event was not flushed");
        self.current = Some(EventRecord::default());
    }

    fn set_channel_value(&mut self, kind: ChannelKind, channel: u8, value: u16) {
        self.current().set_channel_value(kind, channel, value);
    }

    fn set_flag(&mut self, flag: FlagKind, channel: u8, set: bool) {
        self.current().set_flag(flag, channel, set);
    }

    fn set_time(&mut self, low_timestamp: u32) {
        self.current().time_stamp = low_timestamp;
    }

    fn set_extended_time(&mut self, value: u32) {
        self.current().extended_time = value;
    }

    fn flush_event(&mut self, time: &EventTime) -> Result<(), OutputError> {
        let mut record = self.current.take().unwrap_or_default();
        record.apply_time(time);
        self.events.push(record);
        Ok(())
    }

    fn on_timetick(&mut self, _index: u64) -> Result<(), OutputError> {
        self.timeticks += 1;
        Ok(())
    }

    fn finalize(&mut self, summary: &DecodeSummary) -> Result<(), OutputError> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_banks() {
        let mut record = EventRecord::default();
        record.set_channel_value(ChannelKind::Amplitude, 3, 1000);
        record.set_channel_value(ChannelKind::Time, 3, 77);
        record.set_flag(FlagKind::Pileup, 1, true);
        record.set_flag(FlagKind::Overflow, 15, true);
        assert_eq!(record.amplitude[3], 1000);
        assert_eq!(record.time[3], 77);
        assert_eq!(record.pileup_mask(), 0b10);
        assert_eq!(record.overflow_mask(), 0x8000);
    }

    #[test]
    fn test_memory_sink_sequence() {
        let mut sink = MemorySink::new();
        sink.init_event();
        sink.set_channel_value(ChannelKind::Amplitude, 0, 5);
        sink.set_time(99);
        sink.flush_event(&EventTime::new(99, 0)).unwrap();

        sink.init_event();
        sink.flush_event(&EventTime::new(0, 0)).unwrap();

        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[0].amplitude[0], 5);
        assert_eq!(sink.events[0].time_stamp, 99);
        // second event starts from a zeroed record
        assert_eq!(sink.events[1].amplitude[0], 0);
    }

    #[test]
    fn test_tee_forwards_to_both() {
        let mut a = MemorySink::new();
        let mut b = MemorySink::new();
        {
            let mut tee = (&mut a, &mut b);
            tee.init_event();
            tee.set_channel_value(ChannelKind::Time, 2, 42);
            tee.flush_event(&EventTime::new(1, 0)).unwrap();
            tee.on_timetick(0).unwrap();
        }
        assert_eq!(a.events[0].time[2], 42);
        assert_eq!(b.events[0].time[2], 42);
        assert_eq!(a.timeticks, 1);
        assert_eq!(b.timeticks, 1);
    }
}
