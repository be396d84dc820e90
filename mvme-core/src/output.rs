//! Output writers for decoded listfile events.
//!
//! Supports a per-event CSV table and per-channel histograms, both usable
//! directly as [`EventSink`]s.

use crate::calibration::Calibration;
use crate::runlog::RunLog;
use crate::sink::{EventRecord, EventSink};
use crate::timestamp::EventTime;
use crate::types::{ChannelKind, DecodeSummary, FlagKind, CHANNELS_PER_BANK};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// CSV event table writer.
///
/// One row per flushed event:
/// `event,time_stamp,extendedtime,seconds,adc0..adc15,tdc0..tdc15,pileup,overflow`
/// followed by `en0..en15` when a calibration is set. Flags are written as
/// 16-bit channel masks.
pub struct CsvSink<W: Write> {
    writer: BufWriter<W>,
    calibration: Option<Calibration>,
    current: EventRecord,
    events: u64,
    header_written: bool,
}

impl<W: Write> CsvSink<W> {
    /// Creates a new CSV writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            calibration: None,
            current: EventRecord::default(),
            events: 0,
            header_written: false,
        }
    }

    /// Adds calibrated energy columns.
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Number of rows written.
    pub fn events_written(&self) -> u64 {
        self.events
    }

    /// Writes the column header.
    pub fn write_header(&mut self) -> Result<(), OutputError> {
        if self.header_written {
            return Ok(());
        }
        write!(self.writer, "event,time_stamp,extendedtime,seconds")?;
        for prefix in ["adc", "tdc"] {
            for chn in 0..CHANNELS_PER_BANK {
                write!(self.writer, ",{}{}", prefix, chn)?;
            }
        }
        write!(self.writer, ",pileup,overflow")?;
        if self.calibration.is_some() {
            for chn in 0..CHANNELS_PER_BANK {
                write!(self.writer, ",en{}", chn)?;
            }
        }
        writeln!(self.writer)?;
        self.header_written = true;
        Ok(())
    }

    /// Writes a single event row.
    pub fn write_event(&mut self, event: &EventRecord) -> Result<(), OutputError> {
        self.write_header()?;
        write!(
            self.writer,
            "{},{},{},{:.9}",
            self.events, event.time_stamp, event.extended_time, event.seconds
        )?;
        for value in event.amplitude.iter().chain(event.time.iter()) {
            write!(self.writer, ",{}", value)?;
        }
        write!(
            self.writer,
            ",{},{}",
            event.pileup_mask(),
            event.overflow_mask()
        )?;
        if let Some(calibration) = &self.calibration {
            for (chn, &value) in event.amplitude.iter().enumerate() {
                write!(self.writer, ",{:.3}", calibration.energy(chn, value))?;
            }
        }
        writeln!(self.writer)?;
        self.events += 1;
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> EventSink for CsvSink<W> {
    fn init_event(&mut self) {
        self.current = EventRecord::default();
    }

    fn set_channel_value(&mut self, kind: ChannelKind, channel: u8, value: u16) {
        self.current.set_channel_value(kind, channel, value);
    }

    fn set_flag(&mut self, flag: FlagKind, channel: u8, set: bool) {
        self.current.set_flag(flag, channel, set);
    }

    fn set_time(&mut self, low_timestamp: u32) {
        self.current.time_stamp = low_timestamp;
    }

    fn set_extended_time(&mut self, value: u32) {
        self.current.extended_time = value;
    }

    fn flush_event(&mut self, time: &EventTime) -> Result<(), OutputError> {
        self.current.apply_time(time);
        let event = self.current;
        self.write_event(&event)
    }

    fn finalize(&mut self, _summary: &DecodeSummary) -> Result<(), OutputError> {
        self.write_header()?;
        self.flush()
    }
}

/// Number of bins of a full-range 16-bit histogram.
pub const HISTOGRAM_BINS: usize = 16 * 4096;

/// Fixed-width histogram with one bin per 16-bit value.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    counts: Vec<u64>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: vec![0; HISTOGRAM_BINS],
        }
    }
}

impl Histogram {
    #[inline]
    pub fn fill(&mut self, value: u16) {
        self.counts[value as usize] += 1;
    }

    #[inline]
    pub fn count(&self, bin: u16) -> u64 {
        self.counts[bin as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Iterates `(bin, count)` over bins with at least one entry.
    pub fn non_empty(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(bin, &count)| (bin, count))
    }
}

/// Per-channel amplitude and time histograms.
#[derive(Debug, Clone)]
pub struct HistogramSink {
    amplitude: Vec<Histogram>,
    time: Vec<Histogram>,
    calibration: Calibration,
}

impl Default for HistogramSink {
    fn default() -> Self {
        Self::new(Calibration::identity())
    }
}

impl HistogramSink {
    /// Creates empty histograms; `calibration` gives the energy axis.
    pub fn new(calibration: Calibration) -> Self {
        Self {
            amplitude: vec![Histogram::default(); CHANNELS_PER_BANK],
            time: vec![Histogram::default(); CHANNELS_PER_BANK],
            calibration,
        }
    }

    pub fn amplitude(&self, channel: usize) -> &Histogram {
        &self.amplitude[channel % CHANNELS_PER_BANK]
    }

    pub fn time(&self, channel: usize) -> &Histogram {
        &self.time[channel % CHANNELS_PER_BANK]
    }

    /// Writes all non-empty bins as `kind,channel,bin,energy,count`.
    ///
    /// The energy column is the calibrated lower bin edge for amplitude
    /// bins and empty for time bins. Run start/stop are written as leading
    /// `#` comment lines when known.
    pub fn write_csv<W: Write>(
        &self,
        writer: W,
        run_log: Option<&RunLog>,
    ) -> Result<(), OutputError> {
        let mut writer = BufWriter::new(writer);
        if let Some(log) = run_log {
            if let Some(start) = log.start {
                writeln!(writer, "# start_time: {}", start)?;
            }
            if let Some(stop) = log.stop {
                writeln!(writer, "# stop_time: {}", stop)?;
            }
        }
        writeln!(writer, "kind,channel,bin,energy,count")?;
        for (chn, histo) in self.amplitude.iter().enumerate() {
            for (bin, count) in histo.non_empty() {
                let energy = self.calibration.energy(chn, bin as u16);
                writeln!(writer, "adc,{},{},{:.3},{}", chn, bin, energy, count)?;
            }
        }
        for (chn, histo) in self.time.iter().enumerate() {
            for (bin, count) in histo.non_empty() {
                writeln!(writer, "tdc,{},{},,{}", chn, bin, count)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

impl EventSink for HistogramSink {
    fn init_event(&mut self) {}

    fn set_channel_value(&mut self, kind: ChannelKind, channel: u8, value: u16) {
        let idx = channel as usize % CHANNELS_PER_BANK;
        match kind {
            ChannelKind::Amplitude => self.amplitude[idx].fill(value),
            ChannelKind::Time => self.time[idx].fill(value),
        }
    }

    fn set_flag(&mut self, _flag: FlagKind, _channel: u8, _set: bool) {}

    fn set_time(&mut self, _low_timestamp: u32) {}

    fn set_extended_time(&mut self, _value: u32) {}

    fn flush_event(&mut self, _time: &EventTime) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Writes events to a CSV file.
pub fn write_csv<P: AsRef<Path>>(
    path: P,
    events: &[EventRecord],
    calibration: Option<Calibration>,
) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = CsvSink::new(file);
    if let Some(calibration) = calibration {
        writer = writer.with_calibration(calibration);
    }
    writer.write_header()?;
    for event in events {
        writer.write_event(event)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes histograms to a CSV file.
pub fn write_histograms<P: AsRef<Path>>(
    path: P,
    histograms: &HistogramSink,
    run_log: Option<&RunLog>,
) -> Result<(), OutputError> {
    let file = File::create(path)?;
    histograms.write_csv(file, run_log)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EventRecord {
        let mut event = EventRecord::default();
        event.set_channel_value(ChannelKind::Amplitude, 3, 1000);
        event.set_channel_value(ChannelKind::Time, 3, 250);
        event.set_flag(FlagKind::Pileup, 3, true);
        event.apply_time(&EventTime::new(12345, 1));
        event
    }

    #[test]
    fn test_csv_writer() {
        let mut output = Vec::new();
        {
            let mut writer = CsvSink::new(&mut output);
            writer.write_event(&sample_event()).unwrap();
            writer.flush().unwrap();
        }

        let output_str = String::from_utf8(output).unwrap();
        let mut lines = output_str.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("event,time_stamp,extendedtime,seconds,adc0,"));
        assert!(header.ends_with("tdc15,pileup,overflow"));
        assert_eq!(header.split(',').count(), 4 + 32 + 2);

        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row.len(), 38);
        assert_eq!(row[0], "0");
        assert_eq!(row[1], "12345");
        assert_eq!(row[2], "1");
        assert_eq!(row[4 + 3], "1000");
        assert_eq!(row[4 + 16 + 3], "250");
        assert_eq!(row[36], "8");
        assert_eq!(row[37], "0");
    }

    #[test]
    fn test_csv_energy_columns() {
        let mut output = Vec::new();
        {
            let calibration = Calibration::from_min_max(&[(0.0, 6553.6), (50.0, 65586.0)]);
            let mut writer = CsvSink::new(&mut output).with_calibration(calibration);
            writer.write_event(&sample_event()).unwrap();
            writer.flush().unwrap();
        }
        let output_str = String::from_utf8(output).unwrap();
        let row: Vec<&str> = output_str.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(row.len(), 38 + 16);
        assert_eq!(row[38], "0.000");
        assert_eq!(row[38 + 1], "50.000");
        // channel 3 has no pair: identity
        assert_eq!(row[38 + 3], "1000.000");
    }

    #[test]
    fn test_csv_sink_header_without_events() {
        let mut output = Vec::new();
        {
            let mut sink = CsvSink::new(&mut output);
            sink.finalize(&DecodeSummary::default()).unwrap();
        }
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_histogram_sink() {
        let calibration = Calibration::from_min_max(&[(10.0, 10.0 + 2.0 * 65536.0)]);
        let mut sink = HistogramSink::new(calibration);
        sink.set_channel_value(ChannelKind::Amplitude, 0, 5);
        sink.set_channel_value(ChannelKind::Amplitude, 0, 5);
        sink.set_channel_value(ChannelKind::Time, 15, 9);
        assert_eq!(sink.amplitude(0).count(5), 2);
        assert_eq!(sink.time(15).total(), 1);

        let mut output = Vec::new();
        let log = RunLog::default();
        sink.write_csv(&mut output, Some(&log)).unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["kind,channel,bin,energy,count", "adc,0,5,20.000,2", "tdc,15,9,,1"]
        );
    }

    #[test]
    fn test_histogram_run_log_header() {
        let log = RunLog::parse(std::io::Cursor::new(
            "readout starting on 2019-03-14T15:09:26\nreadout stopped on 2019-03-14T15:19:27\n",
        ))
        .unwrap();
        let mut output = Vec::new();
        HistogramSink::default().write_csv(&mut output, Some(&log)).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(
            text,
            "# start_time: 2019-03-14 15:09:26\n# stop_time: 2019-03-14 15:19:27\nkind,channel,bin,energy,count\n"
        );
    }
}
