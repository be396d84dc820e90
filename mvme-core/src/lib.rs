//! Decoder library for mvme VME DAQ listfiles.
//!
//! This crate decodes the binary listfiles written by the mvme data
//! acquisition software. It supports both listfile layouts (version 0
//! without a magic marker and version 1 with the `MVME` marker) and
//! interprets the data words of mesytec MDPP-16 SCP and RCP modules.
//!
//! # Example
//!
//! ```no_run
//! use mvme_core::decoder::ListfileDecoder;
//! use mvme_core::sink::MemorySink;
//!
//! let mut decoder = ListfileDecoder::new();
//! let mut sink = MemorySink::new();
//! let summary = decoder.decode_file("run001.mvmelst", &mut sink).unwrap();
//!
//! println!("Decoded {} events ({})", summary.events, summary.version);
//! println!("First event ADC0: {}", sink.events[0].amplitude[0]);
//! ```
//!
//! # Features
//!
//! - Version detection and per-version header layouts
//! - Skipping of config, timetick and unknown sections
//! - MDPP data word decoding with 30-bit timestamp extension
//! - Pluggable event sinks with CSV and histogram writers
//! - Linear calibration from mvme analysis files and run start/stop times

pub mod calibration;
pub mod decoder;
pub mod module;
pub mod output;
pub mod parser;
pub mod reader;
pub mod runlog;
pub mod section;
pub mod sink;
pub mod timestamp;
pub mod types;

// Re-export commonly used types
pub use calibration::{Calibration, CalibrationError};
pub use decoder::{DecodeError, ListfileDecoder};
pub use output::{CsvSink, HistogramSink, OutputError};
pub use runlog::{RunLog, RunLogError};
pub use sink::{EventRecord, EventSink, MemorySink};
pub use timestamp::{EventTime, TimestampAccumulator};
pub use types::{
    ChannelKind, DecodeSummary, DecodeWarning, FlagKind, ListfileVersion, ModuleObservation,
    ModuleType, SectionType,
};
