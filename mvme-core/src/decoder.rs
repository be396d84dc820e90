//! Stateful mvme listfile decoder.
//!
//! This module drives the top-level section loop: it detects the listfile
//! version, then reads section headers until the End section, dispatching
//! event sections to the [`SectionDecoder`] and forwarding everything
//! decoded to an [`EventSink`].

use crate::output::OutputError;
use crate::parser::{FormatProfile, MAGIC};
use crate::reader::{FrameReader, WORD_SIZE};
use crate::section::SectionDecoder;
use crate::sink::EventSink;
use crate::timestamp::TimestampAccumulator;
use crate::types::{DecodeSummary, DecodeWarning, ListfileVersion, SectionType};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors that abort decoding of the current listfile.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or skip would cross the end of the stream.
    #[error(
        "truncated stream at offset {offset}: needed {needed} bytes, {available} available"
    )]
    TruncatedStream {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// A declared size does not fit the enclosing section.
    #[error("malformed section at offset {offset}: {reason}")]
    MalformedSection { offset: u64, reason: String },

    #[error("event sink failed: {0}")]
    Output(#[from] OutputError),
}

/// Events between two progress lines in the log.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Stateful mvme listfile decoder.
///
/// Holds the per-file timestamp extension state, so one instance decodes one
/// file at a time. Independent files can be decoded in parallel by separate
/// instances.
#[derive(Debug, Default)]
pub struct ListfileDecoder {
    timestamps: TimestampAccumulator,
    version: Option<ListfileVersion>,
}

impl ListfileDecoder {
    /// Creates a new decoder with default state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the decoder state.
    pub fn reset(&mut self) {
        self.timestamps.reset();
        self.version = None;
    }

    /// Version detected by the last decode.
    pub fn version(&self) -> Option<ListfileVersion> {
        self.version
    }

    /// Timestamp extension state after the last decode.
    pub fn timestamps(&self) -> &TimestampAccumulator {
        &self.timestamps
    }

    /// Decodes a listfile from disk.
    pub fn decode_file<P, S>(
        &mut self,
        path: P,
        sink: &mut S,
    ) -> Result<DecodeSummary, DecodeError>
    where
        P: AsRef<Path>,
        S: EventSink + ?Sized,
    {
        let file = File::open(path.as_ref())?;
        self.decode(BufReader::new(file), sink)
    }

    /// Decodes a complete listfile held in memory.
    pub fn decode_buffer<S>(
        &mut self,
        bytes: &[u8],
        sink: &mut S,
    ) -> Result<DecodeSummary, DecodeError>
    where
        S: EventSink + ?Sized,
    {
        self.decode(Cursor::new(bytes), sink)
    }

    /// Decodes a listfile from any seekable stream positioned at its start.
    ///
    /// Returns the summary once the End section has been read. Reaching the
    /// end of the stream before an End section is a `TruncatedStream` error.
    pub fn decode<R, S>(&mut self, stream: R, sink: &mut S) -> Result<DecodeSummary, DecodeError>
    where
        R: Read + Seek,
        S: EventSink + ?Sized,
    {
        self.reset();
        let mut reader = FrameReader::new(stream)?;
        let mut summary = DecodeSummary::default();

        let raw_version = detect_version(&mut reader)?;
        let version = ListfileVersion::from_raw(raw_version);
        if raw_version > 1 {
            let warning = DecodeWarning::UnsupportedVersion {
                version: raw_version,
            };
            warn!("{}", warning);
            summary.warnings.push(warning);
        }
        info!("Detected listfile version {}", raw_version);
        self.version = Some(version);
        summary.raw_version = raw_version;
        summary.version = version;

        let profile = FormatProfile::for_version(version);
        reader.seek_to(profile.first_section_offset)?;
        let mut sections = SectionDecoder::new(profile);

        loop {
            let section_offset = reader.position();
            let word = reader.read_word()?;
            let header = profile.parse_section_header(word);

            match header.section_type {
                SectionType::Config => {
                    debug!("Config section of size {}", header.size_words);
                    reader.skip_words(header.size_words)?;
                    summary.config_sections += 1;
                }

                SectionType::Event => {
                    trace!(
                        "Event section: eventHeader=0x{:08x}, eventType={}, eventSize={}",
                        word,
                        header.event_type,
                        header.size_words
                    );
                    sections.decode_event(
                        &mut reader,
                        &header,
                        &mut self.timestamps,
                        sink,
                        &mut summary,
                    )?;
                    summary.events += 1;
                    if summary.events % PROGRESS_INTERVAL == 0 {
                        debug!("Processing event {}", summary.events);
                    }
                }

                SectionType::Timetick => {
                    trace!("Timetick");
                    sink.on_timetick(summary.timeticks)?;
                    summary.timeticks += 1;
                }

                SectionType::End => {
                    info!("Found listfile End section");
                    break;
                }

                SectionType::Unknown(tag) => {
                    let warning = DecodeWarning::UnknownSectionType {
                        offset: section_offset,
                        section_type: tag,
                        size_words: header.size_words,
                    };
                    warn!("{}", warning);
                    summary.warnings.push(warning);
                    reader.skip_words(header.size_words)?;
                    summary.unknown_sections += 1;
                }
            }
        }

        summary.bytes_consumed = reader.position();
        let trailing = reader.remaining();
        if trailing > 0 {
            let warning = DecodeWarning::TrailingBytes { bytes: trailing };
            warn!("{}", warning);
            summary.warnings.push(warning);
        }

        info!("{} events total", summary.events);
        sink.finalize(&summary)?;
        Ok(summary)
    }
}

/// Reads the optional magic marker and returns the listfile version number.
///
/// Without the marker the stream is version 0 and the peeked bytes are
/// left unconsumed.
fn detect_version<R: Read + Seek>(reader: &mut FrameReader<R>) -> Result<u32, DecodeError> {
    if reader.remaining() < MAGIC.len() as u64 {
        return Ok(0);
    }

    let mut four_cc = [0u8; 4];
    reader.read_bytes(&mut four_cc)?;
    if &four_cc == MAGIC {
        reader.read_word()
    } else {
        reader.seek_relative(-(WORD_SIZE as i64))?;
        Ok(0)
    }
}
