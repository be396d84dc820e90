//! Decoding of event section bodies.
//!
//! An event section holds a sequence of module subevents followed by one
//! end-marker word:
//!
//! ```text
//! [section header] [subevent header] [payload ...] [subevent header] ... [end marker]
//! ```
//!
//! The section size counts every word after the section header, including
//! the end marker.

use crate::decoder::DecodeError;
use crate::module::ModuleDecoder;
use crate::parser::{FormatProfile, EVENT_END_MARKER, FILL_WORD};
use crate::reader::FrameReader;
use crate::sink::EventSink;
use crate::timestamp::TimestampAccumulator;
use crate::types::{
    ChannelKind, DecodeSummary, DecodeWarning, FlagKind, ModuleObservation, SectionHeader,
};
use std::collections::HashSet;
use std::io::{Read, Seek};
use tracing::{trace, warn};

/// Walks the subevents of event sections for one listfile.
#[derive(Debug)]
pub struct SectionDecoder {
    profile: &'static FormatProfile,
    // Module tags already reported as unrecognized in this file.
    reported_modules: HashSet<u8>,
    end_marker_reported: bool,
}

impl SectionDecoder {
    pub fn new(profile: &'static FormatProfile) -> Self {
        Self {
            profile,
            reported_modules: HashSet::new(),
            end_marker_reported: false,
        }
    }

    /// Decodes the body of one event section.
    ///
    /// The reader must sit right after the section header. On success
    /// exactly `header.size_words` words have been consumed and the sink has
    /// seen one `init_event`/`flush_event` pair.
    pub fn decode_event<R, S>(
        &mut self,
        reader: &mut FrameReader<R>,
        header: &SectionHeader,
        timestamps: &mut TimestampAccumulator,
        sink: &mut S,
        summary: &mut DecodeSummary,
    ) -> Result<(), DecodeError>
    where
        R: Read + Seek,
        S: EventSink + ?Sized,
    {
        let body_offset = reader.position();
        if header.size_words == 0 {
            return Err(DecodeError::MalformedSection {
                offset: body_offset,
                reason: "event section has no room for the end marker".to_string(),
            });
        }

        sink.init_event();
        let mut end_of_event: Option<u32> = None;
        let mut words_left = header.size_words;

        // The last word of the section is reserved for the end marker.
        while words_left > 1 {
            let subevent_offset = reader.position();
            let subevent_word = reader.read_word()?;
            words_left -= 1;

            let subevent = self.profile.parse_subevent_header(subevent_word);
            trace!(
                "  subEventHeader=0x{:08x}, moduleType={}, subEventSize={}",
                subevent_word,
                subevent.module_type,
                subevent.size_words
            );

            if subevent.size_words > words_left {
                return Err(DecodeError::MalformedSection {
                    offset: subevent_offset,
                    reason: format!(
                        "subevent of {} words exceeds the {} words left in the section",
                        subevent.size_words, words_left
                    ),
                });
            }

            if !subevent.module_type.is_recognized()
                && self.reported_modules.insert(subevent.module_type.tag())
            {
                let warning = DecodeWarning::UnrecognizedModuleType {
                    module_type: subevent.module_type.tag(),
                };
                warn!("{}", warning);
                summary.warnings.push(warning);
            }

            let module = ModuleDecoder::for_module(subevent.module_type);
            if module.interprets_payload() {
                for i in 0..subevent.size_words {
                    let word = reader.read_word()?;
                    trace!("    {:2} = 0x{:08x}", i, word);

                    if word == FILL_WORD {
                        summary.fill_words += 1;
                        continue;
                    }

                    if let Some(observation) = module.decode_word(word) {
                        summary.observations += 1;
                        if let Some(low) = apply_observation(observation, timestamps, sink) {
                            end_of_event = Some(low);
                        }
                    }
                }
            } else {
                trace!(
                    "    {} payload words of {} skipped",
                    subevent.size_words,
                    subevent.module_type
                );
                reader.skip_words(subevent.size_words)?;
            }

            words_left -= subevent.size_words;
            summary.subevents += 1;
        }

        if words_left == 0 {
            return Err(DecodeError::MalformedSection {
                offset: reader.position(),
                reason: "subevents consume the end marker word".to_string(),
            });
        }

        let marker_offset = reader.position();
        let marker = reader.read_word()?;
        trace!("   eventEndMarker=0x{:08x}", marker);
        if marker != EVENT_END_MARKER && !self.end_marker_reported {
            self.end_marker_reported = true;
            let warning = DecodeWarning::EndMarkerMismatch {
                offset: marker_offset,
                found: marker,
            };
            warn!("{}", warning);
            summary.warnings.push(warning);
        }

        // Wraparound is judged once per event, on its last end-of-event word.
        let time = match end_of_event {
            Some(low) => timestamps.on_end_of_event(low),
            None => timestamps.resolve(0),
        };
        sink.flush_event(&time)?;
        Ok(())
    }
}

/// Forwards one observation to the sink and the timestamp state.
///
/// Returns the low timestamp when the observation ends the module event.
/// The wraparound check for that timestamp is left to the caller.
fn apply_observation<S: EventSink + ?Sized>(
    observation: ModuleObservation,
    timestamps: &mut TimestampAccumulator,
    sink: &mut S,
) -> Option<u32> {
    match observation {
        ModuleObservation::Header => {
            trace!("\tHeader");
            None
        }
        ModuleObservation::ChannelData {
            channel,
            value,
            pileup,
            overflow,
        } => {
            trace!("\tData\t{}\t{}\t{}\t{}", pileup as u8, overflow as u8, channel, value);
            let (kind, index) = ChannelKind::split(channel);
            sink.set_flag(FlagKind::Pileup, index, pileup);
            sink.set_flag(FlagKind::Overflow, index, overflow);
            sink.set_channel_value(kind, index, value);
            None
        }
        ModuleObservation::ExtendedTimestampFragment { value } => {
            trace!("\tExtended time stamp:\t{}", value);
            timestamps.on_extended_fragment(value);
            sink.set_extended_time(value as u32);
            None
        }
        ModuleObservation::EndOfEvent { timestamp_low } => {
            trace!("\tEnd of event\tTime:\t{}", timestamp_low);
            sink.set_time(timestamp_low);
            Some(timestamp_low)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::types::SectionType;
    use std::io::Cursor;

    fn words_to_reader(words: &[u32]) -> FrameReader<Cursor<Vec<u8>>> {
        let bytes = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        FrameReader::new(Cursor::new(bytes)).unwrap()
    }

    fn event_header(size_words: u32) -> SectionHeader {
        SectionHeader {
            section_type: SectionType::Event,
            size_words,
            event_type: 0,
        }
    }

    #[test]
    fn test_single_mdpp_subevent() {
        let p = &FormatProfile::V0;
        let body = [
            p.encode_subevent_header(4, 4),
            0x4000_0000,
            0x1003_03E8,
            FILL_WORD,
            0xC000_3039,
            EVENT_END_MARKER,
        ];
        let mut reader = words_to_reader(&body);
        let mut decoder = SectionDecoder::new(p);
        let mut timestamps = TimestampAccumulator::new();
        let mut sink = MemorySink::new();
        let mut summary = DecodeSummary::default();

        decoder
            .decode_event(
                &mut reader,
                &event_header(body.len() as u32),
                &mut timestamps,
                &mut sink,
                &mut summary,
            )
            .unwrap();

        assert!(reader.at_end());
        assert_eq!(sink.events.len(), 1);
        assert_eq!(sink.events[0].amplitude[3], 1000);
        assert_eq!(sink.events[0].time_stamp, 12345);
        assert_eq!(summary.fill_words, 1);
        assert_eq!(summary.observations, 3);
        assert_eq!(summary.subevents, 1);
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn test_wraparound_checked_once_per_section() {
        let p = &FormatProfile::V0;
        let mut decoder = SectionDecoder::new(p);
        let mut timestamps = TimestampAccumulator::new();
        let mut sink = MemorySink::new();
        let mut summary = DecodeSummary::default();

        // second module stamps lower than the first within each section
        for (first, second) in [(100u32, 90u32), (200, 190)] {
            let body = [
                p.encode_subevent_header(4, 1),
                0xC000_0000 | first,
                p.encode_subevent_header(7, 1),
                0xC000_0000 | second,
                EVENT_END_MARKER,
            ];
            let mut reader = words_to_reader(&body);
            decoder
                .decode_event(
                    &mut reader,
                    &event_header(body.len() as u32),
                    &mut timestamps,
                    &mut sink,
                    &mut summary,
                )
                .unwrap();
        }

        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[0].time_stamp, 90);
        assert_eq!(sink.events[1].time_stamp, 190);
        assert_eq!(sink.events[1].extended_time, 0);
        assert_eq!(timestamps.extended_ticks(), 0);
        assert_eq!(timestamps.last_low_timestamp(), 190);
    }

    #[test]
    fn test_time_channels_go_to_time_bank() {
        let p = &FormatProfile::V1;
        let body = [
            p.encode_subevent_header(7, 3),
            0x1013_0064, // chn 19 -> time bank index 3, value 100
            0x1043_0005, // chn 3 with overflow
            0xC000_0010,
            EVENT_END_MARKER,
        ];
        let mut reader = words_to_reader(&body);
        let mut sink = MemorySink::new();
        let mut summary = DecodeSummary::default();
        SectionDecoder::new(p)
            .decode_event(
                &mut reader,
                &event_header(body.len() as u32),
                &mut TimestampAccumulator::new(),
                &mut sink,
                &mut summary,
            )
            .unwrap();

        let event = &sink.events[0];
        assert_eq!(event.time[3], 100);
        assert_eq!(event.amplitude[3], 5);
        assert!(event.overflow[3]);
        assert!(!event.pileup[3]);
    }

    #[test]
    fn test_oversized_subevent_is_malformed() {
        let p = &FormatProfile::V0;
        let body = [p.encode_subevent_header(4, 5), 0, 0, EVENT_END_MARKER];
        let mut reader = words_to_reader(&body);
        let result = SectionDecoder::new(p).decode_event(
            &mut reader,
            &event_header(body.len() as u32),
            &mut TimestampAccumulator::new(),
            &mut MemorySink::new(),
            &mut DecodeSummary::default(),
        );
        assert!(matches!(
            result,
            Err(DecodeError::MalformedSection { offset: 0, .. })
        ));
    }

    #[test]
    fn test_empty_event_section_is_malformed() {
        let mut reader = words_to_reader(&[]);
        let result = SectionDecoder::new(&FormatProfile::V0).decode_event(
            &mut reader,
            &event_header(0),
            &mut TimestampAccumulator::new(),
            &mut MemorySink::new(),
            &mut DecodeSummary::default(),
        );
        assert!(matches!(result, Err(DecodeError::MalformedSection { .. })));
    }

    #[test]
    fn test_unrecognized_module_consumed_and_reported_once() {
        let p = &FormatProfile::V1;
        let body = [
            p.encode_subevent_header(200, 2),
            0x1003_03E8,
            0xC000_0001,
            p.encode_subevent_header(200, 1),
            0x1003_03E8,
            EVENT_END_MARKER,
        ];
        let mut reader = words_to_reader(&body);
        let mut sink = MemorySink::new();
        let mut summary = DecodeSummary::default();
        SectionDecoder::new(p)
            .decode_event(
                &mut reader,
                &event_header(body.len() as u32),
                &mut TimestampAccumulator::new(),
                &mut sink,
                &mut summary,
            )
            .unwrap();

        assert!(reader.at_end());
        assert_eq!(summary.observations, 0);
        assert_eq!(summary.subevents, 2);
        assert_eq!(
            summary.warnings,
            vec![DecodeWarning::UnrecognizedModuleType { module_type: 200 }]
        );
        assert_eq!(sink.events[0].amplitude[3], 0);
    }

    #[test]
    fn test_end_marker_mismatch_is_warning() {
        let p = &FormatProfile::V0;
        let body = [p.encode_subevent_header(4, 1), 0xC000_0001, 0xDEAD_BEEF];
        let mut reader = words_to_reader(&body);
        let mut sink = MemorySink::new();
        let mut summary = DecodeSummary::default();
        SectionDecoder::new(p)
            .decode_event(
                &mut reader,
                &event_header(body.len() as u32),
                &mut TimestampAccumulator::new(),
                &mut sink,
                &mut summary,
            )
            .unwrap();
        assert_eq!(sink.events.len(), 1);
        assert_eq!(
            summary.warnings,
            vec![DecodeWarning::EndMarkerMismatch {
                offset: 8,
                found: 0xDEAD_BEEF
            }]
        );
    }
}
