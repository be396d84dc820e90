//! Interpretation of subevent payload words per module kind.

use crate::parser::{self, FILL_WORD};
use crate::types::{ModuleFamily, ModuleObservation, ModuleType};

/// Payload decoder selected by the module tag of a subevent header.
///
/// Only the MDPP family carries a word layout this crate interprets. Every
/// other module is still walked word by word so the stream cursor stays
/// aligned, but yields no observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleDecoder {
    /// MDPP-16 SCP and RCP firmware (tags 4 and 7).
    MdppFamily,
    /// Mesytec counter module.
    CounterModule,
    /// Known module without an interpreted word layout.
    Opaque(ModuleType),
    /// Tag outside the known module table.
    Unrecognized(u8),
}

impl ModuleDecoder {
    /// Selects the decoder for a module tag.
    pub fn for_module(module_type: ModuleType) -> Self {
        match module_type.family() {
            ModuleFamily::Mdpp => Self::MdppFamily,
            ModuleFamily::Counter => Self::CounterModule,
            ModuleFamily::Opaque => Self::Opaque(module_type),
            ModuleFamily::Unrecognized => Self::Unrecognized(module_type.tag()),
        }
    }

    /// Whether payload words of this module produce observations.
    #[inline]
    pub fn interprets_payload(&self) -> bool {
        matches!(self, Self::MdppFamily)
    }

    /// Decodes one payload word.
    ///
    /// Fill words never produce an observation, whatever the module.
    #[inline]
    pub fn decode_word(&self, word: u32) -> Option<ModuleObservation> {
        if word == FILL_WORD {
            return None;
        }
        match self {
            Self::MdppFamily => decode_mdpp_word(word),
            Self::CounterModule | Self::Opaque(_) | Self::Unrecognized(_) => None,
        }
    }
}

/// Decodes one non-fill MDPP-16 SCP/RCP data word.
///
/// Signatures 5 to 11 and 3 are reserved and ignored.
#[inline]
pub fn decode_mdpp_word(word: u32) -> Option<ModuleObservation> {
    match parser::get_signature(word) {
        parser::SIGNATURE_HEADER => Some(ModuleObservation::Header),
        parser::SIGNATURE_DATA => Some(ModuleObservation::ChannelData {
            channel: parser::data_get_channel(word),
            value: parser::data_get_value(word),
            pileup: parser::data_get_pileup(word),
            overflow: parser::data_get_overflow(word),
        }),
        parser::SIGNATURE_EXTENDED_TIME => Some(ModuleObservation::ExtendedTimestampFragment {
            value: parser::extended_time_get_value(word),
        }),
        sig if sig >= parser::SIGNATURE_END_OF_EVENT_MIN => Some(ModuleObservation::EndOfEvent {
            timestamp_low: parser::end_of_event_get_timestamp(word),
        }),
        _ => None,
    }
}
