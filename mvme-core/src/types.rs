//! Core types for mvme listfile data.
//!
//! This module defines the section, subevent and module vocabulary of the
//! mvme listfile format together with the observations the module decoders
//! emit and the summary reported at the end of a decode.

use std::fmt;

/// Number of channels per bank on an MDPP-16 module.
pub const CHANNELS_PER_BANK: usize = 16;

/// Listfile binary layout version.
///
/// Version 0 files carry no magic marker. Version 1 files start with the
/// FourCC `"MVME"` followed by a little-endian `u32` version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListfileVersion {
    #[default]
    V0,
    V1,
}

impl ListfileVersion {
    /// Maps the version number stored after the magic marker to a layout.
    ///
    /// Any nonzero number selects the version 1 layout; the caller decides
    /// whether numbers above 1 deserve a warning.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        if raw == 0 {
            Self::V0
        } else {
            Self::V1
        }
    }

    /// The numeric version.
    #[inline]
    pub fn number(self) -> u32 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }
}

impl fmt::Display for ListfileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// Top-level section types.
///
/// The 3-bit section type field in every section header word selects one of
/// these. Values 4-7 are reserved and surface as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    /// Opaque configuration payload (the mvme config as padded JSON).
    Config,
    /// Readout data of one VME event, split into module subevents.
    Event,
    /// Last section of a listfile.
    End,
    /// Written once at run start and then once per elapsed second.
    Timetick,
    /// Reserved tag, skipped by its declared size.
    Unknown(u8),
}

impl SectionType {
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Config,
            1 => Self::Event,
            2 => Self::End,
            3 => Self::Timetick,
            other => Self::Unknown(other),
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            Self::Config => 0,
            Self::Event => 1,
            Self::End => 2,
            Self::Timetick => 3,
            Self::Unknown(tag) => tag,
        }
    }
}

/// Hardware module kinds as tagged in subevent headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    Invalid,
    Madc32,
    Mqdc32,
    Mtdc32,
    Mdpp16Scp,
    Mdpp32,
    Mdi2,
    Mdpp16Rcp,
    Mdpp16Qdc,
    Vmmr,
    MesytecCounter,
    Vhs4030p,
    Unknown(u8),
}

impl ModuleType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Invalid,
            1 => Self::Madc32,
            2 => Self::Mqdc32,
            3 => Self::Mtdc32,
            4 => Self::Mdpp16Scp,
            5 => Self::Mdpp32,
            6 => Self::Mdi2,
            7 => Self::Mdpp16Rcp,
            8 => Self::Mdpp16Qdc,
            9 => Self::Vmmr,
            16 => Self::MesytecCounter,
            21 => Self::Vhs4030p,
            other => Self::Unknown(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Madc32 => 1,
            Self::Mqdc32 => 2,
            Self::Mtdc32 => 3,
            Self::Mdpp16Scp => 4,
            Self::Mdpp32 => 5,
            Self::Mdi2 => 6,
            Self::Mdpp16Rcp => 7,
            Self::Mdpp16Qdc => 8,
            Self::Vmmr => 9,
            Self::MesytecCounter => 16,
            Self::Vhs4030p => 21,
            Self::Unknown(tag) => tag,
        }
    }

    /// Display name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Madc32 => "MADC-32",
            Self::Mqdc32 => "MQDC-32",
            Self::Mtdc32 => "MTDC-32",
            Self::Mdpp16Scp => "MDPP-16_SCP",
            Self::Mdpp32 => "MDPP-32",
            Self::Mdi2 => "MDI-2",
            Self::Mdpp16Rcp => "MDPP-16_RCP",
            Self::Mdpp16Qdc => "MDPP-16_QDC",
            Self::Vmmr => "VMMR",
            Self::MesytecCounter => "Mesytec Counter",
            Self::Vhs4030p => "iseg VHS4030p",
            Self::Invalid | Self::Unknown(_) => "unknown",
        }
    }

    /// Whether the tag names a known module kind.
    #[inline]
    pub fn is_recognized(self) -> bool {
        !matches!(self, Self::Invalid | Self::Unknown(_))
    }

    /// Decoding family of this module.
    ///
    /// Only the SCP and RCP firmwares (tags 4 and 7) share the MDPP data
    /// word layout the decoder interprets.
    pub fn family(self) -> ModuleFamily {
        match self {
            Self::Mdpp16Scp | Self::Mdpp16Rcp => ModuleFamily::Mdpp,
            Self::MesytecCounter => ModuleFamily::Counter,
            Self::Invalid | Self::Unknown(_) => ModuleFamily::Unrecognized,
            _ => ModuleFamily::Opaque,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tag(), self.name())
    }
}

/// How payload words of a module are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFamily {
    /// MDPP-16 SCP/RCP data words, decoded into observations.
    Mdpp,
    /// Counter module, consumed without interpretation.
    Counter,
    /// Known module whose words are consumed without interpretation.
    Opaque,
    /// Tag outside the known table.
    Unrecognized,
}

/// Bank a channel value belongs to.
///
/// MDPP channel numbers 0-15 carry amplitudes, 16-31 the matching time
/// (TDC) values of the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Amplitude,
    Time,
}

impl ChannelKind {
    /// Splits a 5-bit channel number into its bank and the index within it.
    #[inline]
    pub fn split(channel: u8) -> (Self, u8) {
        let kind = if (channel as usize) < CHANNELS_PER_BANK {
            Self::Amplitude
        } else {
            Self::Time
        };
        (kind, channel % CHANNELS_PER_BANK as u8)
    }
}

/// Per-channel status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Pileup,
    Overflow,
}

/// One decoded fact about a subevent payload word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleObservation {
    /// Module header word, framing only.
    Header,
    /// Converted value of one channel.
    ChannelData {
        /// Raw 5-bit channel number (0-31).
        channel: u8,
        value: u16,
        pileup: bool,
        overflow: bool,
    },
    /// High-order timestamp bits supplied by the module.
    ExtendedTimestampFragment { value: u16 },
    /// End of module event carrying the 30-bit low timestamp.
    EndOfEvent { timestamp_low: u32 },
}

/// A decoded top-level section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub section_type: SectionType,
    /// Words following the header word.
    pub size_words: u32,
    /// Event index, only meaningful for event sections.
    pub event_type: u8,
}

/// A decoded subevent header inside an event section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubeventHeader {
    pub module_type: ModuleType,
    pub size_words: u32,
}

/// Non-fatal conditions met while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    /// Bytes left in the stream after the End section.
    TrailingBytes { bytes: u64 },
    /// Section with a reserved type tag, skipped by its declared size.
    UnknownSectionType {
        offset: u64,
        section_type: u8,
        size_words: u32,
    },
    /// Subevent with a module tag outside the known table.
    UnrecognizedModuleType { module_type: u8 },
    /// Trailing word of an event section is not the end marker.
    EndMarkerMismatch { offset: u64, found: u32 },
    /// Magic marker announced a version newer than any known layout.
    UnsupportedVersion { version: u32 },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrailingBytes { bytes } => {
                write!(f, "{} bytes left after listfile End section", bytes)
            }
            Self::UnknownSectionType {
                offset,
                section_type,
                size_words,
            } => write!(
                f,
                "unknown section type {} of size {} at offset {}, skipped",
                section_type, size_words, offset
            ),
            Self::UnrecognizedModuleType { module_type } => {
                write!(f, "unrecognized module type {}", module_type)
            }
            Self::EndMarkerMismatch { offset, found } => write!(
                f,
                "event end marker 0x{:08x} at offset {} is not 0x{:08x}",
                found,
                offset,
                crate::parser::EVENT_END_MARKER
            ),
            Self::UnsupportedVersion { version } => write!(
                f,
                "listfile version {} is newer than 1, decoding with the v1 layout",
                version
            ),
        }
    }
}

/// Counters reported once a listfile has been decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeSummary {
    /// Version number read after the magic marker (0 without marker).
    pub raw_version: u32,
    pub version: ListfileVersion,
    /// Event sections decoded and flushed.
    pub events: u64,
    pub config_sections: u64,
    pub timeticks: u64,
    pub unknown_sections: u64,
    pub subevents: u64,
    /// Observations forwarded to the sink.
    pub observations: u64,
    /// Fill words skipped inside interpreted subevents.
    pub fill_words: u64,
    /// Stream position after the End section.
    pub bytes_consumed: u64,
    pub warnings: Vec<DecodeWarning>,
}
