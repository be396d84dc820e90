#![allow(clippy::unusual_byte_groupings)]
//! Low-level parsing of mvme listfile 32-bit words.
//!
//! This module provides the bit-field extractor, the per-version header
//! layouts and the field accessors for MDPP module data words.

use crate::types::{ListfileVersion, ModuleType, SectionHeader, SectionType, SubeventHeader};

/// Padding word inserted by the readout to keep sections word aligned.
pub const FILL_WORD: u32 = 0xFFFF_FFFF;

/// Trailing word of every event section.
pub const EVENT_END_MARKER: u32 = 0x8765_4321;

/// FourCC at the start of version 1 and later listfiles.
pub const MAGIC: &[u8; 4] = b"MVME";

/// Extracts an unsigned `numbits` wide field starting at bit `position`.
///
/// Total over all inputs: bits shifted in from beyond bit 31 are zero, so the
/// result always lies in `0..2^numbits`.
#[inline]
pub fn extract(word: u32, numbits: u32, position: u32) -> u32 {
    let shifted = (word as u64).checked_shr(position).unwrap_or(0);
    let mask = 1u64.checked_shl(numbits).map_or(u64::MAX, |bit| bit - 1);
    (shifted & mask) as u32
}

// ============================================================================
// Header layouts
//
//  ------- V0 section header -------    ------- V1 section header -------
//  |ttt         eeeessssssssssssssss|    |ttteeee     ssssssssssssssssssss|
//  ------- V0 subevent header ------    ------- V1 subevent header ------
//  |              mmmmmm  ssssssssss|    |mmmmmmmm    ssssssssssssssssssss|
//
//  t = section type, e = event type, s = size in 32-bit words,
//  m = module type
// ============================================================================

/// Bit layout of section and subevent headers for one listfile version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatProfile {
    pub version: ListfileVersion,
    /// Byte offset of the first section from the start of the stream.
    pub first_section_offset: u64,
    pub section_type_mask: u32,
    pub section_type_shift: u32,
    pub section_size_mask: u32,
    pub section_size_shift: u32,
    pub event_type_mask: u32,
    pub event_type_shift: u32,
    pub module_type_mask: u32,
    pub module_type_shift: u32,
    pub subevent_size_mask: u32,
    pub subevent_size_shift: u32,
}

impl FormatProfile {
    pub const V0: FormatProfile = FormatProfile {
        version: ListfileVersion::V0,
        first_section_offset: 0,
        section_type_mask: 0xe000_0000, // 3 bit
        section_type_shift: 29,
        section_size_mask: 0x0000_ffff, // 16 bit
        section_size_shift: 0,
        event_type_mask: 0x000f_0000, // 4 bit
        event_type_shift: 16,
        module_type_mask: 0x0003_f000, // 6 bit
        module_type_shift: 12,
        subevent_size_mask: 0x0000_03ff, // 10 bit
        subevent_size_shift: 0,
    };

    pub const V1: FormatProfile = FormatProfile {
        version: ListfileVersion::V1,
        first_section_offset: 8,
        section_type_mask: 0xe000_0000, // 3 bit
        section_type_shift: 29,
        section_size_mask: 0x000f_ffff, // 20 bit
        section_size_shift: 0,
        event_type_mask: 0x1e00_0000, // 4 bit
        event_type_shift: 25,
        module_type_mask: 0xff00_0000, // 8 bit
        module_type_shift: 24,
        subevent_size_mask: 0x000f_ffff, // 20 bit
        subevent_size_shift: 0,
    };

    /// Returns the constant layout for a listfile version.
    #[inline]
    pub fn for_version(version: ListfileVersion) -> &'static FormatProfile {
        match version {
            ListfileVersion::V0 => &Self::V0,
            ListfileVersion::V1 => &Self::V1,
        }
    }

    /// Largest section size this layout can express.
    #[inline]
    pub fn section_max_words(&self) -> u32 {
        self.section_size_mask >> self.section_size_shift
    }

    /// Largest subevent size this layout can express.
    #[inline]
    pub fn subevent_max_words(&self) -> u32 {
        self.subevent_size_mask >> self.subevent_size_shift
    }

    #[inline]
    pub fn section_type(&self, header: u32) -> SectionType {
        SectionType::from_u8(((header & self.section_type_mask) >> self.section_type_shift) as u8)
    }

    #[inline]
    pub fn section_size(&self, header: u32) -> u32 {
        (header & self.section_size_mask) >> self.section_size_shift
    }

    #[inline]
    pub fn event_type(&self, header: u32) -> u8 {
        ((header & self.event_type_mask) >> self.event_type_shift) as u8
    }

    #[inline]
    pub fn module_type(&self, header: u32) -> ModuleType {
        ModuleType::from_u8(((header & self.module_type_mask) >> self.module_type_shift) as u8)
    }

    #[inline]
    pub fn subevent_size(&self, header: u32) -> u32 {
        (header & self.subevent_size_mask) >> self.subevent_size_shift
    }

    /// Decodes all fields of a section header word.
    pub fn parse_section_header(&self, header: u32) -> SectionHeader {
        SectionHeader {
            section_type: self.section_type(header),
            size_words: self.section_size(header),
            event_type: self.event_type(header),
        }
    }

    /// Decodes all fields of a subevent header word.
    pub fn parse_subevent_header(&self, header: u32) -> SubeventHeader {
        SubeventHeader {
            module_type: self.module_type(header),
            size_words: self.subevent_size(header),
        }
    }

    /// Builds a section header word. Values wider than their field are
    /// truncated to the field width.
    pub fn encode_section_header(&self, section_type: u8, size_words: u32, event_type: u8) -> u32 {
        (((section_type as u32) << self.section_type_shift) & self.section_type_mask)
            | ((size_words << self.section_size_shift) & self.section_size_mask)
            | (((event_type as u32) << self.event_type_shift) & self.event_type_mask)
    }

    /// Builds a subevent header word. Values wider than their field are
    /// truncated to the field width.
    pub fn encode_subevent_header(&self, module_type: u8, size_words: u32) -> u32 {
        (((module_type as u32) << self.module_type_shift) & self.module_type_mask)
            | ((size_words << self.subevent_size_shift) & self.subevent_size_mask)
    }
}

// ============================================================================
// MDPP-16 data words
// Bits: [31:28] signature | [27:0] signature-specific payload
// ============================================================================

/// Signature of a module header word.
pub const SIGNATURE_HEADER: u8 = 0x4;
/// Signature of a channel data word.
pub const SIGNATURE_DATA: u8 = 0x1;
/// Signature of an extended timestamp word.
pub const SIGNATURE_EXTENDED_TIME: u8 = 0x2;
/// Signatures at or above this value end the module event.
pub const SIGNATURE_END_OF_EVENT_MIN: u8 = 0xC;

/// Extracts the 4-bit signature from a data word.
#[inline]
pub fn get_signature(word: u32) -> u8 {
    extract(word, 4, 28) as u8
}

// ----------------------------------------------------------------------------
// Channel data (signature = 0x1)
// Bits: [31:28] sig | [27:24] | [23] pileup | [22] overflow | [21:16] chn | [15:0] value
// ----------------------------------------------------------------------------

/// Extracts the pileup flag from a channel data word.
#[inline]
pub fn data_get_pileup(word: u32) -> bool {
    extract(word, 1, 23) != 0
}

/// Extracts the overflow/underflow flag from a channel data word.
#[inline]
pub fn data_get_overflow(word: u32) -> bool {
    extract(word, 1, 22) != 0
}

/// Extracts the channel number from a channel data word.
///
/// Only the low 5 of the 6 channel bits are taken.
#[inline]
pub fn data_get_channel(word: u32) -> u8 {
    extract(word, 5, 16) as u8
}

/// Extracts the 16-bit converted value from a channel data word.
#[inline]
pub fn data_get_value(word: u32) -> u16 {
    extract(word, 16, 0) as u16
}

// ----------------------------------------------------------------------------
// Extended timestamp (signature = 0x2)
// Bits: [31:28] sig | [27:16] | [15:0] high timestamp bits
// ----------------------------------------------------------------------------

/// Extracts the 16 high timestamp bits from an extended timestamp word.
#[inline]
pub fn extended_time_get_value(word: u32) -> u16 {
    extract(word, 16, 0) as u16
}

// ----------------------------------------------------------------------------
// End of event (signature >= 0xC)
// Bits: [31:30] 0b11 | [29:0] timestamp
// ----------------------------------------------------------------------------

/// Extracts the 30-bit low timestamp from an end of event word.
#[inline]
pub fn end_of_event_get_timestamp(word: u32) -> u32 {
    extract(word, 30, 0)
}
