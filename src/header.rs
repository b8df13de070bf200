//! Story file header: fixed-offset fields in the first 64 bytes

use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::error::{RuntimeError, ZResult};

/// Byte offsets of the header fields the core reads or writes.
pub mod offset {
    pub const VERSION: u32 = 0x00;
    pub const FLAGS1: u32 = 0x01;
    pub const RELEASE: u32 = 0x02;
    pub const HIGH_BASE: u32 = 0x04;
    pub const INITIAL_PC: u32 = 0x06;
    pub const DICTIONARY: u32 = 0x08;
    pub const OBJECT_TABLE: u32 = 0x0a;
    pub const GLOBALS: u32 = 0x0c;
    pub const STATIC_BASE: u32 = 0x0e;
    pub const FLAGS2: u32 = 0x10;
    pub const SERIAL: u32 = 0x12;
    pub const ABBREVIATIONS: u32 = 0x18;
    pub const FILE_LENGTH: u32 = 0x1a;
    pub const CHECKSUM: u32 = 0x1c;
    pub const INTERPRETER_NUMBER: u32 = 0x1e;
    pub const INTERPRETER_VERSION: u32 = 0x1f;
    pub const SCREEN_LINES: u32 = 0x20;
    pub const SCREEN_COLS: u32 = 0x21;
    pub const SCREEN_WIDTH_UNITS: u32 = 0x22;
    pub const SCREEN_HEIGHT_UNITS: u32 = 0x24;
    pub const FONT_WIDTH: u32 = 0x26;
    pub const FONT_HEIGHT: u32 = 0x27;
    pub const ROUTINES_OFFSET: u32 = 0x28;
    pub const STRINGS_OFFSET: u32 = 0x2a;
    pub const DEFAULT_BG: u32 = 0x2c;
    pub const DEFAULT_FG: u32 = 0x2d;
    pub const TERMINATING_CHARS: u32 = 0x2e;
    pub const STANDARD_REVISION: u32 = 0x32;
    pub const ALPHABET_TABLE: u32 = 0x34;
    pub const HEADER_EXTENSION: u32 = 0x36;
}

/// Parsed view of the header. The backing bytes remain authoritative for
/// anything the game may rewrite (flags2 in particular); these fields are the
/// load-time values.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u8,
    pub release: u16,
    pub serial: [u8; 6],
    pub high_base: u32,
    pub initial_pc: u32,
    pub dictionary: u32,
    pub object_table: u32,
    pub globals: u32,
    pub static_base: u32,
    pub abbreviations: u32,
    pub file_length: u32,
    pub checksum: u16,
    pub routines_offset: u32,
    pub strings_offset: u32,
    pub terminating_chars: u32,
    pub alphabet_table: u32,
    pub header_extension: u32,
}

fn word_at(bytes: &[u8], addr: u32) -> u16 {
    let a = addr as usize;
    ((bytes[a] as u16) << 8) | bytes[a + 1] as u16
}

impl Header {
    /// Parse the first 64 bytes of a story image. Rejects versions the
    /// interpreter does not implement before any state is built.
    pub fn parse(bytes: &[u8]) -> ZResult<Header> {
        if bytes.len() < 64 {
            return Err(RuntimeError::RestoreFailure(
                "story file shorter than the 64-byte header".to_string(),
            ));
        }
        let version = bytes[0];
        if !(1..=8).contains(&version) {
            return Err(RuntimeError::UnsupportedVersion(version));
        }

        // Stored length is scaled by a version-dependent factor; a zero field
        // (common in very early files) means "whole file".
        let length_scale = match version {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };
        let stored_length = word_at(bytes, offset::FILE_LENGTH) as u32 * length_scale;
        let file_length = if stored_length == 0 {
            bytes.len() as u32
        } else {
            stored_length
        };

        let mut serial = [0u8; 6];
        serial.copy_from_slice(&bytes[0x12..0x18]);

        Ok(Header {
            version,
            release: word_at(bytes, offset::RELEASE),
            serial,
            high_base: word_at(bytes, offset::HIGH_BASE) as u32,
            initial_pc: word_at(bytes, offset::INITIAL_PC) as u32,
            dictionary: word_at(bytes, offset::DICTIONARY) as u32,
            object_table: word_at(bytes, offset::OBJECT_TABLE) as u32,
            globals: word_at(bytes, offset::GLOBALS) as u32,
            static_base: word_at(bytes, offset::STATIC_BASE) as u32,
            abbreviations: word_at(bytes, offset::ABBREVIATIONS) as u32,
            file_length,
            checksum: word_at(bytes, offset::CHECKSUM),
            routines_offset: word_at(bytes, offset::ROUTINES_OFFSET) as u32,
            strings_offset: word_at(bytes, offset::STRINGS_OFFSET) as u32,
            terminating_chars: word_at(bytes, offset::TERMINATING_CHARS) as u32,
            alphabet_table: word_at(bytes, offset::ALPHABET_TABLE) as u32,
            header_extension: word_at(bytes, offset::HEADER_EXTENSION) as u32,
        })
    }

    pub fn serial_string(&self) -> String {
        self.serial.iter().map(|&b| b as char).collect()
    }

    /// Dictionary word length in Z-characters (6 for v1-3, 9 for v4+).
    pub fn dictionary_word_zchars(&self) -> usize {
        if self.version <= 3 {
            6
        } else {
            9
        }
    }

    /// Encoded dictionary word length in bytes (4 for v1-3, 6 for v4+).
    pub fn dictionary_word_bytes(&self) -> usize {
        if self.version <= 3 {
            4
        } else {
            6
        }
    }
}

/// Interpreter-number byte values per the names the CLI accepts.
pub fn interpreter_number(name: &str) -> Option<u8> {
    match name {
        "dec" => Some(1),
        "apple2e" => Some(2),
        "mac" => Some(3),
        "amiga" => Some(4),
        "atari-st" => Some(5),
        "ibm-pc" => Some(6),
        "next" => Some(7),
        "c64" => Some(8),
        _ => None,
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Serial number:            {}
Start PC:                 {:#07x}
Base of high memory:      {:#07x}
Base of static memory:    {:#07x}
Dictionary address:       {:#07x}
Object table address:     {:#07x}
Global variables address: {:#07x}
Abbreviations address:    {:#07x}
File size:                {:#07x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.serial_string(),
            self.initial_pc,
            self.high_base,
            self.static_base,
            self.dictionary,
            self.object_table,
            self.globals,
            self.abbreviations,
            self.file_length,
            self.checksum,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_image() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x400];
        bytes[0] = 3;
        bytes[offset::HIGH_BASE as usize] = 0x02;
        bytes[offset::INITIAL_PC as usize] = 0x03;
        bytes[offset::STATIC_BASE as usize] = 0x01;
        bytes[0x12..0x18].copy_from_slice(b"850101");
        bytes
    }

    #[test]
    fn parses_fields() {
        let h = Header::parse(&minimal_image()).unwrap();
        assert_eq!(h.version, 3);
        assert_eq!(h.high_base, 0x0200);
        assert_eq!(h.initial_pc, 0x0300);
        assert_eq!(h.static_base, 0x0100);
        assert_eq!(h.serial_string(), "850101");
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = minimal_image();
        bytes[0] = 9;
        assert!(matches!(
            Header::parse(&bytes),
            Err(RuntimeError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn interpreter_names() {
        assert_eq!(interpreter_number("amiga"), Some(4));
        assert_eq!(interpreter_number("ibm-pc"), Some(6));
        assert_eq!(interpreter_number("vax"), None);
    }
}
