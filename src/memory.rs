//! The story memory image: typed access, zone enforcement, packed addresses
//!
//! One byte-addressed array split into three zones by the header. Dynamic
//! memory is writable and saved; static and high memory are read-only. All
//! words are big-endian. Every access is bounds-checked; there are no
//! unchecked fast paths.

use log::debug;

use crate::error::{RuntimeError, ZResult};
use crate::header::{offset, Header};

/// Upper bound on Z-string length in words, to stop a bad pointer from
/// walking the whole image looking for a terminator.
const MAX_ZSTRING_WORDS: usize = 0x1000;

/// Flags2 bits the game is allowed to keep across restart/restore
/// (transcripting and forced fixed-pitch).
const FLAGS2_PRESERVED_MASK: u16 = 0x0003;

pub struct Memory {
    bytes: Vec<u8>,
    /// Load-time copy of dynamic memory, for restart and CMem deltas.
    pristine: Vec<u8>,
    pub header: Header,
}

impl Memory {
    /// Build the memory image from raw story bytes. The version byte is
    /// validated before anything else is touched.
    pub fn from_story(bytes: Vec<u8>) -> ZResult<Memory> {
        let header = Header::parse(&bytes)?;
        if header.static_base as usize > bytes.len() {
            return Err(RuntimeError::BadAddress(header.static_base));
        }
        let pristine = bytes[..header.static_base as usize].to_vec();
        debug!(
            "memory image: {} bytes, dynamic [0, {:#x}), high base {:#x}",
            bytes.len(),
            header.static_base,
            header.high_base
        );
        Ok(Memory {
            bytes,
            pristine,
            header,
        })
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    pub fn byte(&self, addr: u32) -> ZResult<u8> {
        self.bytes
            .get(addr as usize)
            .copied()
            .ok_or(RuntimeError::BadAddress(addr))
    }

    pub fn word(&self, addr: u32) -> ZResult<u16> {
        let hi = self.byte(addr)? as u16;
        let lo = self.byte(addr + 1)? as u16;
        Ok((hi << 8) | lo)
    }

    pub fn set_byte(&mut self, addr: u32, value: u8) -> ZResult<()> {
        if addr >= self.header.static_base {
            return Err(RuntimeError::ReadOnly(addr));
        }
        self.bytes[addr as usize] = value;
        Ok(())
    }

    pub fn set_word(&mut self, addr: u32, value: u16) -> ZResult<()> {
        self.set_byte(addr, (value >> 8) as u8)?;
        self.set_byte(addr + 1, (value & 0xff) as u8)
    }

    /// Interpreter-side header write. Bypasses the zone check so capability
    /// fields can be stamped even on stories whose dynamic zone is minimal.
    pub fn set_header_byte(&mut self, addr: u32, value: u8) -> ZResult<()> {
        if addr >= 0x40 || addr as usize >= self.bytes.len() {
            return Err(RuntimeError::BadAddress(addr));
        }
        self.bytes[addr as usize] = value;
        if (addr as usize) < self.pristine.len() {
            // Capability fields survive restart; keep the pristine copy in step.
            self.pristine[addr as usize] = value;
        }
        Ok(())
    }

    pub fn set_header_word(&mut self, addr: u32, value: u16) -> ZResult<()> {
        self.set_header_byte(addr, (value >> 8) as u8)?;
        self.set_header_byte(addr + 1, (value & 0xff) as u8)
    }

    /// Read the 16-bit words of a Z-string: everything up to and including
    /// the first word with the high bit set.
    pub fn zstring_words(&self, addr: u32) -> ZResult<Vec<u16>> {
        let mut words = Vec::new();
        let mut at = addr;
        loop {
            let word = self.word(at)?;
            words.push(word);
            at += 2;
            if word & 0x8000 != 0 {
                return Ok(words);
            }
            if words.len() >= MAX_ZSTRING_WORDS {
                return Err(RuntimeError::decode(addr, "unterminated Z-string"));
            }
        }
    }

    /// Resolve a packed routine address to a byte address.
    pub fn unpack_routine(&self, packed: u16) -> u32 {
        let p = packed as u32;
        match self.header.version {
            1..=3 => 2 * p,
            4..=5 => 4 * p,
            6..=7 => 4 * p + 8 * self.header.routines_offset,
            _ => 8 * p,
        }
    }

    /// Resolve a packed string address to a byte address.
    pub fn unpack_string(&self, packed: u16) -> u32 {
        let p = packed as u32;
        match self.header.version {
            1..=3 => 2 * p,
            4..=5 => 4 * p,
            6..=7 => 4 * p + 8 * self.header.strings_offset,
            _ => 8 * p,
        }
    }

    /// Checksum over bytes [0x40, file_length), modulo 0x10000, compared to
    /// the header field. Files predating checksums (field zero) pass.
    pub fn verify_checksum(&self) -> bool {
        if self.header.checksum == 0 {
            return true;
        }
        let end = (self.header.file_length as usize).min(self.bytes.len());
        let sum = self.bytes[0x40..end]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
        sum == self.header.checksum
    }

    /// Reset dynamic memory to its load-time image, keeping the flags2 bits
    /// the game is entitled to carry across a restart.
    pub fn reset_dynamic(&mut self) {
        let kept = self.word(offset::FLAGS2).unwrap_or(0) & FLAGS2_PRESERVED_MASK;
        let static_base = self.header.static_base as usize;
        self.bytes[..static_base].copy_from_slice(&self.pristine);
        let fresh = self.word(offset::FLAGS2).unwrap_or(0) & !FLAGS2_PRESERVED_MASK;
        let _ = self.set_word(offset::FLAGS2, fresh | kept);
    }

    /// Replace dynamic memory wholesale (restore path). The caller decides
    /// which flags2 bits to carry over.
    pub fn overwrite_dynamic(&mut self, dynamic: &[u8]) -> ZResult<()> {
        let static_base = self.header.static_base as usize;
        if dynamic.len() != static_base {
            return Err(RuntimeError::RestoreFailure(format!(
                "dynamic memory is {} bytes, save holds {}",
                static_base,
                dynamic.len()
            )));
        }
        let kept = self.word(offset::FLAGS2)? & FLAGS2_PRESERVED_MASK;
        self.bytes[..static_base].copy_from_slice(dynamic);
        let restored = self.word(offset::FLAGS2)? & !FLAGS2_PRESERVED_MASK;
        self.set_word(offset::FLAGS2, restored | kept)
    }

    pub fn dynamic(&self) -> &[u8] {
        &self.bytes[..self.header.static_base as usize]
    }

    pub fn pristine_dynamic(&self) -> &[u8] {
        &self.pristine
    }

    /// Raw view for the text decoder and the dump tools.
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x800];
        bytes[0] = 3;
        bytes[offset::STATIC_BASE as usize] = 0x04; // static at 0x0400
        bytes[offset::HIGH_BASE as usize] = 0x06;
        bytes[offset::INITIAL_PC as usize] = 0x06;
        bytes
    }

    #[test]
    fn word_access_is_big_endian() {
        let mut m = Memory::from_story(image()).unwrap();
        m.set_word(0x100, 0x1234).unwrap();
        assert_eq!(m.byte(0x100).unwrap(), 0x12);
        assert_eq!(m.byte(0x101).unwrap(), 0x34);
        assert_eq!(m.word(0x100).unwrap(), 0x1234);
    }

    #[test]
    fn zone_enforcement() {
        let mut m = Memory::from_story(image()).unwrap();
        assert!(m.set_byte(0x3ff, 1).is_ok());
        assert!(matches!(
            m.set_byte(0x400, 1),
            Err(RuntimeError::ReadOnly(0x400))
        ));
        assert!(matches!(
            m.byte(0x4000),
            Err(RuntimeError::BadAddress(0x4000))
        ));
        // A word straddling the end of memory is out of range too.
        assert!(m.word(0x7ff).is_err());
    }

    #[test]
    fn packed_addresses_by_version() {
        let mut bytes = image();
        let m = Memory::from_story(bytes.clone()).unwrap();
        assert_eq!(m.unpack_routine(0x100), 0x200);

        bytes[0] = 5;
        let m = Memory::from_story(bytes.clone()).unwrap();
        assert_eq!(m.unpack_routine(0x100), 0x400);

        bytes[0] = 8;
        let m = Memory::from_story(bytes.clone()).unwrap();
        assert_eq!(m.unpack_string(0x100), 0x800);

        bytes[0] = 7;
        bytes[offset::ROUTINES_OFFSET as usize + 1] = 0x10;
        bytes[offset::STRINGS_OFFSET as usize + 1] = 0x20;
        let m = Memory::from_story(bytes).unwrap();
        assert_eq!(m.unpack_routine(0x100), 0x400 + 8 * 0x10);
        assert_eq!(m.unpack_string(0x100), 0x400 + 8 * 0x20);
    }

    #[test]
    fn zstring_words_include_terminator() {
        let mut m = Memory::from_story(image()).unwrap();
        m.set_word(0x200, 0x1234).unwrap();
        m.set_word(0x202, 0x9456).unwrap();
        let words = m.zstring_words(0x200).unwrap();
        assert_eq!(words, vec![0x1234, 0x9456]);
    }

    #[test]
    fn reset_preserves_transcript_bit() {
        let mut m = Memory::from_story(image()).unwrap();
        m.set_byte(0x200, 0xaa).unwrap();
        m.set_word(offset::FLAGS2, 0x0001).unwrap();
        m.reset_dynamic();
        assert_eq!(m.byte(0x200).unwrap(), 0);
        assert_eq!(m.word(offset::FLAGS2).unwrap() & 1, 1);
    }

    #[test]
    fn checksum_verification() {
        let mut bytes = image();
        bytes[offset::FILE_LENGTH as usize + 1] = 0x42; // 0x42 * 2 = 0x84 bytes
        bytes[0x40] = 7;
        bytes[0x41] = 3;
        bytes[offset::CHECKSUM as usize] = 0;
        bytes[offset::CHECKSUM as usize + 1] = 10;
        let m = Memory::from_story(bytes).unwrap();
        assert!(m.verify_checksum());
    }
}
