//! ZSCII and Z-string codec
//!
//! Z-strings pack three 5-bit Z-characters per 16-bit word; the high bit of
//! the final word terminates the string. Decoding runs a small state machine
//! over alphabet shifts, abbreviation escapes and the 10-bit ZSCII escape.
//! The codec also provides the exact dictionary encoding so tokenised input
//! compares byte-for-byte with stored entries.

use bitreader::BitReader;
use lazy_static::lazy_static;
use log::{debug, warn};

use crate::error::{RuntimeError, ZResult};
use crate::memory::Memory;

const ALPHABET_A0: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// A2 for v2+; position 0 (Z-char 6) is the ZSCII escape, position 1 the
/// newline, both handled before this table is consulted.
const ALPHABET_A2: &[u8] = b"?\n0123456789.,!?_#'\"/\\-:()";
/// V1 has no newline in A2 and gains '<' instead.
const ALPHABET_A2_V1: &[u8] = b"?0123456789.,!?_#'\"/\\<-:()";

lazy_static! {
    /// Default ZSCII 155..223 to Unicode, from the standard translation
    /// table.
    static ref DEFAULT_UNICODE: Vec<char> =
        "äöüÄÖÜß»«ëïÿËÏáéíóúýÁÉÍÓÚÝàèìòùÀÈÌÒÙâêîôûÂÊÎÔÛåÅøØãñõÃÑÕæÆçÇþðÞÐ£œŒ¡¿"
            .chars()
            .collect();
}

/// Text codec bound to one story: version rules, alphabet rows (possibly
/// game-supplied), the Unicode translation table, and the abbreviation table
/// decoded once up front.
pub struct TextCodec {
    version: u8,
    alphabets: [[char; 26]; 3],
    unicode: Vec<char>,
    abbreviations: Vec<String>,
}

/// Unpack one Z-string word into (is_last, three Z-characters).
pub fn unpack_zchars(word: u16) -> (bool, [u8; 3]) {
    let bytes = word.to_be_bytes();
    let mut br = BitReader::new(&bytes);
    // The reads cannot fail: the slice is exactly 16 bits.
    let last = br.read_u8(1).unwrap_or(0) == 1;
    let mut chars = [0u8; 3];
    for c in chars.iter_mut() {
        *c = br.read_u8(5).unwrap_or(0);
    }
    (last, chars)
}

fn default_alphabets(version: u8) -> [[char; 26]; 3] {
    let a2 = if version == 1 {
        ALPHABET_A2_V1
    } else {
        ALPHABET_A2
    };
    let row = |src: &[u8]| {
        let mut out = ['?'; 26];
        for (i, &b) in src.iter().enumerate() {
            out[i] = b as char;
        }
        out
    };
    [row(ALPHABET_A0), row(ALPHABET_A1), row(a2)]
}

impl TextCodec {
    pub fn new(mem: &Memory) -> ZResult<TextCodec> {
        let version = mem.version();
        let mut codec = TextCodec {
            version,
            alphabets: default_alphabets(version),
            unicode: DEFAULT_UNICODE.clone(),
            abbreviations: Vec::new(),
        };

        // The Unicode table loads first: a custom alphabet row may name
        // extended ZSCII characters that resolve through it.
        if version >= 5 {
            codec.load_unicode_table(mem)?;
        }
        if version >= 5 && mem.header.alphabet_table != 0 {
            codec.load_alphabet_table(mem)?;
        }
        codec.load_abbreviations(mem)?;
        Ok(codec)
    }

    /// Game-supplied alphabet table: 78 ZSCII bytes, three rows of 26.
    /// Row 3 positions 0 and 1 stay escape/newline whatever the table says.
    fn load_alphabet_table(&mut self, mem: &Memory) -> ZResult<()> {
        let base = mem.header.alphabet_table;
        for row in 0..3 {
            for col in 0..26 {
                let code = mem.byte(base + (row * 26 + col) as u32)? as u16;
                if row == 2 && col < 2 {
                    continue;
                }
                self.alphabets[row][col] = self.zscii_to_char(code).unwrap_or('?');
            }
        }
        self.alphabets[2][1] = '\n';
        Ok(())
    }

    /// Header extension word 3 may point at a custom ZSCII 155+ table.
    fn load_unicode_table(&mut self, mem: &Memory) -> ZResult<()> {
        let ext = mem.header.header_extension;
        if ext == 0 || mem.word(ext)? < 3 {
            return Ok(());
        }
        let table = mem.word(ext + 6)? as u32;
        if table == 0 {
            return Ok(());
        }
        let count = mem.byte(table)? as u32;
        let mut unicode = Vec::with_capacity(count as usize);
        for i in 0..count {
            let cp = mem.word(table + 1 + 2 * i)? as u32;
            unicode.push(char::from_u32(cp).unwrap_or('?'));
        }
        debug!("custom unicode table: {} entries at {:#05x}", count, table);
        self.unicode = unicode;
        Ok(())
    }

    /// Decode every abbreviation up front so the main decode path is a table
    /// lookup. Escapes inside an abbreviation are not expanded.
    fn load_abbreviations(&mut self, mem: &Memory) -> ZResult<()> {
        let base = mem.header.abbreviations;
        let count = match self.version {
            1 => 0,
            2 => 32,
            _ => 96,
        };
        if base == 0 {
            return Ok(());
        }
        let mut table = Vec::with_capacity(count);
        for i in 0..count {
            let word_addr = mem.word(base + 2 * i as u32)? as u32;
            let byte_addr = word_addr * 2;
            if byte_addr == 0 || byte_addr >= mem.len() {
                table.push(String::new());
                continue;
            }
            let (text, _) = self.decode_inner(mem.raw(), byte_addr as usize, false)?;
            table.push(text);
        }
        self.abbreviations = table;
        Ok(())
    }

    /// Decode the Z-string at `addr`. Returns the text and the number of
    /// bytes consumed.
    pub fn decode(&self, bytes: &[u8], addr: usize) -> ZResult<(String, usize)> {
        self.decode_inner(bytes, addr, true)
    }

    fn decode_inner(
        &self,
        bytes: &[u8],
        addr: usize,
        expand_abbrevs: bool,
    ) -> ZResult<(String, usize)> {
        let mut zchars = Vec::new();
        let mut at = addr;
        loop {
            if at + 1 >= bytes.len() {
                return Err(RuntimeError::BadAddress(at as u32));
            }
            let word = ((bytes[at] as u16) << 8) | bytes[at + 1] as u16;
            at += 2;
            let (last, chars) = unpack_zchars(word);
            zchars.extend_from_slice(&chars);
            if last {
                break;
            }
            if zchars.len() > 3 * 0x1000 {
                return Err(RuntimeError::decode(addr as u32, "unterminated Z-string"));
            }
        }
        Ok((self.interpret(&zchars, expand_abbrevs), at - addr))
    }

    /// Run the alphabet state machine over a run of Z-characters.
    fn interpret(&self, zchars: &[u8], expand_abbrevs: bool) -> String {
        let mut out = String::new();
        // Locked alphabet (v1-2 shift-lock) and the alphabet for the next
        // character only.
        let mut locked = 0usize;
        let mut current = 0usize;
        let mut i = 0;
        while i < zchars.len() {
            let zc = zchars[i];
            i += 1;
            match zc {
                0 => out.push(' '),
                1 if self.version == 1 => out.push('\n'),
                1..=3 if self.abbrev_zchar(zc) => {
                    // Abbreviation escape: next Z-char is the index.
                    if i >= zchars.len() {
                        break;
                    }
                    let index = (zc as usize - 1) * 32 + zchars[i] as usize;
                    i += 1;
                    if !expand_abbrevs {
                        warn!("abbreviation escape inside an abbreviation, ignored");
                        continue;
                    }
                    match self.abbreviations.get(index) {
                        Some(text) => out.push_str(text),
                        None => debug!("abbreviation {} out of range", index),
                    }
                    current = locked;
                }
                2..=5 if self.version <= 2 => {
                    // V1-2: 2/3 shift once, 4/5 shift-lock.
                    let next = match zc {
                        2 | 4 => (current + 1) % 3,
                        _ => (current + 2) % 3,
                    };
                    if zc >= 4 {
                        locked = next;
                    }
                    current = next;
                    continue;
                }
                4 => {
                    current = 1;
                    continue;
                }
                5 => {
                    current = 2;
                    continue;
                }
                6 if current == 2 => {
                    // 10-bit ZSCII escape: two more Z-chars, high then low.
                    if i + 1 < zchars.len() {
                        let code = ((zchars[i] as u16) << 5) | zchars[i + 1] as u16;
                        i += 2;
                        if let Some(ch) = self.zscii_to_char(code) {
                            out.push(ch);
                        }
                    } else {
                        i = zchars.len();
                    }
                    current = locked;
                }
                7 if current == 2 && self.version >= 2 => {
                    out.push('\n');
                    current = locked;
                }
                _ => {
                    out.push(self.alphabets[current][(zc - 6) as usize]);
                    current = locked;
                }
            }
        }
        out
    }

    fn abbrev_zchar(&self, zc: u8) -> bool {
        match self.version {
            1 => false,
            2 => zc == 1,
            _ => (1..=3).contains(&zc),
        }
    }

    /// ZSCII code to Unicode. Non-printable codes yield None.
    pub fn zscii_to_char(&self, code: u16) -> Option<char> {
        match code {
            0 => None,
            9 if self.version == 6 => Some('\t'),
            11 if self.version == 6 => Some(' '),
            13 => Some('\n'),
            32..=126 => Some(code as u8 as char),
            155..=251 => {
                let index = (code - 155) as usize;
                match self.unicode.get(index) {
                    Some(&ch) => Some(ch),
                    None => {
                        debug!("ZSCII {} beyond the translation table", code);
                        None
                    }
                }
            }
            _ => {
                debug!("non-printable ZSCII {}", code);
                None
            }
        }
    }

    /// Unicode to ZSCII, the inverse direction for input and encoding.
    pub fn char_to_zscii(&self, ch: char) -> Option<u16> {
        match ch {
            '\n' => Some(13),
            ' '..='~' => Some(ch as u16),
            _ => self
                .unicode
                .iter()
                .position(|&u| u == ch)
                .map(|i| 155 + i as u16),
        }
    }

    /// Encode a word exactly as the dictionary stores it: lowercased,
    /// truncated or padded with Z-char 5 to `zchar_len` characters, packed
    /// three per word with the terminator bit on the last word.
    pub fn encode_dictionary_word(&self, word: &str, zchar_len: usize) -> Vec<u8> {
        let mut zchars: Vec<u8> = Vec::new();
        for ch in word.chars() {
            if zchars.len() >= zchar_len {
                break;
            }
            for lc in ch.to_lowercase() {
                self.push_zchars_for(lc, &mut zchars);
            }
        }
        zchars.truncate(zchar_len);
        while zchars.len() < zchar_len {
            zchars.push(5);
        }

        let mut bytes = Vec::with_capacity(zchar_len / 3 * 2);
        for (i, triplet) in zchars.chunks(3).enumerate() {
            let mut word = ((triplet[0] as u16) << 10)
                | ((triplet[1] as u16) << 5)
                | triplet[2] as u16;
            if (i + 1) * 3 >= zchar_len {
                word |= 0x8000;
            }
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    fn push_zchars_for(&self, ch: char, out: &mut Vec<u8>) {
        if ch == ' ' {
            out.push(0);
            return;
        }
        for (row, alphabet) in self.alphabets.iter().enumerate() {
            // Row 2 position 0 is the escape slot, and position 1 the
            // newline slot in v2+; neither is a lookup candidate.
            let start = match (row, self.version) {
                (2, 1) => 1,
                (2, _) => 2,
                _ => 0,
            };
            if let Some(col) = alphabet[start..]
                .iter()
                .position(|&a| a == ch)
                .map(|p| p + start)
            {
                if row != 0 {
                    out.push(self.shift_zchar(row));
                }
                out.push(col as u8 + 6);
                return;
            }
        }
        // Not in any alphabet: 10-bit ZSCII escape through A2.
        let code = self.char_to_zscii(ch).unwrap_or(b'?' as u16);
        out.push(self.shift_zchar(2));
        out.push(6);
        out.push(((code >> 5) & 0x1f) as u8);
        out.push((code & 0x1f) as u8);
    }

    /// The single-shift Z-char selecting alphabet row 1 or 2.
    fn shift_zchar(&self, row: usize) -> u8 {
        if self.version <= 2 {
            if row == 1 {
                2
            } else {
                3
            }
        } else if row == 1 {
            4
        } else {
            5
        }
    }

    pub fn abbreviation(&self, index: usize) -> Option<&str> {
        self.abbreviations.get(index).map(String::as_str)
    }
}

/// Write Z-characters into a memory image; used by `encode_text`.
pub fn write_encoded(mem: &mut Memory, addr: u32, encoded: &[u8]) -> ZResult<()> {
    for (i, &b) in encoded.iter().enumerate() {
        mem.set_byte(addr + i as u32, b)?;
    }
    Ok(())
}
