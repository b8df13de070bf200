//! Dictionary lookup and input tokenisation
//!
//! The dictionary header carries the word-separator list, the entry length
//! and the sorted entry array. Tokenisation splits the text buffer on spaces
//! and separators (separators are tokens in their own right), encodes each
//! token the way the dictionary stores words, and fills the parse buffer
//! with (address, length, position) records.

use log::debug;

use crate::error::ZResult;
use crate::memory::Memory;
use crate::zscii::TextCodec;

/// Parsed dictionary header.
#[derive(Debug, Clone)]
pub struct Dictionary {
    pub separators: Vec<u8>,
    pub entry_len: u32,
    /// Negative counts mark unsorted user dictionaries (searched linearly).
    pub entry_count: i16,
    pub entries_addr: u32,
}

/// One token produced by the splitter, before dictionary lookup.
#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    /// 1-indexed position within the text content.
    position: u8,
}

impl Dictionary {
    pub fn parse(mem: &Memory, base: u32) -> ZResult<Dictionary> {
        let sep_count = mem.byte(base)? as u32;
        let mut separators = Vec::with_capacity(sep_count as usize);
        for i in 0..sep_count {
            separators.push(mem.byte(base + 1 + i)?);
        }
        let entry_len = mem.byte(base + 1 + sep_count)? as u32;
        let entry_count = mem.word(base + 2 + sep_count)? as i16;
        Ok(Dictionary {
            separators,
            entry_len,
            entry_count,
            entries_addr: base + 4 + sep_count,
        })
    }

    /// Look a word up, returning its entry address or 0.
    pub fn lookup(&self, mem: &Memory, codec: &TextCodec, word: &str) -> ZResult<u16> {
        let zchars = if mem.version() <= 3 { 6 } else { 9 };
        let encoded = codec.encode_dictionary_word(word, zchars);

        if self.entry_count < 0 {
            return self.lookup_linear(mem, &encoded, -self.entry_count as u32);
        }
        self.lookup_binary(mem, &encoded, self.entry_count as u32)
    }

    fn entry_key(&self, mem: &Memory, index: u32, len: usize) -> ZResult<Vec<u8>> {
        let addr = self.entries_addr + index * self.entry_len;
        let mut key = Vec::with_capacity(len);
        for i in 0..len as u32 {
            key.push(mem.byte(addr + i)?);
        }
        Ok(key)
    }

    fn lookup_binary(&self, mem: &Memory, encoded: &[u8], count: u32) -> ZResult<u16> {
        let mut low = 0i32;
        let mut high = count as i32 - 1;
        while low <= high {
            let mid = (low + high) / 2;
            let key = self.entry_key(mem, mid as u32, encoded.len())?;
            match encoded.cmp(&key[..]) {
                std::cmp::Ordering::Less => high = mid - 1,
                std::cmp::Ordering::Greater => low = mid + 1,
                std::cmp::Ordering::Equal => {
                    return Ok((self.entries_addr + mid as u32 * self.entry_len) as u16);
                }
            }
        }
        Ok(0)
    }

    fn lookup_linear(&self, mem: &Memory, encoded: &[u8], count: u32) -> ZResult<u16> {
        for i in 0..count {
            if self.entry_key(mem, i, encoded.len())? == encoded {
                return Ok((self.entries_addr + i * self.entry_len) as u16);
            }
        }
        Ok(0)
    }

    fn is_separator(&self, b: u8) -> bool {
        self.separators.contains(&b)
    }
}

/// Read the text-buffer contents in version-appropriate framing.
fn read_text_content(mem: &Memory, text_buf: u32) -> ZResult<Vec<u8>> {
    let mut content = Vec::new();
    if mem.version() <= 4 {
        // Max-length prefix, then bytes terminated by NUL.
        let max = mem.byte(text_buf)? as u32;
        for i in 0..max {
            let b = mem.byte(text_buf + 1 + i)?;
            if b == 0 {
                break;
            }
            content.push(b);
        }
    } else {
        let len = mem.byte(text_buf + 1)? as u32;
        for i in 0..len {
            content.push(mem.byte(text_buf + 2 + i)?);
        }
    }
    Ok(content)
}

/// Split content into tokens: spaces delimit, separators delimit and stand
/// as single-character tokens. Positions are 1-indexed into the content.
fn split(dict: &Dictionary, content: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &b) in content.iter().enumerate() {
        if b == b' ' || dict.is_separator(b) {
            if let Some(s) = start.take() {
                tokens.push(Token {
                    text: content[s..i].iter().map(|&c| c as char).collect(),
                    position: (s + 1) as u8,
                });
            }
            if dict.is_separator(b) {
                tokens.push(Token {
                    text: (b as char).to_string(),
                    position: (i + 1) as u8,
                });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            text: content[s..].iter().map(|&c| c as char).collect(),
            position: (s + 1) as u8,
        });
    }
    tokens
}

/// Tokenise the text buffer into the parse buffer. `dict_base` 0 selects the
/// story's main dictionary. With `skip_unknown`, entries for words the
/// dictionary lacks are left untouched rather than zeroed.
pub fn tokenise(
    mem: &mut Memory,
    codec: &TextCodec,
    text_buf: u32,
    parse_buf: u32,
    dict_base: u32,
    skip_unknown: bool,
) -> ZResult<()> {
    let base = if dict_base == 0 {
        mem.header.dictionary
    } else {
        dict_base
    };
    let dict = Dictionary::parse(mem, base)?;
    let content = read_text_content(mem, text_buf)?;
    let tokens = split(&dict, &content);

    let max_tokens = mem.byte(parse_buf)? as usize;
    let written = tokens.len().min(max_tokens);
    if tokens.len() > max_tokens {
        debug!("parse buffer overflow: {} tokens, room for {}", tokens.len(), max_tokens);
    }
    mem.set_byte(parse_buf + 1, written as u8)?;

    for (i, token) in tokens.iter().take(written).enumerate() {
        let addr = dict.lookup(mem, codec, &token.text)?;
        let entry = parse_buf + 2 + 4 * i as u32;
        if addr == 0 && skip_unknown {
            debug!("token '{}' unknown, entry {} retained", token.text, i);
            continue;
        }
        mem.set_word(entry, addr)?;
        mem.set_byte(entry + 2, token.text.len() as u8)?;
        mem.set_byte(entry + 3, token.position)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::offset;

    /// v5 story with a dictionary holding {bottle, look, take} and the '.'
    /// separator, a text buffer and a parse buffer in dynamic memory.
    fn story() -> (Memory, TextCodec) {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0] = 5;
        bytes[offset::STATIC_BASE as usize] = 0x08;
        bytes[offset::HIGH_BASE as usize] = 0x08;
        bytes[offset::DICTIONARY as usize] = 0x02;

        // Dictionary at 0x200: 1 separator '.', entry length 7, 3 entries.
        let dict = 0x200usize;
        bytes[dict] = 1;
        bytes[dict + 1] = b'.';
        bytes[dict + 2] = 7;
        bytes[dict + 3] = 0;
        bytes[dict + 4] = 3;

        let mem = Memory::from_story(bytes).unwrap();
        let codec = TextCodec::new(&mem).unwrap();
        let mut raw = mem.raw().to_vec();
        let mut words = ["bottle", "look", "take"]
            .iter()
            .map(|w| codec.encode_dictionary_word(w, 9))
            .collect::<Vec<_>>();
        words.sort();
        for (i, w) in words.iter().enumerate() {
            let at = dict + 5 + i * 7;
            raw[at..at + 6].copy_from_slice(w);
        }
        let mem = Memory::from_story(raw).unwrap();
        let codec = TextCodec::new(&mem).unwrap();
        (mem, codec)
    }

    fn set_input(mem: &mut Memory, text_buf: u32, text: &str) {
        mem.set_byte(text_buf, 60).unwrap();
        mem.set_byte(text_buf + 1, text.len() as u8).unwrap();
        for (i, b) in text.bytes().enumerate() {
            mem.set_byte(text_buf + 2 + i as u32, b).unwrap();
        }
    }

    #[test]
    fn lookup_finds_and_misses() {
        let (mem, codec) = story();
        let dict = Dictionary::parse(&mem, 0x200).unwrap();
        assert_ne!(dict.lookup(&mem, &codec, "take").unwrap(), 0);
        assert_ne!(dict.lookup(&mem, &codec, "bottle").unwrap(), 0);
        assert_eq!(dict.lookup(&mem, &codec, "xyzzy").unwrap(), 0);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let (mem, codec) = story();
        let dict = Dictionary::parse(&mem, 0x200).unwrap();
        assert_eq!(
            dict.lookup(&mem, &codec, "TAKE").unwrap(),
            dict.lookup(&mem, &codec, "take").unwrap()
        );
    }

    #[test]
    fn tokenise_take_bottle_dot() {
        let (mut mem, codec) = story();
        set_input(&mut mem, 0x400, "take bottle.");
        mem.set_byte(0x500, 10).unwrap(); // parse buffer, room for 10

        tokenise(&mut mem, &codec, 0x400, 0x500, 0, false).unwrap();

        assert_eq!(mem.byte(0x501).unwrap(), 3);
        // take: known, length 4, position 1
        assert_ne!(mem.word(0x502).unwrap(), 0);
        assert_eq!(mem.byte(0x504).unwrap(), 4);
        assert_eq!(mem.byte(0x505).unwrap(), 1);
        // bottle: known, length 6, position 6
        assert_ne!(mem.word(0x506).unwrap(), 0);
        assert_eq!(mem.byte(0x508).unwrap(), 6);
        assert_eq!(mem.byte(0x509).unwrap(), 6);
        // '.': separator token, not in the dictionary, position 12
        assert_eq!(mem.word(0x50a).unwrap(), 0);
        assert_eq!(mem.byte(0x50c).unwrap(), 1);
        assert_eq!(mem.byte(0x50d).unwrap(), 12);
    }

    #[test]
    fn tokenise_points_at_the_right_entry() {
        let (mut mem, codec) = story();
        set_input(&mut mem, 0x400, "bottle");
        mem.set_byte(0x500, 10).unwrap();
        tokenise(&mut mem, &codec, 0x400, 0x500, 0, false).unwrap();

        let dict = Dictionary::parse(&mem, 0x200).unwrap();
        let direct = dict.lookup(&mem, &codec, "bottle").unwrap();
        assert_eq!(mem.word(0x502).unwrap(), direct);
        // The entry really is the encoded word.
        let encoded = codec.encode_dictionary_word("bottle", 9);
        for (i, &b) in encoded.iter().enumerate() {
            assert_eq!(mem.byte(direct as u32 + i as u32).unwrap(), b);
        }
    }

    #[test]
    fn skip_unknown_retains_existing_entries() {
        let (mut mem, codec) = story();
        set_input(&mut mem, 0x400, "take xyzzy");
        mem.set_byte(0x500, 10).unwrap();
        // Seed the second entry with a sentinel.
        mem.set_word(0x506, 0xdead).unwrap();

        tokenise(&mut mem, &codec, 0x400, 0x500, 0, true).unwrap();
        assert_eq!(mem.byte(0x501).unwrap(), 2);
        assert_ne!(mem.word(0x502).unwrap(), 0);
        assert_eq!(mem.word(0x506).unwrap(), 0xdead);
    }

    #[test]
    fn parse_buffer_overflow_is_clamped() {
        let (mut mem, codec) = story();
        set_input(&mut mem, 0x400, "take take take take");
        mem.set_byte(0x500, 2).unwrap();
        tokenise(&mut mem, &codec, 0x400, 0x500, 0, false).unwrap();
        assert_eq!(mem.byte(0x501).unwrap(), 2);
    }

    #[test]
    fn v3_framing_is_null_terminated() {
        let (mem, _) = story();
        let mut raw = mem.raw().to_vec();
        raw[0] = 3;
        let mut mem = Memory::from_story(raw).unwrap();
        let codec = TextCodec::new(&mem).unwrap();
        mem.set_byte(0x400, 20).unwrap();
        for (i, b) in b"go north\0garbage".iter().enumerate() {
            mem.set_byte(0x401 + i as u32, *b).unwrap();
        }
        mem.set_byte(0x500, 5).unwrap();
        tokenise(&mut mem, &codec, 0x400, 0x500, 0, false).unwrap();
        assert_eq!(mem.byte(0x501).unwrap(), 2);
        assert_eq!(mem.byte(0x504).unwrap(), 2); // "go"
        assert_eq!(mem.byte(0x508).unwrap(), 5); // "north"
        assert_eq!(mem.byte(0x509).unwrap(), 4); // position of "north"
    }
}
