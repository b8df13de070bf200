//! Builders for synthetic story images
//!
//! Tests assemble tiny stories byte by byte: a header, a code region, and
//! whatever tables the scenario needs. The memory map is fixed so tests can
//! name addresses directly.

use std::cell::RefCell;
use std::rc::Rc;

use crate::executor::Machine;
use crate::header::offset;
use crate::host::{BufferScreen, MemStorage, NullMedia};
use crate::memory::Memory;
use crate::random::ZRand;
use crate::zscii::TextCodec;

/// Fixed layout for built stories.
pub const GLOBALS_ADDR: u32 = 0x0040;
pub const OBJECTS_ADDR: u32 = 0x0240;
pub const DICT_ADDR: u32 = 0x0400;
pub const TEXT_BUF: u32 = 0x0500;
pub const PARSE_BUF: u32 = 0x0540;
pub const SCRATCH: u32 = 0x0600;
pub const STATIC_BASE: u32 = 0x0800;
pub const CODE_BASE: u32 = 0x1000;

pub struct StoryBuilder {
    bytes: Vec<u8>,
    version: u8,
}

impl StoryBuilder {
    pub fn new(version: u8) -> StoryBuilder {
        let mut bytes = vec![0u8; 0x4000];
        bytes[0] = version;
        bytes[2] = 0;
        bytes[3] = 1; // release 1
        bytes[0x12..0x18].copy_from_slice(b"260801");
        let mut builder = StoryBuilder { bytes, version };
        builder.word(offset::HIGH_BASE, CODE_BASE as u16);
        builder.word(offset::INITIAL_PC, CODE_BASE as u16);
        builder.word(offset::GLOBALS, GLOBALS_ADDR as u16);
        builder.word(offset::OBJECT_TABLE, OBJECTS_ADDR as u16);
        builder.word(offset::DICTIONARY, DICT_ADDR as u16);
        builder.word(offset::STATIC_BASE, STATIC_BASE as u16);
        builder
    }

    pub fn byte(&mut self, addr: u32, value: u8) -> &mut Self {
        self.bytes[addr as usize] = value;
        self
    }

    pub fn word(&mut self, addr: u32, value: u16) -> &mut Self {
        self.bytes[addr as usize] = (value >> 8) as u8;
        self.bytes[addr as usize + 1] = (value & 0xff) as u8;
        self
    }

    pub fn write(&mut self, addr: u32, data: &[u8]) -> &mut Self {
        self.bytes[addr as usize..addr as usize + data.len()].copy_from_slice(data);
        self
    }

    /// Set global variable G<index> (variable 0x10 + index).
    pub fn global(&mut self, index: u8, value: u16) -> &mut Self {
        self.word(GLOBALS_ADDR + index as u32 * 2, value)
    }

    pub fn initial_pc(&mut self, addr: u32) -> &mut Self {
        self.word(offset::INITIAL_PC, addr as u16)
    }

    /// Lay down a routine header at `addr` (locals count plus, in v1-4,
    /// their initial values) and return the address of its first
    /// instruction.
    pub fn routine(&mut self, addr: u32, locals: &[u16]) -> u32 {
        self.byte(addr, locals.len() as u8);
        let mut code = addr + 1;
        if self.version <= 4 {
            for &value in locals {
                self.word(code, value);
                code += 2;
            }
        }
        code
    }

    /// Packed form of a routine address for this version.
    pub fn pack(&self, addr: u32) -> u16 {
        match self.version {
            1..=3 => (addr / 2) as u16,
            4..=5 => (addr / 4) as u16,
            _ => (addr / 8) as u16,
        }
    }

    /// Build a v3 object table: one (parent, sibling, child) triple per
    /// object, each with an empty short name and no properties.
    pub fn objects3(&mut self, links: &[(u8, u8, u8)]) -> &mut Self {
        let tree = OBJECTS_ADDR + 31 * 2;
        for (i, &(parent, sibling, child)) in links.iter().enumerate() {
            let entry = tree + i as u32 * 9;
            let prop_table = OBJECTS_ADDR + 0x100 + i as u32 * 0x10;
            self.byte(entry + 4, parent);
            self.byte(entry + 5, sibling);
            self.byte(entry + 6, child);
            self.word(entry + 7, prop_table as u16);
            self.byte(prop_table, 0); // empty short name
            self.byte(prop_table + 1, 0); // property terminator
        }
        self
    }

    /// Build the dictionary: separators, then the words (sorted into entry
    /// order here, encoded with the real codec).
    pub fn dictionary(&mut self, separators: &[u8], words: &[&str]) -> &mut Self {
        let mem = Memory::from_story(self.bytes.clone()).unwrap();
        let codec = TextCodec::new(&mem).unwrap();
        let word_bytes = mem.header.dictionary_word_bytes();
        let zchars = mem.header.dictionary_word_zchars();
        let entry_len = (word_bytes + 1) as u8;

        let mut at = DICT_ADDR;
        self.byte(at, separators.len() as u8);
        at += 1;
        for &sep in separators {
            self.byte(at, sep);
            at += 1;
        }
        self.byte(at, entry_len);
        self.word(at + 1, words.len() as u16);
        at += 3;

        let mut encoded: Vec<Vec<u8>> = words
            .iter()
            .map(|w| codec.encode_dictionary_word(w, zchars))
            .collect();
        encoded.sort();
        for entry in encoded {
            self.write(at, &entry);
            at += entry_len as u32;
        }
        self
    }

    pub fn build_memory(&self) -> Memory {
        Memory::from_story(self.bytes.clone()).unwrap()
    }

    /// Assemble the machine with buffering hosts and a fixed RNG seed.
    /// Returns the screen handle so tests can read the output back.
    pub fn build(&self) -> (Machine, Rc<RefCell<BufferScreen>>) {
        self.build_with_storage(Rc::new(RefCell::new(MemStorage::new())))
    }

    /// Same, with a caller-supplied storage handle (shared between
    /// machines in the save/restore tests).
    pub fn build_with_storage(
        &self,
        storage: Rc<RefCell<MemStorage>>,
    ) -> (Machine, Rc<RefCell<BufferScreen>>) {
        let screen = Rc::new(RefCell::new(BufferScreen::new()));
        let mem = self.build_memory();
        let mut machine = Machine::new(
            mem,
            Box::new(screen.clone()),
            Box::new(storage),
            Box::new(NullMedia),
        )
        .unwrap();
        machine.set_rng(ZRand::new_predictable(1));
        (machine, screen)
    }
}

/// Run until the machine halts or `limit` instructions have executed.
pub fn run_to_halt(machine: &mut Machine, limit: u32) {
    for _ in 0..limit {
        match machine.step() {
            Ok(crate::executor::Step::Halted) => return,
            Ok(_) => {}
            Err(e) => panic!("unexpected fatal error: {e}"),
        }
    }
    panic!("machine did not halt within {limit} steps");
}
