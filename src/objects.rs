//! The object tree: attributes, properties, parent/sibling/child links
//!
//! Objects are numbered from 1 and live in a version-dependent layout: v1-3
//! uses 9-byte entries with 32 attribute bits and byte-sized links, v4+ uses
//! 14-byte entries with 48 attribute bits and word-sized links. The property
//! defaults table sits at the head of the object table.
//!
//! Object 0 is "nowhere". The tree accessors (`parent`, `sibling`, `child`)
//! and `get_prop` return 0 for it with a logged warning, which decades of
//! shipped games depend on; the mutating operations treat it as an error.

use log::warn;

use crate::error::{RuntimeError, ZResult};
use crate::memory::Memory;
use crate::zscii::TextCodec;

#[derive(Debug, Clone, Copy)]
pub struct ObjectTable {
    base: u32,
    version: u8,
}

/// One property's placement: number, data address and length, and the size
/// of its header byte(s).
#[derive(Debug, Clone, Copy, PartialEq)]
struct PropSlot {
    number: u8,
    data_addr: u32,
    data_len: u32,
    header_len: u32,
}

impl ObjectTable {
    pub fn new(mem: &Memory) -> ObjectTable {
        ObjectTable {
            base: mem.header.object_table,
            version: mem.version(),
        }
    }

    pub fn max_objects(&self) -> u16 {
        if self.version <= 3 {
            255
        } else {
            u16::MAX
        }
    }

    pub fn max_attribute(&self) -> u16 {
        if self.version <= 3 {
            31
        } else {
            47
        }
    }

    fn defaults_count(&self) -> u32 {
        if self.version <= 3 {
            31
        } else {
            63
        }
    }

    fn entry_size(&self) -> u32 {
        if self.version <= 3 {
            9
        } else {
            14
        }
    }

    fn attr_bytes(&self) -> u32 {
        if self.version <= 3 {
            4
        } else {
            6
        }
    }

    fn tree_base(&self) -> u32 {
        self.base + self.defaults_count() * 2
    }

    fn check(&self, obj: u16) -> ZResult<()> {
        if obj == 0 || obj > self.max_objects() {
            return Err(RuntimeError::BadObject(obj));
        }
        Ok(())
    }

    fn entry_addr(&self, obj: u16) -> u32 {
        self.tree_base() + (obj as u32 - 1) * self.entry_size()
    }

    pub fn get_attr(&self, mem: &Memory, obj: u16, attr: u16) -> ZResult<bool> {
        if obj == 0 {
            warn!("test_attr on object 0");
            return Ok(false);
        }
        self.check(obj)?;
        if attr > self.max_attribute() {
            warn!("attribute {} out of range, reported clear", attr);
            return Ok(false);
        }
        let byte = mem.byte(self.entry_addr(obj) + attr as u32 / 8)?;
        Ok(byte & (0x80 >> (attr % 8)) != 0)
    }

    pub fn set_attr(&self, mem: &mut Memory, obj: u16, attr: u16) -> ZResult<()> {
        self.write_attr(mem, obj, attr, true)
    }

    pub fn clear_attr(&self, mem: &mut Memory, obj: u16, attr: u16) -> ZResult<()> {
        self.write_attr(mem, obj, attr, false)
    }

    fn write_attr(&self, mem: &mut Memory, obj: u16, attr: u16, value: bool) -> ZResult<()> {
        self.check(obj)?;
        if attr > self.max_attribute() {
            warn!("attribute {} out of range, write ignored", attr);
            return Ok(());
        }
        let addr = self.entry_addr(obj) + attr as u32 / 8;
        let mask = 0x80 >> (attr % 8);
        let byte = mem.byte(addr)?;
        let byte = if value { byte | mask } else { byte & !mask };
        mem.set_byte(addr, byte)
    }

    fn link_addr(&self, obj: u16, which: u32) -> u32 {
        // Links follow the attribute bytes: parent, sibling, child.
        let width = if self.version <= 3 { 1 } else { 2 };
        self.entry_addr(obj) + self.attr_bytes() + which * width
    }

    fn read_link(&self, mem: &Memory, obj: u16, which: u32) -> ZResult<u16> {
        if self.version <= 3 {
            Ok(mem.byte(self.link_addr(obj, which))? as u16)
        } else {
            mem.word(self.link_addr(obj, which))
        }
    }

    fn write_link(&self, mem: &mut Memory, obj: u16, which: u32, value: u16) -> ZResult<()> {
        if self.version <= 3 {
            mem.set_byte(self.link_addr(obj, which), value as u8)
        } else {
            mem.set_word(self.link_addr(obj, which), value)
        }
    }

    pub fn parent(&self, mem: &Memory, obj: u16) -> ZResult<u16> {
        if obj == 0 {
            warn!("get_parent on object 0");
            return Ok(0);
        }
        self.check(obj)?;
        self.read_link(mem, obj, 0)
    }

    pub fn sibling(&self, mem: &Memory, obj: u16) -> ZResult<u16> {
        if obj == 0 {
            warn!("get_sibling on object 0");
            return Ok(0);
        }
        self.check(obj)?;
        self.read_link(mem, obj, 1)
    }

    pub fn child(&self, mem: &Memory, obj: u16) -> ZResult<u16> {
        if obj == 0 {
            warn!("get_child on object 0");
            return Ok(0);
        }
        self.check(obj)?;
        self.read_link(mem, obj, 2)
    }

    /// Unlink `obj` from its parent's child chain, leaving it rootless.
    pub fn remove_obj(&self, mem: &mut Memory, obj: u16) -> ZResult<()> {
        self.check(obj)?;
        let parent = self.read_link(mem, obj, 0)?;
        if parent == 0 {
            return Ok(());
        }
        let obj_sibling = self.read_link(mem, obj, 1)?;
        let first = self.child(mem, parent)?;
        if first == obj {
            self.write_link(mem, parent, 2, obj_sibling)?;
        } else {
            // Walk the chain to find the predecessor.
            let mut current = first;
            while current != 0 {
                let next = self.read_link(mem, current, 1)?;
                if next == obj {
                    self.write_link(mem, current, 1, obj_sibling)?;
                    break;
                }
                current = next;
            }
        }
        self.write_link(mem, obj, 0, 0)?;
        self.write_link(mem, obj, 1, 0)
    }

    /// Detach `obj` and make it the first child of `dest`; the former first
    /// child becomes its sibling.
    pub fn insert_obj(&self, mem: &mut Memory, obj: u16, dest: u16) -> ZResult<()> {
        self.check(obj)?;
        self.check(dest)?;
        self.remove_obj(mem, obj)?;
        let old_child = self.child(mem, dest)?;
        self.write_link(mem, dest, 2, obj)?;
        self.write_link(mem, obj, 0, dest)?;
        self.write_link(mem, obj, 1, old_child)
    }

    fn prop_table_addr(&self, mem: &Memory, obj: u16) -> ZResult<u32> {
        let offset = self.attr_bytes() + if self.version <= 3 { 3 } else { 6 };
        Ok(mem.word(self.entry_addr(obj) + offset)? as u32)
    }

    /// Address of the first property header, past the short name.
    fn first_prop_addr(&self, mem: &Memory, obj: u16) -> ZResult<u32> {
        let table = self.prop_table_addr(mem, obj)?;
        let name_words = mem.byte(table)? as u32;
        Ok(table + 1 + name_words * 2)
    }

    /// Read a property header at `addr`; None at the terminating zero byte.
    fn prop_slot(&self, mem: &Memory, addr: u32) -> ZResult<Option<PropSlot>> {
        let size_byte = mem.byte(addr)?;
        if size_byte == 0 {
            return Ok(None);
        }
        let slot = if self.version <= 3 {
            PropSlot {
                number: size_byte & 0x1f,
                data_len: ((size_byte >> 5) & 0x07) as u32 + 1,
                data_addr: addr + 1,
                header_len: 1,
            }
        } else if size_byte & 0x80 != 0 {
            let second = mem.byte(addr + 1)?;
            let len = (second & 0x3f) as u32;
            PropSlot {
                number: size_byte & 0x3f,
                data_len: if len == 0 { 64 } else { len },
                data_addr: addr + 2,
                header_len: 2,
            }
        } else {
            PropSlot {
                number: size_byte & 0x3f,
                data_len: if size_byte & 0x40 != 0 { 2 } else { 1 },
                data_addr: addr + 1,
                header_len: 1,
            }
        };
        Ok(Some(slot))
    }

    fn find_prop(&self, mem: &Memory, obj: u16, prop: u8) -> ZResult<Option<PropSlot>> {
        let mut addr = self.first_prop_addr(mem, obj)?;
        while let Some(slot) = self.prop_slot(mem, addr)? {
            if slot.number == prop {
                return Ok(Some(slot));
            }
            // Properties are stored in descending number order.
            if slot.number < prop {
                return Ok(None);
            }
            addr = slot.data_addr + slot.data_len;
        }
        Ok(None)
    }

    /// Property value: the object's own entry if present, the defaults table
    /// otherwise. Byte-wide for 1-byte properties, word-wide for 2-byte.
    pub fn get_prop(&self, mem: &Memory, obj: u16, prop: u8) -> ZResult<u16> {
        if obj == 0 {
            warn!("get_prop on object 0");
            return Ok(0);
        }
        self.check(obj)?;
        if let Some(slot) = self.find_prop(mem, obj, prop)? {
            if slot.data_len > 2 {
                warn!(
                    "get_prop on property {} of length {}, reading a word",
                    prop, slot.data_len
                );
            }
            return if slot.data_len == 1 {
                Ok(mem.byte(slot.data_addr)? as u16)
            } else {
                mem.word(slot.data_addr)
            };
        }
        if prop == 0 || prop as u32 > self.defaults_count() {
            return Err(RuntimeError::BadObject(obj));
        }
        mem.word(self.base + (prop as u32 - 1) * 2)
    }

    pub fn put_prop(&self, mem: &mut Memory, obj: u16, prop: u8, value: u16) -> ZResult<()> {
        self.check(obj)?;
        let slot = self
            .find_prop(mem, obj, prop)?
            .ok_or(RuntimeError::BadObject(obj))?;
        match slot.data_len {
            1 => mem.set_byte(slot.data_addr, value as u8),
            _ => {
                if slot.data_len > 2 {
                    warn!(
                        "put_prop on property {} of length {}, writing a word",
                        prop, slot.data_len
                    );
                }
                mem.set_word(slot.data_addr, value)
            }
        }
    }

    /// Data address of a property, 0 when the object lacks it.
    pub fn get_prop_addr(&self, mem: &Memory, obj: u16, prop: u8) -> ZResult<u16> {
        if obj == 0 {
            warn!("get_prop_addr on object 0");
            return Ok(0);
        }
        self.check(obj)?;
        Ok(self
            .find_prop(mem, obj, prop)?
            .map(|slot| slot.data_addr as u16)
            .unwrap_or(0))
    }

    /// Property length given its data address, as `get_prop_len` defines it;
    /// address 0 yields 0.
    pub fn get_prop_len(&self, mem: &Memory, data_addr: u16) -> ZResult<u16> {
        if data_addr == 0 {
            return Ok(0);
        }
        let size_byte = mem.byte(data_addr as u32 - 1)?;
        let len = if self.version <= 3 {
            ((size_byte >> 5) & 0x07) as u16 + 1
        } else if size_byte & 0x80 != 0 {
            // The byte before the data is the second of a two-byte header.
            let len = (size_byte & 0x3f) as u16;
            if len == 0 {
                64
            } else {
                len
            }
        } else if size_byte & 0x40 != 0 {
            2
        } else {
            1
        };
        Ok(len)
    }

    /// Next property number after `prop`; `prop` 0 yields the first, the
    /// last yields 0.
    pub fn get_next_prop(&self, mem: &Memory, obj: u16, prop: u8) -> ZResult<u8> {
        if obj == 0 {
            warn!("get_next_prop on object 0");
            return Ok(0);
        }
        self.check(obj)?;
        if prop == 0 {
            let addr = self.first_prop_addr(mem, obj)?;
            return Ok(self.prop_slot(mem, addr)?.map(|s| s.number).unwrap_or(0));
        }
        match self.find_prop(mem, obj, prop)? {
            Some(slot) => {
                let next = slot.data_addr + slot.data_len;
                Ok(self.prop_slot(mem, next)?.map(|s| s.number).unwrap_or(0))
            }
            None => {
                warn!("get_next_prop on missing property {} of object {}", prop, obj);
                Ok(0)
            }
        }
    }

    /// The object's short name, decoded from the head of its property table.
    pub fn name(&self, mem: &Memory, codec: &TextCodec, obj: u16) -> ZResult<String> {
        if obj == 0 {
            return Ok(String::new());
        }
        self.check(obj)?;
        let table = self.prop_table_addr(mem, obj)?;
        let name_words = mem.byte(table)?;
        if name_words == 0 {
            return Ok(String::new());
        }
        let (name, _) = codec.decode(mem.raw(), table as usize + 1)?;
        Ok(name)
    }

    /// Best-effort object count, for the dump tools: entries run from the
    /// tree base up to the lowest property table.
    pub fn count_estimate(&self, mem: &Memory) -> u16 {
        let mut lowest_table = u32::MAX;
        let mut count = 0u16;
        let mut addr = self.tree_base();
        while count < self.max_objects() {
            if addr + self.entry_size() > lowest_table.min(mem.len()) {
                break;
            }
            let table_field = self.entry_size() - 2;
            match mem.word(addr + table_field) {
                Ok(t) if (t as u32) > addr => lowest_table = lowest_table.min(t as u32),
                _ => break,
            }
            count += 1;
            addr += self.entry_size();
        }
        count
    }
}
