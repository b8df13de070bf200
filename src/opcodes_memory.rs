//! Variable and table handlers: load/store, push/pull, inc/dec, the array
//! opcodes and the table scans
//!
//! The inc/dec/load/store family addresses variables indirectly: the first
//! operand names the variable. Through variable 0 that means a pop or a
//! push on the current frame's eval stack, like any other access.

use log::debug;

use crate::error::ZResult;
use crate::executor::{arg, arg_or, Machine, Outcome};
use crate::instruction::Instruction;
use crate::opcode_tables::Opcode;

impl Machine {
    pub(crate) fn op_store(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let var = arg(self, ops, 0)? as u8;
        let value = arg(self, ops, 1)?;
        self.write_var(var, value)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_load(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let var = arg(self, ops, 0)? as u8;
        let value = self.read_var(var)?;
        Ok(Outcome::Value(value))
    }

    pub(crate) fn op_push(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let value = arg(self, ops, 0)?;
        self.stack.push(value)?;
        Ok(Outcome::Done)
    }

    /// pull (var) in v1-5; v6 stores the popped value instead.
    pub(crate) fn op_pull(&mut self, _inst: &Instruction, ops: &[u16]) -> ZResult<Outcome> {
        let value = self.stack.pop()?;
        if self.mem.version() >= 6 {
            return Ok(Outcome::Value(value));
        }
        let var = arg(self, ops, 0)? as u8;
        self.write_var(var, value)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_inc_dec(&mut self, ops: &[u16], delta: i16) -> ZResult<Outcome> {
        let var = arg(self, ops, 0)? as u8;
        let value = (self.read_var(var)? as i16).wrapping_add(delta);
        self.write_var(var, value as u16)?;
        Ok(Outcome::Done)
    }

    /// inc_chk / dec_chk: step the variable, then branch on a signed
    /// comparison against the second operand.
    pub(crate) fn op_step_chk(&mut self, ops: &[u16], delta: i16) -> ZResult<Outcome> {
        let var = arg(self, ops, 0)? as u8;
        let limit = arg(self, ops, 1)? as i16;
        let value = (self.read_var(var)? as i16).wrapping_add(delta);
        self.write_var(var, value as u16)?;
        Ok(Outcome::Cond(if delta > 0 {
            value > limit
        } else {
            value < limit
        }))
    }

    pub(crate) fn op_loadx(&mut self, opcode: Opcode, ops: &[u16]) -> ZResult<Outcome> {
        let array = arg(self, ops, 0)?;
        let index = arg(self, ops, 1)?;
        let value = if opcode == Opcode::Loadw {
            self.mem
                .word(array.wrapping_add(index.wrapping_mul(2)) as u32)?
        } else {
            self.mem.byte(array.wrapping_add(index) as u32)? as u16
        };
        Ok(Outcome::Value(value))
    }

    pub(crate) fn op_storex(&mut self, opcode: Opcode, ops: &[u16]) -> ZResult<Outcome> {
        let array = arg(self, ops, 0)?;
        let index = arg(self, ops, 1)?;
        let value = arg(self, ops, 2)?;
        if opcode == Opcode::Storew {
            self.mem
                .set_word(array.wrapping_add(index.wrapping_mul(2)) as u32, value)?;
        } else {
            self.mem
                .set_byte(array.wrapping_add(index) as u32, value as u8)?;
        }
        Ok(Outcome::Done)
    }

    /// copy_table: second address 0 zeroes the source region; a negative
    /// size forces a forwards byte-at-a-time copy (overlap corrupts, which
    /// games exploit for fills); otherwise the copy is overlap-safe.
    pub(crate) fn op_copy_table(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let first = arg(self, ops, 0)? as u32;
        let second = arg(self, ops, 1)? as u32;
        let size = arg(self, ops, 2)? as i16;
        let len = size.unsigned_abs() as u32;

        if second == 0 {
            for i in 0..len {
                self.mem.set_byte(first + i, 0)?;
            }
            return Ok(Outcome::Done);
        }
        if size < 0 {
            for i in 0..len {
                let b = self.mem.byte(first + i)?;
                self.mem.set_byte(second + i, b)?;
            }
        } else {
            let mut buffer = Vec::with_capacity(len as usize);
            for i in 0..len {
                buffer.push(self.mem.byte(first + i)?);
            }
            for (i, b) in buffer.into_iter().enumerate() {
                self.mem.set_byte(second + i as u32, b)?;
            }
        }
        Ok(Outcome::Done)
    }

    /// scan_table: search `len` entries for a value; the form byte picks
    /// word or byte entries and the entry stride (default 0x82: words,
    /// stride 2). Stores the match address and branches on success.
    pub(crate) fn op_scan_table(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let target = arg(self, ops, 0)?;
        let table = arg(self, ops, 1)? as u32;
        let len = arg(self, ops, 2)? as u32;
        let form = arg_or(ops, 3, 0x82) as u8;
        let words = form & 0x80 != 0;
        let stride = (form & 0x7f) as u32;
        if stride == 0 {
            debug!("scan_table with zero stride");
            return Ok(Outcome::ValueCond(0, false));
        }

        let mut addr = table;
        for _ in 0..len {
            let value = if words {
                self.mem.word(addr)?
            } else {
                self.mem.byte(addr)? as u16
            };
            if value == target {
                return Ok(Outcome::ValueCond(addr as u16, true));
            }
            addr += stride;
        }
        Ok(Outcome::ValueCond(0, false))
    }
}
