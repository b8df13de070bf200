//! Control-flow handlers: calls and returns, jump, throw, and the
//! save/restore family
//!
//! Saves pin the snapshot PC at the save instruction's store (or branch)
//! byte, the Quetzal convention, so a restore can re-read that byte and
//! deliver the "restored" result through it.

use log::{debug, warn};

use crate::error::{RuntimeError, ZResult};
use crate::executor::{arg, Machine, Outcome};
use crate::frames::Disposition;
use crate::instruction::Instruction;

impl Machine {
    /// All eight call_* opcodes funnel here: the storing variants carry a
    /// store byte, the _n variants discard the result.
    pub(crate) fn op_call(
        &mut self,
        inst: &Instruction,
        ops: &[u16],
        stores: bool,
    ) -> ZResult<Outcome> {
        let packed = arg(self, ops, 0)?;
        let disposition = if stores {
            Disposition::Store(inst.store_var.ok_or_else(|| {
                RuntimeError::decode(self.pc, "storing call without a store byte")
            })?)
        } else {
            Disposition::Discard
        };
        self.do_call(packed, &ops[1..], disposition)
    }

    pub(crate) fn op_ret(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        Ok(Outcome::Return(arg(self, ops, 0)?))
    }

    pub(crate) fn op_ret_popped(&mut self) -> ZResult<Outcome> {
        let value = self.stack.pop()?;
        Ok(Outcome::Return(value))
    }

    pub(crate) fn op_pop(&mut self) -> ZResult<Outcome> {
        self.stack.pop()?;
        Ok(Outcome::Done)
    }

    /// jump: an unconditional signed offset from the next instruction,
    /// not a branch (no rtrue/rfalse encoding).
    pub(crate) fn op_jump(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let offset = arg(self, ops, 0)? as i16;
        let target = (self.pc as i64 + offset as i64 - 2) as u32;
        if target >= self.mem.len() {
            return Err(RuntimeError::BadAddress(target));
        }
        self.pc = target;
        Ok(Outcome::Jumped)
    }

    /// throw: unwind to the frame depth a catch recorded, then return the
    /// value from there.
    pub(crate) fn op_throw(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let value = arg(self, ops, 0)?;
        let depth = arg(self, ops, 1)?;
        debug!("throw {} to depth {}", value, depth);
        self.stack.unwind_to(depth)?;
        Ok(Outcome::Return(value))
    }

    /// check_arg_count: branch if the caller supplied at least N arguments.
    pub(crate) fn op_check_arg_count(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let wanted = arg(self, ops, 0)?;
        let supplied = self.stack.current().arg_count as u16;
        Ok(Outcome::Cond(wanted <= supplied))
    }

    /// save: v1-3 branch on success, v4 stores 1/0, v5+ is the EXT form.
    /// The optional-table EXT form (auxiliary files) is not provided; it
    /// reports failure.
    pub(crate) fn op_save(&mut self, inst: &Instruction, ops: &[u16]) -> ZResult<Outcome> {
        if !ops.is_empty() {
            warn!("save with a table operand (auxiliary file), reporting failure");
            return self.save_result(inst, false);
        }
        let save_pc = self.result_byte_addr(inst);
        let ok = match self.save_game(save_pc) {
            Ok(()) => true,
            Err(e) => {
                warn!("save failed: {}", e);
                false
            }
        };
        self.save_result(inst, ok)
    }

    fn save_result(&mut self, _inst: &Instruction, ok: bool) -> ZResult<Outcome> {
        if self.mem.version() <= 3 {
            Ok(Outcome::Cond(ok))
        } else {
            Ok(Outcome::Value(ok as u16))
        }
    }

    /// restore: on success execution resumes at the save point (the result
    /// delivery happened in apply_snapshot); on failure the opcode reports
    /// it and the story carries on.
    pub(crate) fn op_restore(&mut self, inst: &Instruction, ops: &[u16]) -> ZResult<Outcome> {
        if !ops.is_empty() {
            warn!("restore with a table operand (auxiliary file), reporting failure");
            return self.save_result(inst, false);
        }
        match self.restore_game() {
            Ok(()) => Ok(Outcome::Restored),
            Err(e) if !e.is_fatal() => {
                warn!("restore failed: {}", e);
                if self.mem.version() <= 3 {
                    Ok(Outcome::Cond(false))
                } else {
                    Ok(Outcome::Value(0))
                }
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn op_save_undo(&mut self, inst: &Instruction) -> ZResult<Outcome> {
        let save_pc = self.result_byte_addr(inst);
        self.push_undo(save_pc);
        Ok(Outcome::Value(1))
    }

    pub(crate) fn op_restore_undo(&mut self) -> ZResult<Outcome> {
        match self.pop_undo() {
            Some(snapshot) => {
                self.apply_snapshot(snapshot)?;
                Ok(Outcome::Restored)
            }
            None => Ok(Outcome::Value(0)),
        }
    }

    /// Address of this instruction's store byte (or branch data for the
    /// v1-3 branching saves), where Quetzal pins the saved PC.
    fn result_byte_addr(&self, inst: &Instruction) -> u32 {
        let offset = inst
            .store_offset
            .or(inst.branch_offset)
            .unwrap_or(inst.size);
        self.inst_addr(inst) + offset
    }
}
