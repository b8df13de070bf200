//! Arithmetic, logic, shift, comparison and random handlers
//!
//! All arithmetic is signed 16-bit with wrap-around. Division and modulo
//! truncate toward zero and fault on a zero divisor.

use crate::error::{RuntimeError, ZResult};
use crate::executor::{arg, Machine, Outcome};
use crate::opcode_tables::Opcode;

impl Machine {
    pub(crate) fn op_arith(&mut self, opcode: Opcode, ops: &[u16]) -> ZResult<Outcome> {
        let a = arg(self, ops, 0)? as i16;
        let b = arg(self, ops, 1)? as i16;
        let result = match opcode {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mul => a.wrapping_mul(b),
            Opcode::Div => {
                if b == 0 {
                    return Err(RuntimeError::DivideByZero);
                }
                a.wrapping_div(b)
            }
            _ => {
                if b == 0 {
                    return Err(RuntimeError::DivideByZero);
                }
                a.wrapping_rem(b)
            }
        };
        Ok(Outcome::Value(result as u16))
    }

    pub(crate) fn op_bitwise(&mut self, opcode: Opcode, ops: &[u16]) -> ZResult<Outcome> {
        let a = arg(self, ops, 0)?;
        let b = arg(self, ops, 1)?;
        Ok(Outcome::Value(if opcode == Opcode::And {
            a & b
        } else {
            a | b
        }))
    }

    pub(crate) fn op_not(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        Ok(Outcome::Value(!arg(self, ops, 0)?))
    }

    /// Logical shift: positive counts shift left, negative shift right with
    /// zero fill. Counts beyond 15 clear the value.
    pub(crate) fn op_log_shift(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let value = arg(self, ops, 0)?;
        let places = arg(self, ops, 1)? as i16;
        let result = match places {
            0 => value,
            1..=15 => value << places,
            -15..=-1 => value >> -places,
            _ => 0,
        };
        Ok(Outcome::Value(result))
    }

    /// Arithmetic shift: negative counts shift right preserving the sign.
    pub(crate) fn op_art_shift(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let value = arg(self, ops, 0)? as i16;
        let places = arg(self, ops, 1)? as i16;
        let result = match places {
            0 => value,
            1..=15 => value.wrapping_shl(places as u32),
            -15..=-1 => value >> -places,
            _ if places > 0 => 0,
            _ => value >> 15,
        };
        Ok(Outcome::Value(result as u16))
    }

    /// je: branch if the first operand equals any of the others (2-4
    /// operands; a single operand has no defined meaning).
    pub(crate) fn op_je(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        if ops.len() < 2 {
            return Err(RuntimeError::decode(self.pc, "je with fewer than 2 operands"));
        }
        let first = ops[0];
        Ok(Outcome::Cond(ops[1..].contains(&first)))
    }

    pub(crate) fn op_compare(&mut self, opcode: Opcode, ops: &[u16]) -> ZResult<Outcome> {
        let a = arg(self, ops, 0)? as i16;
        let b = arg(self, ops, 1)? as i16;
        Ok(Outcome::Cond(if opcode == Opcode::Jl {
            a < b
        } else {
            a > b
        }))
    }

    pub(crate) fn op_jz(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        Ok(Outcome::Cond(arg(self, ops, 0)? == 0))
    }

    /// test: branch if every bit of the mask is set in the bitmap.
    pub(crate) fn op_test(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let bitmap = arg(self, ops, 0)?;
        let mask = arg(self, ops, 1)?;
        Ok(Outcome::Cond(bitmap & mask == mask))
    }

    /// random: n > 0 draws uniformly from [1, n]; n = 0 re-randomises;
    /// n < 0 seeds deterministically with |n|. Reseeding stores 0.
    pub(crate) fn op_random(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let n = arg(self, ops, 0)? as i16;
        if n > 0 {
            return Ok(Outcome::Value(self.rng.in_range(n as u16)));
        }
        if n == 0 {
            self.rng.randomize();
        } else {
            self.rng.seed(-(n as i64) as u64);
        }
        Ok(Outcome::Value(0))
    }
}
