//! Instruction decoding: forms, operand types, store/branch/text trailers
//!
//! The top two bits of the opcode byte select the form; the operand-count
//! class and number select an `Opcode` from the catalogue, whose metadata
//! says whether a store variable, branch data, or an inline Z-string follow
//! the operands. Operands are left unresolved here; reading a variable
//! operand (which may pop the stack) happens at execution time, before the
//! store and branch bytes take effect.

use std::fmt::{Display, Error, Formatter, Write};

use crate::error::{RuntimeError, ZResult};
use crate::memory::Memory;
use crate::opcode_tables::{OpClass, Opcode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandType {
    /// Two-byte constant.
    LargeConstant,
    /// One-byte constant.
    SmallConstant,
    /// One byte naming a variable to resolve.
    Variable,
}

impl OperandType {
    fn from_bits(bits: u8) -> Option<OperandType> {
        match bits & 0x03 {
            0b00 => Some(OperandType::LargeConstant),
            0b01 => Some(OperandType::SmallConstant),
            0b10 => Some(OperandType::Variable),
            _ => None, // omitted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstructionForm {
    Long,
    Short,
    Variable,
    Extended,
}

/// Branch trailer: sense plus offset. Offsets 0 and 1 encode rfalse/rtrue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchInfo {
    pub on_true: bool,
    pub offset: i16,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub class: OpClass,
    pub form: InstructionForm,
    pub operand_types: Vec<OperandType>,
    /// Raw operand bytes/words; variables unresolved.
    pub operands: Vec<u16>,
    pub store_var: Option<u8>,
    pub branch: Option<BranchInfo>,
    /// Address of an inline Z-string (print, print_ret).
    pub text_addr: Option<u32>,
    /// Total encoded size in bytes.
    pub size: u32,
    /// Offset from the instruction start to the store byte, when present.
    /// Quetzal pins the saved PC here.
    pub store_offset: Option<u32>,
    /// Offset from the instruction start to the first branch byte.
    pub branch_offset: Option<u32>,
}

impl Instruction {
    pub fn decode(mem: &Memory, addr: u32) -> ZResult<Instruction> {
        let version = mem.version();
        let mut at = addr;
        let opcode_byte = mem.byte(at)?;
        at += 1;

        let form = if opcode_byte == 0xbe && version >= 5 {
            InstructionForm::Extended
        } else {
            match opcode_byte >> 6 {
                0b11 => InstructionForm::Variable,
                0b10 => InstructionForm::Short,
                _ => InstructionForm::Long,
            }
        };

        let (class, number) = match form {
            InstructionForm::Long => (OpClass::Op2, opcode_byte & 0x1f),
            InstructionForm::Short => {
                if (opcode_byte >> 4) & 0x03 == 0x03 {
                    (OpClass::Op0, opcode_byte & 0x0f)
                } else {
                    (OpClass::Op1, opcode_byte & 0x0f)
                }
            }
            InstructionForm::Variable => {
                if opcode_byte & 0x20 == 0 {
                    (OpClass::Op2, opcode_byte & 0x1f)
                } else {
                    (OpClass::Var, opcode_byte & 0x1f)
                }
            }
            InstructionForm::Extended => {
                let ext = mem.byte(at)?;
                at += 1;
                (OpClass::Ext, ext)
            }
        };

        let opcode = Opcode::lookup(class, number, version).ok_or_else(|| {
            RuntimeError::decode(
                addr,
                format!("unknown {:?} opcode {:#04x} in v{}", class, number, version),
            )
        })?;

        // Operand types.
        let mut operand_types = Vec::new();
        match form {
            InstructionForm::Long => {
                for bit in [0x40u8, 0x20] {
                    operand_types.push(if opcode_byte & bit != 0 {
                        OperandType::Variable
                    } else {
                        OperandType::SmallConstant
                    });
                }
            }
            InstructionForm::Short => {
                if class == OpClass::Op1 {
                    match OperandType::from_bits(opcode_byte >> 4) {
                        Some(t) => operand_types.push(t),
                        None => {
                            return Err(RuntimeError::decode(addr, "1OP with omitted operand"))
                        }
                    }
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                // One type byte; the double-variable calls carry two.
                let double = matches!(opcode, Opcode::CallVs2 | Opcode::CallVn2);
                let mut type_bytes = vec![mem.byte(at)?];
                at += 1;
                if double {
                    type_bytes.push(mem.byte(at)?);
                    at += 1;
                }
                'types: for type_byte in type_bytes {
                    for slot in 0..4 {
                        match OperandType::from_bits(type_byte >> (6 - slot * 2)) {
                            Some(t) => operand_types.push(t),
                            None => break 'types,
                        }
                    }
                }
            }
        }

        // Operand values (unresolved).
        let mut operands = Vec::with_capacity(operand_types.len());
        for op_type in &operand_types {
            match op_type {
                OperandType::LargeConstant => {
                    operands.push(mem.word(at)?);
                    at += 2;
                }
                OperandType::SmallConstant | OperandType::Variable => {
                    operands.push(mem.byte(at)? as u16);
                    at += 1;
                }
            }
        }

        // Store byte.
        let (store_var, store_offset) = if opcode.stores(version) {
            let var = mem.byte(at)?;
            let offset = at - addr;
            at += 1;
            (Some(var), Some(offset))
        } else {
            (None, None)
        };

        // Branch data: 1 byte with a 6-bit unsigned offset, or 2 bytes with
        // a 14-bit signed offset.
        let (branch, branch_offset) = if opcode.branches(version) {
            let first = mem.byte(at)?;
            let offset_at = at - addr;
            at += 1;
            let on_true = first & 0x80 != 0;
            let offset = if first & 0x40 != 0 {
                (first & 0x3f) as i16
            } else {
                let second = mem.byte(at)?;
                at += 1;
                let raw = (((first & 0x3f) as i16) << 8) | second as i16;
                if raw & 0x2000 != 0 {
                    raw | (0xc000u16 as i16)
                } else {
                    raw
                }
            };
            (Some(BranchInfo { on_true, offset }), Some(offset_at))
        } else {
            (None, None)
        };

        // Inline text: scan to the terminator word without decoding.
        let text_addr = if opcode.has_text() {
            let text_at = at;
            let words = mem.zstring_words(at)?;
            at += 2 * words.len() as u32;
            Some(text_at)
        } else {
            None
        };

        Ok(Instruction {
            opcode,
            class,
            form,
            operand_types,
            operands,
            store_var,
            branch,
            text_addr,
            size: at - addr,
            store_offset,
            branch_offset,
        })
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut line = String::from(self.opcode.name());
        for (i, op) in self.operands.iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });
            match self.operand_types[i] {
                OperandType::Variable => write!(line, "V{op:02x}")?,
                _ => write!(line, "#{op:04x}")?,
            }
        }
        if let Some(var) = self.store_var {
            write!(line, " -> V{var:02x}")?;
        }
        if let Some(branch) = &self.branch {
            write!(
                line,
                " [{}{}]",
                if branch.on_true { "TRUE" } else { "FALSE" },
                match branch.offset {
                    0 => " RFALSE".to_string(),
                    1 => " RTRUE".to_string(),
                    n => format!(" {n:+}"),
                }
            )?;
        }
        write!(f, "{line}")
    }
}
