// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction builder.
//!
//! A small, public helper for composing instruction sequences without
//! hand-computing relative jump offsets. This is the embedding and test
//! surface; it is not a source-text compiler.

use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::{EncodeError, EvalMask, Instr, Program};

/// A label for jump targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A builder error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// A label was referenced but never placed.
    UnresolvedLabel,
    /// A label was placed twice.
    DuplicatePlacement,
    /// The jump cannot reach its target: the relative encoding always moves
    /// at least one instruction forward or two backward.
    UnencodableJump {
        /// Index of the jump instruction.
        from: usize,
        /// Index of the target instruction.
        to: usize,
    },
    /// The finished sequence failed to encode.
    Encode(EncodeError),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel => write!(f, "label was referenced but never placed"),
            Self::DuplicatePlacement => write!(f, "label was placed twice"),
            Self::UnencodableJump { from, to } => {
                write!(f, "jump from {from} cannot reach {to}")
            }
            Self::Encode(e) => write!(f, "encoding failed: {e}"),
        }
    }
}

impl core::error::Error for AsmError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EncodeError> for AsmError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

/// An instruction sequence builder.
#[derive(Clone, Debug, Default)]
pub struct Asm {
    instrs: Vec<Instr>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl Asm {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns `true` if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Creates a fresh, unplaced label.
    pub fn label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Places `label` at the next emitted instruction.
    pub fn place(&mut self, label: Label) -> Result<(), AsmError> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(AsmError::DuplicatePlacement);
        }
        *slot = Some(self.instrs.len());
        Ok(())
    }

    /// Emits `RET`.
    pub fn ret(&mut self) {
        self.instrs.push(Instr::Ret);
    }

    /// Emits `JMP` with a raw relative offset.
    pub fn jmp(&mut self, offset: i32) {
        self.instrs.push(Instr::Jmp(offset));
    }

    /// Emits `JTR` with a raw relative offset.
    pub fn jtr(&mut self, offset: i32) {
        self.instrs.push(Instr::Jtr(offset));
    }

    /// Emits `JFA` with a raw relative offset.
    pub fn jfa(&mut self, offset: i32) {
        self.instrs.push(Instr::Jfa(offset));
    }

    /// Emits `JEM` with a raw relative offset.
    pub fn jem(&mut self, offset: i32) {
        self.instrs.push(Instr::Jem(offset));
    }

    /// Emits `JNEM` with a raw relative offset.
    pub fn jnem(&mut self, offset: i32) {
        self.instrs.push(Instr::Jnem(offset));
    }

    fn jump_fixup(&mut self, instr: Instr, label: Label) {
        self.fixups.push((self.instrs.len(), label));
        self.instrs.push(instr);
    }

    /// Emits `JMP` targeting `label`.
    pub fn jmp_to(&mut self, label: Label) {
        self.jump_fixup(Instr::Jmp(0), label);
    }

    /// Emits `JTR` targeting `label`.
    pub fn jtr_to(&mut self, label: Label) {
        self.jump_fixup(Instr::Jtr(0), label);
    }

    /// Emits `JFA` targeting `label`.
    pub fn jfa_to(&mut self, label: Label) {
        self.jump_fixup(Instr::Jfa(0), label);
    }

    /// Emits `JEM` targeting `label`.
    pub fn jem_to(&mut self, label: Label) {
        self.jump_fixup(Instr::Jem(0), label);
    }

    /// Emits `JNEM` targeting `label`.
    pub fn jnem_to(&mut self, label: Label) {
        self.jump_fixup(Instr::Jnem(0), label);
    }

    /// Emits `PUSHNUM`.
    pub fn push_num(&mut self, n: f64) {
        self.instrs.push(Instr::PushNum(n));
    }

    /// Emits `PUSHSTR`.
    pub fn push_str(&mut self, s: &str) {
        self.instrs.push(Instr::PushStr(s.into()));
    }

    /// Emits `PUSHBOOL`.
    pub fn push_bool(&mut self, b: bool) {
        self.instrs.push(Instr::PushBool(b));
    }

    /// Emits `PUSHDEF`.
    pub fn push_def(&mut self, name: &str) {
        self.instrs.push(Instr::PushDef(name.into()));
    }

    /// Emits `SUMSTACK`.
    pub fn sum_stack(&mut self) {
        self.instrs.push(Instr::SumStack);
    }

    /// Emits `STACKCLOSE`.
    pub fn stack_close(&mut self) {
        self.instrs.push(Instr::StackClose);
    }

    /// Emits `EVAL` with `mask`.
    pub fn eval(&mut self, mask: EvalMask) {
        self.instrs.push(Instr::Eval(mask));
    }

    /// Emits `SUPER`.
    pub fn super_(&mut self) {
        self.instrs.push(Instr::Super);
    }

    /// Emits `CALL`.
    pub fn call(&mut self) {
        self.instrs.push(Instr::Call);
    }

    /// Emits `LOAD`.
    pub fn load(&mut self, index: u32) {
        self.instrs.push(Instr::Load(index));
    }

    /// Emits `UNLOAD`.
    pub fn unload(&mut self, index: u32) {
        self.instrs.push(Instr::Unload(index));
    }

    /// Emits `DEFUNLOAD`.
    pub fn defunload(&mut self, index: u32) {
        self.instrs.push(Instr::DefUnload(index));
    }

    /// Resolves labels and returns the instruction sequence.
    pub fn finish(mut self) -> Result<Vec<Instr>, AsmError> {
        for (ix, label) in self.fixups.drain(..) {
            let target = self.labels[label.0 as usize].ok_or(AsmError::UnresolvedLabel)?;
            let offset = relative_offset(ix, target)
                .ok_or(AsmError::UnencodableJump { from: ix, to: target })?;
            match &mut self.instrs[ix] {
                Instr::Jmp(n) | Instr::Jtr(n) | Instr::Jfa(n) | Instr::Jem(n)
                | Instr::Jnem(n) => *n = offset,
                _ => unreachable!("fixups only reference jump instructions"),
            }
        }
        Ok(self.instrs)
    }

    /// Resolves labels and encodes a complete program buffer (signature,
    /// instructions, `HALT`).
    pub fn build(self) -> Result<Vec<u8>, AsmError> {
        let instrs = self.finish()?;
        Ok(Program { instrs }.encode()?)
    }
}

/// Computes the wire offset for a taken jump from `from` landing on `to`.
///
/// The execution bias means a jump always moves at least one instruction
/// forward or two backward; `to ∈ {from, from - 1}` is unreachable.
fn relative_offset(from: usize, to: usize) -> Option<i32> {
    let from = from as i64;
    let to = to as i64;
    let offset = if to > from {
        to - from - 1
    } else if to <= from - 2 {
        to - from + 1
    } else {
        return None;
    };
    i32::try_from(offset).ok()
}
