// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks.
//!
//! Tracing is optional: the VM only emits events requested by a
//! [`TraceMask`]. Pass a [`TraceSink`] to [`State::execute_traced`], or set
//! the state's verbose flag to route the same events, formatted, to
//! [`Host::trace_line`].
//!
//! [`State::execute_traced`]: crate::vm::State::execute_traced
//! [`Host::trace_line`]: crate::host::Host::trace_line

use core::fmt;

use crate::bytecode::Instr;
use crate::vm::VmError;

/// A set of trace events requested by a [`TraceSink`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceMask(u32);

impl core::ops::BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TraceMask {
    /// No tracing.
    pub const NONE: Self = Self(0);
    /// Emit [`TraceEvent::RunStart`] and [`TraceEvent::RunEnd`].
    pub const RUN: Self = Self(1 << 0);
    /// Emit [`TraceEvent::Instr`] for each executed instruction.
    pub const INSTR: Self = Self(1 << 1);
    /// Emit [`TraceEvent::Jump`] for each executed jump.
    pub const JUMP: Self = Self(1 << 2);
    /// Emit [`TraceEvent::BuiltinCall`] for each `CALL`.
    pub const BUILTIN: Self = Self(1 << 3);
    /// Everything.
    pub const ALL: Self = Self(0b1111);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// A trace event emitted by the VM.
#[derive(Clone, Debug)]
pub enum TraceEvent<'a> {
    /// Start of a run.
    RunStart {
        /// Number of decoded instructions.
        instr_count: usize,
    },
    /// A single instruction step, before its effects.
    Instr {
        /// Instruction index.
        ix: usize,
        /// The instruction.
        instr: &'a Instr,
    },
    /// A resolved jump.
    Jump {
        /// Index of the jump instruction.
        ix: usize,
        /// Landing index for a taken jump, `None` on fall-through.
        target: Option<usize>,
    },
    /// A builtin invocation via `CALL`.
    BuiltinCall {
        /// Table name of the builtin.
        name: &'a str,
    },
    /// End of a run.
    RunEnd {
        /// Run outcome.
        outcome: TraceOutcome<'a>,
    },
}

/// Run outcome for tracing.
#[derive(Clone, Debug)]
pub enum TraceOutcome<'a> {
    /// The run completed.
    Ok,
    /// The run aborted with an error.
    Err(&'a VmError),
}

impl TraceEvent<'_> {
    /// Returns the mask bit this event belongs to.
    #[must_use]
    pub fn mask(&self) -> TraceMask {
        match self {
            Self::RunStart { .. } | Self::RunEnd { .. } => TraceMask::RUN,
            Self::Instr { .. } => TraceMask::INSTR,
            Self::Jump { .. } => TraceMask::JUMP,
            Self::BuiltinCall { .. } => TraceMask::BUILTIN,
        }
    }
}

impl fmt::Display for TraceEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStart { instr_count } => write!(f, "run start ({instr_count} instructions)"),
            Self::Instr { ix, instr } => write!(f, "[{ix}] {instr}"),
            Self::Jump { ix, target: Some(t) } => write!(f, "[{ix}] jump -> {t}"),
            Self::Jump { ix, target: None } => write!(f, "[{ix}] jump fallthrough"),
            Self::BuiltinCall { name } => write!(f, "builtin {name}"),
            Self::RunEnd {
                outcome: TraceOutcome::Ok,
            } => write!(f, "run end: ok"),
            Self::RunEnd {
                outcome: TraceOutcome::Err(e),
            } => write!(f, "run end: {e}"),
        }
    }
}

/// A trace sink that can receive VM events.
pub trait TraceSink {
    /// Returns the set of events the sink wants.
    fn mask(&self) -> TraceMask {
        TraceMask::NONE
    }

    /// Receives a trace event.
    fn event(&mut self, event: TraceEvent<'_>);
}
