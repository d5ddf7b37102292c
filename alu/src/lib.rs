// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `alu`: a small stack-based bytecode virtual machine for a
//! dynamically-typed scripting language.
//!
//! A compiled program is a 3-byte signature followed by concatenated
//! instructions (single opcode byte plus big-endian inline operands) and an
//! optional `HALT` terminator. The VM decodes the buffer into an instruction
//! list and executes it over an operand stack and a sparse register bank,
//! delegating every effect (printing, timed waits, trace lines) to an
//! embedder-provided [`host::Host`].
//!
//! ## Example
//!
//! ```
//! use alu::asm::Asm;
//! use alu::host::Host;
//! use alu::vm::State;
//!
//! struct Collect(Vec<String>);
//!
//! impl Host for Collect {
//!     fn write_line(&mut self, line: &str) {
//!         self.0.push(line.into());
//!     }
//!
//!     fn sleep_ms(&mut self, _ms: u32) {}
//! }
//!
//! let mut a = Asm::new();
//! a.push_def("print");
//! a.push_num(125.3);
//! a.super_();
//! a.call();
//! let bytes = a.build()?;
//!
//! let mut state = State::new();
//! let mut host = Collect(Vec::new());
//! state.start(&bytes, &mut host)?;
//! assert_eq!(host.0, ["125.300000"]);
//! assert_eq!(state.close(), 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod asm;
pub mod builtins;
pub mod bytecode;
pub mod format;
pub mod host;
pub mod opcode;
pub mod regs;
pub mod stack;
pub mod trace;
pub mod value;
pub mod vm;
