// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The builtin function table.
//!
//! Builtins are host functions invoked through the `PUSHDEF` + `CALL`
//! convention: `PUSHDEF` resolves a name against the table and pushes an
//! `Abstract` handle, `CALL` pops the handle and invokes it. Builtins
//! receive the state and operate through the same stack API as bytecode.

use alloc::string::ToString;

use crate::host::Host;
use crate::value::{Value, ValueKind};
use crate::vm::{State, VmError};

/// The signature of a builtin function.
pub type BuiltinFn = fn(&mut State, &mut dyn Host) -> Result<(), VmError>;

/// An unowned handle to a builtin; the payload of [`Value::Abstract`].
#[derive(Copy, Clone, Debug)]
pub struct Builtin {
    name: &'static str,
    func: BuiltinFn,
}

impl Builtin {
    /// Returns the table name of this builtin.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the function address, for display purposes.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.func as usize
    }

    /// Invokes the builtin on `state`.
    pub fn invoke(&self, state: &mut State, host: &mut dyn Host) -> Result<(), VmError> {
        (self.func)(state, host)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::fn_addr_eq(self.func, other.func)
    }
}

const TABLE: &[Builtin] = &[
    Builtin {
        name: "print",
        func: print,
    },
    Builtin {
        name: "wait",
        func: wait,
    },
];

/// Resolves a builtin by byte-equal name.
///
/// The scan is linear; declaration order is not observable.
#[must_use]
pub fn resolve(name: &str) -> Option<Builtin> {
    TABLE.iter().copied().find(|b| b.name == name)
}

/// Converts and writes every stack value top-first, one per line, emptying
/// the stack.
fn print(state: &mut State, host: &mut dyn Host) -> Result<(), VmError> {
    while let Some(value) = state.pop() {
        host.write_line(&value.to_string());
    }
    Ok(())
}

/// Pops one Number and sleeps that many milliseconds.
fn wait(state: &mut State, host: &mut dyn Host) -> Result<(), VmError> {
    match state.pop() {
        Some(Value::Number(ms)) => {
            host.sleep_ms(ms as u32);
            Ok(())
        }
        Some(other) => Err(VmError::UnexpectedType {
            expected: ValueKind::Number,
            actual: other.kind(),
        }),
        None => Err(VmError::StackLen { needed: 1, depth: 0 }),
    }
}
