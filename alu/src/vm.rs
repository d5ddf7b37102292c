// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The execution engine.
//!
//! A [`State`] holds the operand stack, the register bank, and the decoded
//! instruction list. [`State::execute`] walks the list with a cursor index,
//! dispatching each instruction and resolving relative jumps; a cooperative
//! [`Interrupt`] token is checked between instructions.
//!
//! Errors abort the run, are recorded in the state's error slot, and are
//! reported by [`State::close`].

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::mem;
use core::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::builtins::{self, Builtin};
use crate::bytecode::{self, EvalMask, Instr, Program};
use crate::format::DecodeError;
use crate::host::Host;
use crate::regs::RegisterBank;
use crate::stack::OperandStack;
use crate::trace::{TraceEvent, TraceMask, TraceOutcome, TraceSink};
use crate::value::{Value, ValueKind};

/// A runtime error.
#[derive(Clone, Debug, PartialEq)]
pub enum VmError {
    /// The operation needs more stack depth than is available.
    StackLen {
        /// Required depth.
        needed: usize,
        /// Actual depth.
        depth: usize,
    },
    /// A peek index reached past the end of the stack.
    NoStack {
        /// The requested index, counted from the top.
        index: usize,
        /// Actual depth.
        depth: usize,
    },
    /// A register index is absent from the bank.
    NoRegister {
        /// The requested register index.
        index: u32,
    },
    /// A builtin name did not resolve against the table.
    NotFound {
        /// The unresolved name.
        name: String,
    },
    /// Two operands must share a tag but do not.
    TypeMismatch {
        /// Tag of the top operand.
        left: ValueKind,
        /// Tag of the second operand.
        right: ValueKind,
    },
    /// A specific tag was required.
    UnexpectedType {
        /// Required tag.
        expected: ValueKind,
        /// Actual tag.
        actual: ValueKind,
    },
    /// The operand tag is illegal for the operation.
    UnsupportedOperand {
        /// The offending tag.
        kind: ValueKind,
    },
    /// A taken jump would leave the instruction list.
    OutOfJump {
        /// Index of the jump instruction.
        at: usize,
        /// The relative offset, in instructions.
        offset: i32,
    },
    /// The interrupt token was tripped between instructions.
    Interrupted,
    /// The program buffer failed to decode.
    Decode(DecodeError),
    /// The program file does not exist.
    #[cfg(feature = "std")]
    NoFile {
        /// The requested path.
        path: String,
    },
    /// The program file could not be read.
    #[cfg(feature = "std")]
    FileRead {
        /// The requested path.
        path: String,
        /// The OS error text.
        msg: String,
    },
    /// The program path exists but is not a readable file.
    #[cfg(feature = "std")]
    FileStat {
        /// The requested path.
        path: String,
        /// The OS error text.
        msg: String,
    },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackLen { needed, depth } => {
                write!(f, "too few elements in the stack (need {needed}, have {depth})")
            }
            Self::NoStack { index, depth } => {
                write!(f, "reached the end of the stack (index {index}, depth {depth})")
            }
            Self::NoRegister { index } => {
                write!(f, "reached the end of the registers (index {index})")
            }
            Self::NotFound { name } => write!(f, "unknown builtin '{name}'"),
            Self::TypeMismatch { left, right } => {
                write!(f, "element types mismatch ({left} vs {right})")
            }
            Self::UnexpectedType { expected, actual } => {
                write!(f, "type mismatch (expected {expected}, got {actual})")
            }
            Self::UnsupportedOperand { kind } => {
                write!(f, "unsupported operand type ({kind})")
            }
            Self::OutOfJump { at, offset } => {
                write!(f, "jump out of bounds (at {at}, offset {offset:+})")
            }
            Self::Interrupted => write!(f, "interrupted"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            #[cfg(feature = "std")]
            Self::NoFile { path } => write!(f, "no such file: {path}"),
            #[cfg(feature = "std")]
            Self::FileRead { path, msg } => write!(f, "failed to read {path}: {msg}"),
            #[cfg(feature = "std")]
            Self::FileStat { path, msg } => write!(f, "failed to stat {path}: {msg}"),
        }
    }
}

impl core::error::Error for VmError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for VmError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// A cloneable cooperative cancellation token.
///
/// The interpreter checks the token between instructions and aborts the run
/// with [`VmError::Interrupted`] when it is tripped. Drivers trip it from a
/// SIGINT handler; embedders may trip it from anywhere.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Creates an untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Safe to call from a signal handler.
    pub fn trigger(&self) {
        self.flag.store(true, AtomicOrdering::Relaxed);
    }

    /// Returns `true` once the token has been tripped.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(AtomicOrdering::Relaxed)
    }

    /// Resets the token.
    pub fn clear(&self) {
        self.flag.store(false, AtomicOrdering::Relaxed);
    }
}

/// A VM state: stack, registers, instructions, and the error slot.
#[derive(Debug, Default)]
pub struct State {
    error: Option<VmError>,
    stack: OperandStack,
    instrs: Vec<Instr>,
    regs: RegisterBank,
    seed: u64,
    verbose: bool,
    interrupt: Interrupt,
}

impl State {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first recorded error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&VmError> {
        self.error.as_ref()
    }

    /// Returns a cloneable handle to the interrupt token.
    #[must_use]
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Returns the operand stack.
    #[must_use]
    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    /// Returns the register bank.
    #[must_use]
    pub fn regs(&self) -> &RegisterBank {
        &self.regs
    }

    /// Returns the decoded instruction list.
    #[must_use]
    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    /// Enables or disables the debug trace (routed to [`Host::trace_line`]).
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Returns the verbose flag.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Sets the RNG seed (reserved; no current opcode consumes it).
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Returns the RNG seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    // Stack API.

    /// Pushes a Number.
    pub fn push_number(&mut self, n: f64) {
        self.stack.push(Value::Number(n));
    }

    /// Pushes a Bool.
    pub fn push_bool(&mut self, b: bool) {
        self.stack.push(Value::Bool(b));
    }

    /// Pushes a String.
    pub fn push_string(&mut self, s: impl Into<String>) {
        self.stack.push(Value::Str(s.into()));
    }

    /// Pushes any value.
    pub fn push_value(&mut self, v: Value) {
        self.stack.push(v);
    }

    /// Detaches the top of the stack and moves it out.
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Returns the value `index` positions below the top.
    pub fn get(&self, index: usize) -> Result<&Value, VmError> {
        self.stack.peek(index).ok_or(VmError::NoStack {
            index,
            depth: self.stack.len(),
        })
    }

    /// Returns the Number `index` positions below the top.
    pub fn get_number(&self, index: usize) -> Result<f64, VmError> {
        match self.get(index)? {
            Value::Number(n) => Ok(*n),
            other => Err(VmError::UnexpectedType {
                expected: ValueKind::Number,
                actual: other.kind(),
            }),
        }
    }

    /// Returns the Bool `index` positions below the top.
    pub fn get_bool(&self, index: usize) -> Result<bool, VmError> {
        match self.get(index)? {
            Value::Bool(b) => Ok(*b),
            other => Err(VmError::UnexpectedType {
                expected: ValueKind::Bool,
                actual: other.kind(),
            }),
        }
    }

    /// Returns the String `index` positions below the top.
    pub fn get_string(&self, index: usize) -> Result<&str, VmError> {
        match self.get(index)? {
            Value::Str(s) => Ok(s),
            other => Err(VmError::UnexpectedType {
                expected: ValueKind::Str,
                actual: other.kind(),
            }),
        }
    }

    /// Clears the stack.
    pub fn stackclose(&mut self) {
        self.stack.clear();
    }

    // Operations shared by bytecode and embedders.

    /// Combines the top two stack values, clears the stack, and pushes the
    /// result.
    pub fn sumstack(&mut self) -> Result<(), VmError> {
        let r = self.sumstack_inner();
        self.note(r)
    }

    /// Compares the top two stack values against `mask`, clears the stack,
    /// and pushes a Bool.
    pub fn eval(&mut self, mask: EvalMask) -> Result<(), VmError> {
        let r = self.eval_inner(mask);
        self.note(r)
    }

    /// Moves the top of the stack into register `index`, then clears the
    /// stack.
    pub fn load(&mut self, index: u32) -> Result<(), VmError> {
        let r = self.load_inner(index);
        self.note(r)
    }

    /// Copies register `index` onto the stack.
    pub fn unload(&mut self, index: u32) -> Result<(), VmError> {
        let r = self.unload_inner(index);
        self.note(r)
    }

    /// Moves register `index` onto the stack, deleting the slot.
    pub fn defunload(&mut self, index: u32) -> Result<(), VmError> {
        let r = self.defunload_inner(index);
        self.note(r)
    }

    /// Pops the top of the stack and invokes it as a builtin.
    pub fn call(&mut self, host: &mut dyn Host) -> Result<(), VmError> {
        let r = self
            .pop_callable()
            .and_then(|builtin| builtin.invoke(self, host));
        self.note(r)
    }

    // Loading and execution.

    /// Feeds raw instructions positioned after the program signature,
    /// replacing the current instruction list.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        let r = bytecode::decode_stream(bytes)
            .map_err(VmError::from)
            .map(|instrs| self.instrs = instrs);
        self.note(r)
    }

    /// Loads a complete program buffer (signature included) and executes it.
    pub fn start(&mut self, bytes: &[u8], host: &mut dyn Host) -> Result<(), VmError> {
        let program = {
            let r = Program::decode(bytes).map_err(VmError::from);
            self.note(r)?
        };
        self.instrs = program.instrs;
        self.execute(host)
    }

    /// Reads a program file and executes it.
    #[cfg(feature = "std")]
    pub fn start_file(&mut self, path: &str, host: &mut dyn Host) -> Result<(), VmError> {
        let bytes = {
            let r = std::fs::read(path).map_err(|e| file_error(path, &e));
            self.note(r)?
        };
        self.start(&bytes, host)
    }

    /// Executes the instruction list from the beginning.
    pub fn execute(&mut self, host: &mut dyn Host) -> Result<(), VmError> {
        self.execute_traced(host, TraceMask::NONE, None)
    }

    /// Executes the instruction list, emitting the events in `trace_mask`
    /// to `trace`.
    pub fn execute_traced(
        &mut self,
        host: &mut dyn Host,
        trace_mask: TraceMask,
        mut trace: Option<&mut dyn TraceSink>,
    ) -> Result<(), VmError> {
        // The list is detached for the duration of the run so the dispatch
        // loop can borrow it while mutating the rest of the state. RET and
        // errors leave it untouched.
        let instrs = mem::take(&mut self.instrs);
        let verbose = self.verbose;
        emit(
            verbose,
            host,
            trace_mask,
            &mut trace,
            TraceEvent::RunStart {
                instr_count: instrs.len(),
            },
        );
        let result = self.run_body(&instrs, host, trace_mask, &mut trace);
        let outcome = match &result {
            Ok(()) => TraceOutcome::Ok,
            Err(e) => TraceOutcome::Err(e),
        };
        emit(
            verbose,
            host,
            trace_mask,
            &mut trace,
            TraceEvent::RunEnd { outcome },
        );
        self.instrs = instrs;
        self.note(result)
    }

    /// Tears the state down and returns the exit status: 0 on a clean run,
    /// 1 if an error was recorded. Under `std` the error line is printed to
    /// stderr first.
    #[must_use]
    pub fn close(self) -> i32 {
        match &self.error {
            Some(_e) => {
                #[cfg(feature = "std")]
                std::eprintln!("\n| [ERROR] Program ends with an error:\n| {_e}");
                1
            }
            None => 0,
        }
    }

    fn note<T>(&mut self, result: Result<T, VmError>) -> Result<T, VmError> {
        if let Err(e) = &result
            && self.error.is_none()
        {
            self.error = Some(e.clone());
        }
        result
    }

    fn run_body(
        &mut self,
        instrs: &[Instr],
        host: &mut dyn Host,
        mask: TraceMask,
        trace: &mut Option<&mut dyn TraceSink>,
    ) -> Result<(), VmError> {
        let verbose = self.verbose;
        let mut ix = 0usize;
        while let Some(instr) = instrs.get(ix) {
            if self.interrupt.is_triggered() {
                return Err(VmError::Interrupted);
            }
            emit(verbose, host, mask, trace, TraceEvent::Instr { ix, instr });
            match instr {
                Instr::Ret => return Ok(()),

                Instr::Jmp(n)
                | Instr::Jtr(n)
                | Instr::Jfa(n)
                | Instr::Jem(n)
                | Instr::Jnem(n) => {
                    let taken = self.should_jump(instr);
                    // Both paths consume the condition (a no-op when the
                    // stack is empty).
                    self.stack.pop();
                    if taken {
                        let target = jump_target(ix, *n, instrs.len())?;
                        emit(
                            verbose,
                            host,
                            mask,
                            trace,
                            TraceEvent::Jump {
                                ix,
                                target: Some(target),
                            },
                        );
                        ix = target;
                    } else {
                        emit(verbose, host, mask, trace, TraceEvent::Jump { ix, target: None });
                        ix += 1;
                    }
                    continue;
                }

                Instr::PushNum(n) => self.stack.push(Value::Number(*n)),
                Instr::PushStr(s) => self.stack.push(Value::Str(s.clone())),
                Instr::PushBool(b) => self.stack.push(Value::Bool(*b)),
                Instr::PushDef(name) => {
                    let builtin =
                        builtins::resolve(name).ok_or_else(|| VmError::NotFound {
                            name: name.clone(),
                        })?;
                    self.stack.push(Value::Abstract(builtin));
                }

                Instr::SumStack => self.sumstack_inner()?,
                Instr::StackClose => self.stack.clear(),
                Instr::Eval(m) => self.eval_inner(*m)?,
                Instr::Super => self.stack.rotate(),

                Instr::Call => {
                    let builtin = self.pop_callable()?;
                    emit(
                        verbose,
                        host,
                        mask,
                        trace,
                        TraceEvent::BuiltinCall {
                            name: builtin.name(),
                        },
                    );
                    builtin.invoke(self, host)?;
                }

                Instr::Load(k) => self.load_inner(*k)?,
                Instr::Unload(k) => self.unload_inner(*k)?,
                Instr::DefUnload(k) => self.defunload_inner(*k)?,
            }
            ix += 1;
        }
        Ok(())
    }

    fn should_jump(&self, instr: &Instr) -> bool {
        match instr {
            Instr::Jem(_) => self.stack.is_empty(),
            Instr::Jnem(_) => !self.stack.is_empty(),
            Instr::Jtr(_) => matches!(self.stack.peek(0), Some(Value::Bool(true))),
            Instr::Jfa(_) => matches!(self.stack.peek(0), Some(Value::Bool(false))),
            // JMP, and anything else routed here, always jumps.
            _ => true,
        }
    }

    fn pop_callable(&mut self) -> Result<Builtin, VmError> {
        match self.stack.pop() {
            Some(Value::Abstract(builtin)) => Ok(builtin),
            Some(other) => Err(VmError::UnexpectedType {
                expected: ValueKind::Abstract,
                actual: other.kind(),
            }),
            None => Err(VmError::StackLen { needed: 1, depth: 0 }),
        }
    }

    fn sumstack_inner(&mut self) -> Result<(), VmError> {
        let depth = self.stack.len();
        if depth < 2 {
            return Err(VmError::StackLen { needed: 2, depth });
        }
        let (Some(a), Some(b)) = (self.stack.peek(0), self.stack.peek(1)) else {
            return Err(VmError::StackLen { needed: 2, depth });
        };
        let result = match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
            (Value::Bool(x), Value::Bool(y)) => {
                Value::Bool(u8::from(*x) + u8::from(*y) != 0)
            }
            (Value::Str(x), Value::Str(y)) => {
                let mut s = String::with_capacity(x.len() + y.len());
                s.push_str(x);
                s.push_str(y);
                Value::Str(s)
            }
            _ if a.kind() != b.kind() => {
                return Err(VmError::TypeMismatch {
                    left: a.kind(),
                    right: b.kind(),
                });
            }
            _ => return Err(VmError::UnsupportedOperand { kind: a.kind() }),
        };
        // SUMSTACK is destructive: both operands and everything below go.
        self.stack.clear();
        self.stack.push(result);
        Ok(())
    }

    fn eval_inner(&mut self, mask: EvalMask) -> Result<(), VmError> {
        let depth = self.stack.len();
        if depth < 1 {
            return Err(VmError::StackLen { needed: 1, depth });
        }
        let (Some(a), Some(b)) = (self.stack.peek(0), self.stack.peek(1)) else {
            return Err(VmError::NoStack { index: 1, depth });
        };
        if a.kind() != b.kind() {
            self.stack.clear();
            self.stack.push(Value::Bool(false));
            return Ok(());
        }
        // A true three-valued signum; a NaN comparison sets no bits.
        let ord: Option<Ordering> = match (a, b) {
            (Value::Str(x), Value::Str(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
            (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => return Err(VmError::UnsupportedOperand { kind: a.kind() }),
        };
        let mut bits = EvalMask::NONE;
        match ord {
            Some(Ordering::Equal) => bits |= EvalMask::EQUAL,
            Some(Ordering::Less) => bits |= EvalMask::SMALLER,
            Some(Ordering::Greater) => bits |= EvalMask::GREATER,
            None => {}
        }
        self.stack.clear();
        self.stack.push(Value::Bool(bits.intersects(mask)));
        Ok(())
    }

    fn load_inner(&mut self, index: u32) -> Result<(), VmError> {
        let Some(top) = self.stack.pop() else {
            return Err(VmError::StackLen { needed: 1, depth: 0 });
        };
        self.stack.clear();
        self.regs.insert(index, top);
        Ok(())
    }

    fn unload_inner(&mut self, index: u32) -> Result<(), VmError> {
        let value = self
            .regs
            .get(index)
            .cloned()
            .ok_or(VmError::NoRegister { index })?;
        self.stack.push(value);
        Ok(())
    }

    fn defunload_inner(&mut self, index: u32) -> Result<(), VmError> {
        let value = self
            .regs
            .take(index)
            .ok_or(VmError::NoRegister { index })?;
        self.stack.push(value);
        Ok(())
    }
}

/// Resolves a taken jump: `n + 1` instructions forward for `n >= 0`,
/// `|n| + 1` backward for `n < 0`. Landing outside the list is an error.
fn jump_target(at: usize, offset: i32, len: usize) -> Result<usize, VmError> {
    let bias: i64 = if offset >= 0 { 1 } else { -1 };
    let target = at as i64 + i64::from(offset) + bias;
    if (0..len as i64).contains(&target) {
        Ok(target as usize)
    } else {
        Err(VmError::OutOfJump { at, offset })
    }
}

fn emit(
    verbose: bool,
    host: &mut dyn Host,
    mask: TraceMask,
    trace: &mut Option<&mut dyn TraceSink>,
    event: TraceEvent<'_>,
) {
    if verbose {
        host.trace_line(&alloc::format!("{event}"));
    }
    if mask.contains(event.mask())
        && let Some(sink) = trace.as_mut()
    {
        sink.event(event);
    }
}

#[cfg(feature = "std")]
fn file_error(path: &str, e: &std::io::Error) -> VmError {
    use std::io::ErrorKind;
    use std::string::ToString;

    match e.kind() {
        ErrorKind::NotFound => VmError::NoFile { path: path.into() },
        ErrorKind::IsADirectory | ErrorKind::PermissionDenied => VmError::FileStat {
            path: path.into(),
            msg: e.to_string(),
        },
        _ => VmError::FileRead {
            path: path.into(),
            msg: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::{String, ToString};
    use alloc::vec;
    use alloc::vec::Vec;

    use super::{State, VmError};
    use crate::bytecode::{EvalMask, Instr};
    use crate::host::Host;
    use crate::value::{Value, ValueKind};

    #[derive(Default)]
    struct TestHost {
        lines: Vec<String>,
        sleeps: Vec<u32>,
    }

    impl Host for TestHost {
        fn write_line(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }

        fn sleep_ms(&mut self, ms: u32) {
            self.sleeps.push(ms);
        }
    }

    fn run(state: &mut State, instrs: Vec<Instr>) -> (Result<(), VmError>, TestHost) {
        let mut host = TestHost::default();
        state.feed(&crate::bytecode::encode_stream(&instrs).unwrap())
            .unwrap();
        let result = state.execute(&mut host);
        (result, host)
    }

    #[test]
    fn sumstack_adds_numbers_and_clears() {
        let mut state = State::new();
        state.push_number(40.0);
        state.push_number(1.0);
        state.push_number(2.0);
        state.sumstack().unwrap();
        assert_eq!(state.stack().len(), 1);
        assert_eq!(state.get_number(0), Ok(3.0));
    }

    #[test]
    fn sumstack_concatenates_top_then_bottom() {
        let mut state = State::new();
        state.push_string("World");
        state.push_string("Hello");
        state.sumstack().unwrap();
        assert_eq!(state.get_string(0), Ok("HelloWorld"));
    }

    #[test]
    fn sumstack_coerces_bools() {
        let mut state = State::new();
        state.push_bool(false);
        state.push_bool(true);
        state.sumstack().unwrap();
        assert_eq!(state.get_bool(0), Ok(true));

        state.stackclose();
        state.push_bool(false);
        state.push_bool(false);
        state.sumstack().unwrap();
        assert_eq!(state.get_bool(0), Ok(false));
    }

    #[test]
    fn sumstack_rejects_mismatched_tags() {
        let mut state = State::new();
        state.push_number(0.0);
        state.push_string("x");
        assert_eq!(
            state.sumstack(),
            Err(VmError::TypeMismatch {
                left: ValueKind::Str,
                right: ValueKind::Number,
            })
        );
        assert!(state.error().is_some());
    }

    #[test]
    fn sumstack_needs_two_elements() {
        let mut state = State::new();
        state.push_number(1.0);
        assert_eq!(
            state.sumstack(),
            Err(VmError::StackLen { needed: 2, depth: 1 })
        );
    }

    #[test]
    fn eval_masks_compare_numbers() {
        for (mask, expected) in [
            (EvalMask::EQUAL, false),
            (EvalMask::SMALLER, false),
            (EvalMask::GREATER, true),
            (EvalMask::GREATER | EvalMask::EQUAL, true),
        ] {
            let mut state = State::new();
            state.push_number(1.0);
            state.push_number(10.0); // top
            state.eval(mask).unwrap();
            assert_eq!(state.get_bool(0), Ok(expected), "mask {:#04x}", mask.byte());
            assert_eq!(state.stack().len(), 1);
        }
    }

    #[test]
    fn eval_compares_strings_bytewise() {
        let mut state = State::new();
        state.push_string("abd");
        state.push_string("abc"); // top; "abc" < "abd"
        state.eval(EvalMask::SMALLER).unwrap();
        assert_eq!(state.get_bool(0), Ok(true));
    }

    #[test]
    fn eval_mismatched_tags_yield_false() {
        let mut state = State::new();
        state.push_number(1.0);
        state.push_bool(true);
        state.eval(EvalMask::EQUAL | EvalMask::SMALLER | EvalMask::GREATER)
            .unwrap();
        assert_eq!(state.get_bool(0), Ok(false));
    }

    #[test]
    fn eval_nan_sets_no_bits() {
        let mut state = State::new();
        state.push_number(1.0);
        state.push_number(f64::NAN);
        state.eval(EvalMask::EQUAL | EvalMask::SMALLER | EvalMask::GREATER)
            .unwrap();
        assert_eq!(state.get_bool(0), Ok(false));
    }

    #[test]
    fn eval_with_one_element_is_an_error() {
        let mut state = State::new();
        state.push_number(1.0);
        assert_eq!(
            state.eval(EvalMask::EQUAL),
            Err(VmError::NoStack { index: 1, depth: 1 })
        );
    }

    #[test]
    fn load_then_unload_is_identity_on_top() {
        let mut state = State::new();
        state.push_string("payload");
        state.load(7).unwrap();
        assert!(state.stack().is_empty());
        state.unload(7).unwrap();
        assert_eq!(state.get_string(0), Ok("payload"));
        // The register still holds its copy.
        assert_eq!(state.regs().get(7), Some(&Value::Str("payload".into())));
    }

    #[test]
    fn load_replaces_and_clears() {
        let mut state = State::new();
        state.push_number(1.0);
        state.load(0).unwrap();
        state.push_number(2.0);
        state.push_number(3.0);
        state.load(0).unwrap();
        assert!(state.stack().is_empty());
        state.unload(0).unwrap();
        assert_eq!(state.get_number(0), Ok(3.0));
    }

    #[test]
    fn defunload_moves_and_deletes() {
        let mut state = State::new();
        state.push_bool(true);
        state.load(3).unwrap();
        state.defunload(3).unwrap();
        assert_eq!(state.get_bool(0), Ok(true));
        assert_eq!(state.defunload(3), Err(VmError::NoRegister { index: 3 }));
    }

    #[test]
    fn unload_of_absent_register_fails() {
        let mut state = State::new();
        assert_eq!(state.unload(9), Err(VmError::NoRegister { index: 9 }));
    }

    #[test]
    fn call_invokes_print_top_first() {
        let mut state = State::new();
        let (result, host) = run(
            &mut state,
            vec![
                Instr::PushDef("print".into()),
                Instr::PushStr("below".into()),
                Instr::Super,
                Instr::Call,
            ],
        );
        result.unwrap();
        assert_eq!(host.lines, ["below"]);
        assert!(state.stack().is_empty());
    }

    #[test]
    fn call_on_non_abstract_is_a_type_error() {
        let mut state = State::new();
        let (result, _) = run(&mut state, vec![Instr::PushNum(1.0), Instr::Call]);
        assert_eq!(
            result,
            Err(VmError::UnexpectedType {
                expected: ValueKind::Abstract,
                actual: ValueKind::Number,
            })
        );
    }

    #[test]
    fn pushdef_of_unknown_name_fails() {
        let mut state = State::new();
        let (result, _) = run(&mut state, vec![Instr::PushDef("nope".into())]);
        assert_eq!(result, Err(VmError::NotFound { name: "nope".into() }));
    }

    #[test]
    fn wait_consumes_one_number() {
        let mut state = State::new();
        let (result, host) = run(
            &mut state,
            vec![
                Instr::PushDef("wait".into()),
                Instr::PushNum(25.0),
                Instr::Super,
                Instr::Call,
            ],
        );
        result.unwrap();
        assert_eq!(host.sleeps, [25]);
        assert!(state.stack().is_empty());
    }

    #[test]
    fn ret_stops_and_keeps_instructions() {
        let mut state = State::new();
        let (result, _) = run(
            &mut state,
            vec![Instr::PushNum(1.0), Instr::Ret, Instr::PushNum(2.0)],
        );
        result.unwrap();
        assert_eq!(state.stack().len(), 1);
        assert_eq!(state.instructions().len(), 3);
    }

    #[test]
    fn taken_forward_jump_skips_instructions() {
        // jmp +1 lands two instructions ahead.
        let mut state = State::new();
        let (result, _) = run(
            &mut state,
            vec![
                Instr::Jmp(1),
                Instr::PushNum(1.0),
                Instr::PushNum(2.0),
                Instr::PushNum(3.0),
            ],
        );
        result.unwrap();
        let values: Vec<_> = state.stack().iter().cloned().collect();
        assert_eq!(values, [Value::Number(3.0), Value::Number(2.0)]);
    }

    #[test]
    fn jump_zero_is_a_plain_advance() {
        let mut state = State::new();
        let (result, _) = run(&mut state, vec![Instr::Jmp(0), Instr::PushNum(1.0)]);
        result.unwrap();
        assert_eq!(state.stack().len(), 1);
    }

    #[test]
    fn jump_consumes_the_condition_on_both_paths() {
        // Taken.
        let mut state = State::new();
        let (result, _) = run(
            &mut state,
            vec![Instr::PushBool(true), Instr::Jtr(0), Instr::Ret],
        );
        result.unwrap();
        assert!(state.stack().is_empty());

        // Fall-through.
        let mut state = State::new();
        let (result, _) = run(
            &mut state,
            vec![Instr::PushBool(false), Instr::Jtr(0), Instr::Ret],
        );
        result.unwrap();
        assert!(state.stack().is_empty());
    }

    #[test]
    fn conditional_jumps_read_the_top() {
        // JEM on an empty stack jumps: +1 lands past the next instruction.
        let mut state = State::new();
        let (result, _) = run(
            &mut state,
            vec![Instr::Jem(1), Instr::PushNum(1.0), Instr::PushNum(2.0)],
        );
        result.unwrap();
        assert_eq!(state.stack().len(), 1);
        assert_eq!(state.get_number(0), Ok(2.0));

        // JTR on a non-Bool top falls through.
        let mut state = State::new();
        let (result, _) = run(
            &mut state,
            vec![Instr::PushNum(5.0), Instr::Jtr(0), Instr::PushNum(1.0)],
        );
        result.unwrap();
        // The Number condition was consumed, then 1.0 pushed.
        assert_eq!(state.stack().len(), 1);
        assert_eq!(state.get_number(0), Ok(1.0));
    }

    #[test]
    fn backward_jump_loops() {
        // Sum 1 ten times via a register, in the style of a compiled
        // `while` loop.
        let mut state = State::new();
        let (result, _) = run(
            &mut state,
            vec![
                Instr::PushNum(0.0),
                Instr::Load(0),
                // loop body (index 2):
                Instr::Unload(0),
                Instr::PushNum(1.0),
                Instr::SumStack,
                Instr::Load(0),
                Instr::Unload(0),
                Instr::PushNum(10.0),
                // top is 10, below is the sum: SMALLER means 10 < sum.
                Instr::Eval(EvalMask::SMALLER),
                Instr::Jfa(-6),
                Instr::Ret,
            ],
        );
        result.unwrap();
        state.unload(0).unwrap();
        assert_eq!(state.get_number(0), Ok(11.0));
    }

    #[test]
    fn jump_off_either_end_is_out_of_jump() {
        let mut state = State::new();
        let (result, _) = run(&mut state, vec![Instr::Jmp(1000), Instr::Ret]);
        assert_eq!(
            result,
            Err(VmError::OutOfJump { at: 0, offset: 1000 })
        );

        let mut state = State::new();
        let (result, _) = run(&mut state, vec![Instr::Jmp(-2), Instr::Ret]);
        assert_eq!(result, Err(VmError::OutOfJump { at: 0, offset: -2 }));
    }

    #[test]
    fn interrupt_aborts_between_instructions() {
        let mut state = State::new();
        state.interrupt().trigger();
        let (result, _) = run(&mut state, vec![Instr::PushNum(1.0)]);
        assert_eq!(result, Err(VmError::Interrupted));
        assert!(state.stack().is_empty());
    }

    #[test]
    fn errors_are_recorded_and_close_reports_them() {
        let mut state = State::new();
        let (result, _) = run(&mut state, vec![Instr::Unload(4)]);
        assert_eq!(result, Err(VmError::NoRegister { index: 4 }));
        assert_eq!(state.error(), Some(&VmError::NoRegister { index: 4 }));
        assert_eq!(state.close(), 1);

        let state = State::new();
        assert_eq!(state.close(), 0);
    }

    #[test]
    fn first_error_wins() {
        let mut state = State::new();
        let _ = state.unload(1);
        let _ = state.unload(2);
        assert_eq!(state.error(), Some(&VmError::NoRegister { index: 1 }));
    }

    #[test]
    fn push_then_stackclose_leaves_empty() {
        let mut state = State::new();
        state.push_number(4.0);
        state.push_string("x");
        state.push_bool(true);
        state.stackclose();
        assert!(state.stack().is_empty());
    }
}
