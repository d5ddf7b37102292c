// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The platform interface.
//!
//! The VM never performs I/O itself: printing, timed waits, and debug trace
//! lines are delegated to an embedder-provided [`Host`]. The driver binary
//! supplies [`StdHost`]; tests supply recording hosts.

/// Platform services consumed by the VM and its builtins.
pub trait Host {
    /// Writes one line of program output (the `print` sink).
    fn write_line(&mut self, line: &str);

    /// Suspends the calling thread for `ms` milliseconds (the `wait`
    /// primitive). A busy wait is acceptable.
    fn sleep_ms(&mut self, ms: u32);

    /// Receives a debug trace line when verbose mode is enabled.
    fn trace_line(&mut self, line: &str) {
        let _ = line;
    }
}

/// A [`Host`] backed by stdout, stderr, and the OS clock.
#[cfg(feature = "std")]
#[derive(Copy, Clone, Debug, Default)]
pub struct StdHost;

#[cfg(feature = "std")]
impl Host for StdHost {
    fn write_line(&mut self, line: &str) {
        std::println!("{line}");
    }

    fn sleep_ms(&mut self, ms: u32) {
        std::thread::sleep(core::time::Duration::from_millis(u64::from(ms)));
    }

    fn trace_line(&mut self, line: &str) {
        std::eprintln!("[alu] {line}");
    }
}
