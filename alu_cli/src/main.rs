// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-line driver for the Alu virtual machine.
//!
//! Resolves a compiled program path, hands the bytes to the core, and
//! propagates the exit status: 0 on a clean run, 1 on any VM error.

use std::env;
use std::process;

use anyhow::{Context, Result};

use alu::host::StdHost;
use alu::vm::State;

struct Args {
    path: String,
    verbose: bool,
}

fn parse_args() -> Option<Args> {
    let mut path = None;
    let mut verbose = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => verbose = true,
            _ if path.is_none() => path = Some(arg),
            _ => return None,
        }
    }
    Some(Args {
        path: path?,
        verbose,
    })
}

fn print_usage(program: &str) {
    eprintln!("Alu virtual machine");
    eprintln!("Usage: {program} <program.alc> [-v]");
}

fn run(args: &Args) -> Result<i32> {
    let mut state = State::new();
    state.set_verbose(args.verbose);

    let interrupt = state.interrupt();
    ctrlc::set_handler(move || interrupt.trigger())
        .context("failed to install the interrupt handler")?;

    let mut host = StdHost;
    // Errors are recorded in the state; close() reports them.
    let _ = state.start_file(&args.path, &mut host);
    Ok(state.close())
}

fn main() {
    let Some(args) = parse_args() else {
        let program = env::args().next().unwrap_or_else(|| "alu".into());
        print_usage(&program);
        process::exit(1);
    };
    match run(&args) {
        Ok(status) => process::exit(status),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}
