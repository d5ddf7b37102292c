// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Criterion benchmarks for the Alu virtual machine live in `benches/vm.rs`.
