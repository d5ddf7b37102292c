// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end conformance scenarios for the Alu virtual machine live in
//! `tests/conformance.rs`.
