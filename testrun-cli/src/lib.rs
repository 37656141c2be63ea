// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `testrun` command-line tool.
//!
//! `testrun replay` feeds a captured remote test runner event stream into a
//! test run session and prints what the session saw.

mod dispatch;
mod output;

pub use dispatch::*;
pub use output::OutputContext;
