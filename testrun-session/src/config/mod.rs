// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session configuration.
//!
//! Settings are read from a TOML file with a single `[session]` table. Any key
//! left out of the file falls back to the built-in default:
//!
//! ```toml
//! [session]
//! unrooted-suite-name = "Unrooted Tests"
//! ignored-prefix = "@Ignore: "
//! assumption-failure-prefix = "@AssumptionFailure: "
//! ```
//!
//! Unknown keys are reported with a warning and otherwise ignored.

mod imp;

pub use imp::*;
