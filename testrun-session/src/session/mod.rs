// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test run session.
//!
//! A [`TestRunSession`] owns the test tree and counters for a single run. The
//! producer side feeds it decoded messages through
//! [`handle_message`](TestRunSession::handle_message); consumers read snapshots
//! and subscribe to [`SessionEvent`](crate::listener::SessionEvent)s.

mod counters;
mod imp;
mod tracker;
mod tree;
mod tree_builder;

pub use counters::RunCountsSnapshot;
pub use imp::*;
pub use tree::{
    CaseSnapshot, ElementDetails, ElementKind, ElementSnapshot, TestResult, TestStatus,
    UNROOTED_SUITE_ID,
};
