// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The line-oriented protocol spoken by the remote test runner.
//!
//! Inbound messages are either [`TreeEntry`] values, which announce the shape
//! of the test tree before it runs, or [`RunEvent`] values, which report
//! progress. [`MessageReader`] turns raw lines into these messages. Outbound
//! instructions are encoded by [`RemoteCommand`].

mod command;
mod entry;
mod message;
mod reader;

pub use command::*;
pub use entry::*;
pub use message::*;
pub use reader::*;
