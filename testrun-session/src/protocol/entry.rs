// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{MalformedEntryError, MalformedEntryReason};

/// One node of the test tree, announced before the run executes it.
///
/// Entries arrive in pre-order. Each suite announces how many immediate
/// children follow it, which is all the tree builder needs to reconstruct the
/// shape of the tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeEntry {
    /// The test id, unique within a run.
    pub id: String,

    /// The display name, unescaped.
    pub name: String,

    /// True if this node is a suite.
    pub is_suite: bool,

    /// The number of immediate children announced by this node.
    pub child_count: usize,
}

impl TreeEntry {
    /// Creates a new tree entry.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        is_suite: bool,
        child_count: usize,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_suite,
            child_count,
        }
    }

    /// Decodes a tree entry from its wire form `id,name,isSuite,childCount`.
    ///
    /// The id runs up to the first comma and is taken verbatim. In the name, a
    /// backslash makes the following character literal, so `\,` is a comma
    /// and `\\` is a backslash.
    pub fn decode(line: &str) -> Result<Self, MalformedEntryError> {
        let malformed = |reason| MalformedEntryError::new(line, reason);

        let (id, rest) = line
            .split_once(',')
            .ok_or_else(|| malformed(MalformedEntryReason::MissingIdSeparator))?;

        let mut name = String::new();
        let mut armed = false;
        let mut name_end = None;
        for (idx, c) in rest.char_indices() {
            if armed {
                name.push(c);
                armed = false;
            } else if c == '\\' {
                armed = true;
            } else if c == ',' {
                name_end = Some(idx);
                break;
            } else {
                name.push(c);
            }
        }
        let name_end =
            name_end.ok_or_else(|| malformed(MalformedEntryReason::UnterminatedName))?;

        let (is_suite, child_count) = rest[name_end + 1..]
            .split_once(',')
            .ok_or_else(|| malformed(MalformedEntryReason::MissingSuiteSeparator))?;

        // `str::parse` accepts a leading `+`, which the grammar doesn't.
        if child_count.is_empty() || !child_count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed(MalformedEntryReason::InvalidChildCount));
        }
        let child_count = child_count
            .parse()
            .map_err(|_| malformed(MalformedEntryReason::InvalidChildCount))?;

        Ok(Self {
            id: id.to_owned(),
            name,
            is_suite: is_suite.eq_ignore_ascii_case("true"),
            child_count,
        })
    }

    /// Encodes this entry into its wire form.
    ///
    /// The id is written verbatim and must not contain a comma.
    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{}",
            self.id,
            escape_name(&self.name),
            self.is_suite,
            self.child_count
        )
    }
}

/// Escapes `\` and `,` in a test name.
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '\\' || c == ',' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
