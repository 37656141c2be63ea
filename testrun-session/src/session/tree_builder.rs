// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconstructs the test tree from a pre-order stream of tree entries.
//!
//! Each suite announces how many immediate children follow it. The builder keeps a stack of
//! suites that are still waiting for children. Every new entry is a child of the suite on top of
//! the stack, and a suite is popped as soon as its last announced child arrives. That needs only
//! O(depth) extra space and no lookahead.

use super::tree::{ElementIndex, TestTree};
use crate::protocol::TreeEntry;

#[derive(Clone, Copy, Debug)]
struct PendingSuite {
    suite: ElementIndex,
    remaining: usize,
}

/// Incrementally grows a [`TestTree`] from tree entries.
#[derive(Clone, Debug, Default)]
pub(crate) struct TreeBuilder {
    pending: Vec<PendingSuite>,
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Forgets all pending suites. Called when a new run starts.
    pub(crate) fn reset(&mut self) {
        self.pending.clear();
    }

    /// The number of suites still waiting for children.
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.pending.len()
    }

    /// Adds the element described by `entry` to `tree` and returns its index.
    pub(crate) fn apply(&mut self, tree: &mut TestTree, entry: TreeEntry) -> ElementIndex {
        let parent = match self.pending.last_mut() {
            None => TestTree::ROOT,
            Some(top) => {
                let suite = top.suite;
                top.remaining -= 1;
                if top.remaining == 0 {
                    // Only the drained suite is popped. Its own parent may
                    // still be waiting for more children.
                    self.pending.pop();
                }
                suite
            }
        };

        let TreeEntry {
            id,
            name,
            is_suite,
            child_count,
        } = entry;
        let index = tree.add_element(parent, id, name, is_suite, child_count);

        if is_suite && child_count > 0 {
            self.pending.push(PendingSuite {
                suite: index,
                remaining: child_count,
            });
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ElementSnapshot;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_strategy::proptest;

    /// A simple owned tree, used as the model for reconstruction tests.
    #[derive(Clone, Debug, Eq, PartialEq)]
    struct Node {
        name: String,
        is_suite: bool,
        children: Vec<Node>,
    }

    impl Node {
        fn case(name: &str) -> Self {
            Self {
                name: name.to_owned(),
                is_suite: false,
                children: Vec::new(),
            }
        }

        fn suite(name: &str, children: Vec<Node>) -> Self {
            Self {
                name: name.to_owned(),
                is_suite: true,
                children,
            }
        }

        /// Flattens the subtree into pre-order tree entries.
        fn encode(&self, next_id: &mut usize, out: &mut Vec<TreeEntry>) {
            *next_id += 1;
            out.push(TreeEntry::new(
                next_id.to_string(),
                self.name.clone(),
                self.is_suite,
                self.children.len(),
            ));
            for child in &self.children {
                child.encode(next_id, out);
            }
        }
    }

    fn arb_node() -> impl Strategy<Value = Node> {
        let leaf = prop_oneof![
            "[a-z]{1,6}".prop_map(|name| Node::case(&name)),
            "[A-Z]{1,6}".prop_map(|name| Node::suite(&name, Vec::new())),
        ];
        leaf.prop_recursive(5, 64, 6, |inner| {
            ("[A-Z]{1,6}", prop::collection::vec(inner, 0..6))
                .prop_map(|(name, children)| Node::suite(&name, children))
        })
    }

    /// Reads the tree back out of the arena.
    fn read_back(tree: &TestTree, snapshot: &ElementSnapshot) -> Vec<Node> {
        snapshot
            .child_ids()
            .iter()
            .map(|id| {
                let index = tree.lookup(id).expect("child id is indexed");
                let child = tree.snapshot(index);
                Node {
                    name: child.name.clone(),
                    is_suite: child.as_case().is_none(),
                    children: read_back(tree, &child),
                }
            })
            .collect()
    }

    fn build(roots: &[Node]) -> (TestTree, TreeBuilder) {
        let mut entries = Vec::new();
        let mut next_id = 0;
        for root in roots {
            root.encode(&mut next_id, &mut entries);
        }

        let mut tree = TestTree::new("run");
        let mut builder = TreeBuilder::new();
        for entry in entries {
            builder.apply(&mut tree, entry);
        }
        (tree, builder)
    }

    #[test]
    fn nested_suites() {
        let roots = vec![
            Node::suite(
                "All",
                vec![
                    Node::suite("Inner", vec![Node::case("a"), Node::case("b")]),
                    Node::case("c"),
                    Node::suite("Empty", Vec::new()),
                    Node::case("d"),
                ],
            ),
            Node::case("top-level"),
        ];
        let (tree, builder) = build(&roots);

        assert_eq!(read_back(&tree, &tree.snapshot(TestTree::ROOT)), roots);
        assert_eq!(builder.depth(), 0);
    }

    #[test]
    fn first_entry_attaches_to_root() {
        let mut tree = TestTree::new("run");
        let mut builder = TreeBuilder::new();
        let index = builder.apply(&mut tree, TreeEntry::new("1", "A", false, 0));

        assert_eq!(tree.snapshot(index).parent_id, None);
        assert_eq!(tree.snapshot(TestTree::ROOT).child_ids(), ["1"]);
    }

    #[test]
    fn zero_count_suite_is_a_leaf() {
        let mut tree = TestTree::new("run");
        let mut builder = TreeBuilder::new();
        builder.apply(&mut tree, TreeEntry::new("1", "Outer", true, 2));
        builder.apply(&mut tree, TreeEntry::new("2", "Empty", true, 0));
        assert_eq!(builder.depth(), 1, "empty suites are never pushed");
        builder.apply(&mut tree, TreeEntry::new("3", "a", false, 0));
        assert_eq!(builder.depth(), 0);

        let outer = tree.snapshot(tree.lookup("1").expect("outer is indexed"));
        assert_eq!(outer.child_ids(), ["2", "3"]);
    }

    #[test]
    fn incomplete_stream_leaves_suites_pending() {
        let mut tree = TestTree::new("run");
        let mut builder = TreeBuilder::new();
        builder.apply(&mut tree, TreeEntry::new("1", "Outer", true, 3));
        builder.apply(&mut tree, TreeEntry::new("2", "a", false, 0));
        assert_eq!(builder.depth(), 1);

        builder.reset();
        builder.apply(&mut tree, TreeEntry::new("3", "b", false, 0));
        assert_eq!(
            tree.snapshot(TestTree::ROOT).child_ids(),
            ["1", "3"],
            "after a reset new entries attach to the root"
        );
    }

    #[proptest(cases = 128)]
    fn reconstructs_any_tree(
        #[strategy(prop::collection::vec(arb_node(), 0..4))] roots: Vec<Node>,
    ) {
        let (tree, builder) = build(&roots);
        prop_assert_eq!(read_back(&tree, &tree.snapshot(TestTree::ROOT)), roots);
        prop_assert_eq!(builder.depth(), 0);
    }
}
