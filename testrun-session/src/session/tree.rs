// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Arena storage for the test tree.
//!
//! Elements live in a flat table indexed by [`ElementIndex`]. Suites refer to their children by
//! index and every element refers to its parent by index, so the tree has no owning back-edges.
//! A child is always created after its parent, which means a child's index is always greater than
//! its parent's.

use crate::{
    protocol::{FailureStatus, RerunStatus},
    time::StopwatchStart,
};
use std::{collections::HashMap, fmt, time::Duration};
use tracing::warn;

/// Id given to the suite that collects unrooted tests.
pub const UNROOTED_SUITE_ID: &str = "-2";

/// Index of an element in the tree arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct ElementIndex(usize);

/// Whether an element is a suite or a test case.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ElementKind {
    /// A suite, which contains other elements.
    Suite,

    /// A test case.
    Case,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suite => write!(f, "suite"),
            Self::Case => write!(f, "test case"),
        }
    }
}

/// The execution status of a test case.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TestStatus {
    /// The test hasn't started.
    #[default]
    NotRun,

    /// The test is executing.
    Running,

    /// The test passed.
    Ok,

    /// An assertion in the test failed.
    Failure,

    /// The test threw an unexpected error.
    Error,
}

impl TestStatus {
    /// Returns true if the test finished, whatever the outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ok | Self::Failure | Self::Error)
    }

    /// Returns true for [`Self::Error`] and [`Self::Failure`].
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failure | Self::Error)
    }
}

impl From<FailureStatus> for TestStatus {
    fn from(status: FailureStatus) -> Self {
        match status {
            FailureStatus::Error => Self::Error,
            FailureStatus::Failure => Self::Failure,
        }
    }
}

impl From<RerunStatus> for TestStatus {
    fn from(status: RerunStatus) -> Self {
        match status {
            RerunStatus::Ok => Self::Ok,
            RerunStatus::Error => Self::Error,
            RerunStatus::Failure => Self::Failure,
        }
    }
}

/// The result of an element, derived from the statuses of the test cases under it.
///
/// Results are computed on demand and never stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TestResult {
    /// Nothing under the element has started.
    NotRun,

    /// Some tests under the element are still running or haven't started.
    Running,

    /// Every test under the element passed or was ignored.
    Ok,

    /// The test was ignored, or an assumption in it failed.
    Ignored,

    /// At least one test failed an assertion, and none had an error.
    Failure,

    /// At least one test had an error.
    Error,
}

impl TestResult {
    /// Returns true for [`Self::Error`] and [`Self::Failure`].
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failure | Self::Error)
    }

    fn from_case(case: &CaseData) -> Self {
        if case.ignored || case.assumption_failed {
            return Self::Ignored;
        }
        match case.status {
            TestStatus::NotRun => Self::NotRun,
            TestStatus::Running => Self::Running,
            TestStatus::Ok => Self::Ok,
            TestStatus::Failure => Self::Failure,
            TestStatus::Error => Self::Error,
        }
    }

    /// Combines the results of a suite's children.
    fn aggregate(children: impl IntoIterator<Item = TestResult>) -> Self {
        let mut any = false;
        let mut any_failure = false;
        let mut all_done = true;
        let mut all_not_run = true;

        for result in children {
            any = true;
            match result {
                Self::Error => return Self::Error,
                Self::Failure => {
                    any_failure = true;
                    all_not_run = false;
                }
                Self::Ok | Self::Ignored => all_not_run = false,
                Self::Running => {
                    all_done = false;
                    all_not_run = false;
                }
                Self::NotRun => all_done = false,
            }
        }

        if any_failure {
            Self::Failure
        } else if !any || all_not_run {
            Self::NotRun
        } else if all_done {
            Self::Ok
        } else {
            Self::Running
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ElementNode {
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    pub(crate) parent: Option<ElementIndex>,
    pub(crate) data: ElementData,
}

impl ElementNode {
    pub(crate) fn kind(&self) -> ElementKind {
        match self.data {
            ElementData::Suite(_) => ElementKind::Suite,
            ElementData::Case(_) => ElementKind::Case,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ElementData {
    Suite(SuiteData),
    Case(CaseData),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SuiteData {
    pub(crate) children: Vec<ElementIndex>,
    pub(crate) announced_children: usize,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct CaseData {
    pub(crate) status: TestStatus,
    pub(crate) trace: Option<String>,
    pub(crate) expected: Option<String>,
    pub(crate) actual: Option<String>,
    pub(crate) ignored: bool,
    pub(crate) assumption_failed: bool,
    pub(crate) stopwatch: Option<StopwatchStart>,
    pub(crate) elapsed: Option<Duration>,
}

/// The element arena plus the id index.
#[derive(Clone, Debug)]
pub(crate) struct TestTree {
    nodes: Vec<ElementNode>,
    by_id: HashMap<String, ElementIndex>,
    unrooted: Option<ElementIndex>,
}

impl TestTree {
    pub(crate) const ROOT: ElementIndex = ElementIndex(0);

    pub(crate) fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![ElementNode {
                id: None,
                name: root_name.into(),
                parent: None,
                data: ElementData::Suite(SuiteData::default()),
            }],
            by_id: HashMap::new(),
            unrooted: None,
        }
    }

    /// The number of elements, including the root.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, index: ElementIndex) -> &ElementNode {
        &self.nodes[index.0]
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<ElementIndex> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn case_mut(&mut self, index: ElementIndex) -> Option<&mut CaseData> {
        match &mut self.nodes[index.0].data {
            ElementData::Case(case) => Some(case),
            ElementData::Suite(_) => None,
        }
    }

    /// Appends a new element to `parent` and indexes it under `id`.
    pub(crate) fn add_element(
        &mut self,
        parent: ElementIndex,
        id: impl Into<String>,
        name: impl Into<String>,
        is_suite: bool,
        child_count: usize,
    ) -> ElementIndex {
        let id = id.into();
        let index = ElementIndex(self.nodes.len());
        let data = if is_suite {
            ElementData::Suite(SuiteData {
                children: Vec::new(),
                announced_children: child_count,
            })
        } else {
            ElementData::Case(CaseData::default())
        };

        match &mut self.nodes[parent.0].data {
            ElementData::Suite(suite) => suite.children.push(index),
            ElementData::Case(_) => {
                panic!("parent {parent:?} of element `{id}` is a test case, not a suite")
            }
        }
        if let Some(previous) = self.by_id.insert(id.clone(), index) {
            warn!(
                "test id `{id}` was announced twice; `{}` is no longer reachable by id",
                self.nodes[previous.0].name
            );
        }
        self.nodes.push(ElementNode {
            id: Some(id),
            name: name.into(),
            parent: Some(parent),
            data,
        });
        index
    }

    /// Returns the suite that parks unrooted tests, creating it on first use.
    pub(crate) fn unrooted_suite(&mut self, name: &str) -> ElementIndex {
        if let Some(index) = self.unrooted {
            return index;
        }
        let index = self.add_element(Self::ROOT, UNROOTED_SUITE_ID, name, true, 0);
        self.unrooted = Some(index);
        index
    }

    /// Computes the result of a single element.
    pub(crate) fn result(&self, index: ElementIndex, include_children: bool) -> TestResult {
        match &self.node(index).data {
            ElementData::Case(case) => TestResult::from_case(case),
            ElementData::Suite(_) if include_children => self.subtree_result(index),
            // Events only ever target test cases, so a suite has no status of
            // its own.
            ElementData::Suite(_) => TestResult::NotRun,
        }
    }

    /// Computes the result of the suite at `index` from everything below it.
    ///
    /// Trees can nest arbitrarily deep, so this walks the subtree with an
    /// explicit stack rather than recursing.
    fn subtree_result(&self, index: ElementIndex) -> TestResult {
        // Pre-order: every suite is listed before its children.
        let mut order = Vec::new();
        let mut stack = vec![index];
        while let Some(next) = stack.pop() {
            order.push(next);
            if let ElementData::Suite(suite) = &self.node(next).data {
                stack.extend(suite.children.iter().copied());
            }
        }

        let mut results = HashMap::with_capacity(order.len());
        for &next in order.iter().rev() {
            let result = match &self.node(next).data {
                ElementData::Case(case) => TestResult::from_case(case),
                ElementData::Suite(suite) => {
                    TestResult::aggregate(suite.children.iter().map(|child| results[child]))
                }
            };
            results.insert(next, result);
        }
        results[&index]
    }

    /// Computes the results of every element in a single pass.
    fn all_results(&self) -> Vec<TestResult> {
        let mut results = vec![TestResult::NotRun; self.nodes.len()];
        // Children always come after their parents, so walking backwards
        // visits every child before its parent.
        for (idx, node) in self.nodes.iter().enumerate().rev() {
            results[idx] = match &node.data {
                ElementData::Case(case) => TestResult::from_case(case),
                ElementData::Suite(suite) => {
                    TestResult::aggregate(suite.children.iter().map(|child| results[child.0]))
                }
            };
        }
        results
    }

    /// Returns every element below the root whose result is an error or a
    /// failure, in pre-order.
    pub(crate) fn failed_elements(&self) -> Vec<ElementIndex> {
        let results = self.all_results();
        let mut failed = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(index) = stack.pop() {
            if index != Self::ROOT && results[index.0].is_failure() {
                failed.push(index);
            }
            if let ElementData::Suite(suite) = &self.node(index).data {
                stack.extend(suite.children.iter().rev().copied());
            }
        }
        failed
    }

    pub(crate) fn snapshot(&self, index: ElementIndex) -> ElementSnapshot {
        let node = self.node(index);
        let details = match &node.data {
            ElementData::Suite(suite) => ElementDetails::Suite {
                child_ids: suite
                    .children
                    .iter()
                    .filter_map(|&child| self.node(child).id.clone())
                    .collect(),
                announced_children: suite.announced_children,
            },
            ElementData::Case(case) => ElementDetails::Case(CaseSnapshot {
                status: case.status,
                trace: case.trace.clone(),
                expected: case.expected.clone(),
                actual: case.actual.clone(),
                ignored: case.ignored,
                assumption_failed: case.assumption_failed,
                elapsed: case.elapsed,
            }),
        };
        ElementSnapshot {
            id: node.id.clone(),
            name: node.name.clone(),
            parent_id: node.parent.and_then(|parent| self.node(parent).id.clone()),
            result: self.result(index, true),
            details,
        }
    }
}

/// A point-in-time copy of an element of the test tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElementSnapshot {
    /// The element's id. Only the root has no id.
    pub id: Option<String>,

    /// The display name.
    pub name: String,

    /// The parent's id, or `None` if the parent is the root (or this is the
    /// root).
    pub parent_id: Option<String>,

    /// The result including all children, at the time of the snapshot.
    pub result: TestResult,

    /// Suite- or case-specific details.
    pub details: ElementDetails,
}

impl ElementSnapshot {
    /// Returns the element's kind.
    pub fn kind(&self) -> ElementKind {
        match self.details {
            ElementDetails::Suite { .. } => ElementKind::Suite,
            ElementDetails::Case(_) => ElementKind::Case,
        }
    }

    /// Returns case details, or `None` for a suite.
    pub fn as_case(&self) -> Option<&CaseSnapshot> {
        match &self.details {
            ElementDetails::Case(case) => Some(case),
            ElementDetails::Suite { .. } => None,
        }
    }

    /// Returns the ids of a suite's children in arrival order, or an empty
    /// slice for a test case.
    pub fn child_ids(&self) -> &[String] {
        match &self.details {
            ElementDetails::Suite { child_ids, .. } => child_ids,
            ElementDetails::Case(_) => &[],
        }
    }

    /// For JUnit-style names of the form `method(com.example.Class)`, returns
    /// the class name.
    pub fn class_name(&self) -> Option<&str> {
        let (_, rest) = self.name.rsplit_once('(')?;
        rest.strip_suffix(')')
    }

    /// For JUnit-style names of the form `method(com.example.Class)`, returns
    /// the method name. Other names are returned unchanged.
    pub fn method_name(&self) -> &str {
        match self.name.rsplit_once('(') {
            Some((method, rest)) if rest.ends_with(')') => method,
            _ => &self.name,
        }
    }
}

/// Details that depend on the element's kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ElementDetails {
    /// A suite.
    Suite {
        /// Ids of the children, in arrival order.
        child_ids: Vec<String>,

        /// The child count the suite announced in its tree entry.
        announced_children: usize,
    },

    /// A test case.
    Case(CaseSnapshot),
}

/// The state of a test case.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaseSnapshot {
    /// The execution status.
    pub status: TestStatus,

    /// The failure trace, if the test failed.
    pub trace: Option<String>,

    /// The expected value of a failed comparison.
    pub expected: Option<String>,

    /// The actual value of a failed comparison.
    pub actual: Option<String>,

    /// True if the runner reported the test as ignored.
    pub ignored: bool,

    /// True if an assumption in the test failed.
    pub assumption_failed: bool,

    /// Time between the test's start and end messages, once it ended.
    pub elapsed: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&[], TestResult::NotRun; "no children")]
    #[test_case(&[TestResult::NotRun, TestResult::NotRun], TestResult::NotRun; "nothing started")]
    #[test_case(&[TestResult::Ok, TestResult::NotRun], TestResult::Running; "partially done")]
    #[test_case(&[TestResult::Ok, TestResult::Running], TestResult::Running; "one running")]
    #[test_case(&[TestResult::Ok, TestResult::Ignored], TestResult::Ok; "ignored counts as ok")]
    #[test_case(
        &[TestResult::Ok, TestResult::Failure, TestResult::Running],
        TestResult::Failure
        ; "failure wins over running"
    )]
    #[test_case(
        &[TestResult::Failure, TestResult::Error, TestResult::Ok],
        TestResult::Error
        ; "error wins over failure"
    )]
    fn aggregate(children: &[TestResult], expected: TestResult) {
        assert_eq!(TestResult::aggregate(children.iter().copied()), expected);
    }

    #[test]
    fn unrooted_suite_is_created_once() {
        let mut tree = TestTree::new("run");
        let first = tree.unrooted_suite("Unrooted Tests");
        let second = tree.unrooted_suite("Unrooted Tests");
        assert_eq!(first, second);
        assert_eq!(tree.lookup(UNROOTED_SUITE_ID), Some(first));
        assert_eq!(tree.snapshot(TestTree::ROOT).child_ids(), ["-2"]);
    }

    #[test]
    fn duplicate_id_points_at_newest_element() {
        let mut tree = TestTree::new("run");
        let first = tree.add_element(TestTree::ROOT, "1", "first", false, 0);
        let second = tree.add_element(TestTree::ROOT, "1", "second", false, 0);
        assert_ne!(first, second);
        assert_eq!(tree.lookup("1"), Some(second));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn failed_elements_in_pre_order() {
        let mut tree = TestTree::new("run");
        let suite = tree.add_element(TestTree::ROOT, "1", "Suite", true, 2);
        let a = tree.add_element(suite, "2", "A", false, 0);
        let b = tree.add_element(suite, "3", "B", false, 0);
        let c = tree.add_element(TestTree::ROOT, "4", "C", false, 0);
        tree.case_mut(a).expect("A is a case").status = TestStatus::Ok;
        tree.case_mut(b).expect("B is a case").status = TestStatus::Failure;
        tree.case_mut(c).expect("C is a case").status = TestStatus::Error;

        assert_eq!(tree.failed_elements(), vec![suite, b, c]);
        assert_eq!(tree.result(TestTree::ROOT, true), TestResult::Error);
        assert_eq!(tree.result(TestTree::ROOT, false), TestResult::NotRun);
    }

    #[test]
    fn deeply_nested_results() {
        const DEPTH: usize = 100_000;

        let mut tree = TestTree::new("run");
        let mut parent = TestTree::ROOT;
        for i in 0..DEPTH {
            parent = tree.add_element(parent, i.to_string(), "s", true, 1);
        }
        let leaf = tree.add_element(parent, "leaf", "leaf", false, 0);
        tree.case_mut(leaf).expect("leaf is a case").status = TestStatus::Failure;

        assert_eq!(tree.result(TestTree::ROOT, true), TestResult::Failure);
        let outermost = tree.lookup("0").expect("outermost suite is indexed");
        assert_eq!(tree.snapshot(outermost).result, TestResult::Failure);
        assert_eq!(tree.failed_elements().len(), DEPTH + 1);
    }

    #[test]
    fn junit_names() {
        let mut tree = TestTree::new("run");
        let case = tree.add_element(
            TestTree::ROOT,
            "1",
            "testFoo(com.example.FooTest)",
            false,
            0,
        );
        let plain = tree.add_element(TestTree::ROOT, "2", "plain name", false, 0);

        let case = tree.snapshot(case);
        assert_eq!(case.class_name(), Some("com.example.FooTest"));
        assert_eq!(case.method_name(), "testFoo");

        let plain = tree.snapshot(plain);
        assert_eq!(plain.class_name(), None);
        assert_eq!(plain.method_name(), "plain name");
    }
}
