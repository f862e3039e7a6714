use crate::operation::{Operation, PlannedWrite};
use serde::Serialize;

/// Flat, ordered list of planned writes.
///
/// Cross-kind order follows the dependency order. Within a kind,
/// deactivations of retired rows come first, then writes to existing rows,
/// then creates; each group keeps manifest order. The executor applies it
/// front to back.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OperationQueue {
    ops: Vec<Operation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.ops.iter()
    }

    pub fn describe(&self) -> Vec<String> {
        self.ops.iter().map(PlannedWrite::describe).collect()
    }
}

impl Extend<Operation> for OperationQueue {
    fn extend<T: IntoIterator<Item = Operation>>(&mut self, iter: T) {
        self.ops.extend(iter);
    }
}

impl IntoIterator for OperationQueue {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a OperationQueue {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
