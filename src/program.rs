//! Program store: the ordered instruction list of a coroutine.
//!
//! A program is an append-only sequence of steps plus a label table.
//! Indices returned by [`Program::append`] are dense and stable, which
//! lets the control-flow builders reference "the instruction I am about to
//! emit" before emitting it when wiring forward jumps.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::coroutine::Coroutine;
use crate::error::CoroError;

/// Result of running a single step.
pub type StepResult = Result<(), CoroError>;

/// A single unit of work in a coroutine's program.
///
/// Every step receives a handle to the coroutine the engine is driving, so
/// it can yield, jump, graft children or mutate globals. Steps are shared
/// (`Rc`) because the engine clones the current step out of the store
/// before invoking it.
pub type Step<V> = Rc<dyn Fn(&Coroutine<V>) -> StepResult>;

/// Ordered list of steps and the label table over them.
pub struct Program<V> {
    steps: Vec<Step<V>>,
    labels: FxHashMap<Box<str>, usize>,
}

impl<V: 'static> Program<V> {
    pub fn new() -> Self {
        Program {
            steps: Vec::new(),
            labels: FxHashMap::default(),
        }
    }

    /// Append a step, returning its index.
    ///
    /// Indices are monotonically increasing and dense: 0, 1, 2, ...
    pub fn append(&mut self, step: Step<V>) -> usize {
        let idx = self.steps.len();
        self.steps.push(step);
        idx
    }

    /// Append a labeled step, returning its index.
    ///
    /// A label that was already assigned is re-pointed at the new step;
    /// labels are never removed.
    pub fn append_labeled(&mut self, label: &str, step: Step<V>) -> usize {
        let idx = self.append(step);
        self.labels.insert(label.into(), idx);
        idx
    }

    /// Look up the step index a label points at.
    pub fn resolve(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    /// Fetch a shared handle to the step at `idx`.
    pub(crate) fn step_at(&self, idx: usize) -> Option<Step<V>> {
        self.steps.get(idx).map(Rc::clone)
    }

    /// Number of steps in the program.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Drop every step and label.
    pub(crate) fn clear(&mut self) {
        self.steps.clear();
        self.labels.clear();
    }
}

impl<V: 'static> Default for Program<V> {
    fn default() -> Self {
        Self::new()
    }
}
