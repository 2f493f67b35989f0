//! Coroutine handle, state machine and execution engine.
//!
//! A [`Coroutine`] is a cheap-clone handle over one execution unit: a
//! program of steps, a program counter, a yield slot and an optional link
//! to a grafted child. The engine drives the *deepest live link* of the
//! chain one step at a time; a coroutine with a running child is a
//! transparent delegator.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CoroError;
use crate::program::{Program, Step, StepResult};

/// Construction-time id counter. Execution is single-threaded, but nothing
/// prevents coroutines from being *created* on several threads.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Execution state of a single chain link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built but not started (or returned here by [`Coroutine::reset`]).
    Created,
    /// Actively executing steps.
    Running,
    /// Parked at a yield point with a value pending.
    Suspended,
    /// Terminal; further [`Coroutine::exec`] calls have no effect.
    Stopped,
}

struct Inner<V> {
    id: u64,
    name: Option<Box<str>>,
    program: Program<V>,
    globals: FxHashMap<Box<str>, V>,
    yield_slot: Option<V>,
    pc: usize,
    state: State,
    loop_starts: Vec<usize>,
    loop_ends: Vec<usize>,
    next: Option<Coroutine<V>>,
    parent: Option<Weak<RefCell<Inner<V>>>>,
    fault: Option<CoroError>,
}

impl<V> Inner<V> {
    fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => format!("coroutine-{}", self.id),
        }
    }
}

/// A cooperative, single-threaded coroutine.
///
/// The handle is reference-counted; cloning it aliases the same execution
/// unit, which is how step closures, control-flow builders and iterators
/// all talk to one coroutine without fighting the borrow checker.
pub struct Coroutine<V> {
    inner: Rc<RefCell<Inner<V>>>,
}

// Manual impl: the handle clones by bumping the refcount, V need not be Clone.
impl<V> Clone for Coroutine<V> {
    fn clone(&self) -> Self {
        Coroutine {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: 'static> Coroutine<V> {
    /// Create an empty coroutine in the [`State::Created`] state.
    pub fn new() -> Self {
        Coroutine {
            inner: Rc::new(RefCell::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: None,
                program: Program::new(),
                globals: FxHashMap::default(),
                yield_slot: None,
                pc: 0,
                state: State::Created,
                loop_starts: Vec::new(),
                loop_ends: Vec::new(),
                next: None,
                parent: None,
                fault: None,
            })),
        }
    }

    /// Create a coroutine and immediately hand it to `f` for population.
    ///
    /// Lazy-inline construction: `Coroutine::with(|co| { co.append(...); })`.
    pub fn with(f: impl FnOnce(&Coroutine<V>)) -> Self {
        let co = Coroutine::new();
        f(&co);
        co
    }

    /// Unique id of this coroutine, assigned at construction.
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// Set a debugging name, used by `Display` and in fault messages.
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.borrow_mut().name = Some(name.into().into_boxed_str());
    }

    /// The debugging name, if one was set.
    pub fn name(&self) -> Option<String> {
        self.inner.borrow().name.as_ref().map(|n| n.to_string())
    }

    /// Current state of this link (not chain-aware).
    pub fn state(&self) -> State {
        self.inner.borrow().state
    }

    // ───────────────────────────────────────────────────────────────────
    // Program store
    // ───────────────────────────────────────────────────────────────────

    /// Append a step, returning its index in the program.
    pub fn append(&self, step: impl Fn(&Coroutine<V>) -> StepResult + 'static) -> usize {
        self.append_step(Rc::new(step))
    }

    /// Append a labeled step, returning its index.
    ///
    /// Re-using a label re-points it at the new step.
    pub fn append_labeled(
        &self,
        label: &str,
        step: impl Fn(&Coroutine<V>) -> StepResult + 'static,
    ) -> usize {
        self.inner
            .borrow_mut()
            .program
            .append_labeled(label, Rc::new(step))
    }

    pub(crate) fn append_step(&self, step: Step<V>) -> usize {
        self.inner.borrow_mut().program.append(step)
    }

    /// Look up the index a label points at.
    pub fn resolve(&self, label: &str) -> Option<usize> {
        self.inner.borrow().program.resolve(label)
    }

    /// Number of steps in the program.
    pub fn len(&self) -> usize {
        self.inner.borrow().program.len()
    }

    /// Current program counter of this link (not chain-aware).
    pub fn pc(&self) -> usize {
        self.inner.borrow().pc
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().program.is_empty()
    }

    /// Drop the program, labels and globals. State and pc are untouched.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.program.clear();
        inner.globals.clear();
    }

    // ───────────────────────────────────────────────────────────────────
    // Jumps
    // ───────────────────────────────────────────────────────────────────

    /// Move the program counter to `target`, clamped to the program bounds.
    ///
    /// The next executed step is the one at the (clamped) target; a jump
    /// inside a step overrides the natural pc increment.
    pub fn jump(&self, target: usize) {
        let mut inner = self.inner.borrow_mut();
        let len = inner.program.len();
        inner.pc = if len == 0 { 0 } else { target.min(len - 1) };
    }

    /// Jump to a label; unknown labels leave the program counter unchanged.
    pub fn jump_label(&self, label: &str) {
        let target = self.inner.borrow().program.resolve(label);
        if let Some(idx) = target {
            self.jump(idx);
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Globals
    // ───────────────────────────────────────────────────────────────────

    /// Store a named value scoped to this coroutine.
    pub fn set_value(&self, name: &str, value: V) {
        self.inner.borrow_mut().globals.insert(name.into(), value);
    }

    // ───────────────────────────────────────────────────────────────────
    // Composition chain
    // ───────────────────────────────────────────────────────────────────

    /// Graft a fresh, empty child coroutine onto this one.
    ///
    /// Until the child stops, chain-aware operations (`exec`, `is_stopped`,
    /// `is_yielding`, `take_yield_value`) act on it instead of on this
    /// coroutine. Pushing while a live child exists replaces the link.
    pub fn push(&self) -> Coroutine<V> {
        let child = Coroutine::new();
        child.inner.borrow_mut().parent = Some(Rc::downgrade(&self.inner));
        self.inner.borrow_mut().next = Some(child.clone());
        child
    }

    /// Graft a child and hand it to `f` for population.
    pub fn push_with(&self, f: impl FnOnce(&Coroutine<V>)) -> Coroutine<V> {
        let child = self.push();
        f(&child);
        child
    }

    /// Graft a named child.
    pub fn push_named(&self, name: impl Into<String>) -> Coroutine<V> {
        let child = self.push();
        child.set_name(name);
        child
    }

    /// Unlink this coroutine from its parent's chain.
    pub(crate) fn detach(&self) {
        let parent = self.inner.borrow().parent.clone();
        if let Some(p) = parent.and_then(|weak| weak.upgrade()) {
            p.borrow_mut().next = None;
        }
        self.inner.borrow_mut().next = None;
    }

    /// Resolve the deepest live link of the chain: the unit that actually
    /// executes. Stopped children are skipped; a coroutine with no live
    /// child resolves to itself.
    fn active(&self) -> Coroutine<V> {
        let mut current = self.clone();
        loop {
            let child = current.inner.borrow().next.clone();
            match child {
                Some(c) if !c.current_is_stopped() => current = c,
                _ => return current,
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Lifecycle
    // ───────────────────────────────────────────────────────────────────

    /// Transition to [`State::Running`].
    ///
    /// A coroutine with a parent also gets a final self-detach step, so
    /// that once it runs to completion the chain walks past it.
    pub fn start(&self) {
        let has_parent = {
            let mut inner = self.inner.borrow_mut();
            inner.state = State::Running;
            inner.parent.is_some()
        };
        if has_parent {
            self.append(|co| {
                co.detach();
                Ok(())
            });
        }
    }

    /// Terminal stop. No pending cleanup steps are run.
    pub fn stop(&self) {
        self.inner.borrow_mut().state = State::Stopped;
    }

    /// Return to [`State::Created`] at pc 0, keeping the compiled program.
    ///
    /// The yield slot, the loop target stacks and any recorded fault are
    /// cleared, so re-running reproduces the original sequence.
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.pc = 0;
        inner.state = State::Created;
        inner.yield_slot = None;
        inner.loop_starts.clear();
        inner.loop_ends.clear();
        inner.fault = None;
    }

    // ───────────────────────────────────────────────────────────────────
    // Yield
    // ───────────────────────────────────────────────────────────────────

    /// Suspend execution, publishing `value` for the caller.
    ///
    /// The step calling this keeps running to its end; the engine observes
    /// the suspension afterwards and reports "no further progress".
    pub fn yield_value(&self, value: V) {
        let mut inner = self.inner.borrow_mut();
        inner.yield_slot = Some(value);
        inner.state = State::Suspended;
    }

    /// Consume the pending yield value of the deepest live link.
    ///
    /// Returns `None` when nothing is pending; a second call without an
    /// intervening yield returns `None`.
    pub fn take_yield_value(&self) -> Option<V> {
        self.active().inner.borrow_mut().yield_slot.take()
    }

    /// True when the deepest live link is parked at a yield point.
    pub fn is_yielding(&self) -> bool {
        self.active().inner.borrow().state == State::Suspended
    }

    // ───────────────────────────────────────────────────────────────────
    // Execution engine
    // ───────────────────────────────────────────────────────────────────

    /// True when the deepest live link can make no more progress.
    pub fn is_stopped(&self) -> bool {
        self.active().current_is_stopped()
    }

    /// Whether *this link* is finished, ignoring the chain.
    ///
    /// End-of-program only counts once a pending yield has been consumed,
    /// so a value published by the final step is never lost.
    fn current_is_stopped(&self) -> bool {
        let inner = self.inner.borrow();
        match inner.state {
            State::Stopped => true,
            State::Suspended => inner.pc >= inner.program.len() && inner.yield_slot.is_none(),
            State::Created | State::Running => inner.pc >= inner.program.len(),
        }
    }

    /// Advance the deepest live link by one step.
    ///
    /// Returns `Ok(true)` when the engine can keep going, `Ok(false)` when
    /// the coroutine suspended or is stopped, and `Err` when a directly
    /// appended step failed (the coroutine is stopped and the fault
    /// recorded first). Drive to the next yield with
    /// `while coroutine.exec()? {}`.
    pub fn exec(&self) -> Result<bool, CoroError> {
        self.active().exec_current()
    }

    fn exec_current(&self) -> Result<bool, CoroError> {
        let (step, executed_pc) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == State::Suspended {
                // Resumption; the yield slot was consumed by the caller.
                inner.state = State::Running;
            }
            if inner.state == State::Stopped || inner.pc >= inner.program.len() {
                return Ok(false);
            }
            let pc = inner.pc;
            let step = inner.program.step_at(pc);
            // Increment before invoking: a jump inside the step wins.
            inner.pc += 1;
            (step, pc)
        };
        let Some(step) = step else {
            return Ok(false);
        };

        let outcome = step(self);

        let mut inner = self.inner.borrow_mut();
        if let Err(source) = outcome {
            let fault = CoroError::StepFault {
                coroutine: inner.display_name(),
                pc: executed_pc,
                message: source.to_string(),
            };
            inner.state = State::Stopped;
            inner.fault = Some(fault.clone());
            return Err(fault);
        }
        if inner.pc >= inner.program.len() && inner.state != State::Suspended {
            inner.state = State::Stopped;
        }
        Ok(inner.state != State::Suspended)
    }

    // ───────────────────────────────────────────────────────────────────
    // Faults
    // ───────────────────────────────────────────────────────────────────

    /// The recorded stop reason, if any step or body in the chain failed.
    pub fn fault(&self) -> Option<CoroError> {
        let mut current = self.clone();
        let mut found = current.inner.borrow().fault.clone();
        loop {
            let child = current.inner.borrow().next.clone();
            match child {
                Some(c) => {
                    if let Some(f) = c.inner.borrow().fault.clone() {
                        found = Some(f);
                    }
                    current = c;
                }
                None => return found,
            }
        }
    }

    /// Record `fault` as the stop reason and stop this link.
    pub(crate) fn fault_stop(&self, fault: CoroError) {
        let mut inner = self.inner.borrow_mut();
        inner.fault = Some(fault);
        inner.state = State::Stopped;
    }

    pub(crate) fn display_name(&self) -> String {
        self.inner.borrow().display_name()
    }

    // ───────────────────────────────────────────────────────────────────
    // Loop target stacks (used by the control-flow builders)
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn push_loop_targets(&self, start: usize, end: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.loop_starts.push(start);
        inner.loop_ends.push(end);
    }

    pub(crate) fn pop_loop_targets(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.loop_starts.pop();
        inner.loop_ends.pop();
    }

    pub(crate) fn loop_start_target(&self) -> Option<usize> {
        self.inner.borrow().loop_starts.last().copied()
    }

    pub(crate) fn loop_end_target(&self) -> Option<usize> {
        self.inner.borrow().loop_ends.last().copied()
    }
}

impl<V: Clone + 'static> Coroutine<V> {
    /// Fetch a clone of a named value stored with [`Coroutine::set_value`].
    pub fn get_value(&self, name: &str) -> Option<V> {
        self.inner.borrow().globals.get(name).cloned()
    }
}

impl<V: 'static> Default for Coroutine<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Display for Coroutine<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.borrow().display_name())
    }
}

// Inner holds `dyn Fn` steps, so Debug is written out by hand.
impl<V: 'static> fmt::Debug for Coroutine<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Coroutine")
            .field("id", &inner.id)
            .field("name", &inner.name)
            .field("state", &inner.state)
            .field("pc", &inner.pc)
            .field("len", &inner.program.len())
            .finish()
    }
}
