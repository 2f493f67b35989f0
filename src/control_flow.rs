//! Control-flow compiler: structured loops and branches over raw jumps.
//!
//! The builders here *emit steps at the time they are invoked* — calling
//! [`Coroutine::for_loop`] compiles the loop skeleton into the program
//! immediately, ahead of execution; only the body closure runs later, once
//! per iteration. Forward jump targets that are unknown while emitting
//! (the loop end, the else/end of a branch) are carried in shared
//! [`Var`] cells and filled in as soon as the marker instruction exists.
//!
//! Loop bodies and branch bodies are fault barriers: a body returning
//! `Err` records the fault on the executing coroutine and stops it, and
//! the error never escapes [`Coroutine::exec`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::coroutine::Coroutine;
use crate::error::CoroError;
use crate::program::StepResult;
use crate::var::Var;

type Body<V> = Rc<dyn Fn(&Coroutine<V>) -> StepResult>;

/// Run a loop body with the break/continue targets in scope, swallowing
/// body faults into a recorded stop.
fn invoke_body<V: 'static>(
    co: &Coroutine<V>,
    body: &RefCell<Option<Body<V>>>,
    continue_to: usize,
    break_to: usize,
) -> StepResult {
    // Clone the body handle out so the closure may itself append or graft.
    let body = body.borrow().clone();
    let Some(body) = body else {
        return Ok(());
    };
    co.push_loop_targets(continue_to, break_to);
    let outcome = body(co);
    co.pop_loop_targets();
    swallow_fault(co, outcome);
    Ok(())
}

/// Record a body fault as the coroutine's stop reason.
fn swallow_fault<V: 'static>(co: &Coroutine<V>, outcome: StepResult) {
    if let Err(source) = outcome {
        co.fault_stop(CoroError::BodyFault {
            coroutine: co.display_name(),
            message: source.to_string(),
        });
    }
}

/// A compiled loop waiting for its body.
///
/// The skeleton (condition, step, jumps, end marker) is already in the
/// program; [`LoopBlock::run`] fills in the body slot. A loop whose body
/// is never supplied runs with an empty body.
#[must_use = "call .run(body) to attach the loop body"]
pub struct LoopBlock<V> {
    body: Rc<RefCell<Option<Body<V>>>>,
    head: usize,
}

impl<V: 'static> LoopBlock<V> {
    /// Attach the loop body.
    pub fn run(self, body: impl Fn(&Coroutine<V>) -> StepResult + 'static) {
        *self.body.borrow_mut() = Some(Rc::new(body));
    }

    /// Index of the loop's condition check, the back-jump target.
    pub fn head(&self) -> usize {
        self.head
    }
}

/// A compiled foreach loop waiting for its body; the body receives each
/// item by value.
#[must_use = "call .run(body) to attach the loop body"]
pub struct ForEachBlock<V, T> {
    #[allow(clippy::type_complexity)]
    body: Rc<RefCell<Option<Rc<dyn Fn(&Coroutine<V>, T) -> StepResult>>>>,
    head: usize,
}

impl<V: 'static, T: 'static> ForEachBlock<V, T> {
    /// Attach the loop body.
    pub fn run(self, body: impl Fn(&Coroutine<V>, T) -> StepResult + 'static) {
        *self.body.borrow_mut() = Some(Rc::new(body));
    }

    /// Index of the loop's exhaustion check, the back-jump target.
    pub fn head(&self) -> usize {
        self.head
    }
}

/// A branch builder produced by [`Coroutine::if_block`].
#[must_use = "call .then(..) or .run(..) to emit the branch"]
pub struct IfBlock<V> {
    co: Coroutine<V>,
    cond: Rc<dyn Fn() -> bool>,
}

/// A branch with its then-arm emitted, awaiting `else_`/`end`.
///
/// Dropping the value closes the branch without an else arm, so
/// `co.if_block(c).then(body);` is complete on its own.
#[must_use = "finish with .else_(..) or .end(), or let the drop close the branch"]
pub struct IfChain<V: 'static> {
    co: Coroutine<V>,
    else_at: Var<Option<usize>>,
    end_at: Var<Option<usize>>,
    closed: bool,
}

impl<V: 'static> IfBlock<V> {
    /// Emit the condition check and the then-arm.
    pub fn then(self, body: impl Fn(&Coroutine<V>) -> StepResult + 'static) -> IfChain<V> {
        let else_at: Var<Option<usize>> = Var::new(None);
        let end_at: Var<Option<usize>> = Var::new(None);

        {
            let cond = Rc::clone(&self.cond);
            let else_at = else_at.clone();
            let end_at = end_at.clone();
            self.co.append(move |co| {
                if !cond() {
                    // Jump to the else arm when there is one, else past the end.
                    if let Some(target) = else_at.get() {
                        co.jump(target);
                    } else if let Some(target) = end_at.get() {
                        co.jump(target);
                    }
                }
                Ok(())
            });
        }
        self.co.append(move |co| {
            swallow_fault(co, body(co));
            Ok(())
        });
        {
            let end_at = end_at.clone();
            self.co.append(move |co| {
                if let Some(target) = end_at.get() {
                    co.jump(target);
                }
                Ok(())
            });
        }

        IfChain {
            co: self.co,
            else_at,
            end_at,
            closed: false,
        }
    }

    /// Emit a then-only branch in one call.
    pub fn run(self, body: impl Fn(&Coroutine<V>) -> StepResult + 'static) {
        self.then(body).end();
    }
}

impl<V: 'static> IfChain<V> {
    /// Emit the else-arm and close the branch.
    pub fn else_(mut self, body: impl Fn(&Coroutine<V>) -> StepResult + 'static) {
        let else_idx = self.co.append(move |co| {
            swallow_fault(co, body(co));
            Ok(())
        });
        self.else_at.set(Some(else_idx));
        let end_idx = self.co.append(|_| Ok(()));
        self.end_at.set(Some(end_idx));
        self.closed = true;
    }

    /// Close the branch without an else arm.
    pub fn end(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let end_idx = self.co.append(|_| Ok(()));
            self.end_at.set(Some(end_idx));
        }
    }
}

impl<V: 'static> Drop for IfChain<V> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<V: 'static> Coroutine<V> {
    /// Compile a `for` loop: `init`; check `cond`; body; `step`; repeat.
    ///
    /// `do_break` inside the body leaves the loop; `do_continue` jumps to
    /// the `step` instruction, so the loop variable still advances.
    ///
    /// ```
    /// use corokit::{Coroutine, Var};
    ///
    /// let co = Coroutine::new();
    /// let i = Var::new(0);
    /// let (ci, si, bi) = (i.clone(), i.clone(), i.clone());
    /// co.for_loop(
    ///     move |_| Ok(ci.set(0)),
    ///     { let i = i.clone(); move || i.get() < 3 },
    ///     move |_| Ok(si.update(|v| *v += 1)),
    /// )
    /// .run(move |co| Ok(co.yield_value(bi.get())));
    /// co.start();
    /// assert_eq!(co.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    /// ```
    pub fn for_loop(
        &self,
        init: impl Fn(&Coroutine<V>) -> StepResult + 'static,
        cond: impl Fn() -> bool + 'static,
        step: impl Fn(&Coroutine<V>) -> StepResult + 'static,
    ) -> LoopBlock<V> {
        let end_at = Var::new(0usize);
        let continue_at = Var::new(0usize);
        let body: Rc<RefCell<Option<Body<V>>>> = Rc::new(RefCell::new(None));

        self.append(init);
        let head = {
            let end_at = end_at.clone();
            self.append(move |co| {
                if !cond() {
                    co.jump(end_at.get());
                }
                Ok(())
            })
        };
        {
            let body = Rc::clone(&body);
            let continue_at = continue_at.clone();
            let end_at = end_at.clone();
            self.append(move |co| invoke_body(co, &body, continue_at.get(), end_at.get()));
        }
        let step_idx = self.append(step);
        continue_at.set(step_idx);
        self.append(move |co| {
            co.jump(head);
            Ok(())
        });
        let end_idx = self.append(|_| Ok(()));
        end_at.set(end_idx);

        LoopBlock { body, head }
    }

    /// Compile a `while` loop: check `cond`; body; repeat.
    ///
    /// `do_continue` jumps back to the condition check.
    pub fn while_loop(&self, cond: impl Fn() -> bool + 'static) -> LoopBlock<V> {
        let end_at = Var::new(0usize);
        let body: Rc<RefCell<Option<Body<V>>>> = Rc::new(RefCell::new(None));

        let head = {
            let end_at = end_at.clone();
            self.append(move |co| {
                if !cond() {
                    co.jump(end_at.get());
                }
                Ok(())
            })
        };
        {
            let body = Rc::clone(&body);
            let end_at = end_at.clone();
            self.append(move |co| invoke_body(co, &body, head, end_at.get()));
        }
        self.append(move |co| {
            co.jump(head);
            Ok(())
        });
        let end_idx = self.append(|_| Ok(()));
        end_at.set(end_idx);

        LoopBlock { body, head }
    }

    /// Compile a loop over `items`, handing each item to the body.
    ///
    /// The source is drained lazily, one item per iteration, so it may be
    /// unbounded. `do_continue` jumps back to the exhaustion check.
    pub fn for_each<I>(&self, items: I) -> ForEachBlock<V, I::Item>
    where
        I: IntoIterator + 'static,
        I::IntoIter: 'static,
        I::Item: 'static,
    {
        let source = Rc::new(RefCell::new(items.into_iter().peekable()));
        let end_at = Var::new(0usize);
        #[allow(clippy::type_complexity)]
        let body: Rc<RefCell<Option<Rc<dyn Fn(&Coroutine<V>, I::Item) -> StepResult>>>> =
            Rc::new(RefCell::new(None));

        let head = {
            let source = Rc::clone(&source);
            let end_at = end_at.clone();
            self.append(move |co| {
                if source.borrow_mut().peek().is_none() {
                    co.jump(end_at.get());
                }
                Ok(())
            })
        };
        {
            let source = Rc::clone(&source);
            let body = Rc::clone(&body);
            let end_at = end_at.clone();
            self.append(move |co| {
                let Some(item) = source.borrow_mut().next() else {
                    co.jump(end_at.get());
                    return Ok(());
                };
                let handler = body.borrow().clone();
                let Some(handler) = handler else {
                    return Ok(());
                };
                co.push_loop_targets(head, end_at.get());
                let outcome = handler(co, item);
                co.pop_loop_targets();
                swallow_fault(co, outcome);
                Ok(())
            });
        }
        self.append(move |co| {
            co.jump(head);
            Ok(())
        });
        let end_idx = self.append(|_| Ok(()));
        end_at.set(end_idx);

        ForEachBlock { body, head }
    }

    /// Start compiling an if/else branch.
    ///
    /// Exactly one arm executes. Instructions are emitted by
    /// [`IfBlock::then`]/[`IfBlock::run`]; the branch is closed by
    /// [`IfChain::else_`], [`IfChain::end`] or the chain's drop.
    pub fn if_block(&self, cond: impl Fn() -> bool + 'static) -> IfBlock<V> {
        IfBlock {
            co: self.clone(),
            cond: Rc::new(cond),
        }
    }

    /// Jump to the end of the nearest enclosing loop.
    ///
    /// Outside any loop body this is a no-op.
    pub fn do_break(&self) {
        if let Some(target) = self.loop_end_target() {
            self.jump(target);
        }
    }

    /// Jump to the advance point of the nearest enclosing loop (the step
    /// of a `for`, the condition of a `while`, the exhaustion check of a
    /// foreach).
    ///
    /// Outside any loop body this is a no-op.
    pub fn do_continue(&self) {
        if let Some(target) = self.loop_start_target() {
            self.jump(target);
        }
    }
}
