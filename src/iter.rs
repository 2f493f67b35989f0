//! Pull-iterator bridge over the step/yield engine.
//!
//! [`CoroIter`] adapts a coroutine to a standard [`Iterator`]: each pull
//! drives the engine until a value is yielded or the program stops. The
//! sequence is forward-only and single-pass, and may be infinite; `take`
//! on an endless program still terminates.

use crate::coroutine::Coroutine;

/// Lazy pull-based view of a coroutine's yielded values.
///
/// After every [`next`](Iterator::next) the coroutine is left either at a
/// fresh pending yield or fully stopped, so `has_next` is a cheap state
/// query once the first drain has happened. A step failure ends the
/// sequence early; the typed fault stays readable through
/// [`Coroutine::fault`].
pub struct CoroIter<V> {
    co: Coroutine<V>,
    primed: bool,
}

impl<V: 'static> CoroIter<V> {
    pub(crate) fn new(co: Coroutine<V>) -> Self {
        CoroIter { co, primed: false }
    }

    /// Drive the engine until it yields, stops or faults.
    fn drain(&self) {
        while matches!(self.co.exec(), Ok(true)) {}
    }

    /// True when another value can be produced.
    ///
    /// The first call drives the coroutine forward to find out; later
    /// calls only inspect state.
    pub fn has_next(&mut self) -> bool {
        if !self.primed {
            if !self.co.is_yielding() {
                self.drain();
            }
            self.primed = true;
        }
        !self.co.is_stopped()
    }

    /// The coroutine this iterator is pulling from.
    pub fn coroutine(&self) -> &Coroutine<V> {
        &self.co
    }
}

impl<V: 'static> Iterator for CoroIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        if !self.co.is_yielding() {
            self.drain();
        }
        let value = self.co.take_yield_value();
        // Eagerly run ahead to the next yield or the end, so has_next
        // afterwards is a pure state query.
        self.drain();
        self.primed = true;
        value
    }
}

impl<V: 'static> Coroutine<V> {
    /// View the coroutine as a pull iterator over its yielded values.
    ///
    /// The iterator holds a handle to the same coroutine, so driving it
    /// advances this coroutine; two iterators over one coroutine would
    /// steal values from each other.
    pub fn iter(&self) -> CoroIter<V> {
        CoroIter::new(self.clone())
    }
}

impl<V: 'static> IntoIterator for Coroutine<V> {
    type Item = V;
    type IntoIter = CoroIter<V>;

    fn into_iter(self) -> CoroIter<V> {
        CoroIter::new(self)
    }
}

impl<V: 'static> IntoIterator for &Coroutine<V> {
    type Item = V;
    type IntoIter = CoroIter<V>;

    fn into_iter(self) -> CoroIter<V> {
        self.iter()
    }
}
