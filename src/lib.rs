//! Cooperative coroutine and generator runtime built from explicit
//! instruction programs.
//!
//! A [`Coroutine`] owns a program of closure steps, an instruction
//! pointer, a label table and a single yield slot. Callers append steps
//! (directly, or through the structured [`for_loop`](Coroutine::for_loop)/
//! [`while_loop`](Coroutine::while_loop)/[`if_block`](Coroutine::if_block)
//! builders, which compile down to raw jumps), then drive the program
//! forward; a step may suspend mid-program while publishing a value, to be
//! resumed later. The whole thing doubles as a standard pull iterator.
//!
//! # Example
//!
//! An endless Fibonacci generator from a single self-jumping instruction:
//!
//! ```
//! use corokit::{Coroutine, Var};
//!
//! let fib = Coroutine::new();
//! let pair = Var::new((0u64, 1u64));
//! {
//!     let pair = pair.clone();
//!     fib.append(move |co| {
//!         let (a, b) = pair.get();
//!         co.yield_value(a);
//!         pair.set((b, a + b));
//!         co.jump(0);
//!         Ok(())
//!     });
//! }
//! fib.start();
//!
//! let first: Vec<u64> = fib.iter().take(8).collect();
//! assert_eq!(first, vec![0, 1, 1, 2, 3, 5, 8, 13]);
//! ```

pub mod control_flow;
pub mod coroutine;
pub mod error;
pub mod iter;
pub mod program;
pub mod var;

pub use control_flow::ForEachBlock;
pub use control_flow::IfBlock;
pub use control_flow::IfChain;
pub use control_flow::LoopBlock;
pub use coroutine::Coroutine;
pub use coroutine::State;
pub use error::CoroError;
pub use iter::CoroIter;
pub use program::Program;
pub use program::Step;
pub use program::StepResult;
pub use var::Var;
