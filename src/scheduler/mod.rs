//! # Schedulers
//!
//! A [`Scheduler`] decides, at every scheduling point of an execution, which
//! process runs next, and between executions whether another interleaving
//! remains to be explored.
//!
//! The life cycle of a scheduler is:
//!
//! ```text
//!             schedule()*            end_execution()
//! Exploring ---------------> Exploring -------------> ReadyForNext
//!     ^                                                   |
//!     +------------------- advance() == true -------------+
//!                                                         |
//!                    Exhausted <--- advance() == false ---+
//! ```
//!
//! Once `Exhausted`, a scheduler stays exhausted: [`Scheduler::advance`]
//! returns `false` and [`Scheduler::schedule`] refuses to choose.

use std::fmt::{Display, Formatter};

use crate::access::{Access, Proc};

mod dpor;
mod path;

pub use dpor::DporScheduler;
pub use path::{Branch, Path};

/// An enabled process together with the operation it will perform when chosen.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Candidate {
    pub proc: Proc,
    pub access: Access,
}

impl Candidate {
    pub const fn new(proc: Proc, access: Access) -> Self {
        Self { proc, access }
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.proc, self.access)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SchedulerState {
    /// A schedule is bound and being executed.
    Exploring,
    /// The last execution finished.
    ReadyForNext,
    /// No backtrack points remain.
    Exhausted,
}

/// Chooses the interleavings explored by the driver.
///
/// The driver calls [`schedule`](Scheduler::schedule) through the engine during
/// an execution, and the remaining methods between executions.
pub trait Scheduler {
    /// Choose the next process among the enabled `candidates`.
    ///
    /// Returns `None` when the execution must stop here without an error:
    /// every candidate is asleep, or the search depth bound is reached.
    fn schedule(&mut self, candidates: &[Candidate]) -> Option<Proc>;

    /// Report that the current execution stopped at an error, before the
    /// processes still enabled got to run.
    ///
    /// Called before [`end_execution`](Scheduler::end_execution).
    fn execution_failed(&mut self) {}

    /// Mark the current execution as finished.
    fn end_execution(&mut self) {}

    /// Whether the last execution was known in advance to be subsumed by
    /// an already explored one (it was blocked by the sleep set).
    fn was_redundant(&self) -> bool;

    /// Bind the next unexplored interleaving. Returns `false` when exhausted.
    fn advance(&mut self) -> bool;

    fn state(&self) -> SchedulerState;
}

impl<S: Scheduler + ?Sized> Scheduler for &mut S {
    fn schedule(&mut self, candidates: &[Candidate]) -> Option<Proc> {
        (**self).schedule(candidates)
    }
    fn execution_failed(&mut self) {
        (**self).execution_failed()
    }
    fn end_execution(&mut self) {
        (**self).end_execution()
    }
    fn was_redundant(&self) -> bool {
        (**self).was_redundant()
    }
    fn advance(&mut self) -> bool {
        (**self).advance()
    }
    fn state(&self) -> SchedulerState {
        (**self).state()
    }
}
