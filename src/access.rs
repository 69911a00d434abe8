//! Schedulable processes and the shared-state accesses they perform.

use std::fmt::{Display, Formatter};

/// Address of a shared memory cell.
pub type ObjectId = u64;

/// A schedulable process.
///
/// Under TSO every thread `t` has a companion process `Flush(t)` that commits
/// the oldest entry of its store buffer to memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Proc {
    Thread(usize),
    Flush(usize),
}

impl Proc {
    /// Dense index, used to address vector clocks.
    pub const fn index(self) -> usize {
        match self {
            Proc::Thread(t) => 2 * t,
            Proc::Flush(t) => 2 * t + 1,
        }
    }

    /// The thread this process belongs to.
    pub const fn thread(self) -> usize {
        match self {
            Proc::Thread(t) | Proc::Flush(t) => t,
        }
    }
}

impl Display for Proc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Proc::Thread(t) => write!(f, "T{}", t),
            Proc::Flush(t) => write!(f, "T{}.buf", t),
        }
    }
}

/// The next visible operation of a process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Access {
    Read(ObjectId),
    Write(ObjectId),
    Lock(ObjectId),
    Unlock(ObjectId),
    /// Create the given thread.
    Spawn(usize),
    /// Wait for the given thread.
    Join(usize),
    Fence,
    /// Append a store to the own store buffer.
    Enqueue(ObjectId),
}

impl Access {
    /// The memory cell this access touches, if any.
    pub fn object(self) -> Option<ObjectId> {
        match self {
            Access::Read(x) | Access::Write(x) | Access::Lock(x) | Access::Unlock(x) => Some(x),
            _ => None,
        }
    }

    fn is_read(self) -> bool {
        matches!(self, Access::Read(_))
    }

    /// Accesses of a thread that require its store buffer to be drained.
    pub fn drains_buffer(self) -> bool {
        matches!(
            self,
            Access::Fence | Access::Spawn(_) | Access::Lock(_) | Access::Unlock(_)
        )
    }
}

/// Whether two operations do not commute.
///
/// Dependent operations are ordered by happens-before, and executing one of them
/// wakes the other up from a sleep set.
pub fn dependent(p: Proc, a: Access, q: Proc, b: Access) -> bool {
    if p == q {
        return true;
    }
    if let (Some(x), Some(y)) = (a.object(), b.object()) {
        if x == y && !(a.is_read() && b.is_read()) {
            return true;
        }
    }
    related(p, a, q) || related(q, b, p)
}

/// Dependence induced by thread structure rather than by memory.
fn related(p: Proc, a: Access, q: Proc) -> bool {
    let structural = match a {
        Access::Spawn(c) | Access::Join(c) => q.thread() == c,
        _ => false,
    };
    let own_buffer = matches!((p, q), (Proc::Thread(t), Proc::Flush(u)) if t == u)
        && (a.drains_buffer() || matches!(a, Access::Enqueue(_)));
    structural || own_buffer
}

/// Whether two operations of different processes are dependent *and* may be
/// enabled at the same time, so that executing them in the other order is a
/// distinct behaviour worth exploring.
pub fn races(p: Proc, a: Access, q: Proc, b: Access) -> bool {
    if p == q {
        return false;
    }
    match (a, b) {
        (Access::Lock(_) | Access::Unlock(_), Access::Unlock(_))
        | (Access::Unlock(_), Access::Lock(_)) => false,
        _ => match (a.object(), b.object()) {
            (Some(x), Some(y)) => x == y && !(a.is_read() && b.is_read()),
            _ => false,
        },
    }
}

impl Display for Access {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read(x) => write!(f, "read #{}", x),
            Access::Write(x) => write!(f, "write #{}", x),
            Access::Lock(x) => write!(f, "lock #{}", x),
            Access::Unlock(x) => write!(f, "unlock #{}", x),
            Access::Spawn(t) => write!(f, "spawn T{}", t),
            Access::Join(t) => write!(f, "join T{}", t),
            Access::Fence => write!(f, "fence"),
            Access::Enqueue(x) => write!(f, "buffer #{}", x),
        }
    }
}
