//! Vector clocks for happens-before tracking.

use std::fmt::{Display, Formatter};

/// A vector clock indexed by process index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionVec {
    clocks: Vec<u32>,
}

impl VersionVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> u32 {
        self.clocks.get(index).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, index: usize) {
        if index >= self.clocks.len() {
            self.clocks.resize(index + 1, 0);
        }
        self.clocks[index] += 1;
    }

    /// Point-wise maximum: `self = max(self, other)`.
    pub fn join(&mut self, other: &VersionVec) {
        if other.clocks.len() > self.clocks.len() {
            self.clocks.resize(other.clocks.len(), 0);
        }
        for (a, b) in self.clocks.iter_mut().zip(other.clocks.iter()) {
            *a = (*a).max(*b);
        }
    }
}

impl Display for VersionVec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.clocks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment() {
        let mut vv = VersionVec::new();
        vv.increment(1);
        assert_eq!(vv.get(1), 1);
        vv.increment(1);
        assert_eq!(vv.get(1), 2);
        assert_eq!(vv.get(0), 0);
        assert_eq!(vv.get(9), 0);
    }

    #[test]
    fn test_join() {
        let mut a = VersionVec::new();
        a.increment(0);
        a.increment(0);
        let mut b = VersionVec::new();
        b.increment(2);
        a.join(&b);
        assert_eq!(a.get(0), 2);
        assert_eq!(a.get(1), 0);
        assert_eq!(a.get(2), 1);
        assert_eq!(a.to_string(), "[2, 0, 1]");
    }
}
