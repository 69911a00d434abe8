//! Exploration tree for DPOR.
//!
//! The tree is kept as the single path of the current execution: one [`Branch`]
//! per scheduling point. Alternatives that still have to be explored are recorded
//! as backtrack points on the branches, and [`Path::step`] moves depth-first to
//! the deepest branch that has one.

use std::collections::BTreeSet;

use log::debug;

use crate::access::{dependent, Proc};
use crate::scheduler::Candidate;

/// A single scheduling point.
#[derive(Clone, Debug)]
pub struct Branch {
    /// Processes enabled at this point, with their next operation.
    pub candidates: Vec<Candidate>,
    /// Processes asleep on entry: running them here is known to be redundant.
    pub sleep: Vec<Candidate>,
    /// The process selected to run.
    pub chosen: Proc,
    /// Processes still to be tried here.
    pub backtrack: BTreeSet<Proc>,
    /// Processes whose subtrees have been explored.
    pub done: BTreeSet<Proc>,
}

impl Branch {
    pub fn new(candidates: Vec<Candidate>, sleep: Vec<Candidate>, chosen: Proc) -> Self {
        Self {
            candidates,
            sleep,
            chosen,
            backtrack: BTreeSet::new(),
            done: BTreeSet::new(),
        }
    }

    pub fn candidate(&self, proc: Proc) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.proc == proc)
    }

    pub fn is_enabled(&self, proc: Proc) -> bool {
        self.candidate(proc).is_some()
    }

    pub fn is_asleep(&self, proc: Proc) -> bool {
        self.sleep.iter().any(|c| c.proc == proc)
    }

    /// Whether `proc` is neither explored, pending, nor asleep here.
    fn is_fresh(&self, proc: Proc) -> bool {
        proc != self.chosen
            && !self.done.contains(&proc)
            && !self.backtrack.contains(&proc)
            && !self.is_asleep(proc)
    }

    /// Sleep set on entry to the next branch.
    ///
    /// Everything asleep here or already explored here stays asleep after the
    /// chosen operation, unless the chosen operation is dependent with it.
    pub fn sleep_after(&self) -> Vec<Candidate> {
        let Some(chosen) = self.candidate(self.chosen).copied() else {
            return Vec::new();
        };
        let explored = self
            .candidates
            .iter()
            .filter(|c| c.proc != self.chosen && self.done.contains(&c.proc));
        self.sleep
            .iter()
            .chain(explored)
            .filter(|c| !dependent(c.proc, c.access, chosen.proc, chosen.access))
            .copied()
            .collect()
    }
}

/// The exploration tree: manages DFS over scheduling decisions.
#[derive(Debug, Default)]
pub struct Path {
    branches: Vec<Branch>,
    /// Position during the current execution. Branches before `pos` have been
    /// replayed or created in this execution.
    pos: usize,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_position(&self) -> usize {
        self.pos
    }

    pub fn branch(&self, index: usize) -> &Branch {
        &self.branches[index]
    }

    /// The recorded choice at the current position, if replaying.
    pub fn replay(&self) -> Option<Proc> {
        self.branches.get(self.pos).map(|b| b.chosen)
    }

    /// Sleep set for a new branch at the current position.
    pub fn next_sleep(&self) -> Vec<Candidate> {
        match self.pos.checked_sub(1) {
            Some(prev) => self.branches[prev].sleep_after(),
            None => Vec::new(),
        }
    }

    /// Append a new branch at the current position.
    pub fn push(&mut self, branch: Branch) {
        debug_assert_eq!(self.pos, self.branches.len());
        self.branches.push(branch);
    }

    /// Move past the current branch.
    pub fn forward(&mut self) {
        self.pos += 1;
    }

    /// Request that `proc` is tried at branch `index`.
    ///
    /// If `proc` was not enabled there, or was asleep, every enabled process is
    /// requested instead.
    pub fn backtrack(&mut self, index: usize, proc: Proc) {
        let Some(branch) = self.branches.get_mut(index) else {
            return;
        };
        if !branch.is_enabled(proc) || branch.is_asleep(proc) {
            debug!("{} not runnable at {}", proc, index);
            self.backtrack_all(index);
        } else if branch.is_fresh(proc) {
            debug!("backtrack point at {}: {}", index, proc);
            branch.backtrack.insert(proc);
        }
    }

    /// Request that every process enabled at branch `index` is tried there.
    pub fn backtrack_all(&mut self, index: usize) {
        let Some(branch) = self.branches.get_mut(index) else {
            return;
        };
        let fresh: Vec<Proc> = branch
            .candidates
            .iter()
            .map(|c| c.proc)
            .filter(|&p| branch.is_fresh(p))
            .collect();
        for p in fresh {
            debug!("backtrack point at {}: {}", index, p);
            branch.backtrack.insert(p);
        }
    }

    /// Advance to the next unexplored execution path.
    ///
    /// Walks backward through branches, looking for a pending backtrack point.
    /// When found, truncates the path there, makes the backtrack process the
    /// chosen one and returns `true`. Returns `false` when all paths are exhausted.
    pub fn step(&mut self) -> bool {
        self.pos = 0;
        while let Some(index) = self.branches.len().checked_sub(1) {
            let branch = &mut self.branches[index];
            branch.done.insert(branch.chosen);
            while let Some(next) = branch.backtrack.pop_first() {
                if branch.done.contains(&next) || branch.is_asleep(next) {
                    continue;
                }
                debug!("step: branch {} switches {} -> {}", index, branch.chosen, next);
                branch.chosen = next;
                return true;
            }
            self.branches.pop();
        }
        false
    }
}
