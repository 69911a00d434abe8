//! Dynamic partial-order reduction with sleep sets.
//!
//! Happens-before is tracked with vector clocks over the operations of the current
//! execution. Whenever an operation races with an earlier one that does not happen
//! before it, the racing process is added as a backtrack point at the scheduling
//! point of the earlier operation. An execution stopped by an error cannot reveal
//! the races of the operations it never reached, so every enabled process becomes
//! a backtrack point along its whole path.
//!
//! Sleep sets prune re-exploration of processes whose subtrees are known to be
//! covered; an execution in which every enabled process is asleep is cut short and
//! reported as redundant.

use std::collections::{HashMap, VecDeque};

use log::{debug, trace, warn};

use crate::access::{dependent, races, Access, Proc};
use crate::scheduler::{Branch, Candidate, Path, Scheduler, SchedulerState};
use crate::vv::VersionVec;

/// An operation of the current execution.
#[derive(Debug, Clone)]
struct Event {
    /// Index of the branch at which the operation was scheduled.
    branch: usize,
    proc: Proc,
    access: Access,
    clock: VersionVec,
}

impl Event {
    fn happens_before(&self, clock: &VersionVec) -> bool {
        let i = self.proc.index();
        self.clock.get(i) <= clock.get(i)
    }
}

/// Scheduler exploring one execution per class of equivalent interleavings.
///
/// Executions are explored depth-first. Races found in an execution add
/// backtrack points to its [`Path`]; sleep sets block executions already
/// covered by an explored sibling.
pub struct DporScheduler {
    path: Path,
    clocks: HashMap<Proc, VersionVec>,
    /// Clocks of the stores waiting in each thread's store buffer.
    buffered: HashMap<usize, VecDeque<VersionVec>>,
    events: Vec<Event>,
    last: Option<Proc>,
    blocked: bool,
    bounded: bool,
    state: SchedulerState,
    max_depth: Option<usize>,
    executions: u64,
}

impl Default for DporScheduler {
    fn default() -> Self {
        DporScheduler::new(None)
    }
}

impl DporScheduler {
    /// Create a scheduler; `max_depth` bounds the number of scheduling points per execution.
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            path: Path::new(),
            clocks: HashMap::new(),
            buffered: HashMap::new(),
            events: Vec::new(),
            last: None,
            blocked: false,
            bounded: false,
            state: SchedulerState::Exploring,
            max_depth,
            executions: 0,
        }
    }

    /// Whether the last execution was cut off by the depth bound.
    pub fn was_bounded(&self) -> bool {
        self.bounded
    }

    /// Scheduling decisions of the current execution.
    pub fn current_schedule(&self) -> Vec<Proc> {
        (0..self.path.current_position())
            .map(|i| self.path.branch(i).chosen)
            .collect()
    }

    fn choose(&mut self, candidates: &[Candidate]) -> Option<Proc> {
        if let Some(proc) = self.path.replay() {
            if candidates.iter().any(|c| c.proc == proc) {
                return Some(proc);
            }
            warn!(
                "replay diverged at {}: {} is not enabled",
                self.path.current_position(),
                proc
            );
            return None;
        }

        let sleep = self.path.next_sleep();
        let awake: Vec<Proc> = candidates
            .iter()
            .map(|c| c.proc)
            .filter(|&p| !sleep.iter().any(|s| s.proc == p))
            .collect();
        let Some(&first) = awake.iter().min() else {
            debug!(
                "execution blocked by sleep set at {} ({} asleep)",
                self.path.current_position(),
                sleep.len()
            );
            self.blocked = true;
            return None;
        };
        // Keep running the same thread to avoid needless preemptions.
        let proc = match self.last {
            Some(last @ Proc::Thread(_)) if awake.contains(&last) => last,
            _ => first,
        };
        self.path.push(Branch::new(candidates.to_vec(), sleep, proc));
        Some(proc)
    }

    /// Add backtrack points for the earlier operations racing with `access` of `proc`.
    fn detect_races(&mut self, proc: Proc, access: Access) {
        let clock = self.clocks.get(&proc).cloned().unwrap_or_default();
        let racing: Vec<usize> = self
            .events
            .iter()
            .filter(|e| races(e.proc, e.access, proc, access) && !e.happens_before(&clock))
            .map(|e| e.branch)
            .collect();
        for b in racing {
            self.path.backtrack(b, proc);
        }
    }

    /// Detect races of the chosen operation and advance the clocks.
    fn record(&mut self, branch: usize, proc: Proc, access: Access) {
        self.detect_races(proc, access);
        let mut clock = self.clocks.get(&proc).cloned().unwrap_or_default();

        for e in &self.events {
            // A flush is ordered after its own store only, see below.
            if matches!((e.access, proc), (Access::Enqueue(_), Proc::Flush(_))) {
                continue;
            }
            if dependent(e.proc, e.access, proc, access) {
                clock.join(&e.clock);
            }
        }
        if let Proc::Flush(t) = proc {
            if let Some(c) = self.buffered.get_mut(&t).and_then(VecDeque::pop_front) {
                clock.join(&c);
            }
        }
        clock.increment(proc.index());

        match (proc, access) {
            (Proc::Thread(t), Access::Enqueue(_)) => {
                self.buffered.entry(t).or_default().push_back(clock.clone());
            }
            (_, Access::Spawn(child)) => {
                self.clocks.insert(Proc::Thread(child), clock.clone());
                self.clocks.insert(Proc::Flush(child), clock.clone());
            }
            _ => {}
        }

        self.clocks.insert(proc, clock.clone());
        self.events.push(Event {
            branch,
            proc,
            access,
            clock,
        });
    }

    fn reset_execution(&mut self) {
        self.clocks.clear();
        self.buffered.clear();
        self.events.clear();
        self.last = None;
        self.blocked = false;
        self.bounded = false;
    }
}

impl Scheduler for DporScheduler {
    fn schedule(&mut self, candidates: &[Candidate]) -> Option<Proc> {
        if self.state == SchedulerState::Exhausted || candidates.is_empty() {
            return None;
        }
        let pos = self.path.current_position();
        if let Some(max) = self.max_depth {
            if pos >= max {
                if !self.bounded {
                    debug!("execution reached the depth bound {}", max);
                }
                self.bounded = true;
                return None;
            }
        }

        let proc = self.choose(candidates)?;
        let access = candidates.iter().find(|c| c.proc == proc)?.access;
        trace!("schedule {}: {} ({})", pos, proc, access);
        self.path.forward();
        self.record(pos, proc, access);
        self.last = Some(proc);
        Some(proc)
    }

    fn execution_failed(&mut self) {
        let depth = self.path.current_position();
        debug!("execution failed after {} scheduling points", depth);
        for index in 0..depth {
            self.path.backtrack_all(index);
        }
    }

    fn end_execution(&mut self) {
        if self.state == SchedulerState::Exploring {
            self.state = SchedulerState::ReadyForNext;
        }
    }

    fn was_redundant(&self) -> bool {
        self.blocked
    }

    fn advance(&mut self) -> bool {
        if self.state == SchedulerState::Exhausted {
            return false;
        }
        self.executions += 1;
        if self.path.step() {
            self.reset_execution();
            self.state = SchedulerState::Exploring;
            true
        } else {
            debug!("exploration exhausted after {} executions", self.executions);
            self.state = SchedulerState::Exhausted;
            false
        }
    }

    fn state(&self) -> SchedulerState {
        self.state
    }
}
