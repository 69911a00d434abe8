//! # Exploration driver
//!
//! The [`Driver`] owns a program and a [`Configuration`] and explores the
//! interleavings of the program one execution at a time:
//!
//! 1. A [`Scheduler`] is created for the run.
//! 2. Every execution gets a fresh engine from the [`EngineFactory`], runs under
//!    [`Containment`], and is classified as explored or sleep-set blocked.
//! 3. The first erroneous trace is kept; exploration stops there unless
//!    [`explore_all_traces`](Configuration::explore_all_traces) is set.
//! 4. Otherwise the scheduler is advanced until it is exhausted.
//!
//! Every [`recycle_interval`](Configuration::recycle_interval) executions the
//! module is rebuilt from its source text. Rebuilding never changes which
//! schedules are explored.

use std::fmt::{Display, Formatter};
use std::path::Path;

use log::{debug, info, trace};

use crate::config::{Configuration, MemoryModel};
use crate::containment::Containment;
use crate::engine::{self, EngineFactory};
use crate::error::{Error, Result};
use crate::scheduler::{DporScheduler, Scheduler};
use crate::session::Session;
use crate::trace::Trace;

/// Outcome of a complete exploration.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ExplorationResult {
    /// Number of distinct interleavings explored.
    pub trace_count: usize,
    /// Number of executions already known to be redundant.
    pub sleepset_blocked_trace_count: usize,
    /// The first erroneous trace.
    pub error_trace: Option<Trace>,
    /// Every trace, when requested with `debug_collect_all_traces`.
    pub all_traces: Vec<Trace>,
}

impl ExplorationResult {
    pub fn has_errors(&self) -> bool {
        self.error_trace.is_some()
    }

    /// Number of single executions performed.
    pub fn execution_count(&self) -> usize {
        self.trace_count + self.sleepset_blocked_trace_count
    }
}

impl Display for ExplorationResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Traces explored: {}", self.trace_count)?;
        writeln!(f, "Sleep-set blocked: {}", self.sleepset_blocked_trace_count)?;
        match &self.error_trace {
            None => write!(f, "No errors found"),
            Some(trace) => {
                writeln!(f, "Error trace:")?;
                write!(f, "{}", trace)
            }
        }
    }
}

/// Explores all interleavings of one program.
pub struct Driver {
    config: Configuration,
    session: Session,
    factory: Option<Box<dyn EngineFactory>>,
}

impl Driver {
    /// Load the program from an assembly file.
    pub fn from_file(path: impl AsRef<Path>, config: Configuration) -> Result<Self> {
        Ok(Self::new(Session::from_file(path)?, config))
    }

    /// Load the program from assembly text.
    pub fn from_ir(text: impl Into<String>, config: Configuration) -> Result<Self> {
        Ok(Self::new(Session::from_text(text)?, config))
    }

    pub fn new(session: Session, config: Configuration) -> Self {
        Self {
            config,
            session,
            factory: None,
        }
    }

    /// Use the given engine factory instead of the one selected by the memory model.
    pub fn with_engine(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Rebuild the module from its source text.
    pub fn reparse(&mut self) -> Result<()> {
        self.session.replace()
    }

    /// Explore the program with the DPOR scheduler.
    pub fn run(&mut self) -> Result<ExplorationResult> {
        let scheduler = match self.config.memory_model {
            MemoryModel::SequentialConsistency | MemoryModel::TotalStoreOrder => {
                DporScheduler::new(self.config.max_search_depth)
            }
            model => return Err(Error::UnsupportedMemoryModel(model)),
        };
        self.run_with_scheduler(scheduler)
    }

    /// Explore the program, taking scheduling decisions from `scheduler`.
    pub fn run_with_scheduler<S: Scheduler>(&mut self, mut scheduler: S) -> Result<ExplorationResult> {
        let selected;
        let factory: &dyn EngineFactory = match self.factory.as_deref() {
            Some(factory) => factory,
            None => {
                selected = engine::for_model(self.config.memory_model)?;
                selected.as_ref()
            }
        };
        let config = &self.config;
        let session = &mut self.session;

        info!(
            "Exploring {} under {} (robustness: {}, all traces: {})",
            session.path().map_or_else(|| "<text>".to_string(), |p| p.display().to_string()),
            config.memory_model,
            config.check_robustness,
            config.explore_all_traces
        );

        let containment = Containment::install();
        let mut result = ExplorationResult::default();
        let mut iteration = 0usize;
        loop {
            if let Some(interval) = config.recycle_interval.filter(|&n| n > 0) {
                if (iteration + 1) % interval == 0 {
                    session.replace()?;
                    debug!("Recycled module at iteration {}", iteration);
                }
            }

            let trace = {
                let mut engine = factory.create(session.module(), &mut scheduler, config)?;
                let outcome = containment.contain(|| {
                    let mut errored = engine.run_to_completion();
                    if config.check_robustness && !errored {
                        errored = engine.check_robustness();
                    }
                    if errored || config.debug_collect_all_traces {
                        engine.extract_trace()
                    } else {
                        Trace::empty()
                    }
                });
                outcome.unwrap_or_else(Trace::from_error)
            };
            let errored = trace.has_errors();
            // A robustness violation is found after the execution completed.
            if trace.errors().iter().any(|e| !e.kind.is_robustness()) {
                scheduler.execution_failed();
            }
            scheduler.end_execution();

            let redundant = scheduler.was_redundant();
            if redundant {
                result.sleepset_blocked_trace_count += 1;
            } else {
                result.trace_count += 1;
            }
            trace!(
                "Execution {}: {}{}",
                iteration,
                if redundant { "sleep-set blocked" } else { "explored" },
                if errored { ", with errors" } else { "" }
            );

            if config.debug_collect_all_traces {
                result.all_traces.push(trace.clone());
            }
            if errored && result.error_trace.is_none() {
                debug!("First error found in execution {}", iteration);
                result.error_trace = Some(trace);
            }
            if errored && !config.explore_all_traces {
                debug!("Stopping at the first error");
                break;
            }
            if !scheduler.advance() {
                break;
            }
            iteration += 1;
        }
        drop(containment);

        info!(
            "Explored {} traces, {} sleep-set blocked{}",
            result.trace_count,
            result.sleepset_blocked_trace_count,
            if result.has_errors() { ", errors found" } else { "" }
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    const RACE: &str = "\
global x = 0
fn writer {
    store @x, 2
    ret
}
fn main {
    spawn %t, writer
    store @x, 1
    join %t
    ret
}
";

    #[test]
    fn test_run_counts() {
        crate::init();
        let mut driver = Driver::from_ir(RACE, Configuration::default()).unwrap();
        let result = driver.run().unwrap();
        assert_eq!(result.trace_count, 2);
        assert_eq!(result.execution_count(), 2);
        assert!(!result.has_errors());
        assert!(result.all_traces.is_empty());
    }

    #[test]
    fn test_collect_all_traces() {
        crate::init();
        let config = Configuration::default().with_debug_collect_all_traces(true);
        let mut driver = Driver::from_ir(RACE, config).unwrap();
        let result = driver.run().unwrap();
        assert_eq!(result.all_traces.len(), result.execution_count());
        assert!(result.all_traces.iter().all(|t| !t.is_empty()));
    }

    #[test]
    fn test_recycling() {
        crate::init();
        let config = Configuration::default().with_recycle_interval(Some(1));
        let mut driver = Driver::from_ir(RACE, config).unwrap();
        let result = driver.run().unwrap();
        assert_eq!(result.trace_count, 2);
        assert_eq!(driver.session().generation(), 2);
        driver.reparse().unwrap();
        assert_eq!(driver.session().generation(), 3);
    }

    #[test]
    fn test_display() {
        let result = ExplorationResult {
            trace_count: 3,
            sleepset_blocked_trace_count: 1,
            ..Default::default()
        };
        assert_eq!(
            result.to_string(),
            "Traces explored: 3\nSleep-set blocked: 1\nNo errors found"
        );
    }
}
