use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use test_log::test;

use smc_rs::access::Proc;
use smc_rs::config::{Configuration, MemoryModel};
use smc_rs::driver::{Driver, ExplorationResult};
use smc_rs::engine::{EngineFactory, ExecutionEngine, Interpreter};
use smc_rs::error::Error;
use smc_rs::module::Module;
use smc_rs::scheduler::{Candidate, DporScheduler, Scheduler, SchedulerState};
use smc_rs::trace::{ErrorKind, EventKind, Trace};

const SINGLE_THREAD: &str = "
fn main {
    mov %a, 1
    add %b, %a, 2
    call @print(%b)
    ret
}
";

const TWO_WRITERS: &str = "
global x = 0
fn writer1 {
    store @x, 1
    ret
}
fn writer2 {
    store @x, 2
    ret
}
fn main {
    spawn %t1, writer1
    spawn %t2, writer2
    join %t1
    join %t2
    ret
}
";

const FAILING: &str = "
global x = 0
fn main {
    load %v, @x
    assert %v
    ret
}
";

const STORE_BUFFERING: &str = "
global x = 0
global y = 0
fn other {
    store @y, 1
    load %a, @x
    ret
}
fn main {
    spawn %t, other
    store @x, 1
    load %b, @y
    join %t
    ret
}
";

const PUBLISH: &str = "
global p = 0
global x = 0
fn setter {
    addr %a, @x
    store @p, %a
    ret
}
fn main {
    spawn %t, setter
    load %q, @p
    load %v, [%q]
    join %t
    ret
}
";

const LOCK_ORDER: &str = "
global a = 0
global b = 0
fn other {
    lock @b
    lock @a
    unlock @a
    unlock @b
    ret
}
fn main {
    spawn %t, other
    lock @a
    lock @b
    unlock @b
    unlock @a
    join %t
    ret
}
";

const COUNTER: &str = "
global counter = 0
global m = 0
fn worker {
    lock @m
    load %v, @counter
    add %v, %v, 1
    store @counter, %v
    unlock @m
    ret
}
fn main {
    spawn %t1, worker
    spawn %t2, worker
    join %t1
    join %t2
    load %v, @counter
    eq %ok, %v, 2
    assert %ok
    ret
}
";

/// Failing assertions stop `check` and `main` before the write races of the
/// other threads are reached.
const EARLY_ASSERTS: &str = "
global x = 0
global y = 0
global z = 0
fn writer {
    store @x, 1
    store @y, 1
    ret
}
fn check {
    load %r, @y
    load %s, @x
    assert %r
    assert %s
    eq %k, %s, 1
    brz %k, done
    store @z, 1
done:
    ret
}
fn other {
    store @x, 2
    load %q, @y
    assert %q
    ret
}
fn main {
    spawn %ta, writer
    spawn %tb, check
    spawn %tc, other
    join %ta
    join %tb
    join %tc
    load %v, @x
    eq %bad, %v, 1
    brz %bad, ok
    assert 0
ok:
    ret
}
";

/// The first assertion of `check` fails before its load of `x` races with the
/// store of `main`.
const LATE_RACE: &str = "
global x = 0
global y = 0
fn writer {
    store @x, 1
    store @y, 1
    ret
}
fn check {
    load %r, @y
    assert %r
    load %s, @x
    eq %k, %s, 2
    assert %k
    ret
}
fn main {
    spawn %ta, writer
    spawn %tb, check
    store @x, 2
    join %ta
    join %tb
    ret
}
";

/// Reaching every final state needs `second` to run in between the two
/// stores of `first`, after `third` was already tried there.
const WRITE_CHAIN: &str = "
global x = 0
global y = 0
global z = 0
fn first {
    store @y, 2
    store @x, 1
    ret
}
fn second {
    store @y, 1
    store @z, 1
    ret
}
fn third {
    load %r, @y
    store @z, 2
    store @x, 2
    ret
}
fn main {
    spawn %t1, first
    spawn %t2, second
    spawn %t3, third
    join %t1
    join %t2
    join %t3
    ret
}
";

fn explore(program: &str, config: Configuration) -> ExplorationResult {
    smc_rs::init();
    let mut driver = Driver::from_ir(program, config).unwrap();
    driver.run().unwrap()
}

fn sc() -> Configuration {
    Configuration::new(MemoryModel::SequentialConsistency)
}

fn tso() -> Configuration {
    Configuration::new(MemoryModel::TotalStoreOrder)
}

fn first_error(result: &ExplorationResult) -> ErrorKind {
    result.error_trace.as_ref().unwrap().errors()[0].kind
}

/// Wraps the interpreter and counts the engines it creates.
struct Counting {
    inner: Interpreter,
    created: Arc<AtomicUsize>,
}

impl EngineFactory for Counting {
    fn create<'a>(
        &self,
        module: &'a Module,
        scheduler: &'a mut dyn Scheduler,
        config: &Configuration,
    ) -> smc_rs::error::Result<Box<dyn ExecutionEngine + 'a>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.inner.create(module, scheduler, config)
    }
}

/// What an execution shows: its first error and where it happened, or the final
/// memory together with every loaded value.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Outcome {
    Failed(String),
    Completed(BTreeMap<u64, i64>, Vec<(usize, usize, i64)>),
}

impl Outcome {
    fn of(trace: &Trace) -> Self {
        if let Some(error) = trace.errors().first() {
            let site = error.site.as_ref().map(ToString::to_string).unwrap_or_default();
            return Outcome::Failed(format!("{} at {}", error.kind, site));
        }
        let mut memory = BTreeMap::new();
        let mut loads = Vec::new();
        for event in trace.events() {
            match event.kind {
                EventKind::Store { addr, value } => {
                    memory.insert(addr, value);
                }
                EventKind::Load { value, .. } => loads.push((event.site.thread, event.site.pc, value)),
                _ => {}
            }
        }
        loads.sort();
        Outcome::Completed(memory, loads)
    }

    fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Distinct outcomes of the executions that were not sleep-set blocked, split
/// into failed and completed ones.
fn outcomes<S: Scheduler>(
    program: &str,
    config: Configuration,
    scheduler: S,
) -> (BTreeSet<Outcome>, BTreeSet<Outcome>) {
    smc_rs::init();
    let config = config.with_explore_all_traces(true).with_debug_collect_all_traces(true);
    let mut driver = Driver::from_ir(program, config).unwrap();
    let mut scheduler = Recording::new(scheduler);
    let result = driver.run_with_scheduler(&mut scheduler).unwrap();
    assert_eq!(scheduler.redundant.len(), result.all_traces.len());
    result
        .all_traces
        .iter()
        .zip(&scheduler.redundant)
        .filter(|(_, redundant)| !**redundant)
        .map(|(trace, _)| Outcome::of(trace))
        .partition(Outcome::is_failed)
}

/// Runs every interleaving, without any reduction.
#[derive(Default)]
struct Exhaustive {
    /// Index of the chosen candidate and number of candidates, per scheduling point.
    choices: Vec<(usize, usize)>,
    pos: usize,
    exhausted: bool,
    finished: bool,
}

impl Scheduler for Exhaustive {
    fn schedule(&mut self, candidates: &[Candidate]) -> Option<Proc> {
        if self.pos == self.choices.len() {
            self.choices.push((0, candidates.len()));
        }
        let (index, _) = self.choices[self.pos];
        self.pos += 1;
        candidates.get(index).map(|c| c.proc)
    }
    fn end_execution(&mut self) {
        self.finished = true;
    }
    fn was_redundant(&self) -> bool {
        false
    }
    fn advance(&mut self) -> bool {
        self.pos = 0;
        self.finished = false;
        while let Some((index, count)) = self.choices.pop() {
            if index + 1 < count {
                self.choices.push((index + 1, count));
                return true;
            }
        }
        self.exhausted = true;
        false
    }
    fn state(&self) -> SchedulerState {
        if self.exhausted {
            SchedulerState::Exhausted
        } else if self.finished {
            SchedulerState::ReadyForNext
        } else {
            SchedulerState::Exploring
        }
    }
}

/// Records how the driver advances a scheduler.
struct Recording<S> {
    inner: S,
    advances: usize,
    after_exhaustion: usize,
    exhausted: bool,
    failures: usize,
    /// Whether each execution was sleep-set blocked.
    redundant: Vec<bool>,
}

impl<S> Recording<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            advances: 0,
            after_exhaustion: 0,
            exhausted: false,
            failures: 0,
            redundant: Vec::new(),
        }
    }
}

impl<S: Scheduler> Scheduler for Recording<S> {
    fn schedule(&mut self, candidates: &[Candidate]) -> Option<Proc> {
        self.inner.schedule(candidates)
    }
    fn execution_failed(&mut self) {
        self.failures += 1;
        self.inner.execution_failed()
    }
    fn end_execution(&mut self) {
        self.inner.end_execution();
        self.redundant.push(self.inner.was_redundant());
    }
    fn was_redundant(&self) -> bool {
        self.inner.was_redundant()
    }
    fn advance(&mut self) -> bool {
        self.advances += 1;
        if self.exhausted {
            self.after_exhaustion += 1;
        }
        let more = self.inner.advance();
        self.exhausted |= !more;
        more
    }
    fn state(&self) -> SchedulerState {
        self.inner.state()
    }
}

struct Panicking;

struct PanickingEngine;

impl ExecutionEngine for PanickingEngine {
    fn run_to_completion(&mut self) -> bool {
        panic!("segmentation fault")
    }
    fn check_robustness(&mut self) -> bool {
        false
    }
    fn extract_trace(&mut self) -> Trace {
        Trace::empty()
    }
}

impl EngineFactory for Panicking {
    fn create<'a>(
        &self,
        _module: &'a Module,
        _scheduler: &'a mut dyn Scheduler,
        _config: &Configuration,
    ) -> smc_rs::error::Result<Box<dyn ExecutionEngine + 'a>> {
        Ok(Box::new(PanickingEngine))
    }
}

#[test]
fn test_single_thread() {
    let result = explore(SINGLE_THREAD, sc());
    assert_eq!(result.trace_count, 1);
    assert_eq!(result.sleepset_blocked_trace_count, 0);
    assert!(result.error_trace.is_none());
}

#[test]
fn test_two_writers() {
    let result = explore(TWO_WRITERS, sc());
    assert_eq!(result.trace_count, 2);
    assert_eq!(result.sleepset_blocked_trace_count, 0);
    assert!(!result.has_errors());
}

#[test]
fn test_failing_assertion_stops() {
    smc_rs::init();
    let mut driver = Driver::from_ir(FAILING, sc()).unwrap();
    let mut scheduler = Recording::new(DporScheduler::default());
    let result = driver.run_with_scheduler(&mut scheduler).unwrap();
    assert_eq!(result.trace_count, 1);
    assert_eq!(first_error(&result), ErrorKind::AssertionFailure);
    assert_eq!(scheduler.failures, 1);
    assert_eq!(scheduler.advances, 0);
}

#[test]
fn test_store_buffering_robustness() {
    let result = explore(STORE_BUFFERING, tso().with_check_robustness(true));
    assert_eq!(result.trace_count, 1);
    let trace = result.error_trace.as_ref().unwrap();
    assert_eq!(trace.errors().len(), 1);
    assert!(trace.errors()[0].kind.is_robustness());
    assert!(!trace.is_empty());

    // Without the check, the relaxed outcome is not an error.
    let result = explore(STORE_BUFFERING, tso());
    assert!(!result.has_errors());

    // Under SC every execution is robust.
    let result = explore(STORE_BUFFERING, sc().with_check_robustness(true));
    assert!(!result.has_errors());
    assert!(result.trace_count > 1);
}

#[test]
fn test_invalid_access_on_one_interleaving() {
    let config = sc().with_explore_all_traces(true);
    assert_eq!(first_error(&explore(PUBLISH, config)), ErrorKind::InvalidMemoryAccess);

    for config in [sc(), tso()] {
        let (failed, completed) = outcomes(PUBLISH, config, DporScheduler::default());
        let invalid = Outcome::Failed("invalid memory access at T0 in main at #2".to_string());
        assert_eq!(failed, BTreeSet::from([invalid]));
        assert_eq!(completed.len(), 1);
    }
}

#[test]
fn test_error_before_later_race() {
    for config in [sc(), tso()] {
        let (failed, completed) = outcomes(LATE_RACE, config.clone(), DporScheduler::default());
        assert_eq!(failed.len(), 2, "{:?}", failed);
        assert_eq!(completed.len(), 1, "{:?}", completed);
        assert_eq!((failed, completed), outcomes(LATE_RACE, config, Exhaustive::default()));
    }
}

#[test]
fn test_matches_exhaustive_search() {
    let cases = [
        (EARLY_ASSERTS, sc()),
        (WRITE_CHAIN, sc()),
        (PUBLISH, tso()),
        (TWO_WRITERS, tso()),
        (LOCK_ORDER, sc()),
    ];
    for (program, config) in cases {
        let reduced = outcomes(program, config.clone(), DporScheduler::default());
        let all = outcomes(program, config, Exhaustive::default());
        assert_eq!(reduced, all);
    }
}

#[test]
fn test_assertion_after_joins_is_reached() {
    let (failed, completed) = outcomes(EARLY_ASSERTS, sc(), DporScheduler::default());
    assert!(failed.iter().any(|o| matches!(o, Outcome::Failed(s) if s.contains("in main"))));
    assert_eq!(failed.len(), 3, "{:?}", failed);
    assert_eq!(completed.len(), 2, "{:?}", completed);

    let (_, completed) = outcomes(WRITE_CHAIN, sc(), DporScheduler::default());
    assert_eq!(completed.len(), 24);
}

#[test]
fn test_lock_order_deadlock() {
    let result = explore(LOCK_ORDER, sc());
    assert_eq!(first_error(&result), ErrorKind::Deadlock);
}

#[test]
fn test_locked_counter() {
    for config in [sc(), tso().with_check_robustness(true)] {
        let result = explore(COUNTER, config);
        assert!(!result.has_errors(), "{}", result);
        assert!(result.trace_count >= 2);
    }
}

#[test]
fn test_counts_match_executions() {
    smc_rs::init();
    for program in [SINGLE_THREAD, TWO_WRITERS, STORE_BUFFERING, PUBLISH, LOCK_ORDER, COUNTER] {
        for interp in [Interpreter::sc(), Interpreter::tso()] {
            let created = Arc::new(AtomicUsize::new(0));
            let config = Configuration::new(interp.memory_model()).with_explore_all_traces(true);
            let mut driver = Driver::from_ir(program, config).unwrap().with_engine(Counting {
                inner: interp,
                created: Arc::clone(&created),
            });
            let result = driver.run().unwrap();
            assert_eq!(result.execution_count(), created.load(Ordering::SeqCst));
        }
    }
}

#[test]
fn test_error_trace_is_first_error() {
    let config = sc().with_explore_all_traces(true).with_debug_collect_all_traces(true);
    for program in [PUBLISH, LOCK_ORDER] {
        let result = explore(program, config.clone());
        let first = result.all_traces.iter().find(|t| t.has_errors());
        assert_eq!(result.error_trace.as_ref(), first);
        assert_eq!(result.all_traces.len(), result.execution_count());
    }
}

#[test]
fn test_no_advance_after_exhaustion() {
    smc_rs::init();
    for program in [TWO_WRITERS, COUNTER, PUBLISH] {
        let config = sc().with_explore_all_traces(true);
        let mut driver = Driver::from_ir(program, config).unwrap();
        let mut scheduler = Recording::new(DporScheduler::default());
        let result = driver.run_with_scheduler(&mut scheduler).unwrap();
        assert!(scheduler.exhausted);
        assert_eq!(scheduler.after_exhaustion, 0);
        assert_eq!(scheduler.advances, result.execution_count());
        assert_eq!(scheduler.state(), SchedulerState::Exhausted);
    }
}

#[test]
fn test_recycling_is_invisible() {
    for program in [TWO_WRITERS, COUNTER, LOCK_ORDER] {
        let base = tso().with_explore_all_traces(true).with_debug_collect_all_traces(true);
        let results: Vec<ExplorationResult> = [None, Some(1), Some(2), Some(1000)]
            .into_iter()
            .map(|interval| explore(program, base.clone().with_recycle_interval(interval)))
            .collect();
        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
    }
}

#[test]
fn test_host_fault_is_contained() {
    smc_rs::init();
    let config = sc().with_explore_all_traces(true);
    let mut driver = Driver::from_ir(SINGLE_THREAD, config).unwrap().with_engine(Panicking);
    let result = driver.run().unwrap();
    assert_eq!(result.trace_count, 1);
    let error_trace = result.error_trace.unwrap();
    let error = &error_trace.errors()[0];
    assert_eq!(error.kind, ErrorKind::HostFault);
    assert!(error.message.contains("segmentation fault"));
}

#[test]
fn test_depth_bound() {
    let result = explore(TWO_WRITERS, sc().with_max_search_depth(Some(1)));
    assert!(!result.has_errors());
    assert_eq!(result.trace_count, 1);
}

#[test]
fn test_fatal_errors() {
    smc_rs::init();

    let mut driver = Driver::from_ir(TWO_WRITERS, Configuration::new(MemoryModel::PartialStoreOrder)).unwrap();
    assert!(matches!(
        driver.run(),
        Err(Error::UnsupportedMemoryModel(MemoryModel::PartialStoreOrder))
    ));

    let mut driver = Driver::from_ir("fn start {\n ret\n}\n", sc()).unwrap();
    assert!(matches!(driver.run(), Err(Error::MissingEntryPoint(name)) if name == "main"));

    assert!(matches!(
        Driver::from_ir("fn main {\n store 1, 2\n}\n", sc()),
        Err(Error::Parse { line: 2, .. })
    ));
    assert!(matches!(
        Driver::from_file("/nonexistent/program.s", sc()),
        Err(Error::Io { .. })
    ));
}
