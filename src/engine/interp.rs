//! Interpreter for modules under SC and TSO.
//!
//! Threads execute their thread-local instructions eagerly. Every visible
//! instruction is a scheduling point: the enabled processes are offered to the
//! scheduler as [`Candidate`]s and the chosen one performs its operation.
//!
//! Under TSO, stores enter the issuing thread's FIFO store buffer, and the
//! buffer's `Flush` process commits them to memory one at a time. Loads see the
//! newest own buffered store first. `fence`, `spawn`, `lock` and `unlock` wait
//! for the own buffer to drain; `join` waits for the joined thread to finish and
//! its buffer to drain.

use std::collections::VecDeque;

use log::{debug, info};

use crate::access::{Access, Proc};
use crate::config::{Configuration, MemoryModel};
use crate::engine::robustness::MemoryGraph;
use crate::engine::{EngineFactory, ExecutionEngine, ENTRY_POINT, INVOCATION};
use crate::error::{Error, Result};
use crate::module::{Instr, Location, Module, Value};
use crate::scheduler::{Candidate, Scheduler};
use crate::symbols::{self, ExternKind};
use crate::trace::{ErrorKind, Event, EventKind, Site, Trace, TraceError};

/// Largest number of memory cells an engine can allocate.
const MAX_CELLS: usize = 1 << 24;

/// Engine factory for the interpreter.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Interpreter {
    model: MemoryModel,
}

impl Interpreter {
    pub fn sc() -> Self {
        Self {
            model: MemoryModel::SequentialConsistency,
        }
    }

    pub fn tso() -> Self {
        Self {
            model: MemoryModel::TotalStoreOrder,
        }
    }

    pub fn memory_model(&self) -> MemoryModel {
        self.model
    }
}

impl EngineFactory for Interpreter {
    fn create<'a>(
        &self,
        module: &'a Module,
        scheduler: &'a mut dyn Scheduler,
        config: &Configuration,
    ) -> Result<Box<dyn ExecutionEngine + 'a>> {
        if config.memory_model != self.model {
            return Err(Error::EngineCreation {
                message: format!(
                    "{} interpreter cannot execute under {}",
                    self.model, config.memory_model
                ),
            });
        }
        if module.globals().len() > MAX_CELLS {
            return Err(Error::EngineCreation {
                message: format!(
                    "{} globals exceed the memory limit of {} cells",
                    module.globals().len(),
                    MAX_CELLS
                ),
            });
        }
        let (entry, _) = module
            .function(ENTRY_POINT)
            .ok_or_else(|| Error::MissingEntryPoint(ENTRY_POINT.to_string()))?;
        Ok(Box::new(Machine::new(
            module,
            scheduler,
            entry,
            self.model == MemoryModel::TotalStoreOrder,
            config.max_local_steps,
        )))
    }
}

/// A store waiting in a store buffer.
#[derive(Debug, Clone)]
struct Buffered {
    addr: u64,
    value: i64,
    /// Memory graph node of the store.
    node: usize,
    site: Site,
}

#[derive(Debug, Clone)]
struct ThreadState {
    function: usize,
    pc: usize,
    regs: Vec<i64>,
    finished: bool,
    buffer: VecDeque<Buffered>,
}

impl ThreadState {
    fn new(module: &Module, function: usize) -> Self {
        Self {
            function,
            pc: 0,
            regs: vec![0; module.functions()[function].num_registers()],
            finished: false,
            buffer: VecDeque::new(),
        }
    }
}

struct Machine<'a> {
    module: &'a Module,
    scheduler: &'a mut dyn Scheduler,
    tso: bool,
    max_local_steps: usize,
    memory: Vec<i64>,
    threads: Vec<ThreadState>,
    events: Vec<Event>,
    errors: Vec<TraceError>,
    graph: MemoryGraph,
}

impl<'a> Machine<'a> {
    fn new(
        module: &'a Module,
        scheduler: &'a mut dyn Scheduler,
        entry: usize,
        tso: bool,
        max_local_steps: usize,
    ) -> Self {
        Self {
            module,
            scheduler,
            tso,
            max_local_steps,
            memory: module.globals().iter().map(|g| g.init).collect(),
            threads: vec![ThreadState::new(module, entry)],
            events: Vec::new(),
            errors: Vec::new(),
            graph: MemoryGraph::new(),
        }
    }

    fn site(&self, t: usize) -> Site {
        let thread = &self.threads[t];
        Site {
            thread: t,
            function: self.module.functions()[thread.function].name.clone(),
            pc: thread.pc,
        }
    }

    fn error(&self, t: usize, kind: ErrorKind, message: impl Into<String>) -> TraceError {
        TraceError::new(kind, Some(self.site(t)), message)
    }

    fn instr(&self, t: usize) -> Option<&'a Instr> {
        let module = self.module;
        let thread = &self.threads[t];
        module.functions()[thread.function].body.get(thread.pc)
    }

    fn value(&self, t: usize, v: Value) -> i64 {
        match v {
            Value::Reg(r) => self.threads[t].regs[r],
            Value::Imm(x) => x,
        }
    }

    fn describe(&self, t: usize, v: Value) -> String {
        match v {
            Value::Reg(r) => {
                let function = &self.module.functions()[self.threads[t].function];
                format!("%{}", function.registers[r])
            }
            Value::Imm(x) => x.to_string(),
        }
    }

    fn set(&mut self, t: usize, r: usize, value: i64) {
        self.threads[t].regs[r] = value;
    }

    /// Address of a memory operand. Not necessarily valid.
    fn resolve(&self, t: usize, loc: Location) -> u64 {
        match loc {
            Location::Global(g) => g as u64 + 1,
            Location::Indirect(r) => self.threads[t].regs[r] as u64,
        }
    }

    /// Memory cell of a valid address.
    fn cell(&self, addr: u64) -> Option<usize> {
        let index = usize::try_from(addr).ok()?.checked_sub(1)?;
        (index < self.memory.len()).then_some(index)
    }

    fn checked_cell(&self, t: usize, addr: u64, what: &str) -> Result<usize, TraceError> {
        self.cell(addr).ok_or_else(|| {
            self.error(
                t,
                ErrorKind::InvalidMemoryAccess,
                format!("{} invalid address {}", what, addr as i64),
            )
        })
    }

    /// Thread index denoted by a joined value, if it names another existing thread.
    fn joinee(&self, t: usize, value: i64) -> Option<usize> {
        usize::try_from(value)
            .ok()
            .filter(|&c| c < self.threads.len() && c != t)
    }

    /// Newest store to `addr` in the store buffer of `t`.
    fn forwarded(&self, t: usize, addr: u64) -> Option<(i64, usize)> {
        self.threads[t]
            .buffer
            .iter()
            .rev()
            .find(|b| b.addr == addr)
            .map(|b| (b.value, b.node))
    }

    /// Execute thread-local instructions of `t` up to its next visible one.
    fn run_local(&mut self, t: usize) -> Result<(), TraceError> {
        let mut steps = 0;
        loop {
            if self.threads[t].finished {
                return Ok(());
            }
            let Some(instr) = self.instr(t) else {
                self.threads[t].finished = true;
                return Ok(());
            };
            if instr.is_visible() {
                return Ok(());
            }
            if steps == self.max_local_steps {
                return Err(self.error(
                    t,
                    ErrorKind::StepLimit,
                    format!("more than {} consecutive local steps", self.max_local_steps),
                ));
            }
            steps += 1;
            self.exec_local(t, instr)?;
        }
    }

    fn exec_local(&mut self, t: usize, instr: &Instr) -> Result<(), TraceError> {
        match *instr {
            Instr::Mov { dst, src } => {
                let v = self.value(t, src);
                self.set(t, dst, v);
            }
            Instr::Bin { op, dst, lhs, rhs } => {
                let v = op.apply(self.value(t, lhs), self.value(t, rhs));
                self.set(t, dst, v);
            }
            Instr::Addr { dst, global } => self.set(t, dst, global as i64 + 1),
            Instr::Assert { value } => {
                if self.value(t, value) == 0 {
                    return Err(self.error(
                        t,
                        ErrorKind::AssertionFailure,
                        format!("assert {} failed", self.describe(t, value)),
                    ));
                }
            }
            Instr::Jump { target } => {
                self.threads[t].pc = target;
                return Ok(());
            }
            Instr::Branch {
                cond,
                if_zero,
                target,
            } => {
                if (self.value(t, cond) == 0) == if_zero {
                    self.threads[t].pc = target;
                    return Ok(());
                }
            }
            Instr::Call { ref name, ref args } => self.call(t, name, args)?,
            Instr::Ret => {
                self.threads[t].finished = true;
                return Ok(());
            }
            _ => {}
        }
        self.threads[t].pc += 1;
        Ok(())
    }

    fn call(&mut self, t: usize, name: &str, args: &[Value]) -> Result<(), TraceError> {
        let Ok(Some(ext)) = symbols::lookup(name) else {
            return Err(self.error(
                t,
                ErrorKind::InvalidOperation,
                format!("call to unknown function `{}`", name),
            ));
        };
        let values: Vec<i64> = args.iter().map(|&a| self.value(t, a)).collect();
        match ext.kind {
            ExternKind::Assert => {
                if values.first().copied().unwrap_or(0) == 0 {
                    let arg = args.first().map(|&a| self.describe(t, a)).unwrap_or_default();
                    return Err(self.error(
                        t,
                        ErrorKind::AssertionFailure,
                        format!("{}({}) failed", name, arg),
                    ));
                }
            }
            ExternKind::Abort => {
                return Err(self.error(t, ErrorKind::Abort, format!("{}() called", name)));
            }
            ExternKind::Yield => {}
            ExternKind::Print => {
                let text: Vec<String> = values.iter().map(i64::to_string).collect();
                info!("T{}: {}", t, text.join(" "));
            }
        }
        Ok(())
    }

    /// The operation `t` performs next, if it is enabled.
    fn candidate(&self, t: usize) -> Option<Candidate> {
        let thread = &self.threads[t];
        if thread.finished {
            return None;
        }
        let access = match *self.instr(t)? {
            Instr::Load { loc, .. } => Access::Read(self.resolve(t, loc)),
            Instr::Store { loc, .. } => {
                let addr = self.resolve(t, loc);
                if self.tso {
                    Access::Enqueue(addr)
                } else {
                    Access::Write(addr)
                }
            }
            Instr::Fence => Access::Fence,
            Instr::Spawn { .. } => Access::Spawn(self.threads.len()),
            Instr::Join { thread: v } => match self.joinee(t, self.value(t, v)) {
                Some(c) => {
                    let child = &self.threads[c];
                    if !child.finished || !child.buffer.is_empty() {
                        return None;
                    }
                    Access::Join(c)
                }
                // Reported as an error when executed.
                None => Access::Fence,
            },
            Instr::Lock { loc } => {
                let addr = self.resolve(t, loc);
                if let Some(cell) = self.cell(addr) {
                    if self.memory[cell] != 0 {
                        return None;
                    }
                }
                Access::Lock(addr)
            }
            Instr::Unlock { loc } => Access::Unlock(self.resolve(t, loc)),
            _ => return None,
        };
        if self.tso && access.drains_buffer() && !thread.buffer.is_empty() {
            return None;
        }
        Some(Candidate::new(Proc::Thread(t), access))
    }

    fn candidates(&self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = (0..self.threads.len())
            .filter_map(|t| self.candidate(t))
            .collect();
        for (t, thread) in self.threads.iter().enumerate() {
            if let Some(head) = thread.buffer.front() {
                candidates.push(Candidate::new(Proc::Flush(t), Access::Write(head.addr)));
            }
        }
        candidates
    }

    fn deadlock(&self) -> TraceError {
        let blocked: Vec<String> = (0..self.threads.len())
            .filter(|&t| !self.threads[t].finished)
            .map(|t| self.site(t).to_string())
            .collect();
        TraceError::new(
            ErrorKind::Deadlock,
            None,
            format!("no thread can proceed: {}", blocked.join(", ")),
        )
    }

    fn step(&mut self, proc: Proc) -> Result<(), TraceError> {
        match proc {
            Proc::Thread(t) => self.step_thread(t),
            Proc::Flush(t) => {
                let Some(entry) = self.threads[t].buffer.pop_front() else {
                    return Ok(());
                };
                if let Some(cell) = self.cell(entry.addr) {
                    self.memory[cell] = entry.value;
                }
                self.graph.commit(entry.node);
                self.events.push(Event {
                    proc,
                    site: entry.site,
                    kind: EventKind::Store {
                        addr: entry.addr,
                        value: entry.value,
                    },
                });
                Ok(())
            }
        }
    }

    fn step_thread(&mut self, t: usize) -> Result<(), TraceError> {
        let site = self.site(t);
        let Some(instr) = self.instr(t) else {
            return Ok(());
        };
        let kind = match *instr {
            Instr::Load { dst, loc } => {
                let addr = self.resolve(t, loc);
                let cell = self.checked_cell(t, addr, "load from")?;
                let (value, from_buffer) = match self.forwarded(t, addr) {
                    Some((value, store)) => {
                        self.graph.read(t, addr, Some(store));
                        (value, true)
                    }
                    None => {
                        self.graph.read(t, addr, None);
                        (self.memory[cell], false)
                    }
                };
                self.set(t, dst, value);
                EventKind::Load {
                    addr,
                    value,
                    from_buffer,
                }
            }
            Instr::Store { loc, value } => {
                let addr = self.resolve(t, loc);
                let cell = self.checked_cell(t, addr, "store to")?;
                let value = self.value(t, value);
                let node = self.graph.write(t, addr);
                if self.tso {
                    self.threads[t].buffer.push_back(Buffered {
                        addr,
                        value,
                        node,
                        site: site.clone(),
                    });
                    EventKind::Enqueue { addr, value }
                } else {
                    self.memory[cell] = value;
                    self.graph.commit(node);
                    EventKind::Store { addr, value }
                }
            }
            Instr::Fence => EventKind::Fence,
            Instr::Spawn { dst, function } => {
                let child = self.threads.len();
                self.threads.push(ThreadState::new(self.module, function));
                self.set(t, dst, child as i64);
                EventKind::Spawn { child }
            }
            Instr::Join { thread } => {
                let value = self.value(t, thread);
                let child = self.joinee(t, value).ok_or_else(|| {
                    self.error(
                        t,
                        ErrorKind::InvalidOperation,
                        format!("join of invalid thread {}", value),
                    )
                })?;
                EventKind::Join { child }
            }
            Instr::Lock { loc } => {
                let addr = self.resolve(t, loc);
                let cell = self.checked_cell(t, addr, "lock at")?;
                self.memory[cell] = 1;
                self.graph.update(t, addr);
                EventKind::Lock { addr }
            }
            Instr::Unlock { loc } => {
                let addr = self.resolve(t, loc);
                let cell = self.checked_cell(t, addr, "unlock at")?;
                if self.memory[cell] == 0 {
                    return Err(self.error(
                        t,
                        ErrorKind::InvalidOperation,
                        format!("unlock of mutex #{} that is not locked", addr),
                    ));
                }
                self.memory[cell] = 0;
                self.graph.update(t, addr);
                EventKind::Unlock { addr }
            }
            _ => {
                return Err(self.error(t, ErrorKind::InvalidOperation, "not a scheduling point"));
            }
        };
        self.threads[t].pc += 1;
        self.events.push(Event {
            proc: Proc::Thread(t),
            site,
            kind,
        });
        Ok(())
    }

    fn run(&mut self) -> Result<(), TraceError> {
        loop {
            for t in 0..self.threads.len() {
                self.run_local(t)?;
            }
            let candidates = self.candidates();
            if candidates.is_empty() {
                if self.threads.iter().all(|t| t.finished && t.buffer.is_empty()) {
                    return Ok(());
                }
                return Err(self.deadlock());
            }
            // No choice: every candidate is asleep, or the depth bound is reached.
            let Some(proc) = self.scheduler.schedule(&candidates) else {
                return Ok(());
            };
            self.step(proc)?;
        }
    }
}

impl ExecutionEngine for Machine<'_> {
    fn run_to_completion(&mut self) -> bool {
        debug!(
            "running {} of {} with argv {:?} (tso = {})",
            ENTRY_POINT,
            self.module.data_layout(),
            INVOCATION,
            self.tso
        );
        if let Err(error) = self.run() {
            debug!("execution failed: {}", error);
            self.errors.push(error);
        }
        !self.errors.is_empty()
    }

    fn check_robustness(&mut self) -> bool {
        if !self.errors.is_empty() {
            return false;
        }
        let Some(cycle) = self.graph.find_cycle() else {
            return false;
        };
        let message = format!(
            "execution is not sequentially consistent: {}",
            self.graph.describe(&cycle)
        );
        debug!("{}", message);
        self.errors.push(TraceError::new(
            ErrorKind::RobustnessViolation,
            None,
            message,
        ));
        true
    }

    fn extract_trace(&mut self) -> Trace {
        Trace::new(std::mem::take(&mut self.events), self.errors.clone())
    }
}
