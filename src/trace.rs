//! Execution traces and the errors found in them.

use std::fmt::{Display, Formatter};

use crate::access::Proc;

/// Position in the checked program.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Site {
    pub thread: usize,
    pub function: String,
    pub pc: usize,
}

impl Display for Site {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{} in {} at #{}", self.thread, self.function, self.pc)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    AssertionFailure,
    InvalidMemoryAccess,
    Abort,
    /// An operation misused by the program, like joining a thread that does not exist.
    InvalidOperation,
    Deadlock,
    StepLimit,
    /// The execution is not explainable under sequential consistency.
    RobustnessViolation,
    /// A fault intercepted while executing, converted into an error.
    HostFault,
}

impl ErrorKind {
    pub fn is_robustness(self) -> bool {
        self == ErrorKind::RobustnessViolation
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::AssertionFailure => "assertion failure",
            ErrorKind::InvalidMemoryAccess => "invalid memory access",
            ErrorKind::Abort => "abort",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::Deadlock => "deadlock",
            ErrorKind::StepLimit => "step limit exceeded",
            ErrorKind::RobustnessViolation => "robustness violation",
            ErrorKind::HostFault => "host fault",
        };
        write!(f, "{}", s)
    }
}

/// An error annotation of a trace.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TraceError {
    pub kind: ErrorKind,
    pub site: Option<Site>,
    pub message: String,
}

impl TraceError {
    pub fn new(kind: ErrorKind, site: Option<Site>, message: impl Into<String>) -> Self {
        Self {
            kind,
            site,
            message: message.into(),
        }
    }
}

impl Display for TraceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(site) = &self.site {
            write!(f, " ({})", site)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EventKind {
    Load { addr: u64, value: i64, from_buffer: bool },
    /// A store reaching memory.
    Store { addr: u64, value: i64 },
    /// A store entering the store buffer.
    Enqueue { addr: u64, value: i64 },
    Fence,
    Spawn { child: usize },
    Join { child: usize },
    Lock { addr: u64 },
    Unlock { addr: u64 },
}

/// A visible operation performed by a process.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event {
    pub proc: Proc,
    pub site: Site,
    pub kind: EventKind,
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>8}  ", self.proc.to_string())?;
        match self.kind {
            EventKind::Load {
                addr,
                value,
                from_buffer,
            } => {
                write!(f, "load #{} = {}", addr, value)?;
                if from_buffer {
                    write!(f, " (buffer)")?;
                }
            }
            EventKind::Store { addr, value } => write!(f, "store #{} := {}", addr, value)?,
            EventKind::Enqueue { addr, value } => write!(f, "buffer #{} := {}", addr, value)?,
            EventKind::Fence => write!(f, "fence")?,
            EventKind::Spawn { child } => write!(f, "spawn T{}", child)?,
            EventKind::Join { child } => write!(f, "join T{}", child)?,
            EventKind::Lock { addr } => write!(f, "lock #{}", addr)?,
            EventKind::Unlock { addr } => write!(f, "unlock #{}", addr)?,
        }
        write!(f, "  [{}#{}]", self.site.function, self.site.pc)
    }
}

/// The events of one execution plus the errors detected in it.
///
/// An empty trace means that no trace was materialized.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Trace {
    events: Vec<Event>,
    errors: Vec<TraceError>,
}

impl Trace {
    pub fn new(events: Vec<Event>, errors: Vec<TraceError>) -> Self {
        Self { events, errors }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A trace consisting of a single error.
    pub fn from_error(error: TraceError) -> Self {
        Self::new(Vec::new(), vec![error])
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn errors(&self) -> &[TraceError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.errors.is_empty()
    }
}

impl Display for Trace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for event in &self.events {
            writeln!(f, "{}", event)?;
        }
        for error in &self.errors {
            writeln!(f, "Error: {}", error)?;
        }
        Ok(())
    }
}
