//! Process-wide table of extern functions callable with `call @name(...)`.
//!
//! The table is populated once by [`register_builtins`] (see [`crate::init`]),
//! before any module is checked or any driver is constructed.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExternKind {
    /// Fail the execution if the argument is zero.
    Assert,
    /// Fail the execution unconditionally.
    Abort,
    /// Scheduling hint; no effect on the state.
    Yield,
    /// Log the arguments.
    Print,
}

#[derive(Debug, Clone)]
pub struct Extern {
    pub name: &'static str,
    /// Number of arguments, `None` for variadic.
    pub arity: Option<usize>,
    pub kind: ExternKind,
}

static EXTERNS: OnceLock<HashMap<&'static str, Extern>> = OnceLock::new();

const BUILTINS: &[Extern] = &[
    Extern {
        name: "assert",
        arity: Some(1),
        kind: ExternKind::Assert,
    },
    Extern {
        name: "abort",
        arity: Some(0),
        kind: ExternKind::Abort,
    },
    Extern {
        name: "yield",
        arity: Some(0),
        kind: ExternKind::Yield,
    },
    Extern {
        name: "print",
        arity: None,
        kind: ExternKind::Print,
    },
];

/// Register the builtin externs. Idempotent.
pub fn register_builtins() {
    EXTERNS.get_or_init(|| {
        log::debug!("registering {} builtin externs", BUILTINS.len());
        BUILTINS.iter().map(|e| (e.name, e.clone())).collect()
    });
}

pub fn is_initialized() -> bool {
    EXTERNS.get().is_some()
}

/// Look up a registered extern.
pub fn lookup(name: &str) -> Result<Option<&'static Extern>> {
    let table = EXTERNS.get().ok_or(Error::NotInitialized)?;
    Ok(table.get(name))
}
