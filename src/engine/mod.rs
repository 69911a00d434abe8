//! # Execution engines
//!
//! An execution engine performs one concrete run of a module under a memory model,
//! deferring every scheduling decision to a [`Scheduler`].
//!
//! Engines are built by an [`EngineFactory`], selected once per exploration from
//! the configured [`MemoryModel`] (see [`for_model`]). An engine instance is bound to
//! one module and one scheduler and lives for exactly one execution.

use crate::config::{Configuration, MemoryModel};
use crate::error::{Error, Result};
use crate::module::Module;
use crate::scheduler::Scheduler;
use crate::trace::Trace;

mod interp;
mod robustness;

pub use interp::Interpreter;

/// Name of the function executed as the initial thread.
pub const ENTRY_POINT: &str = "main";

/// The fixed synthetic invocation the entry point runs under.
pub const INVOCATION: &[&str] = &["prog"];

/// One concrete run of a module.
pub trait ExecutionEngine {
    /// Run the entry point to completion or to the first detected error.
    ///
    /// Returns whether an error occurred.
    fn run_to_completion(&mut self) -> bool;

    /// Check that the finished execution could have happened under sequential
    /// consistency, recording a robustness violation otherwise.
    ///
    /// Returns whether a violation was recorded.
    fn check_robustness(&mut self) -> bool;

    /// Materialize the trace of the execution.
    fn extract_trace(&mut self) -> Trace;
}

/// Capability to build engines for a memory model.
pub trait EngineFactory {
    fn create<'a>(
        &self,
        module: &'a Module,
        scheduler: &'a mut dyn Scheduler,
        config: &Configuration,
    ) -> Result<Box<dyn ExecutionEngine + 'a>>;
}

/// Select the engine implementing the given memory model.
pub fn for_model(model: MemoryModel) -> Result<Box<dyn EngineFactory>> {
    match model {
        MemoryModel::SequentialConsistency => Ok(Box::new(Interpreter::sc())),
        MemoryModel::TotalStoreOrder => Ok(Box::new(Interpreter::tso())),
        MemoryModel::PartialStoreOrder => Err(Error::UnsupportedMemoryModel(model)),
    }
}
