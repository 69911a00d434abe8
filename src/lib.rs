//! # smc-rs: Stateless Model Checking in Rust
//!
//! **`smc-rs`** explores the interleavings of small concurrent programs and reports
//! assertion failures, invalid memory accesses, deadlocks and (optionally)
//! behaviours that are impossible under sequential consistency.
//!
//! ## What is stateless model checking?
//!
//! A stateless model checker runs the program over and over again, each time under a
//! different thread schedule, instead of storing the visited program states.
//! Dynamic partial-order reduction (DPOR) keeps the number of runs small: two schedules
//! that only differ in the order of independent operations are equivalent, so only
//! one of them is executed.
//!
//! ## Key Features
//!
//! - **DPOR with sleep sets**: the [`DporScheduler`][crate::scheduler::DporScheduler] explores every
//!   distinct interleaving at least once, detecting races with vector clocks.
//! - **Relaxed memory**: programs run under sequential consistency (SC) or total store order (TSO),
//!   where every thread owns a FIFO store buffer.
//! - **Robustness checking**: a TSO execution that has no SC explanation is reported as a
//!   [`RobustnessViolation`][crate::trace::ErrorKind::RobustnessViolation].
//! - **Containment**: faults raised while executing are converted into errors of the execution
//!   instead of aborting the exploration.
//!
//! ## Basic Usage
//!
//! ```rust
//! use smc_rs::config::{Configuration, MemoryModel};
//! use smc_rs::driver::Driver;
//!
//! // 1. Register the extern functions, once per process
//! smc_rs::init();
//!
//! // 2. Load a program
//! let program = "
//! global x = 0
//! fn writer {
//!     store @x, 1
//!     ret
//! }
//! fn main {
//!     spawn %t, writer
//!     store @x, 2
//!     join %t
//!     ret
//! }
//! ";
//! let config = Configuration::new(MemoryModel::SequentialConsistency);
//! let mut driver = Driver::from_ir(program, config).unwrap();
//!
//! // 3. Explore all interleavings
//! let result = driver.run().unwrap();
//! assert_eq!(result.trace_count, 2);
//! assert!(!result.has_errors());
//! ```
//!
//! ## Core Components
//!
//! - **[`driver`]**: The exploration loop and its [`ExplorationResult`][crate::driver::ExplorationResult].
//! - **[`scheduler`]**: The scheduler contract and the DPOR scheduler.
//! - **[`engine`]**: Execution engines, including the built-in interpreter.
//! - **[`module`]**: The assembly dialect of checked programs.

pub mod access;
pub mod check;
pub mod config;
pub mod containment;
pub mod driver;
pub mod engine;
pub mod error;
pub mod module;
mod parser;
pub mod scheduler;
pub mod session;
pub mod symbols;
pub mod trace;
pub mod vv;

/// Process-wide initialization of the checker.
///
/// Registers the built-in extern functions. Must be called before loading any
/// program; calling it again has no effect.
pub fn init() {
    symbols::register_builtins();
}
