//! Unitium Core Library
//!
//! Async unit-test execution: suites are declared with [`SuiteDefinition`],
//! exported from modules, discovered by [`TestModule`] and run by a
//! [`Runner`] under either the sequential or the parallel discipline.
//!
//! The binary entry point is in main.rs. Custom harnesses call
//! [`cli::main`] with their own [`ModuleRegistry`].

pub mod capture;
pub mod case;
pub mod cli;
pub mod config;
pub mod definition;
pub mod error;
pub mod junit;
pub mod module;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod specification;
pub mod suite;

pub use capture::{Mismatch, TestError};
pub use case::{Test, TestStatus};
pub use definition::{CaseResult, SuiteDefinition, SuiteHandle};
pub use error::{Error, Result};
pub use module::{ModuleLoader, ModuleRegistry, RawModule, TestModule};
pub use runner::{RunSummary, Runner};
pub use specification::Specification;
pub use suite::Suite;
