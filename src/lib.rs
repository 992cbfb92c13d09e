//! The session core of a small line-oriented command interpreter.
//!
//! This crate keeps the state of one interpreter session and the command history
//! that outlives it. [`OrderedList`] is the singly-linked, order-preserving list that
//! backs the environment, alias and history registries; [`history`] loads the history
//! file into such a list (capped and renumbered) and writes it back; and
//! [`ExecutionContext`] is the session object that owns all of it and defines when
//! each piece is reset or released.
//!
//! [`Interpreter`] ties these together into a read-eval loop with a handful of
//! builtins and an external command launcher.

mod builtin;
pub mod command;
pub mod config;
pub mod context;
mod env;
pub mod expand;
mod external;
pub mod history;
mod interpreter;
#[cfg(test)]
mod io_adapters;
pub mod lexer;
pub mod list;

pub use config::Config;
pub use context::{CommandLine, ExecutionContext, InputSource};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
pub use list::{Node, OrderedList};
