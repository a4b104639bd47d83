//! # Executor - Resumable Stack-Driven Interpreter
//!
//! ## Core Principles
//!
//! 1. **Stack-driven execution**: All state in `frames: Vec<Frame>`, no host recursion, so deep
//!    language recursion is bounded by the configured limit and not by the thread stack
//! 2. **Micro-steps**: Each frame carries a phase; one `step()` advances one frame by one phase
//! 3. **Centralized control flow**: `Control` manages break/continue/return/throw
//! 4. **Two modes**: the main program runs to completion, background tasks yield at checkpoints
//!
//! Expressions are compiled once to postfix (see [`crate::compiler`]) and evaluated on an
//! operand stack inside an expression frame.

pub mod classes;
pub mod errors;
pub mod exec_loop;
pub mod expressions;
pub mod operators;
pub mod scope;
pub mod statements;
pub mod stdlib;
pub mod suggest;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use errors::{ErrorKind, LangError, LangResult, SourceLocation};
pub use exec_loop::{run_until_done, step};
pub use expressions::{evaluate, evaluate_resumable};
pub use scope::Scope;
pub use types::{Body, Control, Expression, Flow, Statement, Val};
pub use vm::{Mode, Step, Vm};
