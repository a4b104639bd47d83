//! Type definitions for the executor
//!
//! - AST nodes (Statement, Expression, Operator)
//! - Runtime values (Val)
//! - Control flow (Control, Flow, Frame, FrameKind)
//! - Phase enums for each frame kind

pub mod ast;
pub mod control;
pub mod phase;
pub mod values;

pub use ast::{AssignTarget, Body, BlockLock, Branch, Expression, Handler, Operator, Statement};
pub use control::{
    CallFrame, ConstructFrame, Control, EvalFrame, Flow, Frame, FrameKind, Operand, StmtRef,
};
pub use phase::*;
pub use values::{BoundMethod, ClassField, DeferredCall, Val};
