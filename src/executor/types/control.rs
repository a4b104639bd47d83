//! Control flow and execution frame types

use std::sync::Arc;

use super::ast::{Body, BlockLock, Statement};
use super::phase::{
    CallPhase, ConstructPhase, ExclusivePhase, IfPhase, RepeatPhase, TryPhase, ValuePhase,
    WhilePhase,
};
use super::values::Val;
use crate::compiler::CompiledExpr;
use crate::executor::classes::{ClassDefinition, ClassInstance};
use crate::executor::errors::{LangError, SourceLocation};

/* ===================== Control Flow ===================== */

/// Active control flow
///
/// When control is not `None`, the VM unwinds the frame stack until a frame handles it.
#[derive(Debug, Clone)]
pub enum Control {
    None,
    Break,
    Continue,
    Return(Val),
    Throw(LangError),
}

impl Control {
    pub fn is_none(&self) -> bool {
        matches!(self, Control::None)
    }
}

/// How a body finished
///
/// `Stop` means the body ran to its end; it is distinct from every language value.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Stop,
    Return(Val),
    Continue,
    Break,
}

/* ===================== Frames ===================== */

/// A statement inside a shared body
#[derive(Debug, Clone)]
pub struct StmtRef {
    pub body: Body,
    pub idx: usize,
}

impl StmtRef {
    pub fn new(body: &Body, idx: usize) -> Self {
        Self {
            body: Arc::clone(body),
            idx,
        }
    }

    pub fn stmt(&self) -> &Statement {
        &self.body[self.idx]
    }
}

/// Operand stack entry of an expression frame
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Val),
    /// Field name waiting for its `.`
    Attr(String),
    /// Start of a call's arguments
    ArgsMark,
}

/// Evaluation state of one compiled expression
#[derive(Debug, Clone)]
pub struct EvalFrame {
    pub expr: Arc<CompiledExpr>,
    pub pc: usize,
    pub stack: Vec<Operand>,
    /// A call frame was pushed above; its result arrives in the VM slot
    pub awaiting: bool,
    /// Polls spent in the current `wait`
    pub polls: u32,
}

impl EvalFrame {
    pub fn new(expr: Arc<CompiledExpr>) -> Self {
        Self {
            expr,
            pc: 0,
            stack: Vec::new(),
            awaiting: false,
            polls: 0,
        }
    }
}

/// An invocation of anything callable
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub callee: Val,
    pub args: Vec<Val>,
    /// The expression the call was made from
    pub location: Option<SourceLocation>,
    pub phase: CallPhase,
}

/// Construction of one class instance (and, recursively, its parents)
#[derive(Debug, Clone)]
pub struct ConstructFrame {
    pub class: Arc<ClassDefinition>,
    pub args: Vec<Val>,
    pub instance: Option<Arc<ClassInstance>>,
    /// Leading arguments handed to the parent constructor
    pub consumed: usize,
    pub location: Option<SourceLocation>,
    pub phase: ConstructPhase,
}

/// Frame kind: the type and state of what is being executed
#[derive(Debug, Clone)]
pub enum FrameKind {
    /// Placeholder while a handler owns the real kind
    Vacant,
    Body {
        body: Body,
        idx: usize,
        /// A statement completed since the last checkpoint
        checkpoint: bool,
    },
    Declare { at: StmtRef, phase: ValuePhase },
    Assign { at: StmtRef, phase: ValuePhase },
    Print { at: StmtRef, phase: ValuePhase },
    Throw { at: StmtRef, phase: ValuePhase },
    Return { at: StmtRef, phase: ValuePhase },
    Expr { at: StmtRef, phase: ValuePhase },
    If { at: StmtRef, phase: IfPhase },
    Repeat { at: StmtRef, phase: RepeatPhase },
    While { at: StmtRef, phase: WhilePhase },
    Try { at: StmtRef, phase: TryPhase },
    Exclusive {
        at: StmtRef,
        lock: Arc<BlockLock>,
        phase: ExclusivePhase,
    },
    Eval(EvalFrame),
    Call(CallFrame),
    Construct(ConstructFrame),
}

impl FrameKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, FrameKind::Repeat { .. } | FrameKind::While { .. })
    }
}

/// Execution frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,

    /// This frame pushed a scope that must be popped with it
    pub pushed_scope: bool,

    /// Mutual-exclusion lock held while this frame is on the stack
    pub lock: Option<Arc<BlockLock>>,

    /// Procedure boundary: counts towards the recursion depth
    pub boundary: bool,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            pushed_scope: false,
            lock: None,
            boundary: false,
        }
    }
}
