//! Virtual Machine state
//!
//! The VM holds all execution state of one thread of control:
//! - frames: stack of active statements, expressions and calls
//! - control: current control flow state (return, break, throw, ...)
//! - slot: the value handed from a finished child frame to its parent
//! - scopes: the scope stack of this execution context
//!
//! The main program runs a VM in [`Mode::Sync`]; every background task owns a VM in
//! [`Mode::Cooperative`] that yields at checkpoints.

use std::sync::Arc;

use super::errors::{LangError, LangResult, SourceLocation};
use super::exec_loop::{run_until_done, step};
use super::scope::{Scope, ScopeStack};
use super::types::{
    Body, CallFrame, CallPhase, Control, EvalFrame, Flow, Frame, FrameKind, StmtRef, Val,
};
use super::statements;
use crate::application::RuntimeContext;
use crate::compiler::CompiledExpr;
use crate::scheduler::{Poll, Resumable};

/* ===================== Mode And Step ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Runs to completion on the calling thread; blocking operations spin
    Sync,
    /// Yields at checkpoints; blocking operations yield instead of spinning
    Cooperative,
}

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// A checkpoint was reached (cooperative mode only)
    Yield,
    /// No frames left
    Done,
}

/* ===================== VM ===================== */

pub struct Vm {
    pub frames: Vec<Frame>,
    pub control: Control,
    /// Result of the last frame that finished with a value
    pub slot: Option<Val>,
    pub scopes: ScopeStack,
    pub mode: Mode,
    pub ctx: Arc<RuntimeContext>,
    /// Active procedure invocations
    pub call_depth: usize,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("frames", &self.frames.len())
            .field("control", &self.control)
            .field("mode", &self.mode)
            .field("call_depth", &self.call_depth)
            .finish()
    }
}

impl Vm {
    fn empty(ctx: Arc<RuntimeContext>, root: Arc<Scope>, mode: Mode) -> Self {
        Vm {
            frames: Vec::new(),
            control: Control::None,
            slot: None,
            scopes: ScopeStack::new(root),
            mode,
            ctx,
            call_depth: 0,
        }
    }

    /// A VM running a statement list directly in the global scope
    pub fn for_body(ctx: Arc<RuntimeContext>, body: &Body, mode: Mode) -> Self {
        let globals = Arc::clone(&ctx.globals);
        let mut vm = Vm::empty(ctx, globals, mode);
        vm.frames.push(Frame::new(FrameKind::Body {
            body: Arc::clone(body),
            idx: 0,
            checkpoint: false,
        }));
        vm
    }

    /// A VM evaluating one compiled expression against `scope`
    pub fn for_expression(
        ctx: Arc<RuntimeContext>,
        expr: Arc<CompiledExpr>,
        scope: Arc<Scope>,
        mode: Mode,
    ) -> Self {
        let mut vm = Vm::empty(ctx, scope, mode);
        vm.push_eval(expr);
        vm
    }

    /// A VM invoking a callable with already evaluated arguments
    ///
    /// `caller` is the scope the call was written in; missing arguments take their defaults
    /// from it.
    pub fn for_call(
        ctx: Arc<RuntimeContext>,
        callee: Val,
        args: Vec<Val>,
        caller: Arc<Scope>,
        mode: Mode,
    ) -> Self {
        let mut vm = Vm::empty(ctx, caller, mode);
        vm.push_call(callee, args, None);
        vm
    }

    /* ===================== Frame Management ===================== */

    /// Put a handler's frame kind back on top of the stack
    pub fn restore(&mut self, kind: FrameKind) {
        if let Some(frame) = self.frames.last_mut() {
            frame.kind = kind;
        }
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Pop the top frame, undoing everything it acquired
    pub fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        if frame.pushed_scope {
            self.scopes.pop();
        }
        if let Some(lock) = &frame.lock {
            lock.release();
        }
        if frame.boundary {
            self.call_depth = self.call_depth.saturating_sub(1);
        }
        Some(frame)
    }

    /// Pop the current frame and hand `value` to its parent
    pub fn finish_with(&mut self, value: Val) -> Step {
        self.pop_frame();
        self.slot = Some(value);
        Step::Continue
    }

    /// Pop the current frame and start unwinding with `err`
    pub fn throw(&mut self, err: LangError) -> Step {
        self.pop_frame();
        self.control = Control::Throw(err);
        Step::Continue
    }

    pub fn take_slot(&mut self) -> Val {
        self.slot.take().unwrap_or(Val::Null)
    }

    pub fn push_stmt(&mut self, at: StmtRef) {
        statements::push_stmt(self, at);
    }

    /// Push a statement list running in a fresh child scope
    pub fn push_block(&mut self, body: &Body, scope_name: &str) {
        let scope = Scope::child(self.scopes.current(), scope_name);
        self.scopes.push(scope);
        let mut frame = Frame::new(FrameKind::Body {
            body: Arc::clone(body),
            idx: 0,
            checkpoint: false,
        });
        frame.pushed_scope = true;
        self.frames.push(frame);
    }

    pub fn push_eval(&mut self, expr: Arc<CompiledExpr>) {
        self.frames
            .push(Frame::new(FrameKind::Eval(EvalFrame::new(expr))));
    }

    pub fn push_call(&mut self, callee: Val, args: Vec<Val>, location: Option<SourceLocation>) {
        self.frames.push(Frame::new(FrameKind::Call(CallFrame {
            callee,
            args,
            location,
            phase: CallPhase::Bind,
        })));
    }

    /* ===================== Results ===================== */

    /// Run until done (or until the first checkpoint in cooperative mode)
    pub fn run(&mut self) -> Step {
        run_until_done(self)
    }

    /// How a body-running VM finished
    pub fn into_flow(mut self) -> LangResult<Flow> {
        match std::mem::replace(&mut self.control, Control::None) {
            Control::None => Ok(Flow::Stop),
            Control::Return(value) => Ok(Flow::Return(value)),
            Control::Break => Ok(Flow::Break),
            Control::Continue => Ok(Flow::Continue),
            Control::Throw(err) => Err(err),
        }
    }

    /// The value an expression- or call-running VM produced
    pub fn into_value(mut self) -> LangResult<Val> {
        self.take_value()
    }

    fn take_value(&mut self) -> LangResult<Val> {
        match std::mem::replace(&mut self.control, Control::None) {
            Control::Throw(err) => Err(err),
            Control::Return(value) => Ok(value),
            _ => Ok(self.take_slot()),
        }
    }
}

impl Resumable for Vm {
    fn resume(&mut self) -> Poll {
        loop {
            match step(self) {
                Step::Continue => continue,
                Step::Yield => return Poll::Suspended,
                Step::Done => return Poll::Done(self.take_value()),
            }
        }
    }
}

impl Drop for Vm {
    /// A VM dropped mid-execution (shutdown) must not leave blocks locked
    fn drop(&mut self) {
        for frame in &self.frames {
            if let Some(lock) = &frame.lock {
                lock.release();
            }
        }
    }
}
