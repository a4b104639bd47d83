//! Core execution loop
//!
//! `step()` is the heart of the interpreter. It takes the kind of the top frame out of the
//! stack, hands it to the matching handler, and the handler either puts an updated kind back
//! (pushing children above it) or pops the frame.
//!
//! ## Function Organization
//! 1. run_until_done() - top-level driver (calls step repeatedly)
//! 2. step() - dispatches the top frame to its handler
//! 3. unwind() - propagates break/continue/return/throw down the stack

use std::sync::Arc;

use super::classes::{handler_matches, ClassInstance};
use super::errors::{LangError, TraceFrame};
use super::expressions::{call_step, construct_step, eval_step};
use super::statements::{
    execute_body, execute_exclusive, execute_if, execute_repeat, execute_try, execute_value,
    execute_while,
};
use super::types::{Control, FrameKind, Statement, StmtRef, TryPhase, Val};
use super::vm::{Step, Vm};

/* ===================== Public API ===================== */

/// Run the VM until it completes, or until it yields in cooperative mode
///
/// After completion, inspect `vm.control` and `vm.slot` for the final state.
pub fn run_until_done(vm: &mut Vm) -> Step {
    loop {
        match step(vm) {
            Step::Continue => continue,
            other => return other,
        }
    }
}

/// Execute one step of the VM
pub fn step(vm: &mut Vm) -> Step {
    if !vm.control.is_none() {
        return unwind(vm);
    }

    let Some(top) = vm.frames.last_mut() else {
        return Step::Done;
    };
    let kind = std::mem::replace(&mut top.kind, FrameKind::Vacant);

    match kind {
        FrameKind::Body {
            body,
            idx,
            checkpoint,
        } => execute_body(vm, body, idx, checkpoint),

        kind @ (FrameKind::Declare { .. }
        | FrameKind::Assign { .. }
        | FrameKind::Print { .. }
        | FrameKind::Throw { .. }
        | FrameKind::Return { .. }
        | FrameKind::Expr { .. }) => execute_value(vm, kind),

        FrameKind::If { at, phase } => execute_if(vm, at, phase),
        FrameKind::Repeat { at, phase } => execute_repeat(vm, at, phase),
        FrameKind::While { at, phase } => execute_while(vm, at, phase),
        FrameKind::Try { at, phase } => execute_try(vm, at, phase),
        FrameKind::Exclusive { at, lock, phase } => execute_exclusive(vm, at, lock, phase),

        FrameKind::Eval(frame) => eval_step(vm, frame),
        FrameKind::Call(frame) => call_step(vm, frame),
        FrameKind::Construct(frame) => construct_step(vm, frame),

        FrameKind::Vacant => vm.throw(LangError::internal("stepped into a vacant frame")),
    }
}

/* ===================== Control Flow ===================== */

/// What the top frame can do with active control flow
enum Target {
    Loop,
    Call(TraceFrame),
    Try(StmtRef),
    Other,
}

/// Pop frames until one handles the active control flow, or none are left
fn unwind(vm: &mut Vm) -> Step {
    let control = std::mem::replace(&mut vm.control, Control::None);

    let target = match vm.frames.last().map(|frame| &frame.kind) {
        None => {
            // Nothing handles it: the caller inspects the final control
            vm.control = control;
            return Step::Done;
        }
        Some(kind) if kind.is_loop() => Target::Loop,
        Some(FrameKind::Call(call)) => Target::Call(TraceFrame {
            procedure: match &call.callee {
                Val::Procedure(p) => p.name.clone(),
                Val::Method(bound) => bound.method.name.clone(),
                other => other.to_string(),
            },
            location: call.location.clone(),
        }),
        Some(FrameKind::Try {
            at,
            phase: TryPhase::Body,
        }) => Target::Try(at.clone()),
        Some(_) => Target::Other,
    };

    match (control, target) {
        (Control::Break, Target::Loop) => {
            vm.pop_frame();
            Step::Continue
        }

        // The loop frame already points at its next iteration
        (Control::Continue, Target::Loop) => Step::Continue,

        (control @ (Control::Break | Control::Continue), Target::Call(_)) => {
            let keyword = if matches!(control, Control::Break) {
                "break"
            } else {
                "continue"
            };
            vm.control = Control::Throw(LangError::syntax(format!(
                "'{}' outside of a loop",
                keyword
            )));
            Step::Continue
        }

        (Control::Return(value), Target::Call(_)) => vm.finish_with(value),

        (Control::Throw(err), Target::Call(trace)) => {
            vm.pop_frame();
            vm.control = Control::Throw(err.with_frame(trace));
            Step::Continue
        }

        (Control::Throw(err), Target::Try(at)) => catch(vm, at, err),

        (control, _) => {
            vm.pop_frame();
            vm.control = control;
            Step::Continue
        }
    }
}

/// Run the first handler of a `try` frame that matches `err`, or keep unwinding
fn catch(vm: &mut Vm, at: StmtRef, err: LangError) -> Step {
    let handler = match at.stmt() {
        Statement::Try { handlers, .. } => handlers
            .iter()
            .find(|handler| handler_matches(&handler.class, &err))
            .cloned(),
        _ => None,
    };
    let Some(handler) = handler else {
        vm.pop_frame();
        vm.control = Control::Throw(err);
        return Step::Continue;
    };

    let exception = match &err.payload {
        Some(instance) => Val::Instance(Arc::clone(instance)),
        None => {
            let program = &vm.ctx.program;
            let class = program
                .class(&err.class_name)
                .or_else(|| program.error_class(err.kind));
            match class {
                Some(class) => Val::Instance(ClassInstance::error(&class, &err.message)),
                None => Val::str(err.message.clone()),
            }
        }
    };

    vm.restore(FrameKind::Try {
        at,
        phase: TryPhase::Handler,
    });
    vm.push_block(&handler.body, "handler");
    if let Some(name) = &handler.binding {
        vm.scopes.current().define(name, exception);
    }
    Step::Continue
}
