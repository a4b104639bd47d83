//! Expression evaluation
//!
//! An [`EvalFrame`] walks the postfix items of one compiled expression over its operand
//! stack. Calls of procedures, methods and classes are not executed inline: the frame pushes a
//! call frame above itself and picks the result up from the VM slot when it resumes. Extensions
//! are called inline.
//!
//! `wait` is the only place an expression can yield: in cooperative mode it returns a
//! checkpoint without advancing, in sync mode it spins (sleeping every N polls).

use std::sync::Arc;
use std::time::Duration;

use super::classes::{ClassInstance, MESSAGE_FIELD};
use super::errors::{ErrorKind, LangError, LangResult};
use super::exec_loop::run_until_done;
use super::operators;
use super::scope::Scope;
use super::statements::undefined;
use super::suggest;
use super::types::{
    BoundMethod, CallFrame, CallPhase, ConstructFrame, ConstructPhase, DeferredCall, EvalFrame,
    Expression, Frame, FrameKind, Operand, Operator, Val,
};
use super::vm::{Mode, Step, Vm};
use crate::application::RuntimeContext;
use crate::compiler::Rpn;
use crate::scheduler::task::double_wait;

/* ===================== Public API ===================== */

/// Evaluate an expression against `scope` on the calling thread
pub fn evaluate(
    expr: &Expression,
    scope: &Arc<Scope>,
    ctx: &Arc<RuntimeContext>,
) -> LangResult<Val> {
    let compiled = expr.compiled()?;
    let mut vm = Vm::for_expression(Arc::clone(ctx), compiled, Arc::clone(scope), Mode::Sync);
    run_until_done(&mut vm);
    vm.into_value()
}

/// A cooperative machine evaluating an expression; drive it with
/// [`Resumable::resume`](crate::scheduler::Resumable::resume)
pub fn evaluate_resumable(
    expr: &Expression,
    scope: &Arc<Scope>,
    ctx: &Arc<RuntimeContext>,
) -> LangResult<Vm> {
    let compiled = expr.compiled()?;
    Ok(Vm::for_expression(
        Arc::clone(ctx),
        compiled,
        Arc::clone(scope),
        Mode::Cooperative,
    ))
}

/* ===================== Expression Frames ===================== */

fn pop_value(frame: &mut EvalFrame) -> LangResult<Val> {
    match frame.stack.pop() {
        Some(Operand::Value(value)) => Ok(value),
        other => Err(LangError::invalid_expression(format!(
            "expected a value on the operand stack, found {:?}",
            other
        ))),
    }
}

/// Unboxed arguments back to the last argument marker
fn pop_args(frame: &mut EvalFrame) -> LangResult<Vec<Val>> {
    let mut args = Vec::new();
    loop {
        match frame.stack.pop() {
            Some(Operand::Value(value)) => args.push(value.unboxed()),
            Some(Operand::ArgsMark) => break,
            other => {
                return Err(LangError::invalid_expression(format!(
                    "malformed argument list near {:?}",
                    other
                )))
            }
        }
    }
    args.reverse();
    Ok(args)
}

/// Outcome of one postfix item
enum Item {
    Next,
    /// Run a call frame above this one; its result arrives in the slot
    Call { callee: Val, args: Vec<Val> },
    /// Re-run the same item later (`wait` on an unfinished task)
    Poll,
}

pub fn eval_step(vm: &mut Vm, mut frame: EvalFrame) -> Step {
    if frame.awaiting {
        frame.awaiting = false;
        let value = vm.take_slot();
        frame.stack.push(Operand::Value(value));
    }

    let expr = Arc::clone(&frame.expr);
    while let Some(item) = expr.items.get(frame.pc) {
        match eval_item(vm, &mut frame, item) {
            Ok(Item::Next) => frame.pc += 1,
            Ok(Item::Call { callee, args }) => {
                frame.pc += 1;
                frame.awaiting = true;
                vm.restore(FrameKind::Eval(frame));
                vm.push_call(callee, args, Some(expr.location.clone()));
                return Step::Continue;
            }
            Ok(Item::Poll) => return poll(vm, frame),
            Err(err) => return vm.throw(err.at(&expr.location)),
        }
    }

    let result = pop_value(&mut frame).and_then(|value| {
        if frame.stack.is_empty() {
            Ok(value.unboxed())
        } else {
            Err(LangError::invalid_expression(format!(
                "{} operand(s) left over",
                frame.stack.len()
            )))
        }
    });
    match result {
        Ok(value) => vm.finish_with(value),
        Err(err) => vm.throw(err.at(&expr.location)),
    }
}

/// `wait` hit an unfinished task
fn poll(vm: &mut Vm, mut frame: EvalFrame) -> Step {
    frame.polls = frame.polls.wrapping_add(1);
    let sleep = frame.polls % vm.ctx.config.wait_sleep_every.max(1) == 0;
    let pause = Duration::from_micros(vm.ctx.config.wait_sleep_us);
    vm.restore(FrameKind::Eval(frame));

    if sleep {
        std::thread::sleep(pause);
    }
    match vm.mode {
        Mode::Cooperative => Step::Yield,
        Mode::Sync => {
            if !sleep {
                std::thread::yield_now();
            }
            Step::Continue
        }
    }
}

fn eval_item(vm: &mut Vm, frame: &mut EvalFrame, item: &Rpn) -> LangResult<Item> {
    match item {
        Rpn::Push(value) => frame.stack.push(Operand::Value(value.clone())),

        Rpn::Load(name) => {
            let value = resolve(vm, name)?;
            let value = match value {
                Val::Extension(ext) if ext.arity().auto_invoke => ext.call(&[])?,
                other => other,
            };
            frame.stack.push(Operand::Value(value));
        }

        Rpn::Attr(name) => frame.stack.push(Operand::Attr(name.clone())),

        Rpn::ArgsStart => frame.stack.push(Operand::ArgsMark),

        Rpn::Call { name, deferred } => {
            let args = pop_args(frame)?;
            let callee = resolve(vm, name)?;
            return call(frame, callee, args, *deferred);
        }

        Rpn::Invoke { deferred } => {
            let args = pop_args(frame)?;
            let callee = pop_value(frame)?.unboxed();
            return call(frame, callee, args, *deferred);
        }

        Rpn::Op(Operator::Dot) => {
            let Some(Operand::Attr(name)) = frame.stack.pop() else {
                return Err(LangError::invalid_expression("'.' without a field name"));
            };
            let object = pop_value(frame)?;
            frame.stack.push(Operand::Value(attribute(object, &name)?));
        }

        Rpn::Op(Operator::Background) => {
            let Val::Deferred(deferred) = pop_value(frame)? else {
                return Err(LangError::invalid_type(
                    "'in background' can only schedule a call",
                ));
            };
            let task = schedule(vm, &deferred)?;
            frame.stack.push(Operand::Value(Val::Task(task)));
        }

        Rpn::Op(Operator::Wait) => return wait(frame),

        Rpn::Op(op) if op.is_prefix() => {
            let operand = pop_value(frame)?;
            frame.stack.push(Operand::Value(operators::unary(*op, operand)?));
        }

        Rpn::Op(op) => {
            let right = pop_value(frame)?;
            let left = pop_value(frame)?;
            frame
                .stack
                .push(Operand::Value(operators::binary(*op, left, right)?));
        }
    }
    Ok(Item::Next)
}

/// Scope chain first, then the program registry
fn resolve(vm: &Vm, name: &str) -> LangResult<Val> {
    vm.scopes
        .current()
        .lookup(name)
        .or_else(|| vm.ctx.program.lookup(name))
        .ok_or_else(|| undefined(vm, name))
}

/// Field or method of an object
fn attribute(object: Val, name: &str) -> LangResult<Val> {
    match object.unboxed() {
        Val::Instance(instance) => {
            if let Some(field) = instance.field(name) {
                return Ok(Val::Field(field));
            }
            if let Some(method) = instance.method(name) {
                return Ok(Val::Method(BoundMethod {
                    receiver: instance,
                    method,
                }));
            }
            let owner = format!("{} instance", instance.class().name);
            Err(missing_field(name, &owner, &instance.member_names()))
        }
        Val::Record(record) => record.field(name).ok_or_else(|| {
            let mut known: Vec<String> = record.fields.keys().cloned().collect();
            known.sort();
            missing_field(name, &format!("{} '{}'", record.kind, record.name), &known)
        }),
        other => Err(LangError::invalid_type(format!(
            "cannot read field '{}' of {}",
            name,
            other.type_name()
        ))),
    }
}

fn missing_field(name: &str, owner: &str, known: &[String]) -> LangError {
    let mut err = LangError::field_not_defined(name, owner);
    let close = suggest::closest(name, known);
    if !close.is_empty() {
        err.message = format!("{}; did you mean: {}?", err.message, close.join(", "));
    }
    err
}

/// Start a call: extensions run inline, everything else gets a call frame
fn call(
    frame: &mut EvalFrame,
    callee: Val,
    args: Vec<Val>,
    deferred: bool,
) -> LangResult<Item> {
    if !callee.is_callable() {
        return Err(LangError::invalid_type(format!(
            "{} '{}' is not callable",
            callee.type_name(),
            callee
        )));
    }

    if deferred {
        frame
            .stack
            .push(Operand::Value(Val::Deferred(Arc::new(DeferredCall {
                callee,
                args,
            }))));
        return Ok(Item::Next);
    }

    if let Val::Extension(ext) = &callee {
        ext.arity().check(ext.name(), args.len())?;
        frame.stack.push(Operand::Value(ext.call(&args)?));
        return Ok(Item::Next);
    }

    Ok(Item::Call { callee, args })
}

fn task_label(callee: &Val) -> String {
    match callee {
        Val::Procedure(p) => p.name.clone(),
        Val::Method(bound) => bound.method.name.clone(),
        Val::Class(class) => class.name.clone(),
        Val::Extension(ext) => ext.name().to_string(),
        other => other.to_string(),
    }
}

fn schedule(vm: &Vm, deferred: &DeferredCall) -> LangResult<crate::scheduler::TaskHandle> {
    let machine = Vm::for_call(
        Arc::clone(&vm.ctx),
        deferred.callee.clone(),
        deferred.args.clone(),
        Arc::clone(vm.scopes.current()),
        Mode::Cooperative,
    );
    vm.ctx
        .scheduler
        .schedule(&task_label(&deferred.callee), Box::new(machine))
}

/// `wait`: claim a finished task's outcome, or poll again
fn wait(frame: &mut EvalFrame) -> LangResult<Item> {
    let task = match frame.stack.last() {
        Some(Operand::Value(value)) => match value.clone().unboxed() {
            Val::Task(task) => task,
            other => {
                return Err(LangError::invalid_type(format!(
                    "cannot wait for {}",
                    other.type_name()
                )))
            }
        },
        _ => return Err(LangError::invalid_expression("'wait' without an operand")),
    };

    if task.is_waited() {
        return Err(double_wait(&task));
    }
    if !task.is_done() {
        return Ok(Item::Poll);
    }

    frame.stack.pop();
    frame.polls = 0;
    // The task's own error keeps the location it was raised at
    let value = task.claim()??;
    frame.stack.push(Operand::Value(value));
    Ok(Item::Next)
}

/* ===================== Call Frames ===================== */

pub fn call_step(vm: &mut Vm, mut frame: CallFrame) -> Step {
    let located = |err: LangError, frame: &CallFrame| match &frame.location {
        Some(location) => err.at(location),
        None => err,
    };

    let procedure = match &frame.callee {
        Val::Procedure(p) => Arc::clone(p),
        Val::Method(bound) => Arc::clone(&bound.method),
        Val::Extension(ext) => {
            // Only reached for background calls; inline calls never push a frame
            let result = ext
                .arity()
                .check(ext.name(), frame.args.len())
                .and_then(|()| ext.call(&frame.args));
            return match result {
                Ok(value) => vm.finish_with(value),
                Err(err) => vm.throw(located(err, &frame)),
            };
        }
        Val::Class(class) => {
            let class = Arc::clone(class);
            vm.restore(FrameKind::Construct(ConstructFrame {
                class,
                args: std::mem::take(&mut frame.args),
                instance: None,
                consumed: 0,
                location: frame.location.take(),
                phase: ConstructPhase::Start,
            }));
            return Step::Continue;
        }
        other => {
            let err = LangError::invalid_type(format!("{} is not callable", other.type_name()));
            return vm.throw(located(err, &frame));
        }
    };

    match frame.phase {
        CallPhase::Bind => {
            let supplied = frame.args.len();
            if supplied < procedure.required() || supplied > procedure.params.len() {
                let err = LangError::argument_count(
                    &procedure.name,
                    &procedure.describe_arity(),
                    supplied,
                );
                return vm.throw(located(err, &frame));
            }
            frame.phase = if supplied < procedure.params.len() {
                CallPhase::Default {
                    next: supplied,
                    pending: false,
                }
            } else {
                CallPhase::Enter
            };
            vm.restore(FrameKind::Call(frame));
            Step::Continue
        }

        CallPhase::Default { next, pending } => {
            let mut next = next;
            if pending {
                frame.args.push(vm.take_slot());
                next += 1;
            }
            let Some(param) = procedure.params.get(next) else {
                frame.phase = CallPhase::Enter;
                vm.restore(FrameKind::Call(frame));
                return Step::Continue;
            };
            let compiled = match &param.default {
                Some(default) => default.compiled(),
                None => Err(LangError::internal(format!(
                    "parameter '{}' of '{}' has no default",
                    param.name, procedure.name
                ))),
            };
            match compiled {
                Ok(compiled) => {
                    frame.phase = CallPhase::Default {
                        next,
                        pending: true,
                    };
                    vm.restore(FrameKind::Call(frame));
                    // Defaults see the caller's scope: no scope has been pushed yet
                    vm.push_eval(compiled);
                    Step::Continue
                }
                Err(err) => vm.throw(located(err, &frame)),
            }
        }

        CallPhase::Enter => {
            let limit = vm.ctx.config.recursion_limit;
            if vm.call_depth >= limit {
                let err = LangError::new(
                    ErrorKind::RecursionLimit,
                    format!(
                        "maximum recursion depth of {} exceeded calling '{}'",
                        limit, procedure.name
                    ),
                );
                return vm.throw(located(err, &frame));
            }

            let scope = Scope::child(&vm.ctx.globals, procedure.name.as_str());
            for (param, arg) in procedure.params.iter().zip(frame.args.drain(..)) {
                scope.define(&param.name, arg);
            }
            if let Val::Method(bound) = &frame.callee {
                scope.define("this", Val::Instance(Arc::clone(&bound.receiver)));
            }

            frame.phase = CallPhase::Running;
            vm.restore(FrameKind::Call(frame));
            vm.scopes.push(scope);
            vm.call_depth += 1;
            if let Some(top) = vm.top_mut() {
                top.pushed_scope = true;
                top.boundary = true;
            }
            vm.frames.push(Frame::new(FrameKind::Body {
                body: Arc::clone(&procedure.body),
                idx: 0,
                checkpoint: false,
            }));
            Step::Continue
        }

        // The body ran off its end
        CallPhase::Running => vm.finish_with(Val::Null),
    }
}

/* ===================== Construction ===================== */

pub fn construct_step(vm: &mut Vm, mut frame: ConstructFrame) -> Step {
    let located = |err: LangError, frame: &ConstructFrame| match &frame.location {
        Some(location) => err.at(location),
        None => err,
    };

    match frame.phase {
        ConstructPhase::Start => {
            let class = Arc::clone(&frame.class);
            let instance = ClassInstance::new(&class);

            if class.native {
                if frame.args.len() > 1 {
                    let err = LangError::argument_count(&class.name, "0 to 1", frame.args.len());
                    return vm.throw(located(err, &frame));
                }
                let message = match frame.args.first() {
                    Some(message) => message.to_string(),
                    None => class
                        .error_root
                        .unwrap_or(ErrorKind::Error)
                        .default_message()
                        .to_string(),
                };
                instance.set_field(MESSAGE_FIELD, Val::Str(message));
                return vm.finish_with(Val::Instance(instance));
            }

            frame.instance = Some(instance);
            match &class.parent {
                Some(parent) => {
                    let consumed = parent.constructor_arity().min(frame.args.len());
                    let parent_frame = ConstructFrame {
                        class: Arc::clone(parent),
                        args: frame.args[..consumed].to_vec(),
                        instance: None,
                        consumed: 0,
                        location: frame.location.clone(),
                        phase: ConstructPhase::Start,
                    };
                    frame.consumed = consumed;
                    frame.phase = ConstructPhase::Parent;
                    vm.restore(FrameKind::Construct(frame));
                    vm.frames
                        .push(Frame::new(FrameKind::Construct(parent_frame)));
                }
                None => {
                    frame.phase = ConstructPhase::Own;
                    vm.restore(FrameKind::Construct(frame));
                }
            }
            Step::Continue
        }

        ConstructPhase::Parent => {
            if let (Val::Instance(parent), Some(instance)) = (vm.take_slot(), &frame.instance) {
                instance.adopt_parent(parent);
            }
            frame.phase = ConstructPhase::Own;
            vm.restore(FrameKind::Construct(frame));
            Step::Continue
        }

        ConstructPhase::Own => {
            let Some(instance) = frame.instance.clone() else {
                return vm.throw(LangError::internal("constructor ran without an instance"));
            };
            match frame.class.constructor.clone() {
                Some(constructor) => {
                    let args = frame.args.clone();
                    let location = frame.location.clone();
                    frame.phase = ConstructPhase::Finish;
                    vm.restore(FrameKind::Construct(frame));
                    vm.push_call(
                        Val::Method(BoundMethod {
                            receiver: instance,
                            method: constructor,
                        }),
                        args,
                        location,
                    );
                    Step::Continue
                }
                None if frame.args.len() > frame.consumed => {
                    let err = LangError::argument_count(
                        &frame.class.name,
                        &frame.consumed.to_string(),
                        frame.args.len(),
                    );
                    vm.throw(located(err, &frame))
                }
                None => vm.finish_with(Val::Instance(instance)),
            }
        }

        ConstructPhase::Finish => {
            // Whatever the constructor returned is discarded
            vm.take_slot();
            match frame.instance.take() {
                Some(instance) => vm.finish_with(Val::Instance(instance)),
                None => vm.throw(LangError::internal("constructor ran without an instance")),
            }
        }
    }
}
