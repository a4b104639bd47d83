//! Statement execution handlers
//!
//! Each statement type has its own handler that processes the statement based on its current
//! execution phase. A handler receives the frame kind taken out of the top frame and must
//! either put an updated kind back with [`Vm::restore`] or pop the frame.

use std::sync::Arc;

use super::classes;
use super::errors::{LangError, SourceLocation};
use super::suggest;
use super::types::{
    AssignTarget, BlockLock, Body, Control, ExclusivePhase, Expression, Frame, FrameKind, IfPhase,
    RepeatPhase, Statement, StmtRef, TryPhase, Val, ValuePhase, WhilePhase,
};
use super::vm::{Mode, Step, Vm};

/* ===================== Frame Creation ===================== */

/// Push a frame for one statement
pub fn push_stmt(vm: &mut Vm, at: StmtRef) {
    let kind = match at.stmt() {
        Statement::Declare { .. } => FrameKind::Declare {
            at,
            phase: ValuePhase::Eval,
        },
        Statement::Assign { .. } => FrameKind::Assign {
            at,
            phase: ValuePhase::Eval,
        },
        Statement::Print { .. } => FrameKind::Print {
            at,
            phase: ValuePhase::Eval,
        },
        Statement::Throw { .. } => FrameKind::Throw {
            at,
            phase: ValuePhase::Eval,
        },
        Statement::Return { .. } => FrameKind::Return {
            at,
            phase: ValuePhase::Eval,
        },
        Statement::Expr { .. } => FrameKind::Expr {
            at,
            phase: ValuePhase::Eval,
        },
        Statement::If { .. } => FrameKind::If {
            at,
            phase: IfPhase::Test(0),
        },
        Statement::Repeat { .. } => FrameKind::Repeat {
            at,
            phase: RepeatPhase::Start,
        },
        Statement::While { .. } => FrameKind::While {
            at,
            phase: WhilePhase::Test,
        },
        Statement::Try { .. } => FrameKind::Try {
            at,
            phase: TryPhase::Start,
        },
        Statement::Exclusive { lock, .. } => FrameKind::Exclusive {
            lock: Arc::clone(lock),
            at,
            phase: ExclusivePhase::Acquire,
        },
        Statement::Break => {
            vm.control = Control::Break;
            return;
        }
        Statement::Continue => {
            vm.control = Control::Continue;
            return;
        }
    };
    vm.frames.push(Frame::new(kind));
}

/// Compile `expr`, put `kind` back and push the expression above it
fn push_expression(vm: &mut Vm, expr: &Expression, kind: FrameKind) -> Step {
    match expr.compiled() {
        Ok(compiled) => {
            vm.restore(kind);
            vm.push_eval(compiled);
            Step::Continue
        }
        Err(err) => vm.throw(err),
    }
}

/* ===================== Bodies ===================== */

/// Execute the next statement of a statement list
///
/// In cooperative mode every completed statement is followed by one checkpoint.
pub fn execute_body(vm: &mut Vm, body: Body, idx: usize, checkpoint: bool) -> Step {
    if checkpoint && vm.mode == Mode::Cooperative {
        vm.restore(FrameKind::Body {
            body,
            idx,
            checkpoint: false,
        });
        return Step::Yield;
    }

    if idx >= body.len() {
        vm.pop_frame();
        return Step::Continue;
    }

    let at = StmtRef::new(&body, idx);
    vm.restore(FrameKind::Body {
        body,
        idx: idx + 1,
        checkpoint: true,
    });
    vm.push_stmt(at);
    Step::Continue
}

/* ===================== Single-Expression Statements ===================== */

fn value_expression(stmt: &Statement) -> Option<&Expression> {
    match stmt {
        Statement::Declare { value, .. }
        | Statement::Assign { value, .. }
        | Statement::Print { value }
        | Statement::Throw { value } => Some(value),
        Statement::Expr { expr } => Some(expr),
        Statement::Return { value } => value.as_ref(),
        _ => None,
    }
}

/// Declare, Assign, Print, Throw, Return and bare expressions
///
/// Phase `Eval` pushes the statement's expression; phase `Apply` acts on its value.
pub fn execute_value(vm: &mut Vm, kind: FrameKind) -> Step {
    let (at, phase) = match &kind {
        FrameKind::Declare { at, phase }
        | FrameKind::Assign { at, phase }
        | FrameKind::Print { at, phase }
        | FrameKind::Throw { at, phase }
        | FrameKind::Return { at, phase }
        | FrameKind::Expr { at, phase } => (at.clone(), *phase),
        _ => return vm.throw(LangError::internal("not a single-expression statement")),
    };

    match phase {
        ValuePhase::Eval => {
            let next = with_phase(kind, ValuePhase::Apply);
            match value_expression(at.stmt()) {
                Some(expr) => push_expression(vm, expr, next),
                None => {
                    // `return` without a value
                    vm.restore(next);
                    vm.slot = Some(Val::Null);
                    Step::Continue
                }
            }
        }
        ValuePhase::Apply => {
            let value = vm.take_slot();
            apply_value(vm, &at, value)
        }
    }
}

fn with_phase(kind: FrameKind, phase: ValuePhase) -> FrameKind {
    match kind {
        FrameKind::Declare { at, .. } => FrameKind::Declare { at, phase },
        FrameKind::Assign { at, .. } => FrameKind::Assign { at, phase },
        FrameKind::Print { at, .. } => FrameKind::Print { at, phase },
        FrameKind::Throw { at, .. } => FrameKind::Throw { at, phase },
        FrameKind::Return { at, .. } => FrameKind::Return { at, phase },
        FrameKind::Expr { at, .. } => FrameKind::Expr { at, phase },
        other => other,
    }
}

fn apply_value(vm: &mut Vm, at: &StmtRef, value: Val) -> Step {
    let location = value_expression(at.stmt()).map(|expr| expr.location().clone());
    let located = |err: LangError| match &location {
        Some(location) => err.at(location),
        None => err,
    };

    match at.stmt() {
        Statement::Declare { name, .. } => match vm.scopes.current().declare(name, value) {
            Ok(()) => finish(vm),
            Err(err) => vm.throw(located(err)),
        },

        Statement::Assign { target, .. } => match assign(vm, target, value) {
            Ok(()) => finish(vm),
            Err(err) => vm.throw(located(err)),
        },

        Statement::Print { .. } => {
            vm.ctx.output.print(&value.to_string());
            finish(vm)
        }

        Statement::Throw { .. } => {
            let err = classes::throwable(value).unwrap_or_else(|not_throwable| not_throwable);
            vm.throw(located(err))
        }

        Statement::Return { .. } => {
            vm.pop_frame();
            vm.control = Control::Return(value);
            Step::Continue
        }

        _ => finish(vm),
    }
}

fn finish(vm: &mut Vm) -> Step {
    vm.pop_frame();
    Step::Continue
}

/// Store into a bare name or a single-level field
fn assign(vm: &Vm, target: &AssignTarget, value: Val) -> Result<(), LangError> {
    let scope = vm.scopes.current();

    let Some(field) = &target.field else {
        if scope.assign(&target.name, value) {
            return Ok(());
        }
        return Err(undefined(vm, &target.name));
    };

    let owner = scope
        .lookup(&target.name)
        .or_else(|| vm.ctx.program.lookup(&target.name))
        .ok_or_else(|| undefined(vm, &target.name))?;

    match owner.unboxed() {
        Val::Instance(instance) => {
            instance.set_field(field, value);
            Ok(())
        }
        Val::Record(record) => Err(LangError::invalid_type(format!(
            "{} '{}' is read-only",
            record.kind, record.name
        ))),
        other => Err(LangError::invalid_type(format!(
            "cannot set field '{}' on {}",
            field,
            other.type_name()
        ))),
    }
}

/// `NameNotDefined` with suggestions from everything visible to the VM
pub fn undefined(vm: &Vm, name: &str) -> LangError {
    let mut visible = vm.scopes.current().visible_names();
    visible.extend(vm.ctx.program.names());
    LangError::name_not_defined(name, &suggest::suggest(name, &visible))
}

/* ===================== Control Flow Statements ===================== */

fn condition(value: Val, location: &SourceLocation) -> Result<bool, LangError> {
    match value.unboxed() {
        Val::Bool(b) => Ok(b),
        other => Err(LangError::invalid_type(format!(
            "condition must be a boolean, got {}",
            other.type_name()
        ))
        .at(location)),
    }
}

pub fn execute_if(vm: &mut Vm, at: StmtRef, phase: IfPhase) -> Step {
    let Statement::If {
        branches,
        otherwise,
    } = at.stmt()
    else {
        return vm.throw(LangError::internal("if frame without an if statement"));
    };

    match phase {
        IfPhase::Test(n) => match branches.get(n) {
            Some(branch) => {
                let test = branch.test.clone();
                push_expression(
                    vm,
                    &test,
                    FrameKind::If {
                        at: at.clone(),
                        phase: IfPhase::Check(n),
                    },
                )
            }
            None => match otherwise.clone() {
                Some(body) => {
                    vm.restore(FrameKind::If {
                        at: at.clone(),
                        phase: IfPhase::Done,
                    });
                    vm.push_block(&body, "else");
                    Step::Continue
                }
                None => finish(vm),
            },
        },

        IfPhase::Check(n) => {
            let branch = &branches[n];
            let value = vm.take_slot();
            match condition(value, branch.test.location()) {
                Ok(true) => {
                    let body = branch.body.clone();
                    vm.restore(FrameKind::If {
                        at: at.clone(),
                        phase: IfPhase::Done,
                    });
                    vm.push_block(&body, "if");
                    Step::Continue
                }
                Ok(false) => {
                    vm.restore(FrameKind::If {
                        at: at.clone(),
                        phase: IfPhase::Test(n + 1),
                    });
                    Step::Continue
                }
                Err(err) => vm.throw(err),
            }
        }

        IfPhase::Done => finish(vm),
    }
}

/// Loop bound: an integer, or a number without fractional part
fn whole_number(value: Val, location: &SourceLocation) -> Result<i64, LangError> {
    match value.unboxed() {
        Val::Int(i) => Ok(i),
        Val::Float(x) if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 => {
            Ok(x as i64)
        }
        other => Err(LangError::invalid_type(format!(
            "loop bounds must be whole numbers, got {} '{}'",
            other.type_name(),
            other
        ))
        .at(location)),
    }
}

pub fn execute_repeat(vm: &mut Vm, at: StmtRef, phase: RepeatPhase) -> Step {
    let Statement::Repeat {
        var,
        from,
        to,
        body,
    } = at.stmt()
    else {
        return vm.throw(LangError::internal("repeat frame without a repeat statement"));
    };

    match phase {
        RepeatPhase::Start => {
            let from = from.clone();
            push_expression(
                vm,
                &from,
                FrameKind::Repeat {
                    at: at.clone(),
                    phase: RepeatPhase::Lower,
                },
            )
        }

        RepeatPhase::Lower => {
            let value = vm.take_slot();
            let lower = match whole_number(value, from.location()) {
                Ok(lower) => lower,
                Err(err) => return vm.throw(err),
            };
            let to = to.clone();
            push_expression(
                vm,
                &to,
                FrameKind::Repeat {
                    at: at.clone(),
                    phase: RepeatPhase::Upper { lower },
                },
            )
        }

        RepeatPhase::Upper { lower } => {
            let value = vm.take_slot();
            match whole_number(value, to.location()) {
                Ok(upper) => {
                    vm.restore(FrameKind::Repeat {
                        at: at.clone(),
                        phase: RepeatPhase::Iterate { next: lower, upper },
                    });
                    Step::Continue
                }
                Err(err) => vm.throw(err),
            }
        }

        RepeatPhase::Iterate { next, upper } => {
            if next > upper {
                return finish(vm);
            }
            let following = match next.checked_add(1) {
                Some(following) => RepeatPhase::Iterate {
                    next: following,
                    upper,
                },
                None => RepeatPhase::Finished,
            };
            let body = body.clone();
            let var = var.clone();
            vm.restore(FrameKind::Repeat {
                at: at.clone(),
                phase: following,
            });
            vm.push_block(&body, "repeat");
            if let Some(var) = var {
                vm.scopes.current().define(&var, Val::Int(next));
            }
            iteration_checkpoint(vm)
        }

        RepeatPhase::Finished => finish(vm),
    }
}

/// Every loop iteration is a checkpoint, even one whose body completes no statement
fn iteration_checkpoint(vm: &Vm) -> Step {
    match vm.mode {
        Mode::Cooperative => Step::Yield,
        Mode::Sync => Step::Continue,
    }
}

pub fn execute_while(vm: &mut Vm, at: StmtRef, phase: WhilePhase) -> Step {
    let Statement::While { test, body } = at.stmt() else {
        return vm.throw(LangError::internal("while frame without a while statement"));
    };

    match phase {
        WhilePhase::Test => {
            let test = test.clone();
            push_expression(
                vm,
                &test,
                FrameKind::While {
                    at: at.clone(),
                    phase: WhilePhase::Check,
                },
            )
        }
        WhilePhase::Check => {
            let value = vm.take_slot();
            match condition(value, test.location()) {
                Ok(true) => {
                    let body = body.clone();
                    vm.restore(FrameKind::While {
                        at: at.clone(),
                        phase: WhilePhase::Test,
                    });
                    vm.push_block(&body, "while");
                    iteration_checkpoint(vm)
                }
                Ok(false) => finish(vm),
                Err(err) => vm.throw(err),
            }
        }
    }
}

/// Exception context; handlers are entered from the unwinder
pub fn execute_try(vm: &mut Vm, at: StmtRef, phase: TryPhase) -> Step {
    match phase {
        TryPhase::Start => {
            let Statement::Try { body, .. } = at.stmt() else {
                return vm.throw(LangError::internal("try frame without a try statement"));
            };
            let body = body.clone();
            vm.restore(FrameKind::Try {
                at,
                phase: TryPhase::Body,
            });
            vm.push_block(&body, "try");
            Step::Continue
        }
        TryPhase::Body | TryPhase::Handler => finish(vm),
    }
}

/// Mutual-exclusion block; the lock is released when the frame is popped, however that happens
pub fn execute_exclusive(
    vm: &mut Vm,
    at: StmtRef,
    lock: Arc<BlockLock>,
    phase: ExclusivePhase,
) -> Step {
    match phase {
        ExclusivePhase::Acquire => {
            if !lock.try_acquire() {
                vm.restore(FrameKind::Exclusive {
                    at,
                    lock,
                    phase: ExclusivePhase::Acquire,
                });
                return match vm.mode {
                    Mode::Cooperative => Step::Yield,
                    Mode::Sync => {
                        std::thread::yield_now();
                        Step::Continue
                    }
                };
            }

            let Statement::Exclusive { body, .. } = at.stmt() else {
                lock.release();
                return vm.throw(LangError::internal(
                    "exclusive frame without an exclusive statement",
                ));
            };
            let body = body.clone();
            vm.restore(FrameKind::Exclusive {
                at,
                lock: Arc::clone(&lock),
                phase: ExclusivePhase::Body,
            });
            if let Some(frame) = vm.top_mut() {
                frame.lock = Some(lock);
            }
            vm.push_block(&body, "exclusive");
            Step::Continue
        }
        ExclusivePhase::Body => finish(vm),
    }
}
