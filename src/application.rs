//! The runtime instance
//!
//! A [`Runtime`] owns everything one program run needs: the immutable registry, the global
//! scope, the background scheduler and the output sink. Every VM (main program or background
//! task) holds the shared [`RuntimeContext`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::executor::errors::{ErrorKind, LangError, LangResult};
use crate::executor::scope::Scope;
use crate::executor::suggest::closest;
use crate::executor::types::{Body, Expression, Flow, Val};
use crate::executor::vm::{Mode, Vm};
use crate::output::Output;
use crate::program::Program;
use crate::scheduler::task::panic_message;
use crate::scheduler::TaskScheduler;

/// State shared by every VM of one runtime
pub struct RuntimeContext {
    pub program: Program,
    pub globals: Arc<Scope>,
    pub scheduler: TaskScheduler,
    pub config: RuntimeConfig,
    pub output: Arc<dyn Output>,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("file", &self.program.file())
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug)]
pub struct Runtime {
    ctx: Arc<RuntimeContext>,
}

impl Runtime {
    /// Create a runtime (pure instantiation: workers start on first use)
    pub fn new(program: Program, config: RuntimeConfig, output: Arc<dyn Output>) -> Self {
        let scheduler = TaskScheduler::new(&config);
        Self {
            ctx: Arc::new(RuntimeContext {
                program,
                globals: Scope::root("global"),
                scheduler,
                config,
                output,
            }),
        }
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    pub fn program(&self) -> &Program {
        &self.ctx.program
    }

    pub fn globals(&self) -> &Arc<Scope> {
        &self.ctx.globals
    }

    /// Run the program's main statements in the global scope
    pub fn run_main(&self) -> LangResult<Flow> {
        info!(file = %self.ctx.program.file(), "running program");
        let main = Arc::clone(self.ctx.program.main());
        let flow = self.execute(&main);
        match &flow {
            Ok(flow) => debug!(?flow, "program finished"),
            Err(err) => debug!(code = err.code(), "program failed"),
        }
        flow
    }

    /// Run a statement list in the global scope on the calling thread
    pub fn execute(&self, body: &Body) -> LangResult<Flow> {
        let ctx = Arc::clone(&self.ctx);
        let body = Arc::clone(body);
        self.guarded(move || {
            let mut vm = Vm::for_body(ctx, &body, Mode::Sync);
            vm.run();
            vm.into_flow()
        })
    }

    /// Evaluate expression text against the global scope
    pub fn evaluate(&self, text: &str) -> LangResult<Val> {
        let expr = Expression::parse(text).map_err(|err| LangError::syntax(err.to_string()))?;
        let ctx = Arc::clone(&self.ctx);
        self.guarded(move || {
            let globals = Arc::clone(&ctx.globals);
            crate::executor::evaluate(&expr, &globals, &ctx)
        })
    }

    /// Call a registered procedure or class with already evaluated arguments
    pub fn call(&self, name: &str, args: Vec<Val>) -> LangResult<Val> {
        let program = &self.ctx.program;
        let callee = program
            .lookup(name)
            .ok_or_else(|| LangError::name_not_defined(name, &closest(name, &program.names())))?;
        let ctx = Arc::clone(&self.ctx);
        let globals = Arc::clone(&self.ctx.globals);
        self.guarded(move || {
            let mut vm = Vm::for_call(ctx, callee, args, globals, Mode::Sync);
            vm.run();
            vm.into_value()
        })
    }

    /// Stop the background workers; pending tasks are abandoned
    pub fn shutdown(&self) {
        self.ctx.scheduler.shutdown();
    }

    /// Turn a host panic into an internal error unless running in debug mode
    fn guarded<T>(&self, run: impl FnOnce() -> LangResult<T>) -> LangResult<T> {
        match panic::catch_unwind(AssertUnwindSafe(run)) {
            Ok(result) => result,
            Err(payload) if self.ctx.config.debug => panic::resume_unwind(payload),
            Err(payload) => Err(LangError::new(
                ErrorKind::Internal,
                panic_message(payload.as_ref()),
            )),
        }
    }
}

impl Drop for Runtime {
    /// Background VMs hold the context; stopping the workers drops them
    fn drop(&mut self) {
        self.shutdown();
    }
}
