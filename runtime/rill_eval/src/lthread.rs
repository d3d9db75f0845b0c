//! LThreads: lightweight logical threads.
//!
//! An LThread is a cooperative unit of execution with its own Context
//! (child of the spawner's), its own evaluator stack and a result slot.
//! LThreads progress in parallel on host threads; each evaluates
//! single-threaded.
//!
//! Spawn contract: only explicitly passed globals cross the boundary
//! (plus built-in start constants); every transferred value must be
//! sharable or clonable; the permission envelope must be covered by the
//! spawner's own permissions.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use rill_core::{
    CancellationReason, ChildContextParams, Context, Permission, LTHREAD_COUNT_LIMIT,
};
use rill_ir::{Module, Name, NodeId};
use rill_values::{FunctionValue, HostFunction, HostReturn, Value};

use crate::debugger::Debugger;
use crate::errors::{EvalError, EvalErrorKind};
use crate::interpreter::Evaluator;
use crate::state::{GlobalKind, GlobalState};

/// What kind of spawn this is; module imports skip the lthread-create
/// permission and count limit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpawnKind {
    UserSpawn,
    ModuleImport,
}

/// Arguments for [`spawn_lthread`].
pub struct LThreadSpawnArgs {
    pub parent_state: Arc<GlobalState>,
    /// The module evaluated by the new thread.
    pub module: Arc<Module>,
    /// The body node within the module's main chunk; `None` runs the
    /// module's top level.
    pub body: Option<NodeId>,
    /// Globals passed explicitly, already prepared by
    /// `share_or_clone`.
    pub globals: Vec<(Name, Value)>,
    /// Permission envelope; must already be covered by the spawner.
    pub permissions: Vec<Permission>,
    /// Extra limits for the child context (module-manifest limits).
    pub extra_limits: Vec<rill_core::Limit>,
    /// Whether the child inherits the spawner's named patterns.
    pub inherit_patterns: bool,
    pub group: Option<LThreadGroup>,
    pub debugger: Option<Arc<Debugger>>,
    pub kind: SpawnKind,
}

struct LThreadInner {
    name: String,
    context: Context,
    result_rx: Receiver<Result<Value, EvalError>>,
    result: Mutex<Option<Result<Value, EvalError>>>,
}

/// Handle to a spawned LThread.
#[derive(Clone)]
pub struct LThread {
    inner: Arc<LThreadInner>,
}

impl LThread {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Cancel the LThread's context.
    pub fn cancel(&self) {
        self.inner.context.cancel(CancellationReason::UserRequested);
    }

    pub fn is_done(&self) -> bool {
        self.inner.result.lock().is_some() || !self.inner.result_rx.is_empty()
    }

    /// Block until the thread finishes and return its result.
    ///
    /// The result is memoized: every later call observes the same value.
    /// Cancellation of `waiter` aborts the wait.
    pub fn wait_result(&self, waiter: &Context) -> Result<Value, EvalError> {
        {
            let slot = self.inner.result.lock();
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
        }
        loop {
            match self
                .inner
                .result_rx
                .recv_timeout(std::time::Duration::from_millis(20))
            {
                Ok(result) => {
                    *self.inner.result.lock() = Some(result.clone());
                    return result;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if waiter.is_cancelled() {
                        let reason = waiter
                            .cancellation_reason()
                            .unwrap_or(CancellationReason::UserRequested);
                        return Err(EvalError::from(reason));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // The worker died without draining its slot.
                    let result = Err(EvalError::new(
                        EvalErrorKind::InvalidNode("lthread terminated abnormally".into()),
                        format!("lthread `{}` terminated abnormally", self.inner.name),
                    ));
                    *self.inner.result.lock() = Some(result.clone());
                    return result;
                }
            }
        }
    }

    /// Expose the handle to script code as an object with host methods.
    pub fn as_value(&self) -> Value {
        let wait_handle = self.clone();
        let wait_result = HostFunction::new("wait_result", 0, move |host_ctx, _args| {
            let Some(ctx) = host_ctx.as_any().downcast_ref::<Context>() else {
                return Err("wait_result requires a rill context".to_owned());
            };
            match wait_handle.wait_result(ctx) {
                Ok(value) => Ok(HostReturn::Two(value, Value::Nil)),
                Err(e) => Ok(HostReturn::Two(Value::Nil, e.to_value())),
            }
        });
        let cancel_handle = self.clone();
        let cancel = HostFunction::new("cancel", 0, move |_ctx, _args| {
            cancel_handle.cancel();
            Ok(HostReturn::Void)
        });
        // Key validation cannot fail on these literal names.
        Value::object(vec![
            (
                "wait_result".to_owned(),
                Value::Function(FunctionValue::Host(wait_result)),
            ),
            (
                "cancel".to_owned(),
                Value::Function(FunctionValue::Host(cancel)),
            ),
        ])
        .unwrap_or(Value::Nil)
    }
}

/// A named aggregate of LThreads, attached at spawn time.
#[derive(Clone, Default)]
pub struct LThreadGroup {
    threads: Arc<Mutex<Vec<LThread>>>,
}

impl LThreadGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, thread: LThread) {
        self.threads.lock().push(thread);
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }

    /// Block until every member finishes; returns the ordered results.
    ///
    /// The first member error is propagated.
    pub fn wait_results(&self, waiter: &Context) -> Result<Vec<Value>, EvalError> {
        let threads: Vec<LThread> = self.threads.lock().clone();
        let mut results = Vec::with_capacity(threads.len());
        for thread in &threads {
            results.push(thread.wait_result(waiter)?);
        }
        Ok(results)
    }

    pub fn cancel_all(&self) {
        for thread in self.threads.lock().iter() {
            thread.cancel();
        }
    }
}

/// Spawn an LThread evaluating a module (or a body node within it) in a
/// fresh child context.
pub fn spawn_lthread(args: LThreadSpawnArgs) -> Result<LThread, EvalError> {
    let parent_ctx = args.parent_state.context.clone();
    let counted = args.kind == SpawnKind::UserSpawn;

    if counted {
        parent_ctx.check_permission(&Permission::LThreadCreate)?;
        parent_ctx.take(LTHREAD_COUNT_LIMIT, 1)?;
    }

    let child_ctx = match parent_ctx.child(ChildContextParams {
        granted: args.permissions,
        extra_limits: args.extra_limits,
        inherit_patterns: args.inherit_patterns,
    }) {
        Ok(ctx) => ctx,
        Err(e) => {
            if counted {
                parent_ctx.give_back(LTHREAD_COUNT_LIMIT, 1);
            }
            return Err(e.into());
        }
    };

    let module = Arc::clone(&args.module);
    let child_state = GlobalState::new(
        module,
        child_ctx.clone(),
        args.parent_state.interner.clone(),
    );

    // Built-in start constants are inherited; named module constants and
    // implicit globals are not. Inherited values obey the same transfer
    // discipline as passed globals.
    for (name, value) in args.parent_state.globals.start_constants() {
        let Ok(prepared) = rill_values::share_or_clone(&value) else {
            continue;
        };
        child_state
            .globals
            .set(name, prepared, GlobalKind::StartConstant);
    }
    for (name, value) in args.globals {
        child_state.globals.set(name, value, GlobalKind::Regular);
    }
    if let Some(debugger) = args.debugger {
        child_state.attach_debugger(debugger);
    }

    let (result_tx, result_rx) = bounded(1);
    let body = args.body;
    let thread_name = args.module.name.clone();
    let worker_state = Arc::clone(&child_state);
    let worker_parent_ctx = parent_ctx.clone();
    std::thread::Builder::new()
        .name(format!("lthread-{thread_name}"))
        .spawn(move || {
            tracing::debug!(lthread = %thread_name, "lthread started");
            let result = match body {
                Some(body) => Evaluator::run_body(&worker_state, body),
                None => Evaluator::run_module(&worker_state),
            };
            // On failure the context's transaction has already been rolled
            // back by cancellation or by the evaluator; drain into the slot.
            if result.is_err() && worker_state.context.current_transaction().is_some() {
                let _ = worker_state.context.rollback_transaction();
            }
            if counted {
                worker_parent_ctx.give_back(LTHREAD_COUNT_LIMIT, 1);
            }
            tracing::debug!(lthread = %thread_name, ok = result.is_ok(), "lthread finished");
            let _ = result_tx.send(result);
        })
        .map_err(|e| {
            EvalError::new(
                EvalErrorKind::InvalidNode("spawn failed".into()),
                format!("could not spawn lthread: {e}"),
            )
        })?;

    let lthread = LThread {
        inner: Arc::new(LThreadInner {
            name: args.module.name.clone(),
            context: child_ctx,
            result_rx,
            result: Mutex::new(None),
        }),
    };
    if let Some(group) = args.group {
        group.add(lthread.clone());
    }
    Ok(lthread)
}
