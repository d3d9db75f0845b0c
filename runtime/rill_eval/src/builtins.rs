//! Built-in host functions registered as start constants.
//!
//! These are the host-provided functions the core needs for its own
//! semantics (sleeping, transactions, group joins). Embedders register
//! richer libraries the same way.

use std::sync::Arc;

use rill_core::Context;
use rill_values::{Duration, ErrorData, HostContext, HostFunction, HostReturn, Value};

use crate::lthread::LThreadGroup;
use crate::state::GlobalState;

fn context_of(host_ctx: &dyn HostContext) -> Result<&Context, String> {
    host_ctx
        .as_any()
        .downcast_ref::<Context>()
        .ok_or_else(|| "host function requires a rill context".to_owned())
}

fn error_value(id: &str, message: impl Into<String>) -> Value {
    Value::error(ErrorData::new(id, message))
}

/// Register the core prelude on a state.
///
/// Start constants are inherited by every spawned LThread, so the
/// prelude is available in children without explicit passing.
pub fn register_prelude(state: &GlobalState) {
    state.set_host_function(
        "sleep",
        HostFunction::new("sleep", 1, |host_ctx, args| {
            let ctx = context_of(host_ctx)?;
            let duration = match args.first() {
                Some(Value::Duration(d)) => *d,
                Some(Value::Int(n)) if n.raw() >= 0 => {
                    Duration::from_millis(n.raw().unsigned_abs())
                }
                _ => return Err("sleep expects a duration".to_owned()),
            };
            ctx.sleep_cancellable(duration);
            Ok(HostReturn::Void)
        }),
    );

    state.set_host_function(
        "start_tx",
        HostFunction::new("start_tx", 0, |host_ctx, _args| {
            let ctx = context_of(host_ctx)?;
            match ctx.start_transaction() {
                Ok(_) => Ok(HostReturn::Two(Value::Nil, Value::Nil)),
                Err(e) => Ok(HostReturn::Two(
                    Value::Nil,
                    error_value(e.id(), e.to_string()),
                )),
            }
        }),
    );

    state.set_host_function(
        "commit_tx",
        HostFunction::new("commit_tx", 0, |host_ctx, _args| {
            let ctx = context_of(host_ctx)?;
            match ctx.commit_transaction() {
                Ok(()) => Ok(HostReturn::Two(Value::Nil, Value::Nil)),
                Err(e) => Ok(HostReturn::Two(
                    Value::Nil,
                    error_value(e.id(), e.to_string()),
                )),
            }
        }),
    );

    state.set_host_function(
        "rollback_tx",
        HostFunction::new("rollback_tx", 0, |host_ctx, _args| {
            let ctx = context_of(host_ctx)?;
            match ctx.rollback_transaction() {
                Ok(()) => Ok(HostReturn::Two(Value::Nil, Value::Nil)),
                Err(e) => Ok(HostReturn::Two(
                    Value::Nil,
                    error_value(e.id(), e.to_string()),
                )),
            }
        }),
    );

    state.set_host_function(
        "wait_results",
        HostFunction::new("wait_results", 1, |host_ctx, args| {
            let ctx = context_of(host_ctx)?;
            let Some(name) = args.first().and_then(Value::as_str) else {
                return Err("wait_results expects a group name".to_owned());
            };
            // Groups live on the calling thread's own state.
            let group: LThreadGroup = {
                let state: Arc<GlobalState> = ctx
                    .global_state()
                    .and_then(|any| any.downcast::<GlobalState>().ok())
                    .ok_or_else(|| "no evaluator state on this context".to_owned())?;
                state.lthread_group(name)
            };
            match group.wait_results(ctx) {
                Ok(values) => Ok(HostReturn::Two(Value::list(values), Value::Nil)),
                Err(e) => Ok(HostReturn::Two(
                    Value::Nil,
                    error_value(e.id(), e.to_string()),
                )),
            }
        }),
    );
}
