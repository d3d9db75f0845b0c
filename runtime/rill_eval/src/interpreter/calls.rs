//! Function calls, must-call conversion, pipelines and extension access.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use rill_ir::{Name, Node, NodeId, Param};
use rill_values::{FunctionValue, HostFunction, HostReturn, ScriptFunction, Value};

use crate::errors::{EvalError, EvalErrorKind, EvalResult, EvalSignal};
use crate::interpreter::Evaluator;

impl Evaluator {
    /// Materialize a function value from a `FnExpr` node.
    ///
    /// Captured globals are frozen now, at definition time, and travel
    /// with the function — including across thread boundaries. Captured
    /// locals snapshot the closure environment.
    pub(crate) fn make_function(&self, id: NodeId, name: Option<Name>) -> Value {
        let chunk = Arc::clone(&self.chunk);
        let (captured_globals, captured_locals) = match chunk.node(id) {
            Some(Node::FnExpr {
                captured_globals,
                captured_locals,
                ..
            }) => {
                let mut globals = FxHashMap::default();
                for global in captured_globals {
                    if let Some(value) = self.lookup_global(*global) {
                        globals.insert(*global, value);
                    }
                }
                let mut locals = FxHashMap::default();
                for local in captured_locals {
                    if let Some(value) = self.lookup_local(*local) {
                        locals.insert(*local, value);
                    }
                }
                (globals, locals)
            }
            _ => (FxHashMap::default(), FxHashMap::default()),
        };
        Value::Function(FunctionValue::Script(Arc::new(ScriptFunction {
            name,
            node: id,
            chunk,
            captured_globals,
            captured_locals,
        })))
    }

    pub(crate) fn eval_fn_decl(&mut self, _id: NodeId, name: Name, function: NodeId) -> EvalResult {
        let value = self.make_function(function, Some(name));
        self.state
            .globals
            .set(name, value, crate::state::GlobalKind::Constant);
        Ok(Value::Nil)
    }

    pub(crate) fn eval_call_node(
        &mut self,
        id: NodeId,
        callee: NodeId,
        args: &[NodeId],
        spread_arg: Option<NodeId>,
        must: bool,
    ) -> EvalResult {
        // Extension calls bind `self` to the subject.
        let chunk = Arc::clone(&self.chunk);
        let (function, self_value) = match chunk.node(callee) {
            Some(Node::ExtensionAccess { subject, member }) => {
                let subject_value = self.eval_node(*subject)?;
                let method = self
                    .state
                    .resolve_extension_member(&subject_value, *member)
                    .ok_or_else(|| {
                        self.error(
                            id,
                            EvalErrorKind::ExtensionMemberNotFound(self.name_of(*member)),
                            format!("no extension member `{}`", self.name_of(*member)),
                        )
                    })?;
                (method.method, Some(subject_value))
            }
            _ => (self.eval_node(callee)?, None),
        };

        // Arguments evaluate left to right; the spread argument last.
        let mut arg_values = self.eval_list(args)?;
        let mut spread = false;
        if let Some(spread_node) = spread_arg {
            let spread_value = self.eval_node(spread_node)?;
            match spread_value {
                Value::List(list) => arg_values.extend(list.snapshot()),
                Value::Tuple(items) => arg_values.extend(items.iter().cloned()),
                other => {
                    return Err(self.error(
                        id,
                        EvalErrorKind::TypeMismatch {
                            expected: "list or tuple".into(),
                            got: other.type_name().into(),
                        },
                        "spread argument must be a list or tuple",
                    ))
                }
            }
            spread = true;
        }

        let result = self.call_value(id, &function, arg_values, self_value, spread)?;
        if must {
            self.convert_must(id, result)
        } else {
            Ok(result)
        }
    }

    /// Call any callable value.
    pub(crate) fn call_value(
        &mut self,
        call_node: NodeId,
        function: &Value,
        args: Vec<Value>,
        self_value: Option<Value>,
        spread: bool,
    ) -> EvalResult {
        match function {
            Value::Function(FunctionValue::Script(func)) => {
                self.call_script(call_node, func, args, self_value, spread)
            }
            Value::Function(FunctionValue::Host(func)) => self.call_host(call_node, func, &args),
            other => Err(self.error(
                call_node,
                EvalErrorKind::NotCallable(other.type_name().into()),
                format!("{} is not callable", other.type_name()),
            )),
        }
    }

    fn call_script(
        &mut self,
        call_node: NodeId,
        func: &Arc<ScriptFunction>,
        args: Vec<Value>,
        self_value: Option<Value>,
        spread: bool,
    ) -> EvalResult {
        let chunk = Arc::clone(&func.chunk);
        let Some(Node::FnExpr { params, body, .. }) = chunk.node(func.node) else {
            return Err(self.error(
                call_node,
                EvalErrorKind::InvalidNode("function node".into()),
                "function definition node is not a FnExpr",
            ));
        };

        let call_position = self.chunk.node_position(call_node);
        let mut scope = func.captured_locals.clone();
        self.bind_params(call_node, params, args, spread, &mut scope)?;
        if let Some(self_value) = self_value {
            scope.insert(self.state.interner.intern("self"), self_value);
        }

        let frame_name = {
            let position = chunk.node_position(func.node);
            format!("(fn) {}:{}:{}", chunk.name, position.line, position.column)
        };
        self.push_frame(frame_name, Arc::clone(&chunk), func.node)
            .map_err(|e| self.locate(call_node, e))?;

        // Switch to the callee's chunk and environment.
        let saved_chunk = std::mem::replace(&mut self.chunk, Arc::clone(&chunk));
        let saved_scopes = std::mem::replace(&mut self.scopes, vec![scope]);
        let saved_function = self.current_function.replace(Arc::clone(func));
        let saved_frozen =
            std::mem::replace(&mut self.frozen_globals, func.captured_globals.clone());
        let saved_anonymous = std::mem::take(&mut self.anonymous);

        let body = *body;
        let result = self.eval_node(body);

        self.anonymous = saved_anonymous;
        self.frozen_globals = saved_frozen;
        self.current_function = saved_function;
        self.scopes = saved_scopes;
        self.chunk = saved_chunk;
        self.pop_frame();

        match result {
            Ok(value) | Err(EvalSignal::Return(value)) => Ok(value),
            Err(EvalSignal::Error(e)) => {
                // One position frame per chunk boundary: the function
                // definition once, and the outermost call site (recursive
                // call sites collapse).
                let definition = chunk.node_position(func.node);
                let mut e = e;
                if e.position_stack.frames().first() != Some(&definition) {
                    e = e.with_outer_frame(definition);
                }
                let recursive = self
                    .current_function
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, func));
                if !recursive {
                    e = e.with_outer_frame(call_position);
                }
                Err(EvalSignal::Error(e))
            }
            Err(EvalSignal::Break | EvalSignal::Continue | EvalSignal::Prune) => {
                Err(self.error(
                    call_node,
                    EvalErrorKind::InvalidNode("loop signal".into()),
                    "break/continue/prune crossed a function boundary",
                ))
            }
        }
    }

    fn bind_params(
        &mut self,
        call_node: NodeId,
        params: &[Param],
        args: Vec<Value>,
        spread: bool,
        scope: &mut FxHashMap<Name, Value>,
    ) -> Result<(), EvalSignal> {
        let variadic = params.last().is_some_and(|p| p.variadic);
        if spread && !variadic {
            return Err(self.error(
                call_node,
                EvalErrorKind::SpreadArgumentRequiresVariadic,
                "spread arguments are only allowed for variadic functions",
            ));
        }
        let fixed = if variadic {
            params.len() - 1
        } else {
            params.len()
        };
        let arity_ok = if variadic {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !arity_ok {
            return Err(self.error(
                call_node,
                EvalErrorKind::ArityMismatch {
                    expected: fixed,
                    got: args.len(),
                },
                format!("expected {} argument(s), got {}", fixed, args.len()),
            ));
        }
        let mut args = args.into_iter();
        for param in &params[..fixed] {
            let value = args.next().unwrap_or(Value::Nil);
            scope.insert(param.name, value);
        }
        if variadic {
            // The variadic tail packs into an array.
            let rest: Vec<Value> = args.collect();
            if let Some(param) = params.last() {
                scope.insert(param.name, Value::list(rest));
            }
        }
        Ok(())
    }

    fn call_host(&mut self, call_node: NodeId, func: &Arc<HostFunction>, args: &[Value]) -> EvalResult {
        let min = func.required_params;
        let max = func.required_params + func.optional_params;
        if args.len() < min || args.len() > max {
            return Err(self.error(
                call_node,
                EvalErrorKind::ArityMismatch {
                    expected: min,
                    got: args.len(),
                },
                format!(
                    "host function `{}` expects {min}..={max} argument(s), got {}",
                    func.name,
                    args.len()
                ),
            ));
        }
        let context = self.state.context.clone();
        let outcome = (func.f)(&context, args);
        // Cancellation during a host call surfaces as the cancellation
        // error, not the host failure.
        if context.is_cancelled() {
            let reason = context
                .cancellation_reason()
                .unwrap_or(rill_core::CancellationReason::UserRequested);
            return Err(self.locate(call_node, EvalError::from(reason)));
        }
        match outcome {
            Ok(HostReturn::Void) => Ok(Value::Nil),
            Ok(HostReturn::One(value)) => Ok(value),
            Ok(HostReturn::Two(value, Value::Nil)) => Ok(value),
            Ok(HostReturn::Two(_, error)) => Err(self.locate(
                call_node,
                raised_from_value(error),
            )),
            Err(message) => Err(self.locate(
                call_node,
                EvalError::new(
                    EvalErrorKind::Raised(Value::string(message.clone())),
                    message,
                ),
            )),
        }
    }

    /// Must-call conversion: a two-element `(value, error)` result becomes
    /// either the value or a propagated error; a plain error result
    /// propagates.
    fn convert_must(&self, call_node: NodeId, result: Value) -> EvalResult {
        let elements: Option<Vec<Value>> = match &result {
            Value::Tuple(items) if items.len() == 2 => Some(items.to_vec()),
            Value::List(list) if list.len() == 2 => Some(list.snapshot()),
            _ => None,
        };
        if let Some(mut elements) = elements {
            let error = elements.pop().unwrap_or(Value::Nil);
            let value = elements.pop().unwrap_or(Value::Nil);
            return match error {
                Value::Nil => Ok(value),
                error => Err(self.locate(call_node, raised_from_value(error))),
            };
        }
        if result.is_error() {
            return Err(self.locate(call_node, raised_from_value(result)));
        }
        Ok(result)
    }

    /// `a | b $`: each later stage evaluates with `$` bound to the prior
    /// stage's result; the previous `$` is restored afterwards.
    pub(crate) fn eval_pipeline(&mut self, id: NodeId, stages: &[NodeId]) -> EvalResult {
        let Some((first, rest)) = stages.split_first() else {
            return Err(self.error(
                id,
                EvalErrorKind::InvalidNode("empty pipeline".into()),
                "a pipeline needs at least one stage",
            ));
        };
        let mut current = self.eval_node(*first)?;
        for stage in rest {
            self.anonymous.push(current);
            let result = self.eval_node(*stage);
            self.anonymous.pop();
            current = result?;
        }
        Ok(current)
    }

    /// `x::m` outside a call position: computed properties are invoked,
    /// plain methods are returned unbound.
    pub(crate) fn eval_extension_access(
        &mut self,
        id: NodeId,
        subject: NodeId,
        member: Name,
    ) -> EvalResult {
        let subject_value = self.eval_node(subject)?;
        let method = self
            .state
            .resolve_extension_member(&subject_value, member)
            .ok_or_else(|| {
                self.error(
                    id,
                    EvalErrorKind::ExtensionMemberNotFound(self.name_of(member)),
                    format!("no extension member `{}`", self.name_of(member)),
                )
            })?;
        if method.computed {
            self.call_value(id, &method.method, Vec::new(), Some(subject_value), false)
        } else {
            Ok(method.method)
        }
    }

}

/// Rebuild an `EvalError` from a propagated error value, preserving its
/// stable identifier and position stack.
fn raised_from_value(error: Value) -> EvalError {
    if let Value::Error(data) = &error {
        let mut e = EvalError::new(
            EvalErrorKind::Raised(error.clone()),
            data.message.clone(),
        );
        e.position_stack = data.position_stack.clone();
        e
    } else {
        EvalError::new(EvalErrorKind::Raised(error.clone()), error.to_string())
    }
}
