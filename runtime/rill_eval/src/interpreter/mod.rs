//! Tree-walking evaluator.
//!
//! # Architecture
//!
//! All evaluation goes through `eval_node(NodeId)`. Helper modules hold
//! the per-concern evaluation functions:
//!
//! - `ops` — binary/unary operators with checked arithmetic
//! - `strings` — interpolation building and injection prevention
//! - `calls` — function calls, must-call, pipelines
//! - `control` — control flow, loops, walk, assignment
//! - `decl` — spawn, imports, patterns, extensions, structs, testing
//!
//! Every statement evaluation begins with the `before_instruction`
//! instrumentation hook: cancellation is polled there and all debugger
//! interaction (breakpoints, stepping, pause, exception stops) happens
//! through it.
//!
//! # Chunk threading
//!
//! A `NodeId` is valid only within its originating chunk. The evaluator
//! tracks the current chunk; function calls switch to the callee's chunk
//! and inclusion imports temporarily switch to the included chunk, which
//! is also what keeps error positions pointing at the right source.

mod calls;
mod control;
mod decl;
mod ops;
mod strings;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use rill_ir::{Chunk, Name, Node, NodeId};
use rill_values::{ScriptFunction, Value};

use crate::debugger::{Debugger, ScopesSnapshot, StackFrameInfo, StoppedSnapshot};
use crate::errors::{EvalError, EvalErrorKind, EvalResult, EvalSignal};
use crate::state::GlobalState;

/// Maximum script call depth before `StackOverflow`.
pub const MAX_CALL_DEPTH: usize = 200;

/// One call frame, for stack traces and step depth.
struct FrameInfo {
    /// Module name or `(fn) <chunk>:<line>:<col>`.
    name: String,
    chunk: Arc<Chunk>,
    /// The frame-defining node (function expression; module uses the
    /// first top-level statement).
    node: NodeId,
    /// The statement currently executing in this frame.
    statement: NodeId,
}

/// Tree-walking evaluator for one LThread.
pub struct Evaluator {
    pub(crate) state: Arc<GlobalState>,
    pub(crate) chunk: Arc<Chunk>,
    /// Local scope stack; the last map is the innermost scope.
    scopes: Vec<FxHashMap<Name, Value>>,
    frames: Vec<FrameInfo>,
    /// The function whose body is currently evaluating, for recursion
    /// detection in error-position building.
    pub(crate) current_function: Option<Arc<ScriptFunction>>,
    /// Frozen globals captured by the current function at definition
    /// time; shadow the module globals.
    pub(crate) frozen_globals: FxHashMap<Name, Value>,
    /// Stack of anonymous `$` pipeline values.
    pub(crate) anonymous: Vec<Value>,
    debugger: Option<Arc<Debugger>>,
}

impl Evaluator {
    fn new(state: Arc<GlobalState>, chunk: Arc<Chunk>, frame_name: String) -> Self {
        let debugger = state.debugger();
        let first = chunk.top_level().first().copied().unwrap_or(NodeId::new(0));
        Evaluator {
            state,
            chunk: Arc::clone(&chunk),
            scopes: vec![FxHashMap::default()],
            frames: vec![FrameInfo {
                name: frame_name,
                chunk,
                node: first,
                statement: first,
            }],
            current_function: None,
            frozen_globals: FxHashMap::default(),
            anonymous: Vec::new(),
            debugger,
        }
    }

    /// Evaluate a module's top-level statements against its state.
    pub fn run_module(state: &Arc<GlobalState>) -> Result<Value, EvalError> {
        let chunk = Arc::clone(&state.module.main_chunk);
        let mut evaluator =
            Evaluator::new(Arc::clone(state), Arc::clone(&chunk), state.module.name.clone());
        let ids: Vec<NodeId> = chunk.top_level().to_vec();
        let result = evaluator_run(&mut evaluator, &ids);
        finish(result)
    }

    /// Evaluate a single body node (spawned LThreads).
    pub fn run_body(state: &Arc<GlobalState>, body: NodeId) -> Result<Value, EvalError> {
        let chunk = Arc::clone(&state.module.main_chunk);
        let mut evaluator =
            Evaluator::new(Arc::clone(state), chunk.clone(), state.module.name.clone());
        let ids = match chunk.node(body) {
            Some(Node::Block(ids)) => ids.clone(),
            Some(_) => vec![body],
            None => {
                return Err(EvalError::new(
                    EvalErrorKind::InvalidNode("missing body node".into()),
                    "spawned body node does not exist",
                ))
            }
        };
        let result = evaluator_run(&mut evaluator, &ids);
        finish(result)
    }

    // Scopes

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub(crate) fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub(crate) fn define_local(&mut self, name: Name, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    pub(crate) fn lookup_local(&self, name: Name) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(&name) {
                return Some(value.clone());
            }
        }
        None
    }

    /// Assign to an existing local (innermost match), or define in the
    /// innermost scope.
    pub(crate) fn assign_local(&mut self, name: Name, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(&name) {
                *slot = value;
                return;
            }
        }
        self.define_local(name, value);
    }

    /// Variable lookup: locals, then frozen captures, then globals.
    pub(crate) fn lookup_var(&self, name: Name) -> Option<Value> {
        self.lookup_local(name)
            .or_else(|| self.frozen_globals.get(&name).cloned())
            .or_else(|| self.state.globals.get(name))
    }

    pub(crate) fn lookup_global(&self, name: Name) -> Option<Value> {
        self.frozen_globals
            .get(&name)
            .cloned()
            .or_else(|| self.state.globals.get(name))
    }

    // Errors

    pub(crate) fn error(&self, id: NodeId, kind: EvalErrorKind, message: impl Into<String>) -> EvalSignal {
        EvalSignal::Error(
            EvalError::new(kind, message).with_position(self.chunk.node_position(id)),
        )
    }

    /// Locate an error at `id` if it has no position yet.
    pub(crate) fn locate(&self, id: NodeId, e: EvalError) -> EvalSignal {
        EvalSignal::Error(e.with_position(self.chunk.node_position(id)))
    }

    pub(crate) fn name_of(&self, name: Name) -> String {
        self.state.interner.lookup(name).to_owned()
    }

    // Instrumentation

    /// The per-instruction hook: cancellation polling plus all debugger
    /// interaction.
    fn before_instruction(&self, id: NodeId) -> Result<(), EvalSignal> {
        if self.state.context.is_cancelled() {
            let reason = self
                .state
                .context
                .cancellation_reason()
                .unwrap_or(rill_core::CancellationReason::UserRequested);
            return Err(self.locate(id, EvalError::from(reason)));
        }
        if let Some(debugger) = self.debugger.clone() {
            debugger.before_instruction(id, self.frames.len(), None, &self.state.context, || {
                self.capture_snapshot(&debugger)
            });
        }
        Ok(())
    }

    /// Exception stop: fires the hook with the failing error before the
    /// error propagates (and before any must-call conversion upstream).
    fn on_exception(&self, id: NodeId, error: &EvalError) {
        if let Some(debugger) = self.debugger.clone() {
            debugger.before_instruction(
                id,
                self.frames.len(),
                Some(error),
                &self.state.context,
                || self.capture_snapshot(&debugger),
            );
        }
    }

    /// Snapshot scopes and stack for the parked debugger queries.
    fn capture_snapshot(&self, debugger: &Debugger) -> StoppedSnapshot {
        let globals = self
            .state
            .globals
            .snapshot()
            .into_iter()
            .map(|(name, binding)| (self.name_of(name), binding.value))
            .collect();
        let mut locals: Vec<(String, Value)> = Vec::new();
        for scope in &self.scopes {
            for (name, value) in scope {
                let rendered = self.name_of(*name);
                match locals.iter_mut().find(|(n, _)| *n == rendered) {
                    Some(slot) => slot.1 = value.clone(),
                    None => locals.push((rendered, value.clone())),
                }
            }
        }
        locals.sort_by(|(a, _), (b, _)| a.cmp(b));

        // Innermost frame first; parent links point outward.
        let mut trace: Vec<StackFrameInfo> = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let frame_position = frame.chunk.node_position(frame.node);
            let statement_position = frame.chunk.node_position(frame.statement);
            trace.push(StackFrameInfo {
                id: debugger.next_frame_id(),
                name: frame.name.clone(),
                chunk: frame.chunk.name.clone(),
                node: frame.node,
                start_line: frame_position.line,
                start_column: frame_position.column,
                statement_start_line: statement_position.line,
                statement_start_column: statement_position.column,
                parent_id: None,
            });
        }
        for i in 0..trace.len() {
            trace[i].parent_id = trace.get(i + 1).map(|parent| parent.id);
        }
        StoppedSnapshot {
            scopes: ScopesSnapshot {
                globals,
                locals,
            },
            trace,
        }
    }

    // Frames

    pub(crate) fn push_frame(
        &mut self,
        name: String,
        chunk: Arc<Chunk>,
        node: NodeId,
    ) -> Result<(), EvalError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(EvalError::new(
                EvalErrorKind::StackOverflow,
                format!("call depth exceeded {MAX_CALL_DEPTH}"),
            ));
        }
        self.frames.push(FrameInfo {
            name,
            chunk,
            node,
            statement: node,
        });
        Ok(())
    }

    pub(crate) fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    // Statement execution

    /// Execute statements in order; the value of the last one is the
    /// block's value (expression forms).
    pub(crate) fn exec_statements(&mut self, ids: &[NodeId]) -> EvalResult {
        let mut last = Value::Nil;
        for id in ids {
            last = self.exec_statement(*id)?;
        }
        Ok(last)
    }

    /// Execute one statement through the instrumentation hook.
    pub(crate) fn exec_statement(&mut self, id: NodeId) -> EvalResult {
        if let Some(frame) = self.frames.last_mut() {
            frame.statement = id;
        }
        self.before_instruction(id)?;
        match self.eval_node(id) {
            Err(EvalSignal::Error(mut e)) => {
                if !e.hook_fired {
                    e.hook_fired = true;
                    self.on_exception(id, &e);
                }
                Err(EvalSignal::Error(e))
            }
            other => other,
        }
    }

    /// Evaluate one node.
    pub(crate) fn eval_node(&mut self, id: NodeId) -> EvalResult {
        let chunk = Arc::clone(&self.chunk);
        let Some(node) = chunk.node(id) else {
            return Err(self.error(
                id,
                EvalErrorKind::InvalidNode("unknown node id".into()),
                "node does not exist in this chunk",
            ));
        };
        match node {
            // Literals
            Node::NilLiteral => Ok(Value::Nil),
            Node::BoolLiteral(b) => Ok(Value::Bool(*b)),
            Node::IntLiteral(n) => Ok(Value::int(*n)),
            Node::FloatLiteral(f) => Ok(Value::Float(*f)),
            Node::StrLiteral(s) => Ok(Value::string(s.clone())),
            Node::DurationLiteral(ms) => {
                Ok(Value::Duration(rill_values::Duration::from_millis(*ms)))
            }
            Node::ByteLiteral(b) => Ok(Value::Byte(*b)),
            Node::RuneLiteral(c) => Ok(Value::Rune(*c)),
            Node::PathLiteral(p) => Ok(Value::path(p.clone())),
            Node::PathPatternLiteral(p) => Ok(Value::path_pattern(p.clone())),
            Node::UrlLiteral(u) => Ok(Value::url(u.clone())),
            Node::HostLiteral(h) => Ok(Value::host(h.clone())),
            Node::SchemeLiteral(s) => Ok(Value::scheme(s.clone())),
            Node::PropertyNameLiteral(p) => Ok(Value::property_name(p.clone())),
            Node::IdentifierLiteral(i) => Ok(Value::identifier(i.clone())),

            // Templates
            Node::PathTemplate { segments } => self.eval_path_template(id, segments),
            Node::PathPatternTemplate { segments } => {
                self.eval_path_pattern_template(id, segments)
            }
            Node::UrlTemplate { base, path, query } => {
                self.eval_url_template(id, base, path, query)
            }
            Node::StrTemplate { pattern, segments } => {
                self.eval_str_template(id, *pattern, segments)
            }

            // Compound literals
            Node::ListLiteral(items) => {
                let values = self.eval_list(items)?;
                Ok(Value::list(values))
            }
            Node::TupleLiteral(items) => {
                let values = self.eval_list(items)?;
                Ok(Value::tuple(values))
            }
            Node::ObjectLiteral(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value_id) in entries {
                    values.push((key.clone(), self.eval_node(*value_id)?));
                }
                Value::object(values).map_err(|e| self.locate(id, e.into()))
            }
            Node::RecordLiteral(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value_id) in entries {
                    values.push((key.clone(), self.eval_node(*value_id)?));
                }
                Value::record(values).map_err(|e| self.locate(id, e.into()))
            }
            Node::DictLiteral(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key_id, value_id) in entries {
                    values.push((self.eval_node(*key_id)?, self.eval_node(*value_id)?));
                }
                Ok(Value::dict(values))
            }

            // Variables
            Node::Var(name) => self.lookup_var(*name).ok_or_else(|| {
                self.error(
                    id,
                    EvalErrorKind::UndefinedVariable(self.name_of(*name)),
                    format!("variable `{}` is not defined", self.name_of(*name)),
                )
            }),
            Node::GlobalVar(name) => self.lookup_global(*name).ok_or_else(|| {
                self.error(
                    id,
                    EvalErrorKind::UndefinedGlobal(self.name_of(*name)),
                    format!("global `{}` is not defined", self.name_of(*name)),
                )
            }),
            Node::Anonymous => self.anonymous.last().cloned().ok_or_else(|| {
                self.error(
                    id,
                    EvalErrorKind::UndefinedVariable("$".into()),
                    "`$` is only defined inside a pipeline stage",
                )
            }),

            // Operators
            Node::Binary { op, lhs, rhs } => self.eval_binary(id, *op, *lhs, *rhs),
            Node::Unary { op, operand } => self.eval_unary(id, *op, *operand),

            // Access
            Node::Member { object, name } => self.eval_member(id, *object, *name),
            Node::Index { indexed, index } => self.eval_index(id, *indexed, *index),
            Node::Slice {
                indexed,
                start,
                end,
            } => self.eval_slice(id, *indexed, *start, *end),
            Node::ExtensionAccess { subject, member } => {
                self.eval_extension_access(id, *subject, *member)
            }

            // Calls and pipelines
            Node::Call {
                callee,
                args,
                spread_arg,
                must,
            } => self.eval_call_node(id, *callee, args, *spread_arg, *must),
            Node::Pipeline { stages } => self.eval_pipeline(id, stages),

            // Functions
            Node::FnDecl { name, function } => self.eval_fn_decl(id, *name, *function),
            Node::FnExpr { .. } => Ok(self.make_function(id, None)),

            // Statements
            Node::Block(ids) => {
                self.push_scope();
                let result = self.exec_statements(&ids.clone());
                self.pop_scope();
                result
            }
            Node::Assignment { target, rhs } => self.eval_assignment(id, target, *rhs),
            Node::MultiAssignment {
                targets,
                rhs,
                nillable,
            } => self.eval_multi_assignment(id, targets, *rhs, *nillable),
            Node::GlobalConstDecl { name, rhs } => self.eval_global_const_decl(id, *name, *rhs),
            Node::If {
                test,
                consequent,
                alternate,
            } => self.eval_if(id, *test, *consequent, *alternate),
            Node::Switch {
                discriminant,
                cases,
                default,
            } => self.eval_switch(id, *discriminant, cases, *default),
            Node::Match {
                discriminant,
                cases,
                default,
            } => self.eval_match(id, *discriminant, cases, *default),
            Node::For {
                key_var,
                value_var,
                iterated,
                body,
                chunk_size,
                produces_value,
            } => self.eval_for(
                id,
                *key_var,
                *value_var,
                *iterated,
                *body,
                *chunk_size,
                *produces_value,
            ),
            Node::Walk {
                walked,
                entry_var,
                body,
            } => self.eval_walk(id, *walked, *entry_var, *body),
            Node::Break => Err(EvalSignal::Break),
            Node::Continue => Err(EvalSignal::Continue),
            Node::Prune => Err(EvalSignal::Prune),
            Node::Return(value) => {
                let value = match value {
                    Some(value_id) => self.eval_node(*value_id)?,
                    None => Value::Nil,
                };
                Err(EvalSignal::Return(value))
            }
            Node::Synchronized { values, body } => self.eval_synchronized(id, values, *body),

            // Concurrency
            Node::Spawn {
                globals,
                allow,
                group,
                body,
            } => self.eval_spawn(id, globals, allow, *group, *body),

            // Imports
            Node::InclusionImport { chunk: included } => {
                self.eval_inclusion_import(id, Arc::clone(included))
            }
            Node::ModuleImport { binding, module } => {
                self.eval_module_import(id, *binding, Arc::clone(module))
            }

            // Patterns
            Node::PatternDefinition { name, rhs } => self.eval_pattern_definition(id, *name, *rhs),
            Node::PatternIdent(name) => self.eval_pattern_ident(id, *name),
            Node::ExactValuePattern(value_id) => {
                let value = self.eval_node(*value_id)?;
                Ok(Value::Pattern(rill_values::Pattern::exact(value)))
            }
            Node::ObjectPatternLiteral { entries } => self.eval_object_pattern(id, entries),
            Node::ListPatternLiteral { elements, general } => {
                self.eval_list_pattern(id, elements.as_deref(), *general)
            }
            Node::UnionPatternLiteral(members) => self.eval_union_pattern(id, members),
            Node::IntRangePattern { start, end } => Ok(Value::Pattern(
                rill_values::Pattern::IntRange {
                    start: *start,
                    end: *end,
                },
            )),

            // Extensions
            Node::Extend { pattern, members } => self.eval_extend(id, *pattern, members),

            // Structs
            Node::StructDecl { name, fields } => {
                self.state.declare_struct(*name, fields.clone());
                Ok(Value::Nil)
            }
            Node::StructInit { type_name, fields } => self.eval_struct_init(id, *type_name, fields),

            // Testing
            Node::Testsuite { name, body } => self.eval_testsuite(id, *name, *body),
            Node::Testcase { name, body } => self.eval_testcase(id, *name, *body),
        }
    }

    pub(crate) fn eval_list(&mut self, ids: &[NodeId]) -> Result<Vec<Value>, EvalSignal> {
        let mut values = Vec::with_capacity(ids.len());
        for id in ids {
            values.push(self.eval_node(*id)?);
        }
        Ok(values)
    }
}

fn evaluator_run(evaluator: &mut Evaluator, ids: &[NodeId]) -> EvalResult {
    tracing::debug!(module = %evaluator.state.module.name, "evaluation started");
    let result = evaluator.exec_statements(ids);
    // A failure rolls back the thread's in-flight transaction.
    if matches!(result, Err(EvalSignal::Error(_)))
        && evaluator.state.context.current_transaction().is_some()
    {
        let _ = evaluator.state.context.rollback_transaction();
    }
    result
}

/// Map the final signal of a thread's evaluation to its result.
fn finish(result: EvalResult) -> Result<Value, EvalError> {
    match result {
        Ok(value) => Ok(value),
        Err(EvalSignal::Return(value)) => Ok(value),
        Err(EvalSignal::Error(e)) => Err(e),
        Err(EvalSignal::Break | EvalSignal::Continue | EvalSignal::Prune) => Err(EvalError::new(
            EvalErrorKind::InvalidNode("loop signal at top level".into()),
            "break/continue/prune outside of a loop",
        )),
    }
}
