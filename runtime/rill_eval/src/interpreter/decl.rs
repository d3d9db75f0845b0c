//! Spawn expressions, imports, pattern declarations, extensions,
//! structs and testing statements.

use std::sync::Arc;

use rill_ir::{
    Chunk, ExtensionMember as IrExtensionMember, Module, Name, NodeId, ObjectPatternEntry,
    PermissionSpec,
};
use rill_values::{EntryPattern, ListPattern, ObjectPattern, Pattern, StructValue, Value};

use rill_core::{Manifest, Permission};

use crate::errors::{EvalErrorKind, EvalResult, EvalSignal};
use crate::interpreter::Evaluator;
use crate::lthread::{spawn_lthread, LThreadSpawnArgs, SpawnKind};
use crate::state::{Extension, ExtensionMethod};
use crate::testing::{TestItemKind, TestResult};

/// Type names with built-in patterns resolvable without a declaration.
const BUILTIN_TYPE_PATTERNS: &[&str] = &[
    "nil", "bool", "int", "float", "string", "byte", "rune", "path", "url", "host", "duration",
    "datetime", "list", "tuple", "object", "record", "dictionary", "option", "error", "pattern",
    "function", "treedata", "ulid", "uuid",
];

impl Evaluator {
    // Concurrency

    pub(crate) fn eval_spawn(
        &mut self,
        id: NodeId,
        globals: &[(Name, NodeId)],
        allow: &[PermissionSpec],
        group: Option<NodeId>,
        body: NodeId,
    ) -> EvalResult {
        // Each passed global must be sharable or clonable.
        let mut transferred = Vec::with_capacity(globals.len());
        for (name, value_id) in globals {
            let value = self.eval_node(*value_id)?;
            let prepared =
                rill_values::share_or_clone(&value).map_err(|e| self.locate(id, e.into()))?;
            transferred.push((*name, prepared));
        }

        // The permission envelope; coverage by the spawner is enforced
        // when the child context is derived.
        let mut permissions = Vec::with_capacity(allow.len());
        for spec in allow {
            permissions.push(Permission::from_spec(spec).map_err(|e| self.locate(id, e.into()))?);
        }

        let group = match group {
            Some(group_id) => {
                let group_value = self.eval_node(group_id)?;
                let group_name = match &group_value {
                    Value::Str(s) => (**s).clone(),
                    Value::Identifier(i) => (**i).clone(),
                    other => {
                        return Err(self.error(
                            id,
                            EvalErrorKind::TypeMismatch {
                                expected: "group name".into(),
                                got: other.type_name().into(),
                            },
                            "lthread group must be named by a string or identifier",
                        ))
                    }
                };
                Some(self.state.lthread_group(&group_name))
            }
            None => None,
        };

        let debugger = self.debugger.clone().map(|d| d.new_child(Arc::clone(&self.chunk)));
        let module = Arc::new(Module::new(
            format!("{}#spawn{}", self.state.module.name, id.index()),
            Arc::clone(&self.chunk),
        ));
        let lthread = spawn_lthread(LThreadSpawnArgs {
            parent_state: Arc::clone(&self.state),
            module,
            body: Some(body),
            globals: transferred,
            permissions,
            extra_limits: Vec::new(),
            inherit_patterns: true,
            group,
            debugger,
            kind: SpawnKind::UserSpawn,
        })
        .map_err(|e| self.locate(id, e))?;
        Ok(lthread.as_value())
    }

    // Imports

    /// Inclusion import: the included chunk's top-level declarations are
    /// evaluated in the importer's environment; error positions keep the
    /// included chunk's source name.
    pub(crate) fn eval_inclusion_import(&mut self, id: NodeId, included: Arc<Chunk>) -> EvalResult {
        let import_position = self.chunk.node_position(id);
        let ids: Vec<NodeId> = included.top_level().to_vec();
        let saved_chunk = std::mem::replace(&mut self.chunk, included);
        let result = self.exec_statements(&ids);
        self.chunk = saved_chunk;
        match result {
            Ok(value) => Ok(value),
            Err(EvalSignal::Error(e)) => {
                // The inclusion is a chunk boundary: add the import site.
                Err(EvalSignal::Error(e.with_outer_frame(import_position)))
            }
            Err(other) => Err(other),
        }
    }

    /// Module import: the module runs as a fresh LThread under its
    /// declared manifest; the returned value is bound locally.
    pub(crate) fn eval_module_import(
        &mut self,
        id: NodeId,
        binding: Name,
        module: Arc<Module>,
    ) -> EvalResult {
        let context = self.state.context.clone();
        let manifest = Manifest::from_spec(&module.manifest, |name| {
            context
                .resolve_named_pattern(name)
                .or_else(|| builtin_pattern(name))
        })
        .map_err(|e| {
            self.error(
                id,
                EvalErrorKind::InvalidNode("manifest".into()),
                format!("invalid manifest: {e}"),
            )
        })?;
        manifest
            .validate_against(&context)
            .map_err(|e| self.locate(id, e.into()))?;

        let debugger = self
            .debugger
            .clone()
            .map(|d| d.new_child(Arc::clone(&module.main_chunk)));
        let lthread = spawn_lthread(LThreadSpawnArgs {
            parent_state: Arc::clone(&self.state),
            module,
            body: None,
            globals: Vec::new(),
            permissions: manifest.permissions.clone(),
            extra_limits: manifest.limits.clone(),
            // The importer's patterns are not passed unless configured.
            inherit_patterns: self.state.module_import_passes_patterns,
            group: None,
            debugger,
            kind: SpawnKind::ModuleImport,
        })
        .map_err(|e| self.locate(id, e))?;

        let result = lthread
            .wait_result(&context)
            .map_err(|e| self.locate(id, e))?;
        self.define_local(binding, result);
        Ok(Value::Nil)
    }

    // Patterns

    pub(crate) fn eval_pattern_definition(
        &mut self,
        _id: NodeId,
        name: Name,
        rhs: NodeId,
    ) -> EvalResult {
        let value = self.eval_node(rhs)?;
        let pattern = value_to_pattern(value);
        let rendered = self.name_of(name);
        self.state
            .context
            .add_named_pattern(rendered.clone(), Pattern::named(rendered, pattern));
        Ok(Value::Nil)
    }

    pub(crate) fn eval_pattern_ident(&mut self, id: NodeId, name: Name) -> EvalResult {
        let rendered = self.name_of(name);
        let pattern = self
            .state
            .context
            .resolve_named_pattern(&rendered)
            .or_else(|| builtin_pattern(&rendered))
            .ok_or_else(|| {
                self.error(
                    id,
                    EvalErrorKind::UndefinedVariable(rendered.clone()),
                    format!("pattern `%{rendered}` is not defined"),
                )
            })?;
        Ok(Value::Pattern(pattern))
    }

    pub(crate) fn eval_object_pattern(
        &mut self,
        _id: NodeId,
        entries: &[ObjectPatternEntry],
    ) -> EvalResult {
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let value = self.eval_node(entry.pattern)?;
            resolved.push(EntryPattern {
                name: entry.key.clone(),
                pattern: value_to_pattern(value),
                optional: entry.optional,
            });
        }
        Ok(Value::Pattern(Pattern::object(ObjectPattern {
            entries: resolved,
            inexact: true,
        })))
    }

    pub(crate) fn eval_list_pattern(
        &mut self,
        _id: NodeId,
        elements: Option<&[NodeId]>,
        general: Option<NodeId>,
    ) -> EvalResult {
        let elements = match elements {
            Some(ids) => {
                let mut patterns = Vec::with_capacity(ids.len());
                for element in ids {
                    let value = self.eval_node(*element)?;
                    patterns.push(value_to_pattern(value));
                }
                Some(patterns)
            }
            None => None,
        };
        let general = match general {
            Some(node) => {
                let value = self.eval_node(node)?;
                Some(value_to_pattern(value))
            }
            None => None,
        };
        Ok(Value::Pattern(Pattern::list(ListPattern {
            elements,
            general,
        })))
    }

    pub(crate) fn eval_union_pattern(&mut self, _id: NodeId, members: &[NodeId]) -> EvalResult {
        let mut patterns = Vec::with_capacity(members.len());
        for member in members {
            let value = self.eval_node(*member)?;
            patterns.push(value_to_pattern(value));
        }
        Ok(Value::Pattern(Pattern::union(patterns)))
    }

    // Extensions

    pub(crate) fn eval_extend(
        &mut self,
        _id: NodeId,
        pattern: NodeId,
        members: &[IrExtensionMember],
    ) -> EvalResult {
        let pattern_value = self.eval_node(pattern)?;
        let pattern = value_to_pattern(pattern_value);
        let mut methods = Vec::with_capacity(members.len());
        for member in members {
            methods.push(ExtensionMethod {
                name: member.name,
                method: self.make_function(member.method, Some(member.name)),
                computed: member.computed,
            });
        }
        self.state.register_extension(Extension {
            pattern,
            members: methods,
        });
        Ok(Value::Nil)
    }

    // Structs

    pub(crate) fn eval_struct_init(
        &mut self,
        id: NodeId,
        type_name: Name,
        fields: &[(Name, NodeId)],
    ) -> EvalResult {
        let declared = self.state.struct_fields(type_name).ok_or_else(|| {
            self.error(
                id,
                EvalErrorKind::UndefinedVariable(self.name_of(type_name)),
                format!("struct type `{}` is not declared", self.name_of(type_name)),
            )
        })?;
        // The layout is fixed on first materialization; field access
        // thereafter is a name-indexed lookup on the descriptor.
        let layout = self.state.struct_layouts.materialize(type_name, &declared);
        let mut values = vec![Value::Nil; layout.fields.len()];
        for (field, value_id) in fields {
            let Some(offset) = layout.offset_of(*field) else {
                return Err(self.error(
                    id,
                    EvalErrorKind::CollectionElementNotFound,
                    format!("no struct field `{}`", self.name_of(*field)),
                ));
            };
            values[offset] = self.eval_node(*value_id)?;
        }
        Ok(Value::Struct(Box::new(StructValue {
            layout,
            fields: values,
        })))
    }

    // Testing

    pub(crate) fn eval_testsuite(
        &mut self,
        id: NodeId,
        name: Option<NodeId>,
        body: NodeId,
    ) -> EvalResult {
        self.run_test_item(id, name, body, TestItemKind::Suite, "testsuite")
    }

    pub(crate) fn eval_testcase(
        &mut self,
        id: NodeId,
        name: Option<NodeId>,
        body: NodeId,
    ) -> EvalResult {
        self.run_test_item(id, name, body, TestItemKind::Case, "testcase")
    }

    fn run_test_item(
        &mut self,
        id: NodeId,
        name: Option<NodeId>,
        body: NodeId,
        kind: TestItemKind,
        fallback_name: &str,
    ) -> EvalResult {
        // Testing statements are inert unless the testing flag is set.
        if !self.state.testing.is_enabled() {
            return Ok(Value::Nil);
        }
        let rendered = match name {
            Some(name_id) => {
                let value = self.eval_node(name_id)?;
                match value.as_str() {
                    Some(s) => s.to_owned(),
                    None => value.to_string(),
                }
            }
            None => fallback_name.to_owned(),
        };
        let span = self.chunk.span(id);
        if !self.state.testing.selects(&rendered, &self.chunk.name, span) {
            return Ok(Value::Nil);
        }
        self.push_scope();
        let outcome = self.eval_node(body);
        self.pop_scope();
        // Failures are recorded on the result, never propagated.
        let error = match outcome {
            Ok(_) => None,
            Err(EvalSignal::Error(e)) => Some(e),
            Err(EvalSignal::Return(_)) => None,
            Err(EvalSignal::Break | EvalSignal::Continue | EvalSignal::Prune) => None,
        };
        self.state.testing.record(TestResult {
            kind,
            name: rendered,
            error,
        });
        Ok(Value::Nil)
    }
}

fn value_to_pattern(value: Value) -> Pattern {
    match value {
        Value::Pattern(pattern) => pattern,
        other => Pattern::exact(other),
    }
}

fn builtin_pattern(name: &str) -> Option<Pattern> {
    if name == "any" {
        return Some(Pattern::Any);
    }
    BUILTIN_TYPE_PATTERNS
        .contains(&name)
        .then(|| Pattern::of_type(name))
}
