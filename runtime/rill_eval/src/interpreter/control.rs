//! Control flow, loops, walk, synchronized blocks and assignment.

use rill_ir::{AssignTarget, MatchCase, Name, NodeId, SwitchCase};
use rill_values::{equality, Object, Treedata, TreedataNode, Value};

use rill_core::{GlobalVarEntity, Permission, PermissionKind};

use crate::errors::{EvalErrorKind, EvalResult, EvalSignal};
use crate::interpreter::Evaluator;
use crate::state::GlobalKind;

impl Evaluator {
    pub(crate) fn eval_assignment(
        &mut self,
        id: NodeId,
        target: &AssignTarget,
        rhs: NodeId,
    ) -> EvalResult {
        let value = self.eval_node(rhs)?;
        match target {
            AssignTarget::Variable(name) => {
                self.assign_local(*name, value);
            }
            AssignTarget::Global(name) => {
                self.assign_global(id, *name, value)?;
            }
            AssignTarget::Member { object, name } => {
                let subject = self.eval_node(*object)?;
                let key = self.name_of(*name);
                match &subject {
                    // Object::set takes the object's lock and re-validates
                    // its constraint.
                    Value::Object(o) => o
                        .set(&key, value)
                        .map_err(|e| self.locate(id, e.into()))?,
                    Value::StructPointer(p) => {
                        if !p.set_field(*name, value) {
                            return Err(self.error(
                                id,
                                EvalErrorKind::CollectionElementNotFound,
                                format!("no struct field `{key}`"),
                            ));
                        }
                    }
                    _ => {
                        return Err(self.error(
                            id,
                            EvalErrorKind::TypeMismatch {
                                expected: "object".into(),
                                got: subject.type_name().into(),
                            },
                            format!("cannot assign member on {}", subject.type_name()),
                        ))
                    }
                }
            }
            AssignTarget::Index { indexed, index } => {
                let subject = self.eval_node(*indexed)?;
                let index_value = self.eval_node(*index)?;
                self.assign_index(id, &subject, &index_value, value)?;
            }
            AssignTarget::Slice {
                indexed,
                start,
                end,
            } => {
                let subject = self.eval_node(*indexed)?;
                self.assign_slice(id, &subject, *start, *end, value)?;
            }
        }
        Ok(Value::Nil)
    }

    fn assign_global(&mut self, id: NodeId, name: Name, value: Value) -> Result<(), EvalSignal> {
        let rendered = self.name_of(name);
        if self.state.globals.is_constant(name) {
            return Err(self.error(
                id,
                EvalErrorKind::AssignmentToConstantGlobal(rendered.clone()),
                format!("`{rendered}` is a constant"),
            ));
        }
        let kind = if self.state.globals.get(name).is_some() {
            PermissionKind::Update
        } else {
            PermissionKind::Create
        };
        let permission = Permission::GlobalVar {
            kind,
            entity: GlobalVarEntity::Name(rendered),
        };
        self.state
            .context
            .check_permission(&permission)
            .map_err(|e| self.locate(id, e.into()))?;
        self.state.globals.set(name, value, GlobalKind::Regular);
        Ok(())
    }

    fn assign_index(
        &mut self,
        id: NodeId,
        subject: &Value,
        index: &Value,
        value: Value,
    ) -> Result<(), EvalSignal> {
        match (subject, index) {
            (Value::List(list), Value::Int(i)) => {
                let raw = i.raw();
                if raw < 0 {
                    return Err(self.error(
                        id,
                        EvalErrorKind::NegativeLowerIndex,
                        "index is negative",
                    ));
                }
                let i = raw.unsigned_abs() as usize;
                if !list.set(i, value) {
                    return Err(self.error(
                        id,
                        EvalErrorKind::IndexOutOfBounds {
                            index: raw,
                            length: list.len(),
                        },
                        format!("index {raw} out of bounds"),
                    ));
                }
                Ok(())
            }
            (Value::Dict(dict), key) => {
                dict.insert(key.clone(), value);
                Ok(())
            }
            (Value::Object(object), Value::Str(key)) => object
                .set(key, value)
                .map_err(|e| self.locate(id, e.into())),
            _ => Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "list, dictionary or object".into(),
                    got: subject.type_name().into(),
                },
                format!("cannot index-assign into {}", subject.type_name()),
            )),
        }
    }

    fn assign_slice(
        &mut self,
        id: NodeId,
        subject: &Value,
        start: Option<NodeId>,
        end: Option<NodeId>,
        value: Value,
    ) -> Result<(), EvalSignal> {
        let Value::List(list) = subject else {
            return Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "list".into(),
                    got: subject.type_name().into(),
                },
                "slice assignment requires a list",
            ));
        };
        let Value::List(replacement) = &value else {
            return Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "list".into(),
                    got: value.type_name().into(),
                },
                "slice assignment requires a list value",
            ));
        };
        let start = match start {
            Some(node) => {
                let v = self.eval_node(node)?;
                v.as_int().unwrap_or(0)
            }
            None => 0,
        };
        if start < 0 {
            return Err(self.error(
                id,
                EvalErrorKind::NegativeLowerIndex,
                "slice lower bound is negative",
            ));
        }
        let start = start.unsigned_abs() as usize;
        let end = match end {
            Some(node) => {
                let v = self.eval_node(node)?;
                usize::try_from(v.as_int().unwrap_or(0)).unwrap_or(0)
            }
            None => list.len(),
        };
        let mut items = list.snapshot();
        let end = end.min(items.len());
        let start = start.min(end);
        items.splice(start..end, replacement.snapshot());
        // Aliases observe the spliced contents.
        list.replace_all(items);
        Ok(())
    }

    pub(crate) fn eval_multi_assignment(
        &mut self,
        id: NodeId,
        targets: &[Name],
        rhs: NodeId,
        nillable: bool,
    ) -> EvalResult {
        let value = self.eval_node(rhs)?;
        let elements: Vec<Value> = match &value {
            Value::List(list) => list.snapshot(),
            Value::Tuple(items) => items.to_vec(),
            other => {
                return Err(self.error(
                    id,
                    EvalErrorKind::TypeMismatch {
                        expected: "list or tuple".into(),
                        got: other.type_name().into(),
                    },
                    "multi-assignment requires a list or tuple",
                ))
            }
        };
        if elements.len() < targets.len() && !nillable {
            return Err(self.error(
                id,
                EvalErrorKind::MultiAssignmentArityMismatch {
                    expected: targets.len(),
                    got: elements.len(),
                },
                format!(
                    "expected at least {} element(s), got {}",
                    targets.len(),
                    elements.len()
                ),
            ));
        }
        for (i, target) in targets.iter().enumerate() {
            // Missing elements bind to nil in nillable form.
            let element = elements.get(i).cloned().unwrap_or(Value::Nil);
            self.assign_local(*target, element);
        }
        Ok(Value::Nil)
    }

    pub(crate) fn eval_global_const_decl(
        &mut self,
        id: NodeId,
        name: Name,
        rhs: NodeId,
    ) -> EvalResult {
        if self.state.globals.get(name).is_some() {
            return Err(self.error(
                id,
                EvalErrorKind::AssignmentToConstantGlobal(self.name_of(name)),
                "constant is already defined",
            ));
        }
        let value = self.eval_node(rhs)?;
        self.state.globals.set(name, value, GlobalKind::Constant);
        Ok(Value::Nil)
    }

    pub(crate) fn eval_if(
        &mut self,
        id: NodeId,
        test: NodeId,
        consequent: NodeId,
        alternate: Option<NodeId>,
    ) -> EvalResult {
        let test_value = self.eval_node(test)?;
        let Value::Bool(test_value) = test_value else {
            return Err(self.boolean_expected(id, &test_value));
        };
        if test_value {
            self.eval_node(consequent)
        } else if let Some(alternate) = alternate {
            self.eval_node(alternate)
        } else {
            Ok(Value::Nil)
        }
    }

    pub(crate) fn eval_switch(
        &mut self,
        _id: NodeId,
        discriminant: NodeId,
        cases: &[SwitchCase],
        default: Option<NodeId>,
    ) -> EvalResult {
        let subject = self.eval_node(discriminant)?;
        for case in cases {
            for value_id in &case.values {
                let candidate = self.eval_node(*value_id)?;
                if equality::values_equal(&subject, &candidate) {
                    return self.eval_node(case.body);
                }
            }
        }
        // defaultcase fires iff no explicit case matched.
        match default {
            Some(body) => self.eval_node(body),
            None => Ok(Value::Nil),
        }
    }

    pub(crate) fn eval_match(
        &mut self,
        _id: NodeId,
        discriminant: NodeId,
        cases: &[MatchCase],
        default: Option<NodeId>,
    ) -> EvalResult {
        let subject = self.eval_node(discriminant)?;
        // Source order; first hit wins.
        for case in cases {
            let pattern_value = self.eval_node(case.pattern)?;
            let matched = match &pattern_value {
                Value::Pattern(pattern) => pattern.matches(&subject),
                other => equality::values_equal(&subject, other),
            };
            if matched {
                self.push_scope();
                if let Some(binding) = case.binding {
                    self.define_local(binding, subject.clone());
                }
                let result = self.eval_node(case.body);
                self.pop_scope();
                return result;
            }
        }
        match default {
            Some(body) => self.eval_node(body),
            None => Ok(Value::Nil),
        }
    }

    pub(crate) fn eval_for(
        &mut self,
        id: NodeId,
        key_var: Option<Name>,
        value_var: Option<Name>,
        iterated: NodeId,
        body: NodeId,
        chunk_size: Option<NodeId>,
        produces_value: bool,
    ) -> EvalResult {
        let subject = self.eval_node(iterated)?;
        let entries = self.iterate(id, &subject)?;

        let mut produced: Vec<Value> = Vec::new();
        if let Some(size_node) = chunk_size {
            // `chunked chunk in streamable` yields arrays of up to
            // chunk-size elements.
            let size_value = self.eval_node(size_node)?;
            let size = size_value.as_int().unwrap_or(0);
            if size <= 0 {
                return Err(self.error(
                    id,
                    EvalErrorKind::TypeMismatch {
                        expected: "positive int".into(),
                        got: size_value.type_name().into(),
                    },
                    "chunk size must be a positive integer",
                ));
            }
            let size = size.unsigned_abs() as usize;
            let values: Vec<Value> = entries.into_iter().map(|(_, v)| v).collect();
            for (index, chunk) in values.chunks(size).enumerate() {
                let entry = (
                    Value::int(i64::try_from(index).unwrap_or(i64::MAX)),
                    Value::list(chunk.to_vec()),
                );
                match self.run_loop_body(key_var, value_var, entry, body)? {
                    LoopStep::Continue(value) => {
                        if produces_value {
                            produced.push(value);
                        }
                    }
                    LoopStep::Break => break,
                }
            }
        } else {
            for entry in entries {
                match self.run_loop_body(key_var, value_var, entry, body)? {
                    LoopStep::Continue(value) => {
                        if produces_value {
                            produced.push(value);
                        }
                    }
                    LoopStep::Break => break,
                }
            }
        }
        if produces_value {
            Ok(Value::list(produced))
        } else {
            Ok(Value::Nil)
        }
    }

    /// Key/value entries of an iterable.
    fn iterate(&self, id: NodeId, subject: &Value) -> Result<Vec<(Value, Value)>, EvalSignal> {
        let index = |i: usize| Value::int(i64::try_from(i).unwrap_or(i64::MAX));
        let entries = match subject {
            Value::List(list) => list
                .snapshot()
                .into_iter()
                .enumerate()
                .map(|(i, v)| (index(i), v))
                .collect(),
            Value::Tuple(items) => items
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, v)| (index(i), v))
                .collect(),
            Value::IntRange(range) => range
                .iter()
                .enumerate()
                .map(|(i, n)| (index(i), Value::int(n)))
                .collect(),
            Value::RuneRange(range) => (range.start..=range.end)
                .enumerate()
                .map(|(i, c)| (index(i), Value::Rune(c)))
                .collect(),
            Value::Str(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (index(i), Value::Rune(c)))
                .collect(),
            Value::ByteSlice(bytes) => bytes
                .iter()
                .enumerate()
                .map(|(i, b)| (index(i), Value::Byte(*b)))
                .collect(),
            Value::Object(object) => object
                .entries()
                .into_iter()
                .map(|(k, v)| (Value::string(k), v))
                .collect(),
            Value::Record(record) => record
                .entries()
                .iter()
                .map(|(k, v)| (Value::string(k.clone()), v.clone()))
                .collect(),
            Value::Dict(dict) => dict.snapshot(),
            _ => {
                return Err(self.error(
                    id,
                    EvalErrorKind::TypeMismatch {
                        expected: "iterable".into(),
                        got: subject.type_name().into(),
                    },
                    format!("{} is not iterable", subject.type_name()),
                ))
            }
        };
        Ok(entries)
    }

    fn run_loop_body(
        &mut self,
        key_var: Option<Name>,
        value_var: Option<Name>,
        entry: (Value, Value),
        body: NodeId,
    ) -> Result<LoopStep, EvalSignal> {
        self.push_scope();
        if let Some(key_var) = key_var {
            self.define_local(key_var, entry.0);
        }
        if let Some(value_var) = value_var {
            self.define_local(value_var, entry.1);
        }
        let result = self.eval_node(body);
        self.pop_scope();
        match result {
            Ok(value) => Ok(LoopStep::Continue(value)),
            Err(EvalSignal::Continue) => Ok(LoopStep::Continue(Value::Nil)),
            Err(EvalSignal::Break) => Ok(LoopStep::Break),
            Err(other) => Err(other),
        }
    }

    pub(crate) fn eval_walk(
        &mut self,
        id: NodeId,
        walked: NodeId,
        entry_var: Name,
        body: NodeId,
    ) -> EvalResult {
        let subject = self.eval_node(walked)?;
        let Value::Treedata(tree) = &subject else {
            return Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "treedata".into(),
                    got: subject.type_name().into(),
                },
                "walk requires a treedata value",
            ));
        };
        let tree: Treedata = (**tree).clone();
        // The walk-start entry is always yielded first.
        match self.walk_entry(entry_var, tree.root.clone(), body)? {
            WalkStep::Stop => return Ok(Value::Nil),
            WalkStep::Prune => return Ok(Value::Nil),
            WalkStep::Descend => {}
        }
        let mut stack: Vec<TreedataNode> = tree.children.into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            match self.walk_entry(entry_var, node.value.clone(), body)? {
                WalkStep::Stop => break,
                // Prune skips the subtree rooted at the current entry.
                WalkStep::Prune => continue,
                WalkStep::Descend => {
                    for child in node.children.into_iter().rev() {
                        stack.push(child);
                    }
                }
            }
        }
        Ok(Value::Nil)
    }

    fn walk_entry(
        &mut self,
        entry_var: Name,
        entry: Value,
        body: NodeId,
    ) -> Result<WalkStep, EvalSignal> {
        self.push_scope();
        self.define_local(entry_var, entry);
        let result = self.eval_node(body);
        self.pop_scope();
        match result {
            Ok(_) | Err(EvalSignal::Continue) => Ok(WalkStep::Descend),
            Err(EvalSignal::Prune) => Ok(WalkStep::Prune),
            Err(EvalSignal::Break) => Ok(WalkStep::Stop),
            Err(other) => Err(other),
        }
    }

    /// `synchronized(values) { body }` takes each object's lock for the
    /// duration of the block.
    pub(crate) fn eval_synchronized(
        &mut self,
        id: NodeId,
        values: &[NodeId],
        body: NodeId,
    ) -> EvalResult {
        let mut objects: Vec<Object> = Vec::with_capacity(values.len());
        for value_id in values {
            let value = self.eval_node(*value_id)?;
            match value {
                Value::Object(object) => objects.push(object),
                // Immutables need no synchronization.
                ref v if rill_values::is_sharable(v) => {}
                other => {
                    return Err(self.error(
                        id,
                        EvalErrorKind::TypeMismatch {
                            expected: "object".into(),
                            got: other.type_name().into(),
                        },
                        "synchronized requires objects or immutables",
                    ))
                }
            }
        }
        let guards: Vec<rill_values::ObjectGuard<'_>> =
            objects.iter().map(Object::lock).collect();
        let result = self.eval_node(body);
        drop(guards);
        result
    }
}

enum LoopStep {
    Continue(Value),
    Break,
}

enum WalkStep {
    Descend,
    Prune,
    Stop,
}
