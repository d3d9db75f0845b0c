//! Binary/unary operators, member access, indexing and slicing.
//!
//! Integer arithmetic is checked: overflow, underflow and division by
//! zero are distinct error kinds, and division truncates toward zero.
//! Float operations fail on NaN/infinite operands and results.

use rill_ir::{BinaryOp, Name, NodeId, UnaryOp};
use rill_values::{container, equality, Value};

use crate::errors::EvalErrorKind;
use crate::errors::EvalResult;
use crate::interpreter::Evaluator;

impl Evaluator {
    pub(crate) fn eval_binary(
        &mut self,
        id: NodeId,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> EvalResult {
        // Logical operators short-circuit; everything else evaluates both
        // operands first, left to right.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.eval_logical(id, op, lhs, rhs);
        }
        let left = self.eval_node(lhs)?;
        let right = self.eval_node(rhs)?;
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                self.eval_arithmetic(id, op, &left, &right)
            }
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                self.eval_comparison(id, op, &left, &right)
            }
            BinaryOp::Eq => Ok(Value::Bool(equality::values_equal(&left, &right))),
            BinaryOp::NotEq => Ok(Value::Bool(!equality::values_equal(&left, &right))),
            BinaryOp::In => match container::contains(&right, &left) {
                Some(found) => Ok(Value::Bool(found)),
                None => Err(self.error(
                    id,
                    EvalErrorKind::TypeMismatch {
                        expected: "container".into(),
                        got: right.type_name().into(),
                    },
                    format!("`in` requires a container, got {}", right.type_name()),
                )),
            },
            BinaryOp::Concat => self.eval_concat(id, &left, &right),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_logical(&mut self, id: NodeId, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> EvalResult {
        let left = self.eval_node(lhs)?;
        let Value::Bool(left) = left else {
            return Err(self.boolean_expected(id, &left));
        };
        match (op, left) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => {
                let right = self.eval_node(rhs)?;
                let Value::Bool(right) = right else {
                    return Err(self.boolean_expected(id, &right));
                };
                Ok(Value::Bool(right))
            }
        }
    }

    fn eval_arithmetic(&self, id: NodeId, op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => {
                let result = match op {
                    BinaryOp::Add => a.checked_add(*b),
                    BinaryOp::Sub => a.checked_sub(*b),
                    BinaryOp::Mul => a.checked_mul(*b),
                    BinaryOp::Div => a.checked_div(*b),
                    _ => unreachable!("arithmetic op"),
                };
                result
                    .map(Value::Int)
                    .map_err(|e| self.locate(id, e.into()))
            }
            (Value::Float(a), Value::Float(b)) => {
                if !a.is_finite() || !b.is_finite() {
                    return Err(self.error(
                        id,
                        EvalErrorKind::NaNInfinityOperand,
                        "NaN or infinite operand",
                    ));
                }
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => unreachable!("arithmetic op"),
                };
                if !result.is_finite() {
                    return Err(self.error(
                        id,
                        EvalErrorKind::NaNInfinityResult,
                        "NaN or infinite result",
                    ));
                }
                Ok(Value::Float(result))
            }
            (Value::Duration(a), Value::Duration(b)) => {
                let result = match op {
                    BinaryOp::Add => a.checked_add(*b),
                    BinaryOp::Sub => a.checked_sub(*b),
                    _ => {
                        return Err(self.invalid_operands(id, op, left, right));
                    }
                };
                result
                    .map(Value::Duration)
                    .map_err(|e| self.locate(id, e.into()))
            }
            (Value::Duration(d), Value::Int(n)) | (Value::Int(n), Value::Duration(d))
                if op == BinaryOp::Mul =>
            {
                d.checked_mul(n.raw())
                    .map(Value::Duration)
                    .map_err(|e| self.locate(id, e.into()))
            }
            _ => Err(self.invalid_operands(id, op, left, right)),
        }
    }

    fn eval_comparison(&self, id: NodeId, op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
        let ordering = match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.raw().partial_cmp(&b.raw()),
            (Value::Float(a), Value::Float(b)) => {
                if !a.is_finite() || !b.is_finite() {
                    return Err(self.error(
                        id,
                        EvalErrorKind::NaNInfinityOperand,
                        "NaN or infinite operand",
                    ));
                }
                a.partial_cmp(b)
            }
            (Value::Str(a), Value::Str(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Rune(a), Value::Rune(b)) => Some(a.cmp(b)),
            (Value::Byte(a), Value::Byte(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return Err(self.invalid_operands(id, op, left, right));
        };
        let result = match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::LtEq => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            BinaryOp::GtEq => ordering.is_ge(),
            _ => unreachable!("comparison op"),
        };
        Ok(Value::Bool(result))
    }

    fn eval_concat(&self, id: NodeId, left: &Value, right: &Value) -> EvalResult {
        match (left, right) {
            (Value::Str(a), Value::Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::string(s))
            }
            (Value::ByteSlice(a), Value::ByteSlice(b)) => {
                let mut bytes = Vec::with_capacity(a.len() + b.len());
                bytes.extend_from_slice(a);
                bytes.extend_from_slice(b);
                Ok(Value::byte_slice(bytes))
            }
            (Value::List(a), Value::List(b)) => {
                let mut items = a.snapshot();
                items.extend(b.snapshot());
                Ok(Value::list(items))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                let mut items = a.to_vec();
                items.extend(b.iter().cloned());
                Ok(Value::tuple(items))
            }
            _ => Err(self.invalid_operands(id, BinaryOp::Concat, left, right)),
        }
    }

    pub(crate) fn eval_unary(&mut self, id: NodeId, op: UnaryOp, operand: NodeId) -> EvalResult {
        let value = self.eval_node(operand)?;
        match (op, &value) {
            (UnaryOp::Neg, Value::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .map_err(|e| self.locate(id, e.into())),
            (UnaryOp::Neg, Value::Float(f)) => {
                if !f.is_finite() {
                    return Err(self.error(
                        id,
                        EvalErrorKind::NaNInfinityOperand,
                        "NaN or infinite operand",
                    ));
                }
                Ok(Value::Float(-f))
            }
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            _ => Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "int, float or bool".into(),
                    got: value.type_name().into(),
                },
                format!("invalid operand for unary operator: {}", value.type_name()),
            )),
        }
    }

    // Access

    pub(crate) fn eval_member(&mut self, id: NodeId, object: NodeId, name: Name) -> EvalResult {
        let subject = self.eval_node(object)?;
        let key = self.name_of(name);
        let found = match &subject {
            Value::Object(o) => o.get(&key),
            Value::Record(r) => r.get(&key).cloned(),
            Value::Namespace(ns) => ns.get(&key).cloned(),
            Value::Struct(s) => s.field(name).cloned(),
            Value::StructPointer(p) => p.field(name),
            Value::Error(e) => match key.as_str() {
                "id" => Some(Value::string(e.id.clone())),
                "message" => Some(Value::string(e.message.clone())),
                "data" => Some(e.data.clone()),
                _ => None,
            },
            _ => {
                return Err(self.error(
                    id,
                    EvalErrorKind::TypeMismatch {
                        expected: "object-like value".into(),
                        got: subject.type_name().into(),
                    },
                    format!("cannot access member on {}", subject.type_name()),
                ))
            }
        };
        found.ok_or_else(|| {
            self.error(
                id,
                EvalErrorKind::CollectionElementNotFound,
                format!("no member `{key}`"),
            )
        })
    }

    pub(crate) fn eval_index(&mut self, id: NodeId, indexed: NodeId, index: NodeId) -> EvalResult {
        let subject = self.eval_node(indexed)?;
        let index_value = self.eval_node(index)?;
        match (&subject, &index_value) {
            (Value::List(list), Value::Int(i)) => {
                let i = self.nonneg_index(id, i.raw())?;
                list.get(i).ok_or_else(|| {
                    self.out_of_bounds(id, i, list.len())
                })
            }
            (Value::Tuple(items), Value::Int(i)) => {
                let i = self.nonneg_index(id, i.raw())?;
                items
                    .get(i)
                    .cloned()
                    .ok_or_else(|| self.out_of_bounds(id, i, items.len()))
            }
            (Value::Str(s), Value::Int(i)) => {
                let i = self.nonneg_index(id, i.raw())?;
                s.chars()
                    .nth(i)
                    .map(Value::Rune)
                    .ok_or_else(|| self.out_of_bounds(id, i, s.chars().count()))
            }
            (Value::ByteSlice(bytes), Value::Int(i)) => {
                let i = self.nonneg_index(id, i.raw())?;
                bytes
                    .get(i)
                    .copied()
                    .map(Value::Byte)
                    .ok_or_else(|| self.out_of_bounds(id, i, bytes.len()))
            }
            (Value::Dict(dict), key) => dict.get(key).ok_or_else(|| {
                self.error(
                    id,
                    EvalErrorKind::CollectionElementNotFound,
                    format!("no entry for key {key}"),
                )
            }),
            (Value::Object(object), Value::Str(key)) => object.get(key).ok_or_else(|| {
                self.error(
                    id,
                    EvalErrorKind::CollectionElementNotFound,
                    format!("no entry `{}`", &**key),
                )
            }),
            (Value::Record(record), Value::Str(key)) => {
                record.get(key).cloned().ok_or_else(|| {
                    self.error(
                        id,
                        EvalErrorKind::CollectionElementNotFound,
                        format!("no entry `{}`", &**key),
                    )
                })
            }
            _ => Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "indexable value".into(),
                    got: subject.type_name().into(),
                },
                format!(
                    "cannot index {} with {}",
                    subject.type_name(),
                    index_value.type_name()
                ),
            )),
        }
    }

    pub(crate) fn eval_slice(
        &mut self,
        id: NodeId,
        indexed: NodeId,
        start: Option<NodeId>,
        end: Option<NodeId>,
    ) -> EvalResult {
        let subject = self.eval_node(indexed)?;
        let start = match start {
            Some(node) => self.eval_index_bound(node)?,
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
                let raw = self.eval_index_bound(node)?;
                usize::try_from(raw).unwrap_or(0)
            }
            None => usize::MAX,
        };
        match &subject {
            Value::List(list) => {
                let end = end.min(list.len());
                Ok(Value::list(list.slice(start, end)))
            }
            Value::Tuple(items) => {
                let end = end.min(items.len());
                let start = start.min(end);
                Ok(Value::tuple(items[start..end].to_vec()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let end = end.min(chars.len());
                let start = start.min(end);
                Ok(Value::string(chars[start..end].iter().collect::<String>()))
            }
            Value::ByteSlice(bytes) => {
                let end = end.min(bytes.len());
                let start = start.min(end);
                Ok(Value::byte_slice(bytes[start..end].to_vec()))
            }
            _ => Err(self.error(
                id,
                EvalErrorKind::TypeMismatch {
                    expected: "sliceable value".into(),
                    got: subject.type_name().into(),
                },
                format!("cannot slice {}", subject.type_name()),
            )),
        }
    }

    fn eval_index_bound(&mut self, node: NodeId) -> Result<i64, crate::errors::EvalSignal> {
        let value = self.eval_node(node)?;
        value.as_int().ok_or_else(|| {
            self.error(
                node,
                EvalErrorKind::TypeMismatch {
                    expected: "int".into(),
                    got: value.type_name().into(),
                },
                "index bounds must be integers",
            )
        })
    }

    // Error helpers

    fn nonneg_index(&self, id: NodeId, raw: i64) -> Result<usize, crate::errors::EvalSignal> {
        if raw < 0 {
            return Err(self.error(
                id,
                EvalErrorKind::NegativeLowerIndex,
                "index is negative",
            ));
        }
        Ok(raw.unsigned_abs() as usize)
    }

    fn out_of_bounds(&self, id: NodeId, index: usize, length: usize) -> crate::errors::EvalSignal {
        self.error(
            id,
            EvalErrorKind::IndexOutOfBounds {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                length,
            },
            format!("index {index} out of bounds (length {length})"),
        )
    }

    pub(crate) fn boolean_expected(&self, id: NodeId, got: &Value) -> crate::errors::EvalSignal {
        self.error(
            id,
            EvalErrorKind::TypeMismatch {
                expected: "bool".into(),
                got: got.type_name().into(),
            },
            format!("a boolean was expected, got {}", got.type_name()),
        )
    }

    fn invalid_operands(
        &self,
        id: NodeId,
        op: BinaryOp,
        left: &Value,
        right: &Value,
    ) -> crate::errors::EvalSignal {
        self.error(
            id,
            EvalErrorKind::TypeMismatch {
                expected: "matching operand types".into(),
                got: format!("{} and {}", left.type_name(), right.type_name()),
            },
            format!(
                "invalid operands for {op:?}: {} and {}",
                left.type_name(),
                right.type_name()
            ),
        )
    }
}
