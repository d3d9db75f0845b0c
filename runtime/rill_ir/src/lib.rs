//! AST, spans and interning for the Rill runtime.
//!
//! This crate is the leaf of the workspace: it defines the source
//! representation the evaluator walks and the identifiers everything else
//! keys on. It has no knowledge of values, permissions or scheduling.

mod ast;
mod interner;
mod name;
mod span;

pub use ast::{
    AssignTarget, BinaryOp, Chunk, ExtensionMember, LimitSpec, ManifestSpec, MatchCase, Module,
    Node, NodeId, ObjectPatternEntry, Param, ParamSpec, PermissionSpec, QueryParam, StrSegment,
    SwitchCase, UnaryOp,
};
pub use interner::{SharedInterner, StringInterner};
pub use name::{Name, StringLookup};
pub use span::{SourcePosition, SourcePositionStack, Span, SpanError};
