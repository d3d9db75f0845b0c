//! The embedder-facing AST.
//!
//! Rill does not ship a parser: embedders construct chunks directly. A
//! [`Chunk`] owns an id-indexed arena of [`Node`]s plus their spans; a
//! [`NodeId`] is valid only within its originating chunk and doubles as the
//! breakpoint identity used by the debugger.
//!
//! Statements and expressions share one closed enum. The evaluator gives
//! expression semantics to the nodes that have a value form (`if`, `switch`,
//! `match`, `for`) and statement semantics elsewhere.

use std::fmt;
use std::sync::Arc;

use crate::{Name, SourcePosition, Span};

/// Index of a node within its chunk's arena.
///
/// Also the node half of a breakpoint key: `(chunk name, NodeId)` identifies
/// a breakpoint site.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        NodeId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Binary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    And,
    Or,
    /// Containment test: `elem in container`.
    In,
    /// String/byte-slice concatenation.
    Concat,
}

/// Unary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// One segment of an interpolated string, path or URL template.
#[derive(Clone, Debug, PartialEq)]
pub enum StrSegment {
    /// Literal text written by the module author (trusted).
    Literal(String),
    /// An interpolated expression (untrusted; injection rules apply).
    Interpolation(NodeId),
}

/// A named query parameter of a URL template.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: Vec<StrSegment>,
}

/// A function parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Name,
    /// Type pattern the argument is matched against, when declared.
    pub pattern: Option<NodeId>,
    /// Variadic tail parameter: receives the packed extra arguments.
    pub variadic: bool,
}

/// Target of a single assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum AssignTarget {
    Variable(Name),
    Global(Name),
    Member { object: NodeId, name: Name },
    Index { indexed: NodeId, index: NodeId },
    Slice { indexed: NodeId, start: Option<NodeId>, end: Option<NodeId> },
}

/// One case of a `switch` statement.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    /// Values compared with the discriminant (any hit selects the case).
    pub values: Vec<NodeId>,
    pub body: NodeId,
}

/// One case of a `match` statement.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchCase {
    /// Pattern expression the discriminant is matched against.
    pub pattern: NodeId,
    /// Variable bound to the discriminant inside the case, when named.
    pub binding: Option<Name>,
    pub body: NodeId,
}

/// One entry of an object pattern literal.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPatternEntry {
    pub key: String,
    pub pattern: NodeId,
    pub optional: bool,
}

/// One member of an `extend` statement.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtensionMember {
    pub name: Name,
    /// A `FnExpr` node; invoked with `self` bound to the matched subject.
    pub method: NodeId,
    /// Computed property: evaluated with zero arguments on access.
    pub computed: bool,
}

/// A permission requirement as written in a manifest or spawn envelope.
///
/// Plain data: `rill_core` parses and validates it against the concrete
/// permission families.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PermissionSpec {
    /// Permission kind: `read`, `write`, `update`, `delete`, `use`,
    /// `create`, `provide`.
    pub kind: String,
    /// Permission family: `fs`, `http`, `db`, `lthread`, `globalvar`, `cmd`.
    pub family: String,
    /// Entity the permission applies to (path, URL, host, name or `*`).
    pub entity: String,
}

/// A resource limit declared by a manifest.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LimitSpec {
    pub name: String,
    /// Bucket capacity or total count.
    pub amount: u64,
    /// Tokens per second for rate limits; `None` for one-shot totals.
    pub refill_per_second: Option<u64>,
}

/// A module parameter declared by a manifest.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParamSpec {
    /// Parameter name; positional parameters are unnamed.
    pub name: Option<String>,
    /// Name of the pattern the argument must match.
    pub pattern: String,
}

/// A module manifest: what the module needs before it runs.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManifestSpec {
    pub permissions: Vec<PermissionSpec>,
    pub parameters: Vec<ParamSpec>,
    pub limits: Vec<LimitSpec>,
    /// Hosts this module provides (servers it is allowed to bind).
    pub provided_hosts: Vec<String>,
    /// Opaque database resolution entries (`name -> resource`).
    pub databases: Vec<(String, String)>,
}

/// A module: a main chunk plus its manifest.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub name: String,
    pub main_chunk: Arc<Chunk>,
    pub manifest: ManifestSpec,
}

impl Module {
    pub fn new(name: impl Into<String>, main_chunk: Arc<Chunk>) -> Self {
        Module {
            name: name.into(),
            main_chunk,
            manifest: ManifestSpec::default(),
        }
    }

    #[must_use]
    pub fn with_manifest(mut self, manifest: ManifestSpec) -> Self {
        self.manifest = manifest;
        self
    }
}

/// AST node: statements and expressions in one closed union.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    // Literals
    NilLiteral,
    BoolLiteral(bool),
    IntLiteral(i64),
    FloatLiteral(f64),
    StrLiteral(String),
    /// Duration literal in milliseconds.
    DurationLiteral(u64),
    ByteLiteral(u8),
    RuneLiteral(char),
    PathLiteral(String),
    PathPatternLiteral(String),
    UrlLiteral(String),
    HostLiteral(String),
    SchemeLiteral(String),
    PropertyNameLiteral(String),
    IdentifierLiteral(String),

    // Templates (interpolation; injection rules enforced by the evaluator)
    /// `%/app/{name}` — absolute path built from segments.
    PathTemplate { segments: Vec<StrSegment> },
    /// Path pattern with interpolations; `*` forbidden in interpolated parts.
    PathPatternTemplate { segments: Vec<StrSegment> },
    /// URL built from a trusted base plus interpolated path/query parts.
    UrlTemplate {
        base: String,
        path: Vec<StrSegment>,
        query: Vec<QueryParam>,
    },
    /// String template; `pattern` names the checked-string pattern, if any.
    StrTemplate {
        pattern: Option<Name>,
        segments: Vec<StrSegment>,
    },

    // Compound literals
    ListLiteral(Vec<NodeId>),
    TupleLiteral(Vec<NodeId>),
    ObjectLiteral(Vec<(String, NodeId)>),
    RecordLiteral(Vec<(String, NodeId)>),
    DictLiteral(Vec<(NodeId, NodeId)>),

    // Variables
    /// Local variable reference, falling back to globals.
    Var(Name),
    /// Explicit global variable reference.
    GlobalVar(Name),
    /// The anonymous pipeline variable `$`.
    Anonymous,

    // Operators
    Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },
    Unary { op: UnaryOp, operand: NodeId },

    // Access
    Member { object: NodeId, name: Name },
    Index { indexed: NodeId, index: NodeId },
    Slice { indexed: NodeId, start: Option<NodeId>, end: Option<NodeId> },
    /// Extension access `x::m`.
    ExtensionAccess { subject: NodeId, member: Name },

    // Calls
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
        /// Spread of the final list argument into a variadic tail.
        spread_arg: Option<NodeId>,
        /// Must-call suffix `f!()`.
        must: bool,
    },

    // Functions
    FnDecl { name: Name, function: NodeId },
    FnExpr {
        params: Vec<Param>,
        body: NodeId,
        /// Globals explicitly captured (frozen) at definition time.
        captured_globals: Vec<Name>,
        /// Locals captured by closures.
        captured_locals: Vec<Name>,
    },

    // Statements
    Block(Vec<NodeId>),
    Assignment { target: AssignTarget, rhs: NodeId },
    MultiAssignment {
        targets: Vec<Name>,
        rhs: NodeId,
        /// Missing RHS elements bind to Nil instead of failing.
        nillable: bool,
    },
    GlobalConstDecl { name: Name, rhs: NodeId },
    If {
        test: NodeId,
        consequent: NodeId,
        alternate: Option<NodeId>,
    },
    Switch {
        discriminant: NodeId,
        cases: Vec<SwitchCase>,
        default: Option<NodeId>,
    },
    Match {
        discriminant: NodeId,
        cases: Vec<MatchCase>,
        default: Option<NodeId>,
    },
    For {
        key_var: Option<Name>,
        value_var: Option<Name>,
        iterated: NodeId,
        body: NodeId,
        /// `chunked chunk in streamable`: yield arrays of up to this size.
        chunk_size: Option<NodeId>,
        /// Expression form: collect each iteration's body value into a list.
        produces_value: bool,
    },
    Walk {
        walked: NodeId,
        entry_var: Name,
        body: NodeId,
    },
    Break,
    Continue,
    /// Skip the subtree rooted at the current directory (walk only).
    Prune,
    Return(Option<NodeId>),
    /// `a | b $`: each later stage runs with `$` bound to the prior result.
    Pipeline { stages: Vec<NodeId> },
    Synchronized { values: Vec<NodeId>, body: NodeId },

    // Concurrency
    Spawn {
        /// Globals passed to the child, by name.
        globals: Vec<(Name, NodeId)>,
        /// Permission envelope; each entry must be covered by the spawner.
        allow: Vec<PermissionSpec>,
        /// LThread group the spawned thread is attached to.
        group: Option<NodeId>,
        body: NodeId,
    },

    // Imports
    /// Inclusion import: the included chunk's top-level declarations are
    /// evaluated in the importer's environment; positions keep the included
    /// chunk's source name.
    InclusionImport { chunk: Arc<Chunk> },
    /// Module import: executes the module in a fresh LThread and binds the
    /// returned value.
    ModuleImport { binding: Name, module: Arc<Module> },

    // Patterns
    PatternDefinition { name: Name, rhs: NodeId },
    PatternIdent(Name),
    ExactValuePattern(NodeId),
    ObjectPatternLiteral { entries: Vec<ObjectPatternEntry> },
    ListPatternLiteral {
        elements: Option<Vec<NodeId>>,
        general: Option<NodeId>,
    },
    UnionPatternLiteral(Vec<NodeId>),
    IntRangePattern { start: Option<i64>, end: Option<i64> },

    // Extensions
    Extend { pattern: NodeId, members: Vec<ExtensionMember> },

    // Structs
    StructDecl { name: Name, fields: Vec<Name> },
    StructInit { type_name: Name, fields: Vec<(Name, NodeId)> },

    // Testing
    Testsuite { name: Option<NodeId>, body: NodeId },
    Testcase { name: Option<NodeId>, body: NodeId },
}

impl Node {
    /// Whether the debugger treats this node as a statement boundary.
    ///
    /// The evaluator calls `before_instruction` only for these nodes; a
    /// breakpoint on any other node never fires.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Node::Assignment { .. }
                | Node::MultiAssignment { .. }
                | Node::GlobalConstDecl { .. }
                | Node::FnDecl { .. }
                | Node::If { .. }
                | Node::Switch { .. }
                | Node::Match { .. }
                | Node::For { .. }
                | Node::Walk { .. }
                | Node::Break
                | Node::Continue
                | Node::Prune
                | Node::Return(_)
                | Node::Pipeline { .. }
                | Node::Synchronized { .. }
                | Node::Spawn { .. }
                | Node::InclusionImport { .. }
                | Node::ModuleImport { .. }
                | Node::PatternDefinition { .. }
                | Node::Extend { .. }
                | Node::StructDecl { .. }
                | Node::Testsuite { .. }
                | Node::Testcase { .. }
                | Node::Call { .. }
        )
    }
}

/// A parsed source chunk: node arena, spans, and the top-level statements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    /// Source name (module path or inclusion name); reported in positions.
    pub name: String,
    /// Source text, used to resolve spans to line/column.
    pub source: String,
    nodes: Vec<Node>,
    spans: Vec<Span>,
    top_level: Vec<NodeId>,
}

impl Chunk {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Chunk {
            name: name.into(),
            source: source.into(),
            nodes: Vec::new(),
            spans: Vec::new(),
            top_level: Vec::new(),
        }
    }

    /// Add a node with its span, returning its id.
    pub fn add(&mut self, node: Node, span: Span) -> NodeId {
        let id = NodeId::new(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        self.spans.push(span);
        id
    }

    /// Set the ordered top-level statements.
    pub fn set_top_level(&mut self, statements: Vec<NodeId>) {
        self.top_level = statements;
    }

    pub fn top_level(&self) -> &[NodeId] {
        &self.top_level
    }

    /// Get a node by id.
    ///
    /// Ids from a different chunk's arena resolve to arbitrary nodes or
    /// `None`; callers must not mix arenas.
    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    #[inline]
    pub fn span(&self, id: NodeId) -> Span {
        self.spans.get(id.index()).copied().unwrap_or(Span::DUMMY)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Resolve a span to a 1-based line/column position in this chunk.
    pub fn position(&self, span: Span) -> SourcePosition {
        let (line, column) = self.line_column(span.start);
        SourcePosition {
            chunk_name: self.name.clone(),
            line,
            column,
            span,
        }
    }

    /// Position of a node.
    pub fn node_position(&self, id: NodeId) -> SourcePosition {
        self.position(self.span(id))
    }

    /// 1-based line and column of a byte offset.
    pub fn line_column(&self, offset: u32) -> (u32, u32) {
        let offset = (offset as usize).min(self.source.len());
        let mut line = 1u32;
        let mut column = 1u32;
        for byte in self.source.as_bytes()[..offset].iter() {
            if *byte == b'\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }

    /// First statement-bearing node on a 1-based source line.
    ///
    /// Used by line breakpoints: empty lines resolve to `None` and never
    /// fire.
    pub fn first_statement_on_line(&self, line: u32) -> Option<NodeId> {
        let mut best: Option<(u32, NodeId)> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            if !node.is_statement() {
                continue;
            }
            let id = NodeId::new(u32::try_from(index).unwrap_or(u32::MAX));
            let span = self.span(id);
            let (node_line, _) = self.line_column(span.start);
            if node_line == line {
                match best {
                    Some((start, _)) if start <= span.start => {}
                    _ => best = Some((span.start, id)),
                }
            }
        }
        best.map(|(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_assigns_sequential_ids() {
        let mut chunk = Chunk::new("mod", "a = 1\n");
        let a = chunk.add(Node::IntLiteral(1), Span::new(4, 5));
        let b = chunk.add(Node::NilLiteral, Span::new(0, 1));
        assert_eq!(a, NodeId::new(0));
        assert_eq!(b, NodeId::new(1));
        assert_eq!(chunk.node(a), Some(&Node::IntLiteral(1)));
    }

    #[test]
    fn line_column_counts_newlines() {
        let chunk = Chunk::new("mod", "a = 1\nb = 2\n");
        assert_eq!(chunk.line_column(0), (1, 1));
        assert_eq!(chunk.line_column(6), (2, 1));
        assert_eq!(chunk.line_column(10), (2, 5));
    }

    #[test]
    fn first_statement_on_line_skips_expressions() {
        let mut chunk = Chunk::new("mod", "a = 1\n\nb = 2\n");
        let one = chunk.add(Node::IntLiteral(1), Span::new(4, 5));
        let assign_a = chunk.add(
            Node::Assignment {
                target: AssignTarget::Variable(Name::from_raw(0)),
                rhs: one,
            },
            Span::new(0, 5),
        );
        let two = chunk.add(Node::IntLiteral(2), Span::new(11, 12));
        let assign_b = chunk.add(
            Node::Assignment {
                target: AssignTarget::Variable(Name::from_raw(1)),
                rhs: two,
            },
            Span::new(7, 12),
        );
        chunk.set_top_level(vec![assign_a, assign_b]);

        assert_eq!(chunk.first_statement_on_line(1), Some(assign_a));
        assert_eq!(chunk.first_statement_on_line(2), None);
        assert_eq!(chunk.first_statement_on_line(3), Some(assign_b));
    }
}
