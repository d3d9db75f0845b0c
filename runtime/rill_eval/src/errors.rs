//! Evaluation errors and control-flow signals.
//!
//! The evaluator's result chain carries either a value, a located error,
//! or a control-flow signal (`break`/`continue`/`prune`/`return`) that
//! ascends frames until a loop or function boundary handles it.

use std::fmt;

use rill_ir::{SourcePosition, SourcePositionStack};
use rill_values::{ArithmeticError, ObjectError, QuantityError, ShareError, Value};

use rill_core::{
    CancellationReason, EffectError, LimitError, PermissionError, TransactionError,
};

/// Typed error category with a stable identifier.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalErrorKind {
    // Permissions / environment
    NotAllowed(String),
    LimitDepleted(String),
    ContextCancelled(CancellationReason),

    // Integer arithmetic
    IntOverflow,
    IntUnderflow,
    IntDivisionByZero,
    NegationWithOverflow,

    // Float arithmetic
    NaNInfinityOperand,
    NaNInfinityResult,

    // Quantities
    QuantityOverflow,
    QuantityUnderflow,
    QuantityTooLarge,

    // Indexing / collections
    NegativeLowerIndex,
    IndexOutOfBounds { index: i64, length: usize },
    CollectionElementNotFound,

    // Transactions / effects
    EffectAlreadyApplied,
    Irreversible,
    CannotAddIrreversibleEffect,
    AlreadyHasTransaction,
    FinishedTransaction,
    CommitFailed(String),

    // Sharing
    CannotAddNonSharableToSharedContainer,
    NotSharableNorClonable,

    // Interpolation injection prevention
    PathInterpolationForbiddenChar(char),
    PathInterpolationParentDir,
    PathPatternInterpolationGlob,
    UrlQueryInterpolationForbiddenChar(char),
    UrlPathInterpolationForbiddenChar(char),
    UrlPathInterpolationBacktracking,
    CheckedStringMismatch { pattern: String },

    // Variables / calls / types
    UndefinedVariable(String),
    UndefinedGlobal(String),
    AssignmentToConstantGlobal(String),
    NotCallable(String),
    ArityMismatch { expected: usize, got: usize },
    SpreadArgumentRequiresVariadic,
    TypeMismatch { expected: String, got: String },
    ConstraintViolated(String),
    InvalidElementKey(String),
    MultiAssignmentArityMismatch { expected: usize, got: usize },
    ExtensionMemberNotFound(String),
    NonExhaustiveMatch,

    // Errors raised by user code / propagated error values
    Raised(Value),

    // Infrastructure
    StackOverflow,
    InvalidNode(String),
}

impl EvalErrorKind {
    /// Stable identifier surfaced to user code.
    pub fn id(&self) -> &'static str {
        match self {
            EvalErrorKind::NotAllowed(_) => "NotAllowed",
            EvalErrorKind::LimitDepleted(_) => "LimitDepleted",
            EvalErrorKind::ContextCancelled(_) => "ContextCancelled",
            EvalErrorKind::IntOverflow => "IntOverflow",
            EvalErrorKind::IntUnderflow => "IntUnderflow",
            EvalErrorKind::IntDivisionByZero => "IntDivisionByZero",
            EvalErrorKind::NegationWithOverflow => "NegationWithOverflow",
            EvalErrorKind::NaNInfinityOperand => "NaNinfinityOperand",
            EvalErrorKind::NaNInfinityResult => "NaNinfinityResult",
            EvalErrorKind::QuantityOverflow => "QuantityOverflow",
            EvalErrorKind::QuantityUnderflow => "QuantityUnderflow",
            EvalErrorKind::QuantityTooLarge => "QuantityTooLarge",
            EvalErrorKind::NegativeLowerIndex => "NegativeLowerIndex",
            EvalErrorKind::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            EvalErrorKind::CollectionElementNotFound => "CollectionElementNotFound",
            EvalErrorKind::EffectAlreadyApplied => "EffectAlreadyApplied",
            EvalErrorKind::Irreversible => "Irreversible",
            EvalErrorKind::CannotAddIrreversibleEffect => "CannotAddIrreversibleEffect",
            EvalErrorKind::AlreadyHasTransaction => "AlreadyHasTransaction",
            EvalErrorKind::FinishedTransaction => "FinishedTransaction",
            EvalErrorKind::CommitFailed(_) => "CommitFailed",
            EvalErrorKind::CannotAddNonSharableToSharedContainer => {
                "CannotAddNonSharableToSharedContainer"
            }
            EvalErrorKind::NotSharableNorClonable => "NotSharableNorClonable",
            EvalErrorKind::PathInterpolationForbiddenChar(_) => "PathInterpolationForbiddenChar",
            EvalErrorKind::PathInterpolationParentDir => "PathInterpolationParentDir",
            EvalErrorKind::PathPatternInterpolationGlob => "PathPatternInterpolationGlob",
            EvalErrorKind::UrlQueryInterpolationForbiddenChar(_) => {
                "UrlQueryInterpolationForbiddenChar"
            }
            EvalErrorKind::UrlPathInterpolationForbiddenChar(_) => {
                "UrlPathInterpolationForbiddenChar"
            }
            EvalErrorKind::UrlPathInterpolationBacktracking => "UrlPathInterpolationBacktracking",
            EvalErrorKind::CheckedStringMismatch { .. } => "CheckedStringMismatch",
            EvalErrorKind::UndefinedVariable(_) => "UndefinedVariable",
            EvalErrorKind::UndefinedGlobal(_) => "UndefinedGlobal",
            EvalErrorKind::AssignmentToConstantGlobal(_) => "AssignmentToConstantGlobal",
            EvalErrorKind::NotCallable(_) => "NotCallable",
            EvalErrorKind::ArityMismatch { .. } => "ArityMismatch",
            EvalErrorKind::SpreadArgumentRequiresVariadic => "SpreadArgumentRequiresVariadic",
            EvalErrorKind::TypeMismatch { .. } => "TypeMismatch",
            EvalErrorKind::ConstraintViolated(_) => "ConstraintViolated",
            EvalErrorKind::InvalidElementKey(_) => "InvalidElementKey",
            EvalErrorKind::MultiAssignmentArityMismatch { .. } => "MultiAssignmentArityMismatch",
            EvalErrorKind::ExtensionMemberNotFound(_) => "ExtensionMemberNotFound",
            EvalErrorKind::NonExhaustiveMatch => "NonExhaustiveMatch",
            EvalErrorKind::Raised(_) => "Raised",
            EvalErrorKind::StackOverflow => "StackOverflow",
            EvalErrorKind::InvalidNode(_) => "InvalidNode",
        }
    }
}

/// A located evaluation error: kind, message and source-position stack.
#[derive(Clone, Debug)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    /// Outermost call site first; one frame per chunk boundary.
    pub position_stack: SourcePositionStack,
    /// Whether the exception breakpoint hook already observed this error
    /// (one stop per exception).
    pub(crate) hook_fired: bool,
}

impl PartialEq for EvalError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.message == other.message
            && self.position_stack == other.position_stack
    }
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        EvalError {
            kind,
            message: message.into(),
            position_stack: SourcePositionStack::new(),
            hook_fired: false,
        }
    }

    /// Attach the failing node's position as the innermost frame, if the
    /// error does not carry one yet.
    pub fn with_position(mut self, position: SourcePosition) -> Self {
        if self.position_stack.is_empty() {
            self.position_stack.push_inner(position);
        }
        self
    }

    /// Prepend a caller frame (chunk-boundary crossing).
    pub fn with_outer_frame(mut self, position: SourcePosition) -> Self {
        self.position_stack.push_outer(position);
        self
    }

    /// Stable identifier of the error kind.
    ///
    /// Propagated error values keep their original identifier.
    pub fn id(&self) -> &str {
        if let EvalErrorKind::Raised(Value::Error(data)) = &self.kind {
            &data.id
        } else {
            self.kind.id()
        }
    }

    /// Convert to an error value for user code.
    pub fn to_value(&self) -> Value {
        let mut data = rill_values::ErrorData::new(self.id(), self.message.clone());
        data.position_stack = self.position_stack.clone();
        Value::error(data)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id(), self.message)?;
        if !self.position_stack.is_empty() {
            write!(f, " ({})", self.position_stack)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

/// Signal ascending the evaluator's frames.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalSignal {
    Error(EvalError),
    Break,
    Continue,
    /// Walk-only: skip the subtree rooted at the current directory.
    Prune,
    Return(Value),
}

impl From<EvalError> for EvalSignal {
    fn from(e: EvalError) -> Self {
        EvalSignal::Error(e)
    }
}

/// Result of evaluating one node.
pub type EvalResult = Result<Value, EvalSignal>;

// Conversions from collaborator error types.

impl From<ArithmeticError> for EvalError {
    fn from(e: ArithmeticError) -> Self {
        let kind = match e {
            ArithmeticError::IntOverflow => EvalErrorKind::IntOverflow,
            ArithmeticError::IntUnderflow => EvalErrorKind::IntUnderflow,
            ArithmeticError::IntDivisionByZero => EvalErrorKind::IntDivisionByZero,
            ArithmeticError::NegationWithOverflow => EvalErrorKind::NegationWithOverflow,
        };
        EvalError::new(kind, e.to_string())
    }
}

impl From<QuantityError> for EvalError {
    fn from(e: QuantityError) -> Self {
        let kind = match e {
            QuantityError::QuantityOverflow => EvalErrorKind::QuantityOverflow,
            QuantityError::QuantityUnderflow => EvalErrorKind::QuantityUnderflow,
            QuantityError::QuantityTooLarge => EvalErrorKind::QuantityTooLarge,
        };
        EvalError::new(kind, e.to_string())
    }
}

impl From<PermissionError> for EvalError {
    fn from(e: PermissionError) -> Self {
        EvalError::new(EvalErrorKind::NotAllowed(e.to_string()), e.to_string())
    }
}

impl From<LimitError> for EvalError {
    fn from(e: LimitError) -> Self {
        EvalError::new(EvalErrorKind::LimitDepleted(e.to_string()), e.to_string())
    }
}

impl From<TransactionError> for EvalError {
    fn from(e: TransactionError) -> Self {
        let kind = match &e {
            TransactionError::AlreadyHasTransaction => EvalErrorKind::AlreadyHasTransaction,
            TransactionError::CannotAddIrreversibleEffect => {
                EvalErrorKind::CannotAddIrreversibleEffect
            }
            TransactionError::FinishedTransaction => EvalErrorKind::FinishedTransaction,
            TransactionError::CommitFailed(inner) | TransactionError::RollbackFailed(inner) => {
                EvalErrorKind::CommitFailed(inner.to_string())
            }
        };
        EvalError::new(kind, e.to_string())
    }
}

impl From<EffectError> for EvalError {
    fn from(e: EffectError) -> Self {
        let kind = match &e {
            EffectError::EffectAlreadyApplied => EvalErrorKind::EffectAlreadyApplied,
            EffectError::Irreversible => EvalErrorKind::Irreversible,
            _ => EvalErrorKind::CommitFailed(e.to_string()),
        };
        EvalError::new(kind, e.to_string())
    }
}

impl From<ShareError> for EvalError {
    fn from(e: ShareError) -> Self {
        EvalError::new(EvalErrorKind::NotSharableNorClonable, e.to_string())
    }
}

impl From<ObjectError> for EvalError {
    fn from(e: ObjectError) -> Self {
        let kind = match &e {
            ObjectError::InvalidElementKey(key) => EvalErrorKind::InvalidElementKey(key.clone()),
            ObjectError::CannotAddNonSharableToSharedContainer => {
                EvalErrorKind::CannotAddNonSharableToSharedContainer
            }
            ObjectError::ConstraintViolated { key } => {
                EvalErrorKind::ConstraintViolated(key.clone())
            }
        };
        EvalError::new(kind, e.to_string())
    }
}

impl From<CancellationReason> for EvalError {
    fn from(reason: CancellationReason) -> Self {
        let message = reason.to_string();
        EvalError::new(EvalErrorKind::ContextCancelled(reason), message)
    }
}
