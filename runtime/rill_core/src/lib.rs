//! Capability kernel for the Rill runtime: permissions and risk scoring,
//! execution contexts with limits and cancellation, transactions and the
//! effect interface, module manifests, and the filesystem seam.

pub mod context;
pub mod effect;
pub mod fs;
pub mod limits;
pub mod manifest;
pub mod permission;
pub mod risk;
pub mod transaction;

pub use context::{CancellationReason, ChildContextParams, Context, ContextConfig};
pub use effect::{
    AppendBytesToFileEffect, CreateFileEffect, Effect, EffectError, IrreversibleEffect,
    Reversibility,
};
pub use fs::{Filesystem, FsError, MemFilesystem};
pub use limits::{Limit, LimitError, LimitKind, TokenBucket, LTHREAD_COUNT_LIMIT};
pub use manifest::{Manifest, ManifestError, ManifestParam};
pub use permission::{
    glob_match, FsEntity, GlobalVarEntity, HttpEntity, Permission, PermissionError, PermissionKind,
};
pub use risk::{
    compute_permission_risk_score, compute_program_risk_score, RiskScore, HIGH_RISK_SCORE_LEVEL,
    MAXIMUM_RISK_SCORE, MEDIUM_RISK_SCORE_LEVEL,
};
pub use transaction::{Transaction, TransactionError};
