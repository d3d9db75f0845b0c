//! Effects: reversible and irreversible side effects enrolled in
//! transactions.
//!
//! `Effect` is a capability interface: built-in effects wrap filesystem
//! mutations through the injected [`Filesystem`](crate::fs::Filesystem)
//! handle; user code may implement its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fs::Filesystem;
use crate::permission::PermissionKind;

/// How completely an effect can be undone.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reversibility {
    Irreversible,
    SomewhatReversible,
    Reversible,
}

/// Effect application/reversal failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error("effect is already applied")]
    EffectAlreadyApplied,
    #[error("effect is irreversible")]
    Irreversible,
    #[error("effect was not applied")]
    NotApplied,
    #[error("{0}")]
    Failed(String),
}

impl EffectError {
    /// Stable identifier surfaced to user code.
    pub const fn id(&self) -> &'static str {
        match self {
            EffectError::EffectAlreadyApplied => "EffectAlreadyApplied",
            EffectError::Irreversible => "Irreversible",
            EffectError::NotApplied => "EffectNotApplied",
            EffectError::Failed(_) => "EffectFailed",
        }
    }
}

/// A side effect with apply/reverse semantics and a reversibility tag.
///
/// Implementations must be idempotence-guarded: a second `apply` returns
/// [`EffectError::EffectAlreadyApplied`].
pub trait Effect: Send + Sync {
    /// Names of the resources the effect touches.
    fn resources(&self) -> Vec<String>;

    /// Permission kind the effect requires on its resources.
    fn permission_kind(&self) -> PermissionKind;

    fn reversibility(&self) -> Reversibility;

    fn is_applied(&self) -> bool;

    fn apply(&self) -> Result<(), EffectError>;

    fn reverse(&self) -> Result<(), EffectError>;
}

/// Create a file; reversal deletes it.
pub struct CreateFileEffect {
    fs: Arc<dyn Filesystem>,
    path: String,
    content: Vec<u8>,
    applied: AtomicBool,
}

impl CreateFileEffect {
    pub fn new(fs: Arc<dyn Filesystem>, path: impl Into<String>, content: Vec<u8>) -> Self {
        CreateFileEffect {
            fs,
            path: path.into(),
            content,
            applied: AtomicBool::new(false),
        }
    }
}

impl Effect for CreateFileEffect {
    fn resources(&self) -> Vec<String> {
        vec![self.path.clone()]
    }

    fn permission_kind(&self) -> PermissionKind {
        PermissionKind::Create
    }

    fn reversibility(&self) -> Reversibility {
        Reversibility::Reversible
    }

    fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    fn apply(&self) -> Result<(), EffectError> {
        if self.applied.swap(true, Ordering::AcqRel) {
            return Err(EffectError::EffectAlreadyApplied);
        }
        self.fs
            .create_file(&self.path, &self.content)
            .map_err(|e| EffectError::Failed(e.to_string()))
    }

    fn reverse(&self) -> Result<(), EffectError> {
        if !self.applied.swap(false, Ordering::AcqRel) {
            return Err(EffectError::NotApplied);
        }
        self.fs
            .delete_file(&self.path)
            .map_err(|e| EffectError::Failed(e.to_string()))
    }
}

/// Append bytes to a file; reversal truncates back to the prior length.
pub struct AppendBytesToFileEffect {
    fs: Arc<dyn Filesystem>,
    path: String,
    content: Vec<u8>,
    applied: AtomicBool,
    previous_len: Mutex<Option<u64>>,
}

impl AppendBytesToFileEffect {
    pub fn new(fs: Arc<dyn Filesystem>, path: impl Into<String>, content: Vec<u8>) -> Self {
        AppendBytesToFileEffect {
            fs,
            path: path.into(),
            content,
            applied: AtomicBool::new(false),
            previous_len: Mutex::new(None),
        }
    }
}

impl Effect for AppendBytesToFileEffect {
    fn resources(&self) -> Vec<String> {
        vec![self.path.clone()]
    }

    fn permission_kind(&self) -> PermissionKind {
        PermissionKind::Update
    }

    fn reversibility(&self) -> Reversibility {
        Reversibility::SomewhatReversible
    }

    fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    fn apply(&self) -> Result<(), EffectError> {
        if self.applied.swap(true, Ordering::AcqRel) {
            return Err(EffectError::EffectAlreadyApplied);
        }
        let len = if self.fs.exists(&self.path) {
            self.fs
                .file_len(&self.path)
                .map_err(|e| EffectError::Failed(e.to_string()))?
        } else {
            0
        };
        *self.previous_len.lock() = Some(len);
        self.fs
            .append_to_file(&self.path, &self.content)
            .map_err(|e| EffectError::Failed(e.to_string()))
    }

    fn reverse(&self) -> Result<(), EffectError> {
        if !self.applied.swap(false, Ordering::AcqRel) {
            return Err(EffectError::NotApplied);
        }
        let previous = self.previous_len.lock().take();
        match previous {
            Some(0) if !self.fs.exists(&self.path) => Ok(()),
            Some(len) => self
                .fs
                .truncate_file(&self.path, len)
                .map_err(|e| EffectError::Failed(e.to_string())),
            None => Err(EffectError::NotApplied),
        }
    }
}

/// An effect that cannot be undone. Transactions refuse to enroll these.
pub struct IrreversibleEffect {
    description: String,
    kind: PermissionKind,
    applied: AtomicBool,
    action: Box<dyn Fn() -> Result<(), EffectError> + Send + Sync>,
}

impl IrreversibleEffect {
    pub fn new(
        description: impl Into<String>,
        kind: PermissionKind,
        action: impl Fn() -> Result<(), EffectError> + Send + Sync + 'static,
    ) -> Self {
        IrreversibleEffect {
            description: description.into(),
            kind,
            applied: AtomicBool::new(false),
            action: Box::new(action),
        }
    }
}

impl Effect for IrreversibleEffect {
    fn resources(&self) -> Vec<String> {
        vec![self.description.clone()]
    }

    fn permission_kind(&self) -> PermissionKind {
        self.kind
    }

    fn reversibility(&self) -> Reversibility {
        Reversibility::Irreversible
    }

    fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    fn apply(&self) -> Result<(), EffectError> {
        if self.applied.swap(true, Ordering::AcqRel) {
            return Err(EffectError::EffectAlreadyApplied);
        }
        (self.action)()
    }

    fn reverse(&self) -> Result<(), EffectError> {
        Err(EffectError::Irreversible)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fs::MemFilesystem;

    #[test]
    fn create_file_effect_round_trip() {
        let fs = Arc::new(MemFilesystem::new());
        let effect = CreateFileEffect::new(fs.clone(), "/out.txt", b"data".to_vec());
        assert!(!effect.is_applied());
        effect.apply().unwrap();
        assert!(fs.exists("/out.txt"));
        assert_eq!(effect.apply(), Err(EffectError::EffectAlreadyApplied));
        effect.reverse().unwrap();
        assert!(!fs.exists("/out.txt"));
    }

    #[test]
    fn append_effect_reverses_to_prior_length() {
        let fs = Arc::new(MemFilesystem::new());
        fs.create_file("/log", b"one").unwrap();
        let effect = AppendBytesToFileEffect::new(fs.clone(), "/log", b"two".to_vec());
        effect.apply().unwrap();
        assert_eq!(fs.read_file("/log").unwrap(), b"onetwo");
        effect.reverse().unwrap();
        assert_eq!(fs.read_file("/log").unwrap(), b"one");
    }

    #[test]
    fn irreversible_effect_refuses_reverse() {
        let effect = IrreversibleEffect::new("http post", PermissionKind::Write, || Ok(()));
        effect.apply().unwrap();
        assert_eq!(effect.reverse(), Err(EffectError::Irreversible));
    }
}
