//! Execution contexts.
//!
//! A `Context` is the per-thread capability and resource environment:
//! granted/forbidden permissions, limits, cancellation, the current
//! transaction, named patterns and host definitions, plus the injected
//! filesystem handle. Contexts form a tree; cancelling one cancels all
//! descendants.
//!
//! All read methods are safe for concurrent use; permission mutation and
//! limit accounting are internally synchronized.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use rill_values::{Duration, HostContext, Pattern, Value};

use crate::fs::{Filesystem, MemFilesystem};
use crate::limits::{Limit, LimitError, TokenBucket};
use crate::permission::{Permission, PermissionError};
use crate::transaction::{Transaction, TransactionError};

/// Why a context was cancelled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    UserRequested,
    DeadlineExceeded,
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::UserRequested => write!(f, "cancelled by user"),
            CancellationReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Configuration of a root context.
pub struct ContextConfig {
    pub granted: Vec<Permission>,
    pub forbidden: Vec<Permission>,
    pub limits: Vec<Limit>,
    pub filesystem: Arc<dyn Filesystem>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            granted: Vec::new(),
            forbidden: Vec::new(),
            limits: Vec::new(),
            filesystem: Arc::new(MemFilesystem::new()),
        }
    }
}

/// Parameters for deriving a child context.
pub struct ChildContextParams {
    /// Permissions granted to the child; each must be covered by the
    /// parent's own permissions.
    pub granted: Vec<Permission>,
    /// Additional limits private to the child.
    pub extra_limits: Vec<Limit>,
    /// Whether the child inherits the parent's named patterns and
    /// pattern namespaces (module imports opt out).
    pub inherit_patterns: bool,
}

impl Default for ChildContextParams {
    fn default() -> Self {
        ChildContextParams {
            granted: Vec::new(),
            extra_limits: Vec::new(),
            inherit_patterns: true,
        }
    }
}

struct ContextInner {
    granted: RwLock<Vec<Permission>>,
    forbidden: RwLock<Vec<Permission>>,
    /// Limiters are shared down the tree: children consume from the same
    /// buckets as their spawner.
    limiters: RwLock<FxHashMap<String, Arc<TokenBucket>>>,
    cancelled: AtomicBool,
    cancellation_reason: Mutex<Option<CancellationReason>>,
    transaction: Mutex<Option<Transaction>>,
    named_patterns: RwLock<FxHashMap<String, Pattern>>,
    pattern_namespaces: RwLock<FxHashMap<String, FxHashMap<String, Pattern>>>,
    host_definitions: RwLock<FxHashMap<String, Value>>,
    filesystem: Arc<dyn Filesystem>,
    children: Mutex<Vec<Weak<ContextInner>>>,
    /// Closest GlobalState, type-erased to avoid a crate cycle with the
    /// evaluator. Weak: the state owns the context, not the other way
    /// around.
    global_state: Mutex<Option<Weak<dyn std::any::Any + Send + Sync>>>,
}

/// Handle to a context. Cloning shares the context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a root context.
    pub fn new(config: ContextConfig) -> Self {
        let limiters = config
            .limits
            .into_iter()
            .map(|limit| (limit.name.clone(), Arc::new(TokenBucket::new(limit))))
            .collect();
        Context {
            inner: Arc::new(ContextInner {
                granted: RwLock::new(config.granted),
                forbidden: RwLock::new(config.forbidden),
                limiters: RwLock::new(limiters),
                cancelled: AtomicBool::new(false),
                cancellation_reason: Mutex::new(None),
                transaction: Mutex::new(None),
                named_patterns: RwLock::new(FxHashMap::default()),
                pattern_namespaces: RwLock::new(FxHashMap::default()),
                host_definitions: RwLock::new(FxHashMap::default()),
                filesystem: config.filesystem,
                children: Mutex::new(Vec::new()),
                global_state: Mutex::new(None),
            }),
        }
    }

    /// Derive a child context.
    ///
    /// The child inherits the parent's patterns and host definitions by
    /// copy, shares the parent's limiters, and receives exactly the
    /// permissions in `params.granted` — each must be covered by the
    /// parent, otherwise `NotAllowed`.
    pub fn child(&self, params: ChildContextParams) -> Result<Context, PermissionError> {
        for permission in &params.granted {
            self.check_permission(permission)?;
        }
        let mut limiters = self.inner.limiters.read().clone();
        for limit in params.extra_limits {
            limiters
                .entry(limit.name.clone())
                .or_insert_with(|| Arc::new(TokenBucket::new(limit)));
        }
        let (named_patterns, pattern_namespaces) = if params.inherit_patterns {
            (
                self.inner.named_patterns.read().clone(),
                self.inner.pattern_namespaces.read().clone(),
            )
        } else {
            (FxHashMap::default(), FxHashMap::default())
        };
        let child = Context {
            inner: Arc::new(ContextInner {
                granted: RwLock::new(params.granted),
                forbidden: RwLock::new(self.inner.forbidden.read().clone()),
                limiters: RwLock::new(limiters),
                cancelled: AtomicBool::new(false),
                cancellation_reason: Mutex::new(None),
                transaction: Mutex::new(None),
                named_patterns: RwLock::new(named_patterns),
                pattern_namespaces: RwLock::new(pattern_namespaces),
                host_definitions: RwLock::new(self.inner.host_definitions.read().clone()),
                filesystem: Arc::clone(&self.inner.filesystem),
                children: Mutex::new(Vec::new()),
                global_state: Mutex::new(None),
            }),
        };
        self.inner
            .children
            .lock()
            .push(Arc::downgrade(&child.inner));
        // A child of an already-cancelled context is born cancelled.
        if self.is_cancelled() {
            if let Some(reason) = self.cancellation_reason() {
                child.cancel(reason);
            }
        }
        Ok(child)
    }

    // Permissions

    /// Kernel decision: some granted permission includes `permission` AND
    /// no forbidden permission includes it.
    pub fn has_permission(&self, permission: &Permission) -> bool {
        let forbidden = self.inner.forbidden.read();
        if forbidden.iter().any(|f| f.includes(permission)) {
            return false;
        }
        let granted = self.inner.granted.read();
        granted.iter().any(|g| g.includes(permission))
    }

    pub fn check_permission(&self, permission: &Permission) -> Result<(), PermissionError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(PermissionError::NotAllowed(permission.clone()))
        }
    }

    /// Drop permissions: remove them from granted and add them to
    /// forbidden. There is no way to add permissions back.
    pub fn drop_permissions(&self, permissions: &[Permission]) {
        let mut granted = self.inner.granted.write();
        granted.retain(|g| !permissions.contains(g));
        drop(granted);
        let mut forbidden = self.inner.forbidden.write();
        for permission in permissions {
            if !forbidden.contains(permission) {
                forbidden.push(permission.clone());
            }
        }
    }

    pub fn granted_permissions(&self) -> Vec<Permission> {
        self.inner.granted.read().clone()
    }

    // Limits

    /// Take `n` tokens from the named limit.
    ///
    /// Unknown limits are unlimited. Rate limits block until refilled
    /// (aborting on cancellation); depleted total limits fail.
    pub fn take(&self, limit_name: &str, n: u64) -> Result<(), LimitError> {
        let bucket = self.inner.limiters.read().get(limit_name).cloned();
        match bucket {
            Some(bucket) => bucket.take(n, &|| self.is_cancelled()),
            None => Ok(()),
        }
    }

    /// Give tokens back to a total limit.
    pub fn give_back(&self, limit_name: &str, n: u64) {
        if let Some(bucket) = self.inner.limiters.read().get(limit_name) {
            bucket.give_back(n);
        }
    }

    // Cancellation

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn cancellation_reason(&self) -> Option<CancellationReason> {
        self.inner.cancellation_reason.lock().clone()
    }

    /// Cancel this context and every descendant; rolls back the current
    /// transaction.
    pub fn cancel(&self, reason: CancellationReason) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(%reason, "context cancelled");
        self.inner.cancellation_reason.lock().get_or_insert(reason.clone());
        // Automatic rollback of the in-flight transaction.
        let transaction = self.inner.transaction.lock().take();
        if let Some(tx) = transaction {
            let _ = tx.rollback();
        }
        let children = self.inner.children.lock().clone();
        for child in children {
            if let Some(inner) = child.upgrade() {
                Context { inner }.cancel(reason.clone());
            }
        }
    }

    /// Cancel with `DeadlineExceeded` after `duration`, unless already
    /// cancelled by then.
    pub fn cancel_after(&self, duration: Duration) {
        let weak = Arc::downgrade(&self.inner);
        std::thread::spawn(move || {
            std::thread::sleep(duration.as_std());
            if let Some(inner) = weak.upgrade() {
                Context { inner }.cancel(CancellationReason::DeadlineExceeded);
            }
        });
    }

    // Transactions

    /// Start a transaction; fails when one is already current.
    pub fn start_transaction(&self) -> Result<Transaction, TransactionError> {
        let mut slot = self.inner.transaction.lock();
        if slot.is_some() {
            return Err(TransactionError::AlreadyHasTransaction);
        }
        let tx = Transaction::new();
        *slot = Some(tx.clone());
        Ok(tx)
    }

    pub fn current_transaction(&self) -> Option<Transaction> {
        self.inner.transaction.lock().clone()
    }

    /// Commit the current transaction and clear the slot.
    pub fn commit_transaction(&self) -> Result<(), TransactionError> {
        let tx = self
            .inner
            .transaction
            .lock()
            .take()
            .ok_or(TransactionError::FinishedTransaction)?;
        tx.commit()
    }

    /// Roll back the current transaction and clear the slot.
    pub fn rollback_transaction(&self) -> Result<(), TransactionError> {
        let tx = self
            .inner
            .transaction
            .lock()
            .take()
            .ok_or(TransactionError::FinishedTransaction)?;
        tx.rollback()
    }

    // Patterns

    pub fn add_named_pattern(&self, name: impl Into<String>, pattern: Pattern) {
        self.inner
            .named_patterns
            .write()
            .insert(name.into(), pattern);
    }

    pub fn resolve_named_pattern(&self, name: &str) -> Option<Pattern> {
        self.inner.named_patterns.read().get(name).cloned()
    }

    pub fn add_pattern_to_namespace(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        pattern: Pattern,
    ) {
        self.inner
            .pattern_namespaces
            .write()
            .entry(namespace.into())
            .or_default()
            .insert(name.into(), pattern);
    }

    pub fn resolve_pattern_in_namespace(&self, namespace: &str, name: &str) -> Option<Pattern> {
        self.inner
            .pattern_namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned()
    }

    // Host definitions

    pub fn add_host_definition(&self, name: impl Into<String>, value: Value) {
        self.inner
            .host_definitions
            .write()
            .insert(name.into(), value);
    }

    pub fn resolve_host_definition(&self, name: &str) -> Option<Value> {
        self.inner.host_definitions.read().get(name).cloned()
    }

    // Misc

    pub fn filesystem(&self) -> Arc<dyn Filesystem> {
        Arc::clone(&self.inner.filesystem)
    }

    /// Attach the closest GlobalState (type-erased, weakly held).
    pub fn set_global_state(&self, state: Weak<dyn std::any::Any + Send + Sync>) {
        *self.inner.global_state.lock() = Some(state);
    }

    pub fn global_state(&self) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        self.inner.global_state.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl HostContext for Context {
    fn is_cancelled(&self) -> bool {
        Context::is_cancelled(self)
    }

    fn sleep_cancellable(&self, duration: Duration) -> bool {
        let deadline = std::time::Instant::now() + duration.as_std();
        while std::time::Instant::now() < deadline {
            if self.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            std::thread::sleep(remaining.min(std::time::Duration::from_millis(5)));
        }
        !self.is_cancelled()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("granted", &self.inner.granted.read().len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::permission::{FsEntity, PermissionKind};

    fn fs_read(entity: FsEntity) -> Permission {
        Permission::Filesystem {
            kind: PermissionKind::Read,
            entity,
        }
    }

    #[test]
    fn child_permissions_must_be_covered() {
        let parent = Context::new(ContextConfig {
            granted: vec![fs_read(FsEntity::Pattern("/data/**".into()))],
            ..ContextConfig::default()
        });
        let ok = parent.child(ChildContextParams {
            granted: vec![fs_read(FsEntity::Path("/data/a".into()))],
            ..ChildContextParams::default()
        });
        assert!(ok.is_ok());

        let not_covered = parent.child(ChildContextParams {
            granted: vec![fs_read(FsEntity::Path("/etc/passwd".into()))],
            ..ChildContextParams::default()
        });
        assert!(matches!(not_covered, Err(PermissionError::NotAllowed(_))));
    }

    #[test]
    fn drop_permissions_is_permanent() {
        let ctx = Context::new(ContextConfig {
            granted: vec![fs_read(FsEntity::Any)],
            ..ContextConfig::default()
        });
        let p = fs_read(FsEntity::Path("/data/a".into()));
        assert!(ctx.has_permission(&p));
        ctx.drop_permissions(&[fs_read(FsEntity::Any)]);
        assert!(!ctx.has_permission(&p));
    }

    #[test]
    fn forbidden_overrides_granted() {
        let ctx = Context::new(ContextConfig {
            granted: vec![fs_read(FsEntity::Any)],
            forbidden: vec![fs_read(FsEntity::Pattern("/etc/**".into()))],
            ..ContextConfig::default()
        });
        assert!(ctx.has_permission(&fs_read(FsEntity::Path("/data/a".into()))));
        assert!(!ctx.has_permission(&fs_read(FsEntity::Path("/etc/passwd".into()))));
    }

    #[test]
    fn cancelling_parent_cancels_descendants() {
        let parent = Context::new(ContextConfig::default());
        let child = parent.child(ChildContextParams::default()).unwrap();
        let grandchild = child.child(ChildContextParams::default()).unwrap();
        parent.cancel(CancellationReason::UserRequested);
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert_eq!(
            grandchild.cancellation_reason(),
            Some(CancellationReason::UserRequested)
        );
    }

    #[test]
    fn second_transaction_fails() {
        let ctx = Context::new(ContextConfig::default());
        let _tx = ctx.start_transaction().unwrap();
        assert!(matches!(
            ctx.start_transaction(),
            Err(TransactionError::AlreadyHasTransaction)
        ));
    }

    #[test]
    fn cancellation_rolls_back_transaction() {
        let ctx = Context::new(ContextConfig::default());
        let tx = ctx.start_transaction().unwrap();
        ctx.cancel(CancellationReason::UserRequested);
        assert!(tx.is_finished());
        assert!(ctx.current_transaction().is_none());
    }

    #[test]
    fn patterns_inherit_by_copy() {
        let parent = Context::new(ContextConfig::default());
        parent.add_named_pattern("positive", Pattern::IntRange {
            start: Some(1),
            end: None,
        });
        let child = parent.child(ChildContextParams::default()).unwrap();
        assert!(child.resolve_named_pattern("positive").is_some());
        // Later additions in the parent are not visible to the child.
        parent.add_named_pattern("other", Pattern::Any);
        assert!(child.resolve_named_pattern("other").is_none());
    }
}
