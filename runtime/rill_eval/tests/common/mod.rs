//! Shared helpers for the end-to-end scenarios.

#![allow(dead_code)]

use std::sync::Arc;

use rill_core::{
    Context, ContextConfig, FsEntity, GlobalVarEntity, Limit, Permission, PermissionKind,
    LTHREAD_COUNT_LIMIT,
};
use rill_ir::{Chunk, Module, Name, Node, NodeId, SharedInterner, Span};
use rill_eval::{register_prelude, GlobalState};

/// Incrementally built module chunk.
pub struct ModuleBuilder {
    pub chunk: Chunk,
    pub interner: SharedInterner,
}

impl ModuleBuilder {
    pub fn new(name: &str, source: &str) -> Self {
        ModuleBuilder {
            chunk: Chunk::new(name, source),
            interner: SharedInterner::new(),
        }
    }

    pub fn name(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    pub fn add(&mut self, node: Node, span: (u32, u32)) -> NodeId {
        self.chunk.add(node, Span::new(span.0, span.1))
    }

    /// Add a node with a dummy span.
    pub fn addd(&mut self, node: Node) -> NodeId {
        self.chunk.add(node, Span::DUMMY)
    }

    pub fn finish(mut self, top_level: Vec<NodeId>) -> (Arc<Chunk>, SharedInterner) {
        self.chunk.set_top_level(top_level);
        (Arc::new(self.chunk), self.interner)
    }
}

/// Permissions covering everything the scenarios need.
pub fn permissive() -> Vec<Permission> {
    vec![
        Permission::LThreadCreate,
        Permission::GlobalVar {
            kind: PermissionKind::Create,
            entity: GlobalVarEntity::Any,
        },
        Permission::GlobalVar {
            kind: PermissionKind::Update,
            entity: GlobalVarEntity::Any,
        },
        Permission::Filesystem {
            kind: PermissionKind::Read,
            entity: FsEntity::Any,
        },
        Permission::Filesystem {
            kind: PermissionKind::Write,
            entity: FsEntity::Any,
        },
    ]
}

pub fn root_context(granted: Vec<Permission>) -> Context {
    Context::new(ContextConfig {
        granted,
        limits: vec![Limit::total(LTHREAD_COUNT_LIMIT, 64)],
        ..ContextConfig::default()
    })
}

/// State over a finished chunk, with the prelude registered.
pub fn make_state(
    chunk: Arc<Chunk>,
    interner: SharedInterner,
    context: Context,
) -> Arc<GlobalState> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let module = Arc::new(Module::new(chunk.name.clone(), chunk));
    let state = GlobalState::new(module, context, interner);
    register_prelude(&state);
    state
}
