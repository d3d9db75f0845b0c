//! Per-module evaluator state.
//!
//! A `GlobalState` anchors one module's evaluation in a [`Context`]: it
//! owns the module, the global bindings, the testing state and the
//! extension registry. Each LThread has its own `GlobalState`;
//! cross-thread observation happens only through the sharing discipline.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use rill_core::Context;
use rill_ir::{Module, Name, SharedInterner};
use rill_values::{Pattern, StructLayoutRegistry, Value};

use crate::testing::TestingState;

/// How a global binding was introduced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GlobalKind {
    /// Mutable module-level variable.
    Regular,
    /// Module constant (`const` declaration); not inherited by spawned
    /// threads.
    Constant,
    /// Built-in start constant set by the host entry point; inherited by
    /// every spawned thread.
    StartConstant,
}

#[derive(Clone, Debug)]
pub struct GlobalBinding {
    pub value: Value,
    pub kind: GlobalKind,
}

/// Module-level global bindings.
#[derive(Default)]
pub struct Globals {
    map: RwLock<FxHashMap<Name, GlobalBinding>>,
}

impl Globals {
    pub fn get(&self, name: Name) -> Option<Value> {
        self.map.read().get(&name).map(|b| b.value.clone())
    }

    pub fn binding(&self, name: Name) -> Option<GlobalBinding> {
        self.map.read().get(&name).cloned()
    }

    pub fn set(&self, name: Name, value: Value, kind: GlobalKind) {
        self.map.write().insert(name, GlobalBinding { value, kind });
    }

    /// Whether the binding exists and is a constant of either kind.
    pub fn is_constant(&self, name: Name) -> bool {
        self.map
            .read()
            .get(&name)
            .is_some_and(|b| b.kind != GlobalKind::Regular)
    }

    /// Snapshot of all bindings.
    pub fn snapshot(&self) -> Vec<(Name, GlobalBinding)> {
        self.map
            .read()
            .iter()
            .map(|(name, binding)| (*name, binding.clone()))
            .collect()
    }

    /// Start constants only (inherited by spawned threads).
    pub fn start_constants(&self) -> Vec<(Name, Value)> {
        self.map
            .read()
            .iter()
            .filter(|(_, b)| b.kind == GlobalKind::StartConstant)
            .map(|(name, b)| (*name, b.value.clone()))
            .collect()
    }
}

/// One registered extension: a pattern plus its members.
#[derive(Clone)]
pub struct Extension {
    pub pattern: Pattern,
    pub members: Vec<ExtensionMethod>,
}

/// One member of an extension.
#[derive(Clone)]
pub struct ExtensionMethod {
    pub name: Name,
    /// A function value invoked with `self` bound to the matched subject.
    pub method: Value,
    /// Computed property: invoked with zero arguments on access.
    pub computed: bool,
}

/// The per-module evaluator state.
pub struct GlobalState {
    pub module: Arc<Module>,
    pub context: Context,
    pub interner: SharedInterner,
    pub globals: Globals,
    /// Struct layouts are process-wide so layouts stay fixed across
    /// threads materializing the same type.
    pub struct_layouts: Arc<StructLayoutRegistry>,
    pub testing: TestingState,
    extensions: RwLock<Vec<Extension>>,
    /// Declared struct types; layouts materialize on first instantiation.
    struct_decls: RwLock<FxHashMap<Name, Vec<Name>>>,
    /// Named LThread groups, created on first use at spawn time.
    lthread_groups: Mutex<FxHashMap<String, crate::lthread::LThreadGroup>>,
    /// Whether module imports pass the importer's named patterns to the
    /// imported module.
    pub module_import_passes_patterns: bool,
    /// Debugger attached to the thread evaluating this state, if any.
    pub debugger: Mutex<Option<Arc<crate::debugger::Debugger>>>,
}

impl GlobalState {
    pub fn new(module: Arc<Module>, context: Context, interner: SharedInterner) -> Arc<Self> {
        let state = Arc::new(GlobalState {
            module,
            context,
            interner,
            globals: Globals::default(),
            struct_layouts: Arc::new(StructLayoutRegistry::new()),
            testing: TestingState::default(),
            extensions: RwLock::new(Vec::new()),
            struct_decls: RwLock::new(FxHashMap::default()),
            lthread_groups: Mutex::new(FxHashMap::default()),
            module_import_passes_patterns: false,
            debugger: Mutex::new(None),
        });
        let erased: Arc<dyn std::any::Any + Send + Sync> = Arc::clone(&state) as _;
        state.context.set_global_state(Arc::downgrade(&erased));
        state
    }

    /// Define a start constant (host entry point only).
    pub fn set_start_constant(&self, name: &str, value: Value) {
        let name = self.interner.intern(name);
        self.globals.set(name, value, GlobalKind::StartConstant);
    }

    /// Define a host function as a start constant.
    pub fn set_host_function(&self, name: &str, function: Arc<rill_values::HostFunction>) {
        self.set_start_constant(
            name,
            Value::Function(rill_values::FunctionValue::Host(function)),
        );
    }

    pub fn register_extension(&self, extension: Extension) {
        self.extensions.write().push(extension);
    }

    /// Resolve `subject::member`: the first extension whose pattern
    /// matches the subject and which defines the member, in registration
    /// order.
    pub fn resolve_extension_member(
        &self,
        subject: &Value,
        member: Name,
    ) -> Option<ExtensionMethod> {
        let extensions = self.extensions.read();
        for extension in extensions.iter() {
            if !extension.pattern.matches(subject) {
                continue;
            }
            if let Some(method) = extension.members.iter().find(|m| m.name == member) {
                return Some(method.clone());
            }
        }
        None
    }

    /// Record a struct declaration. The layout itself is materialized on
    /// first instantiation.
    pub fn declare_struct(&self, type_name: Name, fields: Vec<Name>) {
        self.struct_decls.write().entry(type_name).or_insert(fields);
    }

    pub fn struct_fields(&self, type_name: Name) -> Option<Vec<Name>> {
        self.struct_decls.read().get(&type_name).cloned()
    }

    /// The named LThread group, created on first use.
    pub fn lthread_group(&self, name: &str) -> crate::lthread::LThreadGroup {
        self.lthread_groups
            .lock()
            .entry(name.to_owned())
            .or_default()
            .clone()
    }

    pub fn attach_debugger(&self, debugger: Arc<crate::debugger::Debugger>) {
        *self.debugger.lock() = Some(debugger);
    }

    pub fn debugger(&self) -> Option<Arc<crate::debugger::Debugger>> {
        self.debugger.lock().clone()
    }
}
