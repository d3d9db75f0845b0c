//! The Rill evaluator crate: tree-walking interpreter, LThread
//! scheduler, online debugger and testing driver.
//!
//! Embedders construct a [`rill_ir::Module`], a [`rill_core::Context`]
//! with the root permissions, and a [`GlobalState`] anchoring the two,
//! then call [`Evaluator::run_module`]. Each `spawn` expression derives
//! a child context and runs its body on a parallel LThread; the debugger
//! attaches through the evaluator's per-instruction hook.

pub mod builtins;
pub mod debugger;
pub mod errors;
pub mod interpreter;
pub mod lthread;
pub mod state;
pub mod testing;

pub use builtins::register_prelude;
pub use debugger::{
    BreakpointSpec, DebugCommand, Debugger, DebuggerArgs, ProgramStoppedEvent, ScopesSnapshot,
    SecondaryEvent, StackFrameInfo, StopReason, ThreadId,
};
pub use errors::{EvalError, EvalErrorKind, EvalResult, EvalSignal};
pub use interpreter::Evaluator;
pub use lthread::{spawn_lthread, LThread, LThreadGroup, LThreadSpawnArgs, SpawnKind};
pub use state::{Extension, ExtensionMethod, GlobalBinding, GlobalKind, GlobalState, Globals};
pub use testing::{TestFilters, TestItemKind, TestResult, TestingState};
