//! The online debugger.
//!
//! A root debugger attaches to the top-level thread; each spawned LThread
//! inherits a child debugger that shares the root's control channel but
//! has its own thread id. Three channels form the wire: control (in),
//! stopped (out), secondary events (out).
//!
//! The only suspension point is the evaluator's `before_instruction`
//! hook: a stopping thread publishes a snapshot of its scopes and stack,
//! emits one stopped event, and parks on its resume channel. The service
//! loop answers scope/stack queries from the snapshot — safe because the
//! parked thread is not executing.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use rill_core::{CancellationReason, Context};
use rill_ir::{Chunk, NodeId};
use rill_values::Value;

use crate::errors::EvalError;

/// Identifier of a debugged thread.
pub type ThreadId = u64;

/// How long the service loop and parked threads sleep between
/// cancellation polls.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(20);

/// A breakpoint request: by node identity or by 1-based source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BreakpointSpec {
    Node(NodeId),
    Line(u32),
}

/// A resolved breakpoint. `node` is `None` for line breakpoints on empty
/// lines, which are kept but never fire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakpointInfo {
    pub id: i32,
    pub node: Option<NodeId>,
    pub line: Option<u32>,
}

/// Why a thread stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint,
    Pause,
    NextStep,
    StepIn,
    StepOut,
    Exception,
}

/// One event per thread stop.
#[derive(Clone, Debug)]
pub struct ProgramStoppedEvent {
    pub thread_id: ThreadId,
    pub reason: StopReason,
    pub breakpoint_id: Option<i32>,
    /// The evaluation error, for exception stops.
    pub error: Option<EvalError>,
}

/// Lifecycle events on the secondary channel.
#[derive(Clone, Debug)]
pub enum SecondaryEvent {
    LThreadSpawned { thread_id: ThreadId },
    IncomingMessage { message: String },
}

/// Scope snapshot delivered to `GetScopes`.
#[derive(Clone, Debug, Default)]
pub struct ScopesSnapshot {
    pub globals: Vec<(String, Value)>,
    pub locals: Vec<(String, Value)>,
}

/// Debugger-visible summary of one stack frame.
#[derive(Clone, Debug)]
pub struct StackFrameInfo {
    /// Monotonically assigned by a counter shared across threads.
    pub id: i32,
    /// Module name, or `(fn) <chunk>:<line>:<col>` for functions.
    pub name: String,
    pub chunk: String,
    pub node: NodeId,
    pub start_line: u32,
    pub start_column: u32,
    pub statement_start_line: u32,
    pub statement_start_column: u32,
    pub parent_id: Option<i32>,
}

/// The closed command union of the control channel.
///
/// Commands carry the target thread id except `InformAboutSecondaryEvent`
/// and `CloseDebugger`. Commands for unknown thread ids are dropped.
pub enum DebugCommand {
    SetBreakpoints {
        thread_id: ThreadId,
        breakpoints: Vec<BreakpointSpec>,
    },
    SetExceptionBreakpoints {
        thread_id: ThreadId,
        reply: Sender<i32>,
    },
    Pause {
        thread_id: ThreadId,
    },
    Continue {
        thread_id: ThreadId,
    },
    NextStep {
        thread_id: ThreadId,
    },
    StepIn {
        thread_id: ThreadId,
    },
    StepOut {
        thread_id: ThreadId,
    },
    GetScopes {
        thread_id: ThreadId,
        reply: Sender<ScopesSnapshot>,
    },
    GetStackTrace {
        thread_id: ThreadId,
        reply: Sender<Vec<StackFrameInfo>>,
    },
    InformAboutSecondaryEvent(SecondaryEvent),
    CloseDebugger {
        cancel_execution: bool,
    },
}

/// Armed stop condition from a prior step command.
#[derive(Copy, Clone, Debug)]
enum StepMode {
    /// Stop at the next statement at or above this frame depth.
    Next { max_depth: usize },
    /// Stop at the very next statement, entering calls.
    In,
    /// Stop at the next statement strictly above this frame depth.
    Out { below_depth: usize },
}

/// Command that releases a parked thread.
#[derive(Copy, Clone, Debug)]
enum ResumeAction {
    Continue,
    NextStep,
    StepIn,
    StepOut,
}

#[derive(Default)]
struct ThreadDebugState {
    breakpoints: FxHashMap<NodeId, i32>,
    pause_requested: bool,
    step: Option<StepMode>,
    stopped: bool,
    snapshot: Option<StoppedSnapshot>,
}

/// Snapshot published by a stopping thread.
#[derive(Clone, Debug, Default)]
pub struct StoppedSnapshot {
    pub scopes: ScopesSnapshot,
    pub trace: Vec<StackFrameInfo>,
}

struct ThreadHandle {
    thread_id: ThreadId,
    chunk: Arc<Chunk>,
    state: Mutex<ThreadDebugState>,
    resume_tx: Sender<ResumeAction>,
    resume_rx: Receiver<ResumeAction>,
}

struct SharedDebuggerFields {
    control_tx: Sender<DebugCommand>,
    stopped_tx: Sender<ProgramStoppedEvent>,
    secondary_tx: Mutex<Option<Sender<SecondaryEvent>>>,
    threads: Mutex<FxHashMap<ThreadId, Arc<ThreadHandle>>>,
    next_thread_id: AtomicU64,
    next_frame_id: AtomicI32,
    next_breakpoint_id: AtomicI32,
    exception_breakpoint: Mutex<Option<i32>>,
    closed: AtomicBool,
    root_context: Context,
}

impl SharedDebuggerFields {
    fn thread(&self, thread_id: ThreadId) -> Option<Arc<ThreadHandle>> {
        self.threads.lock().get(&thread_id).cloned()
    }
}

/// Arguments for creating a root debugger.
pub struct DebuggerArgs {
    /// Context of the debugged top-level thread; its cancellation shuts
    /// the debugger down.
    pub context: Context,
    /// Chunk of the attached thread, used to resolve line breakpoints.
    pub chunk: Arc<Chunk>,
}

/// A per-thread debugger handle.
///
/// The root debugger owns the service loop; children share it.
pub struct Debugger {
    shared: Arc<SharedDebuggerFields>,
    thread: Arc<ThreadHandle>,
    stopped_rx: Receiver<ProgramStoppedEvent>,
    secondary_rx: Receiver<SecondaryEvent>,
}

impl Debugger {
    /// Create a root debugger and start its service loop.
    pub fn new(args: DebuggerArgs) -> Arc<Debugger> {
        let (control_tx, control_rx) = unbounded::<DebugCommand>();
        let (stopped_tx, stopped_rx) = unbounded();
        let (secondary_tx, secondary_rx) = unbounded();
        let (resume_tx, resume_rx) = bounded(1);

        let shared = Arc::new(SharedDebuggerFields {
            control_tx,
            stopped_tx,
            secondary_tx: Mutex::new(Some(secondary_tx)),
            threads: Mutex::new(FxHashMap::default()),
            next_thread_id: AtomicU64::new(2),
            next_frame_id: AtomicI32::new(1),
            next_breakpoint_id: AtomicI32::new(1),
            exception_breakpoint: Mutex::new(None),
            closed: AtomicBool::new(false),
            root_context: args.context,
        });

        let thread = Arc::new(ThreadHandle {
            thread_id: 1,
            chunk: args.chunk,
            state: Mutex::new(ThreadDebugState::default()),
            resume_tx,
            resume_rx,
        });
        shared.threads.lock().insert(1, Arc::clone(&thread));

        let loop_shared = Arc::clone(&shared);
        std::thread::spawn(move || service_loop(&loop_shared, &control_rx));

        Arc::new(Debugger {
            shared,
            thread,
            stopped_rx,
            secondary_rx,
        })
    }

    /// Derive a child debugger for a spawned LThread.
    ///
    /// The child shares the control channel and service loop; a
    /// `LThreadSpawned` event is emitted on the secondary channel.
    pub fn new_child(&self, chunk: Arc<Chunk>) -> Arc<Debugger> {
        let thread_id = self.shared.next_thread_id.fetch_add(1, Ordering::AcqRel);
        let (resume_tx, resume_rx) = bounded(1);
        let thread = Arc::new(ThreadHandle {
            thread_id,
            chunk,
            state: Mutex::new(ThreadDebugState::default()),
            resume_tx,
            resume_rx,
        });
        self.shared
            .threads
            .lock()
            .insert(thread_id, Arc::clone(&thread));
        if let Some(tx) = self.shared.secondary_tx.lock().as_ref() {
            let _ = tx.send(SecondaryEvent::LThreadSpawned { thread_id });
        }
        Arc::new(Debugger {
            shared: Arc::clone(&self.shared),
            thread,
            stopped_rx: self.stopped_rx.clone(),
            secondary_rx: self.secondary_rx.clone(),
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.thread_id
    }

    /// Sender half of the control channel.
    pub fn control_sender(&self) -> Sender<DebugCommand> {
        self.shared.control_tx.clone()
    }

    /// Receiver of stopped events.
    pub fn stopped_receiver(&self) -> Receiver<ProgramStoppedEvent> {
        self.stopped_rx.clone()
    }

    /// Receiver of secondary (lifecycle) events.
    pub fn secondary_receiver(&self) -> Receiver<SecondaryEvent> {
        self.secondary_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Next stack frame id from the shared monotonic counter.
    pub fn next_frame_id(&self) -> i32 {
        self.shared.next_frame_id.fetch_add(1, Ordering::AcqRel)
    }

    /// The armed exception breakpoint id, if any.
    pub fn exception_breakpoint_id(&self) -> Option<i32> {
        *self.shared.exception_breakpoint.lock()
    }

    /// The evaluator's per-instruction hook.
    ///
    /// Decides whether this thread must stop (breakpoint, armed step,
    /// pause flag, or exception when the exception breakpoint is armed);
    /// if so, publishes `snapshot`, emits one stopped event and parks
    /// until a resume command arrives or the context is cancelled.
    pub(crate) fn before_instruction(
        &self,
        node: NodeId,
        depth: usize,
        exception: Option<&EvalError>,
        context: &Context,
        snapshot: impl FnOnce() -> StoppedSnapshot,
    ) {
        if self.is_closed() {
            return;
        }
        let (reason, breakpoint_id) = {
            let mut state = self.thread.state.lock();
            let decision = if exception.is_some() {
                self.exception_breakpoint_id()
                    .map(|id| (StopReason::Exception, Some(id)))
            } else if let Some(&id) = state.breakpoints.get(&node) {
                Some((StopReason::Breakpoint, Some(id)))
            } else if state.pause_requested {
                state.pause_requested = false;
                Some((StopReason::Pause, None))
            } else {
                match state.step {
                    Some(StepMode::Next { max_depth }) if depth <= max_depth => {
                        Some((StopReason::NextStep, None))
                    }
                    Some(StepMode::In) => Some((StopReason::StepIn, None)),
                    Some(StepMode::Out { below_depth }) if depth < below_depth => {
                        Some((StopReason::StepOut, None))
                    }
                    _ => None,
                }
            };
            let Some((reason, breakpoint_id)) = decision else {
                return;
            };
            state.step = None;
            state.pause_requested = false;
            state.stopped = true;
            state.snapshot = Some(snapshot());
            (reason, breakpoint_id)
        };

        let _ = self.shared.stopped_tx.send(ProgramStoppedEvent {
            thread_id: self.thread.thread_id,
            reason,
            breakpoint_id,
            error: exception.cloned(),
        });

        // Park until resumed.
        let action = loop {
            match self.thread.resume_rx.recv_timeout(POLL_INTERVAL) {
                Ok(action) => break Some(action),
                Err(RecvTimeoutError::Timeout) => {
                    if context.is_cancelled() || self.is_closed() {
                        break None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        let mut state = self.thread.state.lock();
        state.stopped = false;
        state.snapshot = None;
        state.step = match action {
            Some(ResumeAction::NextStep) => Some(StepMode::Next { max_depth: depth }),
            Some(ResumeAction::StepIn) => Some(StepMode::In),
            // StepOut from the outermost frame never fires: it degrades
            // to Continue.
            Some(ResumeAction::StepOut) => Some(StepMode::Out { below_depth: depth }),
            Some(ResumeAction::Continue) | None => None,
        };
    }
}

fn service_loop(shared: &Arc<SharedDebuggerFields>, control_rx: &Receiver<DebugCommand>) {
    loop {
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        match control_rx.recv_timeout(POLL_INTERVAL) {
            Ok(command) => {
                if handle_command(shared, command) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.root_context.is_cancelled() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    shared.closed.store(true, Ordering::Release);
    // Release any parked threads so they observe the shutdown.
    let threads: Vec<Arc<ThreadHandle>> = shared.threads.lock().values().cloned().collect();
    for thread in threads {
        if thread.state.lock().stopped {
            let _ = thread.resume_tx.try_send(ResumeAction::Continue);
        }
    }
    // Dropping the sender closes the secondary-events channel.
    shared.secondary_tx.lock().take();
    tracing::debug!("debugger service loop exited");
}

/// Handle one control command; returns `true` when the loop must exit.
fn handle_command(shared: &Arc<SharedDebuggerFields>, command: DebugCommand) -> bool {
    match command {
        DebugCommand::SetBreakpoints {
            thread_id,
            breakpoints,
        } => {
            let Some(thread) = shared.thread(thread_id) else {
                return false;
            };
            let mut resolved: FxHashMap<NodeId, i32> = FxHashMap::default();
            for spec in breakpoints {
                let node = match spec {
                    BreakpointSpec::Node(node) => Some(node),
                    // Lines resolve to their first statement; empty lines
                    // produce an entry that never fires.
                    BreakpointSpec::Line(line) => thread.chunk.first_statement_on_line(line),
                };
                if let Some(node) = node {
                    // A second breakpoint on the same node is a no-op.
                    resolved
                        .entry(node)
                        .or_insert_with(|| shared.next_breakpoint_id.fetch_add(1, Ordering::AcqRel));
                }
            }
            thread.state.lock().breakpoints = resolved;
        }
        DebugCommand::SetExceptionBreakpoints { thread_id, reply } => {
            if shared.thread(thread_id).is_none() {
                return false;
            }
            let id = shared.next_breakpoint_id.fetch_add(1, Ordering::AcqRel);
            *shared.exception_breakpoint.lock() = Some(id);
            let _ = reply.send(id);
        }
        DebugCommand::Pause { thread_id } => {
            if let Some(thread) = shared.thread(thread_id) {
                let mut state = thread.state.lock();
                // Pausing an already-stopped thread is a no-op.
                if !state.stopped {
                    state.pause_requested = true;
                }
            }
        }
        DebugCommand::Continue { thread_id } => resume(shared, thread_id, ResumeAction::Continue),
        DebugCommand::NextStep { thread_id } => resume(shared, thread_id, ResumeAction::NextStep),
        DebugCommand::StepIn { thread_id } => resume(shared, thread_id, ResumeAction::StepIn),
        DebugCommand::StepOut { thread_id } => resume(shared, thread_id, ResumeAction::StepOut),
        DebugCommand::GetScopes { thread_id, reply } => {
            if let Some(thread) = shared.thread(thread_id) {
                let state = thread.state.lock();
                if let Some(snapshot) = state.snapshot.as_ref() {
                    let _ = reply.send(snapshot.scopes.clone());
                }
            }
        }
        DebugCommand::GetStackTrace { thread_id, reply } => {
            if let Some(thread) = shared.thread(thread_id) {
                let state = thread.state.lock();
                if let Some(snapshot) = state.snapshot.as_ref() {
                    let _ = reply.send(snapshot.trace.clone());
                }
            }
        }
        DebugCommand::InformAboutSecondaryEvent(event) => {
            if let Some(tx) = shared.secondary_tx.lock().as_ref() {
                let _ = tx.send(event);
            }
        }
        DebugCommand::CloseDebugger { cancel_execution } => {
            shared.closed.store(true, Ordering::Release);
            if cancel_execution {
                shared.root_context.cancel(CancellationReason::UserRequested);
            }
            return true;
        }
    }
    false
}

fn resume(shared: &Arc<SharedDebuggerFields>, thread_id: ThreadId, action: ResumeAction) {
    if let Some(thread) = shared.thread(thread_id) {
        if thread.state.lock().stopped {
            let _ = thread.resume_tx.try_send(action);
        }
    }
}
