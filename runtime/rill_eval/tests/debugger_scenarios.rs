//! End-to-end debugger scenarios: breakpoints, stepping, pause during
//! sleep, and the exception breakpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::unbounded;
use pretty_assertions::assert_eq;

use common::{make_state, permissive, root_context, ModuleBuilder};
use rill_eval::{
    BreakpointSpec, DebugCommand, Debugger, DebuggerArgs, Evaluator, StopReason,
};
use rill_ir::{AssignTarget, Node, NodeId};
use rill_values::Value;

const WAIT: Duration = Duration::from_secs(5);

/// `a = 1; a = 2; a = 3; return a` with statement spans on lines 1..4.
fn three_assignments() -> (ModuleBuilder, Vec<NodeId>, NodeId) {
    let source = "a = 1\na = 2\na = 3\nreturn a\n";
    let mut b = ModuleBuilder::new("main", source);
    let a = b.name("a");
    let mut statements = Vec::new();
    for (i, line_start) in [0u32, 6, 12].iter().enumerate() {
        let value = b.add(
            Node::IntLiteral(i as i64 + 1),
            (line_start + 4, line_start + 5),
        );
        statements.push(b.add(
            Node::Assignment {
                target: AssignTarget::Variable(a),
                rhs: value,
            },
            (*line_start, line_start + 5),
        ));
    }
    let a_ref = b.add(Node::Var(a), (25, 26));
    let ret = b.add(Node::Return(Some(a_ref)), (18, 26));
    statements.push(ret);
    let first = statements[0];
    (b, statements, first)
}

#[test]
fn breakpoint_and_two_next_steps_over_three_assignments() {
    let (builder, statements, first) = three_assignments();
    let (chunk, interner) = builder.finish(statements);
    let context = root_context(permissive());
    let state = make_state(Arc::clone(&chunk), interner, context.clone());

    let debugger = Debugger::new(DebuggerArgs {
        context,
        chunk: Arc::clone(&chunk),
    });
    state.attach_debugger(Arc::clone(&debugger));
    let control = debugger.control_sender();
    let stopped = debugger.stopped_receiver();
    let thread_id = debugger.thread_id();

    control
        .send(DebugCommand::SetBreakpoints {
            thread_id,
            breakpoints: vec![BreakpointSpec::Node(first)],
        })
        .unwrap();
    // Let the service loop install the breakpoint before evaluation
    // starts.
    std::thread::sleep(Duration::from_millis(100));

    let eval_state = Arc::clone(&state);
    let run = std::thread::spawn(move || Evaluator::run_module(&eval_state));

    // Stop 1: the breakpoint, before `a = 1`.
    let event = stopped.recv_timeout(WAIT).unwrap();
    assert_eq!(event.reason, StopReason::Breakpoint);
    assert!(event.breakpoint_id.is_some());

    // Stop 2: NextStep, before `a = 2`; locals show a == 1.
    control.send(DebugCommand::NextStep { thread_id }).unwrap();
    let event = stopped.recv_timeout(WAIT).unwrap();
    assert_eq!(event.reason, StopReason::NextStep);
    let (scopes_tx, scopes_rx) = unbounded();
    control
        .send(DebugCommand::GetScopes {
            thread_id,
            reply: scopes_tx,
        })
        .unwrap();
    let scopes = scopes_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(
        scopes.locals,
        vec![("a".to_owned(), Value::int(1))],
        "locals at the second stop"
    );

    // Stop 3: NextStep, before `a = 3`; locals show a == 2.
    control.send(DebugCommand::NextStep { thread_id }).unwrap();
    let event = stopped.recv_timeout(WAIT).unwrap();
    assert_eq!(event.reason, StopReason::NextStep);
    let (scopes_tx, scopes_rx) = unbounded();
    control
        .send(DebugCommand::GetScopes {
            thread_id,
            reply: scopes_tx,
        })
        .unwrap();
    let scopes = scopes_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(scopes.locals, vec![("a".to_owned(), Value::int(2))]);

    // A stack trace is served from the same snapshot.
    let (trace_tx, trace_rx) = unbounded();
    control
        .send(DebugCommand::GetStackTrace {
            thread_id,
            reply: trace_tx,
        })
        .unwrap();
    let trace = trace_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].name, "main");
    assert_eq!(trace[0].statement_start_line, 3);

    control.send(DebugCommand::Continue { thread_id }).unwrap();
    let result = run.join().unwrap().unwrap();
    assert_eq!(result, Value::int(3));
}

#[test]
fn duplicate_breakpoint_on_same_node_is_noop() {
    let (builder, statements, first) = three_assignments();
    let (chunk, interner) = builder.finish(statements);
    let context = root_context(permissive());
    let state = make_state(Arc::clone(&chunk), interner, context.clone());

    let debugger = Debugger::new(DebuggerArgs {
        context,
        chunk: Arc::clone(&chunk),
    });
    state.attach_debugger(Arc::clone(&debugger));
    let control = debugger.control_sender();
    let stopped = debugger.stopped_receiver();
    let thread_id = debugger.thread_id();

    control
        .send(DebugCommand::SetBreakpoints {
            thread_id,
            breakpoints: vec![BreakpointSpec::Node(first), BreakpointSpec::Node(first)],
        })
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let eval_state = Arc::clone(&state);
    let run = std::thread::spawn(move || Evaluator::run_module(&eval_state));

    let event = stopped.recv_timeout(WAIT).unwrap();
    assert_eq!(event.reason, StopReason::Breakpoint);
    control.send(DebugCommand::Continue { thread_id }).unwrap();

    let result = run.join().unwrap().unwrap();
    assert_eq!(result, Value::int(3));
    // The duplicate never fires a second stop.
    assert!(stopped.try_recv().is_err());
}

#[test]
fn line_breakpoints_resolve_to_first_statement_and_empty_lines_never_fire() {
    let source = "a = 1\n\na = 2\nreturn a\n";
    let mut b = ModuleBuilder::new("main", source);
    let a = b.name("a");
    let one = b.add(Node::IntLiteral(1), (4, 5));
    let assign1 = b.add(
        Node::Assignment {
            target: AssignTarget::Variable(a),
            rhs: one,
        },
        (0, 5),
    );
    let two = b.add(Node::IntLiteral(2), (11, 12));
    let assign2 = b.add(
        Node::Assignment {
            target: AssignTarget::Variable(a),
            rhs: two,
        },
        (7, 12),
    );
    let a_ref = b.add(Node::Var(a), (20, 21));
    let ret = b.add(Node::Return(Some(a_ref)), (13, 21));
    let (chunk, interner) = b.finish(vec![assign1, assign2, ret]);

    let context = root_context(permissive());
    let state = make_state(Arc::clone(&chunk), interner, context.clone());
    let debugger = Debugger::new(DebuggerArgs {
        context,
        chunk: Arc::clone(&chunk),
    });
    state.attach_debugger(Arc::clone(&debugger));
    let control = debugger.control_sender();
    let stopped = debugger.stopped_receiver();
    let thread_id = debugger.thread_id();

    // Line 2 is empty (inert entry); line 3 resolves to `a = 2`.
    control
        .send(DebugCommand::SetBreakpoints {
            thread_id,
            breakpoints: vec![BreakpointSpec::Line(2), BreakpointSpec::Line(3)],
        })
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let eval_state = Arc::clone(&state);
    let run = std::thread::spawn(move || Evaluator::run_module(&eval_state));

    let event = stopped.recv_timeout(WAIT).unwrap();
    assert_eq!(event.reason, StopReason::Breakpoint);

    let (scopes_tx, scopes_rx) = unbounded();
    control
        .send(DebugCommand::GetScopes {
            thread_id,
            reply: scopes_tx,
        })
        .unwrap();
    let scopes = scopes_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(scopes.locals, vec![("a".to_owned(), Value::int(1))]);

    control.send(DebugCommand::Continue { thread_id }).unwrap();
    assert_eq!(run.join().unwrap().unwrap(), Value::int(2));
    assert!(stopped.try_recv().is_err());
}

#[test]
fn pause_during_sleep_stops_once_before_next_statement() {
    // a = 1; sleep 0.3s; a = 2; return a
    let source = "a = 1\nsleep 0.3s\na = 2\nreturn a\n";
    let mut b = ModuleBuilder::new("main", source);
    let a = b.name("a");
    let sleep = b.name("sleep");
    let one = b.add(Node::IntLiteral(1), (4, 5));
    let assign1 = b.add(
        Node::Assignment {
            target: AssignTarget::Variable(a),
            rhs: one,
        },
        (0, 5),
    );
    let sleep_fn = b.add(Node::Var(sleep), (6, 11));
    let duration = b.add(Node::DurationLiteral(300), (12, 16));
    let sleep_call = b.add(
        Node::Call {
            callee: sleep_fn,
            args: vec![duration],
            spread_arg: None,
            must: false,
        },
        (6, 16),
    );
    let two = b.add(Node::IntLiteral(2), (21, 22));
    let assign2 = b.add(
        Node::Assignment {
            target: AssignTarget::Variable(a),
            rhs: two,
        },
        (17, 22),
    );
    let a_ref = b.add(Node::Var(a), (30, 31));
    let ret = b.add(Node::Return(Some(a_ref)), (23, 31));
    let (chunk, interner) = b.finish(vec![assign1, sleep_call, assign2, ret]);

    let context = root_context(permissive());
    let state = make_state(Arc::clone(&chunk), interner, context.clone());
    let debugger = Debugger::new(DebuggerArgs {
        context,
        chunk: Arc::clone(&chunk),
    });
    state.attach_debugger(Arc::clone(&debugger));
    let control = debugger.control_sender();
    let stopped = debugger.stopped_receiver();
    let thread_id = debugger.thread_id();

    let eval_state = Arc::clone(&state);
    let run = std::thread::spawn(move || Evaluator::run_module(&eval_state));

    // Pause lands while the thread sleeps; the stop happens at the next
    // statement boundary, before `a = 2`.
    std::thread::sleep(Duration::from_millis(10));
    control.send(DebugCommand::Pause { thread_id }).unwrap();

    let event = stopped.recv_timeout(WAIT).unwrap();
    assert_eq!(event.reason, StopReason::Pause);

    let (scopes_tx, scopes_rx) = unbounded();
    control
        .send(DebugCommand::GetScopes {
            thread_id,
            reply: scopes_tx,
        })
        .unwrap();
    let scopes = scopes_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(scopes.locals, vec![("a".to_owned(), Value::int(1))]);

    control.send(DebugCommand::Continue { thread_id }).unwrap();
    assert_eq!(run.join().unwrap().unwrap(), Value::int(2));
    // Exactly one PauseStop.
    assert!(stopped.try_recv().is_err());
}

#[test]
fn exception_breakpoint_fires_on_overflow() {
    // a = 1; overflow = 10_000_000_000 * 10_000_000_000; return a
    let source = "a = 1\noverflow = (10_000_000_000 * 10_000_000_000)\nreturn a\n";
    let mut b = ModuleBuilder::new("main", source);
    let a = b.name("a");
    let overflow = b.name("overflow");
    let one = b.add(Node::IntLiteral(1), (4, 5));
    let assign1 = b.add(
        Node::Assignment {
            target: AssignTarget::Variable(a),
            rhs: one,
        },
        (0, 5),
    );
    let lhs = b.add(Node::IntLiteral(10_000_000_000), (18, 32));
    let rhs = b.add(Node::IntLiteral(10_000_000_000), (35, 49));
    let product = b.add(
        Node::Binary {
            op: rill_ir::BinaryOp::Mul,
            lhs,
            rhs,
        },
        (18, 49),
    );
    let assign2 = b.add(
        Node::Assignment {
            target: AssignTarget::Variable(overflow),
            rhs: product,
        },
        (6, 50),
    );
    let a_ref = b.add(Node::Var(a), (58, 59));
    let ret = b.add(Node::Return(Some(a_ref)), (51, 59));
    let (chunk, interner) = b.finish(vec![assign1, assign2, ret]);

    let context = root_context(permissive());
    let state = make_state(Arc::clone(&chunk), interner, context.clone());
    let debugger = Debugger::new(DebuggerArgs {
        context,
        chunk: Arc::clone(&chunk),
    });
    state.attach_debugger(Arc::clone(&debugger));
    let control = debugger.control_sender();
    let stopped = debugger.stopped_receiver();
    let thread_id = debugger.thread_id();

    let (id_tx, id_rx) = unbounded();
    control
        .send(DebugCommand::SetExceptionBreakpoints {
            thread_id,
            reply: id_tx,
        })
        .unwrap();
    let breakpoint_id = id_rx.recv_timeout(WAIT).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let eval_state = Arc::clone(&state);
    let run = std::thread::spawn(move || Evaluator::run_module(&eval_state));

    let event = stopped.recv_timeout(WAIT).unwrap();
    assert_eq!(event.reason, StopReason::Exception);
    assert_eq!(event.breakpoint_id, Some(breakpoint_id));
    let error = event.error.expect("exception stop carries the error");
    assert_eq!(error.id(), "IntOverflow");

    control.send(DebugCommand::Continue { thread_id }).unwrap();
    // The module returns the overflow error.
    let result = run.join().unwrap();
    assert_eq!(result.unwrap_err().id(), "IntOverflow");
}
