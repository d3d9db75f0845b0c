//! LThread scheduling, sharing discipline and cancellation scenarios.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{make_state, permissive, root_context, ModuleBuilder};
use rill_core::CancellationReason;
use rill_eval::{spawn_lthread, Evaluator, GlobalKind, LThreadSpawnArgs, SpawnKind};
use rill_ir::{AssignTarget, BinaryOp, Module, Node, NodeId};
use rill_values::{IntRange, Object, StructLayout, StructPointer, StructValue, Value};

/// Build `for _ in iterations { synchronized(shared) { shared.a = shared.a + 1 } }`.
fn increment_loop(b: &mut ModuleBuilder) -> NodeId {
    let shared = b.name("shared");
    let i = b.name("i");
    let a = b.name("a");

    let shared_ref = b.addd(Node::Var(shared));
    let member = b.addd(Node::Member {
        object: shared_ref,
        name: a,
    });
    let one = b.addd(Node::IntLiteral(1));
    let sum = b.addd(Node::Binary {
        op: BinaryOp::Add,
        lhs: member,
        rhs: one,
    });
    let target_obj = b.addd(Node::Var(shared));
    let assign = b.addd(Node::Assignment {
        target: AssignTarget::Member {
            object: target_obj,
            name: a,
        },
        rhs: sum,
    });
    let sync_obj = b.addd(Node::Var(shared));
    let sync_body = b.addd(Node::Block(vec![assign]));
    let sync = b.addd(Node::Synchronized {
        values: vec![sync_obj],
        body: sync_body,
    });
    let loop_body = b.addd(Node::Block(vec![sync]));
    // The iteration count comes in as a range-valued start constant.
    let range_var = b.name("iterations");
    let iterated = b.addd(Node::Var(range_var));
    b.addd(Node::For {
        key_var: None,
        value_var: Some(i),
        iterated,
        body: loop_body,
        chunk_size: None,
        produces_value: false,
    })
}

/// Parent and child each increment a shared object 5000 times under
/// `synchronized`; the final count is exactly 10000.
#[test]
fn spawn_sharing_object_with_synchronized_increments() {
    let mut b = ModuleBuilder::new("main", "");
    let shared_name = b.name("shared");
    let handle_name = b.name("handle");

    // Child body: the same increment loop.
    let child_loop = increment_loop(&mut b);
    let child_body = b.addd(Node::Block(vec![child_loop]));

    // spawn, passing `shared` explicitly.
    let shared_ref = b.addd(Node::Var(shared_name));
    let spawn = b.addd(Node::Spawn {
        globals: vec![(shared_name, shared_ref)],
        allow: vec![],
        group: None,
        body: child_body,
    });
    let spawn_assign = b.addd(Node::Assignment {
        target: AssignTarget::Variable(handle_name),
        rhs: spawn,
    });

    // Parent loop.
    let parent_loop = increment_loop(&mut b);

    // handle.wait_result!()
    let handle_ref = b.addd(Node::Var(handle_name));
    let wait_member = b.name("wait_result");
    let wait_fn = b.addd(Node::Member {
        object: handle_ref,
        name: wait_member,
    });
    let join = b.addd(Node::Call {
        callee: wait_fn,
        args: vec![],
        spread_arg: None,
        must: true,
    });

    let (chunk, interner) = b.finish(vec![spawn_assign, parent_loop, join]);

    let context = root_context(permissive());
    let state = make_state(chunk, interner, context);

    let shared = Object::new(vec![("a".into(), Value::int(0))]).unwrap();
    state.globals.set(
        state.interner.intern("shared"),
        Value::Object(shared.clone()),
        GlobalKind::Regular,
    );
    state.globals.set(
        state.interner.intern("iterations"),
        Value::IntRange(IntRange::new(1, 5000)),
        GlobalKind::StartConstant,
    );

    Evaluator::run_module(&state).unwrap();
    assert!(shared.is_shared());
    assert_eq!(shared.get("a"), Some(Value::int(10_000)));
}

/// Sharable values observed in the child are equal to the parent's; a
/// clonable value's mutations in the child never reach the parent.
#[test]
fn clonable_transfer_is_isolated() {
    let mut b = ModuleBuilder::new("main", "");
    let xs = b.name("xs");
    let handle = b.name("handle");

    // Child body: xs[0] = 99
    let xs_ref = b.addd(Node::Var(xs));
    let zero = b.addd(Node::IntLiteral(0));
    let ninety_nine = b.addd(Node::IntLiteral(99));
    let mutate = b.addd(Node::Assignment {
        target: AssignTarget::Index {
            indexed: xs_ref,
            index: zero,
        },
        rhs: ninety_nine,
    });
    let child_body = b.addd(Node::Block(vec![mutate]));

    let xs_arg = b.addd(Node::Var(xs));
    let spawn = b.addd(Node::Spawn {
        globals: vec![(xs, xs_arg)],
        allow: vec![],
        group: None,
        body: child_body,
    });
    let spawn_assign = b.addd(Node::Assignment {
        target: AssignTarget::Variable(handle),
        rhs: spawn,
    });
    let handle_ref = b.addd(Node::Var(handle));
    let wait_fn = b.addd(Node::Member {
        object: handle_ref,
        name: b.name("wait_result"),
    });
    let join = b.addd(Node::Call {
        callee: wait_fn,
        args: vec![],
        spread_arg: None,
        must: true,
    });
    let (chunk, interner) = b.finish(vec![spawn_assign, join]);

    let context = root_context(permissive());
    let state = make_state(chunk, interner, context);
    let list = Value::list(vec![Value::int(1)]);
    state
        .globals
        .set(state.interner.intern("xs"), list.clone(), GlobalKind::Regular);

    Evaluator::run_module(&state).unwrap();
    // The child mutated its deep copy, not the parent's list.
    let Value::List(parent_list) = &list else {
        panic!("list expected")
    };
    assert_eq!(parent_list.get(0), Some(Value::int(1)));
}

/// Spawning with a value that is neither sharable nor clonable fails.
#[test]
fn spawn_with_non_transferable_argument_fails() {
    let mut b = ModuleBuilder::new("main", "");
    let p = b.name("p");
    let p_ref = b.addd(Node::Var(p));
    let body = b.addd(Node::Block(vec![]));
    let spawn = b.addd(Node::Spawn {
        globals: vec![(p, p_ref)],
        allow: vec![],
        group: None,
        body,
    });
    let (chunk, interner) = b.finish(vec![spawn]);

    let context = root_context(permissive());
    let state = make_state(chunk, interner, context);
    let layout = Arc::new(StructLayout::new(state.interner.intern("P"), vec![]));
    state.globals.set(
        state.interner.intern("p"),
        Value::StructPointer(StructPointer::new(StructValue {
            layout,
            fields: vec![],
        })),
        GlobalKind::StartConstant,
    );

    let error = Evaluator::run_module(&state).unwrap_err();
    assert_eq!(error.id(), "NotSharableNorClonable");
}

/// Spawning without the lthread-create permission fails with NotAllowed.
#[test]
fn spawn_requires_lthread_permission() {
    let mut b = ModuleBuilder::new("main", "");
    let body = b.addd(Node::Block(vec![]));
    let spawn = b.addd(Node::Spawn {
        globals: vec![],
        allow: vec![],
        group: None,
        body,
    });
    let (chunk, interner) = b.finish(vec![spawn]);

    // No permissions at all.
    let context = root_context(vec![]);
    let state = make_state(chunk, interner, context);
    let error = Evaluator::run_module(&state).unwrap_err();
    assert_eq!(error.id(), "NotAllowed");
}

/// Cancelling the parent context cancels every descendant; their
/// `wait_result` observes a cancellation error within bounded time.
#[test]
fn cancelling_parent_cancels_descendant_lthreads() {
    // Child body: loop forever, sleeping a little each iteration.
    let mut b = ModuleBuilder::new("main", "");
    let sleep = b.name("sleep");
    let i = b.name("i");
    let sleep_ref = b.addd(Node::Var(sleep));
    let pause = b.addd(Node::DurationLiteral(5));
    let sleep_call = b.addd(Node::Call {
        callee: sleep_ref,
        args: vec![pause],
        spread_arg: None,
        must: false,
    });
    let loop_body = b.addd(Node::Block(vec![sleep_call]));
    let iterated = b.addd(Node::Var(b.name("iterations")));
    let long_loop = b.addd(Node::For {
        key_var: None,
        value_var: Some(i),
        iterated,
        body: loop_body,
        chunk_size: None,
        produces_value: false,
    });
    let body = b.addd(Node::Block(vec![long_loop]));
    let (chunk, interner) = b.finish(vec![body]);

    let context = root_context(permissive());
    let module = Arc::new(Module::new("main", Arc::clone(&chunk)));
    let state = rill_eval::GlobalState::new(Arc::clone(&module), context.clone(), interner);
    rill_eval::register_prelude(&state);
    state.globals.set(
        state.interner.intern("iterations"),
        Value::IntRange(IntRange::new(0, 1_000_000)),
        GlobalKind::StartConstant,
    );

    let lthread = spawn_lthread(LThreadSpawnArgs {
        parent_state: Arc::clone(&state),
        module,
        body: Some(body),
        globals: vec![],
        permissions: vec![],
        extra_limits: vec![],
        inherit_patterns: true,
        group: None,
        debugger: None,
        kind: SpawnKind::UserSpawn,
    })
    .unwrap();

    std::thread::sleep(Duration::from_millis(50));
    context.cancel(CancellationReason::UserRequested);

    // The waiter uses its own (un-cancelled) context.
    let waiter = root_context(vec![]);
    let started = std::time::Instant::now();
    let error = lthread.wait_result(&waiter).unwrap_err();
    assert_eq!(error.id(), "ContextCancelled");
    assert!(started.elapsed() < Duration::from_secs(2), "bounded time");
}
