//! Transactional effect scenarios.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{make_state, permissive, root_context, ModuleBuilder};
use rill_core::{Effect, EffectError, PermissionKind, Reversibility};
use rill_eval::Evaluator;
use rill_ir::Node;
use rill_values::{HostFunction, HostReturn, Value};

/// Effect that records apply/reverse calls.
struct ProbeEffect {
    applied: AtomicBool,
    applies: Arc<AtomicUsize>,
    reverses: Arc<AtomicUsize>,
}

impl Effect for ProbeEffect {
    fn resources(&self) -> Vec<String> {
        vec!["probe".into()]
    }

    fn permission_kind(&self) -> PermissionKind {
        PermissionKind::Write
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
        self.applies.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn reverse(&self) -> Result<(), EffectError> {
        self.applied.store(false, Ordering::Release);
        self.reverses.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// `t = start_tx(); do_reversible(); t.rollback()` — the effect's apply
/// and reverse are never called.
#[test]
fn reversible_effect_then_rollback_never_applies() {
    let source = "start_tx!()\ndo_reversible()\nrollback_tx!()\n";
    let mut b = ModuleBuilder::new("main", source);
    let start_tx = b.name("start_tx");
    let do_reversible = b.name("do_reversible");
    let rollback_tx = b.name("rollback_tx");

    let start_fn = b.add(Node::Var(start_tx), (0, 8));
    let start_call = b.add(
        Node::Call {
            callee: start_fn,
            args: vec![],
            spread_arg: None,
            must: true,
        },
        (0, 11),
    );
    let do_fn = b.add(Node::Var(do_reversible), (12, 25));
    let do_call = b.add(
        Node::Call {
            callee: do_fn,
            args: vec![],
            spread_arg: None,
            must: false,
        },
        (12, 27),
    );
    let rollback_fn = b.add(Node::Var(rollback_tx), (28, 39));
    let rollback_call = b.add(
        Node::Call {
            callee: rollback_fn,
            args: vec![],
            spread_arg: None,
            must: true,
        },
        (28, 42),
    );
    let (chunk, interner) = b.finish(vec![start_call, do_call, rollback_call]);

    let context = root_context(permissive());
    let state = make_state(chunk, interner, context);

    let applies = Arc::new(AtomicUsize::new(0));
    let reverses = Arc::new(AtomicUsize::new(0));
    let effect_applies = Arc::clone(&applies);
    let effect_reverses = Arc::clone(&reverses);
    state.set_host_function(
        "do_reversible",
        HostFunction::new("do_reversible", 0, move |host_ctx, _args| {
            let ctx = host_ctx
                .as_any()
                .downcast_ref::<rill_core::Context>()
                .ok_or("requires a rill context")?;
            let tx = ctx
                .current_transaction()
                .ok_or("no transaction is current")?;
            tx.add_effect(Arc::new(ProbeEffect {
                applied: AtomicBool::new(false),
                applies: Arc::clone(&effect_applies),
                reverses: Arc::clone(&effect_reverses),
            }))
            .map_err(|e| e.to_string())?;
            Ok(HostReturn::Void)
        }),
    );

    Evaluator::run_module(&state).unwrap();
    assert_eq!(applies.load(Ordering::Acquire), 0, "apply never observed");
    assert_eq!(reverses.load(Ordering::Acquire), 0, "reverse never observed");
}

/// Irreversible effects are refused; the transaction's effect list stays
/// unchanged and a later commit applies nothing extra.
#[test]
fn irreversible_effect_is_refused_with_stable_identifier() {
    let context = root_context(permissive());
    let tx = context.start_transaction().unwrap();
    let refused = tx.add_effect(Arc::new(rill_core::IrreversibleEffect::new(
        "http post",
        PermissionKind::Write,
        || Ok(()),
    )));
    assert_eq!(
        refused.unwrap_err().id(),
        "CannotAddIrreversibleEffect"
    );
    assert_eq!(tx.effect_count(), 0);
    context.commit_transaction().unwrap();
}

/// Commit after rollback fails.
#[test]
fn commit_after_rollback_fails() {
    let context = root_context(permissive());
    let tx = context.start_transaction().unwrap();
    tx.rollback().unwrap();
    assert_eq!(tx.commit().unwrap_err().id(), "FinishedTransaction");
}

/// A second current transaction on one context is refused from script.
#[test]
fn starting_second_transaction_fails_in_script() {
    let source = "start_tx!()\nstart_tx!()\n";
    let mut b = ModuleBuilder::new("main", source);
    let start_tx = b.name("start_tx");
    let first_fn = b.add(Node::Var(start_tx), (0, 8));
    let first = b.add(
        Node::Call {
            callee: first_fn,
            args: vec![],
            spread_arg: None,
            must: true,
        },
        (0, 11),
    );
    let second_fn = b.add(Node::Var(start_tx), (12, 20));
    let second = b.add(
        Node::Call {
            callee: second_fn,
            args: vec![],
            spread_arg: None,
            must: true,
        },
        (12, 23),
    );
    let (chunk, interner) = b.finish(vec![first, second]);

    let context = root_context(permissive());
    let state = make_state(chunk, interner, context);
    let error = Evaluator::run_module(&state).unwrap_err();
    assert_eq!(error.id(), "AlreadyHasTransaction");
}

/// Applied effects roll back in reverse order when the context cancels.
#[test]
fn cancellation_rolls_back_the_running_transaction() {
    let context = root_context(permissive());
    let tx = context.start_transaction().unwrap();
    let applies = Arc::new(AtomicUsize::new(0));
    let reverses = Arc::new(AtomicUsize::new(0));
    let effect = Arc::new(ProbeEffect {
        applied: AtomicBool::new(false),
        applies: Arc::clone(&applies),
        reverses: Arc::clone(&reverses),
    });
    effect.apply().unwrap();
    tx.add_effect(effect).unwrap();

    context.cancel(rill_core::CancellationReason::UserRequested);
    assert!(tx.is_finished());
    assert_eq!(reverses.load(Ordering::Acquire), 1);
}
