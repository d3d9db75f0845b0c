//! Evaluator semantics: recursion and located errors, checked
//! arithmetic, interpolation injection prevention, control flow, imports
//! and extensions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use common::{make_state, permissive, root_context, ModuleBuilder};
use rill_eval::{Evaluator, GlobalKind};
use rill_ir::{
    AssignTarget, BinaryOp, Chunk, MatchCase, Node, NodeId, Param, Span, StrSegment,
};
use rill_values::{ArithmeticError, ScalarInt, Value};

/// Declare `fn f(i) { if i == 0 { return <base> } else { return i * f(i - 1) } }`.
fn declare_recursive_fn(
    b: &mut ModuleBuilder,
    fn_name: &str,
    base_case: impl FnOnce(&mut ModuleBuilder) -> NodeId,
    fn_span: (u32, u32),
) -> NodeId {
    let f = b.name(fn_name);
    let i = b.name("i");

    let base = base_case(b);
    let base_ret = b.addd(Node::Return(Some(base)));
    let then_block = b.addd(Node::Block(vec![base_ret]));

    let i_ref = b.addd(Node::Var(i));
    let one = b.addd(Node::IntLiteral(1));
    let i_minus_1 = b.addd(Node::Binary {
        op: BinaryOp::Sub,
        lhs: i_ref,
        rhs: one,
    });
    let f_ref = b.addd(Node::Var(f));
    let recurse = b.addd(Node::Call {
        callee: f_ref,
        args: vec![i_minus_1],
        spread_arg: None,
        must: false,
    });
    let i_ref2 = b.addd(Node::Var(i));
    let product = b.addd(Node::Binary {
        op: BinaryOp::Mul,
        lhs: i_ref2,
        rhs: recurse,
    });
    let else_ret = b.addd(Node::Return(Some(product)));
    let else_block = b.addd(Node::Block(vec![else_ret]));

    let i_ref3 = b.addd(Node::Var(i));
    let zero = b.addd(Node::IntLiteral(0));
    let test = b.addd(Node::Binary {
        op: BinaryOp::Eq,
        lhs: i_ref3,
        rhs: zero,
    });
    let body = b.addd(Node::If {
        test,
        consequent: then_block,
        alternate: Some(else_block),
    });
    let block = b.addd(Node::Block(vec![body]));
    let fn_expr = b.add(
        Node::FnExpr {
            params: vec![Param {
                name: i,
                pattern: None,
                variadic: false,
            }],
            body: block,
            captured_globals: vec![],
            captured_locals: vec![],
        },
        fn_span,
    );
    b.addd(Node::FnDecl {
        name: f,
        function: fn_expr,
    })
}

#[test]
fn recursive_factorial_returns_six() {
    let mut b = ModuleBuilder::new("main", "fn factorial(i) ...\nreturn factorial(3)\n");
    let decl = declare_recursive_fn(&mut b, "factorial", |b| b.addd(Node::IntLiteral(1)), (0, 19));
    let f_ref = b.addd(Node::Var(b.name("factorial")));
    let three = b.addd(Node::IntLiteral(3));
    let call = b.add(
        Node::Call {
            callee: f_ref,
            args: vec![three],
            spread_arg: None,
            must: false,
        },
        (27, 39),
    );
    let ret = b.addd(Node::Return(Some(call)));
    let (chunk, interner) = b.finish(vec![decl, ret]);
    let state = make_state(chunk, interner, root_context(permissive()));
    assert_eq!(Evaluator::run_module(&state).unwrap(), Value::int(6));
}

/// Division by zero deep inside the recursion produces exactly three
/// position frames: module call site, function definition, failing
/// binary expression.
#[test]
fn position_stack_has_three_frames_for_recursive_failure() {
    let source = "fn fact_div(i) ...\nfact_div(3)\n";
    let mut b = ModuleBuilder::new("main", source);
    let div_span = (5, 10);
    let fn_span = (0, 18);
    let call_span = (19, 30);
    let decl = declare_recursive_fn(
        &mut b,
        "fact_div",
        |b| {
            let one = b.addd(Node::IntLiteral(1));
            let i_ref = b.addd(Node::Var(b.name("i")));
            b.add(
                Node::Binary {
                    op: BinaryOp::Div,
                    lhs: one,
                    rhs: i_ref,
                },
                div_span,
            )
        },
        fn_span,
    );
    let f_ref = b.addd(Node::Var(b.name("fact_div")));
    let three = b.addd(Node::IntLiteral(3));
    let call = b.add(
        Node::Call {
            callee: f_ref,
            args: vec![three],
            spread_arg: None,
            must: false,
        },
        call_span,
    );
    let (chunk, interner) = b.finish(vec![decl, call]);
    let state = make_state(chunk, interner, root_context(permissive()));

    let error = Evaluator::run_module(&state).unwrap_err();
    assert_eq!(error.id(), "IntDivisionByZero");
    let frames = error.position_stack.frames();
    assert_eq!(frames.len(), 3, "call site -> definition -> expression");
    assert_eq!(frames[0].span, Span::new(call_span.0, call_span.1));
    assert_eq!(frames[1].span, Span::new(fn_span.0, fn_span.1));
    assert_eq!(frames[2].span, Span::new(div_span.0, div_span.1));
    assert!(frames.iter().all(|f| f.chunk_name == "main"));
}

// Checked integer arithmetic: the operators either return the
// mathematical result or fail — never a wrapped value.
proptest! {
    #[test]
    fn integer_arithmetic_is_exact_or_fails(a in any::<i64>(), b in any::<i64>()) {
        let sa = ScalarInt::new(a);
        let sb = ScalarInt::new(b);
        let wide = |r: Result<ScalarInt, ArithmeticError>, exact: i128| {
            match r {
                Ok(v) => prop_assert_eq!(i128::from(v.raw()), exact),
                Err(_) => {
                    let out_of_range =
                        exact > i128::from(i64::MAX) || exact < i128::from(i64::MIN);
                    prop_assert!(out_of_range, "spurious failure for {}", exact);
                }
            }
            Ok(())
        };
        wide(sa.checked_add(sb), i128::from(a) + i128::from(b))?;
        wide(sa.checked_sub(sb), i128::from(a) - i128::from(b))?;
        wide(sa.checked_mul(sb), i128::from(a) * i128::from(b))?;
        if b != 0 {
            wide(sa.checked_div(sb), i128::from(a) / i128::from(b))?;
        } else {
            prop_assert_eq!(sa.checked_div(sb), Err(ArithmeticError::IntDivisionByZero));
        }
    }
}

fn eval_path_with_segment(segment: &str) -> Result<Value, rill_eval::EvalError> {
    let mut b = ModuleBuilder::new("main", "");
    let s = b.name("s");
    let s_ref = b.addd(Node::Var(s));
    let template = b.addd(Node::PathTemplate {
        segments: vec![
            StrSegment::Literal("/data/".into()),
            StrSegment::Interpolation(s_ref),
        ],
    });
    let ret = b.addd(Node::Return(Some(template)));
    let (chunk, interner) = b.finish(vec![ret]);
    let state = make_state(chunk, interner, root_context(permissive()));
    state.globals.set(
        state.interner.intern("s"),
        Value::string(segment),
        GlobalKind::Regular,
    );
    Evaluator::run_module(&state)
}

// Path interpolation never lets a user-controlled segment introduce
// `..`, `?`, `#` or `\` in any encoding.
proptest! {
    #[test]
    fn path_interpolation_prevents_injection(segment in ".{0,12}") {
        let decoded = segment.replace("%2E", ".").replace("%2e", ".");
        let dangerous = decoded.contains("..")
            || decoded.contains('?')
            || decoded.contains('#')
            || decoded.contains('\\');
        match eval_path_with_segment(&segment) {
            Ok(Value::Path(path)) => {
                prop_assert!(!dangerous, "accepted dangerous segment {:?} -> {}", segment, *path);
            }
            Ok(other) => prop_assert!(false, "unexpected value {other:?}"),
            Err(e) => {
                let expected = matches!(
                    e.id(),
                    "PathInterpolationForbiddenChar" | "PathInterpolationParentDir"
                );
                prop_assert!(expected, "unexpected error {e}");
            }
        }
    }
}

#[test]
fn path_interpolation_rejects_known_attacks() {
    for segment in ["..", "a/../b", "%2E%2e", "%2e.", "x?y", "x#y", "x\\y"] {
        let error = eval_path_with_segment(segment).unwrap_err();
        assert!(
            matches!(
                error.id(),
                "PathInterpolationForbiddenChar" | "PathInterpolationParentDir"
            ),
            "segment {segment:?} produced {error}"
        );
    }
    assert_eq!(
        eval_path_with_segment("reports").unwrap(),
        Value::path("/data/reports")
    );
}

#[test]
fn multi_assignment_arity_and_nillable() {
    // a, b, c = [1, 2] fails; nillable binds c to nil.
    let build = |nillable: bool| {
        let mut b = ModuleBuilder::new("main", "");
        let names = vec![b.name("a"), b.name("b"), b.name("c")];
        let one = b.addd(Node::IntLiteral(1));
        let two = b.addd(Node::IntLiteral(2));
        let list = b.addd(Node::ListLiteral(vec![one, two]));
        let assign = b.addd(Node::MultiAssignment {
            targets: names.clone(),
            rhs: list,
            nillable,
        });
        let c_ref = b.addd(Node::Var(names[2]));
        let ret = b.addd(Node::Return(Some(c_ref)));
        let (chunk, interner) = b.finish(vec![assign, ret]);
        make_state(chunk, interner, root_context(permissive()))
    };

    let strict = Evaluator::run_module(&build(false)).unwrap_err();
    assert_eq!(strict.id(), "MultiAssignmentArityMismatch");

    let nillable = Evaluator::run_module(&build(true)).unwrap();
    assert_eq!(nillable, Value::Nil);
}

#[test]
fn match_dispatches_in_source_order_first_hit_wins() {
    let mut b = ModuleBuilder::new("main", "");
    let x = b.name("x");
    let subject = b.addd(Node::IntLiteral(5));

    // %int(0..=3) then %int (both would match 2; only the first fires for 2).
    let narrow = b.addd(Node::IntRangePattern {
        start: Some(0),
        end: Some(3),
    });
    let narrow_result = b.addd(Node::StrLiteral("narrow".into()));
    let wide = b.addd(Node::PatternIdent(b.name("int")));
    let wide_result = b.addd(Node::StrLiteral("wide".into()));
    let default_result = b.addd(Node::StrLiteral("default".into()));

    let match_node = b.addd(Node::Match {
        discriminant: subject,
        cases: vec![
            MatchCase {
                pattern: narrow,
                binding: Some(x),
                body: narrow_result,
            },
            MatchCase {
                pattern: wide,
                binding: None,
                body: wide_result,
            },
        ],
        default: Some(default_result),
    });
    let ret = b.addd(Node::Return(Some(match_node)));
    let (chunk, interner) = b.finish(vec![ret]);
    let state = make_state(chunk, interner, root_context(permissive()));
    assert_eq!(
        Evaluator::run_module(&state).unwrap(),
        Value::string("wide")
    );
}

#[test]
fn chunked_for_yields_arrays_of_chunk_size() {
    // for chunked chunk in xs: collect chunk lengths.
    let mut b = ModuleBuilder::new("main", "");
    let chunk_var = b.name("chunk");
    let xs = b.name("xs");
    let iterated = b.addd(Node::Var(xs));
    let chunk_ref = b.addd(Node::Var(chunk_var));
    let body = b.addd(Node::Block(vec![chunk_ref]));
    let size = b.addd(Node::IntLiteral(2));
    let for_expr = b.addd(Node::For {
        key_var: None,
        value_var: Some(chunk_var),
        iterated,
        body,
        chunk_size: Some(size),
        produces_value: true,
    });
    let ret = b.addd(Node::Return(Some(for_expr)));
    let (chunk, interner) = b.finish(vec![ret]);
    let state = make_state(chunk, interner, root_context(permissive()));
    state.globals.set(
        state.interner.intern("xs"),
        Value::list(vec![
            Value::int(1),
            Value::int(2),
            Value::int(3),
            Value::int(4),
            Value::int(5),
        ]),
        GlobalKind::Regular,
    );
    let result = Evaluator::run_module(&state).unwrap();
    assert_eq!(
        result,
        Value::list(vec![
            Value::list(vec![Value::int(1), Value::int(2)]),
            Value::list(vec![Value::int(3), Value::int(4)]),
            Value::list(vec![Value::int(5)]),
        ])
    );
}

#[test]
fn walk_yields_start_entry_first_and_prune_skips_subtree() {
    use rill_values::{Treedata, TreedataNode};
    let mut b = ModuleBuilder::new("main", "");
    let tree = b.name("tree");
    let entry = b.name("entry");
    let seen = b.name("seen");

    // if entry == "skipme" { prune } ; seen.push via list concat global
    let entry_ref = b.addd(Node::Var(entry));
    let skip = b.addd(Node::StrLiteral("skipme".into()));
    let test = b.addd(Node::Binary {
        op: BinaryOp::Eq,
        lhs: entry_ref,
        rhs: skip,
    });
    let prune = b.addd(Node::Prune);
    let prune_block = b.addd(Node::Block(vec![prune]));
    let guard = b.addd(Node::If {
        test,
        consequent: prune_block,
        alternate: None,
    });
    let seen_ref = b.addd(Node::Var(seen));
    let entry_ref2 = b.addd(Node::Var(entry));
    let single = b.addd(Node::ListLiteral(vec![entry_ref2]));
    let appended = b.addd(Node::Binary {
        op: BinaryOp::Concat,
        lhs: seen_ref,
        rhs: single,
    });
    let update = b.addd(Node::Assignment {
        target: AssignTarget::Variable(seen),
        rhs: appended,
    });
    let body = b.addd(Node::Block(vec![guard, update]));

    let empty = b.addd(Node::ListLiteral(vec![]));
    let init = b.addd(Node::Assignment {
        target: AssignTarget::Variable(seen),
        rhs: empty,
    });
    let walked = b.addd(Node::Var(tree));
    let walk = b.addd(Node::Walk {
        walked,
        entry_var: entry,
        body,
    });
    let seen_out = b.addd(Node::Var(seen));
    let ret = b.addd(Node::Return(Some(seen_out)));
    let (chunk, interner) = b.finish(vec![init, walk, ret]);
    let state = make_state(chunk, interner, root_context(permissive()));

    let tree_value = Value::treedata(Treedata {
        root: Value::string("root"),
        children: vec![
            TreedataNode {
                value: Value::string("skipme"),
                children: vec![TreedataNode {
                    value: Value::string("hidden"),
                    children: vec![],
                }],
            },
            TreedataNode {
                value: Value::string("kept"),
                children: vec![],
            },
        ],
    });
    state
        .globals
        .set(state.interner.intern("tree"), tree_value, GlobalKind::Regular);

    let result = Evaluator::run_module(&state).unwrap();
    // The start entry is yielded first; the pruned subtree never appears.
    assert_eq!(
        result,
        Value::list(vec![Value::string("root"), Value::string("kept")])
    );
}

#[test]
fn pipeline_binds_and_restores_anonymous_value() {
    // double(x) = x + x ; 21 | double($)
    let mut b = ModuleBuilder::new("main", "");
    let double = b.name("double");
    let x = b.name("x");
    let x_ref1 = b.addd(Node::Var(x));
    let x_ref2 = b.addd(Node::Var(x));
    let sum = b.addd(Node::Binary {
        op: BinaryOp::Add,
        lhs: x_ref1,
        rhs: x_ref2,
    });
    let fn_body = b.addd(Node::Block(vec![sum]));
    let fn_expr = b.addd(Node::FnExpr {
        params: vec![Param {
            name: x,
            pattern: None,
            variadic: false,
        }],
        body: fn_body,
        captured_globals: vec![],
        captured_locals: vec![],
    });
    let decl = b.addd(Node::FnDecl {
        name: double,
        function: fn_expr,
    });

    let start = b.addd(Node::IntLiteral(21));
    let double_ref = b.addd(Node::Var(double));
    let anon = b.addd(Node::Anonymous);
    let call = b.addd(Node::Call {
        callee: double_ref,
        args: vec![anon],
        spread_arg: None,
        must: false,
    });
    let pipeline = b.addd(Node::Pipeline {
        stages: vec![start, call],
    });
    let ret = b.addd(Node::Return(Some(pipeline)));
    let (chunk, interner) = b.finish(vec![decl, ret]);
    let state = make_state(chunk, interner, root_context(permissive()));
    assert_eq!(Evaluator::run_module(&state).unwrap(), Value::int(42));
}

#[test]
fn inclusion_import_keeps_included_chunk_positions() {
    // Included chunk: `boom = 1 / 0`.
    let mut included = Chunk::new("included.lib", "boom = 1 / 0\n");
    let interner = rill_ir::SharedInterner::new();
    let boom = interner.intern("boom");
    let one = included.add(Node::IntLiteral(1), Span::new(7, 8));
    let zero = included.add(Node::IntLiteral(0), Span::new(11, 12));
    let div = included.add(
        Node::Binary {
            op: BinaryOp::Div,
            lhs: one,
            rhs: zero,
        },
        Span::new(7, 12),
    );
    let assign = included.add(
        Node::Assignment {
            target: AssignTarget::Variable(boom),
            rhs: div,
        },
        Span::new(0, 12),
    );
    included.set_top_level(vec![assign]);

    let mut main = Chunk::new("main", "import ./included.lib\n");
    let import = main.add(
        Node::InclusionImport {
            chunk: Arc::new(included),
        },
        Span::new(0, 21),
    );
    main.set_top_level(vec![import]);
    let main = Arc::new(main);

    let module = Arc::new(rill_ir::Module::new("main", Arc::clone(&main)));
    let state = rill_eval::GlobalState::new(
        module,
        root_context(permissive()),
        rill_ir::SharedInterner::clone(&interner),
    );
    let error = Evaluator::run_module(&state).unwrap_err();
    assert_eq!(error.id(), "IntDivisionByZero");
    let frames = error.position_stack.frames();
    // Importer frame first, then the failing node in the included chunk.
    assert_eq!(frames[0].chunk_name, "main");
    assert_eq!(frames.last().unwrap().chunk_name, "included.lib");
}

#[test]
fn extension_member_resolution_matches_first_extension() {
    // extend %int { double } ; 4::double()
    let mut b = ModuleBuilder::new("main", "");
    let double = b.name("double");
    let self_name = b.name("self");

    let self_ref1 = b.addd(Node::Var(self_name));
    let self_ref2 = b.addd(Node::Var(self_name));
    let sum = b.addd(Node::Binary {
        op: BinaryOp::Add,
        lhs: self_ref1,
        rhs: self_ref2,
    });
    let method_body = b.addd(Node::Block(vec![sum]));
    let method = b.addd(Node::FnExpr {
        params: vec![],
        body: method_body,
        captured_globals: vec![],
        captured_locals: vec![],
    });
    let int_pattern = b.addd(Node::PatternIdent(b.name("int")));
    let extend = b.addd(Node::Extend {
        pattern: int_pattern,
        members: vec![rill_ir::ExtensionMember {
            name: double,
            method,
            computed: false,
        }],
    });

    let four = b.addd(Node::IntLiteral(4));
    let access = b.addd(Node::ExtensionAccess {
        subject: four,
        member: double,
    });
    let call = b.addd(Node::Call {
        callee: access,
        args: vec![],
        spread_arg: None,
        must: false,
    });
    let ret = b.addd(Node::Return(Some(call)));
    let (chunk, interner) = b.finish(vec![extend, ret]);
    let state = make_state(chunk, interner, root_context(permissive()));
    assert_eq!(Evaluator::run_module(&state).unwrap(), Value::int(8));
}

#[test]
fn checked_string_validates_against_named_pattern() {
    let build = |text: &str| {
        let mut b = ModuleBuilder::new("main", "");
        let template = b.addd(Node::StrTemplate {
            pattern: Some(b.name("digits")),
            segments: vec![StrSegment::Literal(text.into())],
        });
        let ret = b.addd(Node::Return(Some(template)));
        let (chunk, interner) = b.finish(vec![ret]);
        let state = make_state(chunk, interner, root_context(permissive()));
        state.context.add_named_pattern(
            "digits",
            rill_values::Pattern::regex("[0-9]+").unwrap(),
        );
        Evaluator::run_module(&state)
    };
    assert_eq!(build("123").unwrap(), Value::string("123"));
    assert_eq!(build("12a").unwrap_err().id(), "CheckedStringMismatch");
}

#[test]
fn module_import_runs_in_fresh_lthread_and_binds_result() {
    // Imported module: `return 7`.
    let interner = rill_ir::SharedInterner::new();
    let mut imported = Chunk::new("dep", "return 7\n");
    let seven = imported.add(Node::IntLiteral(7), Span::new(7, 8));
    let ret = imported.add(Node::Return(Some(seven)), Span::new(0, 8));
    imported.set_top_level(vec![ret]);
    let imported_module = Arc::new(rill_ir::Module::new("dep", Arc::new(imported)));

    let dep = interner.intern("dep");
    let mut main = Chunk::new("main", "import dep\nreturn dep\n");
    let import = main.add(
        Node::ModuleImport {
            binding: dep,
            module: Arc::clone(&imported_module),
        },
        Span::new(0, 10),
    );
    let dep_ref = main.add(Node::Var(dep), Span::new(18, 21));
    let ret = main.add(Node::Return(Some(dep_ref)), Span::new(11, 21));
    main.set_top_level(vec![import, ret]);

    let module = Arc::new(rill_ir::Module::new("main", Arc::new(main)));
    let state =
        rill_eval::GlobalState::new(module, root_context(permissive()), interner.clone());
    assert_eq!(Evaluator::run_module(&state).unwrap(), Value::int(7));
}

#[test]
fn module_import_validates_manifest_against_parent() {
    let interner = rill_ir::SharedInterner::new();
    let mut imported = Chunk::new("dep", "");
    let nil = imported.add(Node::NilLiteral, Span::DUMMY);
    imported.set_top_level(vec![nil]);
    let manifest = rill_ir::ManifestSpec {
        permissions: vec![rill_ir::PermissionSpec {
            kind: "read".into(),
            family: "fs".into(),
            entity: "/secrets/**".into(),
        }],
        ..rill_ir::ManifestSpec::default()
    };
    let imported_module =
        Arc::new(rill_ir::Module::new("dep", Arc::new(imported)).with_manifest(manifest));

    let dep = interner.intern("dep");
    let mut main = Chunk::new("main", "import dep\n");
    let import = main.add(
        Node::ModuleImport {
            binding: dep,
            module: imported_module,
        },
        Span::new(0, 10),
    );
    main.set_top_level(vec![import]);

    // The parent grants nothing, so the manifest is not covered.
    let module = Arc::new(rill_ir::Module::new("main", Arc::new(main)));
    let state = rill_eval::GlobalState::new(module, root_context(vec![]), interner);
    let error = Evaluator::run_module(&state).unwrap_err();
    assert_eq!(error.id(), "NotAllowed");
}

#[test]
fn testing_statements_record_results_in_source_order() {
    let mut b = ModuleBuilder::new("main", "");
    let ok_name = b.addd(Node::StrLiteral("passing case".into()));
    let one = b.addd(Node::IntLiteral(1));
    let ok_body = b.addd(Node::Block(vec![one]));
    let ok_case = b.addd(Node::Testcase {
        name: Some(ok_name),
        body: ok_body,
    });

    let bad_name = b.addd(Node::StrLiteral("failing case".into()));
    let lhs = b.addd(Node::IntLiteral(1));
    let rhs = b.addd(Node::IntLiteral(0));
    let div = b.addd(Node::Binary {
        op: BinaryOp::Div,
        lhs,
        rhs,
    });
    let bad_body = b.addd(Node::Block(vec![div]));
    let bad_case = b.addd(Node::Testcase {
        name: Some(bad_name),
        body: bad_body,
    });

    let suite_name = b.addd(Node::StrLiteral("arith suite".into()));
    let suite_body = b.addd(Node::Block(vec![ok_case, bad_case]));
    let suite = b.addd(Node::Testsuite {
        name: Some(suite_name),
        body: suite_body,
    });
    let (chunk, interner) = b.finish(vec![suite]);

    let module = Arc::new(rill_ir::Module::new("main", Arc::clone(&chunk)));
    let state =
        rill_eval::GlobalState::new(module, root_context(permissive()), interner.clone());
    // Testing statements are inert without the flag.
    Evaluator::run_module(&state).unwrap();
    assert!(state.testing.results().is_empty());

    // With the flag set, results record in source order and failures are
    // captured rather than propagated.
    let module = Arc::new(rill_ir::Module::new("main", chunk));
    let state = rill_eval::GlobalState::new(module, root_context(permissive()), interner);
    state.testing.set_enabled(true);
    Evaluator::run_module(&state).unwrap();
    let results = state.testing.results();
    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["passing case", "failing case", "arith suite"]);
    assert!(results[0].passed());
    assert_eq!(results[1].error.as_ref().unwrap().id(), "IntDivisionByZero");
    // The suite itself passes: its cases caught their own failures.
    assert!(results[2].passed());
}
