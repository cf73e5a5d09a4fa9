//! End-to-end query tests over an in-memory graph.

use pql_compiler::{Context, MemGraph, Oid, Options, Value};

/// The standard four-node graph:
/// `A-friend->B`, `A-friend->C`, `B-friend->D`, `B-parent->D`.
fn friends() -> (Context, Oid, Oid, Oid, Oid) {
    let mut g = MemGraph::new();
    let a = g.add_object();
    let b = g.add_object();
    let c = g.add_object();
    let d = g.add_object();
    g.add_edge(a, "friend", Value::Struct(b));
    g.add_edge(a, "friend", Value::Struct(c));
    g.add_edge(b, "friend", Value::Struct(d));
    g.add_edge(b, "parent", Value::Struct(d));
    g.set_global("A", Value::Struct(a));
    g.set_global("B", Value::Struct(b));
    g.set_global("C", Value::Struct(c));
    g.set_global("D", Value::Struct(d));
    (Context::new(Box::new(g)), a, b, c, d)
}

fn run(ctx: &mut Context, text: &str) -> Value {
    let q = ctx
        .compile(text)
        .unwrap_or_else(|e| panic!("compile failed for {:?}:\n{}", text, e));
    ctx.run(&q).expect("run failed")
}

fn as_sorted_objs(v: &Value) -> Vec<Oid> {
    let mut out: Vec<Oid> = v
        .coll_items()
        .iter()
        .map(|x| match x {
            Value::Struct(oid) => *oid,
            other => panic!("expected an object, got {}", other),
        })
        .collect();
    out.sort();
    out
}

#[test]
fn one_edge() {
    let (mut ctx, _, b, c, _) = friends();
    let v = run(&mut ctx, "select X from A.friend as X");
    assert_eq!(as_sorted_objs(&v), vec![b, c]);
}

#[test]
fn transitive_closure() {
    let (mut ctx, _, b, c, d) = friends();
    let v = run(&mut ctx, "select X from A.friend+ as X");
    assert_eq!(as_sorted_objs(&v), vec![b, c, d]);
}

#[test]
fn exists_filter() {
    let (mut ctx, _, b, _, _) = friends();
    let v = run(
        &mut ctx,
        "select X from A.friend as X where exists Y in X.friend: Y = D",
    );
    assert_eq!(as_sorted_objs(&v), vec![b]);
}

#[test]
fn count_across_two_steps() {
    let (mut ctx, ..) = friends();
    // only B -> D matches the second step
    let v = run(
        &mut ctx,
        "select count(Y) from A.friend as X, X.friend as Y",
    );
    assert_eq!(v.coll_items(), &[Value::Int(1)]);
}

#[test]
fn concatenated_paths() {
    let (mut ctx, _, _, _, d) = friends();
    let v = run(
        &mut ctx,
        "select X.friend ++ X.parent from A.friend as X",
    );
    // X=B contributes [D (via friend), D (via parent)]; C has neither
    // edge, so its row does not survive the hoisted walks
    assert_eq!(
        v.coll_items(),
        &[Value::Sequence(vec![Value::Struct(d), Value::Struct(d)])]
    );
}

#[test]
fn distinct_over_alternation() {
    let (mut ctx, _, _, _, d) = friends();
    let v = run(
        &mut ctx,
        "select distinct E from A.friend as X, X.(friend|parent) as Y as E",
    );
    // both alternatives reach D; distinct collapses them into an
    // ordered sequence of the one object
    assert!(matches!(v, Value::Sequence(_)));
    assert_eq!(v.coll_items(), &[Value::Struct(d)]);
}

#[test]
fn reversed_edge() {
    let (mut ctx, a, ..) = friends();
    let v = run(&mut ctx, "select X from B.@friend as X");
    assert_eq!(as_sorted_objs(&v), vec![a]);
}

#[test]
fn optional_edge_keeps_the_row() {
    let (mut ctx, _, b, c, d) = friends();
    // skipping the optional step stays at X, so every X survives;
    // B additionally reaches D by taking it
    let v = run(
        &mut ctx,
        "select Y from A.friend as X, X.friend? as Y",
    );
    assert_eq!(as_sorted_objs(&v), vec![b, c, d]);
}

#[test]
fn star_includes_the_start() {
    let (mut ctx, _, b, _, d) = friends();
    let v = run(&mut ctx, "select X from B.friend* as X");
    // zero steps stays at B; one step reaches D
    assert_eq!(as_sorted_objs(&v), vec![b, d]);
}

#[test]
fn repeat_terminates_on_cycles() {
    let mut g = MemGraph::new();
    let a = g.add_object();
    let b = g.add_object();
    g.add_edge(a, "next", Value::Struct(b));
    g.add_edge(b, "next", Value::Struct(a));
    g.set_global("A", Value::Struct(a));
    let mut ctx = Context::new(Box::new(g));
    let v = run(&mut ctx, "select X from A.next+ as X");
    assert_eq!(as_sorted_objs(&v), vec![a, b]);
}

#[test]
fn repeat_with_no_extension_returns_the_input() {
    let (mut ctx, _, _, c, _) = friends();
    // C has no outgoing friend edges at all
    let v = run(&mut ctx, "select X from C.friend* as X");
    assert_eq!(as_sorted_objs(&v), vec![c]);
}

#[test]
fn shared_prefix_evaluates_once() {
    let (mut ctx, _, _, _, d) = friends();
    // A.friend is walked once; the second path continues from X
    let v = run(
        &mut ctx,
        "select Y from A.friend as X, A.friend.friend as Y",
    );
    assert_eq!(as_sorted_objs(&v), vec![d]);
}

#[test]
fn where_clause_comparisons() {
    let (mut ctx, _, b, ..) = friends();
    let v = run(&mut ctx, "select X from A.friend as X where X = B");
    assert_eq!(as_sorted_objs(&v), vec![b]);

    let v = run(&mut ctx, "select X from A.friend as X where X != B");
    assert_eq!(v.coll_items().len(), 1);
}

#[test]
fn arithmetic_and_aggregates() {
    let (mut ctx, ..) = friends();
    assert_eq!(
        run(&mut ctx, "select 2 + 3 * 4 from A.friend as X"),
        Value::Set(vec![Value::Int(14), Value::Int(14)])
    );
    assert_eq!(
        run(&mut ctx, "1 / 0"),
        Value::Nil
    );
    assert_eq!(run(&mut ctx, "sum(set(2))"), Value::Int(2));
}

#[test]
fn string_matching() {
    let (mut ctx, _, b, c, _) = friends();
    let v = run(&mut ctx, "select X from A.\"fr%\" as X");
    assert_eq!(as_sorted_objs(&v), vec![b, c]);
}

#[test]
fn assignment_scopes_over_the_query() {
    let (mut ctx, ..) = friends();
    assert_eq!(run(&mut ctx, "n := 4; n * n"), Value::Int(16));
}

#[test]
fn group_by_nests() {
    let (mut ctx, ..) = friends();
    let v = run(
        &mut ctx,
        "select G from A.friend as X, X.friend as Y group by X as G",
    );
    // one group: X=B with its single friend
    assert_eq!(v.coll_items().len(), 1);
}

#[test]
fn booleans_and_quantifier_over_literals() {
    let (mut ctx, ..) = friends();
    assert_eq!(
        run(&mut ctx, "for all Z in set(2): Z = 2"),
        Value::Bool(true)
    );
    assert_eq!(
        run(&mut ctx, "exists Z in set(2): Z = 3"),
        Value::Bool(false)
    );
}

#[test]
fn compile_error_reports_messages() {
    let (mut ctx, ..) = friends();
    let err = ctx.compile("select from").unwrap_err();
    assert!(!err.inner.is_empty());
    // the report renders with a span marker
    assert!(err.inner[0].span.is_some());
}

#[test]
fn unknown_global_fails_at_eval_time() {
    let (mut ctx, ..) = friends();
    let q = ctx.compile("select X from Zork.friend as X").unwrap();
    assert!(ctx.run(&q).is_err());
}

#[test]
fn dumps_cover_every_stage() {
    use pql_compiler::DumpStage;
    let (mut ctx, ..) = friends();
    ctx.options = Options {
        dump: true,
        trace: false,
    };
    let _ = ctx.compile("select X from A.friend as X").unwrap();
    let dumps = ctx.take_dumps();
    let stages: Vec<DumpStage> = dumps.iter().map(|(s, _)| *s).collect();
    for want in [
        DumpStage::Parser,
        DumpStage::Resolve,
        DumpStage::Normalize,
        DumpStage::Unify,
        DumpStage::MovePaths,
        DumpStage::BindNil,
        DumpStage::Dequantify,
        DumpStage::Tuplify,
        DumpStage::TypeInf,
        DumpStage::NoRenames,
        DumpStage::BaseOpt,
        DumpStage::StepJoins,
    ] {
        assert!(stages.contains(&want), "missing dump stage {}", want);
    }
}

#[test]
fn trace_records_evaluation() {
    let (mut ctx, ..) = friends();
    ctx.options = Options {
        dump: false,
        trace: true,
    };
    let q = ctx.compile("select X from A.friend as X").unwrap();
    let _ = ctx.run(&q).unwrap();
    let trace = ctx.take_trace();
    assert!(trace.iter().any(|l| l.starts_with("step")));
    assert!(trace.iter().any(|l| l.starts_with("map")));
}

#[test]
fn queries_run_repeatedly() {
    let (mut ctx, _, b, c, _) = friends();
    let q = ctx.compile("select X from A.friend as X").unwrap();
    for _ in 0..3 {
        let v = ctx.run(&q).unwrap();
        assert_eq!(as_sorted_objs(&v), vec![b, c]);
    }
}

#[test]
fn new_object_creates_graph_state() {
    let (mut ctx, ..) = friends();
    let v = run(&mut ctx, "new");
    assert!(matches!(v, Value::Struct(_)));
}
