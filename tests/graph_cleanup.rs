//! End-to-end graph maintenance scenarios: branch deletion collapsing
//! merges, loop back-edge removal degenerating headers, and resolution
//! through the indirection left behind.

use coral_ir::ir::{Graph, NodeId, NodeKind, ValueOp};
use coral_ir::opt::{
    cleanup, delete_branch, kill_cfg, kill_cfg_with, normalize_loops, original_value,
    simplify_phi, try_kill_unused, CleanupConfig, NoSimplifier, WorkListSimplifier,
};

/// start -> if -> (then -> then_end, else -> else_end) -> merge -> return phi
struct Diamond {
    iff: NodeId,
    then_begin: NodeId,
    merge: NodeId,
    phi: NodeId,
    then_value: NodeId,
    else_value: NodeId,
    ret: NodeId,
}

fn build_diamond(graph: &mut Graph, then_value: i64, else_value: i64) -> Diamond {
    let cond = graph.add_parameter(0);
    let iff = graph.add_if(cond);
    graph.set_next(graph.start, iff);

    let then_begin = graph.add_begin();
    let else_begin = graph.add_begin();
    graph.set_branches(iff, then_begin, else_begin);

    let then_end = graph.add_end();
    let else_end = graph.add_end();
    graph.set_next(then_begin, then_end);
    graph.set_next(else_begin, else_end);

    let merge = graph.add_merge(&[then_end, else_end]);
    let tv = graph.add_const_int(then_value);
    let ev = graph.add_const_int(else_value);
    let phi = graph.add_phi(merge, &[tv, ev]);
    let ret = graph.add_return(phi);
    graph.set_next(merge, ret);

    Diamond {
        iff,
        then_begin,
        merge,
        phi,
        then_value: tv,
        else_value: ev,
        ret,
    }
}

/// Counting loop: phi = (0, phi + 1), condition on the phi, one exit
/// carrying the phi out through a proxy.
struct CountingLoop {
    begin: NodeId,
    loop_end: NodeId,
    body_begin: NodeId,
    iff: NodeId,
    exit: NodeId,
    phi: NodeId,
    next: NodeId,
    init: NodeId,
    proxy: NodeId,
    ret: NodeId,
}

fn build_counting_loop(graph: &mut Graph) -> CountingLoop {
    let fwd = graph.add_end();
    graph.set_next(graph.start, fwd);
    let begin = graph.add_loop_begin(fwd);
    let loop_end = graph.add_loop_end(begin);

    let init = graph.add_const_int(0);
    let one = graph.add_const_int(1);
    let phi = graph.add_phi(begin, &[init, NodeId::INVALID]);
    let next = graph.add_binary(coral_ir::ir::BinOp::Add, phi, one);
    graph.set_phi_value(phi, 1, next);
    graph.set_loop_state(begin, &[phi]);

    let iff = graph.add_if(phi);
    graph.set_next(begin, iff);
    let body_begin = graph.add_begin();
    let exit = graph.add_loop_exit(begin);
    graph.set_branches(iff, body_begin, exit);
    graph.set_next(body_begin, loop_end);

    let proxy = graph.add_proxy(exit, phi);
    let ret = graph.add_return(proxy);
    graph.set_next(exit, ret);

    CountingLoop {
        begin,
        loop_end,
        body_begin,
        iff,
        exit,
        phi,
        next,
        init,
        proxy,
        ret,
    }
}

#[test]
fn phi_with_equal_inputs_collapses_to_the_constant() {
    let mut graph = Graph::new();
    let d = build_diamond(&mut graph, 42, 42);

    assert!(simplify_phi(&mut graph, d.phi));

    assert!(!graph.is_alive(d.phi));
    assert_eq!(graph.node(d.ret).inputs[0], d.then_value);
    assert!(matches!(
        graph.node(d.then_value).kind,
        NodeKind::Value(ValueOp::ConstInt(42))
    ));
    graph.verify().unwrap();
}

#[test]
fn killing_sole_predecessor_branch_rewires_phi_usages() {
    let mut graph = Graph::new();
    let d = build_diamond(&mut graph, 1, 2);

    let mut tool = WorkListSimplifier::default();
    graph.replace_first_successor(d.iff, d.then_begin, NodeId::INVALID);
    kill_cfg_with(&mut graph, d.then_begin, &mut tool);

    assert!(!graph.is_alive(d.merge), "trivial merge is gone");
    assert!(!graph.is_alive(d.phi));
    assert_eq!(
        graph.node(d.ret).inputs[0],
        d.else_value,
        "every phi usage now sees the surviving input"
    );
    assert_eq!(
        tool.work_list,
        vec![d.ret],
        "the callback saw the phi usage before the reduction"
    );
    graph.verify().unwrap();
}

#[test]
fn deleting_the_back_edge_branch_degenerates_the_loop() {
    let mut graph = Graph::new();
    let l = build_counting_loop(&mut graph);
    graph.verify().unwrap();

    delete_branch(&mut graph, l.body_begin, &mut NoSimplifier);

    // The header lost its only back edge and was reduced away entirely;
    // the loop-carried phi collapsed onto its initial value.
    for node in [l.begin, l.loop_end, l.body_begin, l.phi, l.proxy, l.exit] {
        assert!(!graph.is_alive(node), "{node} should be dead");
    }
    assert!(graph.loop_begins().is_empty());
    assert_eq!(graph.node(graph.start).successors[0], l.iff);
    assert_eq!(graph.node(l.iff).predecessor, graph.start);
    assert_eq!(graph.node(l.iff).inputs[0], l.init);
    assert_eq!(graph.node(l.ret).inputs[0], l.init);
    graph.verify().unwrap();

    // The increment lost its last usage with the phi slot and lingers
    // until reclaimed.
    assert!(graph.is_alive(l.next));
    assert!(try_kill_unused(&mut graph, l.next));
    graph.verify().unwrap();
}

#[test]
fn killing_the_loop_entry_tears_down_the_whole_loop() {
    let mut graph = Graph::new();
    let l = build_counting_loop(&mut graph);
    let entry_end = graph.node(graph.start).successors[0];

    graph.replace_at_predecessor(entry_end, NodeId::INVALID);
    kill_cfg(&mut graph, entry_end);

    for node in [
        l.begin,
        l.loop_end,
        l.body_begin,
        l.iff,
        l.exit,
        l.phi,
        l.next,
        l.proxy,
        l.ret,
    ] {
        assert!(!graph.is_alive(node), "{node} should be dead");
    }
    assert!(graph.is_alive(graph.start));
    graph.verify().unwrap();
}

#[test]
fn normalize_reduces_header_that_never_looped() {
    let mut graph = Graph::new();
    // for (;;) { break; } leaves a header with an entry and no back edge.
    let fwd = graph.add_end();
    graph.set_next(graph.start, fwd);
    let begin = graph.add_loop_begin(fwd);
    let x = graph.add_const_int(7);
    let phi = graph.add_phi(begin, &[x]);
    let ret = graph.add_return(phi);
    graph.set_next(begin, ret);

    assert!(normalize_loops(&mut graph));

    assert!(graph.loop_begins().is_empty());
    assert!(!graph.is_alive(begin));
    assert!(!graph.is_alive(phi));
    assert_eq!(graph.node(ret).inputs[0], x);
    assert_eq!(graph.node(graph.start).successors[0], ret);
    graph.verify().unwrap();

    // Idempotent: a second pass finds nothing.
    assert!(!normalize_loops(&mut graph));
}

#[test]
fn cleanup_runs_normalization_and_verification() {
    let mut graph = Graph::new();
    let fwd = graph.add_end();
    graph.set_next(graph.start, fwd);
    let begin = graph.add_loop_begin(fwd);
    let next = graph.add_begin();
    graph.set_next(begin, next);

    let config = CleanupConfig {
        normalize_loops: true,
        verify: true,
    };
    let stats = cleanup(&mut graph, &config);

    assert!(stats.loop_removed);
    assert!(stats.live_after < stats.live_before);
    assert!(graph.loop_begins().is_empty());
}

#[test]
fn edge_symmetry_holds_across_a_mutation_sequence() {
    let mut graph = Graph::new();
    let d = build_diamond(&mut graph, 3, 3);
    graph.verify().unwrap();

    assert!(simplify_phi(&mut graph, d.phi));
    graph.verify().unwrap();

    graph.replace_first_successor(d.iff, d.then_begin, NodeId::INVALID);
    kill_cfg(&mut graph, d.then_begin);
    graph.verify().unwrap();

    cleanup(&mut graph, &CleanupConfig::default());
    graph.verify().unwrap();
}

#[test]
fn resolver_sees_through_the_loop_exit_proxy() {
    let mut graph = Graph::new();
    let l = build_counting_loop(&mut graph);

    // The proxied loop counter is genuinely multi-valued: no answer.
    assert_eq!(original_value(&graph, l.proxy), None);

    // A proxy of the unchanging initial value resolves through.
    let p = graph.add_proxy(l.exit, l.init);
    assert_eq!(original_value(&graph, p), Some(l.init));
}
