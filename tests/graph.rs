//! Instruction graph properties: handler roots and branch edges.

use std::collections::HashSet;

use cilfront::{
    assembly::{opcodes::*, CilGraph},
    metadata::method::{ExceptionClause, ExceptionHandlerFlags},
    Error,
};

fn clause(
    flags: ExceptionHandlerFlags,
    try_offset: u32,
    try_length: u32,
    handler_offset: u32,
    handler_length: u32,
    class_token_or_filter: u32,
) -> ExceptionClause {
    ExceptionClause {
        flags,
        try_offset,
        try_length,
        handler_offset,
        handler_length,
        class_token_or_filter,
    }
}

/// A protected block with a typed catch, a filtered catch and a finally.
fn guarded_body() -> (Vec<u8>, Vec<ExceptionClause>) {
    let code = vec![
        NOP, // 0x00
        LEAVE_S, 0x0B, // 0x01 -> 0x0E
        POP, // 0x03 catch
        LEAVE_S, 0x08, // 0x04 -> 0x0E
        POP, // 0x06 filter
        LDC_I4_1, // 0x07
        FE_PREFIX, FE_ENDFILTER, // 0x08
        POP, // 0x0A filtered handler
        LEAVE_S, 0x01, // 0x0B -> 0x0E
        ENDFINALLY, // 0x0D finally
        RET, // 0x0E
    ];
    let clauses = vec![
        clause(ExceptionHandlerFlags::EXCEPTION, 0, 3, 0x03, 3, 0x0100_0001),
        clause(ExceptionHandlerFlags::FILTER, 0, 3, 0x0A, 3, 0x06),
        clause(ExceptionHandlerFlags::FINALLY, 0, 3, 0x0D, 1, 0),
    ];
    (code, clauses)
}

#[test]
fn handler_starts_are_roots() {
    let (code, clauses) = guarded_body();
    let graph = CilGraph::build(&code, &clauses, false).unwrap();

    let at = |offset| graph.node_at(offset).unwrap();
    assert_eq!(graph.roots()[0], at(0));
    assert_eq!(graph.roots().len(), 5);

    let expected = [(0x03, 0), (0x06, 1), (0x0A, 1), (0x0D, 2)];
    for (offset, clause_index) in expected {
        let index = at(offset);
        assert!(graph.roots().contains(&index), "IL_{offset:04X} is a root");
        assert_eq!(graph.node(index).ehclause_start, Some(clause_index));
    }
    for clause in graph.clauses() {
        assert!(graph.roots().contains(&at(clause.handler_offset)));
    }

    // Handlers are only entered through their roots, yet every node is reached
    assert_eq!(graph.len(), graph.nodes().len());
    assert!(graph.node(at(0x03)).prev.is_empty());
    assert!(graph.node(at(0x0D)).next.is_empty());
    assert!(graph.node(at(0x08)).next.is_empty());

    let ret = graph.node(at(0x0E));
    let leaves: HashSet<u32> = ret.prev.iter().map(|&p| graph.node(p).offset()).collect();
    assert_eq!(leaves, HashSet::from([0x01, 0x04, 0x0B]));
}

#[test]
fn offsets_are_unique() {
    let (code, clauses) = guarded_body();
    let graph = CilGraph::build(&code, &clauses, false).unwrap();

    let mut seen = HashSet::new();
    for node in graph.nodes() {
        assert!(seen.insert(node.offset()), "IL_{:04X} twice", node.offset());
    }

    let linear: Vec<u32> = graph.linear().map(|(_, node)| node.offset()).collect();
    assert!(linear.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn short_branch_skips_to_its_target() {
    let code = [BR_S, 0x05, NOP, NOP, NOP, NOP, NOP, RET];
    let graph = CilGraph::build(&code, &[], false).unwrap();

    let entry = graph.node(graph.roots()[0]);
    assert_eq!(entry.next.len(), 1);
    assert_eq!(graph.node(entry.next[0]).offset(), 7);

    // The skipped nops are decoded but unreachable
    assert_eq!(graph.nodes().len(), 7);
    assert_eq!(graph.len(), 2);
    assert!(!graph.node(graph.node_at(2).unwrap()).reachable);
}

#[test]
fn conditional_branch_falls_through_first() {
    // ldarg.0; brtrue.s +1; nop; ret
    let code = [LDARG_0, BRTRUE_S, 0x01, NOP, RET];
    let graph = CilGraph::build(&code, &[], false).unwrap();

    let branch = graph.node(graph.node_at(1).unwrap());
    let targets: Vec<u32> = branch.next.iter().map(|&n| graph.node(n).offset()).collect();
    assert_eq!(targets, vec![3, 4]);

    let ret = graph.node(graph.node_at(4).unwrap());
    assert_eq!(ret.prev.len(), 2);
}

#[test]
fn branch_into_an_instruction_is_malformed() {
    // br.s lands inside the ldc.i4 operand
    let code = [BR_S, 0x01, LDC_I4, 0x00, 0x00, 0x00, 0x00, RET];
    assert!(matches!(
        CilGraph::build(&code, &[], false),
        Err(Error::Malformed { .. })
    ));
}

#[test]
fn internal_opcodes_need_permission() {
    let code = [LDC_I4_0, LDC_I4_1, FD_PREFIX, FD_FLIP, POP, POP, RET];
    assert!(CilGraph::build(&code, &[], false).is_err());
    assert_eq!(CilGraph::build(&code, &[], true).unwrap().len(), 6);
}

#[test]
fn empty_code_is_rejected() {
    assert!(CilGraph::build(&[], &[], false).is_err());
}
