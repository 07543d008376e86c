//! The instruction graph of a method body.
//!
//! Every instruction of the body is decoded into a node of an arena, in offset order. Edges are
//! then linked by a depth-first walk from the roots: the method entry at offset 0, then the
//! handler start of each exception clause (and the filter start of filter clauses), in clause
//! order. Nodes no root reaches stay in the arena unlinked and are left out of
//! [`CilGraph::linear`].
//!
//! Successor order follows [`Instruction::successors`]: a conditional branch has the
//! fallthrough at index 0 and the taken branch at index 1.

use std::collections::HashMap;

use crate::{
    assembly::{decoder::decode_stream, instruction::Instruction},
    metadata::method::{ClauseKind, ExceptionClause, MethodBody},
    Result,
};

/// Index of a node in its [`CilGraph`]
pub type NodeIndex = usize;

/// One decoded instruction and its edges.
#[derive(Debug, Clone)]
pub struct CilNode {
    /// The instruction
    pub instruction: Instruction,
    /// Successors in [`Instruction::successors`] order
    pub next: Vec<NodeIndex>,
    /// Predecessors in discovery order, each listed once
    pub prev: Vec<NodeIndex>,
    /// Index of the exception clause whose handler or filter starts here
    pub ehclause_start: Option<usize>,
    /// True if some root reaches the node
    pub reachable: bool,
}

impl CilNode {
    /// Offset of the instruction
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.instruction.offset
    }
}

/// The linked instructions of one method body.
#[derive(Debug, Clone)]
pub struct CilGraph {
    nodes: Vec<CilNode>,
    by_offset: HashMap<u32, NodeIndex>,
    roots: Vec<NodeIndex>,
    clauses: Vec<ExceptionClause>,
}

impl CilGraph {
    /// Build the graph of a decoded method body.
    ///
    /// # Errors
    /// See [`CilGraph::build`].
    pub fn from_body(body: &MethodBody, allow_internal: bool) -> Result<CilGraph> {
        CilGraph::build(&body.code, &body.exception_clauses, allow_internal)
    }

    /// Decode `code` and link it from the entry and every clause's handler.
    ///
    /// # Errors
    /// Returns decoding errors, and [`crate::Error::Malformed`] for empty code or a branch or
    /// handler offset that is not the start of an instruction.
    pub fn build(
        code: &[u8],
        clauses: &[ExceptionClause],
        allow_internal: bool,
    ) -> Result<CilGraph> {
        if code.is_empty() {
            return Err(malformed_error!("Method body has no code"));
        }

        let nodes: Vec<CilNode> = decode_stream(code, allow_internal)?
            .into_iter()
            .map(|instruction| CilNode {
                instruction,
                next: Vec::new(),
                prev: Vec::new(),
                ehclause_start: None,
                reachable: false,
            })
            .collect();
        let by_offset = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.offset(), index))
            .collect();

        let mut graph = CilGraph {
            nodes,
            by_offset,
            roots: Vec::new(),
            clauses: clauses.to_vec(),
        };

        let entry = graph.index_of(0)?;
        graph.roots.push(entry);
        for (clause_index, clause) in clauses.iter().enumerate() {
            let mut starts = vec![clause.handler_offset];
            if let ClauseKind::Filter(filter_offset) = clause.kind() {
                starts.insert(0, filter_offset);
            }

            for start in starts {
                let root = graph.index_of(start)?;
                graph.nodes[root].ehclause_start = Some(clause_index);
                graph.roots.push(root);
            }
        }

        for root in graph.roots.clone() {
            graph.link_from(root)?;
        }

        log::trace!(
            "graph: {} instructions, {} reachable, {} roots",
            graph.nodes.len(),
            graph.len(),
            graph.roots.len()
        );
        Ok(graph)
    }

    fn index_of(&self, offset: u32) -> Result<NodeIndex> {
        self.by_offset.get(&offset).copied().ok_or_else(|| {
            malformed_error!("Offset IL_{:04X} is not the start of an instruction", offset)
        })
    }

    fn link_from(&mut self, root: NodeIndex) -> Result<()> {
        let mut pending = vec![root];

        while let Some(current) = pending.pop() {
            if self.nodes[current].reachable {
                continue;
            }
            self.nodes[current].reachable = true;

            let successors = self.nodes[current]
                .instruction
                .successors()
                .into_iter()
                .map(|offset| self.index_of(offset))
                .collect::<Result<Vec<_>>>()?;

            for &successor in &successors {
                let prev = &mut self.nodes[successor].prev;
                if !prev.contains(&current) {
                    prev.push(current);
                }
            }
            pending.extend(
                successors
                    .iter()
                    .rev()
                    .filter(|&&successor| !self.nodes[successor].reachable),
            );
            self.nodes[current].next = successors;
        }

        Ok(())
    }

    /// Number of reachable nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.reachable).count()
    }

    /// True if no node is reachable, which a built graph never is
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The node at `index`
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> &CilNode {
        &self.nodes[index]
    }

    /// Every decoded node in offset order, unreachable ones included
    #[must_use]
    pub fn nodes(&self) -> &[CilNode] {
        &self.nodes
    }

    /// The node starting at `offset`
    #[must_use]
    pub fn node_at(&self, offset: u32) -> Option<NodeIndex> {
        self.by_offset.get(&offset).copied()
    }

    /// Roots in registration order: the entry first, then the clause starts
    #[must_use]
    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// The exception clauses of the body
    #[must_use]
    pub fn clauses(&self) -> &[ExceptionClause] {
        &self.clauses
    }

    /// Reachable nodes in offset order
    pub fn linear(&self) -> impl Iterator<Item = (NodeIndex, &CilNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.reachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::method::ExceptionHandlerFlags, Error};

    #[test]
    fn straight_line() {
        // ldarg.0; ldc.i4.1; add; ret
        let graph = CilGraph::build(&[0x02, 0x17, 0x58, 0x2A], &[], false).unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots(), [0]);
        let chain: Vec<_> = graph.linear().map(|(_, node)| node.next.clone()).collect();
        assert_eq!(chain, [vec![1], vec![2], vec![3], vec![]]);
        assert!(graph.node(0).prev.is_empty());
        assert_eq!(graph.node(3).prev, [2]);
    }

    #[test]
    fn short_branch_successor() {
        // br.s +5; five nops; ret
        let code = [0x2B, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A];
        let graph = CilGraph::build(&code, &[], false).unwrap();

        let target = graph.node_at(0x07).unwrap();
        assert_eq!(graph.node(0).next, [target]);
        assert_eq!(graph.len(), 2);
        assert!(!graph.node(graph.node_at(0x02).unwrap()).reachable);
        assert_eq!(graph.nodes().len(), 7);
    }

    #[test]
    fn diamond_links_once() {
        #[rustfmt::skip]
        let code = [
            0x02,       // 0: ldarg.0
            0x2C, 0x03, // 1: brfalse.s +3 -> 6
            0x17,       // 3: ldc.i4.1
            0x2B, 0x01, // 4: br.s +1 -> 7
            0x16,       // 6: ldc.i4.0
            0x2A,       // 7: ret
        ];
        let graph = CilGraph::build(&code, &[], false).unwrap();

        let branch = graph.node_at(1).unwrap();
        let fallthrough = graph.node_at(3).unwrap();
        let taken = graph.node_at(6).unwrap();
        let join = graph.node_at(7).unwrap();

        assert_eq!(graph.node(branch).next, [fallthrough, taken]);
        assert_eq!(graph.node(join).prev.len(), 2);
        assert_eq!(graph.len(), 6);
        let offsets: Vec<_> = graph.linear().map(|(_, node)| node.offset()).collect();
        assert_eq!(offsets, [0, 1, 3, 4, 6, 7]);
    }

    #[test]
    fn handlers_are_roots() {
        #[rustfmt::skip]
        let code = [
            0x00,       // 0: nop (try)
            0xDE, 0x03, // 1: leave.s +3 -> 6
            0x26,       // 3: pop (handler)
            0xDE, 0x00, // 4: leave.s +0 -> 6
            0x2A,       // 6: ret
        ];
        let clause = ExceptionClause {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0,
            try_length: 3,
            handler_offset: 3,
            handler_length: 3,
            class_token_or_filter: 0x0100_0001,
        };
        let graph = CilGraph::build(&code, &[clause], false).unwrap();

        let handler = graph.node_at(3).unwrap();
        assert_eq!(graph.roots(), [0, handler]);
        assert_eq!(graph.node(handler).ehclause_start, Some(0));
        assert!(graph.node(handler).reachable);
        assert_eq!(graph.len(), 5);

        let ret = graph.node_at(6).unwrap();
        assert_eq!(graph.node(ret).prev.len(), 2);
    }

    #[test]
    fn bad_targets() {
        // br.s +1 lands inside ldc.i4
        let code = [0x2B, 0x01, 0x20, 0x00, 0x00, 0x00, 0x00, 0x2A];
        assert!(matches!(
            CilGraph::build(&code, &[], false),
            Err(Error::Malformed { .. })
        ));

        assert!(CilGraph::build(&[], &[], false).is_err());
    }
}
