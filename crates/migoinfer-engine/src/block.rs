//! Block visit graph and the block analyser interface.
//!
//! The visit graph records the control flow the analysis has walked. A
//! block counts as visited once every incoming edge has been visited;
//! the per-function edge tables are initialised from the SSA predecessor
//! sets. The reentrant variant stacks edge tables on function re-entry;
//! the engine itself uses non-reentrant graphs (one per call instance)
//! and realises re-entry by instantiating a fresh analyser.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use migoinfer_ssa::{BlockRef, FuncId, Program};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("blockgraph: cannot pop edges: stack empty")]
pub struct EdgesStackEmpty;

/// Edges are mapped as block index → incoming block index → visited.
type VisitedEdges = HashMap<usize, HashMap<usize, bool>>;

/// One node of the visit graph; corresponds to one basic block visit.
#[derive(Debug)]
pub struct VisitNode {
    blk: BlockRef,
    prev: Cell<Option<BlockRef>>,
}

impl VisitNode {
    pub fn new(blk: BlockRef) -> Rc<VisitNode> {
        Rc::new(VisitNode { blk, prev: Cell::new(None) })
    }

    pub fn blk(&self) -> BlockRef {
        self.blk
    }

    pub fn func(&self) -> FuncId {
        self.blk.func
    }

    pub fn index(&self) -> usize {
        self.blk.block
    }

    /// The block visited immediately before this node, set on each visit.
    pub fn prev_blk(&self) -> Option<BlockRef> {
        self.prev.get()
    }
}

/// Ordered record of visited blocks plus per-function edge tables.
pub struct VisitGraph {
    nodes: Vec<Rc<VisitNode>>,
    visited: HashMap<FuncId, VisitedEdges>,
    reentrant: bool,
    edges_stack: HashMap<FuncId, Vec<VisitedEdges>>,
}

impl VisitGraph {
    pub fn new(reentrant: bool) -> VisitGraph {
        VisitGraph {
            nodes: Vec::new(),
            visited: HashMap::new(),
            reentrant,
            edges_stack: HashMap::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn last_node(&self) -> Option<&Rc<VisitNode>> {
        self.nodes.last()
    }

    /// Enters a block in natural order. Entry blocks (index 0)
    /// (re-)initialise the function's edge table; any other block marks
    /// the edge from the previous visit's block.
    pub fn visit(&mut self, prog: &Program, n: &Rc<VisitNode>) {
        let prev = self.nodes.last().map(|p| p.blk());
        self.nodes.push(n.clone());
        n.prev.set(prev);

        if n.index() == 0 {
            self.mark_new_func_visit(prog, n);
        } else {
            match prev {
                Some(p) => self.mark_visit(p, n.blk()),
                None => log::warn!(target: "block", "visit: there is no previous block"),
            }
        }
    }

    /// Non-linear visit: enters `n` with an explicit predecessor.
    pub fn visit_from(&mut self, prog: &Program, prev: &Rc<VisitNode>, n: &Rc<VisitNode>) {
        let tail = self.nodes.last().map(|p| p.blk());
        self.nodes.push(n.clone());
        n.prev.set(tail);

        if !self.nodes.iter().any(|m| m.blk() == prev.blk()) {
            log::warn!(
                target: "block",
                "visit_from: #{} is not an existing visit node",
                prev.index()
            );
        }
        if self.visited.get(&n.func()).is_none() {
            self.mark_new_func_visit(prog, n);
        }
        self.mark_visit(prev.blk(), n.blk());
    }

    /// Marks a block that has no successor visit. Pops the edge table of
    /// a reentrant graph; no effect otherwise.
    pub fn mark_last(&mut self, n: &Rc<VisitNode>) -> Result<(), EdgesStackEmpty> {
        if self.reentrant {
            let stack = self.edges_stack.entry(n.func()).or_default();
            let top = stack.pop().ok_or(EdgesStackEmpty)?;
            self.visited.insert(n.func(), top);
        }
        Ok(())
    }

    fn mark_visit(&mut self, prev: BlockRef, n: BlockRef) {
        if prev.func != n.func {
            log::warn!(
                target: "block",
                "mark_visit: blocks #{} and #{} are in different functions",
                prev.block,
                n.block
            );
            return;
        }
        if let Some(edges) = self.visited.get_mut(&n.func) {
            if let Some(in_edges) = edges.get_mut(&n.block) {
                in_edges.insert(prev.block, true);
            }
        }
    }

    /// Enters the parent function of `n`, (re-)initialising its edge
    /// table from the SSA predecessor sets.
    fn mark_new_func_visit(&mut self, prog: &Program, n: &Rc<VisitNode>) {
        if self.visited.contains_key(&n.func()) {
            if !self.reentrant {
                log::warn!(target: "block", "function of #{} was already visited", n.index());
                return;
            }
            let old = self.visited.remove(&n.func()).unwrap_or_default();
            self.edges_stack.entry(n.func()).or_default().push(old);
        }
        let mut edges: VisitedEdges = HashMap::new();
        for b in &prog.func(n.func()).blocks {
            let mut in_edges = HashMap::new();
            for &p in &b.preds {
                in_edges.insert(p, false);
            }
            edges.insert(b.index, in_edges);
        }
        self.visited.insert(n.func(), edges);
    }

    /// True if every in-edge of the node's block has been visited.
    pub fn node_visited(&self, n: &Rc<VisitNode>) -> bool {
        if self.nodes.is_empty() {
            return false; // First visit.
        }
        match self.visited.get(&n.func()) {
            Some(edges) => edges
                .get(&n.index())
                .map(|in_edges| in_edges.values().all(|&v| v))
                .unwrap_or(true),
            None => false,
        }
    }

    /// True if the specific edge `from → to` has been visited.
    pub fn edge_visited(&self, from: &Rc<VisitNode>, to: &Rc<VisitNode>) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        self.visited
            .get(&to.func())
            .and_then(|edges| edges.get(&to.index()))
            .and_then(|in_edges| in_edges.get(&from.index()))
            .copied()
            .unwrap_or(false)
    }

    /// True if the block has been visited through at least one in-edge.
    /// Blocks without in-edges count as visited once entered.
    pub fn visited_once(&self, n: &Rc<VisitNode>) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        match self.visited.get(&n.func()).and_then(|edges| edges.get(&n.index())) {
            Some(in_edges) => in_edges.is_empty() || in_edges.values().any(|&v| v),
            None => false,
        }
    }
}

/// Block-level analyser: handles block transitions within a function.
pub trait Analyser {
    /// Analyses a block entered in natural order (function entry or
    /// direct successor).
    fn enter_blk(&mut self, blk: BlockRef) -> Result<(), crate::errors::FatalError>;

    /// Analyses a block reached through an explicit control transfer.
    fn jump_blk(&mut self, curr: BlockRef, next: BlockRef)
        -> Result<(), crate::errors::FatalError>;

    /// Finalises a terminating block.
    fn exit_blk(&mut self, blk: BlockRef);

    /// The current (last entered) block.
    fn curr_blk(&self) -> Option<BlockRef>;

    /// The previous (last exited) block.
    fn prev_blk(&self) -> Option<BlockRef>;
}

/// Applies `visit` to each edge of the function in breadth-first order.
pub fn traverse_edges(
    prog: &Program,
    func: FuncId,
    mut visit: impl FnMut(Option<BlockRef>, BlockRef),
) {
    let f = prog.func(func);
    if f.blocks.is_empty() {
        return;
    }
    let mut graph = VisitGraph::new(false);
    let mut queue: Vec<(Option<BlockRef>, BlockRef)> =
        vec![(None, BlockRef { func, block: 0 })];
    while !queue.is_empty() {
        let (from, to) = queue.remove(0);
        let node = VisitNode::new(to);
        if !graph.node_visited(&node) {
            match from {
                None => graph.visit(prog, &node),
                Some(f) => graph.visit_from(prog, &VisitNode::new(f), &node),
            }
            visit(from, to);
            for &succ in &prog.block(to).succs {
                queue.push((Some(to), BlockRef { func, block: succ }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migoinfer_ssa::build;

    // Diamond: 0 → {1, 2}; 1 → 2.
    fn diamond() -> migoinfer_ssa::Info {
        build::from_source(
            "package main\n\nfunc main():\n0 entry:\n    t0 = 1:int < 2:int\n    if t0 goto 1 else 2\n1 if.then:\n    jump 2\n2 if.done:\n    return\n",
        )
        .build()
        .unwrap()
    }

    fn blk(info: &migoinfer_ssa::Info, i: usize) -> BlockRef {
        BlockRef { func: info.prog.funcs[0].id, block: i }
    }

    #[test]
    fn visit_appends_nodes_in_order() {
        let info = diamond();
        let mut g = VisitGraph::new(false);
        assert_eq!(0, g.size());
        let n0 = VisitNode::new(blk(&info, 0));
        g.visit(&info.prog, &n0);
        assert_eq!(1, g.size());
        let n1 = VisitNode::new(blk(&info, 1));
        g.visit(&info.prog, &n1);
        assert_eq!(2, g.size());
        assert_eq!(Some(blk(&info, 0)), n1.prev_blk());
        assert_eq!(None, n0.prev_blk());
        assert_eq!(blk(&info, 1), g.last_node().unwrap().blk());
    }

    #[test]
    fn node_visited_requires_all_in_edges() {
        let info = diamond();
        let mut g = VisitGraph::new(false);
        let n0 = VisitNode::new(blk(&info, 0));
        let n1 = VisitNode::new(blk(&info, 1));
        let n2 = VisitNode::new(blk(&info, 2));
        g.visit(&info.prog, &n0);
        assert!(g.node_visited(&n0)); // Entry block has no in-edges.
        g.visit_from(&info.prog, &n0, &n1);
        assert!(g.node_visited(&n1));
        g.visit_from(&info.prog, &n1, &n2);
        // Block 2 has two in-edges (0 and 1); only one visited so far.
        assert!(!g.node_visited(&n2));
        assert!(g.visited_once(&n2));
        g.visit_from(&info.prog, &n0, &n2);
        assert!(g.node_visited(&n2));
    }

    #[test]
    fn edge_visited_tracks_single_edges() {
        let info = diamond();
        let mut g = VisitGraph::new(false);
        let n0 = VisitNode::new(blk(&info, 0));
        let n1 = VisitNode::new(blk(&info, 1));
        let n2 = VisitNode::new(blk(&info, 2));
        g.visit(&info.prog, &n0);
        g.visit_from(&info.prog, &n0, &n1);
        assert!(g.edge_visited(&n0, &n1));
        assert!(!g.edge_visited(&n1, &n2));
        g.visit_from(&info.prog, &n1, &n2);
        assert!(g.edge_visited(&n1, &n2));
        assert!(!g.edge_visited(&n0, &n2));
    }

    #[test]
    fn reentrant_graph_stacks_edge_tables() {
        let info = diamond();
        let mut g = VisitGraph::new(true);
        let n0 = VisitNode::new(blk(&info, 0));
        let n1 = VisitNode::new(blk(&info, 1));
        g.visit(&info.prog, &n0);
        g.visit_from(&info.prog, &n0, &n1);
        assert!(g.node_visited(&n1));
        // Re-entering the function pushes the table and resets edges.
        let n0b = VisitNode::new(blk(&info, 0));
        g.visit(&info.prog, &n0b);
        assert!(!g.node_visited(&n1));
        // Popping restores the previous state.
        g.mark_last(&n0b).unwrap();
        assert!(g.node_visited(&n1));
        // Popping again underflows.
        assert!(g.mark_last(&n0b).is_err());
    }

    #[test]
    fn nonreentrant_mark_last_is_noop() {
        let info = diamond();
        let mut g = VisitGraph::new(false);
        let n0 = VisitNode::new(blk(&info, 0));
        g.visit(&info.prog, &n0);
        assert!(g.mark_last(&n0).is_ok());
    }

    #[test]
    fn traverse_edges_visits_every_edge_once() {
        let info = diamond();
        let mut seen = Vec::new();
        traverse_edges(&info.prog, info.prog.funcs[0].id, |from, to| {
            seen.push((from.map(|b| b.block), to.block));
        });
        // Breadth-first from entry; the join block is reached once per
        // incoming edge until fully visited.
        assert_eq!(
            vec![(None, 0), (Some(0), 1), (Some(0), 2), (Some(1), 2)],
            seen
        );
    }
}
