//! Loop information and the condition tree.

use std::collections::HashMap;

use migoinfer_ssa::{InstrKind, Program, ValueId};

/// Index of a node in the condition tree arena.
type NodeIdx = usize;

/// A binary tree of loop conditions. True/false children may share
/// subtrees (short-circuit re-joins), so nodes live in an arena and link
/// by index.
#[derive(Debug, Default)]
struct BinNode {
    cond: Option<ValueId>,
    true_: Option<NodeIdx>,
    false_: Option<NodeIdx>,
    target: bool,
    prefix: Vec<String>,
}

/// Information about one candidate for-loop: the index variable, its
/// initial and step values, the condition tree, and the body/done block
/// indices. `params_ok` gates whether the loop influences MiGo output.
#[derive(Debug)]
pub struct Info {
    pub index_var: Option<ValueId>,
    pub init_val: i64,
    pub step_val: i64,
    pub loop_idx: usize,
    pub body_idx: usize,
    pub done_idx: usize,
    pub index_ok: bool,
    pub cond_ok: bool,

    nodes: Vec<BinNode>,
    root: Option<NodeIdx>,
    subtrees: HashMap<ValueId, NodeIdx>,
    prev_cond: Option<ValueId>,
    target: NodeIdx,
}

impl Info {
    pub fn new(loop_idx: usize) -> Info {
        let target = BinNode { target: true, ..BinNode::default() };
        Info {
            index_var: None,
            init_val: 0,
            step_val: 0,
            loop_idx,
            body_idx: 0,
            done_idx: 0,
            index_ok: false,
            cond_ok: false,
            nodes: vec![target],
            root: None,
            subtrees: HashMap::new(),
            prev_cond: None,
            target: 0,
        }
    }

    /// Installs the root condition; later calls are no-ops.
    pub fn set_cond(&mut self, cond: ValueId) {
        if self.root.is_none() {
            let idx = self.push(cond);
            self.root = Some(idx);
        }
    }

    pub fn root_cond(&self) -> Option<ValueId> {
        self.root.and_then(|r| self.nodes[r].cond)
    }

    /// Points the tree cursor at the conditional the next insertion
    /// hangs off.
    pub fn set_parent_cond(&mut self, prev_cond: ValueId) {
        self.prev_cond = Some(prev_cond);
    }

    fn push(&mut self, cond: ValueId) -> NodeIdx {
        let idx = self.nodes.len();
        self.nodes.push(BinNode { cond: Some(cond), ..BinNode::default() });
        self.subtrees.insert(cond, idx);
        idx
    }

    fn prev_node(&self) -> Option<NodeIdx> {
        self.prev_cond.and_then(|c| self.subtrees.get(&c).copied())
    }

    /// Inserts `cond` as the true-child of the previous condition.
    pub fn add_true(&mut self, cond: ValueId) {
        let Some(prev) = self.prev_node() else {
            log::error!(target: "loop", "add_true to subtree that does not exist");
            return;
        };
        if self.nodes[prev].true_.is_none() {
            let child = match self.subtrees.get(&cond) {
                // A previously visited node: sharing makes a re-join.
                Some(&idx) => idx,
                None => self.push(cond),
            };
            self.nodes[prev].true_ = Some(child);
        }
    }

    /// Inserts `cond` as the false-child of the previous condition.
    pub fn add_false(&mut self, cond: ValueId) {
        let Some(prev) = self.prev_node() else {
            log::error!(target: "loop", "add_false to subtree that does not exist");
            return;
        };
        if self.nodes[prev].false_.is_none() {
            let child = match self.subtrees.get(&cond) {
                Some(&idx) => idx,
                None => self.push(cond),
            };
            self.nodes[prev].false_ = Some(child);
        }
    }

    /// Attaches the loop-body sentinel at the current tree position.
    pub fn mark_target(&mut self) {
        let Some(prev) = self.prev_node() else {
            log::error!(target: "loop", "mark_target to subtree that does not exist");
            return;
        };
        self.nodes[prev].true_ = Some(self.target);
    }

    /// True iff both the index variable and the condition were
    /// recognised and the condition mentions the index.
    pub fn params_ok(&self) -> bool {
        self.index_var.is_some()
            && self.index_ok
            && self.root_cond().is_some()
            && self.cond_ok
    }

    /// Serialises the loop header `v = init; (cond); v = v ± step`.
    pub fn render(&mut self, prog: &Program) -> String {
        let Some(iv) = self.index_var else {
            return String::new();
        };
        let name = prog.value(iv).name.clone();
        let mut out = format!("{} = {}; ", name, self.init_val);
        if self.root.is_some() {
            self.calc_prefix(prog);
            let exprs = self.collect(self.root.unwrap(), prog, &mut Vec::new());
            out.push_str(&format!("{}; ", exprs.join("||")));
        }
        if self.step_val >= 0 {
            out.push_str(&format!("{} = {} + {}", name, name, self.step_val));
        } else {
            out.push_str(&format!("{} = {} - {}", name, name, -self.step_val));
        }
        out
    }

    /// Propagates ancestor conditions into each node's prefix so the
    /// serialised expression carries the short-circuit structure.
    fn calc_prefix(&mut self, prog: &Program) {
        for n in &mut self.nodes {
            n.prefix.clear();
        }
        let mut queue = vec![self.root.unwrap()];
        let mut visited = vec![false; self.nodes.len()];
        while !queue.is_empty() {
            let t = queue.remove(0);
            if visited[t] {
                continue;
            }
            visited[t] = true;
            let t_true = self.true_string(t, prog);
            let t_false = self.false_string(t, prog);
            if let Some(child) = self.nodes[t].true_ {
                self.nodes[child].prefix.push(t_true);
                queue.push(child);
            }
            if let Some(child) = self.nodes[t].false_ {
                self.nodes[child].prefix.push(t_false);
                queue.push(child);
            }
        }
    }

    /// Enumerates the disjunction branches ending in the loop target.
    fn collect(&self, t: NodeIdx, prog: &Program, seen: &mut Vec<NodeIdx>) -> Vec<String> {
        if seen.contains(&t) {
            return Vec::new();
        }
        seen.push(t);
        if let Some(child) = self.nodes[t].true_ {
            if self.nodes[child].target {
                return vec![self.true_string(t, prog)];
            }
        }
        let mut exprs = Vec::new();
        if let Some(child) = self.nodes[t].true_ {
            exprs.extend(self.collect(child, prog, seen));
        }
        if let Some(child) = self.nodes[t].false_ {
            exprs.extend(self.collect(child, prog, seen));
        }
        exprs
    }

    fn true_string(&self, t: NodeIdx, prog: &Program) -> String {
        let node = &self.nodes[t];
        if node.target {
            return "TARGET".to_string();
        }
        let this = node.cond.map(|c| expr_to_string(prog, c)).unwrap_or_default();
        if node.prefix.is_empty() {
            return this;
        }
        node.prefix
            .iter()
            .map(|p| format!("({} && {})", p, this))
            .collect::<Vec<_>>()
            .join("||")
    }

    fn false_string(&self, t: NodeIdx, prog: &Program) -> String {
        let node = &self.nodes[t];
        let this = node.cond.map(|c| expr_to_string(prog, c)).unwrap_or_default();
        if node.prefix.is_empty() {
            return format!("!{}", this);
        }
        node.prefix
            .iter()
            .map(|p| format!("({} && !{})", p, this))
            .collect::<Vec<_>>()
            .join("||")
    }
}

/// Renders a conditional expression in source-level notation.
pub fn expr_to_string(prog: &Program, expr: ValueId) -> String {
    if let Some(n) = prog.int_const(expr) {
        return format!("{}", n);
    }
    match prog.def_instr(expr).map(|i| &i.kind) {
        Some(InstrKind::BinOp { op, x, y }) => format!(
            "({}{}{})",
            expr_to_string(prog, *x),
            op.symbol(),
            expr_to_string(prog, *y)
        ),
        _ => prog.value(expr).name.clone(),
    }
}

/// True if the condition expression mentions the index variable.
pub fn uses_index_var(prog: &Program, cond: ValueId, index: ValueId) -> bool {
    match prog.def_instr(cond).map(|i| &i.kind) {
        Some(InstrKind::BinOp { x, y, .. }) => {
            uses_index_var(prog, *x, index) || uses_index_var(prog, *y, index)
        }
        Some(InstrKind::UnOp { x, .. }) => uses_index_var(prog, *x, index),
        _ => cond == index,
    }
}
