//! Natural for-loop detection.
//!
//! SSA lowering tags blocks with comments (`for.loop`, `for.body`,
//! `for.done`, `cond.true`, `cond.false`). The detector is a state
//! machine over these tags, fed with every control-flow edge the
//! traversal takes; alongside, φ-nodes in loop-entry blocks yield the
//! index variable and step, and conditional branches populate the
//! condition tree.

mod info;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use migoinfer_ssa::{BinOpKind, BlockRef, ConstValue, InstrKind, Program, ValueId, ValueKind};

pub use info::{expr_to_string, uses_index_var, Info};

/// Loop transition states. CondTrue/CondFalse extend Enter for compound
/// short-circuit conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NonLoop,
    Enter,
    CondTrue,
    CondFalse,
    Body,
    Exit,
}

#[derive(Default)]
pub struct Detector {
    block_state: HashMap<BlockRef, State>,
    block_scope: HashMap<BlockRef, Rc<RefCell<Info>>>,
}

impl Detector {
    pub fn new() -> Detector {
        Detector::default()
    }

    /// The loop a block belongs to, if any.
    pub fn for_loop_at(&self, b: BlockRef) -> Option<Rc<RefCell<Info>>> {
        self.block_scope.get(&b).cloned()
    }

    /// Advances the state machine over the edge `from → to`.
    pub fn detect(&mut self, prog: &Program, from: BlockRef, to: BlockRef) {
        let state = *self.block_state.entry(from).or_insert(State::NonLoop);
        let comment = prog.block(to).comment.clone();
        log::debug!(target: "loop", "detect: #{} → #{} ({})", from.block, to.block, comment);
        match state {
            State::NonLoop => {
                if comment == "for.loop" {
                    self.block_state.insert(to, State::Enter);
                    self.block_scope
                        .entry(to)
                        .or_insert_with(|| Rc::new(RefCell::new(Info::new(to.block))));
                }
            }
            State::Enter | State::CondTrue | State::CondFalse => {
                // The parent ends with a conditional branch.
                let parent_cond = branch_cond(prog, from);
                match comment.as_str() {
                    "for.body" => {
                        self.block_state.insert(to, State::Body);
                        let scope = self.inherit(from, to, |i| i.body_idx = to.block);
                        if let Some(scope) = scope {
                            if let Some(c) = parent_cond {
                                scope.borrow_mut().set_parent_cond(c);
                            }
                            scope.borrow_mut().mark_target();
                        }
                    }
                    "for.done" => {
                        self.block_state.insert(to, State::Exit);
                        let scope = self.inherit(from, to, |i| i.done_idx = to.block);
                        if let (Some(scope), Some(c)) = (scope, parent_cond) {
                            scope.borrow_mut().set_parent_cond(c);
                        }
                    }
                    "cond.true" => {
                        self.block_state.insert(to, State::CondTrue);
                        let scope = self.inherit(from, to, |_| {});
                        if let (Some(scope), Some(c)) = (scope, parent_cond) {
                            scope.borrow_mut().set_parent_cond(c);
                        }
                    }
                    "cond.false" => {
                        self.block_state.insert(to, State::CondFalse);
                        let scope = self.inherit(from, to, |_| {});
                        if let (Some(scope), Some(c)) = (scope, parent_cond) {
                            scope.borrow_mut().set_parent_cond(c);
                        }
                    }
                    _ => {}
                }
            }
            State::Body => {
                if comment == "for.loop" {
                    // Nested loop.
                    self.block_state.insert(to, State::Enter);
                    self.block_scope
                        .entry(to)
                        .or_insert_with(|| Rc::new(RefCell::new(Info::new(to.block))));
                }
            }
            State::Exit => {
                if comment == "for.loop" {
                    // Consecutive sibling loop (or re-entering a parent).
                    self.block_state.insert(to, State::Enter);
                    self.block_scope
                        .entry(to)
                        .or_insert_with(|| Rc::new(RefCell::new(Info::new(to.block))));
                }
            }
        }
    }

    /// Copies the loop scope of `from` onto `to` on first discovery.
    fn inherit(
        &mut self,
        from: BlockRef,
        to: BlockRef,
        init: impl FnOnce(&mut Info),
    ) -> Option<Rc<RefCell<Info>>> {
        if let Some(scope) = self.block_scope.get(&to) {
            return Some(scope.clone());
        }
        let scope = self.block_scope.get(&from)?.clone();
        init(&mut scope.borrow_mut());
        self.block_scope.insert(to, scope.clone());
        Some(scope)
    }

    /// Works out the loop index from a φ-node in a loop-entry block: one
    /// incoming edge is a constant (initial value), the other an ADD/SUB
    /// with a constant operand (step).
    pub fn extract_index(&mut self, prog: &Program, blk: BlockRef, phi: ValueId) {
        match self.block_state.get(&blk) {
            Some(State::Enter) => {}
            Some(_) => return,
            None => {
                log::debug!(target: "loop", "no index to extract at unknown state");
                return;
            }
        }
        let Some(scope) = self.block_scope.get(&blk) else {
            log::debug!(target: "loop", "extract_index: #{} is not part of a loop", blk.block);
            return;
        };
        let Some(InstrKind::Phi { edges }) = prog.def_instr(phi).map(|i| i.kind.clone()) else {
            return;
        };
        let mut scope = scope.borrow_mut();
        for &edge in edges.iter().take(2) {
            if let Some(n) = int_const(prog, edge) {
                scope.init_val = n;
                scope.index_var = Some(phi);
            } else if let Some(InstrKind::BinOp { op, y, .. }) =
                prog.def_instr(edge).map(|i| i.kind.clone())
            {
                match op {
                    BinOpKind::Add => {
                        if let Some(n) = int_const(prog, y) {
                            scope.step_val = n;
                            scope.index_ok = true;
                        }
                    }
                    BinOpKind::Sub => {
                        if let Some(n) = int_const(prog, y) {
                            scope.step_val = -n;
                            scope.index_ok = true;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Installs the branch condition of a loop block in the condition
    /// tree.
    pub fn extract_cond(&mut self, prog: &Program, blk: BlockRef, cond: ValueId) {
        let state = match self.block_state.get(&blk) {
            Some(s) => *s,
            None => {
                log::debug!(target: "loop", "no condition to extract at unknown state");
                self.block_state.insert(blk, State::NonLoop);
                return;
            }
        };
        let Some(scope) = self.block_scope.get(&blk) else {
            log::debug!(target: "loop", "extract_cond: #{} is not part of a loop", blk.block);
            return;
        };
        let mut scope = scope.borrow_mut();
        match state {
            State::Enter => {
                // Root condition; sanity-check it involves the index.
                scope.set_cond(cond);
                if let (Some(iv), Some(root)) = (scope.index_var, scope.root_cond()) {
                    if uses_index_var(prog, root, iv) {
                        scope.cond_ok = true;
                    }
                }
            }
            State::CondTrue => scope.add_true(cond),
            State::CondFalse => scope.add_false(cond),
            _ => {}
        }
    }
}

fn branch_cond(prog: &Program, blk: BlockRef) -> Option<ValueId> {
    match prog.block(blk).instrs.last().map(|i| &i.kind) {
        Some(InstrKind::If { cond, .. }) => Some(*cond),
        _ => None,
    }
}

fn int_const(prog: &Program, v: ValueId) -> Option<i64> {
    match &prog.value(v).kind {
        ValueKind::Const(ConstValue::Int(n)) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::traverse_edges;
    use migoinfer_ssa::build;

    /// Runs the detector over every edge of `main`, extracting φ indices
    /// and branch conditions along the way.
    fn run_detector(info: &migoinfer_ssa::Info) -> Detector {
        let prog = &info.prog;
        let mut d = Detector::new();
        let fid = prog.funcs[0].id;
        traverse_edges(prog, fid, |from, to| {
            let Some(from) = from else { return };
            d.detect(prog, from, to);
            for instr in &prog.block(to).instrs {
                match &instr.kind {
                    InstrKind::Phi { .. } => {
                        d.extract_index(prog, to, instr.result.unwrap());
                    }
                    InstrKind::If { cond, .. } => d.extract_cond(prog, to, *cond),
                    _ => {}
                }
            }
        });
        d
    }

    fn blk(info: &migoinfer_ssa::Info, i: usize) -> BlockRef {
        BlockRef { func: info.prog.funcs[0].id, block: i }
    }

    #[test]
    fn simple_loop_header() {
        let info = build::from_source(
            "package main\n\nfunc main():\n0 entry:\n    jump 1\n1 for.loop:\n    t2 = phi [0: 0:int, 1: t3]\n    t4 = t2 < 10:int\n    if t4 goto 2 else 3\n2 for.body:\n    t3 = t2 + 1:int\n    jump 1\n3 for.done:\n    return\n",
        )
        .build()
        .unwrap();
        let d = run_detector(&info);
        let l = d.for_loop_at(blk(&info, 1)).expect("loop detected");
        assert!(l.borrow().params_ok());
        assert_eq!("t2 = 0; (t2<10); t2 = t2 + 1", l.borrow_mut().render(&info.prog));
        assert_eq!((2, 3), (l.borrow().body_idx, l.borrow().done_idx));
    }

    #[test]
    fn short_circuit_condition() {
        let info = build::from_source(
            "package main\n\nfunc main():\n0 entry:\n    jump 1\n1 for.loop:\n    t1 = phi [0: 0:int, 1: t2]\n    t3 = t1 < 10:int\n    if t3 goto 4 else 3\n4 cond.true:\n    t5 = t1 % 2:int\n    t6 = t5 == 0:int\n    if t6 goto 2 else 3\n2 for.body:\n    t2 = t1 + 1:int\n    jump 1\n3 for.done:\n    return\n",
        )
        .build()
        .unwrap();
        let d = run_detector(&info);
        let l = d.for_loop_at(blk(&info, 1)).expect("loop detected");
        assert_eq!(
            "t1 = 0; ((t1<10) && ((t1%2)==0)); t1 = t1 + 1",
            l.borrow_mut().render(&info.prog)
        );
    }

    #[test]
    fn negative_step() {
        let info = build::from_source(
            "package main\n\nfunc main():\n0 entry:\n    jump 1\n1 for.loop:\n    t0 = phi [0: 9:int, 1: t1]\n    t2 = t0 > 0:int\n    if t2 goto 2 else 3\n2 for.body:\n    t1 = t0 - 1:int\n    jump 1\n3 for.done:\n    return\n",
        )
        .build()
        .unwrap();
        let d = run_detector(&info);
        let l = d.for_loop_at(blk(&info, 1)).expect("loop detected");
        assert_eq!("t0 = 9; (t0>0); t0 = t0 - 1", l.borrow_mut().render(&info.prog));
    }

    #[test]
    fn condition_not_mentioning_index_is_incomplete() {
        let info = build::from_source(
            "package main\n\nfunc main(b bool):\n0 entry:\n    jump 1\n1 for.loop:\n    t0 = phi [0: 0:int, 1: t1]\n    t2 = b == b\n    if t2 goto 2 else 3\n2 for.body:\n    t1 = t0 + 1:int\n    jump 1\n3 for.done:\n    return\n",
        )
        .build()
        .unwrap();
        let d = run_detector(&info);
        let l = d.for_loop_at(blk(&info, 1)).expect("loop scope exists");
        assert!(!l.borrow().params_ok());
    }

    #[test]
    fn headless_loop_is_incomplete() {
        let info = build::from_source(
            "package main\n\nfunc main():\n0 entry:\n    jump 1\n1 for.loop:\n    t0 = phi [0: 0:int, 1: t1]\n    jump 2\n2 for.body:\n    t1 = t0 + 1:int\n    jump 1\n3 unreachable:\n    return\n",
        )
        .build()
        .unwrap();
        let d = run_detector(&info);
        let l = d.for_loop_at(blk(&info, 1)).expect("loop scope exists");
        assert!(!l.borrow().params_ok());
    }
}
