//! Block-level analysis: drives the instruction interpreter over basic
//! blocks and emits one MiGo function per block.

use std::cell::RefCell;
use std::rc::Rc;

use migoinfer_migo as migo;
use migoinfer_ssa::{BlockRef, Instr, InstrKind};

use crate::block::{Analyser, VisitGraph, VisitNode};
use crate::callctx::Context;
use crate::errors::FatalError;
use crate::funcs::Instance;
use crate::infer::env::Environment;
use crate::infer::exported::Exported;
use crate::infer::instr::{is_sel_cond_blk, InstrVisitor};
use crate::infer::migo::{block_fn_name, migo_call};
use crate::loops::Detector;

/// Per-block state: its visit node, its MiGo function, and flags
/// ensuring the instruction walk and the terminal control statement
/// happen exactly once.
pub struct BlockData {
    pub node: Rc<VisitNode>,
    pub migo: Rc<RefCell<migo::Function>>,
    walked: bool,
    emitted: bool,
}

/// Analyser of one function instance's basic blocks.
pub struct BlockAnalyser {
    graph: VisitGraph,
    pub data: Vec<BlockData>,
    callee: Rc<Instance>,
    ctx: Context,
    env: Environment,
    detector: Detector,
    exported: Rc<RefCell<Exported>>,
}

impl BlockAnalyser {
    /// One analyser per callee instance; None for body-less functions.
    pub fn new(
        callee: Rc<Instance>,
        ctx: Context,
        env: Environment,
        exported: Rc<RefCell<Exported>>,
    ) -> Option<BlockAnalyser> {
        let prog = &env.info().prog;
        let fid = callee.func();
        let nblk = prog.func(fid).blocks.len();
        if nblk == 0 {
            return None;
        }
        let name = callee.name();
        let data = (0..nblk)
            .map(|i| BlockData {
                node: VisitNode::new(BlockRef { func: fid, block: i }),
                migo: migo::Function::shared(block_fn_name(&name, i)),
                walked: false,
                emitted: false,
            })
            .collect();
        Some(BlockAnalyser {
            graph: VisitGraph::new(false),
            data,
            callee,
            ctx,
            env,
            detector: Detector::new(),
            exported,
        })
    }

    fn visitor(&self, blk: usize) -> InstrVisitor {
        InstrVisitor::new(
            self.callee.clone(),
            self.ctx.clone(),
            self.env.clone(),
            self.data[blk].migo.clone(),
            self.exported.clone(),
        )
    }

    fn add_exported_params(&self, blk: usize) {
        let params: Vec<migo::Parameter> = self
            .exported
            .borrow()
            .names()
            .iter()
            .map(|k| migo::Parameter::new(k.name(), k.name()))
            .collect();
        self.data[blk].migo.borrow_mut().add_params(&params);
    }

    /// Walks the instructions of a block, exactly once per block.
    /// Revisits only mark edges; the jump recursion is edge-gated.
    fn visit_instrs(&mut self, blk: BlockRef) -> Result<(), FatalError> {
        self.data[blk.block].walked = true;
        let info = self.env.info().clone();
        let prog = &info.prog;
        let v = self.visitor(blk.block);

        let instrs: &[Instr] = &prog.block(blk).instrs;
        for instr in instrs {
            match &instr.kind {
                InstrKind::Jump { target } => {
                    // The call is built before the jump rewrites the
                    // parameter lists.
                    let call =
                        migo_call(prog, &self.callee.name(), BlockRef { func: blk.func, block: *target }, &self.exported.borrow());
                    self.jump_blk(blk, BlockRef { func: blk.func, block: *target })?;
                    if !self.data[blk.block].emitted {
                        self.data[blk.block].migo.borrow_mut().add_stmts([call]);
                        self.data[blk.block].emitted = true;
                    }
                }
                InstrKind::If { cond, then_dest, else_dest } => {
                    self.detector.extract_cond(prog, blk, *cond);
                    self.jump_blk(blk, BlockRef { func: blk.func, block: *then_dest })?;
                    self.jump_blk(blk, BlockRef { func: blk.func, block: *else_dest })?;
                    // Both branches recorded (loop back-edges included);
                    // emit the block's one control statement.
                    if !self.data[blk.block].emitted {
                        self.emit_branch(blk, *cond, *then_dest, *else_dest);
                    }
                }
                InstrKind::Return { .. } => {
                    self.exit_blk(blk);
                }
                InstrKind::Phi { .. } => {
                    if let Some(result) = instr.result {
                        self.merge_phi(blk.block, result);
                        self.detector.extract_index(prog, blk, result);
                    }
                }
                _ => {
                    v.visit_context(instr);
                    v.visit_comm(instr)?;
                }
            }
        }
        Ok(())
    }

    /// Emits the single control statement of a branching block.
    fn emit_branch(&mut self, blk: BlockRef, cond: migoinfer_ssa::ValueId, then_dest: usize, else_dest: usize) {
        let info = self.env.info().clone();
        let prog = &info.prog;
        let comment = prog.block(blk).comment.clone();
        let name = self.callee.name();

        let for_loop = self.detector.for_loop_at(blk);
        if comment == "for.loop"
            && for_loop.as_ref().map(|l| l.borrow().params_ok()).unwrap_or(false)
        {
            let l = for_loop.unwrap();
            let (body, done) = (l.borrow().body_idx, l.borrow().done_idx);
            let header = l.borrow_mut().render(prog);
            let then = migo_call(prog, &name, BlockRef { func: blk.func, block: body }, &self.exported.borrow());
            let els = migo_call(prog, &name, BlockRef { func: blk.func, block: done }, &self.exported.borrow());
            self.data[blk.block].migo.borrow_mut().add_stmts([migo::Statement::IfFor {
                cond: header,
                then: vec![then],
                els: vec![els],
            }]);
            self.data[blk.block].emitted = true;
        } else if is_sel_cond_blk(prog, cond) {
            // Select case test: the select statement already accounts
            // for this branch.
            self.data[blk.block].emitted = true;
        } else if comment != "cond.true" && comment != "cond.false" {
            let then = migo_call(prog, &name, BlockRef { func: blk.func, block: then_dest }, &self.exported.borrow());
            let els = migo_call(prog, &name, BlockRef { func: blk.func, block: else_dest }, &self.exported.borrow());
            self.data[blk.block].migo.borrow_mut().add_stmts([migo::Statement::If {
                then: vec![then],
                els: vec![els],
            }]);
            self.data[blk.block].emitted = true;
        }
    }

    /// Handles context and exported names for a φ-node: the φ register
    /// replaces the register arriving along the active incoming edge in
    /// the block's parameter list, context and exported set.
    fn merge_phi(&mut self, blk: usize, phi: migoinfer_ssa::ValueId) {
        let info = self.env.info().clone();
        let prog = &info.prog;
        let phi_key = crate::store::Key::ssa(prog, phi);
        let phi_name = phi_key.name();
        log::debug!(target: "block", "remove φ argument {}", phi_name);
        {
            let mut migo_fn = self.data[blk].migo.borrow_mut();
            migo_fn
                .params
                .retain(|p| p.caller != phi_name && p.callee != phi_name);
        }

        // The value flowing in along the edge we arrived through.
        let node = &self.data[blk].node;
        let Some(prev) = node.prev_blk() else { return };
        let block = prog.block(node.blk());
        let Some(InstrKind::Phi { edges }) =
            prog.def_instr(phi).map(|i| i.kind.clone())
        else {
            return;
        };
        let mut edge = None;
        for (i, &pred) in block.preds.iter().enumerate() {
            if pred == prev.block {
                edge = edges.get(i).copied();
            }
        }
        let Some(edge) = edge else { return };
        let edge_key = crate::store::Key::ssa(prog, edge);
        log::debug!(
            target: "block",
            "replace φ edge {} with {} in parameters",
            edge_key.name(),
            phi_name
        );
        let mut replaced = false;
        {
            let mut migo_fn = self.data[blk].migo.borrow_mut();
            for p in migo_fn.params.iter_mut() {
                if p.caller == edge_key.name() {
                    p.callee = phi_name.clone();
                    replaced = true;
                }
            }
        }
        if replaced {
            self.ctx.put(phi_key.clone(), self.ctx.get(&edge_key));
            let mut exported = self.exported.borrow_mut();
            exported.unexport(&edge_key);
            exported.export(phi_key);
        }
    }
}

impl Analyser for BlockAnalyser {
    fn enter_blk(&mut self, blk: BlockRef) -> Result<(), FatalError> {
        log::debug!(
            target: "block",
            "enter {}#{}",
            self.callee.uniq_name(),
            blk.block
        );
        self.add_exported_params(blk.block);
        if !self.data[blk.block].walked {
            let node = self.data[blk.block].node.clone();
            let info = self.env.info().clone();
            self.graph.visit(&info.prog, &node);
            self.visit_instrs(blk)?;
        }
        Ok(())
    }

    fn jump_blk(&mut self, curr: BlockRef, next: BlockRef) -> Result<(), FatalError> {
        let info = self.env.info().clone();
        self.detector.detect(&info.prog, curr, next);
        log::debug!(
            target: "block",
            "jump {}#{} → {}",
            self.callee.uniq_name(),
            curr.block,
            next.block
        );
        self.add_exported_params(next.block);
        let curr_node = self.data[curr.block].node.clone();
        let next_node = self.data[next.block].node.clone();
        // Gate on the specific edge; revisits along the same edge are
        // no-ops, and a block's instructions are walked exactly once.
        if !self.graph.edge_visited(&curr_node, &next_node) {
            self.graph.visit_from(&info.prog, &curr_node, &next_node);
            if !self.data[next.block].walked {
                self.visit_instrs(next)?;
            }
        }
        Ok(())
    }

    fn exit_blk(&mut self, blk: BlockRef) {
        log::debug!(
            target: "block",
            "exit {}#{}",
            self.callee.uniq_name(),
            blk.block
        );
    }

    fn curr_blk(&self) -> Option<BlockRef> {
        self.graph.last_node().map(|n| n.blk())
    }

    fn prev_blk(&self) -> Option<BlockRef> {
        self.graph.last_node().and_then(|n| n.prev_blk())
    }
}
