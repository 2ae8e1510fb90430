//! Function-level analysis: context switching on call entry.

use std::cell::RefCell;
use std::rc::Rc;

use crate::block::Analyser;
use crate::callctx::{self, Context};
use crate::errors::FatalError;
use crate::funcs::{Call, Instance};
use crate::infer::block::{BlockAnalyser, BlockData};
use crate::infer::env::Environment;
use crate::infer::exported::Exported;
use crate::infer::utils::is_chan;
use migoinfer_ssa::BlockRef;

/// Visitor for one function call: materialises the instance, performs
/// the context switch, and runs the block analyser over the body.
pub struct FunctionAnalyser {
    pub callee: Rc<Instance>,
    pub ctx: Context,
    pub env: Environment,
    pub exported: Rc<RefCell<Exported>>,
    body: Option<BlockAnalyser>,
    finished: bool,
}

impl FunctionAnalyser {
    /// Sets up the callee frame: a fresh instance, the switched context,
    /// and the exported set seeded with the channel-typed parameters.
    pub fn new(env: &Environment, caller_ctx: &Context, call: Call) -> FunctionAnalyser {
        let callee = env.instantiate(call);
        let prog = &env.info().prog;
        let ctx = callctx::switch(prog, caller_ctx, &callee);
        let exported = Rc::new(RefCell::new(Exported::default()));
        for param in &callee.definition().parameters {
            if is_chan(prog, param) {
                exported.borrow_mut().export(param.clone());
            }
        }
        let body = BlockAnalyser::new(callee.clone(), ctx.clone(), env.clone(), exported.clone());
        FunctionAnalyser { callee, ctx, env: env.clone(), exported, body, finished: false }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Analyses the function body from its entry block, then registers
    /// the per-block MiGo functions with the program.
    pub fn enter_func(&mut self) -> Result<(), FatalError> {
        let nblock = self.env.info().prog.func(self.callee.func()).blocks.len();
        log::debug!(
            target: "func",
            "enter {} ({} blocks)",
            self.callee.uniq_name(),
            nblock
        );
        let result = match &mut self.body {
            Some(body) => {
                let entry = BlockRef { func: self.callee.func(), block: 0 };
                body.enter_blk(entry)
            }
            None => Ok(()),
        };
        // The function is completely analysed (or failed); its MiGo
        // functions are final enough to publish either way.
        self.exit_func();
        result
    }

    /// Publishes the MiGo function of every block into the program.
    fn exit_func(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        log::debug!(target: "func", "exit {}", self.callee.uniq_name());
        if let Some(body) = &self.body {
            let mut prog = self.env.prog().borrow_mut();
            for data in &body.data {
                prog.add_function(data.migo.clone());
            }
        }
    }

    /// Per-block data of the analysed body, for caller-side parameter
    /// patching.
    pub fn block_data(&self) -> &[BlockData] {
        self.body.as_ref().map(|b| b.data.as_slice()).unwrap_or(&[])
    }
}
