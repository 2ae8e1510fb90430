//! Call instances.

use std::rc::Rc;

use migoinfer_ssa::{FuncId, Program};

use super::Call;

/// A materialised function call: a [`Call`] stamped with a per-function
/// monotonically increasing sequence number. The unique name
/// `<package>.<name><seq>` gives every dynamic call a stable identity
/// that prefixes all names created inside the frame.
#[derive(Debug)]
pub struct Instance {
    call: Call,
    seq: usize,
    name: String,
}

impl Instance {
    /// Stamps a call with a sequence number. Dispensing the number is the
    /// environment's job, so that numbering is monotonic per function.
    pub fn new(prog: &Program, call: Call, seq: usize) -> Rc<Instance> {
        let name = prog.qualified_name(call.func());
        Rc::new(Instance { call, seq, name })
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    pub fn definition(&self) -> &Rc<super::Definition> {
        self.call.definition()
    }

    pub fn func(&self) -> FuncId {
        self.call.func()
    }

    pub fn seq(&self) -> usize {
        self.seq
    }

    /// The instance's function name, used as MiGo function name prefix.
    pub fn name(&self) -> String {
        self.name.clone()
    }

    /// Globally unique name of this dynamic call.
    pub fn uniq_name(&self) -> String {
        format!("{}{}", self.name, self.seq)
    }
}
