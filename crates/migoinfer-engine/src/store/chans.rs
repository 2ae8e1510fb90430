//! Channel values.

use std::cell::Cell;
use std::rc::Rc;

use migoinfer_ssa::{Program, ValueId};

use super::Value;

/// An abstract channel: one per syntactic creation site and call
/// instance. The namespace value (usually the creating call instance)
/// makes the unique name stable across the program.
#[derive(Debug)]
pub struct Chan {
    ns: Value,
    pub val: ValueId,
    pub name: String,
    size: i64,
    /// Set when the creation site defers its `newchan` to the caller
    /// (returned channel or parameter struct field).
    pub deferred: Cell<bool>,
}

impl Chan {
    pub fn new(ns: Value, prog: &Program, ch: ValueId, size: i64) -> Rc<Chan> {
        Rc::new(Chan {
            ns,
            val: ch,
            name: prog.value(ch).name.clone(),
            size,
            deferred: Cell::new(false),
        })
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn uniq_name(&self) -> String {
        format!("{}.{}_chan{}", self.ns.uniq_name(), self.name, self.size)
    }
}
