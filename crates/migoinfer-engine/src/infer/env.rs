//! Shared program environment.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use migoinfer_migo as migo;
use migoinfer_ssa::{FuncId, InstrId, Pos};
use parking_lot::Mutex;

use crate::errors::{error_channel, ErrorSink, SoftError};
use crate::funcs::{Call, Definition, Instance};
use crate::store::Store;

/// The global environment shared across all function frames of one
/// analysis: the MiGo program under construction, the SSA input, the
/// globals store, the soft-error channel, the visited-call-site set and
/// the instance/nil-channel counters.
#[derive(Clone)]
pub struct Environment {
    inner: Rc<EnvInner>,
}

struct EnvInner {
    prog: RefCell<migo::Program>,
    info: Rc<migoinfer_ssa::Info>,
    globals: RefCell<Store>,
    errors: ErrorSink,
    visited_func: RefCell<HashSet<InstrId>>,
    definitions: RefCell<HashMap<FuncId, Rc<Definition>>>,
    /// Per-function instance sequence numbers, lock-guarded.
    instances: Mutex<HashMap<FuncId, usize>>,
    next_nil_chan: Cell<usize>,
}

impl Environment {
    pub fn new(info: Rc<migoinfer_ssa::Info>) -> Environment {
        Environment {
            inner: Rc::new(EnvInner {
                prog: RefCell::new(migo::Program::new()),
                info,
                globals: RefCell::new(Store::new()),
                errors: error_channel(),
                visited_func: RefCell::new(HashSet::new()),
                definitions: RefCell::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                next_nil_chan: Cell::new(0),
            }),
        }
    }

    pub fn info(&self) -> &Rc<migoinfer_ssa::Info> {
        &self.inner.info
    }

    pub fn prog(&self) -> &RefCell<migo::Program> {
        &self.inner.prog
    }

    pub fn globals(&self) -> &RefCell<Store> {
        &self.inner.globals
    }

    pub fn report(&self, err: SoftError) {
        self.inner.errors.report(err);
    }

    /// Marks a call site visited; true if it was new. The guard prevents
    /// divergence on direct and mutual recursion.
    pub fn first_visit(&self, site: InstrId) -> bool {
        self.inner.visited_func.borrow_mut().insert(site)
    }

    /// The cached definition of a function.
    pub fn definition(&self, f: FuncId) -> Rc<Definition> {
        if let Some(d) = self.inner.definitions.borrow().get(&f) {
            return d.clone();
        }
        let d = Definition::new(&self.inner.info.prog, f);
        self.inner.definitions.borrow_mut().insert(f, d.clone());
        d
    }

    /// Materialises a call into an instance with the next sequence
    /// number for its function.
    pub fn instantiate(&self, call: Call) -> Rc<Instance> {
        let seq = {
            let mut m = self.inner.instances.lock();
            let e = m.entry(call.func()).or_insert(0);
            let seq = *e;
            *e += 1;
            seq
        };
        Instance::new(&self.inner.info.prog, call, seq)
    }

    /// Fresh index for an unnamed nil channel.
    pub fn fresh_nil_chan(&self) -> usize {
        let n = self.inner.next_nil_chan.get();
        self.inner.next_nil_chan.set(n + 1);
        n
    }

    /// Renders a source position for diagnostics.
    pub fn pos_string(&self, pos: Pos) -> String {
        self.inner.info.pos_string(pos)
    }
}
