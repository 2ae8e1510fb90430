//! Per-instruction interpretation.
//!
//! The visitor updates the symbolic context for every instruction and,
//! for instructions with concurrency meaning, appends MiGo statements to
//! the current block's function. The block analyser walks each block
//! exactly once, so every handler both updates the context and emits in
//! the same pass.

use std::cell::RefCell;
use std::rc::Rc;

use migoinfer_migo as migo;
use migoinfer_ssa::{
    BinOpKind, BlockRef, Callee, CallCommon, ChanDir, FuncId, Instr, InstrKind, Program,
    UnOpKind, ValueId, ValueKind,
};

use crate::callctx::{self, Context};
use crate::errors::{FatalError, SoftError};
use crate::funcs::{Call, Definition, Instance};
use crate::infer::env::Environment;
use crate::infer::exported::Exported;
use crate::infer::func::FunctionAnalyser;
use crate::infer::migo::{is_defined_migo_name, migo_call, migo_nil_chan};
use crate::infer::utils::{is_chan, is_struct, underlying};
use crate::methods::lookup_method_impl;
use crate::store::{Chan, Expanded, Key, NilKey, Struct, Value};

/// Interpreter for the instructions of one block walk. All state lives
/// behind shared handles, so the visitor is cheap to construct per walk.
pub struct InstrVisitor {
    pub callee: Rc<Instance>,
    pub ctx: Context,
    pub env: Environment,
    pub migo: Rc<RefCell<migo::Function>>,
    pub exported: Rc<RefCell<Exported>>,
}

impl InstrVisitor {
    pub fn new(
        callee: Rc<Instance>,
        ctx: Context,
        env: Environment,
        migo: Rc<RefCell<migo::Function>>,
        exported: Rc<RefCell<Exported>>,
    ) -> InstrVisitor {
        InstrVisitor { callee, ctx, env, migo, exported }
    }

    fn prog(&self) -> &Program {
        &self.env.info().prog
    }

    fn key(&self, v: ValueId) -> Key {
        Key::ssa(self.prog(), v)
    }

    /// Context-only instructions; run on every block walk.
    pub fn visit_context(&self, instr: &Instr) {
        match &instr.kind {
            InstrKind::Alloc { .. } => self.visit_alloc(instr),
            InstrKind::MakeClosure { func, bindings } => {
                self.visit_make_closure(instr, *func, bindings.clone())
            }
            InstrKind::MakeInterface { x }
            | InstrKind::TypeAssert { x }
            | InstrKind::ChangeType { x }
            | InstrKind::Slice { x } => self.forward_identity(instr, *x),
            InstrKind::FieldAddr { x, field } => self.visit_field_addr(instr, *x, *field),
            InstrKind::Store { addr, val } => self.visit_store(*addr, *val),
            InstrKind::UnOp { op: UnOpKind::Mul, x } => self.visit_deref(instr, *x),
            _ => {}
        }
    }

    /// Communication-bearing instructions. The block analyser walks each
    /// block exactly once, so statements are appended unconditionally.
    pub fn visit_comm(&self, instr: &Instr) -> Result<(), FatalError> {
        match &instr.kind {
            InstrKind::MakeChan { size } => self.visit_make_chan(instr, *size),
            InstrKind::Send { chan, .. } => {
                let stmt = self.migo_send(&self.key(*chan));
                self.migo.borrow_mut().add_stmts([stmt]);
            }
            InstrKind::UnOp { op: UnOpKind::Arrow, x } => {
                let stmt = self.migo_recv(&self.key(*x));
                self.migo.borrow_mut().add_stmts([stmt]);
            }
            InstrKind::Select { .. } => self.visit_select(instr),
            InstrKind::Call(_) => return self.visit_call(instr),
            InstrKind::Go(_) => return self.visit_go(instr),
            _ => {}
        }
        Ok(())
    }

    // ---- allocation and aggregates ----

    /// Binds struct allocations to fresh empty structs; other
    /// allocations are resolved by their first store.
    fn visit_alloc(&self, instr: &Instr) {
        let Some(result) = instr.result else { return };
        let key = self.key(result);
        if !is_struct(self.prog(), &key) {
            return;
        }
        if self.ctx.get(&key).as_struct().is_some() {
            return;
        }
        if let Some(s) = Struct::new(self.prog(), Value::Instance(self.callee.clone()), result)
        {
            log::debug!(target: "instr", "alloc struct {} ({} fields)", key.name(), s.num_fields());
            self.ctx.put(key, Value::Struct(s));
        }
    }

    fn visit_field_addr(&self, instr: &Instr, x: ValueId, field: usize) {
        let Some(result) = instr.result else { return };
        let parent_key = self.key(x);
        let parent = match self.ctx.get(&parent_key).as_struct().cloned() {
            Some(s) => s,
            None => {
                // Undefined parent: materialise a shell so the field can
                // be tracked.
                match Struct::new(self.prog(), Value::Instance(self.callee.clone()), x) {
                    Some(s) => {
                        self.ctx.put(parent_key, Value::Struct(s.clone()));
                        s
                    }
                    None => return,
                }
            }
        };
        let slot = parent.fields.borrow()[field].clone();
        match slot {
            Some(fkey) => {
                let val = self.ctx.get(&fkey);
                let key = self.key(result);
                if val.as_chan().is_some() {
                    // The field's own name is the one visible in MiGo
                    // output; it matches the parameter names produced by
                    // struct expansion at call sites.
                    self.exported.borrow_mut().export(fkey.clone());
                }
                self.ctx.put(key, val);
            }
            None => {
                parent.fields.borrow_mut()[field] = Some(self.key(result));
            }
        }
    }

    /// Binds the pointer target to whatever the stored value resolves
    /// to; an undefined value binds its placeholder.
    fn visit_store(&self, addr: ValueId, val: ValueId) {
        let v = self.ctx.get(&self.key(val));
        self.ctx.put(self.key(addr), v);
    }

    /// Identity-forwarding coercions preserve channel identity.
    fn forward_identity(&self, instr: &Instr, x: ValueId) {
        let Some(result) = instr.result else { return };
        let v = self.ctx.get(&self.key(x));
        self.ctx.put(self.key(result), v);
    }

    fn visit_deref(&self, instr: &Instr, x: ValueId) {
        let Some(result) = instr.result else { return };
        let ptr = self.key(x);
        let val = self.key(result);
        if let Err(e) = callctx::deref(self.prog(), &self.ctx, &ptr, &val) {
            self.env.report(e);
        }
    }

    fn visit_make_closure(&self, instr: &Instr, func: FuncId, bindings: Vec<ValueId>) {
        let def = Definition::closure(self.prog(), func, bindings);
        if let Some(result) = instr.result {
            // For calling the closure.
            self.ctx.put(self.key(result), Value::Def(def.clone()));
        }
        // For reusing the closure through its function value.
        if let Some(fv) = self.prog().func_value(func) {
            self.ctx.put(self.key(fv), Value::Def(def));
        }
    }

    // ---- channels ----

    /// Creates the channel of a `makechan` site. A non-constant buffer
    /// size is reported and defaults to 1. Channels escaping through a
    /// return slot or a parameter struct field defer their `newchan` to
    /// the caller and leave a τ here.
    fn visit_make_chan(&self, instr: &Instr, size: ValueId) {
        let Some(result) = instr.result else { return };
        let key = self.key(result);
        let size = match self.prog().int_const(size) {
            Some(n) => n,
            None => {
                self.env.report(SoftError::ChanBufSizeNonStatic {
                    pos: self.env.pos_string(instr.pos),
                });
                1
            }
        };
        let ch = Chan::new(Value::Instance(self.callee.clone()), self.prog(), result, size);
        let uniq = ch.uniq_name();
        let deferred = self.callee.definition().is_return(&key)
            || self.stored_to_param_field(result);
        ch.deferred.set(deferred);

        if let Err(e) = self.ctx.put_uniq(key.clone(), Value::Chan(ch)) {
            self.env.report(e);
        }
        if deferred {
            // The caller owns the creation site; leave an opaque step.
            self.migo.borrow_mut().add_stmts([migo::Statement::Tau]);
            return;
        }
        self.exported.borrow_mut().export(key.clone());
        self.migo.borrow_mut().add_stmts([migo::Statement::NewChan {
            name: key.name(),
            chan: uniq,
            size,
        }]);
    }

    /// True if the register is stored into a field of a parameter
    /// struct: the channel then belongs to the caller's aggregate.
    fn stored_to_param_field(&self, result: ValueId) -> bool {
        let prog = self.prog();
        for &site in prog.referrers(result) {
            let InstrKind::Store { addr, val } = prog.instr(site).kind.clone() else {
                continue;
            };
            if val != result {
                continue;
            }
            let Some(InstrKind::FieldAddr { x, .. }) =
                prog.def_instr(addr).map(|i| i.kind.clone())
            else {
                continue;
            };
            let mut base = x;
            if let Some(InstrKind::UnOp { op: UnOpKind::Mul, x: y }) =
                prog.def_instr(base).map(|i| i.kind.clone())
            {
                base = y;
            }
            if matches!(&prog.value(base).kind, ValueKind::Param { .. }) {
                return true;
            }
        }
        false
    }

    /// A send statement on the exported name of a channel.
    pub fn migo_send(&self, local: &Key) -> migo::Statement {
        if let Some(nil) = self.nil_chan_binding(local) {
            return migo::Statement::Send { chan: nil };
        }
        let (local, ch) = self.resolve_comm_operand(local);
        match self.exported.borrow().find_exported(&self.ctx, &ch) {
            Some(exported) => migo::Statement::Send { chan: exported.name() },
            None => {
                log::warn!(
                    target: "instr",
                    "channel {}/{} unavailable in current scope (unexported)",
                    local.name(),
                    ch.uniq_name()
                );
                if !matches!(local, Key::Field(_)) {
                    let nc = migo_nil_chan(&local);
                    self.migo.borrow_mut().add_stmts([nc]);
                }
                migo::Statement::Send { chan: local.name() }
            }
        }
    }

    /// A receive statement on the exported name of a channel. Receives
    /// on time-package channels reduce to τ.
    pub fn migo_recv(&self, local: &Key) -> migo::Statement {
        if self.is_time_chan(local) {
            return migo::Statement::Tau;
        }
        if let Some(nil) = self.nil_chan_binding(local) {
            return migo::Statement::Recv { chan: nil };
        }
        let (local, ch) = self.resolve_comm_operand(local);
        match self.exported.borrow().find_exported(&self.ctx, &ch) {
            Some(exported) => migo::Statement::Recv { chan: exported.name() },
            None => {
                log::warn!(
                    target: "instr",
                    "channel {}/{} unavailable in current scope (unexported)",
                    local.name(),
                    ch.uniq_name()
                );
                if !matches!(local, Key::Field(_)) {
                    let nc = migo_nil_chan(&local);
                    self.migo.borrow_mut().add_stmts([nc]);
                }
                migo::Statement::Recv { chan: local.name() }
            }
        }
    }

    /// Dereferencing communications use the underlying pointer's value.
    fn resolve_comm_operand(&self, local: &Key) -> (Key, Value) {
        if let Some(id) = local.ssa_id() {
            if let Some(InstrKind::UnOp { op: UnOpKind::Mul, x }) =
                self.prog().def_instr(id).map(|i| i.kind.clone())
            {
                let k = self.key(x);
                let v = self.ctx.get(&k);
                return (k, v);
            }
        }
        (local.clone(), self.ctx.get(local))
    }

    /// For a nil channel constant, synthesises a fresh nil-channel
    /// binding and returns its name. Fresh per occurrence.
    fn nil_chan_binding(&self, local: &Key) -> Option<String> {
        let id = local.ssa_id()?;
        if !self.prog().is_nil_const(id) {
            return None;
        }
        let nc = Key::Nil(NilKey { count: self.env.fresh_nil_chan(), ty: local.ty() });
        let stmt = migo_nil_chan(&nc);
        self.migo.borrow_mut().add_stmts([stmt]);
        Some(nc.name())
    }

    /// True for channels produced by the time package.
    fn is_time_chan(&self, k: &Key) -> bool {
        let prog = self.prog();
        let from_time_call = |v: ValueId| -> bool {
            match prog.def_instr(v).map(|i| &i.kind) {
                Some(InstrKind::Call(c)) => static_callee(prog, c)
                    .and_then(|f| prog.func(f).pkg)
                    .map(|p| prog.package(p).path == "time")
                    .unwrap_or(false),
                _ => false,
            }
        };
        let Some(id) = k.ssa_id() else { return false };
        if from_time_call(id) {
            return true;
        }
        if let Some(InstrKind::UnOp { op: UnOpKind::Mul, x }) =
            prog.def_instr(id).map(|i| i.kind.clone())
        {
            if let Some(InstrKind::FieldAddr { x: fx, .. }) =
                prog.def_instr(x).map(|i| i.kind.clone())
            {
                return from_time_call(fx);
            }
        }
        false
    }

    // ---- select ----

    /// Emits a select statement: each case's guard followed by a call to
    /// the block implementing the case body, plus a τ-headed default
    /// case for non-blocking selects.
    fn visit_select(&self, instr: &Instr) {
        let InstrKind::Select { states, blocking } = instr.kind.clone() else { return };
        let prog = self.prog();
        // The select's index register: extract #0 of the result tuple.
        let index_reg = instr.result.and_then(|r| {
            prog.referrers(r).iter().find_map(|&site| {
                let i = prog.instr(site);
                match &i.kind {
                    InstrKind::Extract { tuple, index: 0 } if *tuple == r => i.result,
                    _ => None,
                }
            })
        });

        let mut cases: Vec<Vec<migo::Statement>> = Vec::new();
        let mut last_test_else: Option<usize> = None;
        for (i, state) in states.iter().enumerate() {
            let guard = match state.dir {
                ChanDir::SendOnly => self.migo_send(&self.key(state.chan)),
                ChanDir::RecvOnly => self.migo_recv(&self.key(state.chan)),
                ChanDir::Both => {
                    log::error!(target: "instr", "select guard with no direction");
                    migo::Statement::Tau
                }
            };
            let mut case = vec![guard];
            if let Some((body, els)) =
                index_reg.and_then(|e0| case_body(prog, e0, i as i64))
            {
                let target = BlockRef { func: self.callee.func(), block: body };
                case.push(migo_call(prog, &self.callee.name(), target, &self.exported.borrow()));
                last_test_else = Some(els);
            }
            cases.push(case);
        }
        if !blocking {
            let mut deflt = vec![migo::Statement::Tau];
            if let Some(els) = last_test_else {
                let target = BlockRef { func: self.callee.func(), block: els };
                deflt.push(migo_call(
                    prog,
                    &self.callee.name(),
                    target,
                    &self.exported.borrow(),
                ));
            }
            cases.push(deflt);
        }
        self.migo.borrow_mut().add_stmts([migo::Statement::Select { cases }]);
    }

    // ---- calls ----

    pub fn visit_call(&self, instr: &Instr) -> Result<(), FatalError> {
        let InstrKind::Call(common) = instr.kind.clone() else { return Ok(()) };
        let Some(def) = self.create_definition(&common) else {
            return Ok(());
        };
        if !self.env.first_visit(instr.id) {
            return Ok(());
        }
        self.do_call(instr, common, def, false)
    }

    pub fn visit_go(&self, instr: &Instr) -> Result<(), FatalError> {
        let InstrKind::Go(common) = instr.kind.clone() else { return Ok(()) };
        let Some(def) = self.create_definition(&common) else {
            return Ok(());
        };
        if !self.env.first_visit(instr.id) {
            return Ok(());
        }
        self.do_call(instr, common, def, true)
    }

    /// Resolves a call target to a definition. Returns None for builtins
    /// (close is handled inline) and unresolvable invoke receivers.
    fn create_definition(&self, common: &CallCommon) -> Option<Rc<Definition>> {
        match &common.callee {
            Callee::Value(v) => {
                let kind = self.prog().value(*v).kind.clone();
                match kind {
                    ValueKind::Function(f) => {
                        let key = self.key(*v);
                        if let Value::Def(d) = self.ctx.get(&key) {
                            return Some(d);
                        }
                        let d = self.env.definition(f);
                        self.ctx.put(key, Value::Def(d.clone()));
                        Some(d)
                    }
                    ValueKind::Builtin(b) => {
                        if b.name() == "close" {
                            if common.args.len() != 1 {
                                log::error!(target: "instr", "close should have 1 argument");
                                return None;
                            }
                            let arg = self.key(common.args[0]);
                            let ch = self.ctx.get(&arg);
                            let chan = self
                                .exported
                                .borrow()
                                .find_exported(&self.ctx, &ch)
                                .map(|k| k.name())
                                .unwrap_or_else(|| arg.name());
                            self.migo
                                .borrow_mut()
                                .add_stmts([migo::Statement::Close { chan }]);
                        }
                        None
                    }
                    _ => {
                        // Closure in a register, or another function value.
                        let key = self.key(*v);
                        if let Value::Def(d) = self.ctx.get(&key) {
                            return Some(d);
                        }
                        match static_callee(self.prog(), common) {
                            Some(f) => {
                                let d = self.env.definition(f);
                                self.ctx.put(key, Value::Def(d.clone()));
                                Some(d)
                            }
                            None => {
                                log::info!(
                                    target: "instr",
                                    "cannot resolve call target {}",
                                    key.name()
                                );
                                None
                            }
                        }
                    }
                }
            }
            Callee::Invoke { recv, method } => {
                match lookup_method_impl(self.prog(), method, *recv) {
                    Ok(f) => Some(self.env.definition(f)),
                    Err(e) => {
                        log::info!(
                            target: "instr",
                            "cannot find method {} for invoke call: {}",
                            method,
                            e
                        );
                        None
                    }
                }
            }
        }
    }

    /// Analyses the callee and emits the call/spawn statement with its
    /// channel parameters. Spawns do not thread return values.
    fn do_call(
        &self,
        instr: &Instr,
        common: CallCommon,
        def: Rc<Definition>,
        spawn: bool,
    ) -> Result<(), FatalError> {
        let ret = if spawn { None } else { instr.result };
        let info = self.env.info().clone();
        let call = Call::new(&info, def.clone(), Some(&common), ret)?;
        if !info.prog.func(def.func).has_body() {
            // Calling a body-less function produces no MiGo definitions.
            return Ok(());
        }
        let mut fna = FunctionAnalyser::new(&self.env, &self.ctx, call);
        fna.enter_func()?;
        self.propagate_param_field_chans(&fna);
        if !spawn {
            self.materialise_return_chans(&fna);
        }

        let params = self.params_to_migo_param(&fna);
        let stmt = if spawn {
            migo::Statement::Spawn { name: fna.callee.name(), params: params.clone() }
        } else {
            migo::Statement::Call { name: fna.callee.name(), params: params.clone() }
        };
        for data in fna.block_data() {
            data.migo.borrow_mut().add_params(&params);
        }
        self.migo.borrow_mut().add_stmts([stmt]);
        Ok(())
    }

    /// Channels the callee constructed inside parameter struct fields
    /// belong to the caller's aggregate: bind them to the caller's field
    /// keys and emit their deferred `newchan` here.
    fn propagate_param_field_chans(&self, fna: &FunctionAnalyser) {
        let info = self.env.info().clone();
        let prog = &info.prog;
        let call = fna.callee.call();
        let def = fna.callee.definition().clone();
        for i in 0..call.nparam() {
            let arg = underlying(prog, call.param(i).clone());
            let param = underlying(prog, def.param(i).clone());
            if !is_struct(prog, &arg) || !is_struct(prog, &param) {
                continue;
            }
            let (Some(arg_struct), Some(param_struct)) = (
                self.ctx.get(&arg).as_struct().cloned(),
                fna.ctx.get(&param).as_struct().cloned(),
            ) else {
                continue;
            };
            let arg_fields = arg_struct.expand(prog);
            let param_fields = param_struct.expand(prog);
            for (j, pf) in param_fields.iter().enumerate() {
                let (Expanded::Field(pf), Some(Expanded::Field(af))) = (pf, arg_fields.get(j))
                else {
                    continue;
                };
                let Some(pkey) = pf.key.as_deref() else { continue };
                let Some(ch) = fna.ctx.get(pkey).as_chan().cloned() else { continue };
                if !ch.deferred.get() {
                    continue;
                }
                // Bind the channel under the caller's field handle.
                let caller_key = match &af.key {
                    Some(k) => (**k).clone(),
                    None => {
                        let k = Key::Field(af.clone());
                        af.parent.fields.borrow_mut()[af.index] = Some(k.clone());
                        k
                    }
                };
                self.ctx.put(caller_key.clone(), Value::Chan(ch.clone()));
                self.exported.borrow_mut().export(caller_key.clone());
                ch.deferred.set(false);
                self.migo.borrow_mut().add_stmts([migo::Statement::NewChan {
                    name: caller_key.name(),
                    chan: ch.uniq_name(),
                    size: ch.size(),
                }]);
            }
        }
    }

    /// Channels constructed by the callee that escape through return
    /// slots materialise their `newchan` at the caller.
    fn materialise_return_chans(&self, fna: &FunctionAnalyser) {
        let call = fna.callee.call();
        let def = fna.callee.definition().clone();
        for i in 0..call.nreturn() {
            let ret_key = call.ret(i).clone();
            if matches!(ret_key, Key::Unused(_)) {
                continue;
            }
            let Some(ch) = fna.ctx.get(def.ret(i)).as_chan().cloned() else {
                continue;
            };
            self.ctx.put(ret_key.clone(), Value::Chan(ch.clone()));
            self.exported.borrow_mut().export(ret_key.clone());
            if ch.deferred.get() {
                ch.deferred.set(false);
                self.migo.borrow_mut().add_stmts([migo::Statement::NewChan {
                    name: ret_key.name(),
                    chan: ch.uniq_name(),
                    size: ch.size(),
                }]);
            }
        }
    }

    /// Converts call parameters into MiGo parameters for channel-typed
    /// slots, expanding struct arguments field by field. Undefined
    /// channel arguments that are not φ-nodes materialise a nil channel
    /// at the caller.
    fn params_to_migo_param(&self, fna: &FunctionAnalyser) -> Vec<migo::Parameter> {
        let info = self.env.info().clone();
        let prog = &info.prog;
        let call = fna.callee.call();
        let def = fna.callee.definition().clone();
        let mut params: Vec<migo::Parameter> = Vec::new();

        for i in 0..call.nparam() + call.nbind() {
            let arg = underlying(prog, call.parameters[i].clone());
            let param = underlying(prog, def.parameters[i].clone());
            if is_struct(prog, &arg) && is_struct(prog, &param) {
                let arg_struct = match self.ctx.get(&arg).as_struct().cloned() {
                    Some(s) => s,
                    None => {
                        log::debug!(
                            target: "instr",
                            "{} is an empty struct argument (type: {})",
                            arg.name(),
                            prog.types.render(arg.ty())
                        );
                        match arg
                            .ssa_id()
                            .and_then(|id| Struct::new(prog, self.ctx.get(&arg), id))
                        {
                            Some(s) => s,
                            None => continue,
                        }
                    }
                };
                let param_struct = match fna.ctx.get(&param).as_struct().cloned() {
                    Some(s) => s,
                    None => Struct::from_type(prog, param.ty()),
                };
                let arg_fields = arg_struct.expand(prog);
                let param_fields = param_struct.expand(prog);
                for (j, af) in arg_fields.iter().enumerate() {
                    if let Expanded::Field(af) = af {
                        let afkey = Key::Field(af.clone());
                        if is_chan(prog, &afkey) {
                            if let Some(Expanded::Field(pf)) = param_fields.get(j) {
                                params.push(self.convert_to_migo_param(
                                    &afkey,
                                    &Key::Field(pf.clone()),
                                ));
                            }
                        }
                    }
                }
            } else if is_struct(prog, &arg) && prog.types.is_interface(param.ty()) {
                log::debug!(
                    target: "instr",
                    "struct argument for interface parameter {}, skipping pair-up",
                    param.name()
                );
            }
            if is_chan(prog, &arg) {
                params.push(self.convert_to_migo_param(&arg, &def.parameters[i]));
            }
        }

        // Return slots that carry channels become parameters too.
        for i in 0..call.nreturn() {
            let ret = call.ret(i).clone();
            if !is_chan(prog, &ret) {
                continue;
            }
            let mut p = migo::Parameter::new(ret.name(), def.ret(i).name());
            if let Some(exp) = fna
                .exported
                .borrow()
                .find_exported(&fna.ctx, &fna.ctx.get(def.ret(i)))
            {
                p.callee = exp.name();
                for q in &params {
                    if q.callee == p.callee {
                        p.caller = q.caller.clone();
                    }
                }
            }
            params.push(p);
        }
        params
    }

    fn convert_to_migo_param(&self, arg: &Key, param: &Key) -> migo::Parameter {
        let mut arg = arg.clone();
        match self.ctx.get(&arg) {
            Value::Mock(_) => {
                let is_phi = arg
                    .ssa_id()
                    .and_then(|id| self.prog().def_instr(id))
                    .map(|i| matches!(i.kind, InstrKind::Phi { .. }))
                    .unwrap_or(false);
                if is_phi {
                    log::warn!(
                        target: "instr",
                        "undefined argument {} is a φ-node",
                        arg.name()
                    );
                } else if let Key::Field(f) = &arg {
                    if let Some(inner) = f.key.as_deref() {
                        // A populated field: its channel is reachable
                        // through the inner key's exported name.
                        let val = self.ctx.get(inner);
                        if let Some(exp) =
                            self.exported.borrow().find_exported(&self.ctx, &val)
                        {
                            arg = exp;
                        }
                    } else {
                        log::warn!(
                            target: "instr",
                            "argument {} undefined → nil chan",
                            arg.name()
                        );
                        if !is_defined_migo_name(&self.migo.borrow(), &arg.name()) {
                            let nc = migo_nil_chan(&arg);
                            self.migo.borrow_mut().add_stmts([nc]);
                        }
                    }
                } else {
                    log::warn!(
                        target: "instr",
                        "argument {} undefined → nil chan",
                        arg.name()
                    );
                    if !is_defined_migo_name(&self.migo.borrow(), &arg.name()) {
                        let nc = migo_nil_chan(&arg);
                        self.migo.borrow_mut().add_stmts([nc]);
                    }
                }
            }
            ch @ Value::Chan(_) => {
                if let Some(exp) = self.exported.borrow().find_exported(&self.ctx, &ch) {
                    arg = exp;
                }
            }
            _ => {}
        }
        migo::Parameter::new(arg.name(), param.name())
    }
}

/// The case-body and false-successor blocks for select state `i`: finds
/// the `index == i` test among the referrers of the extract-#0 register
/// and returns its branch targets.
fn case_body(prog: &Program, index_reg: ValueId, i: i64) -> Option<(usize, usize)> {
    for &site in prog.referrers(index_reg) {
        let instr = prog.instr(site);
        let InstrKind::BinOp { op: BinOpKind::Eql, x, y } = instr.kind.clone() else {
            continue;
        };
        if x != index_reg || prog.int_const(y) != Some(i) {
            continue;
        }
        let result = instr.result?;
        let blk = prog.def_block(result)?;
        if let Some(InstrKind::If { then_dest, else_dest, .. }) =
            prog.block(blk).instrs.last().map(|t| &t.kind)
        {
            return Some((*then_dest, *else_dest));
        }
    }
    None
}

/// Static call target: a function value or a closure register.
pub fn static_callee(prog: &Program, call: &CallCommon) -> Option<FuncId> {
    match &call.callee {
        Callee::Value(v) => match &prog.value(*v).kind {
            ValueKind::Function(f) => Some(*f),
            _ => match prog.def_instr(*v).map(|i| &i.kind) {
                Some(InstrKind::MakeClosure { func, .. }) => Some(*func),
                _ => None,
            },
        },
        Callee::Invoke { .. } => None,
    }
}

/// True if a branch condition is a select-state test (`index == i` on a
/// select's extract #0); such branches are already accounted for by the
/// select statement.
pub fn is_sel_cond_blk(prog: &Program, cond: ValueId) -> bool {
    if let Some(InstrKind::BinOp { op: BinOpKind::Eql, x, .. }) =
        prog.def_instr(cond).map(|i| i.kind.clone())
    {
        if let Some(InstrKind::Extract { tuple, index: 0 }) =
            prog.def_instr(x).map(|i| i.kind.clone())
        {
            return matches!(
                prog.def_instr(tuple).map(|i| &i.kind),
                Some(InstrKind::Select { .. })
            );
        }
    }
    false
}
