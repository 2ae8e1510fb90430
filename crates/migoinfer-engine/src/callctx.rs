//! Function call contexts.
//!
//! A context maps the local variables of one call frame to their
//! instances. The toplevel context is empty; a callee context extends its
//! caller's with a fresh name map over the same backing pool. The Switch
//! operation translates caller arguments into callee parameters,
//! expanding struct aggregates positionally so each callee field inherits
//! the caller field's instance.

use std::cell::RefCell;
use std::rc::Rc;

use migoinfer_ssa::{Program, ValueId};

use crate::errors::SoftError;
use crate::funcs::{Call, Instance};
use crate::store::{Expanded, Key, Store, Struct, Value};

#[derive(Clone)]
pub struct Context {
    inner: Rc<CtxInner>,
}

struct CtxInner {
    store: RefCell<Store>,
    parent: Option<Context>,
}

impl Context {
    /// An empty context for the entry points of an analysis.
    pub fn toplevel() -> Context {
        Context {
            inner: Rc::new(CtxInner { store: RefCell::new(Store::new()), parent: None }),
        }
    }

    fn extend(parent: &Context) -> Context {
        let store = Store::extend(&parent.inner.store.borrow());
        Context {
            inner: Rc::new(CtxInner {
                store: RefCell::new(store),
                parent: Some(parent.clone()),
            }),
        }
    }

    /// Resolves a key: local frame first, then the caller chain, then the
    /// interned-constant/mock fallback.
    pub fn get(&self, k: &Key) -> Value {
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if let Some(v) = c.inner.store.borrow().get_local(k) {
                return v;
            }
            ctx = c.inner.parent.as_ref();
        }
        Store::fallback(k)
    }

    pub fn put(&self, k: Key, v: Value) {
        self.inner.store.borrow_mut().put(k, v);
    }

    pub fn put_obj(&self, k: Key, v: ValueId) {
        self.inner.store.borrow_mut().put_obj(k, v);
    }

    pub fn put_uniq(&self, k: Key, v: Value) -> Result<(), SoftError> {
        self.inner.store.borrow_mut().put_uniq(k, v)
    }
}

/// Context switch: builds the callee frame of `call` from the caller's
/// context, matching up every argument with its parameter. Struct
/// arguments are expanded positionally and matched field by field.
pub fn switch(prog: &Program, parent: &Context, callee: &Rc<Instance>) -> Context {
    let ctx = Context::extend(parent);
    let call: &Call = callee.call();
    let def = callee.definition();
    for (i, arg) in call.parameters.iter().enumerate() {
        let arg_value = parent.get(arg);
        let param = &def.parameters[i];
        if let Value::Struct(arg_struct) = &arg_value {
            let n = arg_struct.num_fields();
            let param_struct = Rc::new(Struct {
                ns: RefCell::new(Some(Value::Instance(callee.clone()))),
                val: arg_struct.val,
                name: arg_struct.name.clone(),
                ty: arg_struct.ty,
                fields: RefCell::new(vec![None; n]),
            });
            ctx.put(param.clone(), Value::Struct(param_struct.clone()));

            let arg_fields = arg_struct.expand(prog);
            let param_fields = param_struct.expand(prog); // All empty.
            for (j, af) in arg_fields.iter().enumerate() {
                if let (Expanded::Field(sf), Some(Expanded::Field(pf))) =
                    (af, param_fields.get(j))
                {
                    pf.parent.fields.borrow_mut()[pf.index] = Some(Key::Field(pf.clone()));
                    if let Some(inner) = &sf.key {
                        let field_val = parent.get(inner);
                        ctx.put(Key::Field(pf.clone()), field_val);
                    }
                }
            }
        } else {
            ctx.put(param.clone(), arg_value);
        }
    }
    ctx
}

/// Rebinds `val` to the instance `ptr` points at. The pointer element
/// type must match the value's type.
pub fn deref(
    prog: &Program,
    ctx: &Context,
    ptr: &Key,
    val: &Key,
) -> Result<Value, SoftError> {
    if let Some(elem) = prog.types.pointer_elem(ptr.ty()) {
        if prog.types.identical(elem, val.ty()) {
            let inst = ctx.get(ptr);
            ctx.put(val.clone(), inst.clone());
            return Ok(inst);
        }
    }
    Err(SoftError::IncompatibleType { ptr: ptr.name(), val: val.name() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::Definition;
    use migoinfer_ssa::{build, InstrKind};

    #[test]
    fn toplevel_get_is_mock() {
        let info = build::from_source(
            "package main\n\nfunc main(ch chan int):\n0 entry:\n    return\n",
        )
        .build()
        .unwrap();
        let ctx = Context::toplevel();
        let p = info.prog.funcs[0].params[0];
        assert!(ctx.get(&Key::ssa(&info.prog, p)).is_mock());
    }

    #[test]
    fn switch_translates_channel_argument() {
        let info = build::from_source(
            "package main\n\nfunc worker(ch chan int):\n0 entry:\n    recv ch\n    return\n\nfunc main():\n0 entry:\n    t0 = makechan chan int, 0:int\n    call worker(t0)\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let caller = Context::toplevel();
        let t0 = prog.funcs[1].blocks[0].instrs[0].result.unwrap();
        let t0_key = Key::ssa(prog, t0);
        let scope = Value::Mock(crate::store::MockValue {
            pos: migoinfer_ssa::Pos::NONE,
            desc: "scope".to_string(),
        });
        let ch = crate::store::Chan::new(scope, prog, t0, 0);
        caller.put(t0_key, Value::Chan(ch.clone()));

        let def = Definition::new(prog, prog.funcs[0].id);
        let call_common = match &prog.funcs[1].blocks[0].instrs[1].kind {
            InstrKind::Call(c) => c.clone(),
            _ => unreachable!(),
        };
        let call = Call::new(&info, def, Some(&call_common), None).unwrap();
        let callee = Instance::new(prog, call, 0);
        let ctx = switch(prog, &caller, &callee);
        let param = callee.definition().param(0).clone();
        assert_eq!(ch.uniq_name(), ctx.get(&param).uniq_name());
    }

    #[test]
    fn switch_matches_struct_fields_positionally() {
        let info = build::from_source(
            "package main\n\ntype T struct { ch chan int }\n\nfunc use(t T):\n0 entry:\n    return\n\nfunc main():\n0 entry:\n    t0 = alloc T\n    t1 = fieldaddr t0, 0\n    t2 = makechan chan int, 0:int\n    store t1, t2\n    t3 = load t0\n    call use(t3)\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let caller = Context::toplevel();
        let main = &prog.funcs[1];
        let t0 = main.blocks[0].instrs[0].result.unwrap();
        let t1 = main.blocks[0].instrs[1].result.unwrap();
        let t2 = main.blocks[0].instrs[2].result.unwrap();
        let t3 = main.blocks[0].instrs[4].result.unwrap();

        let scope = Value::Mock(crate::store::MockValue {
            pos: migoinfer_ssa::Pos::NONE,
            desc: "scope".to_string(),
        });
        let s = Struct::new(prog, scope.clone(), t0).unwrap();
        s.fields.borrow_mut()[0] = Some(Key::ssa(prog, t1));
        caller.put(Key::ssa(prog, t0), Value::Struct(s.clone()));
        caller.put(Key::ssa(prog, t3), Value::Struct(s));
        let ch = crate::store::Chan::new(scope, prog, t2, 0);
        caller.put(Key::ssa(prog, t1), Value::Chan(ch.clone()));

        let def = Definition::new(prog, prog.funcs[0].id);
        let call_common = match &main.blocks[0].instrs[5].kind {
            InstrKind::Call(c) => c.clone(),
            _ => unreachable!(),
        };
        let call = Call::new(&info, def, Some(&call_common), None).unwrap();
        let callee = Instance::new(prog, call, 0);
        let ctx = switch(prog, &caller, &callee);

        // The callee's parameter struct has its field bound to the
        // caller's channel.
        let param = callee.definition().param(0).clone();
        let pstruct = ctx.get(&param);
        let pstruct = pstruct.as_struct().expect("struct param");
        let field = pstruct.fields.borrow()[0].clone().expect("field populated");
        assert_eq!(ch.uniq_name(), ctx.get(&field).uniq_name());
    }
}
