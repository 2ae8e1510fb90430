//! Function calls: a definition seen from the caller.

use std::rc::Rc;

use migoinfer_ssa::{Callee, CallCommon, Info, InstrKind, Pos, Program, ValueId};

use crate::errors::FatalError;
use crate::store::{Key, MockKey};

use super::Definition;

/// A per-call-site binding of a [`Definition`] to actual argument keys
/// and return-consumer keys. `parameters` is the full flattened sequence
/// (arguments, closure bindings, return consumers) positionally matching
/// the definition's.
#[derive(Debug)]
pub struct Call {
    def: Rc<Definition>,
    pub parameters: Vec<Key>,
    pub args: Vec<Key>,
}

impl Call {
    /// Binds a definition to a call site. `call` is None for synthetic
    /// entry-point calls; `ret` is the call's result value, if consumed.
    /// Argument/parameter arity mismatches are fatal.
    pub fn new(
        info: &Info,
        def: Rc<Definition>,
        call: Option<&CallCommon>,
        ret: Option<ValueId>,
    ) -> Result<Call, FatalError> {
        let prog = &info.prog;
        let args = match call {
            Some(c) => get_args(prog, c),
            None => get_fake_args(prog, &def),
        };
        if args.len() != def.nparam {
            let f = prog.func(def.func);
            return Err(FatalError::ArityMismatch {
                callee: def.uniq_name(),
                nargs: args.len(),
                nparams: def.nparam,
                pos: info.pos_string(f.pos),
            });
        }
        if def.bindings.len() != def.nfreevar {
            log::warn!(
                target: "funcs",
                "mismatched capture({})/binding({}) calling {}",
                def.nfreevar,
                def.bindings.len(),
                def.uniq_name()
            );
        }

        let mut parameters = Vec::with_capacity(def.parameters.len());
        parameters.extend(args.iter().cloned());
        for &b in &def.bindings {
            parameters.push(Key::ssa(prog, b));
        }
        // Return values are reverse-mapped from the call result.
        match def.nreturn {
            0 => {}
            1 => parameters.push(match ret {
                Some(r) => Key::ssa(prog, r),
                None => unused_ret(prog, &def, 0),
            }),
            n => {
                let mut rets: Vec<Option<Key>> = vec![None; n];
                if let Some(r) = ret {
                    for &site in prog.referrers(r) {
                        if let InstrKind::Extract { tuple, index } = prog.instr(site).kind {
                            if tuple == r {
                                if let Some(res) = prog.instr(site).result {
                                    rets[index] = Some(Key::ssa(prog, res));
                                }
                            }
                        }
                    }
                }
                for (i, slot) in rets.into_iter().enumerate() {
                    parameters.push(slot.unwrap_or_else(|| unused_ret(prog, &def, i)));
                }
            }
        }
        Ok(Call { def, parameters, args })
    }

    pub fn definition(&self) -> &Rc<Definition> {
        &self.def
    }

    pub fn func(&self) -> migoinfer_ssa::FuncId {
        self.def.func
    }

    pub fn nparam(&self) -> usize {
        self.def.nparam
    }

    pub fn nbind(&self) -> usize {
        self.def.nfreevar
    }

    pub fn nreturn(&self) -> usize {
        self.def.nreturn
    }

    pub fn param(&self, i: usize) -> &Key {
        &self.parameters[i]
    }

    pub fn bind(&self, i: usize) -> &Key {
        &self.parameters[self.nparam() + i]
    }

    /// The caller-side consumer of the i-th return slot.
    pub fn ret(&self, i: usize) -> &Key {
        &self.parameters[self.nparam() + self.nbind() + i]
    }

    pub fn uniq_name(&self) -> String {
        self.def.uniq_name()
    }
}

fn unused_ret(prog: &Program, def: &Definition, i: usize) -> Key {
    let f = prog.func(def.func);
    Key::Unused(MockKey {
        ty: f.sig.results.get(i).copied().unwrap_or(f.sig.results[0]),
        pos: f.pos,
        desc: "Unused_RetVal".to_string(),
    })
}

/// Arguments of a call site; invoke mode prepends the receiver.
fn get_args(prog: &Program, call: &CallCommon) -> Vec<Key> {
    match &call.callee {
        Callee::Value(_) => call.args.iter().map(|&a| Key::ssa(prog, a)).collect(),
        Callee::Invoke { recv, .. } => {
            let mut args = Vec::with_capacity(call.args.len() + 1);
            args.push(Key::ssa(prog, *recv));
            args.extend(call.args.iter().map(|&a| Key::ssa(prog, a)));
            args
        }
    }
}

/// Synthetic arguments for entry points invoked without a call site.
fn get_fake_args(prog: &Program, def: &Definition) -> Vec<Key> {
    let f = prog.func(def.func);
    f.sig
        .params
        .iter()
        .map(|&ty| Key::Mock(MockKey { ty, pos: Pos::NONE, desc: "arg".to_string() }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use migoinfer_ssa::build;

    #[test]
    fn call_binds_args_and_returns() {
        let info = build::from_source(
            "package main\n\nfunc make2() (chan int, chan int):\n0 entry:\n    t0 = makechan chan int, 0:int\n    t1 = makechan chan int, 1:int\n    return t0, t1\n\nfunc main():\n0 entry:\n    t0 = call make2()\n    t1 = extract t0, 0\n    t2 = extract t0, 1\n    send t1, 1:int\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let def = Definition::new(prog, prog.funcs[0].id);
        let main = &prog.funcs[1];
        let (call_common, ret) = match &main.blocks[0].instrs[0].kind {
            InstrKind::Call(c) => (c.clone(), main.blocks[0].instrs[0].result),
            _ => unreachable!(),
        };
        let call = Call::new(&info, def, Some(&call_common), ret).unwrap();
        assert_eq!(0, call.nparam());
        assert_eq!(2, call.nreturn());
        assert_eq!("t1", call.ret(0).name());
        assert_eq!("t2", call.ret(1).name());
    }

    #[test]
    fn unconsumed_return_is_unused() {
        let info = build::from_source(
            "package main\n\nfunc mk() (chan int):\n0 entry:\n    t0 = makechan chan int, 0:int\n    return t0\n\nfunc main():\n0 entry:\n    call mk()\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let def = Definition::new(prog, prog.funcs[0].id);
        let main = &prog.funcs[1];
        let call_common = match &main.blocks[0].instrs[0].kind {
            InstrKind::Call(c) => c.clone(),
            _ => unreachable!(),
        };
        let call = Call::new(&info, def, Some(&call_common), None).unwrap();
        assert!(matches!(call.ret(0), Key::Unused(_)));
    }

    #[test]
    fn invoke_mode_receiver_is_argument_zero() {
        let info = build::from_source(
            "package main\n\ntype T struct { ch chan int }\ntype Sender interface { Send(int) }\n\nfunc (t T) Send(x int):\n0 entry:\n    return\n\nfunc main():\n0 entry:\n    t0 = alloc T\n    t1 = load t0\n    t2 = makeiface t1 : Sender\n    invoke t2.Send(1:int)\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let def = Definition::new(prog, prog.funcs[0].id);
        let main = &prog.funcs[1];
        let call_common = match &main.blocks[0].instrs[3].kind {
            InstrKind::Call(c) => c.clone(),
            _ => unreachable!(),
        };
        let call = Call::new(&info, def, Some(&call_common), None).unwrap();
        assert_eq!(2, call.args.len());
        assert_eq!("t2", call.args[0].name());
    }
}
