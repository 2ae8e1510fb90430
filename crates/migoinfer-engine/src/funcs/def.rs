//! Function definitions.

use std::rc::Rc;

use migoinfer_ssa::{FuncId, InstrKind, Pos, Program, UnOpKind, ValueId};

use crate::store::{Key, MockKey};

/// Occurrence counts of return operands for one tuple index, in
/// first-seen order so ties resolve deterministically.
type ReturnCount = Vec<(Key, usize)>;

/// A flattened function signature: `nparam` formal parameters, then
/// `nfreevar` captured variables, then `nreturn` return slots, all as
/// keys. Body-less functions get synthetic mock keys.
#[derive(Debug)]
pub struct Definition {
    pub func: FuncId,
    pub parameters: Vec<Key>,
    pub bindings: Vec<ValueId>,
    return_set: Vec<ReturnCount>,
    pub nparam: usize,
    pub nfreevar: usize,
    pub nreturn: usize,
    pub is_vararg: bool,
    name: String,
}

impl Definition {
    pub fn new(prog: &Program, func: FuncId) -> Rc<Definition> {
        Definition::build(prog, func, Vec::new())
    }

    /// Definition for a closure together with its variable bindings.
    pub fn closure(prog: &Program, func: FuncId, bindings: Vec<ValueId>) -> Rc<Definition> {
        Definition::build(prog, func, bindings)
    }

    fn build(prog: &Program, func: FuncId, bindings: Vec<ValueId>) -> Rc<Definition> {
        let f = prog.func(func);
        let params = get_params(prog, func);
        let nparam = params.len();
        let freevars: Vec<Key> =
            f.free_vars.iter().map(|&v| Key::ssa(prog, v)).collect();
        let nfreevar = freevars.len();
        let return_set = get_returns(prog, func);
        let nreturn = return_set.len();

        let mut parameters = Vec::with_capacity(nparam + nfreevar + nreturn);
        parameters.extend(params);
        parameters.extend(freevars);
        for rc in &return_set {
            parameters.push(common_retval(rc));
        }
        Rc::new(Definition {
            func,
            parameters,
            bindings,
            return_set,
            nparam,
            nfreevar,
            nreturn,
            is_vararg: f.sig.variadic,
            name: prog.qualified_name(func),
        })
    }

    pub fn param(&self, i: usize) -> &Key {
        &self.parameters[i]
    }

    pub fn free_var(&self, i: usize) -> &Key {
        &self.parameters[self.nparam + i]
    }

    /// The canonical key of the i-th return slot (the most frequently
    /// used return operand).
    pub fn ret(&self, i: usize) -> &Key {
        &self.parameters[self.nparam + self.nfreevar + i]
    }

    /// True if the given key names a return value of the body.
    pub fn is_return(&self, k: &Key) -> bool {
        let name = k.name();
        self.return_set
            .iter()
            .any(|rc| rc.iter().any(|(r, _)| r.name() == name))
    }

    pub fn uniq_name(&self) -> String {
        self.name.clone()
    }
}

fn get_params(prog: &Program, func: FuncId) -> Vec<Key> {
    let f = prog.func(func);
    if f.has_body() {
        return f.params.iter().map(|&p| Key::ssa(prog, p)).collect();
    }
    // Not concrete, but has a valid signature: mock the slots.
    let mut params = Vec::new();
    if let Some(recv) = f.sig.recv {
        params.push(Key::Mock(MockKey { ty: recv, pos: Pos::NONE, desc: "recv".to_string() }));
    }
    let skip = usize::from(f.sig.recv.is_some());
    for &ty in f.sig.params.iter().skip(skip) {
        params.push(Key::Mock(MockKey { ty, pos: Pos::NONE, desc: "param".to_string() }));
    }
    params
}

/// Scans the body for return instructions and counts operand versions
/// per tuple index.
fn get_returns(prog: &Program, func: FuncId) -> Vec<ReturnCount> {
    let f = prog.func(func);
    let nret = f.sig.results.len();
    if nret == 0 {
        return Vec::new();
    }
    if f.has_body() {
        let mut returns: Vec<ReturnCount> = vec![Vec::new(); nret];
        for block in &f.blocks {
            for instr in &block.instrs {
                if let InstrKind::Return { results } = &instr.kind {
                    for (i, &r) in results.iter().enumerate() {
                        let key = Key::ssa(prog, canonical(prog, r));
                        match returns[i].iter_mut().find(|(k, _)| *k == key) {
                            Some((_, n)) => *n += 1,
                            None => returns[i].push((key, 1)),
                        }
                    }
                }
            }
        }
        return returns;
    }
    f.sig
        .results
        .iter()
        .map(|&ty| {
            vec![(
                Key::Mock(MockKey { ty, pos: Pos::NONE, desc: "retval".to_string() }),
                1,
            )]
        })
        .collect()
}

/// Most frequently used return operand; first seen wins ties.
fn common_retval(rc: &ReturnCount) -> Key {
    let mut best: Option<(&Key, usize)> = None;
    for (k, n) in rc {
        if best.map(|(_, m)| *n > m).unwrap_or(true) {
            best = Some((k, *n));
        }
    }
    best.map(|(k, _)| k.clone()).expect("return count never empty")
}

/// Peels value coercions that do not change the underlying instance.
fn canonical(prog: &Program, v: ValueId) -> ValueId {
    match prog.def_instr(v).map(|i| &i.kind) {
        Some(InstrKind::ChangeType { x }) => canonical(prog, *x),
        Some(InstrKind::UnOp { op: UnOpKind::Mul, x }) => canonical(prog, *x),
        _ => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migoinfer_ssa::build;

    #[test]
    fn definition_flattens_params_and_returns() {
        let info = build::from_source(
            "package main\n\nfunc pick(a chan int, b chan int) (chan int):\n0 entry:\n    return a\n\nfunc main():\n0 entry:\n    return\n",
        )
        .build()
        .unwrap();
        let d = Definition::new(&info.prog, info.prog.funcs[0].id);
        assert_eq!((2, 0, 1), (d.nparam, d.nfreevar, d.nreturn));
        assert_eq!(3, d.parameters.len());
        assert_eq!("a", d.param(0).name());
        assert_eq!("a", d.ret(0).name());
        assert!(d.is_return(d.param(0)));
        assert_eq!("main.pick", d.uniq_name());
    }

    #[test]
    fn most_frequent_return_operand_wins() {
        let info = build::from_source(
            "package main\n\nfunc pick(c bool, a chan int, b chan int) (chan int):\n0 entry:\n    if c goto 1 else 2\n1 if.then:\n    return b\n2 if.else:\n    t0 = c == c\n    if t0 goto 3 else 4\n3 if.then:\n    return b\n4 if.else:\n    return a\n\nfunc main():\n0 entry:\n    return\n",
        )
        .build()
        .unwrap();
        let d = Definition::new(&info.prog, info.prog.funcs[0].id);
        assert_eq!("b", d.ret(0).name());
    }

    #[test]
    fn bodyless_function_gets_mock_slots() {
        let info = build::from_source(
            "package main\n\nfunc extern(a chan int) (int):\n\nfunc main():\n0 entry:\n    return\n",
        )
        .build()
        .unwrap();
        let d = Definition::new(&info.prog, info.prog.funcs[0].id);
        assert_eq!(1, d.nparam);
        assert_eq!("_param_", d.param(0).name());
        assert_eq!("_retval_", d.ret(0).name());
    }

    #[test]
    fn closure_definition_keeps_bindings() {
        let info = build::from_source(
            "package main\n\nfunc main$1() [ch chan int]:\n0 entry:\n    send ch, 1:int\n    return\n\nfunc main():\n0 entry:\n    t0 = makechan chan int, 0:int\n    t1 = makeclosure main$1 [t0]\n    call t1()\n    return\n",
        )
        .build()
        .unwrap();
        let t0 = info.prog.funcs[1].blocks[0].instrs[0].result.unwrap();
        let d = Definition::closure(&info.prog, info.prog.funcs[0].id, vec![t0]);
        assert_eq!((0, 1, 0), (d.nparam, d.nfreevar, d.nreturn));
        assert_eq!("ch", d.free_var(0).name());
        assert_eq!(1, d.bindings.len());
    }
}
