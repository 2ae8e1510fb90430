//! Interface method resolution.
//!
//! Given an interface method and the receiver SSA value of an
//! invoke-mode call, finds the concrete function implementing it. The
//! receiver is first walked down to its most concrete shape (peeling
//! interface conversions, type assertions, call returns and pointer
//! dereferences), then the method set of the concrete type is consulted.
//! All failures are non-fatal: the calling instruction is skipped.

use migoinfer_ssa::{
    FuncId, InstrKind, MethodSig, Program, TypeId, TypeKind, UnOpKind, ValueId,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("interface method is nil")]
    NilMethod,
    #[error("interface method is abstract")]
    AbstractMethod,
    #[error("missing method: {method} (type {ty} does not have method {method})")]
    MissingMethod { ty: String, method: String },
    #[error("type error: method {method} of {ty} has wrong type")]
    WrongMethodType { ty: String, method: String },
    #[error("unknown implementation of interface: {recv} (type: {ty})")]
    UnknownInvokeReceiver { recv: String, ty: String },
}

/// Finds the concrete implementation of `method` for the receiver value
/// `recv`.
pub fn lookup_method_impl(
    prog: &Program,
    method: &str,
    recv: ValueId,
) -> Result<FuncId, LookupError> {
    if method.is_empty() {
        return Err(LookupError::NilMethod);
    }
    let recv_ty = prog.value(recv).ty;

    let concrete = concrete_impl(prog, recv);
    let concrete_ty = prog.value(concrete).ty;

    // Static sanity check: the concrete type must carry every method of
    // the receiver interface with a compatible signature.
    if let Some(methods) = prog.types.interface_methods(recv_ty) {
        for sig in methods {
            match find_method(prog, concrete_ty, &sig.name) {
                Some(f) => {
                    if !signature_matches(prog, f, sig) {
                        return Err(LookupError::WrongMethodType {
                            ty: prog.types.render(concrete_ty),
                            method: sig.name.clone(),
                        });
                    }
                }
                None if prog.types.is_interface(concrete_ty) => {
                    // Receiver never left interface land; nothing more
                    // concrete to check against.
                }
                None => {
                    return Err(LookupError::MissingMethod {
                        ty: prog.types.render(concrete_ty),
                        method: sig.name.clone(),
                    })
                }
            }
        }
    } else if find_method(prog, recv_ty, method).is_none() {
        return Err(LookupError::MissingMethod {
            ty: prog.types.render(recv_ty),
            method: method.to_string(),
        });
    }

    if prog.types.is_interface(concrete_ty) {
        // Could not walk past the interface: dispatch stays abstract.
        return Err(LookupError::UnknownInvokeReceiver {
            recv: prog.value(recv).name.clone(),
            ty: prog.types.render(concrete_ty),
        });
    }
    find_method(prog, concrete_ty, method)
        .map(|f| concrete_method(prog, f, method))
        .ok_or(LookupError::AbstractMethod)
}

/// Chases synthetic wrapper methods down to the concrete method. A
/// wrapper is the forwarder shape produced for promoted methods of
/// embedded fields: its body performs no communication and delegates to
/// exactly one same-named method.
fn concrete_method(prog: &Program, f: FuncId, name: &str) -> FuncId {
    let mut current = f;
    let mut seen = vec![f];
    while let Some(next) = wrapper_target(prog, current, name) {
        if seen.contains(&next) {
            break;
        }
        seen.push(next);
        current = next;
    }
    current
}

/// The forwarding target of a wrapper body, if the method is one.
fn wrapper_target(prog: &Program, f: FuncId, name: &str) -> Option<FuncId> {
    let fun = prog.func(f);
    if !fun.has_body() {
        return None;
    }
    let mut target = None;
    for b in &fun.blocks {
        for i in &b.instrs {
            match &i.kind {
                InstrKind::Call(c) => {
                    if target.is_some() {
                        return None; // More than one call: not a forwarder.
                    }
                    target = static_callee(prog, c);
                }
                // Any observable action disqualifies a wrapper.
                InstrKind::Send { .. }
                | InstrKind::Select { .. }
                | InstrKind::MakeChan { .. }
                | InstrKind::Go(_)
                | InstrKind::UnOp { op: UnOpKind::Arrow, .. } => return None,
                _ => {}
            }
        }
    }
    let g = target?;
    let gf = prog.func(g);
    (g != f && gf.sig.recv.is_some() && gf.name == name).then_some(g)
}

/// Walks an SSA value to its most concrete shape.
fn concrete_impl(prog: &Program, v: ValueId) -> ValueId {
    match prog.def_instr(v).map(|i| i.kind.clone()) {
        Some(InstrKind::MakeInterface { x }) => concrete_impl(prog, x),
        Some(InstrKind::TypeAssert { x }) => concrete_impl(prog, x),
        Some(InstrKind::Call(call)) => {
            // Use the callee body's first return operand; only its type
            // matters.
            if let Some(f) = static_callee(prog, &call) {
                if prog.func(f).has_body() {
                    if let Some(r) = fn_body_retval(prog, f) {
                        return concrete_impl(prog, r);
                    }
                }
            }
            v
        }
        Some(InstrKind::UnOp { op: UnOpKind::Mul, x }) => {
            let ty = prog.value(v).ty;
            if prog.types.struct_fields(ty).is_some() {
                concrete_impl(prog, x)
            } else {
                v
            }
        }
        _ => v,
    }
}

fn static_callee(prog: &Program, call: &migoinfer_ssa::CallCommon) -> Option<FuncId> {
    match &call.callee {
        migoinfer_ssa::Callee::Value(v) => match &prog.value(*v).kind {
            migoinfer_ssa::ValueKind::Function(f) => Some(*f),
            _ => match prog.def_instr(*v).map(|i| &i.kind) {
                Some(InstrKind::MakeClosure { func, .. }) => Some(*func),
                _ => None,
            },
        },
        migoinfer_ssa::Callee::Invoke { .. } => None,
    }
}

/// First return operand of a function body.
fn fn_body_retval(prog: &Program, f: FuncId) -> Option<ValueId> {
    let mut retval = None;
    for b in &prog.func(f).blocks {
        for i in &b.instrs {
            if let InstrKind::Return { results } = &i.kind {
                if let Some(&r) = results.first() {
                    retval = Some(r);
                }
            }
        }
    }
    retval
}

/// Looks up a method on a type, normalising pointers and named types.
fn find_method(prog: &Program, ty: TypeId, name: &str) -> Option<FuncId> {
    if let Some(f) = prog.lookup_method(ty, name) {
        return Some(f);
    }
    // Pointer receiver or pointer value of a named type.
    if let TypeKind::Pointer { elem } = prog.types.kind(prog.types.underlying(ty)) {
        if let Some(f) = prog.lookup_method(*elem, name) {
            return Some(f);
        }
    }
    None
}

/// Compares a concrete method's signature against an interface method.
/// Receiver parameters are skipped on the concrete side.
fn signature_matches(prog: &Program, f: FuncId, sig: &MethodSig) -> bool {
    let fsig = &prog.func(f).sig;
    let skip = usize::from(fsig.recv.is_some());
    let params: Vec<TypeId> = fsig.params.iter().skip(skip).copied().collect();
    if params.len() != sig.params.len() || fsig.results.len() != sig.results.len() {
        return false;
    }
    params
        .iter()
        .zip(&sig.params)
        .all(|(&a, &b)| prog.types.identical(a, b))
        && fsig
            .results
            .iter()
            .zip(&sig.results)
            .all(|(&a, &b)| prog.types.identical(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use migoinfer_ssa::build;

    const IFACE: &str = "\
package main

type T struct { ch chan int }
type Sender interface { Send(int) }

func (t T) Send(x int):
0 entry:
    return

func main():
0 entry:
    t0 = alloc T
    t1 = load t0
    t2 = makeiface t1 : Sender
    invoke t2.Send(1:int)
    return
";

    #[test]
    fn resolves_through_interface_conversion() {
        let info = build::from_source(IFACE).build().unwrap();
        let prog = &info.prog;
        let main = prog.funcs.iter().find(|f| f.name == "main").unwrap();
        let t2 = main.blocks[0].instrs[2].result.unwrap();
        let f = lookup_method_impl(prog, "Send", t2).unwrap();
        assert_eq!("Send", prog.func(f).name);
    }

    #[test]
    fn resolves_through_type_assert() {
        let info = build::from_source(
            "package main\n\ntype T struct { ch chan int }\ntype Sender interface { Send(int) }\n\nfunc (t T) Send(x int):\n0 entry:\n    return\n\nfunc main():\n0 entry:\n    t0 = alloc T\n    t1 = load t0\n    t2 = makeiface t1 : Sender\n    t3 = typeassert t2 : T\n    t4 = makeiface t3 : Sender\n    invoke t4.Send(1:int)\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let main = prog.funcs.iter().find(|f| f.name == "main").unwrap();
        let t4 = main.blocks[0].instrs[4].result.unwrap();
        assert!(lookup_method_impl(prog, "Send", t4).is_ok());
    }

    #[test]
    fn wrapper_method_chases_to_concrete() {
        // (Outer).Send is a promotion-style forwarder: it only extracts
        // the embedded field and delegates to (Inner).Send.
        let info = build::from_source(
            "package main\n\ntype Inner struct { ch chan int }\ntype Outer struct { in Inner }\ntype Sender interface { Send(int) }\n\nfunc (i Inner) Send(x int):\n0 entry:\n    t0 = fieldaddr i, 0\n    t1 = load t0\n    send t1, x\n    return\n\nfunc (o Outer) Send(x int):\n0 entry:\n    t0 = fieldaddr o, 0\n    t1 = load t0\n    call Inner.Send(t1, x)\n    return\n\nfunc main():\n0 entry:\n    t0 = alloc Outer\n    t1 = load t0\n    t2 = makeiface t1 : Sender\n    invoke t2.Send(1:int)\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let main = prog.funcs.iter().find(|f| f.name == "main").unwrap();
        let t2 = main.blocks[0].instrs[2].result.unwrap();
        let f = lookup_method_impl(prog, "Send", t2).unwrap();
        let recv = prog.func(f).sig.recv.unwrap();
        assert_eq!("Inner", prog.types.render(recv));
    }

    #[test]
    fn missing_method_is_reported() {
        let info = build::from_source(
            "package main\n\ntype T struct { ch chan int }\ntype Sender interface { Send(int); Other() }\n\nfunc (t T) Send(x int):\n0 entry:\n    return\n\nfunc main():\n0 entry:\n    t0 = alloc T\n    t1 = load t0\n    t2 = makeiface t1 : Sender\n    invoke t2.Other()\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let main = prog.funcs.iter().find(|f| f.name == "main").unwrap();
        let t2 = main.blocks[0].instrs[2].result.unwrap();
        assert!(matches!(
            lookup_method_impl(prog, "Other", t2),
            Err(LookupError::MissingMethod { .. })
        ));
    }

    #[test]
    fn wrong_method_type_is_reported() {
        let info = build::from_source(
            "package main\n\ntype T struct { ch chan int }\ntype Sender interface { Send(bool) }\n\nfunc (t T) Send(x int):\n0 entry:\n    return\n\nfunc main():\n0 entry:\n    t0 = alloc T\n    t1 = load t0\n    t2 = makeiface t1 : Sender\n    invoke t2.Send(true:bool)\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let main = prog.funcs.iter().find(|f| f.name == "main").unwrap();
        let t2 = main.blocks[0].instrs[2].result.unwrap();
        assert!(matches!(
            lookup_method_impl(prog, "Send", t2),
            Err(LookupError::WrongMethodType { .. })
        ));
    }
}
