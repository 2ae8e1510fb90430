//! MiGo synthesis helpers.

use migoinfer_migo as migo;
use migoinfer_ssa::{BlockRef, InstrKind, Program};

use crate::infer::exported::Exported;
use crate::store::Key;

/// Name of the MiGo function for a block: `<fn>#<index>`, or the bare
/// function name for the entry block.
pub fn block_fn_name(fn_name: &str, index: usize) -> String {
    if index == 0 {
        fn_name.to_string()
    } else {
        format!("{}#{}", fn_name, index)
    }
}

/// A `call` to a block's MiGo function, passing every exported name to
/// itself — except names reassigned by a φ in the target block, which
/// the φ-merge re-binds on arrival.
pub fn migo_call(
    prog: &Program,
    fn_name: &str,
    target: BlockRef,
    exported: &Exported,
) -> migo::Statement {
    let mut params: Vec<migo::Parameter> = exported
        .names()
        .iter()
        .map(|k| migo::Parameter::new(k.name(), k.name()))
        .collect();
    for instr in &prog.block(target).instrs {
        if let InstrKind::Phi { .. } = instr.kind {
            if let Some(result) = instr.result {
                let phi_name = prog.value(result).name.clone();
                params.retain(|p| p.caller != phi_name);
            }
        }
    }
    migo::Statement::Call {
        name: block_fn_name(fn_name, target.block),
        params,
    }
}

/// A nil-channel binding for an undefined channel name.
pub fn migo_nil_chan(k: &Key) -> migo::Statement {
    migo::Statement::NewChan { name: k.name(), chan: "nilchan".to_string(), size: 0 }
}

/// Checks whether `name` is already defined inside a MiGo function:
/// either as a parameter, or by a `newchan` binding that has not been
/// consumed by a later call or spawn.
pub fn is_defined_migo_name(f: &migo::Function, name: &str) -> bool {
    if f.params.iter().any(|p| p.callee == name) {
        return true;
    }
    let mut defined = false;
    for stmt in &f.stmts {
        match stmt {
            migo::Statement::NewChan { name: n, .. } if n == name => defined = true,
            migo::Statement::Call { params, .. } | migo::Statement::Spawn { params, .. } => {
                if params.iter().any(|p| p.caller == name) {
                    defined = false;
                }
            }
            _ => {}
        }
    }
    defined
}

#[cfg(test)]
mod tests {
    use super::*;
    use migoinfer_ssa::build;

    #[test]
    fn call_name_omits_entry_index() {
        assert_eq!("main.main", block_fn_name("main.main", 0));
        assert_eq!("main.main#2", block_fn_name("main.main", 2));
    }

    #[test]
    fn phi_names_are_dropped_from_call_params() {
        let info = build::from_source(
            "package main\n\nfunc main(a chan int, b chan int):\n0 entry:\n    jump 1\n1 loop:\n    t0 = phi [0: a, 1: t0]\n    jump 1\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let mut exported = Exported::default();
        exported.export(Key::ssa(prog, prog.funcs[0].params[0]));
        exported.export(Key::ssa(prog, prog.funcs[0].params[1]));
        let t0 = prog.funcs[0].blocks[1].instrs[0].result.unwrap();
        exported.export(Key::ssa(prog, t0));

        let target = BlockRef { func: prog.funcs[0].id, block: 1 };
        match migo_call(prog, "main.main", target, &exported) {
            migo::Statement::Call { name, params } => {
                assert_eq!("main.main#1", name);
                // t0 is reassigned by the φ in block 1 and must not be
                // passed in.
                assert_eq!(
                    vec!["a", "b"],
                    params.iter().map(|p| p.caller.as_str()).collect::<Vec<_>>()
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn defined_name_is_reset_by_consuming_call() {
        let mut f = migo::Function::new("main.main");
        f.add_stmts([migo::Statement::NewChan {
            name: "t0".to_string(),
            chan: "c".to_string(),
            size: 0,
        }]);
        assert!(is_defined_migo_name(&f, "t0"));
        f.add_stmts([migo::Statement::Call {
            name: "main.f".to_string(),
            params: vec![migo::Parameter::new("t0", "ch")],
        }]);
        assert!(!is_defined_migo_name(&f, "t0"));
    }
}
