//! Post-inference rewrite passes.
//!
//! Two passes clean up the raw inference output: τ-function removal folds
//! away functions with no observable channel action, and dead-function
//! elimination drops functions unreachable from the entry point. Running
//! inference raw and then applying both passes yields the same program as
//! running with the passes enabled.

use std::collections::HashSet;

use crate::{Program, Statement};

/// Returns true if every statement in `stmts` is a τ or a call to a
/// function already known to be τ-only.
fn tau_only(stmts: &[Statement], tau_funcs: &HashSet<String>) -> bool {
    stmts.iter().all(|s| match s {
        Statement::Tau => true,
        Statement::Call { name, .. } | Statement::Spawn { name, .. } => tau_funcs.contains(name),
        _ => false,
    })
}

fn replace_tau_calls(stmts: &mut Vec<Statement>, tau_funcs: &HashSet<String>) {
    for s in stmts.iter_mut() {
        match s {
            Statement::Call { name, .. } | Statement::Spawn { name, .. } => {
                if tau_funcs.contains(name.as_str()) {
                    *s = Statement::Tau;
                }
            }
            Statement::If { then, els } | Statement::IfFor { then, els, .. } => {
                replace_tau_calls(then, tau_funcs);
                replace_tau_calls(els, tau_funcs);
            }
            Statement::Select { cases } => {
                for case in cases.iter_mut() {
                    replace_tau_calls(case, tau_funcs);
                }
            }
            _ => {}
        }
    }
}

/// Removes functions whose behaviour is only τ (no channel action), and
/// rewrites calls to them into τ statements. The entry function is never
/// removed.
pub fn remove_tau_funcs(prog: &mut Program, entry: &str) {
    let mut tau_funcs: HashSet<String> = HashSet::new();
    loop {
        let mut changed = false;
        for f in &prog.funcs {
            let f = f.borrow();
            if f.name == entry || tau_funcs.contains(&f.name) {
                continue;
            }
            if tau_only(&f.stmts, &tau_funcs) {
                tau_funcs.insert(f.name.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    log::debug!(target: "transform", "removing {} τ-only function(s)", tau_funcs.len());
    prog.funcs.retain(|f| !tau_funcs.contains(&f.borrow().name));
    for f in &prog.funcs {
        replace_tau_calls(&mut f.borrow_mut().stmts, &tau_funcs);
    }
}

/// Removes functions not reachable from `entry` through call/spawn edges.
pub fn remove_undefined(prog: &mut Program, entry: &str) {
    let mut reachable: HashSet<String> = HashSet::new();
    let mut work = vec![entry.to_string()];
    while let Some(name) = work.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(f) = prog.function(&name) {
            let f = f.borrow();
            let mut callees = Vec::new();
            for s in &f.stmts {
                s.callees(&mut callees);
            }
            for c in callees {
                if !reachable.contains(c) {
                    work.push(c.to_string());
                }
            }
        }
    }
    let before = prog.funcs.len();
    prog.funcs.retain(|f| reachable.contains(&f.borrow().name));
    log::debug!(target: "transform", "dead function elimination: {} → {}", before, prog.funcs.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Function, Parameter};

    fn call(name: &str) -> Statement {
        Statement::Call { name: name.to_string(), params: vec![] }
    }

    #[test]
    fn tau_funcs_are_folded_away() {
        let mut prog = Program::new();
        let noop = Function::shared("main.noop");
        noop.borrow_mut().add_stmts([Statement::Tau]);
        prog.add_function(noop);
        let main = Function::shared("main.main");
        main.borrow_mut().add_stmts([
            call("main.noop"),
            Statement::Send { chan: "ch".to_string() },
        ]);
        prog.add_function(main);

        remove_tau_funcs(&mut prog, "main.main");
        assert!(prog.function("main.noop").is_none());
        let main = prog.function("main.main").unwrap();
        assert_eq!(Statement::Tau, main.borrow().stmts[0]);
    }

    #[test]
    fn tau_removal_is_transitive() {
        let mut prog = Program::new();
        let inner = Function::shared("main.inner");
        inner.borrow_mut().add_stmts([Statement::Tau]);
        prog.add_function(inner);
        let outer = Function::shared("main.outer");
        outer.borrow_mut().add_stmts([call("main.inner")]);
        prog.add_function(outer);
        let main = Function::shared("main.main");
        main.borrow_mut().add_stmts([call("main.outer")]);
        prog.add_function(main);

        remove_tau_funcs(&mut prog, "main.main");
        assert_eq!(1, prog.funcs.len());
        assert_eq!(Statement::Tau, prog.function("main.main").unwrap().borrow().stmts[0]);
    }

    #[test]
    fn unreachable_functions_are_dropped() {
        let mut prog = Program::new();
        let orphan = Function::shared("main.orphan");
        orphan.borrow_mut().add_stmts([Statement::Send { chan: "ch".to_string() }]);
        prog.add_function(orphan);
        let worker = Function::shared("main.worker");
        worker.borrow_mut().add_stmts([Statement::Recv { chan: "ch".to_string() }]);
        prog.add_function(worker);
        let main = Function::shared("main.main");
        main.borrow_mut().add_stmts([Statement::Spawn {
            name: "main.worker".to_string(),
            params: vec![Parameter::new("t0", "ch")],
        }]);
        prog.add_function(main);

        remove_undefined(&mut prog, "main.main");
        assert!(prog.function("main.orphan").is_none());
        assert!(prog.function("main.worker").is_some());
    }
}
