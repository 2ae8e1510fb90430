//! Package-level initialisation.

use crate::callctx::Context;
use crate::errors::FatalError;
use crate::funcs::Call;
use crate::infer::env::Environment;
use crate::infer::func::FunctionAnalyser;
use crate::store::Key;
use migoinfer_ssa::PkgId;

/// Registers package-global variables in the shared globals store.
pub fn init_globals(env: &Environment, pkg: PkgId) {
    let info = env.info().clone();
    let prog = &info.prog;
    for &g in &prog.package(pkg).globals {
        log::debug!(
            target: "pkg",
            "package member {}.{}",
            prog.package(pkg).path,
            prog.value(g).name
        );
        env.globals().borrow_mut().put_obj(Key::ssa(prog, g), g);
    }
}

/// Analyses the package `init` function, if present, in a fresh
/// toplevel context.
pub fn visit_init(env: &Environment, pkg: PkgId) -> Result<(), FatalError> {
    let info = env.info().clone();
    let prog = &info.prog;
    let init = prog
        .package(pkg)
        .funcs
        .iter()
        .copied()
        .find(|&f| prog.func(f).name == "init" && prog.func(f).has_body());
    let Some(init) = init else {
        log::debug!(target: "pkg", "package {} has no init", prog.package(pkg).path);
        return Ok(());
    };
    let def = env.definition(init);
    let call = Call::new(&info, def, None, None)?;
    let mut fna = FunctionAnalyser::new(env, &Context::toplevel(), call);
    fna.enter_func()
}
