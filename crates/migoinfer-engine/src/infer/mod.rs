//! The inference driver.
//!
//! Walks the program from its entry points, collecting one MiGo function
//! per analysed basic block, then optionally applies the cleanup
//! rewrites and prints the result with the entry function first.

pub mod block;
pub mod env;
pub mod exported;
pub mod func;
pub mod instr;
pub mod migo;
pub mod pkg;
pub mod utils;

use std::io::{self, Write};
use std::rc::Rc;

use migoinfer_migo::transform;
use migoinfer_ssa::Info;

use crate::callctx::Context;
use crate::errors::FatalError;
use crate::funcs::Call;

pub use env::Environment;
pub use func::FunctionAnalyser;

/// The MiGo inference entry point.
pub struct Inferer {
    pub env: Environment,
    /// Explicit entry-point path; defaults to `main` of each main
    /// package.
    pub entry_func: Option<String>,
    /// Skip the τ-function and dead-function cleanup passes.
    pub raw: bool,
    entry_name: Option<String>,
}

impl Inferer {
    pub fn new(info: Rc<Info>) -> Inferer {
        Inferer {
            env: Environment::new(info),
            entry_func: None,
            raw: false,
            entry_name: None,
        }
    }

    pub fn set_entry_func(&mut self, path: impl Into<String>) {
        self.entry_func = Some(path.into());
    }

    /// Runs inference over the whole program.
    pub fn analyse(&mut self) -> Result<(), FatalError> {
        let info = self.env.info().clone();

        // Package/global variable initialisation.
        for p in &info.prog.packages {
            pkg::init_globals(&self.env, p.id);
            pkg::visit_init(&self.env, p.id)?;
        }

        match self.entry_func.clone() {
            None => {
                let mains = info.main_pkgs();
                if mains.is_empty() {
                    return Err(FatalError::NoMainPackage);
                }
                for main in mains {
                    let Some(f) = info.pkg_func(main, "main") else { continue };
                    self.run_entry(f)?;
                    self.entry_name = Some(info.prog.qualified_name(f));
                }
            }
            Some(path) => {
                let f = info
                    .find_func(&path)
                    .ok_or_else(|| FatalError::NoEntryFunc(path.clone()))?;
                self.run_entry(f)?;
                self.entry_name = Some(info.prog.qualified_name(f));
            }
        }

        if !self.raw {
            if let Some(entry) = self.entry_name.clone() {
                let mut prog = self.env.prog().borrow_mut();
                transform::remove_tau_funcs(&mut prog, &entry);
                transform::remove_undefined(&mut prog, &entry);
            }
        }
        Ok(())
    }

    fn run_entry(&mut self, f: migoinfer_ssa::FuncId) -> Result<(), FatalError> {
        let info = self.env.info().clone();
        let def = self.env.definition(f);
        let call = Call::new(&info, def, None, None)?;
        let mut fna = FunctionAnalyser::new(&self.env, &Context::toplevel(), call);
        fna.enter_func()
    }

    /// The name of the analysed entry function, once `analyse` ran.
    pub fn entry_name(&self) -> Option<&str> {
        self.entry_name.as_deref()
    }

    /// Writes the MiGo program, entry function first, then insertion
    /// order.
    pub fn write_output(&self, w: &mut dyn Write) -> io::Result<()> {
        let prog = self.env.prog().borrow();
        let mut out = String::new();
        match &self.entry_name {
            Some(entry) => {
                prog.write_with_entry(&mut out, entry)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            }
            None => out = prog.to_string(),
        }
        w.write_all(out.as_bytes())
    }

    /// The printed MiGo output as a string, mainly for tests.
    pub fn output(&self) -> String {
        let mut buf = Vec::new();
        self.write_output(&mut buf).expect("write to string");
        String::from_utf8(buf).expect("MiGo output is UTF-8")
    }
}
