//! MiGo target AST for the inference engine.
//!
//! MiGo is a small process-calculus surface language describing the
//! communication behaviour of a program: channel creation, send, receive,
//! close, select, spawn and calls between per-block functions. The engine
//! emits one [`Function`] per analysed basic block; downstream
//! liveness/deadlock checkers consume the printed form.
//!
//! Functions are shared as `Rc<RefCell<Function>>` because the analyser
//! keeps appending parameters to a callee's functions after they have been
//! registered in the program (the caller learns about channel arguments
//! only once the callee has been fully analysed).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub mod transform;

/// A whole MiGo program: an ordered collection of functions.
#[derive(Debug, Default)]
pub struct Program {
    pub funcs: Vec<Rc<RefCell<Function>>>,
}

impl Program {
    pub fn new() -> Program {
        Program { funcs: Vec::new() }
    }

    /// Appends a function to the program. Later instances of the same
    /// function share its name; the first registered definition wins.
    pub fn add_function(&mut self, f: Rc<RefCell<Function>>) {
        let name = f.borrow().name.clone();
        if self.function(&name).is_none() {
            self.funcs.push(f);
        }
    }

    /// Looks up a function by name.
    pub fn function(&self, name: &str) -> Option<Rc<RefCell<Function>>> {
        self.funcs.iter().find(|f| f.borrow().name == name).cloned()
    }

    /// Writes the program with the function named `entry` first, then the
    /// remaining functions in insertion order.
    pub fn write_with_entry(&self, w: &mut dyn fmt::Write, entry: &str) -> fmt::Result {
        for f in &self.funcs {
            if f.borrow().name == entry {
                write!(w, "{}", f.borrow())?;
            }
        }
        for f in &self.funcs {
            if f.borrow().name != entry {
                write!(w, "{}", f.borrow())?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.funcs {
            write!(f, "{}", func.borrow())?;
        }
        Ok(())
    }
}

/// A channel parameter of a MiGo function: the name the caller passes the
/// channel as, paired with the name the callee knows it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub caller: String,
    pub callee: String,
}

impl Parameter {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>) -> Parameter {
        Parameter { caller: caller.into(), callee: callee.into() }
    }
}

/// A MiGo function: one per analysed basic block.
#[derive(Debug, Default, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    pub stmts: Vec<Statement>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Function {
        Function { name: name.into(), params: Vec::new(), stmts: Vec::new() }
    }

    /// Shared-ownership constructor used by the analysers.
    pub fn shared(name: impl Into<String>) -> Rc<RefCell<Function>> {
        Rc::new(RefCell::new(Function::new(name)))
    }

    /// Adds parameters, skipping ones whose callee-side name is already
    /// bound (blocks are entered once per incoming edge and re-announce
    /// their exported names every time).
    pub fn add_params(&mut self, params: &[Parameter]) {
        for p in params {
            if !self.params.iter().any(|q| q.callee == p.callee) {
                self.params.push(p.clone());
            }
        }
    }

    pub fn add_stmts(&mut self, stmts: impl IntoIterator<Item = Statement>) {
        self.stmts.extend(stmts);
    }
}

/// One MiGo statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let <name> = newchan <chan>, <size>` — `chan` is the globally
    /// unique channel name encoding the creation site.
    NewChan { name: String, chan: String, size: i64 },
    Send { chan: String },
    Recv { chan: String },
    Close { chan: String },
    /// Opaque no-op.
    Tau,
    Call { name: String, params: Vec<Parameter> },
    Spawn { name: String, params: Vec<Parameter> },
    /// Plain two-way branch; both arms usually continue into block calls.
    If { then: Vec<Statement>, els: Vec<Statement> },
    /// A recognised for-loop: `cond` carries the serialised loop header
    /// `v = init; (cond); v = v ± step`.
    IfFor { cond: String, then: Vec<Statement>, els: Vec<Statement> },
    /// Select over channel guards. Each case starts with its guard
    /// statement followed by the continuation; a non-blocking select has a
    /// final case beginning with [`Statement::Tau`].
    Select { cases: Vec<Vec<Statement>> },
}

impl Statement {
    /// Target function names mentioned by this statement (transitively for
    /// compound statements).
    pub fn callees<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Statement::Call { name, .. } | Statement::Spawn { name, .. } => out.push(name),
            Statement::If { then, els } | Statement::IfFor { then, els, .. } => {
                for s in then.iter().chain(els) {
                    s.callees(out);
                }
            }
            Statement::Select { cases } => {
                for case in cases {
                    for s in case {
                        s.callees(out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn write_stmts(f: &mut fmt::Formatter<'_>, stmts: &[Statement]) -> fmt::Result {
    for (i, s) in stmts.iter().enumerate() {
        if i > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{}", s)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::NewChan { name, chan, size } => {
                write!(f, "let {} = newchan {}, {}", name, chan, size)
            }
            Statement::Send { chan } => write!(f, "send {}", chan),
            Statement::Recv { chan } => write!(f, "recv {}", chan),
            Statement::Close { chan } => write!(f, "close {}", chan),
            Statement::Tau => write!(f, "τ"),
            Statement::Call { name, params } => {
                write!(f, "call {}(", name)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.caller)?;
                }
                write!(f, ")")
            }
            Statement::Spawn { name, params } => {
                write!(f, "spawn {}(", name)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.caller)?;
                }
                write!(f, ")")
            }
            Statement::If { then, els } => {
                write!(f, "if {{ ")?;
                write_stmts(f, then)?;
                write!(f, " }} else {{ ")?;
                write_stmts(f, els)?;
                write!(f, " }}")
            }
            Statement::IfFor { cond, then, els } => {
                write!(f, "if ({}) {{ ", cond)?;
                write_stmts(f, then)?;
                write!(f, " }} else {{ ")?;
                write_stmts(f, els)?;
                write!(f, " }}")
            }
            Statement::Select { cases } => {
                write!(f, "select {{ ")?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "case ")?;
                    write_stmts(f, case)?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.callee)?;
        }
        writeln!(f, "):")?;
        for s in &self.stmts {
            writeln!(f, "    {};", s)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn print_simple_function() {
        let mut f = Function::new("main.main");
        f.add_stmts([
            Statement::NewChan {
                name: "t0".to_string(),
                chan: "main.main0.t0_chan0".to_string(),
                size: 0,
            },
            Statement::Spawn {
                name: "main.main$1".to_string(),
                params: vec![Parameter::new("t0", "ch")],
            },
            Statement::Recv { chan: "t0".to_string() },
        ]);
        let expect = "def main.main():\n    let t0 = newchan main.main0.t0_chan0, 0;\n    spawn main.main$1(t0);\n    recv t0;\n";
        assert_eq!(expect, f.to_string());
    }

    #[test]
    fn print_select_with_default() {
        let mut f = Function::new("main.main");
        f.add_stmts([Statement::Select {
            cases: vec![
                vec![
                    Statement::Recv { chan: "ch".to_string() },
                    Statement::Call { name: "main.main#2".to_string(), params: vec![] },
                ],
                vec![Statement::Tau],
            ],
        }]);
        let expect =
            "def main.main():\n    select { case recv ch; call main.main#2() | case τ };\n";
        assert_eq!(expect, f.to_string());
    }

    #[test]
    fn params_dedupe_by_callee() {
        let mut f = Function::new("f");
        f.add_params(&[Parameter::new("a", "a")]);
        f.add_params(&[Parameter::new("a", "a"), Parameter::new("b", "b")]);
        assert_eq!(2, f.params.len());
    }

    #[test]
    fn entry_printed_first() {
        let mut p = Program::new();
        p.add_function(Function::shared("main.worker"));
        p.add_function(Function::shared("main.main"));
        let mut out = String::new();
        p.write_with_entry(&mut out, "main.main").unwrap();
        let first = out.lines().next().unwrap();
        assert_eq!("def main.main():", first);
    }
}
