//! SSA input surface for MiGo inference.
//!
//! This crate defines the SSA program model consumed read-only by the
//! inference engine, together with its textual front end and the build
//! configuration. A program is a set of packages holding functions;
//! functions are control-flow graphs of basic blocks whose instructions
//! reference values (registers, parameters, constants, globals) by id.
//!
//! Key properties the engine relies on:
//! - each register is assigned exactly once (SSA form),
//! - basic blocks carry the lowering comments (`for.loop`, `for.body`,
//!   `for.done`, `cond.true`, `cond.false`) used by loop detection,
//! - a referrers table maps values to the instructions using them,
//! - constants with identical syntactic form are interned to one value.

pub mod build;
pub mod find;
pub mod lexer;
pub mod parser;
pub mod print;
pub mod program;
pub mod source;
pub mod types;

pub use program::{
    BasicBlock, BinOpKind, BlockRef, Builtin, Callee, CallCommon, ConstValue, FuncId, Function,
    Instr, InstrId, InstrKind, InstrRef, Package, PkgId, Program, SelectState, Signature,
    UnOpKind, ValueData, ValueId, ValueKind,
};
pub use source::{FileSet, Pos, Position};
pub use types::{ChanDir, MethodSig, StructField, TypeId, TypeKind, TypeTable};

/// The SSA build product handed to the engine: the program, its file set
/// and the packages deliberately not built.
#[derive(Debug)]
pub struct Info {
    pub prog: Program,
    pub fset: FileSet,
    pub ignored_pkgs: Vec<String>,
}

impl Info {
    /// Renders the position of a value or instruction for diagnostics.
    pub fn pos_string(&self, pos: Pos) -> String {
        self.fset.describe(pos)
    }
}
