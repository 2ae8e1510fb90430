//! The SSA program model.
//!
//! Arena-indexed: functions, values and packages live in flat vectors on
//! [`Program`] and are referenced by copyable ids. Every SSA value —
//! registers, parameters, free variables, constants, globals, function
//! references and builtins — is a [`ValueId`] into one arena, so value
//! identity is id equality program-wide.

use std::collections::HashMap;

use crate::source::Pos;
use crate::types::{TypeId, TypeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PkgId(pub u32);

/// Globally unique id of an instruction; identifies a syntactic call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrId(pub u32);

/// Location of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub func: FuncId,
    pub block: usize,
}

/// Location of an instruction inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrRef {
    pub func: FuncId,
    pub block: usize,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Close,
    Print,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Close => "close",
            Builtin::Print => "print",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// Result register of an instruction.
    Register { def: InstrRef },
    Param { func: FuncId, index: usize },
    FreeVar { func: FuncId, index: usize },
    Const(ConstValue),
    Global { pkg: PkgId },
    Function(FuncId),
    Builtin(Builtin),
}

/// Data of one SSA value. The name is the short source-level name (`t0`,
/// `ch`, `1:int`) used verbatim in MiGo output.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub name: String,
    pub ty: TypeId,
    pub pos: Pos,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpKind {
    /// Channel receive `<-ch`.
    Arrow,
    /// Pointer dereference `*p`.
    Mul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    Eql,
    Lss,
    Gtr,
    Neq,
    Leq,
    Geq,
}

impl BinOpKind {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Quo => "/",
            BinOpKind::Rem => "%",
            BinOpKind::Eql => "==",
            BinOpKind::Lss => "<",
            BinOpKind::Gtr => ">",
            BinOpKind::Neq => "!=",
            BinOpKind::Leq => "<=",
            BinOpKind::Geq => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOpKind::Eql
                | BinOpKind::Lss
                | BinOpKind::Gtr
                | BinOpKind::Neq
                | BinOpKind::Leq
                | BinOpKind::Geq
        )
    }
}

/// One guard of a select instruction.
#[derive(Debug, Clone)]
pub struct SelectState {
    /// `SendOnly` for send guards, `RecvOnly` for receive guards.
    pub dir: crate::types::ChanDir,
    pub chan: ValueId,
    /// Sent operand for send guards.
    pub send: Option<ValueId>,
    pub pos: Pos,
}

/// Call target of a call/go instruction.
#[derive(Debug, Clone)]
pub enum Callee {
    /// Call mode: a function value, closure register or builtin.
    Value(ValueId),
    /// Invoke mode: dynamic dispatch of an interface method.
    Invoke { recv: ValueId, method: String },
}

#[derive(Debug, Clone)]
pub struct CallCommon {
    pub callee: Callee,
    pub args: Vec<ValueId>,
}

impl CallCommon {
    pub fn is_invoke(&self) -> bool {
        matches!(self.callee, Callee::Invoke { .. })
    }
}

#[derive(Debug, Clone)]
pub enum InstrKind {
    Alloc { ty: TypeId },
    MakeChan { size: ValueId },
    MakeClosure { func: FuncId, bindings: Vec<ValueId> },
    MakeInterface { x: ValueId },
    TypeAssert { x: ValueId },
    ChangeType { x: ValueId },
    Slice { x: ValueId },
    FieldAddr { x: ValueId, field: usize },
    UnOp { op: UnOpKind, x: ValueId },
    BinOp { op: BinOpKind, x: ValueId, y: ValueId },
    Phi { edges: Vec<ValueId> },
    Extract { tuple: ValueId, index: usize },
    Call(CallCommon),
    Go(CallCommon),
    Send { chan: ValueId, val: ValueId },
    Store { addr: ValueId, val: ValueId },
    Jump { target: usize },
    If { cond: ValueId, then_dest: usize, else_dest: usize },
    Return { results: Vec<ValueId> },
    Select { states: Vec<SelectState>, blocking: bool },
}

#[derive(Debug, Clone)]
pub struct Instr {
    pub id: InstrId,
    pub pos: Pos,
    pub result: Option<ValueId>,
    pub kind: InstrKind,
}

impl Instr {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::Jump { .. } | InstrKind::If { .. } | InstrKind::Return { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub index: usize,
    /// Lowering tag (`entry`, `for.loop`, `for.body`, `for.done`,
    /// `cond.true`, `cond.false`, …); empty if untagged.
    pub comment: String,
    pub instrs: Vec<Instr>,
    pub preds: Vec<usize>,
    pub succs: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub recv: Option<TypeId>,
    pub params: Vec<TypeId>,
    pub results: Vec<TypeId>,
    pub variadic: bool,
}

#[derive(Debug)]
pub struct Function {
    pub id: FuncId,
    /// Short name inside the package (`main`, `main$1`, `Send`).
    pub name: String,
    pub pkg: Option<PkgId>,
    pub sig: Signature,
    pub params: Vec<ValueId>,
    pub free_vars: Vec<ValueId>,
    pub blocks: Vec<BasicBlock>,
    pub pos: Pos,
}

impl Function {
    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }
}

#[derive(Debug)]
pub struct Package {
    pub id: PkgId,
    pub name: String,
    pub path: String,
    pub globals: Vec<ValueId>,
    pub funcs: Vec<FuncId>,
}

/// A whole SSA program.
#[derive(Debug, Default)]
pub struct Program {
    pub types: TypeTable,
    pub packages: Vec<Package>,
    pub funcs: Vec<Function>,
    values: Vec<ValueData>,
    const_intern: HashMap<String, ValueId>,
    /// Method sets: (named receiver type, method name) → function.
    pub methods: HashMap<(TypeId, String), FuncId>,
    func_values: HashMap<FuncId, ValueId>,
    referrers: HashMap<ValueId, Vec<InstrRef>>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.0 as usize]
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.0 as usize]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.0 as usize]
    }

    pub fn package(&self, id: PkgId) -> &Package {
        &self.packages[id.0 as usize]
    }

    pub fn block(&self, r: BlockRef) -> &BasicBlock {
        &self.func(r.func).blocks[r.block]
    }

    pub fn instr(&self, r: InstrRef) -> &Instr {
        &self.func(r.func).blocks[r.block].instrs[r.index]
    }

    pub fn add_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(data);
        id
    }

    pub fn set_value_type(&mut self, id: ValueId, ty: TypeId) {
        self.values[id.0 as usize].ty = ty;
    }

    pub fn set_value_def(&mut self, id: ValueId, def: InstrRef) {
        self.values[id.0 as usize].kind = ValueKind::Register { def };
    }

    /// Interns a constant by its textual form, e.g. `1:int`. Constants
    /// with identical syntactic form share one value.
    pub fn intern_const(&mut self, name: String, ty: TypeId, value: ConstValue) -> ValueId {
        if let Some(&id) = self.const_intern.get(&name) {
            return id;
        }
        let id = self.add_value(ValueData {
            name: name.clone(),
            ty,
            pos: Pos::NONE,
            kind: ValueKind::Const(value),
        });
        self.const_intern.insert(name, id);
        id
    }

    /// Registers the value standing for a function reference.
    pub fn set_func_value(&mut self, f: FuncId, v: ValueId) {
        self.func_values.insert(f, v);
    }

    /// The value standing for a function reference, if one was created.
    pub fn func_value(&self, f: FuncId) -> Option<ValueId> {
        self.func_values.get(&f).copied()
    }

    /// The defining instruction of a register, if the value is one.
    pub fn def_instr(&self, id: ValueId) -> Option<&Instr> {
        match &self.value(id).kind {
            ValueKind::Register { def } => Some(self.instr(*def)),
            _ => None,
        }
    }

    /// Block in which a register is defined.
    pub fn def_block(&self, id: ValueId) -> Option<BlockRef> {
        match &self.value(id).kind {
            ValueKind::Register { def } => {
                Some(BlockRef { func: def.func, block: def.block })
            }
            _ => None,
        }
    }

    pub fn is_nil_const(&self, id: ValueId) -> bool {
        matches!(&self.value(id).kind, ValueKind::Const(ConstValue::Nil))
    }

    pub fn int_const(&self, id: ValueId) -> Option<i64> {
        match &self.value(id).kind {
            ValueKind::Const(ConstValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// Qualified function name, `pkg.name`.
    pub fn qualified_name(&self, id: FuncId) -> String {
        let f = self.func(id);
        match f.pkg {
            Some(p) => format!("{}.{}", self.package(p).name, f.name),
            None => f.name.clone(),
        }
    }

    pub fn lookup_method(&self, recv: TypeId, name: &str) -> Option<FuncId> {
        self.methods.get(&(recv, name.to_string())).copied()
    }

    /// Instructions that use `v` as an operand.
    pub fn referrers(&self, v: ValueId) -> &[InstrRef] {
        self.referrers.get(&v).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recomputes block predecessor/successor lists from terminators and
    /// the referrers table. Called once by the builder after parsing.
    pub fn finalize(&mut self) {
        for f in &mut self.funcs {
            let mut succs: Vec<Vec<usize>> = vec![Vec::new(); f.blocks.len()];
            for b in &f.blocks {
                if let Some(term) = b.instrs.last() {
                    match &term.kind {
                        InstrKind::Jump { target } => succs[b.index].push(*target),
                        InstrKind::If { then_dest, else_dest, .. } => {
                            succs[b.index].push(*then_dest);
                            succs[b.index].push(*else_dest);
                        }
                        _ => {}
                    }
                }
            }
            let mut preds: Vec<Vec<usize>> = vec![Vec::new(); f.blocks.len()];
            for (i, ss) in succs.iter().enumerate() {
                for &s in ss {
                    preds[s].push(i);
                }
            }
            for b in &mut f.blocks {
                b.succs = std::mem::take(&mut succs[b.index]);
                b.preds = std::mem::take(&mut preds[b.index]);
            }
        }

        let mut refs: HashMap<ValueId, Vec<InstrRef>> = HashMap::new();
        for f in &self.funcs {
            for b in &f.blocks {
                for (i, instr) in b.instrs.iter().enumerate() {
                    let site = InstrRef { func: f.id, block: b.index, index: i };
                    let mut operands = Vec::new();
                    instr.kind.operands(&mut operands);
                    for v in operands {
                        refs.entry(v).or_default().push(site);
                    }
                }
            }
        }
        self.referrers = refs;
    }
}

impl InstrKind {
    /// Collects value operands of the instruction.
    pub fn operands(&self, out: &mut Vec<ValueId>) {
        match self {
            InstrKind::Alloc { .. } | InstrKind::Jump { .. } => {}
            InstrKind::MakeChan { size } => out.push(*size),
            InstrKind::MakeClosure { bindings, .. } => out.extend(bindings),
            InstrKind::MakeInterface { x }
            | InstrKind::TypeAssert { x }
            | InstrKind::ChangeType { x }
            | InstrKind::Slice { x }
            | InstrKind::FieldAddr { x, .. }
            | InstrKind::UnOp { x, .. } => out.push(*x),
            InstrKind::BinOp { x, y, .. } => {
                out.push(*x);
                out.push(*y);
            }
            InstrKind::Phi { edges } => out.extend(edges),
            InstrKind::Extract { tuple, .. } => out.push(*tuple),
            InstrKind::Call(c) | InstrKind::Go(c) => {
                match &c.callee {
                    Callee::Value(v) => out.push(*v),
                    Callee::Invoke { recv, .. } => out.push(*recv),
                }
                out.extend(&c.args);
            }
            InstrKind::Send { chan, val } => {
                out.push(*chan);
                out.push(*val);
            }
            InstrKind::Store { addr, val } => {
                out.push(*addr);
                out.push(*val);
            }
            InstrKind::If { cond, .. } => out.push(*cond),
            InstrKind::Return { results } => out.extend(results),
            InstrKind::Select { states, .. } => {
                for s in states {
                    out.push(s.chan);
                    if let Some(v) = s.send {
                        out.push(v);
                    }
                }
            }
        }
    }
}
