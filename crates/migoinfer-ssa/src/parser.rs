//! Recursive-descent parser for the textual SSA format.
//!
//! Parsing is done in three passes over the token stream: named types are
//! declared first (so type bodies and signatures may refer forward), then
//! all declarations (type bodies, globals, function signatures) are
//! parsed, and finally function bodies. Register result types are
//! resolved by a small worklist, because φ-nodes may refer to registers
//! defined later in the body (back edges).

use std::collections::HashMap;
use std::ops::Range;

use thiserror::Error;

use crate::lexer::{lex, SpannedToken, Token};
use crate::program::{
    BasicBlock, Builtin, Callee, CallCommon, ConstValue, FuncId, Function, Instr, InstrId,
    InstrKind, InstrRef, Package, PkgId, Program, SelectState, Signature, UnOpKind, ValueData,
    ValueId, ValueKind,
};
use crate::program::BinOpKind;
use crate::source::Pos;
use crate::types::{ChanDir, MethodSig, StructField, TypeId, TypeKind};

/// Parse error with the byte span (file-local) it was raised at.
#[derive(Debug, Error)]
#[error("{msg}")]
pub struct ParseError {
    pub msg: String,
    pub span: Range<usize>,
}

type Result<T> = std::result::Result<T, ParseError>;

struct FuncScope {
    id: FuncId,
    /// Parameter and free-variable names to values.
    locals: HashMap<String, ValueId>,
    /// Token index of the first body line (after the signature).
    body_start: usize,
}

pub struct Parser<'a> {
    toks: Vec<SpannedToken>,
    pos: usize,
    base: u32,
    prog: &'a mut Program,
    pkg: Option<PkgId>,
    funcs: HashMap<String, FuncId>,
    func_values: HashMap<FuncId, ValueId>,
    globals: HashMap<String, ValueId>,
    builtins: HashMap<&'static str, ValueId>,
    scopes: Vec<FuncScope>,
    next_instr: u32,
}

impl<'a> Parser<'a> {
    pub fn new(src: &str, base: u32, prog: &'a mut Program) -> Result<Parser<'a>> {
        let toks = lex(src).map_err(|span| ParseError {
            msg: "unrecognised character".to_string(),
            span,
        })?;
        // Instruction ids continue across files.
        let next_instr = prog
            .funcs
            .iter()
            .flat_map(|f| &f.blocks)
            .flat_map(|b| &b.instrs)
            .map(|i| i.id.0 + 1)
            .max()
            .unwrap_or(0);
        Ok(Parser {
            toks,
            pos: 0,
            base,
            prog,
            pkg: None,
            funcs: HashMap::new(),
            func_values: HashMap::new(),
            globals: HashMap::new(),
            builtins: HashMap::new(),
            scopes: Vec::new(),
            next_instr,
        })
    }

    /// Parses the whole file into the program.
    pub fn parse(mut self) -> Result<()> {
        self.declare_types()?;
        self.parse_decls()?;
        let scopes = std::mem::take(&mut self.scopes);
        for scope in scopes {
            self.parse_body(scope)?;
        }
        Ok(())
    }

    // ---- token helpers ----

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn peek2(&self) -> Option<&Token> {
        self.toks.get(self.pos + 1).map(|(t, _)| t)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.toks.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn span(&self) -> Range<usize> {
        self.toks
            .get(self.pos.min(self.toks.len().saturating_sub(1)))
            .map(|(_, s)| s.clone())
            .unwrap_or(0..0)
    }

    fn here(&self) -> Pos {
        Pos(self.base + self.span().start as u32)
    }

    fn err<T>(&self, msg: impl Into<String>) -> Result<T> {
        Err(ParseError { msg: msg.into(), span: self.span() })
    }

    fn expect(&mut self, want: &Token) -> Result<()> {
        match self.peek() {
            Some(t) if t == want => {
                self.pos += 1;
                Ok(())
            }
            other => {
                let msg = format!("expected {:?}, found {:?}", want, other);
                self.err(msg)
            }
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::Ident(s)) => Ok(s),
            other => {
                self.pos = self.pos.saturating_sub(1);
                self.err(format!("expected identifier, found {:?}", other))
            }
        }
    }

    fn expect_int(&mut self) -> Result<i64> {
        match self.bump() {
            Some(Token::Int(n)) => Ok(n),
            other => {
                self.pos = self.pos.saturating_sub(1);
                self.err(format!("expected integer, found {:?}", other))
            }
        }
    }

    fn eat(&mut self, want: &Token) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if let Some(Token::Ident(s)) = self.peek() {
            if s == kw {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn at_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == kw)
    }

    fn expect_kw(&mut self, kw: &str) -> Result<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            self.err(format!("expected `{}`", kw))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn end_line(&mut self) -> Result<()> {
        if self.peek().is_none() || self.eat(&Token::Newline) {
            Ok(())
        } else {
            self.err(format!("expected end of line, found {:?}", self.peek()))
        }
    }

    fn skip_line(&mut self) {
        while let Some(t) = self.bump() {
            if t == Token::Newline {
                break;
            }
        }
    }

    // ---- pass 0: named type declaration ----

    fn declare_types(&mut self) -> Result<()> {
        let save = self.pos;
        loop {
            self.skip_newlines();
            if self.peek().is_none() {
                break;
            }
            if self.at_kw("type") {
                self.pos += 1;
                let name = self.expect_ident()?;
                self.prog.types.declare_named(&name);
            }
            self.skip_line();
        }
        self.pos = save;
        Ok(())
    }

    // ---- pass 1: declarations ----

    fn parse_decls(&mut self) -> Result<()> {
        loop {
            self.skip_newlines();
            if self.peek().is_none() {
                break;
            }
            if self.eat_kw("package") {
                let name = self.expect_ident()?;
                self.end_line()?;
                // Several files may contribute to one package.
                let id = match self.prog.packages.iter().find(|p| p.name == name) {
                    Some(p) => p.id,
                    None => {
                        let id = PkgId(self.prog.packages.len() as u32);
                        self.prog.packages.push(Package {
                            id,
                            name: name.clone(),
                            path: name,
                            globals: Vec::new(),
                            funcs: Vec::new(),
                        });
                        id
                    }
                };
                self.pkg = Some(id);
            } else if self.eat_kw("type") {
                self.parse_type_decl()?;
            } else if self.eat_kw("var") {
                self.parse_var_decl()?;
            } else if self.eat_kw("func") {
                self.parse_func_sig()?;
                self.skip_func_body();
            } else {
                // Function body line; skipped in this pass.
                self.skip_line();
            }
        }
        Ok(())
    }

    fn parse_type_decl(&mut self) -> Result<()> {
        let name = self.expect_ident()?;
        let id = self.prog.types.lookup_named(&name).expect("declared in pass 0");
        let underlying = if self.at_kw("struct") {
            self.pos += 1;
            self.parse_struct_body()?
        } else if self.at_kw("interface") {
            self.pos += 1;
            self.parse_interface_body()?
        } else {
            self.parse_type()?
        };
        self.prog.types.define_named(id, underlying);
        self.end_line()
    }

    fn parse_struct_body(&mut self) -> Result<TypeId> {
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        loop {
            if self.eat(&Token::RBrace) {
                break;
            }
            let name = self.expect_ident()?;
            let ty = self.parse_type()?;
            fields.push(StructField { name, ty });
            if !self.eat(&Token::Semi) {
                self.expect(&Token::RBrace)?;
                break;
            }
        }
        Ok(self.prog.types.intern(TypeKind::Struct { fields }))
    }

    fn parse_interface_body(&mut self) -> Result<TypeId> {
        self.expect(&Token::LBrace)?;
        let mut methods = Vec::new();
        loop {
            if self.eat(&Token::RBrace) {
                break;
            }
            let name = self.expect_ident()?;
            let params = self.parse_type_list()?;
            let results = if self.peek() == Some(&Token::LParen) {
                self.parse_type_list()?
            } else {
                Vec::new()
            };
            methods.push(MethodSig { name, params, results });
            if !self.eat(&Token::Semi) {
                self.expect(&Token::RBrace)?;
                break;
            }
        }
        Ok(self.prog.types.intern(TypeKind::Interface { methods }))
    }

    fn parse_type_list(&mut self) -> Result<Vec<TypeId>> {
        self.expect(&Token::LParen)?;
        let mut tys = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                tys.push(self.parse_type()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(tys)
    }

    fn parse_type(&mut self) -> Result<TypeId> {
        match self.peek().cloned() {
            Some(Token::Arrow) => {
                self.pos += 1;
                self.expect_kw("chan")?;
                let elem = self.parse_type()?;
                Ok(self.prog.types.intern(TypeKind::Chan { dir: ChanDir::RecvOnly, elem }))
            }
            Some(Token::Star) => {
                self.pos += 1;
                let elem = self.parse_type()?;
                Ok(self.prog.types.intern(TypeKind::Pointer { elem }))
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                self.expect(&Token::RBracket)?;
                let elem = self.parse_type()?;
                Ok(self.prog.types.intern(TypeKind::Slice { elem }))
            }
            Some(Token::Ident(s)) => match s.as_str() {
                "chan" => {
                    self.pos += 1;
                    let dir = if self.eat(&Token::Arrow) {
                        ChanDir::SendOnly
                    } else {
                        ChanDir::Both
                    };
                    let elem = self.parse_type()?;
                    Ok(self.prog.types.intern(TypeKind::Chan { dir, elem }))
                }
                "int" => {
                    self.pos += 1;
                    Ok(self.prog.types.intern(TypeKind::Int))
                }
                "bool" => {
                    self.pos += 1;
                    Ok(self.prog.types.intern(TypeKind::Bool))
                }
                "string" => {
                    self.pos += 1;
                    Ok(self.prog.types.intern(TypeKind::Str))
                }
                "func" => {
                    self.pos += 1;
                    let params = self.parse_type_list()?;
                    let results = if self.peek() == Some(&Token::LParen) {
                        self.parse_type_list()?
                    } else {
                        Vec::new()
                    };
                    Ok(self.prog.types.intern(TypeKind::Func { params, results }))
                }
                _ => {
                    self.pos += 1;
                    match self.prog.types.lookup_named(&s) {
                        Some(id) => Ok(id),
                        None => self.err(format!("unknown type `{}`", s)),
                    }
                }
            },
            other => self.err(format!("expected type, found {:?}", other)),
        }
    }

    fn parse_var_decl(&mut self) -> Result<()> {
        let name = self.expect_ident()?;
        let pos = self.here();
        let ty = self.parse_type()?;
        self.end_line()?;
        let pkg = self.pkg.ok_or_else(|| ParseError {
            msg: "`var` before `package`".to_string(),
            span: self.span(),
        })?;
        // A global is an address; loads yield the declared type.
        let ptr = self.prog.types.intern(TypeKind::Pointer { elem: ty });
        let v = self.prog.add_value(ValueData {
            name: name.clone(),
            ty: ptr,
            pos,
            kind: ValueKind::Global { pkg },
        });
        self.prog.packages[pkg.0 as usize].globals.push(v);
        self.globals.insert(name, v);
        Ok(())
    }

    fn parse_func_sig(&mut self) -> Result<()> {
        let pos = self.here();
        // Optional receiver: `func (t T) Name(...)`.
        let recv = if self.eat(&Token::LParen) {
            let rname = self.expect_ident()?;
            let rty = self.parse_type()?;
            self.expect(&Token::RParen)?;
            Some((rname, rty))
        } else {
            None
        };
        let name = self.expect_ident()?;
        let id = FuncId(self.prog.funcs.len() as u32);

        let mut locals = HashMap::new();
        let mut params = Vec::new();
        let mut param_tys = Vec::new();
        if let Some((rname, rty)) = &recv {
            let v = self.prog.add_value(ValueData {
                name: rname.clone(),
                ty: *rty,
                pos,
                kind: ValueKind::Param { func: id, index: 0 },
            });
            locals.insert(rname.clone(), v);
            params.push(v);
            param_tys.push(*rty);
        }
        self.expect(&Token::LParen)?;
        if !self.eat(&Token::RParen) {
            loop {
                let pname = self.expect_ident()?;
                let pty = self.parse_type()?;
                let v = self.prog.add_value(ValueData {
                    name: pname.clone(),
                    ty: pty,
                    pos,
                    kind: ValueKind::Param { func: id, index: params.len() },
                });
                locals.insert(pname, v);
                params.push(v);
                param_tys.push(pty);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }

        let mut free_vars = Vec::new();
        if self.eat(&Token::LBracket) {
            loop {
                let fname = self.expect_ident()?;
                let fty = self.parse_type()?;
                let v = self.prog.add_value(ValueData {
                    name: fname.clone(),
                    ty: fty,
                    pos,
                    kind: ValueKind::FreeVar { func: id, index: free_vars.len() },
                });
                locals.insert(fname, v);
                free_vars.push(v);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RBracket)?;
        }

        let results = if self.peek() == Some(&Token::LParen) {
            self.parse_type_list()?
        } else {
            Vec::new()
        };
        self.expect(&Token::Colon)?;
        self.end_line()?;

        let pkg = self.pkg;
        let recv_ty = recv.as_ref().map(|(_, t)| *t);
        self.prog.funcs.push(Function {
            id,
            name: name.clone(),
            pkg,
            sig: Signature { recv: recv_ty, params: param_tys, results, variadic: false },
            params,
            free_vars,
            blocks: Vec::new(),
            pos,
        });
        if let Some(p) = pkg {
            self.prog.packages[p.0 as usize].funcs.push(id);
        }

        let key = match recv_ty {
            Some(rt) => {
                self.prog.methods.insert((rt, name.clone()), id);
                format!("{}.{}", self.prog.types.render(rt), name)
            }
            None => name,
        };
        if self.funcs.insert(key.clone(), id).is_some() {
            return self.err(format!("duplicate function `{}`", key));
        }
        self.scopes.push(FuncScope { id, locals, body_start: self.pos });
        Ok(())
    }

    fn skip_func_body(&mut self) {
        loop {
            self.skip_newlines();
            match self.peek() {
                None => break,
                Some(Token::Ident(s))
                    if matches!(s.as_str(), "func" | "type" | "var" | "package") =>
                {
                    break
                }
                _ => self.skip_line(),
            }
        }
    }

    // ---- pass 2: function bodies ----

    fn parse_body(&mut self, scope: FuncScope) -> Result<()> {
        self.pos = scope.body_start;
        let fid = scope.id;
        let mut locals = scope.locals;

        // Scan ahead for register definitions and block headers so that
        // forward references (φ back edges) resolve.
        let save = self.pos;
        let mut nblocks = 0usize;
        loop {
            self.skip_newlines();
            match self.peek().cloned() {
                None => break,
                Some(Token::Ident(s))
                    if matches!(s.as_str(), "func" | "type" | "var" | "package") =>
                {
                    break
                }
                Some(Token::Int(_)) => {
                    nblocks += 1;
                    self.skip_line();
                }
                Some(Token::Ident(name)) if self.peek2() == Some(&Token::Assign) => {
                    if !locals.contains_key(&name) {
                        let unit = self.prog.types.intern(TypeKind::Unit);
                        let v = self.prog.add_value(ValueData {
                            name: name.clone(),
                            ty: unit,
                            pos: self.here(),
                            kind: ValueKind::Register {
                                def: InstrRef { func: fid, block: 0, index: 0 },
                            },
                        });
                        locals.insert(name, v);
                    }
                    self.skip_line();
                }
                _ => self.skip_line(),
            }
        }
        self.pos = save;

        if nblocks == 0 {
            return Ok(()); // Body-less function (signature only).
        }

        let mut blocks: Vec<BasicBlock> = Vec::new();
        let mut unresolved: Vec<(ValueId, InstrRef)> = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek().cloned() {
                None => break,
                Some(Token::Ident(s))
                    if matches!(s.as_str(), "func" | "type" | "var" | "package") =>
                {
                    break
                }
                Some(Token::Int(idx)) => {
                    self.pos += 1;
                    let mut comment = String::new();
                    if let Some(Token::Ident(_)) = self.peek() {
                        comment = self.expect_ident()?;
                        while self.eat(&Token::Dot) {
                            comment.push('.');
                            comment.push_str(&self.expect_ident()?);
                        }
                    }
                    self.expect(&Token::Colon)?;
                    self.end_line()?;
                    if idx as usize != blocks.len() {
                        return self.err(format!(
                            "block index {} out of order (expected {})",
                            idx,
                            blocks.len()
                        ));
                    }
                    blocks.push(BasicBlock {
                        index: idx as usize,
                        comment,
                        instrs: Vec::new(),
                        preds: Vec::new(),
                        succs: Vec::new(),
                    });
                }
                Some(_) => {
                    if blocks.is_empty() {
                        return self.err("instruction before first block header");
                    }
                    let block = blocks.len() - 1;
                    let index = blocks[block].instrs.len();
                    let site = InstrRef { func: fid, block, index };
                    let instr = self.parse_instr(fid, &locals, site, &mut unresolved)?;
                    blocks.last_mut().unwrap().instrs.push(instr);
                }
            }
        }

        self.prog.func_mut(fid).blocks = blocks;
        self.resolve_types(fid, unresolved)
    }

    /// Parses one instruction line.
    fn parse_instr(
        &mut self,
        fid: FuncId,
        locals: &HashMap<String, ValueId>,
        site: InstrRef,
        unresolved: &mut Vec<(ValueId, InstrRef)>,
    ) -> Result<Instr> {
        let pos = self.here();
        let id = InstrId(self.next_instr);
        self.next_instr += 1;

        // `name = <rvalue>` or a bare (result-less) instruction.
        let result = if matches!(self.peek(), Some(Token::Ident(_)))
            && self.peek2() == Some(&Token::Assign)
        {
            let name = self.expect_ident()?;
            self.expect(&Token::Assign)?;
            let v = locals[&name];
            self.prog.set_value_def(v, site);
            Some(v)
        } else {
            None
        };

        let (kind, eager_ty) = self.parse_instr_kind(fid, locals, result.is_some())?;
        self.end_line()?;

        match (result, eager_ty) {
            (Some(v), Some(ty)) => self.prog.set_value_type(v, ty),
            (Some(v), None) => unresolved.push((v, site)),
            _ => {}
        }
        Ok(Instr { id, pos, result, kind })
    }

    /// Parses the instruction after an optional `name =`. The second
    /// component is the declared result type for instructions that state
    /// it syntactically (makechan, makeiface, typeassert, changetype,
    /// alloc); all other result types are inferred afterwards.
    fn parse_instr_kind(
        &mut self,
        _fid: FuncId,
        locals: &HashMap<String, ValueId>,
        has_result: bool,
    ) -> Result<(InstrKind, Option<TypeId>)> {
        let kw = match self.peek() {
            Some(Token::Ident(s)) => s.clone(),
            // A binary operation may start with a literal operand.
            Some(_) if has_result => String::new(),
            other => return self.err(format!("expected instruction, found {:?}", other)),
        };
        match kw.as_str() {
            "alloc" => {
                self.pos += 1;
                let ty = self.parse_type()?;
                let ptr = self.prog.types.intern(TypeKind::Pointer { elem: ty });
                Ok((InstrKind::Alloc { ty }, Some(ptr)))
            }
            "makechan" => {
                self.pos += 1;
                let ty = self.parse_type()?;
                self.expect(&Token::Comma)?;
                let size = self.parse_operand(locals)?;
                Ok((InstrKind::MakeChan { size }, Some(ty)))
            }
            "makeclosure" => {
                self.pos += 1;
                let fname = self.expect_ident()?;
                let func = match self.funcs.get(&fname) {
                    Some(&f) => f,
                    None => return self.err(format!("unknown function `{}`", fname)),
                };
                let mut bindings = Vec::new();
                self.expect(&Token::LBracket)?;
                if !self.eat(&Token::RBracket) {
                    loop {
                        bindings.push(self.parse_operand(locals)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RBracket)?;
                }
                // Materialise the function value so closures can also be
                // looked up by their underlying function later.
                self.function_value(func);
                Ok((InstrKind::MakeClosure { func, bindings }, None))
            }
            "makeiface" => {
                self.pos += 1;
                let x = self.parse_operand(locals)?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                Ok((InstrKind::MakeInterface { x }, Some(ty)))
            }
            "typeassert" => {
                self.pos += 1;
                let x = self.parse_operand(locals)?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                Ok((InstrKind::TypeAssert { x }, Some(ty)))
            }
            "changetype" => {
                self.pos += 1;
                let x = self.parse_operand(locals)?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                Ok((InstrKind::ChangeType { x }, Some(ty)))
            }
            "slice" => {
                self.pos += 1;
                let x = self.parse_operand(locals)?;
                Ok((InstrKind::Slice { x }, None))
            }
            "fieldaddr" => {
                self.pos += 1;
                let x = self.parse_operand(locals)?;
                self.expect(&Token::Comma)?;
                let field = self.expect_int()? as usize;
                Ok((InstrKind::FieldAddr { x, field }, None))
            }
            "load" => {
                self.pos += 1;
                let x = self.parse_operand(locals)?;
                Ok((InstrKind::UnOp { op: UnOpKind::Mul, x }, None))
            }
            "recv" => {
                self.pos += 1;
                let x = self.parse_operand(locals)?;
                Ok((InstrKind::UnOp { op: UnOpKind::Arrow, x }, None))
            }
            "send" => {
                self.pos += 1;
                let chan = self.parse_operand(locals)?;
                self.expect(&Token::Comma)?;
                let val = self.parse_operand(locals)?;
                Ok((InstrKind::Send { chan, val }, None))
            }
            "store" => {
                self.pos += 1;
                let addr = self.parse_operand(locals)?;
                self.expect(&Token::Comma)?;
                let val = self.parse_operand(locals)?;
                Ok((InstrKind::Store { addr, val }, None))
            }
            "phi" => {
                self.pos += 1;
                self.expect(&Token::LBracket)?;
                let mut edges = Vec::new();
                loop {
                    let idx = self.expect_int()? as usize;
                    if idx != edges.len() {
                        return self.err("phi edges must be listed in order");
                    }
                    self.expect(&Token::Colon)?;
                    edges.push(self.parse_operand(locals)?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok((InstrKind::Phi { edges }, None))
            }
            "extract" => {
                self.pos += 1;
                let tuple = self.parse_operand(locals)?;
                self.expect(&Token::Comma)?;
                let index = self.expect_int()? as usize;
                Ok((InstrKind::Extract { tuple, index }, None))
            }
            "call" => {
                self.pos += 1;
                let call = self.parse_call_common(locals)?;
                Ok((InstrKind::Call(call), None))
            }
            "invoke" => {
                self.pos += 1;
                let call = self.parse_invoke(locals)?;
                Ok((InstrKind::Call(call), None))
            }
            "go" => {
                self.pos += 1;
                let call = if self.eat_kw("invoke") {
                    self.parse_invoke(locals)?
                } else {
                    self.parse_call_common(locals)?
                };
                Ok((InstrKind::Go(call), None))
            }
            "jump" => {
                self.pos += 1;
                let target = self.expect_int()? as usize;
                Ok((InstrKind::Jump { target }, None))
            }
            "if" => {
                self.pos += 1;
                let cond = self.parse_operand(locals)?;
                self.expect_kw("goto")?;
                let then_dest = self.expect_int()? as usize;
                self.expect_kw("else")?;
                let else_dest = self.expect_int()? as usize;
                Ok((InstrKind::If { cond, then_dest, else_dest }, None))
            }
            "return" => {
                self.pos += 1;
                let mut results = Vec::new();
                if !matches!(self.peek(), Some(Token::Newline) | None) {
                    loop {
                        results.push(self.parse_operand(locals)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                Ok((InstrKind::Return { results }, None))
            }
            "select" => {
                self.pos += 1;
                let blocking = if self.eat_kw("blocking") {
                    true
                } else {
                    self.expect_kw("nonblocking")?;
                    false
                };
                self.expect(&Token::LBracket)?;
                let mut states = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        let spos = self.here();
                        if self.eat_kw("recv") {
                            let chan = self.parse_operand(locals)?;
                            states.push(SelectState {
                                dir: ChanDir::RecvOnly,
                                chan,
                                send: None,
                                pos: spos,
                            });
                        } else {
                            self.expect_kw("send")?;
                            let chan = self.parse_operand(locals)?;
                            let val = self.parse_operand(locals)?;
                            states.push(SelectState {
                                dir: ChanDir::SendOnly,
                                chan,
                                send: Some(val),
                                pos: spos,
                            });
                        }
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RBracket)?;
                }
                Ok((InstrKind::Select { states, blocking }, None))
            }
            _ => {
                // Not a mnemonic: `x OP y` binary operation.
                if !has_result {
                    return self.err(format!("unknown instruction `{}`", kw));
                }
                let x = self.parse_operand(locals)?;
                let op = match self.bump() {
                    Some(Token::Plus) => BinOpKind::Add,
                    Some(Token::Minus) => BinOpKind::Sub,
                    Some(Token::Star) => BinOpKind::Mul,
                    Some(Token::Slash) => BinOpKind::Quo,
                    Some(Token::Percent) => BinOpKind::Rem,
                    Some(Token::EqEq) => BinOpKind::Eql,
                    Some(Token::Ne) => BinOpKind::Neq,
                    Some(Token::Lt) => BinOpKind::Lss,
                    Some(Token::Gt) => BinOpKind::Gtr,
                    Some(Token::Le) => BinOpKind::Leq,
                    Some(Token::Ge) => BinOpKind::Geq,
                    other => {
                        self.pos = self.pos.saturating_sub(1);
                        return self.err(format!("expected binary operator, found {:?}", other));
                    }
                };
                let y = self.parse_operand(locals)?;
                Ok((InstrKind::BinOp { op, x, y }, None))
            }
        }
    }

    fn parse_call_common(&mut self, locals: &HashMap<String, ValueId>) -> Result<CallCommon> {
        let name = self.expect_ident()?;
        // Optional `Type.Method` static method reference.
        let callee_name = if self.peek() == Some(&Token::Dot)
            && self.prog.types.lookup_named(&name).is_some()
        {
            self.pos += 1;
            let m = self.expect_ident()?;
            format!("{}.{}", name, m)
        } else {
            name
        };
        let callee = self.resolve_callee(&callee_name, locals)?;
        let args = self.parse_args(locals)?;
        Ok(CallCommon { callee: Callee::Value(callee), args })
    }

    fn parse_invoke(&mut self, locals: &HashMap<String, ValueId>) -> Result<CallCommon> {
        let recv = self.parse_operand(locals)?;
        self.expect(&Token::Dot)?;
        let method = self.expect_ident()?;
        let args = self.parse_args(locals)?;
        Ok(CallCommon { callee: Callee::Invoke { recv, method }, args })
    }

    fn parse_args(&mut self, locals: &HashMap<String, ValueId>) -> Result<Vec<ValueId>> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.parse_operand(locals)?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(args)
    }

    fn resolve_callee(&mut self, name: &str, locals: &HashMap<String, ValueId>) -> Result<ValueId> {
        if let Some(&v) = locals.get(name) {
            return Ok(v);
        }
        if let Some(&f) = self.funcs.get(name) {
            return Ok(self.function_value(f));
        }
        match name {
            "close" => Ok(self.builtin_value(Builtin::Close)),
            "print" | "println" => Ok(self.builtin_value(Builtin::Print)),
            _ => self.err(format!("unknown callee `{}`", name)),
        }
    }

    fn function_value(&mut self, f: FuncId) -> ValueId {
        if let Some(&v) = self.func_values.get(&f) {
            return v;
        }
        let (name, params, results) = {
            let fun = self.prog.func(f);
            (fun.name.clone(), fun.sig.params.clone(), fun.sig.results.clone())
        };
        let ty = self.prog.types.intern(TypeKind::Func { params, results });
        let v = self.prog.add_value(ValueData {
            name,
            ty,
            pos: Pos::NONE,
            kind: ValueKind::Function(f),
        });
        self.func_values.insert(f, v);
        self.prog.set_func_value(f, v);
        v
    }

    fn builtin_value(&mut self, b: Builtin) -> ValueId {
        if let Some(&v) = self.builtins.get(b.name()) {
            return v;
        }
        let ty = self.prog.types.intern(TypeKind::Func { params: vec![], results: vec![] });
        let v = self.prog.add_value(ValueData {
            name: b.name().to_string(),
            ty,
            pos: Pos::NONE,
            kind: ValueKind::Builtin(b),
        });
        self.builtins.insert(b.name(), v);
        v
    }

    fn parse_operand(&mut self, locals: &HashMap<String, ValueId>) -> Result<ValueId> {
        match self.peek().cloned() {
            Some(Token::Int(n)) => {
                self.pos += 1;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                let name = format!("{}:{}", n, self.prog.types.render(ty));
                Ok(self.prog.intern_const(name, ty, ConstValue::Int(n)))
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                let name = format!("{:?}:{}", s, self.prog.types.render(ty));
                Ok(self.prog.intern_const(name, ty, ConstValue::Str(s)))
            }
            Some(Token::Ident(s)) => match s.as_str() {
                "true" | "false" => {
                    self.pos += 1;
                    self.expect(&Token::Colon)?;
                    let ty = self.parse_type()?;
                    let name = format!("{}:{}", s, self.prog.types.render(ty));
                    Ok(self.prog.intern_const(name, ty, ConstValue::Bool(s == "true")))
                }
                "nil" => {
                    self.pos += 1;
                    self.expect(&Token::Colon)?;
                    let ty = self.parse_type()?;
                    let name = format!("nil:{}", self.prog.types.render(ty));
                    Ok(self.prog.intern_const(name, ty, ConstValue::Nil))
                }
                _ => {
                    self.pos += 1;
                    if let Some(&v) = locals.get(&s) {
                        return Ok(v);
                    }
                    if let Some(&v) = self.globals.get(&s) {
                        return Ok(v);
                    }
                    if let Some(&f) = self.funcs.get(&s) {
                        return Ok(self.function_value(f));
                    }
                    self.pos -= 1;
                    self.err(format!("unknown name `{}`", s))
                }
            },
            other => self.err(format!("expected operand, found {:?}", other)),
        }
    }

    // ---- typing ----

    /// Worklist type resolution for register results.
    fn resolve_types(&mut self, fid: FuncId, mut unresolved: Vec<(ValueId, InstrRef)>) -> Result<()> {
        let unit = self.prog.types.intern(TypeKind::Unit);
        let mut progress = true;
        while progress && !unresolved.is_empty() {
            progress = false;
            let mut remaining = Vec::new();
            for (v, site) in unresolved {
                match self.type_of_instr(site, unit) {
                    Some(ty) => {
                        self.prog.set_value_type(v, ty);
                        progress = true;
                    }
                    None => remaining.push((v, site)),
                }
            }
            unresolved = remaining;
        }
        if let Some(&(v, _)) = unresolved.first() {
            let name = self.prog.value(v).name.clone();
            let fname = self.prog.func(fid).name.clone();
            return Err(ParseError {
                msg: format!("cannot infer type of `{}` in function `{}`", name, fname),
                span: 0..0,
            });
        }
        Ok(())
    }

    /// The result type of an instruction, or None if operand types are not
    /// resolved yet.
    fn type_of_instr(&mut self, site: InstrRef, unit: TypeId) -> Option<TypeId> {
        let kind = self.prog.instr(site).kind.clone();
        let resolved = |p: &Program, v: ValueId| {
            let ty = p.value(v).ty;
            if ty == unit && matches!(p.value(v).kind, ValueKind::Register { .. }) {
                None
            } else {
                Some(ty)
            }
        };
        match kind {
            InstrKind::MakeClosure { func, .. } => {
                let f = self.prog.func(func);
                let (params, results) = (f.sig.params.clone(), f.sig.results.clone());
                Some(self.prog.types.intern(TypeKind::Func { params, results }))
            }
            InstrKind::Slice { x } => resolved(self.prog, x),
            InstrKind::FieldAddr { x, field } => {
                let xty = resolved(self.prog, x)?;
                let fty = self.prog.types.struct_fields(xty)?.get(field)?.ty;
                Some(self.prog.types.intern(TypeKind::Pointer { elem: fty }))
            }
            InstrKind::UnOp { op: UnOpKind::Arrow, x } => {
                let xty = resolved(self.prog, x)?;
                self.prog.types.chan_elem(xty)
            }
            InstrKind::UnOp { op: UnOpKind::Mul, x } => {
                let xty = resolved(self.prog, x)?;
                self.prog.types.pointer_elem(xty)
            }
            InstrKind::BinOp { op, x, .. } => {
                if op.is_comparison() {
                    Some(self.prog.types.intern(TypeKind::Bool))
                } else {
                    resolved(self.prog, x)
                }
            }
            InstrKind::Phi { edges } => edges.iter().find_map(|&e| resolved(self.prog, e)),
            InstrKind::Extract { tuple, index } => {
                let tty = resolved(self.prog, tuple)?;
                self.prog.types.tuple_elems(tty)?.get(index).copied()
            }
            InstrKind::Call(call) => {
                let results = self.call_results(&call)?;
                match results.len() {
                    0 => Some(unit),
                    1 => Some(results[0]),
                    _ => Some(self.prog.types.intern(TypeKind::Tuple { elems: results })),
                }
            }
            InstrKind::Select { states, .. } => {
                let int = self.prog.types.intern(TypeKind::Int);
                let boolean = self.prog.types.intern(TypeKind::Bool);
                let mut elems = vec![int, boolean];
                for s in &states {
                    if s.dir == ChanDir::RecvOnly {
                        let cty = resolved(self.prog, s.chan)?;
                        elems.push(self.prog.types.chan_elem(cty)?);
                    }
                }
                Some(self.prog.types.intern(TypeKind::Tuple { elems }))
            }
            _ => Some(unit),
        }
    }

    fn call_results(&mut self, call: &CallCommon) -> Option<Vec<TypeId>> {
        match &call.callee {
            Callee::Value(v) => match &self.prog.value(*v).kind {
                ValueKind::Function(f) => Some(self.prog.func(*f).sig.results.clone()),
                ValueKind::Builtin(_) => Some(Vec::new()),
                _ => {
                    let ty = self.prog.value(*v).ty;
                    match self.prog.types.kind(self.prog.types.underlying(ty)) {
                        TypeKind::Func { results, .. } => Some(results.clone()),
                        _ => None,
                    }
                }
            },
            Callee::Invoke { recv, method } => {
                let rty = self.prog.value(*recv).ty;
                let methods = self.prog.types.interface_methods(rty)?;
                methods.iter().find(|m| &m.name == method).map(|m| m.results.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    fn parse_src(src: &str) -> Program {
        let mut prog = Program::new();
        let parser = Parser::new(src, 0, &mut prog).unwrap();
        parser.parse().expect("parse failed");
        prog.finalize();
        prog
    }

    const SEND_RECV: &str = "\
package main

func main():
0 entry:
    t0 = makechan chan int, 0:int
    go main$1(t0)
    t1 = recv t0
    return

func main$1(ch chan int):
0 entry:
    send ch, 1:int
    return
";

    #[test]
    fn parse_send_recv_program() {
        let prog = parse_src(SEND_RECV);
        assert_eq!(2, prog.funcs.len());
        let main = &prog.funcs[0];
        assert_eq!("main", main.name);
        assert_eq!(1, main.blocks.len());
        assert_eq!(4, main.blocks[0].instrs.len());
        assert_eq!("main.main", prog.qualified_name(main.id));
        // makechan result register is chan-typed.
        let t0 = main.blocks[0].instrs[0].result.unwrap();
        assert!(prog.types.is_chan(prog.value(t0).ty));
        // recv result is int-typed.
        let t1 = main.blocks[0].instrs[2].result.unwrap();
        assert_eq!("int", prog.types.render(prog.value(t1).ty));
    }

    #[test]
    fn phi_back_edge_types_resolve() {
        let prog = parse_src(
            "package main\n\nfunc main():\n0 entry:\n    jump 1\n1 for.loop:\n    t0 = phi [0: 0:int, 1: t1]\n    t1 = t0 + 1:int\n    t2 = t0 < 10:int\n    if t2 goto 2 else 3\n2 for.body:\n    jump 1\n3 for.done:\n    return\n",
        );
        let f = &prog.funcs[0];
        let t0 = f.blocks[1].instrs[0].result.unwrap();
        assert_eq!("int", prog.types.render(prog.value(t0).ty));
        let t2 = f.blocks[1].instrs[2].result.unwrap();
        assert_eq!("bool", prog.types.render(prog.value(t2).ty));
        // preds/succs wired from terminators.
        assert_eq!(vec![0, 2], f.blocks[1].preds);
        assert_eq!(vec![2, 3], f.blocks[1].succs);
    }

    #[test]
    fn methods_are_registered() {
        let prog = parse_src(
            "package main\n\ntype T struct { ch chan int }\ntype Sender interface { Send(int) }\n\nfunc (t T) Send(x int):\n0 entry:\n    return\n\nfunc main():\n0 entry:\n    return\n",
        );
        let t = prog.types.lookup_named("T").unwrap();
        assert!(prog.lookup_method(t, "Send").is_some());
        assert!(prog.types.is_interface(prog.types.lookup_named("Sender").unwrap()));
    }

    #[test]
    fn select_result_is_tuple() {
        let prog = parse_src(
            "package main\n\nfunc main(ch chan int):\n0 entry:\n    t0 = select nonblocking [recv ch]\n    t1 = extract t0, 0\n    t2 = t1 == 0:int\n    if t2 goto 1 else 2\n1 select.body:\n    t3 = extract t0, 2\n    jump 2\n2 select.done:\n    return\n",
        );
        let f = &prog.funcs[0];
        let t1 = f.blocks[0].instrs[1].result.unwrap();
        assert_eq!("int", prog.types.render(prog.value(t1).ty));
        let t3 = f.blocks[1].instrs[0].result.unwrap();
        assert_eq!("int", prog.types.render(prog.value(t3).ty));
    }

    #[test]
    fn referrers_track_tuple_extracts() {
        let prog = parse_src(
            "package main\n\nfunc pair() (chan int, chan int):\n0 entry:\n    t0 = makechan chan int, 0:int\n    t1 = makechan chan int, 0:int\n    return t0, t1\n\nfunc main():\n0 entry:\n    t0 = call pair()\n    t1 = extract t0, 0\n    t2 = extract t0, 1\n    return\n",
        );
        let main = &prog.funcs[1];
        let t0 = main.blocks[0].instrs[0].result.unwrap();
        assert_eq!(2, prog.referrers(t0).len());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let mut prog = Program::new();
        let parser =
            Parser::new("package main\n\nfunc main():\n0 entry:\n    send nope, 1:int\n", 0, &mut prog)
                .unwrap();
        assert!(parser.parse().is_err());
    }
}
