//! Interned type table.
//!
//! Structural type kinds are interned so identical shapes share one
//! [`TypeId`]; named types are registered by name and may be patched after
//! creation to support recursive definitions. Structural identity is id
//! equality after peeling names.

use std::collections::HashMap;
use std::fmt::Write as _;

/// Id of an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Channel directions. `Both` is an ordinary bidirectional channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    Both,
    SendOnly,
    RecvOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
}

/// Method signature inside an interface type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<TypeId>,
    pub results: Vec<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int,
    Bool,
    Str,
    Unit,
    Chan { dir: ChanDir, elem: TypeId },
    Pointer { elem: TypeId },
    Slice { elem: TypeId },
    Struct { fields: Vec<StructField> },
    Interface { methods: Vec<MethodSig> },
    Func { params: Vec<TypeId>, results: Vec<TypeId> },
    Tuple { elems: Vec<TypeId> },
    Named { name: String, underlying: TypeId },
}

/// The program-wide type table.
#[derive(Debug, Default)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    interned: HashMap<TypeKind, TypeId>,
    named: HashMap<String, TypeId>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.0 as usize]
    }

    /// Interns a structural type kind. Named kinds must go through
    /// [`TypeTable::declare_named`].
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        debug_assert!(!matches!(kind, TypeKind::Named { .. }));
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    /// Declares a named type with a placeholder underlying type, so that
    /// recursive definitions can refer to it before its body is known.
    pub fn declare_named(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.named.get(name) {
            return id;
        }
        let unit = self.intern(TypeKind::Unit);
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(TypeKind::Named { name: name.to_string(), underlying: unit });
        self.named.insert(name.to_string(), id);
        id
    }

    /// Patches the underlying type of a declared named type.
    pub fn define_named(&mut self, id: TypeId, underlying: TypeId) {
        match &mut self.kinds[id.0 as usize] {
            TypeKind::Named { underlying: u, .. } => *u = underlying,
            _ => panic!("define_named on non-named type"),
        }
    }

    pub fn lookup_named(&self, name: &str) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    /// Peels named types down to the structural kind.
    pub fn underlying(&self, mut id: TypeId) -> TypeId {
        while let TypeKind::Named { underlying, .. } = self.kind(id) {
            id = *underlying;
        }
        id
    }

    /// Structural identity: equal after peeling names.
    pub fn identical(&self, a: TypeId, b: TypeId) -> bool {
        self.underlying(a) == self.underlying(b)
    }

    /// A channel, or a pointer to a channel.
    pub fn is_chan(&self, id: TypeId) -> bool {
        match self.kind(self.underlying(id)) {
            TypeKind::Chan { .. } => true,
            TypeKind::Pointer { elem } => {
                matches!(self.kind(self.underlying(*elem)), TypeKind::Chan { .. })
            }
            _ => false,
        }
    }

    /// Element type of a channel (through one pointer).
    pub fn chan_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(self.underlying(id)) {
            TypeKind::Chan { elem, .. } => Some(*elem),
            TypeKind::Pointer { elem } => match self.kind(self.underlying(*elem)) {
                TypeKind::Chan { elem, .. } => Some(*elem),
                _ => None,
            },
            _ => None,
        }
    }

    /// A struct, or a pointer to a struct.
    pub fn is_struct(&self, id: TypeId) -> bool {
        self.struct_fields(id).is_some()
    }

    /// Fields of a struct type (through one pointer).
    pub fn struct_fields(&self, id: TypeId) -> Option<&[StructField]> {
        match self.kind(self.underlying(id)) {
            TypeKind::Struct { fields } => Some(fields),
            TypeKind::Pointer { elem } => match self.kind(self.underlying(*elem)) {
                TypeKind::Struct { fields } => Some(fields),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        matches!(self.kind(self.underlying(id)), TypeKind::Interface { .. })
    }

    pub fn interface_methods(&self, id: TypeId) -> Option<&[MethodSig]> {
        match self.kind(self.underlying(id)) {
            TypeKind::Interface { methods } => Some(methods),
            _ => None,
        }
    }

    pub fn pointer_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(self.underlying(id)) {
            TypeKind::Pointer { elem } => Some(*elem),
            _ => None,
        }
    }

    pub fn tuple_elems(&self, id: TypeId) -> Option<&[TypeId]> {
        match self.kind(self.underlying(id)) {
            TypeKind::Tuple { elems } => Some(elems),
            _ => None,
        }
    }

    /// Renders a type for diagnostics and constant names.
    pub fn render(&self, id: TypeId) -> String {
        let mut s = String::new();
        self.render_into(id, &mut s);
        s
    }

    fn render_into(&self, id: TypeId, out: &mut String) {
        match self.kind(id) {
            TypeKind::Int => out.push_str("int"),
            TypeKind::Bool => out.push_str("bool"),
            TypeKind::Str => out.push_str("string"),
            TypeKind::Unit => out.push_str("()"),
            TypeKind::Chan { dir, elem } => {
                match dir {
                    ChanDir::Both => out.push_str("chan "),
                    ChanDir::SendOnly => out.push_str("chan<- "),
                    ChanDir::RecvOnly => out.push_str("<-chan "),
                }
                self.render_into(*elem, out);
            }
            TypeKind::Pointer { elem } => {
                out.push('*');
                self.render_into(*elem, out);
            }
            TypeKind::Slice { elem } => {
                out.push_str("[]");
                self.render_into(*elem, out);
            }
            TypeKind::Struct { fields } => {
                out.push_str("struct{");
                for (i, f) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    let _ = write!(out, "{} ", f.name);
                    self.render_into(f.ty, out);
                }
                out.push('}');
            }
            TypeKind::Interface { methods } => {
                out.push_str("interface{");
                for (i, m) in methods.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    out.push_str(&m.name);
                }
                out.push('}');
            }
            TypeKind::Func { params, results } => {
                out.push_str("func(");
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_into(*p, out);
                }
                out.push(')');
                if !results.is_empty() {
                    out.push(' ');
                    for (i, r) in results.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.render_into(*r, out);
                    }
                }
            }
            TypeKind::Tuple { elems } => {
                out.push('(');
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_into(*e, out);
                }
                out.push(')');
            }
            TypeKind::Named { name, .. } => out.push_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_kinds_are_interned() {
        let mut t = TypeTable::new();
        let int = t.intern(TypeKind::Int);
        let c1 = t.intern(TypeKind::Chan { dir: ChanDir::Both, elem: int });
        let c2 = t.intern(TypeKind::Chan { dir: ChanDir::Both, elem: int });
        assert_eq!(c1, c2);
    }

    #[test]
    fn named_types_peel_to_underlying() {
        let mut t = TypeTable::new();
        let int = t.intern(TypeKind::Int);
        let ch = t.intern(TypeKind::Chan { dir: ChanDir::Both, elem: int });
        let st = t.intern(TypeKind::Struct {
            fields: vec![StructField { name: "ch".to_string(), ty: ch }],
        });
        let named = t.declare_named("T");
        t.define_named(named, st);
        assert!(t.is_struct(named));
        assert!(t.identical(named, st));
        assert_eq!(1, t.struct_fields(named).unwrap().len());
    }

    #[test]
    fn chan_through_pointer() {
        let mut t = TypeTable::new();
        let int = t.intern(TypeKind::Int);
        let ch = t.intern(TypeKind::Chan { dir: ChanDir::Both, elem: int });
        let ptr = t.intern(TypeKind::Pointer { elem: ch });
        assert!(t.is_chan(ptr));
        assert_eq!(Some(int), t.chan_elem(ptr));
    }

    #[test]
    fn recursive_named_struct() {
        let mut t = TypeTable::new();
        let named = t.declare_named("List");
        let ptr = t.intern(TypeKind::Pointer { elem: named });
        let st = t.intern(TypeKind::Struct {
            fields: vec![StructField { name: "next".to_string(), ty: ptr }],
        });
        t.define_named(named, st);
        assert!(t.is_struct(named));
        assert_eq!("*List", t.render(ptr));
    }
}
