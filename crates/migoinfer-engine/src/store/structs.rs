//! Struct aggregate values and field handles.

use std::cell::RefCell;
use std::rc::Rc;

use migoinfer_ssa::{Pos, Program, TypeId, ValueId};

use super::{Key, Value};

/// An abstract struct instance. The field table has the same arity as the
/// static struct type; entries hold the key currently standing for each
/// field, or nothing while the field is untouched.
///
/// Do not share a struct across scopes; the context switch builds a copy
/// so that fields do not get overwritten.
#[derive(Debug)]
pub struct Struct {
    pub ns: RefCell<Option<Value>>,
    /// Origin SSA value; placeholders built from a type alone have none.
    pub val: Option<ValueId>,
    pub name: String,
    pub ty: TypeId,
    pub fields: RefCell<Vec<Option<Key>>>,
}

impl Struct {
    /// Builds a struct for a struct-typed (or pointer-to-struct-typed)
    /// SSA value. Returns None for non-struct values.
    pub fn new(prog: &Program, ns: Value, v: ValueId) -> Option<Rc<Struct>> {
        let ty = prog.value(v).ty;
        let n = prog.types.struct_fields(ty)?.len();
        Some(Rc::new(Struct {
            ns: RefCell::new(Some(ns)),
            val: Some(v),
            name: prog.value(v).name.clone(),
            ty,
            fields: RefCell::new(vec![None; n]),
        }))
    }

    /// Placeholder struct carrying only the arity of its type. Used for
    /// parameter matching where no concrete value exists yet.
    pub fn from_type(prog: &Program, ty: TypeId) -> Rc<Struct> {
        let n = prog.types.struct_fields(ty).map(<[_]>::len).unwrap_or(0);
        Rc::new(Struct {
            ns: RefCell::new(None),
            val: None,
            name: "_empty_struct_".to_string(),
            ty,
            fields: RefCell::new(vec![None; n]),
        })
    }

    pub fn num_fields(&self) -> usize {
        self.fields.borrow().len()
    }

    pub fn uniq_name(&self) -> String {
        match &*self.ns.borrow() {
            Some(ns) => format!("{}.{}_struct{}", ns.uniq_name(), self.name, self.num_fields()),
            None => format!("{}_struct{}", self.name, self.num_fields()),
        }
    }

    /// Depth-first expansion: the struct itself, then for each field the
    /// concrete field key (wrapped as [`SField`]) or, for struct-typed
    /// fields, a recursive expansion. Two expansions of the same static
    /// type always have the same length, permitting positional matching.
    pub fn expand(self: &Rc<Struct>, prog: &Program) -> Vec<Expanded> {
        let mut out = vec![Expanded::Struct(self.clone())];
        let field_tys: Vec<TypeId> = prog
            .types
            .struct_fields(self.ty)
            .map(|fs| fs.iter().map(|f| f.ty).collect())
            .unwrap_or_default();
        let fields = self.fields.borrow();
        for (i, slot) in fields.iter().enumerate() {
            let fty = field_tys.get(i).copied();
            let sf = match slot {
                Some(Key::Field(sf)) => sf.clone(),
                Some(k) => SField {
                    key: Some(Box::new(k.clone())),
                    parent: self.clone(),
                    index: i,
                    ty: fty.unwrap_or(k.ty()),
                },
                None => SField {
                    key: None,
                    parent: self.clone(),
                    index: i,
                    ty: fty.unwrap_or(self.ty),
                },
            };
            out.push(Expanded::Field(sf));
            if let Some(fty) = fty {
                if prog.types.struct_fields(fty).is_some() {
                    // Struct-typed field: expand its shape so positions
                    // line up between caller and callee.
                    out.extend(Struct::from_type(prog, fty).expand(prog));
                }
            }
        }
        out
    }
}

/// One element of a struct expansion.
#[derive(Debug, Clone)]
pub enum Expanded {
    Struct(Rc<Struct>),
    Field(SField),
}

/// A field handle: a key that also knows its parent struct and slot.
#[derive(Debug, Clone)]
pub struct SField {
    /// The key currently standing for the field; None for untouched
    /// fields of placeholder structs.
    pub key: Option<Box<Key>>,
    pub parent: Rc<Struct>,
    pub index: usize,
    pub ty: TypeId,
}

impl SField {
    pub fn name(&self) -> String {
        match &self.key {
            Some(k) => k.name(),
            None => format!("{}_{}", self.parent.name, self.index),
        }
    }

    pub fn pos(&self) -> Pos {
        self.key.as_deref().map(Key::pos).unwrap_or(Pos::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockValue;
    use migoinfer_ssa::build;

    fn struct_prog() -> migoinfer_ssa::Info {
        build::from_source(
            "package main\n\ntype T struct { ch chan int; n int }\n\nfunc main():\n0 entry:\n    t0 = alloc T\n    t1 = fieldaddr t0, 0\n    return\n",
        )
        .build()
        .unwrap()
    }

    #[test]
    fn expansion_length_matches_type() {
        let info = struct_prog();
        let t0 = info.prog.funcs[0].blocks[0].instrs[0].result.unwrap();
        let ns = Value::Mock(MockValue { pos: Pos::NONE, desc: "scope".to_string() });
        let s = Struct::new(&info.prog, ns, t0).unwrap();
        let fields = s.expand(&info.prog);
        // Struct itself plus two fields.
        assert_eq!(3, fields.len());
        // A placeholder of the same type expands to the same length.
        let p = Struct::from_type(&info.prog, s.ty);
        assert_eq!(fields.len(), p.expand(&info.prog).len());
    }

    #[test]
    fn field_slots_keep_inserted_keys() {
        let info = struct_prog();
        let t0 = info.prog.funcs[0].blocks[0].instrs[0].result.unwrap();
        let t1 = info.prog.funcs[0].blocks[0].instrs[1].result.unwrap();
        let ns = Value::Mock(MockValue { pos: Pos::NONE, desc: "scope".to_string() });
        let s = Struct::new(&info.prog, ns, t0).unwrap();
        s.fields.borrow_mut()[0] = Some(Key::ssa(&info.prog, t1));
        match &s.expand(&info.prog)[1] {
            Expanded::Field(f) => assert_eq!("t1", f.name()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn placeholder_field_names_are_positional() {
        let info = struct_prog();
        let ty = info.prog.types.lookup_named("T").unwrap();
        let p = Struct::from_type(&info.prog, ty);
        match &p.expand(&info.prog)[2] {
            Expanded::Field(f) => assert_eq!("_empty_struct__1", f.name()),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
