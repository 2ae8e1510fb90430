//! Two-layer key-value store backing symbolic environments.
//!
//! Keys are nameable variables (SSA-backed or synthesised); values are
//! abstract instances with globally unique textual names. The outer layer
//! maps keys to values and is scope-local; the inner layer is a pool
//! dispensing fresh unique identifiers, shared by every store derived via
//! [`Store::extend`] from a common root.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use migoinfer_ssa::{Pos, Program, TypeId, ValueId, ValueKind};
use parking_lot::Mutex;

use crate::errors::SoftError;
use crate::funcs::{Definition, Instance};

pub mod chans;
pub mod structs;

pub use chans::Chan;
pub use structs::{Expanded, SField, Struct};

/// An SSA-backed key. Carries a copy of the value's name, type and
/// position so keys are self-contained; identity is the value id.
#[derive(Debug, Clone)]
pub struct SsaKey {
    pub id: ValueId,
    pub name: Rc<str>,
    pub ty: TypeId,
    pub pos: Pos,
    konst: bool,
}

/// A placeholder key. Synthesised keys compare by name, so the
/// description doubles as identity.
#[derive(Debug, Clone)]
pub struct MockKey {
    pub ty: TypeId,
    pub pos: Pos,
    pub desc: String,
}

impl MockKey {
    pub fn name(&self) -> String {
        let first = self.desc.split_whitespace().next().unwrap_or("");
        format!("_{}_", first.to_lowercase())
    }
}

/// A fresh nil-channel key, one per occurrence of a nil channel constant.
#[derive(Debug, Clone)]
pub struct NilKey {
    pub count: usize,
    pub ty: TypeId,
}

/// A nameable variable in some scope.
#[derive(Debug, Clone)]
pub enum Key {
    Ssa(SsaKey),
    Field(SField),
    Mock(MockKey),
    /// An unused return value.
    Unused(MockKey),
    Nil(NilKey),
}

impl Key {
    /// Key for an SSA value.
    pub fn ssa(prog: &Program, id: ValueId) -> Key {
        let data = prog.value(id);
        Key::Ssa(SsaKey {
            id,
            name: Rc::from(data.name.as_str()),
            ty: data.ty,
            pos: data.pos,
            konst: matches!(&data.kind, ValueKind::Const(_)),
        })
    }

    pub fn name(&self) -> String {
        match self {
            Key::Ssa(k) => k.name.to_string(),
            Key::Field(f) => f.name(),
            Key::Mock(m) | Key::Unused(m) => m.name(),
            Key::Nil(n) => format!("nil{}", n.count),
        }
    }

    pub fn ty(&self) -> TypeId {
        match self {
            Key::Ssa(k) => k.ty,
            Key::Field(f) => f.ty,
            Key::Mock(m) | Key::Unused(m) => m.ty,
            Key::Nil(n) => n.ty,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Key::Ssa(k) => k.pos,
            Key::Field(f) => f.pos(),
            Key::Mock(m) | Key::Unused(m) => m.pos,
            Key::Nil(_) => Pos::NONE,
        }
    }

    /// The underlying SSA value, for SSA-backed keys.
    pub fn ssa_id(&self) -> Option<ValueId> {
        match self {
            Key::Ssa(k) => Some(k.id),
            Key::Field(f) => f.key.as_deref().and_then(Key::ssa_id),
            _ => None,
        }
    }

    fn is_const(&self) -> bool {
        matches!(self, Key::Ssa(k) if k.konst)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Key) -> bool {
        match (self, other) {
            (Key::Ssa(a), Key::Ssa(b)) => a.id == b.id,
            (Key::Field(a), Key::Field(b)) => {
                a.parent.name == b.parent.name && a.index == b.index
            }
            (Key::Mock(a), Key::Mock(b)) | (Key::Unused(a), Key::Unused(b)) => {
                a.desc == b.desc && a.pos == b.pos
            }
            (Key::Nil(a), Key::Nil(b)) => a.count == b.count,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Key::Ssa(k) => k.id.hash(state),
            Key::Field(f) => {
                f.parent.name.hash(state);
                f.index.hash(state);
            }
            Key::Mock(m) | Key::Unused(m) => {
                m.desc.hash(state);
                m.pos.hash(state);
            }
            Key::Nil(n) => n.count.hash(state),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A placeholder value: undefined, or hidden by scope.
#[derive(Debug, Clone)]
pub struct MockValue {
    pub pos: Pos,
    pub desc: String,
}

impl MockValue {
    pub fn undefined(pos: Pos) -> MockValue {
        MockValue { pos, desc: "Undefined".to_string() }
    }

    pub fn uniq_name(&self) -> String {
        let joined: Vec<&str> = self.desc.split_whitespace().collect();
        let p = if self.pos.is_none() { 0 } else { self.pos.0 };
        format!("{}_{}", joined.join("_"), p)
    }
}

/// A symbolic value in storage. Every variant has a globally unique
/// textual name used verbatim in MiGo output.
#[derive(Debug, Clone)]
pub enum Value {
    Chan(Rc<Chan>),
    Struct(Rc<Struct>),
    Def(Rc<Definition>),
    /// An interned constant; same syntactic form, same value.
    Const { name: String },
    Mock(MockValue),
    /// A fresh pool identifier for an opaque object.
    Pool(u64),
    /// A call instance used as a naming namespace.
    Instance(Rc<Instance>),
}

impl Value {
    pub fn uniq_name(&self) -> String {
        match self {
            Value::Chan(c) => c.uniq_name(),
            Value::Struct(s) => s.uniq_name(),
            Value::Def(d) => d.uniq_name(),
            Value::Const { name } => name.clone(),
            Value::Mock(m) => m.uniq_name(),
            Value::Pool(n) => format!("pool_{}", n),
            Value::Instance(i) => i.uniq_name(),
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Value::Mock(_))
    }

    pub fn as_chan(&self) -> Option<&Rc<Chan>> {
        match self {
            Value::Chan(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Rc<Struct>> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.uniq_name() == other.uniq_name()
    }
}

/// Pool of object instances keyed by unique name. Shared by all stores
/// extending a common root; the counter is lock-guarded.
#[derive(Debug, Default)]
pub struct Pool {
    inner: Mutex<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: HashMap<String, Option<ValueId>>,
    count: u64,
}

impl Pool {
    pub fn new() -> Rc<Pool> {
        Rc::new(Pool::default())
    }

    /// Admits an object and returns a fresh unique identifier for it.
    pub fn add_value(&self, v: ValueId) -> u64 {
        let mut inner = self.inner.lock();
        inner.count += 1;
        let id = inner.count;
        inner.entries.insert(format!("pool_{}", id), Some(v));
        id
    }

    /// Admits a pre-wrapped value, failing if its unique name is taken.
    pub fn add_wrapped(&self, v: &Value) -> Result<(), SoftError> {
        let mut inner = self.inner.lock();
        let name = v.uniq_name();
        if inner.entries.contains_key(&name) {
            return Err(SoftError::IdClash { id: name });
        }
        let obj = match v {
            Value::Chan(c) => Some(c.val),
            Value::Struct(s) => s.val,
            _ => None,
        };
        inner.entries.insert(name, obj);
        Ok(())
    }

    /// The underlying SSA value admitted under a unique name.
    pub fn get_obj(&self, uniq: &str) -> Result<Option<ValueId>, SoftError> {
        let inner = self.inner.lock();
        match inner.entries.get(uniq) {
            Some(v) => Ok(*v),
            None => Err(SoftError::ObjUndef { id: uniq.to_string() }),
        }
    }
}

/// Scope-local name map over a shared pool. Lookups fall through to the
/// parent store; writes stay local.
#[derive(Debug)]
pub struct Store {
    names: HashMap<Key, Value>,
    pool: Rc<Pool>,
}

impl Store {
    pub fn new() -> Store {
        Store { names: HashMap::new(), pool: Pool::new() }
    }

    /// Extends a store: fresh name map, same backing pool.
    pub fn extend(parent: &Store) -> Store {
        Store { names: HashMap::new(), pool: parent.pool.clone() }
    }

    pub fn pool(&self) -> &Rc<Pool> {
        &self.pool
    }

    /// Local lookup only; the context layers parent fallthrough on top.
    pub fn get_local(&self, k: &Key) -> Option<Value> {
        self.names.get(k).cloned()
    }

    /// Resolves a key, falling back to the interned constant for constant
    /// keys and a mock placeholder otherwise.
    pub fn get(&self, k: &Key) -> Value {
        if let Some(v) = self.get_local(k) {
            log::trace!(target: "store", "get: {} ↦ {}", k.name(), v.uniq_name());
            return v;
        }
        Store::fallback(k)
    }

    /// The value a missing key resolves to.
    pub fn fallback(k: &Key) -> Value {
        if k.is_const() {
            log::trace!(target: "store", "get const: {}", k.name());
            return Value::Const { name: k.name() };
        }
        log::trace!(target: "store", "get: {} ↦ (not found)", k.name());
        Value::Mock(MockValue::undefined(k.pos()))
    }

    pub fn put(&mut self, k: Key, v: Value) {
        log::trace!(target: "store", "put: {} ↦ {}", k.name(), v.uniq_name());
        self.names.insert(k, v);
    }

    /// Stores a fresh opaque object for an SSA value.
    pub fn put_obj(&mut self, k: Key, v: ValueId) {
        let id = self.pool.add_value(v);
        log::trace!(target: "store", "put obj: {} ↦ pool_{}", k.name(), id);
        self.names.insert(k, Value::Pool(id));
    }

    /// Stores a pre-wrapped unique value; fails on identifier clash.
    pub fn put_uniq(&mut self, k: Key, v: Value) -> Result<(), SoftError> {
        self.pool.add_wrapped(&v)?;
        log::trace!(target: "store", "put uniq: {} ↦ {}", k.name(), v.uniq_name());
        self.names.insert(k, v);
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Store {
        Store::new()
    }
}

/// Helper for synthesising undefined-marker cells used by tests and the
/// interpreter.
pub fn mock_key(ty: TypeId, pos: Pos, desc: &str) -> Key {
    Key::Mock(MockKey { ty, pos, desc: desc.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use migoinfer_ssa::build;

    fn sample() -> (Program, ValueId) {
        let info = build::from_source(
            "package main\n\nfunc main():\n0 entry:\n    t0 = makechan chan int, 0:int\n    return\n",
        )
        .build()
        .unwrap();
        let t0 = info.prog.funcs[0].blocks[0].instrs[0].result.unwrap();
        (info.prog, t0)
    }

    #[test]
    fn get_missing_key_is_mock() {
        let (prog, t0) = sample();
        let store = Store::new();
        let v = store.get(&Key::ssa(&prog, t0));
        assert!(v.is_mock());
    }

    #[test]
    fn put_then_get() {
        let (prog, t0) = sample();
        let mut store = Store::new();
        let k = Key::ssa(&prog, t0);
        store.put_obj(k.clone(), t0);
        match store.get(&k) {
            Value::Pool(1) => {}
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn put_uniq_detects_clash() {
        let (prog, t0) = sample();
        let mut store = Store::new();
        let k = Key::ssa(&prog, t0);
        let ns = Value::Mock(MockValue { pos: Pos::NONE, desc: "scope".to_string() });
        let ch = chans::Chan::new(ns.clone(), &prog, t0, 0);
        store.put_uniq(k.clone(), Value::Chan(ch.clone())).unwrap();
        let again = chans::Chan::new(ns, &prog, t0, 0);
        assert!(store.put_uniq(k, Value::Chan(again)).is_err());
    }

    #[test]
    fn extended_store_shares_pool() {
        let (prog, t0) = sample();
        let mut root = Store::new();
        root.put_obj(Key::ssa(&prog, t0), t0);
        let mut child = Store::extend(&root);
        child.put_obj(mock_key(prog.value(t0).ty, Pos::NONE, "scratch"), t0);
        // Ids continue from the shared pool.
        match child.get(&mock_key(prog.value(t0).ty, Pos::NONE, "scratch")) {
            Value::Pool(2) => {}
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn mock_values_are_fresh_per_site() {
        let a = MockValue { pos: Pos(3), desc: "Undefined".to_string() };
        let b = MockValue { pos: Pos(9), desc: "Undefined".to_string() };
        assert_ne!(a.uniq_name(), b.uniq_name());
    }
}
