//! Exported names: the channel-typed locals visible in the MiGo output
//! of one function frame.

use crate::callctx::Context;
use crate::store::{Key, Value};

/// Ordered set of exported keys. Only exported names appear in a MiGo
/// function; channels are exported when created or received as
/// parameters, and φ-merges unexport the incoming name in favour of the
/// merged one.
#[derive(Debug, Default)]
pub struct Exported {
    names: Vec<Key>,
}

impl Exported {
    /// Puts a local variable in the set of exported names. Names are
    /// unique; re-exporting is a no-op.
    pub fn export(&mut self, k: Key) {
        let name = k.name();
        if !self.names.iter().any(|n| n.name() == name) {
            self.names.push(k);
        }
    }

    pub fn unexport(&mut self, k: &Key) {
        let name = k.name();
        self.names.retain(|n| n.name() != name);
    }

    pub fn names(&self) -> &[Key] {
        &self.names
    }

    /// The exported name resolving to the same value as `v`, if any.
    pub fn find_exported(&self, ctx: &Context, v: &Value) -> Option<Key> {
        self.names
            .iter()
            .find(|name| &ctx.get(name) == v)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockValue;
    use migoinfer_ssa::{build, Pos};

    #[test]
    fn export_is_idempotent_and_ordered() {
        let info = build::from_source(
            "package main\n\nfunc main(a chan int, b chan int):\n0 entry:\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let a = Key::ssa(prog, prog.funcs[0].params[0]);
        let b = Key::ssa(prog, prog.funcs[0].params[1]);
        let mut e = Exported::default();
        e.export(a.clone());
        e.export(b.clone());
        e.export(a.clone());
        assert_eq!(vec!["a", "b"], e.names().iter().map(Key::name).collect::<Vec<_>>());
        e.unexport(&a);
        assert_eq!(vec!["b"], e.names().iter().map(Key::name).collect::<Vec<_>>());
    }

    #[test]
    fn find_exported_matches_by_value() {
        let info = build::from_source(
            "package main\n\nfunc main(a chan int):\n0 entry:\n    t0 = makechan chan int, 0:int\n    return\n",
        )
        .build()
        .unwrap();
        let prog = &info.prog;
        let ctx = Context::toplevel();
        let t0 = prog.funcs[0].blocks[0].instrs[0].result.unwrap();
        let key = Key::ssa(prog, t0);
        let ns = Value::Mock(MockValue { pos: Pos::NONE, desc: "scope".to_string() });
        let ch = Value::Chan(crate::store::Chan::new(ns, prog, t0, 0));
        ctx.put(key.clone(), ch.clone());

        let mut e = Exported::default();
        e.export(key.clone());
        assert_eq!(Some("t0".to_string()), e.find_exported(&ctx, &ch).map(|k| k.name()));
        let other = Value::Mock(MockValue { pos: Pos::NONE, desc: "other".to_string() });
        assert!(e.find_exported(&ctx, &other).is_none());
    }
}
