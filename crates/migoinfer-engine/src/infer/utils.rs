//! Small type helpers over store keys.

use migoinfer_ssa::{InstrKind, Program};

use crate::store::Key;

/// Channel-typed (directly or through one pointer).
pub fn is_chan(prog: &Program, k: &Key) -> bool {
    prog.types.is_chan(k.ty())
}

/// Struct-typed (directly or through one pointer).
pub fn is_struct(prog: &Program, k: &Key) -> bool {
    prog.types.is_struct(k.ty())
}

/// Peels interface conversions and type assertions off an SSA-backed
/// key, preserving channel identity across Go-style type coercions.
pub fn underlying(prog: &Program, k: Key) -> Key {
    if let Some(id) = k.ssa_id() {
        match prog.def_instr(id).map(|i| &i.kind) {
            Some(InstrKind::MakeInterface { x }) | Some(InstrKind::TypeAssert { x }) => {
                return underlying(prog, Key::ssa(prog, *x));
            }
            _ => {}
        }
    }
    k
}
