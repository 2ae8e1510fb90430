//! Human-readable SSA listing, mirroring the textual input format.

use std::io::{self, Write};

use crate::program::{
    Callee, CallCommon, Function, Instr, InstrKind, Program, UnOpKind, ValueId,
};
use crate::types::ChanDir;
use crate::Info;

fn operand(prog: &Program, v: ValueId) -> String {
    prog.value(v).name.clone()
}

fn call_args(prog: &Program, call: &CallCommon) -> String {
    call.args.iter().map(|&a| operand(prog, a)).collect::<Vec<_>>().join(", ")
}

fn render_call(prog: &Program, call: &CallCommon) -> String {
    match &call.callee {
        Callee::Value(v) => format!("call {}({})", operand(prog, *v), call_args(prog, call)),
        Callee::Invoke { recv, method } => {
            format!("invoke {}.{}({})", operand(prog, *recv), method, call_args(prog, call))
        }
    }
}

fn render_instr(prog: &Program, instr: &Instr) -> String {
    let rhs = match &instr.kind {
        InstrKind::Alloc { ty } => format!("alloc {}", prog.types.render(*ty)),
        InstrKind::MakeChan { size } => {
            let ty = instr.result.map(|r| prog.value(r).ty);
            let ty = ty.map(|t| prog.types.render(t)).unwrap_or_default();
            format!("makechan {}, {}", ty, operand(prog, *size))
        }
        InstrKind::MakeClosure { func, bindings } => {
            let names =
                bindings.iter().map(|&b| operand(prog, b)).collect::<Vec<_>>().join(", ");
            format!("makeclosure {} [{}]", prog.func(*func).name, names)
        }
        InstrKind::MakeInterface { x } => format!("makeiface {}", operand(prog, *x)),
        InstrKind::TypeAssert { x } => format!("typeassert {}", operand(prog, *x)),
        InstrKind::ChangeType { x } => format!("changetype {}", operand(prog, *x)),
        InstrKind::Slice { x } => format!("slice {}", operand(prog, *x)),
        InstrKind::FieldAddr { x, field } => {
            format!("fieldaddr {}, {}", operand(prog, *x), field)
        }
        InstrKind::UnOp { op: UnOpKind::Arrow, x } => format!("recv {}", operand(prog, *x)),
        InstrKind::UnOp { op: UnOpKind::Mul, x } => format!("load {}", operand(prog, *x)),
        InstrKind::BinOp { op, x, y } => {
            format!("{} {} {}", operand(prog, *x), op.symbol(), operand(prog, *y))
        }
        InstrKind::Phi { edges } => {
            let parts = edges
                .iter()
                .enumerate()
                .map(|(i, &e)| format!("{}: {}", i, operand(prog, e)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("phi [{}]", parts)
        }
        InstrKind::Extract { tuple, index } => {
            format!("extract {}, {}", operand(prog, *tuple), index)
        }
        InstrKind::Call(c) => render_call(prog, c),
        InstrKind::Go(c) => format!("go {}", render_call(prog, c).trim_start_matches("call ")),
        InstrKind::Send { chan, val } => {
            format!("send {}, {}", operand(prog, *chan), operand(prog, *val))
        }
        InstrKind::Store { addr, val } => {
            format!("store {}, {}", operand(prog, *addr), operand(prog, *val))
        }
        InstrKind::Jump { target } => format!("jump {}", target),
        InstrKind::If { cond, then_dest, else_dest } => {
            format!("if {} goto {} else {}", operand(prog, *cond), then_dest, else_dest)
        }
        InstrKind::Return { results } => {
            if results.is_empty() {
                "return".to_string()
            } else {
                format!(
                    "return {}",
                    results.iter().map(|&r| operand(prog, r)).collect::<Vec<_>>().join(", ")
                )
            }
        }
        InstrKind::Select { states, blocking } => {
            let parts = states
                .iter()
                .map(|s| match s.dir {
                    ChanDir::SendOnly => format!(
                        "send {} {}",
                        operand(prog, s.chan),
                        s.send.map(|v| operand(prog, v)).unwrap_or_default()
                    ),
                    _ => format!("recv {}", operand(prog, s.chan)),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "select {} [{}]",
                if *blocking { "blocking" } else { "nonblocking" },
                parts
            )
        }
    };
    match instr.result {
        Some(r) => format!("{} = {}", prog.value(r).name, rhs),
        None => rhs,
    }
}

fn write_function(w: &mut dyn Write, prog: &Program, f: &Function) -> io::Result<()> {
    let params = f
        .params
        .iter()
        .map(|&p| format!("{} {}", prog.value(p).name, prog.types.render(prog.value(p).ty)))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(w, "func {}({}):", prog.qualified_name(f.id), params)?;
    for b in &f.blocks {
        if b.comment.is_empty() {
            writeln!(w, "{}:", b.index)?;
        } else {
            writeln!(w, "{} {}:", b.index, b.comment)?;
        }
        for instr in &b.instrs {
            writeln!(w, "    {}", render_instr(prog, instr))?;
        }
    }
    Ok(())
}

impl Info {
    /// Writes the functions used by the program as a readable SSA listing.
    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        for f in self.used_functions() {
            write_function(w, &self.prog, self.prog.func(f))?;
            writeln!(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::build;

    #[test]
    fn listing_round_trips_shape() {
        let info = build::from_source(
            "package main\n\nfunc main():\n0 entry:\n    t0 = makechan chan int, 2:int\n    send t0, 1:int\n    t1 = recv t0\n    return\n",
        )
        .build()
        .unwrap();
        let mut out = Vec::new();
        info.write_to(&mut out).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("func main.main():"));
        assert!(s.contains("t0 = makechan chan int, 2:int"));
        assert!(s.contains("send t0, 1:int"));
        assert!(s.contains("t1 = recv t0"));
    }
}
