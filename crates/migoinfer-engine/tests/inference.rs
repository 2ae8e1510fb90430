//! End-to-end inference scenarios: SSA text in, printed MiGo out.

use std::rc::Rc;

use pretty_assertions::assert_eq;

use migoinfer_engine::Inferer;
use migoinfer_ssa::build;

fn infer_with(src: &str, raw: bool) -> String {
    let info = build::from_source(src).default().build().expect("build");
    let mut inferer = Inferer::new(Rc::new(info));
    inferer.raw = raw;
    inferer.analyse().expect("analyse");
    inferer.output()
}

fn infer(src: &str) -> String {
    infer_with(src, false)
}

const SEND_GOROUTINE: &str = "\
package main

func main$1() [ch chan int]:
0 entry:
    send ch, 1:int
    return

func main():
0 entry:
    t0 = makechan chan int, 0:int
    t1 = makeclosure main$1 [t0]
    go t1()
    t2 = recv t0
    return
";

#[test]
fn send_only_goroutine() {
    let expect = "\
def main.main():
    let t0 = newchan main.main0.t0_chan0, 0;
    spawn main.main$1(t0);
    recv t0;
def main.main$1(ch):
    send ch;
";
    assert_eq!(expect, infer(SEND_GOROUTINE));
}

#[test]
fn close_after_create() {
    let src = "\
package main

func main():
0 entry:
    t0 = makechan chan int, 0:int
    call close(t0)
    return
";
    let expect = "\
def main.main():
    let t0 = newchan main.main0.t0_chan0, 0;
    close t0;
";
    assert_eq!(expect, infer(src));
}

const SELECT_DEFAULT: &str = "\
package main

func main():
0 entry:
    t0 = makechan chan int, 0:int
    t1 = select nonblocking [recv t0]
    t2 = extract t1, 0
    t3 = t2 == 0:int
    if t3 goto 1 else 2
1 select.body:
    t4 = extract t1, 2
    jump 2
2 select.done:
    return
";

#[test]
fn nonblocking_select_has_default_case() {
    let expect = "\
def main.main():
    let t0 = newchan main.main0.t0_chan0, 0;
    select { case recv t0; call main.main#1(t0) | case τ; call main.main#2(t0) };
def main.main#1(t0):
    call main.main#2(t0);
def main.main#2(t0):
";
    assert_eq!(expect, infer_with(SELECT_DEFAULT, true));
    // One case per guard plus the τ-headed default.
    let cleaned = infer(SELECT_DEFAULT);
    assert_eq!(
        "\
def main.main():
    let t0 = newchan main.main0.t0_chan0, 0;
    select { case recv t0; τ | case τ; τ };
",
        cleaned
    );
}

const CLASSIC_FOR: &str = "\
package main

func main():
0 entry:
    t0 = makechan chan int, 0:int
    jump 1
1 for.loop:
    t1 = phi [0: 0:int, 1: t2]
    t3 = t1 < 10:int
    if t3 goto 2 else 3
2 for.body:
    t4 = recv t0
    t2 = t1 + 1:int
    jump 1
3 for.done:
    return
";

#[test]
fn classic_for_loop_becomes_iffor() {
    let expect = "\
def main.main():
    let t0 = newchan main.main0.t0_chan0, 0;
    call main.main#1(t0);
def main.main#1(t0):
    if (t1 = 0; (t1<10); t1 = t1 + 1) { call main.main#2(t0) } else { τ };
def main.main#2(t0):
    recv t0;
    call main.main#1(t0);
";
    assert_eq!(expect, infer(CLASSIC_FOR));
}

const SHORT_CIRCUIT_FOR: &str = "\
package main

func main():
0 entry:
    jump 1
1 for.loop:
    t1 = phi [0: 0:int, 1: t2]
    t3 = t1 < 10:int
    if t3 goto 4 else 3
4 cond.true:
    t5 = t1 % 2:int
    t6 = t5 == 0:int
    if t6 goto 2 else 3
2 for.body:
    t2 = t1 + 1:int
    jump 1
3 for.done:
    return
";

#[test]
fn short_circuit_condition_serialises() {
    let out = infer(SHORT_CIRCUIT_FOR);
    assert!(
        out.contains("if (t1 = 0; ((t1<10) && ((t1%2)==0)); t1 = t1 + 1)"),
        "loop header not serialised: {}",
        out
    );
}

const IFACE_DISPATCH: &str = "\
package main

type T struct { ch chan int }
type Sender interface { Send(int) }

func (t T) Send(x int):
0 entry:
    t0 = fieldaddr t, 0
    t1 = load t0
    send t1, x
    return

func main():
0 entry:
    t0 = alloc T
    t1 = fieldaddr t0, 0
    t2 = makechan chan int, 1:int
    store t1, t2
    t3 = load t0
    t4 = makeiface t3 : Sender
    invoke t4.Send(1:int)
    return
";

#[test]
fn interface_dispatch_resolves_concrete_method() {
    let expect = "\
def main.main():
    let t2 = newchan main.main0.t2_chan1, 1;
    call main.Send(t2);
def main.Send(t0_0):
    send t0_0;
";
    assert_eq!(expect, infer(IFACE_DISPATCH));
}

#[test]
fn nonconstant_buffer_size_defaults_to_one() {
    let src = "\
package main

func main(n int):
0 entry:
    t0 = makechan chan int, n
    send t0, 1:int
    return
";
    let out = infer(src);
    assert!(
        out.contains("let t0 = newchan main.main0.t0_chan1, 1;"),
        "buffer size did not default to 1: {}",
        out
    );
}

#[test]
fn plain_branch_is_if_statement() {
    let src = "\
package main

func main():
0 entry:
    t0 = makechan chan int, 0:int
    t1 = 1:int < 2:int
    if t1 goto 1 else 2
1 if.then:
    send t0, 1:int
    jump 3
2 if.else:
    t2 = recv t0
    jump 3
3 if.done:
    return
";
    let expect = "\
def main.main():
    let t0 = newchan main.main0.t0_chan0, 0;
    if { call main.main#1(t0) } else { call main.main#2(t0) };
def main.main#1(t0):
    send t0;
    τ;
def main.main#2(t0):
    recv t0;
    τ;
";
    assert_eq!(expect, infer(src));
}

#[test]
fn unrecognised_loop_lowers_as_plain_if() {
    // The condition never mentions the φ index, so no IfFor is produced.
    let src = "\
package main

func main(b bool):
0 entry:
    t0 = makechan chan int, 0:int
    jump 1
1 for.loop:
    t1 = phi [0: 0:int, 1: t2]
    t3 = b == b
    if t3 goto 2 else 3
2 for.body:
    t4 = recv t0
    t2 = t1 + 1:int
    jump 1
3 for.done:
    return
";
    let out = infer(src);
    assert!(out.contains("if { call main.main#2(t0) } else"), "expected plain if: {}", out);
    assert!(!out.contains("t1 = 0;"), "unexpected loop header: {}", out);
}

#[test]
fn send_on_nil_channel_synthesises_fresh_binding() {
    let src = "\
package main

func main():
0 entry:
    send nil:chan int, 1:int
    return
";
    let expect = "\
def main.main():
    let nil0 = newchan nilchan, 0;
    send nil0;
";
    assert_eq!(expect, infer(src));
}

#[test]
fn while_true_loops_through_block_functions() {
    let src = "\
package main

func fork(ch chan bool):
0 entry:
    jump 1
1 for.body:
    t0 = recv ch
    send ch, t0
    jump 1

func main():
0 entry:
    t0 = makechan chan bool, 0:int
    t1 = makechan chan bool, 0:int
    go fork(t0)
    go fork(t1)
    send t0, true:bool
    send t1, true:bool
    return
";
    let expect = "\
def main.main():
    let t0 = newchan main.main0.t0_chan0, 0;
    let t1 = newchan main.main0.t1_chan0, 0;
    spawn main.fork(t0);
    spawn main.fork(t1);
    send t0;
    send t1;
def main.fork(ch):
    call main.fork#1(ch);
def main.fork#1(ch):
    recv ch;
    send ch;
    call main.fork#1(ch);
";
    assert_eq!(expect, infer(src));
}

#[test]
fn returned_channel_materialises_at_caller() {
    let src = "\
package main

func newch() (chan int):
0 entry:
    t0 = makechan chan int, 1:int
    return t0

func main():
0 entry:
    t0 = call newch()
    t1 = call newch()
    send t1, 1:int
    t2 = recv t1
    send t0, t2
    return
";
    let out = infer(src);
    // Each call instance materialises its own channel at the caller.
    assert!(out.contains("let t0 = newchan main.newch0.t0_chan1, 1;"), "{}", out);
    assert!(out.contains("let t1 = newchan main.newch1.t0_chan1, 1;"), "{}", out);
    assert!(out.contains("send t1;"), "{}", out);
    assert!(out.contains("send t0;"), "{}", out);
    // The callee's creation site itself stays opaque.
    assert!(!out.contains("def main.newch"), "τ-only callee should be folded: {}", out);
}

#[test]
fn dead_code_does_not_change_output() {
    let with_dead_code = "\
package main

func main():
0 entry:
    t0 = makechan chan int, 0:int
    t1 = 1:int + 2:int
    t2 = t1 * 2:int
    send t0, t1
    return
";
    let without = "\
package main

func main():
0 entry:
    t0 = makechan chan int, 0:int
    send t0, 1:int
    return
";
    assert_eq!(infer(without), infer(with_dead_code));
}

#[test]
fn raw_plus_transforms_equals_cleaned() {
    use migoinfer_migo::transform;

    let info = build::from_source(CLASSIC_FOR).default().build().unwrap();
    let mut raw = Inferer::new(Rc::new(info));
    raw.raw = true;
    raw.analyse().unwrap();
    {
        let mut prog = raw.env.prog().borrow_mut();
        transform::remove_tau_funcs(&mut prog, "main.main");
        transform::remove_undefined(&mut prog, "main.main");
    }
    assert_eq!(infer(CLASSIC_FOR), raw.output());
}

#[test]
fn every_reachable_block_gets_one_function() {
    let out = infer_with(CLASSIC_FOR, true);
    for name in ["def main.main():", "def main.main#1(", "def main.main#2(", "def main.main#3("]
    {
        assert_eq!(1, out.matches(name).count(), "{} in: {}", name, out);
    }
}

#[test]
fn explicit_entry_function() {
    let src = "\
package main

func worker(ch chan int):
0 entry:
    t0 = recv ch
    return

func main():
0 entry:
    t0 = makechan chan int, 0:int
    go worker(t0)
    return
";
    let info = build::from_source(src).default().build().unwrap();
    let mut inferer = Inferer::new(Rc::new(info));
    inferer.set_entry_func("main.worker");
    inferer.analyse().unwrap();
    assert_eq!(Some("main.worker"), inferer.entry_name());
    let out = inferer.output();
    assert!(out.starts_with("def main.worker("), "{}", out);
}
