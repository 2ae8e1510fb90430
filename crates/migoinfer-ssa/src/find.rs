//! Entry-point selection and reachable-function discovery.

use std::collections::HashSet;

use crate::program::{Callee, FuncId, InstrKind, PkgId, ValueKind};
use crate::Info;

/// Splits an entry-point path into package and function segments.
/// Accepted forms: `pkg/path.Name`, `(pkg/path).Name`, `"pkg/path".Name`.
pub fn parse_func_path(path: &str) -> (String, String) {
    if path.is_empty() {
        return (String::new(), String::new());
    }
    let bytes = path.as_bytes();
    match bytes[0] {
        b'(' => {
            if let Some(close) = path.find(')') {
                let pkg = &path[1..close];
                let rest = &path[close + 1..];
                if let Some(fn_name) = rest.strip_prefix('.') {
                    return (pkg.to_string(), fn_name.to_string());
                }
            }
            (String::new(), path.to_string())
        }
        b'"' => {
            if let Some(close) = path[1..].find('"') {
                let pkg = &path[1..close + 1];
                let rest = &path[close + 2..];
                if let Some(fn_name) = rest.strip_prefix('.') {
                    return (pkg.to_string(), fn_name.to_string());
                }
            }
            (String::new(), path.to_string())
        }
        _ => match path.rsplit_once('.') {
            Some((pkg, fn_name)) => (pkg.to_string(), fn_name.to_string()),
            None => (String::new(), path.to_string()),
        },
    }
}

impl Info {
    /// Packages named `main` defining a `main` function.
    pub fn main_pkgs(&self) -> Vec<PkgId> {
        self.prog
            .packages
            .iter()
            .filter(|p| {
                p.name == "main"
                    && p.funcs.iter().any(|&f| self.prog.func(f).name == "main")
            })
            .map(|p| p.id)
            .collect()
    }

    /// Function named `name` in package `pkg`.
    pub fn pkg_func(&self, pkg: PkgId, name: &str) -> Option<FuncId> {
        self.prog
            .package(pkg)
            .funcs
            .iter()
            .copied()
            .find(|&f| self.prog.func(f).name == name)
    }

    /// Functions reachable from the main packages' `init` and `main`
    /// through static call, spawn and closure edges.
    pub fn used_functions(&self) -> Vec<FuncId> {
        let mut roots = Vec::new();
        for pkg in self.main_pkgs() {
            for entry in ["init", "main"] {
                if let Some(f) = self.pkg_func(pkg, entry) {
                    roots.push(f);
                }
            }
        }
        // No main package: treat every function as a root, so explicit
        // entry points in library packages remain findable.
        if roots.is_empty() {
            roots = self.prog.funcs.iter().map(|f| f.id).collect();
        }

        let mut seen: HashSet<FuncId> = HashSet::new();
        let mut queue = roots;
        while let Some(f) = queue.pop() {
            if !seen.insert(f) {
                continue;
            }
            for block in &self.prog.func(f).blocks {
                for instr in &block.instrs {
                    match &instr.kind {
                        InstrKind::Call(c) | InstrKind::Go(c) => {
                            if let Callee::Value(v) = &c.callee {
                                if let ValueKind::Function(g) = &self.prog.value(*v).kind {
                                    queue.push(*g);
                                }
                            }
                        }
                        InstrKind::MakeClosure { func, .. } => queue.push(*func),
                        _ => {}
                    }
                }
            }
        }
        let mut out: Vec<FuncId> = seen.into_iter().collect();
        out.sort();
        out
    }

    /// Resolves an explicit entry-point path to a function.
    pub fn find_func(&self, path: &str) -> Option<FuncId> {
        let (pkg_path, fn_name) = parse_func_path(path);
        self.used_functions().into_iter().find(|&f| {
            let fun = self.prog.func(f);
            let pkg_ok = match fun.pkg {
                Some(p) => self.prog.package(p).path == pkg_path,
                None => pkg_path.is_empty(),
            };
            pkg_ok && fun.name == fn_name
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;

    #[test]
    fn func_path_forms() {
        assert_eq!(
            ("main".to_string(), "worker".to_string()),
            parse_func_path("main.worker")
        );
        assert_eq!(
            ("example.org/pkg".to_string(), "Run".to_string()),
            parse_func_path("(example.org/pkg).Run")
        );
        assert_eq!(
            ("example.org/pkg".to_string(), "Run".to_string()),
            parse_func_path("\"example.org/pkg\".Run")
        );
    }

    #[test]
    fn used_functions_follow_static_edges() {
        let info = build::from_source(
            "package main\n\nfunc helper(ch chan int):\n0 entry:\n    send ch, 1:int\n    return\n\nfunc orphan():\n0 entry:\n    return\n\nfunc main():\n0 entry:\n    t0 = makechan chan int, 0:int\n    call helper(t0)\n    return\n",
        )
        .build()
        .unwrap();
        let used = info.used_functions();
        let names: Vec<&str> =
            used.iter().map(|&f| info.prog.func(f).name.as_str()).collect();
        assert!(names.contains(&"main"));
        assert!(names.contains(&"helper"));
        assert!(!names.contains(&"orphan"));
    }

    #[test]
    fn find_func_by_path() {
        let info = build::from_source(
            "package main\n\nfunc worker(ch chan int):\n0 entry:\n    recv ch\n    return\n\nfunc main():\n0 entry:\n    t0 = makechan chan int, 0:int\n    go worker(t0)\n    return\n",
        )
        .build()
        .unwrap();
        let f = info.find_func("main.worker").unwrap();
        assert_eq!("worker", info.prog.func(f).name);
    }
}
