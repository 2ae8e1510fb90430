//! Build configuration for the SSA front end.
//!
//! A [`Config`] collects sources and options with chained combinators and
//! produces an [`Info`](crate::Info) with the parsed program. Packages can
//! be marked "bad" to skip building their function bodies; the default
//! configuration marks `reflect` and `runtime`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use thiserror::Error;

use crate::parser::Parser;
use crate::program::Program;
use crate::source::{FileSet, Position};
use crate::Info;

/// Error raised while building a program from sources.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{file}: {msg}")]
    Parse {
        file: String,
        msg: String,
        /// Position of the error, if it maps into the sources.
        position: Option<Position>,
        /// Byte span into the concatenated sources, for diagnostics.
        span: std::ops::Range<usize>,
    },
}

enum SourceSet {
    Files(Vec<PathBuf>),
    Cached(String),
}

/// A build configuration. See the original builder contract: `build()`,
/// `default()`, `add_bad_pkg()`, `with_build_log()`, `with_pta_log()`.
pub struct Config {
    src: SourceSet,
    bad_pkgs: HashMap<String, String>,
    build_log: Option<Box<dyn Write>>,
    pta_log: Option<Box<dyn Write>>,
}

/// Builds a configuration from a list of files.
pub fn from_files(files: Vec<PathBuf>) -> Config {
    Config::new(SourceSet::Files(files))
}

/// Builds a configuration from an in-memory source, typically for tests.
pub fn from_source(src: impl Into<String>) -> Config {
    Config::new(SourceSet::Cached(src.into()))
}

/// Builds a configuration from a reader.
pub fn from_reader(mut r: impl Read) -> io::Result<Config> {
    let mut buf = String::new();
    r.read_to_string(&mut buf)?;
    Ok(from_source(buf))
}

impl Config {
    fn new(src: SourceSet) -> Config {
        Config { src, bad_pkgs: HashMap::new(), build_log: None, pta_log: None }
    }

    /// The default analysis configuration: skip packages that cannot be
    /// meaningfully analysed statically.
    pub fn default(self) -> Config {
        self.add_bad_pkg("reflect", "Reflection is not supported")
            .add_bad_pkg("runtime", "Runtime is ignored for static analysis")
    }

    /// Marks a package 'bad' so its function bodies are not built.
    pub fn add_bad_pkg(mut self, pkg: &str, reason: &str) -> Config {
        self.bad_pkgs.insert(pkg.to_string(), reason.to_string());
        self
    }

    /// Adds a build log sink.
    pub fn with_build_log(mut self, w: Box<dyn Write>) -> Config {
        self.build_log = Some(w);
        self
    }

    /// Adds a pointer-analysis log sink. Kept for interface compatibility;
    /// the current front end performs no pointer analysis.
    pub fn with_pta_log(mut self, w: Box<dyn Write>) -> Config {
        self.pta_log = Some(w);
        self
    }

    fn log(&mut self, msg: &str) {
        if let Some(w) = &mut self.build_log {
            let _ = writeln!(w, "ssabuild: {}", msg);
        }
        log::debug!(target: "ssabuild", "{}", msg);
    }

    /// Loads, parses and finalises the program.
    pub fn build(mut self) -> Result<Info, BuildError> {
        let mut fset = FileSet::new();
        let mut joined = String::new();
        let mut first_file = String::new();
        match &self.src {
            SourceSet::Files(files) => {
                let files = files.clone();
                for path in &files {
                    let name = path.display().to_string();
                    let src = fs::read_to_string(path)
                        .map_err(|e| BuildError::Io { path: name.clone(), source: e })?;
                    if first_file.is_empty() {
                        first_file = name.clone();
                    }
                    fset.add_file(name, &src);
                    joined.push_str(&src);
                    joined.push('\n');
                }
            }
            SourceSet::Cached(src) => {
                first_file = "<input>".to_string();
                fset.add_file("<input>", src);
                joined.push_str(src);
                joined.push('\n');
            }
        }

        let mut prog = Program::new();
        let parser = Parser::new(&joined, 0, &mut prog).map_err(|e| BuildError::Parse {
            file: first_file.clone(),
            msg: e.msg.clone(),
            position: fset.position(crate::source::Pos(e.span.start as u32)),
            span: e.span,
        })?;
        parser.parse().map_err(|e| BuildError::Parse {
            file: first_file.clone(),
            msg: e.msg.clone(),
            position: fset.position(crate::source::Pos(e.span.start as u32)),
            span: e.span,
        })?;
        prog.finalize();
        self.log("program loaded and type checked");

        // Skip bodies of packages marked bad.
        let mut ignored = Vec::new();
        let bad: Vec<(crate::program::PkgId, String, String)> = prog
            .packages
            .iter()
            .filter_map(|p| {
                self.bad_pkgs
                    .get(&p.name)
                    .map(|reason| (p.id, p.name.clone(), reason.clone()))
            })
            .collect();
        for (pid, name, reason) in bad {
            self.log(&format!("skip package: {} ({})", name, reason));
            let fids = prog.package(pid).funcs.clone();
            for f in fids {
                prog.func_mut(f).blocks.clear();
            }
            ignored.push(name);
        }

        Ok(Info { prog, fset, ignored_pkgs: ignored })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_from_source() {
        let info = from_source(
            "package main\n\nfunc main():\n0 entry:\n    t0 = makechan chan int, 0:int\n    return\n",
        )
        .default()
        .build()
        .unwrap();
        assert_eq!(1, info.prog.funcs.len());
        assert!(info.ignored_pkgs.is_empty());
    }

    #[test]
    fn bad_pkg_bodies_are_skipped() {
        let info = from_source(
            "package reflect\n\nfunc main():\n0 entry:\n    return\n",
        )
        .default()
        .build()
        .unwrap();
        assert_eq!(vec!["reflect".to_string()], info.ignored_pkgs);
        assert!(!info.prog.funcs[0].has_body());
    }

    #[test]
    fn parse_error_carries_position() {
        let err = from_source("package main\n\nfunc main():\n0 entry:\n    send nope, 1:int\n")
            .build()
            .unwrap_err();
        match err {
            BuildError::Parse { position, .. } => {
                let p = position.expect("position");
                assert_eq!(5, p.line);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
