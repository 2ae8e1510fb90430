//! Command-line entry point for MiGo type inference.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;

use migoinfer_engine::Inferer;
use migoinfer_ssa::build;

mod error;
use error::{convert_build_error, CliError};

#[derive(Parser, Debug)]
#[command(name = "migoinfer")]
#[command(about = "Infers MiGo types from SSA programs", long_about = None)]
struct Args {
    /// SSA source files to analyse
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Analysis log file ('-' for stderr)
    #[arg(long, value_name = "PATH")]
    log: Option<String>,

    /// Show raw unfiltered MiGo
    #[arg(long)]
    raw: bool,

    /// Explicit entry function (pkg.Name, (pkg).Name or "pkg".Name)
    #[arg(long, value_name = "PATH")]
    entry: Option<String>,

    /// Dump the parsed SSA listing instead of inferring
    #[arg(long)]
    ssa: bool,
}

fn init_logging(log: &Option<String>) {
    let mut builder = env_logger::Builder::from_default_env();
    match log.as_deref() {
        None => {
            builder.filter_level(log::LevelFilter::Error);
        }
        Some("-") => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        Some(path) => {
            builder.filter_level(log::LevelFilter::Debug);
            if let Ok(f) = File::create(path) {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
        }
    }
    let _ = builder.try_init();
}

fn run(args: Args) -> Result<(), CliError> {
    // Keep the concatenated sources for diagnostics.
    let mut sources = String::new();
    for f in &args.files {
        match fs::read_to_string(f) {
            Ok(s) => {
                sources.push_str(&s);
                sources.push('\n');
            }
            Err(_) => {} // Reported properly by the builder below.
        }
    }

    let info = build::from_files(args.files.clone())
        .default()
        .build()
        .map_err(|e| convert_build_error(e, &sources))?;

    if args.ssa {
        let mut stdout = io::stdout().lock();
        info.write_to(&mut stdout)?;
        return Ok(());
    }

    let mut inferer = Inferer::new(Rc::new(info));
    inferer.raw = args.raw;
    if let Some(entry) = &args.entry {
        inferer.set_entry_func(entry);
    }
    inferer.analyse()?;

    let mut stdout = io::stdout().lock();
    inferer.write_output(&mut stdout)?;
    stdout.flush()?;
    Ok(())
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    init_logging(&args.log);
    run(args)?;
    Ok(())
}
