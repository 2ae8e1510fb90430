use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use migoinfer_engine::FatalError;
use migoinfer_ssa::build::BuildError;

/// CLI-level error with rich diagnostics.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("build failed: {message}")]
    #[diagnostic(code(migoinfer::cli::build_error))]
    Build {
        #[source_code]
        src: String,
        #[label("{message}")]
        span: SourceSpan,
        message: String,
    },

    #[error("build failed: {0}")]
    #[diagnostic(code(migoinfer::cli::io_error))]
    BuildIo(BuildError),

    #[error("inference failed: {0}")]
    #[diagnostic(code(migoinfer::cli::inference_error))]
    Inference(#[from] FatalError),

    #[error("cannot write output")]
    #[diagnostic(code(migoinfer::cli::output_error))]
    Output(#[from] std::io::Error),
}

/// Attaches the concatenated sources to a build error so the parse
/// location renders as a labelled span.
pub fn convert_build_error(err: BuildError, sources: &str) -> CliError {
    match err {
        BuildError::Parse { msg, position, span, .. } => {
            let message = match position {
                Some(p) => format!("{} at {}", msg, p),
                None => msg,
            };
            CliError::Build {
                src: sources.to_string(),
                span: SourceSpan::new(span.start.into(), span.len()),
                message,
            }
        }
        other => CliError::BuildIo(other),
    }
}
