//! Engine error families.
//!
//! Soft errors are reported into a channel drained by a sibling task and
//! never stop the analysis; fatal errors propagate as `Result`s to the
//! driver, which terminates with a non-zero exit.

use std::sync::mpsc;
use std::thread;

use thiserror::Error;

/// Recoverable analysis errors. Each carries its source position already
/// rendered, so the draining task needs no access to the file set.
#[derive(Debug, Error)]
pub enum SoftError {
    #[error("{pos}: channel buffer size is not constant")]
    ChanBufSizeNonStatic { pos: String },
    #[error("incompatible type: cannot dereference {ptr} into {val}")]
    IncompatibleType { ptr: String, val: String },
    #[error("object unique ID clashed (id: {id})")]
    IdClash { id: String },
    #[error("object undefined (id: {id})")]
    ObjUndef { id: String },
}

/// Unrecoverable invariant violations: the analysis aborts.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("mismatched argument({nargs})/parameter({nparams}) calling {callee} at {pos}")]
    ArityMismatch { callee: String, nargs: usize, nparams: usize, pos: String },
    #[error("function is nil")]
    FnIsNil,
    #[error("cannot find main package")]
    NoMainPackage,
    #[error("cannot find entry function {0}")]
    NoEntryFunc(String),
}

/// Sending half of the soft-error channel.
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<SoftError>,
}

impl ErrorSink {
    pub fn report(&self, err: SoftError) {
        // A closed channel means the drain task is gone; fall back to the
        // log so the report is not lost.
        if let Err(mpsc::SendError(err)) = self.tx.send(err) {
            log::error!(target: "engine", "{}", err);
        }
    }
}

/// Creates the soft-error channel and spawns the draining task, which
/// formats and logs every report.
pub fn error_channel() -> ErrorSink {
    let (tx, rx) = mpsc::channel::<SoftError>();
    thread::spawn(move || {
        for err in rx {
            log::error!(target: "engine", "{}", err);
        }
    });
    ErrorSink { tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_does_not_block_or_panic() {
        let sink = error_channel();
        sink.report(SoftError::IdClash { id: "x_chan0".to_string() });
        sink.report(SoftError::ChanBufSizeNonStatic { pos: "a.ssa:3:5".to_string() });
    }
}
