//! Context-sensitive MiGo type inference over SSA programs.
//!
//! The engine interprets a program in SSA form symbolically, tracking
//! channel-shaped data through call frames, and reconstructs its
//! communication behaviour as a MiGo program: one MiGo function per
//! analysed basic block, with explicit channel-parameter plumbing,
//! for-loop summaries and select cases.
//!
//! Every call site materialises a fresh instance with its own block
//! analyser, visit graph, loop detector and exported-name set; the
//! visited-call-site guard keeps recursion finite. The only state shared
//! across frames is the environment: the MiGo program under
//! construction, the globals store, the error channel and the id
//! counters.

pub mod block;
pub mod callctx;
pub mod errors;
pub mod funcs;
pub mod infer;
pub mod loops;
pub mod methods;
pub mod store;

pub use errors::{FatalError, SoftError};
pub use infer::{Environment, Inferer};
