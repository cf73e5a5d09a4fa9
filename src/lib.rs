//! Compiler and evaluator for PQL, a Lorel-style path query language
//! over provenance graphs.
//!
//! You probably want to start with [Context]: create one over a
//! [backend::Backend], [Context::compile] a query string, and
//! [Context::run] the result.
//!
//! For more granular access, the pipeline is:
//! ```ascii
//!             PQL text
//!
//!     (parse)    │
//!                ▼
//!             PT  ──resolve──normalize──unify──movepaths──
//!                  bindnil──dequantify──►  PT
//!                │
//!     (tuplify)  │
//!                ▼
//!             TC  ──typeinf──typecheck──norenames──
//!                  baseopt──stepjoins──►  TC
//!                │
//!       (eval)   │
//!                ▼
//!              Value
//! ```

// Our error type carries several strings; boxing it everywhere isn't
// worth the churn for a compiler that runs queries measured in
// milliseconds.
#![allow(clippy::result_large_err)]

pub mod ast;
pub mod backend;
mod context;
mod error;
mod eval;
mod opt;
mod parser;
pub mod semantic;
mod utils;
pub mod value;

pub use backend::{Backend, MemGraph};
pub use context::{Context, DumpStage, Options, Query};
pub use error::{ErrorMessage, ErrorMessages, SourceLocation, Span};
pub use value::{Oid, Value};

/// Compile and run a query in one shot.
pub fn query(ctx: &mut Context, text: &str) -> Result<Value, ErrorMessages> {
    let compiled = ctx.compile(text)?;
    ctx.run(&compiled)
}
