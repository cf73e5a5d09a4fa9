//! Semantic passes: everything between the parse tree and an optimized,
//! typed tuple-calculus tree.
//!
//! The sequence is fixed; no pass may be reordered or skipped. A pass
//! that records errors aborts the pipeline before the next one runs.

pub mod bindnil;
pub mod dequantify;
pub mod movepaths;
pub mod normalize;
pub mod resolve;
pub mod tuplify;
pub mod typecheck;
pub mod typeinf;
pub mod unify;

use anyhow::Result;

use crate::ast::{pt, tc};
use crate::context::{Context, DumpStage};
use crate::error::ErrorMessages;

/// Run the PT passes, lower to tuple calculus, and infer/verify types.
pub fn resolve(ctx: &mut Context, pe: pt::PtExpr) -> Result<tc::TcExpr> {
    let pe = resolve::resolve_vars(ctx, pe)?;
    ctx.add_dump(DumpStage::Resolve, pt::dump::dump(&pe));
    abort_on_errors(ctx)?;

    let pe = normalize::normalize(ctx, pe)?;
    ctx.add_dump(DumpStage::Normalize, pt::dump::dump(&pe));
    abort_on_errors(ctx)?;

    let pe = unify::unify(ctx, pe)?;
    ctx.add_dump(DumpStage::Unify, pt::dump::dump(&pe));
    abort_on_errors(ctx)?;

    let pe = movepaths::movepaths(ctx, pe)?;
    ctx.add_dump(DumpStage::MovePaths, pt::dump::dump(&pe));
    abort_on_errors(ctx)?;

    let pe = bindnil::bindnil(ctx, pe)?;
    ctx.add_dump(DumpStage::BindNil, pt::dump::dump(&pe));
    abort_on_errors(ctx)?;

    let pe = dequantify::dequantify(ctx, pe)?;
    ctx.add_dump(DumpStage::Dequantify, pt::dump::dump(&pe));
    abort_on_errors(ctx)?;

    let mut te = tuplify::tuplify(ctx, pe)?;
    ctx.add_dump(DumpStage::Tuplify, tc::dump::dump(&te, None));
    abort_on_errors(ctx)?;

    typeinf::typeinf(ctx, &mut te)?;
    ctx.add_dump(DumpStage::TypeInf, tc::dump::dump(&te, Some(&ctx.types)));
    abort_on_errors(ctx)?;

    typecheck::typecheck(ctx, &te)?;
    abort_on_errors(ctx)?;

    Ok(te)
}

/// Re-infer and re-verify after a TC-to-TC rewrite. Inference is
/// idempotent, so this only fills in annotations on nodes a pass built.
pub fn recheck(ctx: &mut Context, te: &mut tc::TcExpr) -> Result<()> {
    typeinf::typeinf(ctx, te)?;
    typecheck::typecheck(ctx, te)?;
    abort_on_errors(ctx)
}

pub(crate) fn abort_on_errors(ctx: &Context) -> Result<()> {
    if ctx.errors().is_empty() {
        Ok(())
    } else {
        // the caller folds the context's error list into the report
        Err(ErrorMessages::empty().into())
    }
}
