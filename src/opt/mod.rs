//! Tuple-calculus rewriting passes: rename elimination, the base
//! optimizer, and the step-join specializer. Each is followed by
//! re-inference and re-verification, so the tree always typechecks
//! between passes.

pub mod baseopt;
pub mod norenames;
pub mod stepjoins;

use anyhow::Result;

use crate::ast::tc;
use crate::context::{Context, DumpStage, Query};
use crate::semantic;

pub fn optimize(ctx: &mut Context, te: tc::TcExpr) -> Result<Query> {
    let mut te = norenames::norenames(ctx, te)?;
    ctx.add_dump(DumpStage::NoRenames, tc::dump::dump(&te, None));
    semantic::recheck(ctx, &mut te)?;

    let mut te = baseopt::baseopt(ctx, te)?;
    ctx.add_dump(DumpStage::BaseOpt, tc::dump::dump(&te, None));
    semantic::recheck(ctx, &mut te)?;

    let mut te = stepjoins::stepjoins(ctx, te)?;
    ctx.add_dump(DumpStage::StepJoins, tc::dump::dump(&te, None));
    semantic::recheck(ctx, &mut te)?;

    let datatype = te.datatype.expect("optimize: untyped result");
    let colnames = te.colnames.clone().expect("optimize: unnamed result");
    Ok(Query {
        tc: te,
        datatype,
        colnames,
    })
}
