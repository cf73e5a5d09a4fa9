//! Pick joins that can be done as graph steps.
//!
//! A join has the form of a step join if one side is a scan and the
//! predicate compares a column of the other side to one of the scan's
//! object columns (forward against the left object, reversed against the
//! right). If the predicate also pins the scan's edge column to a
//! constant, the constant becomes the step's edge name. Matched
//! conjuncts are pruned; whatever remains rides along as the step's
//! residual predicate.

use anyhow::Result;

use crate::ast::cols::{ColName, ColTree};
use crate::ast::ops::Func;
use crate::ast::tc::{fold_expr_kind, TcExpr, TcExprKind, TcFold, TcVar};
use crate::context::Context;
use crate::value::Value;

pub fn stepjoins(_ctx: &mut Context, te: TcExpr) -> Result<TcExpr> {
    StepJoins.fold_expr(te)
}

struct StepJoins;

impl TcFold for StepJoins {
    fn fold_expr(&mut self, mut e: TcExpr) -> Result<TcExpr> {
        e.kind = self.fold_expr_kind(e.kind)?;
        if e.kind.is_join() {
            e = try_convert(e);
        }
        Ok(e)
    }

    fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
        fold_expr_kind(self, kind)
    }
}

/// Is this `(λvar. body).cols` a single-column projection of `lvar`?
fn projected_column<'e>(e: &'e TcExpr, lvar: &TcVar) -> Option<&'e ColName> {
    if let TcExprKind::Project { sub, cols } = &e.kind {
        if cols.num() == 1 {
            if let TcExprKind::ReadVar(v) = &sub.kind {
                if v == lvar {
                    return Some(cols.get(0));
                }
            }
        }
    }
    None
}

/// Find a conjunct equating a column of `name` with `leftcol` or
/// `rightcol`; prune it and report the column and direction.
fn check_join_predicate(
    predicate: &mut TcExpr,
    name: &ColTree,
    lvar: &TcVar,
    leftcol: &ColName,
    rightcol: &ColName,
) -> Option<(ColName, bool)> {
    if let TcExprKind::Bop {
        left,
        op: Func::And,
        right,
    } = &mut predicate.kind
    {
        if let Some(hit) = check_join_predicate(left, name, lvar, leftcol, rightcol) {
            return Some(hit);
        }
        if let Some(hit) = check_join_predicate(right, name, lvar, leftcol, rightcol) {
            return Some(hit);
        }
        return None;
    }

    if let TcExprKind::Bop {
        left,
        op: Func::Eq,
        right,
    } = &predicate.kind
    {
        if let (Some(c1), Some(c2)) = (projected_column(left, lvar), projected_column(right, lvar))
        {
            let hit = if name.contains_toplevel(c1) && c2 == leftcol {
                Some((c1.clone(), false))
            } else if name.contains_toplevel(c1) && c2 == rightcol {
                Some((c1.clone(), true))
            } else if name.contains_toplevel(c2) && c1 == leftcol {
                Some((c2.clone(), false))
            } else if name.contains_toplevel(c2) && c1 == rightcol {
                Some((c2.clone(), true))
            } else {
                None
            };
            if let Some(hit) = hit {
                *predicate = TcExpr::value(Value::Bool(true));
                return Some(hit);
            }
        }
    }

    None
}

/// Find a conjunct pinning `edgecol` to a constant; prune it and return
/// the constant.
fn check_edge_predicate(
    predicate: &mut TcExpr,
    lvar: &TcVar,
    edgecol: &ColName,
) -> Option<Value> {
    if let TcExprKind::Bop {
        left,
        op: Func::And,
        right,
    } = &mut predicate.kind
    {
        if let Some(v) = check_edge_predicate(left, lvar, edgecol) {
            return Some(v);
        }
        if let Some(v) = check_edge_predicate(right, lvar, edgecol) {
            return Some(v);
        }
        return None;
    }

    if let TcExprKind::Bop {
        left,
        op: Func::Eq,
        right,
    } = &predicate.kind
    {
        let constant = if projected_column(left, lvar) == Some(edgecol) {
            match &right.kind {
                TcExprKind::Value(v) => Some(v.clone()),
                _ => None,
            }
        } else if projected_column(right, lvar) == Some(edgecol) {
            match &left.kind {
                TcExprKind::Value(v) => Some(v.clone()),
                _ => None,
            }
        } else {
            None
        };
        if let Some(v) = constant {
            *predicate = TcExpr::value(Value::Bool(true));
            return Some(v);
        }
    }

    None
}

/// Drop the pruned `true` conjuncts; a predicate of nothing but `true`
/// disappears entirely.
fn simplify_trues(e: TcExpr) -> TcExpr {
    let TcExpr {
        kind,
        datatype,
        colnames,
    } = e;
    match kind {
        TcExprKind::Bop {
            left,
            op: Func::And,
            right,
        } => {
            let left = simplify_trues(*left);
            let right = simplify_trues(*right);
            match (
                matches!(&left.kind, TcExprKind::Value(Value::Bool(true))),
                matches!(&right.kind, TcExprKind::Value(Value::Bool(true))),
            ) {
                (true, _) => right,
                (_, true) => left,
                _ => TcExpr::bop(left, Func::And, right),
            }
        }
        kind => TcExpr {
            kind,
            datatype,
            colnames,
        },
    }
}

fn try_convert(mut join: TcExpr) -> TcExpr {
    let TcExprKind::Join {
        left,
        right,
        predicate,
    } = &mut join.kind
    else {
        unreachable!()
    };

    let scan_on_left = left.kind.is_scan();
    if !scan_on_left && !right.kind.is_scan() {
        return join;
    }
    let (scan, other) = if scan_on_left {
        (&mut **left, &mut **right)
    } else {
        (&mut **right, &mut **left)
    };

    let Some(predicate) = predicate else {
        return join;
    };
    let TcExprKind::Lambda { var, body } = &mut predicate.kind else {
        return join;
    };
    let TcExprKind::Scan {
        leftobjcolumn,
        edgecolumn,
        rightobjcolumn,
        predicate: scanpred,
    } = &scan.kind
    else {
        unreachable!()
    };

    let Some(othercols) = other.colnames.as_ref() else {
        return join;
    };

    let Some((othercol, reversed)) =
        check_join_predicate(body, othercols, var, leftobjcolumn, rightobjcolumn)
    else {
        return join;
    };

    // optionally, a constant edge name
    let edgename = check_edge_predicate(body, var, edgecolumn);

    // matched: take the pieces apart
    let leftobjcolumn = leftobjcolumn.clone();
    let edgecolumn = edgecolumn.clone();
    let rightobjcolumn = rightobjcolumn.clone();
    let scanpred = scanpred.clone();
    let other = Box::new(std::mem::replace(other, TcExpr::value(Value::Nil)));
    let predicate = std::mem::replace(
        predicate,
        Box::new(TcExpr::value(Value::Bool(true))),
    );

    // residual predicate: the remaining conjuncts, plus anything the
    // scan itself carried
    let mut residual = Some(predicate);
    if let Some(r) = residual.take() {
        let TcExprKind::Lambda { var, body } = r.kind else {
            unreachable!()
        };
        let body = simplify_trues(*body);
        if !matches!(&body.kind, TcExprKind::Value(Value::Bool(true))) {
            residual = Some(Box::new(TcExpr::lambda(var, body)));
        }
    }
    let residual = match (residual, scanpred) {
        (None, sp) => sp,
        (rp, None) => rp,
        (Some(rp), Some(sp)) => {
            // both present: conjoin under the join predicate's variable
            let TcExprKind::Lambda { var: rv, body: rb } = rp.kind else {
                unreachable!()
            };
            let TcExprKind::Lambda { var: sv, body: sb } = sp.kind else {
                unreachable!()
            };
            let sb = super::baseopt::subst_var(*sb, &sv, &rv);
            Some(Box::new(TcExpr::lambda(
                rv,
                TcExpr::bop(*rb, Func::And, sb),
            )))
        }
    };

    let mut step = TcExpr::new(TcExprKind::Step {
        sub: other,
        subcolumn: othercol,
        edgename,
        reversed,
        leftobjcolumn,
        edgecolumn,
        rightobjcolumn,
        predicate: residual,
    });
    step.datatype = join.datatype;
    step.colnames = join.colnames;
    step
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::parser;
    use crate::semantic;

    fn optimized(text: &str) -> (Context, TcExpr) {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = semantic::resolve::resolve_vars(&mut ctx, pt).unwrap();
        let pt = semantic::normalize::normalize(&mut ctx, pt).unwrap();
        let pt = semantic::unify::unify(&mut ctx, pt).unwrap();
        let pt = semantic::movepaths::movepaths(&mut ctx, pt).unwrap();
        let pt = semantic::bindnil::bindnil(&mut ctx, pt).unwrap();
        let pt = semantic::dequantify::dequantify(&mut ctx, pt).unwrap();
        let mut tc = semantic::tuplify::tuplify(&mut ctx, pt).unwrap();
        semantic::typeinf::typeinf(&mut ctx, &mut tc).unwrap();
        let tc = super::super::norenames::norenames(&mut ctx, tc).unwrap();
        let mut tc = tc;
        semantic::recheck(&mut ctx, &mut tc).unwrap();
        let tc = super::super::baseopt::baseopt(&mut ctx, tc).unwrap();
        let mut tc = tc;
        semantic::recheck(&mut ctx, &mut tc).unwrap();
        let tc = stepjoins(&mut ctx, tc).unwrap();
        (ctx, tc)
    }

    fn count_kind(tc: &TcExpr, pred: fn(&TcExprKind) -> bool) -> usize {
        struct Counter(usize, fn(&TcExprKind) -> bool);
        impl TcFold for Counter {
            fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
                if (self.1)(&kind) {
                    self.0 += 1;
                }
                fold_expr_kind(self, kind)
            }
        }
        let mut c = Counter(0, pred);
        c.fold_expr(tc.clone()).unwrap();
        c.0
    }

    #[test]
    fn edge_walk_becomes_step() {
        let (_, tc) = optimized("select X from A.friend as X");
        assert_eq!(count_kind(&tc, |k| k.is_step()), 1);
        assert_eq!(count_kind(&tc, |k| k.is_scan()), 0);
        assert_eq!(count_kind(&tc, |k| k.is_join()), 0);
    }

    #[test]
    fn step_carries_literal_edge_name() {
        let (_, tc) = optimized("select X from A.friend as X");
        struct FindStep(Option<(Option<Value>, bool)>);
        impl TcFold for FindStep {
            fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
                if let TcExprKind::Step {
                    edgename, reversed, ..
                } = &kind
                {
                    self.0 = Some((edgename.clone(), *reversed));
                }
                fold_expr_kind(self, kind)
            }
        }
        let mut f = FindStep(None);
        f.fold_expr(tc).unwrap();
        let (edge, reversed) = f.0.expect("no step found");
        assert_eq!(edge, Some(Value::String("friend".into())));
        assert!(!reversed);
    }

    #[test]
    fn reversed_edge_detected() {
        let (_, tc) = optimized("select X from A.@friend as X");
        struct FindStep(Option<bool>);
        impl TcFold for FindStep {
            fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
                if let TcExprKind::Step { reversed, .. } = &kind {
                    self.0 = Some(*reversed);
                }
                fold_expr_kind(self, kind)
            }
        }
        let mut f = FindStep(None);
        f.fold_expr(tc).unwrap();
        assert_eq!(f.0, Some(true));
    }

    #[test]
    fn wildcard_edge_keeps_residual() {
        // a pattern edge can't be pinned to a literal; the LIKE conjunct
        // stays as the step's residual predicate
        let (_, tc) = optimized("select X from A.\"fr%\" as X");
        struct FindStep(Option<(Option<Value>, bool)>);
        impl TcFold for FindStep {
            fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
                if let TcExprKind::Step {
                    edgename,
                    predicate,
                    ..
                } = &kind
                {
                    self.0 = Some((edgename.clone(), predicate.is_some()));
                }
                fold_expr_kind(self, kind)
            }
        }
        let mut f = FindStep(None);
        f.fold_expr(tc).unwrap();
        let (edge, has_residual) = f.0.expect("no step found");
        assert_eq!(edge, None);
        assert!(has_residual);
    }

    #[test]
    fn still_typechecks_after_stepjoins() {
        let (mut ctx, mut tc) = optimized("select count(Y) from A.friend as X, X.friend as Y");
        semantic::recheck(&mut ctx, &mut tc).unwrap();
        assert!(ctx.errors().is_empty(), "{}", ctx.errors());
    }
}
