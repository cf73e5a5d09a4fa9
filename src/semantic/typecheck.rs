//! Tuple-calculus verifier.
//!
//! Re-checks what inference produced: every node typed, column arity
//! agreeing with datatype arity, referenced columns present in the child
//! shape, no duplicated column names, and operator arguments compatible
//! with their operator. Unlike inference this pass reports, and it keeps
//! going after the first error so one compilation surfaces as many
//! problems as it can.

use anyhow::Result;

use crate::ast::cols::{ColSet, ColTree};
use crate::ast::tc::{TcExpr, TcExprKind};
use crate::ast::ty::TyKind;
use crate::context::Context;

pub fn typecheck(ctx: &mut Context, te: &TcExpr) -> Result<()> {
    let mut tc = TypeCheck { ctx };
    tc.check(te);
    Ok(())
}

struct TypeCheck<'a> {
    ctx: &'a mut Context,
}

impl<'a> TypeCheck<'a> {
    fn fail(&mut self, what: &TcExpr, msg: String) {
        let _ = what;
        self.ctx.complain(None, msg);
    }

    fn child_cols<'t>(&mut self, te: &TcExpr, sub: &'t TcExpr) -> Option<&'t ColTree> {
        match sub.colnames.as_ref() {
            Some(ct) => Some(ct),
            None => {
                self.fail(te, format!("typecheck: {} child has no columns", te.kind.as_ref()));
                None
            }
        }
    }

    fn require_cols(&mut self, te: &TcExpr, sub: &TcExpr, cols: &ColSet) {
        if cols.is_tocomplement() {
            self.fail(
                te,
                format!(
                    "typecheck: unresolved complement column set in {}",
                    te.kind.as_ref()
                ),
            );
            return;
        }
        let Some(ct) = self.child_cols(te, sub) else {
            return;
        };
        let missing: Vec<String> = cols
            .iter()
            .filter(|c| !ct.contains_toplevel(c))
            .map(|c| c.name().to_string())
            .collect();
        for name in missing {
            self.fail(
                te,
                format!(
                    "typecheck: column {} named by {} is not in its input",
                    name,
                    te.kind.as_ref()
                ),
            );
        }
    }

    /// The node-local invariants every typed node must satisfy.
    fn check_annotations(&mut self, te: &TcExpr) {
        let Some(ty) = te.datatype else {
            self.fail(te, format!("typecheck: {} has no datatype", te.kind.as_ref()));
            return;
        };
        let Some(ct) = te.colnames.as_ref() else {
            self.fail(te, format!("typecheck: {} has no columns", te.kind.as_ref()));
            return;
        };

        if ty != self.ctx.types.top() && ct.arity() != self.ctx.types.nonset_arity(ty) {
            let msg = format!(
                "typecheck: {} has {} columns but datatype {} has arity {}",
                te.kind.as_ref(),
                ct.arity(),
                self.ctx.types.name(ty),
                self.ctx.types.nonset_arity(ty)
            );
            self.fail(te, msg);
        }

        if ct.has_duplicates() {
            self.fail(
                te,
                format!("typecheck: duplicate column name in {}", te.kind.as_ref()),
            );
        }
    }

    fn check(&mut self, te: &TcExpr) {
        self.check_annotations(te);

        match &te.kind {
            TcExprKind::Filter { sub, predicate } => {
                self.check(sub);
                self.check(predicate);
                if let Some(subty) = sub.datatype {
                    if !self.ctx.types.is_collection(subty)
                        && subty != self.ctx.types.top()
                    {
                        let msg = format!(
                            "typecheck: filter over non-set {}",
                            self.ctx.types.name(subty)
                        );
                        self.fail(te, msg);
                    }
                }
                if let Some(predty) = predicate.datatype {
                    match self.ctx.types.kind(predty) {
                        TyKind::Lambda(_, res) => {
                            if *res != self.ctx.types.bool()
                                && *res != self.ctx.types.top()
                                && *res != self.ctx.types.absbottom()
                            {
                                let msg = format!(
                                    "typecheck: filter predicate returns {}",
                                    self.ctx.types.name(*res)
                                );
                                self.fail(te, msg);
                            }
                        }
                        _ => {
                            let msg = format!(
                                "typecheck: filter predicate is {}",
                                self.ctx.types.name(predty)
                            );
                            self.fail(te, msg);
                        }
                    }
                }
            }

            TcExprKind::Project { sub, cols }
            | TcExprKind::Strip { sub, cols }
            | TcExprKind::Order { sub, cols }
            | TcExprKind::Uniq { sub, cols } => {
                self.check(sub);
                self.require_cols(te, sub, cols);
            }

            TcExprKind::Rename {
                sub,
                oldcol,
                newcol: _,
            } => {
                self.check(sub);
                if let Some(old) = oldcol {
                    self.require_cols(te, sub, &ColSet::singleton(old.clone()));
                }
            }

            TcExprKind::Join {
                left,
                right,
                predicate,
            } => {
                self.check(left);
                self.check(right);
                if let Some(pred) = predicate {
                    self.check(pred);
                }
            }

            TcExprKind::Nest { sub, cols, newcol: _ } => {
                self.check(sub);
                self.require_cols(te, sub, cols);
            }

            TcExprKind::Unnest { sub, col } => {
                self.check(sub);
                self.require_cols(te, sub, &ColSet::singleton(col.clone()));
                // no shape check on the column: path hoisting leaves some
                // set positions holding scalars, which unnest as their
                // singletons
            }

            TcExprKind::Distinguish { sub, .. } => self.check(sub),

            TcExprKind::Adjoin { left, func, .. } => {
                self.check(left);
                self.check(func);
                if let Some(fty) = func.datatype {
                    if !matches!(self.ctx.types.kind(fty), TyKind::Lambda(..)) {
                        let msg = format!(
                            "typecheck: adjoin function is {}",
                            self.ctx.types.name(fty)
                        );
                        self.fail(te, msg);
                    }
                }
            }

            TcExprKind::Step { sub, subcolumn, predicate, .. } => {
                self.check(sub);
                self.require_cols(te, sub, &ColSet::singleton(subcolumn.clone()));
                if let Some(pred) = predicate {
                    self.check(pred);
                }
            }

            TcExprKind::Repeat {
                sub,
                subendcolumn,
                body,
                ..
            } => {
                self.check(sub);
                self.require_cols(te, sub, &ColSet::singleton(subendcolumn.clone()));
                self.check(body);
            }

            TcExprKind::Scan { predicate, .. } => {
                if let Some(pred) = predicate {
                    self.check(pred);
                }
            }

            TcExprKind::Bop { left, op, right } => {
                self.check(left);
                self.check(right);
                self.check_args(te, *op, &[left.as_ref(), right.as_ref()]);
            }

            TcExprKind::Uop { op, sub } => {
                self.check(sub);
                self.check_args(te, *op, &[sub.as_ref()]);
            }

            TcExprKind::Func { op, args } => {
                for a in args {
                    self.check(a);
                }
                let refs: Vec<&TcExpr> = args.iter().collect();
                self.check_args(te, *op, &refs);
            }

            TcExprKind::Map { var, set, result } => {
                self.check(set);
                self.check(result);
                if var.datatype().is_none() {
                    self.fail(te, "typecheck: unbound map variable".to_string());
                }
            }

            TcExprKind::Let { var, value, body } => {
                self.check(value);
                self.check(body);
                if var.datatype().is_none() {
                    self.fail(te, "typecheck: unbound let variable".to_string());
                }
            }

            TcExprKind::Lambda { var, body } => {
                self.check(body);
                if var.datatype().is_none() {
                    self.fail(te, "typecheck: unbound lambda variable".to_string());
                }
            }

            TcExprKind::Apply { lambda, arg } => {
                self.check(lambda);
                self.check(arg);
            }

            TcExprKind::ReadVar(var) => {
                if var.datatype().is_none() {
                    self.fail(te, "typecheck: read of unbound variable".to_string());
                }
            }

            TcExprKind::CreatePathElement(sub) => {
                self.check(sub);
                if let Some(sty) = sub.datatype {
                    if self.ctx.types.nonset_arity(sty) != 3
                        && sty != self.ctx.types.top()
                    {
                        let msg = format!(
                            "typecheck: pathelement from {}",
                            self.ctx.types.name(sty)
                        );
                        self.fail(te, msg);
                    }
                }
            }

            TcExprKind::Splatter { value, name } => {
                self.check(value);
                self.check(name);
            }

            TcExprKind::Tuple { exprs, columns } => {
                for e in exprs {
                    self.check(e);
                }
                if exprs.len() != columns.num() {
                    self.fail(te, "typecheck: tuple arity mismatch".to_string());
                }
            }

            TcExprKind::ReadGlobal(_) | TcExprKind::Value(_) => {}
        }
    }

    /// Per-operator argument constraints: the most general type an
    /// argument may have; an argument is acceptable when it
    /// specializes it.
    fn check_args(&mut self, te: &TcExpr, op: crate::ast::ops::Func, args: &[&TcExpr]) {
        use crate::ast::ops::Func;
        // new() on no arguments allocates a bare object
        if matches!(op, Func::Ctime | Func::New) && args.is_empty() {
            return;
        }
        for (i, arg) in args.iter().enumerate() {
            let Some(argty) = arg.datatype else {
                continue;
            };
            let want = self.want_argtype(op, i);
            if !self.ctx.types.match_specialize(want, argty) {
                let msg = format!(
                    "typecheck: argument {} of {} is {}, expected {}",
                    i,
                    op,
                    self.ctx.types.name(argty),
                    self.ctx.types.name(want)
                );
                self.fail(te, msg);
            }
        }
    }

    fn want_argtype(&mut self, op: crate::ast::ops::Func, argnum: usize) -> crate::ast::ty::Ty {
        use crate::ast::ops::Func;
        let st = &mut self.ctx.types;
        match op {
            Func::Union
            | Func::Intersect
            | Func::Except
            | Func::UnionAll
            | Func::IntersectAll
            | Func::ExceptAll => {
                let top = st.top();
                st.set(top)
            }
            Func::In => {
                if argnum == 0 {
                    st.top()
                } else {
                    let top = st.top();
                    st.set(top)
                }
            }
            Func::NonEmpty | Func::GetElement => {
                let top = st.top();
                st.set(top)
            }
            // an aggregate of a scalar is the aggregate of its singleton
            Func::Count
            | Func::Sum
            | Func::Avg
            | Func::Min
            | Func::Max
            | Func::AllTrue
            | Func::AnyTrue => st.top(),
            Func::Like | Func::Glob | Func::Grep | Func::Soundex => st.absdbedge(),
            Func::Lt
            | Func::Gt
            | Func::LtEq
            | Func::GtEq
            | Func::Add
            | Func::Sub
            | Func::Mul
            | Func::Div
            | Func::Mod
            | Func::Neg
            | Func::Abs => st.absnumber(),
            Func::And | Func::Or | Func::Not => st.bool(),
            _ => st.top(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::parser;
    use crate::semantic;

    fn checked(text: &str) -> Context {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = semantic::resolve::resolve_vars(&mut ctx, pt).unwrap();
        let pt = semantic::normalize::normalize(&mut ctx, pt).unwrap();
        let pt = semantic::unify::unify(&mut ctx, pt).unwrap();
        let pt = semantic::movepaths::movepaths(&mut ctx, pt).unwrap();
        let pt = semantic::bindnil::bindnil(&mut ctx, pt).unwrap();
        let pt = semantic::dequantify::dequantify(&mut ctx, pt).unwrap();
        assert!(ctx.errors().is_empty(), "{}", ctx.errors());
        let mut tc = semantic::tuplify::tuplify(&mut ctx, pt).unwrap();
        semantic::typeinf::typeinf(&mut ctx, &mut tc).unwrap();
        typecheck(&mut ctx, &tc).unwrap();
        ctx
    }

    #[test]
    fn well_typed_queries_pass() {
        for q in [
            "select X from A.friend as X",
            "select X from A.friend+ as X",
            "select X from A.friend as X where exists Y in X.friend: Y = D",
            "select count(Y) from A.friend as X, X.friend as Y",
            "select X.friend ++ X.parent from A.friend as X",
            "select distinct E from A.friend as X, X.(friend|parent) as Y as E",
            "select X, 2 + 2 from A.friend as X group by X as G",
        ] {
            let ctx = checked(q);
            assert!(ctx.errors().is_empty(), "query {:?}: {}", q, ctx.errors());
        }
    }

    #[test]
    fn arithmetic_on_sets_is_rejected() {
        let ctx = checked("select X + 1 from A.friend as X where X = X");
        // X is a dbobj, not a number
        assert!(!ctx.errors().is_empty());
        assert!(ctx
            .errors()
            .inner
            .iter()
            .any(|e| e.reason.contains("expected number")));
    }

    #[test]
    fn boolean_ops_need_bools() {
        let ctx = checked("select X from A.friend as X where X and true");
        assert!(!ctx.errors().is_empty());
    }
}
