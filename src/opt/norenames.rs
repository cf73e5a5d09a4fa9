//! Apply and remove all rename nodes.
//!
//! Because column names are distinguished by identity (even when the
//! user recklessly spells two of them the same), substituting the new
//! name for the old throughout the subtree below a rename can neither
//! capture nor conflate anything. And because every name arises
//! structurally rather than being read from the database on the fly,
//! afterwards no renames remain.

use anyhow::Result;

use crate::ast::cols::{ColName, ColTree};
use crate::ast::tc::{fold_expr_kind, TcExpr, TcExprKind, TcFold, TcVar};
use crate::context::Context;

pub fn norenames(_ctx: &mut Context, te: TcExpr) -> Result<TcExpr> {
    let mut nr = NoRenames { stack: Vec::new() };
    let te = nr.fold_expr(te)?;
    assert!(nr.stack.is_empty());
    Ok(te)
}

struct NoRenames {
    /// Renames in effect for the subtree currently being walked,
    /// innermost last.
    stack: Vec<(Option<ColName>, ColName)>,
}

impl NoRenames {
    fn subst(&self, col: ColName) -> ColName {
        for (old, new) in self.stack.iter().rev() {
            if old.as_ref() == Some(&col) {
                return new.clone();
            }
        }
        col
    }

    fn subst_coltree(&self, ct: ColTree) -> ColTree {
        match ct {
            ColTree::Scalar(c) => ColTree::Scalar(self.subst(c)),
            ColTree::Tuple { whole, members } => ColTree::Tuple {
                whole: self.subst(whole),
                members: members.into_iter().map(|m| self.subst_coltree(m)).collect(),
            },
        }
    }
}

impl TcFold for NoRenames {
    fn fold_expr(&mut self, mut e: TcExpr) -> Result<TcExpr> {
        if let TcExprKind::Rename {
            sub,
            oldcol,
            newcol,
        } = e.kind
        {
            self.stack.push((oldcol.clone(), newcol.clone()));
            let mut sub = self.fold_expr(*sub)?;
            self.stack.pop();

            // a whole-value rename names the sub's one column directly
            if oldcol.is_none() {
                sub.colnames = sub.colnames.map(|ct| ct.with_whole(newcol));
            }
            return Ok(sub);
        }

        e.kind = self.fold_expr_kind(e.kind)?;
        e.colnames = e.colnames.map(|ct| self.subst_coltree(ct));
        Ok(e)
    }

    fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
        fold_expr_kind(self, kind)
    }

    fn fold_colname(&mut self, col: ColName) -> Result<ColName> {
        Ok(self.subst(col))
    }

    fn fold_var(&mut self, var: TcVar) -> Result<TcVar> {
        if let Some(ct) = var.coltree() {
            var.set_coltree(self.subst_coltree(ct));
        }
        Ok(var)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::parser;
    use crate::semantic;

    fn derenamed(text: &str) -> (Context, TcExpr) {
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
        let tc = norenames(&mut ctx, tc).unwrap();
        (ctx, tc)
    }

    fn count_renames(tc: &TcExpr) -> usize {
        struct Counter(usize);
        impl TcFold for Counter {
            fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
                if matches!(kind, TcExprKind::Rename { .. }) {
                    self.0 += 1;
                }
                fold_expr_kind(self, kind)
            }
        }
        let mut c = Counter(0);
        c.fold_expr(tc.clone()).unwrap();
        c.0
    }

    #[test]
    fn no_rename_remains() {
        for q in [
            "select X from A.friend as X",
            "select X from A.friend? as X",
            "select distinct E from A.friend as X, X.(friend|parent) as Y as E",
        ] {
            let (_, tc) = derenamed(q);
            assert_eq!(count_renames(&tc), 0, "query {:?}", q);
        }
    }

    #[test]
    fn still_typechecks_after_reinference() {
        let (mut ctx, mut tc) =
            derenamed("select X from A.friend as X where exists Y in X.friend: Y = D");
        semantic::typeinf::typeinf(&mut ctx, &mut tc).unwrap();
        semantic::typecheck::typecheck(&mut ctx, &tc).unwrap();
        assert!(ctx.errors().is_empty(), "{}", ctx.errors());
    }
}
