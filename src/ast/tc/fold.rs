/// A trait to "fold" tuple-calculus trees, in the same shape as the
/// parse-tree fold.
use anyhow::Result;
use itertools::Itertools;

use super::*;

pub trait TcFold {
    fn fold_expr(&mut self, mut expr: TcExpr) -> Result<TcExpr> {
        expr.kind = self.fold_expr_kind(expr.kind)?;
        Ok(expr)
    }
    fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
        fold_expr_kind(self, kind)
    }
    fn fold_exprs(&mut self, exprs: Vec<TcExpr>) -> Result<Vec<TcExpr>> {
        exprs.into_iter().map(|e| self.fold_expr(e)).try_collect()
    }
    fn fold_var(&mut self, var: TcVar) -> Result<TcVar> {
        Ok(var)
    }
    fn fold_global(&mut self, var: TcGlobal) -> Result<TcGlobal> {
        Ok(var)
    }
    fn fold_colname(&mut self, col: ColName) -> Result<ColName> {
        Ok(col)
    }
    fn fold_colset(&mut self, cols: ColSet) -> Result<ColSet> {
        fold_colset(self, cols)
    }
}

pub fn fold_colset<F: ?Sized + TcFold>(fold: &mut F, cols: ColSet) -> Result<ColSet> {
    let tocomplement = cols.is_tocomplement();
    let mut out = ColSet::from_cols(
        cols.iter()
            .map(|c| fold.fold_colname(c.clone()))
            .try_collect()?,
    );
    if tocomplement {
        out.mark_tocomplement();
    }
    Ok(out)
}

pub fn fold_optional_box<F: ?Sized + TcFold>(
    fold: &mut F,
    opt: Option<Box<TcExpr>>,
) -> Result<Option<Box<TcExpr>>> {
    Ok(match opt {
        Some(e) => Some(Box::new(fold.fold_expr(*e)?)),
        None => None,
    })
}

fn fold_optional_col<F: ?Sized + TcFold>(
    fold: &mut F,
    col: Option<ColName>,
) -> Result<Option<ColName>> {
    col.map(|c| fold.fold_colname(c)).transpose()
}

pub fn fold_expr_kind<F: ?Sized + TcFold>(fold: &mut F, kind: TcExprKind) -> Result<TcExprKind> {
    Ok(match kind {
        TcExprKind::Filter { sub, predicate } => TcExprKind::Filter {
            sub: Box::new(fold.fold_expr(*sub)?),
            predicate: Box::new(fold.fold_expr(*predicate)?),
        },
        TcExprKind::Project { sub, cols } => TcExprKind::Project {
            sub: Box::new(fold.fold_expr(*sub)?),
            cols: fold.fold_colset(cols)?,
        },
        TcExprKind::Strip { sub, cols } => TcExprKind::Strip {
            sub: Box::new(fold.fold_expr(*sub)?),
            cols: fold.fold_colset(cols)?,
        },
        TcExprKind::Rename {
            sub,
            oldcol,
            newcol,
        } => TcExprKind::Rename {
            sub: Box::new(fold.fold_expr(*sub)?),
            oldcol: fold_optional_col(fold, oldcol)?,
            newcol: fold.fold_colname(newcol)?,
        },
        TcExprKind::Join {
            left,
            right,
            predicate,
        } => TcExprKind::Join {
            left: Box::new(fold.fold_expr(*left)?),
            right: Box::new(fold.fold_expr(*right)?),
            predicate: fold_optional_box(fold, predicate)?,
        },
        TcExprKind::Order { sub, cols } => TcExprKind::Order {
            sub: Box::new(fold.fold_expr(*sub)?),
            cols: fold.fold_colset(cols)?,
        },
        TcExprKind::Uniq { sub, cols } => TcExprKind::Uniq {
            sub: Box::new(fold.fold_expr(*sub)?),
            cols: fold.fold_colset(cols)?,
        },
        TcExprKind::Nest { sub, cols, newcol } => TcExprKind::Nest {
            sub: Box::new(fold.fold_expr(*sub)?),
            cols: fold.fold_colset(cols)?,
            newcol: fold.fold_colname(newcol)?,
        },
        TcExprKind::Unnest { sub, col } => TcExprKind::Unnest {
            sub: Box::new(fold.fold_expr(*sub)?),
            col: fold.fold_colname(col)?,
        },
        TcExprKind::Distinguish { sub, newcol } => TcExprKind::Distinguish {
            sub: Box::new(fold.fold_expr(*sub)?),
            newcol: fold.fold_colname(newcol)?,
        },
        TcExprKind::Adjoin { left, func, newcol } => TcExprKind::Adjoin {
            left: Box::new(fold.fold_expr(*left)?),
            func: Box::new(fold.fold_expr(*func)?),
            newcol: fold.fold_colname(newcol)?,
        },
        TcExprKind::Step {
            sub,
            subcolumn,
            edgename,
            reversed,
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate,
        } => TcExprKind::Step {
            sub: Box::new(fold.fold_expr(*sub)?),
            subcolumn: fold.fold_colname(subcolumn)?,
            edgename,
            reversed,
            leftobjcolumn: fold.fold_colname(leftobjcolumn)?,
            edgecolumn: fold.fold_colname(edgecolumn)?,
            rightobjcolumn: fold.fold_colname(rightobjcolumn)?,
            predicate: fold_optional_box(fold, predicate)?,
        },
        TcExprKind::Repeat {
            sub,
            subendcolumn,
            loopvar,
            bodystartcolumn,
            body,
            bodypathcolumn,
            bodyendcolumn,
            repeatpathcolumn,
            repeatendcolumn,
        } => TcExprKind::Repeat {
            sub: Box::new(fold.fold_expr(*sub)?),
            subendcolumn: fold.fold_colname(subendcolumn)?,
            loopvar: fold.fold_var(loopvar)?,
            bodystartcolumn: fold.fold_colname(bodystartcolumn)?,
            body: Box::new(fold.fold_expr(*body)?),
            bodypathcolumn: fold_optional_col(fold, bodypathcolumn)?,
            bodyendcolumn: fold.fold_colname(bodyendcolumn)?,
            repeatpathcolumn: fold_optional_col(fold, repeatpathcolumn)?,
            repeatendcolumn: fold.fold_colname(repeatendcolumn)?,
        },
        TcExprKind::Scan {
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate,
        } => TcExprKind::Scan {
            leftobjcolumn: fold.fold_colname(leftobjcolumn)?,
            edgecolumn: fold.fold_colname(edgecolumn)?,
            rightobjcolumn: fold.fold_colname(rightobjcolumn)?,
            predicate: fold_optional_box(fold, predicate)?,
        },
        TcExprKind::Bop { left, op, right } => TcExprKind::Bop {
            left: Box::new(fold.fold_expr(*left)?),
            op,
            right: Box::new(fold.fold_expr(*right)?),
        },
        TcExprKind::Uop { op, sub } => TcExprKind::Uop {
            op,
            sub: Box::new(fold.fold_expr(*sub)?),
        },
        TcExprKind::Func { op, args } => TcExprKind::Func {
            op,
            args: fold.fold_exprs(args)?,
        },
        TcExprKind::Map { var, set, result } => TcExprKind::Map {
            var: fold.fold_var(var)?,
            set: Box::new(fold.fold_expr(*set)?),
            result: Box::new(fold.fold_expr(*result)?),
        },
        TcExprKind::Let { var, value, body } => TcExprKind::Let {
            var: fold.fold_var(var)?,
            value: Box::new(fold.fold_expr(*value)?),
            body: Box::new(fold.fold_expr(*body)?),
        },
        TcExprKind::Lambda { var, body } => TcExprKind::Lambda {
            var: fold.fold_var(var)?,
            body: Box::new(fold.fold_expr(*body)?),
        },
        TcExprKind::Apply { lambda, arg } => TcExprKind::Apply {
            lambda: Box::new(fold.fold_expr(*lambda)?),
            arg: Box::new(fold.fold_expr(*arg)?),
        },
        TcExprKind::ReadVar(var) => TcExprKind::ReadVar(fold.fold_var(var)?),
        TcExprKind::ReadGlobal(var) => TcExprKind::ReadGlobal(fold.fold_global(var)?),
        TcExprKind::CreatePathElement(sub) => {
            TcExprKind::CreatePathElement(Box::new(fold.fold_expr(*sub)?))
        }
        TcExprKind::Splatter { value, name } => TcExprKind::Splatter {
            value: Box::new(fold.fold_expr(*value)?),
            name: Box::new(fold.fold_expr(*name)?),
        },
        TcExprKind::Tuple { exprs, columns } => TcExprKind::Tuple {
            exprs: fold.fold_exprs(exprs)?,
            columns: fold.fold_colset(columns)?,
        },
        TcExprKind::Value(v) => TcExprKind::Value(v),
    })
}
