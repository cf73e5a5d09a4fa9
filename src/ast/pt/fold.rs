/// A trait to "fold" the parse tree, so a pass can rewrite a whole tree
/// by defining only the node shapes it cares about.
use anyhow::Result;
use itertools::Itertools;

use super::*;

// Fold pattern:
// - https://rust-unofficial.github.io/patterns/patterns/creational/fold.html
//
// Default impls call the free functions below; a pass overrides the
// methods it needs and calls the free function to continue into children.
pub trait PtFold {
    fn fold_expr(&mut self, mut expr: PtExpr) -> Result<PtExpr> {
        expr.kind = self.fold_expr_kind(expr.kind)?;
        Ok(expr)
    }
    fn fold_expr_kind(&mut self, kind: PtExprKind) -> Result<PtExprKind> {
        fold_expr_kind(self, kind)
    }
    fn fold_exprs(&mut self, exprs: Vec<PtExpr>) -> Result<Vec<PtExpr>> {
        exprs.into_iter().map(|e| self.fold_expr(e)).try_collect()
    }
    fn fold_path(&mut self, mut path: PtPath) -> Result<PtPath> {
        path.kind = self.fold_path_kind(path.kind)?;
        path.bind_obj_before = fold_optional_var(self, path.bind_obj_before)?;
        path.bind_obj_after = fold_optional_var(self, path.bind_obj_after)?;
        path.bind_path = fold_optional_var(self, path.bind_path)?;
        Ok(path)
    }
    fn fold_path_kind(&mut self, kind: PtPathKind) -> Result<PtPathKind> {
        fold_path_kind(self, kind)
    }
    fn fold_paths(&mut self, paths: Vec<PtPath>) -> Result<Vec<PtPath>> {
        paths.into_iter().map(|p| self.fold_path(p)).try_collect()
    }
    fn fold_column_var(&mut self, var: ColumnVar) -> Result<ColumnVar> {
        Ok(var)
    }
    fn fold_column_vars(&mut self, vars: Vec<ColumnVar>) -> Result<Vec<ColumnVar>> {
        vars.into_iter()
            .map(|v| self.fold_column_var(v))
            .try_collect()
    }
    fn fold_global_var(&mut self, var: GlobalVar) -> Result<GlobalVar> {
        Ok(var)
    }
    fn fold_edge_name(&mut self, name: EdgeName) -> Result<EdgeName> {
        fold_edge_name(self, name)
    }
}

pub fn fold_edge_name<F: ?Sized + PtFold>(fold: &mut F, name: EdgeName) -> Result<EdgeName> {
    Ok(match name {
        EdgeName::Static(s) => EdgeName::Static(s),
        EdgeName::Computed(e) => EdgeName::Computed(Box::new(fold.fold_expr(*e)?)),
    })
}

pub fn fold_optional_var<F: ?Sized + PtFold>(
    fold: &mut F,
    var: Option<ColumnVar>,
) -> Result<Option<ColumnVar>> {
    var.map(|v| fold.fold_column_var(v)).transpose()
}

pub fn fold_optional_box<F: ?Sized + PtFold>(
    fold: &mut F,
    opt: Option<Box<PtExpr>>,
) -> Result<Option<Box<PtExpr>>> {
    Ok(match opt {
        Some(e) => Some(Box::new(fold.fold_expr(*e)?)),
        None => None,
    })
}

pub fn fold_path_kind<F: ?Sized + PtFold>(fold: &mut F, kind: PtPathKind) -> Result<PtPathKind> {
    Ok(match kind {
        PtPathKind::Sequence(items) => PtPathKind::Sequence(fold.fold_paths(items)?),
        PtPathKind::Alternates { items, tail_var } => PtPathKind::Alternates {
            items: fold.fold_paths(items)?,
            tail_var: fold_optional_var(fold, tail_var)?,
        },
        PtPathKind::Optional { sub, nil_columns } => PtPathKind::Optional {
            sub: Box::new(fold.fold_path(*sub)?),
            nil_columns: fold.fold_column_vars(nil_columns)?,
        },
        PtPathKind::Repeated {
            sub,
            path_from_inside,
            path_on_outside,
        } => PtPathKind::Repeated {
            sub: Box::new(fold.fold_path(*sub)?),
            path_from_inside: fold_optional_var(fold, path_from_inside)?,
            path_on_outside: fold_optional_var(fold, path_on_outside)?,
        },
        PtPathKind::NilBind { before, sub, after } => PtPathKind::NilBind {
            before: fold.fold_column_vars(before)?,
            sub: Box::new(fold.fold_path(*sub)?),
            after: fold.fold_column_vars(after)?,
        },
        PtPathKind::Edge { name, reversed } => PtPathKind::Edge {
            name: fold.fold_edge_name(name)?,
            reversed,
        },
    })
}

pub fn fold_expr_kind<F: ?Sized + PtFold>(fold: &mut F, kind: PtExprKind) -> Result<PtExprKind> {
    Ok(match kind {
        PtExprKind::Select {
            sub,
            result,
            distinct,
        } => PtExprKind::Select {
            sub: Box::new(fold.fold_expr(*sub)?),
            result: Box::new(fold.fold_expr(*result)?),
            distinct,
        },
        PtExprKind::From(items) => PtExprKind::From(fold.fold_exprs(items)?),
        PtExprKind::Where { sub, pred } => PtExprKind::Where {
            sub: Box::new(fold.fold_expr(*sub)?),
            pred: Box::new(fold.fold_expr(*pred)?),
        },
        PtExprKind::Group { sub, vars, newvar } => PtExprKind::Group {
            sub: Box::new(fold.fold_expr(*sub)?),
            vars: fold.fold_column_vars(vars)?,
            newvar: fold_optional_var(fold, newvar)?,
        },
        PtExprKind::Ungroup { sub, var } => PtExprKind::Ungroup {
            sub: Box::new(fold.fold_expr(*sub)?),
            var: fold.fold_column_var(var)?,
        },
        PtExprKind::Rename { sub, name } => PtExprKind::Rename {
            sub: Box::new(fold.fold_expr(*sub)?),
            name: fold.fold_edge_name(name)?,
        },
        PtExprKind::Path {
            root,
            body,
            more_bindings,
        } => PtExprKind::Path {
            root: Box::new(fold.fold_expr(*root)?),
            body: fold.fold_path(body)?,
            more_bindings: fold.fold_exprs(more_bindings)?,
        },
        PtExprKind::Tuple(items) => PtExprKind::Tuple(fold.fold_exprs(items)?),
        PtExprKind::Forall { var, set, pred } => PtExprKind::Forall {
            var: fold.fold_column_var(var)?,
            set: Box::new(fold.fold_expr(*set)?),
            pred: Box::new(fold.fold_expr(*pred)?),
        },
        PtExprKind::Exists { var, set, pred } => PtExprKind::Exists {
            var: fold.fold_column_var(var)?,
            set: Box::new(fold.fold_expr(*set)?),
            pred: Box::new(fold.fold_expr(*pred)?),
        },
        PtExprKind::Map { var, set, result } => PtExprKind::Map {
            var: fold.fold_column_var(var)?,
            set: Box::new(fold.fold_expr(*set)?),
            result: Box::new(fold.fold_expr(*result)?),
        },
        PtExprKind::Assign { var, value, body } => PtExprKind::Assign {
            var: fold.fold_column_var(var)?,
            value: Box::new(fold.fold_expr(*value)?),
            body: fold_optional_box(fold, body)?,
        },
        PtExprKind::Bop { l, op, r } => PtExprKind::Bop {
            l: Box::new(fold.fold_expr(*l)?),
            op,
            r: Box::new(fold.fold_expr(*r)?),
        },
        PtExprKind::Uop { op, sub } => PtExprKind::Uop {
            op,
            sub: Box::new(fold.fold_expr(*sub)?),
        },
        PtExprKind::Func { op, args } => PtExprKind::Func {
            op,
            args: fold.fold_exprs(args)?,
        },
        PtExprKind::ReadAnyVar(name) => PtExprKind::ReadAnyVar(name),
        PtExprKind::ReadColumnVar(var) => {
            PtExprKind::ReadColumnVar(fold.fold_column_var(var)?)
        }
        PtExprKind::ReadGlobalVar(var) => {
            PtExprKind::ReadGlobalVar(fold.fold_global_var(var)?)
        }
        PtExprKind::Value(v) => PtExprKind::Value(v),
    })
}
