//! Nil-binding for conditionally-skipped path sections.
//!
//! A variable bound inside an optional subpath, or inside one alternative
//! of an alternation, has no value when evaluation bypasses its binding.
//! This pass records, on every optional node, the variables to nil-bind
//! when the subpath is skipped; and wraps each alternative in a NilBind
//! listing the variables bound by the *other* alternatives, so that every
//! way through an alternation binds the same set of columns.

use anyhow::Result;

use crate::ast::pt::*;
use crate::context::Context;

pub fn bindnil(_ctx: &mut Context, pe: PtExpr) -> Result<PtExpr> {
    BindNil.fold_expr(pe)
}

struct BindNil;

/// All column variables a path binds, in walk order. Inside a repetition
/// the per-iteration path variable is replaced by the lifted outside one.
fn getvars(pp: &PtPath, fill: &mut Vec<ColumnVar>) {
    match &pp.kind {
        PtPathKind::Sequence(items) | PtPathKind::Alternates { items, .. } => {
            for sub in items {
                getvars(sub, fill);
            }
        }
        PtPathKind::Optional { sub, .. } => getvars(sub, fill),
        PtPathKind::Repeated {
            sub,
            path_from_inside,
            path_on_outside,
        } => {
            getvars(sub, fill);
            if let (Some(inside), Some(outside)) = (path_from_inside, path_on_outside) {
                for v in fill.iter_mut() {
                    if v == inside {
                        *v = outside.clone();
                    }
                }
            }
        }
        PtPathKind::NilBind { before, sub, after } => {
            fill.extend(before.iter().cloned());
            getvars(sub, fill);
            fill.extend(after.iter().cloned());
        }
        PtPathKind::Edge { .. } => {}
    }

    assert!(pp.bind_obj_before.is_none());
    if let Some(v) = &pp.bind_path {
        fill.push(v.clone());
    }
    if let Some(v) = &pp.bind_obj_after {
        fill.push(v.clone());
    }
}

impl PtFold for BindNil {
    fn fold_path_kind(&mut self, kind: PtPathKind) -> Result<PtPathKind> {
        let kind = fold_path_kind(self, kind)?;
        Ok(match kind {
            PtPathKind::Optional { sub, .. } => {
                let mut nil_columns = Vec::new();
                getvars(&sub, &mut nil_columns);
                PtPathKind::Optional { sub, nil_columns }
            }
            PtPathKind::Alternates { items, tail_var } => {
                // collect each alternative's variables, remembering which
                // alternative they came from; then give each alternative
                // the complement to nil-bind. Duplicates across
                // alternatives are ruled out upstream.
                let mut vars: Vec<ColumnVar> = Vec::new();
                let mut numafter = Vec::with_capacity(items.len());
                for sub in &items {
                    getvars(sub, &mut vars);
                    numafter.push(vars.len());
                }

                let items = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, sub)| {
                        let skipstart = if i == 0 { 0 } else { numafter[i - 1] };
                        let skipend = numafter[i];
                        let before = vars[..skipstart].to_vec();
                        let after = vars[skipend..].to_vec();
                        PtPath::new(PtPathKind::NilBind {
                            before,
                            sub: Box::new(sub),
                            after,
                        })
                    })
                    .collect();
                PtPathKind::Alternates { items, tail_var }
            }
            k => k,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::context::Context;
    use crate::parser;
    use crate::semantic::movepaths::movepaths;
    use crate::semantic::normalize::normalize;
    use crate::semantic::resolve::resolve_vars;
    use crate::semantic::unify::unify;

    fn bound(text: &str) -> PtExpr {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = resolve_vars(&mut ctx, pt).unwrap();
        let pt = normalize(&mut ctx, pt).unwrap();
        let pt = unify(&mut ctx, pt).unwrap();
        let pt = movepaths(&mut ctx, pt).unwrap();
        assert!(ctx.errors().is_empty());
        bindnil(&mut ctx, pt).unwrap()
    }

    fn find_alternates(pe: &PtExpr, found: &mut Vec<PtPath>) {
        struct Finder<'a>(&'a mut Vec<PtPath>);
        impl<'a> PtFold for Finder<'a> {
            fn fold_path(&mut self, path: PtPath) -> Result<PtPath> {
                if path.kind.is_alternates() {
                    self.0.push(path.clone());
                }
                let kind = fold_path_kind(self, path.kind)?;
                let mut p = PtPath::new(kind);
                p.bind_obj_after = path.bind_obj_after;
                Ok(p)
            }
        }
        Finder(found).fold_expr(pe.clone()).unwrap();
    }

    /// Every way through an alternation binds the same set of columns.
    #[test]
    fn alternates_bind_uniformly() {
        let pe = bound("select E from A.(friend|parent) as Y as E");
        let mut alts = Vec::new();
        find_alternates(&pe, &mut alts);
        assert_eq!(alts.len(), 1);
        let PtPathKind::Alternates { items, .. } = &alts[0].kind else {
            unreachable!()
        };
        let sets: Vec<Vec<ColumnVar>> = items
            .iter()
            .map(|item| {
                let mut vs = Vec::new();
                getvars(item, &mut vs);
                vs.sort_by_key(|v| v.id());
                vs
            })
            .collect();
        assert!(items.iter().all(|i| i.kind.is_nil_bind()));
        assert_eq!(sets[0], sets[1]);
    }

    #[test]
    fn optional_records_skipped_vars() {
        let pe = bound("select X from A.friend? as X");
        struct FindOpt(Option<Vec<ColumnVar>>);
        impl PtFold for FindOpt {
            fn fold_path_kind(&mut self, kind: PtPathKind) -> Result<PtPathKind> {
                if let PtPathKind::Optional { nil_columns, .. } = &kind {
                    self.0 = Some(nil_columns.clone());
                }
                fold_path_kind(self, kind)
            }
        }
        let mut f = FindOpt(None);
        f.fold_expr(pe).unwrap();
        let nils = f.0.expect("no optional found");
        // the edge's object binding is inside the optional
        assert!(!nils.is_empty());
    }
}
