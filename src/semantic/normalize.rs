//! Path and expression normalization.
//!
//! Establishes the shape invariants the later passes rely on:
//! sequences contain no sequences, alternates contain no alternates,
//! repetition nests are collapsed (canonical zero-or-more form is
//! optional(repeated(..))), sequences and alternates do not bind objects
//! directly, and every alternates node carries a tail variable defined by
//! choose() over the per-alternative tails. Compound paths that bind a
//! path variable are decomposed into per-subpath variables pasted
//! together by let-bound expressions.

use anyhow::Result;

use crate::ast::ops::Func;
use crate::ast::pt::*;
use crate::context::Context;

pub fn normalize(ctx: &mut Context, pe: PtExpr) -> Result<PtExpr> {
    let mut nm = Normalizer {
        ctx,
        infrom: false,
        exprs: Vec::new(),
    };
    let pe = nm.expr(pe);
    assert!(nm.exprs.is_empty(), "normalize: unclaimed let-bindings");
    Ok(pe)
}

struct Normalizer<'a> {
    ctx: &'a mut Context,
    infrom: bool,
    /// Let-bindings synthesized while normalizing a path, waiting to be
    /// dropped into a well-scoped position.
    exprs: Vec<PtExpr>,
}

impl<'a> Normalizer<'a> {
    fn letbind(&mut self, var: ColumnVar, pe: PtExpr) {
        self.exprs.push(PtExpr::assign(var, pe, None));
    }

    fn letbind_var(&mut self, var: ColumnVar, othervar: ColumnVar) {
        self.letbind(var, PtExpr::read_column(othervar));
    }

    fn take_exprs_back(&mut self, fill: &mut Vec<PtExpr>) {
        while let Some(e) = self.exprs.pop() {
            fill.push(e);
        }
    }

    // ---- path composition ----

    /// A compound path node binding a path variable needs a path variable
    /// on every subpath plus expressions pasting them together. Inserts
    /// the variables, emits the pasting lets, and returns the variable
    /// describing this subpath.
    fn compose(&mut self, pp: &mut PtPath) -> ColumnVar {
        // shortcut trivial wrappers
        if let PtPathKind::Sequence(items) = &mut pp.kind {
            if items.len() == 1 {
                return self.compose(&mut items[0]);
            }
        }
        if let PtPathKind::Alternates { items, .. } = &mut pp.kind {
            if items.len() == 1 {
                return self.compose(&mut items[0]);
            }
        }

        let myvar = match pp.bind_path.take() {
            Some(v) => v,
            None => self.ctx.fresh_columnvar(),
        };

        match &mut pp.kind {
            PtPathKind::Sequence(items) => {
                let mut myexpr: Option<PtExpr> = None;
                for sub in items.iter_mut() {
                    let subvar = self.compose(sub);
                    let subexpr = PtExpr::read_column(subvar);
                    myexpr = Some(match myexpr {
                        None => subexpr,
                        Some(acc) => PtExpr::bop(acc, Func::Concat, subexpr),
                    });
                }
                self.letbind(
                    myvar.clone(),
                    myexpr.unwrap_or_else(|| PtExpr::value(crate::value::Value::Nil)),
                );
            }
            PtPathKind::Alternates { items, .. } => {
                let mut myexpr: Option<PtExpr> = None;
                for sub in items.iter_mut() {
                    let subvar = self.compose(sub);
                    let subexpr = PtExpr::read_column(subvar);
                    myexpr = Some(match myexpr {
                        None => subexpr,
                        Some(acc) => PtExpr::bop(acc, Func::Choose, subexpr),
                    });
                }
                self.letbind(
                    myvar.clone(),
                    myexpr.unwrap_or_else(|| PtExpr::value(crate::value::Value::Nil)),
                );
            }
            PtPathKind::Optional { sub, .. } => {
                let subvar = self.compose(sub);
                self.letbind_var(myvar.clone(), subvar);
            }
            PtPathKind::Repeated {
                sub,
                path_from_inside,
                path_on_outside,
            } => {
                let subvar = self.compose(sub);
                *path_from_inside = Some(subvar);
                *path_on_outside = Some(myvar.clone());
            }
            PtPathKind::NilBind { .. } => unreachable!("normalize: nilbind in input"),
            PtPathKind::Edge { .. } => {
                // primitive element; just put the var back
                pp.bind_path = Some(myvar.clone());
            }
        }

        myvar
    }

    fn try_compose(&mut self, pp: &mut PtPath) {
        if pp.bind_path.is_some() {
            self.compose(pp);
            assert!(pp.bind_path.is_none() || matches!(pp.kind, PtPathKind::Edge { .. }));
        }
    }

    /// Push an outer binding down onto a node that absorbs it; if the
    /// node already binds, alias the outer variable to the inner one.
    fn merge_binding(&mut self, outer: Option<ColumnVar>, inner: &mut Option<ColumnVar>) {
        if let Some(var) = outer {
            match inner {
                None => *inner = Some(var),
                Some(other) => {
                    let other = other.clone();
                    self.letbind_var(var, other);
                }
            }
        }
    }

    // ---- repetition laws ----

    /// repeated(optional(P)) => optional(repeated(P));
    /// optional(optional(P)) => optional(P);
    /// repeated(repeated(P)) => repeated(P).
    fn repetition_combine(&mut self, mut pp: PtPath) -> PtPath {
        loop {
            match pp.kind {
                PtPathKind::Repeated {
                    sub,
                    path_from_inside,
                    path_on_outside,
                } if sub.kind.is_optional() => {
                    // exchange the two; each node keeps its own bindings
                    let mut qq = *sub;
                    let PtPathKind::Optional { sub: inner, nil_columns } = qq.kind else {
                        unreachable!()
                    };
                    assert!(nil_columns.is_empty());
                    qq.kind = PtPathKind::Repeated {
                        sub: inner,
                        path_from_inside,
                        path_on_outside,
                    };
                    let qq = self.repetition_combine(qq);
                    pp.kind = PtPathKind::Optional {
                        sub: Box::new(qq),
                        nil_columns: Vec::new(),
                    };
                    continue;
                }
                PtPathKind::Optional { sub, nil_columns } if sub.kind.is_optional() => {
                    assert!(nil_columns.is_empty());
                    let mut sub = *sub;
                    sub.parens |= pp.parens;
                    sub.dont_merge |= pp.dont_merge;
                    self.merge_binding(pp.bind_obj_after.take(), &mut sub.bind_obj_after);
                    self.merge_binding(pp.bind_path.take(), &mut sub.bind_path);
                    pp = sub;
                    continue;
                }
                PtPathKind::Repeated {
                    sub,
                    path_from_inside,
                    path_on_outside,
                } if sub.kind.is_repeated() => {
                    assert!(path_from_inside.is_none());
                    assert!(path_on_outside.is_none());
                    let mut sub = *sub;
                    sub.parens |= pp.parens;
                    sub.dont_merge |= pp.dont_merge;
                    self.merge_binding(pp.bind_obj_after.take(), &mut sub.bind_obj_after);
                    self.merge_binding(pp.bind_path.take(), &mut sub.bind_path);
                    pp = sub;
                    continue;
                }
                kind => {
                    pp.kind = kind;
                    return pp;
                }
            }
        }
    }

    // ---- path normalization ----

    fn common(&mut self, dontmerge: &mut bool, pp: &mut PtPath) {
        assert!(pp.bind_obj_before.is_none(), "normalize: bindobjbefore");
        pp.dont_merge |= *dontmerge;
        *dontmerge = pp.dont_merge;
    }

    fn path(&mut self, mut dontmerge: bool, pp: PtPath) -> PtPath {
        match pp.kind {
            PtPathKind::Sequence(_) => self.sequence(dontmerge, true, pp),
            PtPathKind::Alternates { .. } => self.alternates(dontmerge, true, pp),
            PtPathKind::Optional { .. } => {
                let mut pp = pp;
                self.common(&mut dontmerge, &mut pp);
                self.try_compose(&mut pp);
                let PtPathKind::Optional { sub, nil_columns } = pp.kind else {
                    unreachable!()
                };
                let sub = self.path(dontmerge, *sub);
                let combine = sub.kind.is_optional() || sub.kind.is_repeated();
                pp.kind = PtPathKind::Optional {
                    sub: Box::new(sub),
                    nil_columns,
                };
                if combine {
                    pp = self.repetition_combine(pp);
                }
                pp
            }
            PtPathKind::Repeated { .. } => {
                let mut pp = pp;
                self.common(&mut dontmerge, &mut pp);
                self.try_compose(&mut pp);
                let PtPathKind::Repeated {
                    sub,
                    path_from_inside,
                    path_on_outside,
                } = pp.kind
                else {
                    unreachable!()
                };
                let sub = self.path(dontmerge, *sub);
                let combine = sub.kind.is_optional() || sub.kind.is_repeated();
                pp.kind = PtPathKind::Repeated {
                    sub: Box::new(sub),
                    path_from_inside,
                    path_on_outside,
                };
                if combine {
                    pp = self.repetition_combine(pp);
                }
                pp
            }
            PtPathKind::NilBind { .. } => unreachable!("normalize: nilbind in input"),
            PtPathKind::Edge { .. } => {
                let mut pp = pp;
                self.common(&mut dontmerge, &mut pp);
                if let PtPathKind::Edge {
                    name: EdgeName::Computed(e),
                    reversed,
                } = pp.kind
                {
                    pp.kind = PtPathKind::Edge {
                        name: EdgeName::Computed(Box::new(self.expr(*e))),
                        reversed,
                    };
                }
                pp
            }
        }
    }

    fn sequence(&mut self, mut dontmerge: bool, docombine: bool, mut pp: PtPath) -> PtPath {
        self.common(&mut dontmerge, &mut pp);
        let PtPathKind::Sequence(mut items) = pp.kind else {
            unreachable!()
        };

        // 1. sequences don't bind objects; move the binding to the last
        // subpath (or alias it there)
        if let Some(after) = pp.bind_obj_after.take() {
            assert!(!items.is_empty());
            let last = items.last_mut().unwrap();
            match &last.bind_obj_after {
                None => last.bind_obj_after = Some(after),
                Some(other) => {
                    let other = other.clone();
                    self.letbind_var(after, other);
                }
            }
        }

        // 2. sequences aren't of length 1
        if items.len() == 1 {
            let mut sub = items.pop().unwrap();
            if let Some(pathvar) = pp.bind_path.take() {
                match &sub.bind_path {
                    None => sub.bind_path = Some(pathvar),
                    Some(other) => {
                        let other = other.clone();
                        self.letbind_var(pathvar, other);
                    }
                }
            }
            if pp.parens {
                sub.parens = true;
            }
            return self.path(dontmerge, sub);
        }

        pp.kind = PtPathKind::Sequence(items);

        // 3. decompose a bound path variable over the subpaths
        self.try_compose(&mut pp);

        // 4. recurse
        let PtPathKind::Sequence(items) = pp.kind else {
            unreachable!()
        };
        let mut needcombine = false;
        let mut newitems = Vec::with_capacity(items.len());
        for sub in items {
            let sub = if sub.kind.is_sequence() {
                needcombine = true;
                self.sequence(dontmerge, false, sub)
            } else {
                let sub = self.path(dontmerge, sub);
                if sub.kind.is_sequence() {
                    needcombine = true;
                }
                sub
            };
            newitems.push(sub);
        }

        // 5. flatten nested sequences into this one
        if docombine && needcombine {
            let mut flat = Vec::new();
            collect_sequences(newitems, &mut flat);
            let mut np = PtPath::new(PtPathKind::Sequence(flat));
            np.parens = pp.parens;
            np.dont_merge = pp.dont_merge;
            np.bind_path = pp.bind_path.take();
            np
        } else {
            pp.kind = PtPathKind::Sequence(newitems);
            pp
        }
    }

    fn alternates(&mut self, mut dontmerge: bool, docombine: bool, mut pp: PtPath) -> PtPath {
        self.common(&mut dontmerge, &mut pp);
        let PtPathKind::Alternates {
            mut items,
            tail_var,
        } = pp.kind
        else {
            unreachable!()
        };
        assert!(tail_var.is_none(), "normalize: alternates already normalized");

        // 1. alternates don't bind objects. Each alternative binds one and
        // the collective result is produced with choose(); the variable
        // holding it becomes the tail var, which downstream code (and the
        // next path element) uses to refer to the object we arrived at.
        let after = match pp.bind_obj_after.take() {
            Some(v) => v,
            None => self.ctx.fresh_columnvar(),
        };
        let mut myexpr: Option<PtExpr> = None;
        for sub in items.iter_mut() {
            if sub.bind_obj_after.is_none() {
                sub.bind_obj_after = Some(self.ctx.fresh_columnvar());
            }
            let subexpr = PtExpr::read_column(sub.bind_obj_after.clone().unwrap());
            myexpr = Some(match myexpr {
                None => subexpr,
                Some(acc) => PtExpr::bop(acc, Func::Choose, subexpr),
            });
        }
        if let Some(myexpr) = myexpr {
            self.letbind(after.clone(), myexpr);
        }
        let tail_var = Some(after);

        // 2. alternates aren't of length 1
        if items.len() == 1 {
            let mut sub = items.pop().unwrap();
            if let Some(pathvar) = pp.bind_path.take() {
                match &sub.bind_path {
                    None => sub.bind_path = Some(pathvar),
                    Some(other) => {
                        let other = other.clone();
                        self.letbind_var(pathvar, other);
                    }
                }
            }
            if pp.parens {
                sub.parens = true;
            }
            return self.path(dontmerge, sub);
        }

        pp.kind = PtPathKind::Alternates { items, tail_var };

        // 3. decompose a bound path variable over the alternatives
        self.try_compose(&mut pp);

        // 4. recurse
        let PtPathKind::Alternates { items, tail_var } = pp.kind else {
            unreachable!()
        };
        let mut needcombine = false;
        let mut newitems = Vec::with_capacity(items.len());
        for sub in items {
            let sub = if sub.kind.is_alternates() {
                needcombine = true;
                self.alternates(dontmerge, false, sub)
            } else {
                let sub = self.path(dontmerge, sub);
                if sub.kind.is_alternates() {
                    needcombine = true;
                }
                sub
            };
            newitems.push(sub);
        }

        // 5. flatten nested alternates into this one
        if docombine && needcombine {
            let mut flat = Vec::new();
            collect_alternates(newitems, &mut flat);
            let mut np = PtPath::new(PtPathKind::Alternates {
                items: flat,
                tail_var,
            });
            np.parens = pp.parens;
            np.dont_merge = pp.dont_merge;
            np.bind_path = pp.bind_path.take();
            np
        } else {
            pp.kind = PtPathKind::Alternates { items: newitems, tail_var };
            pp
        }
    }

    // ---- expression normalization ----

    fn exprs(&mut self, exprs: Vec<PtExpr>) -> Vec<PtExpr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, mut pe: PtExpr) -> PtExpr {
        pe.kind = match pe.kind {
            PtExprKind::Select {
                sub,
                result,
                distinct,
            } => PtExprKind::Select {
                sub: Box::new(self.expr(*sub)),
                result: Box::new(self.expr(*result)),
                distinct,
            },
            PtExprKind::From(items) => {
                let infromsave = self.infrom;
                self.infrom = true;
                let mut items = self.exprs(items);
                self.take_exprs_back(&mut items);
                self.infrom = infromsave;
                PtExprKind::From(items)
            }
            PtExprKind::Where { sub, pred } => {
                let sub = self.expr(*sub);
                let pred = self.expr(*pred);
                // "where true" = no where clause
                if matches!(
                    &pred.kind,
                    PtExprKind::Value(crate::value::Value::Bool(true))
                ) {
                    return sub;
                }
                PtExprKind::Where {
                    sub: Box::new(sub),
                    pred: Box::new(pred),
                }
            }
            PtExprKind::Group { sub, vars, newvar } => PtExprKind::Group {
                sub: Box::new(self.expr(*sub)),
                vars,
                newvar: Some(match newvar {
                    Some(v) => v,
                    None => self.ctx.fresh_columnvar(),
                }),
            },
            PtExprKind::Ungroup { sub, var } => PtExprKind::Ungroup {
                sub: Box::new(self.expr(*sub)),
                var,
            },
            PtExprKind::Rename { sub, name } => PtExprKind::Rename {
                sub: Box::new(self.expr(*sub)),
                name: match name {
                    EdgeName::Static(s) => EdgeName::Static(s),
                    EdgeName::Computed(e) => EdgeName::Computed(Box::new(self.expr(*e))),
                },
            },
            PtExprKind::Path {
                root,
                body,
                more_bindings,
            } => {
                let root = self.expr(*root);
                // alias bindings may reference variables the path's own
                // lets define, so they must end up scoped after them: in
                // a from clause that means the (reversing) collection
                // must see them first; outside one they go behind the
                // emitted lets
                let aliases = self.exprs(more_bindings);
                let mut more_bindings = Vec::new();
                if self.infrom {
                    self.exprs.extend(aliases);
                } else {
                    more_bindings = aliases;
                }
                let body = self.path(false, body);
                if !self.infrom {
                    let mut emitted = std::mem::take(&mut self.exprs);
                    emitted.append(&mut more_bindings);
                    more_bindings = emitted;
                }
                PtExprKind::Path {
                    root: Box::new(root),
                    body,
                    more_bindings,
                }
            }
            PtExprKind::Tuple(items) => {
                let mut items = self.exprs(items);
                // prune tuples of arity 1
                if items.len() == 1 {
                    return items.pop().unwrap();
                }
                PtExprKind::Tuple(items)
            }
            PtExprKind::Forall { var, set, pred } => PtExprKind::Forall {
                var,
                set: Box::new(self.expr(*set)),
                pred: Box::new(self.expr(*pred)),
            },
            PtExprKind::Exists { var, set, pred } => PtExprKind::Exists {
                var,
                set: Box::new(self.expr(*set)),
                pred: Box::new(self.expr(*pred)),
            },
            PtExprKind::Map { var, set, result } => PtExprKind::Map {
                var,
                set: Box::new(self.expr(*set)),
                result: Box::new(self.expr(*result)),
            },
            PtExprKind::Assign { var, value, body } => PtExprKind::Assign {
                var,
                value: Box::new(self.expr(*value)),
                body: match body {
                    Some(b) => Some(Box::new(self.expr(*b))),
                    None => None,
                },
            },
            PtExprKind::Bop { l, op, r } => PtExprKind::Bop {
                l: Box::new(self.expr(*l)),
                op,
                r: Box::new(self.expr(*r)),
            },
            PtExprKind::Uop { op, sub } => PtExprKind::Uop {
                op,
                sub: Box::new(self.expr(*sub)),
            },
            PtExprKind::Func { op, args } => PtExprKind::Func {
                op,
                args: self.exprs(args),
            },
            PtExprKind::ReadAnyVar(_) => unreachable!("normalize: unresolved variable"),
            k @ (PtExprKind::ReadColumnVar(_)
            | PtExprKind::ReadGlobalVar(_)
            | PtExprKind::Value(_)) => k,
        };
        pe
    }
}

fn collect_sequences(items: Vec<PtPath>, flat: &mut Vec<PtPath>) {
    for sub in items {
        match sub.kind {
            PtPathKind::Sequence(inner)
                if sub.bind_obj_before.is_none()
                    && sub.bind_obj_after.is_none()
                    && sub.bind_path.is_none() =>
            {
                collect_sequences(inner, flat);
            }
            _ => flat.push(sub),
        }
    }
}

fn collect_alternates(items: Vec<PtPath>, flat: &mut Vec<PtPath>) {
    for sub in items {
        match sub.kind {
            PtPathKind::Alternates { items: inner, .. }
                if sub.bind_obj_before.is_none()
                    && sub.bind_obj_after.is_none()
                    && sub.bind_path.is_none() =>
            {
                collect_alternates(inner, flat);
            }
            _ => flat.push(sub),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::parser;
    use crate::semantic::resolve::resolve_vars;

    fn normalized(text: &str) -> PtExpr {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = resolve_vars(&mut ctx, pt).unwrap();
        assert!(ctx.errors().is_empty());
        normalize(&mut ctx, pt).unwrap()
    }

    fn check_paths(pe: &PtExpr, check: &mut impl FnMut(&PtPath)) {
        struct Walker<'f, F>(&'f mut F);
        impl<'f, F: FnMut(&PtPath)> PtFold for Walker<'f, F> {
            fn fold_path(&mut self, path: PtPath) -> Result<PtPath> {
                (self.0)(&path);
                fold_path_kind(self, path.kind).map(|kind| {
                    let mut p = PtPath::new(kind);
                    p.bind_obj_before = path.bind_obj_before;
                    p.bind_obj_after = path.bind_obj_after;
                    p.bind_path = path.bind_path;
                    p
                })
            }
        }
        Walker(check).fold_expr(pe.clone()).unwrap();
    }

    #[test]
    fn no_nested_sequences_or_alternates() {
        let pt = normalized("select X from A.a.b.(c|(d|e)).f as X");
        check_paths(&pt, &mut |p| match &p.kind {
            PtPathKind::Sequence(items) => {
                assert!(items.iter().all(|i| !i.kind.is_sequence()));
            }
            PtPathKind::Alternates { items, tail_var } => {
                assert!(items.iter().all(|i| !i.kind.is_alternates()));
                assert!(tail_var.is_some());
            }
            _ => {}
        });
    }

    #[test]
    fn star_stays_canonical() {
        // optional(repeated(..)) is already canonical and must not nest
        let pt = normalized("select X from A.friend* as X");
        check_paths(&pt, &mut |p| {
            if let PtPathKind::Optional { sub, .. } = &p.kind {
                assert!(sub.kind.is_repeated());
            }
            if let PtPathKind::Repeated { sub, .. } = &p.kind {
                assert!(!sub.kind.is_repeated());
                assert!(!sub.kind.is_optional());
            }
        });
    }

    #[test]
    fn double_repetition_collapses() {
        let pt = normalized("select X from A.(friend+)+ as X");
        let mut repeats = 0;
        check_paths(&pt, &mut |p| {
            if p.kind.is_repeated() {
                repeats += 1;
            }
        });
        assert_eq!(repeats, 1);
    }

    #[test]
    fn alternates_get_tail_var_and_choose() {
        let pt = normalized("select Y from A.(friend|parent) as Y");
        // the from clause gains a let binding Y := choose(t0, t1)
        let (sub, _, _) = pt.kind.as_select().unwrap();
        let items = sub.kind.as_from().unwrap();
        assert!(items.iter().any(|e| {
            matches!(&e.kind, PtExprKind::Assign { value, .. }
                if matches!(&value.kind, PtExprKind::Bop { op: Func::Choose, .. }))
        }));
    }

    #[test]
    fn sequences_do_not_bind() {
        let pt = normalized("select X from A.a.b as X");
        check_paths(&pt, &mut |p| {
            if p.kind.is_sequence() || p.kind.is_alternates() {
                assert!(p.bind_obj_after.is_none());
                assert!(p.bind_obj_before.is_none());
            }
        });
    }

    #[test]
    fn where_true_is_deleted() {
        let pt = normalized("select X from A.friend as X where true");
        let (sub, _, _) = pt.kind.as_select().unwrap();
        assert!(sub.kind.is_from());
    }
}
