//! Hoist path expressions into from-clauses.
//!
//! After unification, every path expression still sitting in a where
//! clause, a select result, or a bare expression is moved to the nearest
//! enclosing from-clause and its original site replaced by a read of the
//! path's tail variable. A path may only move if its root and any
//! computed edge names depend solely on from-bound variables; anything
//! else is reported as an error. A path outside any select gets a select
//! synthesized around it.

use anyhow::Result;

use crate::ast::pt::*;
use crate::context::Context;

pub fn movepaths(ctx: &mut Context, pe: PtExpr) -> Result<PtExpr> {
    let mut mv = MovePaths {
        ctx,
        fromvars: Vec::new(),
        infrom: false,
        have_from: false,
        pending: Vec::new(),
    };
    let pe = mv.expr(pe);
    assert!(mv.pending.is_empty(), "movepaths: unattached paths");
    Ok(pe)
}

struct MovePaths<'a> {
    ctx: &'a mut Context,
    /// Vars bound by from-clauses currently in scope.
    fromvars: Vec<ColumnVar>,
    infrom: bool,
    /// Whether the current select has a from-clause to move into.
    have_from: bool,
    /// Paths moved out of the current select, waiting to be appended to
    /// its from-clause.
    pending: Vec<PtExpr>,
}

impl<'a> MovePaths<'a> {
    fn note_var(&mut self, var: &ColumnVar) {
        if self.infrom {
            self.fromvars.push(var.clone());
        }
    }

    fn ok_var(&self, var: &ColumnVar) -> bool {
        self.fromvars.contains(var)
    }

    // ---- moveability check ----

    fn path_is_moveable(&mut self, pp: &PtPath) -> bool {
        let mut ret = true;
        match &pp.kind {
            PtPathKind::Sequence(items) | PtPathKind::Alternates { items, .. } => {
                for sub in items {
                    if !self.path_is_moveable(sub) {
                        ret = false;
                    }
                }
            }
            PtPathKind::Optional { sub, .. } | PtPathKind::Repeated { sub, .. } => {
                if !self.path_is_moveable(sub) {
                    ret = false;
                }
            }
            PtPathKind::NilBind { .. } => unreachable!("movepaths: nilbind in input"),
            PtPathKind::Edge { name, .. } => {
                if let EdgeName::Computed(e) = name {
                    if !self.expr_is_moveable(e) {
                        ret = false;
                    }
                }
            }
        }
        ret
    }

    fn expr_is_moveable(&mut self, pe: &PtExpr) -> bool {
        let mut ret = true;
        match &pe.kind {
            PtExprKind::Select {
                sub,
                result,
                ..
            } => {
                ret &= self.expr_is_moveable(sub);
                ret &= self.expr_is_moveable(result);
            }
            PtExprKind::From(items) | PtExprKind::Tuple(items) => {
                for sub in items {
                    ret &= self.expr_is_moveable(sub);
                }
            }
            PtExprKind::Where { sub, pred } => {
                ret &= self.expr_is_moveable(sub);
                ret &= self.expr_is_moveable(pred);
            }
            PtExprKind::Group { sub, .. } | PtExprKind::Ungroup { sub, .. } => {
                ret &= self.expr_is_moveable(sub);
            }
            PtExprKind::Rename { sub, name } => {
                ret &= self.expr_is_moveable(sub);
                if let EdgeName::Computed(e) = name {
                    ret &= self.expr_is_moveable(e);
                }
            }
            PtExprKind::Path { root, body, .. } => {
                ret &= self.expr_is_moveable(root);
                ret &= self.path_is_moveable(body);
            }
            PtExprKind::Forall { set, pred, .. } | PtExprKind::Exists { set, pred, .. } => {
                ret &= self.expr_is_moveable(set);
                ret &= self.expr_is_moveable(pred);
            }
            PtExprKind::Map { set, result, .. } => {
                ret &= self.expr_is_moveable(set);
                ret &= self.expr_is_moveable(result);
            }
            PtExprKind::Assign { value, body, .. } => {
                ret &= self.expr_is_moveable(value);
                if let Some(b) = body {
                    ret &= self.expr_is_moveable(b);
                }
            }
            PtExprKind::Bop { l, r, .. } => {
                ret &= self.expr_is_moveable(l);
                ret &= self.expr_is_moveable(r);
            }
            PtExprKind::Uop { sub, .. } => {
                ret &= self.expr_is_moveable(sub);
            }
            PtExprKind::Func { args, .. } => {
                for sub in args {
                    ret &= self.expr_is_moveable(sub);
                }
            }
            PtExprKind::ReadAnyVar(_) => unreachable!("movepaths: unresolved variable"),
            PtExprKind::ReadColumnVar(var) => {
                if !self.ok_var(var) {
                    let span = var.span();
                    self.ctx.complain(
                        span,
                        format!(
                            "Locally-bound variable {} cannot be used in a path",
                            var.name()
                        ),
                    );
                    self.ctx.complain(
                        span,
                        "(move path and variable binding to the from-clause)".to_string(),
                    );
                    ret = false;
                }
            }
            PtExprKind::ReadGlobalVar(_) | PtExprKind::Value(_) => {}
        }
        ret
    }

    /// The variable naming the object the path reaches, created if the
    /// path does not bind one yet.
    fn ensure_tailvar(&mut self, pp: &mut PtPath) -> ColumnVar {
        if let Some(v) = pp.tail_var() {
            return v;
        }
        match &mut pp.kind {
            PtPathKind::Sequence(items) => {
                let last = items.last_mut().expect("movepaths: empty sequence");
                self.ensure_tailvar(last)
            }
            _ => {
                let v = self.ctx.fresh_columnvar();
                pp.bind_obj_after = Some(v.clone());
                v
            }
        }
    }

    // ---- traversal ----

    fn path(&mut self, mut pp: PtPath) -> PtPath {
        pp.kind = match pp.kind {
            PtPathKind::Sequence(items) => {
                PtPathKind::Sequence(items.into_iter().map(|p| self.path(p)).collect())
            }
            PtPathKind::Alternates { items, tail_var } => {
                if let Some(tv) = &tail_var {
                    self.note_var(tv);
                }
                PtPathKind::Alternates {
                    items: items.into_iter().map(|p| self.path(p)).collect(),
                    tail_var,
                }
            }
            PtPathKind::Optional { sub, nil_columns } => PtPathKind::Optional {
                sub: Box::new(self.path(*sub)),
                nil_columns,
            },
            PtPathKind::Repeated {
                sub,
                path_from_inside,
                path_on_outside,
            } => PtPathKind::Repeated {
                sub: Box::new(self.path(*sub)),
                path_from_inside,
                path_on_outside,
            },
            PtPathKind::NilBind { .. } => unreachable!("movepaths: nilbind in input"),
            PtPathKind::Edge { name, reversed } => PtPathKind::Edge {
                name: match name {
                    EdgeName::Static(s) => EdgeName::Static(s),
                    EdgeName::Computed(e) => EdgeName::Computed(Box::new(self.expr(*e))),
                },
                reversed,
            },
        };

        assert!(pp.bind_obj_before.is_none());
        if let Some(v) = &pp.bind_path {
            self.note_var(v);
        }
        if let Some(v) = &pp.bind_obj_after {
            self.note_var(v);
        }
        pp
    }

    fn exprs(&mut self, exprs: Vec<PtExpr>) -> Vec<PtExpr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    /// Append the moved paths of the current select to its from-clause.
    fn attach_moved(sub: &mut PtExpr, moved: Vec<PtExpr>) {
        match &mut sub.kind {
            PtExprKind::From(items) => items.extend(moved),
            PtExprKind::Where { sub, .. }
            | PtExprKind::Group { sub, .. }
            | PtExprKind::Ungroup { sub, .. } => Self::attach_moved(sub, moved),
            _ => panic!("movepaths: select without from-clause"),
        }
    }

    fn expr(&mut self, mut pe: PtExpr) -> PtExpr {
        pe.kind = match pe.kind {
            PtExprKind::Select {
                sub,
                result,
                distinct,
            } => {
                let mark = self.fromvars.len();
                let saveinfrom = self.infrom;
                let savehave = self.have_from;
                let savepending = std::mem::take(&mut self.pending);
                self.infrom = false;
                self.have_from = true;

                let mut sub = self.expr(*sub);
                let result = self.expr(*result);

                let moved = std::mem::take(&mut self.pending);
                if !moved.is_empty() {
                    Self::attach_moved(&mut sub, moved);
                }

                self.infrom = saveinfrom;
                self.have_from = savehave;
                self.pending = savepending;
                self.fromvars.truncate(mark);

                PtExprKind::Select {
                    sub: Box::new(sub),
                    result: Box::new(result),
                    distinct,
                }
            }
            PtExprKind::From(items) => {
                assert!(!self.infrom);
                self.infrom = true;
                let items = self.exprs(items);
                self.infrom = false;
                PtExprKind::From(items)
            }
            PtExprKind::Where { sub, pred } => PtExprKind::Where {
                sub: Box::new(self.expr(*sub)),
                pred: Box::new(self.expr(*pred)),
            },
            PtExprKind::Group { sub, vars, newvar } => {
                if let Some(nv) = &newvar {
                    self.note_var(nv);
                }
                PtExprKind::Group {
                    sub: Box::new(self.expr(*sub)),
                    vars,
                    newvar,
                }
            }
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
                // recurse first, to pick up anything nested
                let root = self.expr(*root);
                let mut body = self.path(body);
                let more_bindings = self.exprs(more_bindings);

                let probe = PtExpr::new(PtExprKind::Path {
                    root: Box::new(root),
                    body,
                    more_bindings,
                })
                .with_span(pe.span);

                if !self.infrom && self.expr_is_moveable(&probe) {
                    let PtExprKind::Path { root, body: b, more_bindings } = probe.kind else {
                        unreachable!()
                    };
                    body = b;
                    let tail = self.ensure_tailvar(&mut body);

                    // the moved body's bindings are now from-bound
                    let saveinfrom = self.infrom;
                    self.infrom = true;
                    body = self.path(body);
                    self.infrom = saveinfrom;

                    let moved = PtExpr::new(PtExprKind::Path {
                        root,
                        body,
                        more_bindings,
                    })
                    .with_span(pe.span);

                    if self.have_from {
                        self.pending.push(moved);
                        PtExprKind::ReadColumnVar(tail)
                    } else {
                        // a bare path outside any select: synthesize one
                        PtExprKind::Select {
                            sub: Box::new(PtExpr::new(PtExprKind::From(vec![moved]))),
                            result: Box::new(PtExpr::read_column(tail)),
                            distinct: false,
                        }
                    }
                } else {
                    probe.kind
                }
            }
            PtExprKind::Tuple(items) => PtExprKind::Tuple(self.exprs(items)),
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
            PtExprKind::Assign { var, value, body } => {
                let value = self.expr(*value);
                let body = match body {
                    Some(b) => Some(Box::new(self.expr(*b))),
                    None => {
                        // scope extends past the assignment
                        self.note_var(&var);
                        None
                    }
                };
                PtExprKind::Assign {
                    var,
                    value: Box::new(value),
                    body,
                }
            }
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
            PtExprKind::ReadAnyVar(_) => unreachable!("movepaths: unresolved variable"),
            k @ (PtExprKind::ReadColumnVar(_)
            | PtExprKind::ReadGlobalVar(_)
            | PtExprKind::Value(_)) => k,
        };
        pe
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::parser;
    use crate::semantic::normalize::normalize;
    use crate::semantic::resolve::resolve_vars;
    use crate::semantic::unify::unify;

    fn moved(text: &str) -> (Context, PtExpr) {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = resolve_vars(&mut ctx, pt).unwrap();
        let pt = normalize(&mut ctx, pt).unwrap();
        let pt = unify(&mut ctx, pt).unwrap();
        let pt = movepaths(&mut ctx, pt).unwrap();
        (ctx, pt)
    }

    /// Paths must appear only as items of a From expression.
    fn assert_paths_only_in_from(pe: &PtExpr) {
        fn walk(pe: &PtExpr) {
            match &pe.kind {
                PtExprKind::Path { .. } => panic!("path outside a from-clause"),
                PtExprKind::From(items) => {
                    for item in items {
                        if let PtExprKind::Path {
                            root,
                            more_bindings,
                            ..
                        } = &item.kind
                        {
                            walk(root);
                            for b in more_bindings {
                                walk(b);
                            }
                        } else {
                            walk(item);
                        }
                    }
                }
                PtExprKind::Select { sub, result, .. } => {
                    walk(sub);
                    walk(result);
                }
                PtExprKind::Where { sub, pred } => {
                    walk(sub);
                    walk(pred);
                }
                PtExprKind::Group { sub, .. } | PtExprKind::Ungroup { sub, .. } => walk(sub),
                PtExprKind::Rename { sub, .. } => walk(sub),
                PtExprKind::Tuple(items) => items.iter().for_each(walk),
                PtExprKind::Forall { set, pred, .. } | PtExprKind::Exists { set, pred, .. } => {
                    walk(set);
                    walk(pred);
                }
                PtExprKind::Map { set, result, .. } => {
                    walk(set);
                    walk(result);
                }
                PtExprKind::Assign { value, body, .. } => {
                    walk(value);
                    if let Some(b) = body {
                        walk(b);
                    }
                }
                PtExprKind::Bop { l, r, .. } => {
                    walk(l);
                    walk(r);
                }
                PtExprKind::Uop { sub, .. } => walk(sub),
                PtExprKind::Func { args, .. } => args.iter().for_each(walk),
                _ => {}
            }
        }
        walk(pe);
    }

    #[test]
    fn result_path_moves_to_from() {
        let (ctx, pt) = moved("select X.friend ++ X.parent from A.friend as X");
        assert!(ctx.errors().is_empty());
        assert_paths_only_in_from(&pt);
    }

    #[test]
    fn quantifier_set_path_moves() {
        let (ctx, pt) =
            moved("select X from A.friend as X where exists Y in X.friend: Y = D");
        assert!(ctx.errors().is_empty());
        assert_paths_only_in_from(&pt);
    }

    #[test]
    fn bare_path_gets_a_select() {
        let (ctx, pt) = moved("count(A.friend)");
        assert!(ctx.errors().is_empty());
        assert_paths_only_in_from(&pt);
        // the synthesized select sits inside the count
        let args = match &pt.kind {
            PtExprKind::Func { args, .. } => args,
            _ => panic!("expected count(..)"),
        };
        assert!(args[0].kind.is_select());
    }

    #[test]
    fn quantifier_bound_root_fails() {
        // Y is bound by the quantifier, not the from-clause, so Y.friend
        // cannot be hoisted
        let (ctx, _) =
            moved("select X from A.friend as X where exists Y in X.friend: nonempty(Y.friend)");
        assert!(!ctx.errors().is_empty());
    }
}
