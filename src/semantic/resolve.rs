//! Variable resolution.
//!
//! Walks the tree with a stack of scopes. Binding constructs (from-item
//! paths, group/ungroup, quantifiers, map, assign) register column
//! variables; every `ReadAnyVar` is then classified as a column reference
//! if some enclosing scope binds the name, and as a global otherwise.
//! Nonexistent globals are caught at eval time.

use anyhow::Result;
use log::debug;

use crate::ast::pt::*;
use crate::context::Context;
use crate::error::Span;

pub fn resolve_vars(ctx: &mut Context, pe: PtExpr) -> Result<PtExpr> {
    let mut rs = Resolver {
        ctx,
        scopes: vec![Scope::default()],
        globals: Vec::new(),
        allcolumns: Vec::new(),
    };
    let pe = rs.expr(pe);
    rs.check_duplicate_varnames();
    Ok(pe)
}

#[derive(Default)]
struct Scope {
    boundvars: Vec<ColumnVar>,
}

struct Resolver<'a> {
    ctx: &'a mut Context,
    scopes: Vec<Scope>,
    globals: Vec<GlobalVar>,
    allcolumns: Vec<ColumnVar>,
}

impl<'a> Resolver<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        assert!(!self.scopes.is_empty());
    }

    /// Find a bound variable by name, innermost scope first.
    fn look(&self, name: &str) -> Option<ColumnVar> {
        for scope in self.scopes.iter().rev() {
            if let Some(var) = scope.boundvars.iter().find(|v| v.name() == name) {
                return Some(var.clone());
            }
        }
        None
    }

    fn bind(&mut self, var: ColumnVar) {
        let current = self.scopes.last().unwrap();
        if let Some(other) = current.boundvars.iter().find(|v| v.name() == var.name()) {
            let prev_span = other.span();
            self.ctx.complain(
                var.span(),
                format!("Duplicate variable name {}", var.name()),
            );
            self.ctx
                .complain(prev_span, format!("Previous binding for {}", var.name()));
            return;
        }

        if let Some(other) = self.look(var.name()) {
            self.ctx.warn(
                var.span(),
                format!("Variable {} shadows previous binding", var.name()),
            );
            self.ctx.warn(
                other.span(),
                format!("Previous binding for {}", other.name()),
            );
        }

        debug!("resolve: binding {}#{}", var.name(), var.id());
        self.scopes.last_mut().unwrap().boundvars.push(var.clone());
        self.allcolumns.push(var);
    }

    /// Look up a global by name, creating it on first use. Same-named
    /// references share one variable.
    fn get_global(&mut self, name: &str, span: Option<Span>) -> GlobalVar {
        if let Some(var) = self.globals.iter().find(|g| g.name() == name) {
            return var.clone();
        }
        let var = GlobalVar::new(name, span);
        self.globals.push(var.clone());
        var
    }

    /// Group/ungroup name a variable that must already be bound; a miss
    /// means the name is global, which those operations reject.
    fn resolve_bound_var(&mut self, var: ColumnVar, opname: &str) -> ColumnVar {
        match self.look(var.name()) {
            Some(found) => found,
            None => {
                self.ctx.complain(
                    var.span(),
                    format!("Cannot {} global {}", opname, var.name()),
                );
                var
            }
        }
    }

    fn path(&mut self, mut pp: PtPath) -> PtPath {
        if let Some(v) = &pp.bind_obj_before {
            self.bind(v.clone());
        }

        pp.kind = match pp.kind {
            PtPathKind::Sequence(items) => {
                PtPathKind::Sequence(items.into_iter().map(|p| self.path(p)).collect())
            }
            PtPathKind::Alternates { items, tail_var } => PtPathKind::Alternates {
                items: items.into_iter().map(|p| self.path(p)).collect(),
                tail_var,
            },
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
            PtPathKind::NilBind { .. } => {
                // bindnil introduces these well after resolution
                unreachable!("resolve: nilbind in input")
            }
            PtPathKind::Edge { name, reversed } => PtPathKind::Edge {
                name: match name {
                    EdgeName::Static(s) => EdgeName::Static(s),
                    EdgeName::Computed(e) => EdgeName::Computed(Box::new(self.expr(*e))),
                },
                reversed,
            },
        };

        if let Some(v) = &pp.bind_obj_after {
            self.bind(v.clone());
        }
        if let Some(v) = &pp.bind_path {
            self.bind(v.clone());
        }
        pp
    }

    fn exprs(&mut self, exprs: Vec<PtExpr>) -> Vec<PtExpr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, mut pe: PtExpr) -> PtExpr {
        pe.kind = match pe.kind {
            PtExprKind::Select {
                sub,
                result,
                distinct,
            } => {
                self.push_scope();
                let sub = self.expr(*sub);
                let result = self.expr(*result);
                self.pop_scope();
                PtExprKind::Select {
                    sub: Box::new(sub),
                    result: Box::new(result),
                    distinct,
                }
            }
            PtExprKind::From(items) => PtExprKind::From(self.exprs(items)),
            PtExprKind::Where { sub, pred } => {
                let sub = self.expr(*sub);
                let pred = self.expr(*pred);
                PtExprKind::Where {
                    sub: Box::new(sub),
                    pred: Box::new(pred),
                }
            }
            PtExprKind::Group { sub, vars, newvar } => {
                let sub = self.expr(*sub);
                let vars = vars
                    .into_iter()
                    .map(|v| self.resolve_bound_var(v, "group by"))
                    .collect();
                if let Some(nv) = &newvar {
                    self.bind(nv.clone());
                }
                PtExprKind::Group {
                    sub: Box::new(sub),
                    vars,
                    newvar,
                }
            }
            PtExprKind::Ungroup { sub, var } => {
                let sub = self.expr(*sub);
                let var = self.resolve_bound_var(var, "ungroup");
                PtExprKind::Ungroup {
                    sub: Box::new(sub),
                    var,
                }
            }
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
                let body = self.path(body);
                // alias bindings issued by the parser resolve like any
                // other assign-without-body
                let more_bindings = self.exprs(more_bindings);
                PtExprKind::Path {
                    root: Box::new(root),
                    body,
                    more_bindings,
                }
            }
            PtExprKind::Tuple(items) => PtExprKind::Tuple(self.exprs(items)),
            PtExprKind::Forall { var, set, pred } => {
                let set = self.expr(*set);
                self.push_scope();
                self.bind(var.clone());
                let pred = self.expr(*pred);
                self.pop_scope();
                PtExprKind::Forall {
                    var,
                    set: Box::new(set),
                    pred: Box::new(pred),
                }
            }
            PtExprKind::Exists { var, set, pred } => {
                let set = self.expr(*set);
                self.push_scope();
                self.bind(var.clone());
                let pred = self.expr(*pred);
                self.pop_scope();
                PtExprKind::Exists {
                    var,
                    set: Box::new(set),
                    pred: Box::new(pred),
                }
            }
            PtExprKind::Map { var, set, result } => {
                let set = self.expr(*set);
                self.push_scope();
                self.bind(var.clone());
                let result = self.expr(*result);
                self.pop_scope();
                PtExprKind::Map {
                    var,
                    set: Box::new(set),
                    result: Box::new(result),
                }
            }
            PtExprKind::Assign { var, value, body } => {
                let value = self.expr(*value);
                let body = match body {
                    Some(b) => {
                        // variable only exists within the body
                        self.push_scope();
                        self.bind(var.clone());
                        let b = self.expr(*b);
                        self.pop_scope();
                        Some(Box::new(b))
                    }
                    None => {
                        // variable is entered into the current scope
                        self.bind(var.clone());
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
            PtExprKind::ReadAnyVar(name) => match self.look(&name) {
                Some(cvar) => PtExprKind::ReadColumnVar(cvar),
                None => {
                    let gvar = self.get_global(&name, pe.span);
                    PtExprKind::ReadGlobalVar(gvar)
                }
            },
            // parser-level sugar can create these upstream of here;
            // they are already resolved, so just go by
            k @ PtExprKind::ReadColumnVar(_) | k @ PtExprKind::ReadGlobalVar(_) => k,
            k @ PtExprKind::Value(_) => k,
        };
        pe
    }

    /// Warn for names (column or global) used for more than one variable.
    fn check_duplicate_varnames(&mut self) {
        for i in 0..self.allcolumns.len() {
            for j in (i + 1)..self.allcolumns.len() {
                let (cv1, cv2) = (&self.allcolumns[i], &self.allcolumns[j]);
                assert_ne!(cv1, cv2);
                if cv1.name() == cv2.name() {
                    let (s1, s2) = (cv1.span(), cv2.span());
                    let name = cv1.name().to_string();
                    self.ctx.warn(
                        s2,
                        format!("Variable name {} rebound in a later context", name),
                    );
                    self.ctx.warn(s1, format!("First binding of {} was here", name));
                }
            }
        }
        for gv in &self.globals {
            for cv in &self.allcolumns {
                if gv.name() == cv.name() {
                    let (gs, cs) = (gv.span(), cv.span());
                    let name = cv.name().to_string();
                    self.ctx.warn(
                        cs,
                        format!(
                            "Name of locally-bound variable {} also used as a global",
                            name
                        ),
                    );
                    self.ctx.warn(gs, "First global reference was here".to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::parser;

    fn resolved(text: &str) -> (Context, PtExpr) {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = resolve_vars(&mut ctx, pt).unwrap();
        (ctx, pt)
    }

    fn count_anyvars(pe: &PtExpr) -> usize {
        struct Counter(usize);
        impl PtFold for Counter {
            fn fold_expr_kind(&mut self, kind: PtExprKind) -> Result<PtExprKind> {
                if matches!(kind, PtExprKind::ReadAnyVar(_)) {
                    self.0 += 1;
                }
                fold_expr_kind(self, kind)
            }
        }
        let mut c = Counter(0);
        c.fold_expr(pe.clone()).unwrap();
        c.0
    }

    #[test]
    fn no_anyvar_remains() {
        let (ctx, pt) = resolved("select X from A.friend as X where X = B");
        assert!(ctx.errors().is_empty());
        assert_eq!(count_anyvars(&pt), 0);
    }

    #[test]
    fn bound_name_becomes_column_ref() {
        let (_, pt) = resolved("select X from A.friend as X");
        let (_, result, _) = pt.kind.as_select().unwrap();
        let var = result.kind.as_read_column_var().unwrap();
        assert_eq!(var.name(), "X");
    }

    #[test]
    fn unbound_name_becomes_global() {
        let (_, pt) = resolved("select X from A.friend as X");
        let (sub, _, _) = pt.kind.as_select().unwrap();
        let items = sub.kind.as_from().unwrap();
        let (root, _, _) = items[0].kind.as_path().unwrap();
        assert!(root.kind.is_read_global_var());
    }

    #[test]
    fn same_global_name_shares_var() {
        let (_, pt) = resolved("select A from A.friend as X");
        let (sub, result, _) = pt.kind.as_select().unwrap();
        let items = sub.kind.as_from().unwrap();
        let (root, _, _) = items[0].kind.as_path().unwrap();
        let g1 = root.kind.as_read_global_var().unwrap();
        let g2 = result.kind.as_read_global_var().unwrap();
        assert_eq!(g1, g2);
    }

    #[test]
    fn duplicate_binding_is_an_error() {
        let (ctx, _) = resolved("select X from A.friend as X, A.parent as X");
        let errors = ctx.errors();
        assert!(!errors.is_empty());
        assert!(errors.inner[0].reason.contains("Duplicate variable name X"));
    }

    #[test]
    fn shadowing_is_a_warning() {
        let (ctx, _) = resolved(
            "select X from A.friend as X where exists X in B.friend: X = C",
        );
        assert!(ctx.errors().is_empty());
        let warnings = ctx.warnings();
        assert!(warnings.inner.iter().any(|w| w.reason.contains("shadows")));
    }

    #[test]
    fn group_by_global_is_an_error() {
        let (ctx, _) = resolved("select X from A.friend as X group by G");
        assert!(ctx
            .errors()
            .inner
            .iter()
            .any(|e| e.reason.contains("Cannot group by global G")));
    }
}
