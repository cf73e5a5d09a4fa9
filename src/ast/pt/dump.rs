//! Plain-text rendering of parse trees, for the per-stage diagnostic
//! dumps and for tests.

use std::fmt::Write;

use super::*;

pub fn dump(expr: &PtExpr) -> String {
    let mut d = Dumper::default();
    d.expr(expr);
    d.out
}

#[derive(Default)]
struct Dumper {
    out: String,
    indent: usize,
}

impl Dumper {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested<F: FnOnce(&mut Self)>(&mut self, head: &str, f: F) {
        self.line(head);
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn var(v: &ColumnVar) -> String {
        format!("{}#{}", v.name(), v.id())
    }

    fn vars(vs: &[ColumnVar]) -> String {
        vs.iter().map(Self::var).collect::<Vec<_>>().join(", ")
    }

    fn expr(&mut self, e: &PtExpr) {
        match &e.kind {
            PtExprKind::Select {
                sub,
                result,
                distinct,
            } => {
                let head = if *distinct { "select distinct" } else { "select" };
                self.nested(head, |d| {
                    d.expr(result);
                    d.expr(sub);
                });
            }
            PtExprKind::From(items) => self.nested("from", |d| {
                for i in items {
                    d.expr(i);
                }
            }),
            PtExprKind::Where { sub, pred } => self.nested("where", |d| {
                d.expr(pred);
                d.expr(sub);
            }),
            PtExprKind::Group { sub, vars, newvar } => {
                let mut head = format!("group by {}", Self::vars(vars));
                if let Some(nv) = newvar {
                    let _ = write!(head, " as {}", Self::var(nv));
                }
                self.nested(&head, |d| d.expr(sub));
            }
            PtExprKind::Ungroup { sub, var } => {
                let head = format!("ungroup {}", Self::var(var));
                self.nested(&head, |d| d.expr(sub));
            }
            PtExprKind::Rename { sub, name } => match name {
                EdgeName::Static(s) => {
                    let head = format!("rename {}", s);
                    self.nested(&head, |d| d.expr(sub));
                }
                EdgeName::Computed(n) => self.nested("rename computed", |d| {
                    d.expr(n);
                    d.expr(sub);
                }),
            },
            PtExprKind::Path {
                root,
                body,
                more_bindings,
            } => self.nested("path", |d| {
                d.expr(root);
                d.path(body);
                for b in more_bindings {
                    d.expr(b);
                }
            }),
            PtExprKind::Tuple(items) => self.nested("tuple", |d| {
                for i in items {
                    d.expr(i);
                }
            }),
            PtExprKind::Forall { var, set, pred } => {
                let head = format!("forall {} in", Self::var(var));
                self.nested(&head, |d| {
                    d.expr(set);
                    d.expr(pred);
                });
            }
            PtExprKind::Exists { var, set, pred } => {
                let head = format!("exists {} in", Self::var(var));
                self.nested(&head, |d| {
                    d.expr(set);
                    d.expr(pred);
                });
            }
            PtExprKind::Map { var, set, result } => {
                let head = format!("map {} in", Self::var(var));
                self.nested(&head, |d| {
                    d.expr(set);
                    d.expr(result);
                });
            }
            PtExprKind::Assign { var, value, body } => {
                let head = format!("let {} :=", Self::var(var));
                self.nested(&head, |d| {
                    d.expr(value);
                    if let Some(b) = body {
                        d.expr(b);
                    }
                });
            }
            PtExprKind::Bop { l, op, r } => {
                let head = format!("bop {}", op);
                self.nested(&head, |d| {
                    d.expr(l);
                    d.expr(r);
                });
            }
            PtExprKind::Uop { op, sub } => {
                let head = format!("uop {}", op);
                self.nested(&head, |d| d.expr(sub));
            }
            PtExprKind::Func { op, args } => {
                let head = format!("func {}", op);
                self.nested(&head, |d| {
                    for a in args {
                        d.expr(a);
                    }
                });
            }
            PtExprKind::ReadAnyVar(name) => self.line(&format!("anyvar {}", name)),
            PtExprKind::ReadColumnVar(var) => self.line(&format!("read {}", Self::var(var))),
            PtExprKind::ReadGlobalVar(var) => self.line(&format!("global {}", var.name())),
            PtExprKind::Value(v) => self.line(&format!("value {}", v)),
        }
    }

    fn path(&mut self, p: &PtPath) {
        let mut suffix = String::new();
        if let Some(v) = &p.bind_obj_before {
            let _ = write!(suffix, " before={}", Self::var(v));
        }
        if let Some(v) = &p.bind_obj_after {
            let _ = write!(suffix, " after={}", Self::var(v));
        }
        if let Some(v) = &p.bind_path {
            let _ = write!(suffix, " path={}", Self::var(v));
        }
        if p.dont_merge {
            suffix.push_str(" dontmerge");
        }
        match &p.kind {
            PtPathKind::Sequence(items) => {
                let head = format!("seq{}", suffix);
                self.nested(&head, |d| {
                    for i in items {
                        d.path(i);
                    }
                });
            }
            PtPathKind::Alternates { items, tail_var } => {
                let mut head = format!("alt{}", suffix);
                if let Some(tv) = tail_var {
                    let _ = write!(head, " tail={}", Self::var(tv));
                }
                self.nested(&head, |d| {
                    for i in items {
                        d.path(i);
                    }
                });
            }
            PtPathKind::Optional { sub, nil_columns } => {
                let mut head = format!("optional{}", suffix);
                if !nil_columns.is_empty() {
                    let _ = write!(head, " nil=[{}]", Self::vars(nil_columns));
                }
                self.nested(&head, |d| d.path(sub));
            }
            PtPathKind::Repeated {
                sub,
                path_from_inside,
                path_on_outside,
            } => {
                let mut head = format!("repeated{}", suffix);
                if let Some(v) = path_from_inside {
                    let _ = write!(head, " inside={}", Self::var(v));
                }
                if let Some(v) = path_on_outside {
                    let _ = write!(head, " outside={}", Self::var(v));
                }
                self.nested(&head, |d| d.path(sub));
            }
            PtPathKind::NilBind { before, sub, after } => {
                let head = format!(
                    "nilbind{} before=[{}] after=[{}]",
                    suffix,
                    Self::vars(before),
                    Self::vars(after)
                );
                self.nested(&head, |d| d.path(sub));
            }
            PtPathKind::Edge { name, reversed } => match name {
                EdgeName::Static(s) => {
                    let dir = if *reversed { "@" } else { "" };
                    self.line(&format!("edge {}{}{}", dir, s, suffix));
                }
                EdgeName::Computed(e) => {
                    let dir = if *reversed { "@" } else { "" };
                    let head = format!("edge {}computed{}", dir, suffix);
                    self.nested(&head, |d| d.expr(e));
                }
            },
        }
    }
}
