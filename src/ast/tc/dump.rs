//! Plain-text rendering of tuple-calculus trees.

use std::fmt::Write;

use super::*;
use crate::ast::ty::TypeStore;

/// Render a tree. When `types` is given, each node line carries its
/// inferred datatype and coltree.
pub fn dump(expr: &TcExpr, types: Option<&TypeStore>) -> String {
    let mut d = Dumper {
        out: String::new(),
        indent: 0,
        types,
    };
    d.expr(expr);
    d.out
}

struct Dumper<'a> {
    out: String,
    indent: usize,
    types: Option<&'a TypeStore>,
}

impl<'a> Dumper<'a> {
    fn line(&mut self, text: &str, e: Option<&TcExpr>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        if let (Some(st), Some(e)) = (self.types, e) {
            if let Some(ty) = e.datatype {
                let _ = write!(self.out, " :: {}", st.name(ty));
            }
            if let Some(ct) = &e.colnames {
                let _ = write!(self.out, " cols {}", ct);
            }
        }
        self.out.push('\n');
    }

    fn nested<F: FnOnce(&mut Self)>(&mut self, head: &str, e: &TcExpr, f: F) {
        self.line(head, Some(e));
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn expr(&mut self, e: &TcExpr) {
        match &e.kind {
            TcExprKind::Filter { sub, predicate } => self.nested("filter", e, |d| {
                d.expr(predicate);
                d.expr(sub);
            }),
            TcExprKind::Project { sub, cols } => {
                let head = format!("project {}", cols);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Strip { sub, cols } => {
                let head = format!("strip {}", cols);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Rename {
                sub,
                oldcol,
                newcol,
            } => {
                let head = match oldcol {
                    Some(c) => format!("rename {} -> {}", c, newcol),
                    None => format!("rename * -> {}", newcol),
                };
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Join {
                left,
                right,
                predicate,
            } => self.nested("join", e, |d| {
                d.expr(left);
                d.expr(right);
                if let Some(p) = predicate {
                    d.expr(p);
                }
            }),
            TcExprKind::Order { sub, cols } => {
                let head = format!("order {}", cols);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Uniq { sub, cols } => {
                let head = format!("uniq {}", cols);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Nest { sub, cols, newcol } => {
                let head = format!("nest {} -> {}", cols, newcol);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Unnest { sub, col } => {
                let head = format!("unnest {}", col);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Distinguish { sub, newcol } => {
                let head = format!("distinguish -> {}", newcol);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Adjoin { left, func, newcol } => {
                let head = format!("adjoin -> {}", newcol);
                self.nested(&head, e, |d| {
                    d.expr(left);
                    d.expr(func);
                });
            }
            TcExprKind::Step {
                sub,
                subcolumn,
                edgename,
                reversed,
                leftobjcolumn,
                edgecolumn,
                rightobjcolumn,
                predicate,
            } => {
                let mut head = format!("step from {}", subcolumn);
                if let Some(en) = edgename {
                    let _ = write!(head, " edge {}", en);
                }
                if *reversed {
                    head.push_str(" reversed");
                }
                let _ = write!(
                    head,
                    " as ({}, {}, {})",
                    leftobjcolumn, edgecolumn, rightobjcolumn
                );
                self.nested(&head, e, |d| {
                    d.expr(sub);
                    if let Some(p) = predicate {
                        d.expr(p);
                    }
                });
            }
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
            } => {
                let mut head = format!(
                    "repeat from {} loopvar .K{} bodystart {} bodyend {}",
                    subendcolumn,
                    loopvar.id(),
                    bodystartcolumn,
                    bodyendcolumn
                );
                if let Some(c) = bodypathcolumn {
                    let _ = write!(head, " bodypath {}", c);
                }
                if let Some(c) = repeatpathcolumn {
                    let _ = write!(head, " repeatpath {}", c);
                }
                let _ = write!(head, " end {}", repeatendcolumn);
                self.nested(&head, e, |d| {
                    d.expr(sub);
                    d.expr(body);
                });
            }
            TcExprKind::Scan {
                leftobjcolumn,
                edgecolumn,
                rightobjcolumn,
                predicate,
            } => {
                let head = format!(
                    "scan as ({}, {}, {})",
                    leftobjcolumn, edgecolumn, rightobjcolumn
                );
                match predicate {
                    Some(p) => self.nested(&head, e, |d| d.expr(p)),
                    None => self.line(&head, Some(e)),
                }
            }
            TcExprKind::Bop { left, op, right } => {
                let head = format!("bop {}", op);
                self.nested(&head, e, |d| {
                    d.expr(left);
                    d.expr(right);
                });
            }
            TcExprKind::Uop { op, sub } => {
                let head = format!("uop {}", op);
                self.nested(&head, e, |d| d.expr(sub));
            }
            TcExprKind::Func { op, args } => {
                let head = format!("func {}", op);
                self.nested(&head, e, |d| {
                    for a in args {
                        d.expr(a);
                    }
                });
            }
            TcExprKind::Map { var, set, result } => {
                let head = format!("map .K{} in", var.id());
                self.nested(&head, e, |d| {
                    d.expr(set);
                    d.expr(result);
                });
            }
            TcExprKind::Let { var, value, body } => {
                let head = format!("let .K{} =", var.id());
                self.nested(&head, e, |d| {
                    d.expr(value);
                    d.expr(body);
                });
            }
            TcExprKind::Lambda { var, body } => {
                let head = format!("lambda .K{}", var.id());
                self.nested(&head, e, |d| d.expr(body));
            }
            TcExprKind::Apply { lambda, arg } => self.nested("apply", e, |d| {
                d.expr(lambda);
                d.expr(arg);
            }),
            TcExprKind::ReadVar(var) => self.line(&format!("read .K{}", var.id()), Some(e)),
            TcExprKind::ReadGlobal(g) => self.line(&format!("global {}", g.name()), Some(e)),
            TcExprKind::CreatePathElement(sub) => {
                self.nested("pathelement", e, |d| d.expr(sub))
            }
            TcExprKind::Splatter { value, name } => self.nested("splatter", e, |d| {
                d.expr(value);
                d.expr(name);
            }),
            TcExprKind::Tuple { exprs, columns } => {
                let head = format!("tuple {}", columns);
                self.nested(&head, e, |d| {
                    for x in exprs {
                        d.expr(x);
                    }
                });
            }
            TcExprKind::Value(v) => self.line(&format!("value {}", v), Some(e)),
        }
    }
}
