//! Parse tree.
//!
//! This is what the parser produces and what the PT passes (resolve
//! through dequantify) rewrite. Column variables are distinguished by
//! identity: two variables spelled the same are different unless they
//! came from the same creation site.

mod fold;

pub mod dump;

pub use fold::*;

use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use enum_as_inner::EnumAsInner;

use crate::ast::ops::Func;
use crate::error::Span;
use crate::value::Value;

/// Reference to a database root, named in the query text.
#[derive(Clone)]
pub struct GlobalVar(Rc<GlobalVarInner>);

impl Eq for GlobalVar {}

struct GlobalVarInner {
    name: String,
    span: Option<Span>,
}

impl GlobalVar {
    pub fn new<S: Into<String>>(name: S, span: Option<Span>) -> Self {
        GlobalVar(Rc::new(GlobalVarInner {
            name: name.into(),
            span,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn span(&self) -> Option<Span> {
        self.0.span
    }
}

impl PartialEq for GlobalVar {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for GlobalVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalVar({})", self.0.name)
    }
}

/// Column variable. Identity is the numeric id, assigned at creation and
/// never reused within a compilation.
#[derive(Clone)]
pub struct ColumnVar(Rc<ColumnVarInner>);

impl Eq for ColumnVar {}

struct ColumnVarInner {
    name: String,
    id: usize,
    span: Option<Span>,
}

impl ColumnVar {
    pub fn new<S: Into<String>>(name: S, id: usize, span: Option<Span>) -> Self {
        ColumnVar(Rc::new(ColumnVarInner {
            name: name.into(),
            id,
            span,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn id(&self) -> usize {
        self.0.id
    }

    pub fn span(&self) -> Option<Span> {
        self.0.span
    }
}

impl PartialEq for ColumnVar {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Hash for ColumnVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Debug for ColumnVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnVar({}#{})", self.0.name, self.0.id)
    }
}

/// An edge label: either literal text or an expression computed at
/// evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeName {
    Static(String),
    Computed(Box<PtExpr>),
}

/// A path, i.e. the part of a query that navigates the graph.
///
/// Every node can carry bindings: the object where the node starts
/// (`bind_obj_before`), the object it reaches (`bind_obj_after`), and the
/// sequence of path elements it traversed (`bind_path`).
#[derive(Debug, Clone, PartialEq)]
pub struct PtPath {
    pub kind: PtPathKind,

    pub bind_obj_before: Option<ColumnVar>,
    pub bind_obj_after: Option<ColumnVar>,
    pub bind_path: Option<ColumnVar>,

    /// Exempt from prefix unification.
    pub dont_merge: bool,
    /// Was parenthesized in the source.
    pub parens: bool,
}

#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum PtPathKind {
    Sequence(Vec<PtPath>),
    Alternates {
        items: Vec<PtPath>,
        /// Names the object reached by whichever alternative matched.
        tail_var: Option<ColumnVar>,
    },
    Optional {
        sub: Box<PtPath>,
        /// Bound to nil when `sub` is skipped.
        nil_columns: Vec<ColumnVar>,
    },
    Repeated {
        sub: Box<PtPath>,
        /// Path column read out of one iteration of `sub`.
        path_from_inside: Option<ColumnVar>,
        /// Path column emitted for the whole repetition.
        path_on_outside: Option<ColumnVar>,
    },
    NilBind {
        before: Vec<ColumnVar>,
        sub: Box<PtPath>,
        after: Vec<ColumnVar>,
    },
    Edge {
        name: EdgeName,
        reversed: bool,
    },
}

impl PtPath {
    pub fn new(kind: PtPathKind) -> Self {
        PtPath {
            kind,
            bind_obj_before: None,
            bind_obj_after: None,
            bind_path: None,
            dont_merge: false,
            parens: false,
        }
    }

    pub fn empty_sequence() -> Self {
        PtPath::new(PtPathKind::Sequence(Vec::new()))
    }

    pub fn static_edge<S: Into<String>>(name: S, reversed: bool) -> Self {
        PtPath::new(PtPathKind::Edge {
            name: EdgeName::Static(name.into()),
            reversed,
        })
    }

    pub fn computed_edge(name: PtExpr, reversed: bool) -> Self {
        PtPath::new(PtPathKind::Edge {
            name: EdgeName::Computed(Box::new(name)),
            reversed,
        })
    }

    pub fn optional(sub: PtPath) -> Self {
        PtPath::new(PtPathKind::Optional {
            sub: Box::new(sub),
            nil_columns: Vec::new(),
        })
    }

    pub fn repeated(sub: PtPath) -> Self {
        PtPath::new(PtPathKind::Repeated {
            sub: Box::new(sub),
            path_from_inside: None,
            path_on_outside: None,
        })
    }

    /// The variable naming the object this path reaches, if one is bound.
    pub fn tail_var(&self) -> Option<ColumnVar> {
        if let Some(v) = &self.bind_obj_after {
            return Some(v.clone());
        }
        match &self.kind {
            PtPathKind::Sequence(items) => items.last().and_then(|p| p.tail_var()),
            PtPathKind::Alternates { tail_var, .. } => tail_var.clone(),
            PtPathKind::Optional { sub, .. } => sub.tail_var(),
            PtPathKind::Repeated { sub, .. } => sub.tail_var(),
            PtPathKind::NilBind { sub, .. } => sub.tail_var(),
            PtPathKind::Edge { .. } => None,
        }
    }

    /// Structural equality for unification: identical shape, and neither
    /// side marked dont_merge. Bindings are not compared.
    pub fn merge_eq(&self, other: &PtPath) -> bool {
        if self.dont_merge && other.dont_merge {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                PtPathKind::Edge { name: n1, reversed: r1 },
                PtPathKind::Edge { name: n2, reversed: r2 },
            ) => {
                r1 == r2
                    && match (n1, n2) {
                        (EdgeName::Static(a), EdgeName::Static(b)) => a == b,
                        // computed names compare equal only when both are
                        // plain reads of the same variable; anything else
                        // may have effects and must not merge
                        (EdgeName::Computed(a), EdgeName::Computed(b)) => matches!(
                            (&a.kind, &b.kind),
                            (
                                PtExprKind::ReadColumnVar(va),
                                PtExprKind::ReadColumnVar(vb)
                            ) if va == vb
                        ) || matches!(
                            (&a.kind, &b.kind),
                            (
                                PtExprKind::ReadGlobalVar(ga),
                                PtExprKind::ReadGlobalVar(gb)
                            ) if ga == gb
                        ),
                        _ => false,
                    }
            }
            (PtPathKind::Sequence(a), PtPathKind::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.merge_eq(y))
            }
            (
                PtPathKind::Alternates { items: a, .. },
                PtPathKind::Alternates { items: b, .. },
            ) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.merge_eq(y)),
            (PtPathKind::Optional { sub: a, .. }, PtPathKind::Optional { sub: b, .. }) => {
                a.merge_eq(b)
            }
            (PtPathKind::Repeated { sub: a, .. }, PtPathKind::Repeated { sub: b, .. }) => {
                a.merge_eq(b)
            }
            (
                PtPathKind::NilBind { sub: a, .. },
                PtPathKind::NilBind { sub: b, .. },
            ) => a.merge_eq(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PtExpr {
    pub kind: PtExprKind,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, EnumAsInner, strum::AsRefStr)]
pub enum PtExprKind {
    Select {
        sub: Box<PtExpr>,
        result: Box<PtExpr>,
        distinct: bool,
    },
    From(Vec<PtExpr>),
    Where {
        sub: Box<PtExpr>,
        pred: Box<PtExpr>,
    },
    Group {
        sub: Box<PtExpr>,
        vars: Vec<ColumnVar>,
        newvar: Option<ColumnVar>,
    },
    Ungroup {
        sub: Box<PtExpr>,
        var: ColumnVar,
    },
    Rename {
        sub: Box<PtExpr>,
        name: EdgeName,
    },
    Path {
        root: Box<PtExpr>,
        body: PtPath,
        /// Additional bindings computed from the path (aliases, composed
        /// path values); accrue here during parsing and normalize.
        more_bindings: Vec<PtExpr>,
    },
    Tuple(Vec<PtExpr>),
    Forall {
        var: ColumnVar,
        set: Box<PtExpr>,
        pred: Box<PtExpr>,
    },
    Exists {
        var: ColumnVar,
        set: Box<PtExpr>,
        pred: Box<PtExpr>,
    },
    Map {
        var: ColumnVar,
        set: Box<PtExpr>,
        result: Box<PtExpr>,
    },
    Assign {
        var: ColumnVar,
        value: Box<PtExpr>,
        body: Option<Box<PtExpr>>,
    },
    Bop {
        l: Box<PtExpr>,
        op: Func,
        r: Box<PtExpr>,
    },
    Uop {
        op: Func,
        sub: Box<PtExpr>,
    },
    Func {
        op: Func,
        args: Vec<PtExpr>,
    },
    /// Unresolved name; none remain after resolve.
    ReadAnyVar(String),
    ReadColumnVar(ColumnVar),
    ReadGlobalVar(GlobalVar),
    Value(Value),
}

impl PtExpr {
    pub fn new(kind: PtExprKind) -> Self {
        PtExpr { kind, span: None }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn read_column(var: ColumnVar) -> Self {
        PtExpr::new(PtExprKind::ReadColumnVar(var))
    }

    pub fn value(value: Value) -> Self {
        PtExpr::new(PtExprKind::Value(value))
    }

    pub fn bop(l: PtExpr, op: Func, r: PtExpr) -> Self {
        PtExpr::new(PtExprKind::Bop {
            l: Box::new(l),
            op,
            r: Box::new(r),
        })
    }

    pub fn uop(op: Func, sub: PtExpr) -> Self {
        PtExpr::new(PtExprKind::Uop {
            op,
            sub: Box::new(sub),
        })
    }

    pub fn func(op: Func, args: Vec<PtExpr>) -> Self {
        PtExpr::new(PtExprKind::Func { op, args })
    }

    pub fn assign(var: ColumnVar, value: PtExpr, body: Option<PtExpr>) -> Self {
        PtExpr::new(PtExprKind::Assign {
            var,
            value: Box::new(value),
            body: body.map(Box::new),
        })
    }
}
