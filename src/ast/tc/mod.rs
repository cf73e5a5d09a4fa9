//! (Nested) tuple calculus.
//!
//! The target of lowering and the form the optimizer and the evaluator
//! work on. Standard relational operators (filter, project, strip,
//! rename, join, order, uniq), nested-relational operators (nest,
//! unnest), the variant operators distinguish and adjoin, and the graph
//! operators step, repeat and scan.
//!
//! Every node carries a datatype and a coltree once `typeinf` has run;
//! both are `None` before that.

mod fold;

pub mod dump;

pub use fold::*;

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use enum_as_inner::EnumAsInner;

use crate::ast::cols::{ColName, ColSet, ColTree};
use crate::ast::ops::Func;
use crate::ast::ty::Ty;
use crate::value::Value;

/// Global (database) variable.
#[derive(Clone)]
pub struct TcGlobal(Rc<TcGlobalInner>);

impl Eq for TcGlobal {}

struct TcGlobalInner {
    name: String,
}

impl TcGlobal {
    pub fn new<S: Into<String>>(name: S) -> Self {
        TcGlobal(Rc::new(TcGlobalInner { name: name.into() }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl PartialEq for TcGlobal {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for TcGlobal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TcGlobal({})", self.0.name)
    }
}

/// Ordinary tuple variable. Identity is the id; the datatype and coltree
/// are attached during type inference.
#[derive(Clone)]
pub struct TcVar(Rc<TcVarInner>);

impl Eq for TcVar {}

struct TcVarInner {
    id: usize,
    datatype: RefCell<Option<Ty>>,
    coltree: RefCell<Option<ColTree>>,
}

impl TcVar {
    pub fn new(id: usize) -> Self {
        TcVar(Rc::new(TcVarInner {
            id,
            datatype: RefCell::new(None),
            coltree: RefCell::new(None),
        }))
    }

    pub fn id(&self) -> usize {
        self.0.id
    }

    pub fn datatype(&self) -> Option<Ty> {
        *self.0.datatype.borrow()
    }

    pub fn set_datatype(&self, ty: Ty) {
        *self.0.datatype.borrow_mut() = Some(ty);
    }

    pub fn coltree(&self) -> Option<ColTree> {
        self.0.coltree.borrow().clone()
    }

    pub fn set_coltree(&self, ct: ColTree) {
        *self.0.coltree.borrow_mut() = Some(ct);
    }
}

impl PartialEq for TcVar {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Hash for TcVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Debug for TcVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TcVar(.K{})", self.0.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcExpr {
    pub kind: TcExprKind,
    /// Filled by typeinf.
    pub datatype: Option<Ty>,
    /// Filled by typeinf.
    pub colnames: Option<ColTree>,
}

#[derive(Debug, Clone, PartialEq, EnumAsInner, strum::AsRefStr)]
pub enum TcExprKind {
    /// Keep the tuples for which the predicate lambda holds.
    Filter {
        sub: Box<TcExpr>,
        predicate: Box<TcExpr>,
    },
    /// Extract columns.
    Project {
        sub: Box<TcExpr>,
        cols: ColSet,
    },
    /// Complement of project.
    Strip {
        sub: Box<TcExpr>,
        cols: ColSet,
    },
    /// Change a column name. `oldcol` of None names the whole value,
    /// which is how a scalar acquires its first column name.
    Rename {
        sub: Box<TcExpr>,
        oldcol: Option<ColName>,
        newcol: ColName,
    },
    Join {
        left: Box<TcExpr>,
        right: Box<TcExpr>,
        predicate: Option<Box<TcExpr>>,
    },
    /// Sort by columns; empty means all. Result is a sequence.
    Order {
        sub: Box<TcExpr>,
        cols: ColSet,
    },
    /// Drop consecutive duplicates by columns; empty means all.
    Uniq {
        sub: Box<TcExpr>,
        cols: ColSet,
    },
    /// Collect `cols` of equal-elsewhere runs into a set column `newcol`.
    Nest {
        sub: Box<TcExpr>,
        cols: ColSet,
        newcol: ColName,
    },
    /// Replicate rows, one per member of the collection in `col`.
    Unnest {
        sub: Box<TcExpr>,
        col: ColName,
    },
    /// Paste on a fresh unique id under `newcol`.
    Distinguish {
        sub: Box<TcExpr>,
        newcol: ColName,
    },
    /// Paste on `func(row)` under `newcol`.
    Adjoin {
        left: Box<TcExpr>,
        func: Box<TcExpr>,
        newcol: ColName,
    },
    /// One optimized graph traversal off column `subcolumn`.
    Step {
        sub: Box<TcExpr>,
        subcolumn: ColName,
        edgename: Option<Value>,
        reversed: bool,
        leftobjcolumn: ColName,
        edgecolumn: ColName,
        rightobjcolumn: ColName,
        predicate: Option<Box<TcExpr>>,
    },
    /// Transitive closure; see the evaluator for the full algorithm.
    Repeat {
        /// Stepping-off point.
        sub: Box<TcExpr>,
        /// Trailing column from `sub`.
        subendcolumn: ColName,
        /// Var the body reads the per-iteration input from.
        loopvar: TcVar,
        /// Leading column the body consumes.
        bodystartcolumn: ColName,
        body: Box<TcExpr>,
        /// Path column generated by the body, if paths are collected.
        bodypathcolumn: Option<ColName>,
        /// Trailing column generated by the body.
        bodyendcolumn: ColName,
        /// Path column for the whole repeat, if paths are collected.
        repeatpathcolumn: Option<ColName>,
        /// Trailing column for the whole repeat.
        repeatendcolumn: ColName,
    },
    /// The whole (left, edge, right) linkage table.
    Scan {
        leftobjcolumn: ColName,
        edgecolumn: ColName,
        rightobjcolumn: ColName,
        predicate: Option<Box<TcExpr>>,
    },
    Bop {
        left: Box<TcExpr>,
        op: Func,
        right: Box<TcExpr>,
    },
    Uop {
        op: Func,
        sub: Box<TcExpr>,
    },
    Func {
        op: Func,
        args: Vec<TcExpr>,
    },
    Map {
        var: TcVar,
        set: Box<TcExpr>,
        result: Box<TcExpr>,
    },
    Let {
        var: TcVar,
        value: Box<TcExpr>,
        body: Box<TcExpr>,
    },
    Lambda {
        var: TcVar,
        body: Box<TcExpr>,
    },
    Apply {
        lambda: Box<TcExpr>,
        arg: Box<TcExpr>,
    },
    ReadVar(TcVar),
    ReadGlobal(TcGlobal),
    /// Build a pathelement from a (left, edge, right) triple.
    CreatePathElement(Box<TcExpr>),
    /// Computed edge name pasted onto a value.
    Splatter {
        value: Box<TcExpr>,
        name: Box<TcExpr>,
    },
    Tuple {
        exprs: Vec<TcExpr>,
        columns: ColSet,
    },
    Value(Value),
}

impl TcExpr {
    pub fn new(kind: TcExprKind) -> Self {
        TcExpr {
            kind,
            datatype: None,
            colnames: None,
        }
    }

    pub fn filter(sub: TcExpr, predicate: TcExpr) -> Self {
        TcExpr::new(TcExprKind::Filter {
            sub: Box::new(sub),
            predicate: Box::new(predicate),
        })
    }

    pub fn project(sub: TcExpr, cols: ColSet) -> Self {
        TcExpr::new(TcExprKind::Project {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn strip(sub: TcExpr, cols: ColSet) -> Self {
        TcExpr::new(TcExprKind::Strip {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn rename(sub: TcExpr, oldcol: Option<ColName>, newcol: ColName) -> Self {
        TcExpr::new(TcExprKind::Rename {
            sub: Box::new(sub),
            oldcol,
            newcol,
        })
    }

    pub fn join(left: TcExpr, right: TcExpr, predicate: Option<TcExpr>) -> Self {
        TcExpr::new(TcExprKind::Join {
            left: Box::new(left),
            right: Box::new(right),
            predicate: predicate.map(Box::new),
        })
    }

    pub fn order(sub: TcExpr, cols: ColSet) -> Self {
        TcExpr::new(TcExprKind::Order {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn uniq(sub: TcExpr, cols: ColSet) -> Self {
        TcExpr::new(TcExprKind::Uniq {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn nest(sub: TcExpr, cols: ColSet, newcol: ColName) -> Self {
        TcExpr::new(TcExprKind::Nest {
            sub: Box::new(sub),
            cols,
            newcol,
        })
    }

    pub fn unnest(sub: TcExpr, col: ColName) -> Self {
        TcExpr::new(TcExprKind::Unnest {
            sub: Box::new(sub),
            col,
        })
    }

    pub fn distinguish(sub: TcExpr, newcol: ColName) -> Self {
        TcExpr::new(TcExprKind::Distinguish {
            sub: Box::new(sub),
            newcol,
        })
    }

    pub fn adjoin(left: TcExpr, func: TcExpr, newcol: ColName) -> Self {
        TcExpr::new(TcExprKind::Adjoin {
            left: Box::new(left),
            func: Box::new(func),
            newcol,
        })
    }

    pub fn scan(left: ColName, edge: ColName, right: ColName) -> Self {
        TcExpr::new(TcExprKind::Scan {
            leftobjcolumn: left,
            edgecolumn: edge,
            rightobjcolumn: right,
            predicate: None,
        })
    }

    pub fn bop(left: TcExpr, op: Func, right: TcExpr) -> Self {
        TcExpr::new(TcExprKind::Bop {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn uop(op: Func, sub: TcExpr) -> Self {
        TcExpr::new(TcExprKind::Uop {
            op,
            sub: Box::new(sub),
        })
    }

    pub fn func(op: Func, args: Vec<TcExpr>) -> Self {
        TcExpr::new(TcExprKind::Func { op, args })
    }

    pub fn map(var: TcVar, set: TcExpr, result: TcExpr) -> Self {
        TcExpr::new(TcExprKind::Map {
            var,
            set: Box::new(set),
            result: Box::new(result),
        })
    }

    pub fn let_(var: TcVar, value: TcExpr, body: TcExpr) -> Self {
        TcExpr::new(TcExprKind::Let {
            var,
            value: Box::new(value),
            body: Box::new(body),
        })
    }

    pub fn lambda(var: TcVar, body: TcExpr) -> Self {
        TcExpr::new(TcExprKind::Lambda {
            var,
            body: Box::new(body),
        })
    }

    pub fn apply(lambda: TcExpr, arg: TcExpr) -> Self {
        TcExpr::new(TcExprKind::Apply {
            lambda: Box::new(lambda),
            arg: Box::new(arg),
        })
    }

    pub fn readvar(var: TcVar) -> Self {
        TcExpr::new(TcExprKind::ReadVar(var))
    }

    pub fn readglobal(var: TcGlobal) -> Self {
        TcExpr::new(TcExprKind::ReadGlobal(var))
    }

    pub fn value(v: Value) -> Self {
        TcExpr::new(TcExprKind::Value(v))
    }

    pub fn tuple(exprs: Vec<TcExpr>, columns: ColSet) -> Self {
        TcExpr::new(TcExprKind::Tuple { exprs, columns })
    }

    /// True for expressions that are cheap to duplicate during rewrites.
    pub fn is_trivial(&self) -> bool {
        matches!(
            self.kind,
            TcExprKind::ReadVar(_) | TcExprKind::Value(_) | TcExprKind::ReadGlobal(_)
        )
    }
}
