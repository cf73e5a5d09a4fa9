//! Path unification.
//!
//! Within each select scope, paths that share a root and a common prefix
//! are merged so the common subpath is evaluated once: the later path's
//! prefix is elided, its root becomes a read of the object variable bound
//! at the end of the shared prefix, and bindings in the elided prefix are
//! redefined as aliases of the surviving copy's variables.
//!
//! Per Lorel scoping, where-clause and result-clause paths each unify
//! with the from-clause paths but not with each other; when a select has
//! no from clause, the where paths serve as merge candidates instead.
//!
//! When a path is recorded as a merge candidate, each of its top-level
//! elements is given an object variable up front. The original created
//! them lazily while mutating the candidate in place; materializing them
//! at save time gives every possible join point a name, so merging never
//! needs to touch the saved path again. A prefix whose bindings cannot be
//! expressed as aliases of the candidate's variables simply merges
//! shorter, which costs a repeated subpath evaluation but never changes
//! meaning.

use anyhow::Result;

use crate::ast::pt::*;
use crate::context::Context;

pub fn unify(ctx: &mut Context, pe: PtExpr) -> Result<PtExpr> {
    let mut un = Unifier {
        ctx,
        infrom: false,
        sawfrom: false,
        savepaths: Vec::new(),
        insertexprs: Vec::new(),
    };
    let pe = un.expr(pe);
    assert!(un.insertexprs.is_empty(), "unify: unclaimed let-bindings");
    Ok(pe)
}

/// One merge candidate ("red" path). `elems` mirror the top-level
/// elements of the candidate's body: a snapshot for equality testing plus
/// the variable naming the object reached after that element.
struct SavedRed {
    root: RootKey,
    elems: Vec<RedElem>,
}

struct RedElem {
    snapshot: PtPath,
    objvar: ColumnVar,
}

#[derive(Clone, PartialEq)]
enum RootKey {
    Global(GlobalVar),
    Column(ColumnVar),
}

impl RootKey {
    fn of(root: &PtExpr) -> Option<RootKey> {
        match &root.kind {
            PtExprKind::ReadGlobalVar(g) => Some(RootKey::Global(g.clone())),
            PtExprKind::ReadColumnVar(c) => Some(RootKey::Column(c.clone())),
            _ => None,
        }
    }
}

struct Unifier<'a> {
    ctx: &'a mut Context,
    infrom: bool,
    sawfrom: bool,
    savepaths: Vec<SavedRed>,
    insertexprs: Vec<PtExpr>,
}

impl<'a> Unifier<'a> {
    fn letbind_var(&mut self, var: ColumnVar, othervar: ColumnVar) {
        self.insertexprs
            .push(PtExpr::assign(var, PtExpr::read_column(othervar), None));
    }

    fn take_exprs_forward(&mut self, fill: &mut Vec<PtExpr>) {
        fill.append(&mut self.insertexprs);
    }

    fn take_exprs_back(&mut self, fill: &mut Vec<PtExpr>) {
        while let Some(e) = self.insertexprs.pop() {
            fill.push(e);
        }
    }

    /// The variable naming the object a path element reaches. Alternates
    /// carry it as the tail variable normalize synthesized; everything
    /// else binds the object directly.
    fn ensure_objvar(&mut self, elem: &mut PtPath) -> ColumnVar {
        if let PtPathKind::Alternates { tail_var, .. } = &elem.kind {
            return tail_var
                .clone()
                .expect("unify: alternates without tail var");
        }
        if elem.bind_obj_after.is_none() {
            elem.bind_obj_after = Some(self.ctx.fresh_columnvar());
        }
        elem.bind_obj_after.clone().unwrap()
    }

    fn effective_objvar(elem: &PtPath) -> Option<ColumnVar> {
        if let PtPathKind::Alternates { tail_var, .. } = &elem.kind {
            return tail_var.clone();
        }
        elem.bind_obj_after.clone()
    }

    /// Record a path as a merge candidate. Mutates the body to give each
    /// top-level element a join variable.
    fn save_path(&mut self, root: RootKey, body: &mut PtPath) {
        let mut elems = Vec::new();
        match &mut body.kind {
            PtPathKind::Sequence(items) => {
                for item in items.iter_mut() {
                    let objvar = self.ensure_objvar(item);
                    elems.push(RedElem {
                        snapshot: item.clone(),
                        objvar,
                    });
                }
            }
            _ => {
                let objvar = self.ensure_objvar(body);
                elems.push(RedElem {
                    snapshot: body.clone(),
                    objvar,
                });
            }
        }
        self.savepaths.push(SavedRed { root, elems });
    }

    /// Can every binding in `blue` be redefined as an alias of a variable
    /// the matching red node carries? `top_objvar` stands in for the red
    /// object variable at the top level, which always exists.
    fn alias_feasible(blue: &PtPath, red: &PtPath, top_objvar: Option<&ColumnVar>) -> bool {
        if blue.bind_path.is_some() && red.bind_path.is_none() {
            return false;
        }
        if blue.bind_obj_after.is_some()
            && top_objvar.is_none()
            && Self::effective_objvar(red).is_none()
        {
            return false;
        }
        let children_ok = match (&blue.kind, &red.kind) {
            (PtPathKind::Sequence(a), PtPathKind::Sequence(b))
            | (
                PtPathKind::Alternates { items: a, .. },
                PtPathKind::Alternates { items: b, .. },
            ) => a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| Self::alias_feasible(x, y, None)),
            (PtPathKind::Optional { sub: a, .. }, PtPathKind::Optional { sub: b, .. })
            | (PtPathKind::Repeated { sub: a, .. }, PtPathKind::Repeated { sub: b, .. }) => {
                Self::alias_feasible(a, b, None)
            }
            _ => true,
        };
        children_ok
    }

    /// Emit alias lets redefining `blue`'s bindings in terms of the red
    /// node's variables. Only called after [Self::alias_feasible].
    fn alias_bindings(&mut self, blue: &PtPath, red: &PtPath, top_objvar: Option<&ColumnVar>) {
        if let Some(bv) = &blue.bind_path {
            let rv = red.bind_path.clone().unwrap();
            self.letbind_var(bv.clone(), rv);
        }
        if let Some(bv) = &blue.bind_obj_after {
            let rv = match top_objvar {
                Some(v) => v.clone(),
                None => Self::effective_objvar(red).unwrap(),
            };
            if bv != &rv {
                self.letbind_var(bv.clone(), rv);
            }
        }
        if let PtPathKind::Alternates { tail_var: Some(bv), .. } = &blue.kind {
            if top_objvar.is_none() {
                if let Some(rv) = Self::effective_objvar(red) {
                    if bv != &rv {
                        self.letbind_var(bv.clone(), rv);
                    }
                }
            }
        }
        match (&blue.kind, &red.kind) {
            (PtPathKind::Sequence(a), PtPathKind::Sequence(b))
            | (
                PtPathKind::Alternates { items: a, .. },
                PtPathKind::Alternates { items: b, .. },
            ) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    self.alias_bindings(x, y, None);
                }
            }
            (PtPathKind::Optional { sub: a, .. }, PtPathKind::Optional { sub: b, .. })
            | (PtPathKind::Repeated { sub: a, .. }, PtPathKind::Repeated { sub: b, .. }) => {
                self.alias_bindings(a, b, None);
            }
            _ => {}
        }
    }

    /// Try to merge the opening of `body` with one saved candidate.
    /// On success the shared prefix is removed from `body` and the new
    /// root variable is returned; a fully-consumed body returns with an
    /// empty sequence left behind.
    fn try_merge_one(&mut self, red_index: usize, body: &mut PtPath) -> Option<ColumnVar> {
        let blue_elems: Vec<&PtPath> = match &body.kind {
            PtPathKind::Sequence(items) => items.iter().collect(),
            _ => vec![body],
        };

        // longest structurally-equal prefix
        let red = &self.savepaths[red_index];
        let mut prefix = 0;
        while prefix < blue_elems.len() && prefix < red.elems.len() {
            let (b, r) = (blue_elems[prefix], &red.elems[prefix].snapshot);
            if !b.merge_eq(r) {
                break;
            }
            if !Self::alias_feasible(b, r, Some(&red.elems[prefix].objvar)) {
                break;
            }
            prefix += 1;
        }
        if prefix == 0 {
            return None;
        }

        // alias the elided bindings, then drop the prefix
        for k in 0..prefix {
            let red_elem_snapshot = self.savepaths[red_index].elems[k].snapshot.clone();
            let red_objvar = self.savepaths[red_index].elems[k].objvar.clone();
            let blue_k = match &body.kind {
                PtPathKind::Sequence(items) => items[k].clone(),
                _ => body.clone(),
            };
            self.alias_bindings(&blue_k, &red_elem_snapshot, Some(&red_objvar));
        }
        let joinvar = self.savepaths[red_index].elems[prefix - 1].objvar.clone();

        match &mut body.kind {
            PtPathKind::Sequence(items) => {
                items.drain(0..prefix);
                if items.len() == 1 {
                    let only = items.pop().unwrap();
                    *body = only;
                }
            }
            _ => {
                *body = PtPath::empty_sequence();
            }
        }
        Some(joinvar)
    }

    fn is_runt(body: &PtPath) -> bool {
        matches!(&body.kind, PtPathKind::Sequence(items) if items.is_empty())
    }

    /// Match a path against every live candidate, merging repeatedly: a
    /// prefix elided thanks to one candidate may expose a prefix shared
    /// with another.
    fn match_paths(&mut self, root: &mut PtExpr, body: &mut PtPath) {
        let Some(mut key) = RootKey::of(root) else {
            return;
        };
        loop {
            let mut merged = false;
            for i in 0..self.savepaths.len() {
                if self.savepaths[i].root != key {
                    continue;
                }
                if let Some(joinvar) = self.try_merge_one(i, body) {
                    root.kind = PtExprKind::ReadColumnVar(joinvar.clone());
                    key = RootKey::Column(joinvar);
                    merged = true;
                    break;
                }
            }
            if !merged || Self::is_runt(body) {
                return;
            }
        }
    }

    // ---- traversal ----

    fn path(&mut self, mut pp: PtPath) -> PtPath {
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
            PtPathKind::NilBind { .. } => unreachable!("unify: nilbind in input"),
            PtPathKind::Edge { name, reversed } => PtPathKind::Edge {
                name: match name {
                    EdgeName::Static(s) => EdgeName::Static(s),
                    EdgeName::Computed(e) => EdgeName::Computed(Box::new(self.expr(*e))),
                },
                reversed,
            },
        };
        pp
    }

    fn exprs(&mut self, exprs: Vec<PtExpr>) -> Vec<PtExpr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, mut pe: PtExpr) -> PtExpr {
        pe.kind = match pe.kind {
            // Paths in each of the where and select clauses unify with
            // the paths in the from clause, but not with each other; and
            // paths in a given select do not leak out of it.
            PtExprKind::Select {
                sub,
                result,
                distinct,
            } => {
                let mark = self.savepaths.len();
                let saveinfrom = self.infrom;
                let savesawfrom = self.sawfrom;
                self.infrom = false;
                self.sawfrom = false;

                let sub = self.expr(*sub);
                let result = self.expr(*result);

                self.infrom = saveinfrom;
                self.sawfrom = savesawfrom;
                self.savepaths.truncate(mark);

                PtExprKind::Select {
                    sub: Box::new(sub),
                    result: Box::new(result),
                    distinct,
                }
            }
            PtExprKind::From(items) => {
                if !items.is_empty() {
                    self.sawfrom = true;
                }
                self.infrom = true;
                let mut items = self.exprs(items);
                self.take_exprs_back(&mut items);
                self.infrom = false;
                PtExprKind::From(items)
            }
            PtExprKind::Where { sub, pred } => {
                let sub = self.expr(*sub);
                // without a from clause the where paths are the merge
                // candidates; with one, drop them again afterwards
                let mark = self.sawfrom.then(|| self.savepaths.len());
                let pred = self.expr(*pred);
                if let Some(mark) = mark {
                    self.savepaths.truncate(mark);
                }
                PtExprKind::Where {
                    sub: Box::new(sub),
                    pred: Box::new(pred),
                }
            }
            PtExprKind::Group { sub, vars, newvar } => PtExprKind::Group {
                sub: Box::new(self.expr(*sub)),
                vars,
                newvar,
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
                let mut root = self.expr(*root);
                let mut body = body;
                self.match_paths(&mut root, &mut body);

                if Self::is_runt(&body) {
                    // the whole path was a prefix of something already
                    // walked; all that remains is reading its tail
                    for b in more_bindings {
                        self.insertexprs.push(b);
                    }
                    return root;
                }

                if let Some(key) = RootKey::of(&root) {
                    self.save_path(key, &mut body);
                }
                let body = self.path(body);

                let mut more_bindings = more_bindings;
                if !self.infrom {
                    self.take_exprs_forward(&mut more_bindings);
                }
                PtExprKind::Path {
                    root: Box::new(root),
                    body,
                    more_bindings,
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
            PtExprKind::ReadAnyVar(_) => unreachable!("unify: unresolved variable"),
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

    fn unified(text: &str) -> PtExpr {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = resolve_vars(&mut ctx, pt).unwrap();
        assert!(ctx.errors().is_empty());
        let pt = normalize(&mut ctx, pt).unwrap();
        unify(&mut ctx, pt).unwrap()
    }

    fn collect_paths(pe: &PtExpr) -> Vec<PtExpr> {
        struct Paths(Vec<PtExpr>);
        impl PtFold for Paths {
            fn fold_expr(&mut self, mut e: PtExpr) -> Result<PtExpr> {
                if e.kind.is_path() {
                    self.0.push(e.clone());
                }
                e.kind = fold_expr_kind(self, e.kind)?;
                Ok(e)
            }
        }
        let mut p = Paths(Vec::new());
        p.fold_expr(pe.clone()).unwrap();
        p.0
    }

    fn count_edges(pe: &PtExpr) -> usize {
        let mut n = 0;
        for p in collect_paths(pe) {
            let (_, body, _) = p.kind.as_path().unwrap();
            n += edges_in(body);
        }
        n
    }

    fn edges_in(p: &PtPath) -> usize {
        match &p.kind {
            PtPathKind::Sequence(items) => items.iter().map(edges_in).sum(),
            PtPathKind::Alternates { items, .. } => items.iter().map(edges_in).sum(),
            PtPathKind::Optional { sub, .. }
            | PtPathKind::Repeated { sub, .. }
            | PtPathKind::NilBind { sub, .. } => edges_in(sub),
            PtPathKind::Edge { .. } => 1,
        }
    }

    #[test]
    fn shared_prefix_is_elided() {
        // A.b is walked once; the second path reads the object reached
        let pe = unified("select C from A.b as B, A.b.c as C");
        assert_eq!(count_edges(&pe), 2);
    }

    #[test]
    fn whole_path_prefix_becomes_read() {
        let pe = unified("select B from A.b.c as C, A.b as B where B = C");
        // A.b is entirely a prefix of A.b.c; only 2 edges remain
        assert_eq!(count_edges(&pe), 2);
    }

    #[test]
    fn where_path_merges_with_from() {
        let pe = unified("select B from A.b as B where A.b.c = 3");
        assert_eq!(count_edges(&pe), 2);
    }

    #[test]
    fn different_roots_do_not_merge() {
        let pe = unified("select B, C from A.b as B, D.b as C");
        assert_eq!(count_edges(&pe), 2);
    }

    #[test]
    fn dontmerge_is_exempt() {
        let pe = unified("select C from A.{b} as B, A.{b}.c as C");
        // both copies of b survive
        assert_eq!(count_edges(&pe), 3);
    }

    #[test]
    fn reversed_edges_do_not_merge_with_forward() {
        let pe = unified("select C from A.b as B, A.@b as C");
        assert_eq!(count_edges(&pe), 2);
    }
}
