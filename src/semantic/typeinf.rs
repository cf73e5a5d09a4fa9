//! Type and column inference.
//!
//! Top-down over the tree with an *environment*: the type the context
//! expects, plus the expected column shape where one is known (needed to
//! give lambda-bound variables their columns). Each node's datatype and
//! coltree are then assembled bottom-up from its children.
//!
//! This pass issues no diagnostics. When types are wrong it plugs in
//! something for typecheck to flag later, chosen to keep one mistake
//! from snowballing into many reports.

use anyhow::Result;

use crate::ast::cols::{ColName, ColSet, ColTree};
use crate::ast::ops::Func;
use crate::ast::tc::{TcExpr, TcExprKind};
use crate::ast::ty::{Ty, TyKind};
use crate::context::Context;
use crate::value::Value;

pub fn typeinf(ctx: &mut Context, te: &mut TcExpr) -> Result<()> {
    let top = ctx.types.top();
    let mut inf = TypeInf { ctx };
    inf.infer(te, top, None);
    Ok(())
}

/// The runtime type of a constant.
pub fn value_datatype(ctx: &mut Context, v: &Value) -> Ty {
    match v {
        Value::Nil => ctx.types.absbottom(),
        Value::Bool(_) => ctx.types.bool(),
        Value::Int(_) => ctx.types.int(),
        Value::Float(_) => ctx.types.double(),
        Value::String(_) => ctx.types.string(),
        Value::Distinguisher(_) => ctx.types.distinguisher(),
        Value::Struct(_) => ctx.types.dbobj(),
        Value::PathElement(_) => ctx.types.pathelement(),
        Value::Lambda(_) => {
            let top = ctx.types.top();
            ctx.types.lambda(top, top)
        }
        Value::Tuple(items) => {
            let members: Vec<Ty> = items.iter().map(|m| value_datatype(ctx, m)).collect();
            ctx.types.tuple(members)
        }
        Value::Set(items) => {
            let member = coll_member_type(ctx, items);
            ctx.types.set(member)
        }
        Value::Sequence(items) => {
            let member = coll_member_type(ctx, items);
            ctx.types.sequence(member)
        }
    }
}

fn coll_member_type(ctx: &mut Context, items: &[Value]) -> Ty {
    let mut member = ctx.types.absbottom();
    for item in items {
        let t = value_datatype(ctx, item);
        member = ctx.types.match_generalize(member, t);
    }
    member
}

struct TypeInf<'a> {
    ctx: &'a mut Context,
}

impl<'a> TypeInf<'a> {
    fn types(&mut self) -> &mut crate::ast::ty::TypeStore {
        &mut self.ctx.types
    }

    fn anon(&mut self) -> ColName {
        self.ctx.fresh_colname()
    }

    fn scalar_anon(&mut self) -> ColTree {
        let c = self.anon();
        ColTree::scalar(c)
    }

    /// Strip one set/sequence wrapper.
    fn unwrap_coll(&mut self, t: Ty) -> Ty {
        self.ctx.types.collection_member(t).unwrap_or(t)
    }

    /// Type of one column of an expression, by name.
    fn member_type(&mut self, te: &TcExpr, col: &ColName) -> Option<Ty> {
        let ct = te.colnames.as_ref()?;
        let t = te.datatype?;
        let t = self.unwrap_coll(t);
        let ix = ct.find(col)?;
        Some(self.ctx.types.getnth(t, ix))
    }

    /// Tuple of the types of the given columns, in colset order.
    fn member_types(&mut self, te: &TcExpr, cols: &ColSet) -> Ty {
        let members: Vec<Ty> = cols
            .iter()
            .map(|c| {
                self.member_type(te, c)
                    .unwrap_or_else(|| self.ctx.types.absbottom())
            })
            .collect();
        self.ctx.types.tuple(members)
    }

    /// Tuple of the types of the columns NOT in the given set.
    fn member_types_except(&mut self, te: &TcExpr, cols: &ColSet) -> Ty {
        let kept: Vec<ColName> = match te.colnames.as_ref() {
            Some(ct) => ct.members().filter(|c| !cols.contains(c)).collect(),
            None => Vec::new(),
        };
        self.member_types(te, &ColSet::from_cols(kept))
    }

    /// Tuple of the types of the columns a coltree names.
    fn member_types_coltree(&mut self, te: &TcExpr, ct: &ColTree) -> Ty {
        self.member_types(te, &ColSet::from_coltree(ct))
    }

    // ---- operators ----

    /// The most general required type for one argument of an operator.
    fn func_argtype(&mut self, f: Func, argnum: usize) -> Ty {
        let st = self.types();
        match f {
            Func::Union
            | Func::Intersect
            | Func::Except
            | Func::UnionAll
            | Func::IntersectAll
            | Func::ExceptAll => {
                let top = st.top();
                st.set(top)
            }
            Func::In => {
                if argnum == 0 {
                    st.top()
                } else {
                    let top = st.top();
                    st.set(top)
                }
            }
            Func::NonEmpty | Func::GetElement | Func::Count => {
                let top = st.top();
                st.set(top)
            }
            Func::Sum | Func::Avg | Func::Min | Func::Max => {
                let n = st.absnumber();
                st.set(n)
            }
            Func::AllTrue | Func::AnyTrue => {
                let b = st.bool();
                st.set(b)
            }
            Func::Eq | Func::NotEq | Func::Choose => st.top(),
            Func::MakeSet | Func::New | Func::ToString => st.top(),
            Func::Concat => st.top(),
            Func::Like | Func::Glob | Func::Grep | Func::Soundex => st.string(),
            Func::Lt
            | Func::Gt
            | Func::LtEq
            | Func::GtEq
            | Func::Add
            | Func::Sub
            | Func::Mul
            | Func::Div
            | Func::Mod => st.absnumber(),
            Func::Neg | Func::Abs => st.absnumber(),
            Func::And | Func::Or => st.bool(),
            Func::Not => st.bool(),
            Func::Ctime => unreachable!("ctime takes no arguments"),
        }
    }

    fn func_result(&mut self, f: Func, subtypes: &[Ty]) -> Ty {
        let bottom = self.types().absbottom();
        let (left, right, sub) = match subtypes {
            [l, r] => (*l, *r, *l),
            [s] => (*s, *s, *s),
            _ => (bottom, bottom, bottom),
        };

        match f {
            Func::Concat => {
                // concatenating single path elements builds a path
                let mut left = left;
                let mut right = right;
                if *self.types().kind(left) == TyKind::PathElement {
                    left = self.types().sequence(left);
                }
                if *self.types().kind(right) == TyKind::PathElement {
                    right = self.types().sequence(right);
                }
                self.types().match_generalize(left, right)
            }
            Func::Union
            | Func::Intersect
            | Func::Except
            | Func::UnionAll
            | Func::IntersectAll
            | Func::ExceptAll
            | Func::Choose => self.types().match_generalize(left, right),

            Func::MakeSet => self.types().set(sub),

            Func::GetElement => match self.types().kind(sub) {
                TyKind::Set(m) => *m,
                _ => bottom,
            },

            // aggregating a scalar aggregates its singleton
            Func::Sum | Func::Min | Func::Max => match self.types().kind(sub) {
                TyKind::Set(m) | TyKind::Sequence(m) => *m,
                _ => sub,
            },

            Func::Count => self.types().int(),

            Func::Avg => match self.types().kind(sub).clone() {
                TyKind::Set(m) | TyKind::Sequence(m) if self.ctx.types.is_numeric(m) => {
                    self.types().double()
                }
                _ if self.ctx.types.is_numeric(sub) => self.types().double(),
                _ => bottom,
            },

            Func::In
            | Func::NonEmpty
            | Func::AllTrue
            | Func::AnyTrue
            | Func::And
            | Func::Or
            | Func::Not
            | Func::Eq
            | Func::NotEq
            | Func::Lt
            | Func::Gt
            | Func::LtEq
            | Func::GtEq
            | Func::Like
            | Func::Glob
            | Func::Grep
            | Func::Soundex => self.types().bool(),

            Func::New => match self.types().kind(sub).clone() {
                TyKind::Set(_) | TyKind::Sequence(_) | TyKind::PathElement | TyKind::Tuple(_) => {
                    self.types().strukt()
                }
                _ => sub,
            },

            Func::Ctime | Func::ToString => self.types().string(),

            // provided both are numbers, use the most general number
            Func::Add | Func::Sub | Func::Mul | Func::Div | Func::Mod => {
                self.types().match_generalize(left, right)
            }

            Func::Neg | Func::Abs => sub,
        }
    }

    fn func_columns(&mut self, f: Func, subcols: &[Option<ColTree>]) -> ColTree {
        match f {
            Func::Union
            | Func::Intersect
            | Func::Except
            | Func::UnionAll
            | Func::IntersectAll
            | Func::ExceptAll
            | Func::Concat
            | Func::Choose => {
                if let [Some(left), Some(right)] = subcols {
                    if left.arity() == right.arity() {
                        return left.clone();
                    }
                }
            }
            Func::MakeSet | Func::GetElement | Func::Not | Func::Neg | Func::Abs => {
                if let [Some(only)] = subcols {
                    return only.clone();
                }
            }
            _ => {}
        }
        self.scalar_anon()
    }

    fn func(&mut self, op: Func, args: &mut [TcExpr]) -> (Ty, ColTree) {
        let mut types = Vec::with_capacity(args.len());
        let mut cols = Vec::with_capacity(args.len());
        for (i, arg) in args.iter_mut().enumerate() {
            let argtype = self.func_argtype(op, i);
            self.infer(arg, argtype, None);
            // use the type actually found
            types.push(arg.datatype.unwrap());
            cols.push(arg.colnames.clone());
        }
        let ty = self.func_result(op, &types);
        let ct = self.func_columns(op, &cols);
        (ty, ct)
    }

    // ---- the main recursion ----

    /// Infer one node. Inference is idempotent modulo identity: a node
    /// that already carries a column shape of the right arity keeps it,
    /// so names established by earlier passes (norenames in particular)
    /// survive re-inference.
    fn infer(&mut self, te: &mut TcExpr, environment: Ty, envmembers: Option<&ColTree>) {
        let prior = te.colnames.take();
        self.infer_fresh(te, environment, envmembers);
        if let (Some(prior), Some(fresh)) = (prior, te.colnames.as_ref()) {
            if prior.arity() == fresh.arity() {
                te.colnames = Some(prior);
            }
        }
    }

    fn infer_fresh(&mut self, te: &mut TcExpr, environment: Ty, envmembers: Option<&ColTree>) {
        match &mut te.kind {
            TcExprKind::Filter { sub, predicate } => {
                // same type as the subexpression, which should be set(T);
                // the test expression is T -> bool
                self.infer(sub, environment, envmembers);
                te.datatype = sub.datatype;
                te.colnames = sub.colnames.clone();
                let subtype = self.unwrap_coll(te.datatype.unwrap());
                let b = self.types().bool();
                let lam = self.types().lambda(subtype, b);
                let cols = te.colnames.clone();
                self.infer(predicate, lam, cols.as_ref());
            }

            TcExprKind::Project { sub, cols } => {
                self.infer(sub, environment, envmembers);
                cols.resolve_tocomplement(sub.colnames.as_ref().unwrap());
                let anon = self.anon();
                let ct = sub.colnames.as_ref().unwrap().project(cols, anon);
                let mut ty = self.member_types(sub, cols);
                match self.types().kind(sub.datatype.unwrap()).clone() {
                    TyKind::Set(_) => ty = self.types().set(ty),
                    TyKind::Sequence(_) => ty = self.types().sequence(ty),
                    _ => {}
                }
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Strip { sub, cols } => {
                self.infer(sub, environment, envmembers);
                cols.resolve_tocomplement(sub.colnames.as_ref().unwrap());
                let ct = sub.colnames.as_ref().unwrap().strip(cols);
                let mut ty = self.member_types_coltree(sub, &ct);
                if self.ctx.types.is_set(sub.datatype.unwrap()) {
                    ty = self.types().set(ty);
                } else if self.ctx.types.is_sequence(sub.datatype.unwrap()) {
                    ty = self.types().sequence(ty);
                }
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Rename {
                sub,
                oldcol,
                newcol,
            } => {
                self.infer(sub, environment, envmembers);
                te.datatype = sub.datatype;
                let subct = sub.colnames.as_ref().unwrap();
                te.colnames = Some(match oldcol {
                    Some(old) => subct.rename(old, newcol.clone()),
                    // renaming the whole value names its one column
                    None => match subct {
                        ColTree::Scalar(_) => ColTree::scalar(newcol.clone()),
                        ColTree::Tuple { members, .. } => ColTree::tuple(
                            newcol.clone(),
                            members.clone(),
                        ),
                    },
                });
            }

            TcExprKind::Join {
                left,
                right,
                predicate,
            } => {
                let top = self.types().top();
                let settop = self.types().set(top);
                self.infer(left, settop, None);
                self.infer(right, settop, None);
                let mut lefttype = left.datatype.unwrap();
                let mut righttype = right.datatype.unwrap();

                let ty = if lefttype == top || righttype == top {
                    top
                } else if !self.ctx.types.is_set(lefttype) && !self.ctx.types.is_set(righttype)
                {
                    // adapt if something failed underneath us
                    self.types().tuple_concat(lefttype, righttype)
                } else {
                    if let TyKind::Set(m) = self.types().kind(lefttype) {
                        lefttype = *m;
                    }
                    if let TyKind::Set(m) = self.types().kind(righttype) {
                        righttype = *m;
                    }
                    let t = self.types().tuple_concat(lefttype, righttype);
                    self.types().set(t)
                };
                te.datatype = Some(ty);
                let anon = self.anon();
                te.colnames = Some(ColTree::join(
                    left.colnames.as_ref().unwrap(),
                    right.colnames.as_ref().unwrap(),
                    anon,
                ));

                if let Some(pred) = predicate {
                    let rowtype = self.unwrap_coll(ty);
                    let b = self.types().bool();
                    let lam = self.types().lambda(rowtype, b);
                    let cols = te.colnames.clone();
                    self.infer(pred, lam, cols.as_ref());
                }
            }

            TcExprKind::Order { sub, cols } => {
                // columns remain; type changes from set to sequence
                self.infer(sub, environment, envmembers);
                cols.resolve_tocomplement(sub.colnames.as_ref().unwrap());
                let mut ty = sub.datatype.unwrap();
                if let TyKind::Set(m) = self.types().kind(ty) {
                    let m = *m;
                    ty = self.types().sequence(m);
                }
                te.datatype = Some(ty);
                te.colnames = sub.colnames.clone();
            }

            TcExprKind::Uniq { sub, cols } => {
                self.infer(sub, environment, envmembers);
                cols.resolve_tocomplement(sub.colnames.as_ref().unwrap());
                te.datatype = sub.datatype;
                te.colnames = sub.colnames.clone();
            }

            TcExprKind::Nest { sub, cols, newcol } => {
                // keep the columns not specified; collect the specified
                // ones into a set under the new column
                self.infer(sub, environment, envmembers);
                cols.resolve_tocomplement(sub.colnames.as_ref().unwrap());

                let ct = sub
                    .colnames
                    .as_ref()
                    .unwrap()
                    .nest(cols, newcol.clone());
                let kept = self.member_types_except(sub, cols);
                let nested = self.member_types(sub, cols);
                let nested = self.types().set(nested);
                let mut ty = self.types().tuple_append(kept, nested);
                if self.ctx.types.is_set(sub.datatype.unwrap()) {
                    ty = self.types().set(ty);
                }
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Unnest { sub, col } => {
                self.infer(sub, environment, envmembers);

                let mut kept = self.member_types_except(sub, &ColSet::singleton(col.clone()));
                let member = self
                    .member_type(sub, col)
                    .unwrap_or_else(|| self.ctx.types.absbottom());
                let expanded = self.unwrap_coll(member);

                // the nested column's subtree keeps the collected names;
                // fall back to anonymous columns when the shape is gone
                let sub_ct = sub.colnames.as_ref().unwrap().clone();
                let subtree = sub_ct.find(col).and_then(|ix| {
                    if sub_ct.is_tuple() {
                        Some(sub_ct.subtree(ix).clone())
                    } else {
                        None
                    }
                });
                let inner_ct = match subtree {
                    Some(st @ ColTree::Tuple { .. }) => st,
                    _ => match self.types().kind(expanded).clone() {
                        TyKind::Tuple(members) => {
                            let anon = self.anon();
                            let subs = members
                                .iter()
                                .map(|_| {
                                    let c = self.anon();
                                    ColTree::scalar(c)
                                })
                                .collect();
                            ColTree::tuple(anon, subs)
                        }
                        // a scalar member keeps the column's name
                        _ => ColTree::scalar(col.clone()),
                    },
                };
                let ct = sub_ct.unnest(col, &inner_ct);

                kept = self.types().tuple_concat(kept, expanded);
                if self.ctx.types.is_set(sub.datatype.unwrap()) {
                    kept = self.types().set(kept);
                }
                te.datatype = Some(kept);
                te.colnames = Some(ct);
            }

            TcExprKind::Distinguish { sub, newcol } => {
                self.infer(sub, environment, envmembers);
                let subtype = self.unwrap_coll(sub.datatype.unwrap());
                let d = self.types().distinguisher();
                let mut ty = self.types().tuple_append(subtype, d);
                if self.ctx.types.is_set(sub.datatype.unwrap()) {
                    ty = self.types().set(ty);
                }
                te.datatype = Some(ty);
                te.colnames = Some(sub.colnames.as_ref().unwrap().adjoin(newcol.clone()));
            }

            TcExprKind::Adjoin { left, func, newcol } => {
                self.infer(left, environment, envmembers);
                let lefttype = self.unwrap_coll(left.datatype.unwrap());
                let top = self.types().top();
                let lam = self.types().lambda(lefttype, top);
                let leftcols = left.colnames.clone();
                self.infer(func, lam, leftcols.as_ref());
                let mut righttype = func.datatype.unwrap();
                if let TyKind::Lambda(_, r) = self.types().kind(righttype) {
                    righttype = *r;
                }

                // adjoin pastes on scalars; a tuple-valued function is
                // flattened, because (a, (b, c)) is not a legal type
                let (ty, ct) = if lefttype == top {
                    (
                        lefttype,
                        left.colnames.as_ref().unwrap().adjoin(newcol.clone()),
                    )
                } else if self.types().arity(righttype) != 1 {
                    let rightcols = match &func.kind {
                        TcExprKind::Lambda { body, .. } => body.colnames.clone().unwrap(),
                        _ => self.scalar_anon(),
                    };
                    let t = self.types().tuple_concat(lefttype, righttype);
                    let anon = self.anon();
                    (
                        t,
                        ColTree::join(left.colnames.as_ref().unwrap(), &rightcols, anon),
                    )
                } else {
                    let t = self.types().tuple_append(lefttype, righttype);
                    (t, left.colnames.as_ref().unwrap().adjoin(newcol.clone()))
                };
                let ty = if self.ctx.types.is_set(left.datatype.unwrap()) {
                    self.types().set(ty)
                } else {
                    ty
                };
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Step {
                sub,
                subcolumn: _,
                edgename: _,
                reversed: _,
                leftobjcolumn,
                edgecolumn,
                rightobjcolumn,
                predicate,
            } => {
                // equivalent to Join(sub, Scan, pred) with known columns
                let top = self.types().top();
                let settop = self.types().set(top);
                self.infer(sub, settop, None);
                let subrow = self.unwrap_coll(sub.datatype.unwrap());
                let dbobj = self.types().dbobj();
                let dbedge = self.types().dbedge();
                let scanrow = self.types().tuple(vec![dbobj, dbedge, dbobj]);
                let row = self.types().tuple_concat(subrow, scanrow);
                let ty = self.types().set(row);

                let anon = self.anon();
                let scan_ct = ColTree::triple(
                    anon,
                    leftobjcolumn.clone(),
                    edgecolumn.clone(),
                    rightobjcolumn.clone(),
                );
                let anon = self.anon();
                let ct = ColTree::join(sub.colnames.as_ref().unwrap(), &scan_ct, anon);

                te.datatype = Some(ty);
                te.colnames = Some(ct);

                if let Some(pred) = predicate {
                    let b = self.types().bool();
                    let lam = self.types().lambda(row, b);
                    let cols = te.colnames.clone();
                    self.infer(pred, lam, cols.as_ref());
                }
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
                self.infer(sub, environment, envmembers);

                // the loop variable always holds a set: even a scalar
                // start is a set from the second iteration on
                if !self.ctx.types.is_set(sub.datatype.unwrap()) {
                    let inner = std::mem::replace(sub.as_mut(), TcExpr::value(Value::Nil));
                    let dt = inner.datatype.unwrap();
                    let cn = inner.colnames.clone();
                    let mut wrapped = TcExpr::uop(Func::MakeSet, inner);
                    wrapped.datatype = Some(self.types().set(dt));
                    wrapped.colnames = cn;
                    **sub = wrapped;
                }

                let elemtype = self
                    .member_type(sub, subendcolumn)
                    .unwrap_or_else(|| self.ctx.types.absbottom());
                let loopvartype = self.types().set(elemtype);
                loopvar.set_datatype(loopvartype);
                loopvar.set_coltree(ColTree::scalar(bodystartcolumn.clone()));

                let top = self.types().top();
                let settop = self.types().set(top);
                self.infer(body, settop, None);

                // given sub :: S and body :: set(B, O, P), the result is
                // S x (seq(O), [seq(path)], B-end)
                let lefttype = self.unwrap_coll(sub.datatype.unwrap());

                let mut cs = ColSet::singleton(bodystartcolumn.clone());
                if let Some(bp) = bodypathcolumn {
                    cs.add(bp.clone());
                }
                cs.add(bodyendcolumn.clone());

                let others = self.member_types_except(body, &cs);
                let others_arity = self.types().arity(others);

                let (mut ty, mut ct) = if others_arity == 1 {
                    // the one bound column keeps its name, now a sequence
                    let others_ct = body.colnames.as_ref().unwrap().strip(&cs);
                    let seq = self.types().sequence(others);
                    let t = self.types().tuple_concat(lefttype, seq);
                    let c = sub
                        .colnames
                        .as_ref()
                        .unwrap()
                        .adjoin_coltree(&others_ct);
                    (t, c)
                } else if others_arity > 1 {
                    // several bound columns collect as one sequence of
                    // tuples under a fresh column
                    let seq = self.types().sequence(others);
                    let t = self.types().tuple_concat(lefttype, seq);
                    let anon = self.anon();
                    let c = sub.colnames.as_ref().unwrap().adjoin(anon);
                    (t, c)
                } else {
                    // loop doesn't bind anything; avoid seq(unit)
                    (lefttype, sub.colnames.clone().unwrap())
                };

                if let (Some(bp), Some(rp)) = (bodypathcolumn.as_ref(), repeatpathcolumn.as_ref())
                {
                    let mut pt = self
                        .member_type(body, bp)
                        .unwrap_or_else(|| self.ctx.types.absbottom());
                    if *self.types().kind(pt) == TyKind::PathElement {
                        pt = self.types().sequence(pt);
                    }
                    ty = self.types().tuple_append(ty, pt);
                    ct = ct.adjoin(rp.clone());
                }

                let endtype = self
                    .member_type(body, bodyendcolumn)
                    .unwrap_or_else(|| self.ctx.types.absbottom());
                ty = self.types().tuple_append(ty, endtype);
                ct = ct.adjoin(repeatendcolumn.clone());

                if self.ctx.types.is_set(body.datatype.unwrap()) {
                    ty = self.types().set(ty);
                }
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Scan {
                leftobjcolumn,
                edgecolumn,
                rightobjcolumn,
                predicate,
            } => {
                let dbobj = self.types().dbobj();
                let dbedge = self.types().dbedge();
                let row = self.types().tuple(vec![dbobj, dbedge, dbobj]);
                te.datatype = Some(self.types().set(row));
                let anon = self.anon();
                te.colnames = Some(ColTree::triple(
                    anon,
                    leftobjcolumn.clone(),
                    edgecolumn.clone(),
                    rightobjcolumn.clone(),
                ));
                if let Some(pred) = predicate {
                    let b = self.types().bool();
                    let lam = self.types().lambda(row, b);
                    let cols = te.colnames.clone();
                    self.infer(pred, lam, cols.as_ref());
                }
            }

            TcExprKind::Bop { left, op, right } => {
                let op = *op;
                let mut args = vec![
                    std::mem::replace(left.as_mut(), TcExpr::value(Value::Nil)),
                    std::mem::replace(right.as_mut(), TcExpr::value(Value::Nil)),
                ];
                let (ty, ct) = self.func(op, &mut args);
                let TcExprKind::Bop { left, right, .. } = &mut te.kind else {
                    unreachable!()
                };
                **right = args.pop().unwrap();
                **left = args.pop().unwrap();
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Uop { op, sub } => {
                let op = *op;
                let mut args = vec![std::mem::replace(sub.as_mut(), TcExpr::value(Value::Nil))];
                let (ty, ct) = self.func(op, &mut args);
                let TcExprKind::Uop { sub, .. } = &mut te.kind else {
                    unreachable!()
                };
                **sub = args.pop().unwrap();
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Func { op, args } => {
                let op = *op;
                let mut owned = std::mem::take(args);
                let (ty, ct) = self.func(op, &mut owned);
                let TcExprKind::Func { args, .. } = &mut te.kind else {
                    unreachable!()
                };
                *args = owned;
                te.datatype = Some(ty);
                te.colnames = Some(ct);
            }

            TcExprKind::Map { var, set, result } => {
                self.infer(set, environment, envmembers);
                let subtype = self.unwrap_coll(set.datatype.unwrap());
                var.set_datatype(subtype);
                var.set_coltree(set.colnames.clone().unwrap());
                let top = self.types().top();
                self.infer(result, top, None);
                te.datatype = Some(self.types().set(result.datatype.unwrap()));
                te.colnames = result.colnames.clone();
            }

            TcExprKind::Let { var, value, body } => {
                self.infer(value, environment, envmembers);
                var.set_datatype(value.datatype.unwrap());
                var.set_coltree(value.colnames.clone().unwrap());
                let top = self.types().top();
                self.infer(body, top, None);
                te.datatype = body.datatype;
                te.colnames = body.colnames.clone();
            }

            TcExprKind::Lambda { var, body } => {
                // the user can't write lambdas; the ones tuplify issues
                // appear in contexts where the environment has a type
                if let TyKind::Lambda(arg, res) = self.types().kind(environment).clone() {
                    var.set_datatype(arg);
                    if let Some(envct) = envmembers {
                        var.set_coltree(envct.clone());
                    } else {
                        let sc = self.scalar_anon();
                        var.set_coltree(sc);
                    }
                    let envct = envmembers.cloned();
                    self.infer(body, res, envct.as_ref());
                } else {
                    let top = self.types().top();
                    var.set_datatype(top);
                    let sc = self.scalar_anon();
                    var.set_coltree(sc);
                    self.infer(body, top, None);
                }
                let ty = self
                    .types()
                    .lambda(var.datatype().unwrap(), body.datatype.unwrap());
                te.datatype = Some(ty);
                te.colnames = Some(self.scalar_anon());
            }

            TcExprKind::Apply { lambda, arg } => {
                let top = self.types().top();
                self.infer(arg, top, None);
                let lam = self.types().lambda(arg.datatype.unwrap(), environment);
                let argcols = arg.colnames.clone();
                self.infer(lambda, lam, argcols.as_ref());
                let mut ty = lambda.datatype.unwrap();
                if let TyKind::Lambda(_, r) = self.types().kind(ty) {
                    ty = *r;
                }
                te.datatype = Some(ty);
                te.colnames = lambda.colnames.clone();
            }

            TcExprKind::ReadVar(var) => {
                // variable should have been bound already
                te.datatype = Some(var.datatype().expect("typeinf: unbound variable"));
                te.colnames = Some(var.coltree().expect("typeinf: unbound variable"));
            }

            TcExprKind::ReadGlobal(_) => {
                let dbobj = self.types().dbobj();
                te.datatype = Some(self.types().set(dbobj));
                te.colnames = Some(self.scalar_anon());
            }

            TcExprKind::CreatePathElement(sub) => {
                let dbobj = self.types().dbobj();
                let dbedge = self.types().dbedge();
                let triple = self.types().tuple(vec![dbobj, dbedge, dbobj]);
                self.infer(sub, triple, None);
                te.datatype = Some(self.types().pathelement());
                te.colnames = Some(self.scalar_anon());
            }

            TcExprKind::Splatter { value, name } => {
                self.infer(value, environment, envmembers);
                let edge = self.types().absdbedge();
                self.infer(name, edge, None);
                te.datatype = value.datatype;
                te.colnames = value.colnames.clone();
            }

            TcExprKind::Tuple { exprs, columns } => {
                assert_eq!(exprs.len(), columns.num());
                let top = self.types().top();
                let mut types = Vec::with_capacity(exprs.len());
                let mut members = Vec::with_capacity(exprs.len());
                for (i, subexpr) in exprs.iter_mut().enumerate() {
                    self.infer(subexpr, top, None);
                    types.push(subexpr.datatype.unwrap());
                    members.push(ColTree::scalar(columns.get(i).clone()));
                }
                let anon = self.anon();
                te.datatype = Some(self.types().tuple(types));
                te.colnames = Some(ColTree::tuple(anon, members));
            }

            TcExprKind::Value(v) => {
                let v = v.clone();
                let ty = value_datatype(self.ctx, &v);
                te.datatype = Some(ty);
                te.colnames = Some(if self.ctx.types.arity(ty) == 0 {
                    let c = self.anon();
                    ColTree::unit(c)
                } else {
                    self.scalar_anon()
                });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::parser;
    use crate::semantic;

    fn inferred(text: &str) -> (Context, TcExpr) {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = semantic::resolve::resolve_vars(&mut ctx, pt).unwrap();
        let pt = semantic::normalize::normalize(&mut ctx, pt).unwrap();
        let pt = semantic::unify::unify(&mut ctx, pt).unwrap();
        let pt = semantic::movepaths::movepaths(&mut ctx, pt).unwrap();
        let pt = semantic::bindnil::bindnil(&mut ctx, pt).unwrap();
        let pt = semantic::dequantify::dequantify(&mut ctx, pt).unwrap();
        assert!(ctx.errors().is_empty(), "{}", ctx.errors());
        let mut tc = semantic::tuplify::tuplify(&mut ctx, pt).unwrap();
        typeinf(&mut ctx, &mut tc).unwrap();
        (ctx, tc)
    }

    fn each_child(te: &TcExpr, f: &mut impl FnMut(&TcExpr)) {
        use crate::ast::tc::TcFold;
        struct Walk<'a, F>(&'a mut F, bool);
        impl<'a, F: FnMut(&TcExpr)> TcFold for Walk<'a, F> {
            fn fold_expr(&mut self, e: TcExpr) -> Result<TcExpr> {
                if self.1 {
                    (self.0)(&e);
                } else {
                    self.1 = true;
                }
                let kind = crate::ast::tc::fold_expr_kind(self, e.kind.clone())?;
                Ok(TcExpr { kind, ..e })
            }
        }
        // note: fold recurses, so the callback will see all descendants
        let _ = Walk(f, false).fold_expr(te.clone());
    }

    #[test]
    fn query_type_is_a_set() {
        let (ctx, tc) = inferred("select X from A.friend as X");
        let ty = tc.datatype.unwrap();
        assert!(ctx.types.is_set(ty));
    }

    #[test]
    fn count_is_int() {
        let (ctx, tc) = inferred("select count(Y) from A.friend as X, X.friend as Y");
        // result of the select is set(int)
        let ty = tc.datatype.unwrap();
        let member = ctx.types.collection_member(ty).unwrap();
        assert_eq!(member, ctx.types.int());
    }

    #[test]
    fn distinct_yields_sequence() {
        let (ctx, tc) = inferred("select distinct X from A.friend as X");
        assert!(ctx.types.is_sequence(tc.datatype.unwrap()));
    }

    #[test]
    fn every_node_is_typed() {
        let (_, tc) = inferred(
            "select X, Y from A.friend as X, X.(friend|parent) as Y where X = B",
        );
        fn walk(te: &TcExpr) {
            assert!(te.datatype.is_some(), "untyped {:?}", te.kind.as_ref());
            assert!(te.colnames.is_some());
        }
        walk(&tc);
        each_child(&tc, &mut |c| walk(c));
    }
}
