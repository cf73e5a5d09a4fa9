//! Lower the parse tree into tuple calculus.
//!
//! The central convention: every expression is lowered relative to a
//! *context tuple variable* holding the current row. A from-clause is a
//! chain of lets where each item is evaluated in the context produced by
//! the previous item; a path in a from position becomes a fold over its
//! edges, each edge a join against the all-edges scan; select becomes
//! map; where becomes filter; group/ungroup become nest/unnest.
//!
//! Each path node takes an input expression and the column holding its
//! start object, and produces an output expression together with the
//! column holding the object it reached (which the next step starts
//! from). The caller strips the returned column once done with it.

use anyhow::Result;

use crate::ast::cols::{ColName, ColSet};
use crate::ast::ops::Func;
use crate::ast::pt::{
    ColumnVar, EdgeName, GlobalVar, PtExpr, PtExprKind, PtPath, PtPathKind,
};
use crate::ast::tc::{TcExpr, TcExprKind, TcGlobal, TcVar};
use crate::context::Context;
use crate::value::Value;

pub fn tuplify(ctx: &mut Context, pe: PtExpr) -> Result<TcExpr> {
    let leftobjcolumn = ctx.fresh_colname();
    let edgecolumn = ctx.fresh_colname();
    let rightobjcolumn = ctx.fresh_colname();
    let mut tp = Tuplify {
        ctx,
        globalvars: Vec::new(),
        columnvars: Vec::new(),
        leftobjcolumn,
        edgecolumn,
        rightobjcolumn,
    };
    Ok(tp.expr(&pe, None))
}

struct Tuplify<'a> {
    ctx: &'a mut Context,
    globalvars: Vec<(GlobalVar, TcGlobal)>,
    columnvars: Vec<(ColumnVar, ColName)>,

    /// The column names of the all-objects table.
    leftobjcolumn: ColName,
    edgecolumn: ColName,
    rightobjcolumn: ColName,
}

impl<'a> Tuplify<'a> {
    fn global(&mut self, gv: &GlobalVar) -> TcGlobal {
        if let Some((_, tcg)) = self.globalvars.iter().find(|(pt, _)| pt == gv) {
            return tcg.clone();
        }
        let tcg = TcGlobal::new(gv.name());
        self.globalvars.push((gv.clone(), tcg.clone()));
        tcg
    }

    /// The column standing for a bound variable. Same variable, same
    /// column, everywhere in the query.
    fn column(&mut self, cv: &ColumnVar) -> ColName {
        if let Some((_, col)) = self.columnvars.iter().find(|(pt, _)| pt == cv) {
            return col.clone();
        }
        let col = ColName::new(cv.name());
        self.columnvars.push((cv.clone(), col.clone()));
        col
    }

    fn columns(&mut self, vars: &[ColumnVar]) -> ColSet {
        ColSet::from_cols(vars.iter().map(|v| self.column(v)).collect())
    }

    /// λt. t.col
    fn project_lambda(&mut self, col: ColName) -> TcExpr {
        let lvar = self.ctx.fresh_tcvar();
        TcExpr::lambda(
            lvar.clone(),
            TcExpr::project(TcExpr::readvar(lvar), ColSet::singleton(col)),
        )
    }

    /// λ_. nil
    fn nil_lambda(&mut self) -> TcExpr {
        let lvar = self.ctx.fresh_tcvar();
        TcExpr::lambda(lvar, TcExpr::value(Value::Nil))
    }

    // ---- paths ----

    /// Lower one path node. `startexpr` is the tuple set to start from
    /// and `startcolumn` the column within it holding the start object.
    /// Returns the output expression and the column holding the object
    /// reached.
    fn path(
        &mut self,
        startexpr: TcExpr,
        startcolumn: &ColName,
        pt: &PtPath,
    ) -> (TcExpr, ColName) {
        assert!(pt.bind_obj_before.is_none());

        match &pt.kind {
            PtPathKind::Sequence(items) => {
                assert!(pt.bind_obj_after.is_none());
                assert!(pt.bind_path.is_none());

                let mut te = startexpr;
                let mut col = startcolumn.clone();
                let mut prevcol: Option<ColName> = None;
                for sub in items {
                    let (nte, ncol) = self.path(te, &col, sub);
                    te = nte;
                    if let Some(prev) = prevcol.take() {
                        // the previous step's reached column has served
                        // its purpose as this step's start
                        te = TcExpr::strip(te, ColSet::singleton(prev));
                    }
                    prevcol = Some(ncol.clone());
                    col = ncol;
                }
                (te, col)
            }

            PtPathKind::Alternates { items, .. } => {
                assert!(pt.bind_obj_after.is_none());
                assert!(pt.bind_path.is_none());
                assert!(!items.is_empty());

                let startvar = self.ctx.fresh_tcvar();
                let mut ret: Option<TcExpr> = None;
                for sub in items {
                    let (mut branch, outcolumn) = self.path(
                        TcExpr::readvar(startvar.clone()),
                        startcolumn,
                        sub,
                    );
                    branch = TcExpr::strip(branch, ColSet::singleton(outcolumn));
                    ret = Some(match ret {
                        None => branch,
                        Some(acc) => TcExpr::bop(acc, Func::UnionAll, branch),
                    });
                }
                let ret = TcExpr::let_(startvar, startexpr, ret.unwrap());

                // every branch binds the same columns (bindnil saw to
                // that), so the object we arrived at is choose() over the
                // per-alternative tail variables
                let tails: Vec<ColName> = items
                    .iter()
                    .map(|item| {
                        let tv = item.tail_var().expect("alternates: unbound alternative");
                        self.column(&tv)
                    })
                    .collect();
                let lvar = self.ctx.fresh_tcvar();
                let mut chooser: Option<TcExpr> = None;
                for tcol in tails {
                    let read = TcExpr::project(
                        TcExpr::readvar(lvar.clone()),
                        ColSet::singleton(tcol),
                    );
                    chooser = Some(match chooser {
                        None => read,
                        Some(acc) => TcExpr::bop(acc, Func::Choose, read),
                    });
                }
                let chooser = TcExpr::lambda(lvar, chooser.unwrap());

                let outcolumn = self.ctx.fresh_colname();
                let ret = TcExpr::adjoin(ret, chooser, outcolumn.clone());
                (ret, outcolumn)
            }

            PtPathKind::Optional { sub, nil_columns } => {
                assert!(pt.bind_path.is_none());

                let resultcolumn = self.ctx.fresh_colname();
                let startvar = self.ctx.fresh_tcvar();

                // first case: the optional stuff is matched
                let (matched, sub_outcolumn) = self.path(
                    TcExpr::readvar(startvar.clone()),
                    startcolumn,
                    sub,
                );
                let matched =
                    TcExpr::rename(matched, Some(sub_outcolumn), resultcolumn.clone());

                // second case: the optional stuff is skipped
                let mut skipped = TcExpr::readvar(startvar.clone());
                for ptcol in nil_columns {
                    let nilcolumn = self.column(ptcol);
                    let nil = self.nil_lambda();
                    skipped = TcExpr::adjoin(skipped, nil, nilcolumn);
                }
                let clonefunc = self.project_lambda(startcolumn.clone());
                skipped = TcExpr::adjoin(skipped, clonefunc, resultcolumn.clone());

                let ret = TcExpr::bop(matched, Func::UnionAll, skipped);
                let mut ret = TcExpr::let_(startvar, startexpr, ret);

                if let Some(after) = &pt.bind_obj_after {
                    let objexpr = self.project_lambda(resultcolumn.clone());
                    let bindcolumn = self.column(after);
                    ret = TcExpr::adjoin(ret, objexpr, bindcolumn);
                }

                (ret, resultcolumn)
            }

            PtPathKind::Repeated {
                sub,
                path_from_inside,
                path_on_outside,
            } => {
                assert!(pt.bind_path.is_none());

                let loopvar = self.ctx.fresh_tcvar();
                let bodystartcolumn = self.ctx.fresh_colname();
                let rependcolumn = self.ctx.fresh_colname();

                let (body, bodyendcolumn) = self.path(
                    TcExpr::readvar(loopvar.clone()),
                    &bodystartcolumn,
                    sub,
                );

                let (bodypathcolumn, repeatpathcolumn) = match (path_from_inside, path_on_outside)
                {
                    (Some(inside), Some(outside)) => {
                        (Some(self.column(inside)), Some(self.column(outside)))
                    }
                    _ => (None, None),
                };

                let mut ret = TcExpr::new(TcExprKind::Repeat {
                    sub: Box::new(startexpr),
                    subendcolumn: startcolumn.clone(),
                    loopvar,
                    bodystartcolumn,
                    body: Box::new(body),
                    bodypathcolumn,
                    bodyendcolumn,
                    repeatpathcolumn,
                    repeatendcolumn: rependcolumn.clone(),
                });

                if let Some(after) = &pt.bind_obj_after {
                    let objexpr = self.project_lambda(rependcolumn.clone());
                    let bindcolumn = self.column(after);
                    ret = TcExpr::adjoin(ret, objexpr, bindcolumn);
                }

                (ret, rependcolumn)
            }

            PtPathKind::NilBind { before, sub, after } => {
                assert!(pt.bind_obj_after.is_none());
                assert!(pt.bind_path.is_none());

                let mut te = startexpr;
                for ptcol in before {
                    let col = self.column(ptcol);
                    let nil = self.nil_lambda();
                    te = TcExpr::adjoin(te, nil, col);
                }
                let (mut te, outcolumn) = self.path(te, startcolumn, sub);
                for ptcol in after {
                    let col = self.column(ptcol);
                    let nil = self.nil_lambda();
                    te = TcExpr::adjoin(te, nil, col);
                }
                (te, outcolumn)
            }

            PtPathKind::Edge { name, reversed } => {
                let mut startexpr = startexpr;

                let computededgecolumn = match name {
                    EdgeName::Computed(e) => {
                        let col = self.ctx.fresh_colname();
                        let startvar = self.ctx.fresh_tcvar();
                        let edge = self.expr(e, Some(&startvar));
                        let edge = TcExpr::lambda(startvar, edge);
                        startexpr = TcExpr::adjoin(startexpr, edge, col.clone());
                        Some(col)
                    }
                    EdgeName::Static(_) => None,
                };

                let (fromcolumn, tocolumn) = if *reversed {
                    (self.rightobjcolumn.clone(), self.leftobjcolumn.clone())
                } else {
                    (self.leftobjcolumn.clone(), self.rightobjcolumn.clone())
                };

                // join condition: the start object matches the edge
                // origin, and the edge label matches the name
                let lambdavar = self.ctx.fresh_tcvar();
                let read = |v: &TcVar, c: &ColName| {
                    TcExpr::project(TcExpr::readvar(v.clone()), ColSet::singleton(c.clone()))
                };
                let mut predicate = TcExpr::bop(
                    read(&lambdavar, startcolumn),
                    Func::Eq,
                    read(&lambdavar, &fromcolumn),
                );
                let edgecol = self.edgecolumn.clone();
                let nametest = match (computededgecolumn.as_ref(), name) {
                    (Some(cc), _) => TcExpr::bop(
                        read(&lambdavar, &edgecol),
                        Func::Eq,
                        read(&lambdavar, cc),
                    ),
                    (None, EdgeName::Static(s)) => {
                        // a static name with wildcard characters matches
                        // as a pattern
                        let op = if s.contains('%') || s.contains('_') {
                            Func::Like
                        } else {
                            Func::Eq
                        };
                        TcExpr::bop(
                            read(&lambdavar, &edgecol),
                            op,
                            TcExpr::value(Value::String(s.clone())),
                        )
                    }
                    (None, EdgeName::Computed(_)) => unreachable!(),
                };
                predicate = TcExpr::bop(predicate, Func::And, nametest);
                let predicate = TcExpr::lambda(lambdavar, predicate);

                let scan = TcExpr::scan(
                    self.leftobjcolumn.clone(),
                    self.edgecolumn.clone(),
                    self.rightobjcolumn.clone(),
                );
                let mut ret = TcExpr::join(startexpr, scan, Some(predicate));

                if let Some(pathvar) = &pt.bind_path {
                    let lvar = self.ctx.fresh_tcvar();
                    let pathexpr = TcExpr::project(
                        TcExpr::readvar(lvar.clone()),
                        ColSet::triple(
                            self.leftobjcolumn.clone(),
                            self.edgecolumn.clone(),
                            self.rightobjcolumn.clone(),
                        ),
                    );
                    let pathexpr = TcExpr::new(TcExprKind::CreatePathElement(Box::new(pathexpr)));
                    let pathexpr = TcExpr::lambda(lvar, pathexpr);
                    let bindcol = self.column(pathvar);
                    ret = TcExpr::adjoin(ret, pathexpr, bindcol);
                }
                if let Some(after) = &pt.bind_obj_after {
                    let objexpr = self.project_lambda(tocolumn.clone());
                    let bindcol = self.column(after);
                    ret = TcExpr::adjoin(ret, objexpr, bindcol);
                }

                ret = TcExpr::strip(ret, ColSet::singleton(self.edgecolumn.clone()));
                ret = TcExpr::strip(ret, ColSet::singleton(fromcolumn));

                let aftercolumn = self.ctx.fresh_colname();
                let ret = TcExpr::rename(ret, Some(tocolumn), aftercolumn.clone());
                (ret, aftercolumn)
            }
        }
    }

    // ---- from-clauses ----

    /// One from-clause item: a path, a let-binding, or (after heavy
    /// unification) a plain expression whose value joins the context
    /// under a throwaway column.
    fn onefrom(&mut self, pe: &PtExpr, tuplevar: Option<&TcVar>) -> TcExpr {
        let PtExprKind::Path {
            root,
            body,
            more_bindings,
        } = &pe.kind
        else {
            if let PtExprKind::Assign { body: None, .. } = &pe.kind {
                return self.expr(pe, tuplevar);
            }
            let col = self.ctx.fresh_colname();
            return match tuplevar {
                Some(tv) => {
                    let lvar = self.ctx.fresh_tcvar();
                    let value = self.expr(pe, Some(&lvar));
                    let value = TcExpr::lambda(lvar, value);
                    TcExpr::adjoin(TcExpr::readvar(tv.clone()), value, col)
                }
                None => TcExpr::rename(self.expr(pe, None), None, col),
            };
        };

        let mut te = match &root.kind {
            PtExprKind::ReadGlobalVar(gv) => {
                let root = self.global(gv);
                let startcolumn = self.ctx.fresh_colname();
                let te = TcExpr::readglobal(root);
                let te = TcExpr::rename(te, None, startcolumn.clone());

                let (te, outcolumn) = self.path(te, &startcolumn, body);
                let te = TcExpr::strip(te, ColSet::singleton(outcolumn));
                let te = TcExpr::strip(te, ColSet::singleton(startcolumn));

                // with a context, the result is context x path; the
                // first item of the outermost from-clause has none
                match tuplevar {
                    Some(tv) => TcExpr::join(TcExpr::readvar(tv.clone()), te, None),
                    None => te,
                }
            }
            PtExprKind::ReadColumnVar(cv) => {
                let tv = tuplevar.expect("tuplify: column-rooted path without context");
                let te = TcExpr::readvar(tv.clone());
                let root = self.column(cv);
                let (te, outcolumn) = self.path(te, &root, body);
                TcExpr::strip(te, ColSet::singleton(outcolumn))
            }
            _ => panic!("tuplify: path rooted in non-variable"),
        };

        for sublet in more_bindings {
            assert!(matches!(
                &sublet.kind,
                PtExprKind::Assign { body: None, .. }
            ));
            let subvar = self.ctx.fresh_tcvar();
            let subte = self.expr(sublet, Some(&subvar));
            te = TcExpr::let_(subvar, te, subte);
        }

        te
    }

    fn from(&mut self, items: &[PtExpr], tuplevar: Option<&TcVar>) -> TcExpr {
        assert!(!items.is_empty());

        // for each item, tuplify with a fresh context variable; the
        // first item uses the input context (if any)
        let mut vars: Vec<Option<TcVar>> = Vec::with_capacity(items.len());
        let mut tcexprs: Vec<TcExpr> = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let var = if i == 0 {
                tuplevar.cloned()
            } else {
                Some(self.ctx.fresh_tcvar())
            };
            let te = self.onefrom(item, var.as_ref());
            vars.push(var);
            tcexprs.push(te);
        }

        // sew together back-to-front: let v[i+1] = e[i] in ... e[last]
        let mut te = tcexprs.pop().unwrap();
        while let Some(value) = tcexprs.pop() {
            let var = vars.pop().flatten().unwrap();
            te = TcExpr::let_(var, value, te);
        }
        te
    }

    // ---- expressions ----

    fn expr(&mut self, pe: &PtExpr, curtuplevar: Option<&TcVar>) -> TcExpr {
        match &pe.kind {
            PtExprKind::Select {
                sub,
                result,
                distinct,
            } => {
                let tcsub = self.expr(sub, curtuplevar);
                let rowvar = self.ctx.fresh_tcvar();
                let ret = self.expr(result, Some(&rowvar));
                let mut ret = TcExpr::map(rowvar, tcsub, ret);
                if *distinct {
                    ret = TcExpr::order(ret, ColSet::empty());
                    ret = TcExpr::uniq(ret, ColSet::empty());
                }
                ret
            }

            PtExprKind::From(items) => {
                if !items.is_empty() {
                    self.from(items, curtuplevar)
                } else {
                    // no from-clause: a context of one (nil) row
                    TcExpr::value(Value::Set(vec![Value::Nil]))
                }
            }

            PtExprKind::Where { sub, pred } => {
                let tcsub = self.expr(sub, curtuplevar);
                let lambdavar = self.ctx.fresh_tcvar();
                let ret = self.expr(pred, Some(&lambdavar));
                let ret = TcExpr::lambda(lambdavar, ret);
                TcExpr::filter(tcsub, ret)
            }

            PtExprKind::Group { sub, vars, newvar } => {
                let mut cols = self.columns(vars);
                let newcol = self.column(newvar.as_ref().expect("tuplify: unnamed group"));
                // language-level group-by keeps the named columns;
                // nest collects the complement
                cols.mark_tocomplement();
                let tcsub = self.expr(sub, curtuplevar);
                TcExpr::nest(tcsub, cols, newcol)
            }

            PtExprKind::Ungroup { sub, var } => {
                let col = self.column(var);
                let tcsub = self.expr(sub, curtuplevar);
                TcExpr::unnest(tcsub, col)
            }

            PtExprKind::Rename { .. } => {
                unreachable!("tuplify: rename outside a tuple")
            }

            PtExprKind::Path { .. } => {
                unreachable!("tuplify: path not hoisted to a from-clause")
            }

            PtExprKind::Tuple(items) => {
                let mut exprs = Vec::with_capacity(items.len());
                let mut columns = ColSet::empty();
                for ptsub in items {
                    match &ptsub.kind {
                        PtExprKind::Rename { sub, name } => {
                            let tcsub = self.expr(sub, curtuplevar);
                            match name {
                                EdgeName::Computed(e) => {
                                    let nm = self.expr(e, curtuplevar);
                                    exprs.push(TcExpr::new(TcExprKind::Splatter {
                                        value: Box::new(tcsub),
                                        name: Box::new(nm),
                                    }));
                                    columns.add(self.ctx.fresh_colname());
                                }
                                EdgeName::Static(s) => {
                                    exprs.push(tcsub);
                                    columns.add(ColName::new(s));
                                }
                            }
                        }
                        _ => {
                            exprs.push(self.expr(ptsub, curtuplevar));
                            columns.add(self.ctx.fresh_colname());
                        }
                    }
                }
                TcExpr::tuple(exprs, columns)
            }

            PtExprKind::Forall { .. } | PtExprKind::Exists { .. } => {
                unreachable!("tuplify: quantifier survived dequantify")
            }

            PtExprKind::Map { var, set, result } => {
                let varcol = self.column(var);
                let distcol = self.ctx.fresh_colname();
                let resultcol = self.ctx.fresh_colname();

                // adjoin the set to the current context row (wrapped up
                // as a one-row set; with no context the set expression
                // itself becomes that row), distinguish to defeat
                // duplicate elimination, and unnest
                let subcontext = match curtuplevar {
                    Some(tv) => {
                        let setlambdavar = self.ctx.fresh_tcvar();
                        let set = self.expr(set, Some(&setlambdavar));
                        let set = TcExpr::lambda(setlambdavar, set);
                        let here =
                            TcExpr::uop(Func::MakeSet, TcExpr::readvar(tv.clone()));
                        TcExpr::adjoin(here, set, varcol.clone())
                    }
                    None => {
                        let set = self.expr(set, None);
                        let sc = TcExpr::rename(set, None, varcol.clone());
                        TcExpr::uop(Func::MakeSet, sc)
                    }
                };
                let subcontext = TcExpr::distinguish(subcontext, distcol.clone());
                let subcontext = TcExpr::unnest(subcontext, varcol);

                // evaluate the body per row, keep (result, distinguisher),
                // and nest back so each input row yields one result set
                let bodylambdavar = self.ctx.fresh_tcvar();
                let result = self.expr(result, Some(&bodylambdavar));
                let result = TcExpr::lambda(bodylambdavar, result);
                let result = TcExpr::adjoin(subcontext, result, resultcol.clone());

                let result =
                    TcExpr::project(result, ColSet::pair(resultcol.clone(), distcol));
                let result = TcExpr::nest(
                    result,
                    ColSet::singleton(resultcol.clone()),
                    resultcol.clone(),
                );
                let result = TcExpr::project(result, ColSet::singleton(resultcol));

                // the context was one row, so exactly one result set
                // comes back; unwrap it
                TcExpr::uop(Func::GetElement, result)
            }

            PtExprKind::Assign { var, value, body } => {
                let varcol = self.column(var);

                let newtuple = match curtuplevar {
                    Some(tv) => {
                        let lambdavar = self.ctx.fresh_tcvar();
                        let value = self.expr(value, Some(&lambdavar));
                        let value = TcExpr::lambda(lambdavar, value);
                        TcExpr::adjoin(TcExpr::readvar(tv.clone()), value, varcol)
                    }
                    None => {
                        let value = self.expr(value, None);
                        TcExpr::rename(value, None, varcol)
                    }
                };

                match body {
                    Some(b) => {
                        let newtuplevar = self.ctx.fresh_tcvar();
                        let body = self.expr(b, Some(&newtuplevar));
                        TcExpr::let_(newtuplevar, newtuple, body)
                    }
                    None => newtuple,
                }
            }

            PtExprKind::Bop { l, op, r } => TcExpr::bop(
                self.expr(l, curtuplevar),
                *op,
                self.expr(r, curtuplevar),
            ),

            PtExprKind::Uop { op, sub } => TcExpr::uop(*op, self.expr(sub, curtuplevar)),

            PtExprKind::Func { op, args } => TcExpr::func(
                *op,
                args.iter().map(|a| self.expr(a, curtuplevar)).collect(),
            ),

            PtExprKind::ReadAnyVar(_) => unreachable!("tuplify: unresolved variable"),

            PtExprKind::ReadColumnVar(cv) => {
                let col = self.column(cv);
                let tv = curtuplevar.expect("tuplify: column read without context");
                TcExpr::project(TcExpr::readvar(tv.clone()), ColSet::singleton(col))
            }

            PtExprKind::ReadGlobalVar(gv) => TcExpr::readglobal(self.global(gv)),

            PtExprKind::Value(v) => TcExpr::value(v.clone()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::tc::{dump, TcFold};
    use crate::backend::MemGraph;
    use crate::parser;
    use crate::semantic;

    fn tuplified(text: &str) -> (Context, TcExpr) {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = semantic::resolve::resolve_vars(&mut ctx, pt).unwrap();
        let pt = semantic::normalize::normalize(&mut ctx, pt).unwrap();
        let pt = semantic::unify::unify(&mut ctx, pt).unwrap();
        let pt = semantic::movepaths::movepaths(&mut ctx, pt).unwrap();
        let pt = semantic::bindnil::bindnil(&mut ctx, pt).unwrap();
        let pt = semantic::dequantify::dequantify(&mut ctx, pt).unwrap();
        assert!(ctx.errors().is_empty(), "{}", ctx.errors());
        let tc = tuplify(&mut ctx, pt).unwrap();
        (ctx, tc)
    }

    fn count_kind(tc: &TcExpr, pred: fn(&TcExprKind) -> bool) -> usize {
        struct Counter(usize, fn(&TcExprKind) -> bool);
        impl TcFold for Counter {
            fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
                if (self.1)(&kind) {
                    self.0 += 1;
                }
                crate::ast::tc::fold_expr_kind(self, kind)
            }
        }
        let mut c = Counter(0, pred);
        c.fold_expr(tc.clone()).unwrap();
        c.0
    }

    #[test]
    fn select_becomes_map_over_from() {
        let (_, tc) = tuplified("select X from A.friend as X");
        assert!(tc.kind.is_map());
        assert_eq!(count_kind(&tc, |k| k.is_scan()), 1);
        assert_eq!(count_kind(&tc, |k| k.is_join()), 1);
    }

    #[test]
    fn two_steps_two_scans() {
        let (_, tc) = tuplified("select count(Y) from A.friend as X, X.friend as Y");
        assert_eq!(count_kind(&tc, |k| k.is_scan()), 2);
        // the second from item joins against the context of the first
        assert_eq!(count_kind(&tc, |k| k.is_let()), 1);
    }

    #[test]
    fn repeated_becomes_repeat_node() {
        let (_, tc) = tuplified("select X from A.friend+ as X");
        assert_eq!(count_kind(&tc, |k| k.is_repeat()), 1);
    }

    #[test]
    fn distinct_orders_and_uniqs() {
        let (_, tc) = tuplified("select distinct X from A.friend as X");
        assert!(tc.kind.is_uniq());
        let TcExprKind::Uniq { sub, .. } = &tc.kind else {
            unreachable!()
        };
        assert!(sub.kind.is_order());
    }

    #[test]
    fn where_becomes_filter_with_lambda() {
        let (_, tc) = tuplified("select X from A.friend as X where X = B");
        assert_eq!(count_kind(&tc, |k| k.is_filter()), 1);
        assert!(count_kind(&tc, |k| k.is_lambda()) >= 1);
    }

    #[test]
    fn optional_unions_both_cases() {
        let (_, tc) = tuplified("select X from A.friend? as X");
        assert_eq!(
            count_kind(&tc, |k| matches!(
                k,
                TcExprKind::Bop {
                    op: Func::UnionAll,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn group_nests_complement() {
        let (_, tc) = tuplified(
            "select G from A.friend as X, X.friend as Y group by X as G",
        );
        assert_eq!(count_kind(&tc, |k| k.is_nest()), 1);
        let mut found = false;
        struct FindNest<'a>(&'a mut bool);
        impl<'a> TcFold for FindNest<'a> {
            fn fold_expr_kind(&mut self, kind: TcExprKind) -> Result<TcExprKind> {
                if let TcExprKind::Nest { cols, .. } = &kind {
                    assert!(cols.is_tocomplement());
                    *self.0 = true;
                }
                crate::ast::tc::fold_expr_kind(self, kind)
            }
        }
        FindNest(&mut found).fold_expr(tc.clone()).unwrap();
        assert!(found);
    }

    #[test]
    fn dump_is_stable() {
        let (_, tc) = tuplified("select X from A.friend as X");
        let text = dump::dump(&tc, None);
        assert!(text.starts_with("map .K"));
        assert!(text.contains("scan as"));
        assert!(text.contains("global A"));
    }
}
