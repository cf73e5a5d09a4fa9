//! The evaluator: a single-threaded, recursive interpreter for the
//! tuple calculus.
//!
//! Values are addressed positionally; the coltrees computed at compile
//! time translate column names into positions. The variable environment
//! is a LIFO of (var, value) pairs searched linearly. Backend calls
//! happen only here: in ReadGlobal, in Step, and in new().

mod ops;
mod repeat;

use anyhow::{anyhow, bail, Result};

use crate::ast::cols::{ColName, ColSet, ColTree};
use crate::ast::ops::Func;
use crate::ast::tc::{TcExpr, TcExprKind, TcVar};
use crate::backend::Backend;
use crate::context::{Context, Query};
use crate::value::Value;

pub fn run(ctx: &mut Context, query: &Query) -> Result<Value> {
    let trace_on = ctx.options.trace;
    let mut ev = Evaluator {
        backend: ctx.backend.as_mut(),
        trace: &mut ctx.trace,
        trace_on,
        bindings: Vec::new(),
        next_distinguisher: 0,
    };
    ev.eval(&query.tc)
}

pub(crate) struct Evaluator<'a> {
    backend: &'a mut dyn Backend,
    trace: &'a mut Vec<String>,
    trace_on: bool,
    bindings: Vec<(TcVar, Value)>,
    next_distinguisher: u64,
}

/// Positions of the named columns within a shape.
fn positions(ct: &ColTree, cols: &ColSet) -> Result<Vec<usize>> {
    cols.iter()
        .map(|c| {
            ct.find(c)
                .ok_or_else(|| anyhow!("eval: column {} not found", c))
        })
        .collect()
}

fn position(ct: &ColTree, col: &ColName) -> Result<usize> {
    ct.find(col)
        .ok_or_else(|| anyhow!("eval: column {} not found", col))
}

/// Iterate a collection value's rows; a scalar is one row.
fn rows(v: Value) -> (Vec<Value>, bool) {
    match v {
        Value::Set(items) | Value::Sequence(items) => (items, true),
        other => (vec![other], false),
    }
}

fn child_cols<'e>(e: &'e TcExpr) -> Result<&'e ColTree> {
    e.colnames
        .as_ref()
        .ok_or_else(|| anyhow!("eval: expression has no column information"))
}

impl<'a> Evaluator<'a> {
    fn trace(&mut self, line: impl FnOnce() -> String) {
        if self.trace_on {
            self.trace.push(line());
        }
    }

    fn lookup(&self, var: &TcVar) -> Result<Value> {
        for (v, val) in self.bindings.iter().rev() {
            if v == var {
                return Ok(val.clone());
            }
        }
        Err(anyhow!("eval: unbound variable .K{}", var.id()))
    }

    fn with_binding<F, R>(&mut self, var: &TcVar, value: Value, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.bindings.push((var.clone(), value));
        let ret = f(self);
        self.bindings.pop();
        ret
    }

    /// Apply a predicate/function expression to one argument.
    pub(crate) fn apply_lambda(&mut self, lam: &TcExpr, arg: Value) -> Result<Value> {
        if let TcExprKind::Lambda { var, body } = &lam.kind {
            return self.with_binding(var, arg, |ev| ev.eval(body));
        }
        // anything else must evaluate to a lambda value
        let lamval = self.eval(lam)?;
        match lamval {
            Value::Lambda(expr) => match &expr.kind {
                TcExprKind::Lambda { var, body } => {
                    self.with_binding(var, arg, |ev| ev.eval(body))
                }
                _ => bail!("eval: lambda value is not a lambda"),
            },
            other => bail!("eval: applied non-lambda {}", other),
        }
    }

    fn truthy(v: &Value) -> bool {
        // nil counts as false in predicate position
        matches!(v, Value::Bool(true))
    }

    pub(crate) fn eval(&mut self, te: &TcExpr) -> Result<Value> {
        match &te.kind {
            TcExprKind::Filter { sub, predicate } => {
                let (items, _) = rows(self.eval(sub)?);
                let total = items.len();
                let mut out = Vec::new();
                for item in items {
                    let keep = self.apply_lambda(predicate, item.clone())?;
                    if Self::truthy(&keep) {
                        out.push(item);
                    }
                }
                self.trace(|| format!("filter: kept {} of {}", out.len(), total));
                Ok(Value::Set(out))
            }

            TcExprKind::Project { sub, cols } => {
                let ct = child_cols(sub)?;
                let ixs = positions(ct, cols)?;
                let val = self.eval(sub)?;
                let (items, is_coll) = rows(val);
                let project_one = |row: &Value| -> Value {
                    if ixs.len() == 1 {
                        row.tuple_get(ixs[0]).clone()
                    } else {
                        Value::Tuple(ixs.iter().map(|i| row.tuple_get(*i).clone()).collect())
                    }
                };
                if is_coll {
                    Ok(Value::Set(items.iter().map(project_one).collect()))
                } else {
                    Ok(project_one(&items[0]))
                }
            }

            TcExprKind::Strip { sub, cols } => {
                let ct = child_cols(sub)?;
                let mut ixs = positions(ct, cols)?;
                ixs.sort_unstable();
                let val = self.eval(sub)?;
                let (items, is_coll) = rows(val);
                let strip_one = |row: Value| -> Value {
                    let mut row = row;
                    for ix in ixs.iter().rev() {
                        row = row.tuple_strip(*ix);
                    }
                    row
                };
                if is_coll {
                    Ok(Value::Set(items.into_iter().map(strip_one).collect()))
                } else {
                    Ok(strip_one(items.into_iter().next().unwrap()))
                }
            }

            // a rename is a no-op on values; column identity is positional
            TcExprKind::Rename { sub, .. } => self.eval(sub),

            TcExprKind::Join {
                left,
                right,
                predicate,
            } => {
                let (lrows, _) = rows(self.eval(left)?);
                let (rrows, _) = rows(self.eval(right)?);
                let mut out = Vec::new();
                for l in &lrows {
                    for r in &rrows {
                        let row = Value::paste(l, r);
                        match predicate {
                            Some(p) => {
                                let keep = self.apply_lambda(p, row.clone())?;
                                if Self::truthy(&keep) {
                                    out.push(row);
                                }
                            }
                            None => out.push(row),
                        }
                    }
                }
                self.trace(|| {
                    format!(
                        "join: {} x {} -> {}",
                        lrows.len(),
                        rrows.len(),
                        out.len()
                    )
                });
                Ok(Value::Set(out))
            }

            TcExprKind::Order { sub, cols } => {
                let ct = child_cols(sub)?;
                let ixs = positions(ct, cols)?;
                let (mut items, _) = rows(self.eval(sub)?);
                items.sort_by(|a, b| compare_by(a, b, &ixs));
                Ok(Value::Sequence(items))
            }

            TcExprKind::Uniq { sub, cols } => {
                let ct = child_cols(sub)?;
                let ixs = positions(ct, cols)?;
                let val = self.eval(sub)?;
                let was_seq = matches!(val, Value::Sequence(_));
                let (items, _) = rows(val);
                let mut out: Vec<Value> = Vec::new();
                for item in items {
                    if let Some(last) = out.last() {
                        if compare_by(last, &item, &ixs) == std::cmp::Ordering::Equal {
                            continue;
                        }
                    }
                    out.push(item);
                }
                Ok(if was_seq {
                    Value::Sequence(out)
                } else {
                    Value::Set(out)
                })
            }

            TcExprKind::Nest { sub, cols, newcol: _ } => {
                let ct = child_cols(sub)?;
                let nested: Vec<usize> = positions(ct, cols)?;
                let kept: Vec<usize> =
                    (0..ct.arity()).filter(|i| !nested.contains(i)).collect();
                let (mut items, _) = rows(self.eval(sub)?);
                // group runs of equal kept columns
                items.sort_by(|a, b| compare_by(a, b, &kept));
                let mut out: Vec<Value> = Vec::new();
                let mut run: Vec<Value> = Vec::new();
                let collect_of = |row: &Value| -> Value {
                    if nested.len() == 1 {
                        row.tuple_get(nested[0]).clone()
                    } else {
                        Value::Tuple(
                            nested.iter().map(|i| row.tuple_get(*i).clone()).collect(),
                        )
                    }
                };
                let emit = |run: &mut Vec<Value>, out: &mut Vec<Value>| {
                    if run.is_empty() {
                        return;
                    }
                    let head = &run[0];
                    let mut rowvals: Vec<Value> =
                        kept.iter().map(|i| head.tuple_get(*i).clone()).collect();
                    let members = run.drain(..).map(|r| collect_of(&r)).collect();
                    rowvals.push(Value::Set(members));
                    out.push(if rowvals.len() == 1 {
                        rowvals.pop().unwrap()
                    } else {
                        Value::Tuple(rowvals)
                    });
                };
                for item in items {
                    if let Some(first) = run.first() {
                        if compare_by(first, &item, &kept) != std::cmp::Ordering::Equal {
                            emit(&mut run, &mut out);
                        }
                    }
                    run.push(item);
                }
                emit(&mut run, &mut out);
                Ok(Value::Set(out))
            }

            TcExprKind::Unnest { sub, col } => {
                let ct = child_cols(sub)?;
                let ix = position(ct, col)?;
                let (items, _) = rows(self.eval(sub)?);
                let mut out = Vec::new();
                for item in items {
                    let members = match item.tuple_get(ix) {
                        Value::Set(m) | Value::Sequence(m) => m.clone(),
                        Value::Nil => Vec::new(),
                        other => vec![other.clone()],
                    };
                    for member in members {
                        let mut vals: Vec<Value> = Vec::new();
                        for i in 0..item.tuple_arity() {
                            if i == ix {
                                match &member {
                                    Value::Tuple(ms) => vals.extend(ms.iter().cloned()),
                                    m => vals.push(m.clone()),
                                }
                            } else {
                                vals.push(item.tuple_get(i).clone());
                            }
                        }
                        out.push(if vals.len() == 1 {
                            vals.pop().unwrap()
                        } else {
                            Value::Tuple(vals)
                        });
                    }
                }
                Ok(Value::Set(out))
            }

            TcExprKind::Distinguish { sub, .. } => {
                let (items, _) = rows(self.eval(sub)?);
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let d = Value::Distinguisher(self.next_distinguisher);
                    self.next_distinguisher += 1;
                    out.push(item.tuple_add(d));
                }
                Ok(Value::Set(out))
            }

            TcExprKind::Adjoin { left, func, .. } => {
                let (items, _) = rows(self.eval(left)?);
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let extra = self.apply_lambda(func, item.clone())?;
                    out.push(match extra {
                        // tuple results flatten, mirroring the type rule
                        Value::Tuple(ms) => {
                            let mut row = item;
                            for m in ms {
                                row = row.tuple_add(m);
                            }
                            row
                        }
                        m => item.tuple_add(m),
                    });
                }
                Ok(Value::Set(out))
            }

            TcExprKind::Step {
                sub,
                subcolumn,
                edgename,
                reversed,
                predicate,
                ..
            } => {
                let ct = child_cols(sub)?;
                let ix = position(ct, subcolumn)?;
                let (items, _) = rows(self.eval(sub)?);
                let mut out = Vec::new();
                for item in &items {
                    let obj = item.tuple_get(ix);
                    if !matches!(obj, Value::Struct(_)) {
                        continue;
                    }
                    let triples: Vec<(Value, Value, Value)> = match edgename {
                        Some(Value::String(name)) => {
                            let found = self.backend.follow(obj, name, *reversed)?;
                            found
                                .coll_into_items()
                                .into_iter()
                                .map(|other| {
                                    if *reversed {
                                        (other, Value::String(name.clone()), obj.clone())
                                    } else {
                                        (obj.clone(), Value::String(name.clone()), other)
                                    }
                                })
                                .collect()
                        }
                        _ => {
                            let found = self.backend.follow_all(obj, *reversed)?;
                            found
                                .coll_into_items()
                                .into_iter()
                                .map(|pair| {
                                    let name = pair.tuple_get(0).clone();
                                    let other = pair.tuple_get(1).clone();
                                    if *reversed {
                                        (other, name, obj.clone())
                                    } else {
                                        (obj.clone(), name, other)
                                    }
                                })
                                .collect()
                        }
                    };
                    for (l, e, r) in triples {
                        let row = item
                            .clone()
                            .tuple_add(l)
                            .tuple_add(e)
                            .tuple_add(r);
                        match predicate {
                            Some(p) => {
                                let keep = self.apply_lambda(p, row.clone())?;
                                if Self::truthy(&keep) {
                                    out.push(row);
                                }
                            }
                            None => out.push(row),
                        }
                    }
                }
                self.trace(|| {
                    format!(
                        "step{}: {} rows -> {}",
                        match edgename {
                            Some(n) => format!(" {}", n),
                            None => String::new(),
                        },
                        items.len(),
                        out.len()
                    )
                });
                Ok(Value::Set(out))
            }

            TcExprKind::Repeat { .. } => repeat::eval_repeat(self, te),

            TcExprKind::Scan { .. } => {
                bail!("eval: scan was not specialized to a step")
            }

            TcExprKind::Bop { left, op, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(ops::apply_bop(*op, l, r))
            }

            TcExprKind::Uop { op, sub } => {
                let v = self.eval(sub)?;
                Ok(ops::apply_uop(*op, v))
            }

            TcExprKind::Func { op, args } => {
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(self.eval(a)?);
                }
                self.eval_func(*op, vals)
            }

            TcExprKind::Map { var, set, result } => {
                let (items, _) = rows(self.eval(set)?);
                let count = items.len();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let v = self.with_binding(var, item, |ev| ev.eval(result))?;
                    out.push(v);
                }
                self.trace(|| format!("map: {} rows", count));
                Ok(Value::Set(out))
            }

            TcExprKind::Let { var, value, body } => {
                let v = self.eval(value)?;
                self.with_binding(var, v, |ev| ev.eval(body))
            }

            TcExprKind::Lambda { .. } => Ok(Value::Lambda(std::rc::Rc::new(te.clone()))),

            TcExprKind::Apply { lambda, arg } => {
                let a = self.eval(arg)?;
                self.apply_lambda(lambda, a)
            }

            TcExprKind::ReadVar(var) => self.lookup(var),

            TcExprKind::ReadGlobal(g) => {
                let v = self.backend.read_global(g.name())?;
                // the inferred type is always a set; wrap strays
                Ok(if v.is_collection() {
                    v
                } else {
                    Value::Set(vec![v])
                })
            }

            TcExprKind::CreatePathElement(sub) => {
                let v = self.eval(sub)?;
                if v.tuple_arity() != 3 {
                    bail!("eval: pathelement from non-triple {}", v);
                }
                Ok(Value::pathelement(
                    v.tuple_get(0).clone(),
                    v.tuple_get(1).clone(),
                    v.tuple_get(2).clone(),
                ))
            }

            TcExprKind::Splatter { value, name } => {
                // the computed name has already served its purpose in the
                // edge match; the value passes through
                let _ = self.eval(name)?;
                self.eval(value)
            }

            TcExprKind::Tuple { exprs, .. } => {
                let mut vals = Vec::with_capacity(exprs.len());
                for e in exprs {
                    match self.eval(e)? {
                        // tuple types stay flat, so tuple values do too
                        Value::Tuple(ms) => vals.extend(ms),
                        v => vals.push(v),
                    }
                }
                Ok(Value::Tuple(vals))
            }

            TcExprKind::Value(v) => Ok(v.clone()),
        }
    }

    fn eval_func(&mut self, op: Func, mut vals: Vec<Value>) -> Result<Value> {
        match op {
            Func::New => {
                if vals.is_empty() {
                    return self.backend.new_object();
                }
                let arg = if vals.len() == 1 {
                    vals.pop().unwrap()
                } else {
                    Value::Tuple(vals)
                };
                match arg {
                    Value::Tuple(ms) | Value::Set(ms) | Value::Sequence(ms) => {
                        let obj = self.backend.new_object()?;
                        // tuples are positional at runtime, so component
                        // names are gone; everything lands under one
                        // fixed edge name
                        for m in ms {
                            self.backend.assign(&obj, "default", &m)?;
                        }
                        Ok(obj)
                    }
                    pe @ Value::PathElement(_) => {
                        let obj = self.backend.new_object()?;
                        self.backend.assign(&obj, "default", &pe)?;
                        Ok(obj)
                    }
                    scalar => Ok(scalar),
                }
            }
            Func::Ctime => {
                let now = chrono::Local::now();
                Ok(Value::String(
                    now.format("%a %b %e %H:%M:%S %Y").to_string(),
                ))
            }
            _ => match vals.len() {
                1 => Ok(ops::apply_uop(op, vals.pop().unwrap())),
                2 => {
                    let b = vals.pop().unwrap();
                    let a = vals.pop().unwrap();
                    Ok(ops::apply_bop(op, a, b))
                }
                n => bail!("eval: {} with {} arguments", op, n),
            },
        }
    }
}

fn compare_by(a: &Value, b: &Value, ixs: &[usize]) -> std::cmp::Ordering {
    if ixs.is_empty() {
        return a.compare(b);
    }
    for ix in ixs {
        let ord = a.tuple_get(*ix).compare(b.tuple_get(*ix));
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}
