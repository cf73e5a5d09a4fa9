//! The repeat operator: Kleene-plus by fixed point.
//!
//! Each in-flight match carries the sub row it grew from, the output and
//! path sequences accumulated so far, the set of objects already
//! visited, and the object it currently stands on. Every iteration
//! evaluates the body once over the deduplicated current objects and
//! extends each match by every body row that starts where the match
//! stands. Each extension is itself a result (any prefix of a longer
//! walk is a walk); a match stops extending when it revisits an object
//! or nothing continues from it. Visited-set loop detection is what
//! makes this terminate on cyclic graphs.
//!
//! Every result took at least one step; a seed that cannot step yields
//! nothing. Zero-or-more behavior comes from the optional() wrapper the
//! normalizer puts around repetition.

use anyhow::Result;

use crate::ast::tc::{TcExpr, TcExprKind};
use crate::value::Value;

use super::{child_cols, position, rows, Evaluator};

struct Match {
    /// The sub row this walk grew from.
    row: Value,
    outputs: Vec<Value>,
    paths: Vec<Value>,
    visited: Vec<Value>,
    current: Value,
}

pub(super) fn eval_repeat(ev: &mut Evaluator, te: &TcExpr) -> Result<Value> {
    let TcExprKind::Repeat {
        sub,
        subendcolumn,
        loopvar,
        bodystartcolumn,
        body,
        bodypathcolumn,
        bodyendcolumn,
        repeatpathcolumn,
        ..
    } = &te.kind
    else {
        unreachable!()
    };

    let sub_ct = child_cols(sub)?;
    let start_ix = position(sub_ct, subendcolumn)?;

    let body_ct = child_cols(body)?;
    let body_start_ix = position(body_ct, bodystartcolumn)?;
    let body_end_ix = position(body_ct, bodyendcolumn)?;
    let body_path_ix = match bodypathcolumn {
        Some(c) => Some(position(body_ct, c)?),
        None => None,
    };
    let other_ixs: Vec<usize> = (0..body_ct.arity())
        .filter(|i| {
            *i != body_start_ix && *i != body_end_ix && Some(*i) != body_path_ix
        })
        .collect();

    // seed one match per input row
    let (sub_rows, _) = rows(ev.eval(sub)?);
    let mut active: Vec<Match> = sub_rows
        .iter()
        .map(|row| {
            let current = row.tuple_get(start_ix).clone();
            Match {
                row: row.clone(),
                outputs: Vec::new(),
                paths: Vec::new(),
                visited: vec![current.clone()],
                current,
            }
        })
        .collect();

    let mut out: Vec<Value> = Vec::new();
    let mut iterations = 0usize;

    while !active.is_empty() {
        iterations += 1;

        // evaluate the body once over the deduplicated current objects
        let mut currents: Vec<Value> = Vec::new();
        for m in &active {
            if !m.current.is_nil() && !currents.contains(&m.current) {
                currents.push(m.current.clone());
            }
        }
        let body_rows = if currents.is_empty() {
            Vec::new()
        } else {
            let bound = Value::Set(currents);
            let v = ev.with_binding(loopvar, bound, |ev| ev.eval(body))?;
            rows(v).0
        };

        let mut next: Vec<Match> = Vec::new();
        for m in active {
            for brow in &body_rows {
                if brow.tuple_get(body_start_ix) != &m.current {
                    continue;
                }

                let newcurrent = brow.tuple_get(body_end_ix).clone();
                let mut nm = Match {
                    row: m.row.clone(),
                    outputs: m.outputs.clone(),
                    paths: m.paths.clone(),
                    visited: m.visited.clone(),
                    current: newcurrent.clone(),
                };
                if let Some(pix) = body_path_ix {
                    match brow.tuple_get(pix) {
                        Value::Sequence(items) | Value::Set(items) => {
                            nm.paths.extend(items.iter().cloned())
                        }
                        Value::Nil => {}
                        one => nm.paths.push(one.clone()),
                    }
                }
                if !other_ixs.is_empty() {
                    nm.outputs.push(if other_ixs.len() == 1 {
                        brow.tuple_get(other_ixs[0]).clone()
                    } else {
                        Value::Tuple(
                            other_ixs
                                .iter()
                                .map(|i| brow.tuple_get(*i).clone())
                                .collect(),
                        )
                    });
                }

                // every extension is a result row in its own right
                out.push(emit(&nm, &other_ixs, repeatpathcolumn.is_some()));

                // looping back to a visited object ends the walk
                if m.visited.contains(&newcurrent) || newcurrent.is_nil() {
                    continue;
                }
                nm.visited.push(newcurrent);
                next.push(nm);
            }
        }
        active = next;
    }

    ev.trace(|| format!("repeat: {} iterations, {} rows", iterations, out.len()));
    Ok(Value::Set(out))
}

/// A result row: the originating sub row, then the collected outputs,
/// then the collected path, then the endpoint.
fn emit(m: &Match, other_ixs: &[usize], with_path: bool) -> Value {
    let mut row = m.row.clone();
    if !other_ixs.is_empty() {
        row = row.tuple_add(Value::Sequence(m.outputs.clone()));
    }
    if with_path {
        row = row.tuple_add(Value::Sequence(m.paths.clone()));
    }
    row.tuple_add(m.current.clone())
}
