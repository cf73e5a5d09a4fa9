//! Per-operator evaluation over values.
//!
//! Arithmetic promotes to float when either operand is float and stays
//! integral when both are int; division and modulus by zero are nil, as
//! is any arithmetic on nil. Comparisons coerce strings that look like
//! numbers. `like` translates the SQL pattern language into a glob;
//! `grep` compiles a regex. All of these produce values, never errors:
//! a bad operand is nil and evaluation continues.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::ops::Func;
use crate::value::Value;

pub fn apply_bop(op: Func, a: Value, b: Value) -> Value {
    match op {
        Func::Union => {
            let mut out = coll_items(&a);
            for v in coll_items(&b) {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
            Value::Set(dedup(out))
        }
        Func::UnionAll => {
            let mut out = coll_items(&a);
            out.extend(coll_items(&b));
            Value::Set(out)
        }
        Func::Intersect | Func::IntersectAll => {
            let bs = coll_items(&b);
            let out = coll_items(&a)
                .into_iter()
                .filter(|v| bs.contains(v))
                .collect();
            Value::Set(if op == Func::Intersect { dedup(out) } else { out })
        }
        Func::Except | Func::ExceptAll => {
            let mut bs = coll_items(&b);
            let mut out = Vec::new();
            for v in coll_items(&a) {
                if op == Func::ExceptAll {
                    // bag semantics: each removal uses up one occurrence
                    if let Some(ix) = bs.iter().position(|x| x == &v) {
                        bs.remove(ix);
                        continue;
                    }
                } else if bs.contains(&v) {
                    continue;
                }
                out.push(v);
            }
            Value::Set(if op == Func::Except { dedup(out) } else { out })
        }
        Func::In => match &b {
            Value::Set(items) | Value::Sequence(items) => {
                Value::Bool(items.contains(&a))
            }
            Value::Nil => Value::Nil,
            _ => Value::Nil,
        },

        Func::And => match (a.as_bool(), b.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Value::Bool(false),
            (Some(true), Some(true)) => Value::Bool(true),
            _ => Value::Nil,
        },
        Func::Or => match (a.as_bool(), b.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Value::Bool(true),
            (Some(false), Some(false)) => Value::Bool(false),
            _ => Value::Nil,
        },

        Func::Eq => Value::Bool(a == b),
        Func::NotEq => Value::Bool(a != b),
        Func::Lt => compare(&a, &b, |o| o == Ordering::Less),
        Func::Gt => compare(&a, &b, |o| o == Ordering::Greater),
        Func::LtEq => compare(&a, &b, |o| o != Ordering::Greater),
        Func::GtEq => compare(&a, &b, |o| o != Ordering::Less),

        Func::Like => match (a.as_str(), b.as_str()) {
            (Some(s), Some(pat)) => Value::Bool(glob_match(&like_to_glob(pat), s)),
            _ => Value::Nil,
        },
        Func::Glob => match (a.as_str(), b.as_str()) {
            (Some(s), Some(pat)) => Value::Bool(glob_match(pat, s)),
            _ => Value::Nil,
        },
        Func::Grep => match (a.as_str(), b.as_str()) {
            (Some(s), Some(pat)) => match Regex::new(pat) {
                Ok(re) => Value::Bool(re.is_match(s)),
                Err(_) => Value::Nil,
            },
            _ => Value::Nil,
        },
        Func::Soundex => match (a.as_str(), b.as_str()) {
            (Some(s), Some(t)) => Value::Bool(soundex(s) == soundex(t)),
            _ => Value::Nil,
        },

        Func::Concat => concat(a, b),
        Func::Choose => {
            if a.is_nil() {
                b
            } else {
                a
            }
        }

        Func::Add => arith(a, b, |x, y| x.checked_add(y), |x, y| Some(x + y)),
        Func::Sub => arith(a, b, |x, y| x.checked_sub(y), |x, y| Some(x - y)),
        Func::Mul => arith(a, b, |x, y| x.checked_mul(y), |x, y| Some(x * y)),
        Func::Div => arith(
            a,
            b,
            |x, y| if y == 0 { None } else { Some(x / y) },
            |x, y| if y == 0.0 { None } else { Some(x / y) },
        ),
        Func::Mod => arith(
            a,
            b,
            |x, y| if y == 0 { None } else { Some(x % y) },
            |x, y| if y == 0.0 { None } else { Some(x % y) },
        ),

        _ => Value::Nil,
    }
}

pub fn apply_uop(op: Func, v: Value) -> Value {
    match op {
        Func::Not => match v.as_bool() {
            Some(b) => Value::Bool(!b),
            None => Value::Nil,
        },
        Func::Neg => match v {
            Value::Int(i) => Value::Int(-i),
            Value::Float(x) => Value::Float(-x),
            _ => Value::Nil,
        },
        Func::Abs => match v {
            Value::Int(i) => Value::Int(i.abs()),
            Value::Float(x) => Value::Float(x.abs()),
            _ => Value::Nil,
        },
        Func::NonEmpty => match &v {
            Value::Set(items) | Value::Sequence(items) => Value::Bool(!items.is_empty()),
            Value::Nil => Value::Bool(false),
            _ => Value::Nil,
        },
        Func::MakeSet => Value::Set(vec![v]),
        Func::GetElement => match v {
            Value::Set(mut items) | Value::Sequence(mut items) => {
                if items.len() == 1 {
                    items.pop().unwrap()
                } else {
                    Value::Nil
                }
            }
            _ => Value::Nil,
        },
        Func::ToString => Value::String(v.tostring()),

        Func::Count => match &v {
            Value::Set(items) | Value::Sequence(items) => Value::Int(items.len() as i64),
            Value::Nil => Value::Int(0),
            // a scalar counts as its singleton
            _ => Value::Int(1),
        },
        Func::Sum => match &v {
            Value::Set(_) | Value::Sequence(_) => fold_numeric(&v, Value::Int(0), |acc, x| {
                apply_bop(Func::Add, acc, x.clone())
            }),
            Value::Nil => Value::Int(0),
            scalar => apply_uop(Func::Sum, Value::Set(vec![scalar.clone()])),
        },
        Func::Avg => match &v {
            scalar if scalar.as_number().is_some() => {
                Value::Float(scalar.as_number().unwrap().1)
            }
            Value::Set(items) | Value::Sequence(items) => {
                let vals: Vec<&Value> = items.iter().filter(|x| !x.is_nil()).collect();
                if vals.is_empty() {
                    return Value::Nil;
                }
                let mut total = 0.0;
                for x in &vals {
                    match x.as_number() {
                        Some((_, f, _)) => total += f,
                        None => return Value::Nil,
                    }
                }
                Value::Float(total / vals.len() as f64)
            }
            _ => Value::Nil,
        },
        Func::Min => match &v {
            Value::Set(_) | Value::Sequence(_) | Value::Nil => extremum(&v, Ordering::Less),
            scalar => scalar.clone(),
        },
        Func::Max => match &v {
            Value::Set(_) | Value::Sequence(_) | Value::Nil => extremum(&v, Ordering::Greater),
            scalar => scalar.clone(),
        },
        Func::AllTrue => match &v {
            Value::Set(items) | Value::Sequence(items) => Value::Bool(
                items
                    .iter()
                    .all(|x| x.as_bool().unwrap_or(false)),
            ),
            Value::Bool(b) => Value::Bool(*b),
            _ => Value::Nil,
        },
        Func::AnyTrue => match &v {
            Value::Set(items) | Value::Sequence(items) => Value::Bool(
                items
                    .iter()
                    .any(|x| x.as_bool().unwrap_or(false)),
            ),
            Value::Bool(b) => Value::Bool(*b),
            _ => Value::Nil,
        },

        _ => Value::Nil,
    }
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for v in items {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

fn coll_items(v: &Value) -> Vec<Value> {
    match v {
        Value::Set(items) | Value::Sequence(items) => items.clone(),
        Value::Nil => Vec::new(),
        other => vec![other.clone()],
    }
}

fn compare(a: &Value, b: &Value, want: fn(Ordering) -> bool) -> Value {
    if a.is_nil() || b.is_nil() {
        return Value::Nil;
    }
    // strings that look like numbers compare numerically
    let ord = match (a.as_number(), b.as_number()) {
        (Some((ai, af, afl)), Some((bi, bf, bfl))) => {
            if afl || bfl {
                af.partial_cmp(&bf).unwrap_or(Ordering::Equal)
            } else {
                ai.cmp(&bi)
            }
        }
        _ => a.compare(b),
    };
    Value::Bool(want(ord))
}

fn arith(
    a: Value,
    b: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> Option<f64>,
) -> Value {
    let (Some((ai, af, afl)), Some((bi, bf, bfl))) = (a.as_number(), b.as_number()) else {
        return Value::Nil;
    };
    if afl || bfl {
        match float_op(af, bf) {
            Some(x) => Value::Float(x),
            None => Value::Nil,
        }
    } else {
        match int_op(ai, bi) {
            Some(i) => Value::Int(i),
            None => Value::Nil,
        }
    }
}

/// `++` pastes sequences end to end. Strings concatenate as strings;
/// everything else is promoted to a sequence first (a path element
/// becomes a one-element path, nil an empty one).
fn concat(a: Value, b: Value) -> Value {
    if let (Value::String(x), Value::String(y)) = (&a, &b) {
        return Value::String(format!("{}{}", x, y));
    }
    let mut items = to_sequence(a);
    items.extend(to_sequence(b));
    Value::Sequence(items)
}

fn to_sequence(v: Value) -> Vec<Value> {
    match v {
        Value::Sequence(items) | Value::Set(items) => items,
        Value::Nil => Vec::new(),
        other => vec![other],
    }
}

fn fold_numeric(v: &Value, zero: Value, f: impl Fn(Value, &Value) -> Value) -> Value {
    match v {
        Value::Set(items) | Value::Sequence(items) => {
            let mut acc = zero;
            for x in items.iter().filter(|x| !x.is_nil()) {
                acc = f(acc, x);
                if acc.is_nil() {
                    return Value::Nil;
                }
            }
            acc
        }
        _ => Value::Nil,
    }
}

fn extremum(v: &Value, keep: Ordering) -> Value {
    match v {
        Value::Set(items) | Value::Sequence(items) => {
            let mut best: Option<&Value> = None;
            for x in items.iter().filter(|x| !x.is_nil()) {
                best = Some(match best {
                    None => x,
                    Some(cur) if x.compare(cur) == keep => x,
                    Some(cur) => cur,
                });
            }
            best.cloned().unwrap_or(Value::Nil)
        }
        _ => Value::Nil,
    }
}

/// Translate a LIKE pattern (`%`, `_`, backslash escapes) to a glob.
pub fn like_to_glob(pat: &str) -> String {
    let mut out = String::with_capacity(pat.len());
    let mut chars = pat.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push('\\');
                    out.push(next);
                }
            }
            '*' | '?' | '[' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Match a glob (`*`, `?`, backslash escapes) against a string.
pub fn glob_match(pat: &str, s: &str) -> bool {
    let p: Vec<char> = pat.chars().collect();
    let t: Vec<char> = s.chars().collect();
    glob_rec(&p, &t)
}

fn glob_rec(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            for skip in 0..=t.len() {
                if glob_rec(&p[1..], &t[skip..]) {
                    return true;
                }
            }
            false
        }
        Some('?') => !t.is_empty() && glob_rec(&p[1..], &t[1..]),
        Some('\\') if p.len() > 1 => {
            !t.is_empty() && t[0] == p[1] && glob_rec(&p[2..], &t[1..])
        }
        Some(c) => !t.is_empty() && t[0] == *c && glob_rec(&p[1..], &t[1..]),
    }
}

/// Classic four-character soundex code.
pub fn soundex(s: &str) -> String {
    static DIGITS: Lazy<Vec<(&str, char)>> = Lazy::new(|| {
        vec![
            ("bfpv", '1'),
            ("cgjkqsxz", '2'),
            ("dt", '3'),
            ("l", '4'),
            ("mn", '5'),
            ("r", '6'),
        ]
    });
    fn code(c: char) -> Option<char> {
        for (letters, d) in DIGITS.iter() {
            if letters.contains(c) {
                return Some(*d);
            }
        }
        None
    }

    let mut chars = s.chars().filter(|c| c.is_ascii_alphabetic());
    let Some(first) = chars.next() else {
        return "0000".to_string();
    };
    let mut out = String::new();
    out.push(first.to_ascii_uppercase());
    let mut prev = code(first.to_ascii_lowercase());
    for c in chars {
        let d = code(c.to_ascii_lowercase());
        if let Some(d) = d {
            if prev != Some(d) {
                out.push(d);
                if out.len() == 4 {
                    break;
                }
            }
        }
        prev = d;
    }
    while out.len() < 4 {
        out.push('0');
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_promotion_and_nil() {
        assert_eq!(
            apply_bop(Func::Add, Value::Int(1), Value::Int(2)),
            Value::Int(3)
        );
        assert_eq!(
            apply_bop(Func::Add, Value::Int(1), Value::Float(2.5)),
            Value::Float(3.5)
        );
        assert_eq!(
            apply_bop(Func::Add, Value::Nil, Value::Int(2)),
            Value::Nil
        );
        assert_eq!(
            apply_bop(Func::Div, Value::Int(1), Value::Int(0)),
            Value::Nil
        );
        assert_eq!(
            apply_bop(Func::Mod, Value::Int(7), Value::Int(3)),
            Value::Int(1)
        );
    }

    #[test]
    fn comparison_coerces_strings() {
        assert_eq!(
            apply_bop(Func::Lt, Value::String("9".into()), Value::String("10".into())),
            Value::Bool(true)
        );
        assert_eq!(
            apply_bop(Func::Lt, Value::String("abc".into()), Value::String("abd".into())),
            Value::Bool(true)
        );
    }

    #[test]
    fn set_operators() {
        let a = Value::Set(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::Set(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(
            apply_bop(Func::Union, a.clone(), b.clone()),
            Value::Set(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            apply_bop(Func::Intersect, a.clone(), b.clone()),
            Value::Set(vec![Value::Int(2)])
        );
        assert_eq!(
            apply_bop(Func::Except, a.clone(), b.clone()),
            Value::Set(vec![Value::Int(1)])
        );
        assert_eq!(
            apply_bop(Func::In, Value::Int(2), b),
            Value::Bool(true)
        );
    }

    #[test]
    fn aggregates_and_boundaries() {
        let empty = Value::empty_set();
        assert_eq!(apply_uop(Func::Count, empty.clone()), Value::Int(0));
        assert_eq!(apply_uop(Func::Sum, empty.clone()), Value::Int(0));
        assert_eq!(apply_uop(Func::Min, empty.clone()), Value::Nil);
        assert_eq!(apply_uop(Func::AllTrue, empty.clone()), Value::Bool(true));
        assert_eq!(apply_uop(Func::AnyTrue, empty), Value::Bool(false));

        let nums = Value::Set(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(apply_uop(Func::Sum, nums.clone()), Value::Int(6));
        assert_eq!(apply_uop(Func::Min, nums.clone()), Value::Int(1));
        assert_eq!(apply_uop(Func::Max, nums.clone()), Value::Int(3));
        assert_eq!(apply_uop(Func::Avg, nums), Value::Float(2.0));
    }

    #[test]
    fn like_and_glob() {
        assert_eq!(like_to_glob("a%b_c"), "a*b?c");
        assert!(glob_match("a*c", "abbbc"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert_eq!(
            apply_bop(
                Func::Like,
                Value::String("friend".into()),
                Value::String("fr%".into())
            ),
            Value::Bool(true)
        );
    }

    #[test]
    fn concat_shapes() {
        assert_eq!(
            apply_bop(
                Func::Concat,
                Value::String("ab".into()),
                Value::String("cd".into())
            ),
            Value::String("abcd".into())
        );
        // scalars promote to sequences
        assert_eq!(
            apply_bop(Func::Concat, Value::Int(1), Value::Int(2)),
            Value::Sequence(vec![Value::Int(1), Value::Int(2)])
        );
        // sets paste end to end as sequences
        assert_eq!(
            apply_bop(
                Func::Concat,
                Value::Set(vec![Value::Int(1)]),
                Value::Set(vec![])
            ),
            Value::Sequence(vec![Value::Int(1)])
        );
    }

    #[test]
    fn soundex_codes() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(
            apply_bop(
                Func::Soundex,
                Value::String("Robert".into()),
                Value::String("Rupert".into())
            ),
            Value::Bool(true)
        );
    }

    #[test]
    fn choose_takes_first_non_nil() {
        assert_eq!(
            apply_bop(Func::Choose, Value::Nil, Value::Int(2)),
            Value::Int(2)
        );
        assert_eq!(
            apply_bop(Func::Choose, Value::Int(1), Value::Int(2)),
            Value::Int(1)
        );
    }
}
