//! The database seam.
//!
//! The evaluator is generic over anything that can follow edges, resolve
//! named roots, and create objects. [MemGraph] is the in-memory
//! implementation used by the test suite and by embedders who want a
//! scratch graph.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::value::{Oid, Value};

pub trait Backend {
    /// Set of single-column dbobj tuples reached from `obj` over edges
    /// named `edgename`, in the given direction.
    fn follow(&self, obj: &Value, edgename: &str, reversed: bool) -> Result<Value>;

    /// Set of (edgename, dbobj) pairs adjacent to `obj`.
    fn follow_all(&self, obj: &Value, reversed: bool) -> Result<Value>;

    /// Resolve a named graph root.
    fn read_global(&self, name: &str) -> Result<Value>;

    /// Allocate a fresh object.
    fn new_object(&mut self) -> Result<Value>;

    /// Attach an edge from `obj` labeled `edgename` leading to `value`.
    fn assign(&mut self, obj: &Value, edgename: &str, value: &Value) -> Result<()>;
}

/// In-memory graph backend.
#[derive(Debug, Default)]
pub struct MemGraph {
    next_oid: u64,
    /// (from, edgename, to), insertion-ordered per object.
    edges: Vec<(Oid, String, Value)>,
    globals: BTreeMap<String, Value>,
}

impl MemGraph {
    pub fn new() -> Self {
        MemGraph::default()
    }

    pub fn add_object(&mut self) -> Oid {
        let oid = Oid(self.next_oid);
        self.next_oid += 1;
        oid
    }

    pub fn add_edge(&mut self, from: Oid, edgename: &str, to: Value) {
        self.edges.push((from, edgename.to_string(), to));
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    fn oid_of(obj: &Value) -> Result<Oid> {
        match obj {
            Value::Struct(oid) => Ok(*oid),
            _ => Err(anyhow!("backend: not an object: {}", obj)),
        }
    }
}

impl Backend for MemGraph {
    fn follow(&self, obj: &Value, edgename: &str, reversed: bool) -> Result<Value> {
        let oid = Self::oid_of(obj)?;
        let mut out = Vec::new();
        for (from, name, to) in &self.edges {
            if name != edgename {
                continue;
            }
            if !reversed {
                if *from == oid {
                    out.push(to.clone());
                }
            } else if matches!(to, Value::Struct(t) if *t == oid) {
                out.push(Value::Struct(*from));
            }
        }
        Ok(Value::Set(out))
    }

    fn follow_all(&self, obj: &Value, reversed: bool) -> Result<Value> {
        let oid = Self::oid_of(obj)?;
        let mut out = Vec::new();
        for (from, name, to) in &self.edges {
            if !reversed {
                if *from == oid {
                    out.push(Value::Tuple(vec![
                        Value::String(name.clone()),
                        to.clone(),
                    ]));
                }
            } else if matches!(to, Value::Struct(t) if *t == oid) {
                out.push(Value::Tuple(vec![
                    Value::String(name.clone()),
                    Value::Struct(*from),
                ]));
            }
        }
        Ok(Value::Set(out))
    }

    fn read_global(&self, name: &str) -> Result<Value> {
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("backend: no global named `{}`", name))
    }

    fn new_object(&mut self) -> Result<Value> {
        Ok(Value::Struct(self.add_object()))
    }

    fn assign(&mut self, obj: &Value, edgename: &str, value: &Value) -> Result<()> {
        let oid = Self::oid_of(obj)?;
        self.edges.push((oid, edgename.to_string(), value.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> (MemGraph, Oid, Oid, Oid) {
        let mut g = MemGraph::new();
        let a = g.add_object();
        let b = g.add_object();
        let c = g.add_object();
        g.add_edge(a, "friend", Value::Struct(b));
        g.add_edge(a, "friend", Value::Struct(c));
        g.add_edge(b, "parent", Value::Struct(c));
        g.set_global("A", Value::Struct(a));
        (g, a, b, c)
    }

    #[test]
    fn follow_forward_and_back() {
        let (g, a, b, c) = sample();
        let fwd = g.follow(&Value::Struct(a), "friend", false).unwrap();
        assert_eq!(
            fwd,
            Value::Set(vec![Value::Struct(b), Value::Struct(c)])
        );
        let back = g.follow(&Value::Struct(c), "friend", true).unwrap();
        assert_eq!(back, Value::Set(vec![Value::Struct(a)]));
    }

    #[test]
    fn follow_all_pairs() {
        let (g, _, b, c) = sample();
        let all = g.follow_all(&Value::Struct(b), false).unwrap();
        assert_eq!(
            all,
            Value::Set(vec![Value::Tuple(vec![
                Value::String("parent".into()),
                Value::Struct(c)
            ])])
        );
    }

    #[test]
    fn globals_resolve() {
        let (g, a, _, _) = sample();
        assert_eq!(g.read_global("A").unwrap(), Value::Struct(a));
        assert!(g.read_global("missing").is_err());
    }
}
