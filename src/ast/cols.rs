//! Column names and column shapes.
//!
//! A [ColName] is an identity: two handles are the same column only if they
//! were created by the same call, regardless of their display text. Column
//! identity is what ties a tuple-calculus operator to positions in the
//! value tuples the evaluator manipulates; the display text exists for
//! dumps and diagnostics only.

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Identity-bearing column name handle.
#[derive(Clone)]
pub struct ColName(Rc<ColNameInner>);

impl Eq for ColName {}

struct ColNameInner {
    name: String,
}

impl ColName {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ColName(Rc::new(ColNameInner { name: name.into() }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl PartialEq for ColName {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Hash for ColName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl Display for ColName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

impl Debug for ColName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ColName({})", self.0.name)
    }
}

/// Ordered collection of distinct column handles.
///
/// A set can be marked "to complement": it then denotes all columns of some
/// not-yet-known context except the listed ones, and must be resolved
/// against a [ColTree] before use.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ColSet {
    cols: Vec<ColName>,
    tocomplement: bool,
}

impl ColSet {
    pub fn empty() -> Self {
        ColSet::default()
    }

    pub fn singleton(col: ColName) -> Self {
        ColSet {
            cols: vec![col],
            tocomplement: false,
        }
    }

    pub fn pair(a: ColName, b: ColName) -> Self {
        ColSet {
            cols: vec![a, b],
            tocomplement: false,
        }
    }

    pub fn triple(a: ColName, b: ColName, c: ColName) -> Self {
        ColSet {
            cols: vec![a, b, c],
            tocomplement: false,
        }
    }

    pub fn from_cols(cols: Vec<ColName>) -> Self {
        ColSet {
            cols,
            tocomplement: false,
        }
    }

    /// The top-level columns of a coltree, in order.
    pub fn from_coltree(ct: &ColTree) -> Self {
        ColSet::from_cols(ct.members().collect())
    }

    pub fn num(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn get(&self, index: usize) -> &ColName {
        &self.cols[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColName> {
        self.cols.iter()
    }

    pub fn add(&mut self, col: ColName) {
        self.cols.push(col);
    }

    pub fn contains(&self, col: &ColName) -> bool {
        self.cols.contains(col)
    }

    pub fn find(&self, col: &ColName) -> Option<usize> {
        self.cols.iter().position(|c| c == col)
    }

    pub fn move_append(&mut self, from: &mut ColSet) {
        self.cols.append(&mut from.cols);
    }

    pub fn replace(&mut self, oldcol: &ColName, newcol: ColName) {
        for c in self.cols.iter_mut() {
            if c == oldcol {
                *c = newcol;
                return;
            }
        }
    }

    pub fn remove(&mut self, col: &ColName) {
        self.cols.retain(|c| c != col);
    }

    /// Record that this set stands for the complement of its members.
    pub fn mark_tocomplement(&mut self) {
        self.tocomplement = true;
    }

    pub fn is_tocomplement(&self) -> bool {
        self.tocomplement
    }

    /// Resolve a complement-marked set against the columns of `context`.
    pub fn resolve_tocomplement(&mut self, context: &ColTree) {
        if !self.tocomplement {
            return;
        }
        let keep: Vec<ColName> = context
            .members()
            .filter(|c| !self.cols.contains(c))
            .collect();
        self.cols = keep;
        self.tocomplement = false;
    }

    /// Replace the set with the context columns not in it, unconditionally.
    pub fn complement(&mut self, context: &ColTree) {
        self.tocomplement = true;
        self.resolve_tocomplement(context);
    }
}

impl Display for ColSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.tocomplement {
            f.write_str("~")?;
        }
        f.write_str("{")?;
        for (i, c) in self.cols.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            Display::fmt(c, f)?;
        }
        f.write_str("}")
    }
}

/// Column shape of an expression, mirroring the nested tuple structure of
/// its datatype. A scalar carries one whole-column name; a tuple carries a
/// whole-column name plus one subtree per member.
#[derive(Clone, Debug, PartialEq)]
pub enum ColTree {
    Scalar(ColName),
    Tuple {
        whole: ColName,
        members: Vec<ColTree>,
    },
}

impl ColTree {
    pub fn scalar(whole: ColName) -> Self {
        ColTree::Scalar(whole)
    }

    /// The zero-column tuple (shape of `unit`).
    pub fn unit(whole: ColName) -> Self {
        ColTree::Tuple {
            whole,
            members: Vec::new(),
        }
    }

    pub fn tuple(whole: ColName, members: Vec<ColTree>) -> Self {
        ColTree::Tuple { whole, members }
    }

    pub fn triple(whole: ColName, m0: ColName, m1: ColName, m2: ColName) -> Self {
        ColTree::Tuple {
            whole,
            members: vec![
                ColTree::Scalar(m0),
                ColTree::Scalar(m1),
                ColTree::Scalar(m2),
            ],
        }
    }

    pub fn whole_column(&self) -> &ColName {
        match self {
            ColTree::Scalar(c) => c,
            ColTree::Tuple { whole, .. } => whole,
        }
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, ColTree::Tuple { .. })
    }

    /// Number of top-level columns: 1 for a scalar, member count for a tuple.
    pub fn arity(&self) -> usize {
        match self {
            ColTree::Scalar(_) => 1,
            ColTree::Tuple { members, .. } => members.len(),
        }
    }

    /// Member count (0 for a scalar).
    pub fn num(&self) -> usize {
        match self {
            ColTree::Scalar(_) => 0,
            ColTree::Tuple { members, .. } => members.len(),
        }
    }

    pub fn subtree(&self, index: usize) -> &ColTree {
        match self {
            ColTree::Scalar(_) => panic!("coltree: subtree of scalar"),
            ColTree::Tuple { members, .. } => &members[index],
        }
    }

    pub fn get(&self, index: usize) -> &ColName {
        self.subtree(index).whole_column()
    }

    /// The top-level column names, in order. A scalar yields its whole
    /// column, so every coltree addresses `arity()` columns.
    pub fn members(&self) -> Box<dyn Iterator<Item = ColName> + '_> {
        match self {
            ColTree::Scalar(c) => Box::new(std::iter::once(c.clone())),
            ColTree::Tuple { members, .. } => {
                Box::new(members.iter().map(|m| m.whole_column().clone()))
            }
        }
    }

    /// Position of `col` among the top-level columns.
    pub fn find(&self, col: &ColName) -> Option<usize> {
        match self {
            ColTree::Scalar(c) => (c == col).then_some(0),
            ColTree::Tuple { members, .. } => {
                members.iter().position(|m| m.whole_column() == col)
            }
        }
    }

    pub fn contains_toplevel(&self, col: &ColName) -> bool {
        self.find(col).is_some()
    }

    /// True when some top-level column name appears twice.
    pub fn has_duplicates(&self) -> bool {
        let mut seen: Vec<&ColName> = Vec::new();
        for i in 0..self.arity() {
            let c = match self {
                ColTree::Scalar(c) => c,
                ColTree::Tuple { members, .. } => members[i].whole_column(),
            };
            if seen.contains(&c) {
                return true;
            }
            seen.push(c);
        }
        false
    }

    pub fn remove_by_index(&mut self, which: usize) {
        match self {
            ColTree::Scalar(_) => panic!("coltree: remove from scalar"),
            ColTree::Tuple { members, .. } => {
                members.remove(which);
            }
        }
    }

    pub fn replace(&mut self, oldcol: &ColName, newcol: ColName) {
        match self {
            ColTree::Scalar(c) => {
                if c == oldcol {
                    *c = newcol;
                }
            }
            ColTree::Tuple { whole, members } => {
                if whole == oldcol {
                    *whole = newcol;
                    return;
                }
                for m in members.iter_mut() {
                    if m.whole_column() == oldcol {
                        m.replace(oldcol, newcol);
                        return;
                    }
                }
            }
        }
    }

    /// Shape after projecting onto `keep` (in the order of `keep`).
    /// A one-column projection collapses to the member's own subtree.
    pub fn project(&self, keep: &ColSet, fresh_whole: ColName) -> ColTree {
        if keep.num() == 1 {
            if let Some(ix) = self.find(keep.get(0)) {
                return match self {
                    ColTree::Scalar(c) => ColTree::Scalar(c.clone()),
                    ColTree::Tuple { members, .. } => members[ix].clone(),
                };
            }
        }
        let members = keep
            .iter()
            .filter_map(|c| {
                self.find(c).map(|ix| match self {
                    ColTree::Scalar(sc) => ColTree::Scalar(sc.clone()),
                    ColTree::Tuple { members, .. } => members[ix].clone(),
                })
            })
            .collect();
        ColTree::Tuple {
            whole: fresh_whole,
            members,
        }
    }

    /// Shape after removing `remove`.
    pub fn strip(&self, remove: &ColSet) -> ColTree {
        match self {
            ColTree::Scalar(_) => self.clone(),
            ColTree::Tuple { whole, members } => ColTree::Tuple {
                whole: whole.clone(),
                members: members
                    .iter()
                    .filter(|m| !remove.contains(m.whole_column()))
                    .cloned()
                    .collect(),
            },
        }
    }

    pub fn rename(&self, oldcol: &ColName, newcol: ColName) -> ColTree {
        let mut ret = self.clone();
        ret.replace(oldcol, newcol);
        ret
    }

    /// Concatenate the columns of two shapes under a fresh whole name.
    pub fn join(left: &ColTree, right: &ColTree, fresh_whole: ColName) -> ColTree {
        let mut members = Vec::new();
        members.extend(left.member_subtrees());
        members.extend(right.member_subtrees());
        ColTree::Tuple {
            whole: fresh_whole,
            members,
        }
    }

    /// Append one scalar column.
    pub fn adjoin(&self, newcol: ColName) -> ColTree {
        let mut members = self.member_subtrees();
        members.push(ColTree::Scalar(newcol));
        ColTree::Tuple {
            whole: self.whole_column().clone(),
            members,
        }
    }

    /// Append the columns of another shape.
    pub fn adjoin_coltree(&self, newstuff: &ColTree) -> ColTree {
        let mut members = self.member_subtrees();
        members.extend(newstuff.member_subtrees());
        ColTree::Tuple {
            whole: self.whole_column().clone(),
            members,
        }
    }

    /// Replace the whole-column name, keeping the shape.
    pub fn with_whole(&self, whole: ColName) -> ColTree {
        match self {
            ColTree::Scalar(_) => ColTree::Scalar(whole),
            ColTree::Tuple { members, .. } => ColTree::Tuple {
                whole,
                members: members.clone(),
            },
        }
    }

    /// Append one column with a full subtree shape.
    pub fn adjoin_subtree(&self, sub: ColTree) -> ColTree {
        let mut members = self.member_subtrees();
        members.push(sub);
        ColTree::Tuple {
            whole: self.whole_column().clone(),
            members,
        }
    }

    /// Shape after nesting: the columns in `remove` are collected into a
    /// single appended set-column `add`, whose subtree keeps their shape
    /// so a later unnest can recover the names.
    pub fn nest(&self, remove: &ColSet, add: ColName) -> ColTree {
        let collected: Vec<ColTree> = remove
            .iter()
            .filter_map(|c| {
                self.find(c).map(|ix| match self {
                    ColTree::Scalar(sc) => ColTree::Scalar(sc.clone()),
                    ColTree::Tuple { members, .. } => members[ix].clone(),
                })
            })
            .collect();
        let sub = if collected.len() == 1 {
            collected.into_iter().next().unwrap().with_whole(add)
        } else {
            ColTree::Tuple {
                whole: add,
                members: collected,
            }
        };
        self.strip(remove).adjoin_subtree(sub)
    }

    /// Shape after unnesting `expand`: its subtree's columns replace it at
    /// its position.
    pub fn unnest(&self, expand: &ColName, inner: &ColTree) -> ColTree {
        match self {
            ColTree::Scalar(c) => {
                if c == expand {
                    inner.clone()
                } else {
                    self.clone()
                }
            }
            ColTree::Tuple { whole, members } => {
                let mut newmembers = Vec::new();
                for m in members {
                    if m.whole_column() == expand {
                        newmembers.extend(inner.member_subtrees());
                    } else {
                        newmembers.push(m.clone());
                    }
                }
                ColTree::Tuple {
                    whole: whole.clone(),
                    members: newmembers,
                }
            }
        }
    }

    fn member_subtrees(&self) -> Vec<ColTree> {
        match self {
            ColTree::Scalar(c) => vec![ColTree::Scalar(c.clone())],
            ColTree::Tuple { members, .. } => members.clone(),
        }
    }
}

impl Display for ColTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ColTree::Scalar(c) => Display::fmt(c, f),
            ColTree::Tuple { members, .. } => {
                f.write_str("(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    Display::fmt(m, f)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_not_name() {
        let a = ColName::new("x");
        let b = ColName::new("x");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn complement_resolution() {
        let a = ColName::new("a");
        let b = ColName::new("b");
        let c = ColName::new("c");
        let ct = ColTree::tuple(
            ColName::new(".w"),
            vec![
                ColTree::Scalar(a.clone()),
                ColTree::Scalar(b.clone()),
                ColTree::Scalar(c.clone()),
            ],
        );
        let mut cs = ColSet::singleton(b.clone());
        cs.mark_tocomplement();
        cs.resolve_tocomplement(&ct);
        assert_eq!(cs.num(), 2);
        assert_eq!(cs.get(0), &a);
        assert_eq!(cs.get(1), &c);
    }

    #[test]
    fn strip_and_unnest_shapes() {
        let a = ColName::new("a");
        let b = ColName::new("b");
        let g = ColName::new("g");
        let ct = ColTree::tuple(
            ColName::new(".w"),
            vec![
                ColTree::Scalar(a.clone()),
                ColTree::Scalar(b.clone()),
                ColTree::Scalar(g.clone()),
            ],
        );
        let stripped = ct.strip(&ColSet::singleton(b.clone()));
        assert_eq!(stripped.arity(), 2);

        let inner = ColTree::tuple(
            ColName::new(".i"),
            vec![ColTree::Scalar(ColName::new("p")), ColTree::Scalar(ColName::new("q"))],
        );
        let un = ct.unnest(&g, &inner);
        assert_eq!(un.arity(), 4);
    }
}
