//! Datatypes.
//!
//! Types are hash-consed in a [TypeStore]; a [Ty] is a handle and equality
//! of handles is equality of types. The abstract types form a small
//! lattice used during inference when no exact type is known yet:
//! `Bottom` fits anywhere, `Top` accepts anything, and the `Abs*` types
//! each cover a family of concrete types.

use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ty(u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TyKind {
    // primitives
    Unit,
    Bool,
    Int,
    Double,
    String,

    // distinguished tokens
    Distinguisher,
    DbObj,
    DbEdge,
    PathElement,

    // opaque heap object
    Struct,

    // abstract
    AbsAny,
    AbsBottom,
    AbsNumber,
    AbsDbObj,
    AbsDbEdge,
    AbsDbOther,
    Top,

    // composites
    Tuple(Vec<Ty>),
    Set(Ty),
    Sequence(Ty),
    Lambda(Ty, Ty),
}

pub struct TypeStore {
    kinds: Vec<TyKind>,
    dedup: HashMap<TyKind, Ty>,
}

macro_rules! prim_accessors {
    ($($fn:ident => $kind:ident),* $(,)?) => {
        $(pub fn $fn(&self) -> Ty {
            self.dedup[&TyKind::$kind]
        })*
    };
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = TypeStore {
            kinds: Vec::new(),
            dedup: HashMap::new(),
        };
        for kind in [
            TyKind::Unit,
            TyKind::Bool,
            TyKind::Int,
            TyKind::Double,
            TyKind::String,
            TyKind::Distinguisher,
            TyKind::DbObj,
            TyKind::DbEdge,
            TyKind::PathElement,
            TyKind::Struct,
            TyKind::AbsAny,
            TyKind::AbsBottom,
            TyKind::AbsNumber,
            TyKind::AbsDbObj,
            TyKind::AbsDbEdge,
            TyKind::AbsDbOther,
            TyKind::Top,
        ] {
            store.intern(kind);
        }
        store
    }

    pub fn intern(&mut self, kind: TyKind) -> Ty {
        if let Some(ty) = self.dedup.get(&kind) {
            return *ty;
        }
        let ty = Ty(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.dedup.insert(kind, ty);
        ty
    }

    pub fn kind(&self, ty: Ty) -> &TyKind {
        &self.kinds[ty.0 as usize]
    }

    prim_accessors! {
        unit => Unit,
        bool => Bool,
        int => Int,
        double => Double,
        string => String,
        distinguisher => Distinguisher,
        dbobj => DbObj,
        dbedge => DbEdge,
        pathelement => PathElement,
        strukt => Struct,
        absany => AbsAny,
        absbottom => AbsBottom,
        absnumber => AbsNumber,
        absdbobj => AbsDbObj,
        absdbedge => AbsDbEdge,
        absdbother => AbsDbOther,
        top => Top,
    }

    pub fn set(&mut self, member: Ty) -> Ty {
        self.intern(TyKind::Set(member))
    }

    pub fn sequence(&mut self, member: Ty) -> Ty {
        self.intern(TyKind::Sequence(member))
    }

    pub fn lambda(&mut self, arg: Ty, res: Ty) -> Ty {
        self.intern(TyKind::Lambda(arg, res))
    }

    /// Flat tuple constructor. Tuples never nest directly; a would-be
    /// tuple member is spliced in. Arity 1 collapses to the member and
    /// arity 0 is `unit`.
    pub fn tuple(&mut self, members: Vec<Ty>) -> Ty {
        let mut flat = Vec::with_capacity(members.len());
        for m in members {
            match self.kind(m) {
                TyKind::Tuple(inner) => flat.extend(inner.iter().copied()),
                TyKind::Unit => {}
                _ => flat.push(m),
            }
        }
        match flat.len() {
            0 => self.unit(),
            1 => flat[0],
            _ => self.intern(TyKind::Tuple(flat)),
        }
    }

    pub fn tuple_concat(&mut self, a: Ty, b: Ty) -> Ty {
        self.tuple(vec![a, b])
    }

    pub fn tuple_append(&mut self, a: Ty, member: Ty) -> Ty {
        self.tuple(vec![a, member])
    }

    /// Remove the `n`th column of a tuple type.
    pub fn tuple_strip(&mut self, t: Ty, n: usize) -> Ty {
        match self.kind(t).clone() {
            TyKind::Tuple(mut members) => {
                members.remove(n);
                self.tuple(members)
            }
            _ if n == 0 => self.unit(),
            _ => t,
        }
    }

    pub fn getnth(&self, t: Ty, n: usize) -> Ty {
        match self.kind(t) {
            TyKind::Tuple(members) => members[n],
            _ => {
                assert_eq!(n, 0, "type: getnth out of range");
                t
            }
        }
    }

    /// Column arity: tuples have one slot per member, unit has none,
    /// everything else is a single column.
    pub fn arity(&self, t: Ty) -> usize {
        match self.kind(t) {
            TyKind::Tuple(members) => members.len(),
            TyKind::Unit => 0,
            _ => 1,
        }
    }

    /// Arity under any number of set/sequence wrappers.
    pub fn nonset_arity(&self, t: Ty) -> usize {
        match self.kind(t) {
            TyKind::Set(m) | TyKind::Sequence(m) => self.nonset_arity(*m),
            _ => self.arity(t),
        }
    }

    pub fn is_set(&self, t: Ty) -> bool {
        matches!(self.kind(t), TyKind::Set(_))
    }

    pub fn is_sequence(&self, t: Ty) -> bool {
        matches!(self.kind(t), TyKind::Sequence(_))
    }

    pub fn is_collection(&self, t: Ty) -> bool {
        self.is_set(t) || self.is_sequence(t)
    }

    /// Member type of a set or sequence.
    pub fn collection_member(&self, t: Ty) -> Option<Ty> {
        match self.kind(t) {
            TyKind::Set(m) | TyKind::Sequence(m) => Some(*m),
            _ => None,
        }
    }

    pub fn is_numeric(&self, t: Ty) -> bool {
        matches!(
            self.kind(t),
            TyKind::Int | TyKind::Double | TyKind::AbsNumber
        )
    }

    pub fn is_abstract(&self, t: Ty) -> bool {
        matches!(
            self.kind(t),
            TyKind::AbsAny
                | TyKind::AbsBottom
                | TyKind::AbsNumber
                | TyKind::AbsDbObj
                | TyKind::AbsDbEdge
                | TyKind::AbsDbOther
                | TyKind::Top
        )
    }

    /// Is `sub` usable where `sup` is expected?
    pub fn match_specialize(&self, sup: Ty, sub: Ty) -> bool {
        if sup == sub {
            return true;
        }
        match (self.kind(sup), self.kind(sub)) {
            (TyKind::Top, _) => true,
            (_, TyKind::AbsBottom) => true,
            // a lambda is not a value; absany covers value types only
            (TyKind::AbsAny, TyKind::Lambda(..)) => false,
            (TyKind::AbsAny, _) => true,
            (TyKind::AbsNumber, TyKind::Int | TyKind::Double) => true,
            (TyKind::AbsDbObj, TyKind::DbObj | TyKind::Struct) => true,
            (TyKind::AbsDbEdge, TyKind::DbEdge | TyKind::String) => true,
            (TyKind::AbsDbOther, TyKind::Distinguisher | TyKind::PathElement) => true,
            (TyKind::Set(a), TyKind::Set(b)) => self.match_specialize(*a, *b),
            (TyKind::Sequence(a), TyKind::Sequence(b)) => self.match_specialize(*a, *b),
            (TyKind::Tuple(a), TyKind::Tuple(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| self.match_specialize(*x, *y))
            }
            (TyKind::Lambda(aa, ar), TyKind::Lambda(ba, br)) => {
                self.match_specialize(*ba, *aa) && self.match_specialize(*ar, *br)
            }
            _ => false,
        }
    }

    /// Least upper bound of two types.
    ///
    /// Two unrelated value types generalize to `absany`; anything further
    /// apart goes to `top`.
    pub fn match_generalize(&mut self, a: Ty, b: Ty) -> Ty {
        if a == b {
            return a;
        }
        let ka = self.kind(a).clone();
        let kb = self.kind(b).clone();
        match (&ka, &kb) {
            (TyKind::Top, _) | (_, TyKind::Top) => self.top(),
            (TyKind::AbsBottom, _) => b,
            (_, TyKind::AbsBottom) => a,
            (TyKind::Int, TyKind::Double) | (TyKind::Double, TyKind::Int) => self.double(),
            (TyKind::AbsNumber, t) | (t, TyKind::AbsNumber)
                if matches!(t, TyKind::Int | TyKind::Double) =>
            {
                self.absnumber()
            }
            (TyKind::AbsDbObj, t) | (t, TyKind::AbsDbObj)
                if matches!(t, TyKind::DbObj | TyKind::Struct) =>
            {
                self.absdbobj()
            }
            (TyKind::DbObj, TyKind::Struct) | (TyKind::Struct, TyKind::DbObj) => self.absdbobj(),
            (TyKind::DbEdge, TyKind::String) | (TyKind::String, TyKind::DbEdge) => {
                self.absdbedge()
            }
            (TyKind::AbsDbEdge, t) | (t, TyKind::AbsDbEdge)
                if matches!(t, TyKind::DbEdge | TyKind::String) =>
            {
                self.absdbedge()
            }
            (TyKind::Set(ma), TyKind::Set(mb)) => {
                let (ma, mb) = (*ma, *mb);
                let m = self.match_generalize(ma, mb);
                self.set(m)
            }
            (TyKind::Sequence(ma), TyKind::Sequence(mb)) => {
                let (ma, mb) = (*ma, *mb);
                let m = self.match_generalize(ma, mb);
                self.sequence(m)
            }
            (TyKind::Tuple(ma), TyKind::Tuple(mb)) if ma.len() == mb.len() => {
                let pairs: Vec<(Ty, Ty)> =
                    ma.iter().copied().zip(mb.iter().copied()).collect();
                let members = pairs
                    .into_iter()
                    .map(|(x, y)| self.match_generalize(x, y))
                    .collect();
                self.intern(TyKind::Tuple(members))
            }
            (TyKind::Lambda(..), _) | (_, TyKind::Lambda(..)) => self.top(),
            (TyKind::Set(..) | TyKind::Sequence(..) | TyKind::Tuple(..), _)
            | (_, TyKind::Set(..) | TyKind::Sequence(..) | TyKind::Tuple(..)) => self.top(),
            _ => self.absany(),
        }
    }

    pub fn name(&self, t: Ty) -> String {
        match self.kind(t) {
            TyKind::Unit => "unit".into(),
            TyKind::Bool => "bool".into(),
            TyKind::Int => "int".into(),
            TyKind::Double => "double".into(),
            TyKind::String => "string".into(),
            TyKind::Distinguisher => "distinguisher".into(),
            TyKind::DbObj => "dbobj".into(),
            TyKind::DbEdge => "dbedge".into(),
            TyKind::PathElement => "pathelement".into(),
            TyKind::Struct => "struct".into(),
            TyKind::AbsAny => "any".into(),
            TyKind::AbsBottom => "bottom".into(),
            TyKind::AbsNumber => "number".into(),
            TyKind::AbsDbObj => "anyobj".into(),
            TyKind::AbsDbEdge => "anyedge".into(),
            TyKind::AbsDbOther => "dbother".into(),
            TyKind::Top => "top".into(),
            TyKind::Tuple(members) => {
                let mut out = String::from("(");
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}", self.name(*m));
                }
                out.push(')');
                out
            }
            TyKind::Set(m) => format!("set({})", self.name(*m)),
            TyKind::Sequence(m) => format!("seq({})", self.name(*m)),
            TyKind::Lambda(a, r) => format!("lambda({} -> {})", self.name(*a), self.name(*r)),
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        TypeStore::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_identity() {
        let mut st = TypeStore::new();
        let a = st.set(st.int());
        let b = st.set(st.int());
        assert_eq!(a, b);
        let c = st.set(st.bool());
        assert_ne!(a, c);
    }

    #[test]
    fn tuples_stay_flat() {
        let mut st = TypeStore::new();
        let pair = st.tuple(vec![st.int(), st.string()]);
        let t = st.tuple(vec![pair, st.bool()]);
        assert_eq!(st.arity(t), 3);
        assert_eq!(st.getnth(t, 1), st.string());
    }

    #[test]
    fn singleton_tuple_collapses() {
        let mut st = TypeStore::new();
        let t = st.tuple(vec![st.int()]);
        assert_eq!(t, st.int());
        let u = st.tuple(vec![]);
        assert_eq!(u, st.unit());
    }

    #[test]
    fn generalize_numeric() {
        let mut st = TypeStore::new();
        assert_eq!(st.match_generalize(st.int(), st.double()), st.double());
        assert_eq!(st.match_generalize(st.int(), st.int()), st.int());
        assert_eq!(st.match_generalize(st.int(), st.string()), st.absany());
    }

    #[test]
    fn specialize_lattice() {
        let mut st = TypeStore::new();
        assert!(st.match_specialize(st.top(), st.int()));
        assert!(st.match_specialize(st.absnumber(), st.int()));
        assert!(st.match_specialize(st.absdbobj(), st.strukt()));
        assert!(!st.match_specialize(st.int(), st.string()));
        let si = st.set(st.int());
        let sn = st.set(st.absnumber());
        assert!(st.match_specialize(sn, si));
    }

    #[test]
    fn nonset_arity_unwraps() {
        let mut st = TypeStore::new();
        let tup = st.tuple(vec![st.dbobj(), st.dbedge(), st.dbobj()]);
        let t = st.set(tup);
        assert_eq!(st.nonset_arity(t), 3);
    }
}
