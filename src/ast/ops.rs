use serde::{Deserialize, Serialize};

/// Every operator in the language, surface or internal. Binary and unary
/// expression nodes and generic function nodes all dispatch on this.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Func {
    // set
    Union,
    Intersect,
    Except,
    UnionAll,
    IntersectAll,
    ExceptAll,
    In,
    NonEmpty,
    MakeSet,
    GetElement,

    // aggregator
    Count,
    Sum,
    Avg,
    Min,
    Max,
    AllTrue,
    AnyTrue,

    // boolean
    And,
    Or,
    Not,

    // object
    New,

    // time
    Ctime,

    // comparison
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">=")]
    GtEq,
    Like,
    Glob,
    Grep,
    Soundex,

    // string
    ToString,

    // string and sequence
    #[strum(serialize = "++")]
    Concat,

    // nil
    Choose,

    // numeric
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    Mod,
    Neg,
    Abs,
}

impl Func {
    /// True when `a OP b` and `b OP a` are interchangeable.
    pub fn commutes(&self) -> bool {
        matches!(
            self,
            Func::Union
                | Func::Intersect
                | Func::UnionAll
                | Func::IntersectAll
                | Func::And
                | Func::Or
                | Func::Eq
                | Func::NotEq
                | Func::Add
                | Func::Mul
        )
    }

    /// Aggregators take a collection and produce a scalar.
    pub fn is_aggregator(&self) -> bool {
        matches!(
            self,
            Func::Count
                | Func::Sum
                | Func::Avg
                | Func::Min
                | Func::Max
                | Func::AllTrue
                | Func::AnyTrue
        )
    }

    /// The identity-free swap of a comparison, for operand reordering.
    pub fn reverse_comparison(&self) -> Option<Func> {
        match self {
            Func::Lt => Some(Func::Gt),
            Func::Gt => Some(Func::Lt),
            Func::LtEq => Some(Func::GtEq),
            Func::GtEq => Some(Func::LtEq),
            Func::Eq => Some(Func::Eq),
            Func::NotEq => Some(Func::NotEq),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(Func::Union.to_string(), "union");
        assert_eq!(Func::Eq.to_string(), "=");
        assert_eq!(Func::Concat.to_string(), "++");
        assert_eq!(Func::AnyTrue.to_string(), "anytrue");
    }

    #[test]
    fn commutativity() {
        assert!(Func::Add.commutes());
        assert!(!Func::Sub.commutes());
        assert!(!Func::Concat.commutes());
    }
}
