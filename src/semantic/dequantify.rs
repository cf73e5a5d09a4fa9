//! Convert quantifier expressions to map expressions.
//!
//! `forall K in S: P(K)` becomes `alltrue(map K in S: P(K))` and
//! `exists K in S: P(K)` becomes `anytrue(map K in S: P(K))`, leaving
//! the tuple calculus with only one binding comprehension form.

use anyhow::Result;

use crate::ast::ops::Func;
use crate::ast::pt::*;
use crate::context::Context;

pub fn dequantify(_ctx: &mut Context, pe: PtExpr) -> Result<PtExpr> {
    Dequantify.fold_expr(pe)
}

struct Dequantify;

impl PtFold for Dequantify {
    fn fold_expr_kind(&mut self, kind: PtExprKind) -> Result<PtExprKind> {
        let kind = fold_expr_kind(self, kind)?;
        Ok(match kind {
            PtExprKind::Forall { var, set, pred } => PtExprKind::Uop {
                op: Func::AllTrue,
                sub: Box::new(PtExpr::new(PtExprKind::Map {
                    var,
                    set,
                    result: pred,
                })),
            },
            PtExprKind::Exists { var, set, pred } => PtExprKind::Uop {
                op: Func::AnyTrue,
                sub: Box::new(PtExpr::new(PtExprKind::Map {
                    var,
                    set,
                    result: pred,
                })),
            },
            k => k,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;
    use crate::context::Context;
    use crate::parser;
    use crate::semantic::resolve::resolve_vars;

    fn dequantified(text: &str) -> PtExpr {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let pt = parser::parse(&mut ctx, text).unwrap();
        let pt = resolve_vars(&mut ctx, pt).unwrap();
        dequantify(&mut ctx, pt).unwrap()
    }

    fn count_quantifiers(pe: &PtExpr) -> usize {
        struct Counter(usize);
        impl PtFold for Counter {
            fn fold_expr_kind(&mut self, kind: PtExprKind) -> Result<PtExprKind> {
                if matches!(kind, PtExprKind::Forall { .. } | PtExprKind::Exists { .. }) {
                    self.0 += 1;
                }
                fold_expr_kind(self, kind)
            }
        }
        let mut c = Counter(0);
        c.fold_expr(pe.clone()).unwrap();
        c.0
    }

    #[test]
    fn exists_becomes_anytrue_over_map() {
        let pe = dequantified("exists Y in S: Y = 3");
        assert_eq!(count_quantifiers(&pe), 0);
        let (op, sub) = pe.kind.as_uop().unwrap();
        assert_eq!(*op, Func::AnyTrue);
        assert!(sub.kind.is_map());
    }

    #[test]
    fn forall_becomes_alltrue_over_map() {
        let pe = dequantified("for all Y in S: Y = 3");
        assert_eq!(count_quantifiers(&pe), 0);
        let (op, sub) = pe.kind.as_uop().unwrap();
        assert_eq!(*op, Func::AllTrue);
        assert!(sub.kind.is_map());
    }

    #[test]
    fn nested_quantifiers_are_rewritten() {
        let pe = dequantified("exists Y in S: for all Z in T: Y = Z");
        assert_eq!(count_quantifiers(&pe), 0);
    }
}
