//! Surface syntax → parse tree.
//!
//! The lexer is a chumsky scanner; the grammar itself is a hand-rolled
//! recursive-descent parser over the token stream, which keeps binding
//! variables (which need fresh ids from the [Context]) straightforward.

mod lexer;

use anyhow::Result;
use chumsky::Parser as _;

use lexer::{Kw, Token};

use crate::ast::ops::Func;
use crate::ast::pt::{dump, ColumnVar, PtExpr, PtExprKind, PtPath, PtPathKind};
use crate::context::{Context, DumpStage};
use crate::error::{Error, Reason, Span};
use crate::value::Value;

pub fn parse(ctx: &mut Context, source: &str) -> Result<PtExpr> {
    let tokens = lexer::lexer().parse(source).map_err(|errs| {
        let e = &errs[0];
        Error::new(Reason::Unexpected {
            found: match e.found() {
                Some(c) => format!("character `{}`", c),
                None => "end of input".to_string(),
            },
        })
        .with_span(Some(Span {
            start: e.span().start,
            end: e.span().end,
        }))
    })?;

    let mut p = TokenParser {
        ctx: &mut *ctx,
        tokens,
        pos: 0,
    };
    let expr = p.query()?;
    p.expect_end()?;

    ctx.add_dump(DumpStage::Parser, dump::dump(&expr));
    Ok(expr)
}

struct TokenParser<'a> {
    ctx: &'a mut Context,
    tokens: Vec<(Token, std::ops::Range<usize>)>,
    pos: usize,
}

impl<'a> TokenParser<'a> {
    // ---- token plumbing ----

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(t, _)| t)
    }

    fn here(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, r)) => Span {
                start: r.start,
                end: r.end,
            },
            None => {
                let end = self.tokens.last().map(|(_, r)| r.end).unwrap_or(0);
                Span { start: end, end }
            }
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        self.eat(&Token::Kw(kw))
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<(), Error> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_kw(&mut self, kw: Kw, what: &str) -> Result<(), Error> {
        self.expect(Token::Kw(kw), what)
    }

    fn expect_end(&mut self) -> Result<(), Error> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected("end of query"))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::new(Reason::Expected {
            who: None,
            expected: expected.to_string(),
            found: match self.peek() {
                Some(t) => format!("{:?}", t),
                None => "end of input".to_string(),
            },
        })
        .with_span(Some(self.here()))
    }

    fn ident(&mut self, what: &str) -> Result<(String, Span), Error> {
        let span = self.here();
        match self.peek() {
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.advance() else {
                    unreachable!()
                };
                Ok((name, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn mkvar(&mut self, name: &str, span: Span) -> ColumnVar {
        let id = self.ctx.next_column_id();
        ColumnVar::new(name, id, Some(span))
    }

    // ---- grammar ----

    /// query := (IDENT ":=" expr ";")* expr
    fn query(&mut self) -> Result<PtExpr, Error> {
        if matches!(self.peek(), Some(Token::Ident(_)))
            && self.peek2() == Some(&Token::ColonEq)
        {
            let (name, span) = self.ident("variable name")?;
            let var = self.mkvar(&name, span);
            self.expect(Token::ColonEq, ":=")?;
            let value = self.expr()?;
            self.expect(Token::Semi, ";")?;
            let body = self.query()?;
            return Ok(PtExpr::assign(var, value, Some(body)).with_span(Some(span)));
        }
        self.expr()
    }

    fn expr(&mut self) -> Result<PtExpr, Error> {
        if self.peek() == Some(&Token::Kw(Kw::Select)) {
            self.select()
        } else {
            self.or_expr()
        }
    }

    fn select(&mut self) -> Result<PtExpr, Error> {
        let span = self.here();
        self.expect_kw(Kw::Select, "select")?;
        let distinct = self.eat_kw(Kw::Distinct);

        let mut results = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            results.push(self.expr()?);
        }
        let result = if results.len() == 1 {
            results.pop().unwrap()
        } else {
            PtExpr::new(PtExprKind::Tuple(results))
        };

        let mut sub = if self.eat_kw(Kw::From) {
            let mut items = vec![self.expr()?];
            while self.eat(&Token::Comma) {
                items.push(self.expr()?);
            }
            PtExpr::new(PtExprKind::From(items))
        } else {
            PtExpr::new(PtExprKind::From(Vec::new()))
        };

        if self.eat_kw(Kw::Where) {
            let pred = self.expr()?;
            sub = PtExpr::new(PtExprKind::Where {
                sub: Box::new(sub),
                pred: Box::new(pred),
            });
        }

        if self.eat_kw(Kw::Group) {
            self.expect_kw(Kw::By, "by")?;
            let (name, vspan) = self.ident("group-by variable")?;
            let mut vars = vec![self.mkvar(&name, vspan)];
            while self.eat(&Token::Comma) {
                let (name, vspan) = self.ident("group-by variable")?;
                vars.push(self.mkvar(&name, vspan));
            }
            let newvar = if self.eat_kw(Kw::As) {
                let (name, vspan) = self.ident("group name")?;
                Some(self.mkvar(&name, vspan))
            } else {
                None
            };
            sub = PtExpr::new(PtExprKind::Group {
                sub: Box::new(sub),
                vars,
                newvar,
            });
        }

        if self.eat_kw(Kw::Ungroup) {
            let (name, vspan) = self.ident("ungroup variable")?;
            let var = self.mkvar(&name, vspan);
            sub = PtExpr::new(PtExprKind::Ungroup {
                sub: Box::new(sub),
                var,
            });
        }

        Ok(PtExpr::new(PtExprKind::Select {
            sub: Box::new(sub),
            result: Box::new(result),
            distinct,
        })
        .with_span(Some(span)))
    }

    fn or_expr(&mut self) -> Result<PtExpr, Error> {
        let mut l = self.and_expr()?;
        while self.eat_kw(Kw::Or) {
            let r = self.and_expr()?;
            l = PtExpr::bop(l, Func::Or, r);
        }
        Ok(l)
    }

    fn and_expr(&mut self) -> Result<PtExpr, Error> {
        let mut l = self.not_expr()?;
        while self.eat_kw(Kw::And) {
            let r = self.not_expr()?;
            l = PtExpr::bop(l, Func::And, r);
        }
        Ok(l)
    }

    fn not_expr(&mut self) -> Result<PtExpr, Error> {
        if self.eat_kw(Kw::Not) {
            let sub = self.not_expr()?;
            return Ok(PtExpr::uop(Func::Not, sub));
        }
        self.cmp_expr()
    }

    fn cmp_expr(&mut self) -> Result<PtExpr, Error> {
        let l = self.cat_expr()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(Func::Eq),
            Some(Token::NotEq) => Some(Func::NotEq),
            Some(Token::Lt) => Some(Func::Lt),
            Some(Token::LtEq) => Some(Func::LtEq),
            Some(Token::Gt) => Some(Func::Gt),
            Some(Token::GtEq) => Some(Func::GtEq),
            Some(Token::Kw(Kw::Like)) => Some(Func::Like),
            Some(Token::Kw(Kw::Glob)) => Some(Func::Glob),
            Some(Token::Kw(Kw::Grep)) => Some(Func::Grep),
            Some(Token::Kw(Kw::Soundex)) => Some(Func::Soundex),
            Some(Token::Kw(Kw::In)) => Some(Func::In),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let r = self.cat_expr()?;
            return Ok(PtExpr::bop(l, op, r));
        }
        // "not in" negates the membership test
        if self.peek() == Some(&Token::Kw(Kw::Not)) && self.peek2() == Some(&Token::Kw(Kw::In)) {
            self.advance();
            self.advance();
            let r = self.cat_expr()?;
            return Ok(PtExpr::uop(Func::Not, PtExpr::bop(l, Func::In, r)));
        }
        Ok(l)
    }

    fn cat_expr(&mut self) -> Result<PtExpr, Error> {
        let mut l = self.set_expr()?;
        while self.eat(&Token::PlusPlus) {
            let r = self.set_expr()?;
            l = PtExpr::bop(l, Func::Concat, r);
        }
        Ok(l)
    }

    fn set_expr(&mut self) -> Result<PtExpr, Error> {
        let mut l = self.add_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Kw(Kw::Union)) => Func::Union,
                Some(Token::Kw(Kw::Intersect)) => Func::Intersect,
                Some(Token::Kw(Kw::Except)) => Func::Except,
                _ => break,
            };
            self.advance();
            let op = if self.eat_kw(Kw::All) {
                match op {
                    Func::Union => Func::UnionAll,
                    Func::Intersect => Func::IntersectAll,
                    _ => Func::ExceptAll,
                }
            } else {
                op
            };
            let r = self.add_expr()?;
            l = PtExpr::bop(l, op, r);
        }
        Ok(l)
    }

    fn add_expr(&mut self) -> Result<PtExpr, Error> {
        let mut l = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Func::Add,
                Some(Token::Minus) => Func::Sub,
                _ => break,
            };
            self.advance();
            let r = self.mul_expr()?;
            l = PtExpr::bop(l, op, r);
        }
        Ok(l)
    }

    fn mul_expr(&mut self) -> Result<PtExpr, Error> {
        let mut l = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Func::Mul,
                Some(Token::Slash) => Func::Div,
                Some(Token::Kw(Kw::Mod)) => Func::Mod,
                _ => break,
            };
            self.advance();
            let r = self.unary_expr()?;
            l = PtExpr::bop(l, op, r);
        }
        Ok(l)
    }

    fn unary_expr(&mut self) -> Result<PtExpr, Error> {
        if self.eat(&Token::Minus) {
            let sub = self.unary_expr()?;
            return Ok(PtExpr::uop(Func::Neg, sub));
        }
        self.postfix_expr()
    }

    /// A primary followed by any number of `.step`s. Consecutive steps
    /// collect into one Path expression.
    fn postfix_expr(&mut self) -> Result<PtExpr, Error> {
        let span = self.here();
        let root = self.primary()?;
        if self.peek() != Some(&Token::Dot) {
            return Ok(root);
        }

        let mut steps: Vec<PtPath> = Vec::new();
        let mut more_bindings: Vec<PtExpr> = Vec::new();
        while self.eat(&Token::Dot) {
            let step = self.path_atom(&mut more_bindings)?;
            steps.push(step);
        }

        let body = if steps.len() == 1 {
            steps.pop().unwrap()
        } else {
            PtPath::new(PtPathKind::Sequence(steps))
        };

        Ok(PtExpr::new(PtExprKind::Path {
            root: Box::new(root),
            body,
            more_bindings,
        })
        .with_span(Some(span)))
    }

    /// One path step: an edge, a parenthesized group or alternation, or a
    /// braced (merge-exempt) group; with repetition suffixes and bindings.
    fn path_atom(&mut self, more_bindings: &mut Vec<PtExpr>) -> Result<PtPath, Error> {
        let mut path = if self.eat(&Token::LBrace) {
            let mut inner = self.path_alternation(more_bindings)?;
            self.expect(Token::RBrace, "}")?;
            inner.dont_merge = true;
            inner
        } else if self.peek() == Some(&Token::LParen) {
            self.advance();
            let mut inner = self.path_alternation(more_bindings)?;
            self.expect(Token::RParen, ")")?;
            inner.parens = true;
            inner
        } else {
            self.path_edge()?
        };

        self.path_suffixes(&mut path)?;
        self.path_bindings(&mut path, more_bindings)?;
        Ok(path)
    }

    /// alt ("|" alt)*, where each alt is a dot-separated edge sequence.
    fn path_alternation(
        &mut self,
        more_bindings: &mut Vec<PtExpr>,
    ) -> Result<PtPath, Error> {
        let mut items = vec![self.path_seq(more_bindings)?];
        while self.eat(&Token::Pipe) {
            items.push(self.path_seq(more_bindings)?);
        }
        if items.len() == 1 {
            Ok(items.pop().unwrap())
        } else {
            Ok(PtPath::new(PtPathKind::Alternates {
                items,
                tail_var: None,
            }))
        }
    }

    fn path_seq(&mut self, more_bindings: &mut Vec<PtExpr>) -> Result<PtPath, Error> {
        let mut items = vec![self.path_atom(more_bindings)?];
        while self.eat(&Token::Dot) {
            items.push(self.path_atom(more_bindings)?);
        }
        if items.len() == 1 {
            Ok(items.pop().unwrap())
        } else {
            Ok(PtPath::new(PtPathKind::Sequence(items)))
        }
    }

    fn path_edge(&mut self) -> Result<PtPath, Error> {
        let reversed = self.eat(&Token::At);
        match self.peek() {
            Some(Token::Ident(_)) => {
                let (name, _) = self.ident("edge name")?;
                Ok(PtPath::static_edge(name, reversed))
            }
            Some(Token::Str(_)) => {
                let Some(Token::Str(name)) = self.advance() else {
                    unreachable!()
                };
                Ok(PtPath::static_edge(name, reversed))
            }
            Some(Token::Kw(Kw::Unquote)) => {
                self.advance();
                self.expect(Token::LParen, "(")?;
                let name = self.expr()?;
                self.expect(Token::RParen, ")")?;
                Ok(PtPath::computed_edge(name, reversed))
            }
            _ => Err(self.unexpected("edge name")),
        }
    }

    fn path_suffixes(&mut self, path: &mut PtPath) -> Result<(), Error> {
        loop {
            if self.eat(&Token::Plus) {
                let sub = std::mem::replace(path, PtPath::empty_sequence());
                *path = PtPath::repeated(sub);
            } else if self.eat(&Token::Star) {
                // zero-or-more is optional(repeated(..)) by definition
                let sub = std::mem::replace(path, PtPath::empty_sequence());
                *path = PtPath::optional(PtPath::repeated(sub));
            } else if self.eat(&Token::Ques) {
                let sub = std::mem::replace(path, PtPath::empty_sequence());
                *path = PtPath::optional(sub);
            } else {
                return Ok(());
            }
        }
    }

    fn path_bindings(
        &mut self,
        path: &mut PtPath,
        more_bindings: &mut Vec<PtExpr>,
    ) -> Result<(), Error> {
        if self.eat(&Token::Hash) {
            let (name, span) = self.ident("path variable")?;
            path.bind_path = Some(self.mkvar(&name, span));
        }
        while self.eat_kw(Kw::As) {
            let (name, span) = self.ident("binding name")?;
            let var = self.mkvar(&name, span);
            match &path.bind_obj_after {
                None => path.bind_obj_after = Some(var),
                Some(first) => {
                    // further aliases ride along as extra bindings
                    more_bindings.push(
                        PtExpr::assign(var, PtExpr::read_column(first.clone()), None)
                            .with_span(Some(span)),
                    );
                }
            }
        }
        Ok(())
    }

    fn primary(&mut self) -> Result<PtExpr, Error> {
        let span = self.here();
        match self.peek().cloned() {
            Some(Token::Int(i)) => {
                self.advance();
                Ok(PtExpr::value(Value::Int(i)).with_span(Some(span)))
            }
            Some(Token::Real(x)) => {
                self.advance();
                Ok(PtExpr::value(Value::Float(x)).with_span(Some(span)))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(PtExpr::value(Value::String(s)).with_span(Some(span)))
            }
            Some(Token::Kw(Kw::Nil)) => {
                self.advance();
                Ok(PtExpr::value(Value::Nil).with_span(Some(span)))
            }
            Some(Token::Kw(Kw::True)) => {
                self.advance();
                Ok(PtExpr::value(Value::Bool(true)).with_span(Some(span)))
            }
            Some(Token::Kw(Kw::False)) => {
                self.advance();
                Ok(PtExpr::value(Value::Bool(false)).with_span(Some(span)))
            }
            Some(Token::Ident(_)) => {
                let (name, span) = self.ident("name")?;
                Ok(PtExpr::new(PtExprKind::ReadAnyVar(name)).with_span(Some(span)))
            }
            Some(Token::LParen) => {
                self.advance();
                let first = self.expr()?;
                if self.peek() == Some(&Token::Comma) {
                    let mut items = vec![first];
                    while self.eat(&Token::Comma) {
                        items.push(self.expr()?);
                    }
                    self.expect(Token::RParen, ")")?;
                    Ok(PtExpr::new(PtExprKind::Tuple(items)).with_span(Some(span)))
                } else {
                    self.expect(Token::RParen, ")")?;
                    Ok(first)
                }
            }
            Some(Token::Kw(Kw::Exists)) => {
                self.advance();
                self.quantifier(span, false)
            }
            Some(Token::Kw(Kw::For)) => {
                self.advance();
                self.expect_kw(Kw::All, "all")?;
                self.quantifier(span, true)
            }
            Some(Token::Kw(Kw::New)) => {
                self.advance();
                let args = if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let mut args = vec![self.expr()?];
                    while self.eat(&Token::Comma) {
                        args.push(self.expr()?);
                    }
                    self.expect(Token::RParen, ")")?;
                    args
                } else {
                    Vec::new()
                };
                Ok(PtExpr::func(Func::New, args).with_span(Some(span)))
            }
            Some(Token::Kw(Kw::Ctime)) => {
                self.advance();
                self.expect(Token::LParen, "(")?;
                self.expect(Token::RParen, ")")?;
                Ok(PtExpr::func(Func::Ctime, Vec::new()).with_span(Some(span)))
            }
            Some(Token::Kw(kw)) => {
                let op = match kw {
                    Kw::Count => Func::Count,
                    Kw::Sum => Func::Sum,
                    Kw::Avg => Func::Avg,
                    Kw::Min => Func::Min,
                    Kw::Max => Func::Max,
                    Kw::Abs => Func::Abs,
                    Kw::Nonempty => Func::NonEmpty,
                    Kw::Element => Func::GetElement,
                    Kw::Set => Func::MakeSet,
                    Kw::Tostring => Func::ToString,
                    _ => return Err(self.unexpected("expression")),
                };
                self.advance();
                self.expect(Token::LParen, "(")?;
                let arg = self.expr()?;
                self.expect(Token::RParen, ")")?;
                Ok(PtExpr::func(op, vec![arg]).with_span(Some(span)))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `exists X in S: P` and `for all X in S: P`.
    fn quantifier(&mut self, span: Span, forall: bool) -> Result<PtExpr, Error> {
        let (name, vspan) = self.ident("quantified variable")?;
        let var = self.mkvar(&name, vspan);
        self.expect_kw(Kw::In, "in")?;
        let set = self.or_expr()?;
        self.expect(Token::Colon, ":")?;
        let pred = self.or_expr()?;
        let kind = if forall {
            PtExprKind::Forall {
                var,
                set: Box::new(set),
                pred: Box::new(pred),
            }
        } else {
            PtExprKind::Exists {
                var,
                set: Box::new(set),
                pred: Box::new(pred),
            }
        };
        Ok(PtExpr::new(kind).with_span(Some(span)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::MemGraph;

    fn parse_ok(text: &str) -> PtExpr {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        parse(&mut ctx, text).unwrap()
    }

    fn dump_of(text: &str) -> String {
        dump::dump(&parse_ok(text))
    }

    #[test]
    fn simple_select() {
        insta::assert_snapshot!(dump_of("select X from A.friend as X"), @r###"
        select
          anyvar X
          from
            path
              anyvar A
              edge friend after=X#0
        "###);
    }

    #[test]
    fn repeated_and_star() {
        insta::assert_snapshot!(dump_of("select X from A.friend+ as X"), @r###"
        select
          anyvar X
          from
            path
              anyvar A
              repeated after=X#0
                edge friend
        "###);

        insta::assert_snapshot!(dump_of("select X from A.friend* as X"), @r###"
        select
          anyvar X
          from
            path
              anyvar A
              optional after=X#0
                repeated
                  edge friend
        "###);
    }

    #[test]
    fn alternation_with_aliases() {
        insta::assert_snapshot!(
            dump_of("select distinct E from A.friend as X, X.(friend|parent) as Y as E"),
            @r###"
        select distinct
          anyvar E
          from
            path
              anyvar A
              edge friend after=X#0
            path
              anyvar X
              alt after=Y#1
                edge friend
                edge parent
              let E#2 :=
                read Y#1
        "###
        );
    }

    #[test]
    fn where_with_quantifier() {
        insta::assert_snapshot!(
            dump_of("select X from A.friend as X where exists Y in X.friend: Y = D"),
            @r###"
        select
          anyvar X
          where
            exists Y#1 in
              path
                anyvar X
                edge friend
              bop =
                anyvar Y
                anyvar D
            from
              path
                anyvar A
                edge friend after=X#0
        "###
        );
    }

    #[test]
    fn operator_precedence() {
        insta::assert_snapshot!(dump_of("1 + 2 * 3 = 7 and true"), @r###"
        bop and
          bop =
            bop +
              value 1
              bop *
                value 2
                value 3
            value 7
          value true
        "###);
    }

    #[test]
    fn assignment_statement() {
        insta::assert_snapshot!(dump_of("x := 2; x + 1"), @r###"
        let x#0 :=
          value 2
          bop +
            anyvar x
            value 1
        "###);
    }

    #[test]
    fn reversed_edge_and_path_var() {
        insta::assert_snapshot!(dump_of("select P from B.@friend#P as W"), @r###"
        select
          anyvar P
          from
            path
              anyvar B
              edge @friend after=W#1 path=P#0
        "###);
    }

    #[test]
    fn parse_error_reports_span() {
        let mut ctx = Context::new(Box::new(MemGraph::new()));
        let err = parse(&mut ctx, "select from").unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert!(err.span.is_some());
    }
}
