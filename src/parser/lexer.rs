use chumsky::prelude::*;

/// One lexical token. Keywords are matched case-insensitively, as the
/// original language defined them.
#[derive(Clone, PartialEq, Debug)]
pub enum Token {
    Ident(String),
    Int(i64),
    Real(f64),
    Str(String),

    Kw(Kw),

    Dot,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Pipe,
    Plus,
    PlusPlus,
    Star,
    Slash,
    Minus,
    Ques,
    Hash,
    At,
    Colon,
    ColonEq,
    Semi,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Kw {
    Select,
    Distinct,
    From,
    Where,
    Group,
    By,
    Ungroup,
    As,
    In,
    Exists,
    For,
    All,
    And,
    Or,
    Not,
    Nil,
    True,
    False,
    Union,
    Intersect,
    Except,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Abs,
    Mod,
    Like,
    Glob,
    Grep,
    Soundex,
    New,
    Nonempty,
    Element,
    Set,
    Unquote,
    Tostring,
    Ctime,
}

impl Kw {
    fn lookup(word: &str) -> Option<Kw> {
        // the original lexer folds case before keyword lookup
        Some(match word.to_ascii_lowercase().as_str() {
            "select" => Kw::Select,
            "distinct" => Kw::Distinct,
            "from" => Kw::From,
            "where" => Kw::Where,
            "group" => Kw::Group,
            "by" => Kw::By,
            "ungroup" => Kw::Ungroup,
            "as" => Kw::As,
            "in" => Kw::In,
            "exists" => Kw::Exists,
            "for" => Kw::For,
            "all" => Kw::All,
            "and" => Kw::And,
            "or" => Kw::Or,
            "not" => Kw::Not,
            "nil" => Kw::Nil,
            "true" => Kw::True,
            "false" => Kw::False,
            "union" => Kw::Union,
            "intersect" => Kw::Intersect,
            "except" => Kw::Except,
            "count" => Kw::Count,
            "sum" => Kw::Sum,
            "avg" => Kw::Avg,
            "min" => Kw::Min,
            "max" => Kw::Max,
            "abs" => Kw::Abs,
            "mod" => Kw::Mod,
            "like" => Kw::Like,
            "glob" => Kw::Glob,
            "grep" => Kw::Grep,
            "soundex" => Kw::Soundex,
            "new" => Kw::New,
            "nonempty" => Kw::Nonempty,
            "element" => Kw::Element,
            "set" => Kw::Set,
            "unquote" => Kw::Unquote,
            "tostring" => Kw::Tostring,
            "ctime" => Kw::Ctime,
            _ => return None,
        })
    }
}

pub fn lexer() -> impl Parser<char, Vec<(Token, std::ops::Range<usize>)>, Error = Simple<char>> {
    let control_multi = just("++")
        .to(Token::PlusPlus)
        .or(just(":=").to(Token::ColonEq))
        .or(just("!=").to(Token::NotEq))
        .or(just("<>").to(Token::NotEq))
        .or(just("<=").to(Token::LtEq))
        .or(just(">=").to(Token::GtEq));

    let control = select! {
        '.' => Token::Dot,
        ',' => Token::Comma,
        '(' => Token::LParen,
        ')' => Token::RParen,
        '{' => Token::LBrace,
        '}' => Token::RBrace,
        '|' => Token::Pipe,
        '+' => Token::Plus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '-' => Token::Minus,
        '?' => Token::Ques,
        '#' => Token::Hash,
        '@' => Token::At,
        ':' => Token::Colon,
        ';' => Token::Semi,
        '=' => Token::Eq,
        '<' => Token::Lt,
        '>' => Token::Gt,
    };

    let word = filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .map(Some)
        .chain::<char, Vec<_>, _>(
            filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_').repeated(),
        )
        .collect::<String>()
        .map(|w| match Kw::lookup(&w) {
            Some(kw) => Token::Kw(kw),
            None => Token::Ident(w),
        });

    let number = text::int(10)
        .then(just('.').ignore_then(text::digits(10)).or_not())
        .try_map(|(whole, frac): (String, Option<String>), span| match frac {
            None => whole
                .parse::<i64>()
                .map(Token::Int)
                .map_err(|_| Simple::custom(span, "invalid integer")),
            Some(frac) => format!("{whole}.{frac}")
                .parse::<f64>()
                .map(Token::Real)
                .map_err(|_| Simple::custom(span, "invalid real")),
        });

    let escape = just('\\').ignore_then(
        just('\\')
            .or(just('"'))
            .or(just('n').to('\n'))
            .or(just('t').to('\t')),
    );
    let string = just('"')
        .ignore_then(filter(|c: &char| *c != '"' && *c != '\\').or(escape).repeated())
        .then_ignore(just('"'))
        .collect::<String>()
        .map(Token::Str);

    let token = control_multi.or(number).or(string).or(word).or(control);

    token
        .map_with_span(|tok, span| (tok, span))
        .padded()
        .repeated()
        .then_ignore(end())
}

#[cfg(test)]
mod test {
    use super::*;

    fn lex(s: &str) -> Vec<Token> {
        lexer()
            .parse(s)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn words_and_keywords() {
        assert_eq!(
            lex("select Friend from A"),
            vec![
                Token::Kw(Kw::Select),
                Token::Ident("Friend".into()),
                Token::Kw(Kw::From),
                Token::Ident("A".into()),
            ]
        );
        // keywords are case-insensitive
        assert_eq!(lex("SELECT"), vec![Token::Kw(Kw::Select)]);
    }

    #[test]
    fn punctuation_longest_match() {
        assert_eq!(
            lex("a ++ b := c <= d"),
            vec![
                Token::Ident("a".into()),
                Token::PlusPlus,
                Token::Ident("b".into()),
                Token::ColonEq,
                Token::Ident("c".into()),
                Token::LtEq,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(
            lex("42 3.5 \"hi\\n\""),
            vec![
                Token::Int(42),
                Token::Real(3.5),
                Token::Str("hi\n".into()),
            ]
        );
    }

    #[test]
    fn path_tokens() {
        assert_eq!(
            lex("A.friend+ as X"),
            vec![
                Token::Ident("A".into()),
                Token::Dot,
                Token::Ident("friend".into()),
                Token::Plus,
                Token::Kw(Kw::As),
                Token::Ident("X".into()),
            ]
        );
    }
}
