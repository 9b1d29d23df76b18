// ABOUTME: Tokenizer turning source text into the fixed token alphabet of the source language

use nom::{
    character::complete::{alpha1, alphanumeric1, digit1},
    combinator::recognize,
    multi::many0_count,
    sequence::pair,
    IResult, Parser,
};

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // keywords
    If,
    Else,
    While,
    Return,
    Print,
    Def,
    Extern,
    True,
    False,
    TypeInt,
    TypeCint,
    TypeFloat,
    TypeBool,
    TypeVoid,
    Ref,
    Noalias,

    // identifiers and literals
    Id(String),
    VarId(String),
    IntLit(i32),
    FloatLit(f32),
    StrLit(String),

    // punctuation
    Plus,
    Minus,
    Times,
    Divide,
    Assign,
    Equal,
    Lt,
    Gt,
    Not,
    And,
    Or,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,

    Eof,
}

/// A single positioned token, line numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

/// Tokenizes the full source text up front. Lexing is resilient: a bad
/// character is recorded as an error but does not stop the scan, mirroring
/// the original lexer's `t_error` recovery.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    pub errors: Vec<CompileError>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
            errors: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned>, Vec<CompileError>) {
        let mut tokens = Vec::new();
        while let Some(spanned) = self.next_token() {
            tokens.push(spanned);
        }
        tokens.push(Spanned {
            token: Token::Eof,
            line: self.line,
        });
        (tokens, self.errors)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn advance_by(&mut self, n: usize) {
        for ch in self.src[self.pos..self.pos + n].chars() {
            if ch == '\n' {
                self.line += 1;
            }
        }
        self.pos += n;
    }

    fn skip_ignored(&mut self) {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return;
            }
            let mut chars = rest.char_indices();
            match chars.next() {
                Some((_, ' ')) | Some((_, '\t')) | Some((_, '\r')) => self.advance_by(1),
                Some((_, '\n')) => self.advance_by(1),
                Some((_, '#')) => {
                    let end = rest.find('\n').unwrap_or(rest.len());
                    self.advance_by(end);
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Option<Spanned> {
        self.skip_ignored();
        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }
        let line = self.line;

        if let Ok((remainder, word)) = ident(rest) {
            let consumed = rest.len() - remainder.len();
            self.advance_by(consumed);
            return Some(Spanned {
                token: keyword_or_id(word),
                line,
            });
        }

        if rest.starts_with('$') {
            if let Ok((remainder, word)) = ident(&rest[1..]) {
                let consumed = 1 + (rest.len() - 1 - remainder.len());
                self.advance_by(consumed);
                return Some(Spanned {
                    token: Token::VarId(format!("${}", word)),
                    line,
                });
            }
        }

        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            if let Ok((remainder, lit)) = numeric_literal(rest) {
                let consumed = rest.len() - remainder.len();
                self.advance_by(consumed);
                return Some(Spanned { token: lit, line });
            }
        }

        if rest.starts_with('"') {
            if let Some(end) = rest[1..].find('"') {
                let text = rest[1..1 + end].to_string();
                self.advance_by(end + 2);
                return Some(Spanned {
                    token: Token::StrLit(text),
                    line,
                });
            }
        }

        // compound operators before their single-character prefixes
        if let Some(t) = match_prefix(rest, "==", Token::Equal)
            .or_else(|| match_prefix(rest, "&&", Token::And))
            .or_else(|| match_prefix(rest, "||", Token::Or))
        {
            self.advance_by(2);
            return Some(Spanned { token: t, line });
        }

        let single = match rest.chars().next().unwrap() {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Times),
            '/' => Some(Token::Divide),
            '=' => Some(Token::Assign),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Not),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            _ => None,
        };
        if let Some(t) = single {
            self.advance_by(1);
            return Some(Spanned { token: t, line });
        }

        let bad = rest.chars().next().unwrap();
        self.errors.push(CompileError::LexError { ch: bad, line });
        self.advance_by(bad.len_utf8());
        self.next_token()
    }
}

fn match_prefix(rest: &str, pat: &str, tok: Token) -> Option<Token> {
    if rest.starts_with(pat) {
        Some(tok)
    } else {
        None
    }
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt_alpha_underscore,
        many0_count(alt_alnum_underscore),
    ))
    .parse(input)
}

fn alt_alpha_underscore(input: &str) -> IResult<&str, &str> {
    nom::branch::alt((alpha1, nom::bytes::complete::tag("_"))).parse(input)
}

fn alt_alnum_underscore(input: &str) -> IResult<&str, &str> {
    nom::branch::alt((alphanumeric1, nom::bytes::complete::tag("_"))).parse(input)
}

fn numeric_literal(input: &str) -> IResult<&str, Token> {
    let (rest, int_part) = digit1(input)?;
    if let Ok((rest2, _)) = nom::character::complete::char::<_, nom::error::Error<&str>>('.')(rest)
    {
        if let Ok((rest3, frac)) = digit1::<_, nom::error::Error<&str>>(rest2) {
            let text = format!("{}.{}", int_part, frac);
            let value: f32 = text.parse().unwrap_or(0.0);
            return Ok((rest3, Token::FloatLit(value)));
        }
    }
    let value: i32 = int_part.parse().unwrap_or(0);
    Ok((rest, Token::IntLit(value)))
}

fn keyword_or_id(word: &str) -> Token {
    match word {
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "return" => Token::Return,
        "print" => Token::Print,
        "def" => Token::Def,
        "extern" => Token::Extern,
        "true" => Token::True,
        "false" => Token::False,
        "int" => Token::TypeInt,
        "cint" => Token::TypeCint,
        "float" => Token::TypeFloat,
        "bool" => Token::TypeBool,
        "void" => Token::TypeVoid,
        "ref" => Token::Ref,
        "noalias" => Token::Noalias,
        other => Token::Id(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        let (spans, errs) = Lexer::new(src).tokenize();
        assert!(errs.is_empty(), "unexpected lex errors: {:?}", errs);
        spans.into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn tokenizes_keywords_and_identifiers() {
        let ts = toks("def int run ref noalias");
        assert_eq!(
            ts,
            vec![
                Token::Def,
                Token::TypeInt,
                Token::Id("run".into()),
                Token::Ref,
                Token::Noalias,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_varid_with_sigil_retained() {
        let ts = toks("$x");
        assert_eq!(ts, vec![Token::VarId("$x".into()), Token::Eof]);
    }

    #[test]
    fn dotted_literal_is_float_undotted_is_int() {
        let ts = toks("3 3.5");
        assert_eq!(ts, vec![Token::IntLit(3), Token::FloatLit(3.5), Token::Eof]);
    }

    #[test]
    fn compound_operators_take_priority_over_single_chars() {
        let ts = toks("== && ||");
        assert_eq!(ts, vec![Token::Equal, Token::And, Token::Or, Token::Eof]);
    }

    #[test]
    fn comments_and_whitespace_are_skipped_newline_counts_lines() {
        let (spans, _) = Lexer::new("# a comment\nint").tokenize();
        assert_eq!(spans[0].token, Token::TypeInt);
        assert_eq!(spans[0].line, 2);
    }

    #[test]
    fn bad_character_is_recorded_but_lexing_continues() {
        let (spans, errs) = Lexer::new("int ~ float").tokenize();
        assert_eq!(errs.len(), 1);
        assert_eq!(
            spans.iter().map(|s| s.token.clone()).collect::<Vec<_>>(),
            vec![Token::TypeInt, Token::TypeFloat, Token::Eof]
        );
    }

    #[test]
    fn string_literal_has_no_escape_processing() {
        let ts = toks("\"hello world\"");
        assert_eq!(ts, vec![Token::StrLit("hello world".into()), Token::Eof]);
    }
}
