use logos::{Lexer, Logos};

use crate::fault::ExecutionFault;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum LexError {
    #[default]
    InvalidCharacter,
    IntegerOverflow,
    UnterminatedString,
}

/// One lexical element of a script line. A `#` outside a string ends the line.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    #[regex(r"[0-9]+", int_literal)]
    Int(i64),
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", float_literal)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", float_literal)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", float_literal)]
    Float(f64),
    #[regex(r#""([^"\\]|\\.)*""#, string_literal)]
    #[regex(r"'([^'\\]|\\.)*'", string_literal)]
    #[regex(r#""([^"\\]|\\.)*"#, unterminated)]
    #[regex(r"'([^'\\]|\\.)*", unterminated)]
    Str(String),
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("def")]
    Def,
    #[token("return")]
    Return,
    #[token("pass")]
    Pass,
    #[token("del")]
    Del,
    #[token("assert")]
    Assert,
    #[token("in")]
    In,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtE,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtE,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
}

fn int_literal(lex: &mut Lexer<Token>) -> Result<i64, LexError> {
    lex.slice()
        .parse()
        .map_err(|_| LexError::IntegerOverflow)
}

fn float_literal(lex: &mut Lexer<Token>) -> Result<f64, LexError> {
    lex.slice()
        .parse()
        .map_err(|_| LexError::InvalidCharacter)
}

fn unterminated(_: &mut Lexer<Token>) -> Result<String, LexError> {
    Err(LexError::UnterminatedString)
}

/// Strips the quotes and resolves escapes. Unknown escapes are kept verbatim.
fn string_literal(lex: &mut Lexer<Token>) -> String {
    let slice = lex.slice();
    let body = &slice[1..slice.len() - 1];

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Tokenize a single source line.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ExecutionFault> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(line);

    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push(token),
            Err(LexError::IntegerOverflow) => return Err(ExecutionFault::overflow()),
            Err(LexError::UnterminatedString) => {
                return Err(ExecutionFault::syntax("unterminated string literal"))
            }
            Err(LexError::InvalidCharacter) => {
                return Err(ExecutionFault::syntax(format!(
                    "invalid character '{}'",
                    lexer.slice()
                )))
            }
        }
    }

    Ok(tokens)
}
