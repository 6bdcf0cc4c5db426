//! D tokenizer using Logos.
//!
//! Comments are kept as tokens so that comment tasks can be collected from
//! them; the parser filters them out before building the tree.

use crate::Span;
use logos::{Lexer, Logos};
use std::fmt;

/// Token types produced by the Logos lexer.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'src> {
    // ===== Literals =====
    /// An identifier.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident(&'src str),

    /// An integer or floating point literal, including suffixes.
    #[regex(r"[0-9][0-9_]*", decimal_literal)]
    #[regex(r"0[xX][0-9a-fA-F_]+[uUlL]*")]
    #[regex(r"0[bB][01_]+[uUlL]*")]
    Number(&'src str),

    /// A string literal. The flag is false when the closing quote is missing.
    #[token("\"", string_literal)]
    #[regex(r#"r"[^"]*""#, terminated)]
    #[regex(r"`[^`]*`", terminated)]
    Str(bool),

    /// A character literal.
    #[regex(r"'([^'\\\n]|\\[^\n][^'\n]*)'")]
    Char(&'src str),

    // ===== Comments =====
    /// A `//` comment.
    #[regex(r"//[^\n]*")]
    LineComment,
    /// A `/* */` comment. The flag is false when it is not terminated.
    #[token("/*", block_comment)]
    BlockComment(bool),
    /// A nesting `/+ +/` comment. The flag is false when it is not terminated.
    #[token("/+", nested_comment)]
    NestedComment(bool),

    // ===== Keywords =====
    /// `module`
    #[token("module")]
    Module,
    /// `import`
    #[token("import")]
    Import,
    /// `struct`
    #[token("struct")]
    Struct,
    /// `class`
    #[token("class")]
    Class,
    /// `interface`
    #[token("interface")]
    Interface,
    /// `union`
    #[token("union")]
    Union,
    /// `enum`
    #[token("enum")]
    Enum,
    /// `alias`
    #[token("alias")]
    Alias,
    /// `version`
    #[token("version")]
    Version,
    /// `debug`
    #[token("debug")]
    Debug,
    /// `unittest`
    #[token("unittest")]
    Unittest,
    /// `this`
    #[token("this")]
    This,
    /// `super`
    #[token("super")]
    Super,
    /// `return`
    #[token("return")]
    Return,
    /// `if`
    #[token("if")]
    If,
    /// `else`
    #[token("else")]
    Else,
    /// `while`
    #[token("while")]
    While,
    /// `do`
    #[token("do")]
    Do,
    /// `for`
    #[token("for")]
    For,
    /// `foreach` or `foreach_reverse`
    #[token("foreach")]
    #[token("foreach_reverse")]
    Foreach,
    /// `switch`
    #[token("switch")]
    Switch,
    /// `case`
    #[token("case")]
    Case,
    /// `default`
    #[token("default")]
    Default,
    /// `break`
    #[token("break")]
    Break,
    /// `continue`
    #[token("continue")]
    Continue,
    /// `new`
    #[token("new")]
    New,
    /// `cast`
    #[token("cast")]
    Cast,
    /// `null`
    #[token("null")]
    Null,
    /// `true`
    #[token("true")]
    True,
    /// `false`
    #[token("false")]
    False,
    /// `is`
    #[token("is")]
    Is,
    /// `in`
    #[token("in")]
    In,
    /// `auto`
    #[token("auto")]
    Auto,

    /// A storage class or protection attribute.
    #[token("static", |lex| lex.slice())]
    #[token("const", |lex| lex.slice())]
    #[token("immutable", |lex| lex.slice())]
    #[token("shared", |lex| lex.slice())]
    #[token("final", |lex| lex.slice())]
    #[token("override", |lex| lex.slice())]
    #[token("abstract", |lex| lex.slice())]
    #[token("public", |lex| lex.slice())]
    #[token("private", |lex| lex.slice())]
    #[token("protected", |lex| lex.slice())]
    #[token("package", |lex| lex.slice())]
    #[token("export", |lex| lex.slice())]
    #[token("extern", |lex| lex.slice())]
    #[token("scope", |lex| lex.slice())]
    #[token("ref", |lex| lex.slice())]
    #[token("out", |lex| lex.slice())]
    #[token("lazy", |lex| lex.slice())]
    #[token("nothrow", |lex| lex.slice())]
    #[token("pure", |lex| lex.slice())]
    #[token("inout", |lex| lex.slice())]
    #[token("__gshared", |lex| lex.slice())]
    StorageClass(&'src str),

    /// A built-in type name.
    #[token("void", |lex| lex.slice())]
    #[token("bool", |lex| lex.slice())]
    #[token("byte", |lex| lex.slice())]
    #[token("ubyte", |lex| lex.slice())]
    #[token("short", |lex| lex.slice())]
    #[token("ushort", |lex| lex.slice())]
    #[token("int", |lex| lex.slice())]
    #[token("uint", |lex| lex.slice())]
    #[token("long", |lex| lex.slice())]
    #[token("ulong", |lex| lex.slice())]
    #[token("float", |lex| lex.slice())]
    #[token("double", |lex| lex.slice())]
    #[token("real", |lex| lex.slice())]
    #[token("char", |lex| lex.slice())]
    #[token("wchar", |lex| lex.slice())]
    #[token("dchar", |lex| lex.slice())]
    #[token("size_t", |lex| lex.slice())]
    BasicType(&'src str),

    // ===== Punctuation =====
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `;`
    #[token(";")]
    Semi,
    /// `,`
    #[token(",")]
    Comma,
    /// `.`
    #[token(".")]
    Dot,
    /// `..`
    #[token("..")]
    DotDot,
    /// `...`
    #[token("...")]
    Ellipsis,
    /// `:`
    #[token(":")]
    Colon,
    /// `?`
    #[token("?")]
    Question,
    /// `!`
    #[token("!")]
    Bang,
    /// `@`
    #[token("@")]
    At,
    /// `$`
    #[token("$")]
    Dollar,
    /// `=>`
    #[token("=>")]
    FatArrow,
    /// `=`
    #[token("=")]
    Assign,
    /// A compound assignment such as `+=` or `~=`.
    #[token("+=", |lex| lex.slice())]
    #[token("-=", |lex| lex.slice())]
    #[token("*=", |lex| lex.slice())]
    #[token("/=", |lex| lex.slice())]
    #[token("%=", |lex| lex.slice())]
    #[token("&=", |lex| lex.slice())]
    #[token("|=", |lex| lex.slice())]
    #[token("^=", |lex| lex.slice())]
    #[token("~=", |lex| lex.slice())]
    #[token("<<=", |lex| lex.slice())]
    #[token(">>=", |lex| lex.slice())]
    OpAssign(&'src str),
    /// `==`
    #[token("==")]
    EqEq,
    /// `!=`
    #[token("!=")]
    NotEq,
    /// `<`
    #[token("<")]
    Lt,
    /// `<=`
    #[token("<=")]
    LtEq,
    /// `>`
    #[token(">")]
    Gt,
    /// `>=`
    #[token(">=")]
    GtEq,
    /// `<<`
    #[token("<<")]
    Shl,
    /// `>>`
    #[token(">>")]
    Shr,
    /// `&&`
    #[token("&&")]
    AndAnd,
    /// `||`
    #[token("||")]
    OrOr,
    /// `&`
    #[token("&")]
    Amp,
    /// `|`
    #[token("|")]
    Pipe,
    /// `^`
    #[token("^")]
    Caret,
    /// `~`
    #[token("~")]
    Tilde,
    /// `+`
    #[token("+")]
    Plus,
    /// `-`
    #[token("-")]
    Minus,
    /// `*`
    #[token("*")]
    Star,
    /// `/`
    #[token("/")]
    Slash,
    /// `%`
    #[token("%")]
    Percent,
    /// `++`
    #[token("++")]
    PlusPlus,
    /// `--`
    #[token("--")]
    MinusMinus,

    /// Error token for unrecognized input.
    Error,
}

/// Extends a decimal literal over its fraction, exponent and suffix.
fn decimal_literal<'s>(lex: &mut Lexer<'s, Token<'s>>) -> &'s str {
    let rest = lex.remainder().as_bytes();
    let mut len = 0;
    if rest.len() >= 2 && rest[0] == b'.' && rest[1].is_ascii_digit() {
        len = 1;
        while len < rest.len() && (rest[len].is_ascii_digit() || rest[len] == b'_') {
            len += 1;
        }
    }
    if len < rest.len() && (rest[len] == b'e' || rest[len] == b'E') {
        let mut exp = len + 1;
        if exp < rest.len() && (rest[exp] == b'+' || rest[exp] == b'-') {
            exp += 1;
        }
        if exp < rest.len() && rest[exp].is_ascii_digit() {
            while exp < rest.len() && rest[exp].is_ascii_digit() {
                exp += 1;
            }
            len = exp;
        }
    }
    while len < rest.len() && matches!(rest[len], b'u' | b'U' | b'l' | b'L' | b'f' | b'F' | b'i')
    {
        len += 1;
    }
    lex.bump(len);
    lex.slice()
}

/// Scans a double-quoted string body, honouring backslash escapes.
fn string_literal<'s>(lex: &mut Lexer<'s, Token<'s>>) -> Option<bool> {
    let rest = lex.remainder().as_bytes();
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            b'\\' => i += 2,
            b'"' => {
                lex.bump(i + 1);
                return Some(true);
            }
            _ => i += 1,
        }
    }
    lex.bump(rest.len());
    Some(false)
}

fn terminated<'s>(_lex: &mut Lexer<'s, Token<'s>>) -> Option<bool> {
    Some(true)
}

fn block_comment<'s>(lex: &mut Lexer<'s, Token<'s>>) -> Option<bool> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            Some(true)
        }
        None => {
            lex.bump(lex.remainder().len());
            Some(false)
        }
    }
}

fn nested_comment<'s>(lex: &mut Lexer<'s, Token<'s>>) -> Option<bool> {
    let rest = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i + 1 < rest.len() {
        match (rest[i], rest[i + 1]) {
            (b'/', b'+') => {
                depth += 1;
                i += 2;
            }
            (b'+', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    lex.bump(i);
                    return Some(true);
                }
            }
            _ => i += 1,
        }
    }
    lex.bump(rest.len());
    Some(false)
}

impl Token<'_> {
    /// Returns true for comment tokens.
    pub const fn is_comment(&self) -> bool {
        matches!(
            self,
            Self::LineComment | Self::BlockComment(_) | Self::NestedComment(_)
        )
    }

    /// Returns true if this token can only introduce a declaration.
    pub const fn starts_declaration(&self) -> bool {
        matches!(
            self,
            Self::StorageClass(_)
                | Self::Auto
                | Self::At
                | Self::Struct
                | Self::Class
                | Self::Interface
                | Self::Union
                | Self::Enum
                | Self::Alias
                | Self::Import
        )
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) | Self::Number(s) | Self::Char(s) => write!(f, "{s}"),
            Self::StorageClass(s) | Self::BasicType(s) | Self::OpAssign(s) => write!(f, "{s}"),
            Self::Str(_) => write!(f, "string literal"),
            Self::LineComment | Self::BlockComment(_) | Self::NestedComment(_) => {
                write!(f, "comment")
            }
            Self::Module => write!(f, "module"),
            Self::Import => write!(f, "import"),
            Self::Struct => write!(f, "struct"),
            Self::Class => write!(f, "class"),
            Self::Interface => write!(f, "interface"),
            Self::Union => write!(f, "union"),
            Self::Enum => write!(f, "enum"),
            Self::Alias => write!(f, "alias"),
            Self::Version => write!(f, "version"),
            Self::Debug => write!(f, "debug"),
            Self::Unittest => write!(f, "unittest"),
            Self::This => write!(f, "this"),
            Self::Super => write!(f, "super"),
            Self::Return => write!(f, "return"),
            Self::If => write!(f, "if"),
            Self::Else => write!(f, "else"),
            Self::While => write!(f, "while"),
            Self::Do => write!(f, "do"),
            Self::For => write!(f, "for"),
            Self::Foreach => write!(f, "foreach"),
            Self::Switch => write!(f, "switch"),
            Self::Case => write!(f, "case"),
            Self::Default => write!(f, "default"),
            Self::Break => write!(f, "break"),
            Self::Continue => write!(f, "continue"),
            Self::New => write!(f, "new"),
            Self::Cast => write!(f, "cast"),
            Self::Null => write!(f, "null"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Is => write!(f, "is"),
            Self::In => write!(f, "in"),
            Self::Auto => write!(f, "auto"),
            Self::LBrace => write!(f, "{{"),
            Self::RBrace => write!(f, "}}"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::Semi => write!(f, ";"),
            Self::Comma => write!(f, ","),
            Self::Dot => write!(f, "."),
            Self::DotDot => write!(f, ".."),
            Self::Ellipsis => write!(f, "..."),
            Self::Colon => write!(f, ":"),
            Self::Question => write!(f, "?"),
            Self::Bang => write!(f, "!"),
            Self::At => write!(f, "@"),
            Self::Dollar => write!(f, "$"),
            Self::FatArrow => write!(f, "=>"),
            Self::Assign => write!(f, "="),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::Shl => write!(f, "<<"),
            Self::Shr => write!(f, ">>"),
            Self::AndAnd => write!(f, "&&"),
            Self::OrOr => write!(f, "||"),
            Self::Amp => write!(f, "&"),
            Self::Pipe => write!(f, "|"),
            Self::Caret => write!(f, "^"),
            Self::Tilde => write!(f, "~"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Percent => write!(f, "%"),
            Self::PlusPlus => write!(f, "++"),
            Self::MinusMinus => write!(f, "--"),
            Self::Error => write!(f, "<error>"),
        }
    }
}

/// Tokenize source code into a vector of (Token, Span) pairs.
///
/// Lexer errors become [`Token::Error`] so the parser can report them with
/// a location.
pub fn tokenize(source: &str) -> Vec<(Token<'_>, Span)> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::from(lexer.span());
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => tokens.push((Token::Error, span)),
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokenize(source).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_tokenize_declaration() {
        assert_eq!(
            kinds("int x = 42;"),
            vec![
                Token::BasicType("int"),
                Token::Ident("x"),
                Token::Assign,
                Token::Number("42"),
                Token::Semi,
            ]
        );
    }

    #[test]
    fn test_keywords_win_over_identifiers() {
        assert_eq!(kinds("is island"), vec![Token::Is, Token::Ident("island")]);
        assert_eq!(kinds("in int"), vec![Token::In, Token::BasicType("int")]);
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(kinds("1.5f"), vec![Token::Number("1.5f")]);
        assert_eq!(kinds("0xFFu"), vec![Token::Number("0xFFu")]);
        assert_eq!(kinds("1e10"), vec![Token::Number("1e10")]);
        assert_eq!(
            kinds("0..10"),
            vec![Token::Number("0"), Token::DotDot, Token::Number("10")]
        );
    }

    #[test]
    fn test_member_access_on_integer_is_not_a_float() {
        assert_eq!(
            kinds("1.max"),
            vec![Token::Number("1"), Token::Dot, Token::Ident("max")]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(kinds(r#""a\"b""#), vec![Token::Str(true)]);
        assert_eq!(kinds(r#""open"#), vec![Token::Str(false)]);
        assert_eq!(kinds("`raw`"), vec![Token::Str(true)]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("// line\n/* block */ /+ a /+ nested +/ b +/"),
            vec![
                Token::LineComment,
                Token::BlockComment(true),
                Token::NestedComment(true)
            ]
        );
        assert_eq!(kinds("/* open"), vec![Token::BlockComment(false)]);
    }

    #[test]
    fn test_negated_identity_is_two_tokens() {
        assert_eq!(
            kinds("a !is null"),
            vec![Token::Ident("a"), Token::Bang, Token::Is, Token::Null]
        );
        assert_eq!(kinds("a != b")[1], Token::NotEq);
    }

    #[test]
    fn test_invalid_character() {
        let tokens = tokenize("int #");
        assert_eq!(tokens[1].0, Token::Error);
        assert_eq!(tokens[1].1, Span::new(4, 5));
    }
}
