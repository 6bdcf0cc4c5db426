//! Parse error types.

use crate::CodeLocation;
use std::fmt;

/// A parse error with location information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The kind of error.
    pub kind: ParseErrorKind,
    /// Where the error occurred.
    pub location: CodeLocation,
}

impl ParseError {
    /// Create a new parse error.
    #[must_use]
    pub const fn new(kind: ParseErrorKind, location: CodeLocation) -> Self {
        Self { kind, location }
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.kind)
    }
}

impl std::error::Error for ParseError {}

/// Kinds of parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token was required.
    Expected {
        /// What the grammar required, e.g. `'}'`.
        expected: String,
        /// What was found instead.
        found: String,
    },
    /// A token that cannot start the construct being parsed.
    Unexpected(String),
    /// Input the lexer could not tokenize.
    InvalidCharacter(String),
    /// String literal without closing quote.
    UnterminatedString,
    /// Block comment without closing delimiter.
    UnterminatedComment,
    /// Brackets, statements or declarations nested past the parser's limit.
    NestingTooDeep,
    /// The parser itself failed; the message is the failure description.
    Crashed(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected { expected, found } => {
                write!(f, "syntax error: expected {expected}, found {found}")
            }
            Self::Unexpected(found) => write!(f, "syntax error: unexpected {found}"),
            Self::InvalidCharacter(text) => write!(f, "invalid character '{text}'"),
            Self::UnterminatedString => write!(f, "unterminated string literal"),
            Self::UnterminatedComment => write!(f, "unterminated comment"),
            Self::NestingTooDeep => write!(f, "syntax error: nesting too deep"),
            Self::Crashed(msg) => write!(f, "parser failure: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_message() {
        let err = ParseError::new(
            ParseErrorKind::Expected {
                expected: "'}'".to_string(),
                found: "end of file".to_string(),
            },
            CodeLocation::new(1, 10),
        );
        assert_eq!(
            err.message(),
            "syntax error: expected '}', found end of file"
        );
        assert_eq!(
            err.to_string(),
            "1:10: syntax error: expected '}', found end of file"
        );
    }

    #[test]
    fn test_messages_are_single_line() {
        let kinds = [
            ParseErrorKind::Unexpected("')'".to_string()),
            ParseErrorKind::InvalidCharacter("#".to_string()),
            ParseErrorKind::UnterminatedString,
            ParseErrorKind::UnterminatedComment,
            ParseErrorKind::NestingTooDeep,
        ];
        for kind in kinds {
            assert!(!kind.to_string().contains('\n'));
        }
    }
}
