//! D source parser for the vdserver request broker.
//!
//! This crate turns D source text into a [`ParsedModule`]: a syntax tree for
//! a practical subset of D plus the parse errors and task comments found in
//! the file. Parsing never fails; errors are part of the result.
//!
//! # Example
//!
//! ```
//! use vdserver_parser::ParsedModule;
//!
//! let module = ParsedModule::parse("app/main.d", "void main() {}", &[]);
//! assert!(module.errors.is_empty());
//! assert_eq!(module.name, "main");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
mod comments;
mod error;
pub mod logos_lexer;
mod module;
mod parser;
mod span;
pub mod visitor;

pub use comments::CommentTask;
pub use error::{ParseError, ParseErrorKind};
pub use module::ParsedModule;
pub use parser::MAX_NESTING;
pub use span::{CodeLocation, LineIndex, Span};

/// Result of parsing source text.
#[derive(Debug)]
pub struct ParseResult {
    /// The syntax tree.
    pub module: ast::Module,
    /// Parse errors encountered.
    pub errors: Vec<ParseError>,
}

/// Parse D source code.
///
/// This is the low-level entry point; most callers want
/// [`ParsedModule::parse`], which also extracts task comments and never
/// panics.
pub fn parse(source: &str) -> ParseResult {
    let output = parser::parse(source);
    ParseResult {
        module: output.module,
        errors: output.errors,
    }
}
