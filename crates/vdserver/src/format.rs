//! Flattening of structured results into the editor's string formats.
//!
//! The editor side of the interface only passes strings, integers and flat
//! integer arrays, so every structured result is serialized here. Locations
//! are 1-based inside the broker; on this boundary lines stay as they are
//! and columns become 0-based.

use serde::Serialize;
use std::fmt::Write;
use vdserver_engine::{IdentifierType, Reference};
use vdserver_parser::{CodeLocation, CommentTask, ParseError};

/// Result text while the latest query is still running.
pub const PENDING: &str = "__pending__";
/// Result text when the latest query failed or was superseded.
pub const CANCELLED: &str = "__cancelled__";
/// Answer of `getLastMessage`.
pub const NO_MESSAGE: &str = "__no_message__";

/// Identifier-type flag bit: append the occurrences of every identifier.
pub const WITH_OCCURRENCES: u32 = 1;

/// Convert an editor position to an internal location.
pub const fn to_internal(line: u32, column: u32) -> CodeLocation {
    CodeLocation::new(line, column.saturating_add(1))
}

/// Convert an internal location to an editor `(line, column)` pair.
pub const fn to_external(location: CodeLocation) -> (u32, u32) {
    (location.line, location.column.saturating_sub(1))
}

/// A range plus text, the shape of tooltip and definition answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedText {
    /// First line.
    pub start_line: u32,
    /// 0-based start column.
    pub start_column: u32,
    /// Last line.
    pub end_line: u32,
    /// 0-based end column.
    pub end_column: u32,
    /// Tooltip text, definition file or a sentinel.
    pub text: String,
}

impl LocatedText {
    /// An answer covering `start..end`.
    pub fn new(start: CodeLocation, end: CodeLocation, text: impl Into<String>) -> Self {
        let (start_line, start_column) = to_external(start);
        let (end_line, end_column) = to_external(end);
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
            text: text.into(),
        }
    }

    /// An answer with zero coordinates carrying a sentinel.
    pub fn sentinel(sentinel: &str) -> Self {
        Self {
            start_line: 0,
            start_column: 0,
            end_line: 0,
            end_column: 0,
            text: sentinel.to_string(),
        }
    }
}

/// `line,col,line,col+1:message` per error.
pub fn parse_errors(errors: &[ParseError]) -> String {
    let mut out = String::new();
    for error in errors {
        let (line, column) = to_external(error.location);
        let _ = writeln!(out, "{line},{column},{line},{}:{}", column + 1, error.message());
    }
    out
}

/// `line,col:message` per task.
pub fn comment_tasks(tasks: &[CommentTask]) -> String {
    let mut out = String::new();
    for task in tasks {
        let (line, column) = to_external(task.location);
        let _ = writeln!(out, "{line},{column}:{}", task.message);
    }
    out
}

/// Candidates separated by newlines.
pub fn expansions(names: &[String]) -> String {
    names.join("\n")
}

/// `start_line,start_col,end_line,end_col:file` per reference.
pub fn references(references: &[Reference]) -> String {
    let mut out = String::new();
    for reference in references {
        let (start_line, start_column) = to_external(reference.start);
        let (end_line, end_column) = to_external(reference.end);
        let _ = writeln!(
            out,
            "{start_line},{start_column},{end_line},{end_column}:{}",
            reference.file
        );
    }
    out
}

/// `name:kind` per identifier, followed by `;line,col` per occurrence when
/// `flags` has [`WITH_OCCURRENCES`] set.
pub fn identifier_types(types: &[IdentifierType], flags: u32) -> String {
    let mut out = String::new();
    for ty in types {
        let _ = write!(out, "{}:{}", ty.name, ty.kind.code());
        if flags & WITH_OCCURRENCES != 0 {
            for occurrence in &ty.occurrences {
                let (line, column) = to_external(*occurrence);
                let _ = write!(out, ";{line},{column}");
            }
        }
        out.push('\n');
    }
    out
}

/// Flat `[line, col, line, col, ...]` list.
pub fn flat_locations(locations: &[CodeLocation]) -> Vec<u32> {
    locations
        .iter()
        .flat_map(|location| {
            let (line, column) = to_external(*location);
            [line, column]
        })
        .collect()
}
