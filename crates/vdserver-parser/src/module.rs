//! The parsed representation of one source file.

use crate::ast::{self, Module};
use crate::comments::{extract_tasks, CommentTask};
use crate::visitor::{walk_module, BinaryIsInCollector};
use crate::{parser, CodeLocation, LineIndex, ParseError, ParseErrorKind};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// A parsed source file together with its diagnostics.
///
/// Parsing never fails: problems, including a crash of the parser itself,
/// are recorded in [`errors`](Self::errors).
#[derive(Debug, Clone)]
pub struct ParsedModule {
    /// Normalized path of the file.
    pub path: String,
    /// Module name from the `module` header, or the file stem.
    pub name: String,
    /// Syntax tree, best effort when there are errors.
    pub ast: Module,
    /// Parse errors.
    pub errors: Vec<ParseError>,
    /// Task comments found with the configured tokens.
    pub tasks: Vec<CommentTask>,
    /// Activity counter value at the time this module was produced.
    pub stamp: u64,
}

impl ParsedModule {
    /// Parse `source` as the file at `path`.
    pub fn parse(path: impl Into<String>, source: &str, task_tokens: &[String]) -> Self {
        let path = path.into();
        let output = panic::catch_unwind(AssertUnwindSafe(|| parser::parse(source)));
        let output = match output {
            Ok(output) => output,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown error".to_string());
                tracing::warn!(%path, %message, "parser panicked");
                return Self::crashed(path, &message);
            }
        };

        let index = LineIndex::new(source);
        let tasks = extract_tasks(source, &index, &output.comments, task_tokens);
        let name = output
            .module
            .header
            .as_deref()
            .map_or_else(|| file_stem(&path), ast::dotted);

        Self {
            name,
            ast: output.module,
            errors: output.errors,
            tasks,
            stamp: 0,
            path,
        }
    }

    /// A module standing for a file the parser could not handle.
    pub fn crashed(path: impl Into<String>, message: &str) -> Self {
        let path = path.into();
        let message = message.replace(['\r', '\n'], " ");
        Self {
            name: file_stem(&path),
            ast: Module::default(),
            errors: vec![ParseError::new(
                ParseErrorKind::Crashed(message),
                CodeLocation::EMPTY,
            )],
            tasks: Vec::new(),
            stamp: 0,
            path,
        }
    }

    /// Set the activity stamp.
    #[must_use]
    pub fn with_stamp(mut self, stamp: u64) -> Self {
        self.stamp = stamp;
        self
    }

    /// Locations of every `is`, `!is`, `in` and `!in` operator.
    pub fn binary_is_in_locations(&self) -> Vec<CodeLocation> {
        let mut collector = BinaryIsInCollector::default();
        walk_module(&mut collector, &self.ast);
        collector.locations
    }

    /// Names of the modules this file imports, at any nesting level.
    pub fn imports(&self) -> Vec<String> {
        fn collect(items: &[ast::Item], out: &mut Vec<String>) {
            for item in items {
                match item {
                    ast::Item::Import(import) => out.push(import.module_name()),
                    ast::Item::Conditional(cond) => {
                        collect(&cond.then_items, out);
                        collect(&cond.else_items, out);
                    }
                    ast::Item::Decl(decl) => collect(decl.members(), out),
                    ast::Item::Unittest(_) => {}
                }
            }
        }
        let mut imports = Vec::new();
        collect(&self.ast.items, &mut imports);
        imports
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_header() {
        let module = ParsedModule::parse("src/app/main.d", "module app.main;", &[]);
        assert_eq!(module.name, "app.main");
        assert!(module.errors.is_empty());
    }

    #[test]
    fn test_name_defaults_to_file_stem() {
        let module = ParsedModule::parse("src/app/util.d", "int x;", &[]);
        assert_eq!(module.name, "util");
    }

    #[test]
    fn test_crashed_module_has_single_unlocated_error() {
        let module = ParsedModule::crashed("a.d", "boom\nagain");
        assert_eq!(module.errors.len(), 1);
        assert_eq!(module.errors[0].location, CodeLocation::EMPTY);
        assert_eq!(module.errors[0].message(), "parser failure: boom again");
    }

    #[test]
    fn test_tasks_use_configured_tokens() {
        let source = "// TODO: one\n// NOTE: two";
        let module = ParsedModule::parse("a.d", source, &["NOTE".to_string()]);
        assert_eq!(module.tasks.len(), 1);
        assert_eq!(module.tasks[0].message, "NOTE: two");
    }

    #[test]
    fn test_imports_are_listed() {
        let source = "import std.stdio;\nversion (X) { import core.thread; }\nclass C { import std.conv; }";
        let module = ParsedModule::parse("a.d", source, &[]);
        assert_eq!(module.imports(), vec!["std.stdio", "core.thread", "std.conv"]);
    }

    #[test]
    fn test_deep_nesting_is_reported() {
        let depth = 100_000;
        let source = format!("import a;\nint x = {}1{};", "[".repeat(depth), "]".repeat(depth));
        let module = ParsedModule::parse("deep.d", &source, &[]);
        assert_eq!(module.errors.len(), 1);
        assert_eq!(module.errors[0].message(), "syntax error: nesting too deep");
        assert_eq!(module.imports(), vec!["a"]);
        assert!(module.binary_is_in_locations().is_empty());
    }

    #[test]
    fn test_stamp() {
        let module = ParsedModule::parse("a.d", "", &[]).with_stamp(7);
        assert_eq!(module.stamp, 7);
    }
}
