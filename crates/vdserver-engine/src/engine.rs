//! The analysis engine interface and its result types.

use crate::{CancellationToken, EngineResult, Environment};
use serde::Serialize;
use std::sync::Arc;
use vdserver_parser::{CodeLocation, ParsedModule};

/// Semantic analysis behind the request broker.
///
/// Every query receives an immutable [`ModuleSnapshot`] and a
/// [`CancellationToken`]; implementations must check the token at safe
/// points and return [`EngineError::Cancelled`](crate::EngineError) once it
/// is signalled. All locations are 1-based.
pub trait AnalysisEngine: Send + Sync {
    /// Replace the project environment.
    fn configure(&self, env: &Environment);

    /// Notification that some source text changed.
    fn on_source_changed(&self) {}

    /// Describe the symbol in `start..end`.
    fn tooltip(
        &self,
        snapshot: &ModuleSnapshot,
        start: CodeLocation,
        end: CodeLocation,
        flags: u32,
        token: &CancellationToken,
    ) -> EngineResult<Tooltip>;

    /// Completion candidates starting with `prefix` at `location`.
    fn expansions(
        &self,
        snapshot: &ModuleSnapshot,
        prefix: &str,
        location: CodeLocation,
        token: &CancellationToken,
    ) -> EngineResult<Vec<String>>;

    /// Where the symbol in `start..end` is declared.
    fn definition(
        &self,
        snapshot: &ModuleSnapshot,
        start: CodeLocation,
        end: CodeLocation,
        token: &CancellationToken,
    ) -> EngineResult<Definition>;

    /// Every use of the symbol at `location`.
    fn references(
        &self,
        snapshot: &ModuleSnapshot,
        location: CodeLocation,
        module_only: bool,
        token: &CancellationToken,
    ) -> EngineResult<Vec<Reference>>;

    /// Classify the identifiers on lines `start_line..=end_line`.
    fn identifier_types(
        &self,
        snapshot: &ModuleSnapshot,
        start_line: u32,
        end_line: u32,
        flags: u32,
        token: &CancellationToken,
    ) -> EngineResult<Vec<IdentifierType>>;
}

/// The module a query targets plus every other module it may refer to.
#[derive(Debug, Clone)]
pub struct ModuleSnapshot {
    /// The queried module.
    pub primary: Arc<ParsedModule>,
    /// Source text of the queried module.
    pub source: Arc<str>,
    /// Other known modules, for cross-module resolution.
    pub others: Vec<Arc<ParsedModule>>,
}

impl ModuleSnapshot {
    /// A snapshot of a single module.
    pub fn single(primary: Arc<ParsedModule>, source: impl Into<Arc<str>>) -> Self {
        Self {
            primary,
            source: source.into(),
            others: Vec::new(),
        }
    }

    /// Every module, the primary first.
    pub fn modules(&self) -> impl Iterator<Item = &ParsedModule> {
        std::iter::once(self.primary.as_ref()).chain(self.others.iter().map(AsRef::as_ref))
    }

    /// Find a module by its module name.
    pub fn module_named(&self, name: &str) -> Option<&ParsedModule> {
        self.modules().find(|module| module.name == name)
    }
}

/// Hover information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tooltip {
    /// Start of the described identifier.
    pub start: CodeLocation,
    /// End of the described identifier.
    pub end: CodeLocation,
    /// Description; empty when nothing was found.
    pub text: String,
}

/// A declaration site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    /// Start of the declared name.
    pub start: CodeLocation,
    /// End of the declared name.
    pub end: CodeLocation,
    /// File containing the declaration.
    pub file: String,
}

/// One use of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Start of the occurrence.
    pub start: CodeLocation,
    /// End of the occurrence.
    pub end: CodeLocation,
    /// File containing the occurrence.
    pub file: String,
}

/// Classification of one identifier in a line range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierType {
    /// Identifier text.
    pub name: String,
    /// What the identifier refers to.
    pub kind: IdentifierKind,
    /// Start of every occurrence in the range.
    pub occurrences: Vec<CodeLocation>,
}

/// Identifier classes, numbered as the editor expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum IdentifierKind {
    /// Could not be classified.
    Unknown = 0,
    /// An interface.
    Interface = 1,
    /// An enum type.
    Enum = 2,
    /// An enum member.
    EnumValue = 3,
    /// A template.
    Template = 4,
    /// A class.
    Class = 5,
    /// A struct.
    Struct = 6,
    /// A union.
    Union = 7,
    /// A template type parameter.
    TemplateTypeParameter = 8,
    /// A manifest or immutable constant.
    Constant = 9,
    /// A function-local variable.
    LocalVariable = 10,
    /// A function parameter.
    ParameterVariable = 11,
    /// A thread-local module variable.
    TlsVariable = 12,
    /// A `shared` module variable.
    SharedVariable = 13,
    /// A `__gshared` module variable.
    GSharedVariable = 14,
    /// A field of an aggregate.
    MemberVariable = 15,
    /// Any other variable.
    Variable = 16,
    /// An alias.
    Alias = 17,
    /// A module or import alias.
    Module = 18,
    /// A free function.
    Function = 19,
    /// A member function.
    Method = 20,
    /// A built-in type.
    BasicType = 21,
}

impl IdentifierKind {
    /// The numeric code sent to the editor.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_kind_codes() {
        assert_eq!(IdentifierKind::Unknown.code(), 0);
        assert_eq!(IdentifierKind::Class.code(), 5);
        assert_eq!(IdentifierKind::LocalVariable.code(), 10);
        assert_eq!(IdentifierKind::BasicType.code(), 21);
    }

    #[test]
    fn test_snapshot_module_lookup() {
        let primary = Arc::new(ParsedModule::parse("app.d", "module app;", &[]));
        let other = Arc::new(ParsedModule::parse("lib/util.d", "module lib.util;", &[]));
        let snapshot = ModuleSnapshot {
            primary,
            source: Arc::from("module app;"),
            others: vec![other],
        };
        assert_eq!(snapshot.modules().count(), 2);
        assert_eq!(snapshot.module_named("lib.util").unwrap().path, "lib/util.d");
        assert!(snapshot.module_named("missing").is_none());
    }
}
