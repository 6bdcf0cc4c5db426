//! The built-in D analysis engine.
//!
//! Works purely on the syntax trees in a [`ModuleSnapshot`]: declarations
//! are collected per scope, names are resolved lexically and through
//! imports, and a light type inference follows variables, fields, return
//! types and `auto` initializers far enough for member access.

mod resolve;
mod symbols;

use self::resolve::World;
use crate::{
    AnalysisEngine, CancellationToken, Definition, EngineError, EngineResult, Environment,
    IdentifierKind, IdentifierType, ModuleSnapshot, Reference, Tooltip,
};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info};
use vdserver_parser::ast::{Decl, DeclKind, Expr, ExprKind, Ident, Item, Stmt, TypeRef};
use vdserver_parser::visitor::{
    walk_decl, walk_expr, walk_item, walk_module, walk_stmt, walk_type, Visitor,
};
use vdserver_parser::{CodeLocation, LineIndex, ParsedModule};

/// Syntax-driven semantic analysis for D.
#[derive(Debug, Default)]
pub struct DEngine {
    environment: RwLock<Environment>,
}

impl DEngine {
    /// Create an engine with an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current environment.
    pub fn environment(&self) -> Environment {
        self.environment.read().clone()
    }
}

impl AnalysisEngine for DEngine {
    fn configure(&self, env: &Environment) {
        info!(
            import_paths = env.import_paths.len(),
            versions = env.version_ids.len(),
            flags = env.flags,
            "environment configured"
        );
        *self.environment.write() = env.clone();
    }

    fn tooltip(
        &self,
        snapshot: &ModuleSnapshot,
        start: CodeLocation,
        end: CodeLocation,
        _flags: u32,
        token: &CancellationToken,
    ) -> EngineResult<Tooltip> {
        token.check()?;
        let environment = self.environment();
        let world = World::new(&environment, snapshot);
        let located = world.locate(world.primary(), start);
        let Some(target) = located.target else {
            return Ok(Tooltip {
                start,
                end,
                text: String::new(),
            });
        };
        let (start, end) = target.span();
        let text = world
            .resolve(&target, &located.context)
            .map(|symbol| symbol.describe())
            .unwrap_or_default();
        Ok(Tooltip { start, end, text })
    }

    fn expansions(
        &self,
        snapshot: &ModuleSnapshot,
        prefix: &str,
        location: CodeLocation,
        token: &CancellationToken,
    ) -> EngineResult<Vec<String>> {
        token.check()?;
        let environment = self.environment();
        let world = World::new(&environment, snapshot);
        let context = world.locate(world.primary(), location).context;

        let source: &str = &snapshot.source;
        let offset = LineIndex::new(source)
            .offset(source, location)
            .unwrap_or(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let candidates = match member_chain(before) {
            Some(chain) => world.chain_members(&chain, &context),
            None => context.visible(&world),
        };
        token.check()?;

        let mut names: Vec<String> = candidates
            .iter()
            .map(|symbol| symbol.name)
            .filter(|name| !name.is_empty() && !is_special_member(name))
            .filter(|name| name.starts_with(prefix))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn definition(
        &self,
        snapshot: &ModuleSnapshot,
        start: CodeLocation,
        _end: CodeLocation,
        token: &CancellationToken,
    ) -> EngineResult<Definition> {
        token.check()?;
        let environment = self.environment();
        let world = World::new(&environment, snapshot);
        let located = world.locate(world.primary(), start);
        let symbol = located
            .target
            .and_then(|target| world.resolve(&target, &located.context))
            .ok_or(EngineError::SymbolNotFound(start))?;
        Ok(Definition {
            start: symbol.start,
            end: symbol.end,
            file: symbol.module.path.clone(),
        })
    }

    fn references(
        &self,
        snapshot: &ModuleSnapshot,
        location: CodeLocation,
        module_only: bool,
        token: &CancellationToken,
    ) -> EngineResult<Vec<Reference>> {
        token.check()?;
        let environment = self.environment();
        let world = World::new(&environment, snapshot);
        let located = world.locate(world.primary(), location);
        let Some(symbol) = located
            .target
            .and_then(|target| world.resolve(&target, &located.context))
        else {
            return Ok(Vec::new());
        };

        let modules: Vec<&ParsedModule> = if module_only {
            vec![world.primary()]
        } else {
            snapshot.modules().collect()
        };
        let mut references = Vec::new();
        for module in modules {
            for occurrence in occurrences(module) {
                if occurrence.name != symbol.name {
                    continue;
                }
                token.check()?;
                let located = world.locate(module, occurrence.start);
                let same = located
                    .target
                    .and_then(|target| world.resolve(&target, &located.context))
                    .is_some_and(|found| found.is_same(&symbol));
                if same {
                    references.push(Reference {
                        start: occurrence.start,
                        end: occurrence.end,
                        file: module.path.clone(),
                    });
                }
            }
        }
        debug!(name = symbol.name, count = references.len(), "references collected");
        Ok(references)
    }

    fn identifier_types(
        &self,
        snapshot: &ModuleSnapshot,
        start_line: u32,
        end_line: u32,
        _flags: u32,
        token: &CancellationToken,
    ) -> EngineResult<Vec<IdentifierType>> {
        token.check()?;
        let environment = self.environment();
        let world = World::new(&environment, snapshot);
        let primary = world.primary();
        let last_line = if end_line == 0 { u32::MAX } else { end_line };

        let mut types: Vec<IdentifierType> = Vec::new();
        let mut positions: HashMap<(String, IdentifierKind), usize> = HashMap::new();
        for occurrence in occurrences(primary) {
            if !(start_line..=last_line).contains(&occurrence.start.line) {
                continue;
            }
            token.check()?;
            let located = world.locate(primary, occurrence.start);
            let Some(symbol) = located
                .target
                .and_then(|target| world.resolve(&target, &located.context))
            else {
                continue;
            };
            match positions.entry((occurrence.name, symbol.kind())) {
                Entry::Occupied(entry) => types[*entry.get()].occurrences.push(occurrence.start),
                Entry::Vacant(entry) => {
                    let (name, kind) = entry.key().clone();
                    entry.insert(types.len());
                    types.push(IdentifierType {
                        name,
                        kind,
                        occurrences: vec![occurrence.start],
                    });
                }
            }
        }
        Ok(types)
    }
}

fn is_special_member(name: &str) -> bool {
    matches!(name, "this" | "~this")
}

/// The dotted expression before a trailing `.`, e.g. `["a", "b"]` for
/// `a.b.` or `a.b.pre`.
fn member_chain(before: &str) -> Option<Vec<&str>> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let text = before.trim_end_matches(is_ident).strip_suffix('.')?;
    if text.ends_with('.') {
        return None;
    }

    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let trimmed = rest.trim_end_matches(is_ident);
        let ident = &rest[trimmed.len()..];
        if ident.is_empty() {
            break;
        }
        parts.push(ident);
        match trimmed.strip_suffix('.') {
            Some(next) if !next.ends_with('.') => rest = next,
            _ => break,
        }
    }
    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(parts)
}

/// An identifier as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Occurrence {
    name: String,
    start: CodeLocation,
    end: CodeLocation,
}

#[derive(Debug, Default)]
struct Occurrences {
    found: Vec<Occurrence>,
}

impl Occurrences {
    fn push(&mut self, ident: &Ident) {
        if !ident.name.is_empty() && !is_special_member(&ident.name) {
            self.found.push(Occurrence {
                name: ident.name.clone(),
                start: ident.start,
                end: ident.end,
            });
        }
    }
}

impl Visitor for Occurrences {
    fn visit_item(&mut self, item: &Item) {
        if let Item::Import(import) = item {
            for ident in import.alias.iter().chain(&import.path).chain(&import.symbols) {
                self.push(ident);
            }
        }
        walk_item(self, item);
    }

    fn visit_decl(&mut self, decl: &Decl) {
        self.push(&decl.name);
        match &decl.kind {
            DeclKind::Function { params, .. } => {
                for name in params.iter().filter_map(|param| param.name.as_ref()) {
                    self.push(name);
                }
            }
            DeclKind::Enum { members, .. } => {
                for member in members {
                    self.push(&member.name);
                }
            }
            _ => {}
        }
        walk_decl(self, decl);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Stmt::Foreach { vars, .. } = stmt {
            for name in vars.iter().filter_map(|var| var.name.as_ref()) {
                self.push(name);
            }
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(ident)
            | ExprKind::ModuleScope(ident)
            | ExprKind::Member { member: ident, .. } => self.push(ident),
            _ => {}
        }
        walk_expr(self, expr);
    }

    fn visit_type(&mut self, ty: &TypeRef) {
        if let TypeRef::Named { path, .. } = ty {
            for ident in path {
                self.push(ident);
            }
        }
        walk_type(self, ty);
    }
}

/// Every identifier of a module in source order.
fn occurrences(module: &ParsedModule) -> Vec<Occurrence> {
    let mut collector = Occurrences::default();
    walk_module(&mut collector, &module.ast);
    collector.found.sort_by_key(|occurrence| occurrence.start);
    collector.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SHAPES: &str = "module geometry.shapes;

struct Point
{
    double x;
    double y;
    double length() const { return x * x + y * y; }
}

class Shape
{
    abstract double area();
}

class Circle : Shape
{
    Point center;
    double radius;
    this(Point center, double radius) { this.center = center; this.radius = radius; }
    override double area() { return radius * radius * 3; }
}

double total(Shape[] shapes)
{
    double sum = 0;
    foreach (shape; shapes)
        sum += shape.area();
    return sum;
}

void main()
{
    auto p = Point(1, 2);
    auto c = new Circle(p, 2);
    double len = p.length();
    c.center.x = 3;
}
";

    fn snapshot(path: &str, source: &str) -> ModuleSnapshot {
        let module = Arc::new(ParsedModule::parse(path, source, &[]));
        assert!(module.errors.is_empty(), "{:?}", module.errors);
        ModuleSnapshot::single(module, source)
    }

    fn with_others(primary: ModuleSnapshot, others: &[(&str, &str)]) -> ModuleSnapshot {
        ModuleSnapshot {
            others: others
                .iter()
                .map(|(path, source)| Arc::new(ParsedModule::parse(*path, source, &[])))
                .collect(),
            ..primary
        }
    }

    fn at(line: u32, column: u32) -> CodeLocation {
        CodeLocation::new(line, column)
    }

    fn definition(snapshot: &ModuleSnapshot, location: CodeLocation) -> EngineResult<Definition> {
        DEngine::new().definition(snapshot, location, location, &CancellationToken::new())
    }

    #[test]
    fn test_tooltip_local_variable() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let tooltip = DEngine::new()
            .tooltip(&snapshot, at(35, 18), at(35, 18), 0, &CancellationToken::new())
            .unwrap();
        assert_eq!(tooltip.text, "auto p");
        assert_eq!((tooltip.start, tooltip.end), (at(35, 18), at(35, 19)));
    }

    #[test]
    fn test_tooltip_class_in_new_expression() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let tooltip = DEngine::new()
            .tooltip(&snapshot, at(34, 18), at(34, 18), 0, &CancellationToken::new())
            .unwrap();
        assert_eq!(tooltip.text, "class geometry.shapes.Circle : Shape");
        assert_eq!((tooltip.start, tooltip.end), (at(34, 18), at(34, 24)));
    }

    #[test]
    fn test_tooltip_on_nothing_is_empty() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let tooltip = DEngine::new()
            .tooltip(&snapshot, at(2, 1), at(2, 1), 0, &CancellationToken::new())
            .unwrap();
        assert!(tooltip.text.is_empty());
        assert_eq!(tooltip.start, at(2, 1));
    }

    #[test]
    fn test_definition_through_field_chain() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let center = definition(&snapshot, at(36, 7)).unwrap();
        assert_eq!((center.start, center.end), (at(17, 11), at(17, 17)));
        assert_eq!(center.file, "shapes.d");

        let x = definition(&snapshot, at(36, 14)).unwrap();
        assert_eq!(x.start, at(5, 12));
    }

    #[test]
    fn test_definition_through_foreach_element() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let area = definition(&snapshot, at(27, 22)).unwrap();
        assert_eq!(area.start, at(12, 21));
    }

    #[test]
    fn test_definition_of_parameter_inside_constructor() {
        let snapshot = snapshot("shapes.d", SHAPES);
        // `= center;` in `this.center = center;`
        let param = definition(&snapshot, at(19, 55)).unwrap();
        assert_eq!(param.start, at(19, 16));
    }

    #[test]
    fn test_definition_not_found() {
        let snapshot = snapshot("a.d", "void f() { unknown(); }");
        let result = definition(&snapshot, at(1, 12));
        assert!(matches!(result, Err(EngineError::SymbolNotFound(_))));
    }

    #[test]
    fn test_references_include_declaration() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let references = DEngine::new()
            .references(&snapshot, at(3, 8), false, &CancellationToken::new())
            .unwrap();
        let starts: Vec<CodeLocation> = references.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![at(3, 8), at(17, 5), at(19, 10), at(33, 14)]);
        assert!(references.iter().all(|r| r.file == "shapes.d"));
    }

    #[test]
    fn test_references_across_modules() {
        let lib = "module lib.util;\nint helper(int x) { return x; }";
        let app = "import lib.util;\nvoid main() { helper(1); }";
        let snapshot = with_others(snapshot("app.d", app), &[("lib/util.d", lib)]);

        let engine = DEngine::new();
        let token = CancellationToken::new();
        let all = engine.references(&snapshot, at(2, 15), false, &token).unwrap();
        let files: Vec<&str> = all.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["app.d", "lib/util.d"]);

        let local = engine.references(&snapshot, at(2, 15), true, &token).unwrap();
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_definition_in_imported_module() {
        let lib = "module lib.util;\nint helper(int x) { return x; }";
        let app = "import lib.util;\nvoid main() { helper(1); }";
        let snapshot = with_others(snapshot("app.d", app), &[("lib/util.d", lib)]);
        let found = definition(&snapshot, at(2, 15)).unwrap();
        assert_eq!(found.file, "lib/util.d");
        assert_eq!((found.start, found.end), (at(2, 5), at(2, 11)));
    }

    #[test]
    fn test_selective_import_hides_other_names() {
        let lib = "module lib.util;\nint helper(int x) { return x; }\nint other;";
        let app = "import lib.util : other;\nvoid main() { helper(1); }";
        let snapshot = with_others(snapshot("app.d", app), &[("lib/util.d", lib)]);
        assert!(definition(&snapshot, at(2, 15)).is_err());
    }

    #[test]
    fn test_aliased_import_member() {
        let lib = "module lib.util;\nint helper(int x) { return x; }";
        let app = "import u = lib.util;\nvoid main() { u.helper(1); }";
        let snapshot = with_others(snapshot("app.d", app), &[("lib/util.d", lib)]);
        let found = definition(&snapshot, at(2, 17)).unwrap();
        assert_eq!(found.file, "lib/util.d");
    }

    #[test]
    fn test_version_blocks_follow_environment() {
        let source = "version (Windows) { int winOnly; } else { int posixOnly; }\nvoid f() { posixOnly = 1; winOnly = 2; }";
        let snapshot = snapshot("v.d", source);
        let engine = DEngine::new();
        let token = CancellationToken::new();
        // `posixOnly` at column 12, `winOnly` at column 27.
        assert!(engine.definition(&snapshot, at(2, 12), at(2, 12), &token).is_ok());
        assert!(engine.definition(&snapshot, at(2, 27), at(2, 27), &token).is_err());

        engine.configure(&Environment {
            version_ids: vec!["Windows".to_string()],
            ..Environment::default()
        });
        assert!(engine.definition(&snapshot, at(2, 12), at(2, 12), &token).is_err());
        assert!(engine.definition(&snapshot, at(2, 27), at(2, 27), &token).is_ok());
    }

    #[test]
    fn test_identifier_types() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let types = DEngine::new()
            .identifier_types(&snapshot, 33, 36, 1, &CancellationToken::new())
            .unwrap();
        let kind_of = |name: &str| {
            types
                .iter()
                .find(|t| t.name == name)
                .map(|t| (t.kind, t.occurrences.len()))
        };
        assert_eq!(kind_of("p"), Some((IdentifierKind::LocalVariable, 3)));
        assert_eq!(kind_of("Point"), Some((IdentifierKind::Struct, 1)));
        assert_eq!(kind_of("Circle"), Some((IdentifierKind::Class, 1)));
        assert_eq!(kind_of("length"), Some((IdentifierKind::Method, 1)));
        assert_eq!(kind_of("center"), Some((IdentifierKind::MemberVariable, 1)));
        assert_eq!(types[0].name, "p");
    }

    #[test]
    fn test_identifier_types_parameters_and_functions() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let types = DEngine::new()
            .identifier_types(&snapshot, 23, 0, 0, &CancellationToken::new())
            .unwrap();
        let kind_of = |name: &str| types.iter().find(|t| t.name == name).map(|t| t.kind);
        assert_eq!(kind_of("total"), Some(IdentifierKind::Function));
        assert_eq!(kind_of("shapes"), Some(IdentifierKind::ParameterVariable));
        assert_eq!(kind_of("shape"), Some(IdentifierKind::LocalVariable));
        assert_eq!(kind_of("main"), Some(IdentifierKind::Function));
    }

    #[test]
    fn test_member_expansions() {
        let source = "struct Point { int x; int y; int area() { return x * y; } }\nvoid main()\n{\n    Point p;\n    p.\n}";
        let module = Arc::new(ParsedModule::parse("p.d", source, &[]));
        let snapshot = ModuleSnapshot::single(module, source);
        let engine = DEngine::new();
        let token = CancellationToken::new();

        let all = engine.expansions(&snapshot, "", at(5, 7), &token).unwrap();
        assert_eq!(all, vec!["area", "x", "y"]);
        let filtered = engine.expansions(&snapshot, "a", at(5, 7), &token).unwrap();
        assert_eq!(filtered, vec!["area"]);
    }

    #[test]
    fn test_member_expansions_in_file_named_otherwise() {
        let source = "struct Point { int x; int y; int area() { return x * y; } }\nvoid main()\n{\n    Point p;\n    p.\n}";
        let module = Arc::new(ParsedModule::parse("q.d", source, &[]));
        let snapshot = ModuleSnapshot::single(module, source);
        let names = DEngine::new()
            .expansions(&snapshot, "", at(5, 7), &CancellationToken::new())
            .unwrap();
        assert_eq!(names, vec!["area", "x", "y"]);
    }

    #[test]
    fn test_variable_shadows_module_of_same_name() {
        let source = "struct Point { int x; int y; }\nvoid main()\n{\n    Point util;\n    util.\n}";
        let module = Arc::new(ParsedModule::parse("app.d", source, &[]));
        let snapshot = with_others(
            ModuleSnapshot::single(module, source),
            &[("util.d", "module util;\nint helper;")],
        );
        let names = DEngine::new()
            .expansions(&snapshot, "", at(5, 10), &CancellationToken::new())
            .unwrap();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_member_expansions_of_module_path() {
        let lib = "module lib.util;\nint helper(int x) { return x; }";
        let source = "import lib.util;\nvoid main()\n{\n    lib.util.\n}";
        let module = Arc::new(ParsedModule::parse("app.d", source, &[]));
        let snapshot = with_others(
            ModuleSnapshot::single(module, source),
            &[("lib/util.d", lib)],
        );
        let names = DEngine::new()
            .expansions(&snapshot, "", at(4, 14), &CancellationToken::new())
            .unwrap();
        assert_eq!(names, vec!["helper"]);
    }

    #[test]
    fn test_scope_expansions() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let names = DEngine::new()
            .expansions(&snapshot, "ma", at(36, 5), &CancellationToken::new())
            .unwrap();
        assert_eq!(names, vec!["main"]);
    }

    #[test]
    fn test_cancelled_query() {
        let snapshot = snapshot("shapes.d", SHAPES);
        let token = CancellationToken::new();
        token.cancel();
        let result = DEngine::new().references(&snapshot, at(3, 8), false, &token);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_member_chain() {
        assert_eq!(member_chain("x = a.b."), Some(vec!["a", "b"]));
        assert_eq!(member_chain("a.b.pre"), Some(vec!["a", "b"]));
        assert_eq!(member_chain("foo"), None);
        assert_eq!(member_chain("a[0 .."), None);
    }
}
