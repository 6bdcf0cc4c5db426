//! Integration tests for the analysis engine.
//!
//! Tests cover import indexing into the shared cache, resolution across the
//! indexed modules, inheritance and alias chains.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use vdserver_engine::{
    index_import_paths, normalize_path, AnalysisEngine, CancellationToken, DEngine,
    ModuleSnapshot, ParseCache,
};
use vdserver_parser::{CodeLocation, ParsedModule};

// ============================================================================
// Helper Functions
// ============================================================================

const GEOMETRY: &str = "module mylib.geometry;

struct Vector
{
    float x;
    float y;
}

Vector origin() { return Vector(0, 0); }
";

const APP: &str = "import mylib.geometry;

void main()
{
    auto v = origin();
    v.x = 1;
}
";

fn write(root: &Path, relative: &str, source: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, source).unwrap();
}

fn single(path: &str, source: &str) -> ModuleSnapshot {
    let module = Arc::new(ParsedModule::parse(path, source, &[]));
    assert!(module.errors.is_empty(), "{:?}", module.errors);
    ModuleSnapshot::single(module, source)
}

fn at(line: u32, column: u32) -> CodeLocation {
    CodeLocation::new(line, column)
}

/// An indexed library plus the application module on top of it.
fn indexed_snapshot() -> (tempfile::TempDir, ModuleSnapshot) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "mylib/geometry.d", GEOMETRY);

    let cache = ParseCache::default();
    let count = index_import_paths(
        &[dir.path().to_path_buf()],
        &[],
        &cache,
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(count, 1);

    let snapshot = ModuleSnapshot {
        others: cache.modules(),
        ..single("app.d", APP)
    };
    (dir, snapshot)
}

// ============================================================================
// Indexed Imports
// ============================================================================

#[test]
fn test_definition_resolves_into_indexed_library() {
    let (dir, snapshot) = indexed_snapshot();
    let found = DEngine::new()
        .definition(&snapshot, at(6, 7), at(6, 7), &CancellationToken::new())
        .unwrap();

    let library = dir.path().join("mylib").join("geometry.d");
    assert_eq!(found.file, normalize_path(&library.to_string_lossy()));
    assert_eq!((found.start, found.end), (at(5, 11), at(5, 12)));
}

#[test]
fn test_expansions_include_imported_names() {
    let (_dir, snapshot) = indexed_snapshot();
    let names = DEngine::new()
        .expansions(&snapshot, "Vec", at(6, 5), &CancellationToken::new())
        .unwrap();
    assert_eq!(names, vec!["Vector"]);
}

#[test]
fn test_indexing_keeps_newer_editor_module() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "mylib/geometry.d", GEOMETRY);
    let key = normalize_path(&dir.path().join("mylib/geometry.d").to_string_lossy());

    let cache = ParseCache::default();
    let edited = ParsedModule::parse(key.clone(), "module mylib.geometry;", &[]).with_stamp(5);
    assert!(cache.insert(Arc::new(edited)));

    let count = index_import_paths(
        &[dir.path().to_path_buf()],
        &[],
        &cache,
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(count, 0);
    assert_eq!(cache.get(&key).unwrap().stamp, 5);
}

// ============================================================================
// Type Resolution
// ============================================================================

#[test]
fn test_inherited_members_resolve_to_base() {
    let source = "class A { int a; }
class B : A { int b; }
class C : B
{
    void f() { a = 1; b = 2; }
}";
    let snapshot = single("h.d", source);
    let engine = DEngine::new();
    let token = CancellationToken::new();

    let a = engine.definition(&snapshot, at(5, 16), at(5, 16), &token).unwrap();
    assert_eq!(a.start, at(1, 15));
    let b = engine.definition(&snapshot, at(5, 23), at(5, 23), &token).unwrap();
    assert_eq!(b.start, at(2, 19));
}

#[test]
fn test_alias_is_followed_for_members_but_shown_as_alias() {
    let source = "class Shape { double area() { return 0; } }
alias Shapes = Shape[];
double first(Shapes list)
{
    return list[0].area();
}";
    let snapshot = single("shapes.d", source);
    let engine = DEngine::new();
    let token = CancellationToken::new();

    let area = engine.definition(&snapshot, at(5, 20), at(5, 20), &token).unwrap();
    assert_eq!(area.start, at(1, 22));

    let tooltip = engine.tooltip(&snapshot, at(3, 14), at(3, 14), 0, &token).unwrap();
    assert_eq!(tooltip.text, "alias shapes.Shapes = Shape[]");
}

#[test]
fn test_identifier_types_honour_module_only_range() {
    let (_dir, snapshot) = indexed_snapshot();
    let types = DEngine::new()
        .identifier_types(&snapshot, 5, 5, 0, &CancellationToken::new())
        .unwrap();
    let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["v", "origin"]);
}
