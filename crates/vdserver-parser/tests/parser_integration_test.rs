//! Integration tests for the parser crate.
//!
//! Tests cover declarations, error recovery, task comments and robustness
//! against arbitrary input.

use proptest::prelude::*;
use vdserver_parser::ast::{DeclKind, Item};
use vdserver_parser::{parse, CodeLocation, ParseErrorKind, ParseResult, ParsedModule};

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_ok(source: &str) -> ParseResult {
    let result = parse(source);
    assert!(
        result.errors.is_empty(),
        "expected no errors, got: {:?}",
        result.errors
    );
    result
}

fn decl_names(result: &ParseResult) -> Vec<String> {
    result
        .module
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Decl(decl) => Some(decl.name.name.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Declarations
// ============================================================================

#[test]
fn test_realistic_module() {
    let source = r#"
module geometry.shapes;

import std.math : sqrt;
import std.stdio;

/// A point in the plane.
struct Point {
    double x = 0, y = 0;

    double length() const {
        return sqrt(x * x + y * y);
    }
}

interface Shape {
    double area();
}

class Circle : Shape {
    private Point center;
    private double radius;

    this(Point center, double radius) {
        this.center = center;
        this.radius = radius;
    }

    override double area() {
        return 3.14159 * radius * radius;
    }
}

alias Shapes = Shape[];

enum Kind { circle, square }

Shape[] byKind(Shapes all, Kind kind) {
    Shape[] result;
    foreach (shape; all) {
        if (cast(Circle) shape !is null && kind == Kind.circle)
            result ~= shape;
    }
    return result;
}
"#;
    let result = parse_ok(source);
    assert_eq!(
        decl_names(&result),
        vec!["Point", "Shape", "Circle", "Shapes", "Kind", "byKind"]
    );
}

#[test]
fn test_templates_and_attributes() {
    let source = r#"
@safe pure nothrow int twice(T)(T value) if (is(T : int)) {
    return value * 2;
}

public:
static immutable string name = "x";
extern (C) void callback(int, const(char)* text);
"#;
    let result = parse_ok(source);
    assert_eq!(decl_names(&result), vec!["twice", "name", "callback"]);
    let Item::Decl(callback) = &result.module.items[2] else {
        panic!("expected declaration");
    };
    let DeclKind::Function { params, body, .. } = &callback.kind else {
        panic!("expected function");
    };
    assert_eq!(params.len(), 2);
    assert!(body.is_none());
}

#[test]
fn test_declaration_locations() {
    let result = parse_ok("int a;\n\nvoid run() {\n}\n");
    let Item::Decl(run) = &result.module.items[1] else {
        panic!("expected declaration");
    };
    assert_eq!(run.name.start, CodeLocation::new(3, 6));
    assert_eq!(run.start, CodeLocation::new(3, 1));
    assert_eq!(run.end, CodeLocation::new(4, 2));
}

// ============================================================================
// Error Recovery
// ============================================================================

#[test]
fn test_missing_semicolon_is_reported_once() {
    let result = parse("int a\nint b;");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].location, CodeLocation::new(2, 1));
}

#[test]
fn test_errors_in_several_functions() {
    let source = "void a() { x = ; }\nvoid b() { y(; }\nvoid c() {}";
    let result = parse(source);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].location.line, 1);
    assert_eq!(result.errors[1].location.line, 2);
    assert_eq!(decl_names(&result), vec!["a", "b", "c"]);
}

#[test]
fn test_unterminated_comment() {
    let result = parse("int x; /* never closed");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message(), "unterminated comment");
}

#[test]
fn test_unterminated_string() {
    let result = parse("string s = \"open;");
    assert!(result
        .errors
        .iter()
        .any(|e| e.message() == "unterminated string literal"));
}

// ============================================================================
// Modules and Tasks
// ============================================================================

#[test]
fn test_parsed_module_collects_everything() {
    let source = "module m;\n// TODO: split\nbool f(int[string] aa) { return \"k\" in aa; }";
    let module = ParsedModule::parse("m.d", source, &["TODO".to_string()]);
    assert_eq!(module.name, "m");
    assert!(module.errors.is_empty(), "{:?}", module.errors);
    assert_eq!(module.tasks.len(), 1);
    assert_eq!(module.tasks[0].location, CodeLocation::new(2, 4));
    assert_eq!(
        module.binary_is_in_locations(),
        vec![CodeLocation::new(3, 37)]
    );
}

// ============================================================================
// Robustness
// ============================================================================

#[test]
fn test_deep_nesting_of_every_kind_is_reported() {
    let depth = 100_000;
    let cases = [
        format!("int x = {}1{};", "[".repeat(depth), "]".repeat(depth)),
        format!("{} int x; {}", "struct S { ".repeat(depth), "}".repeat(depth)),
        format!("void f() {{ {}g(); }}", "if (a) ".repeat(depth)),
        format!("int x = a{};", ".b".repeat(depth)),
        format!("alias T = {}int{};", "const(".repeat(depth), ")".repeat(depth)),
    ];
    for source in &cases {
        let module = ParsedModule::parse("deep.d", source, &[]);
        assert!(
            module
                .errors
                .iter()
                .any(|e| e.kind == ParseErrorKind::NestingTooDeep),
            "{:?}",
            module.errors.first()
        );
    }
}

proptest! {
    #[test]
    fn prop_parse_never_panics(source in "\\PC{0,200}") {
        let module = ParsedModule::parse("fuzz.d", &source, &["TODO".to_string()]);
        let lines = source.split('\n').count() as u32;
        for error in &module.errors {
            prop_assert!(error.location.line <= lines);
            prop_assert!(!error.message().contains('\n'));
        }
    }

    #[test]
    fn prop_d_like_tokens_never_panic(
        words in prop::collection::vec(
            prop::sample::select(vec![
                "int", "x", "(", ")", "{", "}", ";", "=", "!", "is", "in",
                "class", "version", "import", ".", ",", "[", "]", "1", "auto",
            ]),
            0..60,
        )
    ) {
        let source = words.join(" ");
        let _ = ParsedModule::parse("fuzz.d", &source, &[]);
    }
}
