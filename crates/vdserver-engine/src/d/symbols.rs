//! Symbols: named things a D identifier can refer to.

use crate::IdentifierKind;
use vdserver_parser::ast::{
    AggregateKind, Decl, DeclKind, EnumMember, Expr, ExprKind, Ident, Import, Literal, Param,
    TypeRef,
};
use vdserver_parser::{CodeLocation, ParsedModule};

/// Where a declaration lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Module,
    Aggregate,
    Function,
}

/// The syntax node a symbol was created from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Origin<'a> {
    Decl(&'a Decl),
    Param(&'a Param),
    LoopVar {
        var: &'a Param,
        aggregate: &'a Expr,
    },
    EnumMember {
        member: &'a EnumMember,
        parent: &'a Decl,
    },
    Module,
    ImportAlias(&'a Import),
}

/// A declared name together with its declaring module.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Symbol<'a> {
    pub name: &'a str,
    pub start: CodeLocation,
    pub end: CodeLocation,
    pub origin: Origin<'a>,
    pub scope: Scope,
    pub parent: Option<&'a Decl>,
    pub module: &'a ParsedModule,
}

impl<'a> Symbol<'a> {
    fn at(
        ident: &'a Ident,
        origin: Origin<'a>,
        scope: Scope,
        parent: Option<&'a Decl>,
        module: &'a ParsedModule,
    ) -> Self {
        Self {
            name: &ident.name,
            start: ident.start,
            end: ident.end,
            origin,
            scope,
            parent,
            module,
        }
    }

    pub fn of_decl(
        decl: &'a Decl,
        scope: Scope,
        parent: Option<&'a Decl>,
        module: &'a ParsedModule,
    ) -> Self {
        Self::at(&decl.name, Origin::Decl(decl), scope, parent, module)
    }

    pub fn of_param(param: &'a Param, module: &'a ParsedModule) -> Option<Self> {
        let name = param.name.as_ref()?;
        Some(Self::at(name, Origin::Param(param), Scope::Function, None, module))
    }

    pub fn of_loop_var(
        var: &'a Param,
        aggregate: &'a Expr,
        module: &'a ParsedModule,
    ) -> Option<Self> {
        let name = var.name.as_ref()?;
        let origin = Origin::LoopVar { var, aggregate };
        Some(Self::at(name, origin, Scope::Function, None, module))
    }

    pub fn of_enum_member(
        member: &'a EnumMember,
        parent: &'a Decl,
        scope: Scope,
        module: &'a ParsedModule,
    ) -> Self {
        Self::at(
            &member.name,
            Origin::EnumMember { member, parent },
            scope,
            Some(parent),
            module,
        )
    }

    pub fn of_module(module: &'a ParsedModule) -> Self {
        let (start, end) = match module.ast.header.as_deref() {
            Some([first, .., last]) => (first.start, last.end),
            Some([only]) => (only.start, only.end),
            _ => (CodeLocation::new(1, 1), CodeLocation::new(1, 1)),
        };
        Self {
            name: &module.name,
            start,
            end,
            origin: Origin::Module,
            scope: Scope::Module,
            parent: None,
            module,
        }
    }

    pub fn of_import_alias(
        import: &'a Import,
        alias: &'a Ident,
        scope: Scope,
        module: &'a ParsedModule,
    ) -> Self {
        Self::at(alias, Origin::ImportAlias(import), scope, None, module)
    }

    /// Returns true if both symbols denote the same declaration.
    pub fn is_same(&self, other: &Symbol<'_>) -> bool {
        self.name == other.name
            && self.start == other.start
            && self.module.path == other.module.path
    }

    pub fn kind(&self) -> IdentifierKind {
        match self.origin {
            Origin::Module | Origin::ImportAlias(_) => IdentifierKind::Module,
            Origin::Param(_) => IdentifierKind::ParameterVariable,
            Origin::LoopVar { .. } => IdentifierKind::LocalVariable,
            Origin::EnumMember { .. } => IdentifierKind::EnumValue,
            Origin::Decl(decl) => match &decl.kind {
                DeclKind::Aggregate { kind, .. } => match kind {
                    AggregateKind::Struct => IdentifierKind::Struct,
                    AggregateKind::Class => IdentifierKind::Class,
                    AggregateKind::Interface => IdentifierKind::Interface,
                    AggregateKind::Union => IdentifierKind::Union,
                },
                DeclKind::Enum { .. } => IdentifierKind::Enum,
                DeclKind::Alias { .. } => IdentifierKind::Alias,
                DeclKind::Function { .. } if self.scope == Scope::Aggregate => {
                    IdentifierKind::Method
                }
                DeclKind::Function { .. } => IdentifierKind::Function,
                DeclKind::Variable { .. } => variable_kind(decl, self.scope),
            },
        }
    }

    /// The name qualified by module and enclosing aggregate.
    pub fn qualified_name(&self) -> String {
        if self.scope == Scope::Function {
            return self.name.to_string();
        }
        let mut parts = vec![self.module.name.as_str()];
        if let Some(parent) = self.parent {
            parts.push(&parent.name.name);
        }
        parts.push(self.name);
        parts.retain(|part| !part.is_empty());
        parts.join(".")
    }

    /// Hover text.
    pub fn describe(&self) -> String {
        match self.origin {
            Origin::Module => format!("module {}", self.module.name),
            Origin::ImportAlias(import) => {
                format!("import {} = {}", self.name, import.module_name())
            }
            Origin::Param(param) | Origin::LoopVar { var: param, .. } => {
                join_words(&param.attributes, Some(&param.ty), self.name)
            }
            Origin::EnumMember { member, .. } => {
                let name = self.qualified_name();
                match member.value.as_ref().and_then(literal_text) {
                    Some(value) => format!("enum member {name} = {value}"),
                    None => format!("enum member {name}"),
                }
            }
            Origin::Decl(decl) => describe_decl(decl, &self.qualified_name()),
        }
    }
}

fn literal_text(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Literal(Literal::Number(text) | Literal::String(text) | Literal::Char(text)) => {
            Some(text.clone())
        }
        ExprKind::Literal(Literal::Bool(value)) => Some(value.to_string()),
        ExprKind::Unary { op: "-", operand } => {
            literal_text(operand).map(|text| format!("-{text}"))
        }
        _ => None,
    }
}

fn variable_kind(decl: &Decl, scope: Scope) -> IdentifierKind {
    let has = |attr: &str| decl.attributes.iter().any(|a| a == attr);
    if has("enum") || (scope != Scope::Function && has("immutable")) {
        return IdentifierKind::Constant;
    }
    match scope {
        Scope::Function => IdentifierKind::LocalVariable,
        Scope::Aggregate => IdentifierKind::MemberVariable,
        Scope::Module if has("__gshared") => IdentifierKind::GSharedVariable,
        Scope::Module if has("shared") => IdentifierKind::SharedVariable,
        Scope::Module => IdentifierKind::TlsVariable,
    }
}

fn describe_decl(decl: &Decl, qualified: &str) -> String {
    match &decl.kind {
        DeclKind::Variable { ty, .. } => join_words(&decl.attributes, Some(ty), qualified),
        DeclKind::Function {
            return_type,
            params,
            ..
        } => {
            let params: Vec<String> = params
                .iter()
                .map(|param| match &param.name {
                    Some(name) => join_words(&param.attributes, Some(&param.ty), &name.name),
                    None => join_words(&param.attributes, None, &param.ty.to_string()),
                })
                .collect();
            let is_constructor = matches!(decl.name.name.as_str(), "this" | "~this");
            let ty = (!is_constructor).then_some(return_type);
            format!(
                "{}({})",
                join_words(&decl.attributes, ty, qualified),
                params.join(", ")
            )
        }
        DeclKind::Aggregate { kind, bases, .. } => {
            let mut text = format!("{} {qualified}", kind.keyword());
            if !bases.is_empty() {
                let bases: Vec<String> = bases.iter().map(ToString::to_string).collect();
                text.push_str(" : ");
                text.push_str(&bases.join(", "));
            }
            text
        }
        DeclKind::Enum { base, .. } => match base {
            Some(base) => format!("enum {qualified} : {base}"),
            None => format!("enum {qualified}"),
        },
        DeclKind::Alias { target } => format!("alias {qualified} = {target}"),
    }
}

/// `attributes type name`, leaving out `auto` when other words say enough.
fn join_words(attributes: &[String], ty: Option<&TypeRef>, name: &str) -> String {
    let mut words: Vec<String> = attributes
        .iter()
        .filter(|attr| attr.as_str() != "auto")
        .cloned()
        .collect();
    match ty {
        Some(TypeRef::Auto) if words.is_empty() => words.push("auto".to_string()),
        Some(TypeRef::Auto) | None => {}
        Some(ty) => words.push(ty.to_string()),
    }
    words.push(name.to_string());
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdserver_parser::ast::Item;

    fn decls(module: &ParsedModule) -> Vec<&Decl> {
        module
            .ast
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Decl(decl) => Some(decl),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_describe_declarations() {
        let module = ParsedModule::parse(
            "geo.d",
            "module geo;\nclass Circle : Shape {}\nstatic immutable string name = \"x\";\nauto twice(int value) { return value; }\nalias Shapes = Shape[];\nenum Kind : ubyte { a }",
            &[],
        );
        let described: Vec<String> = decls(&module)
            .into_iter()
            .map(|decl| Symbol::of_decl(decl, Scope::Module, None, &module).describe())
            .collect();
        assert_eq!(
            described,
            vec![
                "class geo.Circle : Shape",
                "static immutable string geo.name",
                "auto geo.twice(int value)",
                "alias geo.Shapes = Shape[]",
                "enum geo.Kind : ubyte",
            ]
        );
    }

    #[test]
    fn test_constructor_has_no_return_type() {
        let module = ParsedModule::parse("p.d", "struct P { this(int x) {} }", &[]);
        let outer = decls(&module)[0];
        let Item::Decl(ctor) = &outer.members()[0] else {
            panic!("expected constructor");
        };
        let symbol = Symbol::of_decl(ctor, Scope::Aggregate, Some(outer), &module);
        assert_eq!(symbol.describe(), "p.P.this(int x)");
        assert_eq!(symbol.kind(), IdentifierKind::Method);
    }

    #[test]
    fn test_variable_kinds() {
        let module = ParsedModule::parse(
            "v.d",
            "int a; shared int b; __gshared int c; enum d = 1; immutable e = 2;",
            &[],
        );
        let kinds: Vec<IdentifierKind> = decls(&module)
            .into_iter()
            .map(|decl| Symbol::of_decl(decl, Scope::Module, None, &module).kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                IdentifierKind::TlsVariable,
                IdentifierKind::SharedVariable,
                IdentifierKind::GSharedVariable,
                IdentifierKind::Constant,
                IdentifierKind::Constant,
            ]
        );
    }

    #[test]
    fn test_enum_member_shows_literal_value() {
        let module = ParsedModule::parse("c.d", "enum Color { red = -1, green = 2, blue }", &[]);
        let color = decls(&module)[0];
        let DeclKind::Enum { members, .. } = &color.kind else {
            panic!("expected enum");
        };
        let described: Vec<String> = members
            .iter()
            .map(|member| {
                Symbol::of_enum_member(member, color, Scope::Aggregate, &module).describe()
            })
            .collect();
        assert_eq!(
            described,
            vec![
                "enum member c.Color.red = -1",
                "enum member c.Color.green = 2",
                "enum member c.Color.blue",
            ]
        );
    }

    #[test]
    fn test_module_symbol_spans_header() {
        let module = ParsedModule::parse("x.d", "module app.core;", &[]);
        let symbol = Symbol::of_module(&module);
        assert_eq!(symbol.start, CodeLocation::new(1, 8));
        assert_eq!(symbol.end, CodeLocation::new(1, 16));
        assert_eq!(symbol.describe(), "module app.core");
    }
}
