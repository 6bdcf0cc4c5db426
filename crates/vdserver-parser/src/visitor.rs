//! Syntax tree traversal.
//!
//! Implement [`Visitor`] and override the hooks of interest; the `walk_*`
//! functions provide the default descent so an override can still recurse.
//! Both branches of conditional declarations are visited.
//!
//! The walks recurse once per tree level; trees from the parser are at most
//! [`MAX_NESTING`](crate::MAX_NESTING) levels deep.

use crate::ast::{
    Block, Decl, DeclKind, Expr, ExprKind, Item, Module, Param, Stmt, TypeRef,
};
use crate::CodeLocation;

/// A syntax tree visitor.
pub trait Visitor {
    /// Visit an item.
    fn visit_item(&mut self, item: &Item) {
        walk_item(self, item);
    }

    /// Visit a declaration.
    fn visit_decl(&mut self, decl: &Decl) {
        walk_decl(self, decl);
    }

    /// Visit a statement.
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    /// Visit an expression.
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    /// Visit a type reference.
    fn visit_type(&mut self, ty: &TypeRef) {
        walk_type(self, ty);
    }
}

/// Visit every top-level item.
pub fn walk_module<V: Visitor + ?Sized>(visitor: &mut V, module: &Module) {
    for item in &module.items {
        visitor.visit_item(item);
    }
}

/// Default descent into an item.
pub fn walk_item<V: Visitor + ?Sized>(visitor: &mut V, item: &Item) {
    match item {
        Item::Import(_) => {}
        Item::Decl(decl) => visitor.visit_decl(decl),
        Item::Conditional(cond) => {
            for item in cond.then_items.iter().chain(&cond.else_items) {
                visitor.visit_item(item);
            }
        }
        Item::Unittest(block) => walk_block(visitor, block),
    }
}

/// Default descent into a declaration.
pub fn walk_decl<V: Visitor + ?Sized>(visitor: &mut V, decl: &Decl) {
    match &decl.kind {
        DeclKind::Variable { ty, init } => {
            visitor.visit_type(ty);
            if let Some(init) = init {
                visitor.visit_expr(init);
            }
        }
        DeclKind::Function {
            return_type,
            params,
            body,
        } => {
            visitor.visit_type(return_type);
            walk_params(visitor, params);
            if let Some(body) = body {
                walk_block(visitor, body);
            }
        }
        DeclKind::Aggregate { bases, members, .. } => {
            for base in bases {
                visitor.visit_type(base);
            }
            for member in members {
                visitor.visit_item(member);
            }
        }
        DeclKind::Enum { base, members } => {
            if let Some(base) = base {
                visitor.visit_type(base);
            }
            for value in members.iter().filter_map(|m| m.value.as_ref()) {
                visitor.visit_expr(value);
            }
        }
        DeclKind::Alias { target } => visitor.visit_type(target),
    }
}

fn walk_params<V: Visitor + ?Sized>(visitor: &mut V, params: &[Param]) {
    for param in params {
        visitor.visit_type(&param.ty);
        if let Some(default) = &param.default {
            visitor.visit_expr(default);
        }
    }
}

/// Visit every statement of a block.
pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &Block) {
    for stmt in &block.statements {
        visitor.visit_stmt(stmt);
    }
}

/// Default descent into a statement.
pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Item(item) => visitor.visit_item(item),
        Stmt::Expr(expr) => visitor.visit_expr(expr),
        Stmt::Block(block) => walk_block(visitor, block),
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            visitor.visit_expr(cond);
            visitor.visit_stmt(then);
            if let Some(otherwise) = otherwise {
                visitor.visit_stmt(otherwise);
            }
        }
        Stmt::While { cond, body } => {
            visitor.visit_expr(cond);
            visitor.visit_stmt(body);
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(cond) = cond {
                visitor.visit_expr(cond);
            }
            if let Some(step) = step {
                visitor.visit_expr(step);
            }
            visitor.visit_stmt(body);
        }
        Stmt::Foreach {
            vars,
            aggregate,
            body,
        } => {
            walk_params(visitor, vars);
            visitor.visit_expr(aggregate);
            visitor.visit_stmt(body);
        }
        Stmt::Switch { cond, body } => {
            visitor.visit_expr(cond);
            walk_block(visitor, body);
        }
        Stmt::Case(values) => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        Stmt::Return(Some(expr)) => visitor.visit_expr(expr),
        Stmt::Return(None)
        | Stmt::Default
        | Stmt::Break
        | Stmt::Continue
        | Stmt::Empty => {}
    }
}

/// Default descent into an expression.
pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Ident(_)
        | ExprKind::ModuleScope(_)
        | ExprKind::Literal(_)
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::Dollar
        | ExprKind::IsType => {}
        ExprKind::Type(ty) => visitor.visit_type(ty),
        ExprKind::Member { object, .. } => visitor.visit_expr(object),
        ExprKind::Call { callee: object, args } | ExprKind::Index { object, args } => {
            visitor.visit_expr(object);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Binary { lhs, rhs, .. }
        | ExprKind::Assign { lhs, rhs, .. }
        | ExprKind::Range { lo: lhs, hi: rhs } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            visitor.visit_expr(cond);
            visitor.visit_expr(then);
            visitor.visit_expr(otherwise);
        }
        ExprKind::New { ty, args } => {
            visitor.visit_type(ty);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Cast { ty, operand } => {
            visitor.visit_type(ty);
            visitor.visit_expr(operand);
        }
        ExprKind::ArrayLiteral(elements) => {
            for element in elements {
                visitor.visit_expr(element);
            }
        }
    }
}

/// Default descent into a type reference.
pub fn walk_type<V: Visitor + ?Sized>(visitor: &mut V, ty: &TypeRef) {
    match ty {
        TypeRef::Named { args, .. } => {
            for arg in args {
                visitor.visit_type(arg);
            }
        }
        TypeRef::Pointer(inner) | TypeRef::Array(inner) | TypeRef::Qualified(_, inner) => {
            visitor.visit_type(inner);
        }
        TypeRef::Basic(_) | TypeRef::Auto => {}
    }
}

/// Collects the operator locations of `is`, `!is`, `in` and `!in`.
#[derive(Debug, Default)]
pub struct BinaryIsInCollector {
    /// Operator locations in traversal order.
    pub locations: Vec<CodeLocation>,
}

impl Visitor for BinaryIsInCollector {
    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::Binary {
            op, op_location, ..
        } = &expr.kind
        {
            if op.is_identity_or_membership() {
                self.locations.push(*op_location);
            }
        }
        walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_collects_identity_and_membership_operators() {
        let source = "void f() {\n  if (a is b) {}\n  auto c = k in map;\n  bool d = x !in y && p !is q;\n}";
        let output = parse(source);
        assert!(output.errors.is_empty(), "{:?}", output.errors);

        let mut collector = BinaryIsInCollector::default();
        walk_module(&mut collector, &output.module);
        assert_eq!(
            collector.locations,
            vec![
                CodeLocation::new(2, 9),
                CodeLocation::new(3, 14),
                CodeLocation::new(4, 14),
                CodeLocation::new(4, 25),
            ]
        );
    }

    #[test]
    fn test_ignores_other_operators() {
        let output = parse("int x = 1 + 2 * 3 == 7;");
        let mut collector = BinaryIsInCollector::default();
        walk_module(&mut collector, &output.module);
        assert!(collector.locations.is_empty());
    }

    #[test]
    fn test_walks_tree_at_nesting_limit() {
        let source = format!("bool b = x{};", " is x".repeat(100));
        let output = parse(&source);
        assert!(output.errors.is_empty(), "{:?}", output.errors);

        let mut collector = BinaryIsInCollector::default();
        walk_module(&mut collector, &output.module);
        assert_eq!(collector.locations.len(), 100);
    }

    #[test]
    fn test_visits_conditional_branches() {
        let output = parse("version (A) { bool a = x is y; } else { bool b = x in y; }");
        let mut collector = BinaryIsInCollector::default();
        walk_module(&mut collector, &output.module);
        assert_eq!(collector.locations.len(), 2);
    }
}
