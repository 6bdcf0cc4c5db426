//! Name resolution over a module snapshot.
//!
//! [`World::locate`] walks one module down to a location, tracking the
//! lexical scopes on the way, and reports what sits under the cursor as a
//! [`Target`]. [`World::resolve`] turns a target into the [`Symbol`] it
//! names. Lookup goes innermost scope first, then the module's own
//! declarations, then its imports. Conditional declarations are filtered by
//! the configured environment.

use super::symbols::{Origin, Scope, Symbol};
use crate::{Environment, ModuleSnapshot};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use vdserver_parser::ast::{
    Block, Decl, DeclKind, Expr, ExprKind, Ident, Import, Item, Param, Stmt, TypeRef,
};
use vdserver_parser::{CodeLocation, ParsedModule};

/// Bound on alias chains, base classes and inferred types.
const MAX_DEPTH: usize = 16;

/// What the cursor is on.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target<'a> {
    /// The declared name of a declaration.
    Declared(Symbol<'a>),
    /// A plain name in an expression.
    Name(&'a Ident),
    /// `.name`
    ModuleScoped(&'a Ident),
    /// The member part of `object.member`.
    Member {
        object: &'a Expr,
        member: &'a Ident,
    },
    /// One component of a dotted type.
    TypePath { path: &'a [Ident], index: usize },
    /// The module path of an import.
    ImportPath(&'a Import),
    /// A name listed in a selective import.
    ImportedSymbol { import: &'a Import, name: &'a Ident },
}

impl Target<'_> {
    /// Extent of the identifier under the cursor.
    pub fn span(&self) -> (CodeLocation, CodeLocation) {
        match self {
            Self::Declared(symbol) => (symbol.start, symbol.end),
            Self::Name(ident)
            | Self::ModuleScoped(ident)
            | Self::Member { member: ident, .. }
            | Self::ImportedSymbol { name: ident, .. } => (ident.start, ident.end),
            Self::TypePath { path, index } => path
                .get(*index)
                .map_or((CodeLocation::EMPTY, CodeLocation::EMPTY), |ident| {
                    (ident.start, ident.end)
                }),
            Self::ImportPath(import) => match import.path.as_slice() {
                [first, .., last] => (first.start, last.end),
                [only] => (only.start, only.end),
                [] => (CodeLocation::EMPTY, CodeLocation::EMPTY),
            },
        }
    }
}

/// Names visible at some point of a module.
#[derive(Debug, Clone)]
pub(crate) struct Context<'a> {
    pub module: &'a ParsedModule,
    scopes: Vec<Vec<Symbol<'a>>>,
    aggregates: Vec<&'a Decl>,
}

impl<'a> Context<'a> {
    pub fn module_level(module: &'a ParsedModule) -> Self {
        Self {
            module,
            scopes: Vec::new(),
            aggregates: Vec::new(),
        }
    }

    pub fn lookup(&self, world: &World<'a>, name: &str) -> Option<Symbol<'a>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| find_last(scope, name))
            .or_else(|| world.lookup_in_module(self.module, name))
    }

    /// The innermost enclosing aggregate.
    pub fn this_symbol(&self) -> Option<Symbol<'a>> {
        self.aggregates
            .last()
            .copied()
            .map(|decl| Symbol::of_decl(decl, Scope::Module, None, self.module))
    }

    /// The first base of the innermost enclosing aggregate.
    pub fn super_symbol(&self, world: &World<'a>, depth: usize) -> Option<Symbol<'a>> {
        let decl: &'a Decl = self.aggregates.last().copied()?;
        let DeclKind::Aggregate { bases, .. } = &decl.kind else {
            return None;
        };
        world.resolve_type(bases.first()?, self, depth)
    }

    /// Every visible symbol, innermost first.
    pub fn visible(&self, world: &World<'a>) -> Vec<Symbol<'a>> {
        let mut symbols: Vec<Symbol<'a>> = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev().copied())
            .collect();
        symbols.extend(world.module_symbols(self.module).iter().copied());
        for import in world.imports(self.module) {
            symbols.extend(world.imported(import));
        }
        symbols
    }
}

/// The result of [`World::locate`].
#[derive(Debug)]
pub(crate) struct Located<'a> {
    pub target: Option<Target<'a>>,
    pub context: Context<'a>,
}

/// Resolution state for one query.
pub(crate) struct World<'a> {
    environment: &'a Environment,
    snapshot: &'a ModuleSnapshot,
    symbols: RefCell<HashMap<&'a str, Rc<Vec<Symbol<'a>>>>>,
}

impl<'a> World<'a> {
    pub fn new(environment: &'a Environment, snapshot: &'a ModuleSnapshot) -> Self {
        Self {
            environment,
            snapshot,
            symbols: RefCell::new(HashMap::new()),
        }
    }

    pub fn primary(&self) -> &'a ParsedModule {
        let snapshot: &'a ModuleSnapshot = self.snapshot;
        &snapshot.primary
    }

    pub fn module_named(&self, name: &str) -> Option<&'a ParsedModule> {
        let snapshot: &'a ModuleSnapshot = self.snapshot;
        snapshot.module_named(name)
    }

    fn active_items(&self, items: &'a [Item]) -> Vec<&'a Item> {
        let mut active = Vec::new();
        self.collect_active(items, &mut active);
        active
    }

    fn collect_active(&self, items: &'a [Item], out: &mut Vec<&'a Item>) {
        for item in items {
            match item {
                Item::Conditional(conditional) => {
                    let branch = if self.environment.is_active(&conditional.condition) {
                        &conditional.then_items
                    } else {
                        &conditional.else_items
                    };
                    self.collect_active(branch, out);
                }
                _ => out.push(item),
            }
        }
    }

    fn declare(
        decl: &'a Decl,
        scope: Scope,
        parent: Option<&'a Decl>,
        module: &'a ParsedModule,
        out: &mut Vec<Symbol<'a>>,
    ) {
        match &decl.kind {
            DeclKind::Enum { members, .. } if decl.is_anonymous() => out.extend(
                members
                    .iter()
                    .map(|member| Symbol::of_enum_member(member, decl, scope, module)),
            ),
            _ => out.push(Symbol::of_decl(decl, scope, parent, module)),
        }
    }

    fn declared_in(
        &self,
        items: &'a [Item],
        scope: Scope,
        parent: Option<&'a Decl>,
        module: &'a ParsedModule,
    ) -> Vec<Symbol<'a>> {
        let mut symbols = Vec::new();
        for item in self.active_items(items) {
            match item {
                Item::Decl(decl) => Self::declare(decl, scope, parent, module, &mut symbols),
                Item::Import(import) => {
                    if let Some(alias) = &import.alias {
                        symbols.push(Symbol::of_import_alias(import, alias, scope, module));
                    }
                }
                Item::Conditional(_) | Item::Unittest(_) => {}
            }
        }
        symbols
    }

    /// Top-level declarations of `module`.
    pub fn module_symbols(&self, module: &'a ParsedModule) -> Rc<Vec<Symbol<'a>>> {
        if let Some(symbols) = self.symbols.borrow().get(module.path.as_str()) {
            return Rc::clone(symbols);
        }
        let symbols = Rc::new(self.declared_in(&module.ast.items, Scope::Module, None, module));
        self.symbols
            .borrow_mut()
            .insert(module.path.as_str(), Rc::clone(&symbols));
        symbols
    }

    fn imports(&self, module: &'a ParsedModule) -> Vec<&'a Import> {
        self.active_items(&module.ast.items)
            .into_iter()
            .filter_map(|item| match item {
                Item::Import(import) => Some(import),
                _ => None,
            })
            .collect()
    }

    /// Symbols an unaliased import brings into scope.
    fn imported(&self, import: &'a Import) -> Vec<Symbol<'a>> {
        if import.alias.is_some() {
            return Vec::new();
        }
        let Some(target) = self.module_named(&import.module_name()) else {
            return Vec::new();
        };
        self.module_symbols(target)
            .iter()
            .filter(|symbol| {
                import.symbols.is_empty()
                    || import.symbols.iter().any(|name| name.name == symbol.name)
            })
            .copied()
            .collect()
    }

    pub fn lookup_in_module(&self, module: &'a ParsedModule, name: &str) -> Option<Symbol<'a>> {
        if let Some(symbol) = find_last(&self.module_symbols(module), name) {
            return Some(symbol);
        }
        self.imports(module)
            .into_iter()
            .find_map(|import| find_last(&self.imported(import), name))
    }

    /// Members reachable through `container`, inherited ones first.
    pub fn members(&self, container: &Symbol<'a>, depth: usize) -> Vec<Symbol<'a>> {
        if depth > MAX_DEPTH {
            return Vec::new();
        }
        match container.origin {
            Origin::Module => self.module_symbols(container.module).to_vec(),
            Origin::ImportAlias(import) => self
                .module_named(&import.module_name())
                .map(|module| self.module_symbols(module).to_vec())
                .unwrap_or_default(),
            Origin::Decl(decl) => match &decl.kind {
                DeclKind::Aggregate { bases, members, .. } => {
                    let mut symbols = Vec::new();
                    let bases = bases
                        .iter()
                        .filter_map(|base| self.resolve_type_in(base, container.module, depth + 1));
                    for base in bases {
                        symbols.extend(self.members(&base, depth + 1));
                    }
                    symbols.extend(self.declared_in(
                        members,
                        Scope::Aggregate,
                        Some(decl),
                        container.module,
                    ));
                    symbols
                }
                DeclKind::Enum { members, .. } => members
                    .iter()
                    .map(|member| {
                        Symbol::of_enum_member(member, decl, Scope::Aggregate, container.module)
                    })
                    .collect(),
                DeclKind::Variable { .. } | DeclKind::Function { .. } | DeclKind::Alias { .. } => {
                    self.members_of_type(container, depth)
                }
            },
            Origin::Param(_) | Origin::LoopVar { .. } | Origin::EnumMember { .. } => {
                self.members_of_type(container, depth)
            }
        }
    }

    fn members_of_type(&self, symbol: &Symbol<'a>, depth: usize) -> Vec<Symbol<'a>> {
        let context = Context::module_level(symbol.module);
        self.type_of_symbol(symbol, &context, depth + 1)
            .filter(|ty| !ty.is_same(symbol))
            .map(|ty| self.members(&ty, depth + 1))
            .unwrap_or_default()
    }

    pub fn find_member(&self, container: &Symbol<'a>, name: &str) -> Option<Symbol<'a>> {
        find_last(&self.members(container, 0), name)
    }

    fn resolve_type_in(
        &self,
        ty: &'a TypeRef,
        module: &'a ParsedModule,
        depth: usize,
    ) -> Option<Symbol<'a>> {
        self.resolve_type(ty, &Context::module_level(module), depth)
    }

    /// The declaration a type refers to, looking through aliases.
    pub fn resolve_type(
        &self,
        ty: &'a TypeRef,
        context: &Context<'a>,
        depth: usize,
    ) -> Option<Symbol<'a>> {
        if depth > MAX_DEPTH {
            return None;
        }
        let (first, rest) = ty.named_root()?.split_first()?;
        let mut symbol = context.lookup(self, &first.name)?;
        for ident in rest {
            symbol = find_last(&self.members(&symbol, depth + 1), &ident.name)?;
        }
        match symbol.origin {
            Origin::Decl(Decl {
                kind: DeclKind::Alias { target },
                ..
            }) => self
                .resolve_type_in(target, symbol.module, depth + 1)
                .or(Some(symbol)),
            _ => Some(symbol),
        }
    }

    /// The aggregate, enum or module an expression evaluates to.
    pub fn type_of(
        &self,
        expr: &'a Expr,
        context: &Context<'a>,
        depth: usize,
    ) -> Option<Symbol<'a>> {
        if depth > MAX_DEPTH {
            return None;
        }
        match &expr.kind {
            ExprKind::Ident(ident) => {
                let symbol = context.lookup(self, &ident.name)?;
                self.type_of_symbol(&symbol, context, depth + 1)
            }
            ExprKind::ModuleScope(ident) => {
                let symbol = self.lookup_in_module(context.module, &ident.name)?;
                self.type_of_symbol(&symbol, context, depth + 1)
            }
            ExprKind::This => context.this_symbol(),
            ExprKind::Super => context.super_symbol(self, depth + 1),
            ExprKind::Member { object, member } => {
                let container = self.type_of(object, context, depth + 1)?;
                let member = find_last(&self.members(&container, depth + 1), &member.name)?;
                self.type_of_symbol(&member, context, depth + 1)
            }
            ExprKind::Call { callee: object, .. }
            | ExprKind::Index { object, .. }
            | ExprKind::Unary {
                operand: object, ..
            }
            | ExprKind::Conditional { then: object, .. } => {
                self.type_of(object, context, depth + 1)
            }
            ExprKind::New { ty, .. } | ExprKind::Cast { ty, .. } => {
                self.resolve_type(ty, context, depth + 1)
            }
            _ => None,
        }
    }

    /// The type a symbol's values have; types are their own type.
    pub fn type_of_symbol(
        &self,
        symbol: &Symbol<'a>,
        context: &Context<'a>,
        depth: usize,
    ) -> Option<Symbol<'a>> {
        if depth > MAX_DEPTH {
            return None;
        }
        let same_module = symbol.module.path == context.module.path;
        let home = Context::module_level(symbol.module);
        let context = if same_module { context } else { &home };
        let resolve = |ty: &'a TypeRef| self.resolve_type(ty, context, depth + 1);

        match symbol.origin {
            Origin::Module | Origin::ImportAlias(_) => Some(*symbol),
            Origin::EnumMember { parent, .. } => {
                Some(Symbol::of_decl(parent, Scope::Module, None, symbol.module))
            }
            Origin::Param(param) => resolve(&param.ty),
            Origin::LoopVar { var, aggregate } => match var.ty {
                TypeRef::Auto => self.type_of(aggregate, context, depth + 1),
                _ => resolve(&var.ty),
            },
            Origin::Decl(decl) => match &decl.kind {
                DeclKind::Aggregate { .. } | DeclKind::Enum { .. } => Some(*symbol),
                DeclKind::Alias { target } => resolve(target).or(Some(*symbol)),
                DeclKind::Function { return_type, .. } => resolve(return_type),
                DeclKind::Variable {
                    ty: TypeRef::Auto,
                    init: Some(init),
                } => self.type_of(init, context, depth + 1),
                DeclKind::Variable { ty, .. } => resolve(ty),
            },
        }
    }

    /// Find what is under `location` in `module`.
    pub fn locate(&self, module: &'a ParsedModule, location: CodeLocation) -> Located<'a> {
        let mut locator = Locator {
            world: self,
            module,
            location,
            scopes: Vec::new(),
            aggregates: Vec::new(),
            captured: None,
        };
        let target = locator.items(&module.ast.items, Scope::Module, None);
        let (scopes, aggregates) = match (target.is_some(), locator.captured) {
            (false, Some(captured)) => captured,
            _ => (locator.scopes, locator.aggregates),
        };
        Located {
            target,
            context: Context {
                module,
                scopes,
                aggregates,
            },
        }
    }

    /// The symbol a target names.
    pub fn resolve(&self, target: &Target<'a>, context: &Context<'a>) -> Option<Symbol<'a>> {
        match *target {
            Target::Declared(symbol) => Some(symbol),
            Target::Name(ident) => context.lookup(self, &ident.name),
            Target::ModuleScoped(ident) => self.lookup_in_module(context.module, &ident.name),
            Target::Member { object, member } => {
                let container = self.type_of(object, context, 0)?;
                self.find_member(&container, &member.name)
            }
            Target::TypePath { path, index } => {
                let (first, rest) = path.split_first()?;
                let mut symbol = context.lookup(self, &first.name)?;
                for ident in rest.iter().take(index) {
                    symbol = self.find_member(&symbol, &ident.name)?;
                }
                Some(symbol)
            }
            Target::ImportPath(import) => self
                .module_named(&import.module_name())
                .map(Symbol::of_module),
            Target::ImportedSymbol { import, name } => {
                let module = self.module_named(&import.module_name())?;
                find_last(&self.module_symbols(module), &name.name)
            }
        }
    }

    /// Members of whatever `a.b.c` evaluates to, for member completion.
    pub fn chain_members(&self, chain: &[&str], context: &Context<'a>) -> Vec<Symbol<'a>> {
        self.resolve_chain(chain, context)
            .map(|container| self.members(&container, 0))
            .unwrap_or_default()
    }

    /// What `a.b.c` names: a symbol in scope first, a module otherwise.
    fn resolve_chain(&self, chain: &[&str], context: &Context<'a>) -> Option<Symbol<'a>> {
        let (first, rest) = chain.split_first()?;
        let symbol = match *first {
            "this" => context.this_symbol(),
            "super" => context.super_symbol(self, 0),
            name => context.lookup(self, name),
        };
        let Some(symbol) = symbol else {
            return self
                .module_named(&chain.join("."))
                .map(Symbol::of_module);
        };
        let mut container = self.type_of_symbol(&symbol, context, 0)?;
        for name in rest {
            let member = self.find_member(&container, name)?;
            container = self.type_of_symbol(&member, context, 0)?;
        }
        Some(container)
    }
}

fn find_last<'a>(symbols: &[Symbol<'a>], name: &str) -> Option<Symbol<'a>> {
    symbols.iter().rev().find(|symbol| symbol.name == name).copied()
}

/// Where a statement begins, for skipping statements after the cursor.
fn stmt_start(stmt: &Stmt) -> Option<CodeLocation> {
    match stmt {
        Stmt::Item(Item::Decl(decl)) => Some(decl.start),
        Stmt::Item(Item::Unittest(block)) | Stmt::Block(block) => Some(block.start),
        Stmt::Expr(expr) | Stmt::Return(Some(expr)) | Stmt::If { cond: expr, .. } => {
            Some(expr.start)
        }
        Stmt::While { cond, body } => {
            Some(stmt_start(body).map_or(cond.start, |body| body.min(cond.start)))
        }
        Stmt::Switch { cond, .. } => Some(cond.start),
        Stmt::For { start, .. } => Some(*start),
        Stmt::Foreach { vars, aggregate, .. } => Some(
            vars.iter()
                .find_map(|var| var.name.as_ref())
                .map_or(aggregate.start, |name| name.start),
        ),
        Stmt::Case(values) => values.first().map(|value| value.start),
        _ => None,
    }
}

/// Walks one module towards a location.
struct Locator<'w, 'a> {
    world: &'w World<'a>,
    module: &'a ParsedModule,
    location: CodeLocation,
    scopes: Vec<Vec<Symbol<'a>>>,
    aggregates: Vec<&'a Decl>,
    /// Scopes of the innermost block around the location.
    captured: Option<(Vec<Vec<Symbol<'a>>>, Vec<&'a Decl>)>,
}

impl<'a> Locator<'_, 'a> {
    fn covers(&self, start: CodeLocation, end: CodeLocation) -> bool {
        start <= self.location && self.location <= end
    }

    fn capture(&mut self) {
        if self.captured.is_none() {
            self.captured = Some((self.scopes.clone(), self.aggregates.clone()));
        }
    }

    fn declare_local(&mut self, symbols: impl IntoIterator<Item = Symbol<'a>>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.extend(symbols);
        }
    }

    fn items(
        &mut self,
        items: &'a [Item],
        scope: Scope,
        parent: Option<&'a Decl>,
    ) -> Option<Target<'a>> {
        for item in self.world.active_items(items) {
            let found = match item {
                Item::Import(import) => self.import(import, scope),
                Item::Decl(decl) => self.decl(decl, scope, parent),
                Item::Unittest(block) => self.block(block),
                Item::Conditional(_) => None,
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    fn import(&self, import: &'a Import, scope: Scope) -> Option<Target<'a>> {
        if let Some(alias) = &import.alias {
            if alias.contains(self.location) {
                let symbol = Symbol::of_import_alias(import, alias, scope, self.module);
                return Some(Target::Declared(symbol));
            }
        }
        if import.path.iter().any(|ident| ident.contains(self.location)) {
            return Some(Target::ImportPath(import));
        }
        import
            .symbols
            .iter()
            .find(|name| name.contains(self.location))
            .map(|name| Target::ImportedSymbol { import, name })
    }

    fn decl(
        &mut self,
        decl: &'a Decl,
        scope: Scope,
        parent: Option<&'a Decl>,
    ) -> Option<Target<'a>> {
        if !decl.is_anonymous() && decl.name.contains(self.location) {
            let symbol = Symbol::of_decl(decl, scope, parent, self.module);
            return Some(Target::Declared(symbol));
        }
        if !self.covers(decl.start, decl.end) {
            return None;
        }

        match &decl.kind {
            DeclKind::Variable { ty, init } => self
                .ty(ty)
                .or_else(|| init.as_ref().and_then(|init| self.expr(init))),
            DeclKind::Alias { target } => self.ty(target),
            DeclKind::Enum { base, members } => {
                if let Some(found) = base.as_ref().and_then(|base| self.ty(base)) {
                    return Some(found);
                }
                let member_scope = if decl.is_anonymous() {
                    scope
                } else {
                    Scope::Aggregate
                };
                members.iter().find_map(|member| {
                    if member.name.contains(self.location) {
                        let symbol =
                            Symbol::of_enum_member(member, decl, member_scope, self.module);
                        Some(Target::Declared(symbol))
                    } else {
                        member.value.as_ref().and_then(|value| self.expr(value))
                    }
                })
            }
            DeclKind::Aggregate { bases, members, .. } => {
                if let Some(found) = bases.iter().find_map(|base| self.ty(base)) {
                    return Some(found);
                }
                let symbol = Symbol::of_decl(decl, scope, parent, self.module);
                self.scopes.push(self.world.members(&symbol, 0));
                self.aggregates.push(decl);
                let found = self.items(members, Scope::Aggregate, Some(decl));
                if found.is_none() {
                    self.capture();
                    self.scopes.pop();
                    self.aggregates.pop();
                }
                found
            }
            DeclKind::Function {
                return_type,
                params,
                body,
            } => self.function(return_type, params, body.as_ref()),
        }
    }

    fn function(
        &mut self,
        return_type: &'a TypeRef,
        params: &'a [Param],
        body: Option<&'a Block>,
    ) -> Option<Target<'a>> {
        if let Some(found) = self.ty(return_type) {
            return Some(found);
        }
        let mut symbols = Vec::new();
        for param in params {
            if let Some(symbol) = Symbol::of_param(param, self.module) {
                if param
                    .name
                    .as_ref()
                    .is_some_and(|name| name.contains(self.location))
                {
                    return Some(Target::Declared(symbol));
                }
                symbols.push(symbol);
            }
            let found = self.ty(&param.ty).or_else(|| {
                param
                    .default
                    .as_ref()
                    .and_then(|default| self.expr(default))
            });
            if found.is_some() {
                return found;
            }
        }

        let body = body?;
        self.scopes.push(symbols);
        let found = self.block(body);
        if found.is_none() {
            self.scopes.pop();
        }
        found
    }

    fn block(&mut self, block: &'a Block) -> Option<Target<'a>> {
        if !self.covers(block.start, block.end) {
            return None;
        }
        self.scopes.push(Vec::new());
        for stmt in &block.statements {
            if stmt_start(stmt).is_some_and(|start| start > self.location) {
                break;
            }
            if let Some(found) = self.stmt(stmt) {
                return Some(found);
            }
        }
        self.capture();
        self.scopes.pop();
        None
    }

    fn stmt(&mut self, stmt: &'a Stmt) -> Option<Target<'a>> {
        match stmt {
            Stmt::Item(item) => self.local_item(item),
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => self.expr(expr),
            Stmt::Block(block) => self.block(block),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => self
                .expr(cond)
                .or_else(|| self.stmt(then))
                .or_else(|| otherwise.as_deref().and_then(|otherwise| self.stmt(otherwise))),
            Stmt::While { cond, body } => self.expr(cond).or_else(|| self.stmt(body)),
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                self.scopes.push(Vec::new());
                let found = init
                    .as_deref()
                    .and_then(|init| self.stmt(init))
                    .or_else(|| cond.as_ref().and_then(|cond| self.expr(cond)))
                    .or_else(|| step.as_ref().and_then(|step| self.expr(step)))
                    .or_else(|| self.stmt(body));
                if found.is_none() {
                    self.scopes.pop();
                }
                found
            }
            Stmt::Foreach {
                vars,
                aggregate,
                body,
            } => {
                if let Some(found) = self.expr(aggregate) {
                    return Some(found);
                }
                let mut symbols = Vec::new();
                for var in vars {
                    if let Some(symbol) = Symbol::of_loop_var(var, aggregate, self.module) {
                        if var
                            .name
                            .as_ref()
                            .is_some_and(|name| name.contains(self.location))
                        {
                            return Some(Target::Declared(symbol));
                        }
                        symbols.push(symbol);
                    }
                    if let Some(found) = self.ty(&var.ty) {
                        return Some(found);
                    }
                }
                self.scopes.push(symbols);
                let found = self.stmt(body);
                if found.is_none() {
                    self.scopes.pop();
                }
                found
            }
            Stmt::Switch { cond, body } => self.expr(cond).or_else(|| self.block(body)),
            Stmt::Case(values) => values.iter().find_map(|value| self.expr(value)),
            Stmt::Return(None) | Stmt::Default | Stmt::Break | Stmt::Continue | Stmt::Empty => {
                None
            }
        }
    }

    /// A declaration inside a function body. Its names become visible to
    /// the statements after it.
    fn local_item(&mut self, item: &'a Item) -> Option<Target<'a>> {
        match item {
            Item::Decl(decl) => {
                let found = self.decl(decl, Scope::Function, None);
                if found.is_none() {
                    let mut symbols = Vec::new();
                    World::declare(decl, Scope::Function, None, self.module, &mut symbols);
                    self.declare_local(symbols);
                }
                found
            }
            Item::Import(import) => {
                let found = self.import(import, Scope::Function);
                if found.is_none() {
                    match &import.alias {
                        Some(alias) => self.declare_local([Symbol::of_import_alias(
                            import,
                            alias,
                            Scope::Function,
                            self.module,
                        )]),
                        None => {
                            let symbols = self.world.imported(import);
                            self.declare_local(symbols);
                        }
                    }
                }
                found
            }
            Item::Conditional(conditional) => {
                let branch = if self.world.environment.is_active(&conditional.condition) {
                    &conditional.then_items
                } else {
                    &conditional.else_items
                };
                branch.iter().find_map(|item| self.local_item(item))
            }
            Item::Unittest(block) => self.block(block),
        }
    }

    fn expr(&self, expr: &'a Expr) -> Option<Target<'a>> {
        if !self.covers(expr.start, expr.end) {
            return None;
        }
        match &expr.kind {
            ExprKind::Ident(ident) => ident.contains(self.location).then_some(Target::Name(ident)),
            ExprKind::ModuleScope(ident) => ident
                .contains(self.location)
                .then_some(Target::ModuleScoped(ident)),
            ExprKind::Member { object, member } => {
                if member.contains(self.location) {
                    Some(Target::Member {
                        object: object.as_ref(),
                        member,
                    })
                } else {
                    self.expr(object)
                }
            }
            ExprKind::Type(ty) => self.ty(ty),
            ExprKind::Call { callee: object, args } | ExprKind::Index { object, args } => self
                .expr(object)
                .or_else(|| args.iter().find_map(|arg| self.expr(arg))),
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs, .. }
            | ExprKind::Range { lo: lhs, hi: rhs } => {
                self.expr(lhs).or_else(|| self.expr(rhs))
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => self
                .expr(cond)
                .or_else(|| self.expr(then))
                .or_else(|| self.expr(otherwise)),
            ExprKind::New { ty, args } => self
                .ty(ty)
                .or_else(|| args.iter().find_map(|arg| self.expr(arg))),
            ExprKind::Cast { ty, operand } => self.ty(ty).or_else(|| self.expr(operand)),
            ExprKind::ArrayLiteral(elements) => {
                elements.iter().find_map(|element| self.expr(element))
            }
            ExprKind::Literal(_)
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::Dollar
            | ExprKind::IsType => None,
        }
    }

    fn ty(&self, ty: &'a TypeRef) -> Option<Target<'a>> {
        match ty {
            TypeRef::Named { path, args } => path
                .iter()
                .position(|ident| ident.contains(self.location))
                .map(|index| Target::TypePath {
                    path: path.as_slice(),
                    index,
                })
                .or_else(|| args.iter().find_map(|arg| self.ty(arg))),
            TypeRef::Pointer(inner) | TypeRef::Array(inner) | TypeRef::Qualified(_, inner) => {
                self.ty(inner)
            }
            TypeRef::Basic(_) | TypeRef::Auto => None,
        }
    }
}
