//! Recursive-descent parser with error recovery.
//!
//! The parser never gives up: every problem is recorded as a [`ParseError`]
//! and parsing resumes at the next statement or declaration boundary, so a
//! best-effort tree is always produced.

use crate::ast::{
    AggregateKind, BinaryOp, Block, Condition, Conditional, Decl, DeclKind, EnumMember, Expr,
    ExprKind, Ident, Import, Item, Literal, Module, Param, Stmt, TypeRef,
};
use crate::logos_lexer::{Token, tokenize};
use crate::{CodeLocation, LineIndex, ParseError, ParseErrorKind, Span};

/// How deep statements, declarations, types and expressions may nest.
///
/// Syntax trees produced by [`parse`] never exceed this depth, so walking
/// them recursively stays within a thread's default stack.
pub const MAX_NESTING: usize = 128;

/// Raw parser output, before it is packaged into a module record.
#[derive(Debug)]
pub struct ParseOutput {
    /// The syntax tree.
    pub module: Module,
    /// Errors in source order of discovery.
    pub errors: Vec<ParseError>,
    /// Byte spans of all comments, for task extraction.
    pub comments: Vec<Span>,
}

/// Parse D source text.
pub fn parse(source: &str) -> ParseOutput {
    let mut parser = Parser::new(source);
    let module = parser.parse_module();
    ParseOutput {
        module,
        errors: parser.errors,
        comments: parser.comments,
    }
}

struct Parser<'src> {
    source: &'src str,
    index: LineIndex,
    tokens: Vec<(Token<'src>, Span)>,
    pos: usize,
    errors: Vec<ParseError>,
    comments: Vec<Span>,
    depth: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let index = LineIndex::new(source);
        let mut parser = Self {
            source,
            index,
            tokens: Vec::new(),
            pos: 0,
            errors: Vec::new(),
            comments: Vec::new(),
            depth: 0,
        };

        for (token, span) in tokenize(source) {
            match token {
                Token::LineComment | Token::BlockComment(true) | Token::NestedComment(true) => {
                    parser.comments.push(span);
                }
                Token::BlockComment(false) | Token::NestedComment(false) => {
                    parser.comments.push(span);
                    parser.error_at(span.start, ParseErrorKind::UnterminatedComment);
                }
                Token::Error => {
                    let text = span.text(source).to_string();
                    parser.error_at(span.start, ParseErrorKind::InvalidCharacter(text));
                }
                Token::Str(false) => {
                    parser.error_at(span.start, ParseErrorKind::UnterminatedString);
                    parser.tokens.push((token, span));
                }
                _ => parser.tokens.push((token, span)),
            }
        }
        parser
    }

    // ===== Token access =====

    fn peek(&self) -> Option<Token<'src>> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<Token<'src>> {
        self.tokens.get(self.pos + n).map(|(t, _)| t.clone())
    }

    fn token_at(&self, index: usize) -> Option<&Token<'src>> {
        self.tokens.get(index).map(|(t, _)| t)
    }

    fn at(&self, token: &Token<'src>) -> bool {
        self.token_at(self.pos) == Some(token)
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn bump(&mut self) -> Option<(Token<'src>, Span)> {
        let current = self.tokens.get(self.pos).cloned();
        if current.is_some() {
            self.pos += 1;
        }
        current
    }

    fn eat(&mut self, token: &Token<'src>) -> bool {
        if self.at(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map_or(Span::new(self.source.len(), self.source.len()), |(_, s)| *s)
    }

    fn location(&self, offset: usize) -> CodeLocation {
        self.index.location(self.source, offset)
    }

    fn start_location(&self) -> CodeLocation {
        self.location(self.current_span().start)
    }

    fn prev_end(&self) -> CodeLocation {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some((_, span)) => self.location(span.end),
            None => self.location(0),
        }
    }

    fn found(&self) -> String {
        match self.tokens.get(self.pos) {
            Some((token, _)) => format!("'{token}'"),
            None => "end of file".to_string(),
        }
    }

    // ===== Errors =====

    fn error_at(&mut self, offset: usize, kind: ParseErrorKind) {
        let location = self.location(offset);
        // One error per position keeps recovery from cascading.
        if self.errors.last().is_some_and(|e| e.location == location) {
            return;
        }
        self.errors.push(ParseError::new(kind, location));
    }

    fn error_here(&mut self, kind: ParseErrorKind) {
        let offset = self.current_span().start;
        self.error_at(offset, kind);
    }

    fn expect(&mut self, token: &Token<'src>) -> bool {
        if self.eat(token) {
            return true;
        }
        let found = self.found();
        self.error_here(ParseErrorKind::Expected {
            expected: format!("'{token}'"),
            found,
        });
        false
    }

    fn expect_ident(&mut self) -> Option<Ident> {
        if let Some((Token::Ident(name), span)) = self.tokens.get(self.pos).cloned() {
            self.pos += 1;
            return Some(self.ident(name, span));
        }
        let found = self.found();
        self.error_here(ParseErrorKind::Expected {
            expected: "identifier".to_string(),
            found,
        });
        None
    }

    fn ident(&self, name: &str, span: Span) -> Ident {
        Ident {
            name: name.to_string(),
            start: self.location(span.start),
            end: self.location(span.end),
        }
    }

    // ===== Nesting =====

    /// Go one level deeper, or record an error at the limit.
    fn descend(&mut self) -> bool {
        if self.depth >= MAX_NESTING {
            self.error_here(ParseErrorKind::NestingTooDeep);
            return false;
        }
        self.depth += 1;
        true
    }

    /// Run `parse` one level deeper. Levels added inside `parse` with
    /// [`descend`](Self::descend) are released on return.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        if !self.descend() {
            return None;
        }
        let depth = self.depth;
        let result = parse(self);
        self.depth = depth - 1;
        result
    }

    // ===== Recovery =====

    /// Skip to the end of the current statement: past the next `;`, past a
    /// complete `{ … }` group, or up to an unmatched `}`.
    fn recover(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Semi if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Index just past the group opened at `index`, or `None` if unbalanced.
    fn matching(&self, index: usize, open: &Token<'src>, close: &Token<'src>) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = index;
        while let Some(token) = self.token_at(i) {
            if token == open {
                depth += 1;
            } else if token == close {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            i += 1;
        }
        None
    }

    /// Skip a balanced group starting at the current token.
    fn skip_group(&mut self, open: &Token<'src>, close: &Token<'src>) {
        match self.matching(self.pos, open, close) {
            Some(end) => self.pos = end,
            None => {
                self.pos = self.tokens.len();
                let found = self.found();
                self.error_here(ParseErrorKind::Expected {
                    expected: format!("'{close}'"),
                    found,
                });
            }
        }
    }

    // ===== Module level =====

    fn parse_module(&mut self) -> Module {
        let header = if self.eat(&Token::Module) {
            let path = self.parse_dotted();
            if path.is_some() {
                self.expect(&Token::Semi);
            } else {
                self.recover();
            }
            path
        } else {
            None
        };
        let items = self.parse_items(false);
        Module { header, items }
    }

    fn parse_dotted(&mut self) -> Option<Vec<Ident>> {
        let mut path = vec![self.expect_ident()?];
        while self.at(&Token::Dot) && matches!(self.peek_at(1), Some(Token::Ident(_))) {
            self.pos += 1;
            path.push(self.expect_ident()?);
        }
        Some(path)
    }

    fn parse_items(&mut self, nested: bool) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if nested && token == Token::RBrace {
                break;
            }
            let before = self.pos;
            if !self.parse_item(&mut items) {
                self.recover();
            }
            if self.pos == before {
                self.pos += 1;
            }
        }
        items
    }

    fn parse_item(&mut self, out: &mut Vec<Item>) -> bool {
        self.nested(|p| p.parse_item_inner(out).then_some(())).is_some()
    }

    fn parse_item_inner(&mut self, out: &mut Vec<Item>) -> bool {
        match self.peek() {
            Some(Token::Semi) => {
                self.pos += 1;
                true
            }
            Some(Token::Version | Token::Debug) => self.parse_conditional(out),
            Some(Token::Unittest) => {
                self.pos += 1;
                if !self.at(&Token::LBrace) {
                    return self.expect(&Token::LBrace);
                }
                out.push(Item::Unittest(self.parse_block()));
                true
            }
            Some(Token::Module) => {
                let found = self.found();
                self.error_here(ParseErrorKind::Unexpected(found));
                false
            }
            Some(_) => self.parse_declaration(out),
            None => false,
        }
    }

    fn parse_import(&mut self, out: &mut Vec<Item>) -> bool {
        self.pos += 1;
        loop {
            let Some(first) = self.parse_dotted() else {
                return false;
            };
            let (alias, path) = if self.eat(&Token::Assign) {
                let Some(path) = self.parse_dotted() else {
                    return false;
                };
                (first.into_iter().next(), path)
            } else {
                (None, first)
            };

            let mut symbols = Vec::new();
            let selective = self.eat(&Token::Colon);
            if selective {
                loop {
                    let Some(symbol) = self.expect_ident() else {
                        return false;
                    };
                    // `import m : local = name;`
                    let symbol = if self.eat(&Token::Assign) {
                        match self.expect_ident() {
                            Some(target) => target,
                            None => return false,
                        }
                    } else {
                        symbol
                    };
                    symbols.push(symbol);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            out.push(Item::Import(Import {
                path,
                alias,
                symbols,
            }));
            if selective || !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Semi);
        true
    }

    fn parse_conditional(&mut self, out: &mut Vec<Item>) -> bool {
        let Some((keyword, _)) = self.bump() else {
            return false;
        };
        let condition = if keyword == Token::Version {
            // `version = X;` sets an identifier; it is accepted and ignored.
            if self.eat(&Token::Assign) {
                self.bump();
                self.expect(&Token::Semi);
                return true;
            }
            if !self.expect(&Token::LParen) {
                return false;
            }
            let name = match self.peek() {
                Some(Token::Ident(name) | Token::Number(name)) => name.to_string(),
                Some(Token::Unittest) => "unittest".to_string(),
                _ => {
                    let found = self.found();
                    self.error_here(ParseErrorKind::Expected {
                        expected: "version identifier".to_string(),
                        found,
                    });
                    return false;
                }
            };
            self.pos += 1;
            if !self.expect(&Token::RParen) {
                return false;
            }
            Condition::Version(name)
        } else {
            if self.eat(&Token::Assign) {
                self.bump();
                self.expect(&Token::Semi);
                return true;
            }
            let mut name = None;
            if self.eat(&Token::LParen) {
                if let Some((Token::Ident(ident) | Token::Number(ident), _)) = self.bump() {
                    name = Some(ident.to_string());
                }
                if !self.expect(&Token::RParen) {
                    return false;
                }
            }
            Condition::Debug(name)
        };

        let then_items = if self.eat(&Token::Colon) {
            self.parse_items(true)
        } else {
            self.parse_conditional_body()
        };
        let else_items = if self.eat(&Token::Else) {
            self.parse_conditional_body()
        } else {
            Vec::new()
        };
        out.push(Item::Conditional(Conditional {
            condition,
            then_items,
            else_items,
        }));
        true
    }

    fn parse_conditional_body(&mut self) -> Vec<Item> {
        if self.eat(&Token::LBrace) {
            let items = self.parse_items(true);
            self.expect(&Token::RBrace);
            items
        } else {
            let mut items = Vec::new();
            if !self.parse_item(&mut items) {
                self.recover();
            }
            items
        }
    }

    // ===== Declarations =====

    fn parse_attributes(&mut self) -> Option<Vec<String>> {
        let mut attributes = Vec::new();
        loop {
            match self.peek() {
                Some(Token::StorageClass(name)) => {
                    // `const(T)` is a type, not a storage class.
                    if is_type_qualifier(name) && self.peek_at(1) == Some(Token::LParen) {
                        break;
                    }
                    self.pos += 1;
                    if name == "extern" && self.at(&Token::LParen) {
                        self.skip_group(&Token::LParen, &Token::RParen);
                    }
                    attributes.push(name.to_string());
                }
                Some(Token::Auto) => {
                    self.pos += 1;
                    attributes.push("auto".to_string());
                }
                Some(Token::At) => {
                    self.pos += 1;
                    let name = self.expect_ident()?;
                    if self.at(&Token::LParen) {
                        self.skip_group(&Token::LParen, &Token::RParen);
                    }
                    attributes.push(format!("@{}", name.name));
                }
                _ => break,
            }
        }
        Some(attributes)
    }

    fn parse_declaration(&mut self, out: &mut Vec<Item>) -> bool {
        let start = self.start_location();
        let Some(attributes) = self.parse_attributes() else {
            return false;
        };

        if !attributes.is_empty() {
            // `private:` applies to what follows; nothing to record.
            if self.eat(&Token::Colon) {
                return true;
            }
            if self.eat(&Token::LBrace) {
                let items = self.parse_items(true);
                self.expect(&Token::RBrace);
                out.extend(items.into_iter().map(|item| with_attributes(item, &attributes)));
                return true;
            }
        }

        let decl = match self.peek() {
            Some(Token::Import) => return self.parse_import(out),
            Some(Token::Struct) => self.parse_aggregate(AggregateKind::Struct, attributes, start),
            Some(Token::Class) => self.parse_aggregate(AggregateKind::Class, attributes, start),
            Some(Token::Interface) => {
                self.parse_aggregate(AggregateKind::Interface, attributes, start)
            }
            Some(Token::Union) => self.parse_aggregate(AggregateKind::Union, attributes, start),
            Some(Token::Enum) => return self.parse_enum(attributes, start, out),
            Some(Token::Alias) => self.parse_alias(attributes, start),
            Some(Token::This) if self.peek_at(1) == Some(Token::LParen) => {
                let Some((_, span)) = self.bump() else {
                    return false;
                };
                let name = self.ident("this", span);
                self.parse_function_rest(name, TypeRef::Auto, attributes, start)
            }
            Some(Token::Tilde) if self.peek_at(1) == Some(Token::This) => {
                let Some((_, tilde)) = self.bump() else {
                    return false;
                };
                let Some((_, this)) = self.bump() else {
                    return false;
                };
                let name = self.ident("~this", Span::new(tilde.start, this.end));
                self.parse_function_rest(name, TypeRef::Auto, attributes, start)
            }
            Some(_) => return self.parse_variables_or_function(attributes, start, out),
            None => None,
        };

        match decl {
            Some(decl) => {
                out.push(Item::Decl(decl));
                true
            }
            None => false,
        }
    }

    fn parse_aggregate(
        &mut self,
        kind: AggregateKind,
        attributes: Vec<String>,
        start: CodeLocation,
    ) -> Option<Decl> {
        self.pos += 1;
        let name = self.expect_ident()?;
        if self.at(&Token::LParen) {
            self.skip_group(&Token::LParen, &Token::RParen);
        }

        let mut bases = Vec::new();
        if self.eat(&Token::Colon) {
            loop {
                bases.push(self.parse_type()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        let members = if self.eat(&Token::Semi) {
            Vec::new()
        } else {
            if !self.expect(&Token::LBrace) {
                return None;
            }
            let members = self.parse_items(true);
            self.expect(&Token::RBrace);
            members
        };

        Some(Decl {
            name,
            kind: DeclKind::Aggregate {
                kind,
                bases,
                members,
            },
            attributes,
            start,
            end: self.prev_end(),
        })
    }

    fn parse_enum(
        &mut self,
        mut attributes: Vec<String>,
        start: CodeLocation,
        out: &mut Vec<Item>,
    ) -> bool {
        self.pos += 1;
        let named = matches!(self.peek(), Some(Token::Ident(_)))
            && matches!(
                self.peek_at(1),
                Some(Token::LBrace | Token::Colon | Token::Semi)
            );
        let anonymous = matches!(self.peek(), Some(Token::LBrace | Token::Colon));

        if !named && !anonymous {
            // Manifest constant: `enum x = 3;` or `enum int x = 3;`
            attributes.push("enum".to_string());
            return self.parse_variables_or_function(attributes, start, out);
        }

        let name = if named {
            match self.expect_ident() {
                Some(name) => name,
                None => return false,
            }
        } else {
            let here = self.start_location();
            Ident {
                name: String::new(),
                start: here,
                end: here,
            }
        };

        let base = if self.eat(&Token::Colon) {
            match self.parse_type() {
                Some(ty) => Some(ty),
                None => return false,
            }
        } else {
            None
        };

        let mut members = Vec::new();
        if !self.eat(&Token::Semi) {
            if !self.expect(&Token::LBrace) {
                return false;
            }
            while !self.at(&Token::RBrace) && !self.at_eof() {
                let Some(member) = self.expect_ident() else {
                    self.recover_enum_member();
                    continue;
                };
                let value = if self.eat(&Token::Assign) {
                    self.parse_assign_expr()
                } else {
                    None
                };
                members.push(EnumMember {
                    name: member,
                    value,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RBrace);
        }

        out.push(Item::Decl(Decl {
            name,
            kind: DeclKind::Enum { base, members },
            attributes,
            start,
            end: self.prev_end(),
        }));
        true
    }

    fn recover_enum_member(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::RBrace => return,
                Token::Comma => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn parse_alias(&mut self, attributes: Vec<String>, start: CodeLocation) -> Option<Decl> {
        self.pos += 1;
        let (name, target) = if matches!(self.peek(), Some(Token::Ident(_)))
            && self.peek_at(1) == Some(Token::Assign)
        {
            let name = self.expect_ident()?;
            self.pos += 1;
            (name, self.parse_type()?)
        } else {
            let target = self.parse_type()?;
            (self.expect_ident()?, target)
        };
        self.expect(&Token::Semi);
        Some(Decl {
            name,
            kind: DeclKind::Alias { target },
            attributes,
            start,
            end: self.prev_end(),
        })
    }

    fn parse_variables_or_function(
        &mut self,
        attributes: Vec<String>,
        start: CodeLocation,
        out: &mut Vec<Item>,
    ) -> bool {
        let inferred = !attributes.is_empty()
            && matches!(self.peek(), Some(Token::Ident(_)))
            && matches!(self.peek_at(1), Some(Token::Assign | Token::LParen));
        let ty = if inferred {
            TypeRef::Auto
        } else {
            match self.parse_type() {
                Some(ty) => ty,
                None => return false,
            }
        };
        let Some(mut name) = self.expect_ident() else {
            return false;
        };

        if self.at(&Token::LParen) {
            return match self.parse_function_rest(name, ty, attributes, start) {
                Some(decl) => {
                    out.push(Item::Decl(decl));
                    true
                }
                None => false,
            };
        }

        loop {
            let init = if self.eat(&Token::Assign) {
                if self.at(&Token::LBrace) {
                    self.skip_group(&Token::LBrace, &Token::RBrace);
                    None
                } else {
                    match self.parse_assign_expr() {
                        Some(init) => Some(init),
                        None => return false,
                    }
                }
            } else {
                None
            };
            out.push(Item::Decl(Decl {
                name,
                kind: DeclKind::Variable {
                    ty: ty.clone(),
                    init,
                },
                attributes: attributes.clone(),
                start,
                end: self.prev_end(),
            }));
            if !self.eat(&Token::Comma) {
                break;
            }
            name = match self.expect_ident() {
                Some(name) => name,
                None => return false,
            };
        }
        self.expect(&Token::Semi);
        true
    }

    fn parse_function_rest(
        &mut self,
        name: Ident,
        return_type: TypeRef,
        mut attributes: Vec<String>,
        start: CodeLocation,
    ) -> Option<Decl> {
        let mut params = self.parse_params();
        // The first list was template parameters.
        if self.at(&Token::LParen) {
            params = self.parse_params();
        }

        loop {
            match self.peek() {
                Some(Token::StorageClass(attr)) if attr != "out" => {
                    self.pos += 1;
                    attributes.push(attr.to_string());
                }
                Some(Token::At) => {
                    self.pos += 1;
                    let attr = self.expect_ident()?;
                    attributes.push(format!("@{}", attr.name));
                }
                _ => break,
            }
        }
        // Template constraint.
        if self.eat(&Token::If) && self.at(&Token::LParen) {
            self.skip_group(&Token::LParen, &Token::RParen);
        }
        // Contracts.
        loop {
            if self.at(&Token::In) && self.peek_at(1) == Some(Token::LBrace) {
                self.pos += 1;
                self.parse_block();
            } else if self.peek() == Some(Token::StorageClass("out")) {
                self.pos += 1;
                if self.at(&Token::LParen) {
                    self.skip_group(&Token::LParen, &Token::RParen);
                }
                if self.at(&Token::LBrace) {
                    self.parse_block();
                }
            } else {
                break;
            }
        }
        self.eat(&Token::Do);

        let body = if self.eat(&Token::Semi) {
            None
        } else if self.at(&Token::LBrace) {
            Some(self.parse_block())
        } else {
            self.expect(&Token::Semi);
            None
        };

        Some(Decl {
            name,
            kind: DeclKind::Function {
                return_type,
                params,
                body,
            },
            attributes,
            start,
            end: self.prev_end(),
        })
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if !self.expect(&Token::LParen) {
            return params;
        }
        while !self.at(&Token::RParen) && !self.at_eof() {
            if self.eat(&Token::Ellipsis) {
                continue;
            }
            match self.parse_param() {
                Some(param) => params.push(param),
                None => {
                    while !self.at(&Token::RParen) && !self.at(&Token::LBrace) && !self.at_eof() {
                        self.pos += 1;
                    }
                    break;
                }
            }
            self.eat(&Token::Ellipsis);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen);
        params
    }

    fn parse_param(&mut self) -> Option<Param> {
        let mut attributes = Vec::new();
        loop {
            match self.peek() {
                Some(Token::StorageClass(name))
                    if !(is_type_qualifier(name) && self.peek_at(1) == Some(Token::LParen)) =>
                {
                    self.pos += 1;
                    attributes.push(name.to_string());
                }
                Some(Token::In) => {
                    self.pos += 1;
                    attributes.push("in".to_string());
                }
                _ => break,
            }
        }
        let ty = self.parse_type()?;
        let name = match self.peek() {
            Some(Token::Ident(_)) => self.expect_ident(),
            _ => None,
        };
        let default = if self.eat(&Token::Assign) {
            Some(self.parse_assign_expr()?)
        } else {
            None
        };
        Some(Param {
            name,
            ty,
            attributes,
            default,
        })
    }

    // ===== Types =====

    fn parse_type(&mut self) -> Option<TypeRef> {
        self.nested(Self::parse_type_inner)
    }

    fn parse_type_inner(&mut self) -> Option<TypeRef> {
        let mut ty = match self.peek() {
            Some(Token::BasicType(name)) => {
                self.pos += 1;
                TypeRef::Basic(name.to_string())
            }
            Some(Token::Auto) => {
                self.pos += 1;
                TypeRef::Auto
            }
            Some(Token::StorageClass(qualifier)) if is_type_qualifier(qualifier) => {
                self.pos += 1;
                let inner = if self.eat(&Token::LParen) {
                    let inner = self.parse_type()?;
                    self.expect(&Token::RParen);
                    inner
                } else {
                    self.parse_type()?
                };
                TypeRef::Qualified(qualifier.to_string(), Box::new(inner))
            }
            Some(Token::Ident(_)) => self.parse_named_type()?,
            Some(Token::Dot) if matches!(self.peek_at(1), Some(Token::Ident(_))) => {
                self.pos += 1;
                self.parse_named_type()?
            }
            _ => {
                let found = self.found();
                self.error_here(ParseErrorKind::Expected {
                    expected: "type".to_string(),
                    found,
                });
                return None;
            }
        };

        loop {
            if matches!(self.peek(), Some(Token::Star | Token::LBracket)) && !self.descend() {
                return None;
            }
            if self.eat(&Token::Star) {
                ty = TypeRef::Pointer(Box::new(ty));
            } else if self.eat(&Token::LBracket) {
                if !self.at(&Token::RBracket) {
                    if matches!(self.peek(), Some(Token::BasicType(_))) {
                        self.parse_type()?;
                    } else {
                        self.parse_range_expr()?;
                    }
                }
                self.expect(&Token::RBracket);
                ty = TypeRef::Array(Box::new(ty));
            } else {
                break;
            }
        }
        Some(ty)
    }

    fn parse_named_type(&mut self) -> Option<TypeRef> {
        let path = self.parse_dotted()?;
        let args = self.parse_template_args()?;
        Some(TypeRef::Named { path, args })
    }

    fn parse_template_args(&mut self) -> Option<Vec<TypeRef>> {
        let mut args = Vec::new();
        if !self.at(&Token::Bang) || matches!(self.peek_at(1), Some(Token::Is | Token::In)) {
            return Some(args);
        }
        self.pos += 1;
        if self.eat(&Token::LParen) {
            while !self.at(&Token::RParen) && !self.at_eof() {
                if self.starts_type() {
                    args.push(self.parse_type()?);
                } else {
                    self.parse_assign_expr()?;
                }
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen);
        } else {
            match self.peek() {
                Some(Token::BasicType(name)) => {
                    self.pos += 1;
                    args.push(TypeRef::Basic(name.to_string()));
                }
                Some(Token::Ident(_)) => {
                    let path = vec![self.expect_ident()?];
                    args.push(TypeRef::Named {
                        path,
                        args: Vec::new(),
                    });
                }
                _ => {
                    self.bump();
                }
            }
        }
        Some(args)
    }

    fn starts_type(&self) -> bool {
        match self.peek() {
            Some(Token::BasicType(_) | Token::Auto) => true,
            Some(Token::StorageClass(name)) => is_type_qualifier(name),
            Some(Token::Ident(_)) => self
                .scan_type(self.pos)
                .is_some_and(|end| matches!(self.token_at(end), Some(Token::Comma | Token::RParen))),
            _ => false,
        }
    }

    /// Index just past a type starting at `index`, if one is there.
    fn scan_type(&self, index: usize) -> Option<usize> {
        let mut i = index;
        if self.token_at(i) == Some(&Token::Dot) {
            i += 1;
        }
        if !matches!(self.token_at(i), Some(Token::Ident(_))) {
            return None;
        }
        i += 1;
        while self.token_at(i) == Some(&Token::Dot)
            && matches!(self.token_at(i + 1), Some(Token::Ident(_)))
        {
            i += 2;
        }
        if self.token_at(i) == Some(&Token::Bang)
            && !matches!(self.token_at(i + 1), Some(Token::Is | Token::In))
        {
            i += 1;
            if self.token_at(i) == Some(&Token::LParen) {
                i = self.matching(i, &Token::LParen, &Token::RParen)?;
            } else {
                i += 1;
            }
        }
        loop {
            match self.token_at(i) {
                Some(Token::Star) => i += 1,
                Some(Token::LBracket) => {
                    i = self.matching(i, &Token::LBracket, &Token::RBracket)?;
                }
                _ => return Some(i),
            }
        }
    }

    fn looks_like_declaration(&self) -> bool {
        match self.peek() {
            Some(token) if token.starts_declaration() => true,
            Some(Token::BasicType(_)) => {
                !matches!(self.peek_at(1), Some(Token::Dot | Token::LParen))
            }
            Some(Token::Ident(_) | Token::Dot) => self.scan_type(self.pos).is_some_and(|end| {
                matches!(self.token_at(end), Some(Token::Ident(_)))
                    && matches!(
                        self.token_at(end + 1),
                        Some(Token::Semi | Token::Assign | Token::Comma | Token::LParen)
                    )
            }),
            _ => false,
        }
    }

    // ===== Statements =====

    fn parse_block(&mut self) -> Block {
        let start = self.start_location();
        let mut statements = Vec::new();
        if !self.descend() {
            if self.at(&Token::LBrace) {
                self.skip_group(&Token::LBrace, &Token::RBrace);
            }
            return Block {
                statements,
                start,
                end: self.prev_end(),
            };
        }
        let depth = self.depth;
        if self.expect(&Token::LBrace) {
            while !self.at(&Token::RBrace) && !self.at_eof() {
                let before = self.pos;
                if !self.parse_statement_into(&mut statements) {
                    self.recover();
                }
                if self.pos == before {
                    self.pos += 1;
                }
            }
            self.expect(&Token::RBrace);
        }
        self.depth = depth - 1;
        Block {
            statements,
            start,
            end: self.prev_end(),
        }
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        let start = self.start_location();
        let mut statements = Vec::new();
        if !self.parse_statement_into(&mut statements) {
            return None;
        }
        if statements.len() == 1 {
            return statements.pop();
        }
        Some(Stmt::Block(Block {
            statements,
            start,
            end: self.prev_end(),
        }))
    }

    fn parse_statement_into(&mut self, out: &mut Vec<Stmt>) -> bool {
        self.nested(|p| p.parse_statement_inner(out).then_some(())).is_some()
    }

    fn parse_statement_inner(&mut self, out: &mut Vec<Stmt>) -> bool {
        let stmt = match self.peek() {
            None => return false,
            Some(Token::LBrace) => Some(Stmt::Block(self.parse_block())),
            Some(Token::Semi) => {
                self.pos += 1;
                Some(Stmt::Empty)
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => self.parse_while(),
            Some(Token::Do) => self.parse_do(),
            Some(Token::For) => self.parse_for(),
            Some(Token::Foreach) => self.parse_foreach(),
            Some(Token::Switch) => self.parse_switch(),
            Some(Token::Case) => {
                self.pos += 1;
                let mut values = Vec::new();
                loop {
                    match self.parse_assign_expr() {
                        Some(value) => values.push(value),
                        None => return false,
                    }
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::Colon);
                Some(Stmt::Case(values))
            }
            Some(Token::Default) => {
                self.pos += 1;
                self.expect(&Token::Colon);
                Some(Stmt::Default)
            }
            Some(Token::Return) => {
                self.pos += 1;
                let value = if self.at(&Token::Semi) {
                    None
                } else {
                    match self.parse_expr() {
                        Some(value) => Some(value),
                        None => return false,
                    }
                };
                self.expect(&Token::Semi);
                Some(Stmt::Return(value))
            }
            Some(keyword @ (Token::Break | Token::Continue)) => {
                self.pos += 1;
                if matches!(self.peek(), Some(Token::Ident(_))) {
                    self.pos += 1;
                }
                self.expect(&Token::Semi);
                Some(if keyword == Token::Break {
                    Stmt::Break
                } else {
                    Stmt::Continue
                })
            }
            Some(Token::Version | Token::Debug | Token::Unittest) => {
                let mut items = Vec::new();
                let parsed = self.parse_item(&mut items);
                out.extend(items.into_iter().map(Stmt::Item));
                return parsed;
            }
            // Labels.
            Some(Token::Ident(_)) if self.peek_at(1) == Some(Token::Colon) => {
                self.pos += 2;
                return true;
            }
            Some(_) if self.looks_like_declaration() => {
                let mut items = Vec::new();
                let parsed = self.parse_declaration(&mut items);
                out.extend(items.into_iter().map(Stmt::Item));
                return parsed;
            }
            Some(_) => {
                let Some(expr) = self.parse_expr() else {
                    return false;
                };
                self.expect(&Token::Semi);
                Some(Stmt::Expr(expr))
            }
        };
        match stmt {
            Some(stmt) => {
                out.push(stmt);
                true
            }
            None => false,
        }
    }

    fn parse_paren_expr(&mut self) -> Option<Expr> {
        if !self.expect(&Token::LParen) {
            return None;
        }
        let expr = self.parse_expr()?;
        self.expect(&Token::RParen);
        Some(expr)
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        self.pos += 1;
        let cond = self.parse_paren_expr()?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Some(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        self.pos += 1;
        let cond = self.parse_paren_expr()?;
        let body = Box::new(self.parse_statement()?);
        Some(Stmt::While { cond, body })
    }

    fn parse_do(&mut self) -> Option<Stmt> {
        self.pos += 1;
        let body = Box::new(self.parse_statement()?);
        if !self.expect(&Token::While) {
            return None;
        }
        let cond = self.parse_paren_expr()?;
        self.expect(&Token::Semi);
        Some(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let start = self.start_location();
        self.pos += 1;
        if !self.expect(&Token::LParen) {
            return None;
        }
        let init = if self.eat(&Token::Semi) {
            None
        } else {
            Some(Box::new(self.parse_statement()?))
        };
        let cond = if self.at(&Token::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semi);
        let step = if self.at(&Token::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::RParen);
        let body = Box::new(self.parse_statement()?);
        Some(Stmt::For {
            init,
            cond,
            step,
            body,
            start,
        })
    }

    fn parse_foreach(&mut self) -> Option<Stmt> {
        self.pos += 1;
        if !self.expect(&Token::LParen) {
            return None;
        }
        let mut vars = Vec::new();
        loop {
            let mut attributes = Vec::new();
            while let Some(Token::StorageClass(name)) = self.peek() {
                self.pos += 1;
                attributes.push(name.to_string());
            }
            let ty = if matches!(self.peek(), Some(Token::Ident(_)))
                && matches!(self.peek_at(1), Some(Token::Comma | Token::Semi))
            {
                TypeRef::Auto
            } else {
                self.parse_type()?
            };
            let name = self.expect_ident()?;
            vars.push(Param {
                name: Some(name),
                ty,
                attributes,
                default: None,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if !self.expect(&Token::Semi) {
            return None;
        }
        let aggregate = self.parse_range_expr()?;
        self.expect(&Token::RParen);
        let body = Box::new(self.parse_statement()?);
        Some(Stmt::Foreach {
            vars,
            aggregate,
            body,
        })
    }

    fn parse_switch(&mut self) -> Option<Stmt> {
        self.pos += 1;
        let cond = self.parse_paren_expr()?;
        if !self.at(&Token::LBrace) {
            self.expect(&Token::LBrace);
            return None;
        }
        let body = self.parse_block();
        Some(Stmt::Switch { cond, body })
    }

    // ===== Expressions =====

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_assign_expr()
    }

    fn parse_range_expr(&mut self) -> Option<Expr> {
        let lo = self.parse_assign_expr()?;
        if !self.eat(&Token::DotDot) {
            return Some(lo);
        }
        let hi = self.parse_assign_expr()?;
        Some(Expr {
            start: lo.start,
            end: hi.end,
            kind: ExprKind::Range {
                lo: Box::new(lo),
                hi: Box::new(hi),
            },
        })
    }

    fn parse_assign_expr(&mut self) -> Option<Expr> {
        self.nested(Self::parse_assign_inner)
    }

    fn parse_assign_inner(&mut self) -> Option<Expr> {
        let lhs = self.parse_ternary()?;
        let op = match self.peek() {
            Some(Token::Assign) => "=".to_string(),
            Some(Token::OpAssign(op)) => op.to_string(),
            // Lambda `x => body`: the body stands for the whole literal.
            Some(Token::FatArrow) => {
                self.pos += 1;
                let body = self.parse_assign_expr()?;
                return Some(Expr {
                    start: lhs.start,
                    end: body.end,
                    kind: body.kind,
                });
            }
            _ => return Some(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_assign_expr()?;
        Some(Expr {
            start: lhs.start,
            end: rhs.end,
            kind: ExprKind::Assign {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn parse_ternary(&mut self) -> Option<Expr> {
        self.nested(Self::parse_ternary_inner)
    }

    fn parse_ternary_inner(&mut self) -> Option<Expr> {
        let cond = self.parse_binary(1)?;
        if !self.eat(&Token::Question) {
            return Some(cond);
        }
        let then = self.parse_expr()?;
        self.expect(&Token::Colon);
        let otherwise = self.parse_ternary()?;
        Some(Expr {
            start: cond.start,
            end: otherwise.end,
            kind: ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        })
    }

    /// The binary operator at the cursor and how many tokens it spans.
    fn binary_op(&self) -> Option<(BinaryOp, usize)> {
        let op = match self.peek()? {
            Token::OrOr => BinaryOp::OrOr,
            Token::AndAnd => BinaryOp::AndAnd,
            Token::Pipe => BinaryOp::BitOr,
            Token::Caret => BinaryOp::BitXor,
            Token::Amp => BinaryOp::BitAnd,
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::NotEq,
            Token::Lt => BinaryOp::Lt,
            Token::LtEq => BinaryOp::LtEq,
            Token::Gt => BinaryOp::Gt,
            Token::GtEq => BinaryOp::GtEq,
            Token::Is => BinaryOp::Is,
            Token::In => BinaryOp::In,
            Token::Bang => {
                return match self.peek_at(1)? {
                    Token::Is => Some((BinaryOp::NotIs, 2)),
                    Token::In => Some((BinaryOp::NotIn, 2)),
                    _ => None,
                };
            }
            Token::Shl => BinaryOp::Shl,
            Token::Shr => BinaryOp::Shr,
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Tilde => BinaryOp::Concat,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Rem,
            _ => return None,
        };
        Some((op, 1))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Option<Expr> {
        self.nested(|p| p.parse_binary_inner(min_precedence))
    }

    fn parse_binary_inner(&mut self, min_precedence: u8) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, width)) = self.binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            // Each operator of a chain nests the tree one level.
            if !self.descend() {
                return None;
            }
            let op_location = self.start_location();
            self.pos += width;
            let rhs = self.parse_binary(precedence + 1)?;
            lhs = Expr {
                start: lhs.start,
                end: rhs.end,
                kind: ExprKind::Binary {
                    op,
                    op_location,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Option<Expr> {
        let start = self.start_location();
        let op = match self.peek() {
            Some(Token::Minus) => Some("-"),
            Some(Token::Plus) => Some("+"),
            Some(Token::Bang) => Some("!"),
            Some(Token::Tilde) => Some("~"),
            Some(Token::Star) => Some("*"),
            Some(Token::Amp) => Some("&"),
            Some(Token::PlusPlus) => Some("++"),
            Some(Token::MinusMinus) => Some("--"),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Some(Expr {
                start,
                end: operand.end,
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            });
        }

        match self.peek() {
            Some(Token::New) => {
                self.pos += 1;
                let ty = self.parse_type()?;
                let args = if self.at(&Token::LParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                let expr = Expr {
                    start,
                    end: self.prev_end(),
                    kind: ExprKind::New { ty, args },
                };
                self.parse_postfix(expr)
            }
            Some(Token::Cast) => {
                self.pos += 1;
                if !self.expect(&Token::LParen) {
                    return None;
                }
                let ty = if self.at(&Token::RParen) {
                    TypeRef::Auto
                } else {
                    self.parse_type()?
                };
                self.expect(&Token::RParen);
                let operand = self.parse_unary()?;
                Some(Expr {
                    start,
                    end: operand.end,
                    kind: ExprKind::Cast {
                        ty,
                        operand: Box::new(operand),
                    },
                })
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_args(&mut self) -> Option<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.expect(&Token::LParen) {
            return None;
        }
        while !self.at(&Token::RParen) && !self.at_eof() {
            args.push(self.parse_assign_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen);
        Some(args)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Option<Expr> {
        loop {
            let extends = matches!(
                self.peek(),
                Some(
                    Token::Dot
                        | Token::LParen
                        | Token::LBracket
                        | Token::PlusPlus
                        | Token::MinusMinus
                )
            );
            if extends && !self.descend() {
                return None;
            }
            let start = expr.start;
            let kind = match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let member = self.expect_ident()?;
                    ExprKind::Member {
                        object: Box::new(expr),
                        member,
                    }
                }
                Some(Token::LParen) => {
                    let args = self.parse_args()?;
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    while !self.at(&Token::RBracket) && !self.at_eof() {
                        args.push(self.parse_range_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RBracket);
                    ExprKind::Index {
                        object: Box::new(expr),
                        args,
                    }
                }
                Some(Token::PlusPlus) => {
                    self.pos += 1;
                    ExprKind::Unary {
                        op: "++",
                        operand: Box::new(expr),
                    }
                }
                Some(Token::MinusMinus) => {
                    self.pos += 1;
                    ExprKind::Unary {
                        op: "--",
                        operand: Box::new(expr),
                    }
                }
                Some(Token::Bang)
                    if !matches!(self.peek_at(1), Some(Token::Is | Token::In))
                        && matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) =>
                {
                    self.parse_template_args()?;
                    expr.end = self.prev_end();
                    continue;
                }
                _ => return Some(expr),
            };
            expr = Expr {
                start,
                end: self.prev_end(),
                kind,
            };
        }
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let Some((token, span)) = self.tokens.get(self.pos).cloned() else {
            let found = self.found();
            self.error_here(ParseErrorKind::Expected {
                expected: "expression".to_string(),
                found,
            });
            return None;
        };
        let start = self.location(span.start);
        let kind = match token {
            Token::Ident(name) => {
                self.pos += 1;
                ExprKind::Ident(self.ident(name, span))
            }
            Token::Dot => {
                self.pos += 1;
                ExprKind::ModuleScope(self.expect_ident()?)
            }
            Token::Number(text) => {
                self.pos += 1;
                ExprKind::Literal(Literal::Number(text.to_string()))
            }
            Token::Str(_) => {
                self.pos += 1;
                ExprKind::Literal(Literal::String(span.text(self.source).to_string()))
            }
            Token::Char(text) => {
                self.pos += 1;
                ExprKind::Literal(Literal::Char(text.to_string()))
            }
            Token::True | Token::False => {
                self.pos += 1;
                ExprKind::Literal(Literal::Bool(token == Token::True))
            }
            Token::Null => {
                self.pos += 1;
                ExprKind::Literal(Literal::Null)
            }
            Token::This => {
                self.pos += 1;
                ExprKind::This
            }
            Token::Super => {
                self.pos += 1;
                ExprKind::Super
            }
            Token::Dollar => {
                self.pos += 1;
                ExprKind::Dollar
            }
            Token::BasicType(name) => {
                self.pos += 1;
                ExprKind::Type(TypeRef::Basic(name.to_string()))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen);
                inner.kind
            }
            Token::LBracket => {
                self.pos += 1;
                let mut elements = Vec::new();
                while !self.at(&Token::RBracket) && !self.at_eof() {
                    elements.push(self.parse_assign_expr()?);
                    // Associative array literal `[k: v]`.
                    if self.eat(&Token::Colon) {
                        elements.push(self.parse_assign_expr()?);
                    }
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket);
                ExprKind::ArrayLiteral(elements)
            }
            Token::Is => {
                self.pos += 1;
                if self.at(&Token::LParen) {
                    self.skip_group(&Token::LParen, &Token::RParen);
                }
                ExprKind::IsType
            }
            _ => {
                let found = self.found();
                self.error_here(ParseErrorKind::Expected {
                    expected: "expression".to_string(),
                    found,
                });
                return None;
            }
        };
        Some(Expr {
            kind,
            start,
            end: self.prev_end(),
        })
    }
}

fn is_type_qualifier(name: &str) -> bool {
    matches!(name, "const" | "immutable" | "shared" | "inout")
}

/// Apply the attributes of an attribute block to a member item.
fn with_attributes(item: Item, attributes: &[String]) -> Item {
    match item {
        Item::Decl(mut decl) => {
            let mut merged = attributes.to_vec();
            merged.append(&mut decl.attributes);
            decl.attributes = merged;
            Item::Decl(decl)
        }
        other => other,
    }
}
