//! Syntax tree for the supported D subset.
//!
//! Every node records the 1-based locations it spans so that analysis can map
//! editor positions back onto the tree.

use crate::CodeLocation;
use std::fmt;

/// An identifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    /// The identifier text.
    pub name: String,
    /// Location of the first character.
    pub start: CodeLocation,
    /// Location one past the last character.
    pub end: CodeLocation,
}

impl Ident {
    /// Returns true if `location` falls on this identifier.
    ///
    /// The position right after the last character still counts, so a caret
    /// placed at the end of a word finds it.
    pub fn contains(&self, location: CodeLocation) -> bool {
        location.line == self.start.line
            && self.start.column <= location.column
            && location.column <= self.end.column
    }
}

/// A whole source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// The `module a.b.c;` header, if present.
    pub header: Option<Vec<Ident>>,
    /// Top-level items in source order.
    pub items: Vec<Item>,
}

/// A top-level or member item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `import a.b : c;`
    Import(Import),
    /// A named declaration.
    Decl(Decl),
    /// `version (X) …` or `debug …`.
    Conditional(Conditional),
    /// `unittest { … }`
    Unittest(Block),
}

/// An import declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// The dotted module path.
    pub path: Vec<Ident>,
    /// `import io = std.stdio;`
    pub alias: Option<Ident>,
    /// Selective imports after `:`.
    pub symbols: Vec<Ident>,
}

impl Import {
    /// The dotted module name.
    pub fn module_name(&self) -> String {
        dotted(&self.path)
    }
}

/// A conditional compilation block.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// The condition.
    pub condition: Condition,
    /// Items compiled when the condition holds.
    pub then_items: Vec<Item>,
    /// Items of the `else` branch.
    pub else_items: Vec<Item>,
}

/// Condition of a [`Conditional`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `version (identifier)`
    Version(String),
    /// `debug` or `debug (identifier)`
    Debug(Option<String>),
}

/// A declaration introducing a name.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    /// The declared name. Anonymous enums use an empty name.
    pub name: Ident,
    /// What is being declared.
    pub kind: DeclKind,
    /// Storage classes and attributes in source order.
    pub attributes: Vec<String>,
    /// Location of the first token of the declaration.
    pub start: CodeLocation,
    /// Location one past the last token of the declaration.
    pub end: CodeLocation,
}

impl Decl {
    /// Returns true for anonymous enums, whose members live in the
    /// enclosing scope.
    pub fn is_anonymous(&self) -> bool {
        self.name.name.is_empty()
    }

    /// Member items of an aggregate, or nothing.
    pub fn members(&self) -> &[Item] {
        match &self.kind {
            DeclKind::Aggregate { members, .. } => members,
            _ => &[],
        }
    }
}

/// Kinds of declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    /// A variable or field.
    Variable {
        /// Declared type.
        ty: TypeRef,
        /// Initializer.
        init: Option<Expr>,
    },
    /// A function, method, constructor or destructor.
    Function {
        /// Return type; `auto` for constructors.
        return_type: TypeRef,
        /// Parameters.
        params: Vec<Param>,
        /// Body, absent for prototypes.
        body: Option<Block>,
    },
    /// A struct, class, interface or union.
    Aggregate {
        /// Which aggregate keyword was used.
        kind: AggregateKind,
        /// Base classes and interfaces.
        bases: Vec<TypeRef>,
        /// Members.
        members: Vec<Item>,
    },
    /// An enum.
    Enum {
        /// Base type after `:`.
        base: Option<TypeRef>,
        /// Enum members.
        members: Vec<EnumMember>,
    },
    /// `alias Name = Type;`
    Alias {
        /// The aliased type.
        target: TypeRef,
    },
}

/// Aggregate flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// `struct`
    Struct,
    /// `class`
    Class,
    /// `interface`
    Interface,
    /// `union`
    Union,
}

impl AggregateKind {
    /// The D keyword.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Struct => "struct",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Union => "union",
        }
    }
}

/// A function or foreach parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name; D allows unnamed parameters.
    pub name: Option<Ident>,
    /// Parameter type.
    pub ty: TypeRef,
    /// Storage classes such as `ref` or `in`.
    pub attributes: Vec<String>,
    /// Default value.
    pub default: Option<Expr>,
}

/// A member of an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    /// Member name.
    pub name: Ident,
    /// Explicit value.
    pub value: Option<Expr>,
}

/// A type reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// A built-in type such as `int`.
    Basic(String),
    /// A possibly qualified user type with optional template arguments.
    Named {
        /// Dotted path.
        path: Vec<Ident>,
        /// Template arguments after `!`.
        args: Vec<TypeRef>,
    },
    /// `T*`
    Pointer(Box<TypeRef>),
    /// `T[]`, `T[N]` or `T[K]`.
    Array(Box<TypeRef>),
    /// `const(T)` and friends.
    Qualified(String, Box<TypeRef>),
    /// Type inferred from the initializer.
    Auto,
}

impl TypeRef {
    /// The innermost named type, looking through pointers, arrays and
    /// qualifiers.
    pub fn named_root(&self) -> Option<&[Ident]> {
        match self {
            Self::Named { path, .. } => Some(path),
            Self::Pointer(inner) | Self::Array(inner) | Self::Qualified(_, inner) => {
                inner.named_root()
            }
            Self::Basic(_) | Self::Auto => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic(name) => write!(f, "{name}"),
            Self::Named { path, args } => {
                write!(f, "{}", dotted(path))?;
                match args.as_slice() {
                    [] => Ok(()),
                    [single] => write!(f, "!{single}"),
                    many => {
                        let args: Vec<String> = many.iter().map(ToString::to_string).collect();
                        write!(f, "!({})", args.join(", "))
                    }
                }
            }
            Self::Pointer(inner) => write!(f, "{inner}*"),
            Self::Array(inner) => write!(f, "{inner}[]"),
            Self::Qualified(qualifier, inner) => write!(f, "{qualifier}({inner})"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// A braced statement list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    /// Statements in source order.
    pub statements: Vec<Stmt>,
    /// Location of `{`.
    pub start: CodeLocation,
    /// Location one past `}`.
    pub end: CodeLocation,
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A local declaration or import.
    Item(Item),
    /// An expression statement.
    Expr(Expr),
    /// A nested block.
    Block(Block),
    /// `if (cond) then else otherwise`
    If {
        /// Condition.
        cond: Expr,
        /// Then branch.
        then: Box<Stmt>,
        /// Else branch.
        otherwise: Option<Box<Stmt>>,
    },
    /// `while (cond) body` and `do body while (cond);`
    While {
        /// Condition.
        cond: Expr,
        /// Loop body.
        body: Box<Stmt>,
    },
    /// `for (init; cond; step) body`
    For {
        /// Initializer statement.
        init: Option<Box<Stmt>>,
        /// Condition.
        cond: Option<Expr>,
        /// Increment expression.
        step: Option<Expr>,
        /// Loop body.
        body: Box<Stmt>,
        /// Location of `for`, used to scope the loop variables.
        start: CodeLocation,
    },
    /// `foreach (vars; aggregate) body`
    Foreach {
        /// Loop variables.
        vars: Vec<Param>,
        /// Iterated expression, possibly a range `a .. b`.
        aggregate: Expr,
        /// Loop body.
        body: Box<Stmt>,
    },
    /// `switch (cond) { … }`
    Switch {
        /// Switched expression.
        cond: Expr,
        /// Body with `case` and `default` labels.
        body: Block,
    },
    /// `case a, b:`
    Case(Vec<Expr>),
    /// `default:`
    Default,
    /// `return expr;`
    Return(Option<Expr>),
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `;`
    Empty,
}

/// An expression with its extent.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// What the expression is.
    pub kind: ExprKind,
    /// First character.
    pub start: CodeLocation,
    /// One past the last character.
    pub end: CodeLocation,
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A name.
    Ident(Ident),
    /// `.name`, looked up at module scope.
    ModuleScope(Ident),
    /// A literal.
    Literal(Literal),
    /// `this`
    This,
    /// `super`
    Super,
    /// `$` inside an index.
    Dollar,
    /// A built-in type used as an expression, e.g. `int.max`.
    Type(TypeRef),
    /// `object.member`
    Member {
        /// Object expression.
        object: Box<Expr>,
        /// Member name.
        member: Ident,
    },
    /// `callee(args)`
    Call {
        /// Called expression.
        callee: Box<Expr>,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `object[args]`
    Index {
        /// Indexed expression.
        object: Box<Expr>,
        /// Indices or slice bounds.
        args: Vec<Expr>,
    },
    /// Prefix or postfix unary operator.
    Unary {
        /// Operator text.
        op: &'static str,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operator.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Location of the operator's first character.
        op_location: CodeLocation,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Plain or compound assignment.
    Assign {
        /// Operator text, `=` or e.g. `+=`.
        op: String,
        /// Target.
        lhs: Box<Expr>,
        /// Value.
        rhs: Box<Expr>,
    },
    /// `cond ? then : otherwise`
    Conditional {
        /// Condition.
        cond: Box<Expr>,
        /// Value when true.
        then: Box<Expr>,
        /// Value when false.
        otherwise: Box<Expr>,
    },
    /// `lo .. hi` in slices and foreach.
    Range {
        /// Lower bound.
        lo: Box<Expr>,
        /// Upper bound.
        hi: Box<Expr>,
    },
    /// `new T(args)`
    New {
        /// Allocated type.
        ty: TypeRef,
        /// Constructor arguments.
        args: Vec<Expr>,
    },
    /// `cast(T) operand`
    Cast {
        /// Target type.
        ty: TypeRef,
        /// Operand.
        operand: Box<Expr>,
    },
    /// `[a, b, c]`
    ArrayLiteral(Vec<Expr>),
    /// `is(…)` type test; the contents are not analysed.
    IsType,
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Integer or floating point literal text.
    Number(String),
    /// String literal text including quotes.
    String(String),
    /// Character literal text including quotes.
    Char(String),
    /// `true` or `false`.
    Bool(bool),
    /// `null`
    Null,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||`
    OrOr,
    /// `&&`
    AndAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `is`
    Is,
    /// `!is`
    NotIs,
    /// `in`
    In,
    /// `!in`
    NotIn,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `~`
    Concat,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::OrOr => 1,
            Self::AndAnd => 2,
            Self::BitOr => 3,
            Self::BitXor => 4,
            Self::BitAnd => 5,
            Self::Eq
            | Self::NotEq
            | Self::Lt
            | Self::LtEq
            | Self::Gt
            | Self::GtEq
            | Self::Is
            | Self::NotIs
            | Self::In
            | Self::NotIn => 6,
            Self::Shl | Self::Shr => 7,
            Self::Add | Self::Sub | Self::Concat => 8,
            Self::Mul | Self::Div | Self::Rem => 9,
        }
    }

    /// Returns true for the identity (`is`, `!is`) and membership (`in`,
    /// `!in`) operators.
    pub const fn is_identity_or_membership(self) -> bool {
        matches!(self, Self::Is | Self::NotIs | Self::In | Self::NotIn)
    }

    /// The operator as written in source.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrOr => "||",
            Self::AndAnd => "&&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Is => "is",
            Self::NotIs => "!is",
            Self::In => "in",
            Self::NotIn => "!in",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Concat => "~",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Join identifiers with dots.
pub fn dotted(path: &[Ident]) -> String {
    path.iter()
        .map(|ident| ident.name.as_str())
        .collect::<Vec<_>>()
        .join(".")
}
