//! Syntax tree.
//!
//! Names and string literals are interned per program: the tree refers to
//! them by [`Atom`] index into [`Program::atoms`]. Functions live in
//! [`Program::functions`] and are referenced by [`FuncId`], so closures can
//! name their code with two integers.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::token::Span;

/// Index into [`Program::atoms`].
pub type Atom = u32;

/// Index into [`Program::functions`].
pub type FuncId = u32;

/// A parsed script and everything its closures need after parsing.
#[derive(Debug, Clone)]
pub struct Program {
    /// Name shown in syntax errors.
    pub name: String,
    /// Kept so a function can render as its own source text.
    pub source: String,
    pub atoms: Vec<String>,
    pub functions: Vec<FunctionInfo>,
    pub body: Vec<Stmt>,
    /// Global `var` names, hoisted before the body runs.
    pub var_names: Vec<Atom>,
}

impl Program {
    pub fn atom(&self, atom: Atom) -> &str {
        self.atoms.get(atom as usize).map(String::as_str).unwrap_or("")
    }

    /// Source text of a function.
    pub fn function_source(&self, id: FuncId) -> &str {
        self.functions
            .get(id as usize)
            .and_then(|f| self.source.get(f.span.start..f.span.end))
            .unwrap_or("")
    }
}

/// Declaration, function expression or arrow.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: Option<Atom>,
    pub params: Vec<Atom>,
    pub body: FunctionBody,
    /// `var` names hoisted to the function scope.
    pub var_names: Vec<Atom>,
    /// Arrows take `this` from their defining scope.
    pub is_arrow: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// `x => x + 1`
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Empty,
    Expr(Expr),
    Block(Block),
    Var(VarDecl),
    If(IfStmt),
    For(ForStmt),
    While(WhileStmt),
    DoWhile(DoWhileStmt),
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Expr),
    Try(TryStmt),
    /// Hoisted: bound when the enclosing scope is entered.
    Function(FuncId),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub body: Vec<Stmt>,
    /// Declares `let`, `const` or functions directly, so it needs a scope.
    pub lexical: bool,
}

/// `var`, `let` or `const` with one or more declarators.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub kind: DeclKind,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: Atom,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub cond: Expr,
    pub then: Box<Stmt>,
    pub otherwise: Option<Box<Stmt>>,
}

/// `for (init; cond; update) body`. Every header part may be empty.
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Option<ForInit>,
    pub cond: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Stmt>,
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub cond: Expr,
    pub body: Box<Stmt>,
}

/// Body first, then the condition.
#[derive(Debug, Clone)]
pub struct DoWhileStmt {
    pub body: Box<Stmt>,
    pub cond: Expr,
}

/// At least one of `catch_clause` and `finally_block` is present.
#[derive(Debug, Clone)]
pub struct TryStmt {
    pub block: Block,
    pub catch_clause: Option<CatchClause>,
    pub finally_block: Option<Block>,
}

/// `catch (param) { ... }`. The binding is optional.
#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Atom>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    String(Atom),
    Boolean(bool),
    Null,
    Identifier(Atom),
    This,
    Object(Vec<ObjectProperty>),
    Function(FuncId),
    Member(MemberExpr),
    Call(CallExpr),
    New(CallExpr),
    Unary(UnaryExpr),
    /// `++` and `--`, prefix or postfix.
    Update(UpdateExpr),
    Binary(BinaryExpr),
    /// Short-circuiting `&&`, `||` and `??`.
    Logical(LogicalExpr),
    Conditional(ConditionalExpr),
    Assignment(AssignmentExpr),
    /// Comma operator. Evaluates to the last element.
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub struct ObjectProperty {
    pub key: PropertyName,
    pub value: Expr,
}

/// Property name in a literal or member access.
#[derive(Debug, Clone)]
pub enum PropertyName {
    /// `a.b`, `{ b: 1 }`, `{ "b": 1 }`
    Named(Atom),
    /// `a[expr]`, `{ [expr]: 1 }`
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct MemberExpr {
    pub object: Box<Expr>,
    pub property: PropertyName,
}

/// Shared by calls and `new`.
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub arguments: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct UpdateExpr {
    pub operator: UpdateOp,
    /// An identifier or member expression.
    pub argument: Box<Expr>,
    pub prefix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub operator: UnaryOp,
    pub argument: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub operator: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone)]
pub struct LogicalExpr {
    pub operator: LogicalOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// `cond ? then : otherwise`
#[derive(Debug, Clone)]
pub struct ConditionalExpr {
    pub cond: Box<Expr>,
    pub then: Box<Expr>,
    pub otherwise: Box<Expr>,
}

/// The target is an identifier or member expression.
#[derive(Debug, Clone)]
pub struct AssignmentExpr {
    pub operator: AssignmentOp,
    pub target: Box<Expr>,
    pub value: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl AssignmentOp {
    /// The binary operator a compound assignment applies.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignmentOp::Assign => None,
            AssignmentOp::AddAssign => Some(BinaryOp::Add),
            AssignmentOp::SubAssign => Some(BinaryOp::Sub),
            AssignmentOp::MulAssign => Some(BinaryOp::Mul),
            AssignmentOp::DivAssign => Some(BinaryOp::Div),
            AssignmentOp::ModAssign => Some(BinaryOp::Mod),
        }
    }
}
