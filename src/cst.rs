//! The concrete syntax tree: the resolver's read-only input. `spec.md`
//! §6 "CST input", SPEC_FULL §3 "CST contract types".
//!
//! Modeled, not parsed — no lexer/parser logic lives here, mirroring
//! `mmcc`'s own `types::ast` module boundary (surface syntax the later
//! phases only ever read).

use std::rc::Rc;
use crate::diag::Span;
use crate::interner::Ident;

#[derive(Clone, Debug)]
pub struct Typespec {
  pub span: Span,
  pub kind: TypespecKind,
}

#[derive(Clone, Debug)]
pub enum TypespecKind {
  /// A possibly-qualified name, e.g. `u32`, `my::box[[u32]]`.
  Named(Path),
  Pointer(Rc<Typespec>),
  Slice(Rc<Typespec>),
  Array(Rc<Expr>, Rc<Typespec>),
  Function(Vec<Rc<Typespec>>, Rc<Typespec>),
  /// `typeof(expr)` (`spec.md` §4.4 "Typespec resolution").
  Typeof(Rc<Expr>),
}

/// A `::`-separated path, each element optionally carrying template
/// arguments (`spec.md` §4.4 "Symbol lookup (`::` paths)").
#[derive(Clone, Debug)]
pub struct Path {
  pub rooted: bool,
  pub elements: Vec<PathElement>,
}

#[derive(Clone, Debug)]
pub struct PathElement {
  pub name: Ident,
  pub span: Span,
  pub template_args: Option<Vec<Rc<Typespec>>>,
}

#[derive(Clone, Debug)]
pub struct Expr {
  pub span: Span,
  pub kind: ExprKind,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
  Path(Path),
  Boolean(bool),
  /// Raw literal text plus optional suffix (`spec.md` §4.4 "Integer
  /// literal suffix → type mapping").
  Integer { text: Rc<str>, suffix: Option<Rc<str>> },
  /// A character literal; becomes an untyped integer of the code point's
  /// value (`spec.md` §4.4).
  Character(u32),
  Bytes(Rc<str>),
  ArrayLiteral { ty: Option<Rc<Typespec>>, elements: Vec<Rc<Expr>>, ellipsis: Option<Rc<Expr>> },
  SliceLiteral { ty: Rc<Typespec>, elements: Vec<Rc<Expr>> },
  Cast { ty: Rc<Typespec>, expr: Rc<Expr> },
  Call { callee: Rc<Expr>, args: Vec<Rc<Expr>> },
  Syscall { args: Vec<Rc<Expr>> },
  Index { base: Rc<Expr>, index: Rc<Expr> },
  SliceAccess { base: Rc<Expr>, begin: Option<Rc<Expr>>, end: Option<Rc<Expr>> },
  Sizeof(Rc<Typespec>),
  Alignof(Rc<Typespec>),
  Unary { op: UnaryOp, expr: Rc<Expr> },
  Binary { op: BinaryOp, lhs: Rc<Expr>, rhs: Rc<Expr> },
  StructLiteral { ty: Rc<Typespec>, fields: Vec<(Ident, Span, Rc<Expr>)> },
  Member { base: Rc<Expr>, name: Ident, name_span: Span },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp { Not, Pos, Neg, BitNot, AddressOf, Countof, Deref }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
  Or, And, Eq, Ne, Lt, Le, Gt, Ge, Add, Sub, Mul, Div, BitOr, BitXor, BitAnd,
}

#[derive(Clone, Debug)]
pub struct Block {
  pub span: Span,
  pub statements: Vec<Rc<Stmt>>,
}

#[derive(Clone, Debug)]
pub struct Stmt {
  pub span: Span,
  pub kind: StmtKind,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
  /// One or more conditionals; the last may have no condition (`else`).
  If(Vec<(Option<Rc<Expr>>, Block)>),
  ForRange { var: Ident, var_span: Span, begin: Rc<Expr>, end: Rc<Expr>, body: Block },
  ForExpr { cond: Rc<Expr>, body: Block },
  Break,
  Continue,
  Return(Option<Rc<Expr>>),
  Defer(Rc<Stmt>),
  Block(Block),
  Assign { lhs: Rc<Expr>, rhs: Rc<Expr> },
  ExprStmt(Rc<Expr>),
  VariableDecl { name: Ident, name_span: Span, ty: Option<Rc<Typespec>>, init: Rc<Expr> },
  ConstantDecl { name: Ident, name_span: Span, ty: Option<Rc<Typespec>>, init: Rc<Expr> },
}

/// A top-level (or struct-member, or namespace-nested) declaration.
#[derive(Clone, Debug)]
pub struct Decl {
  pub span: Span,
  pub name: Ident,
  pub name_span: Span,
  pub kind: DeclKind,
}

#[derive(Clone, Debug)]
pub enum DeclKind {
  Variable { ty: Option<Rc<Typespec>>, init: Option<Rc<Expr>>, extern_: bool },
  Constant { ty: Option<Rc<Typespec>>, init: Rc<Expr> },
  Function { params: Vec<Param>, ret: Rc<Typespec>, body: Option<Block>, extern_: bool },
  Struct { members: Vec<StructMember> },
  Alias(Rc<Typespec>),
  /// `extend T decl` (`spec.md` §4.4 "Extensions").
  Extend { target: Rc<Typespec>, decl: Rc<Decl> },
  /// A function or struct declaration made generic over `params`
  /// (`spec.md` §4.4 "Templates").
  Template { params: Vec<Ident>, inner: Rc<Decl> },
  Import { path: Rc<str> },
  Namespace { path: Vec<Ident>, decls: Vec<Rc<Decl>> },
}

#[derive(Clone, Debug)]
pub struct Param {
  pub name: Ident,
  pub name_span: Span,
  pub ty: Rc<Typespec>,
}

#[derive(Clone, Debug)]
pub enum StructMember {
  Variable { name: Ident, name_span: Span, ty: Rc<Typespec> },
  Decl(Rc<Decl>),
}

/// A parsed module: one file's top-level declarations plus its own
/// namespace path, import list, and source path (`spec.md` §4.4 "Module
/// prelude").
#[derive(Clone, Debug)]
pub struct Module {
  pub path: Rc<str>,
  pub namespace: Vec<Ident>,
  pub decls: Vec<Rc<Decl>>,
}
