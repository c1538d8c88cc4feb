//! The typed intermediate representation. `spec.md` §3 "TIR expression
//! node", §6 "Back-end contract".
//!
//! Grounded on `build_mir.rs`'s MIR node shapes (`TyKind`, `ExprKind`,
//! `PlaceKind`), applied one phase earlier: this is the *typed surface*
//! IR the resolver produces, not the lowered form the (out-of-scope)
//! back-end would further reduce to.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;
use num::BigInt;
pub use crate::cst::{BinaryOp, UnaryOp};
use crate::diag::Span;
use crate::interner::Ident;
use crate::symbol::{Symbol, SymbolTableRef};
use crate::types::Type;
use crate::value::Value;

/// Immutable after construction (`spec.md` §3): every TIR node is built
/// once by the resolver and never mutated again.
#[derive(Debug, Clone)]
pub struct Expr {
  pub span: Span,
  pub ty: &'static Type,
  pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
  Identifier(Rc<Symbol>),
  Boolean(bool),
  Integer(BigInt),
  /// The backing bytes-literal static symbol this expression's slice
  /// value points at, plus its declared (NUL-excluded) length (`spec.md`
  /// §4.4 "Bytes literals allocate a new static array constant").
  Bytes { backing: Ident, len: u64 },
  /// `spec.md` §4.3 "Literal array": trailing `ellipsis`, if present, is
  /// expanded by the evaluator, not here.
  LiteralArray { elements: Vec<Rc<Expr>>, ellipsis: Option<Rc<Expr>> },
  LiteralSlice { pointer: Rc<Expr>, count: Rc<Expr> },
  Cast(Rc<Expr>),
  Call { callee: Rc<Expr>, args: Vec<Rc<Expr>> },
  Syscall { args: Vec<Rc<Expr>> },
  Index { base: Rc<Expr>, index: Rc<Expr> },
  SliceAccess { base: Rc<Expr>, begin: Option<Rc<Expr>>, end: Option<Rc<Expr>> },
  Sizeof(&'static Type),
  Alignof(&'static Type),
  Unary { op: UnaryOp, expr: Rc<Expr> },
  Binary { op: BinaryOp, lhs: Rc<Expr>, rhs: Rc<Expr> },
  /// Fields in declaration order matching the struct's member-variable
  /// list (`spec.md` §4.4 "Call"/"struct-literal").
  StructLiteral { fields: Vec<(Ident, Rc<Expr>)> },
  Member { base: Rc<Expr>, name: Ident },
}

#[derive(Debug, Clone)]
pub struct Block {
  pub span: Span,
  pub table: SymbolTableRef,
  pub statements: Vec<Rc<Stmt>>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
  pub span: Span,
  pub kind: StmtKind,
}

/// A node in the `defer` singly-linked chain (`spec.md` §4.4 "Defer
/// chains as linked lists", §9). `break`/`continue`/`return` capture the
/// head in effect at the jump.
#[derive(Debug)]
pub struct DeferNode {
  pub stmt: Rc<Stmt>,
  pub prev: Option<Rc<DeferNode>>,
}

pub type DeferHead = Option<Rc<DeferNode>>;

#[derive(Debug, Clone)]
pub enum StmtKind {
  /// One or more conditionals; the last may have no condition (`else`).
  If(Vec<(Option<Rc<Expr>>, Block)>),
  ForRange { var: Rc<Symbol>, begin: Rc<Expr>, end: Rc<Expr>, body: Block },
  ForExpr { cond: Rc<Expr>, body: Block },
  Break { defer_head: DeferHead, loop_anchor: DeferHead },
  Continue { defer_head: DeferHead, loop_anchor: DeferHead },
  Return { expr: Option<Rc<Expr>>, defer_head: DeferHead },
  Defer(Rc<Stmt>),
  Block(Block),
  Assign { lhs: Rc<Expr>, rhs: Rc<Expr> },
  ExprStmt(Rc<Expr>),
  /// Locals defer evaluation to runtime (`spec.md` §4.4); the initializer
  /// is still fully resolved TIR.
  VariableDecl { symbol: Rc<Symbol>, init: Rc<Expr> },
  /// Every constant's initializer has already been evaluated and frozen
  /// into `symbol` by the time this node exists (`spec.md` §4.4).
  ConstantDecl { symbol: Rc<Symbol> },
}

/// A resolved function: parameters and a deferred body (`spec.md` §4.4
/// "Function resolution", §9 "Mutually recursive functions").
#[derive(Debug)]
pub struct Function {
  pub name: Ident,
  pub span: Span,
  /// The function's own `Function` type (params + return).
  pub ty: &'static Type,
  pub address: crate::address::Address,
  /// Holds parameter symbols plus the synthetic return-value symbol
  /// (`spec.md` §4.4 "Function resolution").
  pub outer_table: SymbolTableRef,
  pub params: Vec<Rc<Symbol>>,
  pub return_symbol: Rc<Symbol>,
  /// `None` until the deferred body-resolution pass runs.
  pub body: OnceCell<Block>,
  /// The function's local-stack low-water mark, extended as each local is
  /// declared (`spec.md` §4.4, §8 "each local variable's address has
  /// `rbp_offset < 0` and `|rbp_offset| <= |enclosing_function.
  /// local_stack_offset|`").
  pub locals_low_water: Cell<i32>,
  pub extern_: bool,
}

impl Function {
  #[must_use] pub fn is_complete(&self) -> bool { self.body.get().is_some() || self.extern_ }
}

/// `spec.md` §6 "Back-end contract": a published static symbol, with a
/// frozen value or `None` for an extern.
pub struct StaticSymbol {
  pub name: Ident,
  pub span: Span,
  pub value: Option<&'static Value>,
}

/// The resolver's output for one module: every static symbol it published
/// plus every function it resolved, ready for the (out-of-scope) back end.
#[derive(Default)]
pub struct ResolvedModule {
  pub statics: Vec<StaticSymbol>,
  pub functions: Vec<Rc<Function>>,
}
