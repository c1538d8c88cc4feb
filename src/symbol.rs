//! Symbols and lexically-nested symbol tables. `spec.md` §3 "Symbol",
//! "Symbol table", §4.2.
//!
//! Grounded directly on `entity.rs`'s `Entity` enum (`Prim | Type | Proc |
//! Global | Const`), generalized to `spec.md`'s `Type | Variable | Constant
//! | Function | Namespace | Template`, and its `ForwardDeclared`/
//! `Checked` two-phase pattern generalized into the declare/complete split
//! `spec.md` §4.4 and §9 describe (here: [`crate::tir::Function::body`]
//! and [`crate::types::StructType::complete`] are the two places that
//! "completion" actually happens; a `Symbol` itself is built once and
//! never mutated).

use std::cell::RefCell;
use std::rc::Rc;
use hashbrown::HashMap;
use crate::address::Address;
use crate::diag::Span;
use crate::interner::{Ident, Interner};
use crate::tir::Function;
use crate::types::Type;
use crate::value::Value;

/// A declaration a name in some scope resolves to.
#[derive(Debug)]
pub struct Symbol {
  pub name: Ident,
  pub span: Span,
  pub kind: SymbolKind,
}

#[derive(Debug)]
pub enum SymbolKind {
  Type(&'static Type),
  /// Globals are evaluated and frozen just like constants (`spec.md`
  /// §4.4 "Variable/constant resolution": "Globals and **every**
  /// constant have their initializer evaluated and the value frozen");
  /// locals carry `value: None` since evaluation is deferred to runtime.
  Variable { ty: &'static Type, address: Address, mutable: bool, value: Option<&'static Value> },
  /// Every constant is evaluated and frozen at declaration time
  /// (`spec.md` §4.4 "Variable/constant resolution").
  Constant { ty: &'static Type, address: Address, value: &'static Value },
  Function(Rc<Function>),
  /// A namespace owns its own inner table (`spec.md` §4.2); both plain
  /// `namespace a::b::c` blocks and struct inner-member tables use this.
  Namespace(SymbolTableRef),
  Template(Rc<crate::resolve::template::Template>),
}

impl Symbol {
  #[must_use] pub fn kind_name(&self) -> &'static str {
    match &self.kind {
      SymbolKind::Type(_) => "type",
      SymbolKind::Variable { .. } => "variable",
      SymbolKind::Constant { .. } => "constant",
      SymbolKind::Function(_) => "function",
      SymbolKind::Namespace(_) => "namespace",
      SymbolKind::Template(_) => "template",
    }
  }

  #[must_use] pub fn as_type(&self) -> Option<&'static Type> {
    match self.kind { SymbolKind::Type(t) => Some(t), _ => None }
  }

  #[must_use] pub fn as_namespace(&self) -> Option<&SymbolTableRef> {
    match &self.kind { SymbolKind::Namespace(t) => Some(t), _ => None }
  }

  #[must_use] pub fn as_function(&self) -> Option<&Rc<Function>> {
    match &self.kind { SymbolKind::Function(f) => Some(f), _ => None }
  }

  #[must_use] pub fn as_template(&self) -> Option<&Rc<crate::resolve::template::Template>> {
    match &self.kind { SymbolKind::Template(t) => Some(t), _ => None }
  }

  /// The type a value-producing use of this symbol has, or `None` if the
  /// symbol cannot be used as a value at all (`spec.md` §7 "use of
  /// type/namespace/template where value expected").
  #[must_use] pub fn value_type(&self) -> Option<&'static Type> {
    match &self.kind {
      SymbolKind::Variable { ty, .. } | SymbolKind::Constant { ty, .. } => Some(*ty),
      SymbolKind::Function(f) => Some(f.ty),
      SymbolKind::Type(_) | SymbolKind::Namespace(_) | SymbolKind::Template(_) => None,
    }
  }
}

/// An ordered map from name to symbol plus a parent pointer. `spec.md`
/// §4.2: `new(parent)`, `insert`, `lookup_local`, `lookup`, `freeze`.
#[derive(Debug)]
pub struct SymbolTable {
  parent: Option<SymbolTableRef>,
  order: Vec<Ident>,
  entries: HashMap<Ident, Rc<Symbol>>,
  frozen: bool,
}

pub type SymbolTableRef = Rc<RefCell<SymbolTable>>;

impl SymbolTable {
  #[must_use] pub fn new_root() -> SymbolTableRef {
    Rc::new(RefCell::new(Self { parent: None, order: Vec::new(), entries: HashMap::new(), frozen: false }))
  }

  #[must_use] pub fn new_child(parent: &SymbolTableRef) -> SymbolTableRef {
    Rc::new(RefCell::new(Self {
      parent: Some(Rc::clone(parent)), order: Vec::new(), entries: HashMap::new(), frozen: false,
    }))
  }

  #[must_use] pub fn is_frozen(&self) -> bool { self.frozen }

  #[must_use] pub fn parent(&self) -> Option<SymbolTableRef> { self.parent.clone() }

  /// `spec.md` §4.2: "after freezing no insertions occur." Enforced as an
  /// internal-consistency assertion, not a user error.
  pub fn freeze(&mut self) { self.frozen = true; }

  #[must_use] pub fn lookup_local(&self, name: Ident) -> Option<Rc<Symbol>> {
    self.entries.get(&name).cloned()
  }

  /// Walk the parent chain.
  #[must_use] pub fn lookup(table: &SymbolTableRef, name: Ident) -> Option<Rc<Symbol>> {
    let mut cur = Rc::clone(table);
    loop {
      if let Some(sym) = cur.borrow().lookup_local(name) { return Some(sym) }
      let next = cur.borrow().parent.clone();
      match next { Some(p) => cur = p, None => return None }
    }
  }

  /// `spec.md` §4.2: "`insert` fails fatally on collision unless shadowing
  /// is explicitly permitted (locals may shadow enclosing scopes; globals
  /// may not redeclare)." `allow_shadow` only ever suppresses the
  /// *enclosing*-scope check the caller performs separately (via
  /// `lookup`); same-scope collisions are always fatal regardless.
  pub fn insert(table: &SymbolTableRef, interner: &Interner, symbol: Rc<Symbol>) {
    assert!(!table.borrow().frozen, "insert into a frozen symbol table");
    let name = symbol.name;
    let prior = table.borrow().entries.get(&name).cloned();
    if let Some(prior) = prior {
      crate::fatal!(&symbol.span, "redeclaration of '{}', previously declared at {}",
        interner.resolve(name), prior.span);
    }
    table.borrow_mut().order.push(name);
    table.borrow_mut().entries.insert(name, symbol);
  }

  #[must_use] pub fn iter_ordered(&self) -> Vec<(Ident, Rc<Symbol>)> {
    self.order.iter().map(|&n| (n, self.entries[&n].clone())).collect()
  }

  #[must_use] pub fn len(&self) -> usize { self.order.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.order.is_empty() }
}

/// Recursively union `src` into `dst` (`spec.md` §4.2 "namespace merging
/// (for imports) recursively unions child tables, treating duplicate
/// non-namespace symbols as redeclarations **unless** the symbols are
/// pointer-identical (same import seen twice is idempotent)").
pub fn merge_namespace(dst: &SymbolTableRef, src: &SymbolTableRef, interner: &Interner) {
  for (name, sym) in src.borrow().iter_ordered() {
    let existing = dst.borrow().lookup_local(name);
    match existing {
      None => SymbolTable::insert(dst, interner, sym),
      Some(prev) => match (&prev.kind, &sym.kind) {
        (SymbolKind::Namespace(prev_inner), SymbolKind::Namespace(new_inner)) => {
          merge_namespace(prev_inner, new_inner, interner);
        }
        _ if Rc::ptr_eq(&prev, &sym) => {}
        _ => crate::fatal!(&sym.span, "redeclaration of '{}' while merging imports, previously declared at {}",
          interner.resolve(name), prev.span),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::registry::TypeRegistry;

  fn mk_var(interner: &mut Interner, name: &str, ty: &'static Type, span: Span) -> Rc<Symbol> {
    Rc::new(Symbol {
      name: interner.intern(name), span,
      kind: SymbolKind::Variable {
        ty, address: Address::Local { rbp_offset: -8 }, mutable: true, value: None,
      },
    })
  }

  fn span() -> Span { Span::synthetic() }

  #[test]
  fn lookup_walks_parent_chain() {
    let mut interner = Interner::new();
    let reg = TypeRegistry::new();
    let root = SymbolTable::new_root();
    let x = mk_var(&mut interner, "x", reg.type_byte(), span());
    SymbolTable::insert(&root, &interner, x);
    let child = SymbolTable::new_child(&root);
    let name = interner.intern("x");
    assert!(child.borrow().lookup_local(name).is_none());
    assert!(SymbolTable::lookup(&child, name).is_some());
  }

  #[test]
  #[should_panic(expected = "insert into a frozen symbol table")]
  fn insert_after_freeze_panics() {
    let mut interner = Interner::new();
    let reg = TypeRegistry::new();
    let root = SymbolTable::new_root();
    root.borrow_mut().freeze();
    let x = mk_var(&mut interner, "x", reg.type_byte(), span());
    SymbolTable::insert(&root, &interner, x);
  }

  #[test]
  fn merge_same_import_twice_is_idempotent() {
    let mut interner = Interner::new();
    let reg = TypeRegistry::new();
    let dst = SymbolTable::new_root();
    let src = SymbolTable::new_root();
    let x = mk_var(&mut interner, "x", reg.type_byte(), span());
    SymbolTable::insert(&src, &interner, Rc::clone(&x));
    merge_namespace(&dst, &src, &interner);
    merge_namespace(&dst, &src, &interner);
    assert_eq!(dst.borrow().len(), 1);
  }
}
