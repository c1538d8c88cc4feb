//! Template instantiation. `spec.md` §4.4 "Templates": a function or
//! struct declaration made generic over a list of type parameters,
//! instantiated on first use and memoized per distinct argument list.

use std::cell::RefCell;
use std::rc::Rc;
use hashbrown::HashMap;
use crate::cst::{Decl, DeclKind, Typespec};
use crate::diag::Span;
use crate::interner::Ident;
use crate::symbol::{Symbol, SymbolKind, SymbolTable, SymbolTableRef};
use crate::types::Type;
use super::{item, typespec, DeclCtx, Resolver};

/// A template's captured declaration environment, fixed at the point the
/// `template[[T, ...]] decl` form was resolved (`spec.md` §4.4: "the
/// template's *own* declaring scope, not the instantiation site, supplies
/// the enclosing lookup context for its body").
pub struct Template {
  pub params: Vec<Ident>,
  pub inner: Rc<Decl>,
  pub capture_prefix: Rc<str>,
  pub parent_table: SymbolTableRef,
  /// Keyed by the canonicalized argument-type suffix, e.g. `"[[u64]]"`
  /// (`spec.md` §4.4 "Static symbol naming": "template instantiations are
  /// named `name[[Arg1, Arg2]]`").
  pub memo: RefCell<HashMap<String, Rc<Symbol>>>,
}

fn canonical_suffix(arg_types: &[&'static Type]) -> String {
  format!("[[{}]]", arg_types.iter().map(|t| t.name).collect::<Vec<_>>().join(", "))
}

fn join_prefix(base: &str, suffix: &str) -> Rc<str> {
  if base.is_empty() { Rc::from(suffix) } else { Rc::from(format!("{base}.{suffix}")) }
}

/// Instantiate `t` with `args` (resolved against the *use* site's `ctx`,
/// per `spec.md` §4.4), memoizing by the resulting canonical name.
///
/// Struct instantiations cache their (still-incomplete) symbol before
/// completing the body, so a self-referential member (e.g. `*List[[T]]`
/// inside `struct List[[T]]`) resolves back to the same in-flight
/// instantiation instead of recursing forever (`spec.md` §9 "Cyclic
/// references", generalized from plain structs to template instances).
pub fn instantiate(r: &Resolver, ctx: &DeclCtx, t: &Rc<Template>, args: &[Rc<Typespec>], span: &Span) -> Rc<Symbol> {
  if t.params.len() != args.len() {
    crate::fatal!(span, "template expects {} argument(s), found {}", t.params.len(), args.len());
  }
  let arg_types: Vec<&'static Type> = args.iter().map(|a| typespec::resolve_typespec(r, ctx, a)).collect();
  let key = canonical_suffix(&arg_types);
  if let Some(sym) = t.memo.borrow().get(&key) {
    return Rc::clone(sym);
  }

  let inst_table = SymbolTable::new_child(&t.parent_table);
  for (&param, &arg_ty) in t.params.iter().zip(arg_types.iter()) {
    let param_sym = Rc::new(Symbol { name: param, span: span.clone(), kind: SymbolKind::Type(arg_ty) });
    SymbolTable::insert(&inst_table, &r.interner.borrow(), param_sym);
  }

  let name_text = r.interner.borrow().resolve(t.inner.name).to_owned();
  let inst_ctx = DeclCtx { prefix: join_prefix(&t.capture_prefix, &format!("{name_text}{key}")), table: inst_table };

  match &t.inner.kind {
    DeclKind::Struct { members } => {
      item::predeclare(r, &inst_ctx, &t.inner);
      let sym = inst_ctx.table.borrow().lookup_local(t.inner.name)
        .expect("template struct predeclaration did not insert its own symbol");
      t.memo.borrow_mut().insert(key, Rc::clone(&sym));
      item::complete_struct(r, &inst_ctx, &t.inner, members);
      sym
    }
    _ => {
      item::resolve_decl(r, &inst_ctx, &t.inner);
      item::complete_decl(r, &inst_ctx, &t.inner);
      let sym = inst_ctx.table.borrow().lookup_local(t.inner.name)
        .expect("template instantiation did not insert its own symbol");
      t.memo.borrow_mut().insert(key, Rc::clone(&sym));
      sym
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diag::Span;
  use crate::interner::Interner;
  use crate::types::registry::TypeRegistry;

  #[test]
  fn canonical_suffix_matches_spec_example() {
    let types = TypeRegistry::new();
    let u64_ty = types.type_integer(crate::types::IntWidth::W64, false);
    assert_eq!(canonical_suffix(&[u64_ty]), "[[u64]]");
  }

  #[test]
  fn join_prefix_handles_empty_base() {
    assert_eq!(&*join_prefix("", "foo"), "foo");
    assert_eq!(&*join_prefix("mod", "foo"), "mod.foo");
  }

  #[test]
  fn repeated_instantiation_with_same_args_is_memoized() {
    // A constant template `template[[T]] const zero: T = 0 as T;`
    // instantiated twice with the same argument returns the same symbol.
    let r = Resolver::new(super::super::Config::default());
    let mut interner = r.interner.borrow_mut();
    let t_param = interner.intern("T");
    let const_name = interner.intern("zero");
    drop(interner);
    let span = Span::synthetic();
    let init = Rc::new(crate::cst::Expr { span: span.clone(), kind: crate::cst::ExprKind::Integer { text: Rc::from("0"), suffix: None } });
    let inner = Rc::new(Decl {
      span: span.clone(), name: const_name, name_span: span.clone(),
      kind: DeclKind::Constant { ty: None, init },
    });
    let template = Rc::new(Template {
      params: vec![t_param], inner, capture_prefix: Rc::from(""),
      parent_table: Rc::clone(&r.global), memo: RefCell::new(HashMap::new()),
    });
    let ctx = DeclCtx { prefix: Rc::from(""), table: Rc::clone(&r.global) };
    let u64_ts = Rc::new(Typespec {
      span: span.clone(),
      kind: crate::cst::TypespecKind::Named(crate::cst::Path {
        rooted: false,
        elements: vec![crate::cst::PathElement { name: { let mut i = r.interner.borrow_mut(); i.intern("u64") }, span: span.clone(), template_args: None }],
      }),
    });
    // `u64` resolves via the resolver's own builtin-type seeding
    // (`Resolver::seed_builtin_types`); no fixture symbol needed here.
    let a = instantiate(&r, &ctx, &template, std::slice::from_ref(&u64_ts), &span);
    let b = instantiate(&r, &ctx, &template, std::slice::from_ref(&u64_ts), &span);
    assert!(Rc::ptr_eq(&a, &b));
  }
}
