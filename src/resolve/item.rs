//! Top-level (and struct-member, and namespace-nested) declaration
//! resolution, plus `::`-path symbol lookup. `spec.md` §4.4
//! "Declaration order", "Variable/constant resolution", "Function
//! resolution", "Struct completion", "Extensions", "Aliases", "Symbol
//! lookup (`::` paths)", "Static symbol naming".

use std::rc::Rc;
use hashbrown::HashSet;
use crate::address::Address;
use crate::cst::{self, Decl, DeclKind, Path, PathElement, StructMember};
use crate::diag::{fatal, Span};
use crate::interner::Ident;
use crate::symbol::{Symbol, SymbolKind, SymbolTable, SymbolTableRef};
use crate::tir::{Function, StaticSymbol};
use crate::types::{layout_struct, Member};
use super::{template, typespec, DeclCtx, Resolver};

pub(crate) fn round8(n: u64) -> u64 { n.div_ceil(8) * 8 }

// ---------------------------------------------------------------------
// `::`-path lookup (`spec.md` §4.4 "Symbol lookup")
// ---------------------------------------------------------------------

pub fn resolve_path(r: &Resolver, ctx: &DeclCtx, path: &Path) -> Rc<Symbol> {
  let start_table = if path.rooted { Rc::clone(&r.global) } else { Rc::clone(&ctx.table) };
  let mut elems = path.elements.iter();
  let first = elems.next().expect("empty path in CST");
  let sym = lookup(r, &start_table, first);
  let mut sym = apply_template_args(r, ctx, &sym, first);
  for elem in elems {
    let inner_table = member_table_of(r, &sym, &elem.span);
    let next = lookup_local(r, &inner_table, elem);
    sym = apply_template_args(r, ctx, &next, elem);
  }
  sym
}

fn member_table_of(r: &Resolver, sym: &Rc<Symbol>, span: &Span) -> SymbolTableRef {
  match &sym.kind {
    SymbolKind::Namespace(t) => Rc::clone(t),
    SymbolKind::Type(ty) => match ty.as_struct() {
      Some(st) => Rc::clone(&st.member_table),
      None => fatal(span, format_args!("'{}' has no members", ty.name)),
    },
    _ => fatal(span, format_args!(
      "'{}' is not a namespace or type", r.interner.borrow().resolve(sym.name))),
  }
}

fn lookup(r: &Resolver, table: &SymbolTableRef, elem: &PathElement) -> Rc<Symbol> {
  if elem.template_args.is_some() {
    if let Some(sym) = lookup_template(table, elem.name) {
      return sym;
    }
  }
  SymbolTable::lookup(table, elem.name).unwrap_or_else(|| fatal(&elem.span, format_args!(
    "use of undeclared identifier '{}'", r.interner.borrow().resolve(elem.name))))
}

/// Find the nearest enclosing `Template` symbol named `name`, skipping past
/// any nearer non-template shadow (`spec.md` §9 "Cyclic references",
/// generalized to template instances). Inside `struct List[[T]] { next:
/// *List[[T]], val: T }`, `predeclare_struct` has already inserted the
/// in-flight (incomplete) struct symbol under the plain name `List` in the
/// very scope the member typespecs resolve against, so a self-referential
/// `List[[T]]` must walk past that local shadow to reach the `Template`
/// that drives `instantiate`'s memo check — otherwise it would resolve to
/// a non-template `Type` symbol carrying template arguments it can't use.
fn lookup_template(table: &SymbolTableRef, name: Ident) -> Option<Rc<Symbol>> {
  let mut cur = Rc::clone(table);
  loop {
    if let Some(sym) = cur.borrow().lookup_local(name) {
      if matches!(sym.kind, SymbolKind::Template(_)) { return Some(sym) }
    }
    match cur.borrow().parent() {
      Some(p) => cur = p,
      None => return None,
    }
  }
}

fn lookup_local(r: &Resolver, table: &SymbolTableRef, elem: &PathElement) -> Rc<Symbol> {
  table.borrow().lookup_local(elem.name).unwrap_or_else(|| fatal(&elem.span, format_args!(
    "no member named '{}'", r.interner.borrow().resolve(elem.name))))
}

fn apply_template_args(r: &Resolver, ctx: &DeclCtx, sym: &Rc<Symbol>, elem: &PathElement) -> Rc<Symbol> {
  match (&sym.kind, &elem.template_args) {
    (SymbolKind::Template(t), Some(args)) => template::instantiate(r, ctx, t, args, &elem.span),
    (SymbolKind::Template(_), None) => fatal(&elem.span, format_args!(
      "use of template '{}' without instantiation", r.interner.borrow().resolve(elem.name))),
    (_, Some(_)) => fatal(&elem.span, format_args!(
      "'{}' is not a template", r.interner.borrow().resolve(elem.name))),
    (_, None) => Rc::clone(sym),
  }
}

// ---------------------------------------------------------------------
// Three-phase module driver: predeclare → resolve → complete
// ---------------------------------------------------------------------

pub fn predeclare(r: &Resolver, ctx: &DeclCtx, decl: &Rc<Decl>) {
  match &decl.kind {
    DeclKind::Struct { .. } => predeclare_struct(r, ctx, decl),
    DeclKind::Namespace { path, decls } => process_namespace(r, ctx, path, decls),
    _ => {}
  }
}

pub fn resolve_decl(r: &Resolver, ctx: &DeclCtx, decl: &Rc<Decl>) {
  match &decl.kind {
    DeclKind::Variable { ty, init, extern_ } => resolve_variable(r, ctx, decl, ty.as_deref(), init.as_deref(), *extern_),
    DeclKind::Constant { ty, init } => resolve_constant(r, ctx, decl, ty.as_deref(), init),
    DeclKind::Function { params, ret, body, extern_ } => resolve_function(r, ctx, decl, params, ret, body.as_ref(), *extern_),
    DeclKind::Struct { .. } => {} // symbol already inserted in `predeclare`
    DeclKind::Alias(ts) => resolve_alias(r, ctx, decl, ts),
    DeclKind::Extend { target, decl: inner } => resolve_extend(r, ctx, target, inner),
    DeclKind::Template { params, inner } => resolve_template(r, ctx, decl, params, inner),
    DeclKind::Import { .. } | DeclKind::Namespace { .. } => {} // handled earlier / in `predeclare`
  }
}

pub fn complete_decl(r: &Resolver, ctx: &DeclCtx, decl: &Rc<Decl>) {
  if let DeclKind::Struct { members } = &decl.kind {
    complete_struct(r, ctx, decl, members);
  }
}

// ---------------------------------------------------------------------
// Namespaces (`spec.md` §4.4 "Module prelude")
// ---------------------------------------------------------------------

fn process_namespace(r: &Resolver, ctx: &DeclCtx, path: &[Ident], decls: &[Rc<Decl>]) {
  let mut cur_table = Rc::clone(&ctx.table);
  let mut cur_prefix = ctx.prefix.clone();
  for &name in path {
    let existing = cur_table.borrow().lookup_local(name);
    let inner = if let Some(sym) = existing {
      match &sym.kind {
        SymbolKind::Namespace(t) => Rc::clone(t),
        _ => fatal(&sym.span, format_args!("'{}' already declared and is not a namespace", r.interner.borrow().resolve(name))),
      }
    } else {
      let inner = SymbolTable::new_root();
      let sym = Rc::new(Symbol { name, span: Span::synthetic(), kind: SymbolKind::Namespace(Rc::clone(&inner)) });
      SymbolTable::insert(&cur_table, &r.interner.borrow(), sym);
      inner
    };
    let part = r.interner.borrow().resolve(name).to_owned();
    cur_prefix = ctx.child_prefix_from(&cur_prefix, &part);
    cur_table = inner;
  }
  let nested_ctx = DeclCtx { prefix: cur_prefix, table: cur_table };
  for d in decls { predeclare(r, &nested_ctx, d); }
  for d in decls { resolve_decl(r, &nested_ctx, d); }
  for d in decls { complete_decl(r, &nested_ctx, d); }
}

impl DeclCtx {
  fn child_prefix_from(&self, base: &str, suffix: &str) -> Rc<str> {
    if base.is_empty() { Rc::from(suffix) } else { Rc::from(format!("{base}.{suffix}")) }
  }
}

// ---------------------------------------------------------------------
// Variables & constants (`spec.md` §4.4 "Variable/constant resolution")
// ---------------------------------------------------------------------

fn resolve_variable(r: &Resolver, ctx: &DeclCtx, decl: &Decl, ty: Option<&cst::Typespec>, init: Option<&Rc<cst::Expr>>, extern_: bool) {
  let declared_ty = ty.map(|t| typespec::resolve_typespec(r, ctx, t));
  let name_text = r.interner.borrow().resolve(decl.name).to_owned();
  let qualified = r.names.borrow_mut().normalize(&mut r.interner.borrow_mut(), &ctx.prefix, &name_text);
  let address = Address::Static { name: qualified, offset: 0 };

  if extern_ {
    let ty = declared_ty.unwrap_or_else(|| fatal(&decl.span, format_args!("extern variable '{name_text}' requires a type")));
    reject_unsized(r, &decl.name_span, ty, &name_text);
    let sym = Rc::new(Symbol { name: decl.name, span: decl.span.clone(),
      kind: SymbolKind::Variable { ty, address, mutable: true, value: None } });
    SymbolTable::insert(&ctx.table, &r.interner.borrow(), sym);
    r.publish_static(StaticSymbol { name: qualified, span: decl.span.clone(), value: None });
    return;
  }

  let init = init.unwrap_or_else(|| fatal(&decl.span, format_args!("variable '{name_text}' requires an initializer")));
  let init_tir = super::expr::resolve_expr(r, ctx, init);
  let ty = declared_ty.unwrap_or(init_tir.ty);
  let init_tir = super::expr::implicit_cast(r, &init_tir, ty);
  if !std::ptr::eq(init_tir.ty, ty) {
    fatal(&init.span, format_args!("initializer type does not match declared type of '{name_text}'"));
  }
  reject_unsized(r, &decl.name_span, ty, &name_text);

  let value = r.evaluator().eval_rvalue(&init_tir);
  let value: &'static crate::value::Value = r.freezer.alloc(value);
  let sym = Rc::new(Symbol { name: decl.name, span: decl.span.clone(),
    kind: SymbolKind::Variable { ty, address, mutable: true, value: Some(value) } });
  SymbolTable::insert(&ctx.table, &r.interner.borrow(), sym);
  r.publish_static(StaticSymbol { name: qualified, span: decl.span.clone(), value: Some(value) });
}

pub(crate) fn resolve_constant(r: &Resolver, ctx: &DeclCtx, decl: &Decl, ty: Option<&cst::Typespec>, init: &Rc<cst::Expr>) {
  let name_text = r.interner.borrow().resolve(decl.name).to_owned();
  let declared_ty = ty.map(|t| typespec::resolve_typespec(r, ctx, t));
  let init_tir = super::expr::resolve_expr(r, ctx, init);
  let result_ty = declared_ty.unwrap_or(init_tir.ty);
  let init_tir = super::expr::implicit_cast(r, &init_tir, result_ty);
  if !std::ptr::eq(init_tir.ty, result_ty) {
    fatal(&init.span, format_args!("initializer type does not match declared type of '{name_text}'"));
  }
  reject_unsized(r, &decl.name_span, result_ty, &name_text);

  let qualified = r.names.borrow_mut().normalize(&mut r.interner.borrow_mut(), &ctx.prefix, &name_text);
  let address = Address::Static { name: qualified, offset: 0 };
  let value = r.evaluator().eval_rvalue(&init_tir);
  let value: &'static crate::value::Value = r.freezer.alloc(value);
  let sym = Rc::new(Symbol { name: decl.name, span: decl.span.clone(),
    kind: SymbolKind::Constant { ty: result_ty, address, value } });
  SymbolTable::insert(&ctx.table, &r.interner.borrow(), sym);
  r.publish_static(StaticSymbol { name: qualified, span: decl.span.clone(), value: Some(value) });
}

pub(crate) fn reject_unsized(r: &Resolver, span: &Span, ty: &'static crate::types::Type, what: &str) {
  if ty.is_unsized_integer() {
    let _ = r;
    fatal(span, format_args!("'{what}' may not have an unsized integer type"));
  }
}

// ---------------------------------------------------------------------
// Functions (`spec.md` §4.4 "Function resolution")
// ---------------------------------------------------------------------

fn resolve_function(
  r: &Resolver, ctx: &DeclCtx, decl: &Rc<Decl>,
  params: &[cst::Param], ret: &cst::Typespec, body: Option<&cst::Block>, extern_: bool,
) {
  let name_text = r.interner.borrow().resolve(decl.name).to_owned();
  let outer_table = SymbolTable::new_child(&ctx.table);

  let mut offset: i32 = 0x10;
  let mut reversed = Vec::with_capacity(params.len());
  for p in params.iter().rev() {
    let ty = typespec::resolve_typespec(r, ctx, &p.ty);
    reject_unsized(r, &p.name_span, ty, &name_text);
    let sym = Rc::new(Symbol { name: p.name, span: p.name_span.clone(),
      kind: SymbolKind::Variable { ty, address: Address::Local { rbp_offset: offset }, mutable: true, value: None } });
    reversed.push(sym);
    offset += i32::try_from(round8(ty.size())).expect("parameter too large");
  }
  reversed.reverse();
  let param_syms = reversed;

  let ret_ty = typespec::resolve_typespec(r, ctx, ret);
  reject_unsized(r, &decl.name_span, ret_ty, &name_text);
  let return_name = r.interner.borrow_mut().intern("$return");
  let return_symbol = Rc::new(Symbol { name: return_name, span: decl.span.clone(),
    kind: SymbolKind::Variable { ty: ret_ty, address: Address::Local { rbp_offset: offset }, mutable: true, value: None } });

  for p in &param_syms { SymbolTable::insert(&outer_table, &r.interner.borrow(), Rc::clone(p)); }
  SymbolTable::insert(&outer_table, &r.interner.borrow(), Rc::clone(&return_symbol));

  let param_types: Vec<&'static crate::types::Type> = param_syms.iter()
    .map(|s| s.value_type().expect("parameter symbol without a type")).collect();
  let fn_ty = r.types.type_function(&param_types, ret_ty);

  let qualified = r.names.borrow_mut().normalize(&mut r.interner.borrow_mut(), &ctx.prefix, &name_text);
  let address = Address::Static { name: qualified, offset: 0 };

  let func = Rc::new(Function {
    name: decl.name, span: decl.span.clone(), ty: fn_ty, address, outer_table,
    params: param_syms, return_symbol, body: std::cell::OnceCell::new(),
    locals_low_water: std::cell::Cell::new(0), extern_,
  });
  let func_for_static = Rc::clone(&func);

  let sym = Rc::new(Symbol { name: decl.name, span: decl.span.clone(), kind: SymbolKind::Function(func) });
  SymbolTable::insert(&ctx.table, &r.interner.borrow(), sym);

  match body {
    Some(block) if !extern_ => r.queue_function_body(func_for_static, block.clone(), ctx.prefix.clone()),
    _ => {}
  }
}

// ---------------------------------------------------------------------
// Aliases (`spec.md` §4.4 "Aliases")
// ---------------------------------------------------------------------

fn resolve_alias(r: &Resolver, ctx: &DeclCtx, decl: &Decl, ts: &cst::Typespec) {
  let ty = typespec::resolve_typespec(r, ctx, ts);
  let sym = Rc::new(Symbol { name: decl.name, span: decl.span.clone(), kind: SymbolKind::Type(ty) });
  SymbolTable::insert(&ctx.table, &r.interner.borrow(), sym);
}

// ---------------------------------------------------------------------
// Extensions (`spec.md` §4.4 "Extensions")
// ---------------------------------------------------------------------

fn resolve_extend(r: &Resolver, ctx: &DeclCtx, target: &cst::Typespec, inner: &Rc<Decl>) {
  let target_ty = typespec::resolve_typespec(r, ctx, target);
  let st = target_ty.as_struct().unwrap_or_else(|| fatal(&target.span, format_args!(
    "'{}' is not a struct type and cannot be extended", target_ty.name)));
  let prefix: Rc<str> = Rc::from(r.interner.borrow().resolve(st.qualified_name).to_owned());
  let member_ctx = DeclCtx { prefix, table: Rc::clone(&st.member_table) };
  match &inner.kind {
    DeclKind::Constant { ty, init } => resolve_constant(r, &member_ctx, inner, ty.as_deref(), init),
    DeclKind::Function { params, ret, body, extern_ } => resolve_function(r, &member_ctx, inner, params, ret, body.as_ref(), *extern_),
    _ => fatal(&inner.span, format_args!("extend target must be a constant or function declaration")),
  }
}

// ---------------------------------------------------------------------
// Structs (`spec.md` §4.4 "Struct completion", §9 "Cyclic references")
// ---------------------------------------------------------------------

fn predeclare_struct(r: &Resolver, ctx: &DeclCtx, decl: &Rc<Decl>) {
  let name_text = r.interner.borrow().resolve(decl.name).to_owned();
  let qualified = r.names.borrow_mut().normalize(&mut r.interner.borrow_mut(), &ctx.prefix, &name_text);
  let qualified_str = r.interner.borrow().resolve(qualified).to_owned();
  let member_table = SymbolTable::new_root();
  let ty = r.types.predeclare_struct(qualified, &qualified_str, member_table);
  let sym = Rc::new(Symbol { name: decl.name, span: decl.span.clone(), kind: SymbolKind::Type(ty) });
  SymbolTable::insert(&ctx.table, &r.interner.borrow(), sym);
}

pub(crate) fn complete_struct(r: &Resolver, ctx: &DeclCtx, decl: &Rc<Decl>, cst_members: &[StructMember]) {
  let sym = ctx.table.borrow().lookup_local(decl.name).expect("struct symbol missing at completion time");
  let ty = sym.as_type().expect("struct symbol is not a type");
  let st = ty.as_struct().expect("struct symbol is not a struct type");

  let struct_prefix: Rc<str> = Rc::from(r.interner.borrow().resolve(st.qualified_name).to_owned());
  let member_ctx = DeclCtx { prefix: struct_prefix, table: Rc::clone(&st.member_table) };

  let mut seen: HashSet<Ident> = HashSet::new();
  let mut fields = Vec::new();
  for member in cst_members {
    match member {
      StructMember::Variable { name, name_span, ty: field_ts } => {
        if !seen.insert(*name) {
          fatal(name_span, format_args!("duplicate struct member '{}'", r.interner.borrow().resolve(*name)));
        }
        let fty = typespec::resolve_typespec(r, ctx, field_ts);
        fields.push((*name, fty));
      }
      StructMember::Decl(inner) => {
        if !seen.insert(inner.name) {
          fatal(&inner.name_span, format_args!("duplicate struct member '{}'", r.interner.borrow().resolve(inner.name)));
        }
        match &inner.kind {
          DeclKind::Constant { ty: cty, init } => resolve_constant(r, &member_ctx, inner, cty.as_deref(), init),
          DeclKind::Function { params, ret, body, extern_ } => resolve_function(r, &member_ctx, inner, params, ret, body.as_ref(), *extern_),
          DeclKind::Template { params, inner: tmpl_inner } => resolve_template(r, &member_ctx, inner, params, tmpl_inner),
          _ => fatal(&inner.span, format_args!("unsupported struct member declaration")),
        }
      }
    }
  }
  let (members, size, align) = layout_struct(&fields);
  let members: &'static [Member] = r.freezer.alloc_slice(members);
  st.complete(ty, members, size, align);
}

// ---------------------------------------------------------------------
// Templates (`spec.md` §4.4 "Templates")
// ---------------------------------------------------------------------

fn resolve_template(r: &Resolver, ctx: &DeclCtx, decl: &Rc<Decl>, params: &[Ident], inner: &Rc<Decl>) {
  let t = template::Template {
    params: params.to_vec(),
    inner: Rc::clone(inner),
    capture_prefix: ctx.prefix.clone(),
    parent_table: Rc::clone(&ctx.table),
    memo: std::cell::RefCell::new(hashbrown::HashMap::new()),
  };
  let sym = Rc::new(Symbol { name: decl.name, span: decl.span.clone(), kind: SymbolKind::Template(Rc::new(t)) });
  SymbolTable::insert(&ctx.table, &r.interner.borrow(), sym);
}
