//! The resolver: CST → TIR. `spec.md` §4.4, the largest (52%) component.
//!
//! Grounded on `entity.rs`'s declare-then-complete pattern plus
//! `build_mir.rs`'s overall module structure (one file per concern).

pub mod expr;
pub mod import;
pub mod item;
pub mod stmt;
pub mod template;
pub mod typespec;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use hashbrown::HashMap;
use crate::address::StaticNames;
use crate::arena::Freezer;
use crate::eval::Evaluator;
use crate::interner::Interner;
use crate::symbol::SymbolTableRef;
use crate::tir::{DeferHead, Function, ResolvedModule, StaticSymbol};
use crate::types::registry::TypeRegistry;

/// Ambient configuration (SPEC_FULL §1/§6): the host binary reads
/// `SUNDER_IMPORT_PATH` and splits it on `:` before constructing this, so
/// the resolver itself never touches the environment.
#[derive(Clone, Default)]
pub struct Config {
  pub import_search_path: Vec<PathBuf>,
  /// The external lexer/parser collaborator (`spec.md` §1/§6), supplied by
  /// the host binary. `None` is only valid for modules with no imports.
  pub loader: Option<Rc<dyn import::ModuleLoader>>,
}

enum ModuleState {
  InProgress,
  Done(SymbolTableRef),
}

/// A function whose signature is resolved but whose body resolution has
/// been deferred (`spec.md` §4.4 "Function resolution": "Defer body
/// resolution", enabling mutually recursive functions, §9).
struct PendingFunction {
  func: Rc<Function>,
  cst_body: crate::cst::Block,
  prefix: Rc<str>,
}

/// Per-declaration context: the current static-name prefix and the
/// symbol table new declarations are inserted into (`spec.md` §4.4
/// "Module prelude" sets "the current static-address prefix").
#[derive(Clone)]
pub struct DeclCtx {
  pub prefix: Rc<str>,
  pub table: SymbolTableRef,
}

impl DeclCtx {
  #[must_use] pub fn child_prefix(&self, suffix: &str) -> Rc<str> {
    if self.prefix.is_empty() { Rc::from(suffix) } else { Rc::from(format!("{}.{}", self.prefix, suffix)) }
  }
}

/// The live state threaded through statement/expression resolution
/// inside a function body: the enclosing function, the defer chain head
/// in effect, and a stack of loop anchors (`spec.md` §4.4 "Statement
/// resolution", §9 "Defer chains as linked lists").
pub struct FnState<'f> {
  pub function: &'f Rc<Function>,
  pub defer_head: DeferHead,
  pub loop_anchors: Vec<DeferHead>,
}

impl<'f> FnState<'f> {
  #[must_use] pub fn new(function: &'f Rc<Function>) -> Self {
    Self { function, defer_head: None, loop_anchors: Vec::new() }
  }
}

/// All process-wide singleton collaborators (`spec.md` §5 "Shared-resource
/// policy"), owned by one `Resolver` and read/written only from its
/// (single-threaded) driver.
pub struct Resolver {
  pub types: TypeRegistry,
  pub interner: RefCell<Interner>,
  pub freezer: Freezer,
  pub names: RefCell<StaticNames>,
  pub global: SymbolTableRef,
  pub config: Config,
  modules: RefCell<HashMap<PathBuf, ModuleState>>,
  pending_functions: RefCell<Vec<PendingFunction>>,
  statics: RefCell<Vec<StaticSymbol>>,
  resolved_functions: RefCell<Vec<Rc<Function>>>,
}

impl Resolver {
  #[must_use] pub fn new(config: Config) -> Self {
    let r = Self {
      types: TypeRegistry::new(),
      interner: RefCell::new(Interner::new()),
      freezer: Freezer::new(),
      names: RefCell::new(StaticNames::new()),
      global: crate::symbol::SymbolTable::new_root(),
      config,
      modules: RefCell::new(HashMap::new()),
      pending_functions: RefCell::new(Vec::new()),
      statics: RefCell::new(Vec::new()),
      resolved_functions: RefCell::new(Vec::new()),
    };
    r.seed_builtin_types();
    r
  }

  /// Insert a `Type` symbol for every primitive type name into the global
  /// table, so an ordinary `Named` typespec path lookup (`spec.md` §4.4
  /// "Typespec resolution") finds `u32`, `bool`, `byte`, `void`, `any`,
  /// `usize`/`ssize` the same way it finds any user-declared type, instead
  /// of the resolver special-casing primitive names at every typespec call
  /// site.
  fn seed_builtin_types(&self) {
    use crate::types::IntWidth;
    let mut seed = |name: &str, ty: &'static crate::types::Type| {
      let id = self.interner.borrow_mut().intern(name);
      let sym = Rc::new(crate::symbol::Symbol {
        name: id, span: crate::diag::Span::synthetic(),
        kind: crate::symbol::SymbolKind::Type(ty),
      });
      crate::symbol::SymbolTable::insert(&self.global, &self.interner.borrow(), sym);
    };
    seed("void", self.types.type_void());
    seed("bool", self.types.type_bool());
    seed("byte", self.types.type_byte());
    seed("any", self.types.type_any());
    seed("usize", self.types.type_integer(IntWidth::Pointer, false));
    seed("ssize", self.types.type_integer(IntWidth::Pointer, true));
    for w in [IntWidth::W8, IntWidth::W16, IntWidth::W32, IntWidth::W64] {
      seed(&format!("u{}", w.suffix()), self.types.type_integer(w, false));
      seed(&format!("s{}", w.suffix()), self.types.type_integer(w, true));
    }
  }

  #[must_use] pub fn evaluator(&self) -> Evaluator<'_> {
    Evaluator::new(&self.types, self.interner.borrow())
  }

  pub(crate) fn queue_function_body(&self, func: Rc<Function>, cst_body: crate::cst::Block, prefix: Rc<str>) {
    self.pending_functions.borrow_mut().push(PendingFunction { func, cst_body, prefix });
  }

  pub(crate) fn publish_static(&self, s: StaticSymbol) {
    self.statics.borrow_mut().push(s);
  }

  /// Looks up a previously resolved module's export table by its
  /// canonical path (`spec.md` §4.4 "Import"). Returns `None` for a path
  /// that hasn't been resolved yet, which the caller treats as "resolve
  /// it now"; a path `InProgress` is surfaced by `resolve_module` itself
  /// before this is ever consulted.
  pub(crate) fn cached_export(&self, path: &Path) -> Option<SymbolTableRef> {
    match self.modules.borrow().get(path) {
      Some(ModuleState::Done(export)) => Some(Rc::clone(export)),
      _ => None,
    }
  }

  /// Entry point: resolve one already-parsed module, merging its imports
  /// and mutating the global symbol state (`spec.md` §2 "Control flow").
  pub fn resolve_module(&self, module: &crate::cst::Module) -> Result<(), CircularImport> {
    let path = PathBuf::from(&*module.path);
    if matches!(self.modules.borrow().get(&path), Some(ModuleState::InProgress)) {
      return Err(CircularImport { path });
    }
    self.modules.borrow_mut().insert(path.clone(), ModuleState::InProgress);

    let local = crate::symbol::SymbolTable::new_child(&self.global);

    import::merge_imports(self, module, &local)?;

    let prefix: Rc<str> = if module.namespace.is_empty() {
      Rc::from("")
    } else {
      let names: Vec<String> = module.namespace.iter()
        .map(|&n| self.interner.borrow().resolve(n).to_owned()).collect();
      Rc::from(names.join("."))
    };
    let ctx = DeclCtx { prefix, table: local };

    // Predeclare structs first so mutually-referential members can name
    // one another (`spec.md` §4.4 "Declaration order").
    for decl in &module.decls {
      item::predeclare(self, &ctx, decl);
    }
    // Resolve every top-level declaration's own symbol.
    for decl in &module.decls {
      item::resolve_decl(self, &ctx, decl);
    }
    // Complete struct bodies in the same order.
    for decl in &module.decls {
      item::complete_decl(self, &ctx, decl);
    }
    // Resolve every deferred function body, permitting mutual recursion.
    self.drain_function_bodies();

    ctx.table.borrow_mut().freeze();
    self.modules.borrow_mut().insert(path, ModuleState::Done(Rc::clone(&ctx.table)));
    Ok(())
  }

  fn drain_function_bodies(&self) {
    loop {
      let next = self.pending_functions.borrow_mut().pop();
      let Some(pending) = next else { break };
      stmt::resolve_function_body(self, &pending.func, &pending.cst_body, &pending.prefix);
      self.resolved_functions.borrow_mut().push(Rc::clone(&pending.func));
    }
  }

  /// `spec.md` §6 "Back-end contract": everything the (out-of-scope)
  /// back end needs, frozen and ready to consume.
  #[must_use] pub fn into_output(self) -> ResolvedModule {
    ResolvedModule {
      statics: self.statics.into_inner(),
      functions: self.resolved_functions.into_inner(),
    }
  }
}

/// `spec.md` §7 "Module": "unresolvable import path; circular import."
#[derive(Debug)]
pub struct CircularImport { pub path: PathBuf }

/// End-to-end exercises of `spec.md` §8's worked scenarios, driving the
/// full `predeclare -> resolve -> complete` pipeline through hand-built
/// CST fixtures (standing in for the external parser, `spec.md` §1).
#[cfg(test)]
mod e2e_tests {
  use super::*;
  use num::BigInt;
  use crate::cst::{BinaryOp, Decl, DeclKind, Expr as CstExpr, ExprKind as CstExprKind,
    Path, PathElement, StructMember, Typespec, TypespecKind};
  use crate::diag::Span;
  use crate::value::Value;

  fn span() -> Span { Span::synthetic() }

  fn int_lit(text: &str, suffix: Option<&str>) -> Rc<CstExpr> {
    Rc::new(CstExpr { span: span(), kind: CstExprKind::Integer { text: Rc::from(text), suffix: suffix.map(Rc::from) } })
  }

  fn binary(op: BinaryOp, lhs: Rc<CstExpr>, rhs: Rc<CstExpr>) -> Rc<CstExpr> {
    Rc::new(CstExpr { span: span(), kind: CstExprKind::Binary { op, lhs, rhs } })
  }

  fn named_typespec(r: &Resolver, name: &str) -> Rc<Typespec> {
    let id = r.interner.borrow_mut().intern(name);
    Rc::new(Typespec { span: span(), kind: TypespecKind::Named(Path {
      rooted: false, elements: vec![PathElement { name: id, span: span(), template_args: None }],
    }) })
  }

  fn const_decl(r: &Resolver, name: &str, ty: Option<Rc<Typespec>>, init: Rc<CstExpr>) -> Rc<Decl> {
    let id = r.interner.borrow_mut().intern(name);
    Rc::new(Decl { span: span(), name: id, name_span: span(), kind: DeclKind::Constant { ty, init } })
  }

  fn module_of(path: &str, decls: Vec<Rc<Decl>>) -> crate::cst::Module {
    crate::cst::Module { path: Rc::from(path), namespace: Vec::new(), decls }
  }

  /// `spec.md` §8 scenario 1: `const x: s32 = 1 + 2 * 3;` folds to 7.
  #[test]
  fn untyped_fold_resolves_to_seven() {
    let r = Resolver::new(Config::default());
    let s32 = named_typespec(&r, "s32");
    let mul = binary(BinaryOp::Mul, int_lit("2", None), int_lit("3", None));
    let add = binary(BinaryOp::Add, int_lit("1", None), mul);
    let decl = const_decl(&r, "x", Some(s32), add);
    let module = module_of("/fold.sunder", vec![decl]);
    r.resolve_module(&module).expect("module resolves");

    let statics = r.statics.borrow();
    assert_eq!(statics.len(), 1);
    match statics[0].value.expect("constant has a frozen value") {
      Value::Integer(ty, n) => {
        assert_eq!(*n, BigInt::from(7));
        assert_eq!(ty.name, "s32");
      }
      other => panic!("expected an Integer value, got {other:?}"),
    }
  }

  /// `spec.md` §8 scenario 2: `(:[4]u8)[1, 2, ...5]` yields `[1, 2, 5, 5]`.
  #[test]
  fn array_literal_ellipsis_fills_remaining_slots() {
    let r = Resolver::new(Config::default());
    let u8_ts = named_typespec(&r, "u8");
    let count = int_lit("4", None);
    let array_ts = Rc::new(Typespec { span: span(), kind: TypespecKind::Array(count, u8_ts) });
    let array_lit = Rc::new(CstExpr {
      span: span(),
      kind: CstExprKind::ArrayLiteral {
        ty: Some(array_ts), elements: vec![int_lit("1", None), int_lit("2", None)],
        ellipsis: Some(int_lit("5", None)),
      },
    });
    let decl = const_decl(&r, "a", None, array_lit);
    let module = module_of("/array.sunder", vec![decl]);
    r.resolve_module(&module).expect("module resolves");

    let statics = r.statics.borrow();
    match statics[0].value.expect("constant has a frozen value") {
      Value::Array(_, elements) => {
        let nums: Vec<u64> = elements.iter()
          .map(|v| num::ToPrimitive::to_u64(v.as_integer().unwrap()).unwrap()).collect();
        assert_eq!(nums, vec![1, 2, 5, 5]);
      }
      other => panic!("expected an Array value, got {other:?}"),
    }
  }

  /// `spec.md` §8 scenario 3: `const s = "hi";` registers a `[3]byte`
  /// backing array `['h', 'i', 0]` and a count-2 slice value.
  #[test]
  fn bytes_literal_registers_nul_terminated_backing_array() {
    let r = Resolver::new(Config::default());
    let bytes = Rc::new(CstExpr { span: span(), kind: CstExprKind::Bytes(Rc::from("hi")) });
    let decl = const_decl(&r, "s", None, bytes);
    let module = module_of("/bytes.sunder", vec![decl]);
    r.resolve_module(&module).expect("module resolves");

    let statics = r.statics.borrow();
    assert_eq!(statics.len(), 2, "backing array plus the `s` constant itself");
    let backing = statics.iter().find(|s| matches!(s.value, Some(Value::Array(..))))
      .expect("a backing array static was published");
    match backing.value.unwrap() {
      Value::Array(ty, elements) => {
        assert_eq!(ty.name, "[3]byte");
        let bytes: Vec<u8> = elements.iter().map(|v| match v { Value::Byte(b) => *b, _ => panic!() }).collect();
        assert_eq!(bytes, vec![b'h', b'i', 0]);
      }
      _ => unreachable!(),
    }
    let slice = statics.iter().find(|s| matches!(s.value, Some(Value::Slice(..))))
      .expect("the `s` constant holds a slice value");
    match slice.value.unwrap() {
      Value::Slice(_, _, count) => assert_eq!(count.as_usize(), Some(2)),
      _ => unreachable!(),
    }
  }

  /// `spec.md` §8 scenario 5: `box[[u32]]` instantiated twice yields
  /// pointer-equal symbols and a single completed member variable.
  #[test]
  fn template_instantiation_is_memoized_across_uses() {
    let r = Resolver::new(Config::default());
    let t_ident = r.interner.borrow_mut().intern("T");
    let v_ident = r.interner.borrow_mut().intern("v");
    let box_ident = r.interner.borrow_mut().intern("box");

    let t_typespec = Rc::new(Typespec { span: span(), kind: TypespecKind::Named(Path {
      rooted: false, elements: vec![PathElement { name: t_ident, span: span(), template_args: None }],
    }) });
    let struct_decl = Rc::new(Decl {
      span: span(), name: box_ident, name_span: span(),
      kind: DeclKind::Struct { members: vec![StructMember::Variable { name: v_ident, name_span: span(), ty: t_typespec }] },
    });
    let template_decl = Rc::new(Decl {
      span: span(), name: box_ident, name_span: span(),
      kind: DeclKind::Template { params: vec![t_ident], inner: struct_decl },
    });
    let module = module_of("/box.sunder", vec![template_decl]);
    r.resolve_module(&module).expect("module resolves");

    let table = r.cached_export(std::path::Path::new("/box.sunder")).expect("module published its export table");
    let ctx = DeclCtx { prefix: Rc::from(""), table };
    let u32_ts = named_typespec(&r, "u32");
    let box_ts = |args: Vec<Rc<Typespec>>| Rc::new(Typespec { span: span(), kind: TypespecKind::Named(Path {
      rooted: false, elements: vec![PathElement { name: box_ident, span: span(), template_args: Some(args) }],
    }) });

    let ty1 = typespec::resolve_typespec(&r, &ctx, &box_ts(vec![Rc::clone(&u32_ts)]));
    let ty2 = typespec::resolve_typespec(&r, &ctx, &box_ts(vec![u32_ts]));
    assert!(std::ptr::eq(ty1, ty2), "both uses of box[[u32]] must be the same type instance");

    let members = ty1.as_struct().and_then(crate::types::StructType::members).expect("struct is completed");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].ty.name, "u32");
  }

  /// `spec.md` §8 "Boundary behaviors": "a template instantiation that
  /// self-references through a pointer member terminates (pre-caching
  /// before completion)". `struct list[[T]] { next: *list[[T]], val: T }`
  /// must resolve without recursing forever, and `next`'s pointee must be
  /// pointer-equal to the instantiation being completed.
  #[test]
  fn self_referential_template_struct_terminates_and_shares_identity() {
    let r = Resolver::new(Config::default());
    let t_ident = r.interner.borrow_mut().intern("T");
    let val_ident = r.interner.borrow_mut().intern("val");
    let next_ident = r.interner.borrow_mut().intern("next");
    let list_ident = r.interner.borrow_mut().intern("list");

    let t_typespec = Rc::new(Typespec { span: span(), kind: TypespecKind::Named(Path {
      rooted: false, elements: vec![PathElement { name: t_ident, span: span(), template_args: None }],
    }) });
    let self_ptr_typespec = Rc::new(Typespec { span: span(), kind: TypespecKind::Pointer(Rc::new(Typespec {
      span: span(), kind: TypespecKind::Named(Path {
        rooted: false,
        elements: vec![PathElement { name: list_ident, span: span(), template_args: Some(vec![Rc::clone(&t_typespec)]) }],
      }),
    })) });
    let struct_decl = Rc::new(Decl {
      span: span(), name: list_ident, name_span: span(),
      kind: DeclKind::Struct { members: vec![
        StructMember::Variable { name: next_ident, name_span: span(), ty: self_ptr_typespec },
        StructMember::Variable { name: val_ident, name_span: span(), ty: t_typespec },
      ] },
    });
    let template_decl = Rc::new(Decl {
      span: span(), name: list_ident, name_span: span(),
      kind: DeclKind::Template { params: vec![t_ident], inner: struct_decl },
    });
    let module = module_of("/list.sunder", vec![template_decl]);
    r.resolve_module(&module).expect("module resolves without recursing forever");

    let table = r.cached_export(std::path::Path::new("/list.sunder")).expect("module published its export table");
    let ctx = DeclCtx { prefix: Rc::from(""), table };
    let u32_ts = named_typespec(&r, "u32");
    let list_ts = |args: Vec<Rc<Typespec>>| Rc::new(Typespec { span: span(), kind: TypespecKind::Named(Path {
      rooted: false, elements: vec![PathElement { name: list_ident, span: span(), template_args: Some(args) }],
    }) });

    let ty1 = typespec::resolve_typespec(&r, &ctx, &list_ts(vec![Rc::clone(&u32_ts)]));
    let ty2 = typespec::resolve_typespec(&r, &ctx, &list_ts(vec![u32_ts]));
    assert!(std::ptr::eq(ty1, ty2), "both outer uses of list[[u32]] must be the same type instance");

    let members = ty1.as_struct().and_then(crate::types::StructType::members).expect("struct is completed");
    assert_eq!(members.len(), 2);
    let next = members.iter().find(|m| m.name == next_ident).expect("`next` member present");
    let val = members.iter().find(|m| m.name == val_ident).expect("`val` member present");
    assert_eq!(val.ty.name, "u32");
    match next.ty.kind {
      crate::types::TypeKind::Pointer(base) => assert!(std::ptr::eq(base, ty1),
        "self-referential member must point back at the same in-flight instantiation"),
      _ => panic!("expected 'next' to be a pointer type, got '{}'", next.ty.name),
    }
  }
}
