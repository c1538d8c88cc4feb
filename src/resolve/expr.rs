//! Expression resolution: CST expressions → TIR, implicit casts, and the
//! constant-folding of untyped-integer arithmetic. `spec.md` §4.4
//! "Implicit casts (shallow)", "Expression resolution".

use std::rc::Rc;
use num::BigInt;
use crate::cst::{self, BinaryOp, Expr as CstExpr, ExprKind as CstExprKind, UnaryOp};
use crate::diag::fatal;
use crate::symbol::SymbolKind;
use crate::tir::{Expr, ExprKind};
use crate::types::{IntWidth, Type, TypeKind};
use super::{item, typespec, DeclCtx, Resolver};

pub fn resolve_expr(r: &Resolver, ctx: &DeclCtx, e: &CstExpr) -> Expr {
  match &e.kind {
    CstExprKind::Path(path) => resolve_identifier(r, ctx, e, path),
    CstExprKind::Boolean(b) => Expr { span: e.span.clone(), ty: r.types.type_bool(), kind: ExprKind::Boolean(*b) },
    CstExprKind::Integer { text, suffix } => resolve_integer_literal(r, e, text, suffix.as_deref()),
    CstExprKind::Character(code) => Expr {
      span: e.span.clone(), ty: r.types.type_unsized_integer(), kind: ExprKind::Integer(BigInt::from(*code)),
    },
    CstExprKind::Bytes(text) => resolve_bytes_literal(r, ctx, e, text),
    CstExprKind::ArrayLiteral { ty, elements, ellipsis } => resolve_array_literal(r, ctx, e, ty.as_deref(), elements, ellipsis.as_deref()),
    CstExprKind::SliceLiteral { ty, elements } => resolve_slice_literal(r, ctx, e, ty, elements),
    CstExprKind::Cast { ty, expr } => resolve_cast(r, ctx, e, ty, expr),
    CstExprKind::Call { callee, args } => resolve_call(r, ctx, e, callee, args),
    CstExprKind::Syscall { args } => {
      // `spec.md` §4.3: impure at compile time; still type-checks as a
      // normal expression so a runtime use resolves fine.
      let args: Vec<Rc<Expr>> = args.iter().map(|a| Rc::new(resolve_expr(r, ctx, a))).collect();
      Expr { span: e.span.clone(), ty: r.types.type_integer(IntWidth::Pointer, false), kind: ExprKind::Syscall { args } }
    }
    CstExprKind::Index { base, index } => resolve_index(r, ctx, e, base, index),
    CstExprKind::SliceAccess { base, begin, end } => resolve_slice_access(r, ctx, e, base, begin.as_deref(), end.as_deref()),
    CstExprKind::Sizeof(ts) => {
      let ty = typespec::resolve_typespec(r, ctx, ts);
      Expr { span: e.span.clone(), ty: r.types.type_integer(IntWidth::Pointer, false), kind: ExprKind::Sizeof(ty) }
    }
    CstExprKind::Alignof(ts) => {
      let ty = typespec::resolve_typespec(r, ctx, ts);
      Expr { span: e.span.clone(), ty: r.types.type_integer(IntWidth::Pointer, false), kind: ExprKind::Alignof(ty) }
    }
    CstExprKind::Unary { op, expr } => resolve_unary(r, ctx, e, *op, expr),
    CstExprKind::Binary { op, lhs, rhs } => resolve_binary(r, ctx, e, *op, lhs, rhs),
    CstExprKind::StructLiteral { ty, fields } => resolve_struct_literal(r, ctx, e, ty, fields),
    CstExprKind::Member { base, name, name_span } => resolve_member(r, ctx, e, base, *name, name_span),
  }
}

fn resolve_identifier(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, path: &cst::Path) -> Expr {
  let sym = item::resolve_path(r, ctx, path);
  let ty = sym.value_type().unwrap_or_else(|| fatal(&e.span, format_args!(
    "'{}' ({}) cannot be used as a value", r.interner.borrow().resolve(sym.name), sym.kind_name())));
  Expr { span: e.span.clone(), ty, kind: ExprKind::Identifier(sym) }
}

/// `spec.md` §4.4 "Integer literal suffix → type mapping".
fn resolve_integer_literal(r: &Resolver, e: &CstExpr, text: &str, suffix: Option<&str>) -> Expr {
  let digits: String = text.chars().filter(|c| *c != '_').collect();
  let n = digits.parse::<BigInt>().unwrap_or_else(|_| fatal(&e.span, format_args!("malformed integer literal '{text}'")));
  let ty = match suffix {
    None => r.types.type_unsized_integer(),
    Some("y") => r.types.type_byte(),
    Some("u") => r.types.type_integer(IntWidth::Pointer, false),
    Some("s") => r.types.type_integer(IntWidth::Pointer, true),
    Some(other) => {
      if let Some(bits) = other.strip_prefix('u') {
        width_from_bits(r, &e.span, bits, false)
      } else if let Some(bits) = other.strip_prefix('s') {
        width_from_bits(r, &e.span, bits, true)
      } else {
        fatal(&e.span, format_args!("unrecognized integer literal suffix '{other}'"))
      }
    }
  };
  if let Some(int) = ty.as_integer() {
    if !int.in_range(&n) {
      fatal(&e.span, format_args!("integer literal {n} is out of range for its type"));
    }
  }
  Expr { span: e.span.clone(), ty, kind: ExprKind::Integer(n) }
}

fn width_from_bits(r: &Resolver, span: &crate::diag::Span, bits: &str, signed: bool) -> &'static Type {
  match bits {
    "8" => r.types.type_integer(IntWidth::W8, signed),
    "16" => r.types.type_integer(IntWidth::W16, signed),
    "32" => r.types.type_integer(IntWidth::W32, signed),
    "64" => r.types.type_integer(IntWidth::W64, signed),
    _ => fatal(span, format_args!("unrecognized integer width '{bits}'")),
  }
}

/// `spec.md` §4.4 "Bytes literals allocate a new static array constant of
/// type `[N+1]byte` with a NUL byte appended (not counted in the slice
/// length exposed to the program)".
fn resolve_bytes_literal(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, text: &str) -> Expr {
  let len = u64::try_from(text.len()).expect("bytes literal too long");
  let backing = r.names.borrow_mut().synthetic(&mut r.interner.borrow_mut(), &ctx.prefix, "str");
  let byte = r.types.type_byte();
  let array_ty = r.types.type_array(len + 1, byte);
  let mut bytes: Vec<u8> = text.bytes().collect();
  bytes.push(0u8);
  let array_value = crate::value::Value::Array(
    array_ty,
    bytes.into_iter().map(crate::value::Value::Byte).collect(),
  );
  let array_value: &'static crate::value::Value = r.freezer.alloc(array_value);
  r.publish_static(crate::tir::StaticSymbol { name: backing, span: e.span.clone(), value: Some(array_value) });
  let slice_ty = r.types.type_slice(byte);
  Expr { span: e.span.clone(), ty: slice_ty, kind: ExprKind::Bytes { backing, len } }
}

fn resolve_array_literal(
  r: &Resolver, ctx: &DeclCtx, e: &CstExpr, ty: Option<&cst::Typespec>, elements: &[Rc<CstExpr>], ellipsis: Option<&CstExpr>,
) -> Expr {
  let elems_tir: Vec<Rc<Expr>> = elements.iter().map(|el| Rc::new(resolve_expr(r, ctx, el))).collect();
  let ellipsis_tir = ellipsis.map(|el| Rc::new(resolve_expr(r, ctx, el)));
  let elem_ty = elems_tir.first().map_or_else(
    || ellipsis_tir.as_ref().map_or_else(|| r.types.type_unsized_integer(), |e| e.ty),
    |e| e.ty,
  );
  let declared = ty.map(|t| typespec::resolve_typespec(r, ctx, t));
  let count = match declared.map(|t| &t.kind) {
    Some(TypeKind::Array(n, _)) => *n,
    _ => u64::try_from(elements.len()).expect("array literal too long"),
  };
  let base = match declared.map(|t| &t.kind) {
    Some(TypeKind::Array(_, base)) => *base,
    _ => elem_ty,
  };
  let array_ty = r.types.type_array(count, base);
  let elems_tir: Vec<Rc<Expr>> = elems_tir.into_iter().map(|el| Rc::new(implicit_cast(r, &el, base))).collect();
  let ellipsis_tir = ellipsis_tir.map(|el| Rc::new(implicit_cast(r, &el, base)));
  Expr { span: e.span.clone(), ty: array_ty, kind: ExprKind::LiteralArray { elements: elems_tir, ellipsis: ellipsis_tir } }
}

fn resolve_slice_literal(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, ty: &cst::Typespec, elements: &[Rc<CstExpr>]) -> Expr {
  let slice_ty = typespec::resolve_typespec(r, ctx, ty);
  let TypeKind::Slice(base) = slice_ty.kind else {
    fatal(&ty.span, format_args!("slice literal requires a slice typespec"))
  };
  let count = u64::try_from(elements.len()).expect("slice literal too long");
  let array_ty = r.types.type_array(count, base);
  let elems_tir: Vec<Rc<Expr>> = elements.iter()
    .map(|el| Rc::new(implicit_cast(r, &resolve_expr(r, ctx, el), base))).collect();
  // `spec.md` §4.4: "allocates a backing array (as a constant if inside a
  // const declaration, else as a variable) and pairs its address with
  // count"; this crate always backs it with a synthesized static constant,
  // which is sound for both uses since the back end only ever reads it.
  let backing_name = r.names.borrow_mut().synthetic(&mut r.interner.borrow_mut(), &ctx.prefix, "slice");
  let array_expr = Expr { span: e.span.clone(), ty: array_ty, kind: ExprKind::LiteralArray { elements: elems_tir, ellipsis: None } };
  let value = r.evaluator().eval_rvalue(&array_expr);
  let value: &'static crate::value::Value = r.freezer.alloc(value);
  r.publish_static(crate::tir::StaticSymbol { name: backing_name, span: e.span.clone(), value: Some(value) });
  let ptr_ty = r.types.type_pointer(base);
  let pointer = Rc::new(Expr {
    span: e.span.clone(), ty: ptr_ty,
    kind: ExprKind::Unary { op: UnaryOp::AddressOf, expr: Rc::new(Expr {
      span: e.span.clone(), ty: array_ty,
      kind: ExprKind::Identifier(Rc::new(crate::symbol::Symbol {
        name: backing_name, span: e.span.clone(),
        kind: SymbolKind::Constant { ty: array_ty, address: crate::address::Address::Static { name: backing_name, offset: 0 }, value },
      })),
    }) },
  });
  let usize_ty = r.types.type_integer(IntWidth::Pointer, false);
  let count_expr = Rc::new(Expr { span: e.span.clone(), ty: usize_ty, kind: ExprKind::Integer(BigInt::from(count)) });
  Expr { span: e.span.clone(), ty: slice_ty, kind: ExprKind::LiteralSlice { pointer, count: count_expr } }
}

fn resolve_cast(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, ty: &cst::Typespec, inner: &CstExpr) -> Expr {
  let dest = typespec::resolve_typespec(r, ctx, ty);
  let inner_tir = resolve_expr(r, ctx, inner);
  Expr { span: e.span.clone(), ty: dest, kind: ExprKind::Cast(Rc::new(inner_tir)) }
}

fn resolve_call(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, callee: &CstExpr, args: &[Rc<CstExpr>]) -> Expr {
  // `spec.md` §4.4 "Call": implicit `&self` synthesis for `instance.method(...)`.
  if let CstExprKind::Member { base, name, name_span } = &callee.kind {
    let base_tir = resolve_expr(r, ctx, base);
    if let TypeKind::Struct(st) = &base_tir.ty.kind {
      let member = st.member_table.borrow().lookup_local(*name);
      if let Some(member) = member {
        if let SymbolKind::Function(f) = &member.kind {
          // `spec.md` §4.4 "Call": the implicit-`&self` branch only applies
          // when the function's *first* parameter is declared `*SelfStruct`;
          // anything else (including zero parameters) is a regular call.
          let is_self_method = f.params.first()
            .and_then(crate::symbol::Symbol::value_type)
            .is_some_and(|p| matches!(p.kind, TypeKind::Pointer(base) if std::ptr::eq(base, base_tir.ty)));
          if is_self_method {
            let ret = match &f.ty.kind {
              TypeKind::Function(ft) => ft.ret,
              _ => unreachable!("function symbol without a function type"),
            };
            let expected_args = f.params.len() - 1;
            if args.len() != expected_args {
              fatal(&e.span, format_args!("expected {expected_args} argument(s), found {}", args.len()));
            }
            let self_ty = r.types.type_pointer(base_tir.ty);
            let self_arg = Rc::new(Expr {
              span: base.span.clone(), ty: self_ty,
              kind: ExprKind::Unary { op: UnaryOp::AddressOf, expr: Rc::new(base_tir) },
            });
            let mut call_args = vec![self_arg];
            for (i, a) in args.iter().enumerate() {
              call_args.push(Rc::new(cast_to_param(r, ctx, a, f, i + 1)));
            }
            let callee_tir = Rc::new(Expr { span: name_span.clone(), ty: f.ty, kind: ExprKind::Identifier(Rc::clone(&member)) });
            return Expr { span: e.span.clone(), ty: ret, kind: ExprKind::Call { callee: callee_tir, args: call_args } };
          }
          // Not a self-method: a regular call against the member function
          // directly, with no implicit `&self` argument (`spec.md` §4.4
          // "Otherwise it is a regular call").
          let ret = match &f.ty.kind {
            TypeKind::Function(ft) => ft.ret,
            _ => unreachable!("function symbol without a function type"),
          };
          if args.len() != f.params.len() {
            fatal(&e.span, format_args!("expected {} argument(s), found {}", f.params.len(), args.len()));
          }
          let call_args: Vec<Rc<Expr>> = args.iter().enumerate()
            .map(|(i, a)| Rc::new(cast_to_param(r, ctx, a, f, i))).collect();
          let callee_tir = Rc::new(Expr { span: name_span.clone(), ty: f.ty, kind: ExprKind::Identifier(Rc::clone(&member)) });
          return Expr { span: e.span.clone(), ty: ret, kind: ExprKind::Call { callee: callee_tir, args: call_args } };
        }
      }
    }
  }
  let callee_tir = resolve_expr(r, ctx, callee);
  let TypeKind::Function(ft) = &callee_tir.ty.kind else {
    fatal(&callee.span, format_args!("called expression is not a function"))
  };
  if ft.params.len() != args.len() {
    fatal(&e.span, format_args!("expected {} argument(s), found {}", ft.params.len(), args.len()));
  }
  let args_tir: Vec<Rc<Expr>> = args.iter().zip(ft.params).map(|(a, &p)| {
    let a_tir = resolve_expr(r, ctx, a);
    let casted = implicit_cast(r, &a_tir, p);
    if !std::ptr::eq(casted.ty, p) { fatal(&a.span, format_args!("argument type does not match parameter type")); }
    Rc::new(casted)
  }).collect();
  Expr { span: e.span.clone(), ty: ft.ret, kind: ExprKind::Call { callee: Rc::new(callee_tir), args: args_tir } }
}

fn cast_to_param(r: &Resolver, ctx: &DeclCtx, a: &CstExpr, f: &crate::tir::Function, idx: usize) -> Expr {
  let a_tir = resolve_expr(r, ctx, a);
  let Some(p) = f.params.get(idx).and_then(|p| p.value_type()) else {
    fatal(&a.span, format_args!("too many arguments"))
  };
  let casted = implicit_cast(r, &a_tir, p);
  if !std::ptr::eq(casted.ty, p) { fatal(&a.span, format_args!("argument type does not match parameter type")); }
  casted
}

fn resolve_index(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, base: &CstExpr, index: &CstExpr) -> Expr {
  let base_tir = resolve_expr(r, ctx, base);
  let index_tir = resolve_expr(r, ctx, index);
  let usize_ty = r.types.type_integer(IntWidth::Pointer, false);
  let index_tir = implicit_cast(r, &index_tir, usize_ty);
  if !std::ptr::eq(index_tir.ty, usize_ty) {
    fatal(&index.span, format_args!("index must be a usize"));
  }
  let elem_ty = match &base_tir.ty.kind {
    TypeKind::Array(_, elem) | TypeKind::Slice(elem) => *elem,
    _ => fatal(&base.span, format_args!("'{}' cannot be indexed", base_tir.ty.name)),
  };
  Expr { span: e.span.clone(), ty: elem_ty, kind: ExprKind::Index { base: Rc::new(base_tir), index: Rc::new(index_tir) } }
}

fn resolve_slice_access(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, base: &CstExpr, begin: Option<&CstExpr>, end: Option<&CstExpr>) -> Expr {
  let base_tir = resolve_expr(r, ctx, base);
  let usize_ty = r.types.type_integer(IntWidth::Pointer, false);
  let cast_bound = |b: &CstExpr| -> Rc<Expr> {
    let t = implicit_cast(r, &resolve_expr(r, ctx, b), usize_ty);
    if !std::ptr::eq(t.ty, usize_ty) { fatal(&b.span, format_args!("slice bound must be a usize")); }
    Rc::new(t)
  };
  let begin_tir = begin.map(cast_bound);
  let end_tir = end.map(cast_bound);
  let elem_ty = match &base_tir.ty.kind {
    TypeKind::Array(_, elem) => *elem,
    TypeKind::Slice(elem) => *elem,
    _ => fatal(&base.span, format_args!("'{}' does not support slice access", base_tir.ty.name)),
  };
  if matches!(base_tir.ty.kind, TypeKind::Array(..)) && !matches!(base.kind, CstExprKind::Path(_) | CstExprKind::Index { .. } | CstExprKind::Member { .. }) {
    fatal(&base.span, format_args!("slice access on an array requires an l-value"));
  }
  let slice_ty = r.types.type_slice(elem_ty);
  Expr { span: e.span.clone(), ty: slice_ty, kind: ExprKind::SliceAccess { base: Rc::new(base_tir), begin: begin_tir, end: end_tir } }
}

fn resolve_unary(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, op: UnaryOp, inner: &CstExpr) -> Expr {
  // `spec.md` §4.4: "unary minus applied to an unsized integer literal is
  // absorbed into the literal" (so `-128s8` is representable).
  if op == UnaryOp::Neg {
    if let CstExprKind::Integer { text, suffix: None } = &inner.kind {
      let mut negated_text = String::from("-");
      negated_text.push_str(text);
      return resolve_integer_literal(r, e, &negated_text, None);
    }
  }
  let inner_tir = resolve_expr(r, ctx, inner);
  let ty = match op {
    UnaryOp::Not => {
      if !matches!(inner_tir.ty.kind, TypeKind::Bool) { fatal(&inner.span, format_args!("'!' requires a bool operand")); }
      inner_tir.ty
    }
    UnaryOp::Pos | UnaryOp::Neg => {
      if inner_tir.ty.as_integer().is_none() { fatal(&inner.span, format_args!("unary '{op:?}' requires an integer operand")); }
      if op == UnaryOp::Neg {
        let int = inner_tir.ty.as_integer().unwrap();
        if !int.signed && !inner_tir.ty.is_unsized_integer() {
          fatal(&inner.span, format_args!("unary minus cannot be applied to an unsigned type"));
        }
      }
      inner_tir.ty
    }
    UnaryOp::BitNot => {
      if !matches!(inner_tir.ty.kind, TypeKind::Byte) && inner_tir.ty.as_integer().is_none() {
        fatal(&inner.span, format_args!("'~' requires a byte or integer operand"));
      }
      inner_tir.ty
    }
    UnaryOp::AddressOf => r.types.type_pointer(inner_tir.ty),
    UnaryOp::Deref => match &inner_tir.ty.kind {
      TypeKind::Pointer(base) => *base,
      _ => fatal(&inner.span, format_args!("'*' requires a pointer operand")),
    },
    UnaryOp::Countof => match &inner_tir.ty.kind {
      TypeKind::Array(..) | TypeKind::Slice(_) => r.types.type_integer(IntWidth::Pointer, false),
      _ => fatal(&inner.span, format_args!("'countof' requires an array or slice operand")),
    },
  };
  Expr { span: e.span.clone(), ty, kind: ExprKind::Unary { op, expr: Rc::new(inner_tir) } }
}

fn resolve_binary(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, op: BinaryOp, lhs: &CstExpr, rhs: &CstExpr) -> Expr {
  let lhs_tir = resolve_expr(r, ctx, lhs);
  let rhs_tir = resolve_expr(r, ctx, rhs);
  let (lhs_tir, rhs_tir) = unify_operands(r, lhs_tir, rhs_tir, &e.span);
  let ty = match op {
    BinaryOp::Or | BinaryOp::And => {
      if !matches!(lhs_tir.ty.kind, TypeKind::Bool) { fatal(&lhs.span, format_args!("boolean operator requires bool operands")); }
      r.types.type_bool()
    }
    BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => r.types.type_bool(),
    _ => lhs_tir.ty,
  };
  let built = Expr { span: e.span.clone(), ty, kind: ExprKind::Binary { op, lhs: Rc::new(lhs_tir), rhs: Rc::new(rhs_tir) } };
  // `spec.md` §4.4: "Comparison and arithmetic on two untyped integer
  // literals are constant-folded immediately ... preserving untypedness".
  fold_untyped(r, built)
}

fn unify_operands(r: &Resolver, lhs: Expr, rhs: Expr, span: &crate::diag::Span) -> (Expr, Expr) {
  if std::ptr::eq(lhs.ty, rhs.ty) { return (lhs, rhs) }
  if lhs.ty.is_unsized_integer() && rhs.ty.as_integer().is_some() {
    return (implicit_cast(r, &lhs, rhs.ty), rhs);
  }
  if rhs.ty.is_unsized_integer() && lhs.ty.as_integer().is_some() {
    return (lhs.clone(), implicit_cast(r, &rhs, lhs.ty));
  }
  if !std::ptr::eq(lhs.ty, rhs.ty) {
    fatal(span, format_args!("operand types '{}' and '{}' do not match", lhs.ty.name, rhs.ty.name));
  }
  (lhs, rhs)
}

fn fold_untyped(r: &Resolver, e: Expr) -> Expr {
  if let ExprKind::Binary { lhs, rhs, .. } = &e.kind {
    let both_unsized_literals = matches!(lhs.kind, ExprKind::Integer(_)) && lhs.ty.is_unsized_integer()
      && matches!(rhs.kind, ExprKind::Integer(_)) && rhs.ty.is_unsized_integer();
    if both_unsized_literals && e.ty.is_unsized_integer() {
      let v = r.evaluator().eval_rvalue(&e);
      if let crate::value::Value::Integer(ty, n) = v {
        return Expr { span: e.span, ty, kind: ExprKind::Integer(n) };
      }
    }
  }
  e
}

fn resolve_struct_literal(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, ty: &cst::Typespec, fields: &[(crate::interner::Ident, crate::diag::Span, Rc<CstExpr>)]) -> Expr {
  let struct_ty = typespec::resolve_typespec(r, ctx, ty);
  let st = struct_ty.as_struct().unwrap_or_else(|| fatal(&ty.span, format_args!("'{}' is not a struct type", struct_ty.name)));
  let members = st.members().unwrap_or_else(|| fatal(&ty.span, format_args!("'{}' is an incomplete struct type", struct_ty.name)));
  let mut provided: hashbrown::HashMap<crate::interner::Ident, Rc<Expr>> = hashbrown::HashMap::new();
  for (name, span, value) in fields {
    if !members.iter().any(|m| m.name == *name) {
      fatal(span, format_args!("'{}' has no member named '{}'", struct_ty.name, r.interner.borrow().resolve(*name)));
    }
    let member_ty = members.iter().find(|m| m.name == *name).unwrap().ty;
    let value_tir = implicit_cast(r, &resolve_expr(r, ctx, value), member_ty);
    if !std::ptr::eq(value_tir.ty, member_ty) {
      fatal(&value.span, format_args!("field '{}' has the wrong type", r.interner.borrow().resolve(*name)));
    }
    if provided.insert(*name, Rc::new(value_tir)).is_some() {
      fatal(span, format_args!("duplicate initializer for field '{}'", r.interner.borrow().resolve(*name)));
    }
  }
  for m in members {
    if !provided.contains_key(&m.name) {
      fatal(&e.span, format_args!("missing initializer for field '{}'", r.interner.borrow().resolve(m.name)));
    }
  }
  let ordered_fields: Vec<(crate::interner::Ident, Rc<Expr>)> = members.iter().map(|m| (m.name, Rc::clone(&provided[&m.name]))).collect();
  Expr { span: e.span.clone(), ty: struct_ty, kind: ExprKind::StructLiteral { fields: ordered_fields } }
}

fn resolve_member(r: &Resolver, ctx: &DeclCtx, e: &CstExpr, base: &CstExpr, name: crate::interner::Ident, name_span: &crate::diag::Span) -> Expr {
  let base_tir = resolve_expr(r, ctx, base);
  let TypeKind::Struct(st) = &base_tir.ty.kind else {
    fatal(&base.span, format_args!("'{}' is not a struct", base_tir.ty.name))
  };
  // "prefer member variable; else member constant/function/template"
  if let Some(members) = st.members() {
    if let Some(m) = members.iter().find(|m| m.name == name) {
      return Expr { span: e.span.clone(), ty: m.ty, kind: ExprKind::Member { base: Rc::new(base_tir), name } };
    }
  }
  let sym = st.member_table.borrow().lookup_local(name).unwrap_or_else(|| fatal(name_span, format_args!(
    "'{}' has no member named '{}'", base_tir.ty.name, r.interner.borrow().resolve(name))));
  // "taking the value (not calling) of a member constant/function/template is fatal"
  fatal(name_span, format_args!(
    "'{}' names a {} member; it can only be called, not used as a value here",
    r.interner.borrow().resolve(name), sym.kind_name()));
}

/// `spec.md` §4.4 "Implicit casts (shallow)": one shallow, value-preserving
/// cast attempted when a value of type A appears where type B is required.
/// Otherwise the expression is returned unchanged.
#[must_use] pub fn implicit_cast(r: &Resolver, e: &Expr, target: &'static Type) -> Expr {
  if std::ptr::eq(e.ty, target) { return e.clone() }

  if e.ty.is_unsized_integer() {
    if matches!(target.kind, TypeKind::Byte) {
      if let ExprKind::Integer(n) = &e.kind {
        if *n < BigInt::from(0) || *n > BigInt::from(255) {
          fatal(&e.span, format_args!("integer literal {n} is out of range for 'byte'"));
        }
      }
      return Expr { span: e.span.clone(), ty: target, kind: ExprKind::Cast(Rc::new(e.clone())) };
    }
    if let Some(int) = target.as_integer() {
      if int.width != IntWidth::Unsized {
        if let ExprKind::Integer(n) = &e.kind {
          if !int.in_range(n) {
            fatal(&e.span, format_args!("integer literal {n} is out of range for '{}'", target.name));
          }
        }
        return Expr { span: e.span.clone(), ty: target, kind: ExprKind::Cast(Rc::new(e.clone())) };
      }
    }
  }

  if let (TypeKind::Pointer(base), TypeKind::Pointer(tgt_base)) = (&e.ty.kind, &target.kind) {
    if !matches!(base.kind, TypeKind::Any) && matches!(tgt_base.kind, TypeKind::Any) {
      return Expr { span: e.span.clone(), ty: target, kind: ExprKind::Cast(Rc::new(e.clone())) };
    }
  }

  if let (TypeKind::Function(src), TypeKind::Function(dst)) = (&e.ty.kind, &target.kind) {
    if src.params.len() == dst.params.len() && params_compatible(src.params, dst.params) && ret_compatible(src.ret, dst.ret) {
      return Expr { span: e.span.clone(), ty: target, kind: ExprKind::Cast(Rc::new(e.clone())) };
    }
  }

  e.clone()
}

fn params_compatible(src: &[&'static Type], dst: &[&'static Type]) -> bool {
  src.iter().zip(dst).all(|(&p, &q)| std::ptr::eq(p, q) || matches!((&p.kind, &q.kind),
    (TypeKind::Pointer(pb), TypeKind::Pointer(qb)) if !matches!(pb.kind, TypeKind::Any) && matches!(qb.kind, TypeKind::Any)))
}

fn ret_compatible(src: &'static Type, dst: &'static Type) -> bool {
  std::ptr::eq(src, dst) || matches!((&src.kind, &dst.kind),
    (TypeKind::Pointer(sb), TypeKind::Pointer(db)) if !matches!(sb.kind, TypeKind::Any) && matches!(db.kind, TypeKind::Any))
}
