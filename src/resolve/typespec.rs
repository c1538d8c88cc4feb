//! Typespec resolution: CST typespec → canonical `Type`. `spec.md` §4.4
//! "Typespec resolution".

use crate::cst::{Typespec, TypespecKind};
use crate::diag::fatal;
use crate::types::Type;
use super::{item, DeclCtx, Resolver};

pub fn resolve_typespec(r: &Resolver, ctx: &DeclCtx, ts: &Typespec) -> &'static Type {
  match &ts.kind {
    TypespecKind::Named(path) => {
      let sym = item::resolve_path(r, ctx, path);
      sym.as_type().unwrap_or_else(|| fatal(&ts.span, format_args!(
        "'{}' is not a type ({})",
        r.interner.borrow().resolve(sym.name), sym.kind_name())))
    }
    TypespecKind::Pointer(inner) => r.types.type_pointer(resolve_typespec(r, ctx, inner)),
    TypespecKind::Slice(inner) => r.types.type_slice(resolve_typespec(r, ctx, inner)),
    TypespecKind::Array(count_expr, inner) => {
      let base = resolve_typespec(r, ctx, inner);
      let count_tir = super::expr::resolve_expr(r, ctx, count_expr);
      let usize_ty = r.types.type_integer(crate::types::IntWidth::Pointer, false);
      let count_tir = super::expr::implicit_cast(r, &count_tir, usize_ty);
      if !std::ptr::eq(count_tir.ty, usize_ty) {
        fatal(&count_expr.span, format_args!("array length must be a usize constant expression"));
      }
      let count = r.evaluator().eval_rvalue(&count_tir).as_usize().unwrap_or_else(|| fatal(
        &count_expr.span, format_args!("array length must be a usize constant expression")));
      r.types.type_array(count, base)
    }
    TypespecKind::Function(params, ret) => {
      let params: Vec<&'static Type> = params.iter().map(|p| resolve_typespec(r, ctx, p)).collect();
      let ret = resolve_typespec(r, ctx, ret);
      r.types.type_function(&params, ret)
    }
    TypespecKind::Typeof(expr) => {
      // "resolves the expression and returns its type without evaluating
      // it" (`spec.md` §4.4).
      super::expr::resolve_expr(r, ctx, expr).ty
    }
  }
}
