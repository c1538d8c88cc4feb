//! Canonical types. `spec.md` §3 "Type", §4.1, §9 "Struct alignment".
//!
//! Every [`Type`] is allocated exactly once per canonical name by the
//! [`registry::TypeRegistry`]; two `&'static Type` references compare
//! structurally-equal-by-construction, so `spec.md`'s "type equality is
//! pointer equality" invariant is enforced simply by never constructing a
//! `Type` outside the registry.

pub mod integer;
pub mod registry;

use std::cell::{Cell, OnceCell};
use num::BigInt;
use crate::interner::Ident;
use crate::symbol::SymbolTableRef;
pub use integer::IntWidth;

/// A canonical, interned type. `size`/`align` are `Cell`s purely to support
/// struct *completion* (`spec.md` §4.4, §9 "Cyclic references"): a struct's
/// `Type` is allocated (and its pointer published to the registry) before
/// its members and therefore its size are known, and nothing else in the
/// crate is ever allowed to mutate them once set.
#[derive(Debug)]
pub struct Type {
  /// The canonical printed name, e.g. `"*[4]u16"`, `"func(u32, *any) void"`.
  pub name: &'static str,
  size: Cell<u64>,
  align: Cell<u64>,
  pub kind: TypeKind,
}

impl Type {
  #[must_use] pub fn size(&self) -> u64 { self.size.get() }
  #[must_use] pub fn align(&self) -> u64 { self.align.get() }

  /// A struct type is incomplete until [`StructType::complete`] has run.
  #[must_use] pub fn is_complete(&self) -> bool {
    match &self.kind {
      TypeKind::Struct(s) => s.members.get().is_some(),
      _ => true,
    }
  }

  #[must_use] pub fn is_unsized_integer(&self) -> bool {
    matches!(&self.kind, TypeKind::Integer(i) if i.width == IntWidth::Unsized)
  }

  #[must_use] pub fn as_integer(&self) -> Option<&IntegerType> {
    match &self.kind { TypeKind::Integer(i) => Some(i), _ => None }
  }

  #[must_use] pub fn as_struct(&self) -> Option<&StructType> {
    match &self.kind { TypeKind::Struct(s) => Some(s), _ => None }
  }

  #[must_use] pub fn is_usize(&self) -> bool {
    matches!(&self.kind, TypeKind::Integer(i) if i.width == IntWidth::Pointer && !i.signed)
  }
}

/// Because every `Type` is registry-interned, `==` here is pointer
/// equality in every meaningful sense, but we compare the (also unique)
/// name for a safe, `Send`-agnostic implementation.
impl PartialEq for Type {
  fn eq(&self, other: &Self) -> bool { std::ptr::eq(self, other) }
}
impl Eq for Type {}

impl std::hash::Hash for Type {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    std::ptr::hash(self, state)
  }
}

#[derive(Debug)]
pub enum TypeKind {
  Void,
  Bool,
  Byte,
  Integer(IntegerType),
  Pointer(&'static Type),
  Slice(&'static Type),
  Array(u64, &'static Type),
  Function(FunctionType),
  Struct(StructType),
  /// The generic pointee permitting `*any` conversions (`spec.md` §3).
  Any,
}

#[derive(Debug)]
pub struct IntegerType {
  pub width: IntWidth,
  pub signed: bool,
  /// `None` only for the unsized (untyped-literal) variant.
  pub min: Option<BigInt>,
  pub max: Option<BigInt>,
}

impl IntegerType {
  /// Whether `v` is representable by this type (`spec.md` §8: "For any
  /// `Value` of a sized integer type T, `T.min ≤ value ≤ T.max`").
  #[must_use] pub fn in_range(&self, v: &BigInt) -> bool {
    match (&self.min, &self.max) {
      (Some(min), Some(max)) => min <= v && v <= max,
      _ => true,
    }
  }
}

#[derive(Debug)]
pub struct FunctionType {
  pub params: &'static [&'static Type],
  pub ret: &'static Type,
}

/// A struct type: predeclared with an empty member list (`spec.md` §4.4
/// "Struct completion"; §9 "Cyclic references"), then completed exactly
/// once by [`StructType::complete`].
#[derive(Debug)]
pub struct StructType {
  /// The fully-qualified, normalized declaration name (`spec.md` §4.4
  /// "Static symbol naming"), also used as this type's canonical name.
  pub qualified_name: Ident,
  /// The struct's inner namespace table, holding its constant/function/
  /// template members (`spec.md` §4.2, §4.4).
  pub member_table: SymbolTableRef,
  members: OnceCell<&'static [Member]>,
}

#[derive(Debug, Clone, Copy)]
pub struct Member {
  pub name: Ident,
  pub ty: &'static Type,
  pub offset: u64,
}

impl StructType {
  #[must_use] pub fn members(&self) -> Option<&'static [Member]> { self.members.get().copied() }

  #[must_use] pub fn member(&self, name: Ident) -> Option<Member> {
    self.members()?.iter().copied().find(|m| m.name == name)
  }

  /// Populate the member-variable list and update the owning `Type`'s
  /// size/align. Called exactly once, by the resolver's struct-completion
  /// pass. Panics (internal-consistency error, `spec.md` §7) if called
  /// twice.
  pub(crate) fn complete(&self, owner: &Type, members: &'static [Member], size: u64, align: u64) {
    self.members.set(members).expect("struct completed twice");
    owner.size.set(size);
    owner.align.set(align);
  }
}

/// Lay out `members` sequentially at each member's natural alignment
/// (`SPEC_FULL.md` §4 "Struct alignment (open question, resolved)"),
/// returning the computed (offset-annotated) members, struct size, and
/// struct alignment.
#[must_use] pub fn layout_struct(fields: &[(Ident, &'static Type)]) -> (Vec<Member>, u64, u64) {
  let mut offset = 0_u64;
  let mut align = 1_u64;
  let mut members = Vec::with_capacity(fields.len());
  for &(name, ty) in fields {
    let falign = ty.align().max(1);
    align = align.max(falign);
    offset = offset.div_ceil(falign) * falign;
    members.push(Member { name, ty, offset });
    offset += ty.size();
  }
  let size = offset.div_ceil(align) * align;
  (members, size, align)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::registry::TypeRegistry;

  #[test]
  fn struct_layout_inserts_alignment_padding() {
    let reg = TypeRegistry::new();
    let byte = reg.type_byte();
    let u32 = reg.type_integer(IntWidth::W32, false);
    let mut interner = crate::interner::Interner::new();
    let a = interner.intern("a");
    let b = interner.intern("b");
    let (members, size, align) = layout_struct(&[(a, byte), (b, u32)]);
    assert_eq!(members[0].offset, 0);
    assert_eq!(members[1].offset, 4); // padded up to u32's alignment
    assert_eq!(size, 8); // rounded to align (4)
    assert_eq!(align, 4);
  }
}
