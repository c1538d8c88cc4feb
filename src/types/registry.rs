//! The type registry: `type_unique_*` constructors and the canonical-name
//! probe/publish table. `spec.md` §4.1.

use std::cell::{Cell, RefCell};
use hashbrown::HashMap;
use crate::arena::TypeArena;
use crate::interner::Ident;
use crate::symbol::SymbolTable;
use super::{FunctionType, IntWidth, IntegerType, Member, StructType, Type, TypeKind};

pub struct TypeRegistry {
  arena: TypeArena<Type>,
  by_name: RefCell<HashMap<Box<str>, &'static Type>>,
  prims: Prims,
}

struct Prims {
  void: &'static Type,
  bool_: &'static Type,
  byte: &'static Type,
  any: &'static Type,
}

impl TypeRegistry {
  #[must_use] pub fn new() -> Self {
    let arena = TypeArena::new();
    let by_name = RefCell::new(HashMap::new());
    let publish = |arena: &TypeArena<Type>, by_name: &RefCell<HashMap<Box<str>, &'static Type>>,
                   name: &str, size: u64, align: u64, kind: TypeKind| -> &'static Type {
      let ty = arena.alloc(Type { name: Box::leak(name.into()), size: Cell::new(size), align: Cell::new(align), kind });
      by_name.borrow_mut().insert(name.into(), ty);
      ty
    };
    let void = publish(&arena, &by_name, "void", 0, 1, TypeKind::Void);
    let bool_ = publish(&arena, &by_name, "bool", 1, 1, TypeKind::Bool);
    let byte = publish(&arena, &by_name, "byte", 1, 1, TypeKind::Byte);
    let any = publish(&arena, &by_name, "any", 0, 1, TypeKind::Any);
    Self { arena, by_name, prims: Prims { void, bool_, byte, any } }
  }

  #[must_use] pub fn type_void(&self) -> &'static Type { self.prims.void }
  #[must_use] pub fn type_bool(&self) -> &'static Type { self.prims.bool_ }
  #[must_use] pub fn type_byte(&self) -> &'static Type { self.prims.byte }
  #[must_use] pub fn type_any(&self) -> &'static Type { self.prims.any }

  fn probe_or_publish(&self, name: String, size: u64, align: u64, kind: TypeKind) -> &'static Type {
    if let Some(&ty) = self.by_name.borrow().get(name.as_str()) { return ty }
    let ty = self.arena.alloc(Type {
      name: Box::leak(name.clone().into_boxed_str()),
      size: Cell::new(size), align: Cell::new(align), kind,
    });
    self.by_name.borrow_mut().insert(name.into_boxed_str(), ty);
    ty
  }

  /// Sized or unsized integer type, cached by `(width, signed)` via the
  /// canonical name (`spec.md` §4.1 "Integer types carry bounds computed
  /// once at initialization for each width").
  #[must_use] pub fn type_integer(&self, width: IntWidth, signed: bool) -> &'static Type {
    let name = IntWidth::type_name(width, signed);
    let bounds = IntWidth::bounds(width, signed);
    let (size, align) = if matches!(width, IntWidth::Unsized) {
      (super::integer::UNSIZED_SIZE, 1)
    } else {
      let sz = width.byte_size();
      (sz, sz)
    };
    self.probe_or_publish(name, size, align, TypeKind::Integer(IntegerType {
      width, signed, min: bounds.as_ref().map(|b| b.0.clone()), max: bounds.map(|b| b.1),
    }))
  }

  #[must_use] pub fn type_unsized_integer(&self) -> &'static Type {
    self.type_integer(IntWidth::Unsized, true)
  }

  #[must_use] pub fn type_pointer(&self, base: &'static Type) -> &'static Type {
    let name = format!("*{}", base.name);
    self.probe_or_publish(name, 8, 8, TypeKind::Pointer(base))
  }

  /// Slices are laid out as `(pointer, count)`, matching `spec.md` §3.
  #[must_use] pub fn type_slice(&self, base: &'static Type) -> &'static Type {
    let name = format!("[]{}", base.name);
    self.probe_or_publish(name, 16, 8, TypeKind::Slice(base))
  }

  #[must_use] pub fn type_array(&self, count: u64, base: &'static Type) -> &'static Type {
    let name = format!("[{count}]{}", base.name);
    let size = base.size().saturating_mul(count);
    self.probe_or_publish(name, size, base.align().max(1), TypeKind::Array(count, base))
  }

  /// Function types always print parameter and return types by their
  /// already-canonical names (`spec.md` §4.1), so nested function types
  /// unambiguously round-trip through the canonical-name probe.
  #[must_use] pub fn type_function(&self, params: &[&'static Type], ret: &'static Type) -> &'static Type {
    let name = format!(
      "func({}) {}",
      params.iter().map(|p| p.name).collect::<Vec<_>>().join(", "),
      ret.name,
    );
    let params: &'static [&'static Type] = self.arena_leak_slice(params);
    self.probe_or_publish(name, 8, 8, TypeKind::Function(FunctionType { params, ret }))
  }

  fn arena_leak_slice(&self, s: &[&'static Type]) -> &'static [&'static Type] {
    Box::leak(s.to_vec().into_boxed_slice())
  }

  /// Predeclare a struct type: the `Type` exists (and is registered, so
  /// self-referential member types can name it) but has no member list
  /// yet (`spec.md` §4.4 "Struct completion", §9 "Cyclic references").
  /// `qualified_name` must already be the normalized, fully-qualified
  /// static name (`spec.md` §4.4 "Static symbol naming").
  pub fn predeclare_struct(&self, qualified_name: Ident, display_name: &str, member_table: SymbolTableRefHandle) -> &'static Type {
    self.probe_or_publish(display_name.to_owned(), 0, 1, TypeKind::Struct(StructType {
      qualified_name,
      member_table,
      members: std::cell::OnceCell::new(),
    }))
  }

  #[must_use] pub fn len(&self) -> usize { self.by_name.borrow().len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Default for TypeRegistry {
  fn default() -> Self { Self::new() }
}

/// Alias kept local to this module to avoid a direct `use` cycle comment
/// noise at call sites; it is exactly [`crate::symbol::SymbolTableRef`].
pub type SymbolTableRefHandle = std::rc::Rc<RefCell<SymbolTable>>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_canonical_name_is_pointer_equal() {
    let reg = TypeRegistry::new();
    let a = reg.type_pointer(reg.type_byte());
    let b = reg.type_pointer(reg.type_byte());
    assert!(std::ptr::eq(a, b));
  }

  #[test]
  fn different_element_types_differ() {
    let reg = TypeRegistry::new();
    let a = reg.type_array(4, reg.type_integer(IntWidth::W16, false));
    let b = reg.type_array(4, reg.type_integer(IntWidth::W32, false));
    assert!(!std::ptr::eq(a, b));
    assert_eq!(a.name, "[4]u16");
  }

  #[test]
  fn function_type_name_matches_spec_example() {
    let reg = TypeRegistry::new();
    let u32 = reg.type_integer(IntWidth::W32, false);
    let any_ptr = reg.type_pointer(reg.type_any());
    let f = reg.type_function(&[u32, any_ptr], reg.type_void());
    assert_eq!(f.name, "func(u32, *any) void");
  }

  #[test]
  fn integer_bounds_enforce_range() {
    let reg = TypeRegistry::new();
    let u8 = reg.type_integer(IntWidth::W8, false);
    let ity = u8.as_integer().unwrap();
    assert!(ity.in_range(&num::BigInt::from(255)));
    assert!(!ity.in_range(&num::BigInt::from(256)));
  }
}
