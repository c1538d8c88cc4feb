//! Integer widths and their representable bounds. `spec.md` §3 "Integer",
//! §4.1: "Integer types carry bounds computed once at initialization for
//! each width."

use num::BigInt;

/// The pointer width this back-end targets. `spec.md` §1 scopes the
/// back-end to x86-64, so pointer-width integers are always 64 bits; kept
/// as a named width anyway so the rest of the crate never hardcodes it.
pub const POINTER_BITS: u32 = 64;

/// A distinguished size for the unsized (untyped-literal) integer variant.
/// Never used for memory layout — only to mark "not yet given a concrete
/// width" (`spec.md` §3: "size = UNSIZED").
pub const UNSIZED_SIZE: u64 = u64::MAX;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IntWidth {
  W8,
  W16,
  W32,
  W64,
  /// Pointer-width (`usize`/`ssize`), currently always 64 bits (x86-64).
  Pointer,
  /// The untyped-literal variant: unbounded range, `size == UNSIZED_SIZE`.
  Unsized,
}

impl IntWidth {
  #[must_use] pub fn bits(self) -> u32 {
    match self {
      IntWidth::W8 => 8,
      IntWidth::W16 => 16,
      IntWidth::W32 => 32,
      IntWidth::W64 | IntWidth::Pointer => 64,
      IntWidth::Unsized => 0,
    }
  }

  #[must_use] pub fn byte_size(self) -> u64 {
    match self {
      IntWidth::Unsized => UNSIZED_SIZE,
      w => u64::from(w.bits()) / 8,
    }
  }

  /// The suffix text used to name this width in a canonical type name and
  /// in literal suffixes (`spec.md` §4.4 "Integer literal suffix").
  #[must_use] pub fn suffix(self) -> &'static str {
    match self {
      IntWidth::W8 => "8",
      IntWidth::W16 => "16",
      IntWidth::W32 => "32",
      IntWidth::W64 => "64",
      IntWidth::Pointer => "",
      IntWidth::Unsized => "",
    }
  }
}

/// Computes `(min, max)` for a sized integer type of the given width and
/// signedness, once, at registry initialization. Unsized integers have no
/// bound (represented as `None`, meaning "arbitrary precision until a
/// context narrows it").
#[must_use] pub fn bounds(width: IntWidth, signed: bool) -> Option<(BigInt, BigInt)> {
  if matches!(width, IntWidth::Unsized) { return None }
  let bits = width.bits();
  Some(if signed {
    let half: BigInt = BigInt::from(1) << (bits - 1);
    (-half.clone(), half - 1)
  } else {
    let max: BigInt = (BigInt::from(1) << bits) - 1;
    (BigInt::from(0), max)
  })
}

/// Canonical type name for a sized integer (`spec.md` §4.4's `u8`, `s8`,
/// … , `u`/`usize`, `s`/`ssize` suffix family collapsed to the type name
/// itself, not the literal suffix — e.g. the type `u32` prints as `"u32"`).
#[must_use] pub fn type_name(width: IntWidth, signed: bool) -> String {
  match width {
    IntWidth::Pointer => if signed { "ssize".into() } else { "usize".into() },
    IntWidth::Unsized => "{integer}".into(),
    w => format!("{}{}", if signed { 's' } else { 'u' }, w.suffix()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn u8_bounds_are_0_255() {
    let (min, max) = bounds(IntWidth::W8, false).unwrap();
    assert_eq!(min, BigInt::from(0));
    assert_eq!(max, BigInt::from(255));
  }

  #[test]
  fn s8_bounds_are_neg128_127() {
    let (min, max) = bounds(IntWidth::W8, true).unwrap();
    assert_eq!(min, BigInt::from(-128));
    assert_eq!(max, BigInt::from(127));
  }

  #[test]
  fn s64_bounds_match_i64_range() {
    let (min, max) = bounds(IntWidth::W64, true).unwrap();
    assert_eq!(min, BigInt::from(i64::MIN));
    assert_eq!(max, BigInt::from(i64::MAX));
  }

  #[test]
  fn unsized_has_no_bounds() {
    assert!(bounds(IntWidth::Unsized, false).is_none());
  }

  #[test]
  fn type_names_match_spec_suffixes() {
    assert_eq!(type_name(IntWidth::W32, false), "u32");
    assert_eq!(type_name(IntWidth::W16, true), "s16");
    assert_eq!(type_name(IntWidth::Pointer, false), "usize");
    assert_eq!(type_name(IntWidth::Pointer, true), "ssize");
  }
}
