//! Compile-time values: an interpretable mirror of a [`crate::types::Type`],
//! distinct from a runtime value. `spec.md` §3 "Value", §4.3.
//!
//! Grounded on `build_mir.rs`'s `Translator`/memoized-reduction shape (a
//! value is a reduction of a typed expression, the same relationship MIR
//! has to HIR in the teacher) — here the reduction target is a `Value`
//! instead of another IR.

use std::rc::Rc;
use num::{BigInt, Signed};
use crate::address::Address;
use crate::diag::{fatal, Span};
use crate::tir::Function;
use crate::types::Type;

#[derive(Clone, Debug)]
pub enum Value {
  Boolean(bool),
  Byte(u8),
  /// `spec.md` §3: "the invariant `min ≤ bigint ≤ max`" — enforced by
  /// every constructor in this module and in [`crate::eval`], never by
  /// this variant itself (it has no fallible constructor to enforce it
  /// in).
  Integer(&'static Type, BigInt),
  Function(Rc<Function>),
  Pointer(&'static Type, Address),
  /// `len(elements) == type.count` (`spec.md` §3), likewise left to
  /// constructors to uphold.
  Array(&'static Type, Vec<Value>),
  /// `pointer` is always a `Pointer` value, `count` always a `usize`
  /// `Integer` value (`spec.md` §3).
  Slice(&'static Type, Box<Value>, Box<Value>),
}

impl Value {
  #[must_use] pub fn type_of(&self) -> &'static Type {
    match self {
      Value::Boolean(_) | Value::Byte(_) => unreachable!("type_of called without a type table; use typed constructors"),
      Value::Integer(t, _) | Value::Pointer(t, _) | Value::Array(t, _) | Value::Slice(t, _, _) => t,
      Value::Function(f) => f.ty,
    }
  }

  #[must_use] pub fn as_integer(&self) -> Option<&BigInt> {
    match self { Value::Integer(_, n) => Some(n), _ => None }
  }

  #[must_use] pub fn as_bool(&self) -> Option<bool> {
    match self { Value::Boolean(b) => Some(*b), _ => None }
  }

  #[must_use] pub fn as_usize(&self) -> Option<u64> {
    self.as_integer().and_then(num::ToPrimitive::to_u64)
  }

  #[must_use] pub fn as_pointer(&self) -> Option<&Address> {
    match self { Value::Pointer(_, a) => Some(a), _ => None }
  }

  #[must_use] pub fn as_slice_count(&self) -> Option<&Value> {
    match self { Value::Slice(_, _, c) => Some(c), _ => None }
  }

  /// Structural equality (`spec.md` §4.3: "`==`/`!=` use structural
  /// `Value` equality").
  #[must_use] pub fn structural_eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Boolean(a), Value::Boolean(b)) => a == b,
      (Value::Byte(a), Value::Byte(b)) => a == b,
      (Value::Integer(_, a), Value::Integer(_, b)) => a == b,
      (Value::Pointer(_, a), Value::Pointer(_, b)) => a == b,
      (Value::Function(a), Value::Function(b)) => std::ptr::eq(Rc::as_ptr(a), Rc::as_ptr(b)),
      (Value::Array(_, a), Value::Array(_, b)) =>
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structural_eq(y)),
      (Value::Slice(_, pa, ca), Value::Slice(_, pb, cb)) => pa.structural_eq(pb) && ca.structural_eq(cb),
      _ => false,
    }
  }

  /// Ordered comparison, defined only on bool, byte, integer (`spec.md`
  /// §4.3; §9 "Pointer equality of values": "ordered comparison of
  /// `Pointer` values [is] a fatal error").
  pub fn compare(&self, other: &Value, span: &Span) -> std::cmp::Ordering {
    match (self, other) {
      (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
      (Value::Byte(a), Value::Byte(b)) => a.cmp(b),
      (Value::Integer(_, a), Value::Integer(_, b)) => a.cmp(b),
      _ => fatal(span, format_args!("ordered comparison is not supported for this type in a constant expression")),
    }
  }

  /// Little-endian byte serialization of a scalar value, used by cast
  /// evaluation (`spec.md` §4.3 "Cast"). Only meaningful for
  /// `Boolean`/`Byte`/`Integer` — the only source kinds that reach a cast
  /// after pointer casts are rejected.
  #[must_use] pub fn to_le_bytes(&self) -> Vec<u8> {
    match self {
      Value::Boolean(b) => vec![u8::from(*b)],
      Value::Byte(b) => vec![*b],
      Value::Integer(ty, n) => {
        let bits = if ty.is_unsized_integer() {
          n.bits().max(1).div_ceil(8) * 8
        } else {
          ty.size() * 8
        };
        let bits = bits.max(8) as u32;
        bigint_to_bits(n, bits).chunks(8).map(bits_to_byte).collect()
      }
      _ => unreachable!("to_le_bytes on a non-scalar value"),
    }
  }
}

fn bits_to_byte(bits: &[bool]) -> u8 {
  bits.iter().enumerate().fold(0u8, |acc, (i, &b)| if b { acc | (1 << i) } else { acc })
}

/// Two's-complement bit pattern of `v`, least-significant bit first,
/// exactly `bits` long.
#[must_use] pub fn bigint_to_bits(v: &BigInt, bits: u32) -> Vec<bool> {
  let modulus = BigInt::from(1) << bits;
  let pattern = ((v % &modulus) + &modulus) % &modulus;
  let mut n = pattern;
  let mut out = Vec::with_capacity(bits as usize);
  for _ in 0..bits {
    out.push(&n % 2 != BigInt::from(0));
    n /= 2;
  }
  out
}

/// Reassemble a bit pattern (LSB first) into a `BigInt`, interpreted as
/// signed iff `signed`.
#[must_use] pub fn bits_to_bigint(bits: &[bool], signed: bool) -> BigInt {
  let mut n = BigInt::from(0);
  for (i, &b) in bits.iter().enumerate() {
    if b { n += BigInt::from(1) << i; }
  }
  if signed {
    let width = u32::try_from(bits.len()).expect("bit width too large");
    let half = BigInt::from(1) << (width - 1);
    if n >= half { n -= BigInt::from(1) << width; }
  }
  n
}

/// `spec.md` §4.3 Cast, fixed-width-integer case: "source value is
/// serialized to a bit array of source size, sign-extended if source is
/// signed AND the top bit is set, otherwise zero-extended to the
/// destination width, then interpreted as signed iff the destination is
/// signed. Truncation is implicit in the bit count."
#[must_use] pub fn reinterpret_bits(
  v: &BigInt, src_bits: u32, src_signed: bool, dst_bits: u32, dst_signed: bool,
) -> BigInt {
  let mut bits = bigint_to_bits(v, src_bits);
  match dst_bits.cmp(&src_bits) {
    std::cmp::Ordering::Greater => {
      let fill = src_signed && *bits.last().unwrap_or(&false);
      bits.resize(dst_bits as usize, fill);
    }
    std::cmp::Ordering::Less => bits.truncate(dst_bits as usize),
    std::cmp::Ordering::Equal => {}
  }
  bits_to_bigint(&bits, dst_signed)
}

/// Bitwise-not over the type's own width, used for `~` on an integer
/// (`spec.md` §4.3 "Unary": "`~` on integer serializes to a bit array of
/// the type's width, inverts, reassembles").
#[must_use] pub fn bitwise_not(v: &BigInt, bits: u32, signed: bool) -> BigInt {
  let inverted: Vec<bool> = bigint_to_bits(v, bits).into_iter().map(|b| !b).collect();
  bits_to_bigint(&inverted, signed)
}

#[derive(Clone, Copy, Debug)]
pub enum BitOp { And, Or, Xor }

/// Pointwise/bitwise binary op over a type's width (`spec.md` §4.3
/// "Binary": "`|`, `^`, `&` operate … bitwise on integers (via bit-array
/// serialization/deserialization with the destination signedness)").
#[must_use] pub fn bitwise_binop(a: &BigInt, b: &BigInt, bits: u32, signed: bool, op: BitOp) -> BigInt {
  let abits = bigint_to_bits(a, bits);
  let bbits = bigint_to_bits(b, bits);
  let out: Vec<bool> = abits.iter().zip(&bbits).map(|(&x, &y)| match op {
    BitOp::And => x && y,
    BitOp::Or => x || y,
    BitOp::Xor => x != y,
  }).collect();
  bits_to_bigint(&out, signed)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bit_round_trip_is_identity() {
    let v = BigInt::from(-5);
    let bits = bigint_to_bits(&v, 8);
    assert_eq!(bits_to_bigint(&bits, true), v);
  }

  #[test]
  fn sign_extend_negative_byte_to_word() {
    // -1 as s8 sign-extends to -1 as s16.
    let v = BigInt::from(-1);
    let out = reinterpret_bits(&v, 8, true, 16, true);
    assert_eq!(out, BigInt::from(-1));
  }

  #[test]
  fn zero_extend_unsigned_byte_to_word() {
    let v = BigInt::from(200);
    let out = reinterpret_bits(&v, 8, false, 16, false);
    assert_eq!(out, BigInt::from(200));
  }

  #[test]
  fn truncate_drops_high_bits() {
    let v = BigInt::from(300); // 0x12C
    let out = reinterpret_bits(&v, 16, false, 8, false);
    assert_eq!(out, BigInt::from(300 % 256));
  }

  #[test]
  fn bitwise_not_is_involutive() {
    let v = BigInt::from(5);
    let once = bitwise_not(&v, 8, false);
    let twice = bitwise_not(&once, 8, false);
    assert_eq!(twice, v);
  }

  #[test]
  fn structural_eq_matches_arrays_elementwise() {
    let reg = crate::types::registry::TypeRegistry::new();
    let ty = reg.type_integer(crate::types::IntWidth::W32, false);
    let int_eq = |a: i64, b: i64| {
      Value::Integer(ty, BigInt::from(a)).structural_eq(&Value::Integer(ty, BigInt::from(b)))
    };
    assert!(int_eq(3, 3));
    assert!(!int_eq(3, 4));
  }
}
