//! String interning: identical text always yields the identical [`Ident`]
//! handle, so identifier equality reduces to pointer (here, integer)
//! equality. See `spec.md` §3 "Interned identifier" and §4.1.
//!
//! This is deliberately distinct from `spec.md`'s "Symbol" (§3: "A tagged
//! record: Type | Variable | Constant | Function | Namespace | Template"),
//! which lives in [`crate::symbol`] — an `Ident` is just interned text, a
//! `Symbol` is a declaration that text resolves to in some scope.

use std::fmt;
use hashbrown::HashMap;

/// An interned identifier. Cheap to copy, compare, and hash; two `Ident`s
/// compare equal iff they were interned from the same text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(u32);

impl fmt::Debug for Ident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Ident({})", self.0)
  }
}

/// Owns the backing storage for every interned string. Entries are never
/// removed: the interner only ever grows, matching the freezer's
/// "init at startup, read/grow during compile" lifecycle (`spec.md` §9).
#[derive(Default)]
pub struct Interner {
  map: HashMap<Box<str>, Ident>,
  strings: Vec<Box<str>>,
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Intern `s`, returning its (possibly newly-allocated) handle.
  pub fn intern(&mut self, s: &str) -> Ident {
    if let Some(&id) = self.map.get(s) { return id }
    let id = Ident(u32::try_from(self.strings.len()).expect("interner overflow"));
    let boxed: Box<str> = s.into();
    self.strings.push(boxed.clone());
    self.map.insert(boxed, id);
    id
  }

  /// Resolve a handle back to its text. Panics on an `Ident` from a
  /// different interner — an internal-consistency error, not a user error.
  #[must_use] pub fn resolve(&self, id: Ident) -> &str {
    &self.strings[id.0 as usize]
  }

  #[must_use] pub fn len(&self) -> usize { self.strings.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.strings.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_text_yields_identical_handle() {
    let mut i = Interner::new();
    let a = i.intern("foo");
    let b = i.intern("foo");
    let c = i.intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn resolve_round_trips() {
    let mut i = Interner::new();
    let a = i.intern("hello");
    assert_eq!(i.resolve(a), "hello");
  }

  #[test]
  fn grows_monotonically() {
    let mut i = Interner::new();
    assert_eq!(i.len(), 0);
    i.intern("a");
    i.intern("b");
    i.intern("a");
    assert_eq!(i.len(), 2);
  }
}
