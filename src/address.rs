//! Storage addresses and the static-symbol uniquifier. `spec.md` §3
//! "Address", §4.4 "Static symbol naming".
//!
//! Grounded on `codegen.rs`'s label/offset addressing model (`GlobalId`/
//! `ProcId` + byte offsets), generalized to the `Static{name,offset}` /
//! `Local{rbp_offset}` split `spec.md` §3 specifies.

use hashbrown::HashSet;
use crate::interner::{Ident, Interner};

/// Where a variable, constant, or function lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Address {
  /// A label (plus byte offset) the assembler/linker resolves, for
  /// anything living for the program's entire lifetime.
  Static { name: Ident, offset: u64 },
  /// A stack-frame-relative offset, for locals and parameters.
  Local { rbp_offset: i32 },
}

impl Address {
  #[must_use] pub fn is_static(&self) -> bool { matches!(self, Address::Static { .. }) }

  /// Rebase a static address by `delta` bytes (`spec.md` §4.3 "l-value …
  /// array index (rebases a static address by `index * element_size`)").
  /// Panics on a `Local` address — an internal-consistency error, since
  /// only [`crate::eval`] ever rebases addresses and it only ever does so
  /// on addresses it already confirmed are `Static`.
  #[must_use] pub fn rebase(&self, delta: u64) -> Address {
    match *self {
      Address::Static { name, offset } => Address::Static { name, offset: offset + delta },
      Address::Local { .. } => unreachable!("rebasing a non-static address"),
    }
  }
}

/// Assigns collision-free static labels. `spec.md` §4.4: "non-alphanumeric,
/// non-underscore characters are replaced with `_`; the prefix joins with
/// `.`; a monotonically increasing unique id is appended only when a naked
/// name already collides with a previously-registered static symbol."
#[derive(Default)]
pub struct StaticNames {
  used: HashSet<Box<str>>,
  next_id: u64,
}

impl StaticNames {
  #[must_use] pub fn new() -> Self { Self::default() }

  fn sanitize(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
  }

  /// Build a fresh, collision-free static name and intern it.
  pub fn normalize(&mut self, interner: &mut Interner, prefix: &str, name: &str) -> Ident {
    let naked = if prefix.is_empty() {
      Self::sanitize(name)
    } else {
      format!("{}.{}", Self::sanitize(prefix), Self::sanitize(name))
    };
    let chosen = if self.used.contains(naked.as_str()) {
      loop {
        let candidate = format!("{naked}.{}", self.next_id);
        self.next_id += 1;
        if !self.used.contains(candidate.as_str()) { break candidate }
      }
    } else {
      naked
    };
    self.used.insert(chosen.clone().into_boxed_str());
    interner.intern(&chosen)
  }

  /// A synthetic name for a value with no user-facing declaration (a
  /// bytes-literal constant, a slice-literal's backing array).
  pub fn synthetic(&mut self, interner: &mut Interner, prefix: &str, hint: &str) -> Ident {
    self.normalize(interner, prefix, &format!("__{hint}"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_replaces_non_identifier_chars() {
    let mut names = StaticNames::new();
    let mut interner = Interner::new();
    let id = names.normalize(&mut interner, "a.b", "foo-bar");
    assert_eq!(interner.resolve(id), "a_b.foo_bar");
  }

  #[test]
  fn colliding_names_get_unique_suffix() {
    let mut names = StaticNames::new();
    let mut interner = Interner::new();
    let a = names.normalize(&mut interner, "", "x");
    let b = names.normalize(&mut interner, "", "x");
    assert_ne!(a, b);
    assert_eq!(interner.resolve(a), "x");
    assert_eq!(interner.resolve(b), "x.0");
  }

  #[test]
  fn distinct_prefixes_do_not_collide() {
    let mut names = StaticNames::new();
    let mut interner = Interner::new();
    let a = names.normalize(&mut interner, "m1", "x");
    let b = names.normalize(&mut interner, "m2", "x");
    assert_ne!(a, b);
  }
}
