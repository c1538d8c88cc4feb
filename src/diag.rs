//! The single fatal-diagnostic sink. `spec.md` §6/§7: every semantic error
//! is fatal, carries a source location, and terminates the process — there
//! is no recoverable error type here, matching `mmcc`'s own posture of
//! `.expect(..)`/`unreachable!()` at the boundary of "this should not
//! happen" (see `build_mir.rs`, `codegen.rs`).

use std::fmt;
use std::rc::Rc;

/// A location in a source file, as handed down by the (external) lexer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Span {
  pub path: Rc<str>,
  pub line: u32,
  pub column: u32,
}

impl Span {
  #[must_use] pub fn new(path: Rc<str>, line: u32, column: u32) -> Self {
    Self { path, line, column }
  }

  /// A placeholder span for synthesized nodes (e.g. template instantiation
  /// bodies) that have no direct source location of their own.
  #[must_use] pub fn synthetic() -> Self {
    Self { path: Rc::from("<synthesized>"), line: 0, column: 0 }
  }
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.path, self.line, self.column)
  }
}

impl fmt::Debug for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(self, f) }
}

/// Report a fatal diagnostic and terminate the process with a non-zero
/// exit code. This function never returns; callers write
/// `return fatal(...)` or just `fatal(...);` at the end of a diverging
/// branch, the same as `mmcc` writes `unreachable!()` or `panic!()`.
///
/// The message is also emitted through `log::error!` before the process
/// exits (SPEC_FULL §7), so a host binary can capture it structurally by
/// installing a different `log::Log` implementation.
#[cold]
pub fn fatal(span: &Span, args: fmt::Arguments<'_>) -> ! {
  log::error!("{span}: {args}");
  eprintln!("{span}: error: {args}");
  std::process::exit(1)
}

/// Convenience macro mirroring `mmcc`'s terse call-site style
/// (`.expect("overflow")`, `unreachable!("for unelaborated tuple patterns")`)
/// but routed through the shared sink instead of panicking, since a
/// semantic error is expected user-facing behavior, not a compiler bug.
#[macro_export]
macro_rules! fatal {
  ($span:expr, $($args:tt)*) => {
    $crate::diag::fatal($span, format_args!($($args)*))
  };
}

/// Internal-invariant violations (§7: "Internal invariants are asserted;
/// violations indicate a compiler bug rather than a user error") use the
/// ordinary `assert!`/`unreachable!` family directly at the call site —
/// there is no separate wrapper for those, by design.
#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn span_display_matches_path_line_column() {
    let s = Span::new(Rc::from("foo.sunder"), 3, 7);
    assert_eq!(s.to_string(), "foo.sunder:3:7");
  }
}
