//! `sunderc-sema`: name resolution, compile-time constant evaluation, and
//! type/symbol-table machinery for the Sunder language (`spec.md` §1
//! "Overview") — the semantic front end sitting between a parser's CST
//! and a back end's code generation.
//!
//! Grounded on `mmcc`'s own crate-root shape: one `pub mod` per concern,
//! plus a single driver entry point built on the stage's own context
//! object (there, `Compiler<C>`; here, [`resolve::Resolver`]).

pub mod address;
pub mod arena;
pub mod cst;
pub mod diag;
pub mod eval;
pub mod interner;
pub mod resolve;
pub mod symbol;
pub mod tir;
pub mod types;
pub mod value;

use diag::{fatal, Span};
use resolve::{Config, Resolver};
use tir::ResolvedModule;

/// Resolve `entry` and, transitively, every module it imports, into a
/// frozen [`ResolvedModule`] (`spec.md` §2 "Control flow": "the driver
/// parses each imported module into a CST, then calls the resolver once
/// per module"). A circular import is the one internally-recoverable
/// condition [`Resolver::resolve_module`] produces; this is where it
/// becomes the crate's single fatal diagnostic, since nothing upstream of
/// the driver can act on it differently (`spec.md` §7 "Module").
pub fn resolve(entry: &cst::Module, config: Config) -> ResolvedModule {
  let resolver = Resolver::new(config);
  if let Err(circular) = resolver.resolve_module(entry) {
    fatal(&Span::synthetic(), format_args!(
      "circular import detected while resolving '{}'", circular.path.display()));
  }
  resolver.into_output()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  #[test]
  fn resolving_an_empty_module_produces_empty_output() {
    let module = cst::Module { path: Rc::from("/empty.sunder"), namespace: Vec::new(), decls: Vec::new() };
    let out = resolve(&module, Config::default());
    assert!(out.statics.is_empty());
    assert!(out.functions.is_empty());
  }
}
