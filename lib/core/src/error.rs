//! Error handling foundation for flowpatch.
//!
//! Crates keep their own error enums (`RequestError` in the engine,
//! `CliError` in the binary) and return them wrapped in a rootcause
//! [`Report`] through this alias.

use rootcause::Report;

/// A Result carrying a rootcause report whose context is `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
