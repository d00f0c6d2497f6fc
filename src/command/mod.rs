//! Command formatting: argv filtering and shell-safe tokenization.

mod formatter;

pub use formatter::*;
