//! Abstract syntax tree for bash input.

pub mod types;

pub use types::*;
