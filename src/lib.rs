//! marlin - bash compatibility layer for the fish shell
//!
//! This library lets an interactive fish session accept bash syntax. It
//! detects bash-specific input, translates it to fish source where a
//! faithful translation exists, and otherwise runs it under a real bash
//! subprocess while reflecting the environment delta back to fish.

pub mod ast;
pub mod daemon;
pub mod detect;
pub mod emit;
pub mod env_diff;
pub mod parser;
pub mod passthrough;
pub mod state;

pub use ast::types::*;
pub use detect::looks_like_bash;
pub use emit::{translate, EmitError, TranslateError};
pub use parser::{parse, LexError, ParseError, Parser};
