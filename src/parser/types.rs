//! Parser types and limits.
//!
//! Shared error types and guard constants used across the lexer and
//! parser modules.

use thiserror::Error;

/// Maximum input size accepted by the parser. Interactive command lines
/// are tiny; anything near this limit goes to passthrough instead.
pub const MAX_INPUT_SIZE: usize = 1_000_000;
/// Maximum nesting depth for compound commands and substitutions.
pub const MAX_PARSE_DEPTH: u32 = 100;

/// What went wrong while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("unterminated brace or substitution")]
    UnterminatedBrace,
    #[error("unterminated here-document")]
    UnterminatedHereDoc,
    #[error("invalid escape")]
    BadEscape,
    #[error("invalid arithmetic")]
    BadArith,
}

/// A lexical error with the byte offset where it occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lex error at byte {offset}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub offset: usize,
}

impl LexError {
    pub fn new(kind: LexErrorKind, offset: usize) -> Self {
        LexError { kind, offset }
    }
}

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token that does not fit the grammar at this position.
    Unexpected,
    /// A compound command was not closed (`fi`, `done`, `esac`, `)`, `}`).
    MissingTerminator,
    /// Valid bash that this parser does not model.
    Unsupported,
}

/// A parse error with the byte offset of the offending token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parse error at byte {offset}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
    pub message: &'static str,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize, message: &'static str) -> Self {
        ParseError { kind, offset, message }
    }

    pub fn unexpected(offset: usize, message: &'static str) -> Self {
        Self::new(ParseErrorKind::Unexpected, offset, message)
    }

    pub fn missing(offset: usize, message: &'static str) -> Self {
        Self::new(ParseErrorKind::MissingTerminator, offset, message)
    }

    pub fn unsupported(offset: usize, message: &'static str) -> Self {
        Self::new(ParseErrorKind::Unsupported, offset, message)
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        let message = match e.kind {
            LexErrorKind::UnterminatedQuote => "unterminated quote",
            LexErrorKind::UnterminatedBrace => "unterminated brace or substitution",
            LexErrorKind::UnterminatedHereDoc => "unterminated here-document",
            LexErrorKind::BadEscape => "invalid escape",
            LexErrorKind::BadArith => "invalid arithmetic",
        };
        ParseError::new(ParseErrorKind::Unexpected, e.offset, message)
    }
}
