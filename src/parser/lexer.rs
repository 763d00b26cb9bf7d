//! Lexer for bash input.
//!
//! Produces a token stream over the input string. Zero-copy: every token
//! holds a borrowed slice of the input plus its byte offset. Words that
//! contain quotes or substitutions are captured whole with a
//! nesting-aware scan; the word parser recovers their fragment structure.
//!
//! Context tracked here:
//! - command position (assignments and reserved words are only recognized
//!   there; it resets after `;`, `&`, `&&`, `||`, `|`, newline, `(`, `{`,
//!   and reserved words like `then` / `do` / `else`)
//! - `[[ ... ]]` conditional mode, where `(`, `)`, `|`, `<`, `>` are word
//!   constituents rather than operators
//! - pending here-documents, whose bodies are collected after the newline
//!   that ends the command line

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::parser::types::{LexError, LexErrorKind};

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Newline,

    // Separators
    Semi,    // ;
    Amp,     // &
    Pipe,    // |
    PipeAmp, // |&
    AndAnd,  // &&
    OrOr,    // ||
    Bang,    // !

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    TLess,     // <<<
    DLessDash, // <<-
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    Clobber,   // >|
    AndGreat,  // &>
    AndDGreat, // &>>

    // Grouping
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }

    // Case terminators
    DSemi,    // ;;
    SemiAnd,  // ;&
    DSemiAnd, // ;;&

    // Compound delimiters
    DBrackStart, // [[
    DBrackEnd,   // ]]
    DParenStart, // ((
    DParenEnd,   // ))

    /// Reserved word at command position (`if`, `then`, `for`, ...).
    Keyword,
    /// A shell word, captured whole including quotes and substitutions.
    Word,
    /// Digits immediately preceding a redirection operator (`2>&1`).
    Number,
    /// `NAME=`, `NAME+=`, or `NAME[idx]=` at command position.
    Assignment,
    /// A here-document body (raw, tabs not yet stripped).
    HereDocBody,
}

/// A token: kind, borrowed text, byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a str, offset: usize) -> Self {
        Token { kind, text, offset }
    }

    /// Byte offset one past the end of this token's text.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

lazy_static! {
    /// Reserved words, recognized only at command position.
    static ref RESERVED_WORDS: HashMap<&'static str, ()> = {
        let mut m = HashMap::new();
        for w in [
            "if", "then", "elif", "else", "fi", "for", "while", "until",
            "do", "done", "case", "esac", "function", "time", "select",
            "coproc",
        ] {
            m.insert(w, ());
        }
        m
    };
}

/// Bytes that end an unquoted word.
#[inline]
pub(crate) const fn is_meta(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'\t' | b'\n' | b';' | b'&' | b'|' | b'(' | b')' | b'<' | b'>' | b'\0'
    )
}

#[inline]
const fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t')
}

#[inline]
const fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

#[inline]
const fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// A here-doc registered at `<<` whose body has not been collected yet.
struct PendingHeredoc<'a> {
    delimiter: &'a str,
    strip_tabs: bool,
}

/// The lexer. Call [`Lexer::tokenize`] to produce the full token stream.
pub struct Lexer<'a> {
    src: &'a [u8],
    input: &'a str,
    pos: usize,
    tokens: Vec<Token<'a>>,
    /// Command position: assignments and reserved words live here.
    cmd_pos: bool,
    /// Reserved words allowed (false after an assignment prefix).
    keywords_ok: bool,
    /// Depth of `[[ ... ]]` conditional mode.
    cond_mode: bool,
    /// State saved across a redirection target word.
    redirect_restore: Option<(bool, bool)>,
    /// The next word token is a here-doc delimiter for `<<` (`true` = `<<-`).
    awaiting_delimiter: Option<bool>,
    pending_heredocs: Vec<PendingHeredoc<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            src: input.as_bytes(),
            input,
            pos: 0,
            tokens: Vec::new(),
            cmd_pos: true,
            keywords_ok: true,
            cond_mode: false,
            redirect_restore: None,
            awaiting_delimiter: None,
            pending_heredocs: Vec::new(),
        }
    }

    /// Tokenize the entire input.
    pub fn tokenize(mut self) -> Result<Vec<Token<'a>>, LexError> {
        while self.pos < self.src.len() {
            self.skip_blanks();
            if self.pos >= self.src.len() {
                break;
            }
            if self.at_comment() {
                self.skip_comment();
                continue;
            }
            self.next_token()?;
        }
        if !self.pending_heredocs.is_empty() {
            // A here-doc was opened but the input ended before its body.
            return Err(self.err(LexErrorKind::UnterminatedHereDoc));
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", self.pos));
        Ok(self.tokens)
    }

    // -------------------------------------------------------------------
    // Cursor primitives
    // -------------------------------------------------------------------

    #[inline]
    fn peek(&self) -> u8 {
        if self.pos < self.src.len() { self.src[self.pos] } else { 0 }
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> u8 {
        let i = self.pos + offset;
        if i < self.src.len() { self.src[i] } else { 0 }
    }

    #[inline]
    fn slice(&self, start: usize) -> &'a str {
        &self.input[start..self.pos]
    }

    #[inline]
    fn err(&self, kind: LexErrorKind) -> LexError {
        LexError::new(kind, self.pos)
    }

    fn skip_blanks(&mut self) {
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b' ' | b'\t' => self.pos += 1,
                // Line continuation
                b'\\' if self.peek_at(1) == b'\n' => self.pos += 2,
                _ => break,
            }
        }
    }

    fn at_comment(&self) -> bool {
        self.peek() == b'#'
            && (self.pos == 0 || is_meta(self.src[self.pos - 1]) || is_blank(self.src[self.pos - 1]))
    }

    fn skip_comment(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
            self.pos += 1;
        }
    }

    // -------------------------------------------------------------------
    // Token production
    // -------------------------------------------------------------------

    fn push(&mut self, kind: TokenKind, start: usize) {
        let token = Token::new(kind, self.slice(start), start);
        self.tokens.push(token);
        self.update_state(kind);
    }

    /// Adjust command-position state after emitting a token.
    fn update_state(&mut self, kind: TokenKind) {
        use TokenKind::*;
        match kind {
            Newline | Semi | Amp | AndAnd | OrOr | Pipe | PipeAmp | LParen | RParen
            | LBrace | RBrace | DSemi | SemiAnd | DSemiAnd | Bang | Keyword => {
                self.cmd_pos = true;
                self.keywords_ok = true;
            }
            DBrackStart | DBrackEnd | DParenEnd => {
                self.cmd_pos = false;
                self.keywords_ok = false;
            }
            Assignment => {
                self.keywords_ok = false;
            }
            Word => {
                if let Some((cmd, kw)) = self.redirect_restore.take() {
                    self.cmd_pos = cmd;
                    self.keywords_ok = kw;
                } else {
                    self.cmd_pos = false;
                    self.keywords_ok = false;
                }
            }
            Less | Great | DLess | DGreat | TLess | DLessDash | LessAnd | GreatAnd
            | LessGreat | Clobber | AndGreat | AndDGreat => {
                self.redirect_restore = Some((self.cmd_pos, self.keywords_ok));
                self.cmd_pos = false;
                self.keywords_ok = false;
            }
            DParenStart | Number | HereDocBody | Eof => {}
        }
    }

    fn next_token(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let b0 = self.peek();
        let b1 = self.peek_at(1);
        let b2 = self.peek_at(2);

        // Newline: emit, then collect any pending here-doc bodies.
        if b0 == b'\n' {
            self.pos += 1;
            self.push(TokenKind::Newline, start);
            if !self.pending_heredocs.is_empty() {
                self.collect_heredoc_bodies()?;
            }
            return Ok(());
        }

        // Conditional mode: only `]]`, `&&`, `||`, `;` and words.
        if self.cond_mode {
            return self.cond_token(start, b0, b1);
        }

        // Three-byte operators, longest first.
        match (b0, b1, b2) {
            (b'<', b'<', b'<') => {
                self.pos += 3;
                self.push(TokenKind::TLess, start);
                return Ok(());
            }
            (b'<', b'<', b'-') => {
                self.pos += 3;
                self.push(TokenKind::DLessDash, start);
                self.awaiting_delimiter = Some(true);
                return Ok(());
            }
            (b'&', b'>', b'>') => {
                self.pos += 3;
                self.push(TokenKind::AndDGreat, start);
                return Ok(());
            }
            (b';', b';', b'&') => {
                self.pos += 3;
                self.push(TokenKind::DSemiAnd, start);
                return Ok(());
            }
            _ => {}
        }

        // Two-byte operators.
        match (b0, b1) {
            (b'<', b'<') => {
                self.pos += 2;
                self.push(TokenKind::DLess, start);
                self.awaiting_delimiter = Some(false);
                return Ok(());
            }
            (b'&', b'&') => {
                self.pos += 2;
                self.push(TokenKind::AndAnd, start);
                return Ok(());
            }
            (b'|', b'|') => {
                self.pos += 2;
                self.push(TokenKind::OrOr, start);
                return Ok(());
            }
            (b';', b';') => {
                self.pos += 2;
                self.push(TokenKind::DSemi, start);
                return Ok(());
            }
            (b';', b'&') => {
                self.pos += 2;
                self.push(TokenKind::SemiAnd, start);
                return Ok(());
            }
            (b'|', b'&') => {
                self.pos += 2;
                self.push(TokenKind::PipeAmp, start);
                return Ok(());
            }
            (b'>', b'>') => {
                self.pos += 2;
                self.push(TokenKind::DGreat, start);
                return Ok(());
            }
            (b'<', b'&') => {
                self.pos += 2;
                self.push(TokenKind::LessAnd, start);
                return Ok(());
            }
            (b'>', b'&') => {
                self.pos += 2;
                self.push(TokenKind::GreatAnd, start);
                return Ok(());
            }
            (b'<', b'>') => {
                self.pos += 2;
                self.push(TokenKind::LessGreat, start);
                return Ok(());
            }
            (b'>', b'|') => {
                self.pos += 2;
                self.push(TokenKind::Clobber, start);
                return Ok(());
            }
            (b'&', b'>') => {
                self.pos += 2;
                self.push(TokenKind::AndGreat, start);
                return Ok(());
            }
            (b'[', b'[') if self.cmd_pos && self.keywords_ok && boundary_after(self.src, self.pos + 2) => {
                self.pos += 2;
                self.push(TokenKind::DBrackStart, start);
                self.cond_mode = true;
                return Ok(());
            }
            (b'(', b'(') if self.cmd_pos => {
                return self.arith_command(start);
            }
            _ => {}
        }

        // Single-byte operators.
        match b0 {
            b';' => {
                self.pos += 1;
                self.push(TokenKind::Semi, start);
                return Ok(());
            }
            b'&' => {
                self.pos += 1;
                self.push(TokenKind::Amp, start);
                return Ok(());
            }
            b'|' => {
                self.pos += 1;
                self.push(TokenKind::Pipe, start);
                return Ok(());
            }
            b'(' => {
                self.pos += 1;
                self.push(TokenKind::LParen, start);
                return Ok(());
            }
            b')' => {
                self.pos += 1;
                self.push(TokenKind::RParen, start);
                return Ok(());
            }
            b'{' if self.cmd_pos && matches!(b1, b' ' | b'\t' | b'\n') => {
                self.pos += 1;
                self.push(TokenKind::LBrace, start);
                return Ok(());
            }
            b'}' if self.cmd_pos && (b1 == 0 || is_meta(b1)) => {
                self.pos += 1;
                self.push(TokenKind::RBrace, start);
                return Ok(());
            }
            b'!' if self.cmd_pos && (b1 == 0 || matches!(b1, b' ' | b'\t' | b'\n')) => {
                self.pos += 1;
                self.push(TokenKind::Bang, start);
                return Ok(());
            }
            b'<' if b1 == b'(' => {
                // Process substitution: part of a word.
                return self.word_token(start);
            }
            b'>' if b1 == b'(' => {
                return self.word_token(start);
            }
            b'<' => {
                self.pos += 1;
                self.push(TokenKind::Less, start);
                return Ok(());
            }
            b'>' => {
                self.pos += 1;
                self.push(TokenKind::Great, start);
                return Ok(());
            }
            _ => {}
        }

        // Digits immediately before a redirection operator: fd number.
        if b0.is_ascii_digit() {
            let mut j = self.pos;
            while j < self.src.len() && self.src[j].is_ascii_digit() {
                j += 1;
            }
            if j < self.src.len() && matches!(self.src[j], b'<' | b'>') {
                self.pos = j;
                self.push(TokenKind::Number, start);
                return Ok(());
            }
        }

        // Reserved word?
        if self.cmd_pos && self.keywords_ok && is_name_start(b0) {
            let mut j = self.pos;
            while j < self.src.len() && is_name_char(self.src[j]) {
                j += 1;
            }
            let word = &self.input[self.pos..j];
            if RESERVED_WORDS.contains_key(word) && boundary_after(self.src, j) {
                self.pos = j;
                self.push(TokenKind::Keyword, start);
                return Ok(());
            }
        }

        // Assignment?
        if self.cmd_pos && is_name_start(b0) {
            if let Some(eq_end) = self.scan_assignment_lhs() {
                self.pos = eq_end;
                self.push(TokenKind::Assignment, start);
                // The value is glued to the `=`; scan it now so its text
                // is never re-examined for assignments or keywords.
                let b = self.peek();
                if b != 0 && b != b'(' && !is_meta(b) {
                    let value_start = self.pos;
                    self.scan_word(false)?;
                    self.push(TokenKind::Word, value_start);
                    // Further assignments may follow the value.
                    self.cmd_pos = true;
                }
                return Ok(());
            }
        }

        self.word_token(start)
    }

    fn word_token(&mut self, start: usize) -> Result<(), LexError> {
        self.scan_word(false)?;
        if self.pos == start {
            // Cannot happen: every non-meta byte extends a word. Guard
            // against an infinite loop all the same.
            self.pos += 1;
        }
        let delim = self.awaiting_delimiter.take();
        self.push(TokenKind::Word, start);
        if let Some(strip_tabs) = delim {
            let text = self.tokens.last().map(|t| t.text).unwrap_or("");
            let delimiter = unquote_delimiter(text);
            self.pending_heredocs.push(PendingHeredoc { delimiter, strip_tabs });
        }
        Ok(())
    }

    /// One token in `[[ ... ]]` mode.
    fn cond_token(&mut self, start: usize, b0: u8, b1: u8) -> Result<(), LexError> {
        match (b0, b1) {
            (b']', b']') if boundary_after(self.src, self.pos + 2) => {
                self.pos += 2;
                self.cond_mode = false;
                self.push(TokenKind::DBrackEnd, start);
                return Ok(());
            }
            (b'&', b'&') => {
                self.pos += 2;
                self.push(TokenKind::AndAnd, start);
                return Ok(());
            }
            (b'|', b'|') => {
                self.pos += 2;
                self.push(TokenKind::OrOr, start);
                return Ok(());
            }
            (b';', _) => {
                self.pos += 1;
                self.push(TokenKind::Semi, start);
                return Ok(());
            }
            _ => {}
        }
        self.scan_word(true)?;
        if self.pos == start {
            self.pos += 1;
        }
        self.push(TokenKind::Word, start);
        Ok(())
    }

    /// `(( ... ))` at command position: emit the delimiters and the raw
    /// expression text as a single word token.
    fn arith_command(&mut self, start: usize) -> Result<(), LexError> {
        self.pos += 2;
        self.push(TokenKind::DParenStart, start);
        let inner_start = self.pos;
        let inner_end;
        let mut depth: u32 = 0;
        loop {
            match self.peek() {
                0 => return Err(self.err(LexErrorKind::UnterminatedBrace)),
                b'\'' => self.skip_single_quote()?,
                b'"' => self.skip_double_quote()?,
                b'\\' => self.pos += 2.min(self.src.len() - self.pos),
                b'(' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    if depth > 0 {
                        depth -= 1;
                        self.pos += 1;
                    } else if self.peek_at(1) == b')' {
                        inner_end = self.pos;
                        break;
                    } else {
                        // A stray `)` at depth zero: this was not an
                        // arithmetic command after all.
                        return Err(self.err(LexErrorKind::BadArith));
                    }
                }
                _ => self.pos += 1,
            }
        }
        let text = &self.input[inner_start..inner_end];
        self.tokens.push(Token::new(TokenKind::Word, text, inner_start));
        self.pos = inner_end;
        let close_start = self.pos;
        self.pos += 2;
        self.push(TokenKind::DParenEnd, close_start);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Word scanning
    // -------------------------------------------------------------------

    /// Scan a maximal word. In conditional mode the stop set shrinks to
    /// blanks, newlines, `;` and `&` so that regex and comparison
    /// operators stay inside words.
    fn scan_word(&mut self, cond: bool) -> Result<(), LexError> {
        loop {
            let b = self.peek();
            if b == 0 {
                return Ok(());
            }
            let stop = if cond {
                matches!(b, b' ' | b'\t' | b'\n' | b';' | b'&')
            } else {
                is_meta(b) && !(matches!(b, b'<' | b'>') && self.peek_at(1) == b'(')
            };
            if stop {
                return Ok(());
            }
            match b {
                b'\'' => {
                    self.pos += 1;
                    self.skip_until_squote_close()?;
                }
                b'"' => self.skip_double_quote()?,
                b'`' => self.skip_backtick()?,
                b'\\' => {
                    if self.pos + 1 >= self.src.len() {
                        self.pos += 1;
                        return Ok(());
                    }
                    self.pos += 2;
                }
                b'$' => self.skip_dollar()?,
                b'<' | b'>' if self.peek_at(1) == b'(' => {
                    self.pos += 2;
                    self.skip_parens(1)?;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Cursor is on the opening `'`.
    fn skip_single_quote(&mut self) -> Result<(), LexError> {
        self.pos += 1;
        self.skip_until_squote_close()
    }

    /// Cursor is just past an opening `'`.
    fn skip_until_squote_close(&mut self) -> Result<(), LexError> {
        while self.pos < self.src.len() {
            if self.src[self.pos] == b'\'' {
                self.pos += 1;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(self.err(LexErrorKind::UnterminatedQuote))
    }

    /// Cursor is on the opening `"`. Tracks nested substitutions because a
    /// `$(...)` inside double quotes may itself contain a `"`.
    fn skip_double_quote(&mut self) -> Result<(), LexError> {
        self.pos += 1;
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b'"' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'\\' => self.pos += 2.min(self.src.len() - self.pos),
                b'`' => self.skip_backtick()?,
                b'$' => self.skip_dollar()?,
                _ => self.pos += 1,
            }
        }
        Err(self.err(LexErrorKind::UnterminatedQuote))
    }

    /// Cursor is on the backtick.
    fn skip_backtick(&mut self) -> Result<(), LexError> {
        self.pos += 1;
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b'`' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'\\' => self.pos += 2.min(self.src.len() - self.pos),
                _ => self.pos += 1,
            }
        }
        Err(self.err(LexErrorKind::UnterminatedQuote))
    }

    /// Cursor is on `$`. Consumes the `$` and any bracketed construct that
    /// follows; bare names need no help.
    fn skip_dollar(&mut self) -> Result<(), LexError> {
        self.pos += 1;
        match self.peek() {
            b'(' => {
                self.pos += 1;
                self.skip_parens(1)
            }
            b'{' => {
                self.pos += 1;
                self.skip_braces(1)
            }
            b'\'' => {
                // ANSI-C quoting: backslash escapes the quote.
                self.pos += 1;
                while self.pos < self.src.len() {
                    match self.src[self.pos] {
                        b'\'' => {
                            self.pos += 1;
                            return Ok(());
                        }
                        b'\\' => self.pos += 2.min(self.src.len() - self.pos),
                        _ => self.pos += 1,
                    }
                }
                Err(self.err(LexErrorKind::UnterminatedQuote))
            }
            _ => Ok(()),
        }
    }

    /// Balanced paren scan; cursor just past the opening `(`.
    fn skip_parens(&mut self, mut depth: u32) -> Result<(), LexError> {
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b'(' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                b'\'' => self.skip_single_quote()?,
                b'"' => self.skip_double_quote()?,
                b'`' => self.skip_backtick()?,
                b'\\' => self.pos += 2.min(self.src.len() - self.pos),
                _ => self.pos += 1,
            }
        }
        Err(self.err(LexErrorKind::UnterminatedBrace))
    }

    /// Balanced brace scan; cursor just past the opening `{`.
    fn skip_braces(&mut self, mut depth: u32) -> Result<(), LexError> {
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                b'\'' => self.skip_single_quote()?,
                b'"' => self.skip_double_quote()?,
                b'`' => self.skip_backtick()?,
                b'$' => self.skip_dollar()?,
                b'\\' => self.pos += 2.min(self.src.len() - self.pos),
                _ => self.pos += 1,
            }
        }
        Err(self.err(LexErrorKind::UnterminatedBrace))
    }

    // -------------------------------------------------------------------
    // Assignments
    // -------------------------------------------------------------------

    /// If the cursor sits on `NAME=`, `NAME+=`, or `NAME[...]=`, return the
    /// position just past the `=`. Does not consume on failure.
    fn scan_assignment_lhs(&self) -> Option<usize> {
        let mut j = self.pos;
        if j >= self.src.len() || !is_name_start(self.src[j]) {
            return None;
        }
        j += 1;
        while j < self.src.len() && is_name_char(self.src[j]) {
            j += 1;
        }
        // Optional subscript
        if j < self.src.len() && self.src[j] == b'[' {
            let mut depth = 0;
            while j < self.src.len() {
                match self.src[j] {
                    b'[' => depth += 1,
                    b']' => {
                        depth -= 1;
                        if depth == 0 {
                            j += 1;
                            break;
                        }
                    }
                    b'\n' | b' ' | b'\t' => return None,
                    _ => {}
                }
                j += 1;
            }
            if depth != 0 {
                return None;
            }
        }
        if j < self.src.len() && self.src[j] == b'=' {
            return Some(j + 1);
        }
        if j + 1 < self.src.len() && self.src[j] == b'+' && self.src[j + 1] == b'=' {
            return Some(j + 2);
        }
        None
    }

    // -------------------------------------------------------------------
    // Here-documents
    // -------------------------------------------------------------------

    /// Collect the bodies of all pending here-docs, in registration order.
    /// Called right after a newline token was emitted.
    fn collect_heredoc_bodies(&mut self) -> Result<(), LexError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let body_start = self.pos;
            let mut body_end = None;
            while self.pos < self.src.len() {
                let line_start = self.pos;
                while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                    self.pos += 1;
                }
                let line = &self.input[line_start..self.pos];
                let candidate = if heredoc.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line
                };
                if candidate == heredoc.delimiter {
                    body_end = Some(line_start);
                    if self.pos < self.src.len() {
                        self.pos += 1; // consume the newline after the delimiter
                    }
                    break;
                }
                if self.pos < self.src.len() {
                    self.pos += 1;
                }
            }
            let Some(end) = body_end else {
                return Err(LexError::new(LexErrorKind::UnterminatedHereDoc, body_start));
            };
            let body = &self.input[body_start..end];
            self.tokens.push(Token::new(TokenKind::HereDocBody, body, body_start));
        }
        Ok(())
    }
}

/// Strip the quoting layer from a here-doc delimiter word. Returns the
/// bare delimiter used for end-of-body matching.
pub(crate) fn unquote_delimiter(text: &str) -> &str {
    let b = text.as_bytes();
    if b.len() >= 2 {
        let first = b[0];
        let last = b[b.len() - 1];
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return &text[1..text.len() - 1];
        }
    }
    text.strip_prefix('\\').unwrap_or(text)
}

/// Is a here-doc delimiter word quoted (suppressing body expansion)?
pub(crate) fn delimiter_is_quoted(text: &str) -> bool {
    text.starts_with('\'') || text.starts_with('"') || text.starts_with('\\')
}

#[inline]
fn boundary_after(src: &[u8], pos: usize) -> bool {
    pos >= src.len() || is_meta(src[pos])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token<'_>> {
        Lexer::new(input).tokenize().unwrap()
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_command() {
        let tokens = lex("echo hello");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[0].text, "echo");
        assert_eq!(tokens[1].text, "hello");
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn pipeline_tokens() {
        let tokens = lex("cat file | grep foo");
        assert_eq!(tokens[2].kind, TokenKind::Pipe);
    }

    #[test]
    fn operators_longest_first() {
        assert_eq!(
            kinds("a && b || c ;; d"),
            vec![
                TokenKind::Word,
                TokenKind::AndAnd,
                TokenKind::Word,
                TokenKind::OrOr,
                TokenKind::Word,
                TokenKind::DSemi,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn redirect_operators() {
        assert_eq!(
            kinds("cmd &>>log"),
            vec![TokenKind::Word, TokenKind::AndDGreat, TokenKind::Word, TokenKind::Eof]
        );
        assert_eq!(
            kinds("cmd >>out"),
            vec![TokenKind::Word, TokenKind::DGreat, TokenKind::Word, TokenKind::Eof]
        );
    }

    #[test]
    fn fd_number_before_redirect() {
        let tokens = lex("cmd 2>&1");
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].text, "2");
        assert_eq!(tokens[2].kind, TokenKind::GreatAnd);
        assert_eq!(tokens[3].text, "1");
    }

    #[test]
    fn plain_number_is_word() {
        let tokens = lex("echo 300");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "300");
    }

    #[test]
    fn keyword_at_command_position() {
        let tokens = lex("if true; then echo yes; fi");
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[0].text, "if");
        assert_eq!(tokens[3].kind, TokenKind::Keyword);
        assert_eq!(tokens[3].text, "then");
    }

    #[test]
    fn keyword_not_in_argument_position() {
        let tokens = lex("echo if");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "if");
    }

    #[test]
    fn assignment_token() {
        let tokens = lex("FOO=bar");
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[0].text, "FOO=");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "bar");
    }

    #[test]
    fn append_assignment_token() {
        let tokens = lex("FOO+=bar");
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[0].text, "FOO+=");
    }

    #[test]
    fn array_element_assignment() {
        let tokens = lex("arr[0]=x");
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[0].text, "arr[0]=");
        assert_eq!(tokens[1].text, "x");
    }

    #[test]
    fn assignment_value_with_equals() {
        // The glued value must not be re-scanned as a second assignment.
        let tokens = lex("A=B=c");
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[0].text, "A=");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "B=c");
    }

    #[test]
    fn assignment_not_in_argument_position() {
        let tokens = lex("echo FOO=bar");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "FOO=bar");
    }

    #[test]
    fn array_literal_tokens() {
        assert_eq!(
            kinds("a=(1 2)"),
            vec![
                TokenKind::Assignment,
                TokenKind::LParen,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn word_with_quotes_is_one_token() {
        let tokens = lex("echo \"hello world\"'and more'");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].text, "\"hello world\"'and more'");
    }

    #[test]
    fn word_with_command_subst_is_one_token() {
        let tokens = lex("echo $(date | head)");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].text, "$(date | head)");
    }

    #[test]
    fn nested_quotes_in_subst() {
        let tokens = lex("echo \"a$(echo \"b\")c\"");
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn double_bracket_mode() {
        let tokens = lex("[[ -n $x ]]");
        assert_eq!(tokens[0].kind, TokenKind::DBrackStart);
        assert_eq!(tokens[1].text, "-n");
        assert_eq!(tokens[2].text, "$x");
        assert_eq!(tokens[3].kind, TokenKind::DBrackEnd);
    }

    #[test]
    fn double_bracket_regex_parens_stay_in_word() {
        let tokens = lex("[[ $x =~ ^(a|b)$ ]]");
        assert_eq!(tokens[2].text, "=~");
        assert_eq!(tokens[3].text, "^(a|b)$");
        assert_eq!(tokens[4].kind, TokenKind::DBrackEnd);
    }

    #[test]
    fn double_bracket_quoted_close_does_not_terminate() {
        let tokens = lex("[[ $x == \"]]\" ]]");
        assert_eq!(tokens[3].text, "\"]]\"");
        assert_eq!(tokens[4].kind, TokenKind::DBrackEnd);
    }

    #[test]
    fn arith_command_raw_capture() {
        let tokens = lex("(( i + 1 ))");
        assert_eq!(tokens[0].kind, TokenKind::DParenStart);
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, " i + 1 ");
        assert_eq!(tokens[2].kind, TokenKind::DParenEnd);
    }

    #[test]
    fn arith_command_nested_parens() {
        let tokens = lex("(( (1+2)*3 ))");
        assert_eq!(tokens[1].text, " (1+2)*3 ");
    }

    #[test]
    fn brace_group_tokens() {
        let tokens = lex("{ echo a; }");
        assert_eq!(tokens[0].kind, TokenKind::LBrace);
        assert_eq!(tokens[4].kind, TokenKind::RBrace);
    }

    #[test]
    fn brace_expansion_is_word() {
        let tokens = lex("echo {a,b,c}");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "{a,b,c}");
    }

    #[test]
    fn bang_negation() {
        let tokens = lex("! grep -q x f");
        assert_eq!(tokens[0].kind, TokenKind::Bang);
    }

    #[test]
    fn heredoc_body_collected() {
        let tokens = lex("cat <<EOF\nhello\nworld\nEOF");
        let body = tokens.iter().find(|t| t.kind == TokenKind::HereDocBody).unwrap();
        assert_eq!(body.text, "hello\nworld\n");
    }

    #[test]
    fn heredoc_quoted_delimiter() {
        let tokens = lex("cat <<'EOF'\n$HOME\nEOF");
        let body = tokens.iter().find(|t| t.kind == TokenKind::HereDocBody).unwrap();
        assert_eq!(body.text, "$HOME\n");
    }

    #[test]
    fn heredoc_strip_tabs_delimiter() {
        let tokens = lex("cat <<-EOF\n\thello\n\tEOF");
        let body = tokens.iter().find(|t| t.kind == TokenKind::HereDocBody).unwrap();
        assert_eq!(body.text, "\thello\n");
    }

    #[test]
    fn heredoc_delimiter_as_substring_continues() {
        let tokens = lex("cat <<EOF\nnot EOF here\nEOF");
        let body = tokens.iter().find(|t| t.kind == TokenKind::HereDocBody).unwrap();
        assert_eq!(body.text, "not EOF here\n");
    }

    #[test]
    fn heredoc_unterminated() {
        let err = Lexer::new("cat <<EOF\nhello").tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedHereDoc);
    }

    #[test]
    fn unterminated_quote() {
        let err = Lexer::new("echo 'oops").tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedQuote);
    }

    #[test]
    fn unterminated_subst() {
        let err = Lexer::new("echo $(").tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedBrace);
    }

    #[test]
    fn comment_skipped() {
        let tokens = lex("echo hi # a comment\necho bye");
        assert!(tokens.iter().all(|t| !t.text.contains("comment")));
    }

    #[test]
    fn hash_inside_word_is_literal() {
        let tokens = lex("echo foo#bar");
        assert_eq!(tokens[1].text, "foo#bar");
    }

    #[test]
    fn line_continuation() {
        let tokens = lex("echo a \\\n b");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Word, TokenKind::Word, TokenKind::Word, TokenKind::Eof]
        );
    }

    #[test]
    fn process_substitution_word() {
        let tokens = lex("diff <(sort a) <(sort b)");
        assert_eq!(tokens[1].text, "<(sort a)");
        assert_eq!(tokens[2].text, "<(sort b)");
    }

    #[test]
    fn offsets_are_byte_positions() {
        let tokens = lex("echo hi");
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[1].offset, 5);
    }

    #[test]
    fn empty_input() {
        let tokens = lex("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn token_text_is_a_verbatim_slice() {
        // Every token's text is exactly the input bytes at its offset.
        let input = "for i in $(seq 3); do echo \"$i\" >>log; done\ncat <<EOF\nbody\nEOF";
        for token in lex(input) {
            assert_eq!(
                &input[token.offset..token.offset + token.text.len()],
                token.text
            );
        }
    }
}
