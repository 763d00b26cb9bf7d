//! Word decomposition.
//!
//! The lexer captures each shell word as a single raw slice; this module
//! recovers the fragment structure: quoting layers, parameter
//! expansions, command and arithmetic substitutions, process
//! substitutions, tildes, and brace expressions. All fragments borrow
//! from the word text, which itself borrows from the input.

use crate::ast::types::*;
use crate::parser::parser::Parser;
use crate::parser::types::{ParseError, ParseErrorKind};

/// Parse a raw word slice into a [`Word`]. `base` is the byte offset of
/// `text` within the original input, used for error positions.
pub(crate) fn parse_word<'a>(text: &'a str, base: usize) -> Result<Word<'a>, ParseError> {
    let mut cur = Cursor::new(text, base);
    let mut fragments = Vec::new();
    while !cur.is_eof() {
        let at_word_start = fragments.is_empty() && cur.pos == 0;
        fragments.push(cur.fragment(at_word_start)?);
    }
    Ok(Word::new(fragments))
}

/// Parse an unquoted here-doc body: only `$`, backticks, and a narrow
/// escape set are special.
pub(crate) fn parse_heredoc_fragments<'a>(
    text: &'a str,
    base: usize,
) -> Result<Vec<Fragment<'a>>, ParseError> {
    let mut cur = Cursor::new(text, base);
    let mut fragments = Vec::new();
    let mut run_start = cur.pos;
    while !cur.is_eof() {
        match cur.peek() {
            b'$' => {
                cur.flush_run(run_start, &mut fragments);
                fragments.push(cur.dollar()?);
                run_start = cur.pos;
            }
            b'`' => {
                cur.flush_run(run_start, &mut fragments);
                fragments.push(cur.backtick()?);
                run_start = cur.pos;
            }
            b'\\' => {
                let next = cur.peek_at(1);
                if matches!(next, b'$' | b'`' | b'\\') {
                    cur.flush_run(run_start, &mut fragments);
                    cur.bump();
                    let esc_start = cur.pos;
                    cur.bump();
                    fragments.push(Fragment::Escaped(cur.slice(esc_start)));
                    run_start = cur.pos;
                } else if next == b'\n' {
                    cur.flush_run(run_start, &mut fragments);
                    cur.bump();
                    cur.bump();
                    run_start = cur.pos;
                } else {
                    cur.bump();
                }
            }
            _ => cur.bump(),
        }
    }
    cur.flush_run(run_start, &mut fragments);
    Ok(fragments)
}

/// Byte cursor over one word's text.
struct Cursor<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, base: usize) -> Self {
        Cursor { src: text.as_bytes(), text, pos: 0, base }
    }

    #[inline]
    fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

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
    fn bump(&mut self) {
        if self.pos < self.src.len() {
            self.pos += 1;
        }
    }

    #[inline]
    fn slice(&self, start: usize) -> &'a str {
        &self.text[start..self.pos]
    }

    fn err(&self, kind: ParseErrorKind, message: &'static str) -> ParseError {
        ParseError::new(kind, self.base + self.pos, message)
    }

    fn flush_run(&self, start: usize, fragments: &mut Vec<Fragment<'a>>) {
        if self.pos > start {
            fragments.push(Fragment::Literal(self.slice(start)));
        }
    }

    /// Advance past one full character (multi-byte safe).
    fn bump_char(&mut self) {
        if let Some(c) = self.text[self.pos..].chars().next() {
            self.pos += c.len_utf8();
        }
    }

    // -------------------------------------------------------------------
    // Fragments
    // -------------------------------------------------------------------

    fn fragment(&mut self, at_word_start: bool) -> Result<Fragment<'a>, ParseError> {
        match self.peek() {
            b'\'' => {
                self.bump();
                let start = self.pos;
                while !self.is_eof() && self.peek() != b'\'' {
                    self.bump();
                }
                let content = self.slice(start);
                if !self.is_eof() {
                    self.bump();
                }
                Ok(Fragment::SingleQuoted(content))
            }
            b'"' => {
                self.bump();
                let parts = self.dquoted()?;
                Ok(Fragment::DoubleQuoted(parts))
            }
            b'\\' => {
                self.bump();
                if self.is_eof() {
                    return Ok(Fragment::Literal(""));
                }
                let start = self.pos;
                self.bump_char();
                Ok(Fragment::Escaped(self.slice(start)))
            }
            b'$' => self.dollar(),
            b'`' => self.backtick(),
            b'<' | b'>' if self.peek_at(1) == b'(' => self.proc_subst(),
            b'~' if at_word_start => Ok(self.tilde()),
            b'{' => {
                if let Some(frag) = self.try_brace_expansion() {
                    Ok(frag)
                } else {
                    let start = self.pos;
                    self.bump();
                    Ok(Fragment::Literal(self.slice(start)))
                }
            }
            _ => {
                let start = self.pos;
                while !self.is_eof() {
                    let b = self.peek();
                    if matches!(b, b'\'' | b'"' | b'\\' | b'$' | b'`' | b'{') {
                        break;
                    }
                    if matches!(b, b'<' | b'>') && self.peek_at(1) == b'(' {
                        break;
                    }
                    self.bump();
                }
                if self.pos == start {
                    // A special byte we chose not to handle: keep it literal.
                    self.bump();
                }
                Ok(Fragment::Literal(self.slice(start)))
            }
        }
    }

    /// Fragments inside double quotes, up to the closing `"`.
    fn dquoted(&mut self) -> Result<Vec<Fragment<'a>>, ParseError> {
        let mut parts = Vec::new();
        let mut run_start = self.pos;
        loop {
            if self.is_eof() {
                return Err(self.err(ParseErrorKind::Unexpected, "unterminated double quote"));
            }
            match self.peek() {
                b'"' => {
                    self.flush_run(run_start, &mut parts);
                    self.bump();
                    return Ok(parts);
                }
                b'$' => {
                    self.flush_run(run_start, &mut parts);
                    parts.push(self.dollar()?);
                    run_start = self.pos;
                }
                b'`' => {
                    self.flush_run(run_start, &mut parts);
                    parts.push(self.backtick()?);
                    run_start = self.pos;
                }
                b'\\' => {
                    let next = self.peek_at(1);
                    if matches!(next, b'$' | b'`' | b'"' | b'\\') {
                        self.flush_run(run_start, &mut parts);
                        self.bump();
                        let esc_start = self.pos;
                        self.bump();
                        parts.push(Fragment::Escaped(self.slice(esc_start)));
                        run_start = self.pos;
                    } else if next == b'\n' {
                        self.flush_run(run_start, &mut parts);
                        self.bump();
                        self.bump();
                        run_start = self.pos;
                    } else {
                        // Backslash stays literal before other characters.
                        self.bump();
                    }
                }
                _ => self.bump(),
            }
        }
    }

    /// `$...`: parameter, substitution, arithmetic, or ANSI-C quoting.
    fn dollar(&mut self) -> Result<Fragment<'a>, ParseError> {
        self.bump(); // $
        match self.peek() {
            b'{' => {
                self.bump();
                self.braced_expansion()
            }
            b'(' if self.peek_at(1) == b'(' => self.arith_subst(),
            b'(' => {
                self.bump();
                let inner = self.balanced_parens()?;
                let commands = Parser::new(inner)?.parse()?.commands;
                Ok(Fragment::CommandSubst(commands))
            }
            b'\'' => {
                self.bump();
                let start = self.pos;
                loop {
                    if self.is_eof() {
                        return Err(self.err(ParseErrorKind::Unexpected, "unterminated ANSI-C quote"));
                    }
                    match self.peek() {
                        b'\\' => {
                            self.bump();
                            self.bump();
                        }
                        b'\'' => {
                            let content = self.slice(start);
                            self.bump();
                            return Ok(Fragment::AnsiQuoted(content));
                        }
                        _ => self.bump(),
                    }
                }
            }
            b'@' => {
                self.bump();
                Ok(Fragment::VarSimple(Param::At))
            }
            b'*' => {
                self.bump();
                Ok(Fragment::VarSimple(Param::Star))
            }
            b'#' => {
                self.bump();
                Ok(Fragment::VarSimple(Param::Pound))
            }
            b'?' => {
                self.bump();
                Ok(Fragment::VarSimple(Param::Status))
            }
            b'$' => {
                self.bump();
                Ok(Fragment::VarSimple(Param::Pid))
            }
            b'!' => {
                self.bump();
                Ok(Fragment::VarSimple(Param::Bang))
            }
            b'-' => {
                self.bump();
                Ok(Fragment::VarSimple(Param::Dash))
            }
            b'0'..=b'9' => {
                // Bare $N is a single digit; use ${N} for more.
                let start = self.pos;
                self.bump();
                let n: u32 = self.slice(start).parse().unwrap_or(0);
                Ok(Fragment::VarSimple(Param::Positional(n)))
            }
            _ => {
                let name = self.read_name();
                if name.is_empty() {
                    Ok(Fragment::Literal("$"))
                } else {
                    Ok(Fragment::VarSimple(Param::Var(name)))
                }
            }
        }
    }

    /// `$((expr))`. Falls back to command substitution when the content
    /// turns out not to be balanced arithmetic (`$( (subshell) ...)`).
    fn arith_subst(&mut self) -> Result<Fragment<'a>, ParseError> {
        let save = self.pos;
        self.bump();
        self.bump(); // ((
        let inner_start = self.pos;
        let mut depth: u32 = 0;
        loop {
            if self.is_eof() {
                return Err(self.err(ParseErrorKind::Unexpected, "unterminated arithmetic"));
            }
            match self.peek() {
                b'(' => {
                    depth += 1;
                    self.bump();
                }
                b')' => {
                    if depth > 0 {
                        depth -= 1;
                        self.bump();
                    } else if self.peek_at(1) == b')' {
                        break;
                    } else {
                        // `$( (cmd) ...)` — a command substitution whose
                        // first character is a subshell.
                        self.pos = save;
                        self.bump(); // (
                        let inner = self.balanced_parens()?;
                        let commands = Parser::new(inner)?.parse()?.commands;
                        return Ok(Fragment::CommandSubst(commands));
                    }
                }
                b'\'' | b'"' => {
                    let quote = self.peek();
                    self.bump();
                    while !self.is_eof() && self.peek() != quote {
                        self.bump();
                    }
                    self.bump();
                }
                _ => self.bump(),
            }
        }
        let inner = self.slice(inner_start);
        self.bump();
        self.bump(); // ))
        if inner.trim().is_empty() {
            return Ok(Fragment::ArithSubst(None));
        }
        let expr = super::arithmetic_parser::parse_arithmetic(inner, self.base + inner_start)?;
        Ok(Fragment::ArithSubst(Some(expr)))
    }

    /// Cursor just past `$(` or `<(`; returns the inner text and consumes
    /// through the matching `)`.
    fn balanced_parens(&mut self) -> Result<&'a str, ParseError> {
        let start = self.pos;
        let mut depth: u32 = 1;
        while !self.is_eof() {
            match self.peek() {
                b'(' => {
                    depth += 1;
                    self.bump();
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = self.slice(start);
                        self.bump();
                        return Ok(inner);
                    }
                    self.bump();
                }
                b'\'' => {
                    self.bump();
                    while !self.is_eof() && self.peek() != b'\'' {
                        self.bump();
                    }
                    self.bump();
                }
                b'"' => {
                    self.bump();
                    while !self.is_eof() && self.peek() != b'"' {
                        if self.peek() == b'\\' {
                            self.bump();
                        }
                        self.bump();
                    }
                    self.bump();
                }
                b'\\' => {
                    self.bump();
                    self.bump();
                }
                _ => self.bump(),
            }
        }
        Err(self.err(ParseErrorKind::Unexpected, "unterminated substitution"))
    }

    fn backtick(&mut self) -> Result<Fragment<'a>, ParseError> {
        self.bump(); // `
        let start = self.pos;
        while !self.is_eof() && self.peek() != b'`' {
            if self.peek() == b'\\' {
                self.bump();
            }
            self.bump();
        }
        if self.is_eof() {
            return Err(self.err(ParseErrorKind::Unexpected, "unterminated backtick"));
        }
        let content = self.slice(start);
        self.bump();
        Ok(Fragment::Backtick(content))
    }

    fn proc_subst(&mut self) -> Result<Fragment<'a>, ParseError> {
        let direction = if self.peek() == b'<' {
            ProcDirection::In
        } else {
            ProcDirection::Out
        };
        self.bump();
        self.bump(); // (
        let inner = self.balanced_parens()?;
        let commands = Parser::new(inner)?.parse()?.commands;
        Ok(Fragment::ProcSubst(direction, commands))
    }

    fn tilde(&mut self) -> Fragment<'a> {
        self.bump(); // ~
        let start = self.pos;
        while !self.is_eof() {
            let b = self.peek();
            if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.') {
                self.bump();
            } else {
                break;
            }
        }
        let user = self.slice(start);
        if user.is_empty() {
            Fragment::Tilde(None)
        } else {
            Fragment::Tilde(Some(user))
        }
    }

    /// `{...}` containing a top-level `,` or `..`: a brace expression.
    /// Returns the raw slice including the braces.
    fn try_brace_expansion(&mut self) -> Option<Fragment<'a>> {
        let start = self.pos;
        let mut j = self.pos + 1;
        let mut depth = 1;
        let mut has_sep = false;
        while j < self.src.len() {
            match self.src[j] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                b',' if depth == 1 => has_sep = true,
                b'.' if depth == 1 && j + 1 < self.src.len() && self.src[j + 1] == b'.' => {
                    has_sep = true;
                }
                b'\'' | b'"' | b' ' | b'\t' | b'\n' => return None,
                _ => {}
            }
            j += 1;
        }
        if depth != 0 || !has_sep || j == self.pos + 1 {
            return None;
        }
        self.pos = j + 1;
        Some(Fragment::BraceExpansion(&self.text[start..self.pos]))
    }

    fn read_name(&mut self) -> &'a str {
        let start = self.pos;
        if !self.is_eof() && (self.peek().is_ascii_alphabetic() || self.peek() == b'_') {
            self.bump();
            while !self.is_eof() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
                self.bump();
            }
        }
        self.slice(start)
    }

    // -------------------------------------------------------------------
    // ${...} expansion grammar
    // -------------------------------------------------------------------

    /// Cursor just past `${`.
    fn braced_expansion(&mut self) -> Result<Fragment<'a>, ParseError> {
        // ${!var}, ${!prefix*}, ${!prefix@}
        if self.peek() == b'!' {
            self.bump();
            let name = self.read_name();
            if name.is_empty() {
                return Err(self.err(ParseErrorKind::Unexpected, "expected name after ${!"));
            }
            if matches!(self.peek(), b'*' | b'@') {
                self.bump();
                self.expect_close()?;
                return Ok(braced(Param::Var(name), ParamOp::NamesWithPrefix));
            }
            if self.peek() == b'[' {
                return Err(self.err(ParseErrorKind::Unsupported, "indirect array expansion"));
            }
            self.expect_close()?;
            return Ok(braced(Param::Var(name), ParamOp::Indirect));
        }

        // ${#var}, ${#arr[@]}; bare ${#} is $#.
        if self.peek() == b'#' && self.peek_at(1) != b'}' {
            self.bump();
            let param = self.read_param()?;
            if let Param::Var(name) = param {
                if self.peek() == b'[' {
                    self.bump();
                    if matches!(self.peek(), b'@' | b'*') && self.peek_at(1) == b']' {
                        self.bump();
                        self.bump();
                        self.expect_close()?;
                        return Ok(braced(Param::Var(name), ParamOp::ArrayLength));
                    }
                    return Err(self.err(ParseErrorKind::Unsupported, "length of array element"));
                }
            }
            self.expect_close()?;
            return Ok(braced(param, ParamOp::Length));
        }

        let param = self.read_param()?;

        // Array subscripts
        if let Param::Var(name) = param {
            if self.peek() == b'[' {
                return self.array_op(name);
            }
        }

        if self.peek() == b'}' {
            self.bump();
            return Ok(braced(param, ParamOp::Plain));
        }

        let op = self.param_op(param)?;
        Ok(braced(param, op))
    }

    fn param_op(&mut self, param: Param<'a>) -> Result<ParamOp<'a>, ParseError> {
        let _ = param;
        if self.peek() == b':' {
            self.bump();
            match self.peek() {
                b'-' | b'=' | b'?' | b'+' => {
                    let op = self.peek();
                    self.bump();
                    let word = self.brace_word(0)?;
                    self.expect_close()?;
                    return Ok(match op {
                        b'-' => ParamOp::Default(word, true),
                        b'=' => ParamOp::AssignDefault(word, true),
                        b'?' => ParamOp::ErrorIfUnset(word, true),
                        _ => ParamOp::AlternateValue(word, true),
                    });
                }
                _ => {
                    // Substring: ${var:offset[:length]}
                    let off_start = self.pos;
                    self.scan_substring_expr();
                    let offset = self.slice(off_start);
                    let length = if self.peek() == b':' {
                        self.bump();
                        let len_start = self.pos;
                        self.scan_substring_expr();
                        Some(self.slice(len_start))
                    } else {
                        None
                    };
                    self.expect_close()?;
                    if offset.trim().is_empty() {
                        return Err(self.err(ParseErrorKind::Unexpected, "empty substring offset"));
                    }
                    return Ok(ParamOp::Substring(offset, length));
                }
            }
        }

        match self.peek() {
            b'-' | b'=' | b'?' | b'+' => {
                let op = self.peek();
                self.bump();
                let word = self.brace_word(0)?;
                self.expect_close()?;
                Ok(match op {
                    b'-' => ParamOp::Default(word, false),
                    b'=' => ParamOp::AssignDefault(word, false),
                    b'?' => ParamOp::ErrorIfUnset(word, false),
                    _ => ParamOp::AlternateValue(word, false),
                })
            }
            b'%' => {
                self.bump();
                let long = self.peek() == b'%';
                if long {
                    self.bump();
                }
                let word = self.brace_word(0)?;
                self.expect_close()?;
                Ok(if long {
                    ParamOp::StripSuffixLong(word)
                } else {
                    ParamOp::StripSuffixShort(word)
                })
            }
            b'#' => {
                self.bump();
                let long = self.peek() == b'#';
                if long {
                    self.bump();
                }
                let word = self.brace_word(0)?;
                self.expect_close()?;
                Ok(if long {
                    ParamOp::StripPrefixLong(word)
                } else {
                    ParamOp::StripPrefixShort(word)
                })
            }
            b'^' => {
                self.bump();
                let all = self.peek() == b'^';
                if all {
                    self.bump();
                }
                if self.peek() != b'}' {
                    return Err(self.err(
                        ParseErrorKind::Unsupported,
                        "patterned case modification",
                    ));
                }
                self.bump();
                Ok(if all { ParamOp::UpperAll } else { ParamOp::UpperFirst })
            }
            b',' => {
                self.bump();
                let all = self.peek() == b',';
                if all {
                    self.bump();
                }
                if self.peek() != b'}' {
                    return Err(self.err(
                        ParseErrorKind::Unsupported,
                        "patterned case modification",
                    ));
                }
                self.bump();
                Ok(if all { ParamOp::LowerAll } else { ParamOp::LowerFirst })
            }
            b'/' => {
                self.bump();
                let (all, prefix, suffix) = match self.peek() {
                    b'/' => {
                        self.bump();
                        (true, false, false)
                    }
                    b'#' => {
                        self.bump();
                        (false, true, false)
                    }
                    b'%' => {
                        self.bump();
                        (false, false, true)
                    }
                    _ => (false, false, false),
                };
                let pattern = self.brace_word(b'/')?;
                let replacement = if self.peek() == b'/' {
                    self.bump();
                    self.brace_word(0)?
                } else {
                    None
                };
                self.expect_close()?;
                Ok(if prefix {
                    ParamOp::SubstitutePrefix(pattern, replacement)
                } else if suffix {
                    ParamOp::SubstituteSuffix(pattern, replacement)
                } else if all {
                    ParamOp::SubstituteAll(pattern, replacement)
                } else {
                    ParamOp::SubstituteFirst(pattern, replacement)
                })
            }
            b'@' => {
                self.bump();
                let op = self.peek();
                self.bump();
                self.expect_close()?;
                match op {
                    b'Q' => Ok(ParamOp::QuotedExpansion),
                    b'U' => Ok(ParamOp::UpperAll),
                    b'u' => Ok(ParamOp::UpperFirst),
                    b'L' => Ok(ParamOp::LowerAll),
                    _ => Err(self.err(ParseErrorKind::Unsupported, "parameter transformation")),
                }
            }
            _ => Err(self.err(ParseErrorKind::Unsupported, "parameter expansion operator")),
        }
    }

    /// `${name[` — array element, all-elements, or slice.
    fn array_op(&mut self, name: &'a str) -> Result<Fragment<'a>, ParseError> {
        self.bump(); // [
        if matches!(self.peek(), b'@' | b'*') && self.peek_at(1) == b']' {
            self.bump();
            self.bump();
            if self.peek() == b':' {
                self.bump();
                let off_start = self.pos;
                self.scan_substring_expr();
                let offset = self.slice(off_start);
                let length = if self.peek() == b':' {
                    self.bump();
                    let len_start = self.pos;
                    self.scan_substring_expr();
                    Some(self.slice(len_start))
                } else {
                    None
                };
                self.expect_close()?;
                return Ok(braced(Param::Var(name), ParamOp::ArraySlice(offset, length)));
            }
            self.expect_close()?;
            return Ok(braced(Param::Var(name), ParamOp::ArrayAll));
        }

        // Index expression, parsed as a word so `$var` and `$((...))` work.
        let mut parts = Vec::new();
        let mut run_start = self.pos;
        loop {
            if self.is_eof() {
                return Err(self.err(ParseErrorKind::Unexpected, "unterminated array index"));
            }
            match self.peek() {
                b']' => {
                    self.flush_run(run_start, &mut parts);
                    self.bump();
                    break;
                }
                b'$' => {
                    self.flush_run(run_start, &mut parts);
                    parts.push(self.dollar()?);
                    run_start = self.pos;
                }
                _ => self.bump(),
            }
        }
        self.expect_close()?;
        if parts.is_empty() {
            return Err(self.err(ParseErrorKind::Unexpected, "empty array index"));
        }
        Ok(braced(Param::Var(name), ParamOp::ArrayElement(Word::new(parts))))
    }

    fn read_param(&mut self) -> Result<Param<'a>, ParseError> {
        match self.peek() {
            b'@' => {
                self.bump();
                Ok(Param::At)
            }
            b'*' => {
                self.bump();
                Ok(Param::Star)
            }
            b'#' => {
                self.bump();
                Ok(Param::Pound)
            }
            b'?' => {
                self.bump();
                Ok(Param::Status)
            }
            b'$' => {
                self.bump();
                Ok(Param::Pid)
            }
            b'!' => {
                self.bump();
                Ok(Param::Bang)
            }
            b'-' => {
                self.bump();
                Ok(Param::Dash)
            }
            b'0'..=b'9' => {
                let start = self.pos;
                while self.peek().is_ascii_digit() {
                    self.bump();
                }
                let n: u32 = self.slice(start).parse().unwrap_or(0);
                Ok(Param::Positional(n))
            }
            _ => {
                let name = self.read_name();
                if name.is_empty() {
                    Err(self.err(ParseErrorKind::Unexpected, "expected parameter name"))
                } else {
                    Ok(Param::Var(name))
                }
            }
        }
    }

    /// A word inside `${...}`, stopping at an unquoted `}` (and at
    /// `extra_stop` when nonzero). Returns `None` for an empty word.
    fn brace_word(&mut self, extra_stop: u8) -> Result<Option<Word<'a>>, ParseError> {
        let mut parts = Vec::new();
        let mut run_start = self.pos;
        loop {
            if self.is_eof() {
                return Err(self.err(ParseErrorKind::Unexpected, "unterminated ${"));
            }
            let b = self.peek();
            if b == b'}' || (extra_stop != 0 && b == extra_stop) {
                self.flush_run(run_start, &mut parts);
                break;
            }
            match b {
                b'\'' => {
                    self.flush_run(run_start, &mut parts);
                    self.bump();
                    let start = self.pos;
                    while !self.is_eof() && self.peek() != b'\'' {
                        self.bump();
                    }
                    let content = self.slice(start);
                    if self.is_eof() {
                        return Err(self.err(ParseErrorKind::Unexpected, "unterminated quote"));
                    }
                    self.bump();
                    parts.push(Fragment::SingleQuoted(content));
                    run_start = self.pos;
                }
                b'"' => {
                    self.flush_run(run_start, &mut parts);
                    self.bump();
                    parts.push(Fragment::DoubleQuoted(self.dquoted()?));
                    run_start = self.pos;
                }
                b'$' => {
                    self.flush_run(run_start, &mut parts);
                    parts.push(self.dollar()?);
                    run_start = self.pos;
                }
                b'\\' => {
                    self.flush_run(run_start, &mut parts);
                    self.bump();
                    if self.is_eof() {
                        break;
                    }
                    let start = self.pos;
                    self.bump_char();
                    parts.push(Fragment::Escaped(self.slice(start)));
                    run_start = self.pos;
                }
                _ => self.bump(),
            }
        }
        if parts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Word::new(parts)))
        }
    }

    /// Scan a raw substring offset/length expression: stops at a top-level
    /// `:` or `}`, tracking nesting and skipping quoted spans.
    fn scan_substring_expr(&mut self) {
        let mut depth: i32 = 0;
        while !self.is_eof() {
            let b = self.peek();
            if depth == 0 && (b == b':' || b == b'}') {
                break;
            }
            match b {
                b'\'' => {
                    self.bump();
                    while !self.is_eof() && self.peek() != b'\'' {
                        self.bump();
                    }
                    self.bump();
                }
                b'"' => {
                    self.bump();
                    while !self.is_eof() && self.peek() != b'"' {
                        if self.peek() == b'\\' {
                            self.bump();
                        }
                        self.bump();
                    }
                    self.bump();
                }
                b'(' | b'{' => {
                    depth += 1;
                    self.bump();
                }
                b')' | b'}' => {
                    depth -= 1;
                    self.bump();
                }
                _ => self.bump(),
            }
        }
    }

    fn expect_close(&mut self) -> Result<(), ParseError> {
        if self.peek() == b'}' {
            self.bump();
            Ok(())
        } else {
            Err(self.err(ParseErrorKind::Unexpected, "expected '}'"))
        }
    }
}

fn braced<'a>(param: Param<'a>, op: ParamOp<'a>) -> Fragment<'a> {
    Fragment::VarBraced(Box::new(ParamExpansion { param, op }))
}
