//! Recursive-descent parser for bash input.
//!
//! Consumes the token stream and builds the zero-copy AST. Word tokens
//! are decomposed by [`word_parser`]; arithmetic text by
//! [`arithmetic_parser`]; `[[ ]]` items by [`conditional_parser`].
//! Here-doc bodies trail the newline that ends a command line; the
//! matching `<<` redirect claims the next unclaimed body token.
//!
//! [`word_parser`]: crate::parser::word_parser
//! [`arithmetic_parser`]: crate::parser::arithmetic_parser
//! [`conditional_parser`]: crate::parser::conditional_parser

use std::borrow::Cow;

use crate::ast::types::*;
use crate::parser::arithmetic_parser::parse_arithmetic;
use crate::parser::conditional_parser::{parse_conditional, CondItem};
use crate::parser::lexer::{delimiter_is_quoted, unquote_delimiter, Lexer, Token, TokenKind};
use crate::parser::types::{LexError, ParseError, ParseErrorKind, MAX_INPUT_SIZE, MAX_PARSE_DEPTH};
use crate::parser::word_parser;

/// Parse a complete input string.
pub fn parse(input: &str) -> Result<Script<'_>, ParseError> {
    Parser::new(input)?.parse()
}

/// The parser. One instance per input string.
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    /// First token index at which an unclaimed here-doc body may sit.
    heredoc_cursor: usize,
    depth: u32,
}

impl<'a> Parser<'a> {
    /// Tokenize `input` and build a parser over the stream.
    pub fn new(input: &'a str) -> Result<Self, LexError> {
        if input.len() > MAX_INPUT_SIZE {
            return Err(LexError::new(
                crate::parser::types::LexErrorKind::UnterminatedBrace,
                0,
            ));
        }
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Parser { tokens, pos: 0, heredoc_cursor: 0, depth: 0 })
    }

    /// Parse the whole token stream into a [`Script`].
    pub fn parse(mut self) -> Result<Script<'a>, ParseError> {
        let mut commands = Vec::new();
        loop {
            self.skip_separators();
            if self.cur().kind == TokenKind::Eof {
                break;
            }
            let before = self.pos;
            let command = self.command()?;
            if self.pos == before {
                return Err(self.unexpected("unexpected token"));
            }
            // `&` itself separates commands; anything may follow it.
            if matches!(command, Command::Foreground(_)) {
                self.expect_command_boundary()?;
            }
            commands.push(command);
        }
        Ok(Script { commands })
    }

    /// After a foreground command, the cursor must sit on a separator or
    /// list end.
    fn expect_command_boundary(&self) -> Result<(), ParseError> {
        match self.cur().kind {
            TokenKind::Newline | TokenKind::Semi | TokenKind::HereDocBody => Ok(()),
            _ if self.at_list_end() => Ok(()),
            _ => Err(self.unexpected("unexpected token after command")),
        }
    }

    // -------------------------------------------------------------------
    // Token cursor
    // -------------------------------------------------------------------

    #[inline]
    fn cur(&self) -> Token<'a> {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    #[inline]
    fn peek_kind(&self, offset: usize) -> TokenKind {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        self.tokens[i].kind
    }

    #[inline]
    fn advance(&mut self) -> Token<'a> {
        let t = self.cur();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn unexpected(&self, message: &'static str) -> ParseError {
        ParseError::unexpected(self.cur().offset, message)
    }

    /// Skip `;`, newlines, and already-claimed here-doc bodies.
    fn skip_separators(&mut self) {
        while matches!(
            self.cur().kind,
            TokenKind::Semi | TokenKind::Newline | TokenKind::HereDocBody
        ) {
            self.advance();
        }
    }

    /// Skip newlines (after `&&`, `||`, `|`) plus trailing heredoc bodies.
    fn skip_newlines(&mut self) {
        while matches!(self.cur().kind, TokenKind::Newline | TokenKind::HereDocBody) {
            self.advance();
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        let t = self.cur();
        t.kind == TokenKind::Keyword && t.text == kw
    }

    fn expect_keyword(&mut self, kw: &'static str, message: &'static str) -> Result<(), ParseError> {
        self.skip_separators();
        if self.at_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::missing(self.cur().offset, message))
        }
    }

    /// True at a point where a command list must stop.
    fn at_list_end(&self) -> bool {
        let t = self.cur();
        match t.kind {
            TokenKind::Eof
            | TokenKind::RParen
            | TokenKind::RBrace
            | TokenKind::DSemi
            | TokenKind::SemiAnd
            | TokenKind::DSemiAnd => true,
            TokenKind::Keyword => {
                matches!(t.text, "then" | "do" | "done" | "fi" | "elif" | "else" | "esac")
            }
            _ => false,
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(self.unexpected("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // -------------------------------------------------------------------
    // Lists and pipelines
    // -------------------------------------------------------------------

    fn command_list(&mut self) -> Result<Vec<Command<'a>>, ParseError> {
        let mut commands = Vec::new();
        loop {
            self.skip_separators();
            if self.at_list_end() {
                break;
            }
            let before = self.pos;
            let command = self.command()?;
            if self.pos == before {
                return Err(self.unexpected("unexpected token"));
            }
            if matches!(command, Command::Foreground(_)) {
                self.expect_command_boundary()?;
            }
            commands.push(command);
        }
        Ok(commands)
    }

    fn command(&mut self) -> Result<Command<'a>, ParseError> {
        let list = self.and_or()?;
        if self.cur().kind == TokenKind::Amp {
            self.advance();
            Ok(Command::Background(list))
        } else {
            Ok(Command::Foreground(list))
        }
    }

    fn and_or(&mut self) -> Result<AndOrList<'a>, ParseError> {
        let first = self.pipeline()?;
        let mut rest = Vec::new();
        loop {
            match self.cur().kind {
                TokenKind::AndAnd => {
                    self.advance();
                    self.skip_newlines();
                    rest.push((ListOp::And, self.pipeline()?));
                }
                TokenKind::OrOr => {
                    self.advance();
                    self.skip_newlines();
                    rest.push((ListOp::Or, self.pipeline()?));
                }
                _ => break,
            }
        }
        Ok(AndOrList { first, rest })
    }

    fn pipeline(&mut self) -> Result<Pipeline<'a>, ParseError> {
        let mut negated = false;
        let mut timed = false;
        loop {
            if self.cur().kind == TokenKind::Bang {
                self.advance();
                negated = !negated;
            } else if self.at_keyword("time") {
                self.advance();
                timed = true;
            } else {
                break;
            }
        }

        let mut stages = vec![self.stage()?];
        loop {
            match self.cur().kind {
                TokenKind::Pipe => {
                    self.advance();
                    self.skip_newlines();
                    stages.push(self.stage()?);
                }
                TokenKind::PipeAmp => {
                    // `a |& b` is `a 2>&1 | b`.
                    self.advance();
                    let redirect = Redirect::DupWrite(Some(2), Word::literal("1"));
                    add_redirect(stages.last_mut().expect("pipeline has a stage"), redirect);
                    self.skip_newlines();
                    stages.push(self.stage()?);
                }
                _ => break,
            }
        }
        Ok(Pipeline { negated, timed, stages })
    }

    // -------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------

    fn stage(&mut self) -> Result<Stage<'a>, ParseError> {
        self.enter()?;
        let result = self.stage_inner();
        self.leave();
        result
    }

    fn stage_inner(&mut self) -> Result<Stage<'a>, ParseError> {
        let t = self.cur();
        match t.kind {
            TokenKind::DParenStart => {
                let kind = self.arith_command()?;
                self.wrap_compound(kind)
            }
            TokenKind::DBrackStart => {
                let kind = self.double_bracket()?;
                self.wrap_compound(kind)
            }
            TokenKind::LBrace => {
                let kind = self.group()?;
                self.wrap_compound(kind)
            }
            TokenKind::LParen => {
                let kind = self.subshell()?;
                self.wrap_compound(kind)
            }
            TokenKind::Keyword => match t.text {
                "for" => {
                    let kind = self.for_command()?;
                    self.wrap_compound(kind)
                }
                "while" => {
                    let kind = self.while_command(false)?;
                    self.wrap_compound(kind)
                }
                "until" => {
                    let kind = self.while_command(true)?;
                    self.wrap_compound(kind)
                }
                "if" => {
                    let kind = self.if_command()?;
                    self.wrap_compound(kind)
                }
                "case" => {
                    let kind = self.case_command()?;
                    self.wrap_compound(kind)
                }
                "function" => self.function_def(),
                "select" => Err(ParseError::unsupported(t.offset, "select loop")),
                "coproc" => Err(ParseError::unsupported(t.offset, "coproc")),
                _ => Err(self.unexpected("unexpected keyword")),
            },
            TokenKind::Word
                if self.peek_kind(1) == TokenKind::LParen
                    && self.peek_kind(2) == TokenKind::RParen =>
            {
                self.function_def()
            }
            _ => Ok(Stage::Simple(self.simple_command()?)),
        }
    }

    fn wrap_compound(&mut self, kind: CompoundKind<'a>) -> Result<Stage<'a>, ParseError> {
        let redirects = self.collect_redirects()?;
        Ok(Stage::Compound(CompoundCommand { kind, redirects }))
    }

    // -------------------------------------------------------------------
    // Compound commands
    // -------------------------------------------------------------------

    fn group(&mut self) -> Result<CompoundKind<'a>, ParseError> {
        self.advance(); // {
        let body = self.command_list()?;
        if self.cur().kind != TokenKind::RBrace {
            return Err(ParseError::missing(self.cur().offset, "expected '}'"));
        }
        self.advance();
        Ok(CompoundKind::Group(body))
    }

    fn subshell(&mut self) -> Result<CompoundKind<'a>, ParseError> {
        self.advance(); // (
        let body = self.command_list()?;
        if self.cur().kind != TokenKind::RParen {
            return Err(ParseError::missing(self.cur().offset, "expected ')'"));
        }
        self.advance();
        Ok(CompoundKind::Subshell(body))
    }

    fn if_command(&mut self) -> Result<CompoundKind<'a>, ParseError> {
        self.advance(); // if
        let mut branches = Vec::new();

        let guard = self.command_list()?;
        self.expect_keyword("then", "expected 'then' after if condition")?;
        let body = self.command_list()?;
        branches.push((guard, body));

        while self.at_keyword("elif") {
            self.advance();
            let guard = self.command_list()?;
            self.expect_keyword("then", "expected 'then' after elif condition")?;
            let body = self.command_list()?;
            branches.push((guard, body));
        }

        let else_branch = if self.at_keyword("else") {
            self.advance();
            Some(self.command_list()?)
        } else {
            None
        };

        self.expect_keyword("fi", "expected 'fi' to close if statement")?;
        Ok(CompoundKind::If { branches, else_branch })
    }

    fn while_command(&mut self, until: bool) -> Result<CompoundKind<'a>, ParseError> {
        self.advance(); // while / until
        let cond = self.command_list()?;
        self.expect_keyword("do", "expected 'do' after loop condition")?;
        let body = self.command_list()?;
        self.expect_keyword("done", "expected 'done' to close loop")?;
        Ok(CompoundKind::While { cond, body, until })
    }

    fn for_command(&mut self) -> Result<CompoundKind<'a>, ParseError> {
        self.advance(); // for

        // C-style: for (( init; cond; update ))
        if self.cur().kind == TokenKind::DParenStart {
            self.advance();
            let (raw, offset) = if self.cur().kind == TokenKind::Word {
                let t = self.advance();
                (t.text, t.offset)
            } else {
                ("", self.cur().offset)
            };
            if self.cur().kind != TokenKind::DParenEnd {
                return Err(ParseError::missing(self.cur().offset, "expected '))'"));
            }
            self.advance();
            let (init, cond, update) = parse_for_header(raw, offset)?;
            self.expect_keyword("do", "expected 'do' after for header")?;
            let body = self.command_list()?;
            self.expect_keyword("done", "expected 'done' to close for loop")?;
            return Ok(CompoundKind::ForArith { init, cond, update, body });
        }

        let name_tok = self.cur();
        if name_tok.kind != TokenKind::Word || !is_valid_name(name_tok.text) {
            return Err(self.unexpected("expected variable name after 'for'"));
        }
        self.advance();

        let words = if self.cur().kind == TokenKind::Word && self.cur().text == "in" {
            self.advance();
            let mut words = Vec::new();
            while matches!(self.cur().kind, TokenKind::Word | TokenKind::Keyword | TokenKind::Number)
            {
                words.push(self.word()?);
            }
            Some(words)
        } else {
            None
        };

        self.expect_keyword("do", "expected 'do' after for loop header")?;
        let body = self.command_list()?;
        self.expect_keyword("done", "expected 'done' to close for loop")?;
        Ok(CompoundKind::For { name: name_tok.text, words, body })
    }

    fn case_command(&mut self) -> Result<CompoundKind<'a>, ParseError> {
        self.advance(); // case
        let scrutinee = self.word()?;
        if !(self.cur().kind == TokenKind::Word && self.cur().text == "in") {
            return Err(self.unexpected("expected 'in' after case word"));
        }
        self.advance();
        self.skip_separators();

        let mut arms = Vec::new();
        while !self.at_keyword("esac") {
            if self.cur().kind == TokenKind::Eof {
                return Err(ParseError::missing(self.cur().offset, "expected 'esac'"));
            }
            if self.cur().kind == TokenKind::LParen {
                self.advance();
            }
            let mut patterns = vec![self.word()?];
            while self.cur().kind == TokenKind::Pipe {
                self.advance();
                patterns.push(self.word()?);
            }
            if self.cur().kind != TokenKind::RParen {
                return Err(self.unexpected("expected ')' after case pattern"));
            }
            self.advance();

            let body = self.command_list()?;

            let terminator = match self.cur().kind {
                TokenKind::DSemi => {
                    self.advance();
                    CaseTerminator::Break
                }
                TokenKind::SemiAnd => {
                    self.advance();
                    CaseTerminator::FallThrough
                }
                TokenKind::DSemiAnd => {
                    self.advance();
                    CaseTerminator::Continue
                }
                TokenKind::Keyword if self.cur().text == "esac" => CaseTerminator::Break,
                _ => return Err(self.unexpected("expected ';;' after case body")),
            };
            self.skip_separators();
            arms.push(CaseArm { patterns, body, terminator });
        }

        self.expect_keyword("esac", "expected 'esac' to close case statement")?;
        Ok(CompoundKind::Case { scrutinee, arms })
    }

    /// `[[ ... ]]`: collect words and `&&`/`||` items, then build the tree.
    fn double_bracket(&mut self) -> Result<CompoundKind<'a>, ParseError> {
        let open = self.advance(); // [[
        let mut items = Vec::new();
        loop {
            let t = self.cur();
            match t.kind {
                TokenKind::DBrackEnd => {
                    self.advance();
                    break;
                }
                TokenKind::AndAnd => {
                    self.advance();
                    items.push(CondItem::AndAnd);
                }
                TokenKind::OrOr => {
                    self.advance();
                    items.push(CondItem::OrOr);
                }
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Word => {
                    self.advance();
                    let word = word_parser::parse_word(t.text, t.offset)?;
                    items.push(CondItem::Word { word, raw: t.text });
                }
                TokenKind::Eof => {
                    return Err(ParseError::missing(t.offset, "expected ']]'"));
                }
                _ => return Err(self.unexpected("unexpected token in [[ ]]")),
            }
        }
        let expr = parse_conditional(items, open.offset)?;
        Ok(CompoundKind::DoubleBracket(expr))
    }

    fn arith_command(&mut self) -> Result<CompoundKind<'a>, ParseError> {
        self.advance(); // ((
        let (raw, offset) = if self.cur().kind == TokenKind::Word {
            let t = self.advance();
            (t.text, t.offset)
        } else {
            ("", self.cur().offset)
        };
        if self.cur().kind != TokenKind::DParenEnd {
            return Err(ParseError::missing(self.cur().offset, "expected '))'"));
        }
        self.advance();
        if raw.trim().is_empty() {
            return Err(ParseError::unexpected(offset, "empty arithmetic command"));
        }
        let expr = parse_arithmetic(raw, offset)?;
        Ok(CompoundKind::Arithmetic(expr))
    }

    fn function_def(&mut self) -> Result<Stage<'a>, ParseError> {
        if self.at_keyword("function") {
            self.advance();
            let name_tok = self.cur();
            if name_tok.kind != TokenKind::Word || !is_valid_name(name_tok.text) {
                return Err(self.unexpected("expected function name"));
            }
            self.advance();
            if self.cur().kind == TokenKind::LParen {
                self.advance();
                if self.cur().kind != TokenKind::RParen {
                    return Err(self.unexpected("expected ')' in function definition"));
                }
                self.advance();
            }
            self.finish_function(name_tok.text)
        } else {
            let name_tok = self.advance();
            if !is_valid_name(name_tok.text) {
                return Err(ParseError::unexpected(name_tok.offset, "invalid function name"));
            }
            self.advance(); // (
            self.advance(); // )
            self.finish_function(name_tok.text)
        }
    }

    fn finish_function(&mut self, name: &'a str) -> Result<Stage<'a>, ParseError> {
        self.skip_separators();
        let kind = match self.cur().kind {
            TokenKind::LBrace => self.group()?,
            TokenKind::LParen => self.subshell()?,
            _ => return Err(self.unexpected("expected '{' or '(' after function name")),
        };
        let redirects = self.collect_redirects()?;
        Ok(Stage::FunctionDef {
            name,
            body: Box::new(CompoundCommand { kind, redirects }),
        })
    }

    // -------------------------------------------------------------------
    // Simple commands
    // -------------------------------------------------------------------

    fn simple_command(&mut self) -> Result<SimpleCommand<'a>, ParseError> {
        let mut cmd = SimpleCommand::default();
        let mut saw_word = false;

        loop {
            if let Some(redirect) = self.try_redirect()? {
                cmd.redirects.push(redirect);
                continue;
            }
            let t = self.cur();
            match t.kind {
                TokenKind::Assignment if !saw_word => {
                    let assignment = self.assignment()?;
                    cmd.assignments.push(assignment);
                }
                TokenKind::Word | TokenKind::Keyword | TokenKind::Number => {
                    cmd.words.push(self.word()?);
                    saw_word = true;
                }
                TokenKind::Assignment => {
                    // After the command name, NAME=value is an ordinary word.
                    let tok = self.advance();
                    let mut fragments =
                        word_parser::parse_word(tok.text, tok.offset)?.fragments;
                    if self.cur().kind == TokenKind::Word && self.cur().offset == tok.end() {
                        let value = self.advance();
                        fragments
                            .extend(word_parser::parse_word(value.text, value.offset)?.fragments);
                    }
                    cmd.words.push(Word::new(fragments));
                    saw_word = true;
                }
                _ => break,
            }
        }

        if cmd.assignments.is_empty() && cmd.words.is_empty() && cmd.redirects.is_empty() {
            return Err(self.unexpected("expected command"));
        }
        Ok(cmd)
    }

    /// Parse an `Assignment` token plus its glued value.
    fn assignment(&mut self) -> Result<Assignment<'a>, ParseError> {
        let tok = self.advance();
        let text = tok.text;
        let append = text.ends_with("+=");
        let lhs = &text[..text.len() - if append { 2 } else { 1 }];

        let (name, index) = match lhs.find('[') {
            Some(bracket) => {
                if !lhs.ends_with(']') {
                    return Err(ParseError::unexpected(tok.offset, "malformed subscript"));
                }
                let name = &lhs[..bracket];
                let index_text = &lhs[bracket + 1..lhs.len() - 1];
                if index_text.is_empty() {
                    return Err(ParseError::unexpected(tok.offset, "empty subscript"));
                }
                let index =
                    word_parser::parse_word(index_text, tok.offset + bracket + 1)?;
                (name, Some(index))
            }
            None => (lhs, None),
        };

        // Array literal: `name=(words...)`, glued to the `=`.
        if self.cur().kind == TokenKind::LParen && self.cur().offset == tok.end() {
            self.advance();
            let mut words = Vec::new();
            loop {
                self.skip_newlines();
                match self.cur().kind {
                    TokenKind::RParen => {
                        self.advance();
                        break;
                    }
                    TokenKind::Word | TokenKind::Keyword | TokenKind::Number => {
                        words.push(self.word()?);
                    }
                    TokenKind::Eof => {
                        return Err(ParseError::missing(self.cur().offset, "unterminated array"));
                    }
                    _ => return Err(self.unexpected("unexpected token in array literal")),
                }
            }
            return Ok(Assignment { name, index, append, value: None, array: Some(words) });
        }

        // Scalar value, glued to the `=`.
        let value = if self.cur().kind == TokenKind::Word && self.cur().offset == tok.end() {
            Some(self.word()?)
        } else {
            None
        };
        Ok(Assignment { name, index, append, value, array: None })
    }

    fn word(&mut self) -> Result<Word<'a>, ParseError> {
        let t = self.cur();
        match t.kind {
            TokenKind::Word | TokenKind::Keyword | TokenKind::Number => {
                self.advance();
                word_parser::parse_word(t.text, t.offset)
            }
            _ => Err(self.unexpected("expected word")),
        }
    }

    // -------------------------------------------------------------------
    // Redirects
    // -------------------------------------------------------------------

    fn collect_redirects(&mut self) -> Result<Vec<Redirect<'a>>, ParseError> {
        let mut redirects = Vec::new();
        while let Some(redirect) = self.try_redirect()? {
            redirects.push(redirect);
        }
        Ok(redirects)
    }

    fn try_redirect(&mut self) -> Result<Option<Redirect<'a>>, ParseError> {
        let mut fd = None;
        let mut op_index = 0;
        if self.cur().kind == TokenKind::Number && is_redirect_kind(self.peek_kind(1)) {
            fd = self.cur().text.parse::<u32>().ok();
            op_index = 1;
        }
        let op = self.tokens[(self.pos + op_index).min(self.tokens.len() - 1)];
        if !is_redirect_kind(op.kind) {
            return Ok(None);
        }
        if op_index == 1 {
            self.advance(); // the fd number
        }
        self.advance(); // the operator

        match op.kind {
            TokenKind::DLess | TokenKind::DLessDash => {
                let strip_tabs = op.kind == TokenKind::DLessDash;
                let delim = self.cur();
                if delim.kind != TokenKind::Word {
                    return Err(self.unexpected("expected here-doc delimiter"));
                }
                self.advance();
                let quoted = delimiter_is_quoted(delim.text);
                let delimiter = unquote_delimiter(delim.text);
                let body_tok = self.take_heredoc_body()?;
                let body = if quoted {
                    let raw = body_tok.text;
                    let text = if strip_tabs {
                        strip_heredoc_tabs(raw)
                    } else {
                        Cow::Borrowed(raw)
                    };
                    HereDocBody::Literal(text)
                } else {
                    HereDocBody::Expanded(word_parser::parse_heredoc_fragments(
                        body_tok.text,
                        body_tok.offset,
                    )?)
                };
                Ok(Some(Redirect::HereDoc(HereDoc {
                    fd,
                    delimiter,
                    quoted,
                    strip_tabs,
                    body,
                })))
            }
            TokenKind::TLess => {
                let word = self.word()?;
                Ok(Some(Redirect::HereString(word)))
            }
            TokenKind::AndGreat => {
                let word = self.word()?;
                Ok(Some(Redirect::WriteBoth(word)))
            }
            TokenKind::AndDGreat => {
                let word = self.word()?;
                Ok(Some(Redirect::AppendBoth(word)))
            }
            _ => {
                let word = self.word()?;
                Ok(Some(match op.kind {
                    TokenKind::Less => Redirect::Read(fd, word),
                    TokenKind::Great => Redirect::Write(fd, word),
                    TokenKind::DGreat => Redirect::Append(fd, word),
                    TokenKind::LessGreat => Redirect::ReadWrite(fd, word),
                    TokenKind::Clobber => Redirect::Clobber(fd, word),
                    TokenKind::LessAnd => Redirect::DupRead(fd, word),
                    TokenKind::GreatAnd => Redirect::DupWrite(fd, word),
                    _ => unreachable!("redirect kinds covered above"),
                }))
            }
        }
    }

    /// Claim the next unclaimed here-doc body token.
    fn take_heredoc_body(&mut self) -> Result<Token<'a>, ParseError> {
        let start = self.heredoc_cursor.max(self.pos);
        for i in start..self.tokens.len() {
            if self.tokens[i].kind == TokenKind::HereDocBody {
                self.heredoc_cursor = i + 1;
                return Ok(self.tokens[i]);
            }
        }
        Err(ParseError::missing(self.cur().offset, "missing here-doc body"))
    }
}

/// Attach a redirect to the appropriate list of a stage.
fn add_redirect<'a>(stage: &mut Stage<'a>, redirect: Redirect<'a>) {
    match stage {
        Stage::Simple(cmd) => cmd.redirects.push(redirect),
        Stage::Compound(cmd) => cmd.redirects.push(redirect),
        Stage::FunctionDef { body, .. } => body.redirects.push(redirect),
    }
}

fn is_redirect_kind(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Less
            | TokenKind::Great
            | TokenKind::DLess
            | TokenKind::DGreat
            | TokenKind::TLess
            | TokenKind::DLessDash
            | TokenKind::LessAnd
            | TokenKind::GreatAnd
            | TokenKind::LessGreat
            | TokenKind::Clobber
            | TokenKind::AndGreat
            | TokenKind::AndDGreat
    )
}

fn is_valid_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
            bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }
        _ => false,
    }
}

/// Split a C-style for header into its three sections and parse each.
#[allow(clippy::type_complexity)]
fn parse_for_header(
    raw: &str,
    offset: usize,
) -> Result<(Option<ArithExpr<'_>>, Option<ArithExpr<'_>>, Option<ArithExpr<'_>>), ParseError> {
    let mut sections = Vec::new();
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b';' if depth == 0 => {
                sections.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    sections.push((start, bytes.len()));
    if sections.len() != 3 {
        return Err(ParseError::unexpected(offset, "expected 'init; cond; update'"));
    }
    let mut parsed = Vec::with_capacity(3);
    for (s, e) in sections {
        let text = &raw[s..e];
        if text.trim().is_empty() {
            parsed.push(None);
        } else {
            parsed.push(Some(parse_arithmetic(text, offset + s)?));
        }
    }
    let update = parsed.pop().expect("three sections");
    let cond = parsed.pop().expect("three sections");
    let init = parsed.pop().expect("three sections");
    Ok((init, cond, update))
}

/// Strip one level of leading tabs from each line of a here-doc body.
fn strip_heredoc_tabs(raw: &str) -> Cow<'_, str> {
    if !raw.lines().any(|l| l.starts_with('\t')) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    for line in raw.split_inclusive('\n') {
        out.push_str(line.trim_start_matches('\t'));
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Script<'_> {
        parse(input).unwrap()
    }

    fn parse_err(input: &str) -> ParseError {
        parse(input).unwrap_err()
    }

    fn first_simple<'a>(script: &'a Script<'a>) -> &'a SimpleCommand<'a> {
        let Command::Foreground(list) = &script.commands[0] else { panic!("background") };
        let Stage::Simple(cmd) = &list.first.stages[0] else { panic!("not simple") };
        cmd
    }

    #[test]
    fn simple_command() {
        let s = parse_ok("echo hello world");
        let cmd = first_simple(&s);
        assert_eq!(cmd.words.len(), 3);
    }

    #[test]
    fn empty_input() {
        let s = parse_ok("");
        assert!(s.commands.is_empty());
    }

    #[test]
    fn pipeline() {
        let s = parse_ok("cat file | grep foo | wc -l");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        assert_eq!(list.first.stages.len(), 3);
    }

    #[test]
    fn pipe_amp_adds_redirect() {
        let s = parse_ok("make |& tee log");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Simple(first) = &list.first.stages[0] else { panic!() };
        assert!(matches!(first.redirects[0], Redirect::DupWrite(Some(2), _)));
    }

    #[test]
    fn and_or_chain() {
        let s = parse_ok("a && b || c");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        assert_eq!(list.rest.len(), 2);
        assert_eq!(list.rest[0].0, ListOp::And);
        assert_eq!(list.rest[1].0, ListOp::Or);
    }

    #[test]
    fn background_job() {
        let s = parse_ok("sleep 10 &");
        assert!(matches!(s.commands[0], Command::Background(_)));
    }

    #[test]
    fn sequence() {
        let s = parse_ok("echo a; echo b; echo c");
        assert_eq!(s.commands.len(), 3);
    }

    #[test]
    fn negated_pipeline() {
        let s = parse_ok("! grep -q x f");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        assert!(list.first.negated);
    }

    #[test]
    fn timed_pipeline() {
        let s = parse_ok("time sleep 1");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        assert!(list.first.timed);
    }

    #[test]
    fn assignment_only() {
        let s = parse_ok("FOO=bar");
        let cmd = first_simple(&s);
        assert_eq!(cmd.assignments.len(), 1);
        assert_eq!(cmd.assignments[0].name, "FOO");
        assert!(cmd.words.is_empty());
    }

    #[test]
    fn assignment_prefix_with_command() {
        let s = parse_ok("FOO=bar env");
        let cmd = first_simple(&s);
        assert_eq!(cmd.assignments.len(), 1);
        assert_eq!(cmd.words.len(), 1);
    }

    #[test]
    fn array_assignment() {
        let s = parse_ok("arr=(1 2 3)");
        let cmd = first_simple(&s);
        assert_eq!(cmd.assignments[0].array.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn array_append() {
        let s = parse_ok("arr+=(4)");
        let cmd = first_simple(&s);
        assert!(cmd.assignments[0].append);
    }

    #[test]
    fn array_element_assignment() {
        let s = parse_ok("arr[0]=x");
        let cmd = first_simple(&s);
        assert_eq!(cmd.assignments[0].name, "arr");
        assert!(cmd.assignments[0].index.is_some());
    }

    #[test]
    fn for_loop() {
        let s = parse_ok("for i in a b c; do echo $i; done");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        let CompoundKind::For { name, words, body } = &c.kind else { panic!() };
        assert_eq!(*name, "i");
        assert_eq!(words.as_ref().unwrap().len(), 3);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn for_loop_no_words() {
        let s = parse_ok("for arg; do echo $arg; done");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::For { words: None, .. }));
    }

    #[test]
    fn c_style_for() {
        let s = parse_ok("for (( i=0; i<10; i++ )); do echo $i; done");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        let CompoundKind::ForArith { init, cond, update, .. } = &c.kind else { panic!() };
        assert!(init.is_some() && cond.is_some() && update.is_some());
    }

    #[test]
    fn while_loop() {
        let s = parse_ok("while true; do echo x; done");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::While { until: false, .. }));
    }

    #[test]
    fn until_loop() {
        let s = parse_ok("until test -f x; do sleep 1; done");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::While { until: true, .. }));
    }

    #[test]
    fn if_elif_else() {
        let s = parse_ok("if a; then b; elif c; then d; else e; fi");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        let CompoundKind::If { branches, else_branch } = &c.kind else { panic!() };
        assert_eq!(branches.len(), 2);
        assert!(else_branch.is_some());
    }

    #[test]
    fn case_statement() {
        let s = parse_ok("case $1 in foo) echo foo;; bar|baz) echo other;; esac");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        let CompoundKind::Case { arms, .. } = &c.kind else { panic!() };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[1].patterns.len(), 2);
    }

    #[test]
    fn case_empty_body_terminates() {
        let s = parse_ok("case $x in a) ;; b) echo b;; esac");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        let CompoundKind::Case { arms, .. } = &c.kind else { panic!() };
        assert!(arms[0].body.is_empty());
        assert_eq!(arms.len(), 2);
    }

    #[test]
    fn case_fallthrough_terminators() {
        let s = parse_ok("case $x in a) echo a;& b) echo b;;& c) echo c;; esac");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        let CompoundKind::Case { arms, .. } = &c.kind else { panic!() };
        assert_eq!(arms[0].terminator, CaseTerminator::FallThrough);
        assert_eq!(arms[1].terminator, CaseTerminator::Continue);
        assert_eq!(arms[2].terminator, CaseTerminator::Break);
    }

    #[test]
    fn case_last_arm_without_terminator() {
        let s = parse_ok("case $x in a) echo a; esac");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        let CompoundKind::Case { arms, .. } = &c.kind else { panic!() };
        assert_eq!(arms.len(), 1);
    }

    #[test]
    fn brace_group() {
        let s = parse_ok("{ echo a; echo b; }");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::Group(ref body) if body.len() == 2));
    }

    #[test]
    fn subshell() {
        let s = parse_ok("(cd /tmp && pwd)");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::Subshell(_)));
    }

    #[test]
    fn function_definition() {
        let s = parse_ok("greet() { echo hello; }");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        assert!(matches!(list.first.stages[0], Stage::FunctionDef { name: "greet", .. }));
    }

    #[test]
    fn function_keyword_definition() {
        let s = parse_ok("function greet { echo hello; }");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        assert!(matches!(list.first.stages[0], Stage::FunctionDef { name: "greet", .. }));
    }

    #[test]
    fn double_bracket_test() {
        let s = parse_ok("[[ -f /etc/hosts ]]");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::DoubleBracket(TestExpr::Unary(b'f', _))));
    }

    #[test]
    fn double_bracket_and() {
        let s = parse_ok("[[ -f a && -f b ]]");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::DoubleBracket(TestExpr::And(_, _))));
    }

    #[test]
    fn arithmetic_command() {
        let s = parse_ok("(( i++ ))");
        let Command::Foreground(list) = &s.commands[0] else { panic!() };
        let Stage::Compound(c) = &list.first.stages[0] else { panic!() };
        assert!(matches!(c.kind, CompoundKind::Arithmetic(ArithExpr::PostIncr("i"))));
    }

    #[test]
    fn redirects_attach_to_command() {
        let s = parse_ok("echo hi >out 2>&1");
        let cmd = first_simple(&s);
        assert_eq!(cmd.redirects.len(), 2);
        assert!(matches!(cmd.redirects[0], Redirect::Write(None, _)));
        assert!(matches!(cmd.redirects[1], Redirect::DupWrite(Some(2), _)));
    }

    #[test]
    fn here_string() {
        let s = parse_ok("cat <<< hello");
        let cmd = first_simple(&s);
        assert!(matches!(cmd.redirects[0], Redirect::HereString(_)));
    }

    #[test]
    fn heredoc() {
        let s = parse_ok("cat <<EOF\nhello $USER\nEOF");
        let cmd = first_simple(&s);
        let Redirect::HereDoc(hd) = &cmd.redirects[0] else { panic!() };
        assert!(!hd.quoted);
        assert!(matches!(hd.body, HereDocBody::Expanded(_)));
    }

    #[test]
    fn heredoc_quoted() {
        let s = parse_ok("cat <<'EOF'\n$HOME stays\nEOF");
        let cmd = first_simple(&s);
        let Redirect::HereDoc(hd) = &cmd.redirects[0] else { panic!() };
        assert!(hd.quoted);
        let HereDocBody::Literal(text) = &hd.body else { panic!() };
        assert_eq!(&**text, "$HOME stays\n");
    }

    #[test]
    fn heredoc_strip_tabs() {
        let s = parse_ok("cat <<-'EOF'\n\tindented\n\tEOF");
        let cmd = first_simple(&s);
        let Redirect::HereDoc(hd) = &cmd.redirects[0] else { panic!() };
        let HereDocBody::Literal(text) = &hd.body else { panic!() };
        assert_eq!(&**text, "indented\n");
    }

    #[test]
    fn chained_heredocs_in_order() {
        let s = parse_ok("cat <<A <<B\nfirst\nA\nsecond\nB");
        let cmd = first_simple(&s);
        let Redirect::HereDoc(a) = &cmd.redirects[0] else { panic!() };
        let Redirect::HereDoc(b) = &cmd.redirects[1] else { panic!() };
        assert_eq!(a.delimiter, "A");
        assert_eq!(b.delimiter, "B");
        let HereDocBody::Expanded(fa) = &a.body else { panic!() };
        assert_eq!(fa[0], Fragment::Literal("first\n"));
        let HereDocBody::Expanded(fb) = &b.body else { panic!() };
        assert_eq!(fb[0], Fragment::Literal("second\n"));
    }

    #[test]
    fn heredoc_then_next_command() {
        let s = parse_ok("cat <<EOF\nbody\nEOF\necho after");
        assert_eq!(s.commands.len(), 2);
    }

    #[test]
    fn process_substitution_word() {
        let s = parse_ok("diff <(sort a) <(sort b)");
        let cmd = first_simple(&s);
        assert_eq!(cmd.words.len(), 3);
        assert!(matches!(cmd.words[1].fragments[0], Fragment::ProcSubst(ProcDirection::In, _)));
    }

    #[test]
    fn select_is_unsupported() {
        let err = parse_err("select x in a b; do echo $x; done");
        assert_eq!(err.kind, ParseErrorKind::Unsupported);
    }

    #[test]
    fn missing_fi() {
        let err = parse_err("if true; then echo x");
        assert_eq!(err.kind, ParseErrorKind::MissingTerminator);
    }

    #[test]
    fn missing_done() {
        let err = parse_err("while true; do echo x");
        assert_eq!(err.kind, ParseErrorKind::MissingTerminator);
    }

    #[test]
    fn unterminated_subst_is_lex_error() {
        let err = parse_err("echo $(");
        assert!(err.offset <= 7);
    }

    #[test]
    fn comments_are_skipped() {
        let s = parse_ok("echo a # trailing\necho b");
        assert_eq!(s.commands.len(), 2);
    }

    #[test]
    fn newline_separated_commands() {
        let s = parse_ok("echo a\necho b\n");
        assert_eq!(s.commands.len(), 2);
    }
}
