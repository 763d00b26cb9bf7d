//! Fish code generation.
//!
//! Walks the AST and produces fish source with the same observable
//! behavior. Every construct either translates faithfully or returns
//! [`EmitError::UnsupportedConstruct`] so the caller can fall back to
//! running real bash; the emitter never guesses.

mod arith;
mod builtins;
mod conditional;
mod expansion;
mod word;

use thiserror::Error;

use crate::ast::types::*;
use crate::parser::ParseError;

/// Translation failure: either the input did not parse as bash, or it
/// parsed but uses a feature with no fish equivalent.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Emit(#[from] EmitError),
}

/// The emitter refused a construct rather than mistranslate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(&'static str),
}

pub(crate) type EmitResult = Result<(), EmitError>;

pub(crate) fn unsupported<T>(name: &'static str) -> Result<T, EmitError> {
    Err(EmitError::UnsupportedConstruct(name))
}

/// Translate a bash command string to fish source.
pub fn translate(input: &str) -> Result<String, TranslateError> {
    let script = crate::parser::parse(input)?;
    let mut emitter = Emitter::new();
    let mut out = String::with_capacity(input.len());
    emitter.script(&script, &mut out)?;
    Ok(out)
}

/// Emission context threaded through all emitters.
pub(crate) struct Emitter {
    /// Inside a translated subshell: assignments become `set -l`.
    pub(crate) in_subshell: bool,
}

impl Emitter {
    pub(crate) fn new() -> Self {
        Emitter { in_subshell: false }
    }

    pub(crate) fn set_keyword(&self) -> &'static str {
        if self.in_subshell { "set -l " } else { "set " }
    }

    // -------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------

    pub(crate) fn script(&mut self, script: &Script<'_>, out: &mut String) -> EmitResult {
        for (i, cmd) in script.commands.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.command(cmd, out)?;
        }
        Ok(())
    }

    pub(crate) fn command(&mut self, cmd: &Command<'_>, out: &mut String) -> EmitResult {
        match cmd {
            Command::Foreground(list) => self.and_or(list, out),
            Command::Background(list) => {
                self.and_or(list, out)?;
                out.push_str(" &");
                Ok(())
            }
        }
    }

    fn and_or(&mut self, list: &AndOrList<'_>, out: &mut String) -> EmitResult {
        self.pipeline(&list.first, out)?;
        for (op, pipeline) in &list.rest {
            out.push_str(match op {
                ListOp::And => "; and ",
                ListOp::Or => "; or ",
            });
            self.pipeline(pipeline, out)?;
        }
        Ok(())
    }

    fn pipeline(&mut self, pipeline: &Pipeline<'_>, out: &mut String) -> EmitResult {
        if pipeline.negated {
            out.push_str("not ");
        }
        if pipeline.timed {
            out.push_str("time ");
        }
        for (i, stage) in pipeline.stages.iter().enumerate() {
            if i > 0 {
                out.push_str(" | ");
            }
            self.stage(stage, out)?;
        }
        Ok(())
    }

    fn stage(&mut self, stage: &Stage<'_>, out: &mut String) -> EmitResult {
        match stage {
            Stage::Simple(cmd) => self.simple(cmd, out),
            Stage::Compound(cmd) => self.compound(cmd, out),
            Stage::FunctionDef { name, body } => {
                out.push_str("function ");
                out.push_str(name);
                out.push('\n');
                // Unwrap the brace group so the function body is not a
                // nested begin/end block.
                match &body.kind {
                    CompoundKind::Group(cmds) => self.body(cmds, out)?,
                    other => self.compound_kind(other, out)?,
                }
                out.push_str("\nend");
                for redirect in &body.redirects {
                    out.push(' ');
                    self.redirect(redirect, out)?;
                }
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------
    // Simple commands
    // -------------------------------------------------------------------

    fn simple(&mut self, cmd: &SimpleCommand<'_>, out: &mut String) -> EmitResult {
        let mut herestring = None;
        let mut heredoc = None;
        let mut redirects = Vec::new();
        for redirect in &cmd.redirects {
            match redirect {
                Redirect::HereString(w) => herestring = Some(w),
                Redirect::HereDoc(hd) => heredoc = Some(hd),
                other => redirects.push(other),
            }
        }

        // Assignment-only command.
        if cmd.words.is_empty() {
            if !cmd.assignments.is_empty() {
                return self.assignments(&cmd.assignments, out);
            }
            if !redirects.is_empty() || herestring.is_some() || heredoc.is_some() {
                // `> file` alone truncates; emit a bare builtin no-op.
                out.push_str("true");
                for redirect in &redirects {
                    out.push(' ');
                    self.redirect(redirect, out)?;
                }
                return Ok(());
            }
            return unsupported("empty command");
        }

        let cmd_name = word::word_as_str(&cmd.words[0]);

        // Pipe the here-input in front of the command.
        if let Some(word) = herestring {
            out.push_str("echo ");
            self.word(word, out)?;
            out.push_str(" | ");
        }
        if let Some(hd) = heredoc {
            self.heredoc_producer(hd, out)?;
            out.push_str(" | ");
        }

        // Prefix assignments: fish 3.1+ scopes `VAR=value cmd` the same
        // way bash does.
        for assignment in &cmd.assignments {
            if assignment.append || assignment.array.is_some() || assignment.index.is_some() {
                return unsupported("array or append prefix assignment");
            }
            out.push_str(assignment.name);
            out.push('=');
            if let Some(value) = &assignment.value {
                self.word(value, out)?;
            }
            out.push(' ');
        }

        if let Some(name) = cmd_name.as_deref() {
            if let Some(result) = self.builtin(name, &cmd.words, &redirects, out) {
                return result;
            }
            if self.in_subshell && name == "exit" {
                // fish's begin/end cannot emulate exiting just the subshell.
                return unsupported("exit in subshell");
            }
        }

        for (i, word) in cmd.words.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            self.word(word, out)?;
        }
        for redirect in &redirects {
            out.push(' ');
            self.redirect(redirect, out)?;
        }
        Ok(())
    }

    /// Standalone assignments: scalars, appends, arrays, and elements.
    fn assignments(&mut self, assignments: &[Assignment<'_>], out: &mut String) -> EmitResult {
        for (i, a) in assignments.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            if let Some(words) = &a.array {
                out.push_str(if a.append {
                    if self.in_subshell { "set -la " } else { "set -a " }
                } else {
                    self.set_keyword()
                });
                out.push_str(a.name);
                for word in words {
                    out.push(' ');
                    self.word(word, out)?;
                }
                continue;
            }
            if let Some(index) = &a.index {
                // arr[n]=v  ->  set arr[n+1] v   (fish arrays are 1-based)
                if a.append {
                    return unsupported("array element append");
                }
                out.push_str(self.set_keyword());
                out.push_str(a.name);
                out.push('[');
                expansion::array_index(self, index, out)?;
                out.push(']');
                if let Some(value) = &a.value {
                    out.push(' ');
                    self.word(value, out)?;
                }
                continue;
            }
            out.push_str(self.set_keyword());
            out.push_str(a.name);
            if a.append {
                // str+=more  ->  set str "$str"more
                out.push_str(" \"$");
                out.push_str(a.name);
                out.push('"');
                if let Some(value) = &a.value {
                    self.word(value, out)?;
                }
            } else if let Some(value) = &a.value {
                out.push(' ');
                self.word(value, out)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Compound commands
    // -------------------------------------------------------------------

    fn compound(&mut self, cmd: &CompoundCommand<'_>, out: &mut String) -> EmitResult {
        let mut herestring = None;
        let mut heredoc = None;
        for redirect in &cmd.redirects {
            match redirect {
                Redirect::HereString(w) => herestring = Some(w),
                Redirect::HereDoc(hd) => heredoc = Some(hd),
                _ => {}
            }
        }
        if let Some(word) = herestring {
            out.push_str("echo ");
            self.word(word, out)?;
            out.push_str(" | ");
        }
        if let Some(hd) = heredoc {
            self.heredoc_producer(hd, out)?;
            out.push_str(" | ");
        }
        self.compound_kind(&cmd.kind, out)?;
        for redirect in &cmd.redirects {
            if matches!(redirect, Redirect::HereString(_) | Redirect::HereDoc(_)) {
                continue;
            }
            out.push(' ');
            self.redirect(redirect, out)?;
        }
        Ok(())
    }

    fn compound_kind(&mut self, kind: &CompoundKind<'_>, out: &mut String) -> EmitResult {
        match kind {
            CompoundKind::For { name, words, body } => {
                out.push_str("for ");
                out.push_str(name);
                out.push_str(" in ");
                match words {
                    Some(words) => {
                        for (i, w) in words.iter().enumerate() {
                            if i > 0 {
                                out.push(' ');
                            }
                            self.for_word(w, out)?;
                        }
                    }
                    None => out.push_str("$argv"),
                }
                out.push('\n');
                self.body(body, out)?;
                out.push_str("\nend");
                Ok(())
            }

            CompoundKind::ForArith { init, cond, update, body } => {
                if let Some(init) = init {
                    arith::standalone(self, init, out)?;
                    out.push('\n');
                }
                out.push_str("while ");
                match cond {
                    Some(cond) => arith::condition(cond, out)?,
                    None => out.push_str("true"),
                }
                out.push('\n');
                self.body(body, out)?;
                if let Some(update) = update {
                    out.push('\n');
                    arith::standalone(self, update, out)?;
                }
                out.push_str("\nend");
                Ok(())
            }

            CompoundKind::While { cond, body, until } => {
                out.push_str(if *until { "while not " } else { "while " });
                self.guard(cond, out)?;
                out.push('\n');
                self.body(body, out)?;
                out.push_str("\nend");
                Ok(())
            }

            CompoundKind::If { branches, else_branch } => {
                for (i, (guard, body)) in branches.iter().enumerate() {
                    out.push_str(if i == 0 { "if " } else { "\nelse if " });
                    self.guard(guard, out)?;
                    out.push('\n');
                    self.body(body, out)?;
                }
                if let Some(else_body) = else_branch {
                    out.push_str("\nelse\n");
                    self.body(else_body, out)?;
                }
                out.push_str("\nend");
                Ok(())
            }

            CompoundKind::Case { scrutinee, arms } => self.case(scrutinee, arms, out),

            CompoundKind::Group(body) => {
                out.push_str("begin\n");
                self.body(body, out)?;
                out.push_str("\nend");
                Ok(())
            }

            CompoundKind::Subshell(body) => {
                if body.is_empty() {
                    return unsupported("empty subshell");
                }
                out.push_str("begin\n");
                out.push_str("set -l __marlin_pwd (pwd)\n");
                let outer = self.in_subshell;
                self.in_subshell = true;
                let result = self.body(body, out);
                self.in_subshell = outer;
                result?;
                out.push_str("\nset -l __marlin_rc $status; cd $__marlin_pwd 2>/dev/null\ntest $__marlin_rc -eq 0\nend");
                Ok(())
            }

            CompoundKind::DoubleBracket(expr) => conditional::test_expr(self, expr, out),

            CompoundKind::Arithmetic(expr) => arith::standalone(self, expr, out),
        }
    }

    /// A for-loop word: bash word-splits unquoted `$(cmd)` and `$var`;
    /// fish does not, so wrap them in `string split`.
    fn for_word(&mut self, word: &Word<'_>, out: &mut String) -> EmitResult {
        if let [Fragment::CommandSubst(cmds)] = word.fragments.as_slice() {
            out.push('(');
            self.command_seq(cmds, out)?;
            out.push_str(" | string split -n ' ')");
            return Ok(());
        }
        if let [Fragment::VarSimple(Param::Var(_))] = word.fragments.as_slice() {
            out.push_str("(string split -n -- ' ' ");
            self.word(word, out)?;
            out.push(')');
            return Ok(());
        }
        self.word(word, out)
    }

    fn guard(&mut self, guard: &[Command<'_>], out: &mut String) -> EmitResult {
        if guard.len() == 1 {
            self.command(&guard[0], out)
        } else {
            out.push_str("begin; ");
            self.command_seq(guard, out)?;
            out.push_str("; end");
            Ok(())
        }
    }

    pub(crate) fn body(&mut self, commands: &[Command<'_>], out: &mut String) -> EmitResult {
        for (i, cmd) in commands.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.command(cmd, out)?;
        }
        Ok(())
    }

    /// Commands joined by `; ` on one line (for substitutions and guards).
    pub(crate) fn command_seq(&mut self, commands: &[Command<'_>], out: &mut String) -> EmitResult {
        for (i, cmd) in commands.iter().enumerate() {
            if i > 0 {
                out.push_str("; ");
            }
            self.command(cmd, out)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Case
    // -------------------------------------------------------------------

    fn case(&mut self, scrutinee: &Word<'_>, arms: &[CaseArm<'_>], out: &mut String) -> EmitResult {
        let effective = |i: usize| {
            if i + 1 == arms.len() {
                CaseTerminator::Break
            } else {
                arms[i].terminator
            }
        };
        let has_fallthrough =
            (0..arms.len()).any(|i| effective(i) == CaseTerminator::FallThrough);
        let has_continue = (0..arms.len()).any(|i| effective(i) == CaseTerminator::Continue);

        if has_fallthrough && has_continue {
            return unsupported("mixed ;& and ;;& case terminators");
        }
        if has_continue {
            return self.case_continue(scrutinee, arms, &effective, out);
        }

        out.push_str("switch ");
        self.word(scrutinee, out)?;
        out.push('\n');
        for (i, arm) in arms.iter().enumerate() {
            out.push_str("case ");
            for (j, pattern) in arm.patterns.iter().enumerate() {
                if j > 0 {
                    out.push(' ');
                }
                self.case_pattern(pattern, out)?;
            }
            out.push('\n');
            self.body(&arm.body, out)?;
            // `;&` runs the following bodies too; inline them, but refuse
            // to duplicate anything with observable side channels.
            if effective(i) == CaseTerminator::FallThrough {
                for follower in arms.iter().skip(i + 1) {
                    if commands_have_side_effects(&follower.body) {
                        return unsupported(";& fall-through over side-effecting body");
                    }
                    if !arm.body.is_empty() || !follower.body.is_empty() {
                        out.push('\n');
                    }
                    self.body(&follower.body, out)?;
                    if follower.terminator != CaseTerminator::FallThrough {
                        break;
                    }
                }
            }
            out.push('\n');
        }
        out.push_str("end");
        Ok(())
    }

    /// All-`;;&` case: every arm is tested independently.
    fn case_continue(
        &mut self,
        scrutinee: &Word<'_>,
        arms: &[CaseArm<'_>],
        effective: &dyn Fn(usize) -> CaseTerminator,
        out: &mut String,
    ) -> EmitResult {
        for (i, _) in arms.iter().enumerate() {
            if effective(i) != CaseTerminator::Continue && i + 1 != arms.len() {
                return unsupported(";; arm inside a ;;& case");
            }
        }
        out.push_str("begin\nset -l __marlin_case ");
        self.word(scrutinee, out)?;
        out.push('\n');
        for arm in arms {
            out.push_str("if ");
            for (j, pattern) in arm.patterns.iter().enumerate() {
                if j > 0 {
                    out.push_str("; or ");
                }
                out.push_str("string match -q -- ");
                let mut pattern_buf = String::with_capacity(32);
                self.word_unquoted(pattern, &mut pattern_buf)?;
                word::push_single_quoted(out, &pattern_buf);
                out.push_str(" $__marlin_case");
            }
            out.push('\n');
            self.body(&arm.body, out)?;
            out.push_str("\nend\n");
        }
        out.push_str("end");
        Ok(())
    }

    fn case_pattern(&mut self, pattern: &Word<'_>, out: &mut String) -> EmitResult {
        let mut buf = String::with_capacity(32);
        self.word(pattern, &mut buf)?;
        if let Some(expanded) = expand_bracket_pattern(&buf) {
            out.push_str(&expanded);
        } else if buf.contains('[') {
            // fish case has no character classes, and a range cannot be
            // expanded to alternatives.
            return unsupported("bracket pattern in case");
        } else if buf.contains('*') || buf.contains('?') {
            word::push_single_quoted(out, &buf);
        } else {
            out.push_str(&buf);
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Redirects and here-docs
    // -------------------------------------------------------------------

    fn redirect(&mut self, redirect: &Redirect<'_>, out: &mut String) -> EmitResult {
        fn fd_ok(fd: Option<u32>) -> Result<(), EmitError> {
            match fd {
                Some(n) if n > 2 => unsupported("file descriptor beyond 2"),
                _ => Ok(()),
            }
        }
        fn write_fd(fd: Option<u32>, out: &mut String) {
            if let Some(n) = fd {
                out.push_str(&n.to_string());
            }
        }

        match redirect {
            Redirect::Read(fd, word) => {
                fd_ok(*fd)?;
                write_fd(*fd, out);
                out.push('<');
                self.word(word, out)
            }
            Redirect::Write(fd, word) => {
                fd_ok(*fd)?;
                write_fd(*fd, out);
                out.push('>');
                self.word(word, out)
            }
            Redirect::Append(fd, word) => {
                fd_ok(*fd)?;
                write_fd(*fd, out);
                out.push_str(">>");
                self.word(word, out)
            }
            Redirect::ReadWrite(_, _) => unsupported("read-write redirection"),
            Redirect::Clobber(fd, word) => {
                fd_ok(*fd)?;
                write_fd(*fd, out);
                out.push('>');
                self.word(word, out)
            }
            Redirect::DupRead(fd, word) => {
                fd_ok(*fd)?;
                if let Some(target) = word::word_as_str(word) {
                    if target == "-" {
                        return unsupported("closing a file descriptor");
                    }
                    if target.parse::<u32>().map(|n| n > 2).unwrap_or(true) {
                        return unsupported("file descriptor beyond 2");
                    }
                }
                write_fd(*fd, out);
                out.push_str("<&");
                self.word(word, out)
            }
            Redirect::DupWrite(fd, word) => {
                fd_ok(*fd)?;
                if let Some(target) = word::word_as_str(word) {
                    if target == "-" {
                        return unsupported("closing a file descriptor");
                    }
                    if target.parse::<u32>().map(|n| n > 2).unwrap_or(true) {
                        return unsupported("file descriptor beyond 2");
                    }
                }
                write_fd(*fd, out);
                out.push_str(">&");
                self.word(word, out)
            }
            Redirect::WriteBoth(word) => {
                out.push('>');
                self.word(word, out)?;
                out.push_str(" 2>&1");
                Ok(())
            }
            Redirect::AppendBoth(word) => {
                out.push_str(">>");
                self.word(word, out)?;
                out.push_str(" 2>&1");
                Ok(())
            }
            Redirect::HereString(_) | Redirect::HereDoc(_) => {
                // Handled by the callers that pipe them in front.
                Ok(())
            }
        }
    }

    /// Emit a producer command for a here-doc body (`printf ... |`).
    fn heredoc_producer(&mut self, hd: &HereDoc<'_>, out: &mut String) -> EmitResult {
        if hd.fd.map(|n| n != 0).unwrap_or(false) {
            return unsupported("here-doc on a nonzero file descriptor");
        }
        match &hd.body {
            HereDocBody::Literal(text) => {
                out.push_str("printf '%s\\n' ");
                word::push_single_quoted(out, text.strip_suffix('\n').unwrap_or(text));
                Ok(())
            }
            HereDocBody::Expanded(fragments) => {
                let mut body = String::with_capacity(128);
                for fragment in fragments {
                    match fragment {
                        Fragment::Literal(s) => {
                            for ch in s.chars() {
                                match ch {
                                    '"' => body.push_str("\\\""),
                                    '\\' => body.push_str("\\\\"),
                                    '$' => body.push_str("\\$"),
                                    _ => body.push(ch),
                                }
                            }
                        }
                        Fragment::Escaped(s) => match *s {
                            "$" => body.push('$'),
                            "\\" => body.push_str("\\\\"),
                            "`" => body.push('`'),
                            other => body.push_str(other),
                        },
                        Fragment::VarSimple(param) => {
                            word::check_untranslatable(param)?;
                            word::param_value(param, &mut body);
                        }
                        other => {
                            body.push('"');
                            self.fragment(other, &mut body)?;
                            body.push('"');
                        }
                    }
                }
                let mut text = body;
                if hd.strip_tabs {
                    text = strip_line_tabs(&text);
                }
                let trimmed = text.strip_suffix('\n').unwrap_or(&text);
                out.push_str("printf '%s\\n' \"");
                out.push_str(trimmed);
                out.push('"');
                Ok(())
            }
        }
    }
}

/// Expand `[abc]` (no ranges) into quoted alternatives for fish case.
fn expand_bracket_pattern(pattern: &str) -> Option<String> {
    if !pattern.starts_with('[') || !pattern.ends_with(']') || pattern.len() < 3 {
        return None;
    }
    let inner = &pattern[1..pattern.len() - 1];
    if inner.contains('-') || inner.contains('[') {
        return None;
    }
    let mut result = String::with_capacity(inner.len() * 4);
    for (i, ch) in inner.chars().enumerate() {
        if i > 0 {
            result.push(' ');
        }
        if ch == '\'' {
            result.push_str("'\\'''");
        } else {
            result.push('\'');
            result.push(ch);
            result.push('\'');
        }
    }
    Some(result)
}

/// Strip leading tabs at the start of each line.
fn strip_line_tabs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        out.push_str(line.trim_start_matches('\t'));
    }
    out
}

/// Would duplicating these commands duplicate side-effecting code?
fn commands_have_side_effects(commands: &[Command<'_>]) -> bool {
    fn word_has(word: &Word<'_>) -> bool {
        word.fragments.iter().any(|f| match f {
            Fragment::CommandSubst(_) | Fragment::ProcSubst(_, _) | Fragment::Backtick(_) => true,
            Fragment::DoubleQuoted(parts) => parts.iter().any(|p| {
                matches!(
                    p,
                    Fragment::CommandSubst(_) | Fragment::ProcSubst(_, _) | Fragment::Backtick(_)
                )
            }),
            _ => false,
        })
    }
    fn stage_has(stage: &Stage<'_>) -> bool {
        match stage {
            Stage::Simple(cmd) => {
                !cmd.redirects.is_empty()
                    || cmd.words.iter().any(word_has)
                    || cmd.assignments.iter().any(|a| {
                        a.value.as_ref().map(word_has).unwrap_or(false)
                            || a.array
                                .as_ref()
                                .map(|ws| ws.iter().any(word_has))
                                .unwrap_or(false)
                    })
            }
            Stage::Compound(_) | Stage::FunctionDef { .. } => true,
        }
    }
    commands.iter().any(|cmd| {
        let list = cmd.list();
        std::iter::once(&list.first)
            .chain(list.rest.iter().map(|(_, p)| p))
            .any(|p| p.stages.iter().any(stage_has))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(input: &str) -> String {
        translate(input).unwrap()
    }

    fn t_err(input: &str) -> TranslateError {
        translate(input).unwrap_err()
    }

    #[test]
    fn export_simple() {
        assert_eq!(t("export FOO=bar"), "set -gx FOO bar");
    }

    #[test]
    fn export_path_splits() {
        assert_eq!(t("export PATH=\"$PATH:/x\""), "set -gx PATH $PATH /x");
    }

    #[test]
    fn unset_variable() {
        assert_eq!(t("unset FOO"), "set -e FOO");
    }

    #[test]
    fn bare_assignment() {
        assert_eq!(t("FOO=bar"), "set FOO bar");
    }

    #[test]
    fn append_assignment() {
        assert_eq!(t("s+=more"), "set s \"$s\"more");
    }

    #[test]
    fn array_assignment() {
        assert_eq!(t("arr=(a b c)"), "set arr a b c");
        assert_eq!(t("arr+=(d)"), "set -a arr d");
    }

    #[test]
    fn array_element_assignment() {
        assert_eq!(t("arr[0]=x"), "set arr[1] x");
    }

    #[test]
    fn prefix_assignment_with_command() {
        assert_eq!(t("FOO=bar env"), "FOO=bar env");
    }

    #[test]
    fn and_or_list() {
        assert_eq!(t("true && echo yes || echo no"), "true; and echo yes; or echo no");
    }

    #[test]
    fn pipeline_translation() {
        assert_eq!(t("cat f | grep x"), "cat f | grep x");
    }

    #[test]
    fn pipe_amp() {
        assert_eq!(t("make |& tee log"), "make 2>&1 | tee log");
    }

    #[test]
    fn negated_pipeline() {
        assert_eq!(t("! grep -q x f"), "not grep -q x f");
    }

    #[test]
    fn background_job() {
        assert_eq!(t("sleep 5 &"), "sleep 5 &");
    }

    #[test]
    fn command_substitution() {
        assert_eq!(t("echo $(whoami)"), "echo (whoami)");
    }

    #[test]
    fn backtick_substitution() {
        assert_eq!(t("echo `hostname`"), "echo (hostname)");
    }

    #[test]
    fn arithmetic_expansion() {
        assert_eq!(t("echo $((2 + 3 * 4))"), "echo (math \"2 + 3 * 4\")");
    }

    #[test]
    fn for_loop() {
        assert_eq!(
            t("for i in a b c; do echo $i; done"),
            "for i in a b c\necho $i\nend"
        );
    }

    #[test]
    fn for_loop_over_subst_splits() {
        assert_eq!(
            t("for i in $(seq 3); do echo $i; done"),
            "for i in (seq 3 | string split -n ' ')\necho $i\nend"
        );
    }

    #[test]
    fn for_loop_over_var_splits() {
        assert_eq!(
            t("for w in $words; do echo $w; done"),
            "for w in (string split -n -- ' ' $words)\necho $w\nend"
        );
    }

    #[test]
    fn c_style_for() {
        assert_eq!(
            t("for ((i=0; i<3; i++)); do echo $i; done"),
            "set i (math \"0\")\nwhile test $i -lt 3\necho $i\nset i (math \"$i + 1\")\nend"
        );
    }

    #[test]
    fn if_statement() {
        assert_eq!(
            t("if true; then echo a; else echo b; fi"),
            "if true\necho a\nelse\necho b\nend"
        );
    }

    #[test]
    fn if_elif() {
        assert_eq!(
            t("if a; then echo 1; elif b; then echo 2; fi"),
            "if a\necho 1\nelse if b\necho 2\nend"
        );
    }

    #[test]
    fn while_loop() {
        assert_eq!(t("while true; do echo x; done"), "while true\necho x\nend");
    }

    #[test]
    fn until_loop() {
        assert_eq!(
            t("until test -f x; do sleep 1; done"),
            "while not test -f x\nsleep 1\nend"
        );
    }

    #[test]
    fn case_statement() {
        assert_eq!(
            t("case $x in foo) echo foo;; *) echo other;; esac"),
            "switch $x\ncase foo\necho foo\ncase '*'\necho other\nend"
        );
    }

    #[test]
    fn case_multiple_patterns() {
        assert_eq!(
            t("case $x in a|b) echo ab;; esac"),
            "switch $x\ncase a b\necho ab\nend"
        );
    }

    #[test]
    fn case_fallthrough_inlines_pure_bodies() {
        assert_eq!(
            t("case $x in a) echo a;& b) echo b;; esac"),
            "switch $x\ncase a\necho a\necho b\ncase b\necho b\nend"
        );
    }

    #[test]
    fn case_fallthrough_refuses_side_effects() {
        let err = t_err("case $x in a) echo a;& b) echo $(date);; esac");
        assert!(matches!(err, TranslateError::Emit(_)));
    }

    #[test]
    fn case_continue_unfolds() {
        let out = t("case $x in a*) echo a;;& *b) echo b;; esac");
        assert!(out.contains("set -l __marlin_case $x"));
        assert!(out.contains("string match -q -- 'a*' $__marlin_case"));
    }

    #[test]
    fn case_bracket_range_refused() {
        let err = t_err("case $x in [a-z]) echo letter;; esac");
        assert!(matches!(err, TranslateError::Emit(_)));
    }

    #[test]
    fn case_bracket_set_expands() {
        assert_eq!(
            t("case $x in [ab]) echo ok;; esac"),
            "switch $x\ncase 'a' 'b'\necho ok\nend"
        );
    }

    #[test]
    fn function_definition() {
        assert_eq!(
            t("greet() { echo hello; }"),
            "function greet\necho hello\nend"
        );
    }

    #[test]
    fn subshell_saves_pwd() {
        let out = t("(cd /tmp; pwd)");
        assert!(out.starts_with("begin\nset -l __marlin_pwd (pwd)\n"));
        assert!(out.contains("cd $__marlin_pwd"));
    }

    #[test]
    fn brace_group() {
        assert_eq!(t("{ echo a; echo b; }"), "begin\necho a\necho b\nend");
    }

    #[test]
    fn redirects() {
        assert_eq!(t("echo hi >out.txt"), "echo hi >out.txt");
        assert_eq!(t("echo hi 2>&1"), "echo hi 2>&1");
        assert_eq!(t("cmd &>log"), "cmd >log 2>&1");
        assert_eq!(t("cmd >>log 2>&1"), "cmd >>log 2>&1");
    }

    #[test]
    fn high_fd_refused() {
        let err = t_err("exec 3>&1");
        assert!(matches!(err, TranslateError::Emit(_)));
    }

    #[test]
    fn here_string() {
        assert_eq!(t("cat <<< hello"), "echo hello | cat");
    }

    #[test]
    fn heredoc_literal() {
        assert_eq!(
            t("cat <<'EOF'\nline one\nline two\nEOF"),
            "printf '%s\\n' 'line one\nline two' | cat"
        );
    }

    #[test]
    fn heredoc_expanding() {
        assert_eq!(
            t("cat <<EOF\nhome: $HOME\nEOF"),
            "printf '%s\\n' \"home: $HOME\" | cat"
        );
    }

    #[test]
    fn heredoc_strip_tabs() {
        assert_eq!(
            t("cat <<-'EOF'\n\tindented\n\tEOF"),
            "printf '%s\\n' 'indented' | cat"
        );
    }

    #[test]
    fn process_substitution() {
        assert_eq!(t("diff <(sort a) <(sort b)"), "diff (sort a | psub) (sort b | psub)");
    }

    #[test]
    fn output_process_substitution_refused() {
        let err = t_err("tee >(grep x)");
        assert!(matches!(err, TranslateError::Emit(_)));
    }

    #[test]
    fn double_bracket_file_test() {
        assert_eq!(t("[[ -f /etc/hosts ]]"), "test -f /etc/hosts");
    }

    #[test]
    fn double_bracket_pattern_match() {
        assert_eq!(t("[[ $x == foo* ]]"), "string match -q -- 'foo*' $x");
    }

    #[test]
    fn double_bracket_regex() {
        assert_eq!(
            t("[[ $x =~ ^[0-9]+$ ]]"),
            "set __bash_rematch (string match -r -- '^[0-9]+$' $x)"
        );
    }

    #[test]
    fn brace_range_expansion() {
        assert_eq!(t("echo {1..5}"), "echo (seq 1 5)");
        assert_eq!(t("echo {1..10..2}"), "echo (seq 1 2 10)");
        assert_eq!(t("echo {a..c}"), "echo a b c");
        assert_eq!(t("echo {5..1}"), "echo (seq 5 -1 1)");
    }

    #[test]
    fn brace_list_passes_through() {
        assert_eq!(t("echo {a,b,c}"), "echo {a,b,c}");
    }

    #[test]
    fn adjacent_brace_lists_refused() {
        let err = t_err("echo {a,b}{1,2}");
        assert!(matches!(err, TranslateError::Emit(_)));
    }

    #[test]
    fn param_default() {
        assert_eq!(
            t("echo ${VAR:-default}"),
            "echo (set -q VAR; and echo $VAR; or echo default)"
        );
    }

    #[test]
    fn string_length() {
        assert_eq!(t("echo ${#v}"), "echo (string length -- \"$v\")");
    }

    #[test]
    fn declare_associative_refused() {
        let err = t_err("declare -A m");
        assert!(matches!(err, TranslateError::Emit(_)));
    }

    #[test]
    fn empty_input_translates_to_empty() {
        assert_eq!(t(""), "");
    }

    #[test]
    fn parse_error_surfaces() {
        let err = t_err("echo $(");
        assert!(matches!(err, TranslateError::Parse(_)));
    }

    #[test]
    fn sequence_on_separate_lines() {
        assert_eq!(t("echo a; echo b"), "echo a\necho b");
    }

    #[test]
    fn timed_pipeline() {
        assert_eq!(t("time sleep 1"), "time sleep 1");
    }
}
