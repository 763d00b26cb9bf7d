//! Word and fragment emission.
//!
//! Every fragment is re-quoted for fish. Single-quoted spans stay
//! single-quoted (with `\` and `'` escaped, which fish treats specially
//! inside single quotes). Double-quoted spans keep variable expansion
//! but close and reopen around substitutions, which fish only expands
//! bare. Substitutions become `(...)`.

use crate::ast::types::*;
use crate::emit::{unsupported, EmitResult, Emitter};
use crate::parser::Parser;

impl Emitter {
    pub(crate) fn word(&mut self, word: &Word<'_>, out: &mut String) -> EmitResult {
        check_brace_mixing(word)?;
        for fragment in &word.fragments {
            self.fragment(fragment, out)?;
        }
        Ok(())
    }

    /// Emit a word with its outer quoting layer stripped (for patterns
    /// and other contexts that re-quote themselves).
    pub(crate) fn word_unquoted(&mut self, word: &Word<'_>, out: &mut String) -> EmitResult {
        match word.fragments.as_slice() {
            [Fragment::SingleQuoted(s)] => {
                out.push_str(s);
                Ok(())
            }
            [Fragment::DoubleQuoted(parts)] => {
                for part in parts {
                    self.fragment(part, out)?;
                }
                Ok(())
            }
            _ => self.word(word, out),
        }
    }

    pub(crate) fn fragment(&mut self, fragment: &Fragment<'_>, out: &mut String) -> EmitResult {
        match fragment {
            Fragment::Literal(s) => {
                out.push_str(s);
                Ok(())
            }
            Fragment::Escaped(s) => {
                out.push('\\');
                out.push_str(s);
                Ok(())
            }
            Fragment::SingleQuoted(s) => {
                push_single_quoted(out, s);
                Ok(())
            }
            Fragment::DoubleQuoted(parts) => self.double_quoted(parts, out),
            Fragment::VarSimple(param) => {
                check_untranslatable(param)?;
                param_value(param, out);
                Ok(())
            }
            Fragment::VarBraced(pe) => self.expansion(pe, out),
            Fragment::CommandSubst(cmds) => {
                out.push('(');
                self.command_seq(cmds, out)?;
                out.push(')');
                Ok(())
            }
            Fragment::ArithSubst(expr) => self.arith_subst(expr.as_ref(), out),
            Fragment::ProcSubst(ProcDirection::In, cmds) => {
                out.push('(');
                self.command_seq(cmds, out)?;
                out.push_str(" | psub)");
                Ok(())
            }
            Fragment::ProcSubst(ProcDirection::Out, _) => {
                unsupported("output process substitution")
            }
            Fragment::BraceExpansion(raw) => emit_brace_expansion(raw, out),
            Fragment::Tilde(user) => {
                out.push('~');
                if let Some(user) = user {
                    out.push_str(user);
                }
                Ok(())
            }
            Fragment::Backtick(raw) => {
                let script = match Parser::new(raw).map(Parser::parse) {
                    Ok(Ok(script)) => script,
                    _ => return unsupported("backtick command substitution"),
                };
                out.push('(');
                self.command_seq(&script.commands, out)?;
                out.push(')');
                Ok(())
            }
            Fragment::AnsiQuoted(raw) => {
                emit_ansi_c(raw, out);
                Ok(())
            }
        }
    }

    /// Double-quoted content. Substitution-producing fragments must sit
    /// outside the quotes, so the quoting toggles around them.
    fn double_quoted(&mut self, parts: &[Fragment<'_>], out: &mut String) -> EmitResult {
        let mut quoted = true;
        out.push('"');
        for part in parts {
            if fragment_needs_bare(part) {
                if quoted {
                    out.push('"');
                    quoted = false;
                }
            } else if !quoted {
                out.push('"');
                quoted = true;
            }
            match part {
                Fragment::Literal(s) => out.push_str(s),
                Fragment::Escaped(s) => match *s {
                    "$" => out.push_str("\\$"),
                    "\"" => out.push_str("\\\""),
                    "\\" => out.push_str("\\\\"),
                    "`" => out.push('`'),
                    other => {
                        out.push('\\');
                        out.push_str(other);
                    }
                },
                Fragment::VarSimple(param) => {
                    check_untranslatable(param)?;
                    param_value(param, out);
                }
                other => self.fragment(other, out)?,
            }
        }
        if quoted {
            out.push('"');
        }
        Ok(())
    }
}

/// Does this fragment expand to a fish command substitution, which only
/// works outside double quotes?
fn fragment_needs_bare(fragment: &Fragment<'_>) -> bool {
    match fragment {
        Fragment::CommandSubst(_)
        | Fragment::ArithSubst(_)
        | Fragment::ProcSubst(_, _)
        | Fragment::Backtick(_) => true,
        Fragment::VarSimple(param) => param_value_is_subst(param),
        Fragment::VarBraced(pe) => !matches!(
            pe.op,
            ParamOp::Plain | ParamOp::ArrayAll
        ) || param_value_is_subst(&pe.param),
        _ => false,
    }
}

fn param_value_is_subst(param: &Param<'_>) -> bool {
    matches!(
        param,
        Param::Var("RANDOM") | Param::Var("BASH_SOURCE") | Param::Pound | Param::Positional(0)
    )
}

/// Bash-only variables with no fish equivalent at all.
pub(crate) fn check_untranslatable(param: &Param<'_>) -> EmitResult {
    if let Param::Var(name) = param {
        match *name {
            "LINENO" => return unsupported("$LINENO"),
            "FUNCNAME" => return unsupported("$FUNCNAME"),
            "SECONDS" => return unsupported("$SECONDS"),
            "COMP_WORDS" | "COMP_CWORD" | "COMP_LINE" | "COMP_POINT" => {
                return unsupported("bash completion variable");
            }
            _ => {}
        }
    }
    Ok(())
}

/// The fish expression for a parameter's value.
pub(crate) fn param_value(param: &Param<'_>, out: &mut String) {
    match param {
        Param::Var("RANDOM") => out.push_str("(random)"),
        Param::Var("HOSTNAME") => out.push_str("$hostname"),
        Param::Var("BASH_SOURCE") => out.push_str("(status filename)"),
        Param::Var("PIPESTATUS") => out.push_str("$pipestatus"),
        Param::Var(name) => {
            out.push('$');
            out.push_str(name);
        }
        Param::Positional(0) => out.push_str("(status filename)"),
        Param::Positional(n) => {
            out.push_str("$argv[");
            out.push_str(&n.to_string());
            out.push(']');
        }
        Param::At | Param::Star => out.push_str("$argv"),
        Param::Pound => out.push_str("(count $argv)"),
        Param::Status => out.push_str("$status"),
        Param::Pid => out.push_str("$fish_pid"),
        Param::Bang => out.push_str("$last_pid"),
        Param::Dash => out.push_str("\"\""),
    }
}

/// The fish variable NAME for a parameter (for `set`, `set -q`, `$`).
pub(crate) fn param_name(param: &Param<'_>, out: &mut String) {
    match param {
        Param::Var("HOSTNAME") => out.push_str("hostname"),
        Param::Var("PIPESTATUS") => out.push_str("pipestatus"),
        Param::Var(name) => out.push_str(name),
        Param::Positional(n) => {
            out.push_str("argv[");
            out.push_str(&n.to_string());
            out.push(']');
        }
        Param::At | Param::Star => out.push_str("argv"),
        Param::Pound => out.push_str("ARGC"),
        Param::Status => out.push_str("status"),
        Param::Pid => out.push_str("fish_pid"),
        Param::Bang => out.push_str("last_pid"),
        Param::Dash => out.push_str("FISH_FLAGS"),
    }
}

/// Single-quote `s` for fish, escaping `\` and `'`.
pub(crate) fn push_single_quoted(out: &mut String, s: &str) {
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
}

/// Flatten a word to a plain string when it contains no expansions.
pub(crate) fn word_as_str<'a>(word: &'a Word<'a>) -> Option<std::borrow::Cow<'a, str>> {
    use std::borrow::Cow;
    match word.fragments.as_slice() {
        [Fragment::Literal(s)] | [Fragment::SingleQuoted(s)] => return Some(Cow::Borrowed(s)),
        _ => {}
    }
    let mut buf = String::with_capacity(32);
    fn flatten(fragments: &[Fragment<'_>], buf: &mut String) -> bool {
        for fragment in fragments {
            match fragment {
                Fragment::Literal(s)
                | Fragment::SingleQuoted(s)
                | Fragment::Escaped(s) => buf.push_str(s),
                Fragment::Tilde(user) => {
                    buf.push('~');
                    if let Some(user) = user {
                        buf.push_str(user);
                    }
                }
                Fragment::DoubleQuoted(parts) => {
                    if !flatten(parts, buf) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
    if flatten(&word.fragments, &mut buf) {
        Some(Cow::Owned(buf))
    } else {
        None
    }
}

/// Does this word contain an unquoted glob character?
pub(crate) fn word_has_glob(word: &Word<'_>) -> bool {
    word.fragments.iter().any(|f| match f {
        Fragment::Literal(s) => s.contains('*') || s.contains('?') || s.contains('['),
        _ => false,
    })
}

/// Refuse brace-expression combinations that fish expands in a different
/// order than bash: adjacent comma groups, and ranges concatenated with
/// dynamic fragments (bash distributes the suffix, fish does not).
fn check_brace_mixing(word: &Word<'_>) -> EmitResult {
    let braces: Vec<usize> = word
        .fragments
        .iter()
        .enumerate()
        .filter_map(|(i, f)| match f {
            Fragment::BraceExpansion(_) => Some(i),
            _ => None,
        })
        .collect();
    if braces.is_empty() {
        return Ok(());
    }
    if braces.len() > 1 {
        for pair in braces.windows(2) {
            if pair[1] == pair[0] + 1 {
                return unsupported("adjacent brace expansions");
            }
        }
    }
    let has_range = word.fragments.iter().any(|f| match f {
        Fragment::BraceExpansion(raw) => raw.contains(".."),
        _ => false,
    });
    if has_range {
        let has_dynamic = word.fragments.iter().any(|f| {
            matches!(
                f,
                Fragment::VarSimple(_)
                    | Fragment::VarBraced(_)
                    | Fragment::CommandSubst(_)
                    | Fragment::ArithSubst(_)
                    | Fragment::ProcSubst(_, _)
                    | Fragment::Backtick(_)
            ) || matches!(f, Fragment::DoubleQuoted(parts)
                    if parts.iter().any(|p| !matches!(p, Fragment::Literal(_) | Fragment::Escaped(_))))
        });
        if has_dynamic {
            return unsupported("brace range concatenated with expansion");
        }
    }
    Ok(())
}

/// `{...}` brace expression. Ranges become `seq` or inline letters;
/// comma lists pass through unchanged (fish expands them identically).
fn emit_brace_expansion(raw: &str, out: &mut String) -> EmitResult {
    let inner = &raw[1..raw.len() - 1];
    let Some((start, rest)) = split_range(inner) else {
        // Comma list.
        out.push_str(raw);
        return Ok(());
    };
    let (end, step) = match split_range(rest) {
        Some((end, step)) => (end, Some(step)),
        None => (rest, None),
    };
    if !valid_range_endpoint(start) || !valid_range_endpoint(end) {
        out.push_str(raw);
        return Ok(());
    }
    if let Some(step) = step {
        if step.parse::<i64>().is_err() {
            out.push_str(raw);
            return Ok(());
        }
        out.push_str("(seq ");
        out.push_str(start);
        out.push(' ');
        out.push_str(step);
        out.push(' ');
        out.push_str(end);
        out.push(')');
        return Ok(());
    }

    // Alphabetic range expands inline.
    let sb = start.as_bytes();
    let eb = end.as_bytes();
    if start.len() == 1 && end.len() == 1 && sb[0].is_ascii_alphabetic() && eb[0].is_ascii_alphabetic()
    {
        let (lo, hi, reversed) = if sb[0] <= eb[0] {
            (sb[0], eb[0], false)
        } else {
            (eb[0], sb[0], true)
        };
        let range: Vec<u8> = if reversed {
            (lo..=hi).rev().collect()
        } else {
            (lo..=hi).collect()
        };
        for (i, c) in range.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push(*c as char);
        }
        return Ok(());
    }

    match (start.parse::<i64>(), end.parse::<i64>()) {
        (Ok(s), Ok(e)) => {
            out.push_str("(seq ");
            out.push_str(start);
            if s > e {
                out.push_str(" -1 ");
            } else {
                out.push(' ');
            }
            out.push_str(end);
            out.push(')');
            Ok(())
        }
        _ => {
            out.push_str(raw);
            Ok(())
        }
    }
}

/// Split `a..rest` at the first `..`. Returns `None` when absent.
fn split_range(s: &str) -> Option<(&str, &str)> {
    let dots = s.find("..")?;
    if dots == 0 || dots + 2 >= s.len() {
        return None;
    }
    Some((&s[..dots], &s[dots + 2..]))
}

fn valid_range_endpoint(s: &str) -> bool {
    s.parse::<i64>().is_ok() || (s.len() == 1 && s.as_bytes()[0].is_ascii_alphabetic())
}

/// Emit `$'...'` content in fish terms: escape sequences go bare (fish
/// only interprets them outside quotes), literal text goes double-quoted.
fn emit_ansi_c(raw: &str, out: &mut String) {
    let bytes = raw.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;

    fn bare(in_quotes: &mut bool, out: &mut String) {
        if *in_quotes {
            out.push('"');
            *in_quotes = false;
        }
    }
    fn quoted(in_quotes: &mut bool, out: &mut String) {
        if !*in_quotes {
            out.push('"');
            *in_quotes = true;
        }
    }

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'n' | b't' | b'r' | b'a' | b'b' | b'e' | b'f' | b'v' => {
                    bare(&mut in_quotes, out);
                    out.push('\\');
                    out.push(bytes[i + 1] as char);
                    i += 2;
                }
                b'E' => {
                    bare(&mut in_quotes, out);
                    out.push_str("\\e");
                    i += 2;
                }
                b'x' | b'0' => {
                    bare(&mut in_quotes, out);
                    out.push('\\');
                    i += 1;
                    while i < bytes.len()
                        && (bytes[i].is_ascii_hexdigit() || bytes[i] == b'x' || bytes[i] == b'0')
                    {
                        out.push(bytes[i] as char);
                        i += 1;
                    }
                }
                b'\'' => {
                    quoted(&mut in_quotes, out);
                    out.push('\'');
                    i += 2;
                }
                b'\\' => {
                    quoted(&mut in_quotes, out);
                    out.push_str("\\\\");
                    i += 2;
                }
                other => {
                    quoted(&mut in_quotes, out);
                    out.push(other as char);
                    i += 2;
                }
            }
        } else {
            quoted(&mut in_quotes, out);
            match bytes[i] {
                b'$' => out.push_str("\\$"),
                b'"' => out.push_str("\\\""),
                other => out.push(other as char),
            }
            i += 1;
        }
    }
    if in_quotes {
        out.push('"');
    }
}

/// Emit a word as a fish regex pattern (glob to regex). `greedy` selects
/// `.*` versus `.*?` for stars.
pub(crate) fn emit_word_as_regex(
    emitter: &mut Emitter,
    word: &Word<'_>,
    greedy: bool,
    out: &mut String,
) -> EmitResult {
    fn literal_chars(s: &str, glob: bool, greedy: bool, out: &mut String) {
        for ch in s.chars() {
            match ch {
                '*' if glob => out.push_str(if greedy { ".*" } else { ".*?" }),
                '?' if glob => out.push('.'),
                '.' | '+' | '(' | ')' | '{' | '}' | '|' | '\\' | '^' | '$' => {
                    out.push('\\');
                    out.push(ch);
                }
                '*' | '?' => {
                    out.push('\\');
                    out.push(ch);
                }
                _ => out.push(ch),
            }
        }
    }
    for fragment in &word.fragments {
        match fragment {
            Fragment::Literal(s) => literal_chars(s, true, greedy, out),
            Fragment::SingleQuoted(s) | Fragment::Escaped(s) => {
                literal_chars(s, false, greedy, out)
            }
            Fragment::DoubleQuoted(parts) => {
                for part in parts {
                    match part {
                        Fragment::Literal(s) | Fragment::Escaped(s) => {
                            literal_chars(s, false, greedy, out)
                        }
                        other => emitter.fragment(other, out)?,
                    }
                }
            }
            other => emitter.fragment(other, out)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quote_escaping() {
        let mut out = String::new();
        push_single_quoted(&mut out, "it's a\\b");
        assert_eq!(out, "'it\\'s a\\\\b'");
    }

    #[test]
    fn word_as_str_flattens() {
        let w = crate::parser::word_parser::parse_word("'a'b\"c\"", 0).unwrap();
        assert_eq!(word_as_str(&w).as_deref(), Some("abc"));
    }

    #[test]
    fn word_as_str_rejects_expansions() {
        let w = crate::parser::word_parser::parse_word("a$b", 0).unwrap();
        assert!(word_as_str(&w).is_none());
    }

    #[test]
    fn brace_range_numeric() {
        let mut out = String::new();
        emit_brace_expansion("{1..5}", &mut out).unwrap();
        assert_eq!(out, "(seq 1 5)");
    }

    #[test]
    fn brace_range_reverse_alpha() {
        let mut out = String::new();
        emit_brace_expansion("{c..a}", &mut out).unwrap();
        assert_eq!(out, "c b a");
    }

    #[test]
    fn brace_list_raw() {
        let mut out = String::new();
        emit_brace_expansion("{x,y}", &mut out).unwrap();
        assert_eq!(out, "{x,y}");
    }

    #[test]
    fn ansi_c_newline() {
        let mut out = String::new();
        emit_ansi_c("a\\nb", &mut out);
        assert_eq!(out, "\"a\"\\n\"b\"");
    }

    #[test]
    fn ansi_c_escaped_quote() {
        let mut out = String::new();
        emit_ansi_c("it\\'s", &mut out);
        assert_eq!(out, "\"it's\"");
    }
}
