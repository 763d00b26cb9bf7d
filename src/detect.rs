//! Fast detection of bash-specific syntax.
//!
//! [`looks_like_bash`] runs on every Enter keypress in the shell
//! integration, so it must finish in well under a millisecond: one pass
//! over the bytes, no regex, no allocation. False negatives are fine
//! (the caller still tries the parser); false positives cost a wasted
//! translation attempt.
//!
//! Syntax that fish itself accepts must NOT trigger: `$(cmd)` (fish
//! 3.4+), `&&`/`||` (3.0+), `VAR=value cmd` prefix assignments (3.1+),
//! fd 0/1/2 redirections, and `{a,b}` brace lists.

use crate::ast::types::*;

/// Does this input contain bash-specific syntax?
pub fn looks_like_bash(input: &str) -> bool {
    let bytes = input.as_bytes();
    let len = bytes.len();

    // One pass over the bytes. Cheap two-byte triggers return
    // immediately; ambient flags gate the slower whole-string checks
    // below so plain fish commands exit without them.
    let mut seen_separator = false;
    let mut seen_eq = false;
    let mut seen_paren = false;
    let mut seen_brace = false;
    let mut in_dquote = false;
    let mut i = 0;
    while i < len {
        let b = bytes[i];
        let next = if i + 1 < len { bytes[i + 1] } else { 0 };
        match b {
            b'\\' if in_dquote => {
                i += 2;
                continue;
            }
            b'"' => {
                in_dquote = !in_dquote;
                i += 1;
                continue;
            }
            // Everything inside single quotes is literal; skip the span.
            // Inside double quotes a ' is just a character.
            b'\'' if !in_dquote => {
                if i > 0 && bytes[i - 1] == b'$' {
                    return true; // $'...' ANSI-C quoting
                }
                i += 1;
                while i < len && bytes[i] != b'\'' {
                    i += 1;
                }
            }
            b'`' => return true,
            b'$' => match next {
                b'{' | b'$' | b'#' | b'?' | b'!' | b'0'..=b'9' | b'@' | b'*' => return true,
                // $( is fish command substitution; $(( is bash arithmetic.
                b'(' if i + 2 < len && bytes[i + 2] == b'(' => return true,
                _ => {}
            },
            b'<' if matches!(next, b'<' | b'(') => return true,
            b'>' if next == b'(' => return true,
            b'[' if next == b'[' => return true,
            b'(' if next == b'(' && (i == 0 || bytes[i - 1] != b'$') => return true,
            b'(' => seen_paren = true,
            b'=' => seen_eq = true,
            b'{' => seen_brace = true,
            b' ' | b'\t' | b'\n' | b';' => seen_separator = true,
            _ => {}
        }
        i += 1;
    }

    // NAME=, NAME+=, NAME[i]=, NAME(), bare ( subshell, { brace group.
    if (seen_eq || seen_paren || seen_brace) && starts_bash_command(bytes) {
        return true;
    }

    if references_bash_variable(bytes) {
        return true;
    }

    if has_high_fd_redirect(bytes) {
        return true;
    }

    if seen_separator && has_keyword_indicator(bytes) {
        return true;
    }

    if seen_brace && has_brace_range(bytes) {
        return true;
    }

    false
}

/// Full detection: the quick scan, then (for inputs it misses) a parse
/// that looks for bash-only constructs in the AST.
pub fn detect(input: &str) -> bool {
    if looks_like_bash(input) {
        return true;
    }
    match crate::parser::parse(input) {
        Ok(script) => script_is_bash_only(&script),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Byte-scan helpers
// ---------------------------------------------------------------------------

#[inline]
fn is_separator(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b';' | b'\n' | b'|' | b'&')
}

/// Builtin names and control-flow fragments that fish lacks, scanned
/// outside single-quoted spans.
fn has_keyword_indicator(bytes: &[u8]) -> bool {
    // Substring needles carry enough context to avoid false positives.
    const NEEDLES: &[&[u8]] = &[
        b"export ", b"unset ", b"declare ", b"typeset ", b"readonly ", b"local ",
        b" do ", b";do ", b"do\n", b"do;",
        b"shopt ", b"read -p", b"read -r", b"for ((", b"trap ", b"eval ",
        b"select ", b"getopts ",
    ];
    // Keywords that also occur inside ordinary words ("file", "done!")
    // need word boundaries on both sides.
    const BOUNDARY_KEYWORDS: &[&[u8]] = &[b"fi", b"esac", b"let"];

    let len = bytes.len();
    let mut i = 0;
    while i < len {
        match bytes[i] {
            b'\'' => {
                i += 1;
                while i < len && bytes[i] != b'\'' {
                    i += 1;
                }
                i += 1;
                continue;
            }
            b'\\' => {
                i += 2;
                continue;
            }
            _ => {}
        }
        for needle in NEEDLES {
            if bytes[i..].starts_with(needle) {
                return true;
            }
        }
        for kw in BOUNDARY_KEYWORDS {
            if bytes[i..].starts_with(kw) {
                let pre = i == 0 || is_separator(bytes[i - 1]);
                let end = i + kw.len();
                let post = end == len || is_separator(bytes[end]) || bytes[end] == b')';
                if pre && post {
                    return true;
                }
            }
        }
        i += 1;
    }
    false
}

/// Bash-only variables (`$RANDOM`, `$SECONDS`, ...), with a boundary
/// check so `$RANDOM_SEED` does not match. Single-quoted spans skipped.
fn references_bash_variable(bytes: &[u8]) -> bool {
    const BASH_VARS: &[&[u8]] = &[
        b"BASH_VERSION", b"BASH_REMATCH", b"BASH_SOURCE",
        b"RANDOM", b"SECONDS", b"LINENO", b"FUNCNAME",
        b"SHELLOPTS", b"BASHOPTS", b"PIPESTATUS",
    ];
    let len = bytes.len();
    let mut i = 0;
    while i < len {
        match bytes[i] {
            b'\'' => {
                i += 1;
                while i < len && bytes[i] != b'\'' {
                    i += 1;
                }
            }
            b'$' => {
                let start = i + 1;
                for var in BASH_VARS {
                    let end = start + var.len();
                    if end <= len && &bytes[start..end] == *var {
                        let bounded = end == len
                            || (!bytes[end].is_ascii_alphanumeric() && bytes[end] != b'_');
                        if bounded {
                            return true;
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Redirections on fd 3 and up (`3>&1`, `5>/dev/null`). Fish handles
/// 0, 1, and 2 natively.
fn has_high_fd_redirect(bytes: &[u8]) -> bool {
    let len = bytes.len();
    let mut i = 0;
    while i < len {
        match bytes[i] {
            b'\'' => {
                i += 1;
                while i < len && bytes[i] != b'\'' {
                    i += 1;
                }
                i += 1;
            }
            b'"' => {
                i += 1;
                while i < len && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'0'..=b'9' => {
                let start = i;
                while i < len && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i < len && matches!(bytes[i], b'>' | b'<') {
                    let at_word_start = start == 0 || is_separator(bytes[start - 1]);
                    if at_word_start && !matches!(&bytes[start..i], b"0" | b"1" | b"2") {
                        return true;
                    }
                }
            }
            _ => i += 1,
        }
    }
    false
}

/// Brace ranges like `{1..5}` or `{a..z}`, outside quotes.
fn has_brace_range(bytes: &[u8]) -> bool {
    let len = bytes.len();
    let mut i = 0;
    while i < len {
        match bytes[i] {
            b'\'' => {
                i += 1;
                while i < len && bytes[i] != b'\'' {
                    i += 1;
                }
            }
            b'"' => {
                i += 1;
                while i < len && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'{' => {
                let start = i + 1;
                let mut j = start;
                while j < len && bytes[j] != b'}' {
                    j += 1;
                }
                if j < len {
                    let inner = &bytes[start..j];
                    if let Some(dots) = inner.windows(2).position(|w| w == b"..") {
                        if dots > 0 && dots + 2 < inner.len() {
                            return true;
                        }
                    }
                }
                i = j;
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Given `NAME=` at `eq`, skip the (possibly quoted) value. Returns the
/// position of the next token if one follows — a prefix assignment,
/// which is valid fish — or `None` for a bare assignment.
fn skip_assignment_value(bytes: &[u8], eq: usize) -> Option<usize> {
    let len = bytes.len();
    let mut j = eq + 1;
    while j < len && !matches!(bytes[j], b' ' | b'\t' | b'\n' | b';' | b'|' | b'&') {
        match bytes[j] {
            b'\'' => {
                j += 1;
                while j < len && bytes[j] != b'\'' {
                    j += 1;
                }
                if j < len {
                    j += 1;
                }
            }
            b'"' => {
                j += 1;
                while j < len && bytes[j] != b'"' {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                if j < len {
                    j += 1;
                }
            }
            _ => j += 1,
        }
    }
    while j < len && matches!(bytes[j], b' ' | b'\t') {
        j += 1;
    }
    if j >= len || matches!(bytes[j], b'\n' | b';' | b'|' | b'&') {
        None
    } else {
        Some(j)
    }
}

/// Command-position scan for `NAME=` (bare), `NAME+=`, `NAME[i]=`,
/// `NAME()`, `(` subshells, and `{ ` brace groups. A tiny state machine:
/// 0 = before the first word, 1 = inside it, 2 = past it.
fn starts_bash_command(bytes: &[u8]) -> bool {
    let len = bytes.len();
    let mut state: u8 = 0;
    let mut i = 0;
    while i < len {
        match bytes[i] {
            b'\'' => {
                state = 2;
                i += 1;
                while i < len && bytes[i] != b'\'' {
                    i += 1;
                }
            }
            b'"' => {
                state = 2;
                i += 1;
                while i < len && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b';' | b'\n' | b'|' | b'&' => state = 0,
            b' ' | b'\t' if state == 0 => {}
            b' ' | b'\t' => state = 2,
            b'(' if state == 0 => return true, // subshell at command start
            // `{ ` with a space is a brace group; fish brace expansion
            // has no space after the brace.
            b'{' if state == 0 && i + 1 < len && matches!(bytes[i + 1], b' ' | b'\t' | b'\n') => {
                return true;
            }
            b'(' if state == 1 => return true, // NAME( function definition
            b'=' if state == 1 => match skip_assignment_value(bytes, i) {
                None => return true, // bare NAME=value
                Some(next) => {
                    i = next;
                    state = 0;
                    continue;
                }
            },
            _ if state == 0 => {
                state = if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' { 1 } else { 2 };
            }
            _ if state == 1 => {
                if bytes[i] == b'+' && i + 1 < len && bytes[i + 1] == b'=' {
                    return true; // NAME+=
                }
                if bytes[i] == b'[' {
                    let mut j = i + 1;
                    while j < len && bytes[j] != b']' {
                        j += 1;
                    }
                    if j + 1 < len && bytes[j + 1] == b'=' {
                        return true; // NAME[i]=
                    }
                    if j + 2 < len && bytes[j + 1] == b'+' && bytes[j + 2] == b'=' {
                        return true; // NAME[i]+=
                    }
                }
                if !bytes[i].is_ascii_alphanumeric() && bytes[i] != b'_' {
                    state = 2;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

// ---------------------------------------------------------------------------
// AST-based detection (the slow path of `detect`)
// ---------------------------------------------------------------------------

fn script_is_bash_only(script: &Script<'_>) -> bool {
    script.commands.iter().any(command_is_bash_only)
}

fn command_is_bash_only(cmd: &Command<'_>) -> bool {
    let list = cmd.list();
    std::iter::once(&list.first)
        .chain(list.rest.iter().map(|(_, p)| p))
        .any(pipeline_is_bash_only)
}

fn pipeline_is_bash_only(p: &Pipeline<'_>) -> bool {
    p.stages.iter().any(|stage| match stage {
        // All compound commands and function definitions use bash grammar.
        Stage::Compound(_) | Stage::FunctionDef { .. } => true,
        Stage::Simple(cmd) => {
            !cmd.assignments.is_empty()
                || cmd.redirects.iter().any(redirect_is_bash_only)
                || cmd.words.iter().any(word_is_bash_only)
        }
    })
}

fn redirect_is_bash_only(r: &Redirect<'_>) -> bool {
    matches!(
        r,
        Redirect::HereDoc(_)
            | Redirect::HereString(_)
            | Redirect::WriteBoth(_)
            | Redirect::AppendBoth(_)
            | Redirect::ReadWrite(_, _)
            | Redirect::Clobber(_, _)
    )
}

fn word_is_bash_only(w: &Word<'_>) -> bool {
    w.fragments.iter().any(fragment_is_bash_only)
}

fn fragment_is_bash_only(f: &Fragment<'_>) -> bool {
    match f {
        Fragment::VarBraced(_)
        | Fragment::ArithSubst(_)
        | Fragment::ProcSubst(_, _)
        | Fragment::Backtick(_)
        | Fragment::AnsiQuoted(_) => true,
        Fragment::VarSimple(param) => !matches!(param, Param::Var(_)),
        Fragment::BraceExpansion(raw) => raw.contains(".."),
        Fragment::DoubleQuoted(parts) => parts.iter().any(fragment_is_bash_only),
        Fragment::CommandSubst(_)
        | Fragment::Literal(_)
        | Fragment::Escaped(_)
        | Fragment::SingleQuoted(_)
        | Fragment::Tilde(_) => false,
    }
}
