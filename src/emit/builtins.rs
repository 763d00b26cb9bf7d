//! Bash builtin translations.
//!
//! `export`, `unset`, `local`, `declare`, `readonly`, `read`, `trap`,
//! `shift`, `alias`, `set`, `let`, `eval`, and `mapfile` all exist as
//! fish builtins or idioms with different spellings. Builtins with no
//! sane fish rendering (`shopt`, `getopts`, fd-juggling `exec`) refuse
//! so the caller falls back to bash.

use std::borrow::Cow;

use crate::ast::types::*;
use crate::emit::word::{push_single_quoted, word_as_str};
use crate::emit::{unsupported, EmitResult, Emitter};
use crate::parser::arithmetic_parser::parse_arithmetic;

impl Emitter {
    /// Dispatch on the command name. `Some(result)` when handled.
    pub(crate) fn builtin(
        &mut self,
        name: &str,
        words: &[Word<'_>],
        redirects: &[&Redirect<'_>],
        out: &mut String,
    ) -> Option<EmitResult> {
        let args = &words[1..];
        match name {
            "export" => Some(self.export(args, out)),
            "unset" => Some(self.unset(args, out)),
            "local" => Some(self.local(args, out)),
            "declare" | "typeset" => Some(self.declare(args, out)),
            "readonly" => Some(self.readonly(args, out)),
            "read" => Some(self.read(args, redirects, out)),
            "trap" => Some(self.trap(args, out)),
            "shift" => Some(self.shift(args, out)),
            "alias" => Some(self.alias(args, out)),
            "set" => Some(self.bash_set(args, out)),
            "let" => Some(self.let_command(args, out)),
            "eval" => Some(self.eval(args, out)),
            "mapfile" | "readarray" => Some(unsupported("mapfile")),
            "printf" => self.printf_repeat(words, out),
            "shopt" => Some(unsupported("shopt")),
            "select" => Some(unsupported("select loop")),
            "getopts" => Some(unsupported("getopts")),
            "exec" if words.len() == 1 && !redirects.is_empty() => {
                Some(unsupported("exec file descriptor manipulation"))
            }
            _ => None,
        }
    }

    /// `export VAR=val` -> `set -gx VAR val`; PATH-like values split on `:`.
    fn export(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        let mut first = true;
        for arg in args {
            if word_as_str(arg).map(|s| s.starts_with('-')).unwrap_or(false) {
                continue;
            }
            if !first {
                out.push('\n');
            }
            first = false;

            if let Some((name, value)) = self.split_at_equals(arg)? {
                out.push_str("set -gx ");
                out.push_str(&name);
                if !value.is_empty() {
                    out.push(' ');
                    if name.ends_with("PATH") && value.contains(':') {
                        out.push_str(&value.replace(':', " "));
                    } else {
                        out.push_str(&value);
                    }
                }
            } else if let Some(name) = word_as_str(arg) {
                // `export VAR` re-exports the current value.
                out.push_str("set -gx ");
                out.push_str(&name);
                out.push_str(" $");
                out.push_str(&name);
            } else {
                out.push_str("set -gx ");
                self.word(arg, out)?;
            }
        }
        Ok(())
    }

    /// Split `NAME=value` (already fish-rendered) at the first `=`,
    /// stripping one surrounding quote layer from the value.
    fn split_at_equals(&mut self, word: &Word<'_>) -> Result<Option<(String, String)>, crate::emit::EmitError> {
        let mut rendered = String::with_capacity(64);
        self.word(word, &mut rendered)?;
        let Some(eq) = rendered.find('=') else {
            return Ok(None);
        };
        let name = rendered[..eq].to_string();
        let mut value = rendered[eq + 1..].to_string();
        if value.len() >= 2 {
            let stripped = (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''));
            if stripped {
                value.pop();
                value.remove(0);
            }
        }
        Ok(Some((name, value)))
    }

    /// `unset VAR` -> `set -e VAR`; array elements shift to 1-based.
    fn unset(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        let mut first = true;
        for arg in args {
            let text = word_as_str(arg);
            if matches!(text.as_deref(), Some(f) if f.starts_with('-')) {
                continue;
            }
            if !first {
                out.push('\n');
            }
            first = false;

            if let Some(text) = &text {
                if let Some((name, index)) = split_subscript(text) {
                    if let Ok(n) = index.parse::<i64>() {
                        out.push_str("set -e ");
                        out.push_str(name);
                        out.push('[');
                        out.push_str(&(n + 1).to_string());
                        out.push(']');
                        continue;
                    }
                }
            }
            out.push_str("set -e ");
            self.word(arg, out)?;
        }
        Ok(())
    }

    /// `local VAR=val` -> `set -l VAR val`
    fn local(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        let mut first = true;
        for arg in args {
            if word_as_str(arg).map(|s| s.starts_with('-')).unwrap_or(false) {
                continue;
            }
            if !first {
                out.push('\n');
            }
            first = false;
            out.push_str("set -l ");
            match self.split_at_equals(arg)? {
                Some((name, value)) => {
                    out.push_str(&name);
                    if !value.is_empty() {
                        out.push(' ');
                        out.push_str(&value);
                    }
                }
                None => self.word(arg, out)?,
            }
        }
        Ok(())
    }

    /// `declare [-x|-g] VAR=val` -> `set` with matching scope flags.
    fn declare(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        let mut scope = "-g";
        let mut print_mode = false;
        let mut names = Vec::new();

        for arg in args {
            match word_as_str(arg).as_deref() {
                Some("-n") => return unsupported("declare -n nameref"),
                Some("-A") | Some("-Ag") | Some("-gA") => {
                    return unsupported("declare -A associative array")
                }
                Some("-p") => print_mode = true,
                Some("-x") => scope = "-gx",
                Some("-g") => scope = "-g",
                Some(flag) if flag.starts_with('-') => {}
                _ => names.push(arg),
            }
        }

        if print_mode {
            if names.is_empty() {
                out.push_str("set --show");
                return Ok(());
            }
            for (i, arg) in names.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str("set --show ");
                self.word(arg, out)?;
            }
            return Ok(());
        }

        for (i, arg) in names.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str("set ");
            out.push_str(scope);
            out.push(' ');
            match self.split_at_equals(arg)? {
                Some((name, value)) => {
                    out.push_str(&name);
                    if !value.is_empty() {
                        out.push(' ');
                        out.push_str(&value);
                    }
                }
                None => self.word(arg, out)?,
            }
        }
        Ok(())
    }

    /// `readonly VAR=val` -> `set -g VAR val` (fish has no const vars).
    fn readonly(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        let mut first = true;
        for arg in args {
            if word_as_str(arg).map(|s| s.starts_with('-')).unwrap_or(false) {
                continue;
            }
            if !first {
                out.push('\n');
            }
            first = false;
            out.push_str("set -g ");
            match self.split_at_equals(arg)? {
                Some((name, value)) => {
                    out.push_str(&name);
                    if value.is_empty() {
                        out.push_str(" $");
                        out.push_str(&name);
                    } else {
                        out.push(' ');
                        out.push_str(&value);
                    }
                }
                None => self.word(arg, out)?,
            }
        }
        Ok(())
    }

    /// `read` flag mapping: `-p` -> `-P`, `-a` -> `--list`, `-r` drops
    /// (fish reads raw by default).
    fn read(
        &mut self,
        args: &[Word<'_>],
        redirects: &[&Redirect<'_>],
        out: &mut String,
    ) -> EmitResult {
        out.push_str("read");
        let mut prompt_next = false;
        for arg in args {
            if prompt_next {
                prompt_next = false;
                out.push_str(" -P ");
                self.word(arg, out)?;
                continue;
            }
            if let Some(text) = word_as_str(arg) {
                let bytes = text.as_bytes();
                if bytes.first() == Some(&b'-') && bytes.len() > 1 && bytes[1] != b'-' {
                    let mut wrote_dash = false;
                    for &b in &bytes[1..] {
                        match b {
                            b'r' => {}
                            b'a' => out.push_str(" --list"),
                            b'p' => prompt_next = true,
                            other => {
                                if !wrote_dash {
                                    out.push_str(" -");
                                    wrote_dash = true;
                                }
                                out.push(other as char);
                            }
                        }
                    }
                    continue;
                }
            }
            out.push(' ');
            self.word(arg, out)?;
        }
        for redirect in redirects {
            out.push(' ');
            self.redirect(redirect, out)?;
        }
        Ok(())
    }

    /// `trap 'handler' EXIT` -> a fish exit-event function. Anything
    /// beyond an EXIT trap with a translatable body refuses.
    fn trap(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        if args.is_empty() {
            return unsupported("bare trap");
        }
        let handler = word_as_str(&args[0]);

        let is_exit = |signal: &str| {
            let name = signal.strip_prefix("SIG").unwrap_or(signal);
            name == "EXIT" || name == "0"
        };

        // `trap - EXIT` removes the handler.
        if handler.as_deref() == Some("-") {
            let [sig_word] = &args[1..] else {
                return unsupported("trap beyond EXIT");
            };
            let Some(signal) = word_as_str(sig_word) else {
                return unsupported("trap with dynamic signal");
            };
            if !is_exit(&signal) {
                return unsupported("trap beyond EXIT");
            }
            out.push_str("functions -e __marlin_trap_EXIT");
            return Ok(());
        }

        let [sig_word] = &args[1..] else {
            return unsupported("trap beyond EXIT");
        };
        let Some(signal) = word_as_str(sig_word) else {
            return unsupported("trap with dynamic signal");
        };
        if !is_exit(&signal) {
            return unsupported("trap beyond EXIT");
        }
        if self.in_subshell {
            // fish's begin/end has no exit event of its own.
            return unsupported("trap EXIT in subshell");
        }

        let fish_body = match &handler {
            Some(h) if h.is_empty() => String::new(),
            Some(h) => match crate::emit::translate(h) {
                Ok(body) => body,
                Err(_) => return unsupported("trap handler"),
            },
            None => return unsupported("trap with dynamic handler"),
        };

        out.push_str("function __marlin_trap_EXIT --on-event fish_exit");
        if fish_body.is_empty() {
            out.push_str("; end");
        } else {
            out.push('\n');
            out.push_str(&fish_body);
            out.push_str("\nend");
        }
        Ok(())
    }

    /// `shift` -> `set -e argv[1]`; `shift N` drops the first N.
    fn shift(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        let Some(first) = args.first() else {
            out.push_str("set -e argv[1]");
            return Ok(());
        };
        if let Some(text) = word_as_str(first) {
            if let Ok(n) = text.parse::<u32>() {
                if n <= 1 {
                    out.push_str("set -e argv[1]");
                } else {
                    out.push_str("set argv $argv[");
                    out.push_str(&(n + 1).to_string());
                    out.push_str("..]");
                }
                return Ok(());
            }
        }
        out.push_str("set argv $argv[(math \"");
        self.word(first, out)?;
        out.push_str(" + 1\")..]");
        Ok(())
    }

    /// `alias name='value'` -> `alias name 'value'`
    fn alias(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        out.push_str("alias");
        for arg in args {
            out.push(' ');
            if let Some(text) = word_as_str(arg) {
                if let Some(eq) = text.find('=') {
                    let name = &text[..eq];
                    let value = &text[eq + 1..];
                    out.push_str(name);
                    out.push(' ');
                    push_single_quoted(out, value);
                    continue;
                }
            }
            self.word(arg, out)?;
        }
        Ok(())
    }

    /// Bash `set` forms: `set --` rewrites argv; option flags have no
    /// fish equivalent and become a comment no-op.
    fn bash_set(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        if args.is_empty() {
            out.push_str("set");
            return Ok(());
        }
        if let Some(first) = word_as_str(&args[0]) {
            if first == "--" {
                out.push_str("set argv");
                for arg in &args[1..] {
                    out.push(' ');
                    self.word(arg, out)?;
                }
                return Ok(());
            }
            let bytes = first.as_bytes();
            if bytes.len() >= 2
                && matches!(bytes[0], b'-' | b'+')
                && bytes[1..].iter().all(|b| matches!(b, b'e' | b'u' | b'x' | b'o'))
            {
                out.push_str("# set");
                for arg in args {
                    out.push(' ');
                    self.word(arg, out)?;
                }
                out.push_str(" # no fish equivalent");
                return Ok(());
            }
        }
        out.push_str("set");
        for arg in args {
            out.push(' ');
            self.word(arg, out)?;
        }
        Ok(())
    }

    /// `let expr` re-parses each argument as arithmetic.
    fn let_command(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let text: Cow<'_, str> = match word_as_str(arg) {
                Some(text) => text,
                None => {
                    let mut buf = String::with_capacity(32);
                    self.word_unquoted(arg, &mut buf)?;
                    Cow::Owned(buf)
                }
            };
            match parse_arithmetic(&text, 0) {
                Ok(expr) => crate::emit::arith::standalone(self, &expr, out)?,
                Err(_) => return unsupported("let with a complex expression"),
            }
        }
        Ok(())
    }

    /// `eval "$(cmd)"` -> `cmd | source`; other forms refuse.
    fn eval(&mut self, args: &[Word<'_>], out: &mut String) -> EmitResult {
        let [arg] = args else {
            return unsupported("eval");
        };
        let commands = match arg.fragments.as_slice() {
            [Fragment::CommandSubst(cmds)] => cmds,
            [Fragment::DoubleQuoted(parts)] => match parts.as_slice() {
                [Fragment::CommandSubst(cmds)] => cmds,
                _ => return unsupported("eval"),
            },
            _ => return unsupported("eval"),
        };
        self.command_seq(commands, out)?;
        out.push_str(" | source");
        Ok(())
    }

    /// `printf '%0.sX' {1..N}` is the bash idiom for repeating a
    /// character; fish has `string repeat`.
    fn printf_repeat(&mut self, words: &[Word<'_>], out: &mut String) -> Option<EmitResult> {
        let args = &words[1..];
        if args.len() >= 2 {
            if let Some(format) = word_as_str(&args[0]) {
                if let Some(ch) = repeat_format_char(&format) {
                    if let Some(count) = brace_range_count(&args[1]) {
                        out.push_str("string repeat -n ");
                        out.push_str(&count.to_string());
                        out.push_str(" -- ");
                        let mut s = String::new();
                        s.push(ch);
                        push_single_quoted(out, &s);
                        return Some(Ok(()));
                    }
                }
            }
        }
        // A zero-width %s format outside the repeat idiom has no fish
        // printf equivalent.
        for arg in args {
            if let Some(text) = word_as_str(arg) {
                if text.contains("%0.s") || text.contains("%.0s") {
                    return Some(unsupported("printf zero-width %s format"));
                }
            }
        }
        None
    }

}

fn split_subscript(text: &str) -> Option<(&str, &str)> {
    let open = text.find('[')?;
    if !text.ends_with(']') {
        return None;
    }
    let name = &text[..open];
    let index = &text[open + 1..text.len() - 1];
    if name.is_empty() || index.is_empty() {
        return None;
    }
    Some((name, index))
}

/// `%0.sX` / `%.0sX`: returns the repeated character.
fn repeat_format_char(format: &str) -> Option<char> {
    let rest = format.strip_prefix('%')?;
    let s_pos = rest.find('s')?;
    let before = &rest[..s_pos];
    if before.contains('0') && (before.contains('.') || before == "0") {
        rest[s_pos + 1..].chars().next()
    } else {
        None
    }
}

/// The element count of a `{a..b[..step]}` word.
fn brace_range_count(word: &Word<'_>) -> Option<i64> {
    let [Fragment::BraceExpansion(raw)] = word.fragments.as_slice() else {
        return None;
    };
    let inner = &raw[1..raw.len() - 1];
    let dots = inner.find("..")?;
    let start: i64 = inner[..dots].parse().ok()?;
    let rest = &inner[dots + 2..];
    let (end, step) = match rest.find("..") {
        Some(d2) => (
            rest[..d2].parse::<i64>().ok()?,
            rest[d2 + 2..].parse::<i64>().ok()?,
        ),
        None => (rest.parse::<i64>().ok()?, 1),
    };
    if step == 0 {
        return None;
    }
    Some(((end - start).abs() / step.abs()) + 1)
}

#[cfg(test)]
mod tests {
    use crate::emit::translate;

    fn t(input: &str) -> String {
        translate(input).unwrap()
    }

    #[test]
    fn export_plain() {
        assert_eq!(t("export EDITOR=vim"), "set -gx EDITOR vim");
    }

    #[test]
    fn export_multiple() {
        assert_eq!(t("export A=1 B=2"), "set -gx A 1\nset -gx B 2");
    }

    #[test]
    fn export_existing() {
        assert_eq!(t("export FOO"), "set -gx FOO $FOO");
    }

    #[test]
    fn export_path() {
        assert_eq!(
            t("export PATH=$HOME/bin:$PATH"),
            "set -gx PATH $HOME/bin $PATH"
        );
    }

    #[test]
    fn unset_plain() {
        assert_eq!(t("unset A B"), "set -e A\nset -e B");
    }

    #[test]
    fn unset_array_element() {
        assert_eq!(t("unset 'arr[0]'"), "set -e arr[1]");
    }

    #[test]
    fn local_with_value() {
        assert_eq!(t("local x=5"), "set -l x 5");
    }

    #[test]
    fn declare_export() {
        assert_eq!(t("declare -x FOO=bar"), "set -gx FOO bar");
    }

    #[test]
    fn declare_print() {
        assert_eq!(t("declare -p FOO"), "set --show FOO");
    }

    #[test]
    fn declare_nameref_refused() {
        assert!(translate("declare -n ref=target").is_err());
    }

    #[test]
    fn readonly_value() {
        assert_eq!(t("readonly MAX=10"), "set -g MAX 10");
    }

    #[test]
    fn read_flags() {
        assert_eq!(t("read -r line"), "read line");
        assert_eq!(t("read -ra parts"), "read --list parts");
        assert_eq!(t("read -p 'Name: ' name"), "read -P 'Name: ' name");
    }

    #[test]
    fn trap_exit() {
        assert_eq!(
            t("trap 'echo done' EXIT"),
            "function __marlin_trap_EXIT --on-event fish_exit\necho done\nend"
        );
    }

    #[test]
    fn trap_exit_remove() {
        assert_eq!(t("trap - EXIT"), "functions -e __marlin_trap_EXIT");
    }

    #[test]
    fn trap_beyond_exit_refused() {
        assert!(translate("trap 'echo bye' INT").is_err());
        assert!(translate("trap 'echo e' ERR").is_err());
        assert!(translate("trap - INT").is_err());
    }

    #[test]
    fn shift_forms() {
        assert_eq!(t("shift"), "set -e argv[1]");
        assert_eq!(t("shift 2"), "set argv $argv[3..]");
    }

    #[test]
    fn alias_translation() {
        assert_eq!(t("alias ll='ls -l'"), "alias ll 'ls -l'");
    }

    #[test]
    fn set_options_are_noop() {
        assert_eq!(t("set -e"), "# set -e # no fish equivalent");
        assert_eq!(t("set -euo"), "# set -euo # no fish equivalent");
    }

    #[test]
    fn set_positional() {
        assert_eq!(t("set -- a b"), "set argv a b");
    }

    #[test]
    fn let_arithmetic() {
        assert_eq!(t("let x=5"), "set x (math \"5\")");
        assert_eq!(t("let x+=1"), "set x (math \"$x + (1)\")");
    }

    #[test]
    fn eval_command_subst() {
        assert_eq!(t("eval \"$(direnv hook bash)\""), "direnv hook bash | source");
    }

    #[test]
    fn eval_other_refused() {
        assert!(translate("eval $cmd").is_err());
    }

    #[test]
    fn mapfile_refused() {
        assert!(translate("mapfile -t lines < <(ls)").is_err());
        assert!(translate("readarray rows").is_err());
    }

    #[test]
    fn printf_repeat() {
        assert_eq!(t("printf '%0.s-' {1..40}"), "string repeat -n 40 -- '-'");
    }

    #[test]
    fn printf_zero_width_refused() {
        assert!(translate("printf '%0.s-' $n").is_err());
    }

    #[test]
    fn shopt_refused() {
        assert!(translate("shopt -s globstar").is_err());
    }

    #[test]
    fn exec_fd_refused() {
        assert!(translate("exec 2>/dev/null").is_err());
    }
}
