//! Environment snapshot capture and diffing.
//!
//! A snapshot is the exported variables plus the working directory.
//! Diffing two snapshots produces fish statements (`set -gx`, `set -e`,
//! `cd`) that, when sourced, carry the bash side effects into the fish
//! session. Insertion order is kept so the emitted block applies
//! deterministically.

use std::borrow::Cow;

use indexmap::IndexMap;

/// Variables that belong to the bash process itself and must never be
/// copied into fish. Sorted for binary search.
const SKIP_VARS: &[&str] = &[
    "BASH",
    "BASHOPTS",
    "BASHPID",
    "BASH_ALIASES",
    "BASH_ARGC",
    "BASH_ARGV",
    "BASH_CMDS",
    "BASH_COMMAND",
    "BASH_EXECUTION_STRING",
    "BASH_LINENO",
    "BASH_LOADABLES_PATH",
    "BASH_REMATCH",
    "BASH_SOURCE",
    "BASH_SUBSHELL",
    "BASH_VERSINFO",
    "BASH_VERSION",
    "COLUMNS",
    "COMP_WORDBREAKS",
    "DIRSTACK",
    "EUID",
    "FUNCNAME",
    "GROUPS",
    "HISTCMD",
    "HISTFILE",
    "HOSTNAME",
    "HOSTTYPE",
    "IFS",
    "LINES",
    "MACHTYPE",
    "MAILCHECK",
    "OLDPWD",
    "OPTERR",
    "OPTIND",
    "OSTYPE",
    "PIPESTATUS",
    "PPID",
    "PS1",
    "PS2",
    "PS4",
    "PWD",
    "RANDOM",
    "SECONDS",
    "SHELL",
    "SHELLOPTS",
    "SHLVL",
    "UID",
    "_",
];

/// Exported variables plus working directory at one point in time.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: IndexMap<String, String>,
    cwd: String,
}

impl EnvSnapshot {
    pub fn new(vars: IndexMap<String, String>, cwd: String) -> Self {
        EnvSnapshot { vars, cwd }
    }

    /// Snapshot the current process environment.
    pub fn capture_current() -> Self {
        let vars: IndexMap<String, String> = std::env::vars()
            .filter(|(k, _)| !should_skip_var(k))
            .collect();
        let cwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        EnvSnapshot { vars, cwd }
    }

    pub fn vars(&self) -> &IndexMap<String, String> {
        &self.vars
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Append the fish statements that turn `self` into `after`.
    ///
    /// Added and changed variables first (in `after`'s order), then
    /// removals, then the directory change. PATH-like values split on
    /// `:` into fish lists.
    pub fn diff_into(&self, after: &EnvSnapshot, out: &mut String) {
        for (key, new_value) in &after.vars {
            if should_skip_var(key) {
                continue;
            }
            let changed = self.vars.get(key).map(|old| old != new_value).unwrap_or(true);
            if !changed {
                continue;
            }
            out.push_str("set -gx ");
            out.push_str(key);
            out.push(' ');
            if key.ends_with("PATH") && new_value.contains(':') {
                for (i, part) in new_value.split(':').enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(&shell_escape(part));
                }
            } else {
                out.push_str(&shell_escape(new_value));
            }
            out.push('\n');
        }

        for key in self.vars.keys() {
            if should_skip_var(key) {
                continue;
            }
            if !after.vars.contains_key(key) {
                out.push_str("set -e ");
                out.push_str(key);
                out.push('\n');
            }
        }

        if !after.cwd.is_empty() && self.cwd != after.cwd {
            out.push_str("cd ");
            out.push_str(&shell_escape(&after.cwd));
            out.push('\n');
        }
    }

    /// Convenience wrapper returning the diff as a fresh string.
    pub fn diff(&self, after: &EnvSnapshot) -> String {
        let mut out = String::new();
        self.diff_into(after, &mut out);
        out
    }
}

/// Parse `env -0` output: `NAME=value` records separated by NUL, which
/// tolerates newlines inside values.
pub fn parse_null_separated_env(data: &str) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();
    for entry in data.split('\0') {
        let entry = entry.trim_start_matches('\n');
        if entry.is_empty() {
            continue;
        }
        let Some(eq) = entry.find('=') else { continue };
        let key = &entry[..eq];
        let value = &entry[eq + 1..];
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            vars.insert(key.to_string(), value.to_string());
        }
    }
    vars
}

pub(crate) fn should_skip_var(name: &str) -> bool {
    SKIP_VARS.binary_search(&name).is_ok()
}

/// Quote a value for a fish `set` statement. Plain path-ish strings pass
/// through; everything else is single-quoted with `\` and `'` escaped,
/// which also keeps embedded newlines intact.
fn shell_escape(s: &str) -> Cow<'_, str> {
    let plain = !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'/' | b'.' | b'-' | b'_' | b':' | b'~' | b'+' | b',' | b'@' | b'=')
        });
    if plain {
        return Cow::Borrowed(s);
    }
    let mut escaped = String::with_capacity(s.len() + 2);
    escaped.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => escaped.push_str("\\'"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)], cwd: &str) -> EnvSnapshot {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSnapshot::new(vars, cwd.to_string())
    }

    #[test]
    fn skip_vars_sorted() {
        for pair in SKIP_VARS.windows(2) {
            assert!(pair[0] < pair[1], "SKIP_VARS not sorted at {:?}", pair);
        }
    }

    #[test]
    fn parse_null_env() {
        let vars = parse_null_separated_env("FOO=bar\0BAZ=qux\0MULTI=hello world\0");
        assert_eq!(vars.get("FOO").unwrap(), "bar");
        assert_eq!(vars.get("MULTI").unwrap(), "hello world");
    }

    #[test]
    fn parse_env_with_newlines_in_values() {
        let vars = parse_null_separated_env("A=line1\nline2\0B=x\0");
        assert_eq!(vars.get("A").unwrap(), "line1\nline2");
        assert_eq!(vars.get("B").unwrap(), "x");
    }

    #[test]
    fn parse_env_rejects_bad_names() {
        let vars = parse_null_separated_env("GOOD=1\0weird name=2\0=3\0");
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn diff_added_var() {
        let before = snapshot(&[], "/home");
        let after = snapshot(&[("NEW_VAR", "hello")], "/home");
        assert_eq!(before.diff(&after), "set -gx NEW_VAR hello\n");
    }

    #[test]
    fn diff_changed_var() {
        let before = snapshot(&[("V", "old")], "/home");
        let after = snapshot(&[("V", "new")], "/home");
        assert_eq!(before.diff(&after), "set -gx V new\n");
    }

    #[test]
    fn diff_unchanged_is_empty() {
        let before = snapshot(&[("V", "same")], "/home");
        let after = snapshot(&[("V", "same")], "/home");
        assert_eq!(before.diff(&after), "");
    }

    #[test]
    fn diff_removed_var() {
        let before = snapshot(&[("OLD", "gone")], "/home");
        let after = snapshot(&[], "/home");
        assert_eq!(before.diff(&after), "set -e OLD\n");
    }

    #[test]
    fn diff_changed_cwd() {
        let before = snapshot(&[], "/home");
        let after = snapshot(&[], "/tmp");
        assert_eq!(before.diff(&after), "cd /tmp\n");
    }

    #[test]
    fn diff_path_splits() {
        let before = snapshot(&[], "/");
        let after = snapshot(&[("PATH", "/usr/bin:/usr/local/bin")], "/");
        assert_eq!(before.diff(&after), "set -gx PATH /usr/bin /usr/local/bin\n");
    }

    #[test]
    fn diff_skips_bash_internals() {
        let before = snapshot(&[], "/");
        let after = snapshot(&[("BASH_VERSION", "5.2"), ("KEEP", "me")], "/");
        let out = before.diff(&after);
        assert!(!out.contains("BASH_VERSION"));
        assert!(out.contains("set -gx KEEP me"));
    }

    #[test]
    fn diff_value_with_newline_is_quoted() {
        let before = snapshot(&[], "/");
        let after = snapshot(&[("V", "a\nb")], "/");
        assert_eq!(before.diff(&after), "set -gx V 'a\nb'\n");
    }

    #[test]
    fn escape_simple_passthrough() {
        assert_eq!(shell_escape("/usr/bin"), "/usr/bin");
        assert_eq!(shell_escape("hello"), "hello");
    }

    #[test]
    fn escape_spaces_and_quotes() {
        assert_eq!(shell_escape("hello world"), "'hello world'");
        assert_eq!(shell_escape("it's"), "'it\\'s'");
        assert_eq!(shell_escape("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn capture_current_has_home() {
        let snap = EnvSnapshot::capture_current();
        assert!(snap.vars().contains_key("HOME"));
        assert!(!snap.cwd().is_empty());
    }

    #[test]
    fn diff_order_is_insertion_order() {
        let before = snapshot(&[], "/");
        let after = snapshot(&[("B", "2"), ("A", "1")], "/");
        let out = before.diff(&after);
        let b_pos = out.find("set -gx B").unwrap();
        let a_pos = out.find("set -gx A").unwrap();
        assert!(b_pos < a_pos);
    }
}
