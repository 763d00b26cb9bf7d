//! State-file persistence for exported variables.
//!
//! The state file holds `export KEY='value'` lines that bash can source
//! before the next command, so variables survive across passthrough
//! invocations. The caller owns the file's path and lifetime; this
//! module only reads and rewrites it.

use std::fs;
use std::path::Path;

use crate::env_diff;

/// Write exported variables (from `env -0` output) to the state file as
/// bash `export` statements, skipping bash internals.
///
/// # Errors
///
/// Returns [`std::io::Error`] when the file cannot be written.
pub fn save_state(path: &Path, env_data: &str) -> std::io::Result<()> {
    let mut output = String::with_capacity(env_data.len());

    for entry in env_data.split('\0') {
        let entry = entry.trim_start_matches('\n');
        if entry.is_empty() {
            continue;
        }
        let Some(eq) = entry.find('=') else { continue };
        let key = &entry[..eq];
        let value = &entry[eq + 1..];

        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            continue;
        }
        if env_diff::should_skip_var(key) {
            continue;
        }

        output.push_str("export ");
        output.push_str(key);
        output.push_str("='");
        for ch in value.chars() {
            if ch == '\'' {
                output.push_str("'\\''");
            } else {
                output.push(ch);
            }
        }
        output.push_str("'\n");
    }

    fs::write(path, output)
}

/// Bash prefix that restores the state file when it exists.
pub fn state_prefix(path: &Path) -> String {
    let p = path.display();
    format!("[ -f '{p}' ] && source '{p}'\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_read_state() {
        let path = std::env::temp_dir().join("marlin-test-state");
        save_state(&path, "FOO=bar\0MY_VAR=hello world\0").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("export FOO='bar'"));
        assert!(content.contains("export MY_VAR='hello world'"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn save_state_escapes_quotes() {
        let path = std::env::temp_dir().join("marlin-test-state-quotes");
        save_state(&path, "QUOTED=it's a test\0").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("export QUOTED='it'\\''s a test'"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn save_state_skips_bash_internals() {
        let path = std::env::temp_dir().join("marlin-test-state-skip");
        save_state(&path, "BASH_VERSION=5.2\0REAL_VAR=keep\0SHLVL=1\0").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("BASH_VERSION"));
        assert!(!content.contains("SHLVL"));
        assert!(content.contains("export REAL_VAR='keep'"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn prefix_sources_conditionally() {
        let prefix = state_prefix(Path::new("/tmp/marlin-state"));
        assert_eq!(
            prefix,
            "[ -f '/tmp/marlin-state' ] && source '/tmp/marlin-state'\n"
        );
    }
}
