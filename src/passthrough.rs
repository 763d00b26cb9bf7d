//! Bash passthrough execution with environment diffing.
//!
//! Runs the input under `bash -c`, streaming the command's own output,
//! then captures the post-state (`env -0` plus `pwd`) behind
//! NUL-delimited sentinels on the same stdout pipe. The before/after
//! diff is printed as fish statements for the caller to source.

use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use thiserror::Error;

use crate::env_diff::{self, EnvSnapshot};
use crate::state;

/// Sentinels separating command output from the env dump. The NUL bytes
/// cannot collide with ordinary text output.
const ENV_SENTINEL: &str = "\0__MARLIN_ENV__\0";
const CWD_SENTINEL: &str = "\0__MARLIN_CWD__\0";

/// Passthrough failure modes.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("bash not found")]
    BashMissing,
    #[error("failed to spawn bash: {0}")]
    Spawn(io::Error),
    #[error("i/o error: {0}")]
    Io(io::Error),
}

/// Run the input under bash with inherited stdio. No environment
/// capture. Returns the child's exit code (128+signal when killed).
pub fn bash_exec(command: &str) -> Result<i32, ExecError> {
    let mut child = spawn_bash(command, Stdio::inherit())?;
    let status = child.wait().map_err(ExecError::Io)?;
    Ok(exit_code(&status))
}

/// Run the input under bash, stream its stdout/stderr, then print the
/// environment delta as fish statements on stdout.
pub fn bash_exec_env_diff(command: &str) -> Result<i32, ExecError> {
    let before = EnvSnapshot::capture_current();
    let script = wrap_with_env_dump(command, None);
    run_and_diff(&script, &before, None)
}

/// Like [`bash_exec_env_diff`], but seeds the environment from the state
/// file first and rewrites it with the post-state afterwards.
pub fn bash_exec_with_state(command: &str, state_path: &Path) -> Result<i32, ExecError> {
    let before = EnvSnapshot::capture_current();
    let script = wrap_with_env_dump(command, Some(state_path));
    run_and_diff(&script, &before, Some(state_path))
}

fn spawn_bash(script: &str, stdout: Stdio) -> Result<Child, ExecError> {
    Command::new("bash")
        .args(["-c", script])
        .stdin(Stdio::inherit())
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ExecError::BashMissing
            } else {
                ExecError::Spawn(e)
            }
        })
}

fn run_and_diff(
    script: &str,
    before: &EnvSnapshot,
    state_path: Option<&Path>,
) -> Result<i32, ExecError> {
    let mut child = spawn_bash(script, Stdio::piped())?;
    let stdout = child.stdout.take().expect("stdout was piped");
    let tail = stream_until_sentinel(stdout).map_err(ExecError::Io)?;
    let status = child.wait().map_err(ExecError::Io)?;

    let data = String::from_utf8_lossy(&tail);
    if let Some(cwd_pos) = data.find(CWD_SENTINEL) {
        let env_section = &data[..cwd_pos];
        let cwd_section = data[cwd_pos + CWD_SENTINEL.len()..].trim();
        if let Some(path) = state_path {
            let _ = state::save_state(path, env_section);
        }
        let after = EnvSnapshot::new(
            env_diff::parse_null_separated_env(env_section),
            cwd_section.to_string(),
        );
        let mut delta = String::new();
        before.diff_into(&after, &mut delta);
        if !delta.is_empty() {
            let mut out = io::stdout().lock();
            let _ = out.write_all(delta.as_bytes());
            let _ = out.flush();
        }
    }

    Ok(exit_code(&status))
}

/// Forward the child's stdout to ours until the env sentinel appears;
/// return everything after it. Streams as bytes arrive so long-running
/// commands stay interactive.
fn stream_until_sentinel(mut stdout: impl Read) -> io::Result<Vec<u8>> {
    let sentinel = ENV_SENTINEL.as_bytes();
    let mut pending: Vec<u8> = Vec::with_capacity(8192);
    let mut tail: Vec<u8> = Vec::new();
    let mut found = false;
    let mut buf = [0u8; 8192];
    let out = io::stdout();

    loop {
        let n = match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if found {
            tail.extend_from_slice(&buf[..n]);
            continue;
        }
        pending.extend_from_slice(&buf[..n]);
        if let Some(pos) = find_subslice(&pending, sentinel) {
            let mut lock = out.lock();
            lock.write_all(&pending[..pos])?;
            lock.flush()?;
            tail.extend_from_slice(&pending[pos + sentinel.len()..]);
            pending.clear();
            found = true;
        } else if pending.len() > sentinel.len() {
            // Flush everything that can no longer be a sentinel prefix.
            let safe = pending.len() - sentinel.len();
            let mut lock = out.lock();
            lock.write_all(&pending[..safe])?;
            lock.flush()?;
            pending.drain(..safe);
        }
    }

    if !found && !pending.is_empty() {
        // The sentinel never appeared (bash died early); pass through.
        let mut lock = out.lock();
        lock.write_all(&pending)?;
        lock.flush()?;
    }
    Ok(tail)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Build the bash script: eval the user's command, remember its exit
/// code, dump the environment behind sentinels, and exit with the
/// command's code. With a state path, source the saved state first.
fn wrap_with_env_dump(command: &str, state_path: Option<&Path>) -> String {
    let escaped = quote_for_eval(command);
    let mut script = String::with_capacity(escaped.len() + 160);
    if let Some(path) = state_path {
        script.push_str(&state::state_prefix(path));
    }
    script.push_str("eval ");
    script.push_str(&escaped);
    script.push('\n');
    script.push_str("__marlin_exit=$?\n");
    script.push_str("printf '\\0__MARLIN_ENV__\\0'\n");
    script.push_str("env -0\n");
    script.push_str("printf '\\0__MARLIN_CWD__\\0'\n");
    script.push_str("pwd\n");
    script.push_str("exit $__marlin_exit");
    script
}

/// Single-quote the command for embedding in `eval '...'`.
fn quote_for_eval(command: &str) -> String {
    let mut quoted = String::with_capacity(command.len() + 2);
    quoted.push('\'');
    for ch in command.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| status.signal().map_or(1, |sig| 128 + sig))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_simple() {
        assert_eq!(quote_for_eval("echo hello"), "'echo hello'");
    }

    #[test]
    fn quote_with_single_quotes() {
        assert_eq!(quote_for_eval("echo 'it'\"s\""), "'echo '\\''it'\\''\"s\"'");
    }

    #[test]
    fn sentinels_use_nul_bytes() {
        assert!(ENV_SENTINEL.contains('\0'));
        assert!(CWD_SENTINEL.contains('\0'));
    }

    #[test]
    fn wrapped_script_shape() {
        let script = wrap_with_env_dump("echo hi", None);
        assert!(script.starts_with("eval 'echo hi'"));
        assert!(script.contains("env -0"));
        assert!(script.contains("exit $__marlin_exit"));
    }

    #[test]
    fn wrapped_script_sources_state() {
        let script = wrap_with_env_dump("true", Some(Path::new("/tmp/s")));
        assert!(script.starts_with("[ -f '/tmp/s' ] && source '/tmp/s'\n"));
    }

    #[test]
    fn find_subslice_across_content() {
        assert_eq!(find_subslice(b"abcde", b"cd"), Some(2));
        assert_eq!(find_subslice(b"abcde", b"xy"), None);
    }

    #[test]
    fn exec_exit_code_zero() {
        assert_eq!(bash_exec("true").unwrap(), 0);
    }

    #[test]
    fn exec_preserves_exit_code() {
        assert_eq!(bash_exec("exit 42").unwrap(), 42);
    }

    #[test]
    fn env_diff_runs() {
        let code = bash_exec_env_diff("export __MARLIN_TEST_VAR=abc").unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn env_diff_failed_command_keeps_code() {
        let code = bash_exec_env_diff("export X=1; false").unwrap();
        assert_eq!(code, 1);
    }
}
