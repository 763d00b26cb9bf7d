//! Persistent bash coprocess over a Unix domain socket.
//!
//! `start` spawns a detached server (`marlin daemon _serve`) that owns a
//! long-lived bash process. `exec` sends one command and reads back the
//! streamed output, the env delta, and the exit code. The protocol is a
//! 4-byte little-endian length prefix on requests and sentinel-framed
//! responses; NUL bytes in the sentinels avoid collisions with output.
//!
//! The server drains bash's stdout on a dedicated reader thread and
//! hands lines to the accept loop over a channel, so a command that
//! never prints a trailing newline cannot wedge the socket loop.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::{fs, process, thread};

use crate::env_diff::{self, EnvSnapshot};

const ENV_SENTINEL: &str = "\0__MARLIN_DAEMON_ENV__\0";
const CWD_SENTINEL: &str = "\0__MARLIN_DAEMON_CWD__\0";
const EXIT_SENTINEL: &str = "\0__MARLIN_DAEMON_EXIT__\0";
const DONE_SENTINEL: &str = "\0__MARLIN_DAEMON_DONE__\0";

const SHUTDOWN_CMD: &str = "__MARLIN_SHUTDOWN__";
const PING_CMD: &str = "__MARLIN_PING__";
const PONG_RESPONSE: &[u8] = b"__MARLIN_PONG__\n";

/// Requests larger than this are rejected outright.
const MAX_CMD_LEN: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Send a command to the daemon; print its output (stderr) and env delta
/// (stdout). Returns the command's exit code.
pub fn exec(socket_path: &str, command: &str) -> i32 {
    let mut stream = match UnixStream::connect(socket_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("marlin daemon: failed to connect: {e}");
            eprintln!("marlin daemon: is the daemon running? try: marlin daemon start --socket {socket_path}");
            return 1;
        }
    };

    let before = EnvSnapshot::capture_current();

    if send_request(&mut stream, command.as_bytes()).is_err() {
        eprintln!("marlin daemon: failed to send command");
        return 1;
    }

    let mut response = Vec::with_capacity(4096);
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                eprintln!("marlin daemon: read error: {e}");
                return 1;
            }
        };
        response.extend_from_slice(&buf[..n]);
        if contains_sentinel(&response, DONE_SENTINEL) {
            break;
        }
    }

    print_response(&before, &response)
}

/// Ask the daemon to shut down and remove the socket.
pub fn stop(socket_path: &str) {
    if let Ok(mut stream) = UnixStream::connect(socket_path) {
        let _ = send_request(&mut stream, SHUTDOWN_CMD.as_bytes());
    }
    let _ = fs::remove_file(socket_path);
}

/// Is the daemon alive behind this socket?
pub fn status(socket_path: &str) -> bool {
    let Ok(mut stream) = UnixStream::connect(socket_path) else {
        return false;
    };
    if send_request(&mut stream, PING_CMD.as_bytes()).is_err() {
        return false;
    }
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(n) => &buf[..n] == PONG_RESPONSE,
        Err(_) => false,
    }
}

fn send_request(stream: &mut UnixStream, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(payload)?;
    stream.flush()
}

/// Split the response into output, env data, cwd, and exit code; print
/// the first to stderr and the diff to stdout.
fn print_response(before: &EnvSnapshot, response: &[u8]) -> i32 {
    let data = String::from_utf8_lossy(response);

    let Some(env_pos) = data.find(ENV_SENTINEL) else {
        let _ = io::stderr().write_all(response);
        return 1;
    };
    let after_env = &data[env_pos + ENV_SENTINEL.len()..];
    let Some(cwd_pos) = after_env.find(CWD_SENTINEL) else {
        return 1;
    };
    let env_section = &after_env[..cwd_pos];
    let after_cwd = &after_env[cwd_pos + CWD_SENTINEL.len()..];
    let Some(exit_pos) = after_cwd.find(EXIT_SENTINEL) else {
        return 1;
    };
    let cwd_section = after_cwd[..exit_pos].trim();
    let after_exit = &after_cwd[exit_pos + EXIT_SENTINEL.len()..];
    let done_pos = after_exit.find(DONE_SENTINEL).unwrap_or(after_exit.len());
    let exit_code: i32 = after_exit[..done_pos]
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse()
        .unwrap_or(1);

    // 127 means bash did not know the command; stay quiet so the shell
    // integration can retry it as a fish command.
    if exit_code == 127 {
        return 127;
    }

    let output = &response[..env_pos];
    if !output.is_empty() {
        let _ = io::stderr().write_all(output);
    }

    let after = EnvSnapshot::new(
        env_diff::parse_null_separated_env(env_section),
        cwd_section.to_string(),
    );
    let mut delta = String::new();
    before.diff_into(&after, &mut delta);
    if !delta.is_empty() {
        let _ = io::stdout().lock().write_all(delta.as_bytes());
    }

    exit_code
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Spawn the detached server process and wait for its socket.
pub fn start(socket_path: &str) {
    let _ = fs::remove_file(socket_path);

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("marlin daemon: failed to find executable: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = Command::new(exe)
        .args(["daemon", "_serve", "--socket", socket_path])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
    {
        eprintln!("marlin daemon: failed to spawn: {e}");
        process::exit(1);
    }

    for _ in 0..50 {
        if std::path::Path::new(socket_path).exists() {
            return;
        }
        thread::sleep(std::time::Duration::from_millis(10));
    }
    eprintln!("marlin daemon: timed out waiting for socket");
}

/// The server loop: one bash coprocess, one connection at a time.
/// Internal; reached via `marlin daemon _serve`.
pub fn serve(socket_path: &str) {
    let listener = match UnixListener::bind(socket_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("marlin daemon: failed to bind socket: {e}");
            return;
        }
    };

    let mut bash = match Command::new("bash")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            eprintln!("marlin daemon: failed to spawn bash: {e}");
            let _ = fs::remove_file(socket_path);
            return;
        }
    };

    let bash_stdin = bash.stdin.take().expect("stdin was piped");
    let bash_stdout = bash.stdout.take().expect("stdout was piped");
    let mut writer = io::BufWriter::new(bash_stdin);

    // Reader thread: drain bash stdout line-wise into a channel. The
    // accept loop blocks on the channel, never on the pipe itself.
    let (line_tx, line_rx) = mpsc::channel::<Vec<u8>>();
    let reader_handle = thread::spawn(move || {
        let mut reader = BufReader::new(bash_stdout);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });

    for stream in listener.incoming() {
        let Ok(mut stream) = stream else { continue };

        let Some(command) = read_request(&mut stream) else {
            continue;
        };
        let command = String::from_utf8_lossy(&command).into_owned();

        if command == SHUTDOWN_CMD {
            let _ = bash.kill();
            let _ = bash.wait();
            let _ = fs::remove_file(socket_path);
            drop(line_rx);
            let _ = reader_handle.join();
            return;
        }
        if command == PING_CMD {
            let _ = stream.write_all(PONG_RESPONSE);
            continue;
        }

        let script = build_daemon_script(&command);
        if writeln!(writer, "{script}").is_err() || writer.flush().is_err() {
            let _ = stream.write_all(b"marlin daemon: bash process died\n");
            let _ = bash.kill();
            let _ = fs::remove_file(socket_path);
            drop(line_rx);
            let _ = reader_handle.join();
            return;
        }

        let mut response = Vec::with_capacity(4096);
        let mut bash_alive = true;
        loop {
            match line_rx.recv() {
                Ok(line) => {
                    response.extend_from_slice(&line);
                    if contains_sentinel(&response, DONE_SENTINEL) {
                        break;
                    }
                }
                Err(_) => {
                    bash_alive = false;
                    break;
                }
            }
        }

        let _ = stream.write_all(&response);

        if !bash_alive || bash.try_wait().ok().flatten().is_some() {
            let _ = fs::remove_file(socket_path);
            let _ = reader_handle.join();
            return;
        }
    }
}

/// Read one length-prefixed request. `None` on malformed or oversized
/// input.
fn read_request(stream: &mut UnixStream) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).ok()?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_CMD_LEN {
        return None;
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).ok()?;
    Some(payload)
}

/// The script block the server feeds to bash for one command: eval with
/// output on stderr, then the sentinel-framed env dump and exit code.
fn build_daemon_script(command: &str) -> String {
    let mut escaped = String::with_capacity(command.len() + 2);
    escaped.push('\'');
    for ch in command.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');

    let mut script = String::with_capacity(escaped.len() + 256);
    script.push_str("eval ");
    script.push_str(&escaped);
    script.push_str(" >&2\n");
    script.push_str("__marlin_exit=$?\n");
    script.push_str("printf '\\0__MARLIN_DAEMON_ENV__\\0'\n");
    script.push_str("env -0\n");
    script.push_str("printf '\\0__MARLIN_DAEMON_CWD__\\0'\n");
    script.push_str("pwd\n");
    script.push_str(
        "printf '\\0__MARLIN_DAEMON_EXIT__\\0%d\\0__MARLIN_DAEMON_DONE__\\0\\n' $__marlin_exit\n",
    );
    script
}

fn contains_sentinel(data: &[u8], sentinel: &str) -> bool {
    let needle = sentinel.as_bytes();
    data.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn sentinel_detection() {
        let data = b"hello\0__MARLIN_DAEMON_DONE__\0\n";
        assert!(contains_sentinel(data, DONE_SENTINEL));
        assert!(!contains_sentinel(b"hello world\n", DONE_SENTINEL));
    }

    #[test]
    fn daemon_script_shape() {
        let script = build_daemon_script("echo hello");
        assert!(script.contains("eval 'echo hello'"));
        assert!(script.contains("__marlin_exit=$?"));
        assert!(script.contains("env -0"));
        assert!(script.contains("pwd"));
    }

    #[test]
    fn daemon_script_escapes_quotes() {
        let script = build_daemon_script("echo 'it'\"s\"");
        assert!(script.contains("'\\''"));
    }

    #[test]
    fn response_parsing_extracts_exit_code() {
        let before = EnvSnapshot::new(IndexMap::new(), "/home".to_string());

        let mut response = Vec::new();
        response.extend_from_slice(b"output text");
        response.extend_from_slice(ENV_SENTINEL.as_bytes());
        response.extend_from_slice(b"MY_VAR=hello\0");
        response.extend_from_slice(CWD_SENTINEL.as_bytes());
        response.extend_from_slice(b"/tmp\n");
        response.extend_from_slice(EXIT_SENTINEL.as_bytes());
        response.extend_from_slice(b"42");
        response.extend_from_slice(DONE_SENTINEL.as_bytes());

        assert_eq!(print_response(&before, &response), 42);
    }

    #[test]
    fn response_without_sentinels_fails() {
        let before = EnvSnapshot::new(IndexMap::new(), "/".to_string());
        assert_eq!(print_response(&before, b"garbage"), 1);
    }

    #[test]
    fn status_on_missing_socket_is_false() {
        assert!(!status("/tmp/marlin-daemon-test-nonexistent.sock"));
    }
}
