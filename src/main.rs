//! marlin CLI entry point.
//!
//! Exit codes: 0 success, 1 detection/translation failure or a failing
//! bash command, 2 internal error, 127 bash missing. Diagnostics go to
//! stderr; stdout carries only translated source or env-delta output.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use marlin::passthrough::{self, ExecError};

#[derive(Parser)]
#[command(name = "marlin")]
#[command(about = "Bash compatibility layer for the fish shell")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Exit 0 if the input contains bash-specific syntax.
    Detect {
        /// Only run the O(n) scan; skip the parser-backed check.
        #[arg(long)]
        quick: bool,
        /// The input, after `--`.
        #[arg(last = true)]
        input: Vec<String>,
    },
    /// Print the fish translation of the input.
    Translate {
        #[arg(last = true)]
        input: Vec<String>,
    },
    /// Run the input under bash, optionally emitting the env delta.
    #[command(name = "bash-exec")]
    BashExec {
        /// Print the environment delta as fish statements after the
        /// command's own output.
        #[arg(long = "env-diff")]
        env_diff: bool,
        /// Persist exported variables across invocations in this file
        /// (implies the env delta).
        #[arg(long = "state-file", value_name = "PATH")]
        state_file: Option<PathBuf>,
        #[arg(last = true)]
        input: Vec<String>,
    },
    /// Manage the persistent bash coprocess.
    Daemon {
        #[command(subcommand)]
        action: DaemonCmd,
    },
}

#[derive(Subcommand)]
enum DaemonCmd {
    /// Start the daemon for the given socket path.
    Start {
        #[arg(long)]
        socket: String,
    },
    /// Stop the daemon.
    Stop {
        #[arg(long)]
        socket: String,
    },
    /// Report whether the daemon is running.
    Status {
        #[arg(long)]
        socket: String,
    },
    /// Run a command through the daemon.
    Exec {
        #[arg(long)]
        socket: String,
        #[arg(last = true)]
        input: Vec<String>,
    },
    /// Internal: the daemon server loop.
    #[command(name = "_serve", hide = true)]
    Serve {
        #[arg(long)]
        socket: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Cmd::Detect { quick, input } => {
            let input = input.join(" ");
            let is_bash = if quick {
                marlin::detect::looks_like_bash(&input)
            } else {
                marlin::detect::detect(&input)
            };
            process::exit(if is_bash { 0 } else { 1 });
        }

        Cmd::Translate { input } => {
            let input = input.join(" ");
            match marlin::translate(&input) {
                Ok(fish_source) => print!("{fish_source}"),
                Err(e) => {
                    eprintln!("marlin: translation failed: {e}");
                    process::exit(1);
                }
            }
        }

        Cmd::BashExec { env_diff, state_file, input } => {
            let input = input.join(" ");
            let result = if let Some(path) = state_file {
                passthrough::bash_exec_with_state(&input, &path)
            } else if env_diff {
                passthrough::bash_exec_env_diff(&input)
            } else {
                passthrough::bash_exec(&input)
            };
            match result {
                Ok(code) => process::exit(code),
                Err(ExecError::BashMissing) => {
                    eprintln!("marlin: bash not found");
                    process::exit(127);
                }
                Err(e) => {
                    eprintln!("marlin: {e}");
                    process::exit(2);
                }
            }
        }

        Cmd::Daemon { action } => match action {
            DaemonCmd::Start { socket } => marlin::daemon::start(&socket),
            DaemonCmd::Stop { socket } => marlin::daemon::stop(&socket),
            DaemonCmd::Status { socket } => {
                if marlin::daemon::status(&socket) {
                    println!("marlin daemon: running");
                } else {
                    println!("marlin daemon: not running");
                    process::exit(1);
                }
            }
            DaemonCmd::Exec { socket, input } => {
                let input = input.join(" ");
                process::exit(marlin::daemon::exec(&socket, &input));
            }
            DaemonCmd::Serve { socket } => marlin::daemon::serve(&socket),
        },
    }
}
