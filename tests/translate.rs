//! End-to-end behavior across detection, translation, and passthrough.

use marlin::emit::TranslateError;
use marlin::{looks_like_bash, translate};

#[test]
fn export_translates_to_global_export() {
    assert_eq!(translate("export FOO=bar").unwrap(), "set -gx FOO bar");
}

#[test]
fn loop_over_command_substitution() {
    let out = translate("for i in $(seq 3); do echo $i; done").unwrap();
    assert_eq!(out, "for i in (seq 3 | string split -n ' ')\necho $i\nend");
}

#[test]
fn default_expansion_uses_set_query() {
    let out = translate("echo ${VAR:-default}").unwrap();
    assert_eq!(out, "echo (set -q VAR; and echo $VAR; or echo default)");
}

#[test]
fn arithmetic_goes_through_math() {
    assert_eq!(
        translate("echo $((2 + 3 * 4))").unwrap(),
        "echo (math \"2 + 3 * 4\")"
    );
}

#[test]
fn associative_arrays_are_refused() {
    let err = translate("declare -A m=([k]=v); echo ${m[k]}").unwrap_err();
    assert!(matches!(err, TranslateError::Emit(_) | TranslateError::Parse(_)));
}

#[test]
fn empty_input_round_trip() {
    assert!(!looks_like_bash(""));
    assert_eq!(translate("").unwrap(), "");
}

#[test]
fn quoted_keywords_do_not_detect() {
    assert!(!looks_like_bash("echo 'if then fi done'"));
}

#[test]
fn detection_implies_bash_construct() {
    // Anything the detector flags should either translate or be valid
    // bash that the emitter refuses; it must never be plain fish.
    for input in [
        "export A=1",
        "if true; then echo x; fi",
        "echo ${HOME:-/tmp}",
        "echo $((1+1))",
        "[[ -n $x ]]",
        "cat <<EOF\nhi\nEOF",
    ] {
        assert!(looks_like_bash(input), "{input}");
    }
}

#[test]
fn plain_fish_commands_pass_through_detection() {
    for input in ["echo hello", "ls -la", "set -gx PATH /usr/bin $PATH", "echo (date)"] {
        assert!(!looks_like_bash(input), "{input}");
    }
}

#[test]
fn translation_failure_has_no_partial_output() {
    // Unsupported constructs return an error, not partial source.
    assert!(translate("declare -A m").is_err());
    assert!(translate("echo $(").is_err());
}

#[test]
fn conditional_chain_end_to_end() {
    let out = translate("[[ -f /etc/hosts && -n $USER ]] && echo ok").unwrap();
    assert_eq!(
        out,
        "test -f /etc/hosts; and test -n \"$USER\"; and echo ok"
    );
}

#[test]
fn heredoc_feeds_command_via_pipe() {
    let out = translate("cat <<EOF\nhello $USER\nEOF").unwrap();
    assert_eq!(out, "printf '%s\\n' \"hello $USER\" | cat");
}

#[test]
fn case_with_globs_quotes_patterns() {
    let out = translate("case $f in *.txt) echo text;; *) echo other;; esac").unwrap();
    assert_eq!(
        out,
        "switch $f\ncase '*.txt'\necho text\ncase '*'\necho other\nend"
    );
}

#[test]
fn function_and_call_sequence() {
    let out = translate("greet() { echo \"hi $1\"; }; greet world").unwrap();
    assert_eq!(out, "function greet\necho \"hi $argv[1]\"\nend\ngreet world");
}

#[test]
fn cd_and_export_sequence() {
    let out = translate("cd /tmp && export MYTMP=$(pwd)").unwrap();
    assert_eq!(out, "cd /tmp; and set -gx MYTMP (pwd)");
}

mod passthrough {
    use marlin::env_diff::{parse_null_separated_env, EnvSnapshot};
    use marlin::passthrough::bash_exec;

    #[test]
    fn exit_codes_propagate() {
        assert_eq!(bash_exec("exit 7").unwrap(), 7);
        assert_eq!(bash_exec("true").unwrap(), 0);
    }

    #[test]
    fn delta_script_reconstructs_post_state() {
        // Sourcing the delta in the pre-state environment must yield the
        // post-state, restricted to exported variables and cwd.
        let before = EnvSnapshot::new(
            parse_null_separated_env("KEEP=1\0CHANGE=old\0DROP=x\0"),
            "/home".into(),
        );
        let after = EnvSnapshot::new(
            parse_null_separated_env("KEEP=1\0CHANGE=new\0ADDED=fresh\0"),
            "/tmp".into(),
        );
        let delta = before.diff(&after);
        assert!(delta.contains("set -gx CHANGE new"));
        assert!(delta.contains("set -gx ADDED fresh"));
        assert!(delta.lines().any(|l| l == "set -e DROP"));
        assert!(delta.lines().any(|l| l == "cd /tmp"));
        assert!(!delta.contains("KEEP"));
    }
}
