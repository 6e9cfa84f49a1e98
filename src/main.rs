// src/main.rs
//
// =============================================================================
// DASE_CLI: ENTRY POINT
// =============================================================================
//
// Modes:
// 1. Normal:     read JSON lines from stdin, dispatch through the Router,
//                write one JSON response line per request to stdout.
// 2. Introspect: `--describe <engine_type>` prints a single pretty-printed
//                JSON document and exits 0 on success, 1 on failure.
//
// Stdout carries only JSON response lines; every diagnostic goes to stderr
// through `log`, so a consumer reading stdout in lockstep is never
// desynchronized by an interleaved log line.

use clap::Parser;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use dase::router::Router;

#[derive(Parser)]
#[command(name = "dase_cli", version, about = "JSON command server for the DASE simulation engine family")]
struct Cli {
    /// Print a single pretty-printed capabilities document for `<engine_type>` and exit.
    #[arg(long, value_name = "ENGINE_TYPE")]
    describe: Option<String>,
}

fn main() {
    env_logger::init();
    force_binary_stdio();

    let cli = Cli::parse();

    if let Some(engine_type) = cli.describe {
        std::process::exit(run_describe(&engine_type));
    }

    run_command_loop();
}

/// One-shot `--describe <name>` mode (SS4.H, SS6).
fn run_describe(engine_type: &str) -> i32 {
    let mut router = Router::new();
    let request = json!({"command": "describe_engine", "params": {"engine_type": engine_type}});
    let response = router.handle(&request);

    match serde_json::to_string_pretty(&response) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("fatal: failed to serialize describe response: {}", e);
            return 1;
        }
    }

    if response["status"] == "success" {
        0
    } else {
        1
    }
}

/// Line-oriented stdin -> JSON -> stdout command loop (SS4.H). Blocks on
/// stdin reads; exits 0 at EOF. Never aborts on a malformed line or a
/// handler failure -- both are folded into an error envelope and the loop
/// continues.
fn run_command_loop() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut router = Router::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("fatal: failed to read stdin: {}", e);
                std::process::exit(1);
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = handle_line(&mut router, trimmed);
        if writeln!(stdout, "{}", response).is_err() || stdout.flush().is_err() {
            // The consumer went away; nothing more we can do.
            break;
        }
    }
}

fn handle_line(router: &mut Router, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return json!({
                "status": "error",
                "error": format!("JSON parse error: {}.", e),
                "error_code": "PARSE_ERROR",
            });
        }
    };

    let command = request.get("command").and_then(Value::as_str).unwrap_or("").to_string();

    match panic::catch_unwind(AssertUnwindSafe(|| router.handle(&request))) {
        Ok(response) => response,
        Err(_) => json!({
            "command": command,
            "status": "error",
            "error": "An internal error occurred while handling the request.",
            "error_code": "INTERNAL_ERROR",
        }),
    }
}

/// On Windows, stdin/stdout default to text mode, which rewrites `\n` to
/// `\r\n` and can desynchronize a line-oriented protocol; force both to
/// binary mode (SS4.H, SS6). A no-op on every other platform.
#[cfg(windows)]
fn force_binary_stdio() {
    extern "C" {
        fn _setmode(fd: i32, mode: i32) -> i32;
    }
    const STDIN_FILENO: i32 = 0;
    const STDOUT_FILENO: i32 = 1;
    const O_BINARY: i32 = 0x8000;

    unsafe {
        _setmode(STDIN_FILENO, O_BINARY);
        _setmode(STDOUT_FILENO, O_BINARY);
    }
}

#[cfg(not(windows))]
fn force_binary_stdio() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_line_is_a_parse_error() {
        let mut router = Router::new();
        let response = handle_line(&mut router, "{not json");
        assert_eq!(response["error_code"], "PARSE_ERROR");
    }

    #[test]
    fn well_formed_line_dispatches_through_the_router() {
        let mut router = Router::new();
        let response = handle_line(&mut router, r#"{"command": "get_capabilities"}"#);
        assert_eq!(response["status"], "success");
    }

    #[test]
    fn describe_unknown_engine_exits_nonzero() {
        assert_eq!(run_describe("not_a_real_engine"), 1);
    }

    #[test]
    fn describe_known_engine_exits_zero() {
        assert_eq!(run_describe("sid_ternary"), 0);
    }
}
