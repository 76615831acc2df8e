//! Raw line-delimited JSON-RPC handshake for auth verification.
//!
//! Speaks exactly one `initialize` exchange over the agent's stdio. No
//! protocol SDK is involved: requests are built and responses parsed as raw
//! JSON so vendor `_meta` extension fields pass through byte-for-byte.
//!
//! Anything on the agent's stdout that is not a well-formed JSON line is a
//! protocol violation, not a transport error — per the wire contract,
//! diagnostics belong on stderr and stdout carries protocol messages only.

use crate::auth::{self, AuthMethod};
use crate::process::{self, ensure_executable};
use crate::resolve::LaunchPlan;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Protocol version sent in the initialize request.
const PROTOCOL_VERSION: u64 = 1;
const CLIENT_NAME: &str = "ACP Registry Verifier";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result of one auth handshake attempt.
#[derive(Debug)]
pub struct AuthCheckResult {
    pub success: bool,
    pub auth_methods: Vec<AuthMethod>,
    pub error: Option<String>,
}

impl AuthCheckResult {
    fn failure(error: String) -> Self {
        AuthCheckResult {
            success: false,
            auth_methods: Vec::new(),
            error: Some(error),
        }
    }
}

/// What the reader thread produced for the first stdout line.
enum FirstLine {
    Line(String),
    Eof,
}

/// Spawn the agent, send `initialize`, and wait for one response line.
///
/// `auth_home` becomes the child's HOME unless the plan's overlay sets its
/// own; the child always runs with `TERM=dumb`. The spawned process is
/// terminated (gracefully, then forcibly) on every path out.
pub fn check_auth(plan: &LaunchPlan, auth_home: &Path, timeout: Duration) -> AuthCheckResult {
    ensure_executable(&plan.command);

    let mut command = Command::new(&plan.command);
    command
        .args(&plan.args)
        .current_dir(&plan.cwd)
        .env("TERM", "dumb")
        .env("HOME", auth_home)
        .envs(&plan.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            return AuthCheckResult::failure(format!(
                "Error during auth check: failed to launch {}: {err}",
                plan.command.display()
            ));
        }
    };

    let result = drive_handshake(&mut child, timeout);
    process::terminate(&mut child);
    result
}

fn drive_handshake(child: &mut std::process::Child, timeout: Duration) -> AuthCheckResult {
    let Some(stdout) = child.stdout.take() else {
        return AuthCheckResult::failure("Error during auth check: stdout not captured".into());
    };
    let Some(mut stdin) = child.stdin.take() else {
        return AuthCheckResult::failure("Error during auth check: stdin not captured".into());
    };
    // stderr must stay drained: an agent that fills the pipe with diagnostics
    // before responding would otherwise block on the write.
    if let Some(mut stderr) = child.stderr.take() {
        thread::spawn(move || {
            let _ = std::io::copy(&mut stderr, &mut std::io::sink());
        });
    }

    // The reader blocks on the pipe and hands the first line over a channel;
    // recv_timeout below is the event-driven bounded wait.
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let message = match reader.read_line(&mut line) {
            Ok(0) | Err(_) => FirstLine::Eof,
            Ok(_) => FirstLine::Line(line),
        };
        let _ = sender.send(message);
    });

    let request = initialize_request();
    if let Err(err) = writeln!(stdin, "{request}").and_then(|()| stdin.flush()) {
        return AuthCheckResult::failure(format!(
            "Error during auth check: failed to write initialize request: {err}"
        ));
    }

    let line = match receiver.recv_timeout(timeout) {
        Ok(FirstLine::Line(line)) => line,
        // EOF before any line is indistinguishable from a silent agent from
        // the protocol's point of view: no initialize response arrived.
        Ok(FirstLine::Eof) | Err(mpsc::RecvTimeoutError::Timeout | mpsc::RecvTimeoutError::Disconnected) => {
            return AuthCheckResult::failure(format!(
                "Timeout after {}s waiting for initialize response",
                timeout.as_secs()
            ));
        }
    };

    let response: Value = match serde_json::from_str(line.trim_end()) {
        Ok(value) => value,
        Err(_) => {
            return AuthCheckResult::failure(protocol_violation_message(&line));
        }
    };

    if let Some(error) = response.get("error") {
        return AuthCheckResult::failure(format!("Agent error: {error}"));
    }

    let empty = Vec::new();
    let raw_methods = response
        .get("result")
        .and_then(|result| result.get("authMethods"))
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let auth_methods = auth::parse_auth_methods(raw_methods);
    for method in &auth_methods {
        tracing::debug!(
            id = %method.id,
            name = %method.name,
            kind = %method.kind,
            description = method.description.as_deref().unwrap_or(""),
            "auth method advertised"
        );
    }
    match auth::validate_auth_methods(&auth_methods) {
        Ok(_) => AuthCheckResult {
            success: true,
            auth_methods,
            error: None,
        },
        Err(message) => AuthCheckResult {
            success: false,
            auth_methods,
            error: Some(message),
        },
    }
}

fn initialize_request() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION,
            },
            "clientCapabilities": {
                "terminal": true,
                "fs": {
                    "readTextFile": true,
                    "writeTextFile": true,
                },
                "_meta": {
                    "terminal_output": true,
                    "terminal-auth": true,
                },
            },
        },
    })
    .to_string()
}

fn protocol_violation_message(line: &str) -> String {
    format!(
        "ACP spec violation: agent wrote non-JSON to stdout: {:?}. \
         Agents must not write anything to stdout that is not a valid ACP message; \
         diagnostic output should go to stderr.",
        line.trim_end()
    )
}
