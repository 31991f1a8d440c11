//! `tlbsync session`: one edit session over newline-delimited JSON.
//!
//! Each request line names a field and its new text:
//!
//! ```text
//! {"field":"schema","value":"_ x:# = Foo;","policy":"structured"}
//! {"field":"binary","value":"te6cckEBAQEABgAACAAAACoFpvBE"}
//! {"field":"structured","value":"{\"kind\":\"Foo\",\"x\":1}","generation":3}
//! {"field":"format","value":"hex"}
//! ```
//!
//! Every request gets exactly one response line carrying the full view. A
//! `ready` response with the initial view is written before the first read.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use tlbsync_core::{config, DataFormat, Field, ResolutionPolicy};
use tlbsync_sync::{Edit, EditSession, Outcome, SchemaRuntime, SessionView, Seed, Synchronizer};

use crate::SchemaArg;

/// Run an edit session on stdin/stdout.
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Starting schema; replaces the configured schema and payload.
    #[arg(long, short = 's', value_name = "SCHEMA")]
    pub schema: Option<SchemaArg>,

    /// Starting binary encoding: hex | base64.
    #[arg(long, short = 'f', value_name = "FORMAT")]
    pub format: Option<DataFormat>,
}

impl SessionArgs {
    pub fn run(self) -> Result<()> {
        let mut config = config::load().context("failed to load config")?;
        if let Some(schema) = &self.schema {
            config.schema = schema.read()?;
            config.binary = None;
            config.structured = None;
        }
        if let Some(format) = self.format {
            config.format = format;
        }

        let sync = Synchronizer::new(Seed::from(&config)).context("failed to start session")?;
        let mut session = EditSession::new(sync);
        let stdin = io::stdin();
        serve(&mut session, stdin.lock(), io::stdout().lock())
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestField {
    Schema,
    Binary,
    Structured,
    Format,
}

/// JSON newline-delimited request.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    pub field: RequestField,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub policy: ResolutionPolicy,
    /// Generation the client last saw; older edits are dropped.
    #[serde(default)]
    pub generation: Option<u64>,
    /// The client writing a derived value back into its own field.
    #[serde(default)]
    pub echo: bool,
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub ok: bool,
    pub outcome: &'static str,
    #[serde(flatten)]
    pub view: SessionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionResponse {
    pub fn ok(outcome: &'static str, view: SessionView) -> Self {
        Self {
            ok: true,
            outcome,
            view,
            error: None,
        }
    }

    pub fn error(outcome: &'static str, view: SessionView, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            outcome,
            view,
            error: Some(message.into()),
        }
    }
}

/// Answer requests from `reader` until end of input.
pub fn serve<R: SchemaRuntime>(
    session: &mut EditSession<R>,
    reader: impl BufRead,
    mut writer: impl Write,
) -> Result<()> {
    write_response(&mut writer, &SessionResponse::ok("ready", session.view()))?;
    for line in reader.lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle(session, &line);
        write_response(&mut writer, &response)?;
    }
    Ok(())
}

/// Apply one request line to `session`.
pub fn handle<R: SchemaRuntime>(session: &mut EditSession<R>, line: &str) -> SessionResponse {
    let request: SessionRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!("malformed session request: {err}");
            return SessionResponse::error(
                "invalid",
                session.view(),
                format!("invalid request: {err}"),
            );
        }
    };

    let field = match request.field {
        RequestField::Format => {
            return match request.value.parse::<DataFormat>() {
                Ok(format) => {
                    let outcome = session.set_format(format);
                    respond(session, outcome)
                }
                Err(err) => SessionResponse::error("invalid", session.view(), err),
            };
        }
        RequestField::Schema => Field::Schema,
        RequestField::Binary => Field::Binary,
        RequestField::Structured => Field::Structured,
    };

    let edit = if request.echo {
        Edit::echo(field, request.value)
    } else {
        Edit::user(field, request.value)
    }
    .with_policy(request.policy);

    let outcome = match request.generation {
        Some(generation) => session.apply_if_current(edit, generation),
        None => session.apply(edit),
    };
    respond(session, outcome)
}

fn respond<R: SchemaRuntime>(session: &EditSession<R>, outcome: Outcome) -> SessionResponse {
    let view = session.view();
    match outcome {
        Outcome::Applied(_) => SessionResponse::ok("applied", view),
        Outcome::Ignored => SessionResponse::ok("ignored", view),
        Outcome::Rejected(failure) => SessionResponse::error("rejected", view, failure.message),
        Outcome::Stale { current } => SessionResponse::error(
            "stale",
            view,
            format!("edit made against an older generation; current is {current}"),
        ),
    }
}

fn write_response(writer: &mut impl Write, response: &SessionResponse) -> Result<()> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .context("failed to write response")?;
    writer.write_all(b"\n").context("failed to write response")?;
    writer.flush().context("failed to flush response")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::Value;

    use super::*;

    const FOO: &str = "_ x:# = Foo;";

    fn session() -> EditSession {
        EditSession::new(Synchronizer::new(Seed::new(FOO)).expect("synchronizer"))
    }

    fn run_lines(input: &str) -> Vec<Value> {
        let mut session = session();
        let mut out = Vec::new();
        serve(&mut session, Cursor::new(input), &mut out).expect("serve");
        String::from_utf8(out)
            .expect("utf8")
            .lines()
            .map(|l| serde_json::from_str(l).expect("response json"))
            .collect()
    }

    #[test]
    fn ready_line_comes_first() {
        let responses = run_lines("");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["outcome"], "ready");
        assert_eq!(responses[0]["state"]["schema"], FOO);
        assert!(responses[0].get("error").is_none());
    }

    #[test]
    fn structured_edit_updates_binary() {
        let responses = run_lines("{\"field\":\"structured\",\"value\":\"{\\\"kind\\\":\\\"Foo\\\",\\\"x\\\":42}\"}\n");
        let last = &responses[1];
        assert_eq!(last["ok"], true);
        assert_eq!(last["state"]["binary"], "te6cckEBAQEABgAACAAAACoFpvBE");
        assert_eq!(last["generation"], 1);
    }

    #[test]
    fn failures_report_error_and_keep_going() {
        let input = "{\"field\":\"binary\",\"value\":\"!!\"}\n\nnot json\n{\"field\":\"format\",\"value\":\"octal\"}\n";
        let responses = run_lines(input);
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[1]["outcome"], "rejected");
        assert!(responses[1]["errors"]["binary"].as_str().expect("error").starts_with("Parse "));
        assert_eq!(responses[2]["outcome"], "invalid");
        assert_eq!(responses[3]["outcome"], "invalid");
    }

    #[test]
    fn echo_and_stale_requests_are_not_applied() {
        let mut s = session();
        let echo = handle(&mut s, r#"{"field":"binary","value":"zz","echo":true}"#);
        assert!(echo.ok);
        assert_eq!(echo.outcome, "ignored");

        handle(&mut s, r#"{"field":"binary","value":""}"#);
        let stale = handle(&mut s, r#"{"field":"binary","value":"zz","generation":0}"#);
        assert_eq!(stale.outcome, "stale");
        assert_eq!(stale.view.state.binary, "");
    }

    #[test]
    fn format_request_rerenders_binary() {
        let mut s = session();
        handle(&mut s, r#"{"field":"binary","value":"te6cckEBAQEABgAACAAAACoFpvBE"}"#);
        let response = handle(&mut s, r#"{"field":"format","value":"hex"}"#);
        assert_eq!(response.outcome, "applied");
        assert_eq!(response.view.state.binary, "b5ee9c724101010100060000080000002a05a6f044");
    }
}
