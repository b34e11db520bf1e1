pub mod config;
pub mod doctor;
pub mod migrate;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    checks: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            checks: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            checks: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Outcome carrying per-check details, as emitted by `doctor --json`.
    pub fn with_checks(
        command: &str,
        error_class: Option<&str>,
        message: impl Into<String>,
        checks: Value,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: if error_class.is_some() { "error" } else { "ok" }.to_string(),
            error_class: error_class.map(str::to_string),
            message: message.into(),
            checks: Some(checks),
        };
        let exit_code = if error_class.is_some() { 1 } else { 0 };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
