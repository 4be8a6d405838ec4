pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use std::fmt::Display;

use dokan_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    /// Free-form report for commands whose output is meant for a terminal.
    pub fn report(output: String) -> Self {
        Self { exit_code: 0, output }
    }

    fn from_step(command: &str, outcome: Result<String, StepFailure>) -> Self {
        match outcome {
            Ok(message) => Self::success(command, message),
            Err(failure) => {
                Self::failure(command, failure.class, failure.message, failure.exit_code)
            }
        }
    }
}

/// A failed step of a database-backed command. `class` and `exit_code` are stable so
/// deployment scripts can branch on them.
#[derive(Debug)]
struct StepFailure {
    class: &'static str,
    message: String,
    exit_code: u8,
}

impl StepFailure {
    fn new(class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { class, message: message.into(), exit_code }
    }

    fn db_connectivity(error: impl Display) -> Self {
        Self::new("db_connectivity", error.to_string(), 4)
    }

    fn migration(error: impl Display) -> Self {
        Self::new("migration", error.to_string(), 5)
    }
}

fn prepare() -> Result<(AppConfig, Runtime), StepFailure> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        StepFailure::new("config_validation", format!("configuration issue: {error}"), 2)
    })?;
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            StepFailure::new(
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;
    Ok((config, runtime))
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\
             \"error_class\":\"serialization\",\"message\":\"{}\"}}",
            payload.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
