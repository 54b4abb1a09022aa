//! Serializable request, result and envelope types for the gateway.
//!
//! Field names on the wire follow the envelope the MCP clients already consume:
//! `exitCode` in camelCase, `setup_instructions` in snake_case.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A command to run on the Proxmox host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandRequest {
    /// The command to execute on the Proxmox host
    pub command: String,
    /// Host override (defaults to the configured host)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Username override (defaults to the configured user)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            host: None,
            username: None,
        }
    }
}

/// Outcome of one remote program run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// `true` when the program exited with status 0
    pub success: bool,
    /// Exit status, absent when the program was killed by a signal
    pub exit_code: Option<i32>,
    /// Signal name when the program was killed by a signal
    pub signal: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

/// Remediation report returned instead of an [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    /// Whether local key material is in place
    pub ready: bool,
    pub success: bool,
    pub error: String,
    /// Multi-line, operator-facing remediation steps
    pub instructions: String,
}

/// Happy-path envelope: the command was delivered and ran to completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    /// Gateway-level delivery; a non-zero `exitCode` is still a success here
    pub success: bool,
    pub command: String,
    pub host: String,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

/// Failure envelope for every non-happy path.
#[derive(Debug, Clone, Serialize)]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_instructions: Option<String>,
}

impl FailureResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            setup_instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.setup_instructions = Some(instructions.into());
        self
    }
}

impl From<DiagnosticReport> for FailureResponse {
    fn from(report: DiagnosticReport) -> Self {
        FailureResponse::new(report.error).with_instructions(report.instructions)
    }
}

/// The envelope handed back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GatewayResponse {
    Completed(CommandResponse),
    Failed(FailureResponse),
}

impl GatewayResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, GatewayResponse::Failed(_))
    }

    /// Pretty-printed JSON for the tool result text.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!(
                "{{\"success\": false, \"error\": \"Failed to serialize response: {}\"}}",
                e
            )
        })
    }
}

#[cfg(test)]
mod response_serialization {
    use super::*;

    mod command_request {
        use super::*;

        #[test]
        fn test_only_command_is_required() {
            let request: CommandRequest = serde_json::from_str(r#"{"command": "uptime"}"#).unwrap();
            assert_eq!(request, CommandRequest::new("uptime"));
        }

        #[test]
        fn test_overrides_are_parsed() {
            let request: CommandRequest = serde_json::from_str(
                r#"{"command": "pveversion", "host": "10.0.0.2", "username": "admin"}"#,
            )
            .unwrap();
            assert_eq!(request.host.as_deref(), Some("10.0.0.2"));
            assert_eq!(request.username.as_deref(), Some("admin"));
        }

        #[test]
        fn test_missing_command_is_rejected() {
            let result: Result<CommandRequest, _> = serde_json::from_str(r#"{"host": "x"}"#);
            assert!(result.is_err());
        }
    }

    mod command_response {
        use super::*;

        #[test]
        fn test_json_structure_uses_exit_code_camel_case() {
            let response = CommandResponse {
                success: true,
                command: "echo connected".to_string(),
                host: "192.168.1.9".to_string(),
                exit_code: Some(0),
                signal: None,
                stdout: "connected".to_string(),
                stderr: String::new(),
            };

            let json = serde_json::to_value(&response).unwrap();

            assert_eq!(json["success"], true);
            assert_eq!(json["exitCode"], 0);
            assert_eq!(json["stdout"], "connected");
            assert!(json.get("signal").is_none());
            assert!(json.get("exit_code").is_none());
        }

        #[test]
        fn test_signal_termination_serializes_null_exit_code() {
            let response = CommandResponse {
                success: true,
                command: "sleep 100".to_string(),
                host: "pve".to_string(),
                exit_code: None,
                signal: Some("KILL".to_string()),
                stdout: String::new(),
                stderr: String::new(),
            };

            let json = serde_json::to_value(&response).unwrap();

            assert!(json["exitCode"].is_null());
            assert_eq!(json["signal"], "KILL");
        }
    }

    mod failure_response {
        use super::*;

        #[test]
        fn test_plain_failure_omits_instructions() {
            let json = serde_json::to_value(FailureResponse::new("Unknown tool")).unwrap();
            assert_eq!(json, serde_json::json!({"success": false, "error": "Unknown tool"}));
        }

        #[test]
        fn test_from_diagnostic_report() {
            let report = DiagnosticReport {
                ready: false,
                success: false,
                error: "SSH private key not found".to_string(),
                instructions: "Step 1: ...".to_string(),
            };

            let json = serde_json::to_value(FailureResponse::from(report)).unwrap();

            assert_eq!(json["success"], false);
            assert_eq!(json["error"], "SSH private key not found");
            assert_eq!(json["setup_instructions"], "Step 1: ...");
        }
    }

    mod gateway_response {
        use super::*;

        #[test]
        fn test_untagged_failure_is_flat() {
            let response = GatewayResponse::Failed(FailureResponse::new("boom"));
            assert!(response.is_error());

            let json: serde_json::Value = serde_json::from_str(&response.to_json()).unwrap();
            assert_eq!(json["success"], false);
            assert_eq!(json["error"], "boom");
        }

        #[test]
        fn test_completed_is_not_error() {
            let response = GatewayResponse::Completed(CommandResponse {
                success: true,
                command: "false".to_string(),
                host: "pve".to_string(),
                exit_code: Some(1),
                signal: None,
                stdout: String::new(),
                stderr: String::new(),
            });
            assert!(!response.is_error());
            assert!(response.to_json().contains("\"exitCode\": 1"));
        }
    }

    mod execution_result {
        use super::*;

        #[test]
        fn test_camel_case_fields() {
            let result = ExecutionResult {
                success: false,
                exit_code: None,
                signal: Some("TERM".to_string()),
                stdout: String::new(),
                stderr: "Terminated".to_string(),
            };
            let json = serde_json::to_value(&result).unwrap();
            assert!(json["exitCode"].is_null());
            assert_eq!(json["signal"], "TERM");
        }
    }
}
