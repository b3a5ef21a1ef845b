//! Failure reporting for CLI commands
//!
//! A failed command prints a JSON `{"error": {...}}` object on stderr carrying the
//! stable error code, and exits with [`EXIT_RETRYABLE`] when retrying may succeed.

use std::process::ExitCode;

use serde::Serialize;

use fileflow_core::{AppError, ErrorMetadata, LogLevel};

/// `EX_TEMPFAIL`: the same command may succeed later.
pub const EXIT_RETRYABLE: u8 = 75;
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorReport {
    pub code: &'static str,
    /// HTTP-equivalent status
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<&'static str>,
    pub recoverable: bool,
}

impl ErrorReport {
    /// Describe `err`. Internal details of sensitive errors are only included when
    /// `show_details` is set.
    pub fn new(err: &anyhow::Error, show_details: bool) -> Self {
        match err.downcast_ref::<AppError>() {
            Some(app) => Self {
                code: app.error_code(),
                status: app.http_status_code(),
                message: if app.is_sensitive() && show_details {
                    format!("{:#}", err)
                } else {
                    app.client_message()
                },
                suggested_action: app.suggested_action(),
                recoverable: app.is_recoverable(),
            },
            None => Self {
                code: "INTERNAL_ERROR",
                status: 500,
                message: format!("{:#}", err),
                suggested_action: None,
                recoverable: false,
            },
        }
    }

    pub fn exit_status(&self) -> u8 {
        if self.recoverable {
            EXIT_RETRYABLE
        } else {
            EXIT_FAILURE
        }
    }
}

/// Log `err`, print its report on stderr and return the process exit code.
pub fn report_error(err: &anyhow::Error, show_details: bool) -> ExitCode {
    let report = ErrorReport::new(err, show_details);
    let level = err
        .downcast_ref::<AppError>()
        .map_or(LogLevel::Error, |app| app.log_level());

    match level {
        LogLevel::Debug => tracing::debug!(code = report.code, error = %format!("{:#}", err), "Command failed"),
        LogLevel::Warn => tracing::warn!(code = report.code, error = %format!("{:#}", err), "Command failed"),
        LogLevel::Error => tracing::error!(code = report.code, error = %format!("{:#}", err), "Command failed"),
    }

    match serde_json::to_string_pretty(&serde_json::json!({ "error": &report })) {
        Ok(out) => eprintln!("{}", out),
        Err(_) => eprintln!("{}: {}", report.code, report.message),
    }

    ExitCode::from(report.exit_status())
}
