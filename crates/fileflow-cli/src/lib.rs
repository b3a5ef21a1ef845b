//! Fileflow CLI support: tracing initialisation, service wiring and output helpers.

pub mod report;
pub mod setup;
pub mod telemetry;

use anyhow::Context;
use serde::Serialize;

pub use report::{report_error, ErrorReport};
pub use setup::{build_queue, setup_database, AppContext};
pub use telemetry::init_tracing;

/// Print `value` as pretty JSON on stdout. Logs go to stderr.
pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}
