//! Data models shared across the workspace

mod file_record;
mod query;
mod task;

pub use file_record::*;
pub use query::*;
pub use task::*;
