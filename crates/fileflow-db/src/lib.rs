//! Metadata store for file records
//!
//! [`FileRecordStore`] is the seam between the services and persistence. Two
//! implementations are provided: [`PgFileRecordStore`] (PostgreSQL via sqlx) and
//! [`InMemoryFileRecordStore`] for tests and single-process runs.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::InMemoryFileRecordStore;
pub use postgres::PgFileRecordStore;
pub use store::{FileRecordStore, MembershipChange};
