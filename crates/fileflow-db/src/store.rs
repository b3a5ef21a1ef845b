use async_trait::async_trait;
use uuid::Uuid;

use fileflow_core::models::{
    FileFilters, FileRecord, NewFileRecord, Page, PageRequest, PrincipalId, Visibility,
};
use fileflow_core::AppError;

/// Membership edit applied atomically by [`FileRecordStore::update_membership`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Add(PrincipalId),
    Remove(PrincipalId),
}

/// Persistent FileRecords.
///
/// Mutations take an optional expected version. When it is set and differs from the
/// stored version the write is rejected with [`AppError::Conflict`]. Every mutation
/// that changes the record bumps `version` and `updated_at`.
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    /// Validate and persist a new record (version 1, private, no members).
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, AppError>;

    /// Fetch by id without any access check.
    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    /// Fetch a record owned by `owner`. `NotFound` if absent or owned by someone else.
    async fn find_owned(&self, owner: PrincipalId, id: Uuid) -> Result<FileRecord, AppError>;

    /// Records that `principal` may read (owner, member or public), narrowed by
    /// `filters`, sorted and paginated.
    async fn find_accessible(
        &self,
        principal: PrincipalId,
        filters: &FileFilters,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError>;

    /// Add or remove one member. A change that is already in effect leaves the record
    /// (and its version) untouched.
    async fn update_membership(
        &self,
        id: Uuid,
        change: MembershipChange,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError>;

    async fn update_visibility(
        &self,
        id: Uuid,
        visibility: Visibility,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError>;

    /// Remove the record and return it so the caller can release its blob.
    async fn delete(&self, id: Uuid, expected_version: Option<i32>)
        -> Result<FileRecord, AppError>;

    fn backend_name(&self) -> &'static str;
}

/// Resolve a missed conditional write into `NotFound` or `Conflict`.
pub(crate) fn miss_error(
    id: Uuid,
    current: Option<&FileRecord>,
    expected_version: Option<i32>,
) -> AppError {
    match (current, expected_version) {
        (None, _) => AppError::NotFound(format!("File {} not found", id)),
        (Some(record), Some(expected)) if record.version != expected => AppError::Conflict {
            expected,
            actual: record.version,
        },
        (Some(_), _) => AppError::Internal(format!(
            "Conditional update of file {} matched no row",
            id
        )),
    }
}
