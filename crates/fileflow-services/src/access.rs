//! Access control over FileRecords.
//!
//! Reading is open to the owner, members of `shared_with` and everyone for public
//! records. Sharing and deleting are owner-only. A principal that cannot read a record
//! is told it does not exist rather than that it is forbidden.

use fileflow_core::{AppError, FileRecord, Permission, PrincipalId};
use fileflow_db::MembershipChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    /// Changing membership or visibility.
    Share,
    Delete,
}

pub fn can_read(principal: PrincipalId, record: &FileRecord) -> bool {
    record.is_owned_by(principal) || record.is_shared_with(principal) || record.is_public()
}

pub fn can_access(principal: PrincipalId, record: &FileRecord, mode: AccessMode) -> bool {
    match mode {
        AccessMode::Read => can_read(principal, record),
        AccessMode::Share | AccessMode::Delete => record.is_owned_by(principal),
    }
}

/// `NotFound` when the principal cannot read the record, `Forbidden` when it can read
/// but `mode` needs ownership.
pub fn authorize(
    principal: PrincipalId,
    record: &FileRecord,
    mode: AccessMode,
) -> Result<(), AppError> {
    if !can_read(principal, record) {
        return Err(AppError::NotFound(format!("File {} not found", record.id)));
    }
    if !can_access(principal, record, mode) {
        return Err(AppError::Forbidden(format!(
            "Only the owner can {} file {}",
            match mode {
                AccessMode::Read => "read",
                AccessMode::Share => "share",
                AccessMode::Delete => "delete",
            },
            record.id
        )));
    }
    Ok(())
}

/// Membership edit for sharing `record` with `target` at `permission`.
///
/// The owner is never a member: adding them is rejected, removing them is a no-op.
pub fn membership_change(
    record: &FileRecord,
    target: PrincipalId,
    permission: Permission,
) -> Result<MembershipChange, AppError> {
    if target.is_nil() {
        return Err(AppError::Validation("target principal is required".to_string()));
    }
    if !permission.grants_membership() {
        return Ok(MembershipChange::Remove(target));
    }
    if record.is_owned_by(target) {
        return Err(AppError::Validation(
            "The owner cannot be added to shared_with".to_string(),
        ));
    }
    Ok(MembershipChange::Add(target))
}
