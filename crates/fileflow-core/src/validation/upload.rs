//! Upload validation
//!
//! Checks applied to every upload before any byte reaches the blob store:
//! - Display name: non-empty, bounded length, no control characters
//! - Mime type: non-empty `type/subtype`
//! - Size cap (`MAX_UPLOAD_BYTES`)
//! - Optional content-type allow-list (`ALLOWED_CONTENT_TYPES`)

use crate::constants::MAX_ORIGINAL_NAME_LENGTH;
use crate::error::AppError;

/// Validate a user-supplied display name.
pub fn validate_original_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation(
            "original_name cannot be empty".to_string(),
        ));
    }

    if name.chars().count() > MAX_ORIGINAL_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "original_name exceeds maximum length of {} characters",
            MAX_ORIGINAL_NAME_LENGTH
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(AppError::Validation(
            "original_name contains control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate a mime type of the form `type/subtype`.
pub fn validate_mime_type(mime_type: &str) -> Result<(), AppError> {
    let trimmed = mime_type.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("mime_type cannot be empty".to_string()));
    }

    match trimmed.split_once('/') {
        Some((kind, subtype)) if !kind.is_empty() && !subtype.is_empty() => Ok(()),
        _ => Err(AppError::Validation(format!(
            "mime_type '{}' is not of the form type/subtype",
            mime_type
        ))),
    }
}

/// Reject uploads above `max_bytes`.
pub fn validate_upload_size(size: u64, max_bytes: u64) -> Result<(), AppError> {
    if size > max_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File size {} bytes exceeds maximum of {} bytes",
            size, max_bytes
        )));
    }
    Ok(())
}

/// Reject mime types outside `allowed`. An empty list allows everything.
///
/// Parameters after `;` (e.g. `charset=utf-8`) are ignored and matching is
/// case-insensitive.
pub fn validate_content_type_allowed(mime_type: &str, allowed: &[String]) -> Result<(), AppError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&essence)) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Content type '{}' is not allowed",
            mime_type
        )))
    }
}
