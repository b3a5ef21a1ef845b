//! Validation modules

pub mod upload;

pub use upload::{
    validate_content_type_allowed, validate_mime_type, validate_original_name,
    validate_upload_size,
};
