use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::AppError;
use crate::models::FileRecord;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    OriginalName,
    SizeBytes,
    MimeType,
}

impl SortField {
    /// Column name used in SQL `ORDER BY`. Only these fixed values are ever interpolated.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::OriginalName => "original_name",
            SortField::SizeBytes => "size_bytes",
            SortField::MimeType => "mime_type",
        }
    }
}

impl FromStr for SortField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created_at" | "createdat" => Ok(SortField::CreatedAt),
            "updated_at" | "updatedat" => Ok(SortField::UpdatedAt),
            "original_name" | "originalname" | "name" => Ok(SortField::OriginalName),
            "size_bytes" | "size" => Ok(SortField::SizeBytes),
            "mime_type" | "mimetype" => Ok(SortField::MimeType),
            _ => Err(anyhow::anyhow!("Invalid sort field: {}", s)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(anyhow::anyhow!("Invalid sort order: {}", s)),
        }
    }
}

/// Optional narrowing applied on top of the access predicate.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileFilters {
    /// Case-insensitive substring of `original_name` or `stored_name`.
    pub name_contains: Option<String>,
    pub mime_type: Option<String>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl FileFilters {
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(AppError::Validation(
                    "min_size cannot be greater than max_size".to_string(),
                ));
            }
        }
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(AppError::Validation(
                    "created_after cannot be later than created_before".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether `record` passes every filter that is set. Does not check access.
    pub fn matches(&self, record: &FileRecord) -> bool {
        if let Some(needle) = self.name_contains.as_deref() {
            let needle = needle.to_lowercase();
            if !record.original_name.to_lowercase().contains(&needle)
                && !record.stored_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(mime) = self.mime_type.as_deref() {
            if record.mime_type != mime {
                return false;
            }
        }
        if self.min_size.is_some_and(|min| record.size_bytes < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| record.size_bytes > max) {
            return false;
        }
        if self.created_after.is_some_and(|t| record.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| record.created_at > t) {
            return false;
        }
        true
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, AppError> {
        if page == 0 {
            return Err(AppError::Validation("page starts at 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            records,
            total,
            page: request.page,
            page_size: request.page_size,
            pages: total.div_ceil(u64::from(request.page_size.max(1))),
        }
    }
}
