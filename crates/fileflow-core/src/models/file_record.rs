use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::validation::{validate_mime_type, validate_original_name};

/// Verified principal identifier produced by the authenticator.
pub type PrincipalId = Uuid;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Public => write!(f, "public"),
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "public" => Ok(Visibility::Public),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

/// Permission requested when sharing a record.
///
/// Sharing is membership-only: `Read` and `Write` both add the target to
/// `shared_with`, `None` removes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    None,
}

impl Permission {
    pub fn grants_membership(&self) -> bool {
        !matches!(self, Permission::None)
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::Write => write!(f, "write"),
            Permission::None => write!(f, "none"),
        }
    }
}

impl FromStr for Permission {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "none" => Ok(Permission::None),
            _ => Err(anyhow::anyhow!("Invalid permission: {}", s)),
        }
    }
}

/// Persistent metadata for one stored blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub id: Uuid,
    pub stored_name: String,
    pub original_name: String,
    pub blob_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub owner_id: PrincipalId,
    pub shared_with: Vec<PrincipalId>,
    pub visibility: Visibility,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_owned_by(&self, principal: PrincipalId) -> bool {
        self.owner_id == principal
    }

    pub fn is_shared_with(&self, principal: PrincipalId) -> bool {
        self.shared_with.contains(&principal)
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for FileRecord {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let visibility: String = row.try_get("visibility")?;
        Ok(FileRecord {
            id: row.try_get("id")?,
            stored_name: row.try_get("stored_name")?,
            original_name: row.try_get("original_name")?,
            blob_path: row.try_get("blob_path")?,
            size_bytes: row.try_get("size_bytes")?,
            mime_type: row.try_get("mime_type")?,
            owner_id: row.try_get("owner_id")?,
            shared_with: row.try_get("shared_with")?,
            visibility: visibility
                .parse()
                .map_err(|e: anyhow::Error| sqlx::Error::ColumnDecode {
                    index: "visibility".to_string(),
                    source: e.into(),
                })?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields required to create a [`FileRecord`].
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub id: Uuid,
    pub stored_name: String,
    pub original_name: String,
    pub blob_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub owner_id: PrincipalId,
}

impl NewFileRecord {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.owner_id.is_nil() {
            return Err(AppError::Validation("owner_id is required".to_string()));
        }
        if self.size_bytes < 0 {
            return Err(AppError::Validation(
                "size_bytes cannot be negative".to_string(),
            ));
        }
        if self.stored_name.trim().is_empty() {
            return Err(AppError::Validation(
                "stored_name cannot be empty".to_string(),
            ));
        }
        if self.blob_path.trim().is_empty() {
            return Err(AppError::Validation("blob_path cannot be empty".to_string()));
        }
        validate_original_name(&self.original_name)?;
        validate_mime_type(&self.mime_type)?;
        Ok(())
    }

    /// Materialise the record with version 1, private visibility and no members.
    pub fn into_record(self, now: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id: self.id,
            stored_name: self.stored_name,
            original_name: self.original_name,
            blob_path: self.blob_path,
            size_bytes: self.size_bytes,
            mime_type: self.mime_type,
            owner_id: self.owner_id,
            shared_with: Vec::new(),
            visibility: Visibility::Private,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
