use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use fileflow_core::models::{
    FileFilters, FileRecord, NewFileRecord, Page, PageRequest, PrincipalId, Visibility,
};
use fileflow_core::AppError;

use crate::store::{miss_error, FileRecordStore, MembershipChange};

const RECORD_COLUMNS: &str = "id, stored_name, original_name, blob_path, size_bytes, mime_type, \
     owner_id, shared_with, visibility, version, created_at, updated_at";

/// Concurrent writers can make a conditional update miss even though the change is not
/// yet in effect; retry that many times before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Escape `%`, `_` and `\` so user input is matched literally inside ILIKE.
fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[derive(Clone)]
pub struct PgFileRecordStore {
    pool: PgPool,
}

impl PgFileRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append the access predicate and optional filters as a WHERE clause.
    fn push_where(qb: &mut QueryBuilder<'static, Postgres>, principal: Uuid, filters: &FileFilters) {
        qb.push(" WHERE (owner_id = ")
            .push_bind(principal)
            .push(" OR ")
            .push_bind(principal)
            .push(" = ANY(shared_with) OR visibility = 'public')");

        if let Some(needle) = filters.name_contains.as_deref().filter(|n| !n.is_empty()) {
            let pattern = format!("%{}%", escape_like(needle));
            qb.push(" AND (original_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR stored_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(mime) = filters.mime_type.clone() {
            qb.push(" AND mime_type = ").push_bind(mime);
        }
        if let Some(min) = filters.min_size {
            qb.push(" AND size_bytes >= ").push_bind(min);
        }
        if let Some(max) = filters.max_size {
            qb.push(" AND size_bytes <= ").push_bind(max);
        }
        if let Some(after) = filters.created_after {
            qb.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filters.created_before {
            qb.push(" AND created_at <= ").push_bind(before);
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {} FROM file_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}

#[async_trait]
impl FileRecordStore for PgFileRecordStore {
    #[tracing::instrument(skip(self, record), fields(file_id = %record.id, owner_id = %record.owner_id))]
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, AppError> {
        record.validate()?;
        let now = Utc::now();

        let inserted = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            INSERT INTO file_records (
                id, stored_name, original_name, blob_path, size_bytes, mime_type,
                owner_id, shared_with, visibility, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, '{{}}', 'private', 1, $8, $8)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.stored_name)
        .bind(&record.original_name)
        .bind(&record.blob_path)
        .bind(record.size_bytes)
        .bind(&record.mime_type)
        .bind(record.owner_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Validation(format!("File {} already exists", record.id))
            }
            other => {
                tracing::error!(error = %other, "Failed to insert file record");
                AppError::Database(other)
            }
        })?;

        tracing::info!(
            size_bytes = inserted.size_bytes,
            mime_type = %inserted.mime_type,
            "File record created"
        );

        Ok(inserted)
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        self.fetch(id).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_owned(&self, owner: PrincipalId, id: Uuid) -> Result<FileRecord, AppError> {
        sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {} FROM file_records WHERE id = $1 AND owner_id = $2",
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    #[tracing::instrument(skip(self, filters))]
    async fn find_accessible(
        &self,
        principal: PrincipalId,
        filters: &FileFilters,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError> {
        filters.validate()?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM file_records");
        Self::push_where(&mut count_qb, principal, filters);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select_qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM file_records", RECORD_COLUMNS));
        Self::push_where(&mut select_qb, principal, filters);
        // Column and direction come from closed enums, never from user text.
        select_qb.push(format!(
            " ORDER BY {} {}, id ASC",
            filters.sort_by.column(),
            filters.sort_order.keyword()
        ));
        select_qb
            .push(" LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let records = select_qb
            .build_query_as::<FileRecord>()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(
            total = total,
            returned = records.len(),
            page = page.page,
            "Accessible files listed"
        );

        Ok(Page::new(records, total.max(0) as u64, page))
    }

    #[tracing::instrument(skip(self))]
    async fn update_membership(
        &self,
        id: Uuid,
        change: MembershipChange,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        let (set_expr, guard, member) = match change {
            MembershipChange::Add(member) => (
                "array_append(shared_with, $2)",
                "NOT ($2 = ANY(shared_with))",
                member,
            ),
            MembershipChange::Remove(member) => (
                "array_remove(shared_with, $2)",
                "$2 = ANY(shared_with)",
                member,
            ),
        };

        let sql = format!(
            r#"
            UPDATE file_records
            SET shared_with = {},
                version = version + 1,
                updated_at = GREATEST(NOW(), created_at)
            WHERE id = $1
              AND ($3::INTEGER IS NULL OR version = $3)
              AND {}
            RETURNING {}
            "#,
            set_expr, guard, RECORD_COLUMNS
        );

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let updated = sqlx::query_as::<Postgres, FileRecord>(&sql)
                .bind(id)
                .bind(member)
                .bind(expected_version)
                .fetch_optional(&self.pool)
                .await?;

            if let Some(record) = updated {
                tracing::info!(version = record.version, "File membership updated");
                return Ok(record);
            }

            let current = self.fetch(id).await?;
            match current {
                Some(record)
                    if expected_version.map_or(true, |v| v == record.version) =>
                {
                    let in_effect = match change {
                        MembershipChange::Add(m) => record.is_shared_with(m),
                        MembershipChange::Remove(m) => !record.is_shared_with(m),
                    };
                    if in_effect {
                        return Ok(record);
                    }
                }
                other => return Err(miss_error(id, other.as_ref(), expected_version)),
            }
        }

        Err(AppError::Internal(format!(
            "Membership update of file {} kept racing with concurrent writers",
            id
        )))
    }

    #[tracing::instrument(skip(self))]
    async fn update_visibility(
        &self,
        id: Uuid,
        visibility: Visibility,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        let updated = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            UPDATE file_records
            SET visibility = $2,
                version = version + 1,
                updated_at = GREATEST(NOW(), created_at)
            WHERE id = $1
              AND ($3::INTEGER IS NULL OR version = $3)
              AND visibility <> $2
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(visibility.to_string())
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = updated {
            tracing::info!(version = record.version, visibility = %visibility, "File visibility updated");
            return Ok(record);
        }

        match self.fetch(id).await? {
            Some(record)
                if record.visibility == visibility
                    && expected_version.map_or(true, |v| v == record.version) =>
            {
                Ok(record)
            }
            other => Err(miss_error(id, other.as_ref(), expected_version)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete(
        &self,
        id: Uuid,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        let deleted = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            DELETE FROM file_records
            WHERE id = $1 AND ($2::INTEGER IS NULL OR version = $2)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match deleted {
            Some(record) => {
                tracing::info!("File record deleted");
                Ok(record)
            }
            None => {
                let current = self.fetch(id).await?;
                Err(miss_error(id, current.as_ref(), expected_version))
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
