use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use fileflow_core::models::{
    FileFilters, FileRecord, NewFileRecord, Page, PageRequest, PrincipalId, SortField, SortOrder,
    Visibility,
};
use fileflow_core::AppError;

use crate::store::{miss_error, FileRecordStore, MembershipChange};

/// Process-local record store. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryFileRecordStore {
    records: Arc<RwLock<HashMap<Uuid, FileRecord>>>,
}

impl InMemoryFileRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Check the expected version and apply `mutate` under the write lock. `mutate`
    /// returns false when the change is already in effect; the record is then left as is.
    async fn conditional_update<F>(
        &self,
        id: Uuid,
        expected_version: Option<i32>,
        mutate: F,
    ) -> Result<FileRecord, AppError>
    where
        F: FnOnce(&mut FileRecord) -> bool + Send,
    {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&id) else {
            return Err(miss_error(id, None, expected_version));
        };

        if let Some(expected) = expected_version {
            if record.version != expected {
                return Err(miss_error(id, Some(&*record), expected_version));
            }
        }

        if mutate(record) {
            record.version += 1;
            record.updated_at = Utc::now().max(record.created_at);
        }

        Ok(record.clone())
    }
}

fn compare(a: &FileRecord, b: &FileRecord, field: SortField, order: SortOrder) -> Ordering {
    let primary = match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::OriginalName => a.original_name.cmp(&b.original_name),
        SortField::SizeBytes => a.size_bytes.cmp(&b.size_bytes),
        SortField::MimeType => a.mime_type.cmp(&b.mime_type),
    };
    let primary = match order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl FileRecordStore for InMemoryFileRecordStore {
    #[tracing::instrument(skip(self, record), fields(file_id = %record.id))]
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, AppError> {
        record.validate()?;

        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(AppError::Validation(format!(
                "File {} already exists",
                record.id
            )));
        }
        if records.values().any(|r| r.stored_name == record.stored_name) {
            return Err(AppError::Validation(format!(
                "Stored name {} already in use",
                record.stored_name
            )));
        }

        let created = record.into_record(Utc::now());
        records.insert(created.id, created.clone());
        tracing::debug!("File record created");
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_owned(&self, owner: PrincipalId, id: Uuid) -> Result<FileRecord, AppError> {
        self.records
            .read()
            .await
            .get(&id)
            .filter(|r| r.is_owned_by(owner))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    async fn find_accessible(
        &self,
        principal: PrincipalId,
        filters: &FileFilters,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError> {
        filters.validate()?;

        let mut matching: Vec<FileRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.is_owned_by(principal) || r.is_shared_with(principal) || r.is_public())
            .filter(|r| filters.matches(r))
            .cloned()
            .collect();

        matching.sort_by(|a, b| compare(a, b, filters.sort_by, filters.sort_order));

        let total = matching.len() as u64;
        let records = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Page::new(records, total, page))
    }

    async fn update_membership(
        &self,
        id: Uuid,
        change: MembershipChange,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        self.conditional_update(id, expected_version, |record| match change {
            MembershipChange::Add(member) => {
                if record.is_shared_with(member) {
                    false
                } else {
                    record.shared_with.push(member);
                    true
                }
            }
            MembershipChange::Remove(member) => {
                let before = record.shared_with.len();
                record.shared_with.retain(|m| *m != member);
                record.shared_with.len() != before
            }
        })
        .await
    }

    async fn update_visibility(
        &self,
        id: Uuid,
        visibility: Visibility,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        self.conditional_update(id, expected_version, |record| {
            if record.visibility == visibility {
                false
            } else {
                record.visibility = visibility;
                true
            }
        })
        .await
    }

    async fn delete(
        &self,
        id: Uuid,
        expected_version: Option<i32>,
    ) -> Result<FileRecord, AppError> {
        let mut records = self.records.write().await;
        let current_version = records.get(&id).map(|r| r.version);
        match (current_version, expected_version) {
            (None, _) => Err(miss_error(id, None, expected_version)),
            (Some(actual), Some(expected)) if actual != expected => {
                Err(AppError::Conflict { expected, actual })
            }
            (Some(_), _) => records
                .remove(&id)
                .ok_or_else(|| AppError::NotFound(format!("File {} not found", id))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
