//! Durable task table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use watchpool_core::{NewTaskRecord, TaskId, TaskRecord};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new record and return it with its assigned id.
    async fn create(&self, draft: NewTaskRecord) -> Result<TaskRecord, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// All records, ordered by id.
    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Replace an existing record.
    async fn update(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Replace several records in one write. Nothing is written if any of
    /// them is unknown.
    async fn update_many(&self, records: Vec<TaskRecord>) -> Result<(), StoreError>;
}

/// The table behind both store implementations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct TaskTable {
    next_id: u64,
    records: Vec<TaskRecord>,
}

#[derive(Debug, Default)]
struct Table {
    next_id: u64,
    records: BTreeMap<TaskId, TaskRecord>,
}

impl Table {
    fn insert(&mut self, draft: NewTaskRecord) -> TaskRecord {
        self.next_id += 1;
        let record = TaskRecord::from_draft(TaskId::new(self.next_id), draft);
        self.records.insert(record.id, record.clone());
        record
    }

    fn replace_all(&mut self, records: Vec<TaskRecord>) -> Result<(), StoreError> {
        if let Some(unknown) = records.iter().find(|r| !self.records.contains_key(&r.id)) {
            return Err(StoreError::NotFound(unknown.id));
        }
        for record in records {
            self.records.insert(record.id, record);
        }
        Ok(())
    }

    fn to_file(&self) -> TaskTable {
        TaskTable {
            next_id: self.next_id,
            records: self.records.values().cloned().collect(),
        }
    }

    fn from_file(file: TaskTable) -> Self {
        let records: BTreeMap<TaskId, TaskRecord> =
            file.records.into_iter().map(|r| (r.id, r)).collect();
        // Never hand out an id that is already on disk.
        let highest = records.keys().next_back().map(|id| id.get()).unwrap_or(0);
        Self {
            next_id: file.next_id.max(highest),
            records,
        }
    }
}

/// Process-local store. Records are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    table: RwLock<Table>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, draft: NewTaskRecord) -> Result<TaskRecord, StoreError> {
        Ok(self.table.write().await.insert(draft))
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.table.read().await.records.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.table.read().await.records.values().cloned().collect())
    }

    async fn update(&self, record: TaskRecord) -> Result<(), StoreError> {
        self.table.write().await.replace_all(vec![record])
    }

    async fn update_many(&self, records: Vec<TaskRecord>) -> Result<(), StoreError> {
        self.table.write().await.replace_all(records)
    }
}

/// Store backed by a JSON file, rewritten on every mutation.
#[derive(Debug)]
pub struct JsonFileTaskStore {
    path: PathBuf,
    table: RwLock<Table>,
}

impl JsonFileTaskStore {
    /// Open the table at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => Table::from_file(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            records = table.records.len(),
            "Task table opened"
        );
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Called with the write lock held, so writers never interleave.
    async fn persist(&self, table: &Table) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&table.to_file())?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), records = table.records.len(), "Task table written");
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn create(&self, draft: NewTaskRecord) -> Result<TaskRecord, StoreError> {
        let mut table = self.table.write().await;
        let record = table.insert(draft);
        self.persist(&table).await?;
        Ok(record)
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.table.read().await.records.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.table.read().await.records.values().cloned().collect())
    }

    async fn update(&self, record: TaskRecord) -> Result<(), StoreError> {
        self.update_many(vec![record]).await
    }

    async fn update_many(&self, records: Vec<TaskRecord>) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        table.replace_all(records)?;
        self.persist(&table).await
    }
}
