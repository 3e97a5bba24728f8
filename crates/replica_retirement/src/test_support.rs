//! In-memory doubles for the catalog and administration seams.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::administration::ReplicaAdministrator;
use crate::catalog::{CandidateFilter, CandidateReplica, ReplicaCatalog, REPLICA_TYPE, STAGING_TABLE};
use crate::errors::{Error, Result};

pub const OTHER_ITEM_TYPE: &str = "70737809-852C-4A03-9E22-2CECEA5B9BFA";

/// Builds a metadata row.
pub fn item(uuid: &str, item_type: &str, dataset_info: &str) -> CandidateReplica {
    CandidateReplica {
        uuid: uuid.to_string(),
        dataset_info: Some(dataset_info.to_string()),
        definition: Some(format!("<GPReplica><ID>{}</ID></GPReplica>", uuid)),
        item_type: item_type.to_string(),
    }
}

pub fn replica(uuid: &str, service: &str) -> CandidateReplica {
    item(
        uuid,
        REPLICA_TYPE,
        &format!("https://gis.example.com/arcgis/rest/services/{}", service),
    )
}

/// Simulates one database session over a `GDB_ITEMS` table.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: Vec<CandidateReplica>,
    staged: Option<Vec<CandidateReplica>>,
    stage_failure: Option<String>,
    pub stage_calls: usize,
    pub close_calls: usize,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<CandidateReplica>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn with_stage_failure(mut self, message: &str) -> Self {
        self.stage_failure = Some(message.to_string());
        self
    }

    pub fn staged(&self) -> Option<&[CandidateReplica]> {
        self.staged.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls > 0
    }
}

#[async_trait]
impl ReplicaCatalog for InMemoryCatalog {
    async fn stage_candidates(&mut self, filter: &CandidateFilter, batch_size: u32) -> Result<u64> {
        self.stage_calls += 1;
        if self.is_closed() {
            return Err(Error::Database("connection is closed".to_string()));
        }
        if let Some(message) = &self.stage_failure {
            return Err(Error::Database(message.clone()));
        }

        let staged: Vec<CandidateReplica> = self
            .items
            .iter()
            .filter(|row| filter.matches(&row.item_type, row.dataset_info.as_deref()))
            .take(batch_size as usize)
            .cloned()
            .collect();
        let count = staged.len() as u64;
        self.staged = Some(staged);
        Ok(count)
    }

    async fn fetch_candidates(&mut self) -> Result<Vec<CandidateReplica>> {
        if self.is_closed() {
            return Err(Error::Database("connection is closed".to_string()));
        }
        self.staged
            .clone()
            .ok_or_else(|| Error::Database(format!("Invalid object name '{}'.", STAGING_TABLE)))
    }

    async fn close(&mut self) -> Result<()> {
        self.close_calls += 1;
        self.staged = None;
        Ok(())
    }
}

/// Records every unregister call and optionally fails on one identifier.
#[derive(Debug, Clone, Default)]
pub struct RecordingAdministrator {
    calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
    fail_on: Option<String>,
}

impl RecordingAdministrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(replica_id: &str) -> Self {
        Self {
            fail_on: Some(replica_id.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn replica_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl ReplicaAdministrator for RecordingAdministrator {
    async fn unregister_replica(&self, destination: &Path, replica_id: &str) -> Result<()> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push((destination.to_path_buf(), replica_id.to_string()));

        if self.fail_on.as_deref() == Some(replica_id) {
            return Err(Error::Administration {
                replica_id: replica_id.to_string(),
                message: "ERROR 000732: Replica does not exist".to_string(),
            });
        }
        Ok(())
    }
}
