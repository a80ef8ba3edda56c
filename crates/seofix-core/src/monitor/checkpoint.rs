//! Pre-change checkpoints, keyed by `(tenant, page)`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seofix_state::{ContentDigest, TenantId};

use crate::cms::page_path;
use crate::domain::PageSnapshot;

/// Snapshot of a page taken before any mutation.
///
/// Consumed exactly once: discarded on commit or confirmed rollback, retained
/// when a rollback cannot be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub tenant_id: TenantId,
    pub page_url: String,
    pub snapshot: PageSnapshot,
    pub digest: ContentDigest,
    pub created_at: DateTime<Utc>,
}

type Key = (TenantId, String);

/// Live checkpoints. At most one per `(tenant, page)`.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    live: Mutex<HashMap<Key, Checkpoint>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: &TenantId, page_url: &str) -> Key {
        (tenant_id.clone(), page_path(page_url))
    }

    /// Record a checkpoint. Returns the id of the live checkpoint instead if
    /// one already exists for the same page.
    pub fn create(
        &self,
        tenant_id: &TenantId,
        page_url: &str,
        snapshot: PageSnapshot,
    ) -> Result<Checkpoint, String> {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(tenant_id, page_url);
        if let Some(existing) = live.get(&key) {
            return Err(existing.checkpoint_id.clone());
        }
        let checkpoint = Checkpoint {
            checkpoint_id: format!("ckpt_{}", Uuid::new_v4().simple()),
            tenant_id: tenant_id.clone(),
            page_url: page_url.to_string(),
            digest: snapshot.digest(),
            snapshot,
            created_at: Utc::now(),
        };
        live.insert(key, checkpoint.clone());
        Ok(checkpoint)
    }

    /// Consume a checkpoint. Returns `false` if it was not live.
    pub fn discard(&self, checkpoint: &Checkpoint) -> bool {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(&checkpoint.tenant_id, &checkpoint.page_url);
        match live.get(&key) {
            Some(c) if c.checkpoint_id == checkpoint.checkpoint_id => live.remove(&key).is_some(),
            _ => false,
        }
    }

    pub fn get(&self, tenant_id: &TenantId, page_url: &str) -> Option<Checkpoint> {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.get(&Self::key(tenant_id, page_url)).cloned()
    }

    /// Every live checkpoint, oldest first. After a failed rollback these are
    /// what an operator restores from.
    pub fn live(&self) -> Vec<Checkpoint> {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Checkpoint> = live.values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        all
    }

    pub fn len(&self) -> usize {
        self.live.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
