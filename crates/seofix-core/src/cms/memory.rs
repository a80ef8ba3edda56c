use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{html, page_path, CmsError, CmsResult, ContentSink};
use crate::domain::{AppliedChange, ChangeSet, PageSnapshot};

/// In-memory site keyed by page path. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCms {
    pages: Mutex<BTreeMap<String, String>>,
    writes: AtomicUsize,
    reverts: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryCms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.insert_page(url, html);
        self
    }

    pub fn insert_page(&self, url: &str, html: impl Into<String>) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(page_path(url), html.into());
        }
    }

    /// Current markup of a page, if it exists.
    pub fn page_html(&self, url: &str) -> Option<String> {
        self.pages
            .lock()
            .ok()
            .and_then(|pages| pages.get(&page_path(url)).cloned())
    }

    /// Number of successful `apply_change` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn revert_count(&self) -> usize {
        self.reverts.load(Ordering::SeqCst)
    }

    /// Simulate the site going away.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> CmsResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CmsError::Unreachable("memory cms is offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> CmsResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.pages
            .lock()
            .map_err(|e| CmsError::Unreachable(format!("page lock poisoned: {e}")))
    }
}

#[async_trait]
impl ContentSink for MemoryCms {
    async fn test_connection(&self) -> CmsResult<bool> {
        Ok(!self.offline.load(Ordering::SeqCst))
    }

    async fn read_page(&self, url: &str) -> CmsResult<PageSnapshot> {
        self.ensure_online()?;
        let key = page_path(url);
        let pages = self.lock()?;
        let html = pages
            .get(&key)
            .ok_or_else(|| CmsError::PageNotFound(url.to_string()))?;
        Ok(PageSnapshot::new(key.clone(), url, html.clone()))
    }

    async fn apply_change(&self, page_id: &str, change: &ChangeSet) -> CmsResult<AppliedChange> {
        self.ensure_online()?;
        let mut pages = self.lock()?;
        let current = pages
            .get_mut(page_id)
            .ok_or_else(|| CmsError::PageNotFound(page_id.to_string()))?;
        let (updated, applied) = html::apply_change(current, change)?;
        *current = updated;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(applied)
    }

    async fn revert(&self, page_id: &str, snapshot: &PageSnapshot) -> CmsResult<bool> {
        self.ensure_online()?;
        let mut pages = self.lock()?;
        pages.insert(page_id.to_string(), snapshot.html.clone());
        self.reverts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
