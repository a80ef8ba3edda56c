//! In-memory and fault-injecting collaborators for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::cms::{CmsError, CmsResult, ContentSink, MemoryCms};
use crate::domain::{AppliedChange, ChangeSet, PageSnapshot};
use crate::generator::{ContentGenerator, GeneratorError, GeneratorResult};

// ---------------------------------------------------------------------------
// CannedGenerator
// ---------------------------------------------------------------------------

/// Replays fixed responses in order; the last one repeats forever.
#[derive(Debug, Default)]
pub struct CannedGenerator {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl CannedGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A generator with nothing to say; every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for CannedGenerator {
    async fn complete(&self, _prompt: &str) -> GeneratorResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| GeneratorError::NotConfigured("canned responses poisoned".to_string()))?;
        match responses.len() {
            0 => Err(GeneratorError::EmptyResponse),
            1 => Ok(responses[0].clone()),
            _ => responses.pop_front().ok_or(GeneratorError::EmptyResponse),
        }
    }
}

// ---------------------------------------------------------------------------
// FaultyCms
// ---------------------------------------------------------------------------

/// Faults a `FaultyCms` injects. All off by default.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Delay before every read.
    pub read_delay: Option<Duration>,
    /// Delay before every write.
    pub apply_delay: Option<Duration>,
    /// Writes fail without touching the page.
    pub fail_apply: bool,
    /// Writes succeed but leave an unclosed `<div>` behind.
    pub corrupt_apply: bool,
    /// Reverts fail.
    pub fail_revert: bool,
    /// Reverts report `false`.
    pub revert_unconfirmed: bool,
    /// Reverts report success without restoring anything.
    pub revert_noop: bool,
}

/// A `MemoryCms` with switchable failure modes.
#[derive(Debug, Default)]
pub struct FaultyCms {
    inner: MemoryCms,
    faults: Mutex<Faults>,
}

impl FaultyCms {
    pub fn new(inner: MemoryCms) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn with_faults(self, faults: Faults) -> Self {
        self.set_faults(faults);
        self
    }

    pub fn set_faults(&self, faults: Faults) {
        if let Ok(mut current) = self.faults.lock() {
            *current = faults;
        }
    }

    pub fn inner(&self) -> &MemoryCms {
        &self.inner
    }

    fn faults(&self) -> Faults {
        self.faults.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ContentSink for FaultyCms {
    async fn test_connection(&self) -> CmsResult<bool> {
        self.inner.test_connection().await
    }

    async fn read_page(&self, url: &str) -> CmsResult<PageSnapshot> {
        if let Some(delay) = self.faults().read_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.read_page(url).await
    }

    async fn apply_change(&self, page_id: &str, change: &ChangeSet) -> CmsResult<AppliedChange> {
        let faults = self.faults();
        if let Some(delay) = faults.apply_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_apply {
            return Err(CmsError::Unreachable("injected write failure".to_string()));
        }
        let applied = self.inner.apply_change(page_id, change).await?;
        if faults.corrupt_apply {
            if let Some(html) = self.inner.page_html(page_id) {
                self.inner.insert_page(page_id, format!("{html}<div>"));
            }
        }
        Ok(applied)
    }

    async fn revert(&self, page_id: &str, snapshot: &PageSnapshot) -> CmsResult<bool> {
        let faults = self.faults();
        if faults.fail_revert {
            return Err(CmsError::Unreachable("injected revert failure".to_string()));
        }
        if faults.revert_noop {
            return Ok(true);
        }
        let restored = self.inner.revert(page_id, snapshot).await?;
        Ok(restored && !faults.revert_unconfirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeAction;

    #[tokio::test]
    async fn test_canned_generator_repeats_last() {
        let g = CannedGenerator::new(vec!["a".into(), "b".into()]);
        assert_eq!(g.complete("x").await.unwrap(), "a");
        assert_eq!(g.complete("x").await.unwrap(), "b");
        assert_eq!(g.complete("x").await.unwrap(), "b");
        assert_eq!(g.calls(), 3);
        assert!(CannedGenerator::failing().complete("x").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_apply_leaves_unclosed_div() {
        let cms = FaultyCms::new(MemoryCms::new().with_page("/", "<html><body></body></html>"))
            .with_faults(Faults {
                corrupt_apply: true,
                ..Faults::default()
            });
        let change = ChangeSet::new("body", ChangeAction::Add, "<p>x</p>");
        cms.apply_change("/", &change).await.unwrap();
        assert!(cms.inner().page_html("/").unwrap().ends_with("<div>"));
    }
}
