//! CMS collaborators: the `ContentSink` capability the pipeline reads and
//! mutates pages through, and the `CmsProvider` that resolves one per tenant.

pub mod fs;
pub mod html;
pub mod memory;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use seofix_state::TenantConfig;

use crate::domain::{AppliedChange, ChangeSet, PageSnapshot};

pub use fs::FsCms;
pub use memory::MemoryCms;

/// Errors raised by CMS backends.
#[derive(Debug, thiserror::Error)]
pub enum CmsError {
    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("selector '{selector}' matched no element")]
    ElementNotFound { selector: String },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("change rejected: {0}")]
    Rejected(String),

    #[error("cms unreachable: {0}")]
    Unreachable(String),

    #[error("cms call '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("no cms configured for tenant {0}")]
    NotConfigured(String),

    #[error("unsupported cms kind: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CmsResult<T> = std::result::Result<T, CmsError>;

/// Read and write access to one site's pages.
#[async_trait]
pub trait ContentSink: Send + Sync {
    /// Cheap reachability probe.
    async fn test_connection(&self) -> CmsResult<bool>;

    async fn read_page(&self, url: &str) -> CmsResult<PageSnapshot>;

    async fn apply_change(&self, page_id: &str, change: &ChangeSet) -> CmsResult<AppliedChange>;

    /// Restore a page to `snapshot`. `Ok(false)` means the backend accepted the
    /// call but could not confirm the restore.
    async fn revert(&self, page_id: &str, snapshot: &PageSnapshot) -> CmsResult<bool>;
}

/// Bound a CMS call, mapping an elapsed deadline to `CmsError::Timeout`.
pub async fn bounded<T, F>(operation: &'static str, timeout: Duration, fut: F) -> CmsResult<T>
where
    F: Future<Output = CmsResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CmsError::Timeout { operation, timeout }),
    }
}

/// Normalise a page URL to the site-relative path used as page identity:
/// scheme and host dropped, query and fragment dropped, no trailing slash.
pub fn page_path(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/")
        }
        None => url,
    };
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Resolves the `ContentSink` a tenant's fixes are applied through.
#[async_trait]
pub trait CmsProvider: Send + Sync {
    async fn sink_for(&self, tenant: &TenantConfig) -> CmsResult<Arc<dyn ContentSink>>;
}

/// Hands every tenant the same sink. Used for single-site runs and tests.
pub struct StaticCmsProvider {
    sink: Arc<dyn ContentSink>,
}

impl StaticCmsProvider {
    pub fn new(sink: Arc<dyn ContentSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl CmsProvider for StaticCmsProvider {
    async fn sink_for(&self, _tenant: &TenantConfig) -> CmsResult<Arc<dyn ContentSink>> {
        Ok(Arc::clone(&self.sink))
    }
}

/// Builds an `FsCms` from tenant credentials of kind `directory`.
///
/// Relative endpoints resolve against `base`.
pub struct DirectoryCmsProvider {
    base: PathBuf,
}

impl DirectoryCmsProvider {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl CmsProvider for DirectoryCmsProvider {
    async fn sink_for(&self, tenant: &TenantConfig) -> CmsResult<Arc<dyn ContentSink>> {
        let creds = tenant
            .cms
            .as_ref()
            .ok_or_else(|| CmsError::NotConfigured(tenant.id.to_string()))?;
        match creds.kind.as_str() {
            "directory" | "fs" => {
                let root = self.base.join(&creds.endpoint);
                Ok(Arc::new(FsCms::new(root)))
            }
            other => Err(CmsError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seofix_state::{CmsCredentials, PlanTier, TenantId, TenantStatus};

    fn tenant(cms: Option<CmsCredentials>) -> TenantConfig {
        let now = chrono::Utc::now();
        TenantConfig {
            id: TenantId::from("t1"),
            name: "Bakery".into(),
            domain: "bakery.example".into(),
            plan: PlanTier::Starter,
            features: crate::tenant::plans::features_for(PlanTier::Starter),
            cms,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_page_path_normalises() {
        assert_eq!(page_path("https://bakery.example/menu/?a=1#top"), "/menu");
        assert_eq!(page_path("https://bakery.example"), "/");
        assert_eq!(page_path("menu/bread"), "/menu/bread");
        assert_eq!(page_path("/"), "/");
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: CmsResult<()> = bounded("read_page", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(CmsError::Timeout {
                operation: "read_page",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_directory_provider_requires_credentials() {
        let provider = DirectoryCmsProvider::new("/tmp");
        let err = provider.sink_for(&tenant(None)).await.err().unwrap();
        assert!(matches!(err, CmsError::NotConfigured(_)));

        let wp = CmsCredentials {
            kind: "wordpress".into(),
            endpoint: "https://bakery.example/wp-json".into(),
            username: Some("admin".into()),
            secret: Some("hunter2".into()),
        };
        let err = provider.sink_for(&tenant(Some(wp))).await.err().unwrap();
        assert!(matches!(err, CmsError::Unsupported(ref k) if k == "wordpress"));
    }

    #[tokio::test]
    async fn test_directory_provider_builds_fs_sink() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html><body></body></html>").unwrap();
        let creds = CmsCredentials {
            kind: "directory".into(),
            endpoint: ".".into(),
            username: None,
            secret: None,
        };
        let provider = DirectoryCmsProvider::new(dir.path());
        let sink = provider.sink_for(&tenant(Some(creds))).await.unwrap();
        assert!(sink.test_connection().await.unwrap());
        assert_eq!(sink.read_page("/").await.unwrap().page_id, "index.html");
    }
}
