use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::{html, page_path, CmsError, CmsResult, ContentSink};
use crate::domain::{AppliedChange, ChangeSet, PageSnapshot};

/// A site stored as a directory of `.html` files.
///
/// `/` maps to `index.html`; `/menu` maps to `menu.html`, or to
/// `menu/index.html` when that file exists. Page ids are paths relative to the
/// root. Writes go through a temp file and rename so a crash never leaves a
/// half-written page.
#[derive(Debug, Clone)]
pub struct FsCms {
    root: PathBuf,
}

impl FsCms {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, url: &str) -> CmsResult<String> {
        let path = page_path(url);
        let rel = path.trim_start_matches('/');
        if Path::new(rel)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CmsError::Rejected(format!("path escapes site root: {url}")));
        }
        if rel.is_empty() {
            return Ok("index.html".to_string());
        }
        if rel.ends_with(".html") || rel.ends_with(".htm") {
            return Ok(rel.to_string());
        }
        let nested = format!("{rel}/index.html");
        if self.root.join(&nested).is_file() {
            Ok(nested)
        } else {
            Ok(format!("{rel}.html"))
        }
    }

    fn file_for(&self, page_id: &str) -> CmsResult<PathBuf> {
        if Path::new(page_id)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CmsError::Rejected(format!("invalid page id: {page_id}")));
        }
        Ok(self.root.join(page_id))
    }

    async fn read_file(&self, page_id: &str) -> CmsResult<String> {
        let path = self.file_for(page_id)?;
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CmsError::PageNotFound(page_id.to_string())
            } else {
                CmsError::Io(e)
            }
        })
    }

    async fn write_file(&self, page_id: &str, contents: String) -> CmsResult<()> {
        let path = self.file_for(page_id)?;
        tokio::task::spawn_blocking(move || write_atomic(&path, contents.as_bytes()))
            .await
            .map_err(|e| CmsError::Io(std::io::Error::other(e)))?
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> CmsResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| CmsError::Rejected(format!("no parent directory: {}", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CmsError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl ContentSink for FsCms {
    async fn test_connection(&self) -> CmsResult<bool> {
        Ok(tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn read_page(&self, url: &str) -> CmsResult<PageSnapshot> {
        let page_id = self.resolve(url)?;
        let html = self.read_file(&page_id).await?;
        Ok(PageSnapshot::new(page_id, url, html))
    }

    async fn apply_change(&self, page_id: &str, change: &ChangeSet) -> CmsResult<AppliedChange> {
        let current = self.read_file(page_id).await?;
        let (updated, applied) = html::apply_change(&current, change)?;
        self.write_file(page_id, updated).await?;
        Ok(applied)
    }

    async fn revert(&self, page_id: &str, snapshot: &PageSnapshot) -> CmsResult<bool> {
        self.write_file(page_id, snapshot.html.clone()).await?;
        let restored = self.read_file(page_id).await?;
        Ok(restored == snapshot.html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeAction;

    fn site() -> (tempfile::TempDir, FsCms) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html><body><p>home</p></body></html>").unwrap();
        std::fs::write(dir.path().join("about.html"), "<html><body></body></html>").unwrap();
        std::fs::create_dir(dir.path().join("blog")).unwrap();
        std::fs::write(dir.path().join("blog/index.html"), "<html><body></body></html>").unwrap();
        let cms = FsCms::new(dir.path());
        (dir, cms)
    }

    #[tokio::test]
    async fn test_url_resolution() {
        let (_dir, cms) = site();
        assert_eq!(cms.read_page("https://x.example/").await.unwrap().page_id, "index.html");
        assert_eq!(cms.read_page("/about/").await.unwrap().page_id, "about.html");
        assert_eq!(cms.read_page("/blog").await.unwrap().page_id, "blog/index.html");
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_dir, cms) = site();
        assert!(matches!(
            cms.read_page("/../etc/passwd").await,
            Err(CmsError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_and_revert_on_disk() {
        let (dir, cms) = site();
        let snap = cms.read_page("/about").await.unwrap();
        let change = ChangeSet::new("body", ChangeAction::Add, "<h1>About</h1>");
        cms.apply_change(&snap.page_id, &change).await.unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join("about.html")).unwrap();
        assert_eq!(on_disk, "<html><body><h1>About</h1></body></html>");

        assert!(cms.revert(&snap.page_id, &snap).await.unwrap());
        let on_disk = std::fs::read_to_string(dir.path().join("about.html")).unwrap();
        assert_eq!(on_disk, snap.html);
    }

    #[tokio::test]
    async fn test_missing_page_and_connection() {
        let (_dir, cms) = site();
        assert!(cms.test_connection().await.unwrap());
        assert!(matches!(
            cms.read_page("/contact").await,
            Err(CmsError::PageNotFound(_))
        ));
        let gone = FsCms::new("/definitely/not/here");
        assert!(!gone.test_connection().await.unwrap());
    }
}
