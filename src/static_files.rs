//! Static-resource fallback for read-only requests no route claimed.

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use tracing::debug;

use crate::error::JoltResult;
use crate::router::normalize_path;

/// A resolved static file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAsset {
    pub data: Bytes,
    pub content_type: &'static str,
}

/// Boxed future returned by [`ResourceResolver::resolve`].
pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = JoltResult<Option<StaticAsset>>> + Send + 'a>>;

/// Looks up a static resource for a normalized request path.
///
/// `Ok(None)` means "not here" and lets the pipeline fall through to 404/405.
pub trait ResourceResolver: Send + Sync + 'static {
    fn resolve<'a>(&'a self, path: &'a str) -> ResolveFuture<'a>;
}

/// Serves files from a directory mounted at a URL prefix.
///
/// With the default mount `/`, `GET /css/site.css` reads `<dir>/css/site.css`.
/// Paths containing `..` or other non-normal components never resolve.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    dir: PathBuf,
    mount: String,
}

impl StaticFiles {
    /// Serves files under `dir`, mounted at `/`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mount: "/".to_owned(),
        }
    }

    /// Only serve request paths under `mount`, stripping it before lookup.
    #[must_use]
    pub fn mount(mut self, mount: &str) -> Self {
        self.mount = normalize_path(mount);
        self
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let rest = if self.mount == "/" {
            url_path
        } else {
            let rest = url_path.strip_prefix(self.mount.as_str())?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return None;
            }
            rest
        };

        let mut path = self.dir.clone();
        let mut pushed = false;
        for comp in Path::new(rest.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => {
                    path.push(s);
                    pushed = true;
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        pushed.then_some(path)
    }
}

/// Content type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

impl ResourceResolver for StaticFiles {
    fn resolve<'a>(&'a self, path: &'a str) -> ResolveFuture<'a> {
        Box::pin(async move {
            let Some(file) = self.map_path(path) else {
                return Ok(None);
            };
            match tokio::fs::metadata(&file).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            let data = tokio::fs::read(&file).await?;
            debug!(path, file = %file.display(), bytes = data.len(), "static resource");
            Ok(Some(StaticAsset {
                data: Bytes::from(data),
                content_type: content_type_for(&file),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        std::fs::write(dir.path().join("hello.txt"), "Hello\n").unwrap();
        dir
    }

    #[test]
    fn map_path_prevents_traversal() {
        let sf = StaticFiles::new("/srv/public");
        assert!(sf.map_path("/../etc/passwd").is_none());
        assert!(sf.map_path("/").is_none());
        assert_eq!(sf.map_path("/a/b.txt"), Some(PathBuf::from("/srv/public/a/b.txt")));
    }

    #[test]
    fn mount_prefix_is_stripped() {
        let sf = StaticFiles::new("/srv/public").mount("/assets/");
        assert_eq!(sf.map_path("/assets/app.js"), Some(PathBuf::from("/srv/public/app.js")));
        assert!(sf.map_path("/assetsX/app.js").is_none());
        assert!(sf.map_path("/other/app.js").is_none());
    }

    #[tokio::test]
    async fn resolves_existing_files_with_content_type() {
        let dir = fixture();
        let sf = StaticFiles::new(dir.path());

        let asset = sf.resolve("/css/site.css").await.unwrap().unwrap();
        assert_eq!(asset.content_type, "text/css; charset=utf-8");
        assert_eq!(asset.data.as_ref(), b"body{}");

        let asset = sf.resolve("/hello.txt").await.unwrap().unwrap();
        assert_eq!(asset.content_type, "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn missing_files_and_directories_do_not_resolve() {
        let dir = fixture();
        let sf = StaticFiles::new(dir.path());
        assert!(sf.resolve("/missing.png").await.unwrap().is_none());
        assert!(sf.resolve("/css").await.unwrap().is_none());
    }
}
