use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::StoreError;

/// Which files of the legacy site tree count as attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFilter {
    /// Directories (relative to the root) that are skipped with everything below them.
    pub prune_dirs: Vec<String>,
    pub exclude_contains: Vec<String>,
    pub exclude_suffixes: Vec<String>,
}

impl Default for AttachmentFilter {
    fn default() -> Self {
        Self {
            prune_dirs: vec!["meta/lib".to_string()],
            exclude_contains: vec![".htaccess".to_string()],
            exclude_suffixes: [".html", "~", ".inc", ".php"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl AttachmentFilter {
    fn prunes(&self, rel: &str) -> bool {
        self.prune_dirs
            .iter()
            .any(|dir| rel == dir || rel.starts_with(&format!("{dir}/")))
    }

    pub fn accepts(&self, rel: &str) -> bool {
        !self.prunes(rel)
            && !self.exclude_contains.iter().any(|s| rel.contains(s.as_str()))
            && !self.exclude_suffixes.iter().any(|s| rel.ends_with(s.as_str()))
    }
}

fn io_error(context: String) -> impl FnOnce(std::io::Error) -> StoreError {
    move |source| StoreError::Io { context, source }
}

fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Regular files under `root` accepted by `filter`, as sorted `/`-separated relative paths.
pub fn scan_attachments(root: &Path, filter: &AttachmentFilter) -> Result<Vec<String>, StoreError> {
    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !entry.file_type().is_dir()
                || relative_slash_path(root, entry.path()).map_or(true, |rel| !filter.prunes(&rel))
        });
    for entry in walker {
        let entry = entry.map_err(|err| StoreError::Io {
            context: format!("walking {}", root.display()),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(rel) = relative_slash_path(root, entry.path()) {
            if filter.accepts(&rel) {
                out.push(rel);
            }
        }
    }
    out.sort();
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct CopiedAttachment {
    pub content_hash: String,
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    /// The destination already held identical bytes.
    pub deduplicated: bool,
}

/// The WordPress uploads directory.
#[derive(Debug, Clone)]
pub struct UploadsStore {
    root: PathBuf,
}

impl UploadsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Copy `source_root/rel` to the same relative path under the uploads root,
    /// going through a temp file and a rename so a reader never sees half a file.
    pub async fn copy_in(
        &self,
        source_root: &Path,
        rel: &str,
    ) -> Result<CopiedAttachment, StoreError> {
        let source = source_root.join(rel);
        let bytes = fs::read(&source)
            .await
            .map_err(io_error(format!("reading attachment {}", source.display())))?;
        let content_hash = Self::sha256_hex(&bytes);
        let absolute_path = self.root.join(rel);
        let copied = |deduplicated| CopiedAttachment {
            content_hash: content_hash.clone(),
            relative_path: rel.to_string(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .await
            .map_err(io_error(format!("creating upload directory {}", parent.display())))?;

        if let Ok(existing) = fs::read(&absolute_path).await {
            if Self::sha256_hex(&existing) == content_hash {
                debug!(path = rel, "attachment already in place");
                return Ok(copied(true));
            }
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(io_error(format!("opening temp upload {}", temp_path.display())))?;
        file.write_all(&bytes)
            .await
            .map_err(io_error(format!("writing temp upload {}", temp_path.display())))?;
        file.flush()
            .await
            .map_err(io_error(format!("flushing temp upload {}", temp_path.display())))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(copied(false)),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(StoreError::Io {
                    context: format!(
                        "renaming temp upload {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    ),
                    source: err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, bytes).expect("write");
    }

    #[test]
    fn default_filter_matches_legacy_exclusions() {
        let filter = AttachmentFilter::default();
        assert!(filter.accepts("julkaisut/esite.pdf"));
        assert!(!filter.accepts("index.html"));
        assert!(!filter.accepts("meta/nav.inc"));
        assert!(!filter.accepts("lomake.php"));
        assert!(!filter.accepts("teksti.txt~"));
        assert!(!filter.accepts("sub/.htaccess"));
        assert!(!filter.accepts("meta/lib/jquery.js"));
        assert!(filter.accepts("meta/library.js"));
    }

    #[test]
    fn scan_prunes_and_sorts() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), "b/kuva.png", b"png");
        touch(dir.path(), "a/esite.pdf", b"pdf");
        touch(dir.path(), "a/index.html", b"<html>");
        touch(dir.path(), "meta/lib/x.js", b"js");

        let found = scan_attachments(dir.path(), &AttachmentFilter::default()).expect("scan");
        assert_eq!(found, vec!["a/esite.pdf".to_string(), "b/kuva.png".to_string()]);
    }

    #[tokio::test]
    async fn copy_in_deduplicates_identical_bytes() {
        let source = tempdir().expect("source");
        let uploads = tempdir().expect("uploads");
        touch(source.path(), "julkaisut/esite.pdf", b"%PDF-1.4 esite");
        let store = UploadsStore::new(uploads.path());

        let first = store
            .copy_in(source.path(), "julkaisut/esite.pdf")
            .await
            .expect("first copy");
        let second = store
            .copy_in(source.path(), "julkaisut/esite.pdf")
            .await
            .expect("second copy");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.byte_size, 14);
        assert_eq!(
            std::fs::read(uploads.path().join("julkaisut/esite.pdf")).expect("read"),
            b"%PDF-1.4 esite"
        );
    }

    #[tokio::test]
    async fn copy_in_replaces_changed_file() {
        let source = tempdir().expect("source");
        let uploads = tempdir().expect("uploads");
        touch(source.path(), "kuva.png", b"uusi");
        touch(uploads.path(), "kuva.png", b"vanha");

        let copied = UploadsStore::new(uploads.path())
            .copy_in(source.path(), "kuva.png")
            .await
            .expect("copy");
        assert!(!copied.deduplicated);
        assert_eq!(std::fs::read(uploads.path().join("kuva.png")).expect("read"), b"uusi");
    }
}
