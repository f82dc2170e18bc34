use effimig_extract::ExtractError;
use effimig_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A row names an author that has no target user. Aborts the batch.
    #[error("author {author:?} referenced by {referenced_by} has no target user")]
    MissingAuthor {
        author: String,
        referenced_by: String,
    },
    #[error("CMS user {uid} referenced by node {nid} does not exist")]
    MissingCmsUser { uid: i64, nid: i64 },
    #[error("driver {0} needs a legacy store that is not configured")]
    SourceNotConfigured(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
