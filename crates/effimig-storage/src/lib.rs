//! Legacy store readers, the WordPress target writer and upload file storage.

use async_trait::async_trait;
use effimig_core::{
    CategoryTerm, LegacyArticle, LegacyNode, LegacyUser, NaturalKey, PostPath, RedirectRule,
    TargetPost, TargetUser, UpsertOutcome, UrlAlias, WriteMode,
};
use thiserror::Error;

pub mod legacy;
pub mod memory;
pub mod target;
pub mod uploads;

pub use legacy::{PgLegacyCmsStore, PgLegacyWebStore};
pub use memory::{MemorySnapshot, MemoryTargetStore};
pub use target::MySqlTargetStore;
pub use uploads::{scan_attachments, AttachmentFilter, CopiedAttachment, UploadsStore};

pub const CRATE_NAME: &str = "effimig-storage";

/// Connection ceiling per store; the migration is a single-operator batch job.
pub const POOL_MAX_CONNECTIONS: u32 = 3;
pub const POOL_MIN_CONNECTIONS: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("category {0} has no taxonomy row")]
    MissingTaxonomy(String),
}

/// Read side of the hand-rolled articles database.
#[async_trait]
pub trait LegacyWebStore: Send + Sync {
    async fn articles(&self) -> Result<Vec<LegacyArticle>, StoreError>;

    /// Distinct non-empty author names.
    async fn article_authors(&self) -> Result<Vec<String>, StoreError>;
}

/// Read side of the CMS database.
#[async_trait]
pub trait LegacyCmsStore: Send + Sync {
    async fn users(&self) -> Result<Vec<LegacyUser>, StoreError>;

    async fn user_by_uid(&self, uid: i64) -> Result<Option<LegacyUser>, StoreError>;

    async fn nodes(&self) -> Result<Vec<LegacyNode>, StoreError>;

    /// Aliases whose `src` equals `src`, in store order.
    async fn aliases_for(&self, src: &str) -> Result<Vec<UrlAlias>, StoreError>;
}

/// Write side of the WordPress schema. Every write is a single statement keyed
/// on a natural key, so reruns never duplicate rows.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Make sure the unique indexes backing the natural keys exist.
    async fn ensure_natural_keys(&self, post_keys: &[NaturalKey]) -> Result<(), StoreError>;

    async fn write_user(&self, user: &TargetUser, mode: WriteMode)
        -> Result<UpsertOutcome, StoreError>;

    async fn user_id_by_login(&self, login: &str) -> Result<Option<u64>, StoreError>;

    async fn write_post(
        &self,
        post: &TargetPost,
        key: NaturalKey,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn write_redirect(
        &self,
        rule: &RedirectRule,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Create the category term and taxonomy rows if needed; returns the `term_taxonomy_id`.
    async fn ensure_category(&self, term: &CategoryTerm) -> Result<u64, StoreError>;

    /// Old paths of migrated posts: redirect sources whose target is `/<post slug>`.
    async fn post_redirect_sources(&self) -> Result<Vec<PostPath>, StoreError>;

    async fn relate_post(
        &self,
        post_id: u64,
        term_taxonomy_id: u64,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Recompute category post counts; returns the number of taxonomy rows touched.
    async fn recount_categories(&self) -> Result<u64, StoreError>;
}
