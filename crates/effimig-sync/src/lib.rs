//! Migration drivers: configuration, per-source mappings, the generic post
//! driver and run reports.

pub mod config;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod report;

pub use config::{AttachmentRules, HandPickedPage, MigrationRules, SyncConfig};
pub use drivers::{DriverKind, Migrator};
pub use error::SyncError;
pub use logging::{init_logging, DEFAULT_LOG_FILTER};
pub use mapping::{
    resolve_author, ArticleSource, MigratedPost, NodeSource, PageSource, PostSource,
    SourceMapping,
};
pub use report::{DriverReport, RunSummary, WriteCounts};

pub const CRATE_NAME: &str = "effimig-sync";
