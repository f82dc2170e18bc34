//! Pure content transformations applied to legacy rows before they are written
//! to the WordPress schema.

use std::path::PathBuf;

use thiserror::Error;

pub mod article;
pub mod category;
pub mod dates;
pub mod encoding;
pub mod links;
pub mod redirects;
pub mod slug;
pub mod text;
pub mod title;

pub use article::{extract_body, ArticleExtractor};
pub use category::{match_category, CategoryRule};
pub use dates::{date_from_content, infer_post_date, legacy_utc_date, DateOverride};
pub use encoding::{detect_charset_token, resolve_charset_token, resolve_file_encoding};
pub use links::{dirname, LinkRewriter};
pub use redirects::{parse_redirect_file, ParsedRedirects, RedirectPair};
pub use slug::{login_for, old_urls_for, post_name_for, strip_index_html};
pub use text::{repair_legacy_text, strip_title_heading};
pub use title::page_title_from_html;

pub const CRATE_NAME: &str = "effimig-extract";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown charset token {0:?}")]
    UnknownCharset(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}
