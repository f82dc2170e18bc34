//! Core domain records for the legacy effi content → WordPress migration.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "effimig-core";

pub const POST_STATUS_PUBLISH: &str = "publish";
pub const POST_TYPE_POST: &str = "post";
pub const COMMENT_STATUS_CLOSED: &str = "closed";
pub const PING_STATUS_OPEN: &str = "open";

/// Placeholder stored in password/email columns of users that must never log in.
pub const DISABLED_CREDENTIAL: &str = "disabled";

/// Target user id used for legacy articles without an author.
pub const DEFAULT_AUTHOR_ID: u64 = 1;

pub const UPLOADS_URL_PREFIX: &str = "/wp-content/uploads";
pub const CATEGORY_TAXONOMY: &str = "category";

pub const REDIRECT_GROUP_ID: u32 = 1;
pub const REDIRECT_STATUS_ENABLED: &str = "enabled";
pub const REDIRECT_ACTION_URL: &str = "url";
pub const REDIRECT_MATCH_URL: &str = "url";
pub const REDIRECT_HTTP_PERMANENT: u16 = 301;

/// Row of the hand-rolled `articles` table. Bodies live on disk under the article root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyArticle {
    pub linktarget: String,
    pub filename: String,
    pub author: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl LegacyArticle {
    /// Author name if present and non-empty.
    pub fn author_name(&self) -> Option<&str> {
        self.author.as_deref().filter(|a| !a.is_empty())
    }
}

/// Row of the CMS `node` table. Text columns are stored in the legacy encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyNode {
    pub nid: i64,
    pub uid: i64,
    pub title: String,
    pub body: String,
    pub teaser: String,
    pub created: i64,
}

impl LegacyNode {
    /// Internal CMS path the `url_alias` table refers to.
    pub fn internal_path(&self) -> String {
        format!("node/{}", self.nid)
    }
}

/// Row of the CMS `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyUser {
    pub uid: i64,
    pub name: String,
    pub pass: String,
    pub mail: String,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlAlias {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    pub login: String,
    pub pass: String,
    pub nicename: String,
    pub email: String,
    pub display_name: String,
    pub registered: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPost {
    pub author: u64,
    pub date: DateTime<Utc>,
    pub content: String,
    pub title: String,
    pub status: String,
    pub slug: String,
    pub comment_status: String,
    pub ping_status: String,
    pub excerpt: String,
    pub post_type: String,
}

impl TargetPost {
    /// A published post with the constant comment/ping policy used for migrated content.
    pub fn published(
        author: u64,
        date: DateTime<Utc>,
        title: impl Into<String>,
        slug: impl Into<String>,
        content: impl Into<String>,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            author,
            date,
            content: content.into(),
            title: title.into(),
            status: POST_STATUS_PUBLISH.to_string(),
            slug: slug.into(),
            comment_status: COMMENT_STATUS_CLOSED.to_string(),
            ping_status: PING_STATUS_OPEN.to_string(),
            excerpt: excerpt.into(),
            post_type: POST_TYPE_POST.to_string(),
        }
    }

    pub fn natural_key(&self, key: NaturalKey) -> &str {
        match key {
            NaturalKey::Title => &self.title,
            NaturalKey::Slug => &self.slug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRule {
    pub url: String,
    pub action_data: String,
    pub regex: bool,
    pub position: u32,
    pub group_id: u32,
    pub status: String,
    pub action_type: String,
    pub action_code: u16,
    pub match_type: String,
    pub last_access: DateTime<Utc>,
}

impl RedirectRule {
    /// Plain-url 301 rule from `source` to `target`, or `None` when both are the same path.
    pub fn permanent(source: impl Into<String>, target: impl Into<String>) -> Option<Self> {
        let url = source.into();
        let action_data = target.into();
        if url == action_data {
            return None;
        }
        Some(Self {
            url,
            action_data,
            regex: false,
            position: 0,
            group_id: REDIRECT_GROUP_ID,
            status: REDIRECT_STATUS_ENABLED.to_string(),
            action_type: REDIRECT_ACTION_URL.to_string(),
            action_code: REDIRECT_HTTP_PERMANENT,
            match_type: REDIRECT_MATCH_URL.to_string(),
            last_access: never_accessed(),
        })
    }
}

/// `last_access` value for rules that have never been hit.
pub fn never_accessed() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTerm {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermTaxonomy {
    pub term_taxonomy_id: u64,
    pub term_id: u64,
    pub taxonomy: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRelationship {
    pub object_id: u64,
    pub term_taxonomy_id: u64,
}

/// Old path of a migrated post, as recorded by its redirect rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPath {
    pub post_id: u64,
    pub url: String,
}

/// Column a post is matched on when deciding insert vs. update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NaturalKey {
    Title,
    Slug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Insert when the natural key is absent, otherwise leave the stored row alone.
    InsertIfMissing,
    /// Insert when absent, otherwise overwrite every supplied field.
    Upsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// What to do with an article for which no date could be inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFallback {
    Now,
    Skip,
}
