//! Per-source row mapping: each legacy row becomes at most one target post plus
//! the redirects from the paths it used to live under.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use effimig_core::{
    DateFallback, LegacyArticle, LegacyNode, NaturalKey, RedirectRule, TargetPost, WriteMode,
    DEFAULT_AUTHOR_ID,
};
use effimig_extract::{
    infer_post_date, login_for, old_urls_for, post_name_for, repair_legacy_text,
    strip_title_heading, ArticleExtractor, DateOverride,
};
use effimig_storage::{LegacyCmsStore, LegacyWebStore, TargetStore};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::HandPickedPage;
use crate::error::SyncError;

/// How one source's posts are keyed, written and dated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceMapping {
    pub name: &'static str,
    pub natural_key: NaturalKey,
    pub write_mode: WriteMode,
    /// Mode for the redirects generated alongside each post.
    pub redirect_mode: WriteMode,
    pub date_fallback: DateFallback,
}

impl SourceMapping {
    pub const fn articles() -> Self {
        Self {
            name: "articles",
            natural_key: NaturalKey::Title,
            write_mode: WriteMode::InsertIfMissing,
            redirect_mode: WriteMode::InsertIfMissing,
            date_fallback: DateFallback::Skip,
        }
    }

    pub const fn pages() -> Self {
        Self {
            name: "pages",
            natural_key: NaturalKey::Slug,
            write_mode: WriteMode::Upsert,
            redirect_mode: WriteMode::InsertIfMissing,
            date_fallback: DateFallback::Now,
        }
    }

    pub const fn cms_nodes() -> Self {
        Self {
            name: "cms-nodes",
            natural_key: NaturalKey::Title,
            write_mode: WriteMode::InsertIfMissing,
            redirect_mode: WriteMode::InsertIfMissing,
            date_fallback: DateFallback::Skip,
        }
    }

    /// Date to use when inference found nothing; `None` drops the row.
    pub fn fallback_date(&self) -> Option<DateTime<Utc>> {
        match self.date_fallback {
            DateFallback::Now => Some(Utc::now()),
            DateFallback::Skip => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigratedPost {
    pub post: TargetPost,
    pub redirects: Vec<RedirectRule>,
}

impl MigratedPost {
    /// Post at `slug` with a redirect from every old url that differs from it.
    pub fn with_redirects_from(post: TargetPost, old_urls: &[String]) -> Self {
        let new_url = format!("/{}", post.slug);
        let redirects = old_urls
            .iter()
            .filter_map(|old| RedirectRule::permanent(old.as_str(), new_url.as_str()))
            .collect();
        Self { post, redirects }
    }
}

/// A legacy source the generic post driver can run.
#[async_trait]
pub trait PostSource: Send + Sync {
    type Row: Send + 'static;

    fn mapping(&self) -> SourceMapping;

    async fn fetch(&self) -> Result<Vec<Self::Row>, SyncError>;

    /// `Ok(None)` drops the row; errors abort the batch.
    async fn map_row(&self, row: Self::Row) -> Result<Option<MigratedPost>, SyncError>;
}

/// Target user id for a legacy author name; no name means the default author.
pub async fn resolve_author(
    target: &dyn TargetStore,
    author: Option<&str>,
    referenced_by: &str,
) -> Result<u64, SyncError> {
    let Some(author) = author.filter(|a| !a.is_empty()) else {
        return Ok(DEFAULT_AUTHOR_ID);
    };
    target
        .user_id_by_login(&login_for(author))
        .await?
        .ok_or_else(|| SyncError::MissingAuthor {
            author: author.to_string(),
            referenced_by: referenced_by.to_string(),
        })
}

/// Rows of the legacy `articles` table.
pub struct ArticleSource {
    web: Arc<dyn LegacyWebStore>,
    target: Arc<dyn TargetStore>,
    extractor: ArticleExtractor,
    date_overrides: Vec<DateOverride>,
}

impl ArticleSource {
    pub fn new(
        web: Arc<dyn LegacyWebStore>,
        target: Arc<dyn TargetStore>,
        extractor: ArticleExtractor,
        date_overrides: Vec<DateOverride>,
    ) -> Self {
        Self {
            web,
            target,
            extractor,
            date_overrides,
        }
    }
}

#[async_trait]
impl PostSource for ArticleSource {
    type Row = LegacyArticle;

    fn mapping(&self) -> SourceMapping {
        SourceMapping::articles()
    }

    async fn fetch(&self) -> Result<Vec<LegacyArticle>, SyncError> {
        Ok(self.web.articles().await?)
    }

    async fn map_row(&self, article: LegacyArticle) -> Result<Option<MigratedPost>, SyncError> {
        let author =
            resolve_author(self.target.as_ref(), article.author_name(), &article.linktarget)
                .await?;
        let Some(content) = self
            .extractor
            .extract(&article.linktarget, Some(&article.title))
            .await
        else {
            debug!(linktarget = %article.linktarget, "no article body");
            return Ok(None);
        };
        let date = infer_post_date(
            article.published,
            &content,
            &article.linktarget,
            &self.date_overrides,
        )
        .or_else(|| self.mapping().fallback_date());
        let Some(date) = date else {
            warn!(linktarget = %article.linktarget, "no publication date, skipping");
            return Ok(None);
        };

        let old_urls = old_urls_for([article.linktarget.as_str(), article.filename.as_str()]);
        let post = TargetPost::published(
            author,
            date,
            article.title,
            post_name_for(&article.linktarget),
            content,
            article.summary.unwrap_or_default(),
        );
        Ok(Some(MigratedPost::with_redirects_from(post, &old_urls)))
    }
}

/// Hand-picked pages that live on disk but not in the articles table.
pub struct PageSource {
    pages: Vec<HandPickedPage>,
    target: Arc<dyn TargetStore>,
    extractor: ArticleExtractor,
    date_overrides: Vec<DateOverride>,
}

impl PageSource {
    pub fn new(
        pages: Vec<HandPickedPage>,
        target: Arc<dyn TargetStore>,
        extractor: ArticleExtractor,
        date_overrides: Vec<DateOverride>,
    ) -> Self {
        Self {
            pages,
            target,
            extractor,
            date_overrides,
        }
    }
}

#[async_trait]
impl PostSource for PageSource {
    type Row = HandPickedPage;

    fn mapping(&self) -> SourceMapping {
        SourceMapping::pages()
    }

    async fn fetch(&self) -> Result<Vec<HandPickedPage>, SyncError> {
        Ok(self.pages.clone())
    }

    async fn map_row(&self, page: HandPickedPage) -> Result<Option<MigratedPost>, SyncError> {
        let author = resolve_author(self.target.as_ref(), page.author.as_deref(), &page.path).await?;
        let title = match page.title {
            Some(title) => title,
            None => match self.extractor.page_title(&page.path).await {
                Some(title) => title,
                None => {
                    warn!(path = %page.path, "page has no title, skipping");
                    return Ok(None);
                }
            },
        };
        let Some(content) = self.extractor.extract(&page.path, Some(&title)).await else {
            debug!(path = %page.path, "no page body");
            return Ok(None);
        };
        let date = infer_post_date(page.published, &content, &page.path, &self.date_overrides)
            .or_else(|| self.mapping().fallback_date());
        let Some(date) = date else {
            return Ok(None);
        };

        let old_urls = old_urls_for([page.path.as_str()]);
        let post = TargetPost::published(
            author,
            date,
            title,
            post_name_for(&page.path),
            content,
            "",
        );
        Ok(Some(MigratedPost::with_redirects_from(post, &old_urls)))
    }
}

/// Nodes of the CMS, reachable through their url aliases.
pub struct NodeSource {
    cms: Arc<dyn LegacyCmsStore>,
    target: Arc<dyn TargetStore>,
}

impl NodeSource {
    pub fn new(cms: Arc<dyn LegacyCmsStore>, target: Arc<dyn TargetStore>) -> Self {
        Self { cms, target }
    }

    async fn author_for(&self, node: &LegacyNode) -> Result<u64, SyncError> {
        let user = self
            .cms
            .user_by_uid(node.uid)
            .await?
            .ok_or(SyncError::MissingCmsUser {
                uid: node.uid,
                nid: node.nid,
            })?;
        let login = login_for(&user.name);
        self.target
            .user_id_by_login(&login)
            .await?
            .ok_or_else(|| SyncError::MissingAuthor {
                author: user.name,
                referenced_by: node.internal_path(),
            })
    }
}

#[async_trait]
impl PostSource for NodeSource {
    type Row = LegacyNode;

    fn mapping(&self) -> SourceMapping {
        SourceMapping::cms_nodes()
    }

    async fn fetch(&self) -> Result<Vec<LegacyNode>, SyncError> {
        Ok(self.cms.nodes().await?)
    }

    async fn map_row(&self, node: LegacyNode) -> Result<Option<MigratedPost>, SyncError> {
        if node.body.is_empty() {
            debug!(nid = node.nid, "empty node body");
            return Ok(None);
        }
        let author = self.author_for(&node).await?;
        let aliases = self.cms.aliases_for(&node.internal_path()).await?;
        let Some(canonical) = aliases.first() else {
            debug!(nid = node.nid, "node has no url alias");
            return Ok(None);
        };
        let Some(date) = Utc.timestamp_opt(node.created, 0).single() else {
            warn!(nid = node.nid, created = node.created, "node creation time out of range");
            return Ok(None);
        };

        let slug = post_name_for(&canonical.dst);
        let old_urls = old_urls_for(aliases.iter().map(|a| a.dst.as_str()));
        let body = strip_title_heading(&node.body, &node.title)?;
        let post = TargetPost::published(
            author,
            date,
            repair_legacy_text(&node.title),
            slug,
            repair_legacy_text(&body),
            repair_legacy_text(&node.teaser),
        );
        Ok(Some(MigratedPost::with_redirects_from(post, &old_urls)))
    }
}
