use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use effimig_core::{
    CategoryTerm, NaturalKey, RedirectRule, TargetUser, UpsertOutcome, WriteMode,
    DISABLED_CREDENTIAL, UPLOADS_URL_PREFIX,
};
use effimig_extract::{login_for, match_category, parse_redirect_file, ArticleExtractor, LinkRewriter};
use effimig_storage::{
    scan_attachments, LegacyCmsStore, LegacyWebStore, StoreError, TargetStore, UploadsStore,
};
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{MigrationRules, SyncConfig};
use crate::error::SyncError;
use crate::mapping::{ArticleSource, NodeSource, PageSource, PostSource, SourceMapping};
use crate::report::DriverReport;

/// The batch jobs, in the order `all` runs them. Authors must exist before the
/// posts that reference them, and posts before their categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    CmsUsers,
    ArticleAuthors,
    CmsNodes,
    Articles,
    Pages,
    Attachments,
    Categories,
}

impl DriverKind {
    pub const ALL: [DriverKind; 7] = [
        DriverKind::CmsUsers,
        DriverKind::ArticleAuthors,
        DriverKind::CmsNodes,
        DriverKind::Articles,
        DriverKind::Pages,
        DriverKind::Attachments,
        DriverKind::Categories,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DriverKind::CmsUsers => "cms-users",
            DriverKind::ArticleAuthors => "article-authors",
            DriverKind::CmsNodes => "cms-nodes",
            DriverKind::Articles => "articles",
            DriverKind::Pages => "pages",
            DriverKind::Attachments => "attachments",
            DriverKind::Categories => "categories",
        }
    }

    /// Post natural key the driver writes with, if it writes posts.
    pub fn post_key(self) -> Option<NaturalKey> {
        match self {
            DriverKind::CmsNodes => Some(SourceMapping::cms_nodes().natural_key),
            DriverKind::Articles => Some(SourceMapping::articles().natural_key),
            DriverKind::Pages => Some(SourceMapping::pages().natural_key),
            _ => None,
        }
    }
}

fn unix_date(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub struct Migrator {
    config: SyncConfig,
    rules: MigrationRules,
    target: Arc<dyn TargetStore>,
    web: Option<Arc<dyn LegacyWebStore>>,
    cms: Option<Arc<dyn LegacyCmsStore>>,
    copy_files: bool,
}

impl Migrator {
    pub fn new(config: SyncConfig, rules: MigrationRules, target: Arc<dyn TargetStore>) -> Self {
        Self {
            config,
            rules,
            target,
            web: None,
            cms: None,
            copy_files: true,
        }
    }

    pub fn with_web(mut self, web: Arc<dyn LegacyWebStore>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn with_cms(mut self, cms: Arc<dyn LegacyCmsStore>) -> Self {
        self.cms = Some(cms);
        self
    }

    /// Dry runs record attachment redirects without touching the uploads tree.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.copy_files = !dry_run;
        self
    }

    fn web(&self, driver: &'static str) -> Result<Arc<dyn LegacyWebStore>, SyncError> {
        self.web.clone().ok_or(SyncError::SourceNotConfigured(driver))
    }

    fn cms(&self, driver: &'static str) -> Result<Arc<dyn LegacyCmsStore>, SyncError> {
        self.cms.clone().ok_or(SyncError::SourceNotConfigured(driver))
    }

    fn extractor(&self) -> ArticleExtractor {
        ArticleExtractor::new(
            self.config.article_root.clone(),
            LinkRewriter::new(self.rules.mail_domain.clone()),
        )
    }

    fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Create the unique indexes the drivers in `kinds` write through.
    pub async fn prepare(&self, kinds: &[DriverKind]) -> Result<(), SyncError> {
        let mut keys: Vec<NaturalKey> = Vec::new();
        for key in kinds.iter().filter_map(|k| k.post_key()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        info!(?keys, "ensuring natural-key indexes");
        self.target.ensure_natural_keys(&keys).await?;
        Ok(())
    }

    pub async fn run(&self, kind: DriverKind) -> Result<DriverReport, SyncError> {
        let span = info_span!("driver", name = kind.name());
        let report = async {
            match kind {
                DriverKind::CmsUsers => self.migrate_cms_users().await,
                DriverKind::ArticleAuthors => self.migrate_article_authors().await,
                DriverKind::CmsNodes => self.migrate_cms_nodes().await,
                DriverKind::Articles => self.migrate_articles().await,
                DriverKind::Pages => self.migrate_pages().await,
                DriverKind::Attachments => self.migrate_attachments().await,
                DriverKind::Categories => self.assign_categories().await,
            }
        }
        .instrument(span)
        .await?;
        info!(
            driver = %report.driver,
            fetched = report.fetched,
            skipped = report.skipped,
            posts = report.posts.total(),
            redirects = report.redirects.total(),
            "driver finished"
        );
        Ok(report)
    }

    /// Every driver in dependency order, then the redirect file if one is given.
    pub async fn run_all(&self, redirect_file: Option<&Path>) -> Result<Vec<DriverReport>, SyncError> {
        let mut reports = Vec::new();
        for kind in DriverKind::ALL {
            reports.push(self.run(kind).await?);
        }
        if let Some(path) = redirect_file {
            reports.push(self.import_redirect_file(path).await?);
        }
        Ok(reports)
    }

    /// Fetch, map and write one post source with bounded concurrency.
    pub async fn run_post_source<S: PostSource>(&self, source: &S) -> Result<DriverReport, SyncError> {
        let mapping = source.mapping();
        let rows = source.fetch().await?;
        let mut report = DriverReport::new(mapping.name);
        report.fetched = rows.len();

        let target = self.target.as_ref();
        let written: Vec<Option<(UpsertOutcome, Vec<UpsertOutcome>)>> = stream::iter(rows)
            .map(|row| async move {
                let Some(migrated) = source.map_row(row).await? else {
                    return Ok::<_, SyncError>(None);
                };
                let mut redirects = Vec::with_capacity(migrated.redirects.len());
                for rule in &migrated.redirects {
                    redirects.push(target.write_redirect(rule, mapping.redirect_mode).await?);
                }
                let post = target
                    .write_post(&migrated.post, mapping.natural_key, mapping.write_mode)
                    .await?;
                debug!(slug = %migrated.post.slug, ?post, "post written");
                Ok(Some((post, redirects)))
            })
            .buffer_unordered(self.concurrency())
            .try_collect()
            .await?;

        for outcome in written {
            match outcome {
                None => report.skipped += 1,
                Some((post, redirects)) => {
                    report.posts.record(post);
                    for redirect in redirects {
                        report.redirects.record(redirect);
                    }
                }
            }
        }
        Ok(report)
    }

    async fn write_users(
        &self,
        report: &mut DriverReport,
        users: Vec<TargetUser>,
        mode: WriteMode,
    ) -> Result<(), SyncError> {
        let target = self.target.as_ref();
        let outcomes: Vec<UpsertOutcome> = stream::iter(users)
            .map(|user| async move { target.write_user(&user, mode).await })
            .buffer_unordered(self.concurrency())
            .try_collect()
            .await?;
        for outcome in outcomes {
            report.users.record(outcome);
        }
        Ok(())
    }

    pub async fn migrate_cms_users(&self) -> Result<DriverReport, SyncError> {
        let cms = self.cms(DriverKind::CmsUsers.name())?;
        let legacy = cms.users().await?;
        let mut report = DriverReport::new(DriverKind::CmsUsers.name());
        report.fetched = legacy.len();

        let mut users = Vec::with_capacity(legacy.len());
        for user in legacy {
            let login = login_for(&user.name);
            if login.is_empty() {
                debug!(uid = user.uid, "user name has no letters, skipping");
                report.skipped += 1;
                continue;
            }
            users.push(TargetUser {
                nicename: login.clone(),
                login,
                pass: user.pass,
                email: user.mail,
                display_name: user.name,
                registered: unix_date(user.created),
            });
        }
        self.write_users(&mut report, users, WriteMode::Upsert).await?;
        Ok(report)
    }

    pub async fn migrate_article_authors(&self) -> Result<DriverReport, SyncError> {
        let web = self.web(DriverKind::ArticleAuthors.name())?;
        let authors = web.article_authors().await?;
        let mut report = DriverReport::new(DriverKind::ArticleAuthors.name());
        report.fetched = authors.len();

        let mut users = Vec::with_capacity(authors.len());
        for author in authors {
            let login = login_for(&author);
            if login.is_empty() {
                warn!(%author, "author name has no letters, skipping");
                report.skipped += 1;
                continue;
            }
            users.push(TargetUser {
                nicename: login.clone(),
                login,
                pass: DISABLED_CREDENTIAL.to_string(),
                email: DISABLED_CREDENTIAL.to_string(),
                display_name: author,
                registered: DateTime::<Utc>::UNIX_EPOCH,
            });
        }
        self.write_users(&mut report, users, WriteMode::InsertIfMissing)
            .await?;
        Ok(report)
    }

    pub async fn migrate_cms_nodes(&self) -> Result<DriverReport, SyncError> {
        let cms = self.cms(DriverKind::CmsNodes.name())?;
        let source = NodeSource::new(cms, self.target.clone());
        self.run_post_source(&source).await
    }

    pub async fn migrate_articles(&self) -> Result<DriverReport, SyncError> {
        let web = self.web(DriverKind::Articles.name())?;
        let source = ArticleSource::new(
            web,
            self.target.clone(),
            self.extractor(),
            self.rules.date_overrides.clone(),
        );
        self.run_post_source(&source).await
    }

    pub async fn migrate_pages(&self) -> Result<DriverReport, SyncError> {
        let source = PageSource::new(
            self.rules.pages.clone(),
            self.target.clone(),
            self.extractor(),
            self.rules.date_overrides.clone(),
        );
        self.run_post_source(&source).await
    }

    pub async fn migrate_attachments(&self) -> Result<DriverReport, SyncError> {
        let root = self.config.article_root.as_path();
        let files = scan_attachments(root, &self.rules.attachment_filter())?;
        let mut report = DriverReport::new(DriverKind::Attachments.name());
        report.fetched = files.len();

        let uploads = UploadsStore::new(self.config.uploads_dir());
        let target = self.target.as_ref();
        let copy_files = self.copy_files;
        let uploads = &uploads;
        let outcomes: Vec<(Option<bool>, Option<UpsertOutcome>)> = stream::iter(files)
            .map(|rel| async move {
                let deduplicated = if copy_files {
                    Some(uploads.copy_in(root, &rel).await?.deduplicated)
                } else {
                    None
                };
                let redirect = match RedirectRule::permanent(
                    format!("/{rel}"),
                    format!("{UPLOADS_URL_PREFIX}/{rel}"),
                ) {
                    Some(rule) => Some(target.write_redirect(&rule, WriteMode::InsertIfMissing).await?),
                    None => None,
                };
                Ok::<_, StoreError>((deduplicated, redirect))
            })
            .buffer_unordered(self.concurrency())
            .try_collect()
            .await?;

        for (deduplicated, redirect) in outcomes {
            match deduplicated {
                Some(true) => report.attachments_deduplicated += 1,
                Some(false) => report.attachments_copied += 1,
                None => {}
            }
            if let Some(outcome) = redirect {
                report.redirects.record(outcome);
            }
        }
        Ok(report)
    }

    /// Upsert every well-formed `"src" => "target"` line of `path`.
    pub async fn import_redirect_file(&self, path: &Path) -> Result<DriverReport, SyncError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SyncError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let parsed = parse_redirect_file(&text);
        let mut report = DriverReport::new("redirect-file");
        report.fetched = parsed.pairs.len() + parsed.ignored_lines.len();

        for line in &parsed.ignored_lines {
            warn!(file = %path.display(), line, "malformed redirect line");
            report.skipped += 1;
        }
        for pair in parsed.pairs {
            let Some(rule) = RedirectRule::permanent(pair.source, pair.target) else {
                debug!(line = pair.line, "redirect points at itself");
                report.skipped += 1;
                continue;
            };
            let outcome = self.target.write_redirect(&rule, WriteMode::Upsert).await?;
            report.redirects.record(outcome);
        }
        Ok(report)
    }

    /// Put every migrated post in the category whose path prefix best matches
    /// one of its old urls, then refresh the category counts.
    pub async fn assign_categories(&self) -> Result<DriverReport, SyncError> {
        let mut report = DriverReport::new(DriverKind::Categories.name());
        let default = &self.rules.default_category;

        let mut taxonomy_ids: HashMap<&str, u64> = HashMap::new();
        for rule in self.rules.categories.iter().chain(std::iter::once(default)) {
            let term = CategoryTerm {
                slug: rule.slug.clone(),
                name: rule.name.clone(),
            };
            let id = self.target.ensure_category(&term).await?;
            taxonomy_ids.insert(rule.slug.as_str(), id);
        }

        let mut paths_by_post: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for path in self.target.post_redirect_sources().await? {
            paths_by_post.entry(path.post_id).or_default().push(path.url);
        }
        report.fetched = paths_by_post.len();

        for (post_id, urls) in &paths_by_post {
            let slug = match_category(urls.as_slice(), &self.rules.categories, &default.slug);
            let term_taxonomy_id = taxonomy_ids
                .get(slug)
                .copied()
                .ok_or_else(|| StoreError::MissingTaxonomy(slug.to_string()))?;
            let outcome = self.target.relate_post(*post_id, term_taxonomy_id).await?;
            report.relationships.record(outcome);
        }

        report.categories_recounted = self.target.recount_categories().await?;
        Ok(report)
    }
}
