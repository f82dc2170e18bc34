#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use effimig_core::{LegacyArticle, LegacyNode, LegacyUser, UrlAlias};
use effimig_storage::{LegacyCmsStore, LegacyWebStore, MemoryTargetStore, StoreError};
use effimig_sync::{MigrationRules, Migrator, SyncConfig};

#[derive(Debug, Default, Clone)]
pub struct FixtureWebStore {
    pub articles: Vec<LegacyArticle>,
}

#[async_trait]
impl LegacyWebStore for FixtureWebStore {
    async fn articles(&self) -> Result<Vec<LegacyArticle>, StoreError> {
        Ok(self.articles.clone())
    }

    async fn article_authors(&self) -> Result<Vec<String>, StoreError> {
        let mut authors: Vec<String> = Vec::new();
        for author in self.articles.iter().filter_map(|a| a.author_name()) {
            if !authors.iter().any(|known| known == author) {
                authors.push(author.to_string());
            }
        }
        Ok(authors)
    }
}

#[derive(Debug, Default, Clone)]
pub struct FixtureCmsStore {
    pub users: Vec<LegacyUser>,
    pub nodes: Vec<LegacyNode>,
    pub aliases: Vec<UrlAlias>,
}

#[async_trait]
impl LegacyCmsStore for FixtureCmsStore {
    async fn users(&self) -> Result<Vec<LegacyUser>, StoreError> {
        Ok(self.users.clone())
    }

    async fn user_by_uid(&self, uid: i64) -> Result<Option<LegacyUser>, StoreError> {
        Ok(self.users.iter().find(|u| u.uid == uid).cloned())
    }

    async fn nodes(&self) -> Result<Vec<LegacyNode>, StoreError> {
        Ok(self.nodes.clone())
    }

    async fn aliases_for(&self, src: &str) -> Result<Vec<UrlAlias>, StoreError> {
        Ok(self.aliases.iter().filter(|a| a.src == src).cloned().collect())
    }
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().expect("valid date")
}

pub fn article(linktarget: &str, title: &str, author: Option<&str>) -> LegacyArticle {
    LegacyArticle {
        linktarget: linktarget.to_string(),
        filename: linktarget.to_string(),
        author: author.map(str::to_string),
        title: title.to_string(),
        summary: None,
        published: None,
    }
}

pub fn write_page(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    let page = format!(
        "<html>\n<head>\n<meta charset=\"utf-8\">\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    );
    std::fs::write(path, page).expect("write page");
}

pub fn migrator(
    article_root: &Path,
    wp_root: &Path,
    rules: MigrationRules,
    target: Arc<MemoryTargetStore>,
) -> Migrator {
    Migrator::new(SyncConfig::for_roots(article_root, wp_root), rules, target)
}
