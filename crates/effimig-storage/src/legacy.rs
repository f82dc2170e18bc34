use async_trait::async_trait;
use chrono::{DateTime, Utc};
use effimig_core::{LegacyArticle, LegacyNode, LegacyUser, UrlAlias};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::{LegacyCmsStore, LegacyWebStore, StoreError, POOL_MAX_CONNECTIONS, POOL_MIN_CONNECTIONS};

fn lazy_pool(database_url: &str) -> Result<PgPool, StoreError> {
    Ok(PgPoolOptions::new()
        .min_connections(POOL_MIN_CONNECTIONS)
        .max_connections(POOL_MAX_CONNECTIONS)
        .connect_lazy(database_url)?)
}

/// The hand-rolled `articles` database.
#[derive(Debug, Clone)]
pub struct PgLegacyWebStore {
    pool: PgPool,
}

impl PgLegacyWebStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pool that connects on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(lazy_pool(database_url)?))
    }
}

#[async_trait]
impl LegacyWebStore for PgLegacyWebStore {
    async fn articles(&self) -> Result<Vec<LegacyArticle>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT linktarget, filename, author, title, summary,
                   published::timestamptz AS published
              FROM articles
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(LegacyArticle {
                linktarget: row.try_get("linktarget")?,
                filename: row.try_get("filename")?,
                author: row.try_get("author")?,
                title: row.try_get("title")?,
                summary: row.try_get("summary")?,
                published: row.try_get::<Option<DateTime<Utc>>, _>("published")?,
            });
        }
        Ok(out)
    }

    async fn article_authors(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT author
              FROM articles
             WHERE author IS NOT NULL
               AND author <> ''
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("author").map_err(StoreError::from))
            .collect()
    }
}

/// The CMS database (`users`, `node`, `url_alias`).
#[derive(Debug, Clone)]
pub struct PgLegacyCmsStore {
    pool: PgPool,
}

impl PgLegacyCmsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn connect_lazy(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(lazy_pool(database_url)?))
    }
}

fn user_from_row(row: &PgRow) -> Result<LegacyUser, StoreError> {
    Ok(LegacyUser {
        uid: row.try_get("uid")?,
        name: row.try_get("name")?,
        pass: row.try_get("pass")?,
        mail: row.try_get("mail")?,
        created: row.try_get("created")?,
    })
}

#[async_trait]
impl LegacyCmsStore for PgLegacyCmsStore {
    async fn users(&self) -> Result<Vec<LegacyUser>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT uid::bigint AS uid, name, pass, mail, created::bigint AS created
              FROM users
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn user_by_uid(&self, uid: i64) -> Result<Option<LegacyUser>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT uid::bigint AS uid, name, pass, mail, created::bigint AS created
              FROM users
             WHERE uid = $1
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn nodes(&self) -> Result<Vec<LegacyNode>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT nid::bigint AS nid, uid::bigint AS uid, title, body, teaser,
                   created::bigint AS created
              FROM node
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(LegacyNode {
                nid: row.try_get("nid")?,
                uid: row.try_get("uid")?,
                title: row.try_get("title")?,
                body: row.try_get("body")?,
                teaser: row.try_get("teaser")?,
                created: row.try_get("created")?,
            });
        }
        Ok(out)
    }

    async fn aliases_for(&self, src: &str) -> Result<Vec<UrlAlias>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT src, dst
              FROM url_alias
             WHERE src = $1
            "#,
        )
        .bind(src)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok::<_, StoreError>(UrlAlias {
                    src: row.try_get("src")?,
                    dst: row.try_get("dst")?,
                })
            })
            .collect()
    }
}
