use async_trait::async_trait;
use effimig_core::{
    CategoryTerm, NaturalKey, PostPath, RedirectRule, TargetPost, TargetUser, UpsertOutcome,
    WriteMode, CATEGORY_TAXONOMY,
};
use sha2::{Digest, Sha256};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlQueryResult};
use sqlx::Row;
use tracing::info;

use crate::{StoreError, TargetStore, POOL_MAX_CONNECTIONS, POOL_MIN_CONNECTIONS};

/// Unique indexes the upsert statements rely on: (table, index name, column expression).
const USER_KEY_INDEX: (&str, &str, &str) = ("wp_users", "effimig_uq_user_login", "user_login");
const POST_KEY_INDEX: (&str, &str, &str) = ("wp_posts", "effimig_uq_post_key", "effimig_key");
const REDIRECT_KEY_INDEX: (&str, &str, &str) =
    ("wp_redirection_items", "effimig_uq_redirect_url", "url(191)");
const TERM_SLUG_INDEX: (&str, &str, &str) = ("wp_terms", "effimig_uq_term_slug", "slug(191)");

/// Binary column holding [`post_key_digest`]. Rows WordPress created itself keep NULL.
const POST_KEY_COLUMN: &str = "effimig_key";
const POST_KEY_COLUMN_DDL: &str =
    "ALTER TABLE wp_posts ADD COLUMN effimig_key CHAR(64) CHARACTER SET ascii COLLATE ascii_bin NULL";

/// Hex sha256 of the key kind and the exact key value.
///
/// Posts keyed on title and posts keyed on slug never match each other, and
/// values compare byte for byte whatever the table collation is.
fn post_key_digest(key: NaturalKey, value: &str) -> String {
    let kind = match key {
        NaturalKey::Title => "title",
        NaturalKey::Slug => "slug",
    };
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Tail appended to an `INSERT` for each write mode.
///
/// `ID = ID` keeps a duplicate-key hit a no-op without hiding other errors the
/// way `INSERT IGNORE` would.
fn on_duplicate(mode: WriteMode, id_column: &str, update_columns: &[&str]) -> String {
    match mode {
        WriteMode::InsertIfMissing => format!("ON DUPLICATE KEY UPDATE {id_column} = {id_column}"),
        WriteMode::Upsert => {
            let sets = update_columns
                .iter()
                .map(|c| format!("{c} = VALUES({c})"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("ON DUPLICATE KEY UPDATE {sets}")
        }
    }
}

/// Outcome of an `INSERT ... ON DUPLICATE KEY UPDATE` on a table with an
/// auto-increment id.
///
/// sqlx connects with `CLIENT_FOUND_ROWS`, so a duplicate left as it was
/// reports 1 affected row just like an insert. Only a real insert hands back a
/// new id; 2 affected rows is an update that changed the row.
fn outcome_for(rows_affected: u64, last_insert_id: u64) -> UpsertOutcome {
    match (rows_affected, last_insert_id) {
        (rows, _) if rows >= 2 => UpsertOutcome::Updated,
        (1, id) if id != 0 => UpsertOutcome::Inserted,
        _ => UpsertOutcome::Unchanged,
    }
}

fn outcome_of(result: &MySqlQueryResult) -> UpsertOutcome {
    outcome_for(result.rows_affected(), result.last_insert_id())
}

/// WordPress target schema on MySQL.
#[derive(Debug, Clone)]
pub struct MySqlTargetStore {
    pool: MySqlPool,
}

impl MySqlTargetStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Pool that connects on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    async fn ensure_unique_index(
        &self,
        (table, index, columns): (&str, &str, &str),
    ) -> Result<(), StoreError> {
        let existing: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
              FROM information_schema.statistics
             WHERE table_schema = DATABASE()
               AND table_name = ?
               AND index_name = ?
            "#,
        )
        .bind(table)
        .bind(index)
        .fetch_one(&self.pool)
        .await?;
        if existing > 0 {
            return Ok(());
        }

        info!(table, index, columns, "creating unique natural-key index");
        sqlx::query(&format!("ALTER TABLE {table} ADD UNIQUE INDEX {index} ({columns})"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_post_key_column(&self) -> Result<(), StoreError> {
        let existing: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
              FROM information_schema.columns
             WHERE table_schema = DATABASE()
               AND table_name = 'wp_posts'
               AND column_name = ?
            "#,
        )
        .bind(POST_KEY_COLUMN)
        .fetch_one(&self.pool)
        .await?;
        if existing > 0 {
            return Ok(());
        }

        info!(column = POST_KEY_COLUMN, "adding post natural-key column");
        sqlx::query(POST_KEY_COLUMN_DDL).execute(&self.pool).await?;
        Ok(())
    }

    async fn term_taxonomy_id(&self, slug: &str) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tt.term_taxonomy_id
              FROM wp_term_taxonomy tt
              JOIN wp_terms t ON t.term_id = tt.term_id
             WHERE t.slug = ?
               AND tt.taxonomy = ?
            "#,
        )
        .bind(slug)
        .bind(CATEGORY_TAXONOMY)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(|r| r.try_get::<u64, _>("term_taxonomy_id"))
            .transpose()?)
    }
}

#[async_trait]
impl TargetStore for MySqlTargetStore {
    async fn ensure_natural_keys(&self, post_keys: &[NaturalKey]) -> Result<(), StoreError> {
        self.ensure_unique_index(USER_KEY_INDEX).await?;
        self.ensure_unique_index(REDIRECT_KEY_INDEX).await?;
        self.ensure_unique_index(TERM_SLUG_INDEX).await?;
        if !post_keys.is_empty() {
            self.ensure_post_key_column().await?;
            self.ensure_unique_index(POST_KEY_INDEX).await?;
        }
        Ok(())
    }

    async fn write_user(
        &self,
        user: &TargetUser,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO wp_users
                (user_login, user_pass, user_nicename, user_email, display_name, user_registered)
            VALUES (?, ?, ?, ?, ?, ?)
            {}
            "#,
            on_duplicate(
                mode,
                "ID",
                &["user_pass", "user_nicename", "user_email", "display_name", "user_registered"],
            )
        );
        let result = sqlx::query(&sql)
            .bind(&user.login)
            .bind(&user.pass)
            .bind(&user.nicename)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.registered.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(outcome_of(&result))
    }

    async fn user_id_by_login(&self, login: &str) -> Result<Option<u64>, StoreError> {
        let id: Option<u64> = sqlx::query_scalar("SELECT ID FROM wp_users WHERE user_login = ? LIMIT 1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn write_post(
        &self,
        post: &TargetPost,
        key: NaturalKey,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError> {
        // Only effimig_key decides a duplicate; title and slug are plain data.
        let sql = format!(
            r#"
            INSERT INTO wp_posts
                (post_author, post_date, post_date_gmt, post_content, post_title, post_excerpt,
                 post_status, comment_status, ping_status, post_name, to_ping, pinged,
                 post_modified, post_modified_gmt, post_content_filtered, post_type, effimig_key)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, '', '', ?, ?, '', ?, ?)
            {}
            "#,
            on_duplicate(
                mode,
                "ID",
                &[
                    "post_author",
                    "post_date",
                    "post_date_gmt",
                    "post_content",
                    "post_title",
                    "post_excerpt",
                    "post_status",
                    "comment_status",
                    "ping_status",
                    "post_name",
                    "post_modified",
                    "post_modified_gmt",
                    "post_type",
                ],
            )
        );
        let date = post.date.naive_utc();
        let result = sqlx::query(&sql)
            .bind(post.author)
            .bind(date)
            .bind(date)
            .bind(&post.content)
            .bind(&post.title)
            .bind(&post.excerpt)
            .bind(&post.status)
            .bind(&post.comment_status)
            .bind(&post.ping_status)
            .bind(&post.slug)
            .bind(date)
            .bind(date)
            .bind(&post.post_type)
            .bind(post_key_digest(key, post.natural_key(key)))
            .execute(&self.pool)
            .await?;
        Ok(outcome_of(&result))
    }

    async fn write_redirect(
        &self,
        rule: &RedirectRule,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO wp_redirection_items
                (url, action_data, regex, position, group_id, status, action_type,
                 action_code, match_type, last_access)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            {}
            "#,
            on_duplicate(
                mode,
                "id",
                &[
                    "action_data",
                    "regex",
                    "position",
                    "group_id",
                    "status",
                    "action_type",
                    "action_code",
                    "match_type",
                ],
            )
        );
        let result = sqlx::query(&sql)
            .bind(&rule.url)
            .bind(&rule.action_data)
            .bind(rule.regex)
            .bind(rule.position)
            .bind(rule.group_id)
            .bind(&rule.status)
            .bind(&rule.action_type)
            .bind(rule.action_code)
            .bind(&rule.match_type)
            .bind(rule.last_access.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(outcome_of(&result))
    }

    async fn ensure_category(&self, term: &CategoryTerm) -> Result<u64, StoreError> {
        if let Some(id) = self.term_taxonomy_id(&term.slug).await? {
            return Ok(id);
        }

        sqlx::query(
            r#"
            INSERT INTO wp_terms (name, slug, term_group)
            VALUES (?, ?, 0)
            ON DUPLICATE KEY UPDATE name = VALUES(name)
            "#,
        )
        .bind(&term.name)
        .bind(&term.slug)
        .execute(&self.pool)
        .await?;

        // wp_term_taxonomy carries a unique (term_id, taxonomy) key.
        sqlx::query(
            r#"
            INSERT INTO wp_term_taxonomy (term_id, taxonomy, description, parent, count)
            SELECT term_id, ?, '', 0, 0
              FROM wp_terms
             WHERE slug = ?
            ON DUPLICATE KEY UPDATE term_taxonomy_id = term_taxonomy_id
            "#,
        )
        .bind(CATEGORY_TAXONOMY)
        .bind(&term.slug)
        .execute(&self.pool)
        .await?;

        self.term_taxonomy_id(&term.slug)
            .await?
            .ok_or_else(|| StoreError::MissingTaxonomy(term.slug.clone()))
    }

    async fn post_redirect_sources(&self) -> Result<Vec<PostPath>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.ID AS post_id, r.url AS url
              FROM wp_redirection_items r
              JOIN wp_posts p ON r.action_data = CONCAT('/', p.post_name)
             WHERE p.post_type = 'post'
             ORDER BY p.ID, r.url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok::<_, StoreError>(PostPath {
                    post_id: row.try_get("post_id")?,
                    url: row.try_get("url")?,
                })
            })
            .collect()
    }

    async fn relate_post(
        &self,
        post_id: u64,
        term_taxonomy_id: u64,
    ) -> Result<UpsertOutcome, StoreError> {
        // No auto-increment id here, so the insert is guarded instead of
        // relying on the duplicate-key path.
        let result = sqlx::query(
            r#"
            INSERT INTO wp_term_relationships (object_id, term_taxonomy_id, term_order)
            SELECT ?, ?, 0
              FROM DUAL
             WHERE NOT EXISTS (
                   SELECT 1
                     FROM wp_term_relationships
                    WHERE object_id = ?
                      AND term_taxonomy_id = ?
             )
            "#,
        )
        .bind(post_id)
        .bind(term_taxonomy_id)
        .bind(post_id)
        .bind(term_taxonomy_id)
        .execute(&self.pool)
        .await?;
        Ok(if result.rows_affected() > 0 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Unchanged
        })
    }

    async fn recount_categories(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE wp_term_taxonomy tt
               SET tt.count = (
                   SELECT COUNT(*)
                     FROM wp_term_relationships tr
                     JOIN wp_posts p ON p.ID = tr.object_id
                    WHERE tr.term_taxonomy_id = tt.term_taxonomy_id
                      AND p.post_type = 'post'
                      AND p.post_status = 'publish'
               )
             WHERE tt.taxonomy = ?
            "#,
        )
        .bind(CATEGORY_TAXONOMY)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
