use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use effimig_core::{
    CategoryTerm, NaturalKey, PostPath, RedirectRule, TargetPost, TargetUser, TermRelationship,
    TermTaxonomy, UpsertOutcome, WriteMode, CATEGORY_TAXONOMY, POST_STATUS_PUBLISH,
    POST_TYPE_POST,
};
use tokio::sync::Mutex;

use crate::{StoreError, TargetStore};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    users: BTreeMap<u64, TargetUser>,
    posts: BTreeMap<u64, TargetPost>,
    /// Natural key each migrated post was written under. Seeded posts have none.
    post_keys: HashMap<(NaturalKey, String), u64>,
    redirects: BTreeMap<u64, RedirectRule>,
    terms: BTreeMap<u64, CategoryTerm>,
    taxonomies: BTreeMap<u64, TermTaxonomy>,
    relationships: Vec<TermRelationship>,
    next_id: u64,
}

impl MemoryState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store `candidate` in `rows` under the first id whose row matches `same_key`.
fn write_keyed<T: Clone + PartialEq>(
    rows: &mut BTreeMap<u64, T>,
    next_id: impl FnOnce() -> u64,
    candidate: &T,
    mode: WriteMode,
    same_key: impl Fn(&T) -> bool,
) -> UpsertOutcome {
    let existing = rows.iter().find(|(_, row)| same_key(row)).map(|(id, _)| *id);
    match (existing, mode) {
        (None, _) => {
            rows.insert(next_id(), candidate.clone());
            UpsertOutcome::Inserted
        }
        (Some(_), WriteMode::InsertIfMissing) => UpsertOutcome::Unchanged,
        (Some(id), WriteMode::Upsert) => {
            if rows.get(&id) == Some(candidate) {
                UpsertOutcome::Unchanged
            } else {
                rows.insert(id, candidate.clone());
                UpsertOutcome::Updated
            }
        }
    }
}

/// Point-in-time copy of a [`MemoryTargetStore`].
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    state: MemoryState,
}

impl MemorySnapshot {
    pub fn users(&self) -> Vec<&TargetUser> {
        self.state.users.values().collect()
    }

    pub fn posts(&self) -> Vec<&TargetPost> {
        self.state.posts.values().collect()
    }

    pub fn post_by_title(&self, title: &str) -> Option<&TargetPost> {
        self.state.posts.values().find(|p| p.title == title)
    }

    pub fn post_id_by_slug(&self, slug: &str) -> Option<u64> {
        self.state
            .posts
            .iter()
            .find(|(_, p)| p.slug == slug)
            .map(|(id, _)| *id)
    }

    pub fn redirects(&self) -> Vec<&RedirectRule> {
        self.state.redirects.values().collect()
    }

    pub fn redirect_for(&self, url: &str) -> Option<&RedirectRule> {
        self.state.redirects.values().find(|r| r.url == url)
    }

    pub fn terms(&self) -> Vec<&CategoryTerm> {
        self.state.terms.values().collect()
    }

    /// Taxonomy row of the category with `slug`.
    pub fn category(&self, slug: &str) -> Option<&TermTaxonomy> {
        let term_id = self
            .state
            .terms
            .iter()
            .find(|(_, t)| t.slug == slug)
            .map(|(id, _)| *id)?;
        self.state.taxonomies.values().find(|tt| tt.term_id == term_id)
    }

    pub fn relationships(&self) -> &[TermRelationship] {
        &self.state.relationships
    }
}

/// Process-local target used for dry runs and tests.
///
/// Posts match only on the key kind and exact value they were written with,
/// as the MySQL store does through its `effimig_key` column. Users, redirects
/// and terms compare exactly here but follow the table collation on MySQL.
#[derive(Debug, Default)]
pub struct MemoryTargetStore {
    state: Mutex<MemoryState>,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            state: self.state.lock().await.clone(),
        }
    }

    /// Insert a post directly, bypassing key checks. Returns its id.
    pub async fn seed_post(&self, post: TargetPost) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.allocate();
        state.posts.insert(id, post);
        id
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn ensure_natural_keys(&self, _post_keys: &[NaturalKey]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn write_user(
        &self,
        user: &TargetUser,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut next = state.next_id;
        let outcome = write_keyed(
            &mut state.users,
            || {
                next += 1;
                next
            },
            user,
            mode,
            |row| row.login == user.login,
        );
        state.next_id = next;
        Ok(outcome)
    }

    async fn user_id_by_login(&self, login: &str) -> Result<Option<u64>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|(_, u)| u.login == login)
            .map(|(id, _)| *id))
    }

    async fn write_post(
        &self,
        post: &TargetPost,
        key: NaturalKey,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let tag = (key, post.natural_key(key).to_string());
        let existing = state.post_keys.get(&tag).copied();
        let outcome = match (existing, mode) {
            (None, _) => {
                let id = state.allocate();
                state.posts.insert(id, post.clone());
                state.post_keys.insert(tag, id);
                UpsertOutcome::Inserted
            }
            (Some(_), WriteMode::InsertIfMissing) => UpsertOutcome::Unchanged,
            (Some(id), WriteMode::Upsert) => {
                if state.posts.get(&id) == Some(post) {
                    UpsertOutcome::Unchanged
                } else {
                    state.posts.insert(id, post.clone());
                    UpsertOutcome::Updated
                }
            }
        };
        Ok(outcome)
    }

    async fn write_redirect(
        &self,
        rule: &RedirectRule,
        mode: WriteMode,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut next = state.next_id;
        let outcome = write_keyed(
            &mut state.redirects,
            || {
                next += 1;
                next
            },
            rule,
            mode,
            |row| row.url == rule.url,
        );
        state.next_id = next;
        Ok(outcome)
    }

    async fn ensure_category(&self, term: &CategoryTerm) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let existing = state
            .terms
            .iter()
            .find(|(_, t)| t.slug == term.slug)
            .map(|(id, _)| *id);
        let term_id = match existing {
            Some(id) => id,
            None => {
                let id = state.allocate();
                state.terms.insert(id, term.clone());
                id
            }
        };
        if let Some(tt) = state.taxonomies.values().find(|tt| tt.term_id == term_id) {
            return Ok(tt.term_taxonomy_id);
        }
        let term_taxonomy_id = state.allocate();
        state.taxonomies.insert(
            term_taxonomy_id,
            TermTaxonomy {
                term_taxonomy_id,
                term_id,
                taxonomy: CATEGORY_TAXONOMY.to_string(),
                count: 0,
            },
        );
        Ok(term_taxonomy_id)
    }

    async fn post_redirect_sources(&self) -> Result<Vec<PostPath>, StoreError> {
        let state = self.state.lock().await;
        let mut out = Vec::new();
        for (post_id, post) in &state.posts {
            if post.post_type != POST_TYPE_POST {
                continue;
            }
            let target = format!("/{}", post.slug);
            for rule in state.redirects.values().filter(|r| r.action_data == target) {
                out.push(PostPath {
                    post_id: *post_id,
                    url: rule.url.clone(),
                });
            }
        }
        out.sort_by(|a, b| (a.post_id, &a.url).cmp(&(b.post_id, &b.url)));
        Ok(out)
    }

    async fn relate_post(
        &self,
        post_id: u64,
        term_taxonomy_id: u64,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let relation = TermRelationship {
            object_id: post_id,
            term_taxonomy_id,
        };
        if state.relationships.contains(&relation) {
            return Ok(UpsertOutcome::Unchanged);
        }
        state.relationships.push(relation);
        Ok(UpsertOutcome::Inserted)
    }

    async fn recount_categories(&self) -> Result<u64, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut touched = 0;
        for tt in state
            .taxonomies
            .values_mut()
            .filter(|tt| tt.taxonomy == CATEGORY_TAXONOMY)
        {
            tt.count = state
                .relationships
                .iter()
                .filter(|rel| rel.term_taxonomy_id == tt.term_taxonomy_id)
                .filter(|rel| {
                    state.posts.get(&rel.object_id).is_some_and(|p| {
                        p.post_type == POST_TYPE_POST && p.status == POST_STATUS_PUBLISH
                    })
                })
                .count() as u64;
            touched += 1;
        }
        Ok(touched)
    }
}
