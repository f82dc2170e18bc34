use serde::{Deserialize, Serialize};

/// Category assigned to posts whose old path starts with one of `prefixes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub prefixes: Vec<String>,
}

/// Slug of the category whose prefix is the longest match against any of
/// `paths`, or `default_slug` when nothing matches. Ties keep the earlier rule.
pub fn match_category<'a, S: AsRef<str>>(
    paths: &[S],
    rules: &'a [CategoryRule],
    default_slug: &'a str,
) -> &'a str {
    let mut best: Option<(usize, &'a str)> = None;
    for rule in rules {
        for prefix in &rule.prefixes {
            let hit = paths.iter().any(|p| p.as_ref().starts_with(prefix.as_str()));
            if hit && best.map_or(true, |(len, _)| prefix.len() > len) {
                best = Some((prefix.len(), rule.slug.as_str()));
            }
        }
    }
    best.map_or(default_slug, |(_, slug)| slug)
}
