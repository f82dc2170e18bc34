/// Post slug for a legacy path: `/` and `.` become `-`, first `.html` dropped.
pub fn post_name_for(linktarget: &str) -> String {
    linktarget
        .replace('/', "-")
        .replacen(".html", "", 1)
        .replace('.', "-")
}

/// Login name for a legacy author: ASCII letters only.
pub fn login_for(user_name: &str) -> String {
    user_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect()
}

/// `path` without a trailing `index.html`.
pub fn strip_index_html(path: &str) -> &str {
    path.strip_suffix("index.html").unwrap_or(path)
}

/// Site paths a legacy page was reachable under: each path as-is and with a
/// trailing `index.html` removed, first occurrence order, no duplicates.
pub fn old_urls_for<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for path in paths {
        for candidate in [format!("/{path}"), format!("/{}", strip_index_html(path))] {
            if !urls.contains(&candidate) {
                urls.push(candidate);
            }
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_follow_the_legacy_rules() {
        assert_eq!(post_name_for("yhdistys/kokoukset/"), "yhdistys-kokoukset-");
        assert_eq!(post_name_for("a/b/index.html"), "a-b-index");
        assert_eq!(post_name_for("a/x.html/b.html"), "a-x-b-html");
        assert_eq!(post_name_for("julkaisut/v1.2/paper.html"), "julkaisut-v1-2-paper");
    }

    #[test]
    fn logins_keep_ascii_letters() {
        assert_eq!(login_for("Matti Meikäläinen"), "MattiMeiklinen");
        assert_eq!(login_for("ville.v-2"), "villev");
    }

    #[test]
    fn old_urls_are_unique_and_ordered() {
        let urls = old_urls_for(["a/index.html", "a/index.html", "b.html"]);
        assert_eq!(urls, vec!["/a/index.html", "/a/", "/b.html"]);
    }
}
