use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Link targets that are already absolute and pass through untouched.
const PASSTHROUGH_PREFIXES: [&str; 6] = ["http", "mailto:", "news:", "/", "#", "\nhttp"];

fn link_attr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(src|href)="([^"]+)""#).expect("static link pattern"))
}

/// Rewrites relative and malformed `src`/`href` values to site-absolute forms.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    mail_domain: String,
}

impl LinkRewriter {
    pub fn new(mail_domain: impl Into<String>) -> Self {
        Self {
            mail_domain: mail_domain.into(),
        }
    }

    /// Rewrite every link attribute in `body`, resolving relative values against
    /// the directory of `origin` (the legacy path the body was read from).
    pub fn rewrite(&self, body: &str, origin: &str) -> String {
        let link_dir = dirname(origin);
        link_attr_pattern()
            .replace_all(body, |caps: &Captures<'_>| {
                let attr = &caps[1];
                let value = &caps[2];
                match self.rewrite_value(value, link_dir) {
                    Some(rewritten) => format!("{attr}=\"{rewritten}\""),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn rewrite_value(&self, value: &str, link_dir: &str) -> Option<String> {
        if PASSTHROUGH_PREFIXES.iter().any(|p| value.starts_with(p)) {
            return None;
        }
        if !self.mail_domain.is_empty() && value.contains(&self.mail_domain) {
            return Some(format!("mailto:{value}"));
        }
        if value.starts_with("www") {
            return Some(format!("http://{value}"));
        }
        Some(format!("/{link_dir}/{value}"))
    }
}

/// Directory component of a slash-separated path, as POSIX `dirname` prints it.
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." };
    }
    match trimmed.rfind('/') {
        None => ".",
        Some(idx) => {
            let head = trimmed[..idx].trim_end_matches('/');
            if head.is_empty() {
                "/"
            } else {
                head
            }
        }
    }
}
