use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use regex::Regex;
use tracing::{debug, warn};

use crate::encoding::{detect_charset_token, resolve_charset_token};
use crate::links::LinkRewriter;
use crate::title::page_title_from_html;
use crate::ExtractError;

const BODY_OPEN: &str = "<body";
const BODY_CLOSE: &str = "</body>";
const SCRIPT_OPEN: &str = "<?";
const SCRIPT_CLOSE: &str = "?>";

/// Keep the lines between the body markers, minus inline script blocks and the
/// heading that repeats `title`.
pub fn extract_body(text: &str, title: Option<&str>) -> Result<String, ExtractError> {
    let heading = title
        .filter(|t| !t.is_empty())
        .map(|t| Regex::new(&format!("<h.*{}", regex::escape(t))))
        .transpose()?;

    let mut in_body = false;
    let mut in_script = false;
    let mut kept = Vec::new();

    for line in text.split('\n') {
        if line.contains(BODY_OPEN) {
            in_body = true;
            continue;
        }
        if line.contains(BODY_CLOSE) {
            in_body = false;
            continue;
        }
        let opens = line.contains(SCRIPT_OPEN);
        let closes = line.contains(SCRIPT_CLOSE);
        if opens && closes {
            continue;
        }
        if opens {
            in_script = true;
            continue;
        }
        if closes {
            in_script = false;
            continue;
        }
        if heading.as_ref().is_some_and(|re| re.is_match(line)) {
            continue;
        }
        if in_body && !in_script {
            kept.push(line);
        }
    }

    Ok(kept.join("\n"))
}

/// Decode `bytes` and run [`extract_body`] over the text.
pub fn extract_article_bytes(
    bytes: &[u8],
    encoding: &'static Encoding,
    title: Option<&str>,
) -> Result<String, ExtractError> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(encoding = used.name(), "replacement characters while decoding article");
    }
    extract_body(&text, title)
}

/// Reads legacy article files from the article root and turns them into post bodies.
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    root: PathBuf,
    links: LinkRewriter,
}

impl ArticleExtractor {
    pub fn new(root: impl Into<PathBuf>, links: LinkRewriter) -> Self {
        Self {
            root: root.into(),
            links,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extracted and link-rewritten body of the page at `linktarget`.
    ///
    /// `None` when the target is not an `.html` page, is missing, or cannot be
    /// decoded. Failures are logged, never returned.
    pub async fn extract(&self, linktarget: &str, title: Option<&str>) -> Option<String> {
        let bytes = self.read_page(linktarget).await?;
        let body = resolve_charset_token(&detect_charset_token(&bytes))
            .and_then(|encoding| extract_article_bytes(&bytes, encoding, title));
        match body {
            Ok(body) => Some(self.links.rewrite(&body, linktarget)),
            Err(err) => {
                warn!(linktarget, error = %err, "article extraction failed");
                None
            }
        }
    }

    /// `<title>` (or first `<h1>`) of the page at `linktarget`.
    pub async fn page_title(&self, linktarget: &str) -> Option<String> {
        let bytes = self.read_page(linktarget).await?;
        let encoding = match resolve_charset_token(&detect_charset_token(&bytes)) {
            Ok(encoding) => encoding,
            Err(err) => {
                warn!(linktarget, error = %err, "page title lookup failed");
                return None;
            }
        };
        let (text, _, _) = encoding.decode(&bytes);
        page_title_from_html(&text)
    }

    async fn read_page(&self, linktarget: &str) -> Option<Vec<u8>> {
        if !linktarget.ends_with(".html") {
            return None;
        }
        let path = self.root.join(linktarget.trim_start_matches('/'));
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(path = %path.display(), "article file missing");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "checking article file failed");
                return None;
            }
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "reading article file failed");
                None
            }
        }
    }
}
