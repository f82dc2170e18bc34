use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*"([^"]*)"\s*=>\s*"([^"]*)""#).expect("static redirect pattern")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectPair {
    pub line: usize,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedRedirects {
    pub pairs: Vec<RedirectPair>,
    /// 1-based numbers of non-blank lines that held no `"src" => "target"` pair.
    pub ignored_lines: Vec<usize>,
}

/// Parse an explicit redirects listing of `"src" => "target"` lines.
///
/// Both sides are taken literally. Blank lines are skipped silently, anything
/// else that does not hold a pair is reported in `ignored_lines`.
pub fn parse_redirect_file(text: &str) -> ParsedRedirects {
    let mut parsed = ParsedRedirects::default();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match pair_pattern().captures(line) {
            Some(caps) => parsed.pairs.push(RedirectPair {
                line: idx + 1,
                source: caps[1].to_string(),
                target: caps[2].to_string(),
            }),
            None => parsed.ignored_lines.push(idx + 1),
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_and_noise_are_separated() {
        let text = r#"$redirects = array(
  "/vanha/sivu.html" => "/uusi-sivu",
  "/haku?q=(.*)" => "/?s=$1",

  // kommentti
);"#;
        let parsed = parse_redirect_file(text);
        assert_eq!(parsed.pairs.len(), 2);
        assert_eq!(parsed.pairs[0].source, "/vanha/sivu.html");
        assert_eq!(parsed.pairs[0].target, "/uusi-sivu");
        assert_eq!(parsed.pairs[0].line, 2);
        assert_eq!(parsed.pairs[1].source, "/haku?q=(.*)");
        assert_eq!(parsed.ignored_lines, vec![1, 5, 6]);
    }
}
