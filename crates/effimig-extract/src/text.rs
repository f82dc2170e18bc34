use regex::{NoExpand, Regex};

use crate::ExtractError;

/// Undo double encoding in CMS text: UTF-8 bytes that were read back as
/// ISO-8859-1 are turned into bytes again and decoded as UTF-8.
///
/// Every char must fit in one byte, C1 controls included, and the bytes must
/// form valid UTF-8. Anything else is returned unchanged.
pub fn repair_legacy_text(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    let bytes: Option<Vec<u8>> = text.chars().map(|c| u8::try_from(c).ok()).collect();
    let Some(bytes) = bytes else {
        return text.to_string();
    };
    match String::from_utf8(bytes) {
        Ok(repaired) => repaired,
        Err(_) => text.to_string(),
    }
}

/// Remove the first single-level heading (`<hN>title</hN>`) that repeats `title`.
pub fn strip_title_heading(body: &str, title: &str) -> Result<String, ExtractError> {
    if title.is_empty() {
        return Ok(body.to_string());
    }
    let heading = Regex::new(&format!("<h.>{}</h.>", regex::escape(title)))?;
    Ok(heading.replacen(body, 1, NoExpand("")).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_encoded_text_is_repaired() {
        assert_eq!(repair_legacy_text("PÃ¤Ã¤kirjoitus"), "Pääkirjoitus");
    }

    #[test]
    fn bytes_in_the_c1_range_are_repaired() {
        assert_eq!(repair_legacy_text("\u{c3}\u{84}\u{c3}\u{84}NESTYS"), "ÄÄNESTYS");
        assert_eq!(repair_legacy_text("\u{c3}\u{96}ljy"), "Öljy");
        assert_eq!(repair_legacy_text("a \u{e2}\u{80}\u{93} b"), "a – b");
        assert_eq!(
            repair_legacy_text("\u{e2}\u{80}\u{9c}lainaus\u{e2}\u{80}\u{9d} 5 \u{e2}\u{82}\u{ac}"),
            "“lainaus” 5 €"
        );
    }

    #[test]
    fn clean_text_is_left_alone() {
        assert_eq!(repair_legacy_text("Pääkirjoitus"), "Pääkirjoitus");
        assert_eq!(repair_legacy_text("plain"), "plain");
        assert_eq!(repair_legacy_text("€ ja ✓"), "€ ja ✓");
    }

    #[test]
    fn only_first_title_heading_is_removed() {
        let body = "<h1>Otsikko</h1><p>a</p><h2>Otsikko</h2>";
        assert_eq!(
            strip_title_heading(body, "Otsikko").unwrap(),
            "<p>a</p><h2>Otsikko</h2>"
        );
    }

    #[test]
    fn heading_title_is_matched_literally() {
        let body = "<h1>a+b</h1><h1>aab</h1>";
        assert_eq!(strip_title_heading(body, "a+b").unwrap(), "<h1>aab</h1>");
    }
}
