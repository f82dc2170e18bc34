use scraper::{Html, Selector};

fn text_or_none(value: String) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
}

/// Title of a hand-picked page: its `<title>`, else its first `<h1>`.
pub fn page_title_from_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    select_first_text(&document, "title").or_else(|| select_first_text(&document, "h1"))
}
