//! Thin helpers over `scraper` so adapters read like selector expressions.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{ItemError, PageError};

/// Parse a selector built at runtime.
pub fn selector(css: &str) -> Result<Selector, PageError> {
    Selector::parse(css).map_err(|e| PageError::Selector(format!("{css}: {e}")))
}

/// Parse a selector literal. Only for compile-time constants.
pub(crate) fn sel(css: &'static str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Direct text-node children of an element, in order.
pub fn own_text<'a>(el: ElementRef<'a>) -> impl Iterator<Item = &'a str> + 'a {
    el.children().filter_map(|c| c.value().as_text().map(|t| &**t))
}

/// First direct text node of the first match, trimmed.
pub fn first_own_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|el| own_text(el).next())
        .map(|t| t.trim().to_string())
}

/// Same as [`first_own_text`] but scoped to an element.
pub fn first_own_text_in(el: ElementRef<'_>, selector: &Selector) -> Option<String> {
    el.select(selector)
        .next()
        .and_then(|e| own_text(e).next())
        .map(|t| t.trim().to_string())
}

/// Every descendant text node of the element, concatenated.
pub fn all_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

pub fn attr_in(el: ElementRef<'_>, selector: &Selector, name: &str) -> Option<String> {
    el.select(selector)
        .next()
        .and_then(|e| e.value().attr(name))
        .map(|v| v.trim().to_string())
}

pub fn doc_attr(doc: &Html, selector: &Selector, name: &str) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|e| e.value().attr(name))
        .map(|v| v.trim().to_string())
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve `href` against `base`; absolute hrefs pass through unchanged.
pub fn absolute(base: &str, href: &str) -> Result<String, ItemError> {
    let href = href.trim();
    if Url::parse(href).is_ok() {
        return Ok(href.to_string());
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .map_err(|_| ItemError::BadUrl(href.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_vs_all_text() {
        let doc = Html::parse_document(
            r#"<div class="d">First line<br>Second <b>bold</b> line</div>"#,
        );
        let s = sel(".d");
        assert_eq!(first_own_text(&doc, &s).as_deref(), Some("First line"));
        let el = doc.select(&s).next().unwrap();
        assert_eq!(own_text(el).collect::<Vec<_>>(), vec!["First line", "Second ", " line"]);
        assert_eq!(all_text(el), "First lineSecond bold line");
    }

    #[test]
    fn absolute_urls() {
        assert_eq!(
            absolute("https://www.wichita.gov/calendar.aspx?CID=68", "/Calendar.aspx?EID=1592").unwrap(),
            "https://www.wichita.gov/Calendar.aspx?EID=1592"
        );
        assert_eq!(
            absolute("https://www.wichita.gov", "https://youtube.com/x").unwrap(),
            "https://youtube.com/x"
        );
        assert!(absolute("not a base", "relative").is_err());
    }

    #[test]
    fn runtime_selector_errors() {
        assert!(selector("#CID68 > ol > li").is_ok());
        assert!(selector("##").is_err());
    }
}
