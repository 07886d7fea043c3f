use chrono::Local;
use scraper::{ElementRef, Html, Selector};

use crate::feed::parser::{FeedItem, ParseError};

const SCHEMA: &str = "HTML";

/// Turns a single HTML page into one [`FeedItem`].
///
/// The title comes from `<title>`, falling back to the first `<h1>`. The
/// content is the inner HTML of `<body>` (the whole document when there is
/// none). The page has no publication date of its own, so the item is
/// stamped with the current local time; the link is the page's location.
///
/// # Errors
///
/// [`ParseError::FieldValidation`] with schema `HTML` when the page has no
/// usable title or an empty body.
pub fn parse_document(bytes: &[u8], location: &str) -> Result<FeedItem, ParseError> {
    let source = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&source);

    let title = first_text(&document, "title")?
        .or(first_text(&document, "h1")?)
        .ok_or(ParseError::FieldValidation {
            schema: SCHEMA,
            field: "title",
        })?;

    let content = match first(&document, "body")? {
        Some(body) => body.inner_html(),
        None => document.root_element().html(),
    };
    let content = content.trim();
    if content.is_empty() {
        return Err(ParseError::FieldValidation {
            schema: SCHEMA,
            field: "content",
        });
    }

    tracing::debug!(location = %location, title = %title, "Parsed standalone HTML document");

    Ok(FeedItem {
        title,
        date: Local::now(),
        link: location.to_string(),
        content: content.to_string(),
    })
}

fn first<'a>(document: &'a Html, css: &str) -> Result<Option<ElementRef<'a>>, ParseError> {
    let selector = Selector::parse(css).map_err(|e| ParseError::Xml(e.to_string()))?;
    Ok(document.select(&selector).next())
}

/// Whitespace-collapsed text of the first match; blank text counts as absent.
fn first_text(document: &Html, css: &str) -> Result<Option<String>, ParseError> {
    Ok(first(document, css)?
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty()))
}
