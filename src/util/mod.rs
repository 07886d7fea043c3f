//! Text helpers shared by the parser and the entry writer.
//!
//! - **Entity unescaping**: HTML character references in feed content
//! - **Front matter escaping**: safe single-line scalar values
//! - **Slugs**: URL-safe path segments derived from titles

mod text;

pub use text::{escape_front_matter, slugify, unescape_html};
