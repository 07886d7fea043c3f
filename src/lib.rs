//! Imports RSS 2.0 / Atom feeds and single HTML pages into a file-based
//! static-site content store.

pub mod config;
pub mod content;
pub mod feed;
pub mod import;
pub mod store;
pub mod util;
