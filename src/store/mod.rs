//! The file-based content store imported entries are written into.
//!
//! - [`ContentStore`] computes where an entry lives (its permalink)
//! - [`EventLog`] is told about every file created
//! - [`Materializer`] writes entries without ever replacing an existing file

mod materialize;

use chrono::{DateTime, Datelike, Local};
use std::path::Path;

use crate::util::slugify;

pub use materialize::{destination, EntryOptions, MaterializeError, Materializer};

/// Metadata of an entry that has not been written yet.
#[derive(Debug, Clone, Copy)]
pub struct Draft<'a> {
    pub title: &'a str,
    pub date: DateTime<Local>,
    /// Explicit permalink from front matter; overrides the computed one.
    pub permalink: Option<&'a str>,
}

/// Permalink computation of the content store.
pub trait ContentStore {
    fn permalink(&self, draft: &Draft<'_>) -> Result<String, MaterializeError>;
}

/// Receives a notification for each entry file created.
pub trait EventLog {
    fn created(&self, path: &Path);
}

/// Pattern-based permalinks, e.g. `/:year/:slug/`.
///
/// Supported tokens: `:year`, `:month`, `:day` (zero-padded, local time)
/// and `:slug` (slugified title).
#[derive(Debug, Clone)]
pub struct PermalinkStore {
    pattern: String,
}

impl PermalinkStore {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl ContentStore for PermalinkStore {
    fn permalink(&self, draft: &Draft<'_>) -> Result<String, MaterializeError> {
        if let Some(permalink) = draft.permalink {
            return Ok(permalink.to_string());
        }

        let slug = slugify(draft.title);
        if slug.is_empty() {
            return Err(MaterializeError::InvalidPermalink(format!(
                "title {:?} yields an empty slug",
                draft.title
            )));
        }

        Ok(self
            .pattern
            .replace(":year", &format!("{:04}", draft.date.year()))
            .replace(":month", &format!("{:02}", draft.date.month()))
            .replace(":day", &format!("{:02}", draft.date.day()))
            .replace(":slug", &slug))
    }
}

/// Prints `create  <path>` for every new entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEvents;

impl EventLog for ConsoleEvents {
    fn created(&self, path: &Path) {
        tracing::info!(path = %path.display(), "Entry created");
        println!("{:>8}  {}", "create", path.display());
    }
}
