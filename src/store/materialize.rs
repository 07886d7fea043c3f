use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::content::{ConvertedContent, Markup};
use crate::feed::FeedItem;
use crate::store::{ContentStore, Draft, EventLog};
use crate::util::escape_front_matter;

/// File extension of entries in the content store.
const ENTRY_EXTENSION: &str = "txt";

/// Errors that can occur while writing an entry.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// A file already sits at the computed destination. It is left untouched.
    #[error("Entry already exists {}", .0.display())]
    Exists(PathBuf),

    /// The permalink cannot be mapped inside the entries directory.
    #[error("Invalid permalink: {0}")]
    InvalidPermalink(String),

    /// `date_format` contains an unknown strftime specifier.
    #[error("Invalid date format {0:?}")]
    DateFormat(String),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-run settings for [`Materializer`].
#[derive(Debug, Clone)]
pub struct EntryOptions {
    /// Base directory of the content store.
    pub entries_root: PathBuf,
    /// strftime pattern for the `date:` front matter value.
    pub date_format: String,
    /// Keep the item's original URL path as the entry permalink.
    pub preserve_link: bool,
    /// Compute destinations and check collisions without writing.
    pub dry_run: bool,
}

/// Writes normalized items as entry files.
pub struct Materializer<'a> {
    store: &'a dyn ContentStore,
    events: &'a dyn EventLog,
    options: EntryOptions,
    /// Destinations claimed so far in a dry run.
    planned: HashSet<PathBuf>,
}

impl<'a> Materializer<'a> {
    pub fn new(store: &'a dyn ContentStore, events: &'a dyn EventLog, options: EntryOptions) -> Self {
        Self {
            store,
            events,
            options,
            planned: HashSet::new(),
        }
    }

    /// Writes one entry and returns its path.
    ///
    /// The entry is rendered in full, written to a temporary file next to
    /// its destination and moved into place only if nothing exists there.
    ///
    /// # Errors
    ///
    /// - [`MaterializeError::Exists`] - destination taken; nothing written
    /// - [`MaterializeError::InvalidPermalink`] - permalink escapes the root
    /// - [`MaterializeError::DateFormat`] - bad `date_format`
    /// - [`MaterializeError::Io`] - directory or file creation failed
    pub fn create_entry(
        &mut self,
        item: &FeedItem,
        content: &ConvertedContent,
    ) -> Result<PathBuf, MaterializeError> {
        let permalink = if self.options.preserve_link {
            original_path(&item.link)
        } else {
            None
        };

        let draft = Draft {
            title: &item.title,
            date: item.date,
            permalink: permalink.as_deref(),
        };
        let computed = self.store.permalink(&draft)?;
        let dest = destination(&self.options.entries_root, &computed)?;

        let date = format_date(&item.date, &self.options.date_format)?;
        let entry = render_entry(
            &item.title,
            &date,
            content.format,
            permalink.as_deref(),
            &content.text,
        );

        if self.options.dry_run {
            // Two items of one run may map to the same file.
            if dest.exists() || !self.planned.insert(dest.clone()) {
                return Err(MaterializeError::Exists(dest));
            }
            tracing::info!(path = %dest.display(), "Dry run, entry not written");
            return Ok(dest);
        }

        write_new(&dest, &entry)?;
        self.events.created(&dest);
        Ok(dest)
    }
}

/// Maps a permalink to a file below `root`.
///
/// Directory-style permalinks keep their last segment whole:
/// `/blog/release-1.2/` becomes `root/blog/release-1.2.txt`. File-style
/// permalinks have their extension replaced: `/x/post.html` becomes
/// `root/x/post.txt`. Empty permalinks and `..` segments are rejected.
pub fn destination(root: &Path, permalink: &str) -> Result<PathBuf, MaterializeError> {
    let mut path = root.to_path_buf();
    let mut last: Option<&str> = None;

    for segment in permalink.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(MaterializeError::InvalidPermalink(permalink.to_string()));
            }
            segment => {
                if let Some(parent) = last.replace(segment) {
                    path.push(parent);
                }
            }
        }
    }

    let Some(name) = last else {
        return Err(MaterializeError::InvalidPermalink(permalink.to_string()));
    };

    if permalink.ends_with('/') {
        path.push(format!("{}.{}", name, ENTRY_EXTENSION));
    } else {
        path.push(name);
        path.set_extension(ENTRY_EXTENSION);
    }
    Ok(path)
}

/// Path component of an item link, unless it is the site root.
fn original_path(link: &str) -> Option<String> {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link.to_string(),
    };
    (!path.is_empty() && path != "/").then_some(path)
}

fn format_date(date: &DateTime<Local>, pattern: &str) -> Result<String, MaterializeError> {
    let mut out = String::new();
    write!(out, "{}", date.format(pattern))
        .map_err(|_| MaterializeError::DateFormat(pattern.to_string()))?;
    Ok(out)
}

fn render_entry(
    title: &str,
    date: &str,
    format: Markup,
    permalink: Option<&str>,
    body: &str,
) -> String {
    let mut out = String::with_capacity(body.len() + 128);
    out.push_str("---\n");
    out.push_str(&format!("title: {}\n", escape_front_matter(title)));
    out.push_str(&format!("date: {}\n", date));
    out.push_str(&format!("filter: [{}]\n", format));
    if let Some(permalink) = permalink {
        out.push_str(&format!("permalink: {}\n", permalink));
    }
    out.push_str("---\n\n");
    out.push_str(body);
    out
}

/// Creates `dest` with `contents`, failing if it already exists.
fn write_new(dest: &Path, contents: &str) -> Result<(), MaterializeError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| MaterializeError::Io { path, source }
    };

    let dir = dest
        .parent()
        .ok_or_else(|| MaterializeError::InvalidPermalink(dest.display().to_string()))?;

    // create_dir_all succeeds when another writer created the directory first
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".feedport-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_error(dir))?;
    tmp.write_all(contents.as_bytes())
        .map_err(io_error(tmp.path()))?;
    tmp.as_file().sync_all().map_err(io_error(tmp.path()))?;

    // Dropping `tmp` on any early return deletes the temporary file.
    if dest.exists() {
        return Err(MaterializeError::Exists(dest.to_path_buf()));
    }

    tmp.persist_noclobber(dest).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            MaterializeError::Exists(dest.to_path_buf())
        } else {
            MaterializeError::Io {
                path: dest.to_path_buf(),
                source: e.error,
            }
        }
    })?;

    Ok(())
}
