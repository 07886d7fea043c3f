//! The import pipeline: fetch, parse, convert and materialize in one pass.

use reqwest::redirect::Policy;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::content::{Converter, Markup};
use crate::feed::{
    self, CredentialProvider, Credentials, FeedDefaults, FeedItem, FetchError, ParseError,
};
use crate::store::{ContentStore, EntryOptions, EventLog, MaterializeError, Materializer};

/// Any error that ends an import run. Entries written before it stay on disk.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

/// Settings for [`build`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Markup the item content is converted to.
    pub target: Markup,
    pub entries: EntryOptions,
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct ImportSummary {
    /// Document defaults; `None` in single-document mode.
    pub defaults: Option<FeedDefaults>,
    /// Entry paths in document order. With `dry_run` nothing was written.
    pub entries: Vec<PathBuf>,
}

/// How a fetched source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    Feed,
    /// One HTML page imported as one entry.
    Document,
}

/// Converts and writes every item, in order.
///
/// Items are pulled one at a time; the first error (a malformed item, a
/// collision, an I/O failure) stops the run.
pub async fn build<I>(
    items: I,
    converter: &Converter,
    store: &dyn ContentStore,
    events: &dyn EventLog,
    options: &BuildOptions,
) -> Result<Vec<PathBuf>, ImportError>
where
    I: IntoIterator<Item = Result<FeedItem, ParseError>>,
{
    let mut materializer = Materializer::new(store, events, options.entries.clone());
    let mut written = Vec::new();

    for item in items {
        let item = item?;
        let content = converter.convert(&item.content, options.target).await;
        if content.format != options.target {
            tracing::debug!(
                title = %item.title,
                requested = %options.target,
                actual = %content.format,
                "Entry keeps unconverted content"
            );
        }
        written.push(materializer.create_entry(&item, &content)?);
    }

    Ok(written)
}

/// Builds the HTTP client used for fetching sources.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .user_agent(concat!("feedport/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 5 {
            return attempt.error("Too many redirects (max 5)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Runs a whole import from one source.
pub struct Importer<'a> {
    pub client: reqwest::Client,
    pub provider: &'a dyn CredentialProvider,
    pub converter: Converter,
    pub store: &'a dyn ContentStore,
    pub events: &'a dyn EventLog,
    pub fetch_timeout: Option<Duration>,
}

impl Importer<'_> {
    /// Fetches `location`, parses it as `kind` and writes one entry per item.
    pub async fn run(
        &self,
        location: &str,
        credentials: Option<&Credentials>,
        kind: SourceKind,
        options: &BuildOptions,
    ) -> Result<ImportSummary, ImportError> {
        let bytes = feed::fetch(
            &self.client,
            location,
            credentials,
            self.provider,
            self.fetch_timeout,
        )
        .await?;
        tracing::debug!(location = %location, bytes = bytes.len(), "Source fetched");

        let summary = match kind {
            SourceKind::Feed => {
                let (defaults, items) = feed::parse(&bytes)?;
                tracing::info!(
                    schema = %items.schema(),
                    sitename = ?defaults.sitename,
                    "Importing feed"
                );
                let entries =
                    build(items, &self.converter, self.store, self.events, options).await?;
                ImportSummary {
                    defaults: Some(defaults),
                    entries,
                }
            }
            SourceKind::Document => {
                let item = feed::parse_document(&bytes, location)?;
                let entries = build(
                    [Ok(item)],
                    &self.converter,
                    self.store,
                    self.events,
                    options,
                )
                .await?;
                ImportSummary {
                    defaults: None,
                    entries,
                }
            }
        };

        tracing::info!(entries = summary.entries.len(), "Import finished");
        Ok(summary)
    }
}
