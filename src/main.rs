use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use feedport::config::Config;
use feedport::content::Markup;
use feedport::feed::{ConsolePrompt, Credentials};
use feedport::import::{http_client, BuildOptions, Importer, SourceKind};
use feedport::store::{ConsoleEvents, EntryOptions, PermalinkStore};

#[derive(Parser, Debug)]
#[command(
    name = "feedport",
    about = "Import an RSS/Atom feed or an HTML page as static-site entries"
)]
struct Args {
    /// Feed or page to import: a local path or an http(s) URL
    source: String,

    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "feedport.toml")]
    config: PathBuf,

    /// Target markup: markdown, rst or html (overrides config)
    #[arg(long, short = 'f', value_name = "FORMAT")]
    format: Option<String>,

    /// Keep each item's original URL path as its permalink
    #[arg(long, short = 'k')]
    keep_links: bool,

    /// Treat the source as a single HTML document instead of a feed
    #[arg(long)]
    html: bool,

    /// Basic Auth credentials for the first request
    #[arg(long, short = 'a', value_name = "USER:PASS", value_parser = parse_credentials)]
    auth: Option<String>,

    /// Directory entries are written below (overrides config)
    #[arg(long, value_name = "DIR")]
    entries_root: Option<PathBuf>,

    /// Parse and convert, print destinations, write nothing
    #[arg(long)]
    dry_run: bool,
}

fn parse_credentials(value: &str) -> Result<String, String> {
    match value.split_once(':') {
        Some((user, _)) if !user.is_empty() => Ok(value.to_string()),
        _ => Err("expected USER:PASS".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let target = match &args.format {
        Some(name) => Markup::from_name(name),
        None => config.markup(),
    };
    let credentials = args.auth.as_deref().and_then(Credentials::parse);

    let options = BuildOptions {
        target,
        entries: EntryOptions {
            entries_root: args
                .entries_root
                .clone()
                .unwrap_or_else(|| config.entries_root.clone()),
            date_format: config.date_format.clone(),
            preserve_link: args.keep_links,
            dry_run: args.dry_run,
        },
    };

    let store = PermalinkStore::new(config.entry_permalink.clone());
    let importer = Importer {
        client: http_client().context("Failed to build HTTP client")?,
        provider: &ConsolePrompt,
        converter: config.converter(),
        store: &store,
        events: &ConsoleEvents,
        fetch_timeout: config.fetch_timeout(),
    };

    let kind = if args.html {
        SourceKind::Document
    } else {
        SourceKind::Feed
    };

    let summary = importer
        .run(&args.source, credentials.as_ref(), kind, &options)
        .await
        .with_context(|| format!("Import of {} failed", args.source))?;

    if args.dry_run {
        for path in &summary.entries {
            println!("{:>8}  {}", "skip", path.display());
        }
    }

    Ok(())
}
