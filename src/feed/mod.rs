//! Source retrieval and feed parsing.
//!
//! - **Fetching**: local files or HTTP(S) GET with Basic Auth and a single
//!   credential retry on 401
//! - **Parsing**: RSS 2.0 and Atom normalized into one [`FeedItem`] model,
//!   schema resolved before the first item is read
//! - **Documents**: a single HTML page treated as a one-item source
//!
//! # Example
//!
//! ```ignore
//! use feedport::feed::{fetch, parse, NoPrompt};
//!
//! let bytes = fetch(&client, "https://example.com/feed.xml", None, &NoPrompt, None).await?;
//! let (defaults, items) = parse(&bytes)?;
//! for item in items {
//!     let item = item?;
//!     println!("{} ({})", item.title, item.date);
//! }
//! ```

mod document;
mod fetcher;
mod parser;

pub use document::parse_document;
pub use fetcher::{
    fetch, ConsolePrompt, CredentialProvider, Credentials, FetchError, Location, NoPrompt,
};
pub use parser::{attempt, parse, Attempt, FeedDefaults, FeedItem, FeedItems, ParseError, Schema};
