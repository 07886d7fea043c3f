use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a source document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Local file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response other than 200 or 401
    #[error("invalid status code {0}, aborting")]
    HttpStatus(u16),
    /// Server still answered 401 after the credential retry
    #[error("Authentication failed: server answered 401 Unauthorized")]
    Unauthorized,
    /// Credentials could not be obtained from the provider
    #[error("Could not read credentials: {0}")]
    Prompt(String),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// HTTP Basic Authentication credentials.
///
/// The password is kept in a [`SecretString`] and never printed by `Debug`.
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Parses the `user:password` form accepted on the command line.
    /// Everything after the first colon is the password.
    pub fn parse(pair: &str) -> Option<Self> {
        let (username, password) = pair.split_once(':')?;
        Some(Self::new(username, password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Source of credentials after a server answers 401.
///
/// Called at most once per [`fetch`]. Closures of the matching shape are
/// providers too, which is what tests use.
pub trait CredentialProvider {
    fn credentials(&self, location: &str) -> Result<Credentials, FetchError>;
}

impl<F> CredentialProvider for F
where
    F: Fn(&str) -> Result<Credentials, FetchError>,
{
    fn credentials(&self, location: &str) -> Result<Credentials, FetchError> {
        self(location)
    }
}

/// Asks on the terminal for a username and a hidden password.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl CredentialProvider for ConsolePrompt {
    fn credentials(&self, location: &str) -> Result<Credentials, FetchError> {
        eprintln!("{} requires authentication", location);
        let username: String = dialoguer::Input::new()
            .with_prompt("Username")
            .interact_text()
            .map_err(|e| FetchError::Prompt(e.to_string()))?;
        let password = dialoguer::Password::new()
            .with_prompt("Password")
            .interact()
            .map_err(|e| FetchError::Prompt(e.to_string()))?;
        Ok(Credentials::new(username, password))
    }
}

/// Provider for non-interactive runs: a 401 is final.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl CredentialProvider for NoPrompt {
    fn credentials(&self, _location: &str) -> Result<Credentials, FetchError> {
        Err(FetchError::Unauthorized)
    }
}

/// Where a source document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Path(PathBuf),
    Url(Url),
}

impl Location {
    /// Anything that is not an `http`/`https` URL is a local path.
    pub fn parse(location: &str) -> Self {
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Location::Url(url),
            _ => Location::Path(PathBuf::from(location)),
        }
    }
}

/// Retrieves the raw bytes of a source document.
///
/// Local paths are read whole. URLs are fetched with a single GET, with
/// HTTP Basic Authentication when `credentials` is given.
///
/// # Arguments
///
/// * `client` - HTTP client (caller controls configuration)
/// * `location` - File path or `http(s)://` URL
/// * `credentials` - Optional Basic Auth credentials for the first request
/// * `provider` - Asked once for credentials if the server answers 401
/// * `timeout` - Per-request timeout; `None` waits indefinitely
///
/// # Errors
///
/// - [`FetchError::Io`] - Local file unreadable
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::HttpStatus`] - Status other than 200 or 401
/// - [`FetchError::Unauthorized`] - 401 again after the credential retry
/// - [`FetchError::Prompt`] - Provider could not supply credentials
/// - [`FetchError::Timeout`] - Request exceeded `timeout`
/// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
pub async fn fetch(
    client: &reqwest::Client,
    location: &str,
    credentials: Option<&Credentials>,
    provider: &dyn CredentialProvider,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, FetchError> {
    let url = match Location::parse(location) {
        Location::Path(path) => return read_local(path).await,
        Location::Url(url) => url,
    };

    match request(client, &url, credentials, timeout).await? {
        Reply::Body(bytes) => Ok(bytes),
        Reply::Unauthorized => {
            tracing::info!(url = %url, "Server requires authentication, asking for credentials");
            let retry = provider.credentials(location)?;
            match request(client, &url, Some(&retry), timeout).await? {
                Reply::Body(bytes) => Ok(bytes),
                Reply::Unauthorized => Err(FetchError::Unauthorized),
            }
        }
    }
}

async fn read_local(path: PathBuf) -> Result<Vec<u8>, FetchError> {
    tracing::debug!(path = %path.display(), "Reading local source");
    tokio::fs::read(&path)
        .await
        .map_err(|source| FetchError::Io { path, source })
}

enum Reply {
    Body(Vec<u8>),
    Unauthorized,
}

async fn request(
    client: &reqwest::Client,
    url: &Url,
    credentials: Option<&Credentials>,
    timeout: Option<Duration>,
) -> Result<Reply, FetchError> {
    let mut builder = client.get(url.clone());
    if let Some(creds) = credentials {
        builder = builder.basic_auth(&creds.username, Some(creds.password.expose_secret()));
    }

    let send = builder.send();
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, send)
            .await
            .map_err(|_| FetchError::Timeout)?,
        None => send.await,
    }
    .map_err(FetchError::Network)?;

    match response.status() {
        reqwest::StatusCode::OK => Ok(Reply::Body(
            read_limited_bytes(response, MAX_FEED_SIZE).await?,
        )),
        reqwest::StatusCode::UNAUTHORIZED => Ok(Reply::Unauthorized),
        status => {
            tracing::warn!(url = %url, status = %status, "Unexpected HTTP status");
            Err(FetchError::HttpStatus(status.as_u16()))
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
