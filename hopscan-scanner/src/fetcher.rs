use crate::error::{Result, ScanError};
use crate::hop::Hop;
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, LOCATION};
use reqwest::tls::TlsInfo;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Issues a single request for a URL without following redirects.
///
/// This is the seam between the navigator and the network. Implementations
/// must not retry; retry policy belongs to the caller.
pub trait Transport {
    fn fetch(&self, url: &Url) -> impl Future<Output = FetchOutcome> + Send;
}

/// Result of one fetch attempt.
#[derive(Debug)]
pub struct FetchOutcome {
    pub hop: Hop,
    /// Redirect target, resolved against the requested URL
    pub next: Option<Url>,
    pub error: Option<ScanError>,
}

impl FetchOutcome {
    /// A response without a redirect location.
    pub fn terminal(mut hop: Hop) -> Self {
        hop.terminal = true;
        hop.next = None;
        Self {
            hop,
            next: None,
            error: None,
        }
    }

    pub fn redirect(mut hop: Hop, next: Url) -> Self {
        hop.terminal = false;
        hop.next = Some(next.to_string());
        Self {
            hop,
            next: Some(next),
            error: None,
        }
    }

    /// A failed attempt. The error description is recorded on the hop.
    pub fn failed(mut hop: Hop, error: ScanError) -> Self {
        hop.error = Some(error.to_string());
        hop.next = None;
        Self {
            hop,
            next: None,
            error: Some(error),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// Immutable client settings for the [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    timeout: Duration,
    user_agent: String,
    accept_language: String,
}

impl FetchConfig {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = accept_language.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn accept_language(&self) -> &str {
        &self.accept_language
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// reqwest-backed [`Transport`]. Cheap to clone; clones share one
/// connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let accept_language = HeaderValue::from_str(config.accept_language())
            .map_err(|e| ScanError::ClientBuild(format!("Accept-Language: {}", e)))?;
        headers.insert(ACCEPT_LANGUAGE, accept_language);

        let client = Client::builder()
            .user_agent(config.user_agent())
            .default_headers(headers)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            // Attaches TlsInfo to responses that arrived over TLS
            .tls_info(true)
            .build()
            .map_err(|e| ScanError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }

    async fn send_one(&self, url: &Url) -> FetchOutcome {
        debug!("Fetching {}", url);

        let mut hop = Hop::new(authority(url));
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Request to {} failed: {}", url, e);
                return FetchOutcome::failed(hop, e.into());
            }
        };

        hop.status_code = response.status().as_u16();
        hop.insecure = response.extensions().get::<TlsInfo>().is_none();

        match response.headers().get(LOCATION) {
            None => FetchOutcome::terminal(hop),
            Some(value) if value.is_empty() => FetchOutcome::terminal(hop),
            Some(value) => match resolve_location(url, value) {
                Ok(next) => FetchOutcome::redirect(hop, next),
                Err(e) => FetchOutcome::failed(hop, e),
            },
        }
    }
}

impl Transport for Fetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = FetchOutcome> + Send {
        self.send_one(url)
    }
}

/// Host plus explicit port, if any. A port equal to the scheme's default
/// has already been dropped by `Url::parse`.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn resolve_location(base: &Url, value: &HeaderValue) -> Result<Url> {
    let location = value
        .to_str()
        .map_err(|_| ScanError::InvalidLocation("non-ASCII Location header".to_string()))?;
    base.join(location)
        .map_err(|e| ScanError::InvalidLocation(format!("{:?}: {}", location, e)))
}
