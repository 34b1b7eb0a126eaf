use crate::error::ScanError;
use crate::fetcher::{FetchOutcome, Transport};
use crate::hop::{Classification, Hop, Scheme, UpgradePolicy};
use tracing::{debug, info, warn};
use url::Url;

/// Hard cap on hops per chain. Stops redirect loops.
pub const MAX_CHAIN_LENGTH: usize = 25;

/// Outcome of one navigation run.
///
/// `error` is the failure that ended the chain early, if any. Consumers that
/// only emit results should rely on `classification`, which is
/// [`Classification::Error`] whenever `error` is set.
#[derive(Debug)]
pub struct Navigation {
    pub chain: Vec<Hop>,
    pub classification: Classification,
    pub error: Option<ScanError>,
}

impl Navigation {
    fn completed(chain: Vec<Hop>) -> Self {
        let classification = classify(&chain);
        Self {
            chain,
            classification,
            error: None,
        }
    }

    fn failed(chain: Vec<Hop>, error: ScanError) -> Self {
        Self {
            chain,
            classification: Classification::Error,
            error: Some(error),
        }
    }
}

/// Classify a chain from its hops' `insecure` flags alone.
pub fn classify(chain: &[Hop]) -> Classification {
    let Some(last) = chain.last() else {
        return Classification::Error;
    };

    let has_insecure = chain.iter().any(|hop| hop.insecure);
    match (last.insecure, has_insecure) {
        (false, false) => Classification::Secure,
        (false, true) => Classification::InsecureRedirect,
        (true, _) => Classification::Insecure,
    }
}

/// Follows redirect chains one hop at a time over a [`Transport`].
pub struct Navigator<T> {
    transport: T,
}

impl<T: Transport> Navigator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Navigate from `scheme://hostname/` under `policy`.
    ///
    /// Never fails: transport errors end the chain and are returned inside
    /// the [`Navigation`] with an `ERROR` classification.
    pub async fn navigate(
        &self,
        hostname: &str,
        scheme: Scheme,
        policy: UpgradePolicy,
    ) -> Navigation {
        let mut url = match start_url(hostname, scheme) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot navigate {}: {}", hostname, e);
                return Navigation::failed(Vec::new(), e);
            }
        };

        let mut chain: Vec<Hop> = Vec::new();
        while chain.len() < MAX_CHAIN_LENGTH {
            let upgrade = if should_upgrade(&url, policy) {
                upgraded(&url)
            } else {
                None
            };
            let attempted_upgrade = upgrade.is_some();
            let mut did_upgrade = attempted_upgrade;

            let mut outcome = self.transport.fetch(upgrade.as_ref().unwrap_or(&url)).await;
            if outcome.is_err() && attempted_upgrade && policy.can_retry() {
                debug!("Upgrade of {} failed, retrying without TLS", url);
                did_upgrade = false;
                outcome = self.transport.fetch(&url).await;
            }

            let FetchOutcome { mut hop, next, error } = outcome;
            if let Some(error) = error {
                warn!(
                    "{} ({}, {:?}) ended after {} hop(s): {}",
                    hostname,
                    scheme,
                    policy,
                    chain.len(),
                    error
                );
                return Navigation::failed(chain, error);
            }

            hop.upgraded = did_upgrade;
            debug!(
                "Hop {}: {} status={} insecure={} upgraded={}",
                chain.len() + 1,
                hop.hostname,
                hop.status_code,
                hop.insecure,
                hop.upgraded
            );
            let terminal = hop.terminal;
            chain.push(hop);

            match next {
                Some(next) if !terminal => url = next,
                _ => break,
            }
        }

        if chain.len() >= MAX_CHAIN_LENGTH {
            debug!("{} reached the {} hop limit", hostname, MAX_CHAIN_LENGTH);
        }

        let navigation = Navigation::completed(chain);
        info!(
            "{} ({}, {:?}): {} after {} hop(s)",
            hostname,
            scheme,
            policy,
            navigation.classification,
            navigation.chain.len()
        );
        navigation
    }
}

fn start_url(hostname: &str, scheme: Scheme) -> Result<Url, ScanError> {
    let url = Url::parse(&format!("{}://{}/", scheme, hostname))
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", hostname, e)))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ScanError::InvalidUrl(format!("{}: missing host", hostname)));
    }
    Ok(url)
}

fn should_upgrade(url: &Url, policy: UpgradePolicy) -> bool {
    match url.scheme() {
        "http" => matches!(policy, UpgradePolicy::Optional | UpgradePolicy::Force),
        _ => false,
    }
}

fn upgraded(url: &Url) -> Option<Url> {
    let mut upgraded = url.clone();
    upgraded.set_scheme("https").ok()?;
    Some(upgraded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::authority;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Reply {
        Response {
            status: u16,
            tls: bool,
            location: Option<&'static str>,
        },
        Fail,
    }

    /// Scripted transport keyed by exact URL. Unknown URLs fail.
    #[derive(Default)]
    struct MockTransport {
        replies: HashMap<String, Reply>,
        requests: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn reply(mut self, url: &str, status: u16, tls: bool, location: Option<&'static str>) -> Self {
            self.replies.insert(
                url.to_string(),
                Reply::Response {
                    status,
                    tls,
                    location,
                },
            );
            self
        }

        fn fail(mut self, url: &str) -> Self {
            self.replies.insert(url.to_string(), Reply::Fail);
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn respond(&self, url: &Url) -> FetchOutcome {
            self.requests.lock().unwrap().push(url.to_string());
            let mut hop = Hop::new(authority(url));
            match self.replies.get(url.as_str()).cloned().unwrap_or(Reply::Fail) {
                Reply::Fail => FetchOutcome::failed(
                    hop,
                    ScanError::Other(format!("connection to {} refused", url)),
                ),
                Reply::Response {
                    status,
                    tls,
                    location,
                } => {
                    hop.status_code = status;
                    hop.insecure = !tls;
                    match location {
                        None => FetchOutcome::terminal(hop),
                        Some(location) => match url.join(location) {
                            Ok(next) => FetchOutcome::redirect(hop, next),
                            Err(e) => {
                                FetchOutcome::failed(hop, ScanError::InvalidLocation(e.to_string()))
                            }
                        },
                    }
                }
            }
        }
    }

    impl Transport for MockTransport {
        fn fetch(&self, url: &Url) -> impl Future<Output = FetchOutcome> + Send {
            let outcome = self.respond(url);
            async move { outcome }
        }
    }

    fn hop(insecure: bool) -> Hop {
        let mut hop = Hop::new("example.com".to_string());
        hop.insecure = insecure;
        hop
    }

    #[test]
    fn test_classify_empty_chain_is_error() {
        assert_eq!(classify(&[]), Classification::Error);
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(&[hop(false)]), Classification::Secure);
        assert_eq!(classify(&[hop(false), hop(false)]), Classification::Secure);
        assert_eq!(
            classify(&[hop(true), hop(false)]),
            Classification::InsecureRedirect
        );
        assert_eq!(
            classify(&[hop(false), hop(true), hop(false)]),
            Classification::InsecureRedirect
        );
        assert_eq!(classify(&[hop(true)]), Classification::Insecure);
        assert_eq!(classify(&[hop(false), hop(true)]), Classification::Insecure);
        assert_eq!(classify(&[hop(true), hop(true)]), Classification::Insecure);
    }

    #[test]
    fn test_classify_ignores_status_and_urls() {
        let mut failing = hop(false);
        failing.status_code = 500;
        failing.next = Some("http://elsewhere.example/".to_string());
        assert_eq!(classify(&[failing]), Classification::Secure);
    }

    #[test]
    fn test_start_url_rejects_garbage() {
        assert!(start_url("", Scheme::Http).is_err());
        assert!(start_url("exa mple.com", Scheme::Https).is_err());
        assert_eq!(
            start_url("example.com", Scheme::Https).unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[tokio::test]
    async fn test_secure_single_hop() {
        let transport = MockTransport::default().reply("https://example.com/", 200, true, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Https, UpgradePolicy::None)
            .await;

        assert!(navigation.error.is_none());
        assert_eq!(navigation.classification, Classification::Secure);
        assert_eq!(navigation.chain.len(), 1);
        assert!(navigation.chain[0].terminal);
        assert!(!navigation.chain[0].insecure);
        assert_eq!(navigation.chain[0].status_code, 200);
    }

    #[tokio::test]
    async fn test_http_redirect_to_https_is_insecure_redirect() {
        let transport = MockTransport::default()
            .reply("http://example.com/", 301, false, Some("https://example.com/"))
            .reply("https://example.com/", 200, true, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::None)
            .await;

        assert_eq!(navigation.classification, Classification::InsecureRedirect);
        let chain = &navigation.chain;
        assert_eq!(chain.len(), 2);
        assert!(chain[0].insecure);
        assert!(!chain[0].terminal);
        assert_eq!(chain[0].next.as_deref(), Some("https://example.com/"));
        assert!(!chain[1].insecure);
        assert!(chain[1].terminal);
        assert!(chain.iter().all(|hop| !hop.upgraded));
    }

    #[tokio::test]
    async fn test_https_without_tls_session_is_insecure() {
        let transport = MockTransport::default().reply("https://example.com/", 200, false, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Https, UpgradePolicy::None)
            .await;

        assert_eq!(navigation.classification, Classification::Insecure);
        assert_eq!(navigation.chain.len(), 1);
        assert!(navigation.chain[0].insecure);
        assert!(navigation.chain[0].terminal);
    }

    #[tokio::test]
    async fn test_first_hop_failure_is_error_with_empty_chain() {
        let transport = MockTransport::default().fail("http://example.com/");
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::None)
            .await;

        assert_eq!(navigation.classification, Classification::Error);
        assert!(navigation.chain.is_empty());
        assert!(navigation.error.is_some());
        assert_eq!(navigator.transport().requests(), vec!["http://example.com/"]);
    }

    #[tokio::test]
    async fn test_mid_chain_failure_keeps_partial_chain() {
        let transport = MockTransport::default()
            .reply("http://example.com/", 301, false, Some("https://example.com/"))
            .fail("https://example.com/");
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::None)
            .await;

        assert_eq!(navigation.classification, Classification::Error);
        assert_eq!(navigation.chain.len(), 1);
        assert!(navigation.chain[0].error.is_none());
        assert!(navigation.error.is_some());
    }

    #[tokio::test]
    async fn test_malformed_location_ends_chain() {
        let transport = MockTransport::default().reply(
            "http://example.com/",
            302,
            false,
            Some("http://[::1"),
        );
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::None)
            .await;

        assert_eq!(navigation.classification, Classification::Error);
        assert!(navigation.chain.is_empty());
        assert!(matches!(
            navigation.error,
            Some(ScanError::InvalidLocation(_))
        ));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_capped() {
        let transport = MockTransport::default().reply(
            "http://loop.example/",
            302,
            false,
            Some("/"),
        );
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("loop.example", Scheme::Http, UpgradePolicy::None)
            .await;

        assert!(navigation.error.is_none());
        assert_eq!(navigation.chain.len(), MAX_CHAIN_LENGTH);
        assert_eq!(navigator.transport().requests().len(), MAX_CHAIN_LENGTH);
        assert_eq!(navigation.classification, Classification::Insecure);
        assert!(navigation.chain.iter().all(|hop| !hop.terminal));
    }

    #[tokio::test]
    async fn test_no_upgrade_sends_scheme_unmodified() {
        let transport = MockTransport::default()
            .reply("http://example.com/", 302, false, Some("http://www.example.com/"))
            .reply("http://www.example.com/", 200, false, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::None)
            .await;

        assert_eq!(
            navigator.transport().requests(),
            vec!["http://example.com/", "http://www.example.com/"]
        );
        assert!(navigation.chain.iter().all(|hop| !hop.upgraded));
        assert_eq!(navigation.classification, Classification::Insecure);
    }

    #[tokio::test]
    async fn test_force_upgrade_rewrites_every_http_hop() {
        let transport = MockTransport::default()
            .reply("https://example.com/", 301, true, Some("http://www.example.com/"))
            .reply("https://www.example.com/", 200, true, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::Force)
            .await;

        assert_eq!(
            navigator.transport().requests(),
            vec!["https://example.com/", "https://www.example.com/"]
        );
        assert_eq!(navigation.classification, Classification::Secure);
        assert!(navigation.chain.iter().all(|hop| hop.upgraded));
        // The recorded redirect target is what the server sent
        assert_eq!(
            navigation.chain[0].next.as_deref(),
            Some("http://www.example.com/")
        );
    }

    #[tokio::test]
    async fn test_force_upgrade_failure_does_not_fall_back() {
        let transport = MockTransport::default()
            .fail("https://example.com/")
            .reply("http://example.com/", 200, false, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::Force)
            .await;

        assert_eq!(navigation.classification, Classification::Error);
        assert!(navigation.chain.is_empty());
        assert_eq!(navigator.transport().requests(), vec!["https://example.com/"]);
    }

    #[tokio::test]
    async fn test_optional_upgrade_falls_back_once() {
        let transport = MockTransport::default()
            .fail("https://example.com/")
            .reply("http://example.com/", 200, false, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::Optional)
            .await;

        assert_eq!(
            navigator.transport().requests(),
            vec!["https://example.com/", "http://example.com/"]
        );
        assert_eq!(navigation.classification, Classification::Insecure);
        assert_eq!(navigation.chain.len(), 1);
        assert!(!navigation.chain[0].upgraded);
        assert!(navigation.error.is_none());
    }

    #[tokio::test]
    async fn test_optional_upgrade_fallback_failure_is_error() {
        let transport = MockTransport::default();
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::Optional)
            .await;

        assert_eq!(navigation.classification, Classification::Error);
        assert!(navigation.chain.is_empty());
        assert_eq!(navigator.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_optional_upgrade_success_is_marked_upgraded() {
        let transport = MockTransport::default().reply("https://example.com/", 200, true, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::Optional)
            .await;

        assert_eq!(navigation.classification, Classification::Secure);
        assert!(navigation.chain[0].upgraded);
        assert_eq!(navigator.transport().requests(), vec!["https://example.com/"]);
    }

    #[tokio::test]
    async fn test_https_start_is_never_upgraded() {
        let transport = MockTransport::default().reply("https://example.com/", 200, true, None);
        let navigator = Navigator::new(transport);

        let navigation = navigator
            .navigate("example.com", Scheme::Https, UpgradePolicy::Force)
            .await;

        assert!(!navigation.chain[0].upgraded);
    }

    #[tokio::test]
    async fn test_navigation_is_idempotent() {
        let transport = MockTransport::default()
            .reply("http://example.com/", 301, false, Some("https://example.com/"))
            .reply("https://example.com/", 302, true, Some("/home"))
            .reply("https://example.com/home", 200, true, None);
        let navigator = Navigator::new(transport);

        let first = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::None)
            .await;
        let second = navigator
            .navigate("example.com", Scheme::Http, UpgradePolicy::None)
            .await;

        assert_eq!(first.chain, second.chain);
        assert_eq!(first.classification, second.classification);
        assert_eq!(first.chain.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_hostname_is_error_without_requests() {
        let navigator = Navigator::new(MockTransport::default());

        let navigation = navigator
            .navigate("bad host", Scheme::Http, UpgradePolicy::None)
            .await;

        assert_eq!(navigation.classification, Classification::Error);
        assert!(matches!(navigation.error, Some(ScanError::InvalidUrl(_))));
        assert!(navigator.transport().requests().is_empty());
    }

    mod live {
        use super::super::*;
        use crate::fetcher::{FetchConfig, Fetcher};
        use wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{method, path},
        };

        fn navigator() -> Navigator<Fetcher> {
            Navigator::new(Fetcher::new(&FetchConfig::new()).unwrap())
        }

        #[tokio::test]
        async fn test_live_redirect_loop_stops_at_cap() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/"))
                .respond_with(ResponseTemplate::new(302).insert_header("location", "/"))
                .expect(MAX_CHAIN_LENGTH as u64)
                .mount(&mock_server)
                .await;

            let host = mock_server.address().to_string();
            let navigation = navigator()
                .navigate(&host, Scheme::Http, UpgradePolicy::None)
                .await;

            assert_eq!(navigation.chain.len(), MAX_CHAIN_LENGTH);
            assert_eq!(navigation.classification, Classification::Insecure);
        }

        #[tokio::test]
        async fn test_live_plain_http_chain() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/"))
                .respond_with(ResponseTemplate::new(301).insert_header("location", "/welcome"))
                .mount(&mock_server)
                .await;
            Mock::given(method("GET"))
                .and(path("/welcome"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&mock_server)
                .await;

            let host = mock_server.address().to_string();
            let navigation = navigator()
                .navigate(&host, Scheme::Http, UpgradePolicy::None)
                .await;

            assert_eq!(navigation.chain.len(), 2);
            assert_eq!(navigation.chain[0].status_code, 301);
            assert_eq!(navigation.chain[1].status_code, 200);
            assert!(navigation.chain[1].terminal);
            assert_eq!(navigation.classification, Classification::Insecure);
        }

        #[tokio::test]
        async fn test_live_optional_upgrade_falls_back_to_plain_http() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&mock_server)
                .await;

            let host = mock_server.address().to_string();
            let navigation = navigator()
                .navigate(&host, Scheme::Http, UpgradePolicy::Optional)
                .await;

            assert!(navigation.error.is_none());
            assert_eq!(navigation.chain.len(), 1);
            assert!(!navigation.chain[0].upgraded);
            assert_eq!(navigation.classification, Classification::Insecure);
        }

        #[tokio::test]
        async fn test_live_force_upgrade_against_plain_server_is_error() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&mock_server)
                .await;

            let host = mock_server.address().to_string();
            let navigation = navigator()
                .navigate(&host, Scheme::Http, UpgradePolicy::Force)
                .await;

            assert_eq!(navigation.classification, Classification::Error);
            assert!(navigation.chain.is_empty());
            assert!(matches!(navigation.error, Some(ScanError::HttpError(_))));
        }
    }
}
