use serde::{Serialize, Serializer};
use std::fmt;

/// One fetch attempt in a navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop {
    /// Authority (host and optional port) of the requested URL
    pub hostname: String,
    /// The response carried no redirect location
    pub terminal: bool,
    /// Zero when the request failed before a response arrived
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// The connection did not negotiate TLS
    pub insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The scheme was rewritten from http to https before sending
    pub upgraded: bool,
}

impl Hop {
    pub fn new(hostname: String) -> Self {
        Self {
            hostname,
            terminal: false,
            status_code: 0,
            next: None,
            insecure: false,
            error: None,
            upgraded: false,
        }
    }

    pub fn with_error(hostname: String, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(hostname)
        }
    }
}

/// Security verdict for a completed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Secure,
    InsecureRedirect,
    Insecure,
    Error,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Secure => "SECURE",
            Classification::InsecureRedirect => "INSECURE_REDIRECT",
            Classification::Insecure => "INSECURE",
            Classification::Error => "ERROR",
        }
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controls whether an `http` URL is rewritten to `https` before each hop,
/// and whether a failed upgrade may fall back to the original URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpgradePolicy {
    /// Send the URL as-is
    None,
    /// Upgrade, retrying once over plain http if the upgraded fetch fails
    Optional,
    /// Upgrade, and treat a failed upgraded fetch as the end of the chain
    Force,
}

impl UpgradePolicy {
    pub fn can_retry(&self) -> bool {
        matches!(self, UpgradePolicy::Optional)
    }
}

/// Scheme a navigation starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
