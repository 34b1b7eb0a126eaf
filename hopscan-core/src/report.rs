// JSON-lines report output

use crate::audit::{HostAudit, Variant};
use hopscan_scanner::{Classification, Hop};
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("error writing output for {hostname}: {source}")]
    Io {
        hostname: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error serializing output for {hostname}: {source}")]
    Serialize {
        hostname: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Record emitted when every policy ran, hops carry `upgraded`.
#[derive(Debug, Serialize)]
pub struct FullRecord<'a> {
    pub hostname: &'a str,
    pub http_result: Classification,
    pub http_steps: &'a [Hop],
    pub https_result: Classification,
    pub https_steps: &'a [Hop],
    pub http_upgrades: Classification,
    pub http_upgrades_steps: &'a [Hop],
    pub http_force_upgrades: Classification,
    pub http_force_upgrades_steps: &'a [Hop],
}

/// Record emitted for the plain http/https pair, without upgrade tracking.
#[derive(Debug, Serialize)]
pub struct BasicRecord<'a> {
    pub hostname: &'a str,
    pub http_result: Classification,
    pub http_steps: Vec<BasicHop<'a>>,
    pub https_result: Classification,
    pub https_steps: Vec<BasicHop<'a>>,
}

#[derive(Debug, Serialize)]
pub struct BasicHop<'a> {
    pub hostname: &'a str,
    pub terminal: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<&'a str>,
    pub insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> From<&'a Hop> for BasicHop<'a> {
    fn from(hop: &'a Hop) -> Self {
        Self {
            hostname: &hop.hostname,
            terminal: hop.terminal,
            status_code: hop.status_code,
            next: hop.next.as_deref(),
            insecure: hop.insecure,
            error: hop.error.as_deref(),
        }
    }
}

fn basic_steps(steps: &[Hop]) -> Vec<BasicHop<'_>> {
    steps.iter().map(BasicHop::from).collect()
}

/// Serialize one audit to a single-line JSON object.
///
/// The record shape follows the audit itself: upgrade fields are written
/// only when the upgrade policies ran.
pub fn render_record(audit: &HostAudit) -> Result<String, serde_json::Error> {
    match &audit.upgrades {
        Some(upgrades) => serde_json::to_string(&FullRecord {
            hostname: &audit.hostname,
            http_result: audit.http.classification,
            http_steps: &audit.http.steps,
            https_result: audit.https.classification,
            https_steps: &audit.https.steps,
            http_upgrades: upgrades.optional.classification,
            http_upgrades_steps: &upgrades.optional.steps,
            http_force_upgrades: upgrades.forced.classification,
            http_force_upgrades_steps: &upgrades.forced.steps,
        }),
        None => serde_json::to_string(&BasicRecord {
            hostname: &audit.hostname,
            http_result: audit.http.classification,
            http_steps: basic_steps(&audit.http.steps),
            https_result: audit.https.classification,
            https_steps: basic_steps(&audit.https.steps),
        }),
    }
}

/// Writes one JSON object per line, flushing after each record so partial
/// runs leave complete lines behind.
pub struct ReportWriter<W> {
    writer: W,
    variant: Variant,
    written: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(writer: W, variant: Variant) -> Self {
        Self {
            writer,
            variant,
            written: 0,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn write(&mut self, audit: &HostAudit) -> Result<(), ReportError> {
        debug_assert_eq!(
            audit.upgrades.is_some(),
            self.variant == Variant::Full,
            "audit shape does not match the report variant"
        );

        let line = render_record(audit).map_err(|source| ReportError::Serialize {
            hostname: audit.hostname.clone(),
            source,
        })?;

        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|source| ReportError::Io {
                hostname: audit.hostname.clone(),
                source,
            })?;

        self.written += 1;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
