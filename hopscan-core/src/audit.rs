use crate::input::{HostnameReader, InputError};
use crate::report::{ReportError, ReportWriter};
use futures::stream::{self, StreamExt};
use hopscan_scanner::{
    Classification, FetchConfig, Fetcher, Hop, Navigation, Navigator, ScanError, Scheme,
    Transport, UpgradePolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Which set of navigation policies to run per hostname
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Plain http and plain https only
    Basic,
    /// Plain http, plain https, optional upgrade and forced upgrade
    Full,
}

impl Variant {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basic" => Some(Variant::Basic),
            "full" => Some(Variant::Full),
            _ => None,
        }
    }
}

/// Options for configuring an audit run
pub struct AuditOptions {
    pub timeout: Duration,
    pub variant: Variant,
    /// Hostnames audited concurrently. Output order always follows input order.
    pub threads: usize,
    pub show_progress: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            timeout: hopscan_scanner::fetcher::DEFAULT_TIMEOUT,
            variant: Variant::Full,
            threads: 1,
            show_progress: false,
        }
    }
}

/// Callback for reporting each completed hostname
pub type AuditProgressCallback = Arc<dyn Fn(&HostAudit) + Send + Sync>;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Classification and hops of one navigation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainResult {
    pub classification: Classification,
    pub steps: Vec<Hop>,
}

impl From<Navigation> for ChainResult {
    // The navigation error is dropped here; callers see it only as an
    // ERROR classification.
    fn from(navigation: Navigation) -> Self {
        Self {
            classification: navigation.classification,
            steps: navigation.chain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeAudit {
    pub optional: ChainResult,
    pub forced: ChainResult,
}

/// All navigation results for one hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAudit {
    pub hostname: String,
    pub http: ChainResult,
    pub https: ChainResult,
    /// Present only for [`Variant::Full`]
    pub upgrades: Option<UpgradeAudit>,
}

impl HostAudit {
    pub fn results(&self) -> Vec<&ChainResult> {
        let mut results = vec![&self.http, &self.https];
        if let Some(upgrades) = &self.upgrades {
            results.push(&upgrades.optional);
            results.push(&upgrades.forced);
        }
        results
    }

    /// Every policy ended in ERROR
    pub fn unreachable(&self) -> bool {
        self.results()
            .iter()
            .all(|result| result.classification == Classification::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub hosts: usize,
    pub unreachable: usize,
}

/// Runs every policy of a [`Variant`] against a hostname, one after another.
pub struct Auditor<T> {
    navigator: Navigator<T>,
    variant: Variant,
}

impl<T: Transport> Auditor<T> {
    pub fn new(transport: T, variant: Variant) -> Self {
        Self {
            navigator: Navigator::new(transport),
            variant,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn navigator(&self) -> &Navigator<T> {
        &self.navigator
    }

    pub async fn audit(&self, hostname: &str) -> HostAudit {
        debug!("Auditing {}", hostname);

        let http = self.run(hostname, Scheme::Http, UpgradePolicy::None).await;
        let https = self.run(hostname, Scheme::Https, UpgradePolicy::None).await;
        let upgrades = match self.variant {
            Variant::Basic => None,
            Variant::Full => {
                let optional = self.run(hostname, Scheme::Http, UpgradePolicy::Optional).await;
                let forced = self.run(hostname, Scheme::Http, UpgradePolicy::Force).await;
                Some(UpgradeAudit { optional, forced })
            }
        };

        HostAudit {
            hostname: hostname.to_string(),
            http,
            https,
            upgrades,
        }
    }

    async fn run(&self, hostname: &str, scheme: Scheme, policy: UpgradePolicy) -> ChainResult {
        self.navigator.navigate(hostname, scheme, policy).await.into()
    }
}

/// Audit hostnames from `input` and write one record per hostname to
/// `report`, in input order.
///
/// A bad input record stops the run. Records before it have already been
/// written.
pub async fn run_audit<T, I, W>(
    auditor: &Auditor<T>,
    hostnames: I,
    report: &mut ReportWriter<W>,
    threads: usize,
    progress_callback: Option<AuditProgressCallback>,
) -> Result<AuditSummary, AuditError>
where
    T: Transport,
    I: IntoIterator<Item = Result<String, InputError>>,
    W: Write,
{
    let mut audits = stream::iter(hostnames)
        .map(|hostname| async move {
            match hostname {
                Ok(hostname) => Ok(auditor.audit(&hostname).await),
                Err(e) => Err(e),
            }
        })
        .buffered(threads.max(1));

    let mut summary = AuditSummary::default();
    while let Some(audit) = audits.next().await {
        let audit = audit?;
        report.write(&audit)?;

        summary.hosts += 1;
        if audit.unreachable() {
            summary.unreachable += 1;
        }
        if let Some(ref callback) = progress_callback {
            callback(&audit);
        }
    }

    Ok(summary)
}

/// Build the HTTP transport from `options` and audit every hostname in
/// `input`.
pub async fn execute_audit<R, W>(
    options: AuditOptions,
    input: R,
    output: W,
) -> Result<AuditSummary, AuditError>
where
    R: BufRead,
    W: Write,
{
    let AuditOptions {
        timeout,
        variant,
        threads,
        show_progress,
    } = options;

    let fetcher = Fetcher::new(&FetchConfig::new().with_timeout(timeout))?;
    let auditor = Auditor::new(fetcher, variant);
    let mut report = ReportWriter::new(output, variant);

    // Spinner draws to stderr so stdout stays pure JSON
    let progress_bar = if show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Starting audit...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let progress_callback: Option<AuditProgressCallback> = progress_bar.clone().map(|pb| {
        Arc::new(move |audit: &HostAudit| {
            pb.set_message(format!("Audited {}", audit.hostname));
            pb.inc(1);
        }) as AuditProgressCallback
    });

    info!("Starting audit ({:?} variant, {} concurrent host(s))", variant, threads);
    let result = run_audit(
        &auditor,
        HostnameReader::new(input),
        &mut report,
        threads,
        progress_callback,
    )
    .await;

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    let summary = result?;
    info!(
        "Audit complete. {} host(s), {} unreachable",
        summary.hosts, summary.unreachable
    );
    Ok(summary)
}
