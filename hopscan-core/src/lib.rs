pub mod audit;
pub mod input;
pub mod report;

use colored::Colorize;

pub use audit::{
    AuditError, AuditOptions, AuditProgressCallback, AuditSummary, Auditor, ChainResult,
    HostAudit, UpgradeAudit, Variant, execute_audit, run_audit,
};
pub use input::{HostnameReader, InputError, read_hostnames};
pub use report::{ReportError, ReportWriter, render_record};

const BANNER: &str = r#"
  _                                         
 | |__   ___  _ __  ___  ___ __ _ _ __  
 | '_ \ / _ \| '_ \/ __|/ __/ _` | '_ \ 
 | | | | (_) | |_) \__ \ (_| (_| | | | |
 |_| |_|\___/| .__/|___/\___\__,_|_| |_|
             |_|                        
"#;

/// Print the banner to stderr. Stdout is reserved for report records.
pub fn print_banner() {
    eprintln!("{}", BANNER.bright_cyan().bold());
    eprintln!(
        "  {} {}\n",
        "hopscan".bright_white().bold(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
}
