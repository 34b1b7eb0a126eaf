// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{audit_files, expand_path, init_tracing, open_input, open_output};

// Re-export audit functionality from hopscan-core
pub use hopscan_core::{AuditOptions, AuditSummary, Variant, execute_audit};
