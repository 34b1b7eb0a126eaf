pub mod error;
pub mod fetcher;
pub mod hop;
pub mod navigator;

pub use error::ScanError;
pub use fetcher::{FetchConfig, FetchOutcome, Fetcher, Transport};
pub use hop::{Classification, Hop, Scheme, UpgradePolicy};
pub use navigator::{MAX_CHAIN_LENGTH, Navigation, Navigator, classify};
