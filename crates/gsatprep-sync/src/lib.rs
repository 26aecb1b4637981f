//! gsatprep-sync: Configuration and telemetry delivery.
//!
//! Sends completed-session summaries to a remote analytics endpoint in the
//! background, retrying failed sends, going quiet when the endpoint keeps
//! failing and keeping a local backup of anything undelivered. Also loads
//! the `gsat.toml` configuration that wires it up.

pub mod backup;
pub mod config;
pub mod error;
pub mod mock;
pub mod sink;
pub mod transport;

pub use config::{create_sink, load_config, load_config_from, GsatConfig, TelemetryConfig};
pub use error::SyncError;
pub use backup::SummaryBackup;
pub use sink::{BackgroundSink, RetryPolicy};
pub use transport::{HttpTransport, SummaryTransport};
