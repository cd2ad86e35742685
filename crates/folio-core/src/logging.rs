//! Structured logging schema, field name constants, and subscriber setup.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by the same field names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue (lock timeout, orphaned insert, slow mutation) |
//! | INFO  | Lifecycle events (pool created, collection created/deleted) |
//! | DEBUG | Lock acquire/release, structure persisted |
//! | TRACE | Per-node traversal detail |

pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::{Error, Result};

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "structure", "lock", "database"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "tree", "memory_lock", "pg_advisory", "redis_lock", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "insert", "update", "remove", "move", "acquire", "release"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Collection UUID owning the structure.
pub const COLLECTION_ID: &str = "collection_id";

/// Document UUID being placed, updated, or removed.
pub const DOCUMENT_ID: &str = "document_id";

/// Parent document UUID for an insert.
pub const PARENT_ID: &str = "parent_id";

/// Advisory lock key.
pub const LOCK_KEY: &str = "lock_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Total node count of a structure after mutation.
pub const NODE_COUNT: &str = "node_count";

/// Number of connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";

/// Output options for [`init_tracing`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Write to a daily-rotated file at this path instead of stdout.
    pub file: Option<String>,
    /// Force ANSI colors on or off; `None` auto-detects (always off for files).
    pub ansi: Option<bool>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl LogOptions {
    /// Read options from the environment.
    ///
    /// - `LOG_FORMAT`: "json" or "text" (default: "text")
    /// - `LOG_FILE`: path to log file (optional)
    /// - `LOG_ANSI`: "true"/"false" override
    pub fn from_env() -> Self {
        Self {
            json: std::env::var("LOG_FORMAT")
                .map(|v| v == "json")
                .unwrap_or(false),
            file: std::env::var("LOG_FILE").ok(),
            ansi: std::env::var("LOG_ANSI")
                .ok()
                .map(|v| v == "true" || v == "1"),
            default_filter: "folio_core=info,folio_db=info".to_string(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns the file writer guard when file output is enabled; it must be held
/// for the life of the process or buffered lines are lost. Fails with
/// [`Error::Config`] when a global subscriber is already installed.
pub fn init_tracing(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| options.default_filter.clone().into());

    let registry = tracing_subscriber::registry().with(env_filter);
    let already_set = |e: TryInitError| Error::Config(format!("tracing already initialized: {}", e));

    if let Some(ref path) = options.file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("folio.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if options.json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .try_init()
                .map_err(already_set)?;
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(options.ansi.unwrap_or(false));
            registry.with(layer).try_init().map_err(already_set)?;
        }
        Ok(Some(guard))
    } else {
        if options.json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(already_set)?;
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = options.ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).try_init().map_err(already_set)?;
        }
        Ok(None)
    }
}
