//! # System Constants
//!
//! Operational boundaries of the staging coordinator. Values here are the
//! crate-wide defaults; the configurable subset is surfaced through
//! [`crate::config::CoordinatorConfig`].

/// Prefix for client-local item identifiers.
pub const CLIENT_ID_PREFIX: &str = "ci";

/// Maximum regeneration attempts when a freshly generated client id collides
/// with one that is already staged.
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Number of journal entries retained locally. The journal exists to answer
/// "what did I recently submit" after a restart, not to be a full audit log;
/// the server keeps the authoritative transaction record.
pub const JOURNAL_CAPACITY: usize = 20;

/// File name of the persisted journal inside the platform data directory.
pub const JOURNAL_FILE_NAME: &str = "journal.json";

/// Directory name used under the platform data/config directories.
pub const APP_DIR_NAME: &str = "chartbatch";

/// Queue depth at which enqueueing a serialized operation logs a warning.
pub const QUEUE_WARN_DEPTH: usize = 32;

/// Path prefix for the charting batch API.
pub const API_PREFIX: &str = "/v1/charting";

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default retry budget for read-only transaction status queries. Batch
/// submission itself is never retried automatically.
pub const DEFAULT_STATUS_RETRIES: u32 = 3;

/// Base delay between status query retries; doubles per attempt.
pub const STATUS_RETRY_BASE_DELAY_MS: u64 = 250;

/// Upper bound on the delay between status query retries, whatever the
/// configured retry budget.
pub const STATUS_RETRY_MAX_DELAY_MS: u64 = 10_000;
