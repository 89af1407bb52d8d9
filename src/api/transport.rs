//! Transport seam for the charting batch API.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::TransactionId;
use crate::protocol::{BatchSubmitRequest, BatchSubmitResponse, TransactionRecord};

/// Common interface to the charting backend, regardless of how requests
/// actually travel.
///
/// The production implementation is [`crate::api::HttpBatchClient`]; tests
/// inject scripted fakes. Implementations must be safe to share across
/// tasks.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Transport name for debugging/logging.
    fn transport_name(&self) -> &'static str;

    /// Submit one batch of staged items.
    ///
    /// This is a write whose server-side effect is unknown on failure;
    /// implementations must issue it exactly once per call and never retry
    /// internally.
    async fn submit_batch(&self, request: &BatchSubmitRequest) -> Result<BatchSubmitResponse>;

    /// Fetch the authoritative record for a transaction.
    ///
    /// Read-only; implementations may retry transient failures.
    async fn transaction_status(&self, id: &TransactionId) -> Result<TransactionRecord>;

    /// Ask the server to re-attempt the unconfirmed sub-items of a
    /// transaction. User-initiated write, issued exactly once per call.
    async fn retry_transaction(&self, id: &TransactionId) -> Result<TransactionRecord>;
}
