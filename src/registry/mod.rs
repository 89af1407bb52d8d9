//! # Staging Registry Infrastructure
//!
//! Client-side tracking of work items from creation through server
//! acknowledgement, plus the batch submission protocol.
//!
//! ## Overview
//!
//! ```text
//! Staging Registry
//! ├── StagingRegistry   (lifecycle buckets, handles, batch submission)
//! └── correlation       (matching server results to staged items)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use chartbatch_core::registry::StagingRegistry;
//! use chartbatch_core::journal::TransactionJournal;
//! use chartbatch_core::model::{ItemCategory, ItemPayload, PatientId};
//! use std::sync::Arc;
//!
//! # use chartbatch_core::api::BatchTransport;
//! # fn example(transport: Arc<dyn BatchTransport>) -> chartbatch_core::error::Result<()> {
//! let registry = StagingRegistry::new(Arc::new(TransactionJournal::in_memory()), transport);
//!
//! let payload = ItemPayload::new(PatientId(42), ItemCategory::Procedure, "D0120");
//! let client_id = registry.stage(payload)?;
//! assert_eq!(registry.stats().staged, 1);
//! # Ok(())
//! # }
//! ```

pub mod correlation;
pub mod staging;

pub use correlation::{correlate, CorrelationOutcome, SubmittedItem};
pub use staging::{BatchOutcome, RegistryStats, RetryOutcome, StagingRegistry};
