#![allow(clippy::doc_markdown)] // Allow technical terms like TOML, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Chartbatch Core
//!
//! Client-side batching and transaction tracking for clinical charting.
//!
//! ## Overview
//!
//! Charting UIs stage many small work items (procedures, diagnoses,
//! prescriptions) before anything is persisted. This crate owns that
//! pending state: items are validated and staged locally, submitted to the
//! server as one atomic batch under a client-generated transaction id, and
//! reconciled back to their client ids when the server answers. A bounded
//! on-disk journal remembers recent transactions so an interrupted
//! submission can be resolved after restart.
//!
//! ## Architecture
//!
//! Every mutation flows through one [`coordinator::OperationCoordinator`].
//! Operations carry a declared [`queue::OperationKind`]; kinds that touch
//! the batch lifecycle are serialized through a FIFO queue, while read-only
//! and metadata operations bypass it. The staging registry underneath keeps
//! items in lifecycle buckets behind a single lock, so a snapshot taken for
//! submission can never interleave with another serialized mutation.
//!
//! ## Module Organization
//!
//! - [`coordinator`] - Facade wiring registry, queue, journal, and transport
//! - [`registry`] - Lifecycle buckets, batch submission, correlation
//! - [`queue`] - Operation classification and FIFO serialization
//! - [`journal`] - Bounded persistent record of recent transactions
//! - [`api`] - Batch transport trait and the HTTP implementation
//! - [`model`] - Items, payloads, lifecycles, transaction ids
//! - [`protocol`] - Wire types for submission and status endpoints
//! - [`identity`] - Client-side id generation
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chartbatch_core::config::CoordinatorConfig;
//! use chartbatch_core::coordinator::OperationCoordinator;
//! use chartbatch_core::model::{ItemCategory, ItemPayload, PatientId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoordinatorConfig::load()?;
//! let coordinator = OperationCoordinator::new(config)?;
//!
//! let id = coordinator.stage_item(ItemPayload::new(
//!     PatientId(42),
//!     ItemCategory::Procedure,
//!     "D0120",
//! ))?;
//! coordinator.set_display_ref(&id, "grid-row-17")?;
//!
//! let outcome = coordinator.submit_staged_batch().outcome().await?;
//! println!("batch {} -> {}", outcome.transaction_id, outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod journal;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod queue;
pub mod registry;

pub use config::{ApiConfig, CoordinatorConfig, JournalConfig, QueueConfig};
pub use coordinator::{ComboCatalog, ComboComponent, OperationCoordinator, RecoveryOutcome};
pub use error::{CoordinatorError, Result};
pub use identity::{ClientId, ClientIdGenerator};
pub use model::{
    ItemCategory, ItemPayload, Lifecycle, PatientId, ServerId, StagedItem, StatusUpdate,
    TransactionId, TransactionStatus,
};
pub use queue::{OperationKind, OperationTicket, Route, SubmitOptions};
pub use registry::{BatchOutcome, StagingRegistry};
