//! # Coordinator Data Model
//!
//! Core types for staged work items and batch transactions. Everything the
//! registry tracks is defined here: the closed payload field set, item
//! lifecycle states, server-keyed processing handles, and transaction
//! identity/status.

pub mod item;
pub mod transaction;

pub use item::{
    BusinessKey, ItemCategory, ItemPayload, Lifecycle, PatientId, ProcessingHandle, ServerId,
    StagedItem, StatusUpdate,
};
pub use transaction::{TransactionId, TransactionStatus};
