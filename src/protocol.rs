//! # Wire Protocol Types
//!
//! Request and response shapes for the charting batch API. This module is
//! the documented request/response contract with the backend; nothing else
//! in the crate couples to backend internals.
//!
//! Unknown response fields are ignored; missing required fields surface as
//! deserialization errors rather than silently defaulted values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    BusinessKey, ItemCategory, ItemPayload, PatientId, ServerId, TransactionId, TransactionStatus,
};

/// One staged item as it crosses the wire.
///
/// The `sequence` field is a batch-local ordinal. The server echoes it back
/// on the corresponding result item, which disambiguates correlation when
/// two items share identical business fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireItem {
    pub sequence: u32,
    pub patient_id: PatientId,
    pub category: ItemCategory,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: u32,
}

impl WireItem {
    pub fn from_payload(sequence: u32, payload: &ItemPayload) -> Self {
        Self {
            sequence,
            patient_id: payload.patient_id,
            category: payload.category,
            code: payload.code.clone(),
            site: payload.site.clone(),
            description: payload.description.clone(),
            quantity: payload.quantity,
        }
    }
}

/// Batch submission request body, POST `/v1/charting/batches`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSubmitRequest {
    pub transaction_id: TransactionId,
    pub items: Vec<WireItem>,
}

/// One accepted item as the server reports it.
///
/// The server is not assumed to echo client-local ids; it identifies items
/// by its own `server_id`, optionally the echoed `sequence`, and the
/// business-key fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerItem {
    pub server_id: ServerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    pub patient_id: PatientId,
    pub category: ItemCategory,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

impl ServerItem {
    /// Correlation fallback key: owning entity, category, destination.
    pub fn business_key(&self) -> BusinessKey {
        BusinessKey {
            patient_id: self.patient_id,
            category: self.category,
            code: self.code.clone(),
            site: self.site.clone(),
        }
    }
}

/// Batch submission response body.
///
/// A 2xx response may still carry `status: "error"` with a message; the
/// client treats that exactly like a non-2xx failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSubmitResponse {
    pub status: String,
    pub transaction_id: TransactionId,
    #[serde(default)]
    pub items: Vec<ServerItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchSubmitResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Authoritative server record for one transaction.
///
/// Returned by GET `/v1/charting/transactions/{id}` and mirrored by the
/// retry endpoint, POST `/v1/charting/transactions/{id}/retry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub item_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ServerItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_records: Option<Vec<AuditRecord>>,
}

/// One server-side audit trail entry for a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
