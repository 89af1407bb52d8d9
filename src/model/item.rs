//! Staged work items and their payloads.
//!
//! A [`StagedItem`] is a work item not yet known to the server: it carries a
//! client-local id, a validated business payload, and lifecycle metadata.
//! Once the server accepts an item, a [`ProcessingHandle`] keyed by the
//! server id tracks the second half of its life: cancel and status
//! operations only know the server identity, so the two halves are
//! deliberately decoupled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoordinatorError, Result};
use crate::identity::ClientId;

/// Owning-patient identity. Every item in one batch must share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub i64);

impl PatientId {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identity, absent until the server accepts the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub i64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a staged item.
///
/// `Combo` marks the deferred category: combo items are expanded into their
/// component items by a serialized coordinator operation and are filtered
/// out of direct batch submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Procedure,
    Diagnosis,
    Prescription,
    Combo,
}

impl ItemCategory {
    /// Deferred categories are skipped by `submit_batch` and handled by
    /// their own serialized operations.
    pub fn is_deferred(self) -> bool {
        matches!(self, Self::Combo)
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Procedure => write!(f, "procedure"),
            Self::Diagnosis => write!(f, "diagnosis"),
            Self::Prescription => write!(f, "prescription"),
            Self::Combo => write!(f, "combo"),
        }
    }
}

impl std::str::FromStr for ItemCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "procedure" => Ok(Self::Procedure),
            "diagnosis" => Ok(Self::Diagnosis),
            "prescription" => Ok(Self::Prescription),
            "combo" => Ok(Self::Combo),
            _ => Err(format!("Invalid item category: {s}")),
        }
    }
}

/// The closed, explicit business field set of a staged item.
///
/// This is the entire payload: there is no extension bag, and malformed
/// values are rejected at the staging boundary instead of propagating
/// silently into a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    /// Owning patient.
    pub patient_id: PatientId,
    /// Item category; `combo` defers submission to the expansion operation.
    pub category: ItemCategory,
    /// Procedure/diagnosis/prescription code.
    pub code: String,
    /// Anatomical site or tooth designation, when applicable.
    pub site: Option<String>,
    /// Free-text description shown in the charting table.
    pub description: Option<String>,
    /// Unit count, at least 1.
    pub quantity: u32,
}

impl ItemPayload {
    pub fn new(patient_id: PatientId, category: ItemCategory, code: impl Into<String>) -> Self {
        Self {
            patient_id,
            category,
            code: code.into(),
            site: None,
            description: None,
            quantity: 1,
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Validate the payload at the staging boundary.
    pub fn validate(&self) -> Result<()> {
        if !self.patient_id.is_valid() {
            return Err(CoordinatorError::InvalidPayload(format!(
                "patient id must be positive, got {}",
                self.patient_id
            )));
        }
        if self.code.trim().is_empty() {
            return Err(CoordinatorError::InvalidPayload(
                "code must not be empty".to_string(),
            ));
        }
        if let Some(site) = &self.site {
            if site.trim().is_empty() {
                return Err(CoordinatorError::InvalidPayload(
                    "site must not be empty when present".to_string(),
                ));
            }
        }
        if self.quantity == 0 {
            return Err(CoordinatorError::InvalidPayload(
                "quantity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The business-key fields used for correlating server results:
    /// owning entity, category, destination.
    pub fn business_key(&self) -> BusinessKey {
        BusinessKey {
            patient_id: self.patient_id,
            category: self.category,
            code: self.code.clone(),
            site: self.site.clone(),
        }
    }
}

/// Correlation key extracted from a payload or a server-returned item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusinessKey {
    pub patient_id: PatientId,
    pub category: ItemCategory,
    pub code: String,
    pub site: Option<String>,
}

/// Lifecycle of a staged item. Terminal states move the item into the
/// matching registry bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Staged,
    Completed,
    Failed,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staged => write!(f, "staged"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "staged" => Ok(Self::Staged),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid lifecycle: {s}")),
        }
    }
}

/// A work item held client-side until the server accepts or rejects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedItem {
    /// Client-local identity; never sent to the server.
    pub client_id: ClientId,
    /// Owned business payload. Ownership transfer at staging time replaces
    /// the deep copy the charting UI used to make: callers cannot retain
    /// aliasing control over staged data.
    pub payload: ItemPayload,
    pub lifecycle: Lifecycle,
    /// Present once the server has accepted the item.
    pub server_id: Option<ServerId>,
    pub staged_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub note: Option<String>,
    pub error: Option<String>,
}

impl StagedItem {
    pub fn new(client_id: ClientId, payload: ItemPayload) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            payload,
            lifecycle: Lifecycle::Staged,
            server_id: None,
            staged_at: now,
            updated_at: now,
            note: None,
            error: None,
        }
    }

    /// Merge a status update into the item's metadata: set-if-present,
    /// never clearing.
    pub fn apply_update(&mut self, update: &StatusUpdate) {
        if let Some(server_id) = update.server_id {
            self.server_id = Some(server_id);
        }
        if let Some(note) = &update.note {
            self.note = Some(note.clone());
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// The closed "extra" metadata merged by `update_status`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub server_id: Option<ServerId>,
    pub note: Option<String>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn with_server_id(mut self, server_id: ServerId) -> Self {
        self.server_id = Some(server_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Server-keyed tracking entry for an accepted item.
///
/// Created once an item is known to exist server-side; later operations
/// (cancel, status check) address items by server identity, so the handle
/// carries the business keys plus a backref to the client id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingHandle {
    pub server_id: ServerId,
    pub client_id: ClientId,
    pub patient_id: PatientId,
    pub category: ItemCategory,
    pub code: String,
    pub site: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

impl ProcessingHandle {
    /// Build the handle for an item the server just accepted.
    pub fn for_accepted(item: &StagedItem, server_id: ServerId) -> Self {
        Self {
            server_id,
            client_id: item.client_id.clone(),
            patient_id: item.payload.patient_id,
            category: item.payload.category,
            code: item.payload.code.clone(),
            site: item.payload.site.clone(),
            accepted_at: Utc::now(),
        }
    }
}
