//! Operation kinds and their routing classification.
//!
//! Every operation the coordinator can run is a variant of
//! [`OperationKind`], and its routing is a total compile-time mapping.
//! Adding a kind without deciding its route does not compile, which is the
//! point: no operation ever falls into an "unknown, hope bypassing is fine"
//! class at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Where a classified operation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Run immediately, concurrent with whatever the queue is draining.
    Bypass,
    /// Enqueue; runs alone, in submission order.
    Serialize,
}

/// The closed set of coordinator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Submit every eligible staged item as one batch.
    BatchSubmit,
    /// Expand a staged combo item into its component items.
    ComboExpansion,
    /// Remove an item after the user confirmed deletion.
    ItemRemoval,
    /// Resolve an ambiguous journaled transaction (status + retry).
    JournalRecovery,
    /// Read-only transaction status query.
    StatusRefresh,
    /// Note or status-flag edit on a single item.
    MetadataEdit,
    /// Quantity nudge on a single staged item.
    QuantityAdjust,
    /// Read-only registry query.
    RegistryInspect,
}

impl OperationKind {
    /// Static routing for this kind.
    pub fn route(self) -> Route {
        match self {
            Self::BatchSubmit
            | Self::ComboExpansion
            | Self::ItemRemoval
            | Self::JournalRecovery => Route::Serialize,
            Self::StatusRefresh
            | Self::MetadataEdit
            | Self::QuantityAdjust
            | Self::RegistryInspect => Route::Bypass,
        }
    }

    /// Kinds that serialize no matter what the caller requests.
    ///
    /// These either perform multi-step registry mutations or network writes
    /// whose interleaving with other operations has corrupted data before;
    /// a bypass request on them is a caller bug, not a preference.
    pub fn is_pinned(self) -> bool {
        matches!(
            self,
            Self::BatchSubmit | Self::ComboExpansion | Self::ItemRemoval | Self::JournalRecovery
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BatchSubmit => "batch_submit",
            Self::ComboExpansion => "combo_expansion",
            Self::ItemRemoval => "item_removal",
            Self::JournalRecovery => "journal_recovery",
            Self::StatusRefresh => "status_refresh",
            Self::MetadataEdit => "metadata_edit",
            Self::QuantityAdjust => "quantity_adjust",
            Self::RegistryInspect => "registry_inspect",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "batch_submit" => Ok(Self::BatchSubmit),
            "combo_expansion" => Ok(Self::ComboExpansion),
            "item_removal" => Ok(Self::ItemRemoval),
            "journal_recovery" => Ok(Self::JournalRecovery),
            "status_refresh" => Ok(Self::StatusRefresh),
            "metadata_edit" => Ok(Self::MetadataEdit),
            "quantity_adjust" => Ok(Self::QuantityAdjust),
            "registry_inspect" => Ok(Self::RegistryInspect),
            _ => Err(format!("Invalid operation kind: {s}")),
        }
    }
}

/// Decide the route for one submission.
///
/// Rules, in order: a pinned kind serializes and a bypass request on it is
/// ignored with a warning; a kind mapped to bypass bypasses; an explicit
/// bypass request bypasses; everything else serializes.
pub fn classify(kind: OperationKind, bypass_override: bool) -> Route {
    if kind.is_pinned() {
        if bypass_override {
            warn!(
                kind = %kind,
                "Bypass requested for a pinned operation kind, serializing anyway"
            );
        }
        return Route::Serialize;
    }
    if kind.route() == Route::Bypass {
        return Route::Bypass;
    }
    if bypass_override {
        return Route::Bypass;
    }
    Route::Serialize
}
