//! # Operation Coordinator
//!
//! The single entry point the embedding application constructs and holds:
//! it wires the staging registry, operation queue, transaction journal, and
//! batch transport together, and exposes every chart operation under its
//! declared [`OperationKind`].
//!
//! There are no module-level singletons anywhere in this crate; build one
//! coordinator at application start, share it (`Arc` if needed), and
//! [`OperationCoordinator::reset`] it between tests.
//!
//! ## Cancellation
//!
//! Nothing aborts an in-flight batch submission: once the network call is
//! out, the server may create items regardless of what the client does
//! next. [`OperationCoordinator::remove_item`] only prevents future staging
//! usage; an already-submitted batch is resolved through
//! [`OperationCoordinator::refresh_transaction`] or
//! [`OperationCoordinator::recover_transaction`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{BatchTransport, HttpBatchClient};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::identity::ClientId;
use crate::journal::{JournalEntry, TransactionJournal};
use crate::model::{
    ItemCategory, ItemPayload, Lifecycle, ServerId, StagedItem, StatusUpdate, TransactionId,
};
use crate::protocol::TransactionRecord;
use crate::queue::{OperationKind, OperationQueue, OperationTicket, QueueStats, SubmitOptions};
use crate::registry::{BatchOutcome, RegistryStats, StagingRegistry};

/// One component of a combo definition, applied to the combo's patient when
/// the combo is expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct ComboComponent {
    pub category: ItemCategory,
    pub code: String,
    pub site: Option<String>,
    pub description: Option<String>,
    pub quantity: u32,
}

impl ComboComponent {
    pub fn new(category: ItemCategory, code: impl Into<String>) -> Self {
        Self {
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
}

/// Registered combo definitions, keyed by combo code.
#[derive(Debug, Default)]
pub struct ComboCatalog {
    entries: RwLock<HashMap<String, Vec<ComboComponent>>>,
}

impl ComboCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or redefine a combo.
    ///
    /// Definitions are validated here so expansion can trust them: at least
    /// one component, non-empty codes, non-empty sites when present,
    /// positive quantities, and no nested combos. The component checks
    /// mirror [`ItemPayload::validate`], which every expanded component
    /// must pass at staging time.
    pub fn register(
        &self,
        code: impl Into<String>,
        components: Vec<ComboComponent>,
    ) -> Result<()> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(CoordinatorError::InvalidPayload(
                "combo code must not be empty".to_string(),
            ));
        }
        if components.is_empty() {
            return Err(CoordinatorError::InvalidPayload(format!(
                "combo {code} must have at least one component"
            )));
        }
        for component in &components {
            if component.code.trim().is_empty() {
                return Err(CoordinatorError::InvalidPayload(format!(
                    "combo {code} has a component with an empty code"
                )));
            }
            if let Some(site) = &component.site {
                if site.trim().is_empty() {
                    return Err(CoordinatorError::InvalidPayload(format!(
                        "combo {code} has a component with an empty site"
                    )));
                }
            }
            if component.quantity == 0 {
                return Err(CoordinatorError::InvalidPayload(format!(
                    "combo {code} has a component with zero quantity"
                )));
            }
            if component.category == ItemCategory::Combo {
                return Err(CoordinatorError::InvalidPayload(format!(
                    "combo {code} nests another combo, which is not supported"
                )));
            }
        }

        debug!(code = %code, components = components.len(), "Registered combo definition");
        self.entries.write().insert(code, components);
        Ok(())
    }

    pub fn resolve(&self, code: &str) -> Option<Vec<ComboComponent>> {
        self.entries.read().get(code).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Result of a journal-driven recovery pass over one transaction.
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    /// The authoritative record after recovery (post-retry when one ran).
    pub record: TransactionRecord,
    /// Whether a server-side retry was requested.
    pub retried: bool,
    /// Staged items the retry resolved, now completed.
    pub newly_completed: Vec<ClientId>,
}

/// Facade wiring registry, queue, journal, and transport.
pub struct OperationCoordinator {
    registry: Arc<StagingRegistry>,
    queue: OperationQueue,
    journal: Arc<TransactionJournal>,
    combos: Arc<ComboCatalog>,
}

impl std::fmt::Debug for OperationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCoordinator")
            .field("registry", &self.registry)
            .field("queue", &self.queue.stats())
            .field("journal_entries", &self.journal.len())
            .field("combos", &self.combos.len())
            .finish()
    }
}

impl OperationCoordinator {
    /// Build a coordinator with the HTTP transport.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        let transport = Arc::new(HttpBatchClient::new(config.api.clone())?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build a coordinator around any transport implementation.
    pub fn with_transport(config: CoordinatorConfig, transport: Arc<dyn BatchTransport>) -> Self {
        let journal = Arc::new(TransactionJournal::new(&config.journal));
        let registry = Arc::new(StagingRegistry::new(journal.clone(), transport.clone()));
        let queue = OperationQueue::new(&config.queue);

        info!(
            transport = transport.transport_name(),
            journal_entries = journal.len(),
            "Operation coordinator ready"
        );

        Self {
            registry,
            queue,
            journal,
            combos: Arc::new(ComboCatalog::new()),
        }
    }

    /// Clear registry buckets, journal memory, and the queue backlog.
    pub fn reset(&self) {
        self.registry.clear();
        self.journal.clear();
        self.queue.reset();
        info!("Operation coordinator reset");
    }

    // ===================================================================
    // DIRECT OPERATIONS (synchronous registry calls, no routing)
    // ===================================================================

    /// Validate and stage a work item; returns its client id.
    pub fn stage_item(&self, payload: ItemPayload) -> Result<ClientId> {
        self.registry.stage(payload)
    }

    /// Register the embedding UI's display reference for an item.
    pub fn set_display_ref(
        &self,
        client_id: &ClientId,
        display_ref: impl Into<String>,
    ) -> Result<()> {
        self.registry.set_display_ref(client_id, display_ref)
    }

    /// Every staged item, in staging order.
    pub fn staged_items(&self) -> Vec<StagedItem> {
        self.registry.staged_items()
    }

    /// Look up one tracked item in any lifecycle bucket.
    pub fn item(&self, client_id: &ClientId) -> Option<StagedItem> {
        self.registry.item(client_id)
    }

    /// The display reference registered for an item, if any.
    pub fn display_ref(&self, client_id: &ClientId) -> Option<String> {
        self.registry.display_ref(client_id)
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Recent journal entries, newest first.
    pub fn journal_recent(&self) -> Vec<JournalEntry> {
        self.journal.recent()
    }

    /// Register a combo definition for later expansion.
    pub fn register_combo(
        &self,
        code: impl Into<String>,
        components: Vec<ComboComponent>,
    ) -> Result<()> {
        self.combos.register(code, components)
    }

    // ===================================================================
    // ROUTED OPERATIONS
    // ===================================================================

    /// Submit every eligible staged item as one batch. Serialized.
    pub fn submit_staged_batch(&self) -> OperationTicket<BatchOutcome> {
        let registry = Arc::clone(&self.registry);
        self.queue.submit(
            OperationKind::BatchSubmit,
            SubmitOptions::default(),
            move || async move { registry.submit_batch().await },
        )
    }

    /// Replace a staged combo item with its component items. Serialized, so
    /// the multi-step insert cannot interleave with a submission.
    ///
    /// Expansion is all or nothing: a failed attempt stages no components
    /// and leaves the combo item in place.
    pub fn expand_combo(&self, client_id: ClientId) -> OperationTicket<Vec<ClientId>> {
        let registry = Arc::clone(&self.registry);
        let combos = Arc::clone(&self.combos);
        self.queue.submit(
            OperationKind::ComboExpansion,
            SubmitOptions::default(),
            move || async move {
                let item = registry
                    .item(&client_id)
                    .ok_or_else(|| CoordinatorError::ItemNotFound(client_id.clone()))?;
                if item.payload.category != ItemCategory::Combo {
                    return Err(CoordinatorError::InvalidPayload(format!(
                        "{client_id} is a {} item, not a combo",
                        item.payload.category
                    )));
                }
                if item.lifecycle != Lifecycle::Staged {
                    return Err(CoordinatorError::InvalidPayload(format!(
                        "combo {client_id} is {}, only staged combos expand",
                        item.lifecycle
                    )));
                }
                let components = combos
                    .resolve(&item.payload.code)
                    .ok_or_else(|| CoordinatorError::UnknownCombo(item.payload.code.clone()))?;

                // Build and validate every component payload before staging
                // any of them: a defective definition must fail whole, with
                // the combo item untouched.
                let mut payloads = Vec::with_capacity(components.len());
                for component in components {
                    let mut payload = ItemPayload::new(
                        item.payload.patient_id,
                        component.category,
                        component.code,
                    )
                    .with_quantity(component.quantity);
                    payload.site = component.site;
                    payload.description = component.description;
                    payload.validate()?;
                    payloads.push(payload);
                }

                let mut staged = Vec::with_capacity(payloads.len());
                for payload in payloads {
                    match registry.stage(payload) {
                        Ok(id) => staged.push(id),
                        Err(err) => {
                            // Sweep the half-staged components back out; the
                            // combo stays staged for another attempt.
                            for id in &staged {
                                let _ = registry.cleanup_item(id, None);
                            }
                            return Err(err);
                        }
                    }
                }
                registry.cleanup_item(&client_id, None)?;

                info!(
                    client_id = %client_id,
                    combo_code = %item.payload.code,
                    components = staged.len(),
                    "Expanded combo into component items"
                );
                Ok(staged)
            },
        )
    }

    /// Remove an item after the user confirmed deletion. Serialized.
    ///
    /// Pass the server id when the item is known server-side so its
    /// processing handle is checked and swept with it.
    pub fn remove_item(
        &self,
        client_id: ClientId,
        server_id: Option<ServerId>,
    ) -> OperationTicket<()> {
        let registry = Arc::clone(&self.registry);
        self.queue.submit(
            OperationKind::ItemRemoval,
            SubmitOptions::default(),
            move || async move { registry.cleanup_item(&client_id, server_id) },
        )
    }

    /// Resolve an ambiguous journaled transaction: fetch the authoritative
    /// record, then request a server-side retry when that record says one
    /// is worth it. Serialized.
    pub fn recover_transaction(&self, id: TransactionId) -> OperationTicket<RecoveryOutcome> {
        let registry = Arc::clone(&self.registry);
        self.queue.submit(
            OperationKind::JournalRecovery,
            SubmitOptions::default(),
            move || async move {
                let record = registry.check_transaction_status(id).await?;
                if record.status.is_retryable() {
                    info!(
                        transaction_id = %id,
                        status = %record.status,
                        "Authoritative status is retryable, requesting retry"
                    );
                    let retry = registry.retry_transaction(id).await?;
                    Ok(RecoveryOutcome {
                        record: retry.record,
                        retried: true,
                        newly_completed: retry.newly_completed,
                    })
                } else {
                    Ok(RecoveryOutcome {
                        record,
                        retried: false,
                        newly_completed: Vec::new(),
                    })
                }
            },
        )
    }

    /// Fetch the authoritative record for a transaction. Bypass.
    pub fn refresh_transaction(&self, id: TransactionId) -> OperationTicket<TransactionRecord> {
        let registry = Arc::clone(&self.registry);
        self.queue.submit(
            OperationKind::StatusRefresh,
            SubmitOptions::default(),
            move || async move { registry.check_transaction_status(id).await },
        )
    }

    /// Attach or replace the note on one item. Bypass.
    pub fn update_item_note(
        &self,
        client_id: ClientId,
        note: impl Into<String>,
    ) -> OperationTicket<()> {
        let registry = Arc::clone(&self.registry);
        let note = note.into();
        self.queue.submit(
            OperationKind::MetadataEdit,
            SubmitOptions::default(),
            move || async move {
                registry.annotate(&client_id, StatusUpdate::default().with_note(note))
            },
        )
    }

    /// Nudge a staged item's quantity; resolves with the new value. Bypass.
    ///
    /// Rejected once the item has left the staged bucket: an in-flight
    /// payload must not change under the batch that carries it.
    pub fn adjust_quantity(&self, client_id: ClientId, delta: i32) -> OperationTicket<u32> {
        let registry = Arc::clone(&self.registry);
        self.queue.submit(
            OperationKind::QuantityAdjust,
            SubmitOptions::default(),
            move || async move { registry.adjust_quantity(&client_id, delta) },
        )
    }

    /// Snapshot of the staged bucket. Bypass.
    pub fn inspect_staged(&self) -> OperationTicket<Vec<StagedItem>> {
        let registry = Arc::clone(&self.registry);
        self.queue.submit(
            OperationKind::RegistryInspect,
            SubmitOptions::default(),
            move || async move { Ok(registry.staged_items()) },
        )
    }
}
