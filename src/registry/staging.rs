//! # Staging Registry
//!
//! Client-side registry for work items between creation and server
//! acknowledgement.
//!
//! ## Architecture
//!
//! ```text
//! stage() -> staged bucket -> submit_batch() -> processing bucket
//!                                  |                  |
//!                                  |            (one network call)
//!                                  v                  v
//!                            journal entry      completed / back to staged
//! ```
//!
//! Items live in exactly one of four buckets: `staged` (awaiting
//! submission), `processing` (in the batch currently on the wire),
//! `completed`, or `failed`. Accepted items additionally get a
//! [`ProcessingHandle`] keyed by server id, because cancel and status
//! operations address items by the identity the server knows.
//!
//! All state sits behind one `parking_lot::Mutex`; every mutation is a
//! single synchronous critical section and the lock is never held across an
//! await. `submit_batch` moves its batch into the processing bucket inside
//! one such section before its only await, so concurrent bypass operations
//! can neither mutate nor re-submit in-flight items.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::BatchTransport;
use crate::error::{CoordinatorError, Result};
use crate::identity::{ClientId, ClientIdGenerator};
use crate::journal::TransactionJournal;
use crate::model::{
    ItemPayload, Lifecycle, PatientId, ProcessingHandle, ServerId, StagedItem, StatusUpdate,
    TransactionId, TransactionStatus,
};
use crate::protocol::{BatchSubmitRequest, ServerItem, TransactionRecord, WireItem};

use super::correlation::{correlate, SubmittedItem};

/// Registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub staged: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub handles: usize,
    pub display_refs: usize,
}

/// Result of one batch submission.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub transaction_id: TransactionId,
    /// `Complete` when every submitted item correlated, else `Partial`.
    pub status: TransactionStatus,
    /// Server items exactly as returned.
    pub items: Vec<ServerItem>,
    /// Client ids resolved to a server item, now in the completed bucket.
    pub completed: Vec<ClientId>,
    /// Client ids nothing correlated to, restored to the staged bucket.
    pub unmatched: Vec<ClientId>,
}

/// Result of an explicit server-side transaction retry.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// The authoritative record after the retry.
    pub record: TransactionRecord,
    /// Staged items the retry response resolved, now completed.
    pub newly_completed: Vec<ClientId>,
}

#[derive(Debug, Default)]
struct RegistryState {
    staged: HashMap<ClientId, StagedItem>,
    /// Ids of live (staged or processing) items, in staging order.
    staging_order: Vec<ClientId>,
    processing: HashMap<ClientId, StagedItem>,
    completed: HashMap<ClientId, StagedItem>,
    failed: HashMap<ClientId, StagedItem>,
    handles: HashMap<ServerId, ProcessingHandle>,
    display_refs: HashMap<ClientId, String>,
}

impl RegistryState {
    fn is_tracked(&self, client_id: &ClientId) -> bool {
        self.staged.contains_key(client_id)
            || self.processing.contains_key(client_id)
            || self.completed.contains_key(client_id)
            || self.failed.contains_key(client_id)
    }

    fn terminal_lifecycle(&self, client_id: &ClientId) -> Option<Lifecycle> {
        if self.completed.contains_key(client_id) {
            Some(Lifecycle::Completed)
        } else if self.failed.contains_key(client_id) {
            Some(Lifecycle::Failed)
        } else {
            None
        }
    }

    /// Remove a live item from whichever non-terminal bucket holds it.
    fn take_live(&mut self, client_id: &ClientId) -> Option<StagedItem> {
        if let Some(item) = self.staged.remove(client_id) {
            return Some(item);
        }
        self.processing.remove(client_id)
    }
}

/// Registry of staged work items with atomic batch submission.
pub struct StagingRegistry {
    state: Mutex<RegistryState>,
    generator: ClientIdGenerator,
    journal: Arc<TransactionJournal>,
    transport: Arc<dyn BatchTransport>,
}

impl std::fmt::Debug for StagingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingRegistry")
            .field("transport", &self.transport.transport_name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl StagingRegistry {
    /// Create a registry wired to the given journal and transport.
    pub fn new(journal: Arc<TransactionJournal>, transport: Arc<dyn BatchTransport>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            generator: ClientIdGenerator::new(),
            journal,
            transport,
        }
    }

    /// Validate a payload and stage it under a fresh client id.
    pub fn stage(&self, payload: ItemPayload) -> Result<ClientId> {
        payload.validate()?;

        let mut state = self.state.lock();
        let client_id = self
            .generator
            .next_id(&|candidate| state.is_tracked(candidate))?;

        debug!(
            client_id = %client_id,
            patient_id = %payload.patient_id,
            category = %payload.category,
            code = %payload.code,
            "Staged item"
        );

        state.staging_order.push(client_id.clone());
        state
            .staged
            .insert(client_id.clone(), StagedItem::new(client_id.clone(), payload));
        Ok(client_id)
    }

    /// Register an opaque display reference for a tracked item.
    ///
    /// The embedding UI uses these to find its own row or widget for an
    /// item; the registry only stores and sweeps them.
    pub fn set_display_ref(
        &self,
        client_id: &ClientId,
        display_ref: impl Into<String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.is_tracked(client_id) {
            return Err(CoordinatorError::ItemNotFound(client_id.clone()));
        }
        state
            .display_refs
            .insert(client_id.clone(), display_ref.into());
        Ok(())
    }

    /// Merge metadata into an item's record and apply a lifecycle change.
    ///
    /// `Staged` merges in place. Terminal lifecycles move the item out of
    /// its live bucket atomically; `Completed` additionally requires a
    /// server id (from the update or already on the item) and registers a
    /// processing handle under it. Once terminal, items never transition
    /// again.
    pub fn update_status(
        &self,
        client_id: &ClientId,
        lifecycle: Lifecycle,
        update: StatusUpdate,
    ) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(terminal) = state.terminal_lifecycle(client_id) {
            return Err(CoordinatorError::InvalidTransition {
                from: terminal.to_string(),
                to: lifecycle.to_string(),
            });
        }

        match lifecycle {
            Lifecycle::Staged => {
                if let Some(item) = state.staged.get_mut(client_id) {
                    item.apply_update(&update);
                    return Ok(());
                }
                if let Some(item) = state.processing.get_mut(client_id) {
                    item.apply_update(&update);
                    return Ok(());
                }
                Err(CoordinatorError::ItemNotFound(client_id.clone()))
            }
            Lifecycle::Completed => {
                let existing = state
                    .staged
                    .get(client_id)
                    .or_else(|| state.processing.get(client_id));
                let Some(existing) = existing else {
                    return Err(CoordinatorError::ItemNotFound(client_id.clone()));
                };
                let Some(server_id) = update.server_id.or(existing.server_id) else {
                    return Err(CoordinatorError::integrity(format!(
                        "cannot complete {client_id} without a server id"
                    )));
                };
                if let Some(owner) = state.handles.get(&server_id) {
                    if owner.client_id != *client_id {
                        return Err(CoordinatorError::integrity(format!(
                            "server id {server_id} already tracked for {}",
                            owner.client_id
                        )));
                    }
                }

                let Some(mut item) = state.take_live(client_id) else {
                    return Err(CoordinatorError::ItemNotFound(client_id.clone()));
                };
                item.apply_update(&update);
                item.server_id = Some(server_id);
                item.lifecycle = Lifecycle::Completed;
                state
                    .handles
                    .insert(server_id, ProcessingHandle::for_accepted(&item, server_id));
                state.staging_order.retain(|id| id != client_id);
                state.completed.insert(client_id.clone(), item);

                info!(client_id = %client_id, server_id = %server_id, "Item completed");
                Ok(())
            }
            Lifecycle::Failed => {
                let Some(mut item) = state.take_live(client_id) else {
                    return Err(CoordinatorError::ItemNotFound(client_id.clone()));
                };
                item.apply_update(&update);
                item.lifecycle = Lifecycle::Failed;
                state.staging_order.retain(|id| id != client_id);
                state.failed.insert(client_id.clone(), item);

                info!(
                    client_id = %client_id,
                    error = update.error.as_deref().unwrap_or("unspecified"),
                    "Item failed"
                );
                Ok(())
            }
        }
    }

    /// Merge metadata into an item's record wherever it lives, without any
    /// lifecycle change.
    pub fn annotate(&self, client_id: &ClientId, update: StatusUpdate) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(item) = state.staged.get_mut(client_id) {
            item.apply_update(&update);
            return Ok(());
        }
        if let Some(item) = state.processing.get_mut(client_id) {
            item.apply_update(&update);
            return Ok(());
        }
        if let Some(item) = state.completed.get_mut(client_id) {
            item.apply_update(&update);
            return Ok(());
        }
        if let Some(item) = state.failed.get_mut(client_id) {
            item.apply_update(&update);
            return Ok(());
        }
        Err(CoordinatorError::ItemNotFound(client_id.clone()))
    }

    /// Change a staged item's quantity by `delta`.
    ///
    /// Rejected for items outside the staged bucket: an in-flight or
    /// terminal payload must not change under the batch that carries it.
    pub fn adjust_quantity(&self, client_id: &ClientId, delta: i32) -> Result<u32> {
        let mut state = self.state.lock();

        if state.processing.contains_key(client_id)
            || state.completed.contains_key(client_id)
            || state.failed.contains_key(client_id)
        {
            return Err(CoordinatorError::InvalidPayload(format!(
                "cannot adjust quantity of {client_id}: item is no longer staged"
            )));
        }
        let Some(item) = state.staged.get_mut(client_id) else {
            return Err(CoordinatorError::ItemNotFound(client_id.clone()));
        };

        let next = i64::from(item.payload.quantity) + i64::from(delta);
        if next < 1 || next > i64::from(u32::MAX) {
            return Err(CoordinatorError::InvalidPayload(format!(
                "quantity {} {delta:+} is out of range",
                item.payload.quantity
            )));
        }
        item.payload.quantity = next as u32;
        item.updated_at = chrono::Utc::now();
        Ok(item.payload.quantity)
    }

    /// Remove an item from every structure that could reference it, as one
    /// logical operation.
    ///
    /// Sweeps the item's bucket, its display reference, and any processing
    /// handles pointing back at it. Inconsistencies are reported, never
    /// silently absorbed: an untracked id is `ItemNotFound`; occupancy of
    /// more than one bucket is a `StateIntegrity` error (the duplicates are
    /// still removed); an explicit `server_id` whose handle is missing or
    /// owned by a different item is a `StateIntegrity` error.
    pub fn cleanup_item(&self, client_id: &ClientId, server_id: Option<ServerId>) -> Result<()> {
        let mut state = self.state.lock();

        let mut buckets_hit = 0usize;
        if state.staged.remove(client_id).is_some() {
            buckets_hit += 1;
        }
        if state.processing.remove(client_id).is_some() {
            buckets_hit += 1;
        }
        if state.completed.remove(client_id).is_some() {
            buckets_hit += 1;
        }
        if state.failed.remove(client_id).is_some() {
            buckets_hit += 1;
        }
        state.staging_order.retain(|id| id != client_id);
        let had_display_ref = state.display_refs.remove(client_id).is_some();

        let mut handle_defect: Option<String> = None;
        if let Some(server_id) = server_id {
            let owner = state
                .handles
                .get(&server_id)
                .map(|handle| handle.client_id.clone());
            match owner {
                Some(owner) if owner == *client_id => {
                    state.handles.remove(&server_id);
                }
                Some(owner) => {
                    handle_defect = Some(format!(
                        "handle for {server_id} points at {owner}, not {client_id}"
                    ));
                }
                None => {
                    handle_defect = Some(format!("no handle tracked for {server_id}"));
                }
            }
        }

        // Sweep stray handles referencing this item even without an
        // explicit server id.
        let before = state.handles.len();
        state
            .handles
            .retain(|_, handle| handle.client_id != *client_id);
        let swept = before - state.handles.len();

        if buckets_hit == 0 {
            warn!(client_id = %client_id, "Cleanup requested for untracked item");
            return Err(CoordinatorError::ItemNotFound(client_id.clone()));
        }
        if buckets_hit > 1 {
            return Err(CoordinatorError::integrity(format!(
                "{client_id} occupied {buckets_hit} buckets, removed from all"
            )));
        }
        if let Some(defect) = handle_defect {
            return Err(CoordinatorError::integrity(defect));
        }

        debug!(
            client_id = %client_id,
            swept_handles = swept,
            had_display_ref,
            "Cleaned up item"
        );
        Ok(())
    }

    /// True iff every staged item belongs to one patient.
    pub fn validate_consistency(&self) -> bool {
        let state = self.state.lock();
        let mut patients = state.staged.values().map(|item| item.payload.patient_id);
        match patients.next() {
            None => true,
            Some(first) => patients.all(|patient| patient == first),
        }
    }

    /// Submit every eligible staged item as one atomic batch.
    ///
    /// Deferred (combo) items are filtered out and stay staged. Validation
    /// failures (nothing eligible, or items for more than one patient)
    /// reject the batch before any journal entry or network call. Exactly
    /// one transport call is made per invocation; on failure every item of
    /// the batch returns to the staged bucket and recovery is explicit via
    /// [`StagingRegistry::retry_transaction`].
    pub async fn submit_batch(&self) -> Result<BatchOutcome> {
        // One critical section: validate, move staged -> processing, build
        // the wire batch. Nothing can mutate batch payloads after this.
        let (transaction_id, request, submitted) = {
            let mut state = self.state.lock();

            let eligible: Vec<ClientId> = state
                .staging_order
                .iter()
                .filter(|id| {
                    matches!(
                        state.staged.get(*id),
                        Some(item) if !item.payload.category.is_deferred()
                    )
                })
                .cloned()
                .collect();

            if eligible.is_empty() {
                debug!("No eligible staged items, rejecting batch");
                return Err(CoordinatorError::EmptyBatch);
            }

            let mut patient: Option<PatientId> = None;
            for id in &eligible {
                let Some(item) = state.staged.get(id) else {
                    continue;
                };
                match patient {
                    None => patient = Some(item.payload.patient_id),
                    Some(expected) if expected != item.payload.patient_id => {
                        return Err(CoordinatorError::MixedPatients {
                            expected: expected.0,
                            found: item.payload.patient_id.0,
                        });
                    }
                    Some(_) => {}
                }
            }

            let transaction_id = TransactionId::new();
            let mut wire_items = Vec::with_capacity(eligible.len());
            let mut submitted = Vec::with_capacity(eligible.len());

            for (sequence, id) in eligible.iter().enumerate() {
                let Some(item) = state.staged.remove(id) else {
                    continue;
                };
                let sequence = sequence as u32;
                wire_items.push(WireItem::from_payload(sequence, &item.payload));
                submitted.push(SubmittedItem {
                    sequence,
                    client_id: id.clone(),
                    key: item.payload.business_key(),
                });
                state.processing.insert(id.clone(), item);
            }

            (
                transaction_id,
                BatchSubmitRequest {
                    transaction_id,
                    items: wire_items,
                },
                submitted,
            )
        };

        self.journal.record_pending(transaction_id, submitted.len());

        info!(
            transaction_id = %transaction_id,
            item_count = submitted.len(),
            transport = self.transport.transport_name(),
            "Submitting staged batch"
        );

        // The only await. Server state is unknown if this fails, so the
        // call is never repeated automatically.
        let response = match self.transport.submit_batch(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.restore_processing(&submitted);
                self.journal
                    .update_status(transaction_id, TransactionStatus::Failed);
                error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Batch submission failed, items restored to staging"
                );
                return Err(e);
            }
        };

        if response.transaction_id != transaction_id {
            warn!(
                sent = %transaction_id,
                received = %response.transaction_id,
                "Server echoed a different transaction id"
            );
        }

        let outcome = correlate(&submitted, &response.items);

        let completed = {
            let mut state = self.state.lock();

            let mut completed = Vec::with_capacity(outcome.matched.len());
            for (client_id, server_item) in &outcome.matched {
                let Some(mut item) = state.processing.remove(client_id) else {
                    warn!(client_id = %client_id, "Correlated item left processing mid-submission");
                    continue;
                };
                item.apply_update(
                    &StatusUpdate::default().with_server_id(server_item.server_id),
                );
                item.lifecycle = Lifecycle::Completed;
                state.handles.insert(
                    server_item.server_id,
                    ProcessingHandle::for_accepted(&item, server_item.server_id),
                );
                state.staging_order.retain(|id| id != client_id);
                state.completed.insert(client_id.clone(), item);
                completed.push(client_id.clone());
            }

            for client_id in &outcome.unmatched {
                if let Some(item) = state.processing.remove(client_id) {
                    state.staged.insert(client_id.clone(), item);
                }
            }

            completed
        };

        let status = if outcome.unmatched.is_empty() {
            TransactionStatus::Complete
        } else {
            TransactionStatus::Partial
        };
        self.journal.update_status(transaction_id, status);

        info!(
            transaction_id = %transaction_id,
            completed = completed.len(),
            unmatched = outcome.unmatched.len(),
            orphaned = outcome.orphaned.len(),
            status = %status,
            "Batch submission resolved"
        );

        Ok(BatchOutcome {
            transaction_id,
            status,
            items: response.items,
            completed,
            unmatched: outcome.unmatched,
        })
    }

    /// Fetch the authoritative transaction record and refresh the journal.
    pub async fn check_transaction_status(&self, id: TransactionId) -> Result<TransactionRecord> {
        let record = self.transport.transaction_status(&id).await?;
        self.journal.update_status(id, record.status);

        debug!(
            transaction_id = %id,
            status = %record.status,
            item_count = record.item_count,
            "Refreshed transaction status"
        );
        Ok(record)
    }

    /// Ask the server to re-attempt a transaction, then absorb any newly
    /// confirmed items onto still-staged entries.
    pub async fn retry_transaction(&self, id: TransactionId) -> Result<RetryOutcome> {
        info!(transaction_id = %id, "Requesting server-side transaction retry");

        let record = self.transport.retry_transaction(&id).await?;
        self.journal.update_status(id, record.status);

        let newly_completed = match &record.items {
            Some(items) if !items.is_empty() => self.absorb_retry_items(items),
            _ => Vec::new(),
        };

        info!(
            transaction_id = %id,
            status = %record.status,
            newly_completed = newly_completed.len(),
            "Transaction retry resolved"
        );

        Ok(RetryOutcome {
            record,
            newly_completed,
        })
    }

    /// Every staged item, in staging order.
    pub fn staged_items(&self) -> Vec<StagedItem> {
        let state = self.state.lock();
        state
            .staging_order
            .iter()
            .filter_map(|id| state.staged.get(id))
            .cloned()
            .collect()
    }

    /// Look up a tracked item in any bucket.
    pub fn item(&self, client_id: &ClientId) -> Option<StagedItem> {
        let state = self.state.lock();
        state
            .staged
            .get(client_id)
            .or_else(|| state.processing.get(client_id))
            .or_else(|| state.completed.get(client_id))
            .or_else(|| state.failed.get(client_id))
            .cloned()
    }

    pub fn handle(&self, server_id: ServerId) -> Option<ProcessingHandle> {
        self.state.lock().handles.get(&server_id).cloned()
    }

    pub fn display_ref(&self, client_id: &ClientId) -> Option<String> {
        self.state.lock().display_refs.get(client_id).cloned()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            staged: state.staged.len(),
            processing: state.processing.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
            handles: state.handles.len(),
            display_refs: state.display_refs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.staged.is_empty()
            && state.processing.is_empty()
            && state.completed.is_empty()
            && state.failed.is_empty()
    }

    /// Drop every tracked item and reference.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = RegistryState::default();
    }

    fn restore_processing(&self, submitted: &[SubmittedItem]) {
        let mut state = self.state.lock();
        for entry in submitted {
            if let Some(item) = state.processing.remove(&entry.client_id) {
                state.staged.insert(entry.client_id.clone(), item);
            }
        }
    }

    fn absorb_retry_items(&self, items: &[ServerItem]) -> Vec<ClientId> {
        // Batch ordinals do not survive a retry, so echoed sequences from
        // the original submission cannot be trusted here; strip them and
        // match on business keys alone.
        let stripped: Vec<ServerItem> = items
            .iter()
            .map(|item| ServerItem {
                sequence: None,
                ..item.clone()
            })
            .collect();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let staged_snapshot: Vec<SubmittedItem> = state
            .staging_order
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| {
                state.staged.get(id).map(|item| SubmittedItem {
                    sequence: idx as u32,
                    client_id: id.clone(),
                    key: item.payload.business_key(),
                })
            })
            .collect();

        let outcome = correlate(&staged_snapshot, &stripped);

        let mut newly_completed = Vec::new();
        for (client_id, server_item) in &outcome.matched {
            let Some(mut item) = state.staged.remove(client_id) else {
                continue;
            };
            item.server_id = Some(server_item.server_id);
            item.lifecycle = Lifecycle::Completed;
            item.updated_at = chrono::Utc::now();
            state.handles.insert(
                server_item.server_id,
                ProcessingHandle::for_accepted(&item, server_item.server_id),
            );
            state.staging_order.retain(|id| id != client_id);
            state.completed.insert(client_id.clone(), item);
            newly_completed.push(client_id.clone());
        }
        newly_completed
    }
}
