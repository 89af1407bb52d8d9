//! Scriptable transport for integration tests.
//!
//! Records every call so tests can assert on exactly what went over the
//! wire, and answers from per-transaction scripts instead of a server.

use async_trait::async_trait;
use chartbatch_core::api::BatchTransport;
use chartbatch_core::error::{CoordinatorError, Result};
use chartbatch_core::model::{ItemCategory, PatientId, ServerId, TransactionId, TransactionStatus};
use chartbatch_core::protocol::{
    BatchSubmitRequest, BatchSubmitResponse, ServerItem, TransactionRecord,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// How the fake answers batch submissions.
#[derive(Debug, Clone)]
pub enum SubmitScript {
    /// Accept every item, server ids 5000 + sequence.
    AcceptAll,
    /// Accept only the given sequences.
    AcceptSequences(Vec<u32>),
    /// Fail with a server error before anything is accepted.
    Unavailable,
    /// Reject the batch with the given API error.
    Rejected { status: u16, message: String },
}

/// Recorded traffic for assertions.
#[derive(Debug, Default, Clone)]
pub struct FakeTransportState {
    pub submit_requests: Vec<BatchSubmitRequest>,
    pub status_queries: Vec<TransactionId>,
    pub retry_requests: Vec<TransactionId>,
}

/// Fake transport implementation for integration testing.
pub struct FakeTransport {
    state: Mutex<FakeTransportState>,
    submit_script: Mutex<SubmitScript>,
    submit_delay: Option<Duration>,
    status_responses: Mutex<HashMap<TransactionId, TransactionRecord>>,
    retry_responses: Mutex<HashMap<TransactionId, TransactionRecord>>,
}

impl FakeTransport {
    /// Create a fake that accepts everything.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeTransportState::default()),
            submit_script: Mutex::new(SubmitScript::AcceptAll),
            submit_delay: None,
            status_responses: Mutex::new(HashMap::new()),
            retry_responses: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_submit_script(script: SubmitScript) -> Self {
        let transport = Self::new();
        *transport.submit_script.lock().unwrap() = script;
        transport
    }

    /// Delay submissions, for tests that need an operation to stay in
    /// flight while something else happens.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// Swap the submission script mid-test.
    pub fn set_submit_script(&self, script: SubmitScript) {
        *self.submit_script.lock().unwrap() = script;
    }

    /// Script the record returned for a status query.
    pub fn script_status(&self, id: TransactionId, record: TransactionRecord) {
        self.status_responses.lock().unwrap().insert(id, record);
    }

    /// Script the record returned for a retry request.
    pub fn script_retry(&self, id: TransactionId, record: TransactionRecord) {
        self.retry_responses.lock().unwrap().insert(id, record);
    }

    /// Snapshot of everything recorded so far.
    pub fn get_state(&self) -> FakeTransportState {
        self.state.lock().unwrap().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.state.lock().unwrap().submit_requests.len()
    }

    fn accepted_items(&self, request: &BatchSubmitRequest) -> Vec<ServerItem> {
        let script = self.submit_script.lock().unwrap().clone();
        request
            .items
            .iter()
            .filter(|item| match &script {
                SubmitScript::AcceptAll => true,
                SubmitScript::AcceptSequences(sequences) => sequences.contains(&item.sequence),
                _ => false,
            })
            .map(|item| ServerItem {
                server_id: ServerId(5000 + i64::from(item.sequence)),
                sequence: Some(item.sequence),
                patient_id: item.patient_id,
                category: item.category,
                code: item.code.clone(),
                site: item.site.clone(),
            })
            .collect()
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchTransport for FakeTransport {
    fn transport_name(&self) -> &'static str {
        "fake"
    }

    async fn submit_batch(&self, request: &BatchSubmitRequest) -> Result<BatchSubmitResponse> {
        self.state
            .lock()
            .unwrap()
            .submit_requests
            .push(request.clone());

        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.submit_script.lock().unwrap().clone();
        match script {
            SubmitScript::Unavailable => {
                Err(CoordinatorError::api_error(503, "service unavailable"))
            }
            SubmitScript::Rejected { status, message } => {
                Err(CoordinatorError::api_error(status, message))
            }
            _ => Ok(BatchSubmitResponse {
                status: "success".to_string(),
                transaction_id: request.transaction_id,
                items: self.accepted_items(request),
                message: None,
            }),
        }
    }

    async fn transaction_status(&self, id: &TransactionId) -> Result<TransactionRecord> {
        self.state.lock().unwrap().status_queries.push(*id);
        self.status_responses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(CoordinatorError::TransactionNotFound(*id))
    }

    async fn retry_transaction(&self, id: &TransactionId) -> Result<TransactionRecord> {
        self.state.lock().unwrap().retry_requests.push(*id);
        self.retry_responses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(CoordinatorError::TransactionNotFound(*id))
    }
}

/// Build a transaction record with the given accepted items.
pub fn record_with_items(
    id: TransactionId,
    status: TransactionStatus,
    items: Vec<ServerItem>,
) -> TransactionRecord {
    TransactionRecord {
        transaction_id: id,
        status,
        item_count: items.len(),
        items: Some(items),
        audit_records: None,
    }
}

/// Build a server item as a retry or status response would carry it, with
/// no batch sequence.
pub fn server_item(
    server_id: i64,
    patient: i64,
    category: ItemCategory,
    code: &str,
    site: Option<&str>,
) -> ServerItem {
    ServerItem {
        server_id: ServerId(server_id),
        sequence: None,
        patient_id: PatientId(patient),
        category,
        code: code.to_string(),
        site: site.map(str::to_string),
    }
}
