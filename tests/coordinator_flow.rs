//! End-to-end coordinator tests: staging, batch submission, correlation,
//! combo expansion, and cleanup against a scripted transport.

mod common;

use chartbatch_core::coordinator::ComboComponent;
use chartbatch_core::error::CoordinatorError;
use chartbatch_core::model::{ItemCategory, ServerId, TransactionStatus};
use common::{FakeTransport, SubmitScript};
use std::sync::Arc;

#[tokio::test]
async fn test_full_submission_flow() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport.clone());

    let first = coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    let second = coordinator.stage_item(common::procedure(42, "D1110")).unwrap();
    let third = coordinator.stage_item(common::procedure(42, "D2391")).unwrap();
    coordinator.set_display_ref(&first, "grid-row-1").unwrap();

    let outcome = coordinator.submit_staged_batch().outcome().await.unwrap();

    assert_eq!(outcome.status, TransactionStatus::Complete);
    assert_eq!(outcome.completed, vec![first.clone(), second, third]);
    assert!(outcome.unmatched.is_empty());

    // One request carried the whole batch, sequences assigned in staging order.
    let state = transport.get_state();
    assert_eq!(state.submit_requests.len(), 1);
    let request = &state.submit_requests[0];
    assert_eq!(request.transaction_id, outcome.transaction_id);
    let sequences: Vec<u32> = request.items.iter().map(|item| item.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);

    // Items landed in the completed bucket with their server ids.
    let stats = coordinator.registry_stats();
    assert_eq!(stats.staged, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.handles, 3);
    let item = coordinator.item(&first).unwrap();
    assert_eq!(item.server_id, Some(ServerId(5000)));
    assert_eq!(coordinator.display_ref(&first).as_deref(), Some("grid-row-1"));

    let journal = coordinator.journal_recent();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].id, outcome.transaction_id);
    assert_eq!(journal[0].status, TransactionStatus::Complete);
    assert_eq!(journal[0].item_count, 3);
}

#[tokio::test]
async fn test_combo_expansion_then_submission() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport.clone());
    coordinator
        .register_combo(
            "CMB-PERIO",
            vec![
                ComboComponent::new(ItemCategory::Procedure, "D4341").with_site("UL"),
                ComboComponent::new(ItemCategory::Procedure, "D4341").with_site("UR"),
            ],
        )
        .unwrap();

    coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    let combo_id = coordinator.stage_item(common::combo(42, "CMB-PERIO")).unwrap();

    let components = coordinator
        .expand_combo(combo_id.clone())
        .outcome()
        .await
        .unwrap();
    assert_eq!(components.len(), 2);
    assert!(coordinator.item(&combo_id).is_none());
    assert_eq!(coordinator.staged_items().len(), 3);

    let outcome = coordinator.submit_staged_batch().outcome().await.unwrap();
    assert_eq!(outcome.status, TransactionStatus::Complete);
    assert_eq!(outcome.completed.len(), 3);

    let request = &transport.get_state().submit_requests[0];
    let codes: Vec<&str> = request.items.iter().map(|item| item.code.as_str()).collect();
    assert_eq!(codes, vec!["D0120", "D4341", "D4341"]);
}

#[tokio::test]
async fn test_unexpanded_combo_stays_out_of_the_batch() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport.clone());

    coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    let combo_id = coordinator.stage_item(common::combo(42, "CMB-PERIO")).unwrap();

    let outcome = coordinator.submit_staged_batch().outcome().await.unwrap();

    assert_eq!(outcome.completed.len(), 1);
    assert_eq!(transport.get_state().submit_requests[0].items.len(), 1);
    // The deferred combo is still staged for later expansion.
    assert!(coordinator.item(&combo_id).is_some());
    assert_eq!(coordinator.staged_items().len(), 1);
}

#[tokio::test]
async fn test_partial_acceptance_restores_rejected_items() {
    let transport = Arc::new(FakeTransport::with_submit_script(
        SubmitScript::AcceptSequences(vec![0]),
    ));
    let coordinator = common::test_coordinator(transport.clone());

    let first = coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    let second = coordinator.stage_item(common::procedure(42, "D1110")).unwrap();

    let outcome = coordinator.submit_staged_batch().outcome().await.unwrap();

    assert_eq!(outcome.status, TransactionStatus::Partial);
    assert_eq!(outcome.completed, vec![first]);
    assert_eq!(outcome.unmatched, vec![second.clone()]);

    let staged = coordinator.staged_items();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].client_id, second);

    assert_eq!(
        coordinator.journal_recent()[0].status,
        TransactionStatus::Partial
    );
}

#[tokio::test]
async fn test_unavailable_server_restores_whole_batch() {
    let transport = Arc::new(FakeTransport::with_submit_script(SubmitScript::Unavailable));
    let coordinator = common::test_coordinator(transport.clone());

    let first = coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    let second = coordinator.stage_item(common::procedure(42, "D1110")).unwrap();

    let err = coordinator
        .submit_staged_batch()
        .outcome()
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(transport.submit_count(), 1);

    // Everything restored, in the original staging order.
    let staged: Vec<_> = coordinator
        .staged_items()
        .into_iter()
        .map(|item| item.client_id)
        .collect();
    assert_eq!(staged, vec![first, second]);
    assert_eq!(
        coordinator.journal_recent()[0].status,
        TransactionStatus::Failed
    );

    // A later attempt is a fresh transaction.
    transport.set_submit_script(SubmitScript::AcceptAll);
    let outcome = coordinator.submit_staged_batch().outcome().await.unwrap();
    assert_eq!(outcome.status, TransactionStatus::Complete);

    let state = transport.get_state();
    assert_eq!(state.submit_requests.len(), 2);
    assert_ne!(
        state.submit_requests[0].transaction_id,
        state.submit_requests[1].transaction_id
    );

    let journal = coordinator.journal_recent();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal[0].status, TransactionStatus::Complete);
    assert_eq!(journal[1].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_api_rejection_is_not_recoverable() {
    let transport = Arc::new(FakeTransport::with_submit_script(SubmitScript::Rejected {
        status: 422,
        message: "unknown code".to_string(),
    }));
    let coordinator = common::test_coordinator(transport.clone());
    coordinator.stage_item(common::procedure(42, "XXXX")).unwrap();

    let err = coordinator
        .submit_staged_batch()
        .outcome()
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Api { status: 422, .. }));
    assert!(!err.is_recoverable());
    assert_eq!(coordinator.staged_items().len(), 1);
}

#[tokio::test]
async fn test_mixed_patients_rejected_before_the_wire() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport.clone());

    coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    coordinator.stage_item(common::procedure(43, "D0120")).unwrap();

    let err = coordinator
        .submit_staged_batch()
        .outcome()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::MixedPatients {
            expected: 42,
            found: 43
        }
    ));
    assert!(err.is_validation());
    assert_eq!(transport.submit_count(), 0);
    assert!(coordinator.journal_recent().is_empty());
    assert_eq!(coordinator.staged_items().len(), 2);
}

#[tokio::test]
async fn test_empty_submission_rejected() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport.clone());

    let err = coordinator
        .submit_staged_batch()
        .outcome()
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::EmptyBatch));
    assert_eq!(transport.submit_count(), 0);
}

#[tokio::test]
async fn test_remove_completed_item_with_its_handle() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport);

    let id = coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    coordinator.set_display_ref(&id, "grid-row-1").unwrap();
    coordinator.submit_staged_batch().outcome().await.unwrap();

    let server_id = coordinator.item(&id).unwrap().server_id.unwrap();
    coordinator
        .remove_item(id.clone(), Some(server_id))
        .outcome()
        .await
        .unwrap();

    assert!(coordinator.item(&id).is_none());
    assert!(coordinator.display_ref(&id).is_none());
    let stats = coordinator.registry_stats();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.handles, 0);
    assert_eq!(stats.display_refs, 0);
}

#[tokio::test]
async fn test_remove_unknown_item_errors() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport);

    let id = coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    coordinator.remove_item(id.clone(), None).outcome().await.unwrap();

    let err = coordinator
        .remove_item(id, None)
        .outcome()
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::ItemNotFound(_)));
}
