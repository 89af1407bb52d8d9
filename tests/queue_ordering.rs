//! Serialization behavior across coordinator operations: FIFO ordering of
//! must-serialize kinds, bypass of read and metadata kinds, and in-flight
//! item freezing.

mod common;

use chartbatch_core::coordinator::ComboComponent;
use chartbatch_core::model::ItemCategory;
use chartbatch_core::queue::QueueState;
use common::FakeTransport;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_expansion_queued_behind_in_flight_submission() {
    let transport =
        Arc::new(FakeTransport::new().with_submit_delay(Duration::from_millis(150)));
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
    coordinator.stage_item(common::procedure(42, "D1110")).unwrap();
    let combo_id = coordinator.stage_item(common::combo(42, "CMB-PERIO")).unwrap();

    // Both serialized; FIFO means the expansion waits for the submission.
    let submit_ticket = coordinator.submit_staged_batch();
    let expand_ticket = coordinator.expand_combo(combo_id);

    let outcome = submit_ticket.outcome().await.unwrap();
    let components = expand_ticket.outcome().await.unwrap();

    // The batch snapshot was taken before the expansion ran, so the combo
    // components were not part of it.
    assert_eq!(outcome.completed.len(), 2);
    assert_eq!(transport.get_state().submit_requests[0].items.len(), 2);
    assert_eq!(components.len(), 2);
    assert_eq!(coordinator.staged_items().len(), 2);
}

#[tokio::test]
async fn test_bypass_read_resolves_during_serialized_submission() {
    let transport =
        Arc::new(FakeTransport::new().with_submit_delay(Duration::from_millis(200)));
    let coordinator = common::test_coordinator(transport);

    coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    coordinator.stage_item(common::procedure(42, "D1110")).unwrap();

    let submit_ticket = coordinator.submit_staged_batch();
    // Give the drain task time to start the transport call.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The inspect bypasses the queue and resolves while the submission is
    // still in flight; the snapshot is already in processing by then.
    let snapshot = coordinator.inspect_staged().outcome().await.unwrap();
    assert!(snapshot.is_empty());

    let stats = coordinator.queue_stats();
    assert_eq!(stats.state, QueueState::Draining);
    assert_eq!(stats.bypassed, 1);

    let outcome = submit_ticket.outcome().await.unwrap();
    assert_eq!(outcome.completed.len(), 2);
}

#[tokio::test]
async fn test_in_flight_items_are_frozen_against_bypass_edits() {
    let transport =
        Arc::new(FakeTransport::new().with_submit_delay(Duration::from_millis(200)));
    let coordinator = common::test_coordinator(transport.clone());

    let id = coordinator.stage_item(common::procedure(42, "D0120")).unwrap();

    let submit_ticket = coordinator.submit_staged_batch();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A quantity nudge bypasses the queue, but the item already left the
    // staged bucket; the payload on the wire must not change underneath
    // the transport.
    let err = coordinator
        .adjust_quantity(id.clone(), 1)
        .outcome()
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let outcome = submit_ticket.outcome().await.unwrap();
    assert_eq!(outcome.completed, vec![id]);
    assert_eq!(transport.get_state().submit_requests[0].items[0].quantity, 1);
}

#[tokio::test]
async fn test_note_edit_lands_on_an_in_flight_item() {
    let transport =
        Arc::new(FakeTransport::new().with_submit_delay(Duration::from_millis(200)));
    let coordinator = common::test_coordinator(transport);

    let id = coordinator.stage_item(common::procedure(42, "D0120")).unwrap();

    let submit_ticket = coordinator.submit_staged_batch();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Notes merge in any bucket; unlike quantities they never touch the
    // wire payload, so editing an in-flight item is fine.
    coordinator
        .update_item_note(id.clone(), "post-op check")
        .outcome()
        .await
        .unwrap();

    let outcome = submit_ticket.outcome().await.unwrap();
    assert_eq!(outcome.completed, vec![id.clone()]);
    assert_eq!(
        coordinator.item(&id).unwrap().note.as_deref(),
        Some("post-op check")
    );
}

#[tokio::test]
async fn test_reset_cancels_backlog_but_not_the_in_flight_operation() {
    let transport =
        Arc::new(FakeTransport::new().with_submit_delay(Duration::from_millis(200)));
    let coordinator = common::test_coordinator(transport.clone());

    coordinator.stage_item(common::procedure(42, "D0120")).unwrap();

    let first_ticket = coordinator.submit_staged_batch();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Queued behind the in-flight submission, never starts.
    let second_ticket = coordinator.submit_staged_batch();

    coordinator.reset();

    let second_err = second_ticket.outcome().await.unwrap_err();
    assert!(matches!(
        second_err,
        chartbatch_core::error::CoordinatorError::QueueClosed
    ));

    // The in-flight submission still resolves; the transport saw exactly
    // one request.
    assert!(first_ticket.outcome().await.is_ok());
    assert_eq!(transport.submit_count(), 1);
    assert_eq!(coordinator.queue_stats().submitted, 0);
}

#[tokio::test]
async fn test_queue_stats_accumulate_across_kinds() {
    let transport = Arc::new(FakeTransport::new());
    let coordinator = common::test_coordinator(transport);

    coordinator.stage_item(common::procedure(42, "D0120")).unwrap();
    coordinator.submit_staged_batch().outcome().await.unwrap();
    coordinator.inspect_staged().outcome().await.unwrap();
    // Empty batch, fails through the ticket but still counts as settled.
    coordinator.submit_staged_batch().outcome().await.unwrap_err();

    let stats = coordinator.queue_stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.serialized, 2);
    assert_eq!(stats.bypassed, 1);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.depth, 0);
}
