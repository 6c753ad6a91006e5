use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::conversation::Conversation;
use crate::error::{ConversationError, ExtractError};
use crate::extractor::Callback;
use crate::outcome::Outcome;
use crate::testing::{Recorded, TestHarness, callback, message};
use parley_core::{CallbackId, ChatId, MessageId, UserId};

#[derive(Debug, Clone, Default, PartialEq)]
struct OrderRequest {
    items: Vec<String>,
}

#[derive(Debug)]
struct AddItem(String);

#[derive(Debug)]
struct RemoveItem;

#[test]
fn test_stages_follow_fixed_order() {
    let pipeline = Pipeline::new()
        .cleanup::<OrderRequest>()
        .exit_on_error()
        .callback::<AddItem>()
        .delete_message_after()
        .authorize([UserId(1)]);

    assert_eq!(
        pipeline.stages(),
        vec![
            Stage::Authorize { allowed: 1 },
            Stage::DeleteMessage,
            Stage::CallbackEnvelope {
                payload: std::any::type_name::<AddItem>(),
                answer: true,
            },
            Stage::ConversationGuard,
            Stage::ErrorBoundary,
            Stage::Lifecycle {
                mode: LifecycleMode::Cleanup,
                conversation: std::any::type_name::<OrderRequest>(),
            },
            Stage::Handler,
        ]
    );

    async fn noop() {}
    let descriptor = pipeline.handler(noop);
    assert_eq!(descriptor.stages().len(), 7);
    assert_eq!(descriptor.stages()[4].name(), "error_boundary");
}

#[test]
fn test_last_lifecycle_call_wins() {
    let stages = Pipeline::new()
        .init::<OrderRequest>()
        .inject::<OrderRequest>()
        .stages();
    assert_eq!(
        stages,
        vec![
            Stage::ConversationGuard,
            Stage::Lifecycle {
                mode: LifecycleMode::Inject,
                conversation: std::any::type_name::<OrderRequest>(),
            },
            Stage::Handler,
        ]
    );
}

#[tokio::test]
async fn test_authorization_short_circuits() {
    let harness = TestHarness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let descriptor = Pipeline::new()
        .authorize([UserId(1), UserId(2)])
        .init::<OrderRequest>()
        .exit_on_error()
        .delete_message_after()
        .handler(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

    let ctx = harness.context(message(10, 99, "/start_order"));
    let outcome = assert_ok!(descriptor.call(Arc::clone(&ctx)).await);

    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(ctx.user().conversations().active().is_empty());
    assert!(harness.messenger.calls().is_empty());

    let ctx = harness.context(message(10, 2, "/start_order"));
    assert_eq!(assert_ok!(descriptor.call(ctx).await), Outcome::Handled);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_init_inject_cleanup_flow() {
    let harness = TestHarness::new();

    let start = Pipeline::new()
        .init::<OrderRequest>()
        .handler(|order: Conversation<OrderRequest>| async move {
            assert!(order.snapshot().await.items.is_empty());
        });
    let add = Pipeline::new()
        .inject::<OrderRequest>()
        .handler(|order: Conversation<OrderRequest>| async move {
            order.update(|o| o.items.push("bread".into())).await;
        });
    let finish = Pipeline::new()
        .cleanup::<OrderRequest>()
        .handler(|order: Conversation<OrderRequest>| async move {
            format!("Filed {} item(s)", order.snapshot().await.items.len())
        });

    let ctx = harness.context(message(10, 1, "/start_order"));
    assert_eq!(assert_ok!(start.call(ctx).await), Outcome::Handled);

    let ctx = harness.context(message(10, 1, "/add_item bread"));
    assert_eq!(assert_ok!(add.call(ctx).await), Outcome::Handled);

    let user = harness.store.user(UserId(1));
    let live = assert_ok!(user.conversations().get::<OrderRequest>());
    assert_eq!(live.snapshot().await.items, vec!["bread"]);

    let ctx = harness.context(message(10, 1, "/file_order"));
    assert_eq!(assert_ok!(finish.call(ctx).await), Outcome::Ended);

    assert!(matches!(
        user.conversations().get::<OrderRequest>(),
        Err(ConversationError::NotFound { .. })
    ));
    assert_eq!(harness.messenger.sent_texts(), vec!["Filed 1 item(s)"]);
}

#[tokio::test]
async fn test_lifecycle_errors_propagate_without_boundary() {
    let harness = TestHarness::new();
    async fn noop() {}

    let inject = Pipeline::new().inject::<OrderRequest>().handler(noop);
    let err = assert_err!(inject.call(harness.context(message(10, 1, "x"))).await);
    assert!(matches!(
        err.downcast_ref::<ConversationError>(),
        Some(ConversationError::NotFound { user_id: UserId(1), .. })
    ));

    let init = Pipeline::new().init::<OrderRequest>().handler(noop);
    assert_ok!(init.call(harness.context(message(10, 1, "x"))).await);
    let err = assert_err!(init.call(harness.context(message(10, 1, "x"))).await);
    assert!(matches!(
        err.downcast_ref::<ConversationError>(),
        Some(ConversationError::Conflict { .. })
    ));
    assert!(harness.messenger.calls().is_empty());
}

#[tokio::test]
async fn test_error_boundary_discards_and_reports() {
    let harness = TestHarness::new();
    let user = harness.store.user(UserId(1));
    user.conversations().initialize::<OrderRequest>().unwrap();

    let descriptor = Pipeline::new()
        .inject::<OrderRequest>()
        .exit_on_error()
        .handler(|_order: Conversation<OrderRequest>| async move {
            Err::<(), _>(std::io::Error::other("db down"))
        });

    let ctx = harness.context(message(10, 1, "/add_item"));
    assert_eq!(assert_ok!(descriptor.call(ctx).await), Outcome::Ended);

    assert!(!user.conversations().contains::<OrderRequest>());
    assert_eq!(harness.messenger.sent_texts(), vec![DEFAULT_FAILURE_MESSAGE]);
}

#[tokio::test]
async fn test_error_boundary_catches_panics() {
    let harness = TestHarness::new();

    let descriptor = Pipeline::new()
        .init::<OrderRequest>()
        .exit_on_error_with("Order cancelled")
        .handler(|order: Conversation<OrderRequest>| async move {
            if order.snapshot().await.items.is_empty() {
                panic!("item list corrupted");
            }
        });

    let ctx = harness.context(message(10, 1, "/start_order"));
    assert_eq!(assert_ok!(descriptor.call(ctx).await), Outcome::Ended);
    assert!(!harness.store.user(UserId(1)).conversations().contains::<OrderRequest>());
    assert_eq!(harness.messenger.sent_texts(), vec!["Order cancelled"]);
}

#[tokio::test]
async fn test_boundary_without_lifecycle_touches_no_conversation() {
    let harness = TestHarness::new();
    let user = harness.store.user(UserId(1));
    user.conversations().initialize::<OrderRequest>().unwrap();

    let descriptor = Pipeline::new()
        .exit_on_error()
        .handler(|| async { Err::<(), _>(ExtractError::custom("bad input")) });

    assert_eq!(
        assert_ok!(descriptor.call(harness.context(message(10, 1, "x"))).await),
        Outcome::Ended
    );
    assert!(user.conversations().contains::<OrderRequest>());
}

#[tokio::test]
async fn test_cleanup_discards_on_failure_without_boundary() {
    let harness = TestHarness::new();
    let user = harness.store.user(UserId(1));
    user.conversations().initialize::<OrderRequest>().unwrap();

    let descriptor = Pipeline::new()
        .cleanup::<OrderRequest>()
        .handler(|_order: Conversation<OrderRequest>| async move {
            Err::<String, _>(std::io::Error::other("db down"))
        });

    let err = assert_err!(descriptor.call(harness.context(message(10, 1, "x"))).await);
    assert_eq!(err.to_string(), "db down");
    assert!(!user.conversations().contains::<OrderRequest>());
    assert!(harness.messenger.sent_texts().is_empty());
}

#[tokio::test]
async fn test_injected_conversation_ends_with_the_pipeline() {
    let harness = TestHarness::new();
    harness
        .store
        .user(UserId(1))
        .conversations()
        .initialize::<OrderRequest>()
        .unwrap();

    let file = Pipeline::new()
        .cleanup::<OrderRequest>()
        .handler(|_order: Conversation<OrderRequest>| async {});
    let late = Pipeline::new()
        .handler(|order: Conversation<OrderRequest>| async move {
            order.update(|o| o.items.push("stale".into())).await;
        });

    let ctx = harness.context(message(10, 1, "/file_order"));
    assert_eq!(assert_ok!(file.call(Arc::clone(&ctx)).await), Outcome::Ended);
    assert!(ctx.injected::<Conversation<OrderRequest>>().is_none());

    let err = assert_err!(late.call(ctx).await);
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::ConversationNotInjected { .. })
    ));
}

#[tokio::test]
async fn test_injected_conversation_removed_after_failure() {
    let harness = TestHarness::new();

    let start = Pipeline::new()
        .init::<OrderRequest>()
        .handler(|_order: Conversation<OrderRequest>| async move {
            Err::<(), _>(std::io::Error::other("menu unavailable"))
        });

    let ctx = harness.context(message(10, 1, "/start_order"));
    assert_err!(start.call(Arc::clone(&ctx)).await);
    assert!(ctx.injected::<Conversation<OrderRequest>>().is_none());
    assert!(ctx.user().conversations().contains::<OrderRequest>());
}

#[tokio::test]
async fn test_post_actions_fire_after_panic() {
    let harness = TestHarness::new();

    let descriptor = Pipeline::new()
        .delete_message_after()
        .callback::<AddItem>()
        .handler(|item: Callback<AddItem>| async move {
            if item.0.is_empty() {
                panic!("empty item name");
            }
        });

    let ctx = harness.context(callback(10, 1, AddItem(String::new())));
    let result = AssertUnwindSafe(descriptor.call(ctx)).catch_unwind().await;

    assert!(result.is_err());
    assert_eq!(harness.messenger.answered(), vec![CallbackId::from("cb-1")]);
    assert_eq!(harness.messenger.deleted(), vec![MessageId(1)]);
}

#[tokio::test]
async fn test_post_action_failures_are_swallowed() {
    let harness = TestHarness::new();
    harness.messenger.fail_deletes(true);
    harness.messenger.fail_answers(true);

    let descriptor = Pipeline::new()
        .delete_message_after()
        .callback::<AddItem>()
        .handler(|item: Callback<AddItem>| async move { format!("Added {}", item.0) });

    let ctx = harness.context(callback(10, 1, AddItem("rye".into())));
    assert_eq!(assert_ok!(descriptor.call(ctx).await), Outcome::Handled);
    assert_eq!(harness.messenger.sent_texts(), vec!["Added rye"]);
    assert!(harness.messenger.deleted().is_empty());
    assert!(harness.messenger.answered().is_empty());
}

#[tokio::test]
async fn test_side_effects_fire_inside_out() {
    let harness = TestHarness::new();
    harness
        .store
        .user(UserId(1))
        .conversations()
        .initialize::<OrderRequest>()
        .unwrap();

    let descriptor = Pipeline::new()
        .inject::<OrderRequest>()
        .exit_on_error_with("failed")
        .callback::<AddItem>()
        .delete_message_after()
        .handler(|_item: Callback<AddItem>| async move {
            Err::<(), _>(std::io::Error::other("boom"))
        });

    let ctx = harness.context(callback(10, 1, AddItem("rye".into())));
    assert_eq!(assert_ok!(descriptor.call(ctx).await), Outcome::Ended);

    let calls = harness.messenger.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], Recorded::Sent { text, .. } if text == "failed"));
    assert_eq!(calls[1], Recorded::Answered(CallbackId::from("cb-1")));
    assert_eq!(
        calls[2],
        Recorded::Deleted {
            chat_id: ChatId(10),
            message_id: MessageId(1),
        }
    );
}

#[tokio::test]
async fn test_answer_can_be_disabled() {
    let harness = TestHarness::new();
    async fn noop() {}

    let descriptor = Pipeline::new()
        .callback::<RemoveItem>()
        .answer_callback(false)
        .handler(noop);

    assert_ok!(descriptor.call(harness.context(callback(10, 1, RemoveItem))).await);
    assert!(harness.messenger.answered().is_empty());
}

#[tokio::test]
async fn test_payload_mismatch_fails_fast() {
    let harness = TestHarness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let descriptor = Pipeline::new()
        .callback::<AddItem>()
        .handler(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

    let err = assert_err!(descriptor.call(harness.context(callback(10, 1, RemoveItem))).await);
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::PayloadTypeMismatch { .. })
    ));

    let err = assert_err!(descriptor.call(harness.context(message(10, 1, "text"))).await);
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::EventKindMismatch { .. })
    ));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(harness.messenger.answered().is_empty());
}

#[tokio::test]
async fn test_guard_serializes_cleanup_and_inject() {
    let harness = TestHarness::new();
    let user = harness.store.user(UserId(1));
    user.conversations().initialize::<OrderRequest>().unwrap();

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let cleanup = {
        let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
        Pipeline::new()
            .cleanup::<OrderRequest>()
            .handler(move |_order: Conversation<OrderRequest>| {
                let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
                async move {
                    entered.notify_one();
                    release.notified().await;
                }
            })
    };
    let inject = Pipeline::new()
        .inject::<OrderRequest>()
        .handler(|_order: Conversation<OrderRequest>| async {});

    let first = tokio::spawn({
        let ctx = harness.context(message(10, 1, "/file_order"));
        async move { cleanup.call(ctx).await }
    });
    entered.notified().await;

    let second = tokio::spawn({
        let ctx = harness.context(message(10, 1, "/add_item"));
        async move { inject.call(ctx).await }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!second.is_finished());

    release.notify_one();
    assert_eq!(assert_ok!(first.await.unwrap()), Outcome::Ended);

    let err = assert_err!(second.await.unwrap());
    assert!(matches!(
        err.downcast_ref::<ConversationError>(),
        Some(ConversationError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_guard_does_not_block_other_users() {
    let harness = TestHarness::new();
    let held = harness.store.user(UserId(1)).lock_conversations().await;

    let descriptor = Pipeline::new()
        .init::<OrderRequest>()
        .handler(|_order: Conversation<OrderRequest>| async {});

    let ctx = harness.context(message(10, 2, "/start_order"));
    assert_eq!(assert_ok!(descriptor.call(ctx).await), Outcome::Handled);
    drop(held);
}
