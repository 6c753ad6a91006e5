//! End-to-end order collection through the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use parley::core::{RepositoryError, RepositoryResult};
use parley::framework::DEFAULT_FAILURE_MESSAGE;
use parley::framework::testing::{RecordingMessenger, callback, message};
use parley::prelude::*;

#[derive(Debug, Default, Clone)]
struct OrderRequest {
    items: Vec<String>,
}

#[derive(Debug)]
struct AddItem {
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Order {
    id: u64,
    user_id: UserId,
    items: Vec<String>,
}

impl Entity for Order {
    type Id = u64;

    fn id(&self) -> &u64 {
        &self.id
    }
}

type Orders = Arc<dyn Repository<Order>>;

static NEXT_ORDER: AtomicU64 = AtomicU64::new(1);

struct DownRepository;

#[async_trait]
impl Repository<Order> for DownRepository {
    async fn insert(&self, _entity: Order) -> RepositoryResult<()> {
        Err(RepositoryError::Backend("db down".to_string()))
    }

    async fn update(&self, _entity: Order) -> RepositoryResult<()> {
        Err(RepositoryError::Backend("db down".to_string()))
    }

    async fn find_by_id(&self, _id: &u64) -> RepositoryResult<Option<Order>> {
        Err(RepositoryError::Backend("db down".to_string()))
    }

    fn list(&self) -> BoxStream<'_, RepositoryResult<Order>> {
        stream::once(async { Err(RepositoryError::Backend("db down".to_string())) }).boxed()
    }

    async fn exists(&self, _id: &u64) -> RepositoryResult<bool> {
        Err(RepositoryError::Backend("db down".to_string()))
    }
}

async fn start_order() -> &'static str {
    "What would you like to order?"
}

async fn add_item(order: Conversation<OrderRequest>, item: Callback<AddItem>) -> String {
    let count = order
        .update(|o| {
            o.items.push(item.name.clone());
            o.items.len()
        })
        .await;
    format!("Added {} ({count} items)", item.name)
}

async fn file_order(
    order: Conversation<OrderRequest>,
    user: User,
    Shared(orders): Shared<Orders>,
) -> Result<String, RepositoryError> {
    let items = order.snapshot().await.items;
    let id = NEXT_ORDER.fetch_add(1, Ordering::Relaxed);
    orders
        .insert(Order {
            id,
            user_id: user.user_id(),
            items,
        })
        .await?;
    Ok(format!("Order #{id} filed"))
}

fn order_bot(orders: Orders, hook_calls: Arc<AtomicUsize>) -> Dispatcher {
    let dispatcher = Dispatcher::default()
        .with(
            on_command("start_order").service(
                Pipeline::new()
                    .init::<OrderRequest>()
                    .exit_on_error()
                    .handler(start_order),
            ),
        )
        .with(
            on_callback::<AddItem>().service(
                Pipeline::new()
                    .callback::<AddItem>()
                    .inject::<OrderRequest>()
                    .exit_on_error()
                    .handler(add_item),
            ),
        )
        .with(
            on_command("file_order").service(
                Pipeline::new()
                    .cleanup::<OrderRequest>()
                    .exit_on_error()
                    .delete_message_after()
                    .handler(file_order),
            ),
        )
        .on_error(move |_ctx, _err| {
            let calls = Arc::clone(&hook_calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
    dispatcher.scopes().global().state().insert(orders);
    dispatcher
}

fn bread() -> AddItem {
    AddItem {
        name: "bread".to_string(),
    }
}

#[tokio::test]
async fn test_order_is_collected_and_filed() {
    let repo = Arc::new(MemoryRepository::<Order>::new());
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = order_bot(repo.clone(), Arc::clone(&hook_calls));
    let recording = Arc::new(RecordingMessenger::new());
    let messenger: BoxedMessenger = recording.clone();
    let user = dispatcher.scopes().user(UserId(1));

    assert!(
        dispatcher
            .dispatch(message(10, 1, "/start_order"), messenger.clone())
            .await
    );
    let order = user.conversations().get::<OrderRequest>().unwrap();
    assert!(order.snapshot().await.items.is_empty());

    assert!(
        dispatcher
            .dispatch(callback(10, 1, bread()), messenger.clone())
            .await
    );
    assert_eq!(order.snapshot().await.items, vec!["bread"]);
    assert_eq!(recording.answered().len(), 1);

    assert!(
        dispatcher
            .dispatch(message(10, 1, "/file_order"), messenger.clone())
            .await
    );
    assert!(matches!(
        user.conversations().get::<OrderRequest>(),
        Err(ConversationError::NotFound { .. })
    ));

    let stored: Vec<Order> = repo.list().map(Result::unwrap).collect().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_id, UserId(1));
    assert_eq!(stored[0].items, vec!["bread"]);

    let texts = recording.sent_texts();
    assert_eq!(texts[0], "What would you like to order?");
    assert_eq!(texts[1], "Added bread (1 items)");
    assert!(texts[2].starts_with("Order #"));
    assert_eq!(recording.deleted(), vec![MessageId(1)]);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_filing_reports_and_discards() {
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = order_bot(Arc::new(DownRepository), Arc::clone(&hook_calls));
    let recording = Arc::new(RecordingMessenger::new());
    let messenger: BoxedMessenger = recording.clone();

    dispatcher
        .dispatch(message(10, 1, "/start_order"), messenger.clone())
        .await;
    dispatcher
        .dispatch(callback(10, 1, bread()), messenger.clone())
        .await;
    recording.clear();

    assert!(
        dispatcher
            .dispatch(message(10, 1, "/file_order"), messenger.clone())
            .await
    );

    assert_eq!(recording.sent_texts(), vec![DEFAULT_FAILURE_MESSAGE]);
    assert_eq!(recording.deleted(), vec![MessageId(1)]);
    assert!(
        !dispatcher
            .scopes()
            .user(UserId(1))
            .conversations()
            .contains::<OrderRequest>()
    );
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_adding_without_order_replies_with_fallback() {
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = order_bot(
        Arc::new(MemoryRepository::<Order>::new()),
        Arc::clone(&hook_calls),
    );
    let recording = Arc::new(RecordingMessenger::new());

    dispatcher
        .dispatch(callback(10, 2, bread()), recording.clone())
        .await;

    assert_eq!(recording.sent_texts(), vec![DEFAULT_FAILURE_MESSAGE]);
    assert_eq!(recording.answered().len(), 1);
    assert!(
        dispatcher
            .scopes()
            .user(UserId(2))
            .conversations()
            .active()
            .is_empty()
    );
}

#[tokio::test]
async fn test_users_collect_orders_independently() {
    let repo = Arc::new(MemoryRepository::<Order>::new());
    let dispatcher = order_bot(repo.clone(), Arc::new(AtomicUsize::new(0)));
    let recording = Arc::new(RecordingMessenger::new());
    let messenger: BoxedMessenger = recording.clone();

    for user in [1, 2] {
        dispatcher
            .dispatch(message(10, user, "/start_order"), messenger.clone())
            .await;
    }
    dispatcher
        .dispatch(callback(10, 1, bread()), messenger.clone())
        .await;
    dispatcher
        .dispatch(message(10, 2, "/file_order"), messenger.clone())
        .await;

    let first = dispatcher.scopes().user(UserId(1));
    let order = first.conversations().get::<OrderRequest>().unwrap();
    assert_eq!(order.snapshot().await.items, vec!["bread"]);

    let stored: Vec<Order> = repo.list().map(Result::unwrap).collect().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_id, UserId(2));
    assert!(stored[0].items.is_empty());
}

#[tokio::test]
async fn test_lifecycle_errors_reach_hook_without_boundary() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dispatcher = Dispatcher::default()
        .with(
            on_command("start_order")
                .service(Pipeline::new().init::<OrderRequest>().handler(start_order)),
        )
        .on_error(move |_ctx, err| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock()
                    .push(err.downcast_ref::<ConversationError>().cloned());
            }
        });
    let recording = Arc::new(RecordingMessenger::new());

    for _ in 0..2 {
        dispatcher
            .dispatch(message(10, 1, "/start_order"), recording.clone())
            .await;
    }

    let errors = seen.lock();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        Some(ConversationError::Conflict { user_id: UserId(1), .. })
    ));
    assert_eq!(recording.sent_texts(), vec!["What would you like to order?"]);
}

#[tokio::test]
async fn test_admin_only_command() {
    let config = BotConfig {
        admins: vec![1001],
        ..Default::default()
    };
    let dispatcher = Dispatcher::default().with(
        on_command("orders").service(
            Pipeline::new()
                .authorize(config.admin_ids())
                .handler(|| async { "0 orders" }),
        ),
    );
    let recording = Arc::new(RecordingMessenger::new());

    assert!(
        !dispatcher
            .dispatch(message(10, 5, "/orders"), recording.clone())
            .await
    );
    assert!(recording.sent_texts().is_empty());

    assert!(
        dispatcher
            .dispatch(message(10, 1001, "/orders"), recording.clone())
            .await
    );
    assert_eq!(recording.sent_texts(), vec!["0 orders"]);
}
