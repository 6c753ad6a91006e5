//! Order Bot Example
//!
//! A console bot that collects an order over several independent events,
//! using Parley conversations and pipelines.
//!
//! Every line read from stdin becomes one inbound event in a single chat:
//!
//! ```text
//! /start_order          start collecting an order
//! add <item>            press the "add" inline button for <item>
//! <any text>            attach a note to the open order
//! /file_order           persist the order and close it
//! /cancel               drop the open order
//! /orders               list filed orders (administrators only)
//! @<user id> <line>     send <line> as another user
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package order-bot -- --admin 1001
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use clap::Parser;
use futures::TryStreamExt;
use parley::core::{ApiResult, CallbackId, CallbackQuery, RepositoryError};
use parley::prelude::*;
use parley::runtime::config::ConfigLoader;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Console order-taking bot")]
struct Args {
    /// Configuration file (defaults to ./parley.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Additional administrator user id (repeatable).
    #[arg(long = "admin")]
    admins: Vec<i64>,

    /// User id of lines without an `@<id>` prefix.
    #[arg(short, long, default_value_t = 1001)]
    user: i64,

    /// Chat id all events are delivered to.
    #[arg(long, default_value_t = 1)]
    chat: i64,
}

// ============================================================================
// Domain
// ============================================================================

/// State collected while an order is open.
#[derive(Debug, Default, Clone)]
struct OrderRequest {
    items: Vec<String>,
    notes: Vec<String>,
}

/// Payload of the "add item" inline button.
#[derive(Debug)]
struct AddItem {
    name: String,
}

#[derive(Debug, Clone)]
struct Order {
    id: u64,
    user_id: UserId,
    items: Vec<String>,
    notes: Vec<String>,
}

impl Entity for Order {
    type Id = u64;

    fn id(&self) -> &u64 {
        &self.id
    }
}

type Orders = Arc<MemoryRepository<Order>>;

static NEXT_ORDER_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Handler Functions
// ============================================================================

async fn help() -> &'static str {
    "/start_order - open a new order\n\
     add <item>   - add an item\n\
     <text>       - attach a note\n\
     /file_order  - file the order\n\
     /cancel      - drop the order\n\
     /orders      - list orders (admins)"
}

async fn start_order(user: User) -> &'static str {
    info!(user_id = %user.user_id(), "Order opened");
    "Started a new order. Add items with `add <item>`, finish with /file_order."
}

async fn add_item(order: Conversation<OrderRequest>, item: Callback<AddItem>) -> String {
    let count = order
        .update(|o| {
            o.items.push(item.name.clone());
            o.items.len()
        })
        .await;
    format!("Added {} ({count} in order)", item.name)
}

async fn add_note(order: Conversation<OrderRequest>, text: Text) -> String {
    order.update(|o| o.notes.push(text.0.clone())).await;
    format!("Noted: {}", &*text)
}

async fn file_order(
    order: Conversation<OrderRequest>,
    user: User,
    Shared(orders): Shared<Orders>,
) -> Result<String> {
    let request = order.snapshot().await;
    if request.items.is_empty() {
        bail!("user {} tried to file an empty order", user.user_id());
    }

    let id = NEXT_ORDER_ID.fetch_add(1, Ordering::Relaxed);
    orders
        .insert(Order {
            id,
            user_id: user.user_id(),
            items: request.items,
            notes: request.notes,
        })
        .await?;
    info!(order_id = id, user_id = %user.user_id(), "Order filed");
    Ok(format!("Order #{id} filed, thank you!"))
}

async fn cancel_order(messenger: BoxedMessenger, chat: Chat) -> Outcome {
    if let Err(e) = messenger.send_message(chat.chat_id(), "Order cancelled.").await {
        warn!(error = %e, "Failed to confirm cancellation");
    }
    Outcome::Ended
}

async fn list_orders(Shared(orders): Shared<Orders>) -> Result<String, RepositoryError> {
    let all: Vec<Order> = orders.list().try_collect().await?;
    if all.is_empty() {
        return Ok("No orders filed yet.".to_string());
    }
    let lines: Vec<String> = all
        .iter()
        .map(|o| {
            format!(
                "#{} by {}: {} ({} notes)",
                o.id,
                o.user_id,
                o.items.join(", "),
                o.notes.len()
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

// ============================================================================
// Console Messenger
// ============================================================================

/// Prints outbound messages to stdout.
struct ConsoleMessenger {
    next_id: AtomicI64,
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> ApiResult<MessageId> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        println!("[bot -> chat {chat_id}] {text}");
        Ok(id)
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ApiResult<()> {
        println!("[bot deleted message {message_id} in chat {chat_id}]");
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &CallbackId) -> ApiResult<()> {
        println!("[bot answered {callback_id}]");
        Ok(())
    }
}

/// Turns stdin lines into events until EOF.
async fn read_events(
    tx: mpsc::Sender<InboundEvent>,
    chat: ChatId,
    default_user: UserId,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut message_id = 0;

    while let Some(line) = lines.next_line().await? {
        let (user, body) = match line.strip_prefix('@').and_then(|rest| rest.split_once(' ')) {
            Some((id, body)) => match id.parse::<i64>() {
                Ok(id) => (UserId(id), body.trim()),
                Err(_) => {
                    println!("[invalid user id {id:?}]");
                    continue;
                }
            },
            None => (default_user, line.trim()),
        };
        if body.is_empty() {
            continue;
        }

        message_id += 1;
        let event = match body.strip_prefix("add ") {
            Some(item) => {
                let query = CallbackQuery::new(
                    format!("cb-{message_id}"),
                    AddItem {
                        name: item.trim().to_string(),
                    },
                );
                InboundEvent::callback(chat, user, MessageId(message_id), query)
            }
            None => InboundEvent::message(chat, user, MessageId(message_id), body),
        };

        if tx.send(event).await.is_err() {
            break;
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn build_dispatcher(config: &BotConfig) -> Dispatcher {
    let fallback: Arc<str> = config.fallback_message.as_str().into();

    let order_flow = ConversationBuilder::<OrderRequest>::new()
        .name("order")
        .entry_point(
            on_command("start_order").service(
                Pipeline::new()
                    .init::<OrderRequest>()
                    .exit_on_error_with(Arc::clone(&fallback))
                    .handler(start_order),
            ),
        )
        .step(
            on_callback::<AddItem>().service(
                Pipeline::new()
                    .callback::<AddItem>()
                    .inject::<OrderRequest>()
                    .exit_on_error_with(Arc::clone(&fallback))
                    .handler(add_item),
            ),
        )
        .step(
            on_command("file_order").service(
                Pipeline::new()
                    .cleanup::<OrderRequest>()
                    .exit_on_error_with(Arc::clone(&fallback))
                    .delete_message_after()
                    .handler(file_order),
            ),
        )
        .step(on_text().service(Pipeline::new().inject::<OrderRequest>().handler(add_note)))
        .fallback(on_command("cancel").handler(cancel_order))
        .build();

    let dispatcher = Dispatcher::default()
        .with(on_command("help").block(true).handler(help))
        .with(order_flow)
        .with(
            on_command("orders").block(true).service(
                Pipeline::new()
                    .authorize(config.admin_ids())
                    .handler(list_orders),
            ),
        )
        // Outside the order flow: no boundary, so a missing order reaches the error hook
        .with(
            on_command("file_order")
                .block(true)
                .service(Pipeline::new().cleanup::<OrderRequest>().handler(file_order)),
        )
        .with(
            on_command("start_order")
                .block(true)
                .handler(|| async { "You already have an open order. Send /cancel to drop it." }),
        )
        .on_error(|ctx, err| async move {
            let reply = match err.downcast_ref::<ConversationError>() {
                Some(ConversationError::NotFound { .. }) => {
                    "You have no open order. Send /start_order first."
                }
                Some(ConversationError::Conflict { .. }) => "You already have an open order.",
                None => {
                    error!(user_id = %ctx.user_id(), "Unhandled error: {err}");
                    return;
                }
            };
            if let Err(e) = ctx.messenger().send_message(ctx.chat_id(), reply).await {
                warn!(error = %e, "Failed to send error reply");
            }
        });

    dispatcher
        .scopes()
        .global()
        .state()
        .insert(Orders::default());
    dispatcher
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_current_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    config.bot.admins.extend(&args.admins);

    let dispatcher = build_dispatcher(&config.bot);
    let messenger: BoxedMessenger = Arc::new(ConsoleMessenger {
        next_id: AtomicI64::new(10_000),
    });
    let runtime = ParleyRuntime::from_config(&config, dispatcher, messenger);

    let (tx, rx) = mpsc::channel(32);
    let reader = tokio::spawn(read_events(tx, ChatId(args.chat), UserId(args.user)));

    println!("Order bot ready, type /help");
    runtime.run_channel(rx).await?;

    reader.abort();
    let stats = runtime.stats();
    info!(
        received = stats.received,
        handled = stats.handled,
        unhandled = stats.unhandled,
        "Order bot stopped"
    );
    Ok(())
}
