//! Event loop driving a [`Dispatcher`].
//!
//! The runtime pulls [`InboundEvent`]s from a stream (or an mpsc channel fed
//! by a platform client), dispatches each on its own tokio task and keeps at
//! most `bot.max_concurrent_dispatches` of them in flight. It stops when the
//! event source ends, on Ctrl+C / SIGTERM, or when its cancellation token is
//! cancelled, and then waits for in-flight dispatches to finish.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! let runtime = ParleyRuntime::builder()
//!     .config_file("config/parley.toml")
//!     .build(dispatcher, messenger)?;
//!
//! tokio::spawn(poll_platform_updates(tx));
//! runtime.run_channel(rx).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::{Stream, StreamExt};
use tokio::signal;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, ParleyConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use parley_core::{BoxedMessenger, InboundEvent};
use parley_framework::Dispatcher;

/// Counters describing the work done by a runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Events pulled from the event source.
    pub received: u64,
    /// Events at least one matcher handled.
    pub handled: u64,
    /// Events no matcher handled.
    pub unhandled: u64,
    /// Dispatches currently running.
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    handled: AtomicU64,
    unhandled: AtomicU64,
}

/// The Parley runtime.
///
/// Owns the dispatcher, the outbound messenger and the concurrency limit.
/// The loop itself is started with [`run`](Self::run),
/// [`run_channel`](Self::run_channel) or [`run_until`](Self::run_until).
pub struct ParleyRuntime {
    config: ParleyConfig,
    dispatcher: Arc<Dispatcher>,
    messenger: BoxedMessenger,
    limiter: Arc<Semaphore>,
    shutdown: CancellationToken,
    running: AtomicBool,
    counters: Arc<Counters>,
}

impl ParleyRuntime {
    /// Creates a runtime builder that loads configuration from files and
    /// environment.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Initializes logging from `config.logging` and stores `config.bot` in
    /// the global scope, where handlers read it with `Shared<BotConfig>`.
    pub fn from_config(
        config: &ParleyConfig,
        dispatcher: Dispatcher,
        messenger: BoxedMessenger,
    ) -> Self {
        logging::init_from_config(&config.logging);

        dispatcher
            .scopes()
            .global()
            .state()
            .insert(config.bot.clone());

        info!(
            log_level = %config.logging.level,
            matchers = dispatcher.matcher_count(),
            max_concurrent_dispatches = config.bot.max_concurrent_dispatches,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            dispatcher: Arc::new(dispatcher),
            messenger,
            limiter: Arc::new(Semaphore::new(config.bot.max_concurrent_dispatches.max(1))),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// Returns the dispatcher events are routed through.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns a token that stops the loop when cancelled.
    ///
    /// Cancellation is permanent: a cancelled runtime returns from any later
    /// `run` call immediately.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Requests shutdown of a running loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the runtime counters.
    pub fn stats(&self) -> RuntimeStats {
        let max = self.config.bot.max_concurrent_dispatches.max(1);
        RuntimeStats {
            received: self.counters.received.load(Ordering::Relaxed),
            handled: self.counters.handled.load(Ordering::Relaxed),
            unhandled: self.counters.unhandled.load(Ordering::Relaxed),
            in_flight: max.saturating_sub(self.limiter.available_permits()),
        }
    }

    /// Runs until `events` ends or a shutdown signal is received.
    pub async fn run<S>(&self, events: S) -> RuntimeResult<()>
    where
        S: Stream<Item = InboundEvent> + Send,
    {
        info!("Parley runtime is now running. Press Ctrl+C to stop.");
        self.run_until(events, wait_for_signal()).await
    }

    /// Runs over the events received on `rx` until every sender is dropped
    /// or a shutdown signal is received.
    pub async fn run_channel(&self, mut rx: mpsc::Receiver<InboundEvent>) -> RuntimeResult<()> {
        self.run(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
            .await
    }

    /// Runs until `events` ends, `shutdown` completes or the runtime's token
    /// is cancelled.
    pub async fn run_until<S, F>(&self, events: S, shutdown: F) -> RuntimeResult<()>
    where
        S: Stream<Item = InboundEvent> + Send,
        F: Future<Output = ()> + Send,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Runtime is already running");
            return Err(RuntimeError::AlreadyRunning);
        }

        let tracker = TaskTracker::new();
        let result = self.event_loop(events, shutdown, &tracker).await;

        tracker.close();
        if !tracker.is_empty() {
            info!(in_flight = tracker.len(), "Waiting for in-flight dispatches");
        }
        tracker.wait().await;

        self.running.store(false, Ordering::Release);
        info!("Runtime stopped");
        result
    }

    async fn event_loop<S, F>(
        &self,
        events: S,
        shutdown: F,
        tracker: &TaskTracker,
    ) -> RuntimeResult<()>
    where
        S: Stream<Item = InboundEvent> + Send,
        F: Future<Output = ()> + Send,
    {
        let mut events = std::pin::pin!(events);
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let event = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("Shutdown token cancelled");
                    return Ok(());
                }
                () = shutdown.as_mut() => {
                    self.shutdown.cancel();
                    return Ok(());
                }
                next = events.next() => match next {
                    Some(event) => event,
                    None => {
                        info!("Event source closed");
                        return Ok(());
                    }
                },
            };
            self.counters.received.fetch_add(1, Ordering::Relaxed);

            let permit = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!("Dropping pending event on shutdown");
                    return Ok(());
                }
                permit = Arc::clone(&self.limiter).acquire_owned() => {
                    permit.map_err(|_| RuntimeError::LimiterClosed)?
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let messenger = Arc::clone(&self.messenger);
            let counters = Arc::clone(&self.counters);
            tracker.spawn(async move {
                let handled = dispatcher.dispatch(event, messenger).await;
                let counter = if handled {
                    &counters.handled
                } else {
                    &counters.unhandled
                };
                counter.fetch_add(1, Ordering::Relaxed);
                drop(permit);
            });
        }
    }
}

impl std::fmt::Debug for ParleyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyRuntime")
            .field("dispatcher", &self.dispatcher)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`ParleyRuntime`] from layered configuration.
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build(dispatcher, messenger)?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(
        self,
        dispatcher: Dispatcher,
        messenger: BoxedMessenger,
    ) -> ConfigResult<ParleyRuntime> {
        let config = self.config_loader.load()?;
        Ok(ParleyRuntime::from_config(&config, dispatcher, messenger))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
