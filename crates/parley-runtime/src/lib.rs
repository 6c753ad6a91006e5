//! Parley Runtime - Orchestration layer for the Parley bot framework.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `ParleyConfig`)
//! - Logging configuration (`LoggingBuilder`, `SpanEvents`)
//! - The event loop (`ParleyRuntime`) that feeds inbound events to a
//!   `Dispatcher` with bounded concurrency and graceful shutdown
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ParleyRuntime::builder().build(dispatcher, messenger)?;
//!     runtime.run_channel(updates).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BotConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, ParleyConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{ParleyRuntime, RuntimeBuilder, RuntimeStats};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
