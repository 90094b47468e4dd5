// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process exception capture for Rust applications.
//!
//! Errors raised while serving a unit of work (a request, a job) are
//! attached to that unit's [`Transaction`], which is queued for delivery when
//! it closes. Errors raised outside any unit of work are reported in a
//! transaction of their own.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use loom_exceptions::{ErrorAgent, ErrorRecord, TracingTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = ErrorAgent::builder()
//!         .config(loom_exceptions::load_config("loom-exceptions.toml")?)
//!         .transport(Arc::new(TracingTransport))
//!         .build()?;
//!
//!     // One transaction per request
//!     let txn = agent.open_transaction("web", Some("UsersController#show"))?;
//!
//!     // Errors from guarded work are reported and handed back unchanged
//!     let _ = agent.listen_for_error(|| std::fs::read_to_string("/missing"));
//!
//!     // Or attach one by hand, adjusting the transaction on the way
//!     let _ = agent.set_error_with(ErrorRecord::new("Timeout", "upstream slow"), |meta| {
//!         meta.set_tag("upstream", "billing");
//!     });
//!
//!     agent.close_transaction(&txn)?;
//!
//!     // No transaction needed for one-off reports
//!     agent.send_error(ErrorRecord::new("CronFailed", "nightly export"));
//!
//!     agent.shutdown("exit").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Execution contexts
//!
//! Each thread is its own context. Async tasks that may hop between worker
//! threads should run inside [`ExecutionContext::scope`] so their transaction
//! follows them.

mod agent;
mod backtrace;
pub mod config;
mod context;
mod error;
mod flush;
mod guard;
mod handle;
mod ignore;
mod metadata;
mod registry;
mod reporter;
mod transport;

pub use agent::{ErrorAgent, ErrorAgentBuilder};
pub use backtrace::{capture_stacktrace, parse_backtrace};
pub use config::{load_config, load_config_from_env, AgentConfig, AgentConfigLayer};
pub use context::ExecutionContext;
pub use error::{ConfigError, Result, SdkError};
pub use flush::{FlushConfig, FlushCoordinator, FlushStats};
pub use guard::PANIC_KIND;
pub use handle::TransactionHandle;
pub use ignore::{IgnoreList, IgnorePolicy, IgnoreScope};
pub use metadata::Metadata;
pub use registry::TransactionRegistry;
pub use transport::{ChannelTransport, TracingTransport, Transport, TransportError};

// Re-export core types for convenience
pub use loom_exceptions_core::{
	Breadcrumb, BreadcrumbLevel, CoreError, ErrorRecord, Frame, Stacktrace, TagValue, Transaction,
	TransactionId, TransactionState, DEFAULT_NAMESPACE,
};
