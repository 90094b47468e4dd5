// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The exception agent: process-wide state plus host integration hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use loom_exceptions_core::{CoreError, ErrorRecord, Transaction};
use tracing::{debug, info, warn};

use crate::backtrace::capture_stacktrace;
use crate::config::AgentConfig;
use crate::context::ExecutionContext;
use crate::error::{Result, SdkError};
use crate::flush::{FlushCoordinator, FlushStats};
use crate::handle::TransactionHandle;
use crate::ignore::{consult_namespace, IgnorePolicy};
use crate::registry::TransactionRegistry;
use crate::transport::Transport;

/// Builder for constructing an [`ErrorAgent`].
pub struct ErrorAgentBuilder {
	config: Option<AgentConfig>,
	transport: Option<Arc<dyn Transport>>,
	ignore_policy: Option<Arc<dyn IgnorePolicy>>,
}

impl ErrorAgentBuilder {
	/// Creates a new builder with default settings.
	pub fn new() -> Self {
		Self {
			config: None,
			transport: None,
			ignore_policy: None,
		}
	}

	/// Sets the agent configuration. Defaults to [`AgentConfig::default`].
	pub fn config(mut self, config: AgentConfig) -> Self {
		self.config = Some(config);
		self
	}

	/// Sets the transport closed transactions are flushed to. Required.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Overrides the ignore policy.
	///
	/// By default the `ignore_errors` and `ignore_namespaces` lists from the
	/// configuration are used.
	pub fn ignore_policy(mut self, policy: Arc<dyn IgnorePolicy>) -> Self {
		self.ignore_policy = Some(policy);
		self
	}

	/// Builds the agent.
	pub fn build(self) -> Result<ErrorAgent> {
		let transport = self.transport.ok_or(SdkError::MissingTransport)?;
		let config = self.config.unwrap_or_default();
		config.validate()?;

		let ignore_policy = self
			.ignore_policy
			.unwrap_or_else(|| Arc::new(config.ignore_list()));
		let flusher = FlushCoordinator::new(config.flush_config(), transport);

		info!(
			default_namespace = %config.default_namespace,
			ignore_scope = %config.ignore_scope,
			"Exception agent initialized"
		);

		Ok(ErrorAgent {
			inner: Arc::new(AgentInner {
				config,
				registry: TransactionRegistry::new(),
				flusher,
				ignore_policy,
				closed: AtomicBool::new(false),
			}),
		})
	}
}

impl Default for ErrorAgentBuilder {
	fn default() -> Self {
		Self::new()
	}
}

pub(crate) struct AgentInner {
	pub(crate) config: AgentConfig,
	pub(crate) registry: TransactionRegistry,
	pub(crate) flusher: FlushCoordinator,
	pub(crate) ignore_policy: Arc<dyn IgnorePolicy>,
	pub(crate) closed: AtomicBool,
}

/// In-process agent that correlates errors with units of work.
///
/// One agent is created at process start and shared (it is cheap to clone)
/// with the framework integration and application code. Nothing is global:
/// tests build a fresh agent each.
///
/// # Example
///
/// ```ignore
/// use loom_exceptions::{ErrorAgent, TracingTransport};
///
/// let agent = ErrorAgent::builder()
///     .transport(Arc::new(TracingTransport))
///     .build()?;
///
/// // Framework integration brackets a request.
/// let txn = agent.open_transaction("web", Some("UsersController#show"))?;
///
/// // Application code reports a handled error against it.
/// agent.set_error_with(ErrorRecord::from_error(&err), |meta| {
///     meta.set_tag("user_id", 42);
/// })?;
///
/// agent.close_transaction(&txn)?;
///
/// // Short-lived process: drain before exit.
/// agent.shutdown("exit").await?;
/// ```
#[derive(Clone)]
pub struct ErrorAgent {
	pub(crate) inner: Arc<AgentInner>,
}

impl ErrorAgent {
	/// Creates a new builder for constructing an agent.
	pub fn builder() -> ErrorAgentBuilder {
		ErrorAgentBuilder::new()
	}

	pub fn config(&self) -> &AgentConfig {
		&self.inner.config
	}

	pub fn registry(&self) -> &TransactionRegistry {
		&self.inner.registry
	}

	pub fn flusher(&self) -> &FlushCoordinator {
		&self.inner.flusher
	}

	/// Returns the transaction bound to the calling context.
	pub fn current(&self) -> Option<TransactionHandle> {
		self.inner.registry.current()
	}

	/// Opens a transaction and binds it to the calling context.
	///
	/// An empty `namespace` falls back to the configured default.
	pub fn open_transaction(&self, namespace: &str, action: Option<&str>) -> Result<TransactionHandle> {
		self.open_transaction_in(ExecutionContext::current(), namespace, action)
	}

	pub fn open_transaction_in(
		&self,
		context: ExecutionContext,
		namespace: &str,
		action: Option<&str>,
	) -> Result<TransactionHandle> {
		self.check_closed()?;

		if let Some(existing) = self.inner.registry.current_in(context) {
			return Err(SdkError::AlreadyBound {
				context,
				transaction_id: existing.id(),
			});
		}
		if let Some(stale) = self.inner.registry.take_closed_in(context) {
			debug!(transaction_id = %stale.id(), context = %context, "Releasing closed transaction left bound");
			self.dispatch(stale.snapshot());
		}

		let mut transaction = self.new_transaction();
		if !namespace.trim().is_empty() {
			transaction.set_namespace(namespace)?;
		}
		if let Some(action) = action {
			transaction.set_action(action)?;
		}

		let handle = TransactionHandle::new(transaction);
		self.inner.registry.bind_in(context, handle.clone())?;
		debug!(
			transaction_id = %handle.id(),
			context = %context,
			namespace = %handle.namespace(),
			"Transaction opened"
		);
		Ok(handle)
	}

	/// Closes the transaction, removes it from the registry, and queues it
	/// for transport if it carries errors.
	///
	/// A transaction that was closed through [`TransactionHandle::update`] while
	/// still bound is unbound and queued here as well. Closing one that is
	/// neither open nor bound fails with [`CoreError::TransactionClosed`].
	pub fn close_transaction(&self, handle: &TransactionHandle) -> Result<()> {
		let unbound = self.inner.registry.unbind(handle);

		let transaction = match handle.update(|txn| txn.close().map(|()| txn.clone())) {
			Ok(transaction) => transaction,
			Err(CoreError::TransactionClosed(_)) if unbound.is_ok() => {
				debug!(transaction_id = %handle.id(), "Transaction was closed while still bound");
				handle.snapshot()
			}
			Err(e) => return Err(e.into()),
		};

		if let Err(e) = unbound {
			debug!(transaction_id = %handle.id(), error = %e, "Closed transaction was not bound");
		}

		self.dispatch(transaction);
		Ok(())
	}

	/// Drains pending transactions to the transport.
	pub async fn flush(&self, reason: &str) -> Result<()> {
		self.inner.flusher.flush(reason).await
	}

	/// Blocking variant of [`ErrorAgent::flush`] for synchronous programs.
	pub fn flush_blocking(&self, reason: &str) -> Result<()> {
		self.inner.flusher.flush_blocking(reason)
	}

	pub fn stats(&self) -> FlushStats {
		self.inner.flusher.stats()
	}

	/// Stops capturing, closes still-open transactions, and flushes.
	///
	/// Safe to call more than once; later calls only flush.
	pub async fn shutdown(&self, reason: &str) -> Result<()> {
		self.begin_shutdown();
		let result = self.inner.flusher.flush(reason).await;
		self.finish_shutdown(reason);
		result
	}

	/// Blocking variant of [`ErrorAgent::shutdown`].
	pub fn shutdown_blocking(&self, reason: &str) -> Result<()> {
		self.begin_shutdown();
		let result = self.inner.flusher.flush_blocking(reason);
		self.finish_shutdown(reason);
		result
	}

	/// Returns true if the agent has been shut down.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	/// Builds a record from an error, attaching a stack when configured to.
	pub fn record_for<E>(&self, error: &E) -> ErrorRecord
	where
		E: std::error::Error + ?Sized,
	{
		self.with_backtrace(ErrorRecord::from_error(error))
	}

	pub(crate) fn with_backtrace(&self, record: ErrorRecord) -> ErrorRecord {
		if self.inner.config.capture_backtraces {
			record.with_stacktrace(capture_stacktrace())
		} else {
			record
		}
	}

	pub(crate) fn new_transaction(&self) -> Transaction {
		Transaction::new(self.inner.config.default_namespace.clone())
			.with_max_breadcrumbs(self.inner.config.max_breadcrumbs)
	}

	/// Queues a closed transaction unless it has nothing to report.
	pub(crate) fn dispatch(&self, transaction: Transaction) {
		if transaction.errors().is_empty() {
			debug!(transaction_id = %transaction.id(), "Transaction closed without errors");
			return;
		}
		if consult_namespace(self.inner.ignore_policy.as_ref(), transaction.namespace()) {
			debug!(
				transaction_id = %transaction.id(),
				namespace = %transaction.namespace(),
				"Dropping transaction in ignored namespace"
			);
			return;
		}
		if let Err(e) = self.inner.flusher.enqueue(transaction) {
			warn!(error = %e, "Failed to queue transaction");
		}
	}

	pub(crate) fn check_closed(&self) -> Result<()> {
		if self.inner.closed.load(Ordering::SeqCst) {
			return Err(SdkError::ClientShutdown);
		}
		Ok(())
	}

	fn begin_shutdown(&self) {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		for handle in self.inner.registry.drain() {
			match handle.update(|txn| txn.close().map(|()| txn.clone())) {
				Ok(transaction) => self.dispatch(transaction),
				Err(CoreError::TransactionClosed(_)) => self.dispatch(handle.snapshot()),
				Err(e) => debug!(transaction_id = %handle.id(), error = %e, "Skipping transaction at shutdown"),
			}
		}
		// Reports racing this shutdown are refused from here on instead of
		// landing behind the final flush.
		self.inner.flusher.shutdown();
	}

	fn finish_shutdown(&self, reason: &str) {
		let stranded = self.inner.flusher.queue_len();
		if stranded > 0 {
			warn!(reason = %reason, stranded, "Transactions left undelivered at shutdown");
		}
		info!(reason = %reason, "Exception agent shutdown");
	}
}
