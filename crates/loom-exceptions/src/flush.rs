// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pending-transaction queue and explicit flushing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use loom_exceptions_core::Transaction;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SdkError};
use crate::transport::Transport;

/// Configuration for the flush coordinator.
#[derive(Debug, Clone)]
pub struct FlushConfig {
	/// Upper bound on a single flush.
	pub flush_timeout: Duration,
	/// Maximum number of pending transactions before dropping the oldest.
	pub max_queue_size: usize,
}

impl Default for FlushConfig {
	fn default() -> Self {
		Self {
			flush_timeout: Duration::from_secs(5),
			max_queue_size: 1000,
		}
	}
}

/// Point-in-time copy of the coordinator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
	pub enqueued: u64,
	pub dropped: u64,
	pub submitted: u64,
	pub failed: u64,
}

#[derive(Default)]
struct Counters {
	enqueued: AtomicU64,
	dropped: AtomicU64,
	submitted: AtomicU64,
	failed: AtomicU64,
}

/// Buffers closed transactions until they are flushed to the transport.
pub struct FlushCoordinator {
	config: FlushConfig,
	transport: Arc<dyn Transport>,
	queue: Mutex<VecDeque<Transaction>>,
	shutdown: AtomicBool,
	counters: Counters,
}

impl FlushCoordinator {
	pub fn new(config: FlushConfig, transport: Arc<dyn Transport>) -> Self {
		Self {
			config,
			transport,
			queue: Mutex::new(VecDeque::new()),
			shutdown: AtomicBool::new(false),
			counters: Counters::default(),
		}
	}

	/// Queues a closed transaction. Never waits on the transport.
	pub fn enqueue(&self, transaction: Transaction) -> Result<()> {
		if self.shutdown.load(Ordering::SeqCst) {
			return Err(SdkError::ClientShutdown);
		}
		if !transaction.is_closed() {
			return Err(SdkError::NotClosed(transaction.id()));
		}

		let mut queue = self.lock();
		while queue.len() >= self.config.max_queue_size.max(1) {
			if let Some(dropped) = queue.pop_front() {
				self.counters.dropped.fetch_add(1, Ordering::Relaxed);
				warn!(
					transaction_id = %dropped.id(),
					namespace = %dropped.namespace(),
					"Dropped transaction due to queue overflow"
				);
			}
		}

		debug!(transaction_id = %transaction.id(), "Transaction queued");
		queue.push_back(transaction);
		self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}

	/// Drains the queue into the transport.
	///
	/// Transport failures are logged and not retried. If the transport does not
	/// keep up within `flush_timeout`, the unacknowledged transactions go back
	/// to the head of the queue and [`SdkError::FlushTimeout`] is returned.
	pub async fn flush(&self, reason: &str) -> Result<()> {
		let batch: Vec<Transaction> = {
			let mut queue = self.lock();
			queue.drain(..).collect()
		};

		if batch.is_empty() {
			debug!(reason = %reason, "Nothing to flush");
			return Ok(());
		}

		info!(reason = %reason, count = batch.len(), "Flushing transactions");

		let acknowledged = AtomicUsize::new(0);
		let drain = async {
			for transaction in &batch {
				match self.transport.submit(transaction).await {
					Ok(()) => {
						self.counters.submitted.fetch_add(1, Ordering::Relaxed);
					}
					Err(e) => {
						self.counters.failed.fetch_add(1, Ordering::Relaxed);
						error!(
							transaction_id = %transaction.id(),
							error = %e,
							"Transport failed to accept transaction"
						);
					}
				}
				acknowledged.fetch_add(1, Ordering::SeqCst);
			}
		};

		let outcome = tokio::time::timeout(self.config.flush_timeout, drain).await;
		match outcome {
			Ok(()) => {
				debug!(reason = %reason, "Flush complete");
				Ok(())
			}
			Err(_) => {
				let done = acknowledged.load(Ordering::SeqCst);
				let remaining: Vec<Transaction> = batch.into_iter().skip(done).collect();
				let pending = remaining.len();
				self.requeue(remaining);
				warn!(
					reason = %reason,
					pending,
					timeout_ms = self.config.flush_timeout.as_millis() as u64,
					"Flush timed out"
				);
				Err(SdkError::FlushTimeout {
					timeout: self.config.flush_timeout,
					pending,
				})
			}
		}
	}

	/// Runs [`FlushCoordinator::flush`] on a private runtime.
	///
	/// For synchronous programs that want to drain before `main` returns. Fails
	/// with [`SdkError::BlockingInRuntime`] when called from async code.
	pub fn flush_blocking(&self, reason: &str) -> Result<()> {
		if tokio::runtime::Handle::try_current().is_ok() {
			return Err(SdkError::BlockingInRuntime);
		}

		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_time()
			.build()
			.map_err(SdkError::Runtime)?;
		runtime.block_on(self.flush(reason))
	}

	/// Returns the number of transactions waiting to be flushed.
	pub fn queue_len(&self) -> usize {
		self.lock().len()
	}

	/// Copies of the pending transactions, oldest first.
	pub fn pending(&self) -> Vec<Transaction> {
		self.lock().iter().cloned().collect()
	}

	pub fn stats(&self) -> FlushStats {
		FlushStats {
			enqueued: self.counters.enqueued.load(Ordering::Relaxed),
			dropped: self.counters.dropped.load(Ordering::Relaxed),
			submitted: self.counters.submitted.load(Ordering::Relaxed),
			failed: self.counters.failed.load(Ordering::Relaxed),
		}
	}

	/// Stops accepting new transactions. Already queued ones can still be flushed.
	pub fn shutdown(&self) {
		self.shutdown.store(true, Ordering::SeqCst);
	}

	pub fn is_shutdown(&self) -> bool {
		self.shutdown.load(Ordering::SeqCst)
	}

	fn requeue(&self, transactions: Vec<Transaction>) {
		let mut queue = self.lock();
		for transaction in transactions.into_iter().rev() {
			queue.push_front(transaction);
		}
		while queue.len() > self.config.max_queue_size.max(1) {
			if let Some(dropped) = queue.pop_back() {
				self.counters.dropped.fetch_add(1, Ordering::Relaxed);
				warn!(transaction_id = %dropped.id(), "Dropped transaction while requeueing");
			}
		}
	}

	fn lock(&self) -> MutexGuard<'_, VecDeque<Transaction>> {
		self.queue.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
