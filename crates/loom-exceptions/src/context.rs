// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Execution context identity.
//!
//! A context is either an OS thread or a logical task. Code running inside
//! [`ExecutionContext::scope`] sees the task identity for every poll, no matter
//! which worker thread the runtime moves it to. Everything else falls back to
//! the calling thread. Unscoped tasks that share a runtime worker thread
//! therefore share its context.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use tracing::debug;

tokio::task_local! {
	static TASK_CONTEXT: ExecutionContext;
}

static NEXT_TASK_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifier for one logical execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
	Thread(ThreadId),
	Task(u64),
}

impl ExecutionContext {
	/// Resolves the context of the caller.
	pub fn current() -> Self {
		TASK_CONTEXT.try_with(|ctx| *ctx).unwrap_or_else(|_| {
			let ctx = Self::Thread(std::thread::current().id());
			if tokio::runtime::Handle::try_current().is_ok() {
				debug!(context = %ctx, "Resolved thread context inside async runtime; wrap the task in ExecutionContext::scope");
			}
			ctx
		})
	}

	/// Allocates a fresh task context. Pair with [`ExecutionContext::scope`].
	pub fn new_task() -> Self {
		Self::Task(NEXT_TASK_CONTEXT.fetch_add(1, Ordering::Relaxed))
	}

	/// Runs `future` with `self` as the current context.
	pub async fn scope<F>(self, future: F) -> F::Output
	where
		F: Future,
	{
		TASK_CONTEXT.scope(self, future).await
	}

	/// Runs `f` synchronously with `self` as the current context.
	pub fn sync_scope<F, R>(self, f: F) -> R
	where
		F: FnOnce() -> R,
	{
		TASK_CONTEXT.sync_scope(self, f)
	}
}

impl fmt::Display for ExecutionContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Thread(id) => write!(f, "thread:{id:?}"),
			Self::Task(id) => write!(f, "task:{id}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io;
	use std::sync::{Arc, Mutex};

	#[test]
	fn test_current_defaults_to_thread() {
		let ctx = ExecutionContext::current();
		assert_eq!(ctx, ExecutionContext::Thread(std::thread::current().id()));
	}

	#[test]
	fn test_threads_get_distinct_contexts() {
		let here = ExecutionContext::current();
		let there = std::thread::spawn(ExecutionContext::current).join().unwrap();
		assert_ne!(here, there);
	}

	#[test]
	fn test_new_task_contexts_are_unique() {
		let a = ExecutionContext::new_task();
		let b = ExecutionContext::new_task();
		assert_ne!(a, b);
	}

	#[test]
	fn test_sync_scope_overrides_thread() {
		let task = ExecutionContext::new_task();
		let seen = task.sync_scope(ExecutionContext::current);
		assert_eq!(seen, task);
		assert_ne!(ExecutionContext::current(), task);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_scope_survives_await_points() {
		let task = ExecutionContext::new_task();
		let seen = task
			.scope(async {
				let before = ExecutionContext::current();
				tokio::task::yield_now().await;
				let after = ExecutionContext::current();
				(before, after)
			})
			.await;
		assert_eq!(seen, (task, task));
	}

	#[derive(Clone, Default)]
	struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

	impl io::Write for CapturedLogs {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	impl CapturedLogs {
		fn contents(&self) -> String {
			String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
		}
	}

	fn resolve_with_logs<F: FnOnce() -> ExecutionContext>(f: F) -> (ExecutionContext, String) {
		let logs = CapturedLogs::default();
		let writer = logs.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_max_level(tracing::Level::DEBUG)
			.with_ansi(false)
			.with_writer(move || writer.clone())
			.finish();
		let ctx = tracing::subscriber::with_default(subscriber, f);
		(ctx, logs.contents())
	}

	#[tokio::test]
	async fn test_unscoped_task_falls_back_to_thread_with_debug_log() {
		let (ctx, logs) = resolve_with_logs(ExecutionContext::current);

		assert_eq!(ctx, ExecutionContext::Thread(std::thread::current().id()));
		assert!(logs.contains("Resolved thread context inside async runtime"));
	}

	#[tokio::test]
	async fn test_scoped_task_resolves_without_debug_log() {
		let task = ExecutionContext::new_task();
		let (ctx, logs) = resolve_with_logs(|| task.sync_scope(ExecutionContext::current));

		assert_eq!(ctx, task);
		assert!(logs.is_empty());
	}

	#[test]
	fn test_thread_outside_runtime_resolves_without_debug_log() {
		let (ctx, logs) = resolve_with_logs(ExecutionContext::current);

		assert!(matches!(ctx, ExecutionContext::Thread(_)));
		assert!(logs.is_empty());
	}

	#[test]
	fn test_display() {
		assert!(ExecutionContext::new_task().to_string().starts_with("task:"));
		assert!(ExecutionContext::current().to_string().starts_with("thread:"));
	}
}
