// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Guarded execution: observe a failure, report it, hand it back untouched.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use loom_exceptions_core::ErrorRecord;
use tracing::debug;

use crate::agent::ErrorAgent;

/// Kind recorded for panics caught by a guard.
pub const PANIC_KIND: &str = "panic";

impl ErrorAgent {
	/// Runs `work`, reporting an `Err` or a panic before passing it on.
	///
	/// The error is returned exactly as `work` produced it and a panic is
	/// resumed with its original payload. The report goes to the calling
	/// context's transaction when there is one and is sent standalone
	/// otherwise. Cancelled tokio joins are passed through without a report.
	///
	/// Any printable error works, boxed trait objects included. Boxed
	/// `dyn Error` values keep their cause chain in the record.
	///
	/// ```ignore
	/// let rows = agent.listen_for_error(|| import_file(&path))?;
	/// ```
	pub fn listen_for_error<T, E, F>(&self, work: F) -> Result<T, E>
	where
		F: FnOnce() -> Result<T, E>,
		E: fmt::Display + fmt::Debug + 'static,
	{
		match panic::catch_unwind(AssertUnwindSafe(work)) {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(error)) => {
				self.observe(&error);
				Err(error)
			}
			Err(payload) => {
				self.report(panic_record(payload.as_ref()));
				panic::resume_unwind(payload)
			}
		}
	}

	/// Async form of [`ErrorAgent::listen_for_error`].
	///
	/// Dropping the returned future cancels `work` without reporting anything.
	/// Run it inside [`crate::ExecutionContext::scope`] so the report finds the
	/// task's transaction on multi-threaded runtimes.
	pub async fn listen_for_error_async<T, E, Fut>(&self, work: Fut) -> Result<T, E>
	where
		Fut: Future<Output = Result<T, E>>,
		E: fmt::Display + fmt::Debug + 'static,
	{
		match AssertUnwindSafe(work).catch_unwind().await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(error)) => {
				self.observe(&error);
				Err(error)
			}
			Err(payload) => {
				self.report(panic_record(payload.as_ref()));
				panic::resume_unwind(payload)
			}
		}
	}

	fn observe<E>(&self, error: &E)
	where
		E: fmt::Display + fmt::Debug + 'static,
	{
		let any: &dyn Any = error;
		if is_cancellation(any) {
			debug!("Cancellation passed through guard without report");
			return;
		}
		let record = if let Some(boxed) = any.downcast_ref::<Box<dyn Error + Send + Sync>>() {
			ErrorRecord::from_dyn_error(boxed.as_ref())
		} else if let Some(boxed) = any.downcast_ref::<Box<dyn Error + Send>>() {
			ErrorRecord::from_dyn_error(boxed.as_ref())
		} else if let Some(boxed) = any.downcast_ref::<Box<dyn Error>>() {
			ErrorRecord::from_dyn_error(boxed.as_ref())
		} else {
			ErrorRecord::from_display(error)
		};
		self.report(self.with_backtrace(record));
	}
}

fn is_cancellation(error: &dyn Any) -> bool {
	error
		.downcast_ref::<tokio::task::JoinError>()
		.is_some_and(|join| join.is_cancelled())
}

fn panic_record(payload: &(dyn Any + Send)) -> ErrorRecord {
	let message = if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	};
	ErrorRecord::new(PANIC_KIND, message)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::AgentConfig;
	use crate::context::ExecutionContext;
	use crate::transport::TracingTransport;
	use std::fmt;
	use std::sync::Arc;
	use std::time::Duration;

	#[derive(Debug, PartialEq)]
	struct ImportError(&'static str);

	impl fmt::Display for ImportError {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "import failed: {}", self.0)
		}
	}

	impl std::error::Error for ImportError {}

	fn agent() -> ErrorAgent {
		ErrorAgent::builder()
			.config(AgentConfig {
				capture_backtraces: false,
				..Default::default()
			})
			.transport(Arc::new(TracingTransport))
			.build()
			.unwrap()
	}

	#[test]
	fn test_success_returns_value_without_report() {
		let agent = agent();
		let result: Result<i32, ImportError> = agent.listen_for_error(|| Ok(42));

		assert_eq!(result, Ok(42));
		assert_eq!(agent.flusher().queue_len(), 0);
	}

	#[test]
	fn test_error_returned_unchanged_and_sent_standalone() {
		let agent = agent();
		let result: Result<(), ImportError> = agent.listen_for_error(|| Err(ImportError("row 3")));

		assert_eq!(result, Err(ImportError("row 3")));
		let pending = agent.flusher().pending();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].errors().len(), 1);
		assert_eq!(pending[0].errors()[0].kind(), "ImportError");
		assert_eq!(pending[0].errors()[0].message(), "import failed: row 3");
	}

	#[test]
	fn test_error_attached_to_active_transaction() {
		let agent = agent();
		let txn = agent.open_transaction("background", Some("ImportJob")).unwrap();

		let result: Result<(), ImportError> = agent.listen_for_error(|| Err(ImportError("row 3")));

		assert!(result.is_err());
		assert_eq!(txn.error_count(), 1);
		assert_eq!(agent.flusher().queue_len(), 0);
	}

	#[test]
	fn test_panic_is_reported_and_resumed() {
		let agent = agent();
		let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
			let _: Result<(), ImportError> = agent.listen_for_error(|| panic!("worker died"));
		}));

		let payload = outcome.unwrap_err();
		assert_eq!(payload.downcast_ref::<&str>(), Some(&"worker died"));

		let pending = agent.flusher().pending();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].errors()[0].kind(), PANIC_KIND);
		assert_eq!(pending[0].errors()[0].message(), "worker died");
	}

	#[test]
	fn test_boxed_send_sync_error_is_reported_and_returned() {
		let agent = agent();
		let result: Result<(), Box<dyn Error + Send + Sync>> =
			agent.listen_for_error(|| Err(ImportError("row 7").into()));

		let error = result.unwrap_err();
		assert_eq!(error.downcast_ref::<ImportError>(), Some(&ImportError("row 7")));

		let pending = agent.flusher().pending();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].errors()[0].kind(), "ImportError");
		assert_eq!(pending[0].errors()[0].message(), "import failed: row 7");
	}

	#[test]
	fn test_boxed_string_error_uses_generic_kind() {
		let agent = agent();
		let result: Result<(), Box<dyn Error>> = agent.listen_for_error(|| Err("quota exceeded".into()));

		assert_eq!(result.unwrap_err().to_string(), "quota exceeded");
		let pending = agent.flusher().pending();
		assert_eq!(pending[0].errors()[0].kind(), "Error");
		assert_eq!(pending[0].errors()[0].message(), "quota exceeded");
	}

	#[test]
	fn test_display_only_error_is_reported() {
		#[derive(Debug)]
		struct Refused;

		impl fmt::Display for Refused {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "refused")
			}
		}

		let agent = agent();
		let result: Result<(), Refused> = agent.listen_for_error(|| Err(Refused));

		assert!(result.is_err());
		let pending = agent.flusher().pending();
		assert_eq!(pending[0].errors()[0].kind(), "Refused");
		assert_eq!(pending[0].errors()[0].message(), "refused");
	}

	#[tokio::test]
	async fn test_async_error_reported_in_task_context() {
		let agent = agent();
		let ctx = ExecutionContext::new_task();
		let txn = agent.open_transaction_in(ctx, "web", None).unwrap();

		let result: Result<(), ImportError> = ctx
			.scope(agent.listen_for_error_async(async {
				tokio::task::yield_now().await;
				Err(ImportError("async"))
			}))
			.await;

		assert!(result.is_err());
		assert_eq!(txn.error_count(), 1);
	}

	#[tokio::test]
	async fn test_async_success_without_report() {
		let agent = agent();
		let result: Result<&str, ImportError> = agent.listen_for_error_async(async { Ok("done") }).await;

		assert_eq!(result, Ok("done"));
		assert_eq!(agent.flusher().queue_len(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_dropped_future_reports_nothing() {
		let agent = agent();
		let guarded = agent.listen_for_error_async(async {
			tokio::time::sleep(Duration::from_secs(60)).await;
			Err::<(), _>(ImportError("never"))
		});

		let outcome = tokio::time::timeout(Duration::from_secs(1), guarded).await;

		assert!(outcome.is_err());
		assert_eq!(agent.flusher().queue_len(), 0);
	}

	#[tokio::test]
	async fn test_cancelled_join_passes_through() {
		let agent = agent();
		let task = tokio::spawn(async {
			tokio::time::sleep(Duration::from_secs(60)).await;
		});
		task.abort();

		let result = agent.listen_for_error_async(task).await;

		assert!(result.unwrap_err().is_cancelled());
		assert_eq!(agent.flusher().queue_len(), 0);
	}
}
