// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Manual error reporting: `set_error` and `send_error`.

use loom_exceptions_core::ErrorRecord;
use tracing::{debug, warn};

use crate::agent::ErrorAgent;
use crate::context::ExecutionContext;
use crate::error::{Result, SdkError};
use crate::handle::TransactionHandle;
use crate::ignore::consult_kind;
use crate::metadata::Metadata;

impl ErrorAgent {
	/// Attaches `record` to the transaction of the calling context.
	///
	/// Returns [`SdkError::NoActiveTransaction`] when the context has none,
	/// including after shutdown; by convention callers ignore that. Nothing
	/// else is ever returned as an error: internal failures are logged.
	pub fn set_error(&self, record: ErrorRecord) -> Result<()> {
		self.set_error_in(ExecutionContext::current(), record, None::<fn(&mut Metadata)>)
	}

	/// Like [`ErrorAgent::set_error`], letting `metadata_fn` adjust the owning
	/// transaction's namespace, action, tags and params.
	pub fn set_error_with<F>(&self, record: ErrorRecord, metadata_fn: F) -> Result<()>
	where
		F: FnOnce(&mut Metadata),
	{
		self.set_error_in(ExecutionContext::current(), record, Some(metadata_fn))
	}

	pub fn set_error_in<F>(
		&self,
		context: ExecutionContext,
		record: ErrorRecord,
		metadata_fn: Option<F>,
	) -> Result<()>
	where
		F: FnOnce(&mut Metadata),
	{
		let handle = self
			.inner
			.registry
			.current_in(context)
			.ok_or(SdkError::NoActiveTransaction)?;

		if self.check_closed().is_err() {
			debug!(transaction_id = %handle.id(), kind = %record.kind(), "Agent shut down, dropping error");
			return Ok(());
		}

		self.attach(&handle, record, metadata_fn);
		Ok(())
	}

	/// Reports `record` in a transaction of its own, closed and queued at once.
	///
	/// Does not look at or touch the calling context's transaction. For code
	/// with no ambient unit of work: cron jobs, one-off scripts, background
	/// threads.
	pub fn send_error(&self, record: ErrorRecord) {
		self.send_with(record, None::<fn(&mut Metadata)>);
	}

	/// Like [`ErrorAgent::send_error`], letting `metadata_fn` set the namespace,
	/// action, tags and params of the synthesized transaction.
	pub fn send_error_with<F>(&self, record: ErrorRecord, metadata_fn: F)
	where
		F: FnOnce(&mut Metadata),
	{
		self.send_with(record, Some(metadata_fn));
	}

	/// Attaches to the current transaction when there is one, otherwise sends
	/// standalone.
	pub(crate) fn report(&self, record: ErrorRecord) {
		match self.current() {
			Some(handle) if self.check_closed().is_ok() => {
				self.attach(&handle, record, None::<fn(&mut Metadata)>)
			}
			_ => self.send_error(record),
		}
	}

	fn attach<F>(&self, handle: &TransactionHandle, record: ErrorRecord, metadata_fn: Option<F>)
	where
		F: FnOnce(&mut Metadata),
	{
		let kind = record.kind().to_string();
		let ignored = handle.ignore_verdict(self.inner.config.ignore_scope, || {
			consult_kind(self.inner.ignore_policy.as_ref(), &kind)
		});
		if ignored {
			debug!(transaction_id = %handle.id(), kind = %kind, "Ignoring error");
			return;
		}

		let metadata = metadata_fn.and_then(Metadata::collect);
		let result = handle.update(|txn| {
			if let Some(metadata) = metadata {
				metadata.apply(txn);
			}
			txn.add_error(record)
		});

		match result {
			Ok(()) => debug!(transaction_id = %handle.id(), kind = %kind, "Error attached"),
			Err(e) => warn!(transaction_id = %handle.id(), error = %e, "Failed to attach error"),
		}
	}

	fn send_with<F>(&self, record: ErrorRecord, metadata_fn: Option<F>)
	where
		F: FnOnce(&mut Metadata),
	{
		if self.check_closed().is_err() {
			debug!(kind = %record.kind(), "Agent shut down, dropping error");
			return;
		}

		let kind = record.kind().to_string();
		if consult_kind(self.inner.ignore_policy.as_ref(), &kind) {
			debug!(kind = %kind, "Ignoring error");
			return;
		}

		let mut transaction = self.new_transaction();
		if let Some(metadata) = metadata_fn.and_then(Metadata::collect) {
			metadata.apply(&mut transaction);
		}

		let sealed = transaction
			.add_error(record)
			.and_then(|()| transaction.close());
		if let Err(e) = sealed {
			warn!(transaction_id = %transaction.id(), error = %e, "Failed to seal standalone transaction");
			return;
		}

		debug!(
			transaction_id = %transaction.id(),
			namespace = %transaction.namespace(),
			kind = %kind,
			"Sending standalone error"
		);
		self.dispatch(transaction);
	}
}
