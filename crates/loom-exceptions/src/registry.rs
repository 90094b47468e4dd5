// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mapping from execution contexts to their open transaction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use loom_exceptions_core::TransactionState;
use tracing::{debug, trace, warn};

use crate::context::ExecutionContext;
use crate::error::{Result, SdkError};
use crate::handle::TransactionHandle;

/// Process-wide table of active transactions, at most one per context.
///
/// The map itself is behind a mutex; the lock is only held for the lookup or
/// insert, never while a transaction is being mutated.
#[derive(Default)]
pub struct TransactionRegistry {
	bindings: Mutex<HashMap<ExecutionContext, TransactionHandle>>,
}

impl TransactionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the transaction bound to the calling context.
	pub fn current(&self) -> Option<TransactionHandle> {
		self.current_in(ExecutionContext::current())
	}

	/// Returns the open transaction bound to `context`. A binding whose
	/// transaction has already been closed counts as no binding.
	pub fn current_in(&self, context: ExecutionContext) -> Option<TransactionHandle> {
		self
			.lock()
			.get(&context)
			.filter(|handle| handle.state() == TransactionState::Open)
			.cloned()
	}

	/// Binds `handle` to the calling context.
	pub fn bind(&self, handle: TransactionHandle) -> Result<()> {
		self.bind_in(ExecutionContext::current(), handle)
	}

	/// Binds `handle` to `context`, replacing a binding whose transaction is
	/// already closed.
	pub fn bind_in(&self, context: ExecutionContext, handle: TransactionHandle) -> Result<()> {
		let mut bindings = self.lock();
		if let Some(existing) = bindings.get(&context) {
			if existing.state() == TransactionState::Open {
				return Err(SdkError::AlreadyBound {
					context,
					transaction_id: existing.id(),
				});
			}
			warn!(context = %context, transaction_id = %existing.id(), "Replacing closed transaction binding");
		}
		debug!(context = %context, transaction_id = %handle.id(), "Transaction bound");
		bindings.insert(context, handle);
		Ok(())
	}

	/// Removes whichever binding refers to `handle`.
	pub fn unbind(&self, handle: &TransactionHandle) -> Result<()> {
		let mut bindings = self.lock();
		let context = bindings
			.iter()
			.find(|(_, bound)| bound.id() == handle.id())
			.map(|(context, _)| *context)
			.ok_or(SdkError::NotBound(handle.id()))?;
		bindings.remove(&context);
		trace!(context = %context, transaction_id = %handle.id(), "Transaction unbound");
		Ok(())
	}

	/// Removes and returns the binding of `context` if its transaction was
	/// closed without going through the registry.
	pub(crate) fn take_closed_in(&self, context: ExecutionContext) -> Option<TransactionHandle> {
		let mut bindings = self.lock();
		let closed = bindings
			.get(&context)
			.is_some_and(|handle| handle.state() == TransactionState::Closed);
		if closed {
			bindings.remove(&context)
		} else {
			None
		}
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	/// Drops every binding, returning the handles that were still open.
	pub fn drain(&self) -> Vec<TransactionHandle> {
		self.lock().drain().map(|(_, handle)| handle).collect()
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<ExecutionContext, TransactionHandle>> {
		self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
