// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared handle to an open transaction.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use loom_exceptions_core::{
	Breadcrumb, Result as CoreResult, TagValue, Transaction, TransactionId, TransactionState,
};

use crate::ignore::IgnoreScope;

struct HandleState {
	transaction: Transaction,
	/// Verdict of the first ignore check, used under [`IgnoreScope::FirstRecord`].
	first_verdict: Option<bool>,
}

/// Cheaply clonable reference to a transaction owned by the registry.
///
/// Host code reaches the transaction of its own context through
/// [`crate::ErrorAgent::current`] and mutates it through this handle.
#[derive(Clone)]
pub struct TransactionHandle {
	id: TransactionId,
	state: Arc<Mutex<HandleState>>,
}

impl TransactionHandle {
	pub fn new(transaction: Transaction) -> Self {
		Self {
			id: transaction.id(),
			state: Arc::new(Mutex::new(HandleState {
				transaction,
				first_verdict: None,
			})),
		}
	}

	pub fn id(&self) -> TransactionId {
		self.id
	}

	pub fn namespace(&self) -> String {
		self.lock().transaction.namespace().to_string()
	}

	pub fn action(&self) -> Option<String> {
		self.lock().transaction.action().map(str::to_string)
	}

	pub fn state(&self) -> TransactionState {
		self.lock().transaction.state()
	}

	pub fn error_count(&self) -> usize {
		self.lock().transaction.errors().len()
	}

	/// Copy of the transaction as it stands.
	pub fn snapshot(&self) -> Transaction {
		self.lock().transaction.clone()
	}

	/// Runs `f` with exclusive access to the transaction.
	pub fn update<R>(&self, f: impl FnOnce(&mut Transaction) -> CoreResult<R>) -> CoreResult<R> {
		f(&mut self.lock().transaction)
	}

	pub fn set_namespace(&self, namespace: impl Into<String>) -> CoreResult<()> {
		self.update(|txn| txn.set_namespace(namespace))
	}

	pub fn set_action(&self, action: impl Into<String>) -> CoreResult<()> {
		self.update(|txn| txn.set_action(action))
	}

	pub fn set_tag(&self, key: impl Into<String>, value: impl Into<TagValue>) -> CoreResult<()> {
		self.update(|txn| txn.set_tag(key, value))
	}

	pub fn set_param(&self, key: impl Into<String>, value: serde_json::Value) -> CoreResult<()> {
		self.update(|txn| txn.set_param(key, value))
	}

	pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> CoreResult<()> {
		self.update(|txn| txn.add_breadcrumb(breadcrumb))
	}

	/// Decides whether a record should be dropped, honouring the ignore scope.
	pub(crate) fn ignore_verdict(&self, scope: IgnoreScope, check: impl FnOnce() -> bool) -> bool {
		match scope {
			IgnoreScope::EachRecord => check(),
			IgnoreScope::FirstRecord => {
				let mut state = self.lock();
				*state.first_verdict.get_or_insert_with(check)
			}
		}
	}

	fn lock(&self) -> MutexGuard<'_, HandleState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl std::fmt::Debug for TransactionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransactionHandle").field("id", &self.id).finish()
	}
}
