// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transactions: units of host work that errors are correlated with.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breadcrumb::Breadcrumb;
use crate::error::{CoreError, Result};
use crate::record::ErrorRecord;
use crate::value::TagValue;

/// Namespace used when neither the caller nor configuration picks one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Breadcrumbs kept per transaction unless configured otherwise.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 20;

/// Unique identifier for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}
}

impl Default for TransactionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for TransactionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for TransactionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
	Open,
	Closed,
}

impl fmt::Display for TransactionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Open => write!(f, "open"),
			Self::Closed => write!(f, "closed"),
		}
	}
}

impl FromStr for TransactionState {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"open" => Ok(Self::Open),
			"closed" => Ok(Self::Closed),
			_ => Err(CoreError::InvalidTransactionState(s.to_string())),
		}
	}
}

/// A tracked unit of work.
///
/// Every mutator checks the lifecycle state first: once [`Transaction::close`]
/// has succeeded, all further mutation returns [`CoreError::TransactionClosed`]
/// and the transaction is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	id: TransactionId,
	namespace: String,
	action: Option<String>,
	errors: Vec<ErrorRecord>,
	tags: BTreeMap<String, TagValue>,
	params: serde_json::Map<String, serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	custom_data: Option<serde_json::Value>,
	breadcrumbs: VecDeque<Breadcrumb>,
	#[serde(skip)]
	max_breadcrumbs: usize,
	state: TransactionState,
	started_at: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	closed_at: Option<DateTime<Utc>>,
}

impl Transaction {
	/// Opens a new transaction in the given namespace.
	pub fn new(namespace: impl Into<String>) -> Self {
		Self {
			id: TransactionId::new(),
			namespace: namespace.into(),
			action: None,
			errors: Vec::new(),
			tags: BTreeMap::new(),
			params: serde_json::Map::new(),
			custom_data: None,
			breadcrumbs: VecDeque::new(),
			max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
			state: TransactionState::Open,
			started_at: Utc::now(),
			closed_at: None,
		}
	}

	pub fn with_max_breadcrumbs(mut self, max: usize) -> Self {
		self.max_breadcrumbs = max;
		self
	}

	pub fn id(&self) -> TransactionId {
		self.id
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn action(&self) -> Option<&str> {
		self.action.as_deref()
	}

	pub fn errors(&self) -> &[ErrorRecord] {
		&self.errors
	}

	pub fn tags(&self) -> &BTreeMap<String, TagValue> {
		&self.tags
	}

	pub fn params(&self) -> &serde_json::Map<String, serde_json::Value> {
		&self.params
	}

	pub fn custom_data(&self) -> Option<&serde_json::Value> {
		self.custom_data.as_ref()
	}

	pub fn breadcrumbs(&self) -> impl Iterator<Item = &Breadcrumb> {
		self.breadcrumbs.iter()
	}

	pub fn state(&self) -> TransactionState {
		self.state
	}

	pub fn is_closed(&self) -> bool {
		self.state == TransactionState::Closed
	}

	pub fn started_at(&self) -> DateTime<Utc> {
		self.started_at
	}

	pub fn closed_at(&self) -> Option<DateTime<Utc>> {
		self.closed_at
	}

	pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
		self.ensure_open()?;
		let namespace = namespace.into();
		if namespace.trim().is_empty() {
			return Err(CoreError::InvalidNamespace(namespace));
		}
		self.namespace = namespace;
		Ok(())
	}

	pub fn set_action(&mut self, action: impl Into<String>) -> Result<()> {
		self.ensure_open()?;
		self.action = Some(action.into());
		Ok(())
	}

	pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Result<()> {
		self.ensure_open()?;
		let key = key.into();
		if key.is_empty() {
			return Err(CoreError::InvalidTagKey(key));
		}
		self.tags.insert(key, value.into().truncated());
		Ok(())
	}

	pub fn set_param(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
		self.ensure_open()?;
		self.params.insert(key.into(), value);
		Ok(())
	}

	pub fn set_custom_data(&mut self, data: serde_json::Value) -> Result<()> {
		self.ensure_open()?;
		self.custom_data = Some(data);
		Ok(())
	}

	/// Appends a breadcrumb, dropping the oldest once the trail is full.
	pub fn add_breadcrumb(&mut self, breadcrumb: Breadcrumb) -> Result<()> {
		self.ensure_open()?;
		if self.max_breadcrumbs == 0 {
			return Ok(());
		}
		while self.breadcrumbs.len() >= self.max_breadcrumbs {
			self.breadcrumbs.pop_front();
		}
		self.breadcrumbs.push_back(breadcrumb);
		Ok(())
	}

	/// Takes ownership of a record. A namespace carried by the record moves the
	/// whole transaction into that namespace.
	pub fn add_error(&mut self, record: ErrorRecord) -> Result<()> {
		self.ensure_open()?;
		if let Some(namespace) = record.namespace() {
			if !namespace.trim().is_empty() {
				self.namespace = namespace.to_string();
			}
		}
		self.errors.push(record);
		Ok(())
	}

	/// Seals the transaction.
	pub fn close(&mut self) -> Result<()> {
		self.ensure_open()?;
		self.state = TransactionState::Closed;
		self.closed_at = Some(Utc::now());
		Ok(())
	}

	fn ensure_open(&self) -> Result<()> {
		match self.state {
			TransactionState::Open => Ok(()),
			TransactionState::Closed => Err(CoreError::TransactionClosed(self.id.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_new_transaction_is_open_and_empty() {
		let txn = Transaction::new(DEFAULT_NAMESPACE);
		assert_eq!(txn.state(), TransactionState::Open);
		assert_eq!(txn.namespace(), "default");
		assert!(txn.action().is_none());
		assert!(txn.errors().is_empty());
		assert!(txn.closed_at().is_none());
	}

	#[test]
	fn test_multiple_errors_keep_order() {
		let mut txn = Transaction::new("web");
		txn.add_error(ErrorRecord::new("First", "one")).unwrap();
		txn.add_error(ErrorRecord::new("Second", "two")).unwrap();

		let kinds: Vec<_> = txn.errors().iter().map(|e| e.kind()).collect();
		assert_eq!(kinds, ["First", "Second"]);
	}

	#[test]
	fn test_record_namespace_overrides_transaction() {
		let mut txn = Transaction::new("web");
		txn.add_error(ErrorRecord::new("Boom", "x").with_namespace("admin"))
			.unwrap();
		assert_eq!(txn.namespace(), "admin");
	}

	#[test]
	fn test_closed_transaction_rejects_every_mutation() {
		let mut txn = Transaction::new("web");
		txn.add_error(ErrorRecord::new("Boom", "x")).unwrap();
		txn.close().unwrap();
		let snapshot = txn.clone();

		assert!(matches!(txn.set_namespace("admin"), Err(CoreError::TransactionClosed(_))));
		assert!(matches!(txn.set_action("a"), Err(CoreError::TransactionClosed(_))));
		assert!(matches!(txn.set_tag("k", "v"), Err(CoreError::TransactionClosed(_))));
		assert!(matches!(
			txn.set_param("k", serde_json::json!(1)),
			Err(CoreError::TransactionClosed(_))
		));
		assert!(matches!(
			txn.set_custom_data(serde_json::json!({})),
			Err(CoreError::TransactionClosed(_))
		));
		assert!(matches!(
			txn.add_breadcrumb(Breadcrumb::new("c", "a")),
			Err(CoreError::TransactionClosed(_))
		));
		assert!(matches!(
			txn.add_error(ErrorRecord::new("Late", "y")),
			Err(CoreError::TransactionClosed(_))
		));
		assert!(matches!(txn.close(), Err(CoreError::TransactionClosed(_))));

		assert_eq!(txn, snapshot);
	}

	#[test]
	fn test_empty_namespace_rejected() {
		let mut txn = Transaction::new("web");
		assert!(matches!(txn.set_namespace("  "), Err(CoreError::InvalidNamespace(_))));
		assert_eq!(txn.namespace(), "web");
	}

	#[test]
	fn test_empty_tag_key_rejected() {
		let mut txn = Transaction::new("web");
		assert!(matches!(txn.set_tag("", "v"), Err(CoreError::InvalidTagKey(_))));
		assert!(txn.tags().is_empty());
	}

	#[test]
	fn test_breadcrumbs_bounded() {
		let mut txn = Transaction::new("web").with_max_breadcrumbs(3);
		for i in 0..5 {
			txn.add_breadcrumb(Breadcrumb::new("step", format!("step_{i}")))
				.unwrap();
		}
		let actions: Vec<_> = txn.breadcrumbs().map(|b| b.action.as_str()).collect();
		assert_eq!(actions, ["step_2", "step_3", "step_4"]);
	}

	#[test]
	fn test_zero_breadcrumbs_disables_trail() {
		let mut txn = Transaction::new("web").with_max_breadcrumbs(0);
		txn.add_breadcrumb(Breadcrumb::new("step", "a")).unwrap();
		assert_eq!(txn.breadcrumbs().count(), 0);
	}

	proptest! {
		#[test]
		fn transaction_state_roundtrip(state in prop_oneof![
			Just(TransactionState::Open),
			Just(TransactionState::Closed),
		]) {
			let parsed: TransactionState = state.to_string().parse().unwrap();
			prop_assert_eq!(state, parsed);
		}

		#[test]
		fn transaction_id_roundtrip(uuid_bytes in any::<[u8; 16]>()) {
			let id = TransactionId(Uuid::from_bytes(uuid_bytes));
			let parsed: TransactionId = id.to_string().parse().unwrap();
			prop_assert_eq!(id, parsed);
		}

		#[test]
		fn closed_transaction_errors_are_frozen(count in 0usize..8, late in 1usize..4) {
			let mut txn = Transaction::new("web");
			for i in 0..count {
				txn.add_error(ErrorRecord::new("E", i.to_string())).unwrap();
			}
			txn.close().unwrap();
			for _ in 0..late {
				prop_assert!(txn.add_error(ErrorRecord::new("Late", "x")).is_err());
			}
			prop_assert_eq!(txn.errors().len(), count);
		}
	}
}
