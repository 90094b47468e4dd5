// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Metadata builder handed to capture callbacks.

use std::panic::{self, AssertUnwindSafe};

use loom_exceptions_core::{Breadcrumb, TagValue, Transaction};
use tracing::warn;

/// Collects namespace, action, tags and params from a capture callback.
///
/// Changes are buffered and only applied to the owning transaction after the
/// callback returns, so a callback that panics halfway leaves no partial state.
///
/// ```ignore
/// agent.set_error_with(record, |meta| {
///     meta.set_namespace("admin").set_tag("account_id", 42);
/// })?;
/// ```
#[derive(Debug, Default)]
pub struct Metadata {
	namespace: Option<String>,
	action: Option<String>,
	tags: Vec<(String, TagValue)>,
	params: Vec<(String, serde_json::Value)>,
	custom_data: Option<serde_json::Value>,
	breadcrumbs: Vec<Breadcrumb>,
}

impl Metadata {
	pub fn set_namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
		self.namespace = Some(namespace.into());
		self
	}

	pub fn set_action(&mut self, action: impl Into<String>) -> &mut Self {
		self.action = Some(action.into());
		self
	}

	pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) -> &mut Self {
		self.tags.push((key.into(), value.into()));
		self
	}

	pub fn set_tags<K, V>(&mut self, tags: impl IntoIterator<Item = (K, V)>) -> &mut Self
	where
		K: Into<String>,
		V: Into<TagValue>,
	{
		self
			.tags
			.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
		self
	}

	pub fn set_param(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
		self.params.push((key.into(), value));
		self
	}

	/// Merges every entry of a JSON object into the params. Anything other
	/// than an object is dropped with a warning.
	pub fn set_params(&mut self, params: serde_json::Value) -> &mut Self {
		match params {
			serde_json::Value::Object(map) => self.params.extend(map),
			other => warn!(kind = json_kind(&other), "Ignoring params that are not a JSON object"),
		}
		self
	}

	pub fn set_custom_data(&mut self, data: serde_json::Value) -> &mut Self {
		self.custom_data = Some(data);
		self
	}

	pub fn add_breadcrumb(&mut self, breadcrumb: Breadcrumb) -> &mut Self {
		self.breadcrumbs.push(breadcrumb);
		self
	}

	/// Runs a capture callback, returning `None` if it panicked.
	pub(crate) fn collect<F>(metadata_fn: F) -> Option<Self>
	where
		F: FnOnce(&mut Metadata),
	{
		let result = panic::catch_unwind(AssertUnwindSafe(|| {
			let mut metadata = Metadata::default();
			metadata_fn(&mut metadata);
			metadata
		}));

		match result {
			Ok(metadata) => Some(metadata),
			Err(_) => {
				warn!("Metadata callback panicked, capturing without metadata");
				None
			}
		}
	}

	/// Applies every buffered change. Entries the transaction rejects are
	/// logged and skipped; the rest still land.
	pub(crate) fn apply(self, transaction: &mut Transaction) {
		let id = transaction.id();

		if let Some(namespace) = self.namespace {
			if let Err(e) = transaction.set_namespace(namespace) {
				warn!(transaction_id = %id, error = %e, "Dropping namespace from metadata");
			}
		}
		if let Some(action) = self.action {
			if let Err(e) = transaction.set_action(action) {
				warn!(transaction_id = %id, error = %e, "Dropping action from metadata");
			}
		}
		for (key, value) in self.tags {
			if let Err(e) = transaction.set_tag(key, value) {
				warn!(transaction_id = %id, error = %e, "Dropping tag from metadata");
			}
		}
		for (key, value) in self.params {
			if let Err(e) = transaction.set_param(key, value) {
				warn!(transaction_id = %id, error = %e, "Dropping param from metadata");
			}
		}
		if let Some(data) = self.custom_data {
			if let Err(e) = transaction.set_custom_data(data) {
				warn!(transaction_id = %id, error = %e, "Dropping custom data from metadata");
			}
		}
		for breadcrumb in self.breadcrumbs {
			if let Err(e) = transaction.add_breadcrumb(breadcrumb) {
				warn!(transaction_id = %id, error = %e, "Dropping breadcrumb from metadata");
			}
		}
	}
}

fn json_kind(value: &serde_json::Value) -> &'static str {
	match value {
		serde_json::Value::Null => "null",
		serde_json::Value::Bool(_) => "bool",
		serde_json::Value::Number(_) => "number",
		serde_json::Value::String(_) => "string",
		serde_json::Value::Array(_) => "array",
		serde_json::Value::Object(_) => "object",
	}
}
