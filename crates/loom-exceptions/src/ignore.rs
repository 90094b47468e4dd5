// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ignore policies consulted before a record is attached or queued.

use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Decides which errors are dropped instead of reported.
pub trait IgnorePolicy: Send + Sync {
	/// Returns true when errors of `kind` should not be reported.
	fn should_ignore(&self, kind: &str) -> bool;

	/// Returns true when transactions in `namespace` should never be queued.
	fn should_ignore_namespace(&self, _namespace: &str) -> bool {
		false
	}
}

impl<F> IgnorePolicy for F
where
	F: Fn(&str) -> bool + Send + Sync,
{
	fn should_ignore(&self, kind: &str) -> bool {
		self(kind)
	}
}

/// Static lists of error kinds and namespaces to drop.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
	errors: HashSet<String>,
	namespaces: HashSet<String>,
}

impl IgnoreList {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_errors<I, S>(mut self, kinds: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.errors.extend(kinds.into_iter().map(Into::into));
		self
	}

	pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.namespaces.extend(namespaces.into_iter().map(Into::into));
		self
	}
}

impl IgnorePolicy for IgnoreList {
	fn should_ignore(&self, kind: &str) -> bool {
		self.errors.contains(kind)
	}

	fn should_ignore_namespace(&self, namespace: &str) -> bool {
		self.namespaces.contains(namespace)
	}
}

/// How many records of one transaction the ignore policy is asked about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreScope {
	/// Every record is checked on its own.
	#[default]
	EachRecord,
	/// Only the first record is checked; later ones inherit its verdict.
	FirstRecord,
}

impl fmt::Display for IgnoreScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::EachRecord => write!(f, "each_record"),
			Self::FirstRecord => write!(f, "first_record"),
		}
	}
}

impl FromStr for IgnoreScope {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"each_record" => Ok(Self::EachRecord),
			"first_record" => Ok(Self::FirstRecord),
			_ => Err(ConfigError::InvalidValue {
				key: "ignore_scope".to_string(),
				message: format!("unknown scope '{s}'"),
			}),
		}
	}
}

/// Asks the policy about an error kind. A panicking policy counts as "keep".
pub(crate) fn consult_kind(policy: &dyn IgnorePolicy, kind: &str) -> bool {
	panic::catch_unwind(AssertUnwindSafe(|| policy.should_ignore(kind))).unwrap_or_else(|_| {
		warn!(kind = %kind, "Ignore policy panicked, reporting error anyway");
		false
	})
}

/// Asks the policy about a namespace. A panicking policy counts as "keep".
pub(crate) fn consult_namespace(policy: &dyn IgnorePolicy, namespace: &str) -> bool {
	panic::catch_unwind(AssertUnwindSafe(|| policy.should_ignore_namespace(namespace)))
		.unwrap_or_else(|_| {
			warn!(namespace = %namespace, "Ignore policy panicked, keeping namespace");
			false
		})
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_ignore_list_matches_exact_kind() {
		let list = IgnoreList::new().with_errors(["NotFound", "Unauthorized"]);
		assert!(list.should_ignore("NotFound"));
		assert!(!list.should_ignore("NotFoundish"));
		assert!(!list.should_ignore_namespace("web"));
	}

	#[test]
	fn test_ignore_list_namespaces() {
		let list = IgnoreList::new().with_namespaces(["healthcheck"]);
		assert!(list.should_ignore_namespace("healthcheck"));
		assert!(!list.should_ignore("anything"));
	}

	#[test]
	fn test_closure_policy() {
		let policy = |kind: &str| kind.starts_with("Transient");
		assert!(consult_kind(&policy, "TransientNetwork"));
		assert!(!consult_kind(&policy, "Fatal"));
	}

	#[test]
	fn test_panicking_policy_keeps_error() {
		let policy = |_: &str| -> bool { panic!("bad policy") };
		assert!(!consult_kind(&policy, "Anything"));
	}

	#[test]
	fn test_unknown_scope_rejected() {
		assert!("sometimes".parse::<IgnoreScope>().is_err());
	}

	proptest! {
		#[test]
		fn ignore_scope_roundtrip(scope in prop_oneof![
			Just(IgnoreScope::EachRecord),
			Just(IgnoreScope::FirstRecord),
		]) {
			let parsed: IgnoreScope = scope.to_string().parse().unwrap();
			prop_assert_eq!(scope, parsed);
		}
	}
}
