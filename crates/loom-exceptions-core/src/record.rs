// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Captured failure snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::TagValue;

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
	pub function: Option<String>,
	pub module: Option<String>,
	pub filename: Option<String>,
	pub lineno: Option<u32>,
	/// Whether the frame belongs to application code rather than std or the runtime.
	#[serde(default)]
	pub in_app: bool,
}

/// Ordered frames, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

impl Stacktrace {
	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}
}

/// Immutable snapshot of one captured failure.
///
/// Records are assembled with the `with_*` methods and then handed to a
/// transaction, which takes ownership. There is no way to modify a record
/// once it has been attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
	kind: String,
	message: String,
	#[serde(default)]
	stacktrace: Stacktrace,
	#[serde(default)]
	causes: Vec<String>,
	#[serde(default)]
	tags: BTreeMap<String, TagValue>,
	#[serde(skip_serializing_if = "Option::is_none")]
	namespace: Option<String>,
	captured_at: DateTime<Utc>,
}

impl ErrorRecord {
	pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			message: message.into(),
			stacktrace: Stacktrace::default(),
			causes: Vec::new(),
			tags: BTreeMap::new(),
			namespace: None,
			captured_at: Utc::now(),
		}
	}

	/// Builds a record from any error, using the concrete type name as the kind
	/// and walking the `source()` chain for causes.
	pub fn from_error<E>(error: &E) -> Self
	where
		E: std::error::Error + ?Sized,
	{
		let mut causes = Vec::new();
		let mut source = error.source();
		while let Some(cause) = source {
			causes.push(cause.to_string());
			source = cause.source();
		}

		Self {
			causes,
			..Self::new(short_type_name(std::any::type_name::<E>()), error.to_string())
		}
	}

	/// Builds a record from a type-erased error such as the inside of a
	/// `Box<dyn Error>`. The concrete type name is gone, so the kind is taken
	/// from the leading type name in its `Debug` output, or `Error`.
	pub fn from_dyn_error(error: &(dyn std::error::Error + 'static)) -> Self {
		let record = Self::from_error(error);
		Self {
			kind: debug_kind(&format!("{error:?}")).unwrap_or_else(|| "Error".to_string()),
			..record
		}
	}

	/// Builds a record from anything printable, for failure types that do not
	/// implement `std::error::Error`. No cause chain is available.
	pub fn from_display<E>(error: &E) -> Self
	where
		E: fmt::Display + fmt::Debug + ?Sized,
	{
		Self::new(short_type_name(std::any::type_name::<E>()), error.to_string())
	}

	pub fn with_stacktrace(mut self, stacktrace: Stacktrace) -> Self {
		self.stacktrace = stacktrace;
		self
	}

	pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
		self.tags.insert(key.into(), value.into().truncated());
		self
	}

	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
		self.causes.push(cause.into());
		self
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn stacktrace(&self) -> &Stacktrace {
		&self.stacktrace
	}

	pub fn causes(&self) -> &[String] {
		&self.causes
	}

	pub fn tags(&self) -> &BTreeMap<String, TagValue> {
		&self.tags
	}

	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	pub fn captured_at(&self) -> DateTime<Utc> {
		self.captured_at
	}
}

/// `my_app::db::QueryError<T>` -> `QueryError`
fn short_type_name(full: &str) -> String {
	let base = full.split('<').next().unwrap_or(full);
	base.rsplit("::").next().unwrap_or(base).to_string()
}

/// `QueryError { code: 3 }` -> `QueryError`; `"boom"` -> None
fn debug_kind(debug: &str) -> Option<String> {
	let ident: String = debug
		.chars()
		.take_while(|c| c.is_alphanumeric() || *c == '_')
		.collect();
	ident
		.chars()
		.next()
		.filter(char::is_ascii_uppercase)
		.map(|_| ident.clone())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fmt;

	#[derive(Debug)]
	struct QueryError {
		source: std::io::Error,
	}

	impl fmt::Display for QueryError {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "query failed")
		}
	}

	impl std::error::Error for QueryError {
		fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
			Some(&self.source)
		}
	}

	#[test]
	fn test_from_error_uses_short_type_name() {
		let err = QueryError {
			source: std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out"),
		};
		let record = ErrorRecord::from_error(&err);

		assert_eq!(record.kind(), "QueryError");
		assert_eq!(record.message(), "query failed");
		assert_eq!(record.causes(), ["socket timed out".to_string()]);
	}

	#[test]
	fn test_from_dyn_error_reads_kind_from_debug() {
		let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(QueryError {
			source: std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out"),
		});
		let record = ErrorRecord::from_dyn_error(boxed.as_ref());

		assert_eq!(record.kind(), "QueryError");
		assert_eq!(record.message(), "query failed");
		assert_eq!(record.causes(), ["socket timed out".to_string()]);
	}

	#[test]
	fn test_from_dyn_error_falls_back_for_string_errors() {
		let boxed: Box<dyn std::error::Error> = "disk full".into();
		let record = ErrorRecord::from_dyn_error(boxed.as_ref());

		assert_eq!(record.kind(), "Error");
		assert_eq!(record.message(), "disk full");
	}

	#[test]
	fn test_from_display_uses_type_name() {
		#[derive(Debug)]
		struct Rejected;

		impl fmt::Display for Rejected {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "rejected")
			}
		}

		let record = ErrorRecord::from_display(&Rejected);
		assert_eq!(record.kind(), "Rejected");
		assert_eq!(record.message(), "rejected");
		assert!(record.causes().is_empty());
	}

	#[test]
	fn test_short_type_name_strips_generics() {
		assert_eq!(short_type_name("my_app::Wrapper<alloc::string::String>"), "Wrapper");
		assert_eq!(short_type_name("Plain"), "Plain");
	}

	#[test]
	fn test_builder_methods() {
		let record = ErrorRecord::new("Timeout", "upstream took too long")
			.with_tag("region", "eu")
			.with_namespace("admin")
			.with_cause("connect refused")
			.with_stacktrace(Stacktrace {
				frames: vec![Frame {
					function: Some("my_app::handler".to_string()),
					in_app: true,
					..Default::default()
				}],
			});

		assert_eq!(record.tags().get("region"), Some(&TagValue::from("eu")));
		assert_eq!(record.namespace(), Some("admin"));
		assert_eq!(record.causes().len(), 1);
		assert_eq!(record.stacktrace().frames.len(), 1);
	}

	#[test]
	fn test_serde_roundtrip() {
		let record = ErrorRecord::new("Timeout", "slow").with_tag("attempt", 3);
		let json = serde_json::to_string(&record).unwrap();
		let parsed: ErrorRecord = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, record);
	}
}
