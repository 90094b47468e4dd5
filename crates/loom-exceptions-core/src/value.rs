// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scalar tag values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest string tag value kept; longer values are truncated.
pub const MAX_TAG_VALUE_LEN: usize = 256;

/// A scalar value attached to a transaction or error record as a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
	Bool(bool),
	Integer(i64),
	Float(f64),
	String(String),
}

impl TagValue {
	/// Clamps string values to [`MAX_TAG_VALUE_LEN`] characters.
	pub fn truncated(self) -> Self {
		match self {
			Self::String(s) if s.chars().count() > MAX_TAG_VALUE_LEN => {
				Self::String(s.chars().take(MAX_TAG_VALUE_LEN).collect())
			}
			other => other,
		}
	}
}

impl fmt::Display for TagValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bool(v) => write!(f, "{v}"),
			Self::Integer(v) => write!(f, "{v}"),
			Self::Float(v) => write!(f, "{v}"),
			Self::String(v) => f.write_str(v),
		}
	}
}

impl From<&str> for TagValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for TagValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<bool> for TagValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for TagValue {
	fn from(value: i64) -> Self {
		Self::Integer(value)
	}
}

impl From<i32> for TagValue {
	fn from(value: i32) -> Self {
		Self::Integer(value.into())
	}
}

impl From<u32> for TagValue {
	fn from(value: u32) -> Self {
		Self::Integer(value.into())
	}
}

impl From<f64> for TagValue {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}
