// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for exception capture data.

use thiserror::Error;

/// Errors raised by the core data types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
	#[error("transaction {0} is closed")]
	TransactionClosed(String),

	#[error("invalid transaction state: {0}")]
	InvalidTransactionState(String),

	#[error("invalid breadcrumb level: {0}")]
	InvalidBreadcrumbLevel(String),

	#[error("invalid tag key: {0:?}")]
	InvalidTagKey(String),

	#[error("invalid namespace: {0:?}")]
	InvalidNamespace(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
