// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the exception agent.

use std::path::PathBuf;
use std::time::Duration;

use loom_exceptions_core::{CoreError, TransactionId};
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::transport::TransportError;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur in the exception agent.
#[derive(Debug, Error)]
pub enum SdkError {
	/// `set_error` was called with no transaction bound to the calling context.
	#[error("no active transaction for the current execution context")]
	NoActiveTransaction,

	/// The context already carries an open transaction.
	#[error("execution context {context} already has active transaction {transaction_id}")]
	AlreadyBound {
		context: ExecutionContext,
		transaction_id: TransactionId,
	},

	/// The transaction is not bound to any context.
	#[error("transaction {0} is not bound to any execution context")]
	NotBound(TransactionId),

	/// Only closed transactions may be queued for transport.
	#[error("transaction {0} is still open")]
	NotClosed(TransactionId),

	/// Flushing did not finish within its bound.
	#[error("flush timed out after {timeout:?} with {pending} transactions unacknowledged")]
	FlushTimeout { timeout: Duration, pending: usize },

	/// The transport boundary rejected a transaction.
	#[error("transport failure: {0}")]
	Transport(#[from] TransportError),

	/// A transaction refused a mutation.
	#[error("transaction error: {0}")]
	Transaction(#[from] CoreError),

	/// The agent or flush coordinator has been shut down.
	#[error("exception agent has been shut down")]
	ClientShutdown,

	/// No transport was configured on the builder.
	#[error("a transport is required")]
	MissingTransport,

	/// `flush_blocking` was called from inside an async runtime.
	#[error("blocking flush cannot run inside an async runtime")]
	BlockingInRuntime,

	/// The private runtime for a blocking flush could not be started.
	#[error("failed to start flush runtime: {0}")]
	Runtime(#[source] std::io::Error),

	/// Configuration could not be loaded or failed validation.
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("Failed to parse TOML config at {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Validation error: {0}")]
	Validation(String),
}
