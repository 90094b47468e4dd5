// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The boundary closed transactions are handed across.
//!
//! Delivering data off the box (agent socket, HTTP, file spool) is the job of
//! a [`Transport`] implementation. Two are shipped here: a channel handoff to
//! a consumer task and a logging transport for local development.

use loom_exceptions_core::Transaction;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
	/// The receiving side refused the transaction.
	#[error("transaction rejected: {0}")]
	Rejected(String),

	/// The receiving side is gone.
	#[error("transport closed")]
	Closed,

	/// The transaction could not be encoded.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Consumer of closed transactions.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	/// Delivers one transaction. `Ok` is the acknowledgement.
	async fn submit(&self, transaction: &Transaction) -> Result<(), TransportError>;
}

/// Hands transactions to a receiver over a bounded channel.
///
/// Acknowledgement means the channel accepted the transaction; a full channel
/// applies backpressure to the flush.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
	tx: mpsc::Sender<Transaction>,
}

impl ChannelTransport {
	pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Transaction>) {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		(Self { tx }, rx)
	}
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
	async fn submit(&self, transaction: &Transaction) -> Result<(), TransportError> {
		self
			.tx
			.send(transaction.clone())
			.await
			.map_err(|_| TransportError::Closed)
	}
}

/// Logs each transaction as JSON at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

#[async_trait::async_trait]
impl Transport for TracingTransport {
	async fn submit(&self, transaction: &Transaction) -> Result<(), TransportError> {
		let payload = serde_json::to_string(transaction)?;
		info!(
			transaction_id = %transaction.id(),
			namespace = %transaction.namespace(),
			errors = transaction.errors().len(),
			payload = %payload,
			"Transaction submitted"
		);
		Ok(())
	}
}
