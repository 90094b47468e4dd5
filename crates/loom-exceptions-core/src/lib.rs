// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Loom in-process exception capture.
//!
//! This crate holds the plain data that the `loom-exceptions` agent moves
//! around: captured failures ([`ErrorRecord`]), the units of work they are
//! correlated with ([`Transaction`]), and the small value types hanging off
//! both. Nothing here locks, spawns, or performs I/O.
//!
//! # Overview
//!
//! - An [`ErrorRecord`] is immutable once built and owned by exactly one transaction
//! - A [`Transaction`] is mutable while [`TransactionState::Open`] and frozen once closed
//! - Tags are scalar [`TagValue`]s; params and custom data are JSON

pub mod breadcrumb;
pub mod error;
pub mod record;
pub mod transaction;
pub mod value;

pub use breadcrumb::{Breadcrumb, BreadcrumbLevel};
pub use error::{CoreError, Result};
pub use record::{ErrorRecord, Frame, Stacktrace};
pub use transaction::{
	Transaction, TransactionId, TransactionState, DEFAULT_MAX_BREADCRUMBS, DEFAULT_NAMESPACE,
};
pub use value::{TagValue, MAX_TAG_VALUE_LEN};
