// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered agent configuration.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`LOOM_EXCEPTIONS_*`)
//! 2. Config file (TOML)
//! 3. Built-in defaults

mod sources;

pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::time::Duration;

use loom_exceptions_core::{DEFAULT_MAX_BREADCRUMBS, DEFAULT_NAMESPACE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::flush::FlushConfig;
use crate::ignore::{IgnoreList, IgnoreScope};

const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Partially specified configuration from one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentConfigLayer {
	pub default_namespace: Option<String>,
	pub flush_timeout_ms: Option<u64>,
	pub max_queue_size: Option<usize>,
	pub max_breadcrumbs: Option<usize>,
	pub capture_backtraces: Option<bool>,
	pub ignore_errors: Option<Vec<String>>,
	pub ignore_namespaces: Option<Vec<String>>,
	pub ignore_scope: Option<IgnoreScope>,
}

impl AgentConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_namespace.is_some() {
			self.default_namespace = other.default_namespace;
		}
		if other.flush_timeout_ms.is_some() {
			self.flush_timeout_ms = other.flush_timeout_ms;
		}
		if other.max_queue_size.is_some() {
			self.max_queue_size = other.max_queue_size;
		}
		if other.max_breadcrumbs.is_some() {
			self.max_breadcrumbs = other.max_breadcrumbs;
		}
		if other.capture_backtraces.is_some() {
			self.capture_backtraces = other.capture_backtraces;
		}
		if other.ignore_errors.is_some() {
			self.ignore_errors = other.ignore_errors;
		}
		if other.ignore_namespaces.is_some() {
			self.ignore_namespaces = other.ignore_namespaces;
		}
		if other.ignore_scope.is_some() {
			self.ignore_scope = other.ignore_scope;
		}
	}

	pub fn finalize(self) -> AgentConfig {
		AgentConfig {
			default_namespace: self
				.default_namespace
				.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
			flush_timeout: Duration::from_millis(
				self.flush_timeout_ms.unwrap_or(DEFAULT_FLUSH_TIMEOUT_MS),
			),
			max_queue_size: self.max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE),
			max_breadcrumbs: self.max_breadcrumbs.unwrap_or(DEFAULT_MAX_BREADCRUMBS),
			capture_backtraces: self.capture_backtraces.unwrap_or(true),
			ignore_errors: self.ignore_errors.unwrap_or_default(),
			ignore_namespaces: self.ignore_namespaces.unwrap_or_default(),
			ignore_scope: self.ignore_scope.unwrap_or_default(),
		}
	}
}

/// Fully resolved agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
	/// Namespace for transactions that do not pick one.
	pub default_namespace: String,
	/// Upper bound on a single flush.
	pub flush_timeout: Duration,
	/// Pending transactions kept before the oldest are dropped.
	pub max_queue_size: usize,
	/// Breadcrumbs kept per transaction.
	pub max_breadcrumbs: usize,
	/// Whether records built from errors get a captured stack.
	pub capture_backtraces: bool,
	/// Error kinds that are never reported.
	pub ignore_errors: Vec<String>,
	/// Namespaces whose transactions are never queued.
	pub ignore_namespaces: Vec<String>,
	pub ignore_scope: IgnoreScope,
}

impl Default for AgentConfig {
	fn default() -> Self {
		AgentConfigLayer::default().finalize()
	}
}

impl AgentConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.default_namespace.trim().is_empty() {
			return Err(ConfigError::Validation(
				"default_namespace must not be empty".to_string(),
			));
		}
		if self.flush_timeout.is_zero() {
			return Err(ConfigError::Validation(
				"flush_timeout_ms must be greater than zero".to_string(),
			));
		}
		if self.max_queue_size == 0 {
			return Err(ConfigError::Validation(
				"max_queue_size must be greater than zero".to_string(),
			));
		}
		Ok(())
	}

	pub fn flush_config(&self) -> FlushConfig {
		FlushConfig {
			flush_timeout: self.flush_timeout,
			max_queue_size: self.max_queue_size,
		}
	}

	pub fn ignore_list(&self) -> IgnoreList {
		IgnoreList::new()
			.with_errors(self.ignore_errors.iter().cloned())
			.with_namespaces(self.ignore_namespaces.iter().cloned())
	}
}

/// Load configuration from defaults, `config_path` if it exists, and the environment.
pub fn load_config(config_path: impl Into<std::path::PathBuf>) -> Result<AgentConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(EnvSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(DefaultsSource),
	];
	load_from_sources(&mut sources)
}

/// Load configuration from defaults and the environment only.
pub fn load_config_from_env() -> Result<AgentConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource), Box::new(EnvSource)];
	load_from_sources(&mut sources)
}

fn load_from_sources(sources: &mut [Box<dyn ConfigSource>]) -> Result<AgentConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = AgentConfigLayer::default();
	for source in sources.iter() {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	let config = merged.finalize();
	config.validate()?;
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_default_values() {
		let config = AgentConfig::default();
		assert_eq!(config.default_namespace, "default");
		assert_eq!(config.flush_timeout, Duration::from_secs(5));
		assert_eq!(config.max_queue_size, 1000);
		assert_eq!(config.max_breadcrumbs, 20);
		assert!(config.capture_backtraces);
		assert!(config.ignore_errors.is_empty());
		assert_eq!(config.ignore_scope, IgnoreScope::EachRecord);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_merge_overwrites_only_set_fields() {
		let mut base = AgentConfigLayer {
			default_namespace: Some("web".to_string()),
			ignore_errors: Some(vec!["NotFound".to_string()]),
			..Default::default()
		};
		base.merge(AgentConfigLayer {
			default_namespace: Some("background".to_string()),
			flush_timeout_ms: Some(250),
			..Default::default()
		});

		assert_eq!(base.default_namespace.as_deref(), Some("background"));
		assert_eq!(base.flush_timeout_ms, Some(250));
		assert_eq!(base.ignore_errors, Some(vec!["NotFound".to_string()]));
	}

	#[test]
	fn test_validate_rejects_empty_namespace() {
		let config = AgentConfigLayer {
			default_namespace: Some(" ".to_string()),
			..Default::default()
		}
		.finalize();
		assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_validate_rejects_zero_queue_and_timeout() {
		let config = AgentConfigLayer {
			max_queue_size: Some(0),
			..Default::default()
		}
		.finalize();
		assert!(config.validate().is_err());

		let config = AgentConfigLayer {
			flush_timeout_ms: Some(0),
			..Default::default()
		}
		.finalize();
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_ignore_list_from_config() {
		use crate::ignore::IgnorePolicy;

		let config = AgentConfigLayer {
			ignore_errors: Some(vec!["NotFound".to_string()]),
			ignore_namespaces: Some(vec!["healthcheck".to_string()]),
			..Default::default()
		}
		.finalize();
		let list = config.ignore_list();
		assert!(list.should_ignore("NotFound"));
		assert!(list.should_ignore_namespace("healthcheck"));
	}

	#[test]
	fn test_load_config_reads_toml_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			"default_namespace = \"background\"\nflush_timeout_ms = 1500\nignore_scope = \"first_record\""
		)
		.unwrap();

		let mut sources: Vec<Box<dyn ConfigSource>> = vec![
			Box::new(TomlSource::new(file.path())),
			Box::new(DefaultsSource),
		];
		let config = load_from_sources(&mut sources).unwrap();

		assert_eq!(config.default_namespace, "background");
		assert_eq!(config.flush_timeout, Duration::from_millis(1500));
		assert_eq!(config.ignore_scope, IgnoreScope::FirstRecord);
	}
}
