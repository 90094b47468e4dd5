// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files, and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use super::AgentConfigLayer;
use crate::error::ConfigError;
use crate::ignore::IgnoreScope;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<AgentConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<AgentConfigLayer, ConfigError> {
		Ok(AgentConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<AgentConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(AgentConfigLayer::default());
		}

		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: AgentConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `LOOM_EXCEPTIONS_<FIELD>`; list values are comma-separated.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<AgentConfigLayer, ConfigError> {
		layer_from_vars(|name| std::env::var(name).ok())
	}
}

/// Builds a layer from a variable lookup so parsing can be tested without
/// touching the process environment.
fn layer_from_vars<F>(lookup: F) -> Result<AgentConfigLayer, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let var = |name: &str| lookup(name).filter(|s| !s.is_empty());

	Ok(AgentConfigLayer {
		default_namespace: var("LOOM_EXCEPTIONS_DEFAULT_NAMESPACE"),
		flush_timeout_ms: parse_var(&var, "LOOM_EXCEPTIONS_FLUSH_TIMEOUT_MS")?,
		max_queue_size: parse_var(&var, "LOOM_EXCEPTIONS_MAX_QUEUE_SIZE")?,
		max_breadcrumbs: parse_var(&var, "LOOM_EXCEPTIONS_MAX_BREADCRUMBS")?,
		capture_backtraces: var("LOOM_EXCEPTIONS_CAPTURE_BACKTRACES")
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1"),
		ignore_errors: var("LOOM_EXCEPTIONS_IGNORE_ERRORS").map(|v| split_list(&v)),
		ignore_namespaces: var("LOOM_EXCEPTIONS_IGNORE_NAMESPACES").map(|v| split_list(&v)),
		ignore_scope: var("LOOM_EXCEPTIONS_IGNORE_SCOPE")
			.map(|v| v.parse::<IgnoreScope>())
			.transpose()?,
	})
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>, ConfigError>
where
	T: std::str::FromStr,
	F: Fn(&str) -> Option<String>,
{
	match var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid numeric value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn split_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
		.collect()
}
