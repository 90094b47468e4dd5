// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stack capture for error records.

use std::backtrace::Backtrace;

use loom_exceptions_core::{Frame, Stacktrace};
use rustc_demangle::demangle;

/// Frames from crates that are never application code.
const SYSTEM_PREFIXES: &[&str] = &[
	"std::",
	"core::",
	"alloc::",
	"<std::",
	"<core::",
	"<alloc::",
	"tokio::",
	"<tokio::",
	"futures::",
	"<futures::",
	"futures_util::",
	"<futures_util::",
	"async_trait::",
	"tracing::",
	"<tracing::",
	"loom_exceptions::",
	"<loom_exceptions::",
	"rust_begin_unwind",
	"rust_panic",
	"__rust_",
	"_rust_",
];

const SYSTEM_SEGMENTS: &[&str] = &[
	"::panic::",
	"::panicking::",
	"::rt::",
	"::sys_common::",
	"::backtrace::",
];

/// Captures the caller's stack, innermost frame first.
pub fn capture_stacktrace() -> Stacktrace {
	let backtrace = Backtrace::force_capture();
	parse_backtrace(&format!("{backtrace}"))
}

/// Parses the `Display` output of [`std::backtrace::Backtrace`].
///
/// The format is a numbered symbol line, optionally followed by an
/// `at <file>:<line>:<col>` line describing that symbol's location.
pub fn parse_backtrace(rendered: &str) -> Stacktrace {
	let mut frames: Vec<Frame> = Vec::new();

	for line in rendered.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut() {
				let (filename, lineno) = parse_location(location);
				frame.filename = Some(filename);
				frame.lineno = lineno;
			}
			continue;
		}

		if let Some(frame) = parse_symbol_line(line) {
			frames.push(frame);
		}
	}

	Stacktrace { frames }
}

fn parse_symbol_line(line: &str) -> Option<Frame> {
	let symbol = match line.split_once(':') {
		Some((index, rest)) if index.trim().parse::<u32>().is_ok() => rest.trim(),
		_ => line,
	};
	if symbol.is_empty() {
		return None;
	}

	let function = demangle(symbol).to_string();
	let module = function
		.rfind("::")
		.map(|idx| function[..idx].trim_start_matches('<').to_string());
	let in_app = is_in_app(&function);

	Some(Frame {
		function: Some(function),
		module,
		filename: None,
		lineno: None,
		in_app,
	})
}

/// `src/main.rs:12:5` -> (`src/main.rs`, Some(12))
fn parse_location(location: &str) -> (String, Option<u32>) {
	let mut parts = location.rsplitn(3, ':');
	let last = parts.next();
	let middle = parts.next();
	let rest = parts.next();

	match (rest, middle, last) {
		(Some(file), Some(line), Some(_col)) if line.parse::<u32>().is_ok() => {
			(file.to_string(), line.parse().ok())
		}
		(_, Some(file), Some(line)) if line.parse::<u32>().is_ok() => {
			let file = match rest {
				Some(prefix) => format!("{prefix}:{file}"),
				None => file.to_string(),
			};
			(file, line.parse().ok())
		}
		_ => (location.to_string(), None),
	}
}

fn is_in_app(function: &str) -> bool {
	!SYSTEM_PREFIXES.iter().any(|p| function.starts_with(p))
		&& !SYSTEM_SEGMENTS.iter().any(|s| function.contains(s))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_is_in_app_excludes_std_and_runtime() {
		assert!(!is_in_app("std::panic::catch_unwind"));
		assert!(!is_in_app("core::ops::function::FnOnce::call_once"));
		assert!(!is_in_app("tokio::runtime::Runtime::block_on"));
		assert!(!is_in_app("loom_exceptions::guard::listen"));
	}

	#[test]
	fn test_is_in_app_includes_user_code() {
		assert!(is_in_app("my_app::jobs::import::run"));
		assert!(is_in_app("billing::charge"));
	}

	#[test]
	fn test_parse_attaches_locations_to_previous_frame() {
		let rendered = "   0: my_app::jobs::run\n             at ./src/jobs.rs:42:9\n   1: std::rt::lang_start\n";
		let stacktrace = parse_backtrace(rendered);

		assert_eq!(stacktrace.frames.len(), 2);
		let first = &stacktrace.frames[0];
		assert_eq!(first.function.as_deref(), Some("my_app::jobs::run"));
		assert_eq!(first.module.as_deref(), Some("my_app::jobs"));
		assert_eq!(first.filename.as_deref(), Some("./src/jobs.rs"));
		assert_eq!(first.lineno, Some(42));
		assert!(first.in_app);
		assert!(!stacktrace.frames[1].in_app);
	}

	#[test]
	fn test_parse_location_without_column() {
		assert_eq!(
			parse_location("src/lib.rs:7"),
			("src/lib.rs".to_string(), Some(7))
		);
	}

	#[test]
	fn test_parse_location_garbage() {
		assert_eq!(parse_location("unknown"), ("unknown".to_string(), None));
	}

	#[test]
	fn test_capture_stacktrace_does_not_panic() {
		// Frame content depends on debug info; only check that capture works.
		let _ = capture_stacktrace();
	}
}
