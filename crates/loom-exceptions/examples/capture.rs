// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: Capture errors against a request transaction and standalone.
//!
//! Run with:
//!   cargo run --example capture -p loom-exceptions
//!
//! Set `LOOM_EXCEPTIONS_IGNORE_ERRORS=NotFound` to see the ignore list at work.

use std::sync::Arc;

use loom_exceptions::{
	load_config_from_env, Breadcrumb, BreadcrumbLevel, ErrorAgent, ErrorRecord, ExecutionContext,
	TracingTransport,
};

#[derive(Debug)]
struct UpstreamTimeout {
	service: &'static str,
}

impl std::fmt::Display for UpstreamTimeout {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} did not answer in time", self.service)
	}
}

impl std::error::Error for UpstreamTimeout {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "loom_exceptions=debug".into()),
		)
		.init();

	let config = load_config_from_env()?;
	println!("Initializing exception agent...");
	println!("  Default namespace: {}", config.default_namespace);
	println!("  Flush timeout: {:?}", config.flush_timeout);

	let agent = ErrorAgent::builder()
		.config(config)
		.transport(Arc::new(TracingTransport))
		.build()?;

	// Simulate a request handled on its own task
	let ctx = ExecutionContext::new_task();
	let request_agent = agent.clone();
	ctx.scope(async move {
		let txn = request_agent.open_transaction("web", Some("CheckoutController#create"))?;
		txn.set_tag("user_id", 42)?;
		txn.add_breadcrumb(
			Breadcrumb::new("http", "request")
				.with_message("POST /checkout")
				.with_level(BreadcrumbLevel::Info),
		)?;

		// Guarded call: reported, then handed back
		let charged = request_agent
			.listen_for_error_async(async { Err::<(), _>(UpstreamTimeout { service: "billing" }) })
			.await;
		if let Err(e) = charged {
			println!("\nCheckout failed: {e}");
		}

		// Handled error reported by hand, moved to the admin namespace
		let _ = request_agent.set_error_with(ErrorRecord::new("Forbidden", "refund needs admin"), |meta| {
			meta.set_namespace("admin").set_tag("refund", true);
		});

		request_agent.close_transaction(&txn)?;
		println!("Closed transaction {}", txn.id());
		Ok::<_, loom_exceptions::SdkError>(())
	})
	.await?;

	// Outside any request
	agent.send_error_with(ErrorRecord::new("CronFailed", "nightly export aborted"), |meta| {
		meta.set_action("NightlyExport");
	});

	println!("\nPending transactions: {}", agent.flusher().queue_len());

	agent.shutdown("example-complete").await?;

	let stats = agent.stats();
	println!("Submitted: {}, failed: {}, dropped: {}", stats.submitted, stats.failed, stats.dropped);
	println!("Done!");

	Ok(())
}
