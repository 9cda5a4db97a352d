/*!
 * Structured Tracing
 * Subscriber setup and per-decision spans using the tracing crate
 *
 * Features:
 * - Trace id generation for request correlation
 * - JSON-formatted logs for structured parsing
 * - Slow decision warnings
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Decisions slower than this are logged at warn level
const SLOW_DECISION_THRESHOLD: Duration = Duration::from_millis(50);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - UMA_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("UMA_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Generate a unique trace ID for request correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one authorization decision
pub struct DecisionSpan {
    span: tracing::Span,
    start: Instant,
    trace_id: String,
}

impl DecisionSpan {
    pub fn new(requester: &str, ticket: bool) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "uma_decision",
            trace_id = %trace_id,
            requester = requester,
            ticket = ticket,
            scopes = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Number of (resource, scope) pairs evaluated
    pub fn record_scopes(&self, count: usize) {
        self.span.record("scopes", count);
    }

    pub fn record_outcome(&self, granted: bool) {
        self.span
            .record("outcome", if granted { "granted" } else { "denied" });
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for DecisionSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let _entered = self.span.enter();

        if elapsed > SLOW_DECISION_THRESHOLD {
            warn!(
                trace_id = %self.trace_id,
                duration_ms = elapsed.as_millis() as u64,
                slow = true,
                "slow authorization decision"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                duration_us = elapsed.as_micros() as u64,
                "authorization decision completed"
            );
        }
    }
}
