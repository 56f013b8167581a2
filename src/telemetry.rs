//! Tracing setup and request-scoped correlation ids.

use std::sync::Once;

use log::LevelFilter;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, layer::Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

/// Correlation id carried through one request's processing.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static CURRENT_TRACE: TraceContext;
}

static INIT: Once = Once::new();

/// Install the global tracing subscriber once. `log::` macros are bridged
/// into tracing so the database plumbing's log output lands in the same
/// pipeline. Repeated calls (tests, embedded use) are no-ops; setup problems
/// degrade to the default subscriber rather than aborting startup.
pub fn init_tracing(config: &AppConfig) {
    INIT.call_once(|| {
        // Bridge first so nothing logged during subscriber setup is lost.
        // A pre-existing logger (common under `cargo test`) is fine.
        let _ = LogTracer::builder()
            .with_max_level(LevelFilter::Trace)
            .init();

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

        let fmt_layer = match config.log_format.as_str() {
            "pretty" => fmt::layer().pretty().boxed(),
            _ => fmt::layer().json().boxed(),
        };

        if let Err(err) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            eprintln!(
                "Warning: tracing subscriber not installed ({}); default subscriber remains",
                err
            );
        }
    });
}

/// Run `future` with the given trace context available through task-local
/// storage.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    CURRENT_TRACE.scope(context, future).await
}

/// The trace id of the running task, if one was set.
pub fn current_trace_id() -> Option<String> {
    CURRENT_TRACE.try_with(|ctx| ctx.trace_id.clone()).ok()
}
