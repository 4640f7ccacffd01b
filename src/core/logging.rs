//! Logging setup and request-scoped tracing helpers.

use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,letllm_rust=debug";

/// Custom time formatter that uses local timezone (respects TZ environment variable)
pub struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Build the filter string, always appending noise suppression for the
/// HTTP stack so a bare `RUST_LOG=trace` does not flood the output.
pub fn build_filter(base: Option<&str>) -> String {
    let base = base.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_LOG_FILTER);
    format!("{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn", base)
}

/// Install the global subscriber. ANSI colors are disabled when `NO_COLOR` is set.
pub fn init_tracing() {
    let base = std::env::var("RUST_LOG").ok();
    let filter = EnvFilter::new(build_filter(base.as_deref()));
    let no_color = std::env::var("NO_COLOR").is_ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .init();
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Span covering one chat completion call.
pub fn chat_span(request_id: &str, model: &str, provider: &str, stream: bool) -> tracing::Span {
    tracing::info_span!(
        "chat_completion",
        request_id = %request_id,
        model = %model,
        provider = %provider,
        stream
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_default() {
        let filter = build_filter(None);
        assert!(filter.starts_with(DEFAULT_LOG_FILTER));
        assert!(filter.ends_with("reqwest=warn"));
    }

    #[test]
    fn test_build_filter_keeps_user_setting() {
        let filter = build_filter(Some("trace"));
        assert!(filter.starts_with("trace,"));
        assert!(filter.contains("hyper=warn"));
        assert_eq!(build_filter(Some("")), build_filter(None));
    }

    #[test]
    fn test_generate_request_id_is_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
