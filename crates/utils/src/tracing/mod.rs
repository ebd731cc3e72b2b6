use rollout_core::constants::ROLLOUT_LOG_VAR;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, trace, warn, Level};

/// Initialize the tracing system
///
/// Directives come from `ROLLOUT_LOG` when set, otherwise from `default_level`.
/// Output goes to stderr so plans printed on stdout stay machine readable.
pub fn init(default_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let from_env = std::env::var(ROLLOUT_LOG_VAR).ok();
    let filter = build_filter(from_env.as_deref(), default_level)?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Filter from explicit directives, falling back to a bare level
pub fn build_filter(directives: Option<&str>, default_level: &str) -> Result<EnvFilter, ParseError> {
    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(default_level),
    }
}

fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_take_precedence() {
        let filter = build_filter(Some("rollout_task=trace"), "warn").unwrap();
        assert!(filter.to_string().contains("rollout_task=trace"));
    }

    #[test]
    fn test_blank_directives_fall_back_to_level() {
        let filter = build_filter(Some("  "), "debug").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }
}
