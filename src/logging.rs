//! Diagnostics output via tracing.
//!
//! The level comes from the configuration's `diagnostics` object; the
//! `RUST_LOG` environment variable takes precedence. Safe to call more than
//! once (only the first call takes effect).

use crate::config::DiagnosticsConfig;
use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize the subscriber from the diagnostics configuration.
pub fn init(config: &DiagnosticsConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if !config.enabled {
            EnvFilter::new("error")
        } else {
            EnvFilter::new(normalize_level(&config.level))
        };

        // Diagnostics go to stderr: stdout carries query results and, in
        // serve mode, the MCP protocol stream.
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

fn normalize_level(level: &str) -> &str {
    match level.to_ascii_lowercase().as_str() {
        "error" | "fatal" => "error",
        "warning" | "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}
