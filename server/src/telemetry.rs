use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};
use tracing_tree::HierarchicalLayer;

pub const DEFAULT_LOG_FILTER: &str = "info,drive_broker=debug,tower_http=debug";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn setup_tracing(default_filter: &str) -> color_eyre::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    let tree_layer = HierarchicalLayer::default()
        .with_writer(std::io::stderr)
        .with_indent_lines(true)
        .with_indent_amount(2)
        .with_targets(true)
        .with_thread_ids(true)
        .with_verbose_entry(false)
        .with_verbose_exit(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tree_layer)
        .try_init()?;

    Ok(())
}

/// Error reporting, only when `SENTRY_DSN` is set. Hold the guard for the life
/// of the process so events are flushed on exit.
pub fn setup_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;

    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            traces_sample_rate: 0.0,
            ..Default::default()
        },
    )))
}
