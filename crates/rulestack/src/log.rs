use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Set up the stderr logger for one CLI invocation.
///
/// `level` comes from the `-v` flags. A filter directive in
/// `RULESTACK_LOG` (or, failing that, `RUST_LOG`) takes precedence over
/// the flags, e.g. `RULESTACK_LOG=rulestack_core=trace`.
pub fn init(level: LevelFilter) {
    let filter = ["RULESTACK_LOG", "RUST_LOG"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::default().add_directive(level.into()));

    // Module targets only matter when debugging rulestack itself; at the
    // default level the messages stand on their own.
    let debugging = level >= LevelFilter::DEBUG;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(debugging)
        .init();
}
