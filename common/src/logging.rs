/// Install the global `fmt` subscriber. `RUST_LOG` wins over `level` when set.
pub fn init(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.parse().unwrap_or_default()),
        )
        .init();
}
