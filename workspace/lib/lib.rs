#![allow(dead_code, non_snake_case, non_upper_case_globals)]

pub mod systems;

/// Install a `tracing` subscriber that reads its filter from `RUST_LOG`,
/// falling back to `info`.
pub fn init_logging() {
    let filter
        = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
