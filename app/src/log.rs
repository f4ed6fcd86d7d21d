/// Creates and configures the logger for the application
///
/// Logs go to stderr so `--json` output on stdout stays machine-readable.
///
/// Log level is Debug in development builds and Info in production builds,
/// unless `RUST_LOG` says otherwise.
pub fn init() {
    let env = env_logger::Env::default().default_filter_or(default_level());
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .try_init();
}

pub fn default_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Lower the default level to `warn` while keeping `RUST_LOG` authoritative
pub fn init_quiet() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .try_init();
}
