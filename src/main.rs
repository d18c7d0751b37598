use navigate_maghal::{init_tracing, run_magnetometer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug for verbose, RUST_LOG=info for normal, RUST_LOG=warn for production
    init_tracing();

    // Load configuration from CONFIG_PATH or default
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    // POLL_CYCLES bounds the run, e.g. for bench checks
    let max_cycles = match std::env::var("POLL_CYCLES") {
        Ok(v) => Some(v.parse::<u64>()?),
        Err(_) => None,
    };

    tracing::info!("[main] configuration path: {}", config_path);
    run_magnetometer(&config_path, max_cycles)
}
