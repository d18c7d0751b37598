// Public modules
pub mod binding;
pub mod bus;
pub mod config;
pub mod errors;
pub mod hal;
pub mod messages;
pub mod registry;
pub mod scheduler;
pub mod sensor;
pub mod timing;

// Re-export commonly used types
pub use binding::{bind, bind_with_time_source, BusAddress, DeviceContext, HalBinding};
pub use bus::{I2cTransport, TransferStatus};
pub use config::{load_bus_config, load_sensor_config, BusConfig, SensorConfig};
pub use errors::{HalError, HalResult};
pub use registry::{init_all, open_buses};
pub use scheduler::run_poll_loop;
pub use sensor::{SensorDevice, SensorInterface};
pub use timing::TimeSource;

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Bind every configured magnetometer and poll it until `max_cycles` (or forever)
pub fn run_magnetometer(config_path: &str, max_cycles: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    info!("[NavigateMagHal] starting up...");

    let sensor_config = load_sensor_config(&format!("{}/sensors.toml", config_path))?;
    let bus_config = load_bus_config(&format!("{}/buses.toml", config_path))?;
    info!(
        "[config] loaded {} sensor(s) on {} bus(es)",
        sensor_config.sensors.len(),
        bus_config.buses.len()
    );

    let buses = open_buses(&bus_config, &sensor_config)?;
    let mut sensors = init_all(&sensor_config, &buses)?;
    info!("[registry] sensors bound");

    let stats = run_poll_loop(&mut sensors, max_cycles);
    info!(
        "[main] poll loop finished: {} cycles, {} samples, {} failures",
        stats.cycles, stats.samples, stats.failures
    );
    Ok(())
}
