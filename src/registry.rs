use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::binding::{bind_with_time_source, BusAddress};
use crate::bus::sim::SimulatedBus;
use crate::bus::{BusType, I2cTransport};
use crate::config::{BusConfig, BusEntry, SensorConfig};
use crate::errors::{RegistryError, RegistryResult};
use crate::sensor::SensorDevice;
use crate::timing::TimeSource;

/// Register holding the chip identifier
pub const CHIP_ID_REGISTER: u8 = 0x00;
/// Chip id reported by simulated sensors unless configured otherwise
pub const SIM_CHIP_ID: u8 = 0x33;

const READY_TRIALS: u32 = 3;
const READY_TIMEOUT_MS: u32 = 100;

/// Raw X/Y/Z/temperature block served by simulated sensors, starting at 0x31
const SIM_MAG_BLOCK: [u8; 12] = [
    0xD2, 0x04, 0x00, // x = 1234
    0xC9, 0xFD, 0xFF, // y = -567
    0x40, 0x9C, 0x00, // z = 40000
    0x10, 0x27, 0x00, // t = 10000
];

/// A transport shared by every sensor configured on it
pub type SharedBus = RefCell<Box<dyn I2cTransport>>;

/// Opened buses, keyed by configuration id. Owned by the application and
/// outliving every sensor bound to it.
#[derive(Default)]
pub struct BusSet {
    buses: HashMap<String, SharedBus>,
}

impl BusSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, bus: impl I2cTransport + 'static) {
        let bus: Box<dyn I2cTransport> = Box::new(bus);
        self.buses.insert(id.into(), RefCell::new(bus));
    }

    pub fn get(&self, id: &str) -> Option<&SharedBus> {
        self.buses.get(id)
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }
}

/// A sensor bound to its bus, ready for polling
pub struct BoundSensor<'bus> {
    pub id: String,
    pub address: u8,
    pub frequency: u32,
    pub device: SensorDevice<'bus>,
    /// Whether the device acknowledged its address at startup
    pub ready: bool,
}

#[cfg(feature = "linux-hal")]
fn open_i2c(entry: &BusEntry) -> RegistryResult<Box<dyn I2cTransport>> {
    let bus = crate::bus::i2c::open_linux_bus(&entry.path).map_err(|e| RegistryError::BusInitError {
        bus: entry.id.clone(),
        reason: format!("{}: {}", entry.path, e),
    })?;
    Ok(Box::new(bus))
}

#[cfg(not(feature = "linux-hal"))]
fn open_i2c(entry: &BusEntry) -> RegistryResult<Box<dyn I2cTransport>> {
    Err(RegistryError::BusInitError {
        bus: entry.id.clone(),
        reason: "hardware I2C requires the linux-hal feature; use a sim bus instead".to_string(),
    })
}

/// Simulated bus answering for the first sensor configured on it.
fn simulated_bus(entry: &BusEntry, sensor_config: &SensorConfig) -> Box<dyn I2cTransport> {
    let sensor = sensor_config.sensors.iter().find(|s| s.bus == entry.id);
    let (address, chip_id) = match sensor {
        Some(s) => (s.address, s.chip_id.unwrap_or(SIM_CHIP_ID)),
        None => (0x14, SIM_CHIP_ID),
    };
    let mut bus = SimulatedBus::with_chip_id(address, chip_id);
    bus.set_registers(crate::scheduler::MAG_DATA_REGISTER, &SIM_MAG_BLOCK);
    info!("[registry] simulated bus '{}' serving device at {:#04x}", entry.id, address);
    Box::new(bus)
}

pub fn open_buses(bus_cfg: &BusConfig, sensor_config: &SensorConfig) -> RegistryResult<BusSet> {
    let mut set = BusSet::new();
    for b in bus_cfg.buses.iter() {
        let bus = match b.bus_type()? {
            BusType::I2C => open_i2c(b)?,
            BusType::Sim => simulated_bus(b, sensor_config),
        };
        set.buses.insert(b.id.clone(), RefCell::new(bus));
    }
    Ok(set)
}

/// Read the chip id through the bound capabilities and check it against `expected`.
pub fn verify_chip_id(sensor: &str, device: &mut SensorDevice<'_>, expected: Option<u8>) -> RegistryResult<u8> {
    let matched = device.probe_chip_id(CHIP_ID_REGISTER, expected).map_err(|e| {
        error!("[{}] chip id read failed: {} (status {})", sensor, e, e.status_code());
        RegistryError::ProbeError {
            sensor: sensor.to_string(),
            reason: e.to_string(),
        }
    })?;
    if !matched {
        return Err(RegistryError::ProbeError {
            sensor: sensor.to_string(),
            reason: format!(
                "unexpected chip id {:#04x} (expected {:#04x})",
                device.chip_id,
                expected.unwrap_or_default()
            ),
        });
    }
    Ok(device.chip_id)
}

/// Bind one device per configured sensor, then check presence and chip id.
///
/// Presence and chip-id problems are logged and the sensor is kept, so the
/// poll loop can run degraded. Missing buses and bind failures are errors.
pub fn init_all<'bus>(sensor_config: &SensorConfig, buses: &'bus BusSet) -> RegistryResult<Vec<BoundSensor<'bus>>> {
    let time = TimeSource::host(sensor_config.timing.strategy, sensor_config.timing.counter_hz);
    info!("[registry] time source: {:?}", time);

    let mut sensors = Vec::new();
    info!("[registry] initializing {} sensors...", sensor_config.sensors.len());
    for s in sensor_config.sensors.iter() {
        let bus = buses.get(&s.bus).ok_or_else(|| RegistryError::BusNotFound { bus: s.bus.clone() })?;

        let mut device = SensorDevice::new();
        bind_with_time_source(Some(&mut device), Some(bus), s.address, time.clone()).map_err(|e| {
            RegistryError::BindError {
                sensor: s.id.clone(),
                source: e,
            }
        })?;
        info!("[registry] registering sensor: id={} bus={} addr={:#04x}", s.id, s.bus, s.address);

        let ready = match bus.try_borrow_mut() {
            Ok(mut b) => b
                .is_device_ready(BusAddress::resolve(s.address).raw(), READY_TRIALS, READY_TIMEOUT_MS)
                .is_ok(),
            Err(_) => false,
        };
        if !ready {
            warn!("[{}] I2C device not ready at address {:#04x} - check wiring/address", s.id, s.address);
        }

        match verify_chip_id(&s.id, &mut device, s.chip_id) {
            Ok(id) => info!("[{}] initialized (chip id {:#04x})", s.id, id),
            Err(e) => warn!("[{}] {} - continuing degraded", s.id, e),
        }

        sensors.push(BoundSensor {
            id: s.id.clone(),
            address: s.address,
            frequency: s.frequency,
            device,
            ready,
        });
    }

    Ok(sensors)
}
