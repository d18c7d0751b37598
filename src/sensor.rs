use crate::errors::{HalError, HalResult};

/// The three capabilities a register-level sensor driver needs from the platform.
pub trait SensorInterface {
    /// Read `buf.len()` bytes starting at `register`.
    fn read(&mut self, register: u8, buf: &mut [u8]) -> HalResult<()>;
    /// Write `data` starting at `register`.
    fn write(&mut self, register: u8, data: &[u8]) -> HalResult<()>;
    /// Block for at least `period_us` microseconds. Never fails.
    fn delay_us(&mut self, period_us: u32);
}

/// Device record handed to the sensor driver.
///
/// The capability slot is filled in one assignment by the binding; a driver
/// only ever sees it empty or fully populated.
#[derive(Default)]
pub struct SensorDevice<'a> {
    interface: Option<Box<dyn SensorInterface + 'a>>,
    /// Chip identifier, filled in by the driver after probing
    pub chip_id: u8,
}

impl<'a> SensorDevice<'a> {
    pub fn new() -> Self {
        Self { interface: None, chip_id: 0 }
    }

    pub fn is_bound(&self) -> bool {
        self.interface.is_some()
    }

    pub(crate) fn install(&mut self, interface: Box<dyn SensorInterface + 'a>) {
        self.interface = Some(interface);
    }

    /// Drop the installed capabilities and their context.
    pub fn unbind(&mut self) {
        self.interface = None;
    }

    pub fn read_register(&mut self, register: u8, buf: &mut [u8]) -> HalResult<()> {
        self.interface
            .as_mut()
            .ok_or(HalError::NullArgument)?
            .read(register, buf)
    }

    pub fn write_register(&mut self, register: u8, data: &[u8]) -> HalResult<()> {
        self.interface
            .as_mut()
            .ok_or(HalError::NullArgument)?
            .write(register, data)
    }

    pub fn delay_us(&mut self, period_us: u32) {
        if let Some(interface) = self.interface.as_mut() {
            interface.delay_us(period_us);
        }
    }

    /// Read the chip identifier at `register`, record it, and report whether
    /// it matches `expected`. Any identifier matches when `expected` is `None`.
    pub fn probe_chip_id(&mut self, register: u8, expected: Option<u8>) -> HalResult<bool> {
        let mut id = [0u8; 1];
        self.read_register(register, &mut id)?;
        self.chip_id = id[0];
        Ok(expected.map_or(true, |e| e == id[0]))
    }
}
