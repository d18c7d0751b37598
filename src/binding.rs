//! Binding between a register-level sensor driver and an I2C transport.
//!
//! `bind` builds a [`DeviceContext`] for one sensor, pairs it with a time
//! source and installs the result into a [`SensorDevice`] as its read, write
//! and delay capabilities. The driver never sees the transport.

use std::cell::{RefCell, RefMut};
use std::fmt;

use tracing::{debug, error, info, warn};

use crate::bus::{I2cTransport, TransferStatus};
use crate::errors::{HalError, HalResult};
use crate::sensor::{SensorDevice, SensorInterface};
use crate::timing::{TimeSource, TimingStrategy, DEFAULT_COUNTER_HZ};

/// Timeout for combined transfers and data phases
pub const TIMEOUT_LONG_MS: u32 = 1000;
/// Timeout for the register-address phase of a split read
pub const TIMEOUT_SHORT_MS: u32 = 500;

/// Device address in transport convention (7-bit address shifted left by one)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAddress(u16);

impl BusAddress {
    pub fn resolve(logical: u8) -> Self {
        BusAddress((logical as u16) << 1)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn logical(self) -> u8 {
        (self.0 >> 1) as u8
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.logical())
    }
}

/// One sensor instance on one transport. Fixed after construction.
///
/// The transport is borrowed, never owned: whoever owns the bus may
/// reinitialize it between calls and the context simply uses it again.
pub struct DeviceContext<'bus, B> {
    transport: &'bus RefCell<B>,
    address: BusAddress,
}

impl<'bus, B: I2cTransport> DeviceContext<'bus, B> {
    pub fn new(transport: &'bus RefCell<B>, logical_address: u8) -> Self {
        Self {
            transport,
            address: BusAddress::resolve(logical_address),
        }
    }

    pub fn address(&self) -> BusAddress {
        self.address
    }

    fn failure(&self, status: TransferStatus, register: u8, length: usize) -> HalError {
        HalError::CommunicationFailure {
            status,
            address: self.address.logical(),
            register,
            length,
        }
    }

    fn bus(&self, register: u8, length: usize) -> HalResult<RefMut<'bus, B>> {
        let transport: &'bus RefCell<B> = self.transport;
        transport.try_borrow_mut().map_err(|_| {
            error!(
                addr = %self.address, reg = register, len = length,
                "[binding] transport already in use"
            );
            self.failure(TransferStatus::Busy, register, length)
        })
    }

    /// Read `buf.len()` bytes starting at `register`.
    ///
    /// Tries one combined transfer first. If the transport rejects it, the
    /// read is repeated once as a plain register write followed by a plain
    /// read; a failed write phase ends the attempt.
    pub fn read(&self, register: u8, buf: &mut [u8]) -> HalResult<()> {
        let mut bus = self.bus(register, buf.len())?;
        let addr = self.address.raw();
        let len = buf.len();

        let status = match bus.mem_read(addr, register, buf, TIMEOUT_LONG_MS) {
            Ok(()) => return Ok(()),
            Err(status) => status,
        };
        warn!(
            status = %status, addr = %self.address, bus_addr = addr, reg = register, len,
            "[binding] combined read failed, trying split transfer"
        );

        if let Err(status) = bus.write_raw(addr, &[register], TIMEOUT_SHORT_MS) {
            error!(
                status = %status, addr = %self.address, bus_addr = addr, reg = register, len,
                "[binding] split read: register write failed"
            );
            return Err(self.failure(status, register, len));
        }

        if let Err(status) = bus.read_raw(addr, buf, TIMEOUT_LONG_MS) {
            error!(
                status = %status, addr = %self.address, bus_addr = addr, reg = register, len,
                "[binding] split read: data read failed"
            );
            return Err(self.failure(status, register, len));
        }

        debug!(addr = %self.address, reg = register, len, "[binding] split read recovered");
        Ok(())
    }

    /// Read `length` bytes starting at `register` into a fresh buffer.
    pub fn read_vec(&self, register: u8, length: usize) -> HalResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(length)?;
        buf.resize(length, 0);
        self.read(register, &mut buf)?;
        Ok(buf)
    }

    /// Write `data` starting at `register` in one transfer. No fallback.
    pub fn write(&self, register: u8, data: &[u8]) -> HalResult<()> {
        let mut bus = self.bus(register, data.len())?;
        let addr = self.address.raw();

        bus.mem_write(addr, register, data, TIMEOUT_LONG_MS).map_err(|status| {
            error!(
                status = %status, addr = %self.address, bus_addr = addr, reg = register, len = data.len(),
                "[binding] register write failed"
            );
            self.failure(status, register, data.len())
        })
    }
}

/// Capabilities installed into a [`SensorDevice`]: a device context plus its time source
pub struct HalBinding<'bus, B> {
    context: DeviceContext<'bus, B>,
    time: TimeSource,
}

impl<'bus, B: I2cTransport> HalBinding<'bus, B> {
    pub fn new(context: DeviceContext<'bus, B>, time: TimeSource) -> Self {
        Self { context, time }
    }

    pub fn context(&self) -> &DeviceContext<'bus, B> {
        &self.context
    }
}

impl<'bus, B: I2cTransport> SensorInterface for HalBinding<'bus, B> {
    fn read(&mut self, register: u8, buf: &mut [u8]) -> HalResult<()> {
        self.context.read(register, buf)
    }

    fn write(&mut self, register: u8, data: &[u8]) -> HalResult<()> {
        self.context.write(register, data)
    }

    fn delay_us(&mut self, period_us: u32) {
        self.time.delay_us(period_us);
    }
}

/// Bind `device` to `transport` at the 7-bit `logical_address`, using the
/// host time source.
///
/// The address is not range-checked. On error `device` is left untouched.
pub fn bind<'bus, B>(
    device: Option<&mut SensorDevice<'bus>>,
    transport: Option<&'bus RefCell<B>>,
    logical_address: u8,
) -> HalResult<()>
where
    B: I2cTransport + 'bus,
{
    let time = TimeSource::host(TimingStrategy::Auto, DEFAULT_COUNTER_HZ);
    bind_with_time_source(device, transport, logical_address, time)
}

/// [`bind`] with an explicit time source.
pub fn bind_with_time_source<'bus, B>(
    device: Option<&mut SensorDevice<'bus>>,
    transport: Option<&'bus RefCell<B>>,
    logical_address: u8,
    time: TimeSource,
) -> HalResult<()>
where
    B: I2cTransport + 'bus,
{
    let (Some(device), Some(transport)) = (device, transport) else {
        return Err(HalError::NullArgument);
    };

    let context = DeviceContext::new(transport, logical_address);
    let address = context.address();
    time.activate();
    info!(addr = %address, bus_addr = address.raw(), time = ?time, "[binding] sensor bound");

    device.install(Box::new(HalBinding::new(context, time)));
    Ok(())
}
