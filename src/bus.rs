pub mod i2c;
pub mod sim;

use std::fmt;

/// Bus type enum for the transports a sensor can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    I2C,
    Sim,
}

impl BusType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "i2c" => Some(BusType::I2C),
            "sim" => Some(BusType::Sim),
            _ => None,
        }
    }
}

/// Non-OK status returned by a transport primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Error,
    Busy,
    Timeout,
}

impl TransferStatus {
    pub fn code(self) -> u8 {
        match self {
            TransferStatus::Error => 1,
            TransferStatus::Busy => 2,
            TransferStatus::Timeout => 3,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStatus::Error => "error",
            TransferStatus::Busy => "busy",
            TransferStatus::Timeout => "timeout",
        };
        write!(f, "{} ({})", self.code(), name)
    }
}

/// Result of a single transport primitive
pub type TransferResult = Result<(), TransferStatus>;

/// An initialized, addressable I2C master.
///
/// Addresses are in transport convention: the 7-bit device address shifted
/// left by one. Register addresses are 8 bits wide. Timeouts are in
/// milliseconds and bound how long a primitive may block.
pub trait I2cTransport {
    /// Write `register`, then read `buf.len()` bytes in one combined transfer (repeated start).
    fn mem_read(&mut self, address: u16, register: u8, buf: &mut [u8], timeout_ms: u32) -> TransferResult;

    /// Write `register` followed by `data` in a single transfer.
    fn mem_write(&mut self, address: u16, register: u8, data: &[u8], timeout_ms: u32) -> TransferResult;

    fn write_raw(&mut self, address: u16, bytes: &[u8], timeout_ms: u32) -> TransferResult;

    fn read_raw(&mut self, address: u16, buf: &mut [u8], timeout_ms: u32) -> TransferResult;

    /// Address the device with an empty write up to `trials` times; succeeds on the first ACK.
    fn is_device_ready(&mut self, address: u16, trials: u32, timeout_ms: u32) -> TransferResult {
        let mut last = TransferStatus::Error;
        for _ in 0..trials {
            match self.write_raw(address, &[], timeout_ms) {
                Ok(()) => return Ok(()),
                Err(status) => last = status,
            }
        }
        Err(last)
    }
}

impl<T: I2cTransport + ?Sized> I2cTransport for &mut T {
    fn mem_read(&mut self, address: u16, register: u8, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        (**self).mem_read(address, register, buf, timeout_ms)
    }

    fn mem_write(&mut self, address: u16, register: u8, data: &[u8], timeout_ms: u32) -> TransferResult {
        (**self).mem_write(address, register, data, timeout_ms)
    }

    fn write_raw(&mut self, address: u16, bytes: &[u8], timeout_ms: u32) -> TransferResult {
        (**self).write_raw(address, bytes, timeout_ms)
    }

    fn read_raw(&mut self, address: u16, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        (**self).read_raw(address, buf, timeout_ms)
    }

    fn is_device_ready(&mut self, address: u16, trials: u32, timeout_ms: u32) -> TransferResult {
        (**self).is_device_ready(address, trials, timeout_ms)
    }
}

impl<T: I2cTransport + ?Sized> I2cTransport for Box<T> {
    fn mem_read(&mut self, address: u16, register: u8, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        (**self).mem_read(address, register, buf, timeout_ms)
    }

    fn mem_write(&mut self, address: u16, register: u8, data: &[u8], timeout_ms: u32) -> TransferResult {
        (**self).mem_write(address, register, data, timeout_ms)
    }

    fn write_raw(&mut self, address: u16, bytes: &[u8], timeout_ms: u32) -> TransferResult {
        (**self).write_raw(address, bytes, timeout_ms)
    }

    fn read_raw(&mut self, address: u16, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        (**self).read_raw(address, buf, timeout_ms)
    }

    fn is_device_ready(&mut self, address: u16, trials: u32, timeout_ms: u32) -> TransferResult {
        (**self).is_device_ready(address, trials, timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        failures_left: u32,
        attempts: u32,
    }

    impl I2cTransport for Flaky {
        fn mem_read(&mut self, _: u16, _: u8, _: &mut [u8], _: u32) -> TransferResult {
            Err(TransferStatus::Error)
        }

        fn mem_write(&mut self, _: u16, _: u8, _: &[u8], _: u32) -> TransferResult {
            Err(TransferStatus::Error)
        }

        fn write_raw(&mut self, _: u16, _: &[u8], _: u32) -> TransferResult {
            self.attempts += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                Err(TransferStatus::Timeout)
            } else {
                Ok(())
            }
        }

        fn read_raw(&mut self, _: u16, _: &mut [u8], _: u32) -> TransferResult {
            Err(TransferStatus::Error)
        }
    }

    #[test]
    fn test_bus_type_from_str() {
        assert_eq!(BusType::from_str("I2C"), Some(BusType::I2C));
        assert_eq!(BusType::from_str("sim"), Some(BusType::Sim));
        assert_eq!(BusType::from_str("spi"), None);
    }

    #[test]
    fn test_device_ready_retries_until_ack() {
        let mut bus = Flaky { failures_left: 2, attempts: 0 };
        assert_eq!(bus.is_device_ready(0x28, 3, 100), Ok(()));
        assert_eq!(bus.attempts, 3);
    }

    #[test]
    fn test_device_ready_reports_last_status() {
        let mut bus = Flaky { failures_left: 5, attempts: 0 };
        assert_eq!(bus.is_device_ready(0x28, 3, 100), Err(TransferStatus::Timeout));
        assert_eq!(bus.attempts, 3);
    }

    #[test]
    fn test_status_display_carries_code() {
        assert_eq!(TransferStatus::Busy.to_string(), "2 (busy)");
    }
}
