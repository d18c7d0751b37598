use embedded_hal::i2c::{Error as _, ErrorKind, I2c, Operation};
use tracing::trace;

use super::{I2cTransport, TransferResult, TransferStatus};

/// I2C transport over any `embedded-hal` 1.0 blocking bus.
///
/// embedded-hal buses take 7-bit addresses and enforce their own timing, so
/// the transport-convention address is shifted back and timeouts are advisory.
pub struct EmbeddedHalBus<I> {
    bus: I,
}

impl<I: I2c> EmbeddedHalBus<I> {
    pub fn new(bus: I) -> Self {
        Self { bus }
    }

    pub fn into_inner(self) -> I {
        self.bus
    }
}

fn seven_bit(address: u16) -> u8 {
    (address >> 1) as u8
}

fn status_from<E: embedded_hal::i2c::Error>(err: E) -> TransferStatus {
    match err.kind() {
        ErrorKind::ArbitrationLoss => TransferStatus::Busy,
        _ => TransferStatus::Error,
    }
}

impl<I: I2c> I2cTransport for EmbeddedHalBus<I> {
    fn mem_read(&mut self, address: u16, register: u8, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        trace!(addr = seven_bit(address), reg = register, len = buf.len(), timeout_ms, "[i2c] mem_read");
        self.bus
            .write_read(seven_bit(address), &[register], buf)
            .map_err(status_from)
    }

    fn mem_write(&mut self, address: u16, register: u8, data: &[u8], timeout_ms: u32) -> TransferResult {
        trace!(addr = seven_bit(address), reg = register, len = data.len(), timeout_ms, "[i2c] mem_write");
        // Adjacent writes in one transaction go out back to back without a restart.
        let reg = [register];
        let mut ops = [Operation::Write(&reg), Operation::Write(data)];
        self.bus
            .transaction(seven_bit(address), &mut ops)
            .map_err(status_from)
    }

    fn write_raw(&mut self, address: u16, bytes: &[u8], timeout_ms: u32) -> TransferResult {
        trace!(addr = seven_bit(address), len = bytes.len(), timeout_ms, "[i2c] write");
        self.bus.write(seven_bit(address), bytes).map_err(status_from)
    }

    fn read_raw(&mut self, address: u16, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        trace!(addr = seven_bit(address), len = buf.len(), timeout_ms, "[i2c] read");
        self.bus.read(seven_bit(address), buf).map_err(status_from)
    }
}

/// Open a Linux i2c-dev character device (e.g. `/dev/i2c-1`).
#[cfg(feature = "linux-hal")]
pub fn open_linux_bus(path: &str) -> Result<EmbeddedHalBus<crate::hal::I2CDevice>, crate::hal::I2CError> {
    let device = crate::hal::I2CDevice::new(path)?;
    Ok(EmbeddedHalBus::new(device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource};

    #[derive(Debug)]
    struct FakeError(ErrorKind);

    impl embedded_hal::i2c::Error for FakeError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingI2c {
        last_address: Option<u8>,
        written: Vec<u8>,
        fail_with: Option<ErrorKind>,
    }

    impl ErrorType for RecordingI2c {
        type Error = FakeError;
    }

    impl I2c for RecordingI2c {
        fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
            self.last_address = Some(address);
            if let Some(kind) = self.fail_with {
                return Err(FakeError(kind));
            }
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => self.written.extend_from_slice(bytes),
                    Operation::Read(buf) => {
                        for (i, b) in buf.iter_mut().enumerate() {
                            *b = 0xA0 + i as u8;
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_address_is_shifted_back_to_seven_bits() {
        let mut bus = EmbeddedHalBus::new(RecordingI2c::default());
        let mut buf = [0u8; 2];
        bus.mem_read(0x14 << 1, 0x00, &mut buf, 1000).unwrap();
        let inner = bus.into_inner();
        assert_eq!(inner.last_address, Some(0x14));
        assert_eq!(inner.written, vec![0x00]);
        assert_eq!(buf, [0xA0, 0xA1]);
    }

    #[test]
    fn test_mem_write_sends_register_then_payload() {
        let mut bus = EmbeddedHalBus::new(RecordingI2c::default());
        bus.mem_write(0x28, 0x06, &[0x01, 0x02], 1000).unwrap();
        assert_eq!(bus.into_inner().written, vec![0x06, 0x01, 0x02]);
    }

    #[test]
    fn test_error_kinds_map_to_status() {
        let mut bus = EmbeddedHalBus::new(RecordingI2c {
            fail_with: Some(ErrorKind::ArbitrationLoss),
            ..Default::default()
        });
        assert_eq!(bus.write_raw(0x28, &[0x00], 500), Err(TransferStatus::Busy));

        let mut bus = EmbeddedHalBus::new(RecordingI2c {
            fail_with: Some(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            ..Default::default()
        });
        let mut buf = [0u8; 1];
        assert_eq!(bus.read_raw(0x28, &mut buf, 1000), Err(TransferStatus::Error));
    }
}
