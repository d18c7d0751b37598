//! Platform bus types for the I2C transport
//!
//! On Linux the transport is a `/dev/i2c-N` character device driven through
//! `linux-embedded-hal`. Other platforms bind an `embedded-hal` bus of their
//! own through `bus::i2c::EmbeddedHalBus`, or use the simulated bus.

#[cfg(feature = "linux-hal")]
pub mod linux {
    pub use linux_embedded_hal::I2cdev as I2CDevice;
    pub use linux_embedded_hal::i2cdev::linux::LinuxI2CError as I2CError;
}

#[cfg(feature = "linux-hal")]
pub use linux::*;
