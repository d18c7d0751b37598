use std::collections::TryReserveError;

use thiserror::Error;
use crate::bus::TransferStatus;

/// Status code reported for a successful call.
pub const STATUS_OK: i8 = 0;

/// Errors surfaced by the HAL binding and the capability functions it installs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    #[error("required device record or transport handle is missing")]
    NullArgument,

    #[error("device context could not be allocated")]
    AllocationFailure,

    #[error("I2C transfer failed: stat={status} addr={address:#04x} reg={register:#04x} len={length}")]
    CommunicationFailure {
        status: TransferStatus,
        /// 7-bit logical address of the device
        address: u8,
        register: u8,
        length: usize,
    },
}

impl HalError {
    /// Numeric status code in the driver calling convention (negative on error).
    pub fn status_code(&self) -> i8 {
        match self {
            HalError::NullArgument => -1,
            HalError::CommunicationFailure { .. } => -2,
            HalError::AllocationFailure => -3,
        }
    }
}

impl From<TryReserveError> for HalError {
    fn from(_: TryReserveError) -> Self {
        HalError::AllocationFailure
    }
}

/// Collapse a capability result into its status code.
pub fn status_of<T>(result: &HalResult<T>) -> i8 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.status_code(),
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Registry and initialization errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Bus '{bus}' initialization failed: {reason}")]
    BusInitError { bus: String, reason: String },

    #[error("Bus '{bus}' not found or unavailable")]
    BusNotFound { bus: String },

    #[error("Sensor '{sensor}' bind failed: {source}")]
    BindError {
        sensor: String,
        #[source]
        source: HalError,
    },

    #[error("Sensor '{sensor}' probe failed: {reason}")]
    ProbeError { sensor: String, reason: String },

    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

impl From<HalError> for String {
    fn from(error: HalError) -> Self {
        error.to_string()
    }
}

impl From<ConfigError> for String {
    fn from(error: ConfigError) -> Self {
        error.to_string()
    }
}

/// Result type aliases for convenience
pub type HalResult<T> = Result<T, HalError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HalError::NullArgument.status_code(), -1);
        assert_eq!(HalError::AllocationFailure.status_code(), -3);
        let err = HalError::CommunicationFailure {
            status: TransferStatus::Timeout,
            address: 0x14,
            register: 0x31,
            length: 12,
        };
        assert_eq!(err.status_code(), -2);
        assert_eq!(status_of::<()>(&Ok(())), STATUS_OK);
        assert_eq!(status_of::<()>(&Err(err)), -2);
    }

    #[test]
    fn test_communication_failure_message() {
        let err = HalError::CommunicationFailure {
            status: TransferStatus::Error,
            address: 0x14,
            register: 0x00,
            length: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("addr=0x14"));
        assert!(msg.contains("reg=0x00"));
        assert!(msg.contains("len=2"));
    }

    #[test]
    fn test_try_reserve_maps_to_allocation_failure() {
        let mut buf: Vec<u8> = Vec::new();
        let err = buf.try_reserve_exact(usize::MAX).unwrap_err();
        assert_eq!(HalError::from(err), HalError::AllocationFailure);
    }
}
