use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static MONO_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Header metadata common to all sensor messages
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Header {
    /// Unique device identifier
    pub device_id: String,
    /// Sensor identifier from configuration (e.g., "mag0")
    pub sensor_id: String,
    /// Sequence number for message ordering
    pub seq: u64,
    /// UTC timestamp in nanoseconds
    pub t_utc_ns: u64,
    /// Nanoseconds since the process started polling
    pub t_mono_ns: u64,
    /// Message schema version for evolution
    pub schema_v: u16,
}

impl Header {
    /// Create a new header with current timestamps
    pub fn new(device_id: String, sensor_id: String, seq: u64) -> Self {
        let now_utc = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let t_mono_ns = MONO_EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64;

        Self {
            device_id,
            sensor_id,
            seq,
            t_utc_ns: now_utc,
            t_mono_ns,
            schema_v: 1,
        }
    }
}

/// Raw magnetometer data block as read from the sensor
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MagSampleMessage {
    pub h: Header,
    /// 7-bit device address
    pub address: u8,
    /// First register of the block
    pub register: u8,
    pub raw: Vec<u8>,
    /// X, Y, Z and temperature as signed 24-bit counts, uncompensated
    pub counts: Vec<i32>,
}

impl MagSampleMessage {
    pub fn from_block(h: Header, address: u8, register: u8, raw: Vec<u8>) -> Self {
        let counts = raw
            .chunks_exact(3)
            .map(|c| sign_extend_24([c[0], c[1], c[2]]))
            .collect();
        Self { h, address, register, raw, counts }
    }

    /// Serialize to JSON for logging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Little-endian 24-bit two's complement to i32.
pub fn sign_extend_24(bytes: [u8; 3]) -> i32 {
    let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    (value << 8) >> 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_creation() {
        let header = Header::new("test_device".to_string(), "mag0".to_string(), 42);

        assert_eq!(header.device_id, "test_device");
        assert_eq!(header.sensor_id, "mag0");
        assert_eq!(header.seq, 42);
        assert_eq!(header.schema_v, 1);
        assert!(header.t_utc_ns > 0);
    }

    #[test]
    fn test_sign_extend_24() {
        assert_eq!(sign_extend_24([0x01, 0x00, 0x00]), 1);
        assert_eq!(sign_extend_24([0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(sign_extend_24([0x00, 0x00, 0x80]), -8_388_608);
        assert_eq!(sign_extend_24([0xFF, 0xFF, 0x7F]), 8_388_607);
    }

    #[test]
    fn test_sample_message_json() {
        let header = Header::new("hub".to_string(), "mag0".to_string(), 1);
        let raw = vec![0x10, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00];
        let msg = MagSampleMessage::from_block(header, 0x14, 0x31, raw);
        assert_eq!(msg.counts, vec![16, -1, 0, 32]);

        let json = msg.to_json().unwrap();
        assert!(json.contains("mag0"));

        let decoded: MagSampleMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.counts, msg.counts);
        assert_eq!(decoded.address, 0x14);
    }
}
