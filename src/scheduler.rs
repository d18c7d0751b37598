use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::errors::HalResult;
use crate::messages::{Header, MagSampleMessage};
use crate::registry::BoundSensor;

/// First register of the raw X/Y/Z/temperature block
pub const MAG_DATA_REGISTER: u8 = 0x31;
/// Four 24-bit values
pub const MAG_DATA_LEN: usize = 12;

const DEVICE_ID: &str = "navigate_maghal";

/// Counters reported when a bounded poll loop finishes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub cycles: u64,
    pub samples: u64,
    pub failures: u64,
}

struct Slot {
    period: Duration,
    next_due: Instant,
    seq: u64,
}

/// Read one raw data block through the sensor's bound capabilities.
pub fn poll_sensor(sensor: &mut BoundSensor<'_>, seq: u64) -> HalResult<MagSampleMessage> {
    let mut raw = vec![0u8; MAG_DATA_LEN];
    sensor.device.read_register(MAG_DATA_REGISTER, &mut raw)?;
    let header = Header::new(DEVICE_ID.to_string(), sensor.id.clone(), seq);
    Ok(MagSampleMessage::from_block(header, sensor.address, MAG_DATA_REGISTER, raw))
}

/// Poll every sensor at its configured rate on the calling thread.
///
/// Failed reads are logged and polling carries on. Runs forever unless
/// `max_cycles` is given; a cycle is one wake-up of the loop.
pub fn run_poll_loop(sensors: &mut [BoundSensor<'_>], max_cycles: Option<u64>) -> PollStats {
    let mut stats = PollStats::default();
    if sensors.is_empty() {
        warn!("[scheduler] no sensors to poll");
        return stats;
    }

    let start = Instant::now();
    let mut slots: Vec<Slot> = sensors
        .iter()
        .map(|s| Slot {
            period: Duration::from_nanos(1_000_000_000 / s.frequency.max(1) as u64),
            next_due: start,
            seq: 0,
        })
        .collect();

    for s in sensors.iter() {
        info!("[{}] polling at {}Hz", s.id, s.frequency);
    }

    while max_cycles.map_or(true, |max| stats.cycles < max) {
        let now = Instant::now();
        for (sensor, slot) in sensors.iter_mut().zip(slots.iter_mut()) {
            if slot.next_due > now {
                continue;
            }
            slot.seq += 1;
            match poll_sensor(sensor, slot.seq) {
                Ok(msg) => {
                    stats.samples += 1;
                    match msg.to_json() {
                        Ok(json) => info!("[{}] {}", sensor.id, json),
                        Err(e) => warn!("[{}] failed to encode sample: {}", sensor.id, e),
                    }
                }
                Err(e) => {
                    stats.failures += 1;
                    error!("[{}] get_mag_data failed: {} (status {})", sensor.id, e, e.status_code());
                }
            }
            slot.next_due += slot.period;
            // missed deadlines are dropped rather than replayed
            if slot.next_due < now {
                slot.next_due = now + slot.period;
            }
        }
        stats.cycles += 1;

        if max_cycles.map_or(false, |max| stats.cycles >= max) {
            break;
        }
        if let Some(next) = slots.iter().map(|s| s.next_due).min() {
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind_with_time_source;
    use crate::bus::sim::{Primitive, SimulatedBus};
    use crate::bus::TransferStatus;
    use crate::sensor::SensorDevice;
    use crate::timing::{CoarseSleep, TimeSource};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct NoSleep;

    impl CoarseSleep for NoSleep {
        fn sleep_ms(&self, _ms: u32) {}
    }

    fn bound<'bus>(bus: &'bus RefCell<SimulatedBus>, frequency: u32) -> BoundSensor<'bus> {
        let mut device = SensorDevice::new();
        bind_with_time_source(Some(&mut device), Some(bus), 0x14, TimeSource::Coarse(Rc::new(NoSleep))).unwrap();
        BoundSensor {
            id: "mag0".to_string(),
            address: 0x14,
            frequency,
            device,
            ready: true,
        }
    }

    #[test]
    fn test_poll_sensor_reads_data_block() {
        let bus = RefCell::new(SimulatedBus::new(0x14));
        bus.borrow_mut().set_registers(MAG_DATA_REGISTER, &[0x01, 0, 0, 0x02, 0, 0, 0x03, 0, 0, 0x04, 0, 0]);
        let mut sensor = bound(&bus, 10);

        let msg = poll_sensor(&mut sensor, 7).unwrap();
        assert_eq!(msg.h.seq, 7);
        assert_eq!(msg.counts, vec![1, 2, 3, 4]);
        assert_eq!(bus.borrow().calls()[0].length, MAG_DATA_LEN);
    }

    #[test]
    fn test_loop_keeps_going_after_failures() {
        let bus = RefCell::new(SimulatedBus::new(0x14));
        bus.borrow_mut().fail_next(Primitive::MemRead, TransferStatus::Error);
        bus.borrow_mut().fail_next(Primitive::WriteRaw, TransferStatus::Error);
        let mut sensors = vec![bound(&bus, 1000)];

        let stats = run_poll_loop(&mut sensors, Some(3));
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.samples + stats.failures, 3);
    }

    #[test]
    fn test_empty_sensor_list() {
        let mut sensors: Vec<BoundSensor<'_>> = Vec::new();
        assert_eq!(run_poll_loop(&mut sensors, Some(5)), PollStats::default());
    }
}
