//! In-memory I2C device for running without hardware and for tests

use std::collections::{HashMap, VecDeque};

use super::{I2cTransport, TransferResult, TransferStatus};

/// Transport primitive, used to script faults and inspect traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    MemRead,
    MemWrite,
    WriteRaw,
    ReadRaw,
}

/// One primitive invocation as seen by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub primitive: Primitive,
    pub address: u16,
    pub register: Option<u8>,
    pub length: usize,
    pub timeout_ms: u32,
}

/// A single register-file device sitting on a simulated bus.
///
/// Reads and writes auto-increment the register pointer, the way burst
/// access works on most sensors. A raw write sets the pointer from its
/// first byte and stores any remaining bytes.
pub struct SimulatedBus {
    address: u16,
    present: bool,
    registers: [u8; 256],
    pointer: u8,
    log: Vec<Call>,
    pending: HashMap<Primitive, VecDeque<TransferStatus>>,
    stuck: HashMap<Primitive, TransferStatus>,
}

impl SimulatedBus {
    /// Device answering at the 7-bit `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address: (address as u16) << 1,
            present: true,
            registers: [0; 256],
            pointer: 0,
            log: Vec::new(),
            pending: HashMap::new(),
            stuck: HashMap::new(),
        }
    }

    /// Device with `chip_id` in register 0x00.
    pub fn with_chip_id(address: u8, chip_id: u8) -> Self {
        let mut bus = Self::new(address);
        bus.registers[0] = chip_id;
        bus
    }

    pub fn set_registers(&mut self, start: u8, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.registers[start.wrapping_add(i as u8) as usize] = *b;
        }
    }

    pub fn registers(&self, start: u8, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.registers[start.wrapping_add(i as u8) as usize])
            .collect()
    }

    /// Detach or reattach the device; a detached device NACKs everything.
    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    /// Fail the next call of `primitive` with `status`. Queued faults apply in order.
    pub fn fail_next(&mut self, primitive: Primitive, status: TransferStatus) {
        self.pending.entry(primitive).or_default().push_back(status);
    }

    /// Fail every call of `primitive` until cleared.
    pub fn fail_always(&mut self, primitive: Primitive, status: TransferStatus) {
        self.stuck.insert(primitive, status);
    }

    pub fn clear_faults(&mut self) {
        self.pending.clear();
        self.stuck.clear();
    }

    pub fn calls(&self) -> &[Call] {
        &self.log
    }

    pub fn count(&self, primitive: Primitive) -> usize {
        self.log.iter().filter(|c| c.primitive == primitive).count()
    }

    pub fn clear_calls(&mut self) {
        self.log.clear();
    }

    fn begin(&mut self, primitive: Primitive, address: u16, register: Option<u8>, length: usize, timeout_ms: u32) -> TransferResult {
        self.log.push(Call { primitive, address, register, length, timeout_ms });

        if let Some(status) = self.pending.get_mut(&primitive).and_then(|q| q.pop_front()) {
            return Err(status);
        }
        if let Some(status) = self.stuck.get(&primitive) {
            return Err(*status);
        }
        if !self.present || address != self.address {
            return Err(TransferStatus::Error);
        }
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.registers[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn store(&mut self, data: &[u8]) {
        for b in data {
            self.registers[self.pointer as usize] = *b;
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

impl I2cTransport for SimulatedBus {
    fn mem_read(&mut self, address: u16, register: u8, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        self.begin(Primitive::MemRead, address, Some(register), buf.len(), timeout_ms)?;
        self.pointer = register;
        self.fill(buf);
        Ok(())
    }

    fn mem_write(&mut self, address: u16, register: u8, data: &[u8], timeout_ms: u32) -> TransferResult {
        self.begin(Primitive::MemWrite, address, Some(register), data.len(), timeout_ms)?;
        self.pointer = register;
        self.store(data);
        Ok(())
    }

    fn write_raw(&mut self, address: u16, bytes: &[u8], timeout_ms: u32) -> TransferResult {
        self.begin(Primitive::WriteRaw, address, bytes.first().copied(), bytes.len(), timeout_ms)?;
        if let Some((register, rest)) = bytes.split_first() {
            self.pointer = *register;
            self.store(rest);
        }
        Ok(())
    }

    fn read_raw(&mut self, address: u16, buf: &mut [u8], timeout_ms: u32) -> TransferResult {
        self.begin(Primitive::ReadRaw, address, None, buf.len(), timeout_ms)?;
        self.fill(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_read_auto_increments() {
        let mut bus = SimulatedBus::new(0x14);
        bus.set_registers(0x31, &[1, 2, 3]);
        let mut buf = [0u8; 3];
        bus.mem_read(0x28, 0x31, &mut buf, 1000).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_split_transfer_uses_pointer() {
        let mut bus = SimulatedBus::new(0x14);
        bus.set_registers(0x10, &[0xAA, 0xBB]);
        bus.write_raw(0x28, &[0x10], 500).unwrap();
        let mut buf = [0u8; 2];
        bus.read_raw(0x28, &mut buf, 1000).unwrap();
        assert_eq!(buf, [0xAA, 0xBB]);
    }

    #[test]
    fn test_wrong_address_is_nacked() {
        let mut bus = SimulatedBus::new(0x14);
        let mut buf = [0u8; 1];
        assert_eq!(bus.mem_read(0x2A, 0x00, &mut buf, 1000), Err(TransferStatus::Error));
        assert_eq!(bus.count(Primitive::MemRead), 1);
    }

    #[test]
    fn test_scripted_faults_are_consumed_in_order() {
        let mut bus = SimulatedBus::new(0x14);
        bus.fail_next(Primitive::MemWrite, TransferStatus::Busy);
        bus.fail_next(Primitive::MemWrite, TransferStatus::Timeout);
        assert_eq!(bus.mem_write(0x28, 0x00, &[1], 1000), Err(TransferStatus::Busy));
        assert_eq!(bus.mem_write(0x28, 0x00, &[1], 1000), Err(TransferStatus::Timeout));
        assert_eq!(bus.mem_write(0x28, 0x00, &[1], 1000), Ok(()));
        assert_eq!(bus.registers(0x00, 1), vec![1]);
    }

    #[test]
    fn test_detached_device_fails_probe() {
        let mut bus = SimulatedBus::new(0x14);
        bus.set_present(false);
        assert_eq!(bus.is_device_ready(0x28, 3, 100), Err(TransferStatus::Error));
        assert_eq!(bus.count(Primitive::WriteRaw), 3);
    }
}
