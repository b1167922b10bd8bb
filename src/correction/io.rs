//! Register I/O seam and an in-memory register bank.
//!
//! The engine never talks to hardware directly. It builds byte frames for
//! the active [`CameraFamily`] and hands them to a [`RegisterIo`]
//! implementation. Status `0` means success; any other value is reported as
//! [`SelfCalError::Register`].

use crate::camera::{CameraFamily, LogicalRegister, OPCODE_READ, OPCODE_WRITE};
use crate::util::{SelfCalError, SelfCalResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Transport for register frames.
pub trait RegisterIo: Send {
    /// Sends a read request and fills `response`. Returns a status code.
    fn read(&mut self, request: &[u8], response: &mut [u8]) -> i32;

    /// Sends a write frame. Returns a status code.
    fn write(&mut self, frame: &[u8]) -> i32;
}

impl RegisterIo for Box<dyn RegisterIo> {
    fn read(&mut self, request: &[u8], response: &mut [u8]) -> i32 {
        (**self).read(request, response)
    }

    fn write(&mut self, frame: &[u8]) -> i32 {
        (**self).write(frame)
    }
}

/// Adapts a pair of closures to [`RegisterIo`].
pub struct RegisterCallbacks<R, W> {
    read: R,
    write: W,
}

impl<R, W> RegisterCallbacks<R, W>
where
    R: FnMut(&[u8], &mut [u8]) -> i32 + Send,
    W: FnMut(&[u8]) -> i32 + Send,
{
    pub fn new(read: R, write: W) -> Self {
        Self { read, write }
    }
}

impl<R, W> RegisterIo for RegisterCallbacks<R, W>
where
    R: FnMut(&[u8], &mut [u8]) -> i32 + Send,
    W: FnMut(&[u8]) -> i32 + Send,
{
    fn read(&mut self, request: &[u8], response: &mut [u8]) -> i32 {
        (self.read)(request, response)
    }

    fn write(&mut self, frame: &[u8]) -> i32 {
        (self.write)(frame)
    }
}

/// One decoded register write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u16,
    pub value: u16,
}

#[derive(Debug, Default)]
struct BankState {
    values: HashMap<u16, u16>,
    writes: Vec<RegisterWrite>,
    reads: usize,
    fail_status: i32,
    hold_eeprom_busy: bool,
}

/// In-memory register file speaking the family's frame format.
///
/// Clones share the same registers, so a test can keep a handle after moving
/// one into the engine. Writes to the EEPROM control register complete
/// immediately (the busy bit reads back clear) unless
/// [`MemoryRegisterBank::hold_eeprom_busy`] is set.
#[derive(Clone, Debug)]
pub struct MemoryRegisterBank {
    family: CameraFamily,
    state: Arc<Mutex<BankState>>,
}

/// EEPROM busy / auto-calibration commit bit.
pub const EEPROM_COMMIT_BIT: u16 = 0x0004;

impl MemoryRegisterBank {
    /// Creates a bank with every register at zero.
    pub fn new(family: CameraFamily) -> Self {
        Self {
            family,
            state: Arc::new(Mutex::new(BankState::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BankState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The family whose address map and frame layout the bank uses.
    pub fn family(&self) -> CameraFamily {
        self.family
    }

    /// Sets a register without logging a write.
    pub fn set(&self, register: LogicalRegister, value: u16) {
        let address = self.family.address(register);
        self.lock().values.insert(address, value);
    }

    /// Current register value.
    pub fn get(&self, register: LogicalRegister) -> u16 {
        let address = self.family.address(register);
        self.lock().values.get(&address).copied().unwrap_or(0)
    }

    /// All writes received, in order.
    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.lock().writes.clone()
    }

    /// Values written to one register, in order.
    pub fn writes_to(&self, register: LogicalRegister) -> Vec<u16> {
        let address = self.family.address(register);
        self.lock()
            .writes
            .iter()
            .filter(|w| w.address == address)
            .map(|w| w.value)
            .collect()
    }

    /// Number of read requests served.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Forgets logged writes and reads.
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.reads = 0;
    }

    /// Makes every access return `status` (0 restores normal operation).
    pub fn fail_with(&self, status: i32) {
        self.lock().fail_status = status;
    }

    /// Keeps the EEPROM busy bit set after a commit request.
    pub fn hold_eeprom_busy(&self, hold: bool) {
        self.lock().hold_eeprom_busy = hold;
    }
}

impl RegisterIo for MemoryRegisterBank {
    fn read(&mut self, request: &[u8], response: &mut [u8]) -> i32 {
        let mut state = self.lock();
        if state.fail_status != 0 {
            return state.fail_status;
        }
        if request.len() < 3 || request[0] != OPCODE_READ || response.len() < 8 {
            return -1;
        }
        let address = u16::from_be_bytes([request[1], request[2]]);
        let value = state.values.get(&address).copied().unwrap_or(0);
        response.fill(0);
        response[6..8].copy_from_slice(&value.to_be_bytes());
        state.reads += 1;
        0
    }

    fn write(&mut self, frame: &[u8]) -> i32 {
        let mut state = self.lock();
        if state.fail_status != 0 {
            return state.fail_status;
        }
        if frame.len() < 5 || frame[0] != OPCODE_WRITE {
            return -1;
        }
        let address = u16::from_be_bytes([frame[1], frame[2]]);
        let value = u16::from_be_bytes([frame[3], frame[4]]);
        state.writes.push(RegisterWrite { address, value });
        let stored = if address == self.family.address(LogicalRegister::EepromControl)
            && !state.hold_eeprom_busy
        {
            value & !EEPROM_COMMIT_BIT
        } else {
            value
        };
        state.values.insert(address, stored);
        0
    }
}

/// Frames logical register accesses for one family and paces them.
pub(crate) struct RegisterBus {
    family: CameraFamily,
    io: Box<dyn RegisterIo>,
    settle: Duration,
}

impl RegisterBus {
    pub(crate) fn new(family: CameraFamily, io: Box<dyn RegisterIo>, settle: Duration) -> Self {
        Self { family, io, settle }
    }

    fn pause(&self) {
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
    }

    /// Reads a register as an unsigned 16-bit value.
    pub(crate) fn read(&mut self, register: LogicalRegister) -> SelfCalResult<u16> {
        let request = self.family.encode_read(register);
        let mut response = vec![0u8; self.family.frame_layout().read_response_len];
        let status = self.io.read(&request, &mut response);
        self.pause();
        if status != 0 {
            return Err(SelfCalError::Register { register, status });
        }
        CameraFamily::decode_read(&response).ok_or(SelfCalError::ShortResponse {
            register,
            got: response.len(),
        })
    }

    /// Writes the low 16 bits of `value`.
    pub(crate) fn write(&mut self, register: LogicalRegister, value: i32) -> SelfCalResult<()> {
        let frame = self.family.encode_write(register, value as u16);
        let status = self.io.write(&frame);
        self.pause();
        if status != 0 {
            return Err(SelfCalError::Register { register, status });
        }
        Ok(())
    }
}
