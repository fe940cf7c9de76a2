//! Shared test doubles: an in-memory register file and a recording sink.
//!
//! Both hand out cloneable handles over shared state so a test can keep
//! inspecting them after moving a handle into the device under test.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::vec::Vec;

use crate::bus::RegisterBus;
use crate::event::{EventSink, TouchAxis, TouchKey};
use crate::pdt::{PDT_ENTRY_SIZE, PDT_START};

/// Error returned by [`MockBus`] when scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockBusError;

#[derive(Default)]
struct BusState {
    regs: HashMap<u16, u8>,
    writes: Vec<(u16, Vec<u8>)>,
    reads: usize,
    attn: Vec<bool>,
    fail_read_at: Option<u16>,
    fail_write_at: Option<u16>,
}

/// In-memory register file with scripted failures.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Rc<RefCell<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preloads consecutive registers starting at `addr`.
    pub fn load(&self, addr: u16, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        for (offset, byte) in bytes.iter().enumerate() {
            state.regs.insert(addr + offset as u16, *byte);
        }
    }

    /// Lays out a descriptor entry at `slot` (0 = highest address) of
    /// `page`.
    pub fn load_pdt_entry(&self, page: u16, slot: u16, entry: &[u8; 6]) {
        let addr = (PDT_START - slot * PDT_ENTRY_SIZE) | (page << 8);
        self.load(addr, entry);
    }

    /// Makes every read starting at `addr` fail.
    pub fn fail_read_at(&self, addr: u16) {
        self.state.borrow_mut().fail_read_at = Some(addr);
    }

    /// Makes every write starting at `addr` fail.
    pub fn fail_write_at(&self, addr: u16) {
        self.state.borrow_mut().fail_write_at = Some(addr);
    }

    /// Number of successful reads served.
    pub fn reads(&self) -> usize {
        self.state.borrow().reads
    }

    /// Every write served, in order.
    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.state.borrow().writes.clone()
    }

    /// The most recent byte written at `addr`, if any.
    pub fn written_byte(&self, addr: u16) -> Option<u8> {
        self.state
            .borrow()
            .writes
            .iter()
            .rev()
            .find(|(at, _)| *at == addr)
            .map(|(_, bytes)| bytes[0])
    }

    /// Every attention-gating call, in order.
    pub fn attn_log(&self) -> Vec<bool> {
        self.state.borrow().attn.clone()
    }
}

impl RegisterBus for MockBus {
    type Error = MockBusError;

    async fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), MockBusError> {
        let mut state = self.state.borrow_mut();
        if state.fail_read_at == Some(addr) {
            return Err(MockBusError);
        }
        state.reads += 1;
        for (offset, slot) in buf.iter_mut().enumerate() {
            *slot = state.regs.get(&(addr + offset as u16)).copied().unwrap_or(0);
        }
        Ok(())
    }

    async fn write(&mut self, addr: u16, buf: &[u8]) -> Result<(), MockBusError> {
        let mut state = self.state.borrow_mut();
        if state.fail_write_at == Some(addr) {
            return Err(MockBusError);
        }
        state.writes.push((addr, buf.to_vec()));
        for (offset, byte) in buf.iter().enumerate() {
            state.regs.insert(addr + offset as u16, *byte);
        }
        Ok(())
    }

    async fn enable_attn(&mut self, enable: bool) -> Result<(), MockBusError> {
        self.state.borrow_mut().attn.push(enable);
        Ok(())
    }
}

/// One call observed by [`MockSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCall {
    Range(TouchAxis, u16, u16),
    Key(TouchKey, bool),
    Abs(TouchAxis, u16),
    Sync,
}

/// Recording input-event sink.
#[derive(Clone, Default)]
pub struct MockSink {
    calls: Rc<RefCell<Vec<SinkCall>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything seen so far, in order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.borrow().clone()
    }

    /// Forgets everything seen so far.
    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    /// How often `key` was reported with `pressed`.
    pub fn key_count(&self, key: TouchKey, pressed: bool) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| **call == SinkCall::Key(key, pressed))
            .count()
    }

    /// Every value reported on `axis`, in order.
    pub fn abs_values(&self, axis: TouchAxis) -> Vec<u16> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Abs(at, value) if *at == axis => Some(*value),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MockSink {
    fn set_abs_range(&mut self, axis: TouchAxis, min: u16, max: u16) {
        self.calls.borrow_mut().push(SinkCall::Range(axis, min, max));
    }

    fn report_key(&mut self, key: TouchKey, pressed: bool) {
        self.calls.borrow_mut().push(SinkCall::Key(key, pressed));
    }

    fn report_abs(&mut self, axis: TouchAxis, value: u16) {
        self.calls.borrow_mut().push(SinkCall::Abs(axis, value));
    }

    fn sync(&mut self) {
        self.calls.borrow_mut().push(SinkCall::Sync);
    }
}
