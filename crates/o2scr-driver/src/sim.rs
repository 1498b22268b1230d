// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated SmartCardBus controller
//!
//! A behavioural model of the register file, used by the test suite and by
//! the CLI's `--simulate` mode. No hardware required.
//!
//! Model:
//! - Writing a non-zero command other than `RESET` to `EXE` applies its
//!   effect at once and raises `END_EXE` after a configurable number of
//!   `STATUS_IT` polls (or never).
//! - `POWER_ON` powers an inserted card and loads its ATR into the FIFO.
//! - `DEVAL_IT` clears every bit written as zero.
//! - Reads of the I/O FIFO port return the data byte in the upper half and
//!   filler in the lower half.
//!
//! Every register write is recorded so tests can assert on exact sequences.

use crate::mmio::RegisterAccess;
use o2scr_chip::regs::{self, exch, exe, it};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Filler the simulated I/O port places in the low half of each word.
pub const IO_FILLER: u16 = 0x005A;

/// A recorded register write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    /// Memory window offset
    pub offset: usize,
    /// Value written
    pub value: u16,
}

/// A card sitting in the simulated slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCard {
    /// Answer-To-Reset sent after activation
    pub atr: Vec<u8>,
    /// Exchange-status bits reported while powered (synchronous card types)
    pub sync_bits: u16,
}

impl SimCard {
    /// An asynchronous (processor) card
    pub fn processor(atr: &[u8]) -> Self {
        Self {
            atr: atr.to_vec(),
            sync_bits: 0,
        }
    }

    /// A synchronous memory card reporting `sync_bits`
    pub fn memory(sync_bits: u16) -> Self {
        Self {
            atr: Vec::new(),
            sync_bits,
        }
    }
}

#[derive(Debug)]
struct SimState {
    mem: HashMap<usize, u16>,
    status_it: u16,
    fifo: VecDeque<u8>,
    card: Option<SimCard>,
    powered: bool,
    completion_delay: Option<u32>,
    pending: Option<u32>,
    fifo_count_override: Option<u16>,
    stuck_powered: bool,
    stuck_fifo: bool,
    writes: Vec<RegWrite>,
    status_polls: u32,
}

/// Register-level model of the controller
#[derive(Debug)]
pub struct SimulatedController {
    state: Mutex<SimState>,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedController {
    /// Empty slot, commands complete on the first poll
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                mem: HashMap::new(),
                status_it: 0,
                fifo: VecDeque::new(),
                card: None,
                powered: false,
                completion_delay: Some(1),
                pending: None,
                fifo_count_override: None,
                stuck_powered: false,
                stuck_fifo: false,
                writes: Vec::new(),
                status_polls: 0,
            }),
        }
    }

    /// Simulator with a card already inserted
    pub fn with_card(card: SimCard) -> Self {
        let sim = Self::new();
        sim.insert(card);
        sim
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert a card into the slot
    pub fn insert(&self, card: SimCard) {
        self.lock().card = Some(card);
    }

    /// Pull the card out
    pub fn remove(&self) {
        let mut s = self.lock();
        s.card = None;
        s.powered = false;
    }

    /// Polls after which `END_EXE` rises; `None` never completes
    pub fn set_completion_delay(&self, polls: Option<u32>) {
        self.lock().completion_delay = polls;
    }

    /// Report this value from `FIFO_NB` regardless of the FIFO contents
    pub fn force_fifo_count(&self, count: Option<u16>) {
        self.lock().fifo_count_override = count;
    }

    /// Keep the card powered through `POWER_OFF`
    pub fn set_stuck_powered(&self, stuck: bool) {
        self.lock().stuck_powered = stuck;
    }

    /// Ignore `RST_FIFO`
    pub fn set_stuck_fifo(&self, stuck: bool) {
        self.lock().stuck_fifo = stuck;
    }

    /// Mark the card powered without running a command
    pub fn set_powered(&self, powered: bool) {
        self.lock().powered = powered;
    }

    /// Append bytes to the receive FIFO
    pub fn push_fifo(&self, bytes: &[u8]) {
        self.lock().fifo.extend(bytes);
    }

    /// Assert interrupt status bits, as the hardware would
    pub fn raise(&self, bits: u16) {
        self.lock().status_it |= bits;
    }

    /// Current interrupt status, without counting as a poll
    pub fn status_it(&self) -> u16 {
        self.lock().status_it
    }

    /// Last value written to a memory register, without side effects
    pub fn reg(&self, offset: usize) -> u16 {
        self.lock().mem.get(&offset).copied().unwrap_or(0)
    }

    /// Bytes still in the FIFO
    pub fn fifo_len(&self) -> usize {
        self.lock().fifo.len()
    }

    /// All writes so far, in order
    pub fn writes(&self) -> Vec<RegWrite> {
        self.lock().writes.clone()
    }

    /// Values written to one register, in order
    pub fn writes_to(&self, offset: usize) -> Vec<u16> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.offset == offset)
            .map(|w| w.value)
            .collect()
    }

    /// Forget recorded writes and poll count
    pub fn clear_log(&self) {
        let mut s = self.lock();
        s.writes.clear();
        s.status_polls = 0;
    }

    /// Number of `STATUS_IT` reads so far
    pub fn status_polls(&self) -> u32 {
        self.lock().status_polls
    }
}

impl SimState {
    fn exchange_status(&self) -> u16 {
        let mut status = 0;
        if let Some(card) = &self.card {
            status |= exch::CARD_INS;
            if self.powered {
                status |= card.sync_bits & exch::SYNC_CARD_MASK;
            }
        }
        if self.powered {
            status |= exch::POW_ON;
        }
        if self.fifo.is_empty() {
            status |= exch::FIFO_EMPTY;
        }
        if self.fifo.len() >= usize::from(regs::FIFO_NB_MASK) {
            status |= exch::FIFO_FULL;
        }
        status
    }

    fn run_command(&mut self, command: u16) {
        if command & exe::POWER_ON != 0 {
            if let Some(card) = &self.card {
                self.powered = true;
                if card.sync_bits & exch::SYNC_CARD_MASK == 0 {
                    let atr = card.atr.clone();
                    self.fifo.extend(atr);
                }
            }
        }
        if command & exe::POWER_OFF != 0 && !self.stuck_powered {
            self.powered = false;
        }
        if command & exe::RST_FIFO != 0 && !self.stuck_fifo {
            self.fifo.clear();
        }
        if command & !exe::RESET != 0 {
            self.pending = self.completion_delay;
        }
    }
}

impl RegisterAccess for SimulatedController {
    fn read16(&self, offset: usize) -> u16 {
        let mut s = self.lock();
        match offset {
            regs::STATUS_IT => {
                s.status_polls += 1;
                if let Some(remaining) = s.pending {
                    if remaining <= 1 {
                        s.status_it |= it::END_EXE;
                        s.pending = None;
                    } else {
                        s.pending = Some(remaining - 1);
                    }
                }
                s.status_it
            }
            regs::STATUS_EXCH => s.exchange_status(),
            regs::FIFO_NB => s
                .fifo_count_override
                .unwrap_or_else(|| u16::try_from(s.fifo.len()).unwrap_or(u16::MAX)),
            other => s.mem.get(&other).copied().unwrap_or(0),
        }
    }

    fn write16(&self, offset: usize, value: u16) {
        let mut s = self.lock();
        s.writes.push(RegWrite { offset, value });
        s.mem.insert(offset, value);
        match offset {
            regs::DEVAL_IT => s.status_it &= value,
            regs::EXE if value != 0 => s.run_command(value),
            _ => {}
        }
    }

    fn read_io16(&self, offset: usize) -> u16 {
        let mut s = self.lock();
        if offset != regs::FIFO_OUT {
            return 0;
        }
        s.fifo
            .pop_front()
            .map_or(0, |b| (u16::from(b) << 8) | IO_FILLER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_on_loads_atr_into_fifo() {
        let sim = SimulatedController::with_card(SimCard::processor(&[0x3B, 0x00]));
        sim.write16(regs::EXE, exe::POWER_ON);
        assert_eq!(sim.read16(regs::FIFO_NB), 2);
        assert_ne!(sim.read16(regs::STATUS_EXCH) & exch::POW_ON, 0);
        assert_eq!(sim.read_io16(regs::FIFO_OUT), 0x3B5A);
    }

    #[test]
    fn completion_after_configured_polls() {
        let sim = SimulatedController::new();
        sim.set_completion_delay(Some(3));
        sim.write16(regs::EXE, exe::RST_FIFO);
        assert_eq!(sim.read16(regs::STATUS_IT) & it::END_EXE, 0);
        assert_eq!(sim.read16(regs::STATUS_IT) & it::END_EXE, 0);
        assert_ne!(sim.read16(regs::STATUS_IT) & it::END_EXE, 0);
        assert_eq!(sim.status_polls(), 3);
    }

    #[test]
    fn deval_clears_zero_bits() {
        let sim = SimulatedController::new();
        sim.raise(it::END_EXE | it::IT_REC);
        sim.write16(regs::DEVAL_IT, !it::END_EXE);
        assert_eq!(sim.status_it(), it::IT_REC);
    }

    #[test]
    fn raw_reset_does_not_complete() {
        let sim = SimulatedController::new();
        sim.write16(regs::EXE, exe::RESET);
        assert_eq!(sim.read16(regs::STATUS_IT), 0);
    }
}
