//! Control channel
//!
//! A [`Session`] is the single open handle on a device. Opening is an atomic
//! test-and-set; a second open fails with `Busy` until the first session is
//! closed or dropped. Commands arrive either typed ([`Command`]) or as raw
//! codes through [`Session::ioctl`], the stable numeric surface.

use crate::controller::{AtrBuffer, Controller};
use crate::device::Device;
use crate::error::{Result, ScrError};
use crate::mmio::RegisterAccess;
use std::sync::{MutexGuard, TryLockError};

const IOC_MAGIC: u32 = b'o' as u32;

const fn io(nr: u32) -> u32 {
    (IOC_MAGIC << 8) | nr
}

/// Control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Reset the controller
    Reset,
    /// Read the exchange status word
    Status,
    /// Power the card and capture its ATR
    PowerOn,
    /// Power the card down
    PowerOff,
    /// Copy the captured ATR out
    GetAtr,
}

impl Command {
    /// Every command, in code order
    pub const ALL: [Self; 5] = [
        Self::Reset,
        Self::Status,
        Self::PowerOn,
        Self::PowerOff,
        Self::GetAtr,
    ];

    /// Numeric command code
    pub const fn code(self) -> u32 {
        match self {
            Self::Reset => io(1),
            Self::Status => io(2),
            Self::PowerOn => io(3),
            Self::PowerOff => io(4),
            Self::GetAtr => io(5),
        }
    }

    /// Decode a numeric command code
    ///
    /// # Errors
    ///
    /// Returns `ScrError::UnsupportedOperation` for unknown codes.
    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(ScrError::UnsupportedOperation { code })
    }
}

/// Result of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Command completed, nothing to return
    Done,
    /// Exchange status word
    Status(u16),
    /// Number of ATR bytes copied to the caller
    Atr(usize),
}

/// Exclusive session on a device
#[derive(Debug)]
pub struct Session<'a, R: RegisterAccess> {
    device: &'a Device<R>,
    atr: MutexGuard<'a, AtrBuffer>,
}

impl<'a, R: RegisterAccess> Session<'a, R> {
    pub(crate) fn open(device: &'a Device<R>) -> Result<Self> {
        let atr = match device.atr.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("{}: open refused, busy", device.name());
                return Err(ScrError::Busy);
            }
            // A holder that panicked mid-capture left the length at zero,
            // so no partial ATR is readable.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        tracing::debug!("{}: session opened", device.name());
        Ok(Self { device, atr })
    }

    /// Device this session holds
    pub const fn device(&self) -> &Device<R> {
        self.device
    }

    /// Direct access to the controller engine
    pub fn controller(&mut self) -> Controller<'_, R> {
        Controller::new(
            &self.device.regs,
            &self.device.mask,
            &mut *self.atr,
            &self.device.config,
        )
    }

    /// Reset the controller (best effort, always succeeds)
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn reset(&mut self) -> Result<()> {
        self.controller().reset()
    }

    /// Current exchange status word
    pub fn status(&mut self) -> u16 {
        self.controller().exchange_status()
    }

    /// Power the card and capture its ATR
    ///
    /// # Errors
    ///
    /// `Timeout`, `UnsupportedCard` or `BufferTooSmall` from the engine.
    pub fn power_on(&mut self) -> Result<()> {
        self.controller().power_on().map(|_| ())
    }

    /// Power the card down
    ///
    /// # Errors
    ///
    /// `Timeout` or `PowerOffFailed` from the engine.
    pub fn power_off(&mut self) -> Result<()> {
        self.controller().power_off()
    }

    /// The captured ATR, without copying
    pub fn atr(&self) -> &[u8] {
        self.atr.as_slice()
    }

    /// Copy the captured ATR into `buf`
    ///
    /// # Errors
    ///
    /// Returns `ScrError::BufferTooSmall` if `buf` is shorter than the ATR.
    pub fn get_atr(&self, buf: &mut [u8]) -> Result<usize> {
        let atr = self.atr.as_slice();
        if buf.len() < atr.len() {
            return Err(ScrError::BufferTooSmall {
                needed: atr.len(),
                capacity: buf.len(),
            });
        }
        buf[..atr.len()].copy_from_slice(atr);
        Ok(atr.len())
    }

    /// Run one command
    ///
    /// `buf` is only used by [`Command::GetAtr`].
    ///
    /// # Errors
    ///
    /// Propagates the engine error of the command unchanged.
    pub fn command(&mut self, cmd: Command, buf: &mut [u8]) -> Result<Reply> {
        tracing::debug!("{}: {cmd:?}", self.device.name());
        match cmd {
            Command::Reset => self.reset().map(|()| Reply::Done),
            Command::Status => Ok(Reply::Status(self.status())),
            Command::PowerOn => self.power_on().map(|()| Reply::Done),
            Command::PowerOff => self.power_off().map(|()| Reply::Done),
            Command::GetAtr => self.get_atr(buf).map(Reply::Atr),
        }
    }

    /// Run a command given by numeric code
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` for unknown codes, otherwise as [`Self::command`].
    pub fn ioctl(&mut self, code: u32, buf: &mut [u8]) -> Result<Reply> {
        let cmd = Command::from_code(code)?;
        self.command(cmd, buf)
    }

    /// Release the control channel
    pub fn close(self) {}
}

impl<R: RegisterAccess> Drop for Session<'_, R> {
    fn drop(&mut self) {
        tracing::debug!("{}: session closed", self.device.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::sim::{SimCard, SimulatedController};
    use o2scr_chip::regs::exch;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Simulator whose Nth I/O read panics
    struct FailingIo {
        sim: SimulatedController,
        io_reads: AtomicUsize,
        fail_at: AtomicUsize,
    }

    impl RegisterAccess for FailingIo {
        fn read16(&self, offset: usize) -> u16 {
            self.sim.read16(offset)
        }

        fn write16(&self, offset: usize, value: u16) {
            self.sim.write16(offset, value);
        }

        fn read_io16(&self, offset: usize) -> u16 {
            let n = self.io_reads.fetch_add(1, Ordering::SeqCst) + 1;
            assert_ne!(n, self.fail_at.load(Ordering::SeqCst), "I/O read {n} failed");
            self.sim.read_io16(offset)
        }
    }

    const ATR: [u8; 4] = [0x3B, 0x02, 0x14, 0x50];

    fn device(sim: SimulatedController) -> Device<SimulatedController> {
        Device::new(0, sim, ControllerConfig::immediate())
    }

    #[test]
    fn command_codes_round_trip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_code(cmd.code()).unwrap(), cmd);
        }
        assert_eq!(Command::Reset.code(), 0x6F01);
        assert_eq!(Command::GetAtr.code(), 0x6F05);
    }

    #[test]
    fn second_open_is_busy() {
        let dev = device(SimulatedController::new());
        let first = dev.open().unwrap();
        assert!(matches!(dev.open(), Err(ScrError::Busy)));
        first.close();
        assert!(dev.open().is_ok());
    }

    #[test]
    fn unknown_code_is_unsupported() {
        let dev = device(SimulatedController::new());
        let mut s = dev.open().unwrap();
        let err = s.ioctl(0x6F7F, &mut []).unwrap_err();
        assert!(matches!(err, ScrError::UnsupportedOperation { code: 0x6F7F }));
        assert!(dev.registers().writes().is_empty());
    }

    #[test]
    fn status_reports_exchange_word() {
        let dev = device(SimulatedController::with_card(SimCard::processor(&ATR)));
        let mut s = dev.open().unwrap();
        let Reply::Status(word) = s.command(Command::Status, &mut []).unwrap() else {
            panic!("expected status reply");
        };
        assert_eq!(word & exch::CARD_INS, exch::CARD_INS);
        assert_eq!(word & exch::POW_ON, 0);
    }

    #[test]
    fn get_atr_exact_buffer() {
        let dev = device(SimulatedController::with_card(SimCard::processor(&ATR)));
        let mut s = dev.open().unwrap();
        s.command(Command::PowerOn, &mut []).unwrap();

        let mut buf = [0u8; ATR.len()];
        assert_eq!(s.ioctl(Command::GetAtr.code(), &mut buf).unwrap(), Reply::Atr(4));
        assert_eq!(buf, ATR);
    }

    #[test]
    fn get_atr_short_buffer() {
        let dev = device(SimulatedController::with_card(SimCard::processor(&ATR)));
        let mut s = dev.open().unwrap();
        s.power_on().unwrap();

        let mut buf = [0xFFu8; 3];
        let err = s.get_atr(&mut buf).unwrap_err();
        assert!(matches!(err, ScrError::BufferTooSmall { needed: 4, capacity: 3 }));
        assert_eq!(buf, [0xFF; 3]);
    }

    #[test]
    fn panic_during_capture_leaves_no_partial_atr() {
        let regs = FailingIo {
            sim: SimulatedController::new(),
            io_reads: AtomicUsize::new(0),
            fail_at: AtomicUsize::new(0),
        };
        let dev = Device::new(0, regs, ControllerConfig::immediate());

        {
            let mut s = dev.open().unwrap();
            dev.registers().sim.push_fifo(&[0xAA; 4]);
            s.controller().read_atr().unwrap();
            assert_eq!(s.atr(), [0xAA; 4]);
        }

        // Third byte of the next capture fails while the session is held
        dev.registers().sim.push_fifo(&[0xBB; 4]);
        dev.registers().fail_at.store(7, Ordering::SeqCst);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut s = dev.open().unwrap();
            s.controller().read_atr()
        }));
        assert!(result.is_err());

        let s = dev.open().expect("poisoned channel must reopen");
        assert!(s.atr().is_empty());
        assert_eq!(s.get_atr(&mut []).unwrap(), 0);
    }

    #[test]
    fn get_atr_before_power_on_copies_nothing() {
        let dev = device(SimulatedController::new());
        let s = dev.open().unwrap();
        assert_eq!(s.get_atr(&mut []).unwrap(), 0);
    }

    #[test]
    fn interrupt_served_while_session_open() {
        let dev = device(SimulatedController::new());
        let mut s = dev.open().unwrap();
        s.reset().unwrap();
        dev.registers().raise(o2scr_chip::regs::it::IT_REC);
        assert!(dev.handle_interrupt().is_handled());
        drop(s);
    }
}
