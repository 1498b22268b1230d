//! Reader device instance
//!
//! One `Device` per slot. It owns the register windows for its whole
//! lifetime; they are released when the last reference drops after detach.

use crate::config::ControllerConfig;
use crate::control::Session;
use crate::controller::AtrBuffer;
use crate::error::Result;
use crate::irq::{self, IrqReturn};
use crate::mmio::RegisterAccess;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;

/// SmartCardBus reader
///
/// The ATR buffer sits behind the session lock: holding a [`Session`] is
/// what "busy" means, and only the holder reaches the controller engine.
/// The interrupt mask and the registers stay outside it so the interrupt
/// handler never waits on a session.
#[derive(Debug)]
pub struct Device<R: RegisterAccess> {
    id: u32,
    name: String,
    pub(crate) regs: R,
    pub(crate) mask: AtomicU16,
    pub(crate) config: ControllerConfig,
    pub(crate) atr: Mutex<AtrBuffer>,
}

impl<R: RegisterAccess> Device<R> {
    /// Wrap mapped registers in a device instance
    ///
    /// The controller is not touched; [`DeviceRegistry::attach`](crate::DeviceRegistry::attach)
    /// resets it before publishing the device.
    pub fn new(id: u32, regs: R, config: ControllerConfig) -> Self {
        let atr = AtrBuffer::new(config.atr_capacity);
        Self {
            id,
            name: o2scr_chip::pcmcia::device_name(id),
            regs,
            mask: AtomicU16::new(0),
            config,
            atr: Mutex::new(atr),
        }
    }

    /// Identifier allocated at attach
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Externally visible name (`o2scr<id>`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register access, for diagnostics and simulation
    pub const fn registers(&self) -> &R {
        &self.regs
    }

    /// Interrupt mask programmed by the last reset
    pub fn mask(&self) -> u16 {
        self.mask.load(Ordering::Acquire)
    }

    /// Engine configuration
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Open the control channel
    ///
    /// # Errors
    ///
    /// Returns `ScrError::Busy` if another session is open.
    pub fn open(&self) -> Result<Session<'_, R>> {
        Session::open(self)
    }

    /// Interrupt entry point
    ///
    /// Safe to call from any thread at any time, including while a session
    /// is polling a command.
    pub fn handle_interrupt(&self) -> IrqReturn {
        irq::acknowledge(&self.regs, &self.mask)
    }
}

impl<R: RegisterAccess> Drop for Device<R> {
    fn drop(&mut self) {
        tracing::info!("Releasing {}", self.name);
    }
}
