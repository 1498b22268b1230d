//! Pure Rust driver for the O2Micro SmartCardBus smart-card reader.
//!
//! Powers, resets and deactivates an inserted card through the controller's
//! register file and captures its Answer-To-Reset. Reaches the hardware
//! through a UIO device; a register-level simulator stands in for it in
//! tests.
//!
//! # Layers
//!
//! ```text
//! Session          exclusive control channel (Reset, Status, PowerOn, PowerOff, GetAtr)
//!   Controller     command execution, reset/power sequencing, FIFO, ATR capture
//!     RegisterAccess   16-bit mem window + I/O window (MmioRegisters | SimulatedController)
//! irq              shared-line interrupt acknowledge, runs beside any session
//! DeviceRegistry   attach/detach, identifier allocation
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use o2scr_driver::{discovery, ControllerConfig, DeviceRegistry, MmioRegisters};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DeviceRegistry::new(ControllerConfig::default());
//! let uio = discovery::discover()?;
//! let device = registry.attach(MmioRegisters::open(&uio[0])?)?;
//!
//! let mut session = device.open()?;
//! session.power_on()?;
//! let mut atr = [0u8; 33];
//! let n = session.get_atr(&mut atr)?;
//! println!("ATR: {:02X?}", &atr[..n]);
//! session.power_off()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod config;
mod control;
mod controller;
mod device;
pub mod discovery;
mod error;
pub mod io;
pub mod irq;
pub mod mmio;
mod registry;
pub mod sim;

/// Register map and identity constants (re-exported from o2scr-chip).
pub use o2scr_chip::{pcmcia, regs, window};

pub use config::{ControllerConfig, DEFAULT_ATR_CAPACITY, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL};
pub use control::{Command, Reply, Session};
pub use controller::{AtrBuffer, Controller};
pub use device::Device;
pub use discovery::UioInfo;
pub use error::{Result, ScrError};
pub use io::UioEvents;
pub use irq::IrqReturn;
pub use mmio::{MappedWindow, MmioRegisters, RegisterAccess};
pub use registry::DeviceRegistry;
pub use sim::{SimCard, SimulatedController};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Command, ControllerConfig, Device, DeviceRegistry, IrqReturn, MmioRegisters,
        RegisterAccess, Reply, Result, ScrError, Session, SimCard, SimulatedController,
    };
}
