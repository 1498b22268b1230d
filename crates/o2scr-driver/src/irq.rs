//! Interrupt acknowledgment
//!
//! The interrupt line may be shared, so the handler first checks whether any
//! unmasked event is pending. It then clears exactly the bits it observed by
//! writing their complement to `DEVAL_IT`. The command poll in
//! [`Controller::execute`](crate::Controller::execute) does the same for
//! `END_EXE`; since each side clears only what it saw, neither needs a lock.

use crate::device::Device;
use crate::error::Result;
use crate::io::UioEvents;
use crate::mmio::RegisterAccess;
use o2scr_chip::regs;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Outcome of one handler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// No unmasked event pending; the interrupt belongs to another device
    None,
    /// These events were pending and have been acknowledged
    Handled(u16),
}

impl IrqReturn {
    /// True if this device raised the interrupt
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

/// Acknowledge pending unmasked events
///
/// Never blocks, never allocates and never issues commands.
pub fn acknowledge<R: RegisterAccess>(hw: &R, mask: &AtomicU16) -> IrqReturn {
    let pending = hw.read16(regs::STATUS_IT) & mask.load(Ordering::Acquire);
    if pending == 0 {
        return IrqReturn::None;
    }
    hw.write16(regs::DEVAL_IT, !pending);
    IrqReturn::Handled(pending)
}

/// Service a device's interrupt line until `shutdown` is set
///
/// Each wakeup runs the handler once and re-arms the line. The shutdown flag
/// is checked between interrupts, so a blocked `wait` returns only after the
/// next interrupt.
///
/// # Errors
///
/// Returns error if waiting on or re-arming the line fails.
pub fn service<R: RegisterAccess>(
    device: &Device<R>,
    events: &UioEvents,
    shutdown: &AtomicBool,
) -> Result<u64> {
    let mut handled = 0u64;
    events.enable()?;

    while !shutdown.load(Ordering::Acquire) {
        let count = events.wait()?;
        match device.handle_interrupt() {
            IrqReturn::Handled(bits) => {
                handled += 1;
                tracing::debug!("{}: interrupt #{count} acked {bits:#06x}", device.name());
            }
            IrqReturn::None => {
                tracing::trace!("{}: interrupt #{count} not ours", device.name());
            }
        }
        events.enable()?;
    }

    Ok(handled)
}
