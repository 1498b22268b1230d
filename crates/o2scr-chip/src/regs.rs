//! Register map for the SmartCardBus controller.
//!
//! All registers in the memory window are 16 bits wide and addressed by byte
//! offset. The I/O window carries the FIFO output port, whose data byte sits
//! in the upper half of each 16-bit transaction.
//!
//! ```text
//! mem 0x00  MASK_IT      interrupt enable
//! mem 0x02  STATUS_IT    interrupt pending
//! mem 0x04  DEVAL_IT     interrupt acknowledge (bits written as 0 are cleared)
//! mem 0x06  EXE          command execute
//! mem 0x08  MODE         protocol mode
//! mem 0x0a  STATUS_EXCH  exchange status (card / power / FIFO)
//! mem 0x0c  FIFO_NB      FIFO byte count, 9 bits
//! mem 0x0e  FRQ_MODE     card clock divisor
//! mem 0x10  BWT_MSB      block waiting time, high half
//! mem 0x12  BWT_LSB      block waiting time, low half
//! mem 0x3e  POWER_DELAY  vendor power-up delay
//! io  0x00  FIFO_OUT     receive FIFO output
//! ```

// ── Memory window ────────────────────────────────────────────────────────────

/// Interrupt mask register. A set bit unmasks the event.
pub const MASK_IT: usize = 0x00;
/// Interrupt status register.
pub const STATUS_IT: usize = 0x02;
/// Interrupt acknowledge ("deval") register.
pub const DEVAL_IT: usize = 0x04;
/// Command execute register.
pub const EXE: usize = 0x06;
/// Mode register.
pub const MODE: usize = 0x08;
/// Exchange status register.
pub const STATUS_EXCH: usize = 0x0A;
/// Number of bytes waiting in the receive FIFO.
pub const FIFO_NB: usize = 0x0C;
/// Card clock frequency mode.
pub const FRQ_MODE: usize = 0x0E;
/// Block waiting time register pair (MSB first, LSB at `BWT + 2`).
pub const BWT: usize = 0x10;
/// Block waiting time, low half.
pub const BWT_LSB: usize = BWT + 2;
/// Vendor power-delay register.
pub const POWER_DELAY: usize = 0x3E;

// ── I/O window ───────────────────────────────────────────────────────────────

/// Receive FIFO output port (I/O window).
pub const FIFO_OUT: usize = 0x00;

/// Only the low nine bits of `FIFO_NB` carry the count.
pub const FIFO_NB_MASK: u16 = 0x01FF;

/// Interrupt status / mask / deval bits.
pub mod it {
    /// Command execution complete.
    pub const END_EXE: u16 = 1 << 0;
    /// Byte received from the card.
    pub const IT_REC: u16 = 1 << 1;
    /// ETU timer expired.
    pub const ETU_IT: u16 = 1 << 4;
    /// Card clock event.
    pub const CLK_IT: u16 = 1 << 5;
    /// Controller state change.
    pub const SCI: u16 = 1 << 6;
    /// Controller present.
    pub const SCP: u16 = 1 << 8;

    /// Events unmasked by a controller reset.
    ///
    /// Low byte `0x73`, plus SCP at bit 8.
    pub const RESET_MASK: u16 = SCP | SCI | CLK_IT | ETU_IT | IT_REC | END_EXE;
}

/// `EXE` command bits.
pub mod exe {
    /// Run the card activation sequence.
    pub const POWER_ON: u16 = 1 << 0;
    /// Run the card deactivation sequence.
    pub const POWER_OFF: u16 = 1 << 1;
    /// Empty the receive FIFO.
    pub const RST_FIFO: u16 = 1 << 2;
    /// Raw controller reset, held high for one tick then released.
    pub const RESET: u16 = 1 << 15;
}

/// `MODE` bits.
pub mod mode {
    /// Card-detect mode.
    pub const CRD_DET: u16 = 1 << 0;
    /// Error-detection-code checking.
    pub const EDC: u16 = 1 << 4;
    /// Enforce the ATR timeout.
    pub const ATR_TO: u16 = 1 << 5;
}

/// `STATUS_EXCH` bits.
pub mod exch {
    /// A card sits in the slot.
    pub const CARD_INS: u16 = 1 << 0;
    /// The card is powered.
    pub const POW_ON: u16 = 1 << 1;
    /// Receive FIFO is empty.
    pub const FIFO_EMPTY: u16 = 1 << 2;
    /// Receive FIFO is full.
    pub const FIFO_FULL: u16 = 1 << 3;
    /// Any of these set means a synchronous (memory) card.
    pub const SYNC_CARD_MASK: u16 = 0xF700;
}

/// Values programmed by a controller reset.
pub mod defaults {
    /// Block waiting time in ETU (ISO 7816-3, BWI = 4: 11 + 2^4 * 960).
    pub const BWT: u32 = 15_371;
    /// Card clock divisor.
    pub const FRQ_MODE: u16 = 0x0002;
    /// Vendor power-up delay.
    pub const POWER_DELAY: u16 = 0x00C8;
}
