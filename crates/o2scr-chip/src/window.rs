//! Address windows exposed by the reader.
//!
//! ```text
//! Window  Size    Width   Type            Purpose
//! ─────── ─────── ─────── ─────────────── ─────────────────────────────────
//!  mem    4 KiB   16-bit  common memory   Register file (MASK_IT .. BWT)
//!  io     32 B    16-bit  I/O ports       FIFO output port
//! ```
//!
//! When the reader is exposed through UIO, the memory window is map 0 and
//! the I/O window is map 1.

/// Register file window.
pub mod mem {
    /// Size in bytes (one 4 KiB page of common memory).
    pub const SIZE: usize = 0x1000;
    /// UIO map index.
    pub const UIO_MAP: usize = 0;
}

/// I/O port window.
pub mod io {
    /// Size in bytes.
    pub const SIZE: usize = 32;
    /// UIO map index.
    pub const UIO_MAP: usize = 1;
}

/// Window selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    /// Register file.
    Mem,
    /// I/O port window.
    Io,
}

impl Window {
    /// Expected size of this window in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Mem => mem::SIZE,
            Self::Io => io::SIZE,
        }
    }

    /// UIO map index carrying this window.
    #[must_use]
    pub const fn uio_map(&self) -> usize {
        match self {
            Self::Mem => mem::UIO_MAP,
            Self::Io => io::UIO_MAP,
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mem => write!(f, "mem"),
            Self::Io => write!(f, "io"),
        }
    }
}
