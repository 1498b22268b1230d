//! Register access for the SmartCardBus controller
//!
//! [`RegisterAccess`] is the only path to the hardware. Two implementations
//! exist: [`MmioRegisters`] over mapped UIO windows, and
//! [`SimulatedController`](crate::sim::SimulatedController) for tests.
//!
//! Every access is a hardware-visible side effect: volatile, never merged or
//! elided, and fenced so it cannot move across neighbouring accesses.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cast_possible_truncation)]

use crate::discovery::UioInfo;
use crate::error::{Result, ScrError};
use o2scr_chip::window::Window;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::ptr::NonNull;
use std::sync::atomic::{fence, Ordering};

/// Access to the two register address spaces of one controller.
///
/// Methods take `&self`: the interrupt handler and the session holder touch
/// the same registers concurrently, exactly as they do on the bus.
pub trait RegisterAccess: Send + Sync {
    /// Read a 16-bit register from the memory window.
    fn read16(&self, offset: usize) -> u16;

    /// Write a 16-bit register in the memory window.
    fn write16(&self, offset: usize, value: u16);

    /// Read a 16-bit word from the I/O window.
    fn read_io16(&self, offset: usize) -> u16;

    /// Write a 32-bit quantity to a register pair, high half first.
    fn write32(&self, offset: usize, value: u32) {
        self.write16(offset, (value >> 16) as u16);
        self.write16(offset + 2, value as u16);
    }

    /// Read one data byte from the I/O window.
    ///
    /// The byte travels in the upper half of the 16-bit I/O transaction.
    fn read_byte_from_io(&self, offset: usize) -> u8 {
        (self.read_io16(offset) >> 8) as u8
    }
}

/// One mapped register window
pub struct MappedWindow {
    ptr: NonNull<u8>,
    size: usize,
    window: Window,
}

impl std::fmt::Debug for MappedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedWindow")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.size)
            .field("window", &self.window)
            .finish()
    }
}

// SAFETY: Send - MappedWindow owns the mapping exclusively. Moving it between threads
// doesn't invalidate the mapping (mmap'd memory is process-wide). No thread-local state.
unsafe impl Send for MappedWindow {}

// SAFETY: Sync - all accesses are single volatile 16-bit loads/stores to device memory,
// which the bus serializes. There is no other state behind the pointer.
unsafe impl Sync for MappedWindow {}

impl MappedWindow {
    /// Map `size` bytes of `file` starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns an error if the size is smaller than the window layout or
    /// the mmap call fails.
    pub fn map(file: &File, window: Window, offset: u64, size: usize) -> Result<Self> {
        if size < window.size() {
            return Err(ScrError::mapping_failed(format!(
                "{window} window is {size:#x} bytes, expected at least {:#x}",
                window.size()
            )));
        }

        // SAFETY: mmap necessary for MMIO - maps the UIO region into the process.
        // Invariants: (1) file is an open UIO device; (2) offset selects the UIO map
        // (index * page size); (3) size is non-zero and comes from sysfs; (4) the
        // result is either a valid pointer for size bytes or an error.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                offset,
            )
            .map_err(|e| ScrError::mapping_failed(format!("mmap of {window} window failed: {e}")))?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| ScrError::mapping_failed(format!("{window} window mapped at null")))?;

        tracing::debug!("Mapped {window} window at {ptr:p}, size={size:#x}");

        Ok(Self { ptr, size, window })
    }

    /// Read a 16-bit register
    ///
    /// # Panics
    ///
    /// Panics if `offset + 2` exceeds the mapped window.
    pub fn read16(&self, offset: usize) -> u16 {
        assert!(offset + 2 <= self.size, "Register offset out of bounds");
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // Invariants: (1) ptr from mmap, valid for self.size; (2) offset+2 <= size;
        // (3) registers are 16-bit aligned.
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u16>().read_volatile() };
        fence(Ordering::Acquire);
        tracing::trace!("{} read16 @ {offset:#x} = {value:#06x}", self.window);
        value
    }

    /// Write a 16-bit register
    ///
    /// # Panics
    ///
    /// Panics if `offset + 2` exceeds the mapped window.
    pub fn write16(&self, offset: usize, value: u16) {
        assert!(offset + 2 <= self.size, "Register offset out of bounds");
        tracing::trace!("{} write16 @ {offset:#x} = {value:#06x}", self.window);
        fence(Ordering::Release);
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // Invariants: (1) ptr from mmap; (2) offset+2 <= size; (3) 16-bit aligned.
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u16>().write_volatile(value);
        }
    }

    /// Window this mapping covers
    pub const fn window(&self) -> Window {
        self.window
    }

    /// Mapped size in bytes
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        // SAFETY: munmap of the exact region returned by mmap in map(); Drop runs
        // at most once and no references into the mapping outlive self.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap of {} window failed: {e}", self.window);
            }
        }
        tracing::debug!("Unmapped {} window", self.window);
    }
}

/// Hardware registers reached through a UIO device
#[derive(Debug)]
pub struct MmioRegisters {
    mem: MappedWindow,
    io: MappedWindow,
    _file: File,
}

impl MmioRegisters {
    /// Open and map both windows of a UIO device
    ///
    /// Both mappings are released when the returned value drops, including
    /// when mapping the second window fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the device node cannot be opened or either window
    /// cannot be mapped.
    pub fn open(info: &UioInfo) -> Result<Self> {
        if !info.dev_path.exists() {
            return Err(ScrError::device_not_found(&info.dev_path));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&info.dev_path)?;

        let page = rustix::param::page_size() as u64;
        let mem = MappedWindow::map(
            &file,
            Window::Mem,
            Window::Mem.uio_map() as u64 * page,
            info.mem_size,
        )?;
        let io = MappedWindow::map(
            &file,
            Window::Io,
            Window::Io.uio_map() as u64 * page,
            info.io_size,
        )?;

        tracing::info!("Mapped registers of {}", info.dev_path.display());

        Ok(Self {
            mem,
            io,
            _file: file,
        })
    }
}

impl RegisterAccess for MmioRegisters {
    fn read16(&self, offset: usize) -> u16 {
        self.mem.read16(offset)
    }

    fn write16(&self, offset: usize, value: u16) {
        self.mem.write16(offset, value);
    }

    fn read_io16(&self, offset: usize) -> u16 {
        self.io.read16(offset)
    }
}
