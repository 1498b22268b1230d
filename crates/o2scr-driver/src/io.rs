//! Interrupt events delivered through a UIO device
//!
//! A blocking `read` of four bytes returns the running interrupt count;
//! writing `1` re-enables the line after the handler ran.

use crate::discovery::UioInfo;
use crate::error::{Result, ScrError};
use rustix::io::{read, write};
use std::fs::{File, OpenOptions};

/// Interrupt line of one reader
#[derive(Debug)]
pub struct UioEvents {
    file: File,
}

impl UioEvents {
    /// Open the event channel of a UIO device
    ///
    /// # Errors
    ///
    /// Returns error if the device node cannot be opened.
    pub fn open(info: &UioInfo) -> Result<Self> {
        if !info.dev_path.exists() {
            return Err(ScrError::device_not_found(&info.dev_path));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&info.dev_path)?;
        Ok(Self { file })
    }

    /// Block until the next interrupt, returning the total interrupt count
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or returns a short count.
    pub fn wait(&self) -> Result<u32> {
        let mut buf = [0u8; 4];
        let n = read(&self.file, &mut buf).map_err(std::io::Error::from)?;
        if n != buf.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short interrupt read: {n} bytes"),
            )
            .into());
        }
        Ok(u32::from_ne_bytes(buf))
    }

    /// Re-arm the interrupt line
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub fn enable(&self) -> Result<()> {
        write(&self.file, &1u32.to_ne_bytes()).map_err(std::io::Error::from)?;
        Ok(())
    }
}
