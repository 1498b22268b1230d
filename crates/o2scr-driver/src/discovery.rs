//! Runtime reader discovery
//!
//! The PCMCIA glue exposes each reader as a UIO device named after the
//! driver. Discovery scans `/sys/class/uio/uio*` for that name and reads the
//! window sizes from the map directories.

use crate::error::{Result, ScrError};
use o2scr_chip::pcmcia::{self, DRIVER_NAME};
use o2scr_chip::window::Window;
use std::path::{Path, PathBuf};

const SYSFS_UIO: &str = "/sys/class/uio";
const DEV_ROOT: &str = "/dev";

/// A reader exposed through UIO
#[derive(Debug, Clone)]
pub struct UioInfo {
    /// UIO index (`uio3` → 3)
    pub index: usize,

    /// Device node (`/dev/uio3`)
    pub dev_path: PathBuf,

    /// Register file window size in bytes
    pub mem_size: usize,

    /// I/O window size in bytes
    pub io_size: usize,
}

impl UioInfo {
    /// Describe a UIO device without consulting sysfs, using the nominal
    /// window sizes.
    #[must_use]
    pub fn nominal(index: usize) -> Self {
        Self {
            index,
            dev_path: PathBuf::from(format!("{DEV_ROOT}/uio{index}")),
            mem_size: Window::Mem.size(),
            io_size: Window::Io.size(),
        }
    }
}

/// Discover all readers on the system
///
/// # Errors
///
/// Returns `ScrError::DeviceNotFound` if no UIO device carries the driver name.
pub fn discover() -> Result<Vec<UioInfo>> {
    discover_in(Path::new(SYSFS_UIO), Path::new(DEV_ROOT))
}

/// Discover readers under an explicit sysfs class directory and device root
///
/// # Errors
///
/// Returns `ScrError::DeviceNotFound` if the class directory is unreadable or
/// holds no matching device.
pub fn discover_in(sysfs_uio: &Path, dev_root: &Path) -> Result<Vec<UioInfo>> {
    tracing::info!("Discovering {DRIVER_NAME} readers under {}", sysfs_uio.display());

    let entries =
        std::fs::read_dir(sysfs_uio).map_err(|_| ScrError::device_not_found(sysfs_uio))?;

    let mut found = Vec::new();

    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(index) = file_name
            .strip_prefix("uio")
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };

        let path = entry.path();
        let name = std::fs::read_to_string(path.join("name")).unwrap_or_default();
        if name.trim() != DRIVER_NAME {
            continue;
        }

        let prod_ids = read_prod_ids(&path.join("device"));
        if !prod_ids.is_empty() && !pcmcia::matches(&prod_ids) {
            tracing::warn!("Skipping {file_name}: unexpected product IDs {prod_ids:?}");
            continue;
        }

        let sizes = (
            read_map_size(&path, Window::Mem),
            read_map_size(&path, Window::Io),
        );
        match sizes {
            (Ok(mem_size), Ok(io_size)) => {
                tracing::debug!("{file_name}: mem={mem_size:#x} io={io_size:#x}");
                found.push(UioInfo {
                    index,
                    dev_path: dev_root.join(&file_name),
                    mem_size,
                    io_size,
                });
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Skipping {file_name}: {e}");
            }
        }
    }

    if found.is_empty() {
        return Err(ScrError::device_not_found(sysfs_uio));
    }

    found.sort_by_key(|info| info.index);
    tracing::info!("Discovered {} reader(s)", found.len());
    Ok(found)
}

/// Read `maps/mapN/size` for a window
fn read_map_size(uio_dir: &Path, window: Window) -> Result<usize> {
    let path = uio_dir
        .join("maps")
        .join(format!("map{}", window.uio_map()))
        .join("size");
    let content =
        std::fs::read_to_string(&path).map_err(|_| ScrError::device_not_found(&path))?;
    read_hex(&content)
        .ok_or_else(|| ScrError::mapping_failed(format!("Invalid size in {}", path.display())))
}

/// Product strings of the parent PCMCIA device; empty if sysfs has none
fn read_prod_ids(device_dir: &Path) -> Vec<String> {
    (1..=4)
        .map_while(|n| std::fs::read_to_string(device_dir.join(format!("prod_id{n}"))).ok())
        .map(|s| s.trim_end().to_string())
        .collect()
}

fn read_hex(content: &str) -> Option<usize> {
    let trimmed = content.trim().trim_start_matches("0x");
    usize::from_str_radix(trimmed, 16).ok()
}
