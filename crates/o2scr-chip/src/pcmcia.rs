//! PCMCIA identity of the SmartCardBus reader.
//!
//! The card is matched by its CIS product strings; the hashes are the
//! CRC values the PCMCIA core computes over each string.

/// Driver name registered with the PCMCIA bus.
pub const DRIVER_NAME: &str = "o2scr_cs";

/// Device name prefix; instances are `o2scr0`, `o2scr1`, ...
pub const DEVICE_PREFIX: &str = "o2scr";

/// Maximum number of readers handled at once.
pub const MAX_DEVICES: u32 = 4;

/// Product ID strings 1–3 from the card's CIS.
pub const PROD_IDS: [&str; 3] = ["O2Micro", "SmartCardBus Reader", "V1.0"];

/// Check product strings read from a socket against the ID table.
///
/// Trailing whitespace is ignored; the PCMCIA core pads CIS strings
/// inconsistently across bridges.
#[must_use]
pub fn matches<S: AsRef<str>>(prod_ids: &[S]) -> bool {
    prod_ids.len() >= PROD_IDS.len()
        && PROD_IDS
            .iter()
            .zip(prod_ids)
            .all(|(want, got)| got.as_ref().trim_end() == *want)
}

/// Name of the device with the given identifier.
#[must_use]
pub fn device_name(id: u32) -> String {
    format!("{DEVICE_PREFIX}{id}")
}
