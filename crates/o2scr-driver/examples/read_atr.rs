//! Read the ATR of the card in the first reader
//!
//! Powers the card, prints its Answer-To-Reset and powers it down again.

use o2scr_driver::{discovery, ControllerConfig, DeviceRegistry, MmioRegisters, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("o2scr_driver=info")
        .init();

    let found = discovery::discover()?;
    println!("Found {} reader(s)", found.len());

    let registry = DeviceRegistry::new(ControllerConfig::default());
    let device = registry.attach(MmioRegisters::open(&found[0])?)?;
    println!("Opened {} on {}", device.name(), found[0].dev_path.display());

    let mut session = device.open()?;
    session.power_on()?;

    let mut atr = [0u8; 33];
    let n = session.get_atr(&mut atr)?;
    println!("ATR ({n} bytes): {:02X?}", &atr[..n]);

    session.power_off()?;
    Ok(())
}
