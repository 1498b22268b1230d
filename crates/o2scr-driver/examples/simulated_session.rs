//! Walk through a full session on the simulated controller
//!
//! No hardware required. Run with `RUST_LOG=debug` to see the register
//! traffic the engine generates.

use o2scr_driver::prelude::*;
use o2scr_driver::regs::{exch, it};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "o2scr_driver=info".into()),
        )
        .init();

    let registry = DeviceRegistry::new(ControllerConfig::immediate());
    let sim = SimulatedController::with_card(SimCard::processor(&[
        0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06,
    ]));
    let device = registry.attach(sim)?;
    println!("Attached {} (mask {:#06x})", device.name(), device.mask());

    let mut session = device.open()?;
    for cmd in [Command::Status, Command::PowerOn, Command::GetAtr, Command::PowerOff] {
        let mut buf = [0u8; 32];
        match session.command(cmd, &mut buf)? {
            Reply::Done => println!("{cmd:?}: done"),
            Reply::Status(s) => println!(
                "{cmd:?}: {s:#06x} (card {}, powered {})",
                s & exch::CARD_INS != 0,
                s & exch::POW_ON != 0
            ),
            Reply::Atr(n) => println!("{cmd:?}: {:02X?}", &buf[..n]),
        }
    }

    // A second open while the session is held is refused
    assert!(matches!(device.open(), Err(ScrError::Busy)));

    device.registers().raise(it::IT_REC);
    println!("Interrupt: {:?}", device.handle_interrupt());

    session.close();
    Ok(())
}
