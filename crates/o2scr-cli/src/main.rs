//! `o2scr`: command-line interface for O2Micro SmartCardBus readers.
//!
//! ```text
//! USAGE:
//!   o2scr list                 List readers exposed through UIO
//!   o2scr status               Print the exchange status word
//!   o2scr reset                Reset the controller
//!   o2scr power-on             Power the card and print its ATR
//!   o2scr power-off            Power the card down
//!   o2scr atr                  Power on, print the ATR, power off
//!   o2scr monitor [--seconds]  Acknowledge interrupts and log them
//! ```
//!
//! Every command except `list` and `monitor` accepts `--simulate` to run
//! against the register-level simulator with a processor card inserted.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use o2scr_driver::prelude::*;
use o2scr_driver::{discovery, irq, regs::exch, UioEvents, UioInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// ATR of the card inserted in simulation mode
const SIM_ATR: [u8; 13] = [
    0x3B, 0xDB, 0x96, 0x00, 0x80, 0xB1, 0xFE, 0x45, 0x1F, 0x83, 0x00, 0x31, 0xC0,
];

#[derive(Parser)]
#[command(name = "o2scr", about = "O2Micro SmartCardBus reader CLI", version)]
struct Cli {
    /// UIO index of the reader (default: first discovered).
    #[arg(long, global = true)]
    uio: Option<usize>,

    /// Use the simulated controller instead of hardware.
    #[arg(long, global = true)]
    simulate: bool,

    /// Sleep between completion polls, in microseconds.
    #[arg(long, global = true, default_value_t = 1000)]
    poll_interval_us: u64,

    /// Completion polls before a command times out.
    #[arg(long, global = true, default_value_t = o2scr_driver::DEFAULT_MAX_POLLS)]
    max_polls: u32,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Clone, Copy)]
enum Cmd {
    /// List readers exposed through UIO.
    List,
    /// Print the exchange status word.
    Status,
    /// Reset the controller to its initial state.
    Reset,
    /// Power the card and print its Answer-To-Reset.
    PowerOn,
    /// Power the card down.
    PowerOff,
    /// Power on, print the ATR and power off again.
    Atr,
    /// Acknowledge interrupts until interrupted.
    Monitor {
        /// Stop after this many seconds (checked between interrupts).
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ControllerConfig {
        poll_interval: Duration::from_micros(cli.poll_interval_us),
        max_polls: cli.max_polls,
        ..ControllerConfig::default()
    };

    match cli.command {
        Cmd::List => cmd_list(),
        Cmd::Monitor { seconds } => {
            if cli.simulate {
                bail!("monitor needs a hardware interrupt line");
            }
            cmd_monitor(&select(cli.uio)?, config, seconds)
        }
        cmd if cli.simulate => {
            let registry = DeviceRegistry::new(config);
            let sim = SimulatedController::with_card(SimCard::processor(&SIM_ATR));
            let device = registry.attach(sim)?;
            run(&*device, cmd)
        }
        cmd => {
            let info = select(cli.uio)?;
            let registry = DeviceRegistry::new(config);
            let device = registry.attach(MmioRegisters::open(&info)?)?;
            run(&*device, cmd)
        }
    }
}

fn select(index: Option<usize>) -> Result<UioInfo> {
    let found = discovery::discover()?;
    match index {
        Some(i) => found
            .into_iter()
            .find(|d| d.index == i)
            .with_context(|| format!("uio{i} is not an o2scr reader")),
        None => found.into_iter().next().context("no o2scr reader found"),
    }
}

fn cmd_list() -> Result<()> {
    let found = discovery::discover()?;
    println!("SmartCardBus readers: {}", found.len());
    for info in &found {
        println!(
            "[uio{}] {}  mem {:#x} bytes  io {:#x} bytes",
            info.index,
            info.dev_path.display(),
            info.mem_size,
            info.io_size
        );
    }
    Ok(())
}

fn run<R: RegisterAccess>(device: &Device<R>, cmd: Cmd) -> Result<()> {
    let mut session = device.open()?;

    match cmd {
        Cmd::Status => print_status(session.status()),
        Cmd::Reset => {
            session.reset()?;
            println!("{}: controller reset", device.name());
        }
        Cmd::PowerOn => {
            session.power_on()?;
            print_atr(session.atr());
        }
        Cmd::PowerOff => {
            session.power_off()?;
            println!("{}: card powered off", device.name());
        }
        Cmd::Atr => {
            session.power_on()?;
            print_atr(session.atr());
            session.power_off()?;
        }
        Cmd::List | Cmd::Monitor { .. } => unreachable!("handled in main"),
    }

    session.close();
    Ok(())
}

fn cmd_monitor(info: &UioInfo, config: ControllerConfig, seconds: Option<u64>) -> Result<()> {
    let events = UioEvents::open(info)?;
    let registry = DeviceRegistry::new(config);
    let device = registry.attach(MmioRegisters::open(info)?)?;
    let shutdown = Arc::new(AtomicBool::new(false));

    if let Some(secs) = seconds {
        let flag = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            flag.store(true, Ordering::Release);
        });
    }

    println!("{}: monitoring interrupts on uio{}", device.name(), info.index);
    let handled = irq::service(&*device, &events, &shutdown)?;
    println!("{}: {handled} interrupt(s) acknowledged", device.name());
    Ok(())
}

fn print_status(status: u16) {
    let flag = |bit: u16| if status & bit != 0 { "yes" } else { "no" };
    println!("Status word  : {status:#06x}");
    println!("Card present : {}", flag(exch::CARD_INS));
    println!("Powered      : {}", flag(exch::POW_ON));
    println!("FIFO empty   : {}", flag(exch::FIFO_EMPTY));
    if status & exch::SYNC_CARD_MASK != 0 {
        println!("Card type    : synchronous (unsupported)");
    }
}

fn print_atr(atr: &[u8]) {
    let hex: Vec<String> = atr.iter().map(|b| format!("{b:02X}")).collect();
    println!("ATR ({} bytes): {}", atr.len(), hex.join(" "));
}
