//! Silicon model for the O2Micro SmartCardBus smart-card controller.
//!
//! This crate has **no dependencies** and **no hardware access**: register
//! offsets and bit definitions, window layout, and PCMCIA identity.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Register map, bit definitions, reset defaults |
//! | [`window`] | Memory and I/O window layout |
//! | [`pcmcia`] | Product ID table, device naming |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod pcmcia;
pub mod regs;
pub mod window;
