//! Himax in-cell touch controller core.
//!
//! Register protocol, flash update, report decoding and diagnostics for the
//! HX8319x family, driven over an `embedded-hal` I2C bus.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod crc;
pub mod debug;
pub mod diag;
pub mod driver;
pub mod error;
pub mod firmware;
pub mod flash;
pub mod ic;
pub mod inspect;
pub mod mcu;
pub mod regs;
pub mod report;
pub mod trace;

#[cfg(test)]
mod sim;

pub use bus::{HxBus, Transport};
pub use config::{HxConfig, TouchInfo};
pub use diag::DiagData;
pub use driver::{Host, HxDriver, NoHost};
pub use error::HxError;
pub use firmware::{FwVersion, Updater};
pub use ic::{ChipProfile, Ic, hx83192::Hx83192};
pub use inspect::{Criteria, InspectMode};
pub use report::{MtSink, Reporter, TsStatus};

pub const DRIVER_VERSION: &str = "Sample_code_V61_A08.5.2";
