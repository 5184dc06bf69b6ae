//! Rockchip PVTPLL ring oscillator clocks.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clk;
pub mod error;
pub mod regmap;
pub mod table;

pub use clk::{OtpOppInfo, PVTPLL_CLK_ID, PvtpllDriver, volt_sel_adjust};
pub use error::PvtpllError;
pub use regmap::{MmioRegmap, Regmap};
pub use table::{PvtpllEntry, PvtpllKind};
