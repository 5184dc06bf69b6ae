//! Chip specific operations.

pub mod hx83192;

use alloc::vec::Vec;

use log::info;

use crate::bus::Transport;
use crate::error::HxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    OnCell,
    InCell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Sw,
    Hw,
    Crc,
}

/// Where a chip keeps its version bytes inside the firmware image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionLayout {
    pub fw_ver_maj: usize,
    pub fw_ver_min: usize,
    pub cfg_ver_maj: usize,
    pub cfg_ver_min: usize,
    pub cid_ver_maj: usize,
    pub cid_ver_min: usize,
    pub cfg_table: usize,
}

/// What the core needs to know about a chip once it is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipProfile {
    pub cell_type: CellType,
    pub checksum: ChecksumKind,
    pub layout: VersionLayout,
}

/// Operations that differ between controller models.
pub trait Ic: Send + Sync {
    fn name(&self) -> &'static str;

    fn cell_type(&self) -> CellType;

    fn checksum_kind(&self) -> ChecksumKind;

    fn version_layout(&self) -> VersionLayout;

    fn chip_init(&self) -> ChipProfile {
        let profile = ChipProfile {
            cell_type: self.cell_type(),
            checksum: self.checksum_kind(),
            layout: self.version_layout(),
        };
        info!("{}: cell type {:?}, checksum {:?}", self.name(), profile.cell_type, profile.checksum);
        profile
    }

    /// Match the chip id; on success the chip is left in safe mode.
    fn detect(&self, bus: &dyn Transport) -> Result<(), HxError>;

    /// Number of cascaded ICs driving the panel.
    fn ic_amount(&self, bus: &dyn Transport) -> Result<u8, HxError>;

    fn sense_on(&self, bus: &dyn Transport, flash_mode: bool) -> Result<(), HxError>;

    fn sense_off(&self, bus: &dyn Transport, check_en: bool) -> Result<(), HxError>;

    /// Program `fw` at flash offset `start`. Flash must already be erased.
    fn flash_programming(&self, bus: &dyn Transport, fw: &[u8], start: u32) -> Result<(), HxError>;

    fn flash_dump(&self, bus: &dyn Transport, size: usize) -> Result<Vec<u8>, HxError>;

    fn dd_clk_set(&self, bus: &dyn Transport, enable: bool) -> Result<(), HxError>;

    fn dd_reg_en(&self, bus: &dyn Transport) -> Result<(), HxError>;
}
