//! Firmware versions and the flash update state machine.

use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::bus::Transport;
use crate::error::HxError;
use crate::flash::{FLASH_SIZE_64K, FLASH_SIZE_128K, Flash, lastdata_check};
use crate::ic::{Ic, VersionLayout};
use crate::mcu::Mcu;
use crate::regs::*;

const RELOAD_POLL: usize = 200;
const UPDATE_RETRY: usize = 3;

/// 描述表所在的区域
pub const BIN_DESC_SIZE: usize = 1024;
const BIN_DESC_PAGE: usize = 128;
const BIN_DESC_ENTRY: usize = 16;
const BIN_DESC_MARK: usize = 0x0E;
const BIN_DESC_MARK_VAL: u8 = 0x87;

const MAP_FW_CID: u32 = 0x1000_0000;
const MAP_FW_VER: u32 = 0x1000_0100;
const MAP_CFG_VER: u32 = 0x3000_0000;
const MAP_TP_CONFIG_TABLE: u32 = 0x0000_000A;

/// Versions reported by the running firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FwVersion {
    pub panel_ver: u8,
    pub fw_ver: u16,
    pub config_ver: u16,
    pub touch_cfg_ver: u8,
    pub display_cfg_ver: u8,
    pub cid_ver: u16,
    pub customer: [u8; 12],
    pub project: [u8; 12],
    pub config_date: [u8; 12],
}

impl FwVersion {
    /// Config versions with the top bit set are engineering builds.
    pub fn is_test_build(&self) -> bool {
        (self.config_ver >> 8) & 0x80 != 0
    }
}

/// Versions stored inside a firmware image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinVersion {
    pub fw_ver: u16,
    pub cfg_ver: u16,
    pub cid_maj: u8,
    pub cid_min: u8,
}

/// Parse the descriptor table at the head of an image into `layout`.
///
/// Returns false when the image carries no table; `layout` is then left
/// untouched.
pub fn bin_desc_get(fw: &[u8], max_sz: usize, layout: &mut VersionLayout) -> bool {
    if fw.len() <= BIN_DESC_MARK
        || fw[..8].iter().any(|b| *b != 0)
        || fw[BIN_DESC_MARK] != BIN_DESC_MARK_VAL
    {
        debug!("no bin descriptor in image");
        return false;
    }

    let end = max_sz.min(fw.len());
    let mut page = 0;
    'pages: while page < end {
        let limit = (page + BIN_DESC_PAGE).min(end);
        for entry in fw[page..limit].chunks_exact(BIN_DESC_ENTRY) {
            if entry.iter().fold(0u8, |acc, b| acc | b) == 0 {
                break 'pages;
            }
            if entry.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) != 0 {
                continue;
            }
            let map_code = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let addr = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]) as usize;
            match map_code {
                MAP_FW_CID => {
                    layout.cid_ver_maj = addr;
                    layout.cid_ver_min = addr + 1;
                }
                MAP_FW_VER => {
                    layout.fw_ver_maj = addr;
                    layout.fw_ver_min = addr + 1;
                }
                MAP_CFG_VER => {
                    layout.cfg_ver_maj = addr;
                    layout.cfg_ver_min = addr + 1;
                }
                MAP_TP_CONFIG_TABLE => layout.cfg_table = addr,
                _ => {}
            }
        }
        page += BIN_DESC_PAGE;
    }
    debug!("bin descriptor: {layout:x?}");
    true
}

/// Read the versions out of an image.
pub fn fw_ver_bin(fw: &[u8], layout: &VersionLayout) -> Result<BinVersion, HxError> {
    let at = |i: usize| fw.get(i).copied().ok_or(HxError::Image("version offset"));
    let v = BinVersion {
        fw_ver: u16::from_be_bytes([at(layout.fw_ver_maj)?, at(layout.fw_ver_min)?]),
        cfg_ver: u16::from_be_bytes([at(layout.cfg_ver_maj)?, at(layout.cfg_ver_min)?]),
        cid_maj: at(layout.cid_ver_maj)?,
        cid_min: at(layout.cid_ver_min)?,
    };
    info!(
        "image FW_VER {:04X}, CFG_VER {:04X}, CID {:02X}{:02X}",
        v.fw_ver, v.cfg_ver, v.cid_maj, v.cid_min
    );
    Ok(v)
}

/// Wait for the firmware reload to finish, then read its versions.
pub fn read_fw_ver(bus: &dyn Transport) -> Result<FwVersion, HxError> {
    let mut ready = false;
    for _ in 0..RELOAD_POLL {
        let a = bus.read_word(ADDR_RELOAD_CTRL)?;
        let b = bus.read_word(ADDR_FW_READY_ALT)?;
        if (a[2] == 0x9A && a[3] == 0xA9) || (b[1] == 0x72 && b[0] == 0xC0) {
            ready = true;
            break;
        }
        bus.msleep(10);
    }
    if !ready {
        warn!("firmware reload not finished");
        if let Ok(regs) = bus.read_fw_status() {
            debug!("fw status {regs:02X?}");
        }
        return Err(HxError::Timeout("fw reload"));
    }

    let mut v = FwVersion::default();
    let d = bus.read_word(ADDR_FW_ARCH)?;
    v.panel_ver = d[0];
    v.fw_ver = u16::from_be_bytes([d[1], d[2]]);

    let d = bus.read_word(ADDR_FW_CFG)?;
    v.config_ver = u16::from_be_bytes([d[2], d[3]]);
    v.touch_cfg_ver = d[2];
    v.display_cfg_ver = d[3];

    let d = bus.read_word(ADDR_FW_CID)?;
    v.cid_ver = u16::from_be_bytes([d[2], d[3]]);

    bus.register_read(ADDR_FW_CUSTOMER, &mut v.customer)?;
    bus.register_read(ADDR_FW_PROJECT, &mut v.project)?;
    bus.register_read(ADDR_FW_CONFIG_DATE, &mut v.config_date)?;

    info!(
        "PANEL_VER {:X}, FW_VER {:X}, CFG_VER {:X}, CID_VER {:X}",
        v.panel_ver, v.fw_ver, v.config_ver, v.cid_ver
    );
    Ok(v)
}

/// Whether the image is newer than what the chip runs.
pub fn auto_update_check(ic: &FwVersion, bin: &BinVersion) -> bool {
    if ic.is_test_build() {
        info!("config {:04X} is a test build, skip update", ic.config_ver);
        return false;
    }
    let need = ic.fw_ver < bin.fw_ver || ic.config_ver < bin.cfg_ver;
    info!(
        "IC FW {:04X}/CFG {:04X}, image FW {:04X}/CFG {:04X}: update {need}",
        ic.fw_ver, ic.config_ver, bin.fw_ver, bin.cfg_ver
    );
    need
}

/// Boot time flash health: hardware CRC over the image and a programmed tail.
pub fn flash_health_check(bus: &dyn Transport, size: usize) -> Result<(), HxError> {
    let size = size as u32;
    bus.calculate_checksum(size)?;
    lastdata_check(bus, size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    SenseOff,
    Erase,
    Program,
    VerifyCrc,
    Reload,
    Fail,
}

/// Flash image size the update writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Flash64K,
    /// Clears block protection first.
    Flash128K,
}

impl UpdateKind {
    pub fn size(self) -> usize {
        match self {
            UpdateKind::Flash64K => FLASH_SIZE_64K,
            UpdateKind::Flash128K => FLASH_SIZE_128K,
        }
    }

    pub fn for_len(len: usize) -> Option<Self> {
        match len {
            FLASH_SIZE_64K => Some(UpdateKind::Flash64K),
            FLASH_SIZE_128K => Some(UpdateKind::Flash128K),
            _ => None,
        }
    }
}

/// Drives one image into flash, retrying the whole write.
pub struct Updater<'a> {
    bus: &'a dyn Transport,
    ic: &'a dyn Ic,
    state: UpdateState,
    history: Vec<UpdateState>,
}

impl<'a> Updater<'a> {
    pub fn new(bus: &'a dyn Transport, ic: &'a dyn Ic) -> Self {
        Updater {
            bus,
            ic,
            state: UpdateState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[UpdateState] {
        &self.history
    }

    fn enter(&mut self, state: UpdateState) {
        debug!("update: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    /// Write `fw` and verify it. Write-protect and image errors stop at once;
    /// anything else is retried.
    pub fn run(&mut self, fw: &[u8]) -> Result<(), HxError> {
        let kind = UpdateKind::for_len(fw.len()).ok_or_else(|| {
            warn!("image size {:#x} not supported", fw.len());
            HxError::Image("size")
        })?;

        let mut last = HxError::Busy;
        for attempt in 1..=UPDATE_RETRY {
            match self.attempt(kind, fw) {
                Ok(()) => {
                    info!("firmware update done (attempt {attempt})");
                    return Ok(());
                }
                Err(e @ (HxError::WriteProtect | HxError::Image(_))) => {
                    warn!("firmware update stopped: {e}");
                    self.enter(UpdateState::Fail);
                    return Err(e);
                }
                Err(e) => {
                    warn!("firmware update attempt {attempt} failed: {e}");
                    last = e;
                }
            }
        }
        self.enter(UpdateState::Fail);
        Err(last)
    }

    fn attempt(&mut self, kind: UpdateKind, fw: &[u8]) -> Result<(), HxError> {
        let bus = self.bus;
        let size = kind.size() as u32;

        self.enter(UpdateState::Idle);
        bus.system_reset()?;

        self.enter(UpdateState::SenseOff);
        self.ic.sense_off(bus, true)?;
        if kind == UpdateKind::Flash128K {
            bus.wp_bp_disable()?;
        }

        self.enter(UpdateState::Erase);
        bus.block_erase(0, size)?;

        self.enter(UpdateState::Program);
        self.ic.flash_programming(bus, fw, 0)?;

        self.enter(UpdateState::VerifyCrc);
        let crc = bus.check_crc(0, size)?;
        if crc != 0 {
            warn!("image crc {crc:#010x} after programming");
            return Err(HxError::Crc(crc));
        }

        self.enter(UpdateState::Reload);
        if kind == UpdateKind::Flash64K {
            bus.system_reset()?;
        }
        self.enter(UpdateState::Idle);
        Ok(())
    }
}
