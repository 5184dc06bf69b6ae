//! SPI flash behind the controller's SPI200 bridge.

use log::{debug, info, warn};

use crate::error::HxError;
use crate::mcu::Mcu;
use crate::regs::*;

pub const FLASH_SIZE_64K: usize = 0x1_0000;
pub const FLASH_SIZE_128K: usize = 0x2_0000;
pub const BLOCK_SIZE: u32 = 0x1_0000;
pub const SECTOR_SIZE: u32 = 0x1000;
/// 页编程大小
pub const FLASH_RW_MAX_LEN: usize = 256;

/// Unlock every block-protect bit.
const UNLOCK_ALL: u8 = 0xFC;

/// JEDEC ids of the supported flash parts, in lookup order.
const FLASH_IDS: [[u8; 3]; 15] = [
    [0xEF, 0x30, 0x12],
    [0xEF, 0x60, 0x12],
    [0xC8, 0x60, 0x13],
    [0xC8, 0x60, 0x12],
    [0xC2, 0x28, 0x11],
    [0xC2, 0x28, 0x12],
    [0xC2, 0x25, 0x32],
    [0x85, 0x60, 0x13],
    [0x85, 0x60, 0x12],
    [0x85, 0x40, 0x12],
    [0x7F, 0x11, 0x52],
    [0x5E, 0x60, 0x13],
    [0x1C, 0x38, 0x13],
    [0x1C, 0x38, 0x12],
    [0x9D, 0x40, 0x12],
];

/// Block-protect mask that locks the whole array on `id`.
pub fn lock_code_for(id: [u8; 3]) -> Option<u8> {
    let idx = FLASH_IDS.iter().position(|f| *f == id)?;
    Some(match idx {
        0 => 0x8C,
        1 | 6 | 11 => 0x9C,
        4 | 5 | 10 | 12 | 13 | 14 => 0xBC,
        _ => 0xFC,
    })
}

/// Flash operations, available on every [`Mcu`].
pub trait Flash: Mcu {
    fn spi_cmd(&self, ctrl: u32, cmd: u32) -> Result<(), HxError> {
        self.write_word(SPI200_TRANS_CTRL, ctrl)?;
        self.write_word(SPI200_CMD, cmd)
    }

    fn write_enable(&self) -> Result<(), HxError> {
        self.spi_cmd(SPI200_CTRL_WRITE_EN, FLASH_CMD_WREN)
    }

    fn chip_erase(&self) -> Result<(), HxError> {
        info!("chip erase");
        self.interface_on()?;
        self.write_word(ADDR_PSL, 0)?;
        self.write_word(SPI200_TRANS_FMT, SPI200_FMT)?;
        self.write_enable()?;
        self.write_word(SPI200_CMD, FLASH_CMD_CE)?;
        self.msleep(2000);
        self.wait_wip(100)
    }

    /// Erase whole 64K blocks covering `[start, start + len)`.
    fn block_erase(&self, start: u32, len: u32) -> Result<(), HxError> {
        info!("block erase {start:#x}+{len:#x}");
        self.interface_on()?;
        self.write_word(ADDR_PSL, 0)?;
        self.write_word(SPI200_TRANS_FMT, SPI200_FMT)?;

        let mut addr = start;
        while addr < start.saturating_add(len) {
            self.write_enable()?;
            self.write_word(SPI200_ADDR, addr)?;
            self.spi_cmd(SPI200_CTRL_ADDR_CMD, FLASH_CMD_BE)?;
            self.msleep(1000);
            self.wait_wip(100).inspect_err(|_| warn!("block erase {addr:#x}: wip"))?;
            addr += BLOCK_SIZE;
        }
        Ok(())
    }

    fn sector_erase(&self, start: u32, len: u32) -> Result<(), HxError> {
        debug!("sector erase {start:#x}+{len:#x}");
        self.write_word(ADDR_PSL, 0)?;
        self.write_word(SPI200_TRANS_FMT, SPI200_FMT)?;

        let mut addr = start;
        while addr < start.saturating_add(len) {
            self.write_enable()?;
            self.write_word(SPI200_ADDR, addr)?;
            self.spi_cmd(SPI200_CTRL_ADDR_CMD, FLASH_CMD_SE)?;
            self.wait_wip(100)?;
            addr += SECTOR_SIZE;
        }
        Ok(())
    }

    fn flash_id(&self) -> Result<[u8; 3], HxError> {
        self.spi_cmd(SPI200_CTRL_READ_ID, FLASH_CMD_RDID)?;
        let d = self.read_word(SPI200_DATA)?;
        Ok([d[0], d[1], d[2]])
    }

    /// Identify the flash part and return its lock code.
    fn flash_id_check(&self) -> Result<u8, HxError> {
        let id = self.flash_id()?;
        match lock_code_for(id) {
            Some(code) => {
                debug!("flash id {:02X?}, lock code {code:#04x}", id);
                Ok(code)
            }
            None => {
                warn!("unknown flash id {:02X?}", id);
                Err(HxError::WriteProtect)
            }
        }
    }

    fn read_flash_status(&self) -> Result<u8, HxError> {
        self.write_word(SPI200_TRANS_FMT, SPI200_FMT)?;
        self.spi_cmd(SPI200_CTRL_READ_REG, FLASH_CMD_RDSR)?;
        let mut d = [0u8; 1];
        self.register_read(SPI200_DATA, &mut d)?;
        Ok(d[0])
    }

    fn write_flash_status(&self, status: u8) -> Result<(), HxError> {
        self.write_word(SPI200_TRANS_FMT, SPI200_FMT)?;
        self.write_enable()?;
        self.write_word(SPI200_TRANS_CTRL, SPI200_CTRL_WRITE_REG)?;
        self.write_word(SPI200_DATA, status as u32)?;
        self.write_word(SPI200_CMD, FLASH_CMD_WRSR)
    }

    fn set_wp_pin(&self, high: bool) -> Result<(), HxError> {
        self.write_word(ADDR_WP_GPIO_OUT, 0x01)?;
        self.write_word(ADDR_WP_GPIO_DIR, 0x10)?;
        self.write_word(ADDR_WP_GPIO_LEVEL, high as u32)
    }

    /// Release the WP pin and clear every block-protect bit.
    fn wp_bp_disable(&self) -> Result<(), HxError> {
        // Unknown parts are still unlocked with the widest mask.
        if let Err(e) = self.flash_id_check() {
            debug!("wp_bp_disable: {e}");
        }
        self.set_wp_pin(true)?;
        self.write_flash_status(0)?;
        self.msleep(40);

        let st = self.read_flash_status()?;
        if !st & UNLOCK_ALL != UNLOCK_ALL {
            warn!("wp_bp_disable: status still {st:#04x}");
            return Err(HxError::WriteProtect);
        }
        info!("flash write protect released");
        Ok(())
    }

    /// Restore block protection and drive the WP pin low.
    ///
    /// A part that is already locked is left as is, pin included.
    fn wp_bp_enable(&self) -> Result<(), HxError> {
        let lock = self.flash_id_check()?;

        if self.read_flash_status()? & lock == lock {
            debug!("flash already locked ({lock:#04x})");
            return Ok(());
        }
        self.write_flash_status(lock)?;
        self.msleep(10);
        let st = self.read_flash_status()?;
        if st != lock {
            warn!("wp_bp_enable: status {st:#04x}, want {lock:#04x}");
            return Err(HxError::WriteProtect);
        }
        self.set_wp_pin(false)?;
        info!("flash write protect set ({lock:#04x})");
        Ok(())
    }

    /// Raw status byte, after checking the part is known.
    fn wp_bp_status(&self) -> Result<u8, HxError> {
        self.flash_id_check()?;
        self.read_flash_status()
    }
}

impl<T: Mcu + ?Sized> Flash for T {}

/// The last word of a programmed image is never blank.
pub fn lastdata_ok(tail: &[u8]) -> bool {
    match tail.len().checked_sub(4).map(|i| &tail[i..]) {
        Some(last) => !last.iter().all(|b| *b == 0x00) && !last.iter().all(|b| *b == 0xFF),
        None => false,
    }
}

/// Read the final 128 bytes of an image region and check they are programmed.
pub fn lastdata_check<T: Mcu + ?Sized>(bus: &T, size: u32) -> Result<(), HxError> {
    const TAIL: u32 = 128;
    if size < TAIL {
        return Err(HxError::InvalidArg("size"));
    }
    // Flash is mapped at AHB 0 once the firmware is stopped.
    let mut tail = [0u8; TAIL as usize];
    bus.register_read(size - TAIL, &mut tail)?;
    if lastdata_ok(&tail) {
        Ok(())
    } else {
        warn!("flash tail blank at {size:#x}");
        Err(HxError::Image("blank tail"))
    }
}
