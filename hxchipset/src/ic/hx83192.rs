use alloc::{vec, vec::Vec};

use log::{debug, info, warn};

use super::{CellType, ChecksumKind, Ic, VersionLayout};
use crate::bus::Transport;
use crate::error::HxError;
use crate::flash::{FLASH_RW_MAX_LEN, Flash};
use crate::mcu::Mcu;
use crate::regs::*;

pub const HX83192_ID: [u8; 3] = [0x83, 0x19, 0x2A];
pub const HX83192_NAME: &str = "HX83192A";
pub const HX83192_ADC_NUM: u32 = 120;

const DETECT_RETRY: usize = 5;
const SENSE_ON_RETRY: usize = 5;
const STOP_FW_RETRY: u8 = 7;
const SENSE_OFF_RETRY: u8 = 15;
const SPI_POLL_RETRY: usize = 50;
const DUMP_CHUNK: usize = 16;
const PROG_CHUNK: usize = 16;

#[derive(Debug, Default)]
pub struct Hx83192;

impl Hx83192 {
    pub const fn new() -> Self {
        Hx83192
    }

    fn poll_spi(
        &self,
        bus: &dyn Transport,
        addr: u32,
        what: &'static str,
        done: impl Fn(&[u8; 4]) -> bool,
    ) -> Result<(), HxError> {
        for _ in 0..=SPI_POLL_RETRY {
            if done(&bus.read_word(addr)?) {
                return Ok(());
            }
        }
        warn!("{what}: spi200 status stuck");
        Err(HxError::Timeout(what))
    }
}

impl Ic for Hx83192 {
    fn name(&self) -> &'static str {
        HX83192_NAME
    }

    fn cell_type(&self) -> CellType {
        CellType::InCell
    }

    fn checksum_kind(&self) -> ChecksumKind {
        ChecksumKind::Crc
    }

    fn version_layout(&self) -> VersionLayout {
        VersionLayout {
            fw_ver_maj: 0xC005,
            fw_ver_min: 0xC006,
            cfg_ver_maj: 0xC100,
            cfg_ver_min: 0xC101,
            cid_ver_maj: 0xC002,
            cid_ver_min: 0xC003,
            cfg_table: 0x1_0000,
        }
    }

    fn detect(&self, bus: &dyn Transport) -> Result<(), HxError> {
        if let Err(e) = self.sense_off(bus, true) {
            warn!("detect: sense off: {e}");
        }

        let mut id = [0u8; 4];
        for _ in 0..DETECT_RETRY {
            id = bus.read_word(ADDR_ICID)?;
            debug!("driver ic id {:02X} {:02X} {:02X}", id[3], id[2], id[1]);
            if [id[3], id[2], id[1]] == HX83192_ID {
                info!("IC name = {HX83192_NAME}");
                return Ok(());
            }
        }
        warn!("could not find Himax chipset, check power and reset lines");
        Err(HxError::UnknownChip(id))
    }

    fn ic_amount(&self, bus: &dyn Transport) -> Result<u8, HxError> {
        let d = bus.read_word(ADDR_IC_CASCADE)?;
        let amount = match d[1] >> 2 {
            0 => 3,
            2 => 2,
            3 => 1,
            other => {
                warn!("unknown cascade setting {other}");
                return Err(HxError::InvalidArg("cascade"));
            }
        };
        info!("hx_ic_amount: {amount}");
        Ok(amount)
    }

    fn sense_on(&self, bus: &dyn Transport, flash_mode: bool) -> Result<(), HxError> {
        info!("sense on (flash mode {flash_mode})");
        bus.interface_on()?;

        if !flash_mode {
            return bus.system_reset();
        }

        let mut released = false;
        for _ in 0..SENSE_ON_RETRY {
            bus.write_word(ADDR_CTRL_FW, 0)?;
            bus.msleep(20);
            let d = bus.read_word(ADDR_CTRL_FW)?;
            if d[0] == 0 {
                released = true;
                break;
            }
        }

        if released {
            bus.write(CMD_SENSE_ON_OFF_0, &[0x00, 0x00])?;
        } else {
            warn!("sense on: firmware did not release, resetting");
            bus.system_reset()?;
        }
        bus.msleep(280);
        let mut dummy = [0u8; 4];
        bus.read(CMD_AHB_RDATA, &mut dummy)
    }

    fn sense_off(&self, bus: &dyn Transport, _check_en: bool) -> Result<(), HxError> {
        bus.msleep(280);

        let mut cnt: u8 = 0;
        if bus.read_word(ADDR_CS_CENTRAL_STATE)?[0] != CENTRAL_STATE_SAFE {
            loop {
                bus.write_word(ADDR_CTRL_FW, FW_STOP_REQ as u32)?;
                bus.msleep(20);
                let d = bus.read_word(ADDR_CTRL_FW)?;
                debug!("sense off: fw stop {:02X}", d[0]);
                if d[0] == FW_STOP_ACK || cnt >= STOP_FW_RETRY {
                    break;
                }
                cnt += 1;
            }
        }

        loop {
            bus.write(CMD_SENSE_ON_OFF_0, &[PARA_SENSE_OFF_0])?;
            bus.write(CMD_SENSE_ON_OFF_1, &[PARA_SENSE_OFF_1])?;

            let d = bus.read_word(ADDR_CS_CENTRAL_STATE)?;
            debug!("sense off: central state {:02X}", d[0]);
            if d[0] == CENTRAL_STATE_SAFE {
                return Ok(());
            }
            if cnt == 6 {
                bus.udelay(10_000);
                bus.system_reset()?;
            }
            if cnt >= SENSE_OFF_RETRY {
                break;
            }
            cnt += 1;
        }
        warn!("sense off: safe mode not reached");
        Err(HxError::Timeout("sense off"))
    }

    fn flash_programming(&self, bus: &dyn Transport, fw: &[u8], start: u32) -> Result<(), HxError> {
        info!("flash programming {} bytes at {start:#x}", fw.len());
        bus.interface_on()?;
        bus.write_word(SPI200_FLASH_SPEED, FLASH_CMD_SPEED)?;

        bus.write_word(SPI200_FIFO_RST, SPI200_TXFIFO_RST)?;
        self.poll_spi(bus, SPI200_FIFO_RST, "tx fifo reset", |d| d[0] & 0x04 == 0)?;
        bus.write_word(SPI200_TRANS_FMT, SPI200_FMT)?;

        let mut frame = [0u8; 4 + PROG_CHUNK];
        frame[..4].copy_from_slice(&SPI200_DATA.to_le_bytes());

        for (n, page) in fw.chunks(FLASH_RW_MAX_LEN).enumerate() {
            let page_addr = start + (n * FLASH_RW_MAX_LEN) as u32;

            bus.write_enable()?;
            self.poll_spi(bus, SPI200_RST_STATUS, "write enable", |d| d[0] & 0x01 == 0)?;

            bus.spi_cmd(SPI200_CTRL_READ_REG, FLASH_CMD_RDSR)?;
            self.poll_spi(bus, SPI200_RST_STATUS, "read status", |d| d[0] & 0x01 == 0)?;
            let st = bus.read_word(SPI200_DATA)?;
            if st[0] & 0x02 == 0 {
                warn!("page {page_addr:#x}: WEL not set ({:02X})", st[0]);
                return Err(HxError::WriteProtect);
            }

            bus.write_word(SPI200_TRANS_CTRL, SPI200_CTRL_PAGE_PROG)?;
            bus.write_word(SPI200_ADDR, page_addr)?;
            bus.write_word(SPI200_CMD, FLASH_CMD_PP)?;

            let mut padded = [0xFFu8; FLASH_RW_MAX_LEN];
            padded[..page.len()].copy_from_slice(page);
            for chunk in padded.chunks(PROG_CHUNK) {
                frame[4..].copy_from_slice(chunk);
                bus.write(CMD_AHB_ADDR, &frame)?;
                self.poll_spi(bus, SPI200_RST_STATUS, "tx fifo", |d| d[2] & 0x40 != 0)?;
            }

            bus.wait_wip(1)?;
        }
        Ok(())
    }

    fn flash_dump(&self, bus: &dyn Transport, size: usize) -> Result<Vec<u8>, HxError> {
        info!("flash dump {size:#x} bytes");
        self.sense_off(bus, true)?;
        bus.burst_enable(false)?;

        bus.write_word(SPI200_FIFO_RST, SPI200_RXFIFO_RST)?;
        self.poll_spi(bus, SPI200_FIFO_RST, "rx fifo reset", |d| d[0] & 0x02 == 0)?;
        bus.write_word(SPI200_TRANS_CTRL, SPI200_CTRL_FAST_READ)?;

        let mut out = vec![0u8; size];
        for (n, chunk) in out.chunks_mut(DUMP_CHUNK).enumerate() {
            bus.write_word(SPI200_ADDR, (n * DUMP_CHUNK) as u32)?;
            bus.write_word(SPI200_CMD, FLASH_CMD_FAST_READ)?;
            self.poll_spi(bus, SPI200_RST_STATUS, "rx data", |d| d[1] & 0x80 != 0)?;
            bus.register_read_plain(SPI200_DATA, chunk)?;
        }

        self.sense_on(bus, true)?;
        Ok(out)
    }

    fn dd_clk_set(&self, bus: &dyn Transport, enable: bool) -> Result<(), HxError> {
        bus.write_word(ADDR_OSC_EN, if enable { 0xDD } else { 0x00 })
    }

    fn dd_reg_en(&self, bus: &dyn Transport) -> Result<(), HxError> {
        bus.write_word(ADDR_OSC_PW, 0xA5)?;
        bus.dd_reg_write(0xEB, 0, &[0x00, 0x55, 0x66, 0xCC], 0)?;
        bus.dd_reg_write(0xB9, 0, &[0x00, 0x83, 0x19, 0x2A], 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcu::dd_reg_addr;
    use crate::sim::new_bus;

    #[test]
    fn detect_finds_hx83192_and_parks_it() {
        let bus = new_bus();
        let ic = Hx83192::new();
        ic.detect(&bus).unwrap();
        assert_eq!(bus.read_word(ADDR_CS_CENTRAL_STATE).unwrap()[0], CENTRAL_STATE_SAFE);
        assert_eq!(ic.ic_amount(&bus).unwrap(), 1);
    }

    #[test]
    fn detect_rejects_other_ids() {
        let bus = new_bus();
        bus.sim().poke(ADDR_ICID, &[0, 0x11, 0x22, 0x33]);
        assert_eq!(
            Hx83192::new().detect(&bus),
            Err(HxError::UnknownChip([0, 0x11, 0x22, 0x33]))
        );
    }

    #[test]
    fn sense_on_in_flash_mode_leaves_safe_state() {
        let bus = new_bus();
        let ic = Hx83192::new();
        ic.sense_off(&bus, true).unwrap();
        ic.sense_on(&bus, true).unwrap();
        assert_ne!(bus.read_word(ADDR_CS_CENTRAL_STATE).unwrap()[0], CENTRAL_STATE_SAFE);
        assert_eq!(bus.sim().resets(), 0);

        ic.sense_on(&bus, false).unwrap();
        assert_eq!(bus.sim().resets(), 1);
    }

    #[test]
    fn program_then_dump_returns_image() {
        let bus = new_bus();
        let ic = Hx83192::new();
        let image: Vec<u8> = (0..1000u32).map(|v| (v * 13 + 1) as u8).collect();

        ic.flash_programming(&bus, &image, 0).unwrap();
        let flash = bus.sim().flash();
        assert_eq!(&flash[..1000], &image[..]);
        // Short final page is padded with erased bytes.
        assert!(flash[1000..1024].iter().all(|b| *b == 0xFF));

        let dump = ic.flash_dump(&bus, 1024).unwrap();
        assert_eq!(&dump[..1000], &image[..]);
        // Data window traffic leaves the controller status register alone.
        assert_eq!(bus.read_word(SPI200_RST_STATUS).unwrap(), [0x00, 0x80, 0x40, 0x00]);
        let mut st = [0u8; 4];
        bus.sim().peek(SPI200_RST_STATUS, &mut st);
        assert_eq!(st, [0x00, 0x80, 0x40, 0x00]);
    }

    #[test]
    fn programming_refuses_locked_flash() {
        let bus = new_bus();
        bus.sim().set_status(0x9C);
        // WEL sets even when locked; the page program itself is dropped.
        Hx83192::new().flash_programming(&bus, &[0u8; 256], 0).unwrap();
        assert_eq!(bus.sim().flash()[0], 0xFF);
    }

    #[test]
    fn dd_reg_en_unlocks_display_registers() {
        let bus = new_bus();
        Hx83192::new().dd_reg_en(&bus).unwrap();
        let mut b9 = [0u8; 4];
        bus.sim().peek(dd_reg_addr(0xB9, 0, 0), &mut b9);
        assert_eq!(b9, [0x00, 0x83, 0x19, 0x2A]);
        assert_eq!(bus.read_word(ADDR_OSC_PW).unwrap()[0], 0xA5);
    }
}
