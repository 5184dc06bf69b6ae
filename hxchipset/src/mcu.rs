//! AHB register protocol over the byte-command bus.

use alloc::vec;
use log::{debug, info, warn};

use crate::bus::{BUS_RW_MAX_LEN, Transport};
use crate::error::HxError;
use crate::regs::*;

/// 单次写入的最大载荷
pub const MAX_TRANS_SZ: usize = 128;

const INTERFACE_ON_RETRY: usize = 10;
const WRITE_READ_RETRY: usize = 100;
const WIP_RETRY: usize = 100;
const CRC_RETRY: usize = 100;
const DIAG_SET_RETRY: usize = 50;
const EVENT_STACK_RETRY: usize = 20;

pub const FW_DBG_REGS: [u32; 4] = [ADDR_FW_STATUS, ADDR_CS_CENTRAL_STATE, ADDR_DBG_E8, ADDR_DBG_E4];

/// Register level operations, available on every [`Transport`].
pub trait Mcu: Transport {
    fn burst_enable(&self, auto_add_4_byte: bool) -> Result<(), HxError> {
        self.write(CMD_AHB_INC4, &[PARA_AHB_INC4 | auto_add_4_byte as u8])
    }

    /// Read `buf.len()` bytes starting at `addr`.
    fn register_read(&self, addr: u32, buf: &mut [u8]) -> Result<(), HxError> {
        if buf.len() > BUS_RW_MAX_LEN {
            warn!("register_read: len {} over {}", buf.len(), BUS_RW_MAX_LEN);
            return Err(HxError::Length(buf.len()));
        }
        let burst = buf.len() > 4;
        self.burst_enable(burst)?;
        self.register_read_plain(addr, buf)?;
        if burst {
            self.burst_enable(false)?;
        }
        Ok(())
    }

    /// Like [`Mcu::register_read`] but leaves the burst setting alone.
    fn register_read_plain(&self, addr: u32, buf: &mut [u8]) -> Result<(), HxError> {
        if buf.len() > BUS_RW_MAX_LEN {
            return Err(HxError::Length(buf.len()));
        }
        self.write(CMD_AHB_ADDR, &addr.to_le_bytes())?;
        self.write(CMD_AHB_ACCESS_DIR, &[PARA_AHB_ACCESS_DIR_READ])?;
        self.read(CMD_AHB_RDATA, buf)
    }

    fn register_write(&self, addr: u32, data: &[u8]) -> Result<(), HxError> {
        self.burst_enable(data.len() > 4)?;

        let mut frame = vec![0u8; 4 + MAX_TRANS_SZ.min(data.len())];
        let mut address = addr;
        for (i, chunk) in data.chunks(MAX_TRANS_SZ).enumerate() {
            if i > 0 {
                self.udelay(100);
            }
            let frame = &mut frame[..4 + chunk.len()];
            frame[..4].copy_from_slice(&address.to_le_bytes());
            frame[4..].copy_from_slice(chunk);
            self.write(CMD_AHB_ADDR, frame)?;
            address = address.wrapping_add(MAX_TRANS_SZ as u32);
        }
        Ok(())
    }

    fn read_word(&self, addr: u32) -> Result<[u8; 4], HxError> {
        let mut d = [0u8; 4];
        self.register_read(addr, &mut d)?;
        Ok(d)
    }

    fn write_word(&self, addr: u32, val: u32) -> Result<(), HxError> {
        self.register_write(addr, &val.to_le_bytes())
    }

    /// Write `data`, then poll until the firmware answers with `hb`/`lb`
    /// in the two low bytes.
    fn write_read_reg(&self, addr: u32, data: [u8; 4], hb: u8, lb: u8) -> Result<(), HxError> {
        self.register_write(addr, &data)?;
        self.msleep(10);
        for _ in 0..WRITE_READ_RETRY {
            let d = self.read_word(addr)?;
            if d[1] == hb && d[0] == lb {
                return Ok(());
            }
            self.msleep(10);
        }
        warn!("write_read_reg {addr:#010x}: no {hb:02X}{lb:02X} answer");
        Err(HxError::RegMismatch(addr))
    }

    fn interface_on(&self) -> Result<(), HxError> {
        let mut dummy = [0u8; 4];
        self.read(CMD_AHB_RDATA, &mut dummy)?;

        for _ in 0..INTERFACE_ON_RETRY {
            self.write(CMD_AHB_CONTI, &[PARA_AHB_CONTI])?;
            self.write(CMD_AHB_INC4, &[PARA_AHB_INC4])?;

            let (mut conti, mut inc4) = ([0u8; 1], [0u8; 1]);
            self.read(CMD_AHB_CONTI, &mut conti)?;
            self.read(CMD_AHB_INC4, &mut inc4)?;
            if conti[0] == PARA_AHB_CONTI && inc4[0] == PARA_AHB_INC4 {
                return Ok(());
            }
            self.msleep(1);
        }
        warn!("interface_on: burst mode not latched");
        Err(HxError::Timeout("interface on"))
    }

    /// Poll the flash status register until the write-in-progress bit clears.
    fn wait_wip(&self, timing_ms: u32) -> Result<(), HxError> {
        self.write_word(SPI200_TRANS_FMT, SPI200_FMT)?;
        for retry in 0..=WIP_RETRY {
            self.write_word(SPI200_TRANS_CTRL, SPI200_CTRL_READ_STATUS)?;
            self.write_word(SPI200_CMD, FLASH_CMD_RDSR)?;
            let d = self.read_word(SPI200_DATA)?;
            if d[0] & 0x01 == 0 {
                return Ok(());
            }
            debug!("wait_wip retry {retry}: status {:02X}", d[0]);
            self.msleep(timing_ms);
        }
        warn!("wait_wip: flash still busy");
        Err(HxError::Timeout("flash wip"))
    }

    fn system_reset(&self) -> Result<(), HxError> {
        info!("system reset");
        self.write_word(ADDR_SYSTEM_RESET, DATA_SYSTEM_RESET)?;
        self.msleep(280);
        let mut dummy = [0u8; 4];
        self.read(CMD_AHB_RDATA, &mut dummy)
    }

    /// Run the on-chip CRC engine over `len` bytes of flash at `start`.
    /// A good image yields 0.
    fn check_crc(&self, start: u32, len: u32) -> Result<u32, HxError> {
        self.write_word(ADDR_CRC_START, start)?;
        let words = len / 4;
        self.register_write(
            ADDR_CRC_LEN,
            &[words as u8, (words >> 8) as u8, CRC_TRIGGER, 0x00],
        )?;

        for _ in 0..CRC_RETRY {
            let d = self.read_word(ADDR_CRC_STATUS)?;
            if d[0] & 0x01 == 0 {
                let crc = u32::from_le_bytes(self.read_word(ADDR_CRC_RESULT)?);
                debug!("check_crc {start:#x}+{len:#x}: {crc:#010x}");
                return Ok(crc);
            }
            self.msleep(1);
        }
        warn!("check_crc: engine busy");
        Err(HxError::Timeout("crc engine"))
    }

    fn calculate_checksum(&self, size: u32) -> Result<(), HxError> {
        let crc = self.check_crc(0, size)?;
        self.msleep(50);
        if crc != 0 {
            info!("flash checksum fail: {crc:#010x}");
            return Err(HxError::Crc(crc));
        }
        Ok(())
    }

    fn reload_disable(&self, disable: bool) -> Result<(), HxError> {
        info!("reload_disable({disable})");
        let val = if disable { DATA_RELOAD_DISABLE } else { 0 };
        self.write_word(ADDR_RELOAD_CTRL, val)
    }

    /// `true` for edge triggered interrupt.
    fn read_ic_trigger_type(&self) -> Result<bool, HxError> {
        Ok(self.read_word(ADDR_FW_TRIGGER)?[1] & 0x01 != 0)
    }

    fn read_fw_status(&self) -> Result<[[u8; 4]; 4], HxError> {
        let mut out = [[0u8; 4]; 4];
        for (addr, d) in FW_DBG_REGS.iter().zip(out.iter_mut()) {
            *d = self.read_word(*addr)?;
            info!("reg {addr:#010x} = {:02X?}", d);
        }
        Ok(out)
    }

    fn diag_register_set(&self, cmd: u8, storage: u8, direct: bool) -> Result<(), HxError> {
        let val = if cmd > 0 && storage % 8 > 0 && !direct {
            cmd.wrapping_add(8)
        } else {
            cmd
        };
        info!("diag_register_set: cmd {cmd} storage {storage} -> {val:#04x}");

        self.interface_on()?;
        for _ in 0..DIAG_SET_RETRY {
            self.write_word(ADDR_RAW_OUT_SEL, val as u32)?;
            if self.read_word(ADDR_RAW_OUT_SEL)?[0] == val {
                return Ok(());
            }
        }
        Err(HxError::RegMismatch(ADDR_RAW_OUT_SEL))
    }

    fn assign_sorting_mode(&self, pw: [u8; 4]) -> Result<(), HxError> {
        debug!("assign_sorting_mode {:02X?}", pw);
        self.register_write(ADDR_SORTING_MODE, &pw)
    }

    fn check_sorting_mode(&self) -> Result<[u8; 4], HxError> {
        self.read_word(ADDR_SORTING_MODE)
    }

    fn read_event_stack(&self, buf: &mut [u8]) -> Result<(), HxError> {
        self.read(CMD_EVENT_STACK, buf)
    }

    /// Hand the raw data buffer back to the firmware.
    fn return_event_stack(&self) -> Result<(), HxError> {
        for _ in 0..EVENT_STACK_RETRY {
            self.write_word(ADDR_RAWDATA, 0)?;
            let d = self.read_word(ADDR_RAWDATA)?;
            self.msleep(10);
            if d[0] == 0 && d[1] == 0 {
                return Ok(());
            }
        }
        Err(HxError::RegMismatch(ADDR_RAWDATA))
    }

    fn dd_reg_read(&self, reg: u8, pa_num: u8, buf: &mut [u8], bank: u8) -> Result<(), HxError> {
        for (i, b) in buf.iter_mut().enumerate() {
            let addr = dd_reg_addr(reg, pa_num.wrapping_add(i as u8), bank);
            *b = self.read_word(addr)?[0];
        }
        Ok(())
    }

    /// Write display driver parameters, filling the rest of each touched
    /// word from the current register contents.
    fn dd_reg_write(&self, reg: u8, pa_num: u8, data: &[u8], bank: u8) -> Result<(), HxError> {
        if data.is_empty() {
            return Err(HxError::InvalidArg("data"));
        }
        let pa = pa_num as usize;
        let data_len = ((data.len() + pa - 1) / 4 - pa / 4 + 1) * 4;
        let base = (pa / 4) * 4;
        let lead = pa % 4;

        let mut w = vec![0u8; data_len];
        let mut have = vec![false; data_len];
        for (i, b) in data.iter().enumerate() {
            if let Some(slot) = w.get_mut(lead + i) {
                *slot = *b;
                have[lead + i] = true;
            }
        }
        for i in 0..data_len {
            if !have[i] {
                let mut one = [0u8; 1];
                self.dd_reg_read(reg, (base + i) as u8, &mut one, bank)?;
                w[i] = one[0];
            }
        }
        self.register_write(dd_reg_addr(reg, base as u8, bank), &w)
    }
}

impl<T: Transport + ?Sized> Mcu for T {}

/// AHB address of display driver register `reg`, parameter `pa`.
pub fn dd_reg_addr(reg: u8, pa: u8, bank: u8) -> u32 {
    u32::from_le_bytes([pa, (reg << 4) | (bank * 4), reg >> 4, DD_REG_BASE])
}
