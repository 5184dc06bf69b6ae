//! In-memory HX83192 used by the unit tests.

use alloc::{collections::BTreeMap, collections::VecDeque, sync::Arc, vec, vec::Vec};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation};
use spin::Mutex;

use crate::bus::HxBus;
use crate::crc::crc_with_ap;
use crate::regs::*;

pub const SIM_FLASH_SIZE: usize = 0x2_0000;
const SIM_CENTRAL_RUN: u8 = 0x05;

pub type SimBus = HxBus<Sim, NoDelay>;

pub fn new_bus() -> SimBus {
    HxBus::new(Sim::new(), NoDelay, crate::config::I2C_ADDR)
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

pub struct SimState {
    mem: BTreeMap<u32, u8>,
    bus_regs: [u8; 256],
    ahb_addr: u32,
    last_cmd: u8,
    ahb_writes: Vec<u32>,
    flash: Vec<u8>,
    status: u8,
    program_ptr: Option<usize>,
    /// SPI200 data FIFO; the window at `SPI200_DATA` is not plain memory.
    spi_fifo: Vec<u8>,
    jedec: [u8; 3],
    events: VecDeque<Vec<u8>>,
    dsram: Vec<u8>,
    answer_handshake: bool,
    stall_crc: bool,
    sense_off_armed: bool,
    resets: usize,
    fail_next: usize,
    sorting_map: bool,
    status_stuck: bool,
}

impl SimState {
    fn new() -> Self {
        let mut s = SimState {
            mem: BTreeMap::new(),
            bus_regs: [0; 256],
            ahb_addr: 0,
            last_cmd: 0,
            ahb_writes: Vec::new(),
            flash: vec![0xFF; SIM_FLASH_SIZE],
            status: 0x00,
            program_ptr: None,
            spi_fifo: Vec::new(),
            jedec: [0xEF, 0x60, 0x12],
            events: VecDeque::new(),
            dsram: Vec::new(),
            answer_handshake: true,
            stall_crc: false,
            sense_off_armed: false,
            resets: 0,
            fail_next: 0,
            sorting_map: true,
            status_stuck: false,
        };
        s.put(ADDR_ICID, &[0x00, 0x2A, 0x19, 0x83]);
        s.put(ADDR_IC_CASCADE, &[0x00, 0x0C, 0x00, 0x00]);
        s.put(ADDR_CS_CENTRAL_STATE, &[SIM_CENTRAL_RUN, 0, 0, 0]);
        s.put(SPI200_RST_STATUS, &[0x00, 0x80, 0x40, 0x00]);
        s.put(ADDR_FW_TRIGGER, &[0x00, 0x01, 0x00, 0x00]);
        s.put(ADDR_SORTING_MODE, &[0x99, 0x99, 0, 0]);
        s.reload();
        s
    }

    fn put(&mut self, addr: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.mem.insert(addr.wrapping_add(i as u32), *b);
        }
    }

    /// Low addresses fall through to the flash array.
    fn get(&self, addr: u32) -> u8 {
        match self.mem.get(&addr) {
            Some(v) => *v,
            None => self.flash.get(addr as usize).copied().unwrap_or(0),
        }
    }

    fn word(&self, addr: u32) -> u32 {
        u32::from_le_bytes([
            self.get(addr),
            self.get(addr + 1),
            self.get(addr + 2),
            self.get(addr + 3),
        ])
    }

    /// Firmware reload after reset: ready flags and versions from flash.
    fn reload(&mut self) {
        self.put(ADDR_RELOAD_CTRL, &[0x00, 0x00, 0x9A, 0xA9]);
        self.put(ADDR_FW_READY_ALT, &[0xC0, 0x72, 0x00, 0x00]);
        self.put(ADDR_CS_CENTRAL_STATE, &[SIM_CENTRAL_RUN, 0, 0, 0]);
        self.put(ADDR_CTRL_FW, &[0, 0, 0, 0]);
        self.program_ptr = None;

        let f = |a: usize| self.flash[a];
        if f(0xC005) != 0xFF {
            let (cid_maj, cid_min) = (f(0xC002), f(0xC003));
            let (fw_maj, fw_min) = (f(0xC005), f(0xC006));
            let (cfg_maj, cfg_min) = (f(0xC100), f(0xC101));
            self.put(ADDR_FW_CID, &[0, 0, cid_maj, cid_min]);
            self.put(ADDR_FW_ARCH, &[0x01, fw_maj, fw_min, 0]);
            self.put(ADDR_FW_CFG, &[0, 0, cfg_maj, cfg_min]);
        }
    }

    fn ahb_write(&mut self, addr: u32, data: &[u8]) {
        self.ahb_writes.push(addr);

        if addr == SPI200_DATA {
            if let Some(ptr) = self.program_ptr {
                for (i, b) in data.iter().enumerate() {
                    if let Some(slot) = self.flash.get_mut(ptr + i) {
                        *slot &= *b;
                    }
                }
                self.program_ptr = Some(ptr + data.len());
            } else {
                self.spi_fifo = data.to_vec();
            }
            return;
        }
        self.put(addr, data);

        match addr {
            ADDR_SYSTEM_RESET if data.first() == Some(&0x55) => {
                self.resets += 1;
                self.reload();
            }
            ADDR_CTRL_FW if data.first() == Some(&FW_STOP_REQ) => {
                self.put(ADDR_CTRL_FW, &[FW_STOP_ACK]);
            }
            SPI200_FIFO_RST => self.put(SPI200_FIFO_RST, &[0, 0, 0, 0]),
            SPI200_CMD => {
                if let Some(cmd) = data.first() {
                    self.spi_cmd(*cmd as u32);
                }
            }
            ADDR_CRC_LEN if data.get(2) == Some(&CRC_TRIGGER) => {
                if self.stall_crc {
                    self.put(ADDR_CRC_STATUS, &[0x01, 0, 0, 0]);
                } else {
                    let start = self.word(ADDR_CRC_START) as usize;
                    let words = (data[0] as usize) | ((data[1] as usize) << 8);
                    let end = (start + words * 4).min(self.flash.len());
                    let crc = crc_with_ap(&self.flash[start.min(end)..end]);
                    self.put(ADDR_CRC_RESULT, &crc.to_le_bytes());
                    self.put(ADDR_CRC_STATUS, &[0, 0, 0, 0]);
                }
            }
            ADDR_RAWDATA if data.len() >= 2 && data[0] == 0xA5 && data[1] == 0x5A => {
                if self.answer_handshake {
                    let mut frame = vec![0x5A, 0xA5];
                    frame.extend_from_slice(&self.dsram);
                    self.put(ADDR_RAWDATA, &frame);
                }
            }
            ADDR_SORTING_MODE if self.sorting_map => {
                let end = match data.first() {
                    Some(0x77) => Some(0x88),
                    Some(0x11) => Some(0x33),
                    Some(0x00) => Some(0x99),
                    Some(0xAA) => Some(0xCC),
                    _ => None,
                };
                if let Some(end) = end {
                    self.put(ADDR_SORTING_MODE, &[end, end, 0, 0]);
                }
            }
            _ => {}
        }
    }

    fn spi_cmd(&mut self, cmd: u32) {
        self.program_ptr = None;
        let addr = self.word(SPI200_ADDR) as usize;
        let wel = self.status & 0x02 != 0;
        let protected = self.status & 0x1C != 0;
        match cmd {
            FLASH_CMD_WREN => self.status |= 0x02,
            FLASH_CMD_RDSR => {
                let st = self.status;
                self.spi_fifo = vec![st, 0, 0, 0];
            }
            FLASH_CMD_WRSR if wel && !self.status_stuck => {
                self.status = self.spi_fifo.first().copied().unwrap_or(0) & 0xFC;
            }
            FLASH_CMD_CE if wel && !protected => {
                self.flash.fill(0xFF);
                self.status &= !0x02;
            }
            FLASH_CMD_BE if wel && !protected => self.erase(addr & !0xFFFF, 0x1_0000),
            FLASH_CMD_SE if wel && !protected => self.erase(addr & !0xFFF, 0x1000),
            FLASH_CMD_PP if wel && !protected => {
                self.program_ptr = Some(addr);
                self.status &= !0x02;
            }
            FLASH_CMD_RDID => {
                let j = self.jedec;
                self.spi_fifo = vec![j[0], j[1], j[2], 0];
            }
            FLASH_CMD_FAST_READ => {
                let mut buf = [0xFFu8; 16];
                for (i, b) in buf.iter_mut().enumerate() {
                    if let Some(v) = self.flash.get(addr + i) {
                        *b = *v;
                    }
                }
                self.spi_fifo = buf.to_vec();
            }
            _ => {}
        }
    }

    fn erase(&mut self, start: usize, len: usize) {
        let end = (start + len).min(self.flash.len());
        if start < end {
            self.flash[start..end].fill(0xFF);
        }
        self.status &= !0x02;
    }

    fn bus_write(&mut self, bytes: &[u8]) {
        let Some((&cmd, data)) = bytes.split_first() else {
            return;
        };
        self.last_cmd = cmd;
        match cmd {
            CMD_AHB_ADDR if data.len() >= 4 => {
                self.ahb_addr = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                if data.len() > 4 {
                    let addr = self.ahb_addr;
                    self.ahb_write(addr, &data[4..]);
                }
            }
            CMD_SENSE_ON_OFF_0 => {
                if data == [PARA_SENSE_OFF_0] {
                    self.sense_off_armed = true;
                } else {
                    self.sense_off_armed = false;
                    self.put(ADDR_CS_CENTRAL_STATE, &[SIM_CENTRAL_RUN]);
                }
            }
            CMD_SENSE_ON_OFF_1 => {
                if self.sense_off_armed && data == [PARA_SENSE_OFF_1] {
                    self.put(ADDR_CS_CENTRAL_STATE, &[CENTRAL_STATE_SAFE]);
                }
                self.sense_off_armed = false;
            }
            _ => {
                if let Some(b) = data.first() {
                    self.bus_regs[cmd as usize] = *b;
                }
            }
        }
    }

    fn bus_read(&mut self, buf: &mut [u8]) {
        match self.last_cmd {
            CMD_AHB_RDATA if self.ahb_addr == SPI200_DATA => {
                buf.fill(0);
                let n = self.spi_fifo.len().min(buf.len());
                buf[..n].copy_from_slice(&self.spi_fifo[..n]);
            }
            CMD_AHB_RDATA => {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = self.get(self.ahb_addr.wrapping_add(i as u32));
                }
            }
            CMD_EVENT_STACK => {
                buf.fill(0);
                if let Some(frame) = self.events.pop_front() {
                    let n = frame.len().min(buf.len());
                    buf[..n].copy_from_slice(&frame[..n]);
                }
            }
            cmd => buf.fill(self.bus_regs[cmd as usize]),
        }
    }
}

/// Cloneable handle; every clone talks to the same controller.
#[derive(Clone)]
pub struct Sim(Arc<Mutex<SimState>>);

impl Sim {
    pub fn new() -> Self {
        Sim(Arc::new(Mutex::new(SimState::new())))
    }

    pub fn poke(&self, addr: u32, data: &[u8]) {
        self.0.lock().put(addr, data);
    }

    pub fn peek(&self, addr: u32, out: &mut [u8]) {
        let s = self.0.lock();
        for (i, b) in out.iter_mut().enumerate() {
            *b = s.get(addr + i as u32);
        }
    }

    pub fn bus_reg(&self, cmd: u8) -> u8 {
        self.0.lock().bus_regs[cmd as usize]
    }

    pub fn ahb_writes_to(&self, addr: u32) -> usize {
        self.0.lock().ahb_writes.iter().filter(|a| **a == addr).count()
    }

    pub fn load_flash(&self, offset: usize, data: &[u8]) {
        let mut s = self.0.lock();
        s.flash[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn flash(&self) -> Vec<u8> {
        self.0.lock().flash.clone()
    }

    pub fn set_status(&self, status: u8) {
        self.0.lock().status = status;
    }

    pub fn status(&self) -> u8 {
        self.0.lock().status
    }

    /// Make the status register ignore writes.
    pub fn stick_status(&self, on: bool) {
        self.0.lock().status_stuck = on;
    }

    pub fn set_jedec(&self, id: [u8; 3]) {
        self.0.lock().jedec = id;
    }

    pub fn answer_handshake(&self, on: bool) {
        self.0.lock().answer_handshake = on;
    }

    pub fn stall_crc(&self, on: bool) {
        self.0.lock().stall_crc = on;
    }

    pub fn resets(&self) -> usize {
        self.0.lock().resets
    }

    pub fn fail_next(&self, n: usize) {
        self.0.lock().fail_next = n;
    }

    pub fn push_event(&self, frame: Vec<u8>) {
        self.0.lock().events.push_back(frame);
    }

    pub fn reload(&self) {
        self.0.lock().reload();
    }

    /// Stage mutual then self values; the header word balances the
    /// 16-bit checksum.
    pub fn load_dsram(&self, values: &[i16]) {
        let mut payload = vec![0u8; 2];
        for v in values {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let mut sum = 0u16;
        for w in payload[2..].chunks_exact(2) {
            sum = sum.wrapping_add(u16::from_le_bytes([w[0], w[1]]));
        }
        let fix = 0u16.wrapping_sub(sum).to_le_bytes();
        payload[0] = fix[0];
        payload[1] = fix[1];
        let mut s = self.0.lock();
        s.dsram = payload;
    }
}

impl ErrorType for Sim {
    type Error = ErrorKind;
}

impl I2c for Sim {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut s = self.0.lock();
        if s.fail_next > 0 {
            s.fail_next -= 1;
            return Err(ErrorKind::Other);
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => s.bus_write(bytes),
                Operation::Read(buf) => s.bus_read(buf),
            }
        }
        Ok(())
    }
}
