//! Raw data diagnostics: DSRAM readout, per-frame raw data and display
//! driver fail detection.

use alloc::{vec, vec::Vec};

use log::{debug, info, warn};

use crate::bus::Transport;
use crate::config::TouchInfo;
use crate::error::HxError;
use crate::ic::Ic;
use crate::mcu::{MAX_TRANS_SZ, Mcu};
use crate::regs::*;

const DSRAM_RETRY: usize = 3;
const RAW_READY_LB: u8 = 0x3A;
const RAW_READY_HB: u8 = 0xA3;

/// How each new DSRAM frame is folded into the buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessType {
    /// 1: keep the latest frame
    Copy,
    /// 2: keep the per-node maximum
    Max,
    /// 3: difference against the previous frame
    Delta,
}

impl ProcessType {
    pub fn from_raw(v: u8) -> Option<Self> {
        match v {
            1 => Some(ProcessType::Copy),
            2 => Some(ProcessType::Max),
            3 => Some(ProcessType::Delta),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            ProcessType::Copy => 1,
            ProcessType::Max => 2,
            ProcessType::Delta => 3,
        }
    }
}

/// Start DSRAM output, read one frame and stop it again.
///
/// Returns `(rx * tx + rx + tx) * 2` bytes of little endian samples,
/// mutual nodes first.
pub fn get_dsram_data(bus: &dyn Transport, info: &TouchInfo) -> Result<Vec<u8>, HxError> {
    let data_size = (info.mutual_num() + info.self_num()) * 2;
    let total = data_size + 4;

    let start = SRAM_PASSWRD_START.to_le_bytes();
    let end = SRAM_PASSWRD_END.to_le_bytes();
    if let Err(e) = bus.write_read_reg(ADDR_RAWDATA, [start[0], start[1], 0, 0], end[1], end[0]) {
        info!("DSRAM data not ready, bypass");
        if let Ok(regs) = bus.read_fw_status() {
            debug!("fw status {regs:02X?}");
        }
        return Err(e);
    }

    let mut buf = vec![0u8; total];
    for (i, chunk) in buf.chunks_mut(MAX_TRANS_SZ).enumerate() {
        bus.register_read(ADDR_RAWDATA + (i * MAX_TRANS_SZ) as u32, chunk)?;
    }

    // Stop output, keeping the frame header.
    bus.register_write(ADDR_RAWDATA, &[0, 0, buf[2], buf[3]])?;

    let sum = buf[2..]
        .chunks_exact(2)
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_le_bytes([w[0], w[1]])));
    if sum != 0 {
        info!("DSRAM checksum fail {sum:#06x}");
        return Err(HxError::Checksum);
    }
    buf.drain(..4);
    Ok(buf)
}

/// A sample is a signed high byte over an unsigned low byte.
fn sample(lo: u8, hi: u8) -> i32 {
    (hi as i8 as i32) * 256 + lo as i32
}

/// The raw part of a report frame sums to zero in 16-bit words.
pub fn rawdata_checksum_ok(raw: &[u8]) -> bool {
    let sum = raw
        .chunks_exact(2)
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_le_bytes([w[0], w[1]])));
    if sum != 0 {
        info!("raw data checksum fail {sum:#06x}");
    }
    sum == 0
}

/// Mutual and self node buffers filled from DSRAM or from report frames.
#[derive(Debug, Clone)]
pub struct DiagData {
    rx: usize,
    tx: usize,
    pub mutual: Vec<i32>,
    pub self_data: Vec<i32>,
    mutual_old: Vec<i32>,
    self_old: Vec<i32>,
    /// Frames folded in since the last reset.
    pub frames: u32,
    pub state_info: [u8; 2],
    pub coord: Vec<u8>,
}

impl DiagData {
    pub fn new(info: &TouchInfo) -> Self {
        let (m, s) = (info.mutual_num(), info.self_num());
        DiagData {
            rx: info.rx_num as usize,
            tx: info.tx_num as usize,
            mutual: vec![0; m],
            self_data: vec![0; s],
            mutual_old: vec![0; m],
            self_old: vec![0; s],
            frames: 0,
            state_info: [0; 2],
            coord: Vec::new(),
        }
    }

    pub fn rx(&self) -> usize {
        self.rx
    }

    pub fn tx(&self) -> usize {
        self.tx
    }

    pub fn clear(&mut self) {
        self.mutual.fill(0);
        self.self_data.fill(0);
        self.mutual_old.fill(0);
        self.self_old.fill(0);
        self.frames = 0;
    }

    /// Fold one DSRAM frame (as returned by [`get_dsram_data`]) in.
    pub fn apply_dsram(&mut self, ptype: ProcessType, data: &[u8]) {
        let m = self.mutual.len();
        let mut values = data.chunks_exact(2).map(|w| sample(w[0], w[1]));

        let bufs = [
            (&mut self.mutual, &mut self.mutual_old),
            (&mut self.self_data, &mut self.self_old),
        ];
        for (cur, old) in bufs {
            for (c, o) in cur.iter_mut().zip(old.iter_mut()) {
                let Some(v) = values.next() else {
                    break;
                };
                match ptype {
                    ProcessType::Copy => *c = v,
                    ProcessType::Max => *c = (*c).max(v),
                    ProcessType::Delta => {
                        *c = v - *o;
                        *o = v;
                    }
                }
            }
        }
        self.frames += 1;
        debug!("dsram frame {} ({m} mutual)", self.frames);
    }

    /// Copy one raw slice of a report frame into the buffers. The header
    /// carries the ready mark, the 1-based slice index and the diag command.
    pub fn parse_raw_frame(&mut self, raw: &[u8], rawdata_size: usize, diag_cmd: u8) -> bool {
        if raw.len() < 4
            || raw[0] != RAW_READY_LB
            || raw[1] != RAW_READY_HB
            || raw[2] == 0
            || raw[3] != diag_cmd
        {
            return false;
        }
        let words = rawdata_size / 2;
        let index = (raw[2] as usize - 1) * words;
        let m = self.mutual.len();
        let total = m + self.self_data.len();

        for (i, w) in raw[4..].chunks_exact(2).take(words).enumerate() {
            let idx = index + i;
            if idx >= total {
                break;
            }
            let v = sample(w[0], w[1]);
            if idx < m {
                self.mutual[idx] = v;
            } else {
                self.self_data[idx - m] = v;
            }
        }
        true
    }

    /// `(min, max)` over the mutual nodes.
    pub fn mutual_edges(&self) -> (i32, i32) {
        edges(&self.mutual)
    }

    pub fn self_edges(&self) -> (i32, i32) {
        edges(&self.self_data)
    }
}

fn edges(v: &[i32]) -> (i32, i32) {
    v.iter()
        .fold((i32::MAX, i32::MIN), |(lo, hi), x| (lo.min(*x), hi.max(*x)))
}

/// DSRAM polling for process types 1 to 3.
pub fn diag_dsram_pass(
    bus: &dyn Transport,
    info: &TouchInfo,
    ptype: ProcessType,
    diag: &mut DiagData,
) -> Result<(), HxError> {
    bus.burst_enable(true)?;
    let mut last = HxError::Checksum;
    for _ in 0..DSRAM_RETRY {
        match get_dsram_data(bus, info) {
            Ok(data) => {
                diag.apply_dsram(ptype, &data);
                return Ok(());
            }
            Err(e) => last = e,
        }
    }
    warn!("get DSRAM data failed: {last}");
    Err(last)
}

/// Dump display driver register E5 from both banks.
pub fn faildet(bus: &dyn Transport, ic: &dyn Ic) -> Result<[[u8; 8]; 2], HxError> {
    let mut out = [[0u8; 8]; 2];
    ic.dd_clk_set(bus, true)?;
    ic.dd_reg_en(bus)?;
    for (bank, data) in out.iter_mut().enumerate() {
        bus.dd_reg_read(0xE5, 0, data, bank as u8)?;
        info!("E5 bank{bank}: {:02X?}", data);
    }
    ic.dd_clk_set(bus, false)?;
    Ok(out)
}
