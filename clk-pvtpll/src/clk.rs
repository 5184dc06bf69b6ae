use alloc::{boxed::Box, sync::Arc, vec::Vec};

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};
use rdif_clk::{ClockId, Interface};
use rdrive::{DriverGeneric, KError};
use spin::Mutex;

use crate::error::{PvtpllError, map_pvtpll_error_to_kerror};
use crate::regmap::{Regmap, hiword_update};
use crate::table::*;

/// The oscillator has a single output.
pub const PVTPLL_CLK_ID: usize = 0;

const CALIBRATE_RETRY: u32 = 20;
const CALIBRATE_SETTLE_US: u32 = 2000;

static PVTPLL_LIST: Mutex<Vec<Arc<Mutex<Pvtpll>>>> = Mutex::new(Vec::new());

struct Pvtpll {
    kind: PvtpllKind,
    info: PvtpllInfo,
    regmap: Box<dyn Regmap>,
    table: Vec<PvtpllEntry>,
    cur_rate: u64,
    /// Id of this clock in the parent clock controller.
    clock_id: Option<u32>,
}

impl Pvtpll {
    fn find(&self, rate: u64) -> Option<PvtpllEntry> {
        self.table.iter().find(|e| e.rate == rate).copied()
    }

    fn config(&mut self, entry: &PvtpllEntry) -> Result<(), PvtpllError> {
        match self.info.layout {
            Layout::Rv1103b => {
                self.regmap.write(
                    RV1103B_PVTPLL_GCK_LEN,
                    hiword_update(entry.ring_sel, RV1103B_GCK_RING_SEL_MASK, RV1103B_GCK_RING_SEL_SHIFT),
                )?;
                self.regmap.write(
                    RV1103B_PVTPLL_GCK_LEN,
                    hiword_update(
                        entry.length,
                        RV1103B_GCK_RING_LEN_SEL_MASK,
                        RV1103B_GCK_RING_LEN_SEL_SHIFT,
                    ),
                )?;
                let cfg = RV1103B_GCK_EN | RV1103B_GCK_MODE;
                self.regmap.write(RV1103B_PVTPLL_GCK_CFG, cfg | (cfg << 16))?;
                self.regmap
                    .write(RV1103B_PVTPLL_GCK_CFG, RV1103B_GCK_START | (RV1103B_GCK_START << 16))?;
            }
            Layout::Rk3506 => {
                self.regmap.write(
                    RK3506_GRF_CORE_PVTPLL_CON0_L,
                    hiword_update(entry.ring_sel, RK3506_OSC_RING_SEL_MASK, RK3506_OSC_RING_SEL_SHIFT),
                )?;
                self.regmap.write(
                    RK3506_GRF_CORE_PVTPLL_CON0_H,
                    hiword_update(entry.length, RK3506_RING_LENGTH_SEL_MASK, RK3506_RING_LENGTH_SEL_SHIFT),
                )?;
                let con = RK3506_START | RK3506_OSC_EN;
                self.regmap.write(RK3506_GRF_CORE_PVTPLL_CON0_L, con | (con << 16))?;
            }
        }
        Ok(())
    }

    fn set_rate(&mut self, rate: u64) -> Result<(), PvtpllError> {
        let Some(entry) = self.find(rate) else {
            debug!("{:?}: no table entry for {} Hz", self.kind, rate);
            return Ok(());
        };
        self.config(&entry)?;
        self.cur_rate = rate;
        Ok(())
    }

    fn volt_sel_adjust(&mut self, volt_sel: u32) -> Result<(), PvtpllError> {
        let factor = self.info.adjust_factor;
        for i in 0..self.table.len() {
            let thr = self.table[i].volt_sel_thr;
            if thr == 0 || volt_sel < thr {
                continue;
            }
            let entry = &mut self.table[i];
            entry.length =
                (entry.length + (volt_sel - thr + 1) * factor).min(PVTPLL_ADJUST_MAX_LENGTH);
            let entry = *entry;
            if entry.rate == self.cur_rate {
                self.config(&entry)?;
            }
        }
        Ok(())
    }

    fn read_len(&self) -> Result<u32, PvtpllError> {
        let val = self.regmap.read(RV1103B_PVTPLL_GCK_LEN)?;
        Ok((val >> RV1103B_GCK_RING_LEN_SEL_SHIFT) & RV1103B_GCK_RING_LEN_SEL_MASK)
    }

    fn write_len(&mut self, length: u32) -> Result<(), PvtpllError> {
        self.regmap.write(
            RV1103B_PVTPLL_GCK_LEN,
            hiword_update(length, RV1103B_GCK_RING_LEN_SEL_MASK, RV1103B_GCK_RING_LEN_SEL_SHIFT),
        )
    }

    /// Stretch the ring until the averaged counter lands within 1/16 above
    /// the current rate. Only a too fast oscillator is corrected.
    fn calibrate(&mut self, delay: &mut dyn DelayNs) -> Result<(), PvtpllError> {
        let Some(cal) = self.info.calibrate else {
            return Ok(());
        };
        let target = (self.cur_rate / MHZ) as u32;
        let window = target >> 4;

        let mut rate = self.regmap.read(RV1103B_PVTPLL_GCK_CNT_AVG)?;
        if rate < target || rate - target < window {
            return Ok(());
        }

        let length_ori = self.read_len()?;
        let mut length = length_ori + ((rate - target) / cal.freq_per_step) * cal.length_step;
        self.write_len(length)?;
        delay.delay_us(CALIBRATE_SETTLE_US);
        rate = self.regmap.read(RV1103B_PVTPLL_GCK_CNT_AVG)?;

        let mut i = 0;
        while rate < target || rate - target > window {
            if i > CALIBRATE_RETRY {
                warn!("{:?}: calibrate gave up at length {}", self.kind, length);
                break;
            }
            i += 1;
            if rate > target {
                length += cal.length_step;
            } else {
                length = length.saturating_sub(cal.length_step);
            }
            if length < length_ori {
                break;
            }
            self.write_len(length)?;
            delay.delay_us(CALIBRATE_SETTLE_US);
            rate = self.regmap.read(RV1103B_PVTPLL_GCK_CNT_AVG)?;
        }
        info!("{:?}: calibrated length {} -> {}, {} MHz", self.kind, length_ori, length, rate);
        Ok(())
    }
}

/// Fused opp-info cell: a rate window and the ring length to add in it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtpOppInfo {
    /// MHz
    pub min_freq: u16,
    /// MHz
    pub max_freq: u16,
    pub volt: u8,
    pub length: u8,
}

impl OtpOppInfo {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, PvtpllError> {
        match *buf {
            [a, b, c, d, volt, length] => Ok(OtpOppInfo {
                min_freq: u16::from_le_bytes([a, b]),
                max_freq: u16::from_le_bytes([c, d]),
                volt,
                length,
            }),
            _ => Err(PvtpllError::InvalidArg("opp-info")),
        }
    }
}

pub struct PvtpllDriver {
    inner: Arc<Mutex<Pvtpll>>,
    delay: Box<dyn DelayNs + Send>,
    assigned_rate: Option<u64>,
}

impl PvtpllDriver {
    pub fn new(
        kind: PvtpllKind,
        regmap: impl Regmap + 'static,
        delay: impl DelayNs + Send + 'static,
    ) -> Self {
        let info = kind.info();
        PvtpllDriver {
            inner: Arc::new(Mutex::new(Pvtpll {
                kind,
                info,
                regmap: Box::new(regmap),
                table: info.table.to_vec(),
                cur_rate: 0,
                clock_id: None,
            })),
            delay: Box::new(delay),
            assigned_rate: None,
        }
    }

    /// Id of this clock in its parent clock controller, used by
    /// [`volt_sel_adjust`].
    pub fn with_clock_id(self, id: u32) -> Self {
        self.inner.lock().clock_id = Some(id);
        self
    }

    /// Rate programmed on open, before calibration.
    pub fn with_assigned_rate(mut self, rate: u64) -> Self {
        self.assigned_rate = Some(rate);
        self
    }

    pub fn kind(&self) -> PvtpllKind {
        self.inner.lock().kind
    }

    pub fn table(&self) -> Vec<PvtpllEntry> {
        self.inner.lock().table.clone()
    }

    /// Select the J/M grade table from the fused specification serial number.
    pub fn switch_table(&mut self, serial: u8) {
        let mut p = self.inner.lock();
        let Some(jm) = p.info.jm_table else {
            return;
        };
        // M = 0xd, J = 0xa
        if serial == 0xd || serial == 0xa {
            info!("{:?}: using J/M table", p.kind);
            p.table = jm.to_vec();
        }
    }

    pub fn adjust_by_otp(&mut self, otp: &OtpOppInfo) {
        if otp.length == 0 {
            return;
        }
        info!(
            "adjust opp-table by otp: min={}M, max={}M, length={}",
            otp.min_freq, otp.max_freq, otp.length
        );
        let min = otp.min_freq as u64 * MHZ;
        let max = otp.max_freq as u64 * MHZ;
        let mut p = self.inner.lock();
        for e in p.table.iter_mut().filter(|e| e.rate >= min && e.rate <= max) {
            e.length = (e.length + otp.length as u32).min(PVTPLL_ADJUST_MAX_LENGTH);
        }
    }

    /// `rate` if the table has it, else 0.
    pub fn round_rate(&self, rate: u64) -> u64 {
        match self.inner.lock().find(rate) {
            Some(_) => rate,
            None => 0,
        }
    }

    pub fn calibrate(&mut self) -> Result<(), PvtpllError> {
        let mut p = self.inner.lock();
        if p.cur_rate == 0 {
            return Ok(());
        }
        p.calibrate(self.delay.as_mut())
    }

    fn registered(&self) -> bool {
        PVTPLL_LIST.lock().iter().any(|p| Arc::ptr_eq(p, &self.inner))
    }
}

/// Lengthen the ring of the oscillator feeding `clock_id` for a higher
/// voltage selector, re-programming the active rate.
pub fn volt_sel_adjust(clock_id: u32, volt_sel: u32) -> Result<(), PvtpllError> {
    let list = PVTPLL_LIST.lock();
    for p in list.iter() {
        let mut p = p.lock();
        if p.clock_id == Some(clock_id) && p.info.adjust_factor != 0 {
            return p.volt_sel_adjust(volt_sel);
        }
    }
    Err(PvtpllError::NoDevice(clock_id))
}

impl DriverGeneric for PvtpllDriver {
    fn open(&mut self) -> Result<(), KError> {
        if let Some(rate) = self.assigned_rate {
            self.inner.lock().set_rate(rate).map_err(map_pvtpll_error_to_kerror)?;
        }
        if let Err(e) = self.calibrate() {
            warn!("calibrate error: {e}");
        }
        if !self.registered() {
            PVTPLL_LIST.lock().push(self.inner.clone());
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), KError> {
        PVTPLL_LIST.lock().retain(|p| !Arc::ptr_eq(p, &self.inner));
        Ok(())
    }
}

impl Interface for PvtpllDriver {
    fn perper_enable(&mut self) {
        debug!("perper_enable");
    }

    fn get_rate(&self, id: ClockId) -> Result<u64, KError> {
        let rate = match id.into() {
            PVTPLL_CLK_ID => self.inner.lock().cur_rate,
            _ => {
                warn!("Unsupported clock ID: {:?}", id);
                Err(KError::InvalidArg { name: "clock_id" })?
            }
        };
        Ok(rate)
    }

    fn set_rate(&mut self, id: ClockId, rate: u64) -> Result<(), KError> {
        match id.into() {
            PVTPLL_CLK_ID => {
                info!("Setting pvtpll clock to {} Hz", rate);
                self.inner
                    .lock()
                    .set_rate(rate)
                    .map_err(map_pvtpll_error_to_kerror)
            }
            _ => {
                warn!("Unsupported clock ID: {:?}", id);
                Err(KError::InvalidArg { name: "clock_id" })
            }
        }
    }
}
