//! Production self test: sorting modes, frame averaging and limit checks.

use alloc::vec::Vec;

use log::{error, info, warn};

use crate::bus::Transport;
use crate::config::TouchInfo;
use crate::diag::get_dsram_data;
use crate::error::HxError;
use crate::ic::Ic;
use crate::mcu::Mcu;
use crate::regs::*;

const RAWDATA_RETRY: usize = 200;
const SORTING_POLL: usize = 50;

/// 帧数
const NOISE_FRAME: u16 = 60;
const OTHERS_FRAME: u16 = 2;
const DEFAULT_FRAME: u16 = 1;

// bank search
const BS_OPENSHORT: u8 = 0;
const BS_RAWDATA: u8 = 8;
const BS_NOISE: u8 = 8;

const DATA_BACK_NORMAL: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectMode {
    Open,
    Short,
    Rawdata,
    Noise,
    Sorting,
}

impl InspectMode {
    pub fn name(self) -> &'static str {
        match self {
            InspectMode::Open => "HIMAX_OPEN",
            InspectMode::Short => "HIMAX_SHORT",
            InspectMode::Rawdata => "HIMAX_RAWDATA",
            InspectMode::Noise => "HIMAX_NOISE",
            InspectMode::Sorting => "HIMAX_SORTING",
        }
    }

    /// Password written to enter the mode.
    pub fn start_pwd(self) -> u8 {
        match self {
            InspectMode::Open => 0x77,
            InspectMode::Short => 0x11,
            InspectMode::Rawdata | InspectMode::Noise => 0x00,
            InspectMode::Sorting => 0xAA,
        }
    }

    /// Password the firmware answers once the mode is active.
    pub fn end_pwd(self) -> u8 {
        match self {
            InspectMode::Open => 0x88,
            InspectMode::Short => 0x33,
            InspectMode::Rawdata | InspectMode::Noise => 0x99,
            InspectMode::Sorting => 0xCC,
        }
    }

    pub fn data_type(self) -> u8 {
        match self {
            InspectMode::Open => 0x0B,
            InspectMode::Short | InspectMode::Rawdata | InspectMode::Sorting => 0x0A,
            InspectMode::Noise => 0x0F,
        }
    }

    fn n_frame(self) -> u16 {
        match self {
            InspectMode::Noise => NOISE_FRAME,
            _ => OTHERS_FRAME,
        }
    }

    fn bank_search(self) -> u8 {
        match self {
            InspectMode::Rawdata => BS_RAWDATA,
            InspectMode::Noise => BS_NOISE,
            _ => BS_OPENSHORT,
        }
    }
}

/// Per node limits over the mutual area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub min: Vec<i32>,
    pub max: Vec<i32>,
}

impl Criteria {
    pub fn uniform(nodes: usize, min: i32, max: i32) -> Self {
        Criteria {
            min: alloc::vec![min; nodes],
            max: alloc::vec![max; nodes],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectResult {
    pub mode: InspectMode,
    pub data: Vec<i32>,
    /// Node indexes outside the limits.
    pub failed: Vec<usize>,
}

impl InspectResult {
    pub fn passed(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn min_max(&self) -> Option<(i32, i32)> {
        let min = self.data.iter().copied().min()?;
        let max = self.data.iter().copied().max()?;
        Some((min, max))
    }
}

/// `true` when the firmware already runs `mode`.
pub fn check_mode(bus: &dyn Transport, mode: InspectMode) -> Result<bool, HxError> {
    let d = bus.check_sorting_mode()?;
    let end = mode.end_pwd();
    Ok(d[0] == end && d[1] == end)
}

pub fn switch_mode(bus: &dyn Transport, mode: InspectMode) -> Result<(), HxError> {
    info!("switch mode to {}", mode.name());
    // stop handshaking
    bus.write_word(ADDR_RAWDATA, 0)?;
    let s = mode.start_pwd();
    bus.assign_sorting_mode([s, s, 0, 0])
}

/// Select the bank for `mode` and the number of frames the firmware folds.
pub fn set_n_frame(bus: &dyn Transport, n_frame: u16, mode: InspectMode) -> Result<(), HxError> {
    let mut d = bus.read_word(ADDR_INFO_RXTX)?;
    d[0] = mode.bank_search();
    bus.register_write(ADDR_INFO_RXTX, &d)?;
    bus.write_word(ADDR_SET_FRAME, n_frame as u32)
}

pub fn wait_sorting_mode(bus: &dyn Transport, mode: InspectMode) -> Result<(), HxError> {
    for count in 0..SORTING_POLL {
        if check_mode(bus, mode)? {
            return Ok(());
        }
        bus.read_fw_status()?;
        info!("now retry {count} times");
        bus.msleep(50);
    }
    error!("{} not reached", mode.name());
    Err(HxError::Timeout("sorting mode"))
}

fn switch_data_type(bus: &dyn Transport, data_type: u8) -> Result<(), HxError> {
    bus.diag_register_set(data_type, 0, false)
}

/// One mutual frame as unsigned 16-bit samples.
fn get_rawdata(bus: &dyn Transport, info: &TouchInfo) -> Result<Vec<i32>, HxError> {
    let mut last = HxError::Timeout("rawdata");
    for _ in 0..RAWDATA_RETRY {
        match get_dsram_data(bus, info) {
            Ok(buf) => {
                let raw: Vec<i32> = buf
                    .chunks_exact(2)
                    .take(info.mutual_num())
                    .map(|w| u16::from_le_bytes([w[0], w[1]]) as i32)
                    .collect();
                return Ok(raw);
            }
            Err(e) => last = e,
        }
    }
    warn!("rawdata: giving up after {RAWDATA_RETRY} tries");
    Err(last)
}

fn compare(mode: InspectMode, data: &[i32], criteria: &Criteria) -> Vec<usize> {
    data.iter()
        .enumerate()
        .filter(|&(i, &v)| {
            let min = criteria.min.get(i).copied().unwrap_or(i32::MIN);
            // sorting has no upper bound
            let max = match mode {
                InspectMode::Sorting => i32::MAX,
                _ => criteria.max.get(i).copied().unwrap_or(i32::MAX),
            };
            v < min || v > max
        })
        .map(|(i, _)| i)
        .collect()
}

/// Run one test item and leave the chip in the item's mode.
pub fn run_item(
    bus: &dyn Transport,
    ic: &dyn Ic,
    info: &TouchInfo,
    mode: InspectMode,
    criteria: &Criteria,
) -> Result<InspectResult, HxError> {
    info!("now check type {}", mode.name());

    if !check_mode(bus, mode)? {
        info!("need change mode, target {}", mode.name());
        ic.sense_off(bus, true)?;
        bus.reload_disable(true)?;
        switch_mode(bus, mode)?;
        set_n_frame(bus, mode.n_frame(), mode)?;
        ic.sense_on(bus, true)?;
    }

    wait_sorting_mode(bus, mode)?;
    switch_data_type(bus, mode.data_type())?;
    let data = get_rawdata(bus, info)?;
    switch_data_type(bus, DATA_BACK_NORMAL)?;

    let failed = compare(mode, &data, criteria);
    for i in failed.iter().take(8) {
        warn!("{}: fail at index {i} value {}", mode.name(), data[*i]);
    }
    info!(
        "{}: {}",
        mode.name(),
        if failed.is_empty() { "Test Pass!" } else { "Test Fail!" }
    );
    Ok(InspectResult { mode, data, failed })
}

/// Put the firmware back into normal scanning.
pub fn back_to_normal(bus: &dyn Transport, ic: &dyn Ic) -> Result<(), HxError> {
    ic.sense_off(bus, true)?;
    bus.write_word(ADDR_SET_FRAME, DEFAULT_FRAME as u32)?;
    bus.reload_disable(false)?;

    if check_mode(bus, InspectMode::Rawdata)? {
        info!("already in normal mode");
        return ic.sense_on(bus, false);
    }
    switch_mode(bus, InspectMode::Rawdata)?;
    ic.sense_on(bus, false)?;
    wait_sorting_mode(bus, InspectMode::Rawdata)
}

/// Run every item, then return to normal mode. An item that cannot switch
/// mode or read data is reported as an error in its slot.
pub fn self_test(
    bus: &dyn Transport,
    ic: &dyn Ic,
    info: &TouchInfo,
    items: &[(InspectMode, Criteria)],
) -> Result<Vec<Result<InspectResult, HxError>>, HxError> {
    let results = items
        .iter()
        .map(|(mode, criteria)| {
            let r = run_item(bus, ic, info, *mode, criteria);
            if let Err(e) = &r {
                error!("{}: {e}", mode.name());
            }
            r
        })
        .collect();
    back_to_normal(bus, ic)?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ic::hx83192::Hx83192;
    use crate::sim::new_bus;

    fn info() -> TouchInfo {
        TouchInfo {
            rx_num: 4,
            tx_num: 3,
            ..TouchInfo::fixed()
        }
    }

    fn frame(mutual: &[i16]) -> Vec<i16> {
        let mut v = mutual.to_vec();
        v.resize(12 + 7, 0);
        v
    }

    #[test]
    fn passwords_pair_up() {
        assert_eq!(InspectMode::Open.start_pwd(), 0x77);
        assert_eq!(InspectMode::Open.end_pwd(), 0x88);
        assert_eq!(InspectMode::Noise.data_type(), 0x0F);
        assert_eq!(InspectMode::Rawdata.start_pwd(), InspectMode::Noise.start_pwd());
    }

    #[test]
    fn set_n_frame_keeps_info_bytes() {
        let bus = new_bus();
        bus.sim().poke(ADDR_INFO_RXTX, &[0x05, 0x00, 0x20, 0x30]);
        set_n_frame(&bus, NOISE_FRAME, InspectMode::Noise).unwrap();
        assert_eq!(bus.read_word(ADDR_INFO_RXTX).unwrap(), [BS_NOISE, 0x00, 0x20, 0x30]);
        assert_eq!(bus.read_word(ADDR_SET_FRAME).unwrap(), [60, 0, 0, 0]);
    }

    #[test]
    fn open_item_switches_mode_and_passes() {
        let bus = new_bus();
        let ic = Hx83192::new();
        bus.sim().load_dsram(&frame(&[500; 12]));

        let r = run_item(&bus, &ic, &info(), InspectMode::Open, &Criteria::uniform(12, 100, 900))
            .unwrap();
        assert!(r.passed());
        assert_eq!(r.data.len(), 12);
        assert_eq!(r.min_max(), Some((500, 500)));
        assert!(check_mode(&bus, InspectMode::Open).unwrap());
        assert_eq!(bus.read_word(ADDR_RELOAD_CTRL).unwrap(), DATA_RELOAD_DISABLE.to_le_bytes());
        assert_eq!(bus.read_word(ADDR_RAW_OUT_SEL).unwrap()[0], DATA_BACK_NORMAL);
    }

    #[test]
    fn out_of_limit_nodes_are_listed() {
        let bus = new_bus();
        let ic = Hx83192::new();
        let mut m = [300i16; 12];
        m[2] = 50;
        m[7] = 1200;
        bus.sim().load_dsram(&frame(&m));

        let r = run_item(&bus, &ic, &info(), InspectMode::Short, &Criteria::uniform(12, 100, 900))
            .unwrap();
        assert!(!r.passed());
        assert_eq!(r.failed, [2, 7]);
    }

    #[test]
    fn sorting_ignores_upper_limit() {
        let bus = new_bus();
        let ic = Hx83192::new();
        bus.sim().load_dsram(&frame(&[5000; 12]));
        let r = run_item(&bus, &ic, &info(), InspectMode::Sorting, &Criteria::uniform(12, 100, 900))
            .unwrap();
        assert!(r.passed());
    }

    #[test]
    fn rawdata_item_runs_in_place_when_already_normal() {
        let bus = new_bus();
        let ic = Hx83192::new();
        bus.sim().load_dsram(&frame(&[700; 12]));
        let before = bus.sim().ahb_writes_to(ADDR_SORTING_MODE);
        let r = run_item(&bus, &ic, &info(), InspectMode::Rawdata, &Criteria::uniform(12, 0, 1000))
            .unwrap();
        assert!(r.passed());
        assert_eq!(bus.sim().ahb_writes_to(ADDR_SORTING_MODE), before);
    }

    #[test]
    fn missing_handshake_fails_item() {
        let bus = new_bus();
        let ic = Hx83192::new();
        bus.sim().answer_handshake(false);
        let r = run_item(&bus, &ic, &info(), InspectMode::Rawdata, &Criteria::uniform(12, 0, 1000));
        assert!(r.is_err());
    }

    #[test]
    fn self_test_returns_to_normal() {
        let bus = new_bus();
        let ic = Hx83192::new();
        bus.sim().load_dsram(&frame(&[400; 12]));
        let items = [
            (InspectMode::Open, Criteria::uniform(12, 100, 900)),
            (InspectMode::Short, Criteria::uniform(12, 500, 900)),
        ];
        let results = self_test(&bus, &ic, &info(), &items).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap().passed());
        assert!(!results[1].as_ref().unwrap().passed());

        assert!(check_mode(&bus, InspectMode::Rawdata).unwrap());
        assert_eq!(bus.read_word(ADDR_SET_FRAME).unwrap()[0], 1);
        assert_eq!(bus.read_word(ADDR_RELOAD_CTRL).unwrap()[..2], [0x00, 0x00]);
    }
}
