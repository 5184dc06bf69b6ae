//! Per SoC rate tables and register layouts.

/// 频率常量
pub const MHZ: u64 = 1_000_000;

pub const RV1103B_PVTPLL_GCK_CFG: u32 = 0x20;
pub const RV1103B_PVTPLL_GCK_LEN: u32 = 0x24;
pub const RV1103B_PVTPLL_GCK_CNT_AVG: u32 = 0x54;
pub const RV1103B_GCK_START: u32 = 1 << 0;
pub const RV1103B_GCK_EN: u32 = 1 << 1;
pub const RV1103B_GCK_MODE: u32 = 1 << 5;
pub const RV1103B_GCK_RING_LEN_SEL_SHIFT: u32 = 0;
pub const RV1103B_GCK_RING_LEN_SEL_MASK: u32 = 0x1ff;
pub const RV1103B_GCK_RING_SEL_SHIFT: u32 = 10;
pub const RV1103B_GCK_RING_SEL_MASK: u32 = 0x07;
pub const RV1103B_PVTPLL_MAX_LENGTH: u32 = 0x1ff;

pub const RK3506_GRF_CORE_PVTPLL_CON0_L: u32 = 0x00;
pub const RK3506_GRF_CORE_PVTPLL_CON0_H: u32 = 0x04;
pub const RK3506_OSC_RING_SEL_SHIFT: u32 = 8;
pub const RK3506_OSC_RING_SEL_MASK: u32 = 0x03;
pub const RK3506_OSC_EN: u32 = 1 << 1;
pub const RK3506_START: u32 = 1 << 0;
pub const RK3506_RING_LENGTH_SEL_SHIFT: u32 = 0;
pub const RK3506_RING_LENGTH_SEL_MASK: u32 = 0x7f;
pub const RK3506_PVTPLL_MAX_LENGTH: u32 = 0x7f;

/// Ceiling for voltage and OTP length stretches, whatever the family.
pub const PVTPLL_ADJUST_MAX_LENGTH: u32 = RK3506_PVTPLL_MAX_LENGTH;

/// One operating point of the ring oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PvtpllEntry {
    pub rate: u64,
    pub ring_sel: u32,
    pub length: u32,
    /// Voltage selector from which the length is stretched; 0 disables.
    pub volt_sel_thr: u32,
}

const fn pvtpll(rate: u64, ring_sel: u32, length: u32) -> PvtpllEntry {
    pvtpll_volt_sel(rate, ring_sel, length, 0)
}

const fn pvtpll_volt_sel(rate: u64, ring_sel: u32, length: u32, volt_sel_thr: u32) -> PvtpllEntry {
    PvtpllEntry {
        rate,
        ring_sel,
        length,
        volt_sel_thr,
    }
}

pub static RV1103B_CORE_TABLE: [PvtpllEntry; 7] = [
    pvtpll_volt_sel(1_608_000_000, 1, 6, 7),
    pvtpll_volt_sel(1_512_000_000, 1, 6, 6),
    pvtpll_volt_sel(1_416_000_000, 1, 6, 6),
    pvtpll_volt_sel(1_296_000_000, 1, 6, 5),
    pvtpll_volt_sel(1_200_000_000, 1, 6, 3),
    pvtpll_volt_sel(1_008_000_000, 1, 26, 3),
    pvtpll_volt_sel(816_000_000, 1, 50, 3),
];

pub static RV1103B_ENC_TABLE: [PvtpllEntry; 1] = [pvtpll(500_000_000, 1, 80)];

pub static RV1103B_ISP_TABLE: [PvtpllEntry; 1] = [pvtpll(400_000_000, 1, 160)];

pub static RV1103B_NPU_TABLE: [PvtpllEntry; 4] = [
    pvtpll_volt_sel(1_000_000_000, 1, 12, 7),
    pvtpll_volt_sel(900_000_000, 1, 12, 6),
    pvtpll_volt_sel(800_000_000, 1, 12, 4),
    pvtpll_volt_sel(700_000_000, 1, 32, 4),
];

pub static RK3506_CORE_TABLE: [PvtpllEntry; 7] = [
    pvtpll_volt_sel(1_608_000_000, 0, 6, 7),
    pvtpll_volt_sel(1_512_000_000, 0, 6, 7),
    pvtpll_volt_sel(1_416_000_000, 0, 6, 5),
    pvtpll_volt_sel(1_296_000_000, 0, 6, 3),
    pvtpll_volt_sel(1_200_000_000, 0, 6, 2),
    pvtpll_volt_sel(1_008_000_000, 0, 10, 4),
    pvtpll_volt_sel(800_000_000, 0, 18, 4),
];

/// RK3506J/M parts.
pub static RK3506J_CORE_TABLE: [PvtpllEntry; 7] = [
    pvtpll_volt_sel(1_608_000_000, 0, 6, 7),
    pvtpll_volt_sel(1_512_000_000, 0, 7, 7),
    pvtpll_volt_sel(1_416_000_000, 0, 7, 5),
    pvtpll_volt_sel(1_296_000_000, 0, 7, 3),
    pvtpll_volt_sel(1_200_000_000, 0, 7, 2),
    pvtpll_volt_sel(1_008_000_000, 0, 11, 2),
    pvtpll_volt_sel(800_000_000, 0, 19, 2),
];

/// Register layout of the oscillator block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Rv1103b,
    Rk3506,
}

impl Layout {
    pub fn max_length(self) -> u32 {
        match self {
            Layout::Rv1103b => RV1103B_PVTPLL_MAX_LENGTH,
            Layout::Rk3506 => RK3506_PVTPLL_MAX_LENGTH,
        }
    }
}

/// Ring length calibration against the averaged counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibrate {
    pub length_step: u32,
    /// MHz of counter error corrected by one step.
    pub freq_per_step: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PvtpllInfo {
    pub layout: Layout,
    pub table: &'static [PvtpllEntry],
    pub jm_table: Option<&'static [PvtpllEntry]>,
    /// Length added per voltage selector step; 0 disables the adjustment.
    pub adjust_factor: u32,
    pub calibrate: Option<Calibrate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvtpllKind {
    Rv1103bCore,
    Rv1103bEnc,
    Rv1103bIsp,
    Rv1103bNpu,
    Rk3506Core,
}

impl PvtpllKind {
    pub const ALL: [PvtpllKind; 5] = [
        PvtpllKind::Rv1103bCore,
        PvtpllKind::Rv1103bEnc,
        PvtpllKind::Rv1103bIsp,
        PvtpllKind::Rv1103bNpu,
        PvtpllKind::Rk3506Core,
    ];

    pub fn compatible(self) -> &'static str {
        match self {
            PvtpllKind::Rv1103bCore => "rockchip,rv1103b-core-pvtpll",
            PvtpllKind::Rv1103bEnc => "rockchip,rv1103b-enc-pvtpll",
            PvtpllKind::Rv1103bIsp => "rockchip,rv1103b-isp-pvtpll",
            PvtpllKind::Rv1103bNpu => "rockchip,rv1103b-npu-pvtpll",
            PvtpllKind::Rk3506Core => "rockchip,rk3506-core-pvtpll",
        }
    }

    pub fn from_compatible(compatible: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.compatible() == compatible)
    }

    pub fn info(self) -> PvtpllInfo {
        match self {
            PvtpllKind::Rv1103bCore => PvtpllInfo {
                layout: Layout::Rv1103b,
                table: &RV1103B_CORE_TABLE,
                jm_table: None,
                adjust_factor: 4,
                calibrate: Some(Calibrate {
                    length_step: 2,
                    freq_per_step: 30,
                }),
            },
            PvtpllKind::Rv1103bEnc => PvtpllInfo {
                layout: Layout::Rv1103b,
                table: &RV1103B_ENC_TABLE,
                jm_table: None,
                adjust_factor: 0,
                calibrate: Some(Calibrate {
                    length_step: 8,
                    freq_per_step: 25,
                }),
            },
            PvtpllKind::Rv1103bIsp => PvtpllInfo {
                layout: Layout::Rv1103b,
                table: &RV1103B_ISP_TABLE,
                jm_table: None,
                adjust_factor: 0,
                calibrate: None,
            },
            PvtpllKind::Rv1103bNpu => PvtpllInfo {
                layout: Layout::Rv1103b,
                table: &RV1103B_NPU_TABLE,
                jm_table: None,
                adjust_factor: 6,
                calibrate: Some(Calibrate {
                    length_step: 4,
                    freq_per_step: 25,
                }),
            },
            PvtpllKind::Rk3506Core => PvtpllInfo {
                layout: Layout::Rk3506,
                table: &RK3506_CORE_TABLE,
                jm_table: Some(&RK3506J_CORE_TABLE),
                adjust_factor: 1,
                calibrate: None,
            },
        }
    }
}
