mod board {
    include!(concat!(env!("OUT_DIR"), "/board.rs"));
}

pub use board::*;

/// 一次 I2C 事件栈读取的最大长度
pub const TOUCH_DATA_SIZE: usize = 128;

/// Largest point count whose coordinate block still fits in one event read.
pub const MAX_PT_LIMIT: u8 = 24;

/// Panel geometry and report layout reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchInfo {
    pub rx_num: u8,
    pub tx_num: u8,
    pub bt_num: u8,
    pub max_pt: u8,
    pub xy_reverse: bool,
    pub int_is_edge: bool,
    pub id_en: bool,
}

impl TouchInfo {
    pub const fn fixed() -> Self {
        TouchInfo {
            rx_num: FIX_RX_NUM,
            tx_num: FIX_TX_NUM,
            bt_num: FIX_BT_NUM,
            max_pt: FIX_MAX_PT,
            xy_reverse: FIX_XY_REVERSE,
            int_is_edge: FIX_INT_IS_EDGE,
            id_en: false,
        }
    }

    pub fn mutual_num(&self) -> usize {
        self.rx_num as usize * self.tx_num as usize
    }

    pub fn self_num(&self) -> usize {
        self.rx_num as usize + self.tx_num as usize
    }
}

impl Default for TouchInfo {
    fn default() -> Self {
        Self::fixed()
    }
}

#[derive(Debug, Clone)]
pub struct HxConfig {
    pub i2c_addr: u8,
    pub abs_x_max: u32,
    pub abs_y_max: u32,
    /// Use the board touch info instead of querying the firmware.
    pub fix_touch_info: bool,
    pub fw_name: &'static str,
    pub auto_update: bool,
}

impl Default for HxConfig {
    fn default() -> Self {
        HxConfig {
            i2c_addr: I2C_ADDR,
            abs_x_max: PANEL_X_MAX - 1,
            abs_y_max: PANEL_Y_MAX - 1,
            fix_touch_info: true,
            fw_name: FW_NAME,
            auto_update: true,
        }
    }
}

/// Byte layout of one event stack frame, derived from `max_pt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    pub touch_all_size: usize,
    pub touch_info_size: usize,
    pub rawdata_size: usize,
    pub rawdata_frame_size: usize,
    /// Offset of the point count / raw selector byte.
    pub point_cnt: usize,
    pub coord_info_size: usize,
}

impl ReportLayout {
    pub fn new(info: &TouchInfo) -> Self {
        let max_pt = info.max_pt as usize;
        let raw_cnt_max = max_pt / 4;
        let (info_words, raw_words) = if max_pt % 4 != 0 {
            (max_pt + raw_cnt_max + 2, max_pt + raw_cnt_max + 3)
        } else {
            (max_pt + raw_cnt_max + 1, max_pt + raw_cnt_max + 2)
        };
        let rawdata_size = TOUCH_DATA_SIZE.saturating_sub(raw_words * 4 + 1).max(1);
        let area = max_pt.div_ceil(4) * 4;
        let total = info.mutual_num() + info.self_num();

        ReportLayout {
            touch_all_size: TOUCH_DATA_SIZE,
            touch_info_size: info_words * 4,
            rawdata_size,
            rawdata_frame_size: total.div_ceil(rawdata_size),
            point_cnt: max_pt * 4 + area,
            coord_info_size: max_pt * 4 + area + 4,
        }
    }
}
