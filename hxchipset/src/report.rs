//! Touch report pipeline: event stack read, error control, point parsing
//! and multi-touch slot reporting.

use alloc::{vec, vec::Vec};

use log::{debug, info, warn};

use crate::bus::Transport;
use crate::config::{ReportLayout, TOUCH_DATA_SIZE, TouchInfo};
use crate::diag::{DiagData, rawdata_checksum_ok};
use crate::mcu::Mcu;

/// Outcome of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum TsStatus {
    GetDataFail = -4,
    ChksumFail = -3,
    PathFail = -2,
    NormalEnd = 0,
    ReadyServe = 1,
    ReportData = 2,
    ExcpWarning = 3,
    RstOk = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportPath {
    Coord,
    CoordRawdata,
}

/// Absolute axes a contact is reported on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsAxis {
    TouchMajor,
    WidthMajor,
    Pressure,
    PositionX,
    PositionY,
}

/// Receiver of slot based multi-touch events.
pub trait MtSink {
    fn mt_slot(&mut self, slot: usize);
    fn report_abs(&mut self, axis: AbsAxis, value: u32);
    /// Mark the current slot as holding a finger or not.
    fn slot_state(&mut self, active: bool);
    fn btn_touch(&mut self, down: bool);
    fn sync(&mut self);
}

/// One parsed finger slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: u32,
    pub y: u32,
    pub w: u8,
    pub valid: bool,
}

/// Per device report state carried between interrupts.
pub struct Reporter {
    layout: ReportLayout,
    max_pt: usize,
    id_en: bool,
    abs_x_max: u32,
    abs_y_max: u32,

    coord_buf: Vec<u8>,
    rawdata_buf: Vec<u8>,
    state_info: [u8; 2],

    pub diag_cmd: u8,
    /// Set after a pin reset; the next interrupt is dropped.
    pub hw_reset_activate: bool,

    point_num: u8,
    p_point_num: u8,
    finger_num: u8,
    ig_count: u8,
    points: Vec<Point>,
    pre_finger_mask: u32,
    pre_finger_data: Vec<(u32, u32)>,
    first_pressed: u8,
    en_noisefilter: bool,
    touch_num: u32,
}

impl Reporter {
    pub fn new(info: &TouchInfo, abs_x_max: u32, abs_y_max: u32) -> Self {
        let max_pt = info.max_pt as usize;
        let layout = ReportLayout::new(info);
        Reporter {
            layout,
            max_pt,
            id_en: info.id_en,
            abs_x_max,
            abs_y_max,
            coord_buf: vec![0; layout.touch_info_size],
            rawdata_buf: vec![0; TOUCH_DATA_SIZE.saturating_sub(layout.touch_info_size)],
            state_info: [0; 2],
            diag_cmd: 0,
            hw_reset_activate: false,
            point_num: 0,
            p_point_num: 0,
            finger_num: 0,
            ig_count: 0,
            points: vec![Point::default(); max_pt],
            pre_finger_mask: 0,
            pre_finger_data: vec![(0, 0); max_pt],
            first_pressed: 0,
            en_noisefilter: false,
            touch_num: 0,
        }
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn point_num(&self) -> u8 {
        self.point_num
    }

    /// Point count of the previous frame.
    pub fn prev_point_num(&self) -> u8 {
        self.p_point_num
    }

    /// Fingers the firmware counted minus those parsed as valid.
    pub fn finger_num(&self) -> u8 {
        self.finger_num
    }

    pub fn finger_mask(&self) -> u32 {
        self.pre_finger_mask
    }

    pub fn clear_finger_mask(&mut self) {
        self.pre_finger_mask = 0;
    }

    pub fn state_info(&self) -> [u8; 2] {
        self.state_info
    }

    pub fn noise_filter(&self) -> bool {
        self.en_noisefilter
    }

    pub fn ig_count(&self) -> u8 {
        self.ig_count
    }

    fn path(&self) -> ReportPath {
        if self.diag_cmd != 0 {
            ReportPath::CoordRawdata
        } else {
            ReportPath::Coord
        }
    }

    fn touch_get(&self, bus: &dyn Transport, buf: &mut [u8], path: ReportPath) -> TsStatus {
        let len = match path {
            ReportPath::Coord if !self.hw_reset_activate => self.layout.touch_info_size,
            _ => TOUCH_DATA_SIZE,
        };
        match bus.read_event_stack(&mut buf[..len]) {
            Ok(()) => TsStatus::NormalEnd,
            Err(e) => {
                warn!("can't read data from chip: {e}");
                TsStatus::GetDataFail
            }
        }
    }

    fn distribute(&mut self, buf: &[u8], path: ReportPath) {
        let info_size = self.layout.touch_info_size;
        self.coord_buf.copy_from_slice(&buf[..info_size]);

        let pos = info_size - 3;
        if buf[pos] != 0xFF && buf[pos + 1] != 0xFF {
            self.state_info = [buf[pos], buf[pos + 1]];
        } else {
            self.state_info = [0; 2];
        }

        if path == ReportPath::CoordRawdata || self.hw_reset_activate {
            self.rawdata_buf
                .copy_from_slice(&buf[info_size..self.layout.touch_all_size]);
        }
    }

    fn checksum_cal(&mut self, bus: &dyn Transport, buf: &mut [u8]) -> TsStatus {
        let info = &buf[..self.layout.touch_info_size];
        let sum = info.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));

        if sum != 0 {
            info!("point data checksum mismatch: {sum:#04x}");
            return TsStatus::ChksumFail;
        }
        if info.iter().all(|b| *b == 0) {
            info!("all zero event");
            return TsStatus::ChksumFail;
        }

        let raw_sel = buf[self.layout.point_cnt] >> 4;
        if raw_sel != 0x0F && raw_sel != self.diag_cmd {
            if self.diag_cmd == 0 {
                // Drain the rest of the event stack.
                let rest = TOUCH_DATA_SIZE - self.layout.touch_info_size;
                if let Err(e) = bus.read_event_stack(&mut buf[..rest]) {
                    debug!("event stack drain: {e}");
                }
            }
            return TsStatus::ReadyServe;
        }
        TsStatus::NormalEnd
    }

    fn err_ctrl(&mut self, bus: &dyn Transport, buf: &mut [u8]) -> TsStatus {
        if self.hw_reset_activate {
            self.hw_reset_activate = false;
            info!("back from reset, ready to serve");
            return TsStatus::RstOk;
        }
        self.checksum_cal(bus, buf)
    }

    fn parse_report_points(&mut self) {
        if self.point_num == 0 {
            return;
        }
        self.pre_finger_mask = 0;
        let coord_info = self.layout.coord_info_size;
        self.finger_num = self.coord_buf[coord_info - 4] & 0x0F;
        self.ig_count = self.coord_buf[coord_info - 5];

        for i in 0..self.max_pt {
            let b = &self.coord_buf[i * 4..i * 4 + 4];
            let mut x = u32::from(b[0]) << 8 | u32::from(b[1]);
            let mut y = u32::from(b[2]) << 8 | u32::from(b[3]);
            let w = self.coord_buf[self.max_pt * 4 + i];

            if self.id_en {
                x = u32::from(b[0] & 0x3F) << 8 | u32::from(b[1]);
                let event_id = b[0] >> 6;
                if event_id == 3 {
                    x = 0xFFFF;
                    y = 0xFFFF;
                }
                debug!("slot {i}: x={x} y={y} event={event_id}");
            }

            let valid = x <= self.abs_x_max && y <= self.abs_y_max;
            self.points[i] = Point { x, y, w, valid };
            if valid {
                self.finger_num = self.finger_num.wrapping_sub(1);
                if self.first_pressed == 0 {
                    self.first_pressed = 1;
                    info!("S1@{x}, {y}");
                }
                self.pre_finger_data[i] = (x, y);
                self.pre_finger_mask |= 1 << i;
            } else if i == 0 && self.first_pressed == 1 {
                self.first_pressed = 2;
                let (px, py) = self.pre_finger_data[0];
                info!("E1@{px}, {py}");
            }
        }
    }

    fn parse_report_data(&mut self, path: ReportPath, diag: &mut DiagData) {
        let pc = self.layout.point_cnt;
        self.en_noisefilter = (self.coord_buf[pc + 2] >> 3) & 0x01 != 0;
        self.p_point_num = self.point_num;
        self.point_num = match self.coord_buf[pc] {
            0xFF => 0,
            v => v & 0x0F,
        };

        if path == ReportPath::CoordRawdata {
            self.set_diag_cmd(diag);
        }
        self.parse_report_points();
    }

    /// Route the raw part of the frame into the diag buffers.
    fn set_diag_cmd(&self, diag: &mut DiagData) {
        match self.diag_cmd {
            1..=7 => {
                if rawdata_checksum_ok(&self.rawdata_buf) {
                    diag.parse_raw_frame(&self.rawdata_buf, self.layout.rawdata_size, self.diag_cmd);
                }
            }
            8 => {
                diag.coord.clear();
                diag.coord.extend_from_slice(&self.coord_buf);
            }
            _ => {}
        }
        diag.state_info = self.state_info;
    }

    fn finger_report(&mut self, sink: &mut dyn MtSink) {
        for (i, p) in self.points.iter().enumerate() {
            sink.mt_slot(i);
            if p.valid {
                let w = u32::from(p.w);
                sink.report_abs(AbsAxis::TouchMajor, w);
                sink.report_abs(AbsAxis::WidthMajor, w);
                sink.report_abs(AbsAxis::Pressure, w);
                sink.report_abs(AbsAxis::PositionX, p.x);
                sink.report_abs(AbsAxis::PositionY, p.y);
                sink.slot_state(true);
                if self.touch_num >= 50 {
                    info!("finger down x={} y={} w={}", p.x, p.y, p.w);
                    self.touch_num = 0;
                }
            } else {
                release_slot(sink);
            }
        }
        sink.btn_touch(true);
        sink.sync();
    }

    fn finger_leave(&mut self, sink: &mut dyn MtSink) {
        self.finger_num = 0;
        for i in 0..self.max_pt {
            sink.mt_slot(i);
            release_slot(sink);
        }
        self.pre_finger_mask = 0;
        if self.first_pressed == 1 {
            self.first_pressed = 2;
            let (px, py) = self.pre_finger_data[0];
            info!("E1@{px}, {py}");
        }
        sink.btn_touch(false);
        sink.sync();
        self.touch_num = self.touch_num.wrapping_add(1);
    }

    /// Release every slot without touching the parse state.
    pub fn report_all_leave(&self, sink: &mut dyn MtSink) {
        for i in 0..self.max_pt {
            sink.mt_slot(i);
            release_slot(sink);
        }
        sink.btn_touch(false);
        sink.sync();
    }

    fn report_points(&mut self, sink: &mut dyn MtSink) {
        if self.point_num != 0 {
            self.finger_report(sink);
        } else {
            self.finger_leave(sink);
        }
    }

    /// One pass of the pipeline for a single interrupt.
    pub fn ts_operation(
        &mut self,
        bus: &dyn Transport,
        sink: &mut dyn MtSink,
        diag: &mut DiagData,
    ) -> TsStatus {
        let path = self.path();
        let mut buf = [0u8; TOUCH_DATA_SIZE];

        let status = self.touch_get(bus, &mut buf, path);
        if status == TsStatus::GetDataFail {
            return status;
        }
        self.distribute(&buf, path);
        let status = self.err_ctrl(bus, &mut buf);
        if status != TsStatus::ReportData && status != TsStatus::NormalEnd {
            return status;
        }
        self.parse_report_data(path, diag);
        self.report_points(sink);
        status
    }

    /// Interrupt work: run the pipeline and reset the chip when it stops
    /// answering.
    pub fn ts_work(
        &mut self,
        bus: &dyn Transport,
        sink: &mut dyn MtSink,
        diag: &mut DiagData,
    ) -> TsStatus {
        let status = self.ts_operation(bus, sink, diag);
        if status == TsStatus::GetDataFail {
            info!("now reset the touch chip");
            if let Err(e) = bus.system_reset() {
                warn!("system reset: {e}");
            }
        }
        status
    }
}

fn release_slot(sink: &mut dyn MtSink) {
    sink.report_abs(AbsAxis::TouchMajor, 0);
    sink.report_abs(AbsAxis::WidthMajor, 0);
    sink.report_abs(AbsAxis::Pressure, 0);
    sink.slot_state(false);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::BUS_RETRY_TIMES;
    use crate::sim::new_bus;

    /// Slot state as a host input layer would keep it.
    #[derive(Default)]
    pub(crate) struct Recorder {
        slot: usize,
        pub slots: [Option<(u32, u32, u32)>; 16],
        pending: (u32, u32, u32),
        pub btn: bool,
        pub syncs: usize,
    }

    impl MtSink for Recorder {
        fn mt_slot(&mut self, slot: usize) {
            self.slot = slot;
            self.pending = (0, 0, 0);
        }

        fn report_abs(&mut self, axis: AbsAxis, value: u32) {
            match axis {
                AbsAxis::PositionX => self.pending.0 = value,
                AbsAxis::PositionY => self.pending.1 = value,
                AbsAxis::Pressure => self.pending.2 = value,
                _ => {}
            }
        }

        fn slot_state(&mut self, active: bool) {
            self.slots[self.slot] = active.then_some(self.pending);
        }

        fn btn_touch(&mut self, down: bool) {
            self.btn = down;
        }

        fn sync(&mut self) {
            self.syncs += 1;
        }
    }

    pub(crate) fn info10() -> TouchInfo {
        TouchInfo {
            max_pt: 10,
            ..TouchInfo::fixed()
        }
    }

    /// Build a coordinate frame for ten slots; `pts` are `(slot, x, y, w)`.
    pub(crate) fn frame(pts: &[(usize, u16, u16, u8)], raw_sel: u8) -> Vec<u8> {
        let layout = ReportLayout::new(&info10());
        let mut f = vec![0xFFu8; layout.touch_info_size];
        f[40..52].fill(0);
        for &(slot, x, y, w) in pts {
            f[slot * 4..slot * 4 + 2].copy_from_slice(&x.to_be_bytes());
            f[slot * 4 + 2..slot * 4 + 4].copy_from_slice(&y.to_be_bytes());
            f[40 + slot] = w;
        }
        f[layout.point_cnt] = if pts.is_empty() {
            0xFF
        } else {
            (raw_sel << 4) | pts.len() as u8
        };
        f[layout.point_cnt + 1] = 0x00;
        f[layout.point_cnt + 2] = 0x08;
        let last = f.len() - 1;
        f[last] = 0;
        let sum = f.iter().fold(0u8, |a, b| a.wrapping_add(*b));
        f[last] = 0u8.wrapping_sub(sum);
        f
    }

    fn setup() -> (crate::sim::SimBus, Reporter, DiagData, Recorder) {
        let info = info10();
        (
            new_bus(),
            Reporter::new(&info, 1919, 719),
            DiagData::new(&info),
            Recorder::default(),
        )
    }

    #[test]
    fn two_fingers_then_release() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        bus.sim().push_event(frame(&[(0, 100, 200, 9), (3, 1000, 700, 4)], 0xF));

        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::NormalEnd);
        assert_eq!(sink.slots[0], Some((100, 200, 9)));
        assert_eq!(sink.slots[3], Some((1000, 700, 4)));
        assert_eq!(sink.slots[1], None);
        assert!(sink.btn);
        assert_eq!(rep.finger_mask(), 0b1001);
        assert_eq!(rep.point_num(), 2);
        assert_eq!(rep.finger_num(), 0);
        assert!(rep.noise_filter());

        bus.sim().push_event(frame(&[], 0xF));
        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::NormalEnd);
        assert!(sink.slots.iter().all(|s| s.is_none()));
        assert!(!sink.btn);
        assert_eq!(rep.finger_mask(), 0);
        assert_eq!(sink.syncs, 2);
    }

    #[test]
    fn out_of_range_point_is_released() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        bus.sim().push_event(frame(&[(0, 1920, 10, 1), (1, 5, 5, 1)], 0xF));
        rep.ts_work(&bus, &mut sink, &mut diag);
        assert_eq!(sink.slots[0], None);
        assert_eq!(sink.slots[1], Some((5, 5, 1)));
        assert!(!rep.points()[0].valid);
    }

    #[test]
    fn bad_checksum_skips_frame() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        let mut f = frame(&[(0, 1, 1, 1)], 0xF);
        f[0] ^= 0x01;
        bus.sim().push_event(f);
        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::ChksumFail);
        assert_eq!(sink.syncs, 0);
    }

    #[test]
    fn all_zero_frame_is_rejected() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        bus.sim().push_event(vec![0; 56]);
        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::ChksumFail);
    }

    #[test]
    fn foreign_raw_selector_is_served_later() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        bus.sim().push_event(frame(&[(0, 1, 1, 1)], 0x2));
        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::ReadyServe);
        assert_eq!(sink.syncs, 0);
    }

    #[test]
    fn first_interrupt_after_reset_is_dropped() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        rep.hw_reset_activate = true;
        bus.sim().push_event(frame(&[(0, 1, 1, 1)], 0xF));
        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::RstOk);
        assert!(!rep.hw_reset_activate);
    }

    #[test]
    fn read_failure_resets_chip() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        let before = bus.sim().resets();
        bus.sim().fail_next(BUS_RETRY_TIMES as usize);
        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::GetDataFail);
        assert_eq!(bus.sim().resets(), before + 1);
    }

    #[test]
    fn id_enabled_leave_event() {
        let info = TouchInfo {
            id_en: true,
            ..info10()
        };
        let bus = new_bus();
        let mut rep = Reporter::new(&info, 1919, 719);
        let (mut diag, mut sink) = (DiagData::new(&info), Recorder::default());
        // Slot 0 carries event id 3 (leave), slot 1 event id 1 with x high bits.
        bus.sim().push_event(frame(&[(0, 0xC064, 10, 1), (1, 0x4164, 10, 2)], 0xF));
        rep.ts_work(&bus, &mut sink, &mut diag);
        assert_eq!(sink.slots[0], None);
        assert_eq!(sink.slots[1], Some((0x164, 10, 2)));
    }

    #[test]
    fn raw_frames_feed_diag_buffers() {
        let (bus, mut rep, mut diag, mut sink) = setup();
        rep.diag_cmd = 1;
        let mut f = frame(&[(0, 10, 20, 3)], 0x1);
        let mut raw = vec![0x3A, 0xA3, 1, 1];
        for i in 0..33i16 {
            raw.extend_from_slice(&(i * 3).to_le_bytes());
        }
        raw.resize(72, 0);
        let sum = raw
            .chunks_exact(2)
            .fold(0u16, |a, w| a.wrapping_add(u16::from_le_bytes([w[0], w[1]])));
        raw[70..72].copy_from_slice(&0u16.wrapping_sub(sum).to_le_bytes());
        f.extend_from_slice(&raw);
        bus.sim().push_event(f);

        assert_eq!(rep.ts_work(&bus, &mut sink, &mut diag), TsStatus::NormalEnd);
        assert_eq!(diag.mutual[..4], [0, 3, 6, 9]);
        assert_eq!(sink.slots[0], Some((10, 20, 3)));
    }

    #[test]
    fn all_leave_releases_every_slot() {
        let (_bus, rep, _diag, mut sink) = setup();
        sink.slots[4] = Some((1, 1, 1));
        sink.btn = true;
        rep.report_all_leave(&mut sink);
        assert!(sink.slots.iter().all(|s| s.is_none()));
        assert!(!sink.btn);
    }
}
