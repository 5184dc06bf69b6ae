//! Device context tying the bus, the chip and the report state together.

use alloc::{boxed::Box, string::String, sync::Arc, vec::Vec};

use log::{debug, error, info, warn};
use rdrive::{DriverGeneric, KError};

use crate::bus::Transport;
use crate::config::{HxConfig, MAX_PT_LIMIT, TouchInfo};
use crate::debug::{self, DiagCmd, RegCmd};
use crate::diag::{self, DiagData, ProcessType};
use crate::error::{HxError, map_hx_error_to_kerror};
use crate::firmware::{
    self, BIN_DESC_SIZE, FwVersion, Updater, auto_update_check, bin_desc_get, fw_ver_bin,
};
use crate::flash::{FLASH_SIZE_128K, Flash};
use crate::ic::{ChipProfile, Ic};
use crate::inspect::{self, Criteria, InspectMode, InspectResult};
use crate::mcu::Mcu;
use crate::regs::*;
use crate::report::{MtSink, Reporter, TsStatus};

/// Board side hooks the core cannot reach over the bus.
pub trait Host: Send {
    fn irq_enable(&mut self, _enable: bool) {}

    /// Pulse the touch and LCM reset lines.
    fn tp_lcm_reset(&mut self) {}
}

/// Host without interrupt or reset lines.
pub struct NoHost;

impl Host for NoHost {}

pub struct HxDriver {
    bus: Arc<dyn Transport>,
    ic: Box<dyn Ic>,
    profile: ChipProfile,
    host: Box<dyn Host>,
    config: HxConfig,
    info: TouchInfo,
    fw: FwVersion,
    reporter: Reporter,
    diag: DiagData,

    suspended: bool,
    in_flash_dump: bool,
    dsram_flag: bool,
    process_type: Option<ProcessType>,
    mode_flag: bool,
}

impl HxDriver {
    pub fn new(bus: Arc<dyn Transport>, ic: Box<dyn Ic>, config: HxConfig) -> Self {
        let info = TouchInfo::fixed();
        HxDriver {
            reporter: Reporter::new(&info, config.abs_x_max, config.abs_y_max),
            diag: DiagData::new(&info),
            profile: ic.chip_init(),
            bus,
            ic,
            host: Box::new(NoHost),
            config,
            info,
            fw: FwVersion::default(),
            suspended: false,
            in_flash_dump: false,
            dsram_flag: false,
            process_type: None,
            mode_flag: false,
        }
    }

    pub fn with_host(mut self, host: Box<dyn Host>) -> Self {
        self.host = host;
        self
    }

    pub fn touch_info(&self) -> &TouchInfo {
        &self.info
    }

    pub fn profile(&self) -> &ChipProfile {
        &self.profile
    }

    pub fn fw_version(&self) -> &FwVersion {
        &self.fw
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn diag_data(&self) -> &DiagData {
        &self.diag
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn dsram_active(&self) -> bool {
        self.dsram_flag
    }

    /// Panel geometry, either from the board or from the running firmware.
    pub fn touch_information(&mut self) -> Result<(), HxError> {
        let bus = &*self.bus;
        let info = if self.config.fix_touch_info {
            TouchInfo::fixed()
        } else {
            let mut d = [0u8; 8];
            bus.register_read(ADDR_INFO_RXTX, &mut d)?;
            let (rx_num, tx_num, max_pt) = (d[2], d[3], d[4]);
            if !(1..=MAX_PT_LIMIT).contains(&max_pt) || rx_num == 0 || tx_num == 0 {
                warn!(
                    "firmware reports rx {rx_num} tx {tx_num} max_pt {max_pt}, keeping {:?}",
                    self.info
                );
                return Err(HxError::InvalidArg("touch_info"));
            }
            TouchInfo {
                rx_num,
                tx_num,
                max_pt,
                xy_reverse: bus.read_word(ADDR_INFO_XY_REV)?[1] & 0x04 != 0,
                int_is_edge: bus.read_ic_trigger_type()?,
                id_en: bus.read_word(ADDR_INFO_ID_EN)?[1] & 0x02 != 0,
                bt_num: bus.read_word(ADDR_INFO_BT_NUM)?[0] & 0x03,
            }
        };
        info!(
            "rx {} tx {} max_pt {} bt {} xy_rev {} edge {} id_en {}",
            info.rx_num,
            info.tx_num,
            info.max_pt,
            info.bt_num,
            info.xy_reverse,
            info.int_is_edge,
            info.id_en
        );

        let diag_cmd = self.reporter.diag_cmd;
        self.info = info;
        self.reporter = Reporter::new(&info, self.config.abs_x_max, self.config.abs_y_max);
        self.reporter.diag_cmd = diag_cmd;
        self.diag = DiagData::new(&info);
        Ok(())
    }

    /// Clear raw output, sorting mode and frame settings, then restart the
    /// firmware.
    pub fn power_on_init(&mut self) -> Result<(), HxError> {
        self.touch_information()?;
        let bus = &*self.bus;
        bus.write_word(ADDR_RAW_OUT_SEL, 0)?;
        bus.assign_sorting_mode([0; 4])?;
        bus.write_word(ADDR_SET_FRAME, 0)?;
        bus.write_word(ADDR_FW_READY_ALT, 0)?;
        self.ic.sense_on(bus, false)?;
        info!("waiting for fw reload data");
        Ok(())
    }

    fn probe(&mut self) -> Result<(), HxError> {
        let bus = &*self.bus;
        self.ic.detect(bus)?;
        self.profile = self.ic.chip_init();
        let amount = self.ic.ic_amount(bus)?;
        info!("{} detected, {amount} ic(s)", self.ic.name());

        if let Err(e) = firmware::flash_health_check(bus, FLASH_SIZE_128K) {
            warn!("flash health check: {e}");
        }
        self.fw = firmware::read_fw_ver(bus)?;
        self.power_on_init()
    }

    /// One interrupt worth of report processing.
    pub fn irq_handler(&mut self, sink: &mut dyn MtSink) -> TsStatus {
        if self.suspended {
            debug!("irq while suspended");
            return TsStatus::NormalEnd;
        }
        self.reporter.ts_work(&*self.bus, sink, &mut self.diag)
    }

    pub fn suspend(&mut self) {
        if self.suspended {
            info!("already suspended, skip");
            return;
        }
        if self.in_flash_dump {
            warn!("flash dump in progress, skip suspend");
            return;
        }
        self.host.irq_enable(false);
        self.reporter.clear_finger_mask();
        self.suspended = true;
        info!("suspend done");
    }

    pub fn resume(&mut self, sink: &mut dyn MtSink) -> Result<(), HxError> {
        if !self.suspended {
            info!("already resumed, skip");
            return Ok(());
        }
        self.reporter.diag_cmd = 0;
        self.bus.system_reset()?;
        self.reporter.hw_reset_activate = true;
        self.reporter.report_all_leave(sink);
        self.suspended = false;
        self.host.irq_enable(true);
        info!("resume done");
        Ok(())
    }

    /// Write `fw` to flash. Interrupts are off for the duration and
    /// write protection is restored whatever the outcome.
    pub fn update_firmware(&mut self, fw: &[u8]) -> Result<(), HxError> {
        self.host.irq_enable(false);

        let mut res = Updater::new(&*self.bus, &*self.ic).run(fw);
        if res.is_ok() {
            res = self.after_update();
        }
        if let Err(e) = self.bus.wp_bp_enable() {
            warn!("write protect restore: {e}");
        }

        self.host.irq_enable(true);
        match &res {
            Ok(()) => info!("firmware update done"),
            Err(e) => error!("firmware update failed: {e}"),
        }
        res
    }

    fn after_update(&mut self) -> Result<(), HxError> {
        self.bus.reload_disable(false)?;
        self.power_on_init()?;
        self.fw = firmware::read_fw_ver(&*self.bus)?;
        self.touch_information()
    }

    /// Update when `fw` is newer than the running firmware. Returns whether
    /// an update ran.
    pub fn auto_update(&mut self, fw: &[u8]) -> Result<bool, HxError> {
        if !self.config.auto_update {
            return Ok(false);
        }
        let mut layout = self.profile.layout;
        bin_desc_get(fw, BIN_DESC_SIZE, &mut layout);
        let bin = fw_ver_bin(fw, &layout)?;
        if !auto_update_check(&self.fw, &bin) {
            return Ok(false);
        }
        self.update_firmware(fw)?;
        Ok(true)
    }

    pub fn flash_dump(&mut self, size: usize) -> Result<Vec<u8>, HxError> {
        self.host.irq_enable(false);
        self.in_flash_dump = true;

        let res = self.ic.flash_dump(&*self.bus, size);

        self.in_flash_dump = false;
        self.host.irq_enable(true);
        res
    }

    /// Execute a diag command line (`X`, `XY`, `XXYY` or `mode:XXYY`).
    pub fn diag_command(&mut self, line: &str) -> Result<(), HxError> {
        let bus = &*self.bus;
        match debug::parse_diag_cmd(line)? {
            DiagCmd::RawOut(cmd) => {
                self.reporter.diag_cmd = cmd;
                if self.dsram_flag {
                    self.process_type = None;
                    self.dsram_flag = false;
                    self.host.irq_enable(true);
                    bus.return_event_stack()?;
                }
                bus.diag_register_set(cmd, 0, false)?;
                if cmd == 0 && self.mode_flag {
                    debug::change_mode(bus, &*self.ic, 0x00, 0x99)?;
                    self.mode_flag = false;
                }
                self.diag.clear();
            }
            DiagCmd::Process { ptype, diag: cmd, direct } => {
                let pt = match ProcessType::from_raw(ptype) {
                    Some(pt) if cmd != 0 => pt,
                    _ => {
                        warn!("process type {ptype} diag {cmd} not supported");
                        return Err(HxError::InvalidArg("diag command"));
                    }
                };
                self.reporter.diag_cmd = cmd;
                if !self.dsram_flag {
                    self.host.irq_enable(false);
                }
                bus.diag_register_set(cmd, pt.raw(), direct)?;
                self.diag.clear();
                self.process_type = Some(pt);
                self.dsram_flag = true;
            }
            DiagCmd::Mode { start, end } => {
                debug::change_mode(bus, &*self.ic, start, end)?;
                self.mode_flag = true;
            }
        }
        Ok(())
    }

    /// Poll one DSRAM frame while a processing diag command is active.
    /// Returns false when none is.
    pub fn diag_poll(&mut self) -> Result<bool, HxError> {
        let Some(pt) = self.process_type.filter(|_| self.dsram_flag) else {
            return Ok(false);
        };
        diag::diag_dsram_pass(&*self.bus, &self.info, pt, &mut self.diag)?;
        Ok(true)
    }

    /// Run a register command line; reads come back as a hex dump.
    pub fn register_command(&self, line: &str) -> Result<String, HxError> {
        let cmd = debug::parse_register_cmd(line)?;
        let data = debug::run_register_cmd(&*self.bus, &cmd)?;
        Ok(match cmd {
            RegCmd::Read(t) => debug::format_register_dump(t, &data),
            RegCmd::Write(..) => String::new(),
        })
    }

    /// Fail detect interrupt: log the display status and recover the panel.
    pub fn fail_det_work(&mut self) -> Result<[[u8; 8]; 2], HxError> {
        let regs = diag::faildet(&*self.bus, &*self.ic)?;
        info!("fail detect tied high, external recovery");
        self.host.tp_lcm_reset();
        self.reporter.hw_reset_activate = true;
        Ok(regs)
    }

    /// Production self test over `items`; the chip is back in normal mode
    /// afterwards.
    pub fn self_test(
        &mut self,
        items: &[(InspectMode, Criteria)],
    ) -> Result<Vec<Result<InspectResult, HxError>>, HxError> {
        self.host.irq_enable(false);
        let res = inspect::self_test(&*self.bus, &*self.ic, &self.info, items);
        self.host.irq_enable(true);
        res
    }
}

impl DriverGeneric for HxDriver {
    fn open(&mut self) -> Result<(), KError> {
        self.probe().map_err(map_hx_error_to_kerror)?;
        self.host.irq_enable(true);
        Ok(())
    }

    fn close(&mut self) -> Result<(), KError> {
        self.host.irq_enable(false);
        Ok(())
    }
}
