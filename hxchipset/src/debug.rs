//! Text command surface for register access and raw data selection.

use alloc::{string::String, vec, vec::Vec};
use core::fmt::Write;

use log::{info, warn};

use crate::bus::Transport;
use crate::error::HxError;
use crate::ic::Ic;
use crate::mcu::{MAX_TRANS_SZ, Mcu};

/// 直接总线命令前缀
const BUS_CMD_PREFIX: &str = "FE";
const MODE_PREFIX: &str = "mode:";
const MODE_POLL: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegTarget {
    /// AHB address through the bridge.
    Ahb(u32),
    /// Raw bus command byte.
    Bus(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegCmd {
    Read(RegTarget),
    Write(RegTarget, Vec<u8>),
}

fn hex(s: &str) -> Result<u32, HxError> {
    u32::from_str_radix(s, 16).map_err(|_| HxError::InvalidArg("hex"))
}

fn target(s: &str) -> Result<RegTarget, HxError> {
    match s.strip_prefix(BUS_CMD_PREFIX) {
        Some(cmd) if cmd.len() == 2 => Ok(RegTarget::Bus(hex(cmd)? as u8)),
        _ => Ok(RegTarget::Ahb(hex(s)?)),
    }
}

/// Parse `r:x<addr>`, `w:x<addr> x<data>` or `w:x<addr> x<b0> x<b1> ..`.
///
/// An address of `FE<cc>` selects bus command `cc` instead of an AHB address.
/// A single data field is written little endian, one byte per two digits.
pub fn parse_register_cmd(line: &str) -> Result<RegCmd, HxError> {
    let line = line.trim();
    let (op, rest) = line.split_at_checked(2).ok_or(HxError::InvalidArg("command"))?;
    let mut fields = rest.split_whitespace().map(|f| f.strip_prefix('x'));

    let addr = match fields.next() {
        Some(Some(a)) if !a.is_empty() => target(a)?,
        _ => return Err(HxError::InvalidArg("address")),
    };

    match op {
        "r:" => Ok(RegCmd::Read(addr)),
        "w:" => {
            let fields: Vec<&str> = fields
                .map(|f| f.ok_or(HxError::InvalidArg("data")))
                .collect::<Result<Vec<&str>, _>>()?;
            let data = match fields.as_slice() {
                [] => return Err(HxError::InvalidArg("data")),
                [one] => {
                    let v = hex(one)?;
                    let n = one.len().div_ceil(2).clamp(1, 4);
                    v.to_le_bytes()[..n].to_vec()
                }
                many => many
                    .iter()
                    .map(|f| hex(f).map(|v| v as u8))
                    .collect::<Result<Vec<u8>, _>>()?,
            };
            Ok(RegCmd::Write(addr, data))
        }
        _ => Err(HxError::InvalidArg("command")),
    }
}

/// Execute a register command. Reads return 128 bytes.
pub fn run_register_cmd(bus: &dyn Transport, cmd: &RegCmd) -> Result<Vec<u8>, HxError> {
    match cmd {
        RegCmd::Read(t) => {
            let mut buf = vec![0u8; MAX_TRANS_SZ];
            match *t {
                RegTarget::Ahb(addr) => bus.register_read(addr, &mut buf)?,
                RegTarget::Bus(c) => bus.read(c, &mut buf)?,
            }
            Ok(buf)
        }
        RegCmd::Write(t, data) => {
            info!("register write {t:x?} {:02X?}", data);
            match *t {
                RegTarget::Ahb(addr) => bus.register_write(addr, data)?,
                RegTarget::Bus(c) => bus.write(c, data)?,
            }
            Ok(Vec::new())
        }
    }
}

/// Hex dump of a register read, sixteen bytes per line.
pub fn format_register_dump(t: RegTarget, data: &[u8]) -> String {
    let mut out = String::new();
    let cmd = match t {
        RegTarget::Ahb(a) => a.to_be_bytes(),
        RegTarget::Bus(c) => [0xFE, 0, 0, c],
    };
    let _ = writeln!(out, "command:  {:02X},{:02X},{:02X},{:02X}", cmd[0], cmd[1], cmd[2], cmd[3]);
    for line in data.chunks(16) {
        for b in line {
            let _ = write!(out, "0x{b:02X} ");
        }
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagCmd {
    /// `X`: raw output select only.
    RawOut(u8),
    /// `XY` or `XXYY`: DSRAM processing type plus raw output select.
    /// The four digit form is written without the storage offset.
    Process { ptype: u8, diag: u8, direct: bool },
    /// `mode:XXYY`: switch sorting mode with a start/end password pair.
    Mode { start: u8, end: u8 },
}

pub fn parse_diag_cmd(line: &str) -> Result<DiagCmd, HxError> {
    let s = line.trim();
    if let Some(pw) = s.strip_prefix(MODE_PREFIX) {
        if pw.len() != 4 {
            return Err(HxError::InvalidArg("mode"));
        }
        let v = hex(pw)?;
        return Ok(DiagCmd::Mode {
            start: (v >> 8) as u8,
            end: v as u8,
        });
    }
    let v = hex(s)?;
    match s.len() {
        1 => Ok(DiagCmd::RawOut(v as u8)),
        2 => Ok(DiagCmd::Process {
            ptype: ((v >> 4) & 0xF) as u8,
            diag: (v & 0xF) as u8,
            direct: false,
        }),
        4 => Ok(DiagCmd::Process {
            ptype: (v >> 8) as u8,
            diag: v as u8,
            direct: true,
        }),
        n => {
            warn!("diag command length {n} not supported");
            Err(HxError::InvalidArg("diag length"))
        }
    }
}

/// Enter a sorting mode and wait for the firmware to acknowledge it.
pub fn change_mode(bus: &dyn Transport, ic: &dyn Ic, start: u8, end: u8) -> Result<(), HxError> {
    ic.sense_off(bus, true)?;
    bus.assign_sorting_mode([start, start, 0, 0])?;
    ic.sense_on(bus, true)?;

    for retry in 0..MODE_POLL {
        let d = bus.check_sorting_mode()?;
        if d[0] == end && d[1] == end {
            info!("change mode {start:02X}{end:02X} done");
            return Ok(());
        }
        info!("now retry {retry} times");
        bus.msleep(50);
    }
    warn!("change mode failed, start {start:02X} end {end:02X}");
    Err(HxError::Timeout("sorting mode"))
}
