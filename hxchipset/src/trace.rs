use alloc::{collections::VecDeque, format, string::String, vec::Vec};
use core::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Read,
    Write,
}

/// Bounded log of bus transactions, oldest dropped first.
#[derive(Debug)]
pub struct Trace {
    lines: VecDeque<String>,
    cap: usize,
    enabled: bool,
}

impl Trace {
    pub const fn new(cap: usize) -> Self {
        Trace {
            lines: VecDeque::new(),
            cap,
            enabled: false,
        }
    }

    pub fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
        if !on {
            self.lines.clear();
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, dir: Dir, cmd: u8, data: &[u8]) {
        if !self.enabled || self.cap == 0 {
            return;
        }
        let mut line = format!(
            "{} {:02X} [{}]",
            if dir == Dir::Read { "R" } else { "W" },
            cmd,
            data.len()
        );
        for b in data.iter().take(16) {
            let _ = write!(line, " {b:02X}");
        }
        if data.len() > 16 {
            line.push_str(" ..");
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn take(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }
}
