use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};
use log::warn;
use spin::Mutex;

use crate::config::BUS_RETRY_TIMES;
use crate::error::HxError;
use crate::trace::{Dir, Trace};

pub const BUS_RW_MAX_LEN: usize = 256;
const RETRY_DELAY_MS: u32 = 20;
const TRACE_DEPTH: usize = 64;

/// Byte-command transport to the controller.
///
/// Every register, flash and report operation in this crate is built on
/// these four primitives, so a device only needs one implementation.
pub trait Transport: Send + Sync {
    /// Send `cmd`, then read `buf.len()` bytes back.
    fn read(&self, cmd: u8, buf: &mut [u8]) -> Result<(), HxError>;
    /// Send `cmd` followed by `data`.
    fn write(&self, cmd: u8, data: &[u8]) -> Result<(), HxError>;
    fn msleep(&self, ms: u32);
    fn udelay(&self, us: u32);
}

/// I2C transport shared by the report, debug and update paths.
pub struct HxBus<I, D> {
    addr: u8,
    i2c: Mutex<I>,
    delay: Mutex<D>,
    trace: Mutex<Trace>,
}

impl<I: I2c, D: DelayNs> HxBus<I, D> {
    pub fn new(i2c: I, delay: D, addr: u8) -> Self {
        HxBus {
            addr,
            i2c: Mutex::new(i2c),
            delay: Mutex::new(delay),
            trace: Mutex::new(Trace::new(TRACE_DEPTH)),
        }
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn trace(&self) -> &Mutex<Trace> {
        &self.trace
    }

    /// Give back the bus and delay providers.
    pub fn release(self) -> (I, D) {
        (self.i2c.into_inner(), self.delay.into_inner())
    }

    fn with_retry(
        &self,
        what: &'static str,
        mut op: impl FnMut(&mut I) -> Result<(), I::Error>,
    ) -> Result<(), HxError> {
        for attempt in 1..=BUS_RETRY_TIMES {
            let res = op(&mut self.i2c.lock());
            match res {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("{what} retry {attempt}/{BUS_RETRY_TIMES}: {:?}", e.kind());
                    if attempt < BUS_RETRY_TIMES {
                        self.delay.lock().delay_ms(RETRY_DELAY_MS);
                    }
                }
            }
        }
        warn!("{what}: giving up after {BUS_RETRY_TIMES} tries");
        Err(HxError::Bus)
    }
}

impl<I, D> Transport for HxBus<I, D>
where
    I: I2c + Send,
    D: DelayNs + Send,
{
    fn read(&self, cmd: u8, buf: &mut [u8]) -> Result<(), HxError> {
        if buf.len() > BUS_RW_MAX_LEN {
            return Err(HxError::Length(buf.len()));
        }
        let addr = self.addr;
        self.with_retry("i2c read", |i2c| i2c.write_read(addr, &[cmd], buf))?;
        self.trace.lock().record(Dir::Read, cmd, buf);
        Ok(())
    }

    fn write(&self, cmd: u8, data: &[u8]) -> Result<(), HxError> {
        if data.len() > BUS_RW_MAX_LEN {
            return Err(HxError::Length(data.len()));
        }
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(cmd);
        frame.extend_from_slice(data);
        let addr = self.addr;
        self.with_retry("i2c write", |i2c| i2c.write(addr, &frame))?;
        self.trace.lock().record(Dir::Write, cmd, data);
        Ok(())
    }

    fn msleep(&self, ms: u32) {
        self.delay.lock().delay_ms(ms);
    }

    fn udelay(&self, us: u32) {
        self.delay.lock().delay_us(us);
    }
}

#[cfg(test)]
impl<I: Clone, D> HxBus<I, D> {
    pub(crate) fn sim(&self) -> I {
        self.i2c.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Sim, new_bus};
    use alloc::sync::Arc;
    use spin::Mutex as SpinMutex;

    #[test]
    fn transient_failures_are_retried() {
        let bus = new_bus();
        bus.sim().fail_next(2);
        bus.write(0x13, &[0x31]).unwrap();
        assert_eq!(bus.sim().bus_reg(0x13), 0x31);
    }

    #[test]
    fn persistent_failure_reports_bus_error() {
        let bus = new_bus();
        bus.sim().fail_next(BUS_RETRY_TIMES as usize);
        assert_eq!(bus.write(0x13, &[0x31]), Err(HxError::Bus));
    }

    #[derive(Clone)]
    struct CountDelay(Arc<SpinMutex<u64>>);

    impl DelayNs for CountDelay {
        fn delay_ns(&mut self, ns: u32) {
            *self.0.lock() += ns as u64;
        }
    }

    #[test]
    fn retries_sleep_only_between_attempts() {
        let slept = Arc::new(SpinMutex::new(0u64));
        let bus = HxBus::new(Sim::new(), CountDelay(slept.clone()), crate::config::I2C_ADDR);
        bus.sim().fail_next(BUS_RETRY_TIMES as usize);
        assert_eq!(bus.write(0x13, &[0x31]), Err(HxError::Bus));
        let gaps = (BUS_RETRY_TIMES - 1) as u64;
        assert_eq!(*slept.lock(), gaps * RETRY_DELAY_MS as u64 * 1_000_000);

        *slept.lock() = 0;
        bus.sim().fail_next(1);
        bus.write(0x13, &[0x31]).unwrap();
        assert_eq!(*slept.lock(), RETRY_DELAY_MS as u64 * 1_000_000);
    }

    #[test]
    fn oversized_transfer_is_rejected() {
        let bus = new_bus();
        let data = [0u8; BUS_RW_MAX_LEN + 1];
        assert_eq!(bus.write(0x00, &data), Err(HxError::Length(BUS_RW_MAX_LEN + 1)));
    }

    #[test]
    fn trace_captures_transactions_when_enabled() {
        let bus = new_bus();
        bus.trace().lock().set_enabled(true);
        let mut buf = [0u8; 2];
        bus.read(0x0D, &mut buf).unwrap();
        let lines = bus.trace().lock().take();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("R 0D [2]"));
    }
}
