//! 32-bit register window of a PVTPLL block.

use core::ptr::NonNull;

use crate::error::PvtpllError;

pub trait Regmap: Send {
    fn read(&self, off: u32) -> Result<u32, PvtpllError>;
    fn write(&mut self, off: u32, val: u32) -> Result<(), PvtpllError>;
}

/// Write `val` into the field `mask << shift`; the upper half carries the
/// write enable bits.
pub const fn hiword_update(val: u32, mask: u32, shift: u32) -> u32 {
    ((val & mask) << shift) | (mask << (shift + 16))
}

/// Memory mapped registers.
pub struct MmioRegmap {
    base: NonNull<u32>,
    size: usize,
}

// The mapping is owned by exactly one driver.
unsafe impl Send for MmioRegmap {}

impl MmioRegmap {
    /// # Safety
    ///
    /// `base` must map `size` bytes of device registers for the lifetime of
    /// the returned value.
    pub unsafe fn new(base: NonNull<u8>, size: usize) -> Self {
        MmioRegmap {
            base: base.cast(),
            size,
        }
    }

    fn reg(&self, off: u32) -> Result<NonNull<u32>, PvtpllError> {
        if off % 4 != 0 || off as usize + 4 > self.size {
            return Err(PvtpllError::Reg(off));
        }
        // SAFETY: bounds and alignment checked above.
        Ok(unsafe { self.base.add(off as usize / 4) })
    }
}

impl Regmap for MmioRegmap {
    fn read(&self, off: u32) -> Result<u32, PvtpllError> {
        let reg = self.reg(off)?;
        // SAFETY: `reg` lies inside the mapped window.
        Ok(unsafe { reg.read_volatile() })
    }

    fn write(&mut self, off: u32, val: u32) -> Result<(), PvtpllError> {
        let reg = self.reg(off)?;
        // SAFETY: `reg` lies inside the mapped window.
        unsafe { reg.write_volatile(val) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hiword_sets_enable_bits() {
        assert_eq!(hiword_update(1, 0x07, 10), 0x1C00_0400);
        assert_eq!(hiword_update(0x3ff, 0x1ff, 0), 0x01FF_01FF);
    }

    #[test]
    fn mmio_window_bounds() {
        let mut regs = [0u32; 4];
        let base = NonNull::new(regs.as_mut_ptr() as *mut u8).unwrap();
        let mut map = unsafe { MmioRegmap::new(base, 16) };
        map.write(0x8, 0xA5A5).unwrap();
        assert_eq!(map.read(0x8), Ok(0xA5A5));
        assert_eq!(map.read(0x10), Err(PvtpllError::Reg(0x10)));
        assert_eq!(map.write(0x2, 0), Err(PvtpllError::Reg(0x2)));
    }
}
