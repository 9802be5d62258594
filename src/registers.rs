//! FTFL register block
//!
//! The flash controller is a single memory-mapped peripheral. [`Ftfl`] is the
//! exclusively-owned handle to it; the command engine only talks to it through
//! the [`FlashRegisters`] trait so a simulated block can stand in for it.

use core::ptr;

use vcell::VolatileCell;

/// Base address of the FTFL/FTFA peripheral
pub const FTFL_BASE: usize = 0x4002_0000;

/// Command complete interrupt flag
pub const FSTAT_CCIF: u8 = 0x80;
/// Read collision error flag
pub const FSTAT_RDCOLERR: u8 = 0x40;
/// Flash access error flag
pub const FSTAT_ACCERR: u8 = 0x20;
/// Flash protection violation flag
pub const FSTAT_FPVIOL: u8 = 0x10;
/// Error detected during sequence
pub const FSTAT_MGSTAT0: u8 = 0x01;

/// FlexRAM is available for plain RAM access
pub const FCNFG_RAMRDY: u8 = 0x02;
/// FlexRAM is available for EEPROM emulation
pub const FCNFG_EEERDY: u8 = 0x01;

/// Number of FCCOB bytes
pub const FCCOB_LEN: usize = 12;

/// Raw FTFL register layout
///
/// The FCCOB registers are big-endian within each 32-bit group, so `FCCOB0`
/// sits at offset 0x7 and `FCCOB3` at 0x4.
#[repr(C)]
pub struct RegisterBlock {
    pub fstat: VolatileCell<u8>,
    pub fcnfg: VolatileCell<u8>,
    pub fsec: VolatileCell<u8>,
    pub fopt: VolatileCell<u8>,
    /// FCCOB3..FCCOB0, FCCOB7..FCCOB4, FCCOBB..FCCOB8
    pub fccob: [VolatileCell<u8>; FCCOB_LEN],
    /// FPROT3..FPROT0
    pub fprot: [VolatileCell<u8>; 4],
    _reserved: [u8; 2],
    pub feprot: VolatileCell<u8>,
    pub fdprot: VolatileCell<u8>,
}

impl RegisterBlock {
    /// Maps a logical FCCOB index to its slot in the register array
    pub const fn fccob_slot(index: usize) -> usize {
        (index & !3) + (3 - (index & 3))
    }
}

/// Read/write contract of the flash controller registers and the flash array
pub trait FlashRegisters {
    /// Current FSTAT value
    fn fstat(&self) -> u8;
    /// Writes FSTAT. Flag bits are write-1-to-clear; writing CCIF launches the
    /// staged command.
    fn write_fstat(&mut self, value: u8);
    /// Writes one byte of the command buffer, `index` 0 is the command code
    fn write_fccob(&mut self, index: usize, value: u8);
    /// Current FCNFG value
    fn fcnfg(&self) -> u8;
    /// Current FSEC value, loaded from the flash configuration field at reset
    fn fsec(&self) -> u8;
    /// Reads the long word stored at flash offset `address`
    fn read_word(&self, address: u32) -> u32;
}

static mut TAKEN: bool = false;

/// Owned handle to the FTFL peripheral
pub struct Ftfl {
    regs: *const RegisterBlock,
}

impl Ftfl {
    /// Returns the peripheral handle the first time it is called, `None`
    /// afterwards
    pub fn take() -> Option<Self> {
        critical_section::with(|_| {
            if unsafe { TAKEN } {
                None
            } else {
                Some(unsafe { Self::steal() })
            }
        })
    }

    /// Creates a handle without checking that none exists yet
    ///
    /// # Safety
    ///
    /// Only one handle may drive the controller at a time. Two handles staging
    /// commands concurrently corrupt each other's command buffer.
    pub unsafe fn steal() -> Self {
        TAKEN = true;
        Ftfl {
            regs: FTFL_BASE as *const RegisterBlock,
        }
    }

    #[inline(always)]
    fn regs(&self) -> &RegisterBlock {
        unsafe { &*self.regs }
    }
}

impl FlashRegisters for Ftfl {
    #[inline(always)]
    fn fstat(&self) -> u8 {
        self.regs().fstat.get()
    }

    #[inline(always)]
    fn write_fstat(&mut self, value: u8) {
        self.regs().fstat.set(value)
    }

    fn write_fccob(&mut self, index: usize, value: u8) {
        self.regs().fccob[RegisterBlock::fccob_slot(index)].set(value)
    }

    fn fcnfg(&self) -> u8 {
        self.regs().fcnfg.get()
    }

    fn fsec(&self) -> u8 {
        self.regs().fsec.get()
    }

    fn read_word(&self, address: u32) -> u32 {
        // Program flash is mapped at address zero on every Kinetis part
        unsafe { ptr::read_volatile(address as usize as *const u32) }
    }
}
