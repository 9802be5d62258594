//! Simulated FTFL for host tests
//!
//! Models the parts of the controller the engine relies on: write-1-to-clear
//! FSTAT, launch on CCIF, a configurable number of busy status reads, and a
//! word-addressed flash array that the commands actually modify.

extern crate std;

use core::cell::Cell;
use std::rc::Rc;
use std::vec::Vec;

use crate::command::{
    FCMD_ERASE_FLASH_SECTOR, FCMD_PROGRAM_LONG_WORD, FCMD_READ_1S_SECTION, FCMD_SET_FLEXRAM,
};
use crate::device::FlashDevice;
use crate::flash::Flash;
use crate::interrupt::InterruptMask;
use crate::registers::{
    FlashRegisters, FCCOB_LEN, FCNFG_EEERDY, FCNFG_RAMRDY, FSTAT_ACCERR, FSTAT_CCIF,
    FSTAT_FPVIOL, FSTAT_MGSTAT0,
};

/// Small part with 1 KiB sectors so whole-array loops stay cheap
pub struct TestDevice;

impl FlashDevice for TestDevice {
    const FLASH_SIZE: u32 = 0x2000;
    const SECTOR_SIZE: u32 = 0x400;
}

pub type TestFlash = Flash<MockFtfl, MockMask, TestDevice>;

/// Builds an engine whose mask and registers share one interrupt line
pub fn engine() -> TestFlash {
    let line = Rc::new(Cell::new(false));
    let regs = MockFtfl::new(TestDevice::FLASH_SIZE, line.clone());
    let mask = MockMask {
        line,
        ..MockMask::default()
    };
    Flash::with_mask(regs, mask)
}

/// A command as it was launched, FCCOB0..FCCOB7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub fccob: [u8; 8],
    pub masked: bool,
}

impl Launch {
    pub fn code(&self) -> u8 {
        self.fccob[0]
    }

    pub fn address(&self) -> u32 {
        u32::from_be_bytes([0, self.fccob[1], self.fccob[2], self.fccob[3]])
    }
}

pub struct MockFtfl {
    flags: Cell<u8>,
    busy: Cell<u32>,
    reads: Cell<u32>,
    line: Rc<Cell<bool>>,
    fccob: [u8; FCCOB_LEN],
    pub fcnfg: u8,
    pub fsec: u8,
    pub memory: Vec<u32>,
    /// Busy status reads after every launch
    pub latency: u32,
    /// Never raise CCIF again once set
    pub stalled: bool,
    /// Sectors the controller itself refuses to modify
    pub locked: Vec<u32>,
    pub launches: Vec<Launch>,
    pub fccob_writes: usize,
    pub staged_while_busy: bool,
    pub staged_unmasked: bool,
}

impl MockFtfl {
    pub fn new(size: u32, line: Rc<Cell<bool>>) -> Self {
        MockFtfl {
            flags: Cell::new(0),
            busy: Cell::new(0),
            reads: Cell::new(0),
            line,
            fccob: [0; FCCOB_LEN],
            fcnfg: 0,
            // Unsecure, mass erase enabled, backdoor disabled
            fsec: 0xDE,
            memory: std::vec![0xFFFF_FFFF; size as usize / 4],
            latency: 0,
            stalled: false,
            locked: Vec::new(),
            launches: Vec::new(),
            fccob_writes: 0,
            staged_while_busy: false,
            staged_unmasked: false,
        }
    }

    /// Pretends a previous command is still running for `reads` status reads
    pub fn busy_for(&mut self, reads: u32) {
        self.busy.set(reads);
    }

    pub fn busy_remaining(&self) -> u32 {
        self.busy.get()
    }

    pub fn status_reads(&self) -> u32 {
        self.reads.get()
    }

    /// Sets flag bits as if left over from an earlier command
    pub fn inject_flags(&mut self, flags: u8) {
        self.flags.set(self.flags.get() | flags);
    }

    pub fn word(&self, address: u32) -> u32 {
        self.memory[address as usize / 4]
    }

    pub fn set_word(&mut self, address: u32, value: u32) {
        self.memory[address as usize / 4] = value;
    }

    pub fn launched(&self, code: u8) -> usize {
        self.launches.iter().filter(|l| l.code() == code).count()
    }

    fn idle(&self) -> bool {
        self.busy.get() == 0 && !self.stalled
    }

    fn in_range(&self, address: u32, bytes: u32) -> bool {
        address % 4 == 0 && (address as usize + bytes as usize) <= self.memory.len() * 4
    }

    fn is_locked(&self, address: u32) -> bool {
        self.locked
            .iter()
            .any(|&base| address >= base && address < base + TestDevice::SECTOR_SIZE)
    }

    fn execute(&mut self) -> u8 {
        let address = u32::from_be_bytes([0, self.fccob[1], self.fccob[2], self.fccob[3]]);
        match self.fccob[0] {
            FCMD_READ_1S_SECTION => {
                let words = u16::from_be_bytes([self.fccob[4], self.fccob[5]]) as u32;
                if words == 0 || self.fccob[6] > 2 || !self.in_range(address, words * 4) {
                    return FSTAT_ACCERR;
                }
                let start = address as usize / 4;
                let erased = self.memory[start..start + words as usize]
                    .iter()
                    .all(|&w| w == 0xFFFF_FFFF);
                if erased {
                    0
                } else {
                    FSTAT_MGSTAT0
                }
            }
            FCMD_PROGRAM_LONG_WORD => {
                if !self.in_range(address, 4) {
                    return FSTAT_ACCERR;
                }
                if self.is_locked(address) {
                    return FSTAT_FPVIOL;
                }
                if self.word(address) != 0xFFFF_FFFF {
                    return FSTAT_MGSTAT0;
                }
                let data = u32::from_be_bytes([
                    self.fccob[4],
                    self.fccob[5],
                    self.fccob[6],
                    self.fccob[7],
                ]);
                self.set_word(address, data);
                0
            }
            FCMD_ERASE_FLASH_SECTOR => {
                if !self.in_range(address, 4) {
                    return FSTAT_ACCERR;
                }
                if self.is_locked(address) {
                    return FSTAT_FPVIOL;
                }
                let base = TestDevice::sector_base(address) as usize / 4;
                let words = TestDevice::SECTOR_SIZE as usize / 4;
                for word in &mut self.memory[base..base + words] {
                    *word = 0xFFFF_FFFF;
                }
                0
            }
            FCMD_SET_FLEXRAM => match self.fccob[1] {
                0xFF => {
                    self.fcnfg = FCNFG_RAMRDY;
                    0
                }
                0x00 => {
                    self.fcnfg = FCNFG_EEERDY;
                    0
                }
                _ => FSTAT_ACCERR,
            },
            _ => FSTAT_ACCERR,
        }
    }
}

impl FlashRegisters for MockFtfl {
    fn fstat(&self) -> u8 {
        self.reads.set(self.reads.get() + 1);
        let busy = self.busy.get();
        if busy > 0 {
            self.busy.set(busy - 1);
            self.flags.get()
        } else if self.stalled {
            self.flags.get()
        } else {
            self.flags.get() | FSTAT_CCIF
        }
    }

    fn write_fstat(&mut self, value: u8) {
        let cleared = value & (FSTAT_ACCERR | FSTAT_FPVIOL);
        self.flags.set(self.flags.get() & !cleared);

        if value & FSTAT_CCIF == 0 || !self.idle() {
            return;
        }
        let mut fccob = [0; 8];
        fccob.copy_from_slice(&self.fccob[..8]);
        self.launches.push(Launch {
            fccob,
            masked: self.line.get(),
        });
        // The controller refuses to launch while ACCERR or FPVIOL is pending
        if self.flags.get() & (FSTAT_ACCERR | FSTAT_FPVIOL) != 0 {
            return;
        }
        let result = self.execute();
        self.flags.set(result);
        self.busy.set(self.latency);
    }

    fn write_fccob(&mut self, index: usize, value: u8) {
        if !self.idle() {
            self.staged_while_busy = true;
        }
        if !self.line.get() {
            self.staged_unmasked = true;
        }
        self.fccob_writes += 1;
        self.fccob[index] = value;
    }

    fn fcnfg(&self) -> u8 {
        self.fcnfg
    }

    fn fsec(&self) -> u8 {
        self.fsec
    }

    fn read_word(&self, address: u32) -> u32 {
        self.word(address)
    }
}

/// Interrupt mask that records how it was used
#[derive(Default)]
pub struct MockMask {
    pub line: Rc<Cell<bool>>,
    pub masked: usize,
    pub restored: usize,
}

impl MockMask {
    pub fn is_masked(&self) -> bool {
        self.line.get()
    }
}

impl InterruptMask for MockMask {
    type State = bool;

    fn mask(&mut self) -> bool {
        self.masked += 1;
        self.line.replace(true)
    }

    fn restore(&mut self, state: bool) {
        self.restored += 1;
        self.line.set(state);
    }
}
