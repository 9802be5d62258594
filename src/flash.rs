//! Flash command engine
//!
//! Every operation follows the same sequence: wait until the controller is
//! idle (CCIF set), stage the command into FCCOB, launch it by writing CCIF,
//! then wait until CCIF is set again and decode FSTAT.
//!
//! Interrupts are masked from staging until the command has completed. Code
//! that lives in flash cannot run while the controller owns the array, so an
//! interrupt handler placed there would stall or fault mid-command.
//!
//! # Examples
//!
//! ``` no_run
//! use kinetis_ftfl::device::Mk20dx256;
//! use kinetis_ftfl::flash::{Flash, Outcome};
//! use kinetis_ftfl::registers::Ftfl;
//!
//! let mut flash: Flash<_, _, Mk20dx256> = Flash::new(Ftfl::take().unwrap());
//!
//! // Skipped without touching the controller if the sector is already blank
//! flash.erase_sector(0x3_F800).unwrap();
//!
//! match flash.program_word(0x3_F800, 0xC0FF_EE00) {
//!     Ok(Outcome::Completed) => {}
//!     Ok(refused) => panic!("driver refused: {:?}", refused),
//!     Err(e) => panic!("controller error: {:?}", e),
//! }
//! assert_eq!(flash.read_word(0x3_F800), 0xC0FF_EE00);
//! ```

use core::marker::PhantomData;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::command::{Command, FlexRamMode, Margin};
use crate::device::FlashDevice;
use crate::interrupt::{CriticalSection, InterruptMask};
use crate::registers::{
    FlashRegisters, FCNFG_EEERDY, FCNFG_RAMRDY, FSTAT_ACCERR, FSTAT_CCIF, FSTAT_FPVIOL,
};
use crate::status::{Error, Status};

/// Why the driver declined to issue a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Refusal {
    /// The target overlaps the flash configuration field
    ProtectedRange,
    /// The target is the sector holding the vector table at address zero
    FirstSector,
}

/// Result of an operation that did not fail in hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The command ran and the controller reported no error
    Completed,
    /// The sector already read as all ones, no erase was issued
    AlreadyErased,
    /// Nothing was sent to the controller
    Refused(Refusal),
}

impl Outcome {
    pub fn is_refused(&self) -> bool {
        matches!(self, Outcome::Refused(_))
    }
}

/// Driver for one FTFL instance
pub struct Flash<R, M, D> {
    pub(crate) regs: R,
    mask: M,
    poll_budget: Option<u32>,
    _device: PhantomData<D>,
}

impl<R, D> Flash<R, CriticalSection, D>
where
    R: FlashRegisters,
    D: FlashDevice,
{
    /// Takes ownership of the controller, masking interrupts through the
    /// target's critical section
    pub fn new(regs: R) -> Self {
        Self::with_mask(regs, CriticalSection)
    }
}

impl<R, M, D> Flash<R, M, D>
where
    R: FlashRegisters,
    M: InterruptMask,
    D: FlashDevice,
{
    /// Takes ownership of the controller and a custom interrupt mask
    pub fn with_mask(regs: R, mask: M) -> Self {
        Flash {
            regs,
            mask,
            poll_budget: None,
            _device: PhantomData,
        }
    }

    /// Gives up after `reads` busy status reads with [`Error::Timeout`]
    ///
    /// By default the engine waits for the controller forever.
    pub fn with_poll_budget(mut self, reads: u32) -> Self {
        self.poll_budget = Some(reads);
        self
    }

    /// Releases the register handle and the mask
    pub fn free(self) -> (R, M) {
        (self.regs, self.mask)
    }

    /// Current FSTAT value
    pub fn status(&self) -> Status {
        Status::from_bits(self.regs.fstat())
    }

    /// Returns the final status once the running command has completed
    pub fn poll(&self) -> nb::Result<Status, Error> {
        poll_complete(&self.regs)
    }

    /// Stages and launches `command` without waiting for it to complete
    ///
    /// Returns `WouldBlock` if the controller is still busy. Interrupts are
    /// only masked while the command is staged and launched; use
    /// [`poll`](Self::poll) to wait for the result.
    ///
    /// # Safety
    ///
    /// No code may execute from, and nothing may read, the flash array until
    /// `poll` returns. The command is issued as-is, without the
    /// protected-range and first-sector checks of the safe operations.
    pub unsafe fn start(&mut self, command: Command) -> nb::Result<(), Error> {
        poll_complete(&self.regs)?;
        let _masked = self.mask.guard();
        stage(&mut self.regs, &command);
        self.regs.write_fstat(FSTAT_CCIF);
        Ok(())
    }

    /// Issues `command` and blocks until the controller has completed it
    ///
    /// The returned status may carry error flags; only an exhausted poll
    /// budget is reported as `Err`.
    pub fn issue(&mut self, command: Command) -> Result<Status, Error> {
        self.wait_ready()?;
        let _masked = self.mask.guard();
        stage(&mut self.regs, &command);
        launch_and_wait(&mut self.regs, self.poll_budget)
    }

    /// Checks that the whole sector containing `address` reads as ones at the
    /// given margin
    pub fn verify_sector(&mut self, address: u32, margin: Margin) -> Result<bool, Error> {
        let status = self.issue(Command::ReadOnesSection {
            address: D::sector_base(address),
            words: D::sector_words(),
            margin,
        })?;
        Ok(status.is_ok())
    }

    /// Returns true if the sector containing `address` is erased
    ///
    /// `false` means the sector holds data or the controller flagged an error;
    /// the verify command does not tell the two apart.
    pub fn check_sector_erased(&mut self, address: u32) -> Result<bool, Error> {
        self.verify_sector(address, Margin::Normal)
    }

    /// Erases the sector containing `address` unless it is already blank
    ///
    /// The first sector and any sector overlapping the protected range are
    /// refused.
    pub fn erase_sector(&mut self, address: u32) -> Result<Outcome, Error> {
        let base = D::sector_base(address);
        if let Some(why) = erase_refusal::<D>(base) {
            return Ok(Outcome::Refused(why));
        }
        unsafe { self.erase_sector_unprotected(base) }
    }

    /// Erases the sector containing `address` without the first-sector and
    /// protected-range checks
    ///
    /// # Safety
    ///
    /// Erasing the first sector wipes the vector table and the flash
    /// configuration field. A reset before both are rewritten can leave the
    /// part secured or unbootable.
    pub unsafe fn erase_sector_unprotected(&mut self, address: u32) -> Result<Outcome, Error> {
        let base = D::sector_base(address);
        // A failed check is indistinguishable from data being present, so
        // only a clean check skips the erase
        if self.check_sector_erased(base)? {
            return Ok(Outcome::AlreadyErased);
        }
        self.issue(Command::EraseSector { address: base })?.ok()?;
        Ok(Outcome::Completed)
    }

    /// Programs one long word at `address`, rounded down to 4 bytes
    ///
    /// Words inside the protected range are refused. The target must have
    /// been erased.
    pub fn program_word(&mut self, address: u32, data: u32) -> Result<Outcome, Error> {
        let address = address & !3;
        if D::PROTECTED.contains(address) {
            return Ok(Outcome::Refused(Refusal::ProtectedRange));
        }
        unsafe { self.program_word_unprotected(address, data) }
    }

    /// Programs one long word without the protected-range check
    ///
    /// # Safety
    ///
    /// Programming the flash configuration field changes the security and
    /// protection bits loaded at the next reset. Some values lock the part
    /// permanently.
    pub unsafe fn program_word_unprotected(
        &mut self,
        address: u32,
        data: u32,
    ) -> Result<Outcome, Error> {
        let address = address & !3;
        self.issue(Command::ProgramLongWord { address, data })?.ok()?;
        Ok(Outcome::Completed)
    }

    /// Selects whether FlexRAM backs the emulated EEPROM or is plain RAM
    pub fn set_flexram(&mut self, mode: FlexRamMode) -> Result<(), Error> {
        self.issue(Command::SetFlexRam { mode })?.ok()?;
        Ok(())
    }

    /// FlexRAM is usable as plain RAM
    pub fn ram_ready(&self) -> bool {
        self.regs.fcnfg() & FCNFG_RAMRDY != 0
    }

    /// FlexRAM is usable as EEPROM backing
    pub fn eeprom_ready(&self) -> bool {
        self.regs.fcnfg() & FCNFG_EEERDY != 0
    }

    /// Reads the long word at `address`, rounded down to 4 bytes
    pub fn read_word(&self, address: u32) -> u32 {
        self.regs.read_word(address & !3)
    }

    fn wait_ready(&self) -> Result<Status, Error> {
        wait_complete(&self.regs, self.poll_budget)
    }
}

/// Why the safe erase declines the sector starting at `base`, if it does
fn erase_refusal<D: FlashDevice>(base: u32) -> Option<Refusal> {
    if base == 0 {
        Some(Refusal::FirstSector)
    } else if overlaps_protected::<D>(base, base + (D::SECTOR_SIZE - 1)) {
        Some(Refusal::ProtectedRange)
    } else {
        None
    }
}

/// `first..=last` shares at least one byte with the protected range
fn overlaps_protected<D: FlashDevice>(first: u32, last: u32) -> bool {
    D::PROTECTED.start <= last && first <= D::PROTECTED.end
}

fn poll_complete<R: FlashRegisters>(regs: &R) -> nb::Result<Status, Error> {
    let status = Status::from_bits(regs.fstat());
    if status.is_complete() {
        Ok(status)
    } else {
        Err(nb::Error::WouldBlock)
    }
}

fn wait_complete<R: FlashRegisters>(regs: &R, budget: Option<u32>) -> Result<Status, Error> {
    match budget {
        None => nb::block!(poll_complete(regs)),
        Some(reads) => {
            for _ in 0..reads {
                match poll_complete(regs) {
                    Ok(status) => return Ok(status),
                    Err(nb::Error::Other(e)) => return Err(e),
                    Err(nb::Error::WouldBlock) => {}
                }
            }
            Err(Error::Timeout)
        }
    }
}

/// Writes the command into FCCOB. The controller must be idle.
fn stage<R: FlashRegisters>(regs: &mut R, command: &Command) {
    // Stale ACCERR/FPVIOL would block the launch
    regs.write_fstat(FSTAT_ACCERR | FSTAT_FPVIOL);
    for (index, &byte) in command.buffer().as_slice().iter().enumerate() {
        regs.write_fccob(index, byte);
    }
}

/// Launches the staged command and waits for CCIF
///
/// With `ram-exec` this routine is placed in RAM. The loop only touches the
/// register accessors, which are `#[inline(always)]` on [`Ftfl`], so nothing
/// is fetched from the array until CCIF is set.
///
/// [`Ftfl`]: crate::registers::Ftfl
#[inline(never)]
#[cfg_attr(feature = "ram-exec", link_section = ".data.kinetis_ftfl.launch")]
fn launch_and_wait<R: FlashRegisters>(regs: &mut R, budget: Option<u32>) -> Result<Status, Error> {
    let (bounded, mut remaining) = match budget {
        Some(reads) => (true, reads),
        None => (false, 0),
    };
    regs.write_fstat(FSTAT_CCIF);
    loop {
        if bounded {
            if remaining == 0 {
                return Err(Error::Timeout);
            }
            remaining -= 1;
        }
        let fstat = regs.fstat();
        if fstat & FSTAT_CCIF != 0 {
            return Ok(Status::from_bits(fstat));
        }
    }
}

/// Error of the `embedded-storage` interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    Flash(Error),
    Refused(Refusal),
    NotAligned,
    OutOfBounds,
}

impl From<Error> for StorageError {
    fn from(e: Error) -> Self {
        StorageError::Flash(e)
    }
}

impl NorFlashError for StorageError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            StorageError::NotAligned => NorFlashErrorKind::NotAligned,
            StorageError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            StorageError::Flash(e) => e.kind(),
            StorageError::Refused(_) => NorFlashErrorKind::Other,
        }
    }
}

fn check_bounds<D: FlashDevice>(offset: u32, len: usize) -> Result<(), StorageError> {
    match (offset as usize).checked_add(len) {
        Some(end) if end <= D::FLASH_SIZE as usize => Ok(()),
        _ => Err(StorageError::OutOfBounds),
    }
}

fn refused(outcome: Outcome) -> Result<(), StorageError> {
    match outcome {
        Outcome::Refused(why) => Err(StorageError::Refused(why)),
        _ => Ok(()),
    }
}

impl<R, M, D> ErrorType for Flash<R, M, D> {
    type Error = StorageError;
}

impl<R, M, D> ReadNorFlash for Flash<R, M, D>
where
    R: FlashRegisters,
    M: InterruptMask,
    D: FlashDevice,
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_bounds::<D>(offset, bytes.len())?;
        for (address, byte) in (offset..).zip(bytes.iter_mut()) {
            let word = self.read_word(address).to_le_bytes();
            *byte = word[(address & 3) as usize];
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        D::FLASH_SIZE as usize
    }
}

impl<R, M, D> NorFlash for Flash<R, M, D>
where
    R: FlashRegisters,
    M: InterruptMask,
    D: FlashDevice,
{
    const WRITE_SIZE: usize = 4;

    const ERASE_SIZE: usize = D::SECTOR_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from % D::SECTOR_SIZE != 0 || to % D::SECTOR_SIZE != 0 {
            return Err(StorageError::NotAligned);
        }
        if from > to || to > D::FLASH_SIZE {
            return Err(StorageError::OutOfBounds);
        }
        // Refuse the whole range before erasing any of it
        let mut sector = from;
        while sector < to {
            if let Some(why) = erase_refusal::<D>(sector) {
                return Err(StorageError::Refused(why));
            }
            sector += D::SECTOR_SIZE;
        }
        let mut sector = from;
        while sector < to {
            refused(self.erase_sector(sector)?)?;
            sector += D::SECTOR_SIZE;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if offset % 4 != 0 || bytes.len() % 4 != 0 {
            return Err(StorageError::NotAligned);
        }
        check_bounds::<D>(offset, bytes.len())?;
        let last = offset + (bytes.len() as u32).saturating_sub(1);
        if !bytes.is_empty() && overlaps_protected::<D>(offset, last) {
            return Err(StorageError::Refused(Refusal::ProtectedRange));
        }
        for (address, chunk) in (offset..).step_by(4).zip(bytes.chunks_exact(4)) {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            refused(self.program_word(address, word)?)?;
        }
        Ok(())
    }
}
