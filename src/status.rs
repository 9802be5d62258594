//! FSTAT decoding

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

use crate::registers::{FSTAT_ACCERR, FSTAT_CCIF, FSTAT_FPVIOL, FSTAT_MGSTAT0};

/// Bits of FSTAT that mean the last command failed
pub const ERROR_FLAGS: u8 = FSTAT_ACCERR | FSTAT_FPVIOL | FSTAT_MGSTAT0;

/// Snapshot of the FSTAT register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(u8);

impl Status {
    pub const fn from_bits(bits: u8) -> Self {
        Status(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Command buffer is idle and may be written
    pub const fn is_complete(self) -> bool {
        self.0 & FSTAT_CCIF != 0
    }

    pub const fn access_error(self) -> bool {
        self.0 & FSTAT_ACCERR != 0
    }

    pub const fn protection_violation(self) -> bool {
        self.0 & FSTAT_FPVIOL != 0
    }

    pub const fn sequence_error(self) -> bool {
        self.0 & FSTAT_MGSTAT0 != 0
    }

    /// Error bits only, zero means success
    pub const fn error_flags(self) -> u8 {
        self.0 & ERROR_FLAGS
    }

    pub const fn is_ok(self) -> bool {
        self.error_flags() == 0
    }

    /// Converts the error bits into a `Result`
    pub fn ok(self) -> Result<Self, Error> {
        Error::read(self).map(Err).unwrap_or(Ok(self))
    }
}

/// Flash command error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// ACCERR: the command referenced an invalid or misaligned resource
    AccessError,
    /// FPVIOL: the command targeted a region the controller protects
    ProtectionViolation,
    /// MGSTAT0: the verify or program step failed at the bit level
    CommandFailed,
    /// The controller did not raise CCIF within the configured poll budget
    Timeout,
}

impl Error {
    /// Highest-priority error in `status`, if any
    pub fn read(status: Status) -> Option<Self> {
        if status.access_error() {
            Some(Error::AccessError)
        } else if status.protection_violation() {
            Some(Error::ProtectionViolation)
        } else if status.sequence_error() {
            Some(Error::CommandFailed)
        } else {
            None
        }
    }
}

impl NorFlashError for Error {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}
