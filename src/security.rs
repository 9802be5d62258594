//! Flash configuration field and security state
//!
//! The 16 bytes at 0x400..0x410 are loaded into FPROT, FSEC, FOPT, FEPROT and
//! FDPROT at every reset. The safe programming path never touches them; this
//! module reads them back and writes them through the unprotected path.

use crate::device::{FlashDevice, FLASH_CONFIG_FIELD};
use crate::flash::Flash;
use crate::interrupt::InterruptMask;
use crate::registers::FlashRegisters;
use crate::status::Error;

/// FSEC of a part that can be read, debugged and mass erased
pub const FSEC_UNSECURED: u8 = 0xDE;
/// FSEC of a secured part with mass erase disabled
pub const FSEC_LOCKED: u8 = 0x64;

/// Decoded FSEC register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Security {
    /// SEC: debug access and external flash reads are blocked
    pub secured: bool,
    /// FSLACC: factory failure analysis access is granted
    pub factory_access: bool,
    /// MEEN: a mass erase through the debug port is possible
    pub mass_erase: bool,
    /// KEYEN: the backdoor key can unsecure the part
    pub backdoor_key: bool,
}

impl Security {
    pub fn from_fsec(fsec: u8) -> Self {
        let sec = fsec & 0b11;
        let fslacc = (fsec >> 2) & 0b11;
        let meen = (fsec >> 4) & 0b11;
        let keyen = (fsec >> 6) & 0b11;
        Security {
            secured: sec != 0b10,
            factory_access: fslacc == 0b00 || fslacc == 0b11,
            mass_erase: meen != 0b10,
            backdoor_key: keyen == 0b10,
        }
    }
}

/// Contents of the flash configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfigField {
    pub backdoor_key: [u8; 8],
    /// FPROT3..FPROT0, one bit per protected region, 1 = unprotected
    pub fprot: [u8; 4],
    pub fsec: u8,
    pub fopt: u8,
    pub feprot: u8,
    pub fdprot: u8,
}

impl FlashConfigField {
    /// Unsecured, unprotected, NMI disabled, fast boot
    pub const fn unsecured() -> Self {
        FlashConfigField {
            backdoor_key: [0xFF; 8],
            fprot: [0xFF; 4],
            fsec: FSEC_UNSECURED,
            fopt: 0xF9,
            feprot: 0xFF,
            fdprot: 0xFF,
        }
    }

    /// Secured with mass erase disabled
    ///
    /// Once loaded at reset, this cannot be undone through the debug port.
    pub const fn secured() -> Self {
        Self::unsecured().with_fsec(FSEC_LOCKED)
    }

    pub const fn with_fsec(mut self, fsec: u8) -> Self {
        self.fsec = fsec;
        self
    }

    pub fn security(&self) -> Security {
        Security::from_fsec(self.fsec)
    }

    /// Long words as they are stored at 0x400, 0x404, 0x408 and 0x40C
    pub fn words(&self) -> [u32; 4] {
        let k = &self.backdoor_key;
        let p = &self.fprot;
        [
            u32::from_le_bytes([k[0], k[1], k[2], k[3]]),
            u32::from_le_bytes([k[4], k[5], k[6], k[7]]),
            u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
            u32::from_le_bytes([self.fsec, self.fopt, self.feprot, self.fdprot]),
        ]
    }

    pub fn from_words(words: [u32; 4]) -> Self {
        let [k0, k1, k2, k3] = words[0].to_le_bytes();
        let [k4, k5, k6, k7] = words[1].to_le_bytes();
        let fprot = words[2].to_le_bytes();
        let [fsec, fopt, feprot, fdprot] = words[3].to_le_bytes();
        FlashConfigField {
            backdoor_key: [k0, k1, k2, k3, k4, k5, k6, k7],
            fprot,
            fsec,
            fopt,
            feprot,
            fdprot,
        }
    }
}

impl<R, M, D> Flash<R, M, D>
where
    R: FlashRegisters,
    M: InterruptMask,
    D: FlashDevice,
{
    /// Security state loaded at the last reset
    pub fn security(&self) -> Security {
        Security::from_fsec(self.regs.fsec())
    }

    /// Reads the configuration field currently stored in flash
    pub fn config_field(&self) -> FlashConfigField {
        let base = FLASH_CONFIG_FIELD.start;
        FlashConfigField::from_words([
            self.read_word(base),
            self.read_word(base + 4),
            self.read_word(base + 8),
            self.read_word(base + 12),
        ])
    }

    /// Programs the configuration field
    ///
    /// Words that are all ones are skipped since they already match an erased
    /// array. The field must be erased beforehand, otherwise the controller
    /// reports [`Error::CommandFailed`].
    ///
    /// # Safety
    ///
    /// The new values take effect at the next reset. A secured field with mass
    /// erase disabled locks the part for good.
    pub unsafe fn write_config_field(&mut self, field: &FlashConfigField) -> Result<(), Error> {
        let base = FLASH_CONFIG_FIELD.start;
        for (address, &word) in (base..).step_by(4).zip(field.words().iter()) {
            if word != 0xFFFF_FFFF {
                self.program_word_unprotected(address, word)?;
            }
        }
        Ok(())
    }
}
