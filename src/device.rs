//! Per-device flash geometry
//!
//! The command engine never hard-codes sizes. It is generic over a
//! [`FlashDevice`] that carries the flash size, the erase granularity and the
//! protected configuration field of the target part.
//!
//! Enable exactly one of the `mk20dx128`, `mk20dx256` or `mkl26z64` features to
//! get a `Selected` alias for the part you build for.

use core::marker::PhantomData;

/// Inclusive address interval that the safe programming path refuses to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtectedRange {
    pub start: u32,
    pub end: u32,
}

impl ProtectedRange {
    /// Returns true if `address` falls inside the interval
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }
}

/// Flash configuration field of all Kinetis parts (backdoor key, FPROT, FSEC,
/// FOPT, FEPROT, FDPROT). The last long word starts at 0x40C.
pub const FLASH_CONFIG_FIELD: ProtectedRange = ProtectedRange {
    start: 0x400,
    end: 0x40C,
};

/// Geometry of a flash array driven through the FTFL command interface
pub trait FlashDevice {
    /// Size of the program flash in bytes
    const FLASH_SIZE: u32;
    /// Smallest erasable unit in bytes, always a power of two
    const SECTOR_SIZE: u32;
    /// Long words that `program_word` refuses to program
    const PROTECTED: ProtectedRange = FLASH_CONFIG_FIELD;

    /// Rounds `address` down to the start of its sector
    fn sector_base(address: u32) -> u32 {
        address & !(Self::SECTOR_SIZE - 1)
    }

    /// Number of long words in one sector
    ///
    /// The verify command takes a 16-bit word count. A device whose sector
    /// size is not a power of two, or is larger than 128 KiB, fails to build
    /// once this is used.
    fn sector_words() -> u16
    where
        Self: Sized,
    {
        SectorWords::<Self>::COUNT
    }
}

struct SectorWords<D>(PhantomData<D>);

impl<D: FlashDevice> SectorWords<D> {
    const COUNT: u16 = {
        let words = D::SECTOR_SIZE >> 2;
        assert!(
            D::SECTOR_SIZE.is_power_of_two() && words != 0 && words <= u16::MAX as u32,
            "sector word count does not fit the verify command"
        );
        words as u16
    };
}

/// MK20DX128 (Teensy 3.0): 128 KiB program flash, 2 KiB sectors
pub struct Mk20dx128;

impl FlashDevice for Mk20dx128 {
    const FLASH_SIZE: u32 = 0x0002_0000;
    const SECTOR_SIZE: u32 = 0x800;
}

/// MK20DX256 (Teensy 3.1/3.2): 256 KiB program flash, 2 KiB sectors
pub struct Mk20dx256;

impl FlashDevice for Mk20dx256 {
    const FLASH_SIZE: u32 = 0x0004_0000;
    const SECTOR_SIZE: u32 = 0x800;
}

/// MKL26Z64 (Teensy LC): 64 KiB program flash, 1 KiB sectors
pub struct Mkl26z64;

impl FlashDevice for Mkl26z64 {
    const FLASH_SIZE: u32 = 0x0001_0000;
    const SECTOR_SIZE: u32 = 0x400;
}

#[cfg(feature = "mk20dx256")]
pub type Selected = Mk20dx256;

#[cfg(all(feature = "mk20dx128", not(feature = "mk20dx256")))]
pub type Selected = Mk20dx128;

#[cfg(all(
    feature = "mkl26z64",
    not(any(feature = "mk20dx128", feature = "mk20dx256"))
))]
pub type Selected = Mkl26z64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_base_masks_low_bits() {
        assert_eq!(Mk20dx256::sector_base(0x0000_0FFF), 0x800);
        assert_eq!(Mk20dx256::sector_base(0x0000_0800), 0x800);
        assert_eq!(Mkl26z64::sector_base(0x0000_07FF), 0x400);
        assert_eq!(Mk20dx128::sector_base(0x3), 0);
    }

    #[test]
    fn sector_words_cover_whole_sector() {
        assert_eq!(Mk20dx128::sector_words(), 512);
        assert_eq!(Mkl26z64::sector_words(), 256);
    }

    struct LargestSector;

    impl FlashDevice for LargestSector {
        const FLASH_SIZE: u32 = 0x0008_0000;
        const SECTOR_SIZE: u32 = 0x0002_0000;
    }

    #[test]
    fn largest_sector_keeps_full_word_count() {
        assert_eq!(LargestSector::sector_words(), 0x8000);
        assert_eq!(LargestSector::sector_base(0x0003_FFFC), 0x0002_0000);
    }

    #[test]
    fn config_field_bounds_are_inclusive() {
        assert!(!FLASH_CONFIG_FIELD.contains(0x3FC));
        assert!(FLASH_CONFIG_FIELD.contains(0x400));
        assert!(FLASH_CONFIG_FIELD.contains(0x40C));
        assert!(!FLASH_CONFIG_FIELD.contains(0x410));
    }
}
