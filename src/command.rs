//! Flash controller commands and their FCCOB images

/// Verify that a range of long words reads all ones
pub const FCMD_READ_1S_SECTION: u8 = 0x01;
/// Program one long word (32 bit)
pub const FCMD_PROGRAM_LONG_WORD: u8 = 0x06;
/// Erase one flash sector
pub const FCMD_ERASE_FLASH_SECTOR: u8 = 0x09;
/// Select the FlexRAM function
pub const FCMD_SET_FLEXRAM: u8 = 0x81;

/// Read margin used by the verify commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Margin {
    Normal = 0x00,
    User = 0x01,
    Factory = 0x02,
}

/// Function of the FlexRAM block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FlexRamMode {
    /// FlexRAM backs the emulated EEPROM
    Eeprom = 0x00,
    /// FlexRAM is plain RAM
    Ram = 0xFF,
}

/// A single controller command with its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    ReadOnesSection {
        address: u32,
        words: u16,
        margin: Margin,
    },
    ProgramLongWord {
        address: u32,
        data: u32,
    },
    EraseSector {
        address: u32,
    },
    SetFlexRam {
        mode: FlexRamMode,
    },
}

/// The bytes a command occupies in FCCOB0..FCCOB7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBuffer {
    bytes: [u8; 8],
    len: usize,
}

impl CommandBuffer {
    fn with_address(code: u8, address: u32) -> Self {
        let [_, high, mid, low] = address.to_be_bytes();
        CommandBuffer {
            bytes: [code, high, mid, low, 0, 0, 0, 0],
            len: 4,
        }
    }

    fn push(mut self, byte: u8) -> Self {
        self.bytes[self.len] = byte;
        self.len += 1;
        self
    }

    /// Bytes to write, starting with FCCOB0
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Command {
    pub fn code(&self) -> u8 {
        match self {
            Command::ReadOnesSection { .. } => FCMD_READ_1S_SECTION,
            Command::ProgramLongWord { .. } => FCMD_PROGRAM_LONG_WORD,
            Command::EraseSector { .. } => FCMD_ERASE_FLASH_SECTOR,
            Command::SetFlexRam { .. } => FCMD_SET_FLEXRAM,
        }
    }

    /// Lays the command out the way the controller expects it in FCCOB
    pub fn buffer(&self) -> CommandBuffer {
        match *self {
            Command::ReadOnesSection {
                address,
                words,
                margin,
            } => {
                let [count_high, count_low] = words.to_be_bytes();
                CommandBuffer::with_address(self.code(), address)
                    .push(count_high)
                    .push(count_low)
                    .push(margin as u8)
            }
            Command::ProgramLongWord { address, data } => {
                let [b3, b2, b1, b0] = data.to_be_bytes();
                CommandBuffer::with_address(self.code(), address)
                    .push(b3)
                    .push(b2)
                    .push(b1)
                    .push(b0)
            }
            Command::EraseSector { address } => CommandBuffer::with_address(self.code(), address),
            // SETRAM takes its function code in FCCOB1 and has no address
            Command::SetFlexRam { mode } => CommandBuffer {
                bytes: [self.code(), mode as u8, 0, 0, 0, 0, 0, 0],
                len: 2,
            },
        }
    }
}
