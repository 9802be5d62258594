pub use embedded_storage::nor_flash::NorFlash as _kinetis_ftfl_NorFlash;
pub use embedded_storage::nor_flash::ReadNorFlash as _kinetis_ftfl_ReadNorFlash;

pub use crate::device::FlashDevice as _kinetis_ftfl_device_FlashDevice;
pub use crate::interrupt::InterruptMask as _kinetis_ftfl_interrupt_InterruptMask;
