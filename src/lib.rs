//! Driver for the FTFL/FTFA flash controller of Kinetis microcontrollers
//!
//! The controller executes one command at a time out of its FCCOB command
//! buffer. [`flash::Flash`] stages those commands, waits for completion and
//! turns FSTAT into a result, while refusing writes to the flash
//! configuration field and erasing only sectors that are not already blank.
//!
//! Device geometry comes from a [`device::FlashDevice`]; enable one of the
//! `mk20dx128`, `mk20dx256` or `mkl26z64` features for `device::Selected`.

#![no_std]

pub mod command;
pub mod device;
pub mod flash;
pub mod interrupt;
pub mod prelude;
pub mod registers;
pub mod security;
pub mod status;

#[cfg(test)]
mod mock;

pub use crate::flash::{Flash, Outcome, Refusal};
pub use crate::status::{Error, Status};
