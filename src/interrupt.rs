//! Interrupt masking around flash commands
//!
//! While a command runs the flash array cannot be read, so nothing that lives
//! in flash may execute. The engine masks interrupts through a [`MaskGuard`]
//! that restores the previous state when it goes out of scope, on every path.

use critical_section::RestoreState;

/// Primitive to mask and restore interrupts on the current core
pub trait InterruptMask {
    /// Whatever is needed to put the mask back as it was
    type State: Copy;

    /// Masks interrupts and returns the previous state
    fn mask(&mut self) -> Self::State;

    /// Restores the state returned by `mask`
    fn restore(&mut self, state: Self::State);

    /// Masks interrupts until the returned guard is dropped
    fn guard(&mut self) -> MaskGuard<'_, Self>
    where
        Self: Sized,
    {
        let state = self.mask();
        MaskGuard { mask: self, state }
    }
}

/// Restores the interrupt mask when dropped
pub struct MaskGuard<'a, M: InterruptMask> {
    mask: &'a mut M,
    state: M::State,
}

impl<M: InterruptMask> Drop for MaskGuard<'_, M> {
    fn drop(&mut self) {
        self.mask.restore(self.state);
    }
}

/// Masking through the target's `critical-section` implementation
///
/// On Cortex-M this is the PRIMASK based single-core implementation provided
/// by `cortex-m`. Nested use restores the caller's state.
#[derive(Debug, Default, Clone, Copy)]
pub struct CriticalSection;

impl InterruptMask for CriticalSection {
    type State = RestoreState;

    fn mask(&mut self) -> RestoreState {
        unsafe { critical_section::acquire() }
    }

    fn restore(&mut self, state: RestoreState) {
        unsafe { critical_section::release(state) }
    }
}
