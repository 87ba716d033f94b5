pub type Result<T, SE> = core::result::Result<T, Error<SE>>;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SE> {
    // Render surface error
    Surface(SE),
    // Line buffer
    BufferWrite,
}

/// Refusals and failures of the acquisition engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcqError {
    /// A run is already converting, it has to be stopped first.
    Busy,
    /// The peripheral needs a reset before it converts again.
    Fatal,
    /// Buffer length is not `channels * depth`.
    BufferLength,
    /// Group trigger does not match the start call.
    TriggerMode,
    /// Group cannot be programmed into the sequencer.
    InvalidGroup,
}

/// Faults reported to the group error callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConversionError {
    // Data register overwritten before the DMA picked it up
    Overrun,
    // Peripheral did not become ready in time
    Timeout,
    // DMA bus error, channel is disabled by hardware
    DmaTransfer,
}

impl ConversionError {
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ConversionError::DmaTransfer)
    }
}
