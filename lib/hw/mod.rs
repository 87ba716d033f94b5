use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::Point;

use crate::error::ConversionError;
use crate::group::ConversionGroup;
use crate::Sample;

#[cfg(feature = "hardware")]
mod adc;
#[cfg(feature = "hardware")]
mod helper;
#[cfg(feature = "hardware")]
mod oled;
#[cfg(feature = "hardware")]
mod timers;

#[cfg(feature = "hardware")]
pub use adc::AdcConfig;
#[cfg(feature = "hardware")]
pub use helper::*;
#[cfg(feature = "hardware")]
pub use oled::OledError;
#[cfg(feature = "hardware")]
pub use timers::{BlinkTimer, FrameTimer};

/// How the DMA walks the buffer for one run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    /// Wrap around at the end instead of stopping.
    pub circular: bool,
    /// Report the midpoint as well as the end.
    pub half_transfer: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    HalfTransfer,
    TransferComplete,
    Fault(ConversionError),
}

/// Pending status of the converter and its DMA channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub transfer_error: bool,
    pub overrun: bool,
    pub half_transfer: bool,
    pub transfer_complete: bool,
}

impl Flags {
    /// The event to report first.
    ///
    /// A one-shot run keeps converting between its last transfer and the
    /// halt, so an overrun next to its completion belongs to samples nobody
    /// asked for and is not reported.
    pub fn next_event(&self, circular: bool) -> Option<Event> {
        if self.transfer_error {
            return Some(Event::Fault(ConversionError::DmaTransfer));
        }
        if !circular && self.transfer_complete {
            return Some(Event::TransferComplete);
        }
        if self.overrun {
            return Some(Event::Fault(ConversionError::Overrun));
        }
        if self.half_transfer {
            return Some(Event::HalfTransfer);
        }
        if self.transfer_complete {
            return Some(Event::TransferComplete);
        }
        None
    }
}

/// Sampling peripheral as seen by the acquisition engine.
pub trait AdcPort {
    /// Programs the sequence for `group` and starts converting into `buffer`.
    fn arm(
        &mut self,
        group: &ConversionGroup<'_>,
        buffer: &mut [Sample],
        transfer: Transfer,
    ) -> Result<(), ConversionError>;

    /// Takes one pending event, acknowledging it in hardware.
    fn poll(&mut self, buffer: &mut [Sample]) -> Option<Event>;

    /// Stops converting. Does nothing when already stopped.
    fn halt(&mut self);

    /// Clears a transient fault, the run keeps going.
    fn recover(&mut self, error: ConversionError) -> Result<(), ConversionError>;

    /// Full re-initialization after an unrecoverable fault.
    fn reset(&mut self) -> Result<(), ConversionError>;
}

/// Text oriented bitmap display.
pub trait Surface {
    type Error;
    fn start(&mut self) -> Result<(), Self::Error>;
    fn fill(&mut self, color: BinaryColor) -> Result<(), Self::Error>;
    fn goto(&mut self, position: Point);
    fn puts(
        &mut self,
        text: &str,
        font: &'static MonoFont<'static>,
        color: BinaryColor,
    ) -> Result<(), Self::Error>;
    /// Commits everything drawn since the last update.
    fn update(&mut self) -> Result<(), Self::Error>;
    fn stop(&mut self) -> Result<(), Self::Error>;
}
