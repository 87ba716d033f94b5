use display_interface::DisplayError;
use embedded_graphics::mono_font::{MonoFont, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};
use stm32g0xx_hal::hal::blocking::i2c::Write as I2cWrite;

use crate::config::{BusConfig, OLED_ADDRESS};
use crate::hw::Surface;

#[derive(Debug)]
pub struct OledError(pub DisplayError);

#[cfg(feature = "defmt")]
impl defmt::Format for OledError {
    fn format(&self, f: defmt::Formatter) {
        let kind = match self.0 {
            DisplayError::BusWriteError => "bus write",
            DisplayError::DataFormatNotImplemented => "data format",
            DisplayError::OutOfBoundsError => "out of bounds",
            _ => "other",
        };
        defmt::write!(f, "OledError({=str})", kind)
    }
}

type Panel<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// 128x64 SSD1306 panel on I2C with a frame buffer in RAM.
pub struct Oled<I2C> {
    panel: Panel<I2C>,
    cursor: Point,
    bus: BusConfig,
}

impl<I2C> Oled<I2C>
where
    I2C: I2cWrite,
{
    pub fn new(i2c: I2C, bus: BusConfig) -> Self {
        let interface = I2CDisplayInterface::new_custom_address(i2c, OLED_ADDRESS);
        let panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        Oled {
            panel,
            cursor: Point::zero(),
            bus,
        }
    }

    pub fn bus(&self) -> &BusConfig {
        &self.bus
    }
}

impl<I2C> Surface for Oled<I2C>
where
    I2C: I2cWrite,
{
    type Error = OledError;

    fn start(&mut self) -> Result<(), OledError> {
        self.panel.init().map_err(OledError)?;
        self.panel.set_display_on(true).map_err(OledError)
    }

    fn fill(&mut self, color: BinaryColor) -> Result<(), OledError> {
        DrawTarget::clear(&mut self.panel, color).map_err(OledError)
    }

    fn goto(&mut self, position: Point) {
        self.cursor = position;
    }

    // Glyph cells are painted in the inverse color so old digits vanish
    fn puts(
        &mut self,
        text: &str,
        font: &'static MonoFont<'static>,
        color: BinaryColor,
    ) -> Result<(), OledError> {
        let style = MonoTextStyleBuilder::new()
            .font(font)
            .text_color(color)
            .background_color(color.invert())
            .build();
        self.cursor = Text::with_baseline(text, self.cursor, style, Baseline::Top)
            .draw(&mut self.panel)
            .map_err(OledError)?;
        Ok(())
    }

    fn update(&mut self) -> Result<(), OledError> {
        self.panel.flush().map_err(OledError)
    }

    fn stop(&mut self) -> Result<(), OledError> {
        self.panel.set_display_on(false).map_err(OledError)
    }
}
