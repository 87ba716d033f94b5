use core::fmt::Write;
use embedded_graphics::mono_font::ascii::FONT_9X18;
use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::Point;
use heapless::String;

use crate::config::{FULL_SCALE, REFERENCE_MV, REFRESH_INTERVAL_MS};
use crate::error::{Error, Result};
use crate::hw::Surface;
use crate::store::{ReadingId, Readings};
use crate::Sample;

pub const LINE_LEN: usize = 16;

pub type Text = String<LINE_LEN>;

/// Raw code to volts: `raw / full_scale * reference`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Scale {
    pub full_scale: u16,
    pub reference_mv: u32,
}

impl Scale {
    pub const fn new(full_scale: u16, reference_mv: u32) -> Self {
        Scale {
            full_scale,
            reference_mv,
        }
    }

    /// Hundredths of a volt, rounded half up. Codes above full scale clamp.
    pub fn hundredths(&self, raw: Sample) -> u32 {
        let full = u32::from(self.full_scale.max(1));
        let raw = u32::from(raw.min(self.full_scale));
        (raw * self.reference_mv + full * 5) / (full * 10)
    }

    /// Digits before the decimal point at full scale.
    pub fn integer_digits(&self) -> usize {
        let mut volts = self.reference_mv / 1000;
        let mut digits = 1;
        while volts >= 10 {
            volts /= 10;
            digits += 1;
        }
        digits
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    /// Scaled to volts with two decimals.
    Volts(Scale),
    /// Raw code, right aligned.
    Count,
}

impl Format {
    pub fn write(&self, value: Sample, text: &mut Text) -> core::fmt::Result {
        match self {
            Format::Volts(scale) => {
                let hundredths = scale.hundredths(value);
                write!(
                    text,
                    "{:>width$}.{:02}",
                    hundredths / 100,
                    hundredths % 100,
                    width = scale.integer_digits()
                )
            }
            Format::Count => write!(text, "{:>4}", value),
        }
    }
}

/// Formats a value without label, `"1.65"` for a volts format.
pub fn format_value(format: &Format, value: Sample) -> Text {
    let mut text = Text::new();
    // four digits of a u16 plus separators always fit
    let _ = format.write(value, &mut text);
    text
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub label: &'static str,
    pub reading: ReadingId,
    pub position: Point,
    pub format: Format,
}

impl Line {
    pub fn render(&self, value: Sample) -> core::result::Result<Text, core::fmt::Error> {
        let mut text = Text::new();
        write!(text, "{} ", self.label)?;
        self.format.write(value, &mut text)?;
        Ok(text)
    }
}

/// When drawn lines reach the panel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommitMode {
    /// One line per tick, each committed on its own.
    PerLine,
    /// Every line drawn, then a single commit.
    PerFrame,
}

#[derive(Copy, Clone)]
pub struct DisplayConfig {
    pub lines: &'static [Line],
    pub commit: CommitMode,
    pub font: &'static MonoFont<'static>,
    pub color: BinaryColor,
    /// Time between ticks.
    pub interval_ms: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            lines: &LINES,
            commit: CommitMode::PerLine,
            font: &FONT_9X18,
            color: Color::TEXT,
            interval_ms: REFRESH_INTERVAL_MS,
        }
    }
}

pub struct Display<'a, S>
where
    S: Surface,
{
    surface: S,
    readings: &'a Readings,
    config: DisplayConfig,
    next_line: usize,
    failures: u32,
}

impl<'a, S, SE> Display<'a, S>
where
    S: Surface<Error = SE>,
{
    /// Starts and clears the surface. When that fails the surface is stopped
    /// again before the error is returned.
    pub fn new(surface: S, readings: &'a Readings, config: DisplayConfig) -> Result<Self, SE> {
        let mut display = Display {
            surface,
            readings,
            config,
            next_line: 0,
            failures: 0,
        };
        if let Err(error) = display.init() {
            error!("display start failed");
            let _ = display.surface.stop();
            return Err(error);
        }
        Ok(display)
    }

    /// Draws and commits according to the commit mode.
    pub fn tick(&mut self) -> Result<(), SE> {
        let lines = self.config.lines;
        match self.config.commit {
            CommitMode::PerLine => {
                let index = self.next_line;
                self.next_line = (index + 1) % lines.len().max(1);
                if let Some(line) = lines.get(index) {
                    self.draw_line(line)?;
                }
            }
            CommitMode::PerFrame => {
                for line in lines {
                    self.draw_line(line)?;
                }
            }
        }
        self.surface.update().map_err(Error::Surface)
    }

    /// [`Display::tick`] that logs a failure and keeps going.
    pub fn refresh(&mut self) {
        if self.tick().is_err() {
            self.failures = self.failures.wrapping_add(1);
            warn!("display refresh failed, {} so far", self.failures);
        }
    }

    /// Time for every line to be redrawn once.
    pub fn refresh_period_ms(&self) -> u32 {
        match self.config.commit {
            CommitMode::PerLine => self.config.interval_ms * self.config.lines.len() as u32,
            CommitMode::PerFrame => self.config.interval_ms,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Stops the surface and hands it back.
    pub fn shutdown(mut self) -> S {
        if self.surface.stop().is_err() {
            warn!("display stop failed");
        }
        self.surface
    }

    fn draw_line(&mut self, line: &Line) -> Result<(), SE> {
        let value = self.readings.read(line.reading);
        let text = line.render(value).map_err(|_| Error::BufferWrite)?;
        self.surface.goto(line.position);
        self.surface
            .puts(&text, self.config.font, self.config.color)
            .map_err(Error::Surface)
    }

    fn init(&mut self) -> Result<(), SE> {
        self.surface.start().map_err(Error::Surface)?;
        self.surface.fill(Color::BACKGROUND).map_err(Error::Surface)?;
        self.surface.update().map_err(Error::Surface)?;
        Ok(())
    }
}

pub const SCALE: Scale = Scale::new(FULL_SCALE, REFERENCE_MV);

pub const LINES: [Line; 3] = [
    Line {
        label: "PA6",
        reading: ReadingId::ChannelA,
        position: Layout::FIRST_LINE,
        format: Format::Volts(SCALE),
    },
    Line {
        label: "PA7",
        reading: ReadingId::ChannelB,
        position: Layout::SECOND_LINE,
        format: Format::Volts(SCALE),
    },
    Line {
        label: "VREF",
        reading: ReadingId::Reference,
        position: Layout::THIRD_LINE,
        format: Format::Count,
    },
];

struct Layout;

impl Layout {
    const LEFT: i32 = 0;
    const FIRST_LINE: Point = Point::new(Layout::LEFT, 1);
    const SECOND_LINE: Point = Point::new(Layout::LEFT, 19);
    const THIRD_LINE: Point = Point::new(Layout::LEFT, 39);
}

struct Color;

impl Color {
    const BACKGROUND: BinaryColor = BinaryColor::Off;
    const TEXT: BinaryColor = BinaryColor::On;
}
