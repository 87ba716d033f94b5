//! Simulated peripherals shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;

use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::Point;
use lib::error::ConversionError;
use lib::group::{Channel, ChannelId, ConversionGroup, SampleTime, Trigger};
use lib::hw::{AdcPort, Event, Surface, Transfer};
use lib::Sample;

// ============================================================================
// Callback recorders
// ============================================================================

thread_local! {
    static BATCHES: RefCell<Vec<(Vec<Sample>, usize)>> = RefCell::new(Vec::new());
    static ERRORS: RefCell<Vec<ConversionError>> = RefCell::new(Vec::new());
}

pub fn record_batch(batch: &[Sample], n: usize) {
    BATCHES.with(|batches| batches.borrow_mut().push((batch.to_vec(), n)));
}

pub fn record_error(error: ConversionError) {
    ERRORS.with(|errors| errors.borrow_mut().push(error));
}

/// Batches delivered on this thread since the last call.
pub fn take_batches() -> Vec<(Vec<Sample>, usize)> {
    BATCHES.with(|batches| std::mem::take(&mut *batches.borrow_mut()))
}

/// Faults delivered on this thread since the last call.
pub fn take_errors() -> Vec<ConversionError> {
    ERRORS.with(|errors| std::mem::take(&mut *errors.borrow_mut()))
}

// ============================================================================
// Groups
// ============================================================================

pub const PAIR: [Channel; 2] = [
    Channel::new(ChannelId::Input(6), SampleTime::Cycles39_5),
    Channel::new(ChannelId::Input(7), SampleTime::Cycles39_5),
];

const BAD_TIMES: [Channel; 3] = [
    Channel::new(ChannelId::Input(0), SampleTime::Cycles1_5),
    Channel::new(ChannelId::Input(1), SampleTime::Cycles3_5),
    Channel::new(ChannelId::Input(2), SampleTime::Cycles7_5),
];

pub static STREAM: ConversionGroup<'static> = ConversionGroup {
    channels: &PAIR,
    trigger: Trigger::Continuous,
    on_complete: Some(record_batch),
    on_error: record_error,
};

pub static ONE_SHOT: ConversionGroup<'static> = ConversionGroup {
    channels: &PAIR,
    trigger: Trigger::OneShot,
    on_complete: Some(record_batch),
    on_error: record_error,
};

pub static INVALID: ConversionGroup<'static> = ConversionGroup {
    channels: &BAD_TIMES,
    trigger: Trigger::Continuous,
    on_complete: Some(record_batch),
    on_error: record_error,
};

// ============================================================================
// Sampling peripheral
// ============================================================================

struct Pending {
    offset: usize,
    samples: Vec<Sample>,
    event: Event,
}

/// Scripted [`AdcPort`]: raised events are handed out by `poll`, after their
/// samples were copied into the run buffer.
#[derive(Default)]
pub struct SimPort {
    pending: VecDeque<Pending>,
    pub armed: Vec<Transfer>,
    pub halts: usize,
    pub recovered: Vec<ConversionError>,
    pub resets: usize,
    pub fail_arm: Option<ConversionError>,
    pub fail_recover: bool,
    pub fail_reset: bool,
}

impl SimPort {
    pub fn new() -> Self {
        SimPort::default()
    }

    pub fn raise(&mut self, event: Event) {
        self.raise_with(0, &[], event);
    }

    /// Queues `event`, `samples` land at `offset` when it is polled.
    pub fn raise_with(&mut self, offset: usize, samples: &[Sample], event: Event) {
        self.pending.push_back(Pending {
            offset,
            samples: samples.to_vec(),
            event,
        });
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl AdcPort for SimPort {
    fn arm(
        &mut self,
        _group: &ConversionGroup<'_>,
        _buffer: &mut [Sample],
        transfer: Transfer,
    ) -> Result<(), ConversionError> {
        if let Some(error) = self.fail_arm {
            return Err(error);
        }
        self.armed.push(transfer);
        Ok(())
    }

    fn poll(&mut self, buffer: &mut [Sample]) -> Option<Event> {
        let pending = self.pending.pop_front()?;
        let end = pending.offset + pending.samples.len();
        buffer[pending.offset..end].copy_from_slice(&pending.samples);
        Some(pending.event)
    }

    fn halt(&mut self) {
        self.halts += 1;
    }

    fn recover(&mut self, error: ConversionError) -> Result<(), ConversionError> {
        if self.fail_recover {
            return Err(error);
        }
        self.recovered.push(error);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ConversionError> {
        if self.fail_reset {
            return Err(ConversionError::Timeout);
        }
        self.resets += 1;
        Ok(())
    }
}

// ============================================================================
// Display surface
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Start,
    Fill(BinaryColor),
    Goto(Point),
    Puts(String),
    Update,
    Stop,
}

#[derive(Debug, PartialEq)]
pub struct SurfaceFault;

/// [`Surface`] that records every call. Failures are injected per call kind.
#[derive(Default)]
pub struct RecordingSurface {
    pub ops: Vec<Op>,
    pub fail_start: bool,
    pub fail_puts: usize,
    pub fail_updates: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        RecordingSurface::default()
    }

    /// Text of every `puts` so far.
    pub fn texts(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Puts(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl Surface for RecordingSurface {
    type Error = SurfaceFault;

    fn start(&mut self) -> Result<(), SurfaceFault> {
        self.ops.push(Op::Start);
        if self.fail_start {
            return Err(SurfaceFault);
        }
        Ok(())
    }

    fn fill(&mut self, color: BinaryColor) -> Result<(), SurfaceFault> {
        self.ops.push(Op::Fill(color));
        Ok(())
    }

    fn goto(&mut self, position: Point) {
        self.ops.push(Op::Goto(position));
    }

    fn puts(
        &mut self,
        text: &str,
        _font: &'static MonoFont<'static>,
        _color: BinaryColor,
    ) -> Result<(), SurfaceFault> {
        if self.fail_puts > 0 {
            self.fail_puts -= 1;
            return Err(SurfaceFault);
        }
        self.ops.push(Op::Puts(text.to_string()));
        Ok(())
    }

    fn update(&mut self) -> Result<(), SurfaceFault> {
        if self.fail_updates > 0 {
            self.fail_updates -= 1;
            return Err(SurfaceFault);
        }
        self.ops.push(Op::Update);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SurfaceFault> {
        self.ops.push(Op::Stop);
        Ok(())
    }
}

/// Lets a test keep the surface and inspect it after the display is gone.
impl Surface for &mut RecordingSurface {
    type Error = SurfaceFault;

    fn start(&mut self) -> Result<(), SurfaceFault> {
        (**self).start()
    }

    fn fill(&mut self, color: BinaryColor) -> Result<(), SurfaceFault> {
        (**self).fill(color)
    }

    fn goto(&mut self, position: Point) {
        (**self).goto(position)
    }

    fn puts(
        &mut self,
        text: &str,
        font: &'static MonoFont<'static>,
        color: BinaryColor,
    ) -> Result<(), SurfaceFault> {
        (**self).puts(text, font, color)
    }

    fn update(&mut self) -> Result<(), SurfaceFault> {
        (**self).update()
    }

    fn stop(&mut self) -> Result<(), SurfaceFault> {
        (**self).stop()
    }
}
