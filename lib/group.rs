//! Conversion group descriptors.
//!
//! A group is the static part of a sampling run: which channels are sampled,
//! in what order, for how long and what is called back when the buffer
//! fills. Groups are meant to live in `const`/`static` items; the buffer and
//! its depth are bound when the run is started.

use crate::error::{AcqError, ConversionError};
use crate::Sample;

/// Length of the hardware sequencer.
pub const MAX_CHANNELS: usize = 8;

/// Called from the completion interrupt with the filled rows and their count.
pub type CompleteFn = fn(batch: &[Sample], n: usize);
/// Called from the completion interrupt on any conversion fault.
pub type ErrorFn = fn(error: ConversionError);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    Input(u8),
    TempSensor,
    VRefInt,
}

impl ChannelId {
    /// Channel number as selected in the sequencer.
    pub const fn number(self) -> u8 {
        match self {
            ChannelId::Input(n) => n,
            ChannelId::TempSensor => 12,
            ChannelId::VRefInt => 13,
        }
    }
}

/// Sampling time in ADC clock cycles.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleTime {
    Cycles1_5 = 0b000,
    Cycles3_5 = 0b001,
    Cycles7_5 = 0b010,
    Cycles12_5 = 0b011,
    Cycles19_5 = 0b100,
    Cycles39_5 = 0b101,
    Cycles79_5 = 0b110,
    Cycles160_5 = 0b111,
}

impl SampleTime {
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub sample_time: SampleTime,
}

impl Channel {
    pub const fn new(id: ChannelId, sample_time: SampleTime) -> Self {
        Channel { id, sample_time }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// Fill the buffer once and stop.
    OneShot,
    /// Keep refilling the buffer as a ring.
    Continuous,
}

/// The two sample time classes the sequencer can hold at once.
///
/// Channels pick one of them, `secondary` is `None` when all channels share
/// the same time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SampleClasses {
    pub primary: SampleTime,
    pub secondary: Option<SampleTime>,
}

impl SampleClasses {
    /// Whether `time` selects the secondary class.
    pub fn is_secondary(&self, time: SampleTime) -> bool {
        self.secondary == Some(time)
    }
}

pub struct ConversionGroup<'a> {
    pub channels: &'a [Channel],
    pub trigger: Trigger,
    pub on_complete: Option<CompleteFn>,
    pub on_error: ErrorFn,
}

impl<'a> ConversionGroup<'a> {
    pub const fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples a buffer of `depth` rows holds.
    pub const fn buffer_len(&self, depth: usize) -> usize {
        self.channels.len() * depth
    }

    /// Half transfer is reported only when the midpoint falls on a row boundary.
    pub const fn has_half_transfer(depth: usize) -> bool {
        depth >= 2 && depth % 2 == 0
    }

    pub fn validate(&self) -> Result<(), AcqError> {
        if self.channels.is_empty() || self.channels.len() > MAX_CHANNELS {
            return Err(AcqError::InvalidGroup);
        }
        if self
            .channels
            .iter()
            .any(|channel| channel.id.number() > ChannelId::VRefInt.number())
        {
            return Err(AcqError::InvalidGroup);
        }
        self.sample_classes().map(|_| ())
    }

    pub fn sample_classes(&self) -> Result<SampleClasses, AcqError> {
        let mut channels = self.channels.iter();
        let primary = channels
            .next()
            .map(|channel| channel.sample_time)
            .ok_or(AcqError::InvalidGroup)?;
        let mut secondary = None;
        for channel in channels {
            let time = channel.sample_time;
            if time == primary || secondary == Some(time) {
                continue;
            }
            if secondary.is_some() {
                return Err(AcqError::InvalidGroup);
            }
            secondary = Some(time);
        }
        Ok(SampleClasses { primary, secondary })
    }
}
