//! Conversion groups of the monitor and the callbacks feeding the readings.

use crate::config::{CHANNEL_MAP, LINEAR_CHANNELS, STREAM_CHANNELS};
use crate::error::ConversionError;
use crate::group::{Channel, ChannelId, ConversionGroup, SampleTime, Trigger};
use crate::store::Readings;
use crate::Sample;

/// Latest values shared with the display task.
pub static READINGS: Readings = Readings::new();

const LINEAR_SEQUENCE: [Channel; LINEAR_CHANNELS] =
    [Channel::new(ChannelId::Input(6), SampleTime::Cycles1_5)];

const STREAM_SEQUENCE: [Channel; STREAM_CHANNELS] = [
    Channel::new(ChannelId::Input(6), SampleTime::Cycles39_5),
    Channel::new(ChannelId::Input(7), SampleTime::Cycles39_5),
    Channel::new(ChannelId::Input(10), SampleTime::Cycles39_5),
    Channel::new(ChannelId::Input(11), SampleTime::Cycles39_5),
    Channel::new(ChannelId::Input(10), SampleTime::Cycles39_5),
    Channel::new(ChannelId::Input(11), SampleTime::Cycles39_5),
    Channel::new(ChannelId::VRefInt, SampleTime::Cycles160_5),
    Channel::new(ChannelId::TempSensor, SampleTime::Cycles160_5),
];

/// PA6 sampled once at start-up.
pub static LINEAR_GROUP: ConversionGroup<'static> = ConversionGroup {
    channels: &LINEAR_SEQUENCE,
    trigger: Trigger::OneShot,
    on_complete: None,
    on_error: on_fault,
};

/// PA6, PA7, IN10, IN11, IN10, IN11, VREFINT and the temperature sensor,
/// streamed into the ring.
pub static STREAM_GROUP: ConversionGroup<'static> = ConversionGroup {
    channels: &STREAM_SEQUENCE,
    trigger: Trigger::Continuous,
    on_complete: Some(on_batch),
    on_error: on_fault,
};

/// Completion callback of the streaming group.
pub fn on_batch(batch: &[Sample], n: usize) {
    READINGS.publish(&CHANNEL_MAP, batch, n);
}

/// Error callback of both groups. The engine decides whether the run goes on.
pub fn on_fault(_error: ConversionError) {
    READINGS.record_fault();
}
