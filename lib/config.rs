//! Compile-time configuration.

use crate::store::ChannelMap;

/// Channels of the one-shot group.
pub const LINEAR_CHANNELS: usize = 1;
/// Rows of the one-shot group.
pub const LINEAR_DEPTH: usize = 8;
pub const LINEAR_BUFFER_LEN: usize = LINEAR_CHANNELS * LINEAR_DEPTH;

/// Channels of the streaming group.
pub const STREAM_CHANNELS: usize = 8;
/// Rows of the streaming ring, even so the midpoint is reported.
pub const STREAM_DEPTH: usize = 16;
pub const STREAM_BUFFER_LEN: usize = STREAM_CHANNELS * STREAM_DEPTH;

/// Sequences per second while streaming.
pub const SAMPLE_RATE_HZ: u32 = 1_000;

/// Time without a completion after which an active run counts as stalled.
/// A streaming half buffer takes 8 ms.
pub const STALL_TIMEOUT_MS: u32 = 100;

/// Resets allowed for back to back fatal faults. A completion in between
/// starts the count again.
pub const MAX_FATAL_RESETS: u32 = 3;

/// Where each reading sits in a streaming row.
pub const CHANNEL_MAP: ChannelMap = ChannelMap {
    channel_a: 0,
    channel_b: 1,
    reference: 6,
};

/// 12-bit converter.
pub const FULL_SCALE: u16 = 4095;
/// Volts are padded to the digits of this reference, `1.65` at 3.3 V and
/// ` 1.65` from 10 V up.
pub const REFERENCE_MV: u32 = 3300;

pub const REFRESH_INTERVAL_MS: u32 = 100;
pub const BLINK_INTERVAL_MS: u32 = 50;
/// Analog inputs settle after pin set-up.
pub const SETTLE_MS: u32 = 10;
/// Pause between the one-shot run and streaming.
pub const LINEAR_SETTLE_MS: u32 = 100;

/// 7-bit address of the panel (0x78 on the wire).
pub const OLED_ADDRESS: u8 = 0x3c;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusMode {
    Standard,
    Fast,
}

/// SCL low/high ratio in fast mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyCycle {
    Ratio2to1,
    Ratio16to9,
}

/// Display bus settings, handed untouched to the panel transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    pub mode: BusMode,
    pub clock_hz: u32,
    pub duty: DutyCycle,
}

pub const DISPLAY_BUS: BusConfig = BusConfig {
    mode: BusMode::Fast,
    clock_hz: 400_000,
    duty: DutyCycle::Ratio2to1,
};
