#![cfg_attr(not(test), no_std)]

#[cfg(feature = "hardware")]
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "hardware")]
use defmt_rtt as _; // global logger
#[cfg(feature = "hardware")]
use panic_probe as _;

#[macro_use]
mod fmt;

pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod group;
pub mod hw;
pub mod sampler;
pub mod seqcell;
pub mod store;

/// Right aligned 12-bit conversion result.
pub type Sample = u16;

pub type LinearBuffer = [Sample; config::LINEAR_BUFFER_LEN];
pub type StreamBuffer = [Sample; config::STREAM_BUFFER_LEN];

#[cfg(feature = "hardware")]
static UPTIME_MS: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "hardware")]
defmt::timestamp!("{=u32:ms}", UPTIME_MS.load(Ordering::Relaxed));

/// Moves the log timestamp forward, called from the blink task.
#[cfg(feature = "hardware")]
pub fn advance_uptime(ms: u32) {
    // single writer
    UPTIME_MS.store(
        UPTIME_MS.load(Ordering::Relaxed).wrapping_add(ms),
        Ordering::Relaxed,
    );
}
