//! Latest-value readings shared between the completion interrupt and the
//! display task.
//!
//! Every reading lives in a single 32-bit word written with one store and
//! read with one load, so a read always returns a value some write stored
//! in full. Nothing here locks or waits. Readings are independent: a reader
//! may see channel A from one batch and channel B from the next.
//!
//! Targets without full 32-bit atomics, Cortex-M0+ among them, fall back to
//! [`SeqCell`](crate::seqcell::SeqCell) words.

use crate::Sample;

#[cfg(target_has_atomic = "32")]
mod word {
    use core::sync::atomic::{AtomicU32, Ordering};

    pub struct Word(AtomicU32);

    impl Word {
        pub const NATIVE: bool = true;

        pub const fn new(value: u32) -> Self {
            Word(AtomicU32::new(value))
        }

        pub fn write(&self, value: u32) {
            self.0.store(value, Ordering::Release);
        }

        pub fn read(&self) -> u32 {
            self.0.load(Ordering::Acquire)
        }
    }
}

#[cfg(not(target_has_atomic = "32"))]
mod word {
    use crate::seqcell::SeqCell;

    pub struct Word(SeqCell<u32>);

    impl Word {
        pub const NATIVE: bool = false;

        pub const fn new(value: u32) -> Self {
            Word(SeqCell::new(value))
        }

        pub fn write(&self, value: u32) {
            self.0.write(value);
        }

        pub fn read(&self) -> u32 {
            self.0.read()
        }
    }
}

use word::Word;

// The slot is the native atomic word exactly when the target has one, and a
// sample plus its update count fit in that word.
const _: () = assert!(Reading::NATIVE_ATOMIC == cfg!(target_has_atomic = "32"));
const _: () = assert!(core::mem::size_of::<Sample>() * 2 <= core::mem::size_of::<u32>());

/// One latest-value slot.
///
/// The low half of the word is the sample, the high half counts writes,
/// so value and count always come from the same write.
pub struct Reading(Word);

impl Reading {
    /// `true` when the slot is a native atomic word, `false` on the
    /// sequence numbered fallback.
    pub const NATIVE_ATOMIC: bool = Word::NATIVE;

    pub const fn new() -> Self {
        Reading(Word::new(0))
    }

    /// Single writer only.
    pub fn write(&self, value: Sample) {
        let updates = u32::from(self.updates().wrapping_add(1));
        self.0.write(updates << 16 | u32::from(value));
    }

    pub fn read(&self) -> Sample {
        self.0.read() as Sample
    }

    /// Writes so far, wrapping.
    pub fn updates(&self) -> u16 {
        (self.0.read() >> 16) as u16
    }
}

impl Default for Reading {
    fn default() -> Self {
        Reading::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadingId {
    ChannelA,
    ChannelB,
    Reference,
}

impl ReadingId {
    pub const ALL: [ReadingId; 3] = [
        ReadingId::ChannelA,
        ReadingId::ChannelB,
        ReadingId::Reference,
    ];
}

/// Position of each reading inside one row of a batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelMap {
    pub channel_a: usize,
    pub channel_b: usize,
    pub reference: usize,
}

impl ChannelMap {
    pub const fn index(&self, id: ReadingId) -> usize {
        match id {
            ReadingId::ChannelA => self.channel_a,
            ReadingId::ChannelB => self.channel_b,
            ReadingId::Reference => self.reference,
        }
    }
}

pub struct Readings {
    channel_a: Reading,
    channel_b: Reading,
    reference: Reading,
    batches: Word,
    faults: Word,
}

impl Readings {
    pub const fn new() -> Self {
        Readings {
            channel_a: Reading::new(),
            channel_b: Reading::new(),
            reference: Reading::new(),
            batches: Word::new(0),
            faults: Word::new(0),
        }
    }

    pub fn get(&self, id: ReadingId) -> &Reading {
        match id {
            ReadingId::ChannelA => &self.channel_a,
            ReadingId::ChannelB => &self.channel_b,
            ReadingId::Reference => &self.reference,
        }
    }

    pub fn read(&self, id: ReadingId) -> Sample {
        self.get(id).read()
    }

    pub fn write(&self, id: ReadingId, value: Sample) {
        self.get(id).write(value);
    }

    /// Derives every reading from the newest row of a completed batch.
    ///
    /// `batch` holds `n` rows; the row width is `batch.len() / n`. Each
    /// reading is written exactly once, then the batch counter moves, so a
    /// reader that observes the new count also observes the new readings.
    /// Malformed batches are ignored.
    pub fn publish(&self, map: &ChannelMap, batch: &[Sample], n: usize) {
        if n == 0 {
            return;
        }
        let width = batch.len() / n;
        let row = match batch.get((n - 1) * width..n * width) {
            Some(row) if width > 0 => row,
            _ => return,
        };
        for id in ReadingId::ALL.iter().copied() {
            if let Some(sample) = row.get(map.index(id)) {
                self.write(id, *sample);
            }
        }
        // single producer, a load/store pair stands in for fetch_add
        self.batches.write(self.batches.read().wrapping_add(1));
    }

    /// Counts a conversion fault reported to the error callback.
    pub fn record_fault(&self) {
        self.faults.write(self.faults.read().wrapping_add(1));
    }

    /// Completed batches published so far.
    pub fn batches(&self) -> u32 {
        self.batches.read()
    }

    pub fn faults(&self) -> u32 {
        self.faults.read()
    }
}

impl Default for Readings {
    fn default() -> Self {
        Readings::new()
    }
}
