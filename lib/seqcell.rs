//! Sequence numbered double buffer for values wider than an atomic word.
//!
//! The writer fills the slot that is not published and then bumps the
//! sequence; the published slot is `seq & 1`. A reader copies the published
//! slot and accepts the copy only if the sequence did not move meanwhile, so
//! a value is never a mix of two writes. Reads never wait on the writer, they
//! retry when a write completed during the copy. Writes are serialized with a
//! critical section, which keeps the cell sound when more than one context
//! writes.

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{fence, AtomicUsize, Ordering};

pub struct SeqCell<T> {
    seq: AtomicUsize,
    slots: [UnsafeCell<T>; 2],
}

// SAFETY: slots are only written inside a critical section and only read
// through volatile copies validated against `seq`.
unsafe impl<T: Copy + Send> Sync for SeqCell<T> {}

impl<T: Copy> SeqCell<T> {
    pub const fn new(value: T) -> Self {
        SeqCell {
            seq: AtomicUsize::new(0),
            slots: [UnsafeCell::new(value), UnsafeCell::new(value)],
        }
    }

    pub fn write(&self, value: T) {
        critical_section::with(|_| {
            let next = self.seq.load(Ordering::Relaxed).wrapping_add(1);
            // The previous publication must land before its old slot is reused.
            fence(Ordering::SeqCst);
            // SAFETY: writers are serialized and readers validate with `seq`.
            unsafe { ptr::write_volatile(self.slots[next & 1].get(), value) };
            self.seq.store(next, Ordering::Release);
        });
    }

    pub fn read(&self) -> T {
        loop {
            let seq = self.seq.load(Ordering::Acquire);
            // SAFETY: the copy is discarded unless `seq` is unchanged, i.e. no
            // writer touched this slot while it was copied.
            let value = unsafe { ptr::read_volatile(self.slots[seq & 1].get()) };
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == seq {
                return value;
            }
            core::hint::spin_loop();
        }
    }

    /// Number of completed writes, wrapping.
    pub fn sequence(&self) -> usize {
        self.seq.load(Ordering::Acquire)
    }
}
