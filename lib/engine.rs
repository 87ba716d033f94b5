//! Acquisition engine.
//!
//! Runs one conversion group at a time on an [`AdcPort`]. The engine owns
//! the buffer of the active run; [`Engine::service`] is called from the
//! completion interrupt and hands the filled rows to the group callback.
//! Callbacks run in interrupt context and must only do bounded work.
//!
//! Fatal faults are retried with [`Engine::reset`] at most
//! [`MAX_FATAL_RESETS`] times in a row; a completed buffer clears the count.

use crate::config::{MAX_FATAL_RESETS, STALL_TIMEOUT_MS};
use crate::error::{AcqError, ConversionError};
use crate::group::{ConversionGroup, Trigger};
use crate::hw::{AdcPort, Event, Transfer};
use crate::Sample;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Idle,
    Converting(Trigger),
    /// Halted by an unrecoverable fault, needs [`Engine::reset`].
    Faulted,
}

/// A start call that was turned down. The buffer goes back to the caller.
#[derive(Debug)]
pub struct Refused<'a> {
    pub reason: AcqError,
    pub buffer: &'a mut [Sample],
}

struct Run<'a> {
    group: &'a ConversionGroup<'a>,
    buffer: &'a mut [Sample],
    depth: usize,
    active: bool,
}

impl<'a> Run<'a> {
    fn transfer(&self) -> Transfer {
        Transfer {
            circular: self.group.trigger == Trigger::Continuous,
            half_transfer: ConversionGroup::has_half_transfer(self.depth),
        }
    }

    // Hands rows `0..rows` to the group callback.
    fn complete(&self, rows: usize) {
        let len = self.group.buffer_len(rows);
        if let (Some(on_complete), Some(batch)) = (self.group.on_complete, self.buffer.get(..len))
        {
            on_complete(batch, rows);
        }
    }

    // Reports `error` to the group and tries to clear it. A run that cannot
    // go on is halted.
    fn fault<P: AdcPort>(&mut self, port: &mut P, error: ConversionError) -> bool {
        (self.group.on_error)(error);
        if error.is_recoverable() && port.recover(error).is_ok() {
            warn!("conversion fault cleared: {}", error);
            return true;
        }
        port.halt();
        self.active = false;
        error!("conversion halted: {}", error);
        false
    }
}

pub struct Engine<'a, P> {
    port: P,
    run: Option<Run<'a>>,
    faulted: bool,
    // fatal faults since the last full buffer
    fatal_streak: u32,
    // time since the last completion of the active run
    idle_ms: u32,
}

impl<'a, P> Engine<'a, P>
where
    P: AdcPort,
{
    pub fn new(port: P) -> Self {
        Engine {
            port,
            run: None,
            faulted: false,
            fatal_streak: 0,
            idle_ms: 0,
        }
    }

    /// Fills `buffer` once with `depth` rows of `group`.
    ///
    /// Returns as soon as the conversion is queued. The callback gets the
    /// midpoint (when `depth` is even) and the full buffer, then the run
    /// stops by itself.
    pub fn start(
        &mut self,
        group: &'a ConversionGroup<'a>,
        buffer: &'a mut [Sample],
        depth: usize,
    ) -> Result<(), Refused<'a>> {
        self.begin(group, buffer, depth, Trigger::OneShot)
    }

    /// Keeps refilling `buffer` as a ring until [`Engine::stop`].
    ///
    /// At the midpoint the callback receives the first half with
    /// `n = depth / 2`, at the end the whole buffer with `n = depth`.
    pub fn start_continuous(
        &mut self,
        group: &'a ConversionGroup<'a>,
        buffer: &'a mut [Sample],
        depth: usize,
    ) -> Result<(), Refused<'a>> {
        self.begin(group, buffer, depth, Trigger::Continuous)
    }

    /// Halts the current run and hands its buffer back.
    ///
    /// Calling it again, or without a run, returns `None` and leaves the
    /// hardware alone.
    pub fn stop(&mut self) -> Option<&'a mut [Sample]> {
        let run = self.run.take()?;
        if run.active {
            self.port.halt();
            debug!("run stopped");
        }
        Some(run.buffer)
    }

    /// Completion interrupt entry point.
    ///
    /// Transient faults are reported to the group and cleared, the run keeps
    /// converting. Unrecoverable faults halt the run and return
    /// [`AcqError::Fatal`].
    pub fn service(&mut self) -> Result<(), AcqError> {
        let Engine {
            port,
            run,
            faulted,
            fatal_streak,
            idle_ms,
        } = self;
        let run = match run {
            Some(run) if run.active => run,
            _ => return Ok(()),
        };
        while let Some(event) = port.poll(&mut run.buffer[..]) {
            match event {
                Event::HalfTransfer => {
                    *idle_ms = 0;
                    if ConversionGroup::has_half_transfer(run.depth) {
                        run.complete(run.depth / 2);
                    }
                }
                Event::TransferComplete => {
                    *idle_ms = 0;
                    *fatal_streak = 0;
                    run.complete(run.depth);
                    if run.group.trigger == Trigger::OneShot {
                        port.halt();
                        run.active = false;
                        return Ok(());
                    }
                }
                Event::Fault(error) => {
                    if !run.fault(port, error) {
                        *faulted = true;
                        *fatal_streak = fatal_streak.saturating_add(1);
                        return Err(AcqError::Fatal);
                    }
                }
            }
        }
        Ok(())
    }

    /// Advances the stall clock of the active run by `elapsed_ms`.
    ///
    /// Called from a periodic task. A run without completion for
    /// [`STALL_TIMEOUT_MS`] gets a [`ConversionError::Timeout`], handled like
    /// a fault reported by the hardware.
    pub fn check_stall(&mut self, elapsed_ms: u32) -> Result<(), AcqError> {
        let Engine {
            port,
            run,
            faulted,
            fatal_streak,
            idle_ms,
        } = self;
        let run = match run {
            Some(run) if run.active => run,
            _ => return Ok(()),
        };
        *idle_ms = idle_ms.saturating_add(elapsed_ms);
        if *idle_ms < STALL_TIMEOUT_MS {
            return Ok(());
        }
        *idle_ms = 0;
        if run.fault(port, ConversionError::Timeout) {
            return Ok(());
        }
        *faulted = true;
        *fatal_streak = fatal_streak.saturating_add(1);
        Err(AcqError::Fatal)
    }

    /// Re-initializes the peripheral after a fatal fault.
    ///
    /// A continuous run that was halted is armed again on the same buffer, a
    /// one-shot run is dropped. Refused without touching the hardware once
    /// [`MAX_FATAL_RESETS`] fatal faults came in a row.
    pub fn reset(&mut self) -> Result<(), AcqError> {
        if self.fatal_streak > MAX_FATAL_RESETS {
            error!("no reset after {} fatal faults", self.fatal_streak);
            return Err(AcqError::Fatal);
        }
        self.port.halt();
        if let Err(error) = self.port.reset() {
            error!("peripheral reset failed: {}", error);
            return Err(self.fatal());
        }
        self.faulted = false;
        self.idle_ms = 0;
        if let Some(run) = self.run.as_mut() {
            if run.group.trigger == Trigger::Continuous {
                let transfer = run.transfer();
                if let Err(error) = self.port.arm(run.group, &mut run.buffer[..], transfer) {
                    error!("re-arm failed: {}", error);
                    return Err(self.fatal());
                }
                run.active = true;
            } else {
                run.active = false;
            }
        }
        info!("acquisition reset");
        Ok(())
    }

    /// Fatal faults since the last full buffer.
    pub fn fatal_streak(&self) -> u32 {
        self.fatal_streak
    }

    pub fn state(&self) -> State {
        if self.faulted {
            return State::Faulted;
        }
        match &self.run {
            Some(run) if run.active => State::Converting(run.group.trigger),
            _ => State::Idle,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    fn begin(
        &mut self,
        group: &'a ConversionGroup<'a>,
        buffer: &'a mut [Sample],
        depth: usize,
        trigger: Trigger,
    ) -> Result<(), Refused<'a>> {
        if let Err(reason) = self.check(group, buffer.len(), depth, trigger) {
            warn!("start refused: {}", reason);
            return Err(Refused { reason, buffer });
        }
        let mut run = Run {
            group,
            buffer,
            depth,
            active: false,
        };
        let transfer = run.transfer();
        if let Err(error) = self.port.arm(group, &mut run.buffer[..], transfer) {
            (group.on_error)(error);
            self.port.halt();
            error!("arm failed: {}", error);
            return Err(Refused {
                reason: self.fatal(),
                buffer: run.buffer,
            });
        }
        run.active = true;
        self.idle_ms = 0;
        debug!("run started, {} rows", depth);
        // a finished run still held here is released
        self.run = Some(run);
        Ok(())
    }

    fn fatal(&mut self) -> AcqError {
        self.faulted = true;
        self.fatal_streak = self.fatal_streak.saturating_add(1);
        AcqError::Fatal
    }

    fn check(
        &self,
        group: &ConversionGroup<'_>,
        len: usize,
        depth: usize,
        trigger: Trigger,
    ) -> Result<(), AcqError> {
        if self.faulted {
            return Err(AcqError::Fatal);
        }
        if self.run.as_ref().map_or(false, |run| run.active) {
            return Err(AcqError::Busy);
        }
        if group.trigger != trigger {
            return Err(AcqError::TriggerMode);
        }
        group.validate()?;
        if depth == 0 || len != group.buffer_len(depth) {
            return Err(AcqError::BufferLength);
        }
        Ok(())
    }
}
