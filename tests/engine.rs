//! Acquisition engine tests.
//!
//! Covers run start/stop, completion callbacks at the midpoint and the end
//! of the buffer, refusals, fault handling, reset limits and stall
//! detection.

#[allow(clippy::duplicate_mod)]
#[path = "fixtures/mod.rs"]
mod fixtures;

use fixtures::{take_batches, take_errors, SimPort, INVALID, ONE_SHOT, STREAM};
use lib::config::{MAX_FATAL_RESETS, STALL_TIMEOUT_MS};
use lib::engine::{Engine, State};
use lib::error::{AcqError, ConversionError};
use lib::group::Trigger;
use lib::hw::{Event, Transfer};

// ============================================================================
// Continuous runs
// ============================================================================

#[test]
fn continuous_run_reports_both_halves() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
    assert_eq!(
        engine.port().armed,
        vec![Transfer {
            circular: true,
            half_transfer: true,
        }]
    );

    engine
        .port_mut()
        .raise_with(0, &[1, 2, 3, 4], Event::HalfTransfer);
    engine.service().unwrap();
    assert_eq!(take_batches(), vec![(vec![1, 2, 3, 4], 2)]);

    engine
        .port_mut()
        .raise_with(4, &[5, 6, 7, 8], Event::TransferComplete);
    engine.service().unwrap();
    assert_eq!(take_batches(), vec![(vec![1, 2, 3, 4, 5, 6, 7, 8], 4)]);

    // the ring keeps going
    engine
        .port_mut()
        .raise_with(0, &[9, 10, 11, 12], Event::HalfTransfer);
    engine.service().unwrap();
    assert_eq!(take_batches(), vec![(vec![9, 10, 11, 12], 2)]);
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
    assert_eq!(engine.port().halts, 0);
}

#[test]
fn odd_depth_only_reports_full_buffer() {
    let mut buffer = [0u16; 6];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 3).unwrap();
    assert!(!engine.port().armed[0].half_transfer);

    engine.port_mut().raise(Event::HalfTransfer);
    engine
        .port_mut()
        .raise_with(0, &[1, 2, 3, 4, 5, 6], Event::TransferComplete);
    engine.service().unwrap();
    assert_eq!(take_batches(), vec![(vec![1, 2, 3, 4, 5, 6], 3)]);
}

#[test]
fn one_callback_per_event() {
    let mut buffer = [0u16; 32];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 16).unwrap();
    for _ in 0..5 {
        engine.port_mut().raise(Event::HalfTransfer);
        engine.port_mut().raise(Event::TransferComplete);
    }
    engine.service().unwrap();

    let rows: Vec<usize> = take_batches().iter().map(|(_, n)| *n).collect();
    assert_eq!(rows, [8, 16].repeat(5));
    assert_eq!(engine.port().pending(), 0);
}

#[test]
fn service_without_run_does_nothing() {
    let mut engine = Engine::new(SimPort::new());
    engine.port_mut().raise(Event::TransferComplete);
    assert_eq!(engine.service(), Ok(()));
    assert!(take_batches().is_empty());
    assert_eq!(engine.port().pending(), 1);
}

// ============================================================================
// One-shot runs
// ============================================================================

#[test]
fn one_shot_run_stops_after_full_buffer() {
    let mut buffer = [0u16; 4];
    let mut engine = Engine::new(SimPort::new());
    engine.start(&ONE_SHOT, &mut buffer, 2).unwrap();
    assert_eq!(engine.state(), State::Converting(Trigger::OneShot));
    assert!(!engine.port().armed[0].circular);

    engine
        .port_mut()
        .raise_with(0, &[7, 8, 9, 10], Event::TransferComplete);
    engine.service().unwrap();
    assert_eq!(take_batches(), vec![(vec![7, 8, 9, 10], 2)]);
    assert_eq!(engine.state(), State::Idle);
    assert_eq!(engine.port().halts, 1);

    // nothing left to halt, the filled buffer comes back
    let buffer = engine.stop().unwrap();
    assert_eq!(buffer, [7, 8, 9, 10]);
    assert_eq!(engine.port().halts, 1);
}

#[test]
fn finished_one_shot_allows_new_run() {
    let mut first = [0u16; 4];
    let mut second = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start(&ONE_SHOT, &mut first, 2).unwrap();
    engine.port_mut().raise(Event::TransferComplete);
    engine.service().unwrap();
    take_batches();

    engine.start_continuous(&STREAM, &mut second, 4).unwrap();
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
}

// ============================================================================
// Refusals
// ============================================================================

#[test]
fn second_start_is_busy() {
    let mut buffer = [0u16; 8];
    let mut other = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    let refused = engine
        .start_continuous(&STREAM, &mut other, 4)
        .unwrap_err();
    assert_eq!(refused.reason, AcqError::Busy);
    assert_eq!(refused.buffer.len(), 8);
    assert_eq!(engine.port().armed.len(), 1);
}

#[test]
fn stop_then_start_again() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();
    let buffer = engine.stop().unwrap();
    assert_eq!(engine.state(), State::Idle);
    assert_eq!(engine.port().halts, 1);

    engine.start_continuous(&STREAM, buffer, 4).unwrap();
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
    assert_eq!(engine.port().armed.len(), 2);
}

#[test]
fn stop_is_idempotent() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    assert!(engine.stop().is_none());

    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();
    assert!(engine.stop().is_some());
    assert!(engine.stop().is_none());
    assert_eq!(engine.port().halts, 1);
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn start_checks_trigger_mode() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    let refused = engine.start(&STREAM, &mut buffer, 4).unwrap_err();
    assert_eq!(refused.reason, AcqError::TriggerMode);

    let refused = engine
        .start_continuous(&ONE_SHOT, refused.buffer, 4)
        .unwrap_err();
    assert_eq!(refused.reason, AcqError::TriggerMode);
    assert!(engine.port().armed.is_empty());
}

#[test]
fn start_checks_buffer_length() {
    let mut buffer = [0u16; 7];
    let mut empty: [u16; 0] = [];
    let mut engine = Engine::new(SimPort::new());
    let refused = engine
        .start_continuous(&STREAM, &mut buffer, 4)
        .unwrap_err();
    assert_eq!(refused.reason, AcqError::BufferLength);

    let refused = engine.start_continuous(&STREAM, &mut empty, 0).unwrap_err();
    assert_eq!(refused.reason, AcqError::BufferLength);
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn start_checks_group() {
    let mut buffer = [0u16; 6];
    let mut engine = Engine::new(SimPort::new());
    let refused = engine
        .start_continuous(&INVALID, &mut buffer, 2)
        .unwrap_err();
    assert_eq!(refused.reason, AcqError::InvalidGroup);
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn overrun_is_reported_and_cleared() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    engine
        .port_mut()
        .raise(Event::Fault(ConversionError::Overrun));
    engine
        .port_mut()
        .raise_with(4, &[5, 6, 7, 8], Event::TransferComplete);
    assert_eq!(engine.service(), Ok(()));

    assert_eq!(take_errors(), vec![ConversionError::Overrun]);
    assert_eq!(engine.port().recovered, vec![ConversionError::Overrun]);
    assert_eq!(take_batches().len(), 1);
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
}

#[test]
fn failed_recovery_halts_run() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();
    engine.port_mut().fail_recover = true;

    engine
        .port_mut()
        .raise(Event::Fault(ConversionError::Timeout));
    assert_eq!(engine.service(), Err(AcqError::Fatal));
    assert_eq!(take_errors(), vec![ConversionError::Timeout]);
    assert_eq!(engine.state(), State::Faulted);
}

#[test]
fn dma_fault_needs_reset() {
    let mut buffer = [0u16; 8];
    let mut other = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    engine
        .port_mut()
        .raise(Event::Fault(ConversionError::DmaTransfer));
    assert_eq!(engine.service(), Err(AcqError::Fatal));
    assert_eq!(take_errors(), vec![ConversionError::DmaTransfer]);
    assert!(take_batches().is_empty());
    assert!(engine.port().recovered.is_empty());
    assert_eq!(engine.state(), State::Faulted);
    assert_eq!(engine.port().halts, 1);

    let refused = engine
        .start_continuous(&STREAM, &mut other, 4)
        .unwrap_err();
    assert_eq!(refused.reason, AcqError::Fatal);

    // the halted ring is armed again on its own buffer
    engine.reset().unwrap();
    assert_eq!(engine.port().resets, 1);
    assert_eq!(engine.port().armed.len(), 2);
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));

    engine.port_mut().raise(Event::TransferComplete);
    engine.service().unwrap();
    assert_eq!(take_batches().len(), 1);
}

#[test]
fn failed_reset_stays_faulted() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();
    engine
        .port_mut()
        .raise(Event::Fault(ConversionError::DmaTransfer));
    let _ = engine.service();
    take_errors();

    engine.port_mut().fail_reset = true;
    assert_eq!(engine.reset(), Err(AcqError::Fatal));
    assert_eq!(engine.state(), State::Faulted);
}

#[test]
fn arm_failure_is_reported() {
    let mut buffer = [0u16; 8];
    let mut port = SimPort::new();
    port.fail_arm = Some(ConversionError::Timeout);
    let mut engine = Engine::new(port);

    let refused = engine
        .start_continuous(&STREAM, &mut buffer, 4)
        .unwrap_err();
    assert_eq!(refused.reason, AcqError::Fatal);
    assert_eq!(refused.buffer.len(), 8);
    assert_eq!(take_errors(), vec![ConversionError::Timeout]);
    assert_eq!(engine.state(), State::Faulted);

    engine.port_mut().fail_arm = None;
    engine.reset().unwrap();
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn reset_drops_active_one_shot_run() {
    let mut buffer = [0u16; 4];
    let mut other = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start(&ONE_SHOT, &mut buffer, 2).unwrap();

    engine.reset().unwrap();
    assert_eq!(engine.state(), State::Idle);
    assert_eq!(engine.port().armed.len(), 1);

    engine.start_continuous(&STREAM, &mut other, 4).unwrap();
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
}

// ============================================================================
// Reset limit
// ============================================================================

fn fail_dma(engine: &mut Engine<'_, SimPort>) -> Result<(), AcqError> {
    engine
        .port_mut()
        .raise(Event::Fault(ConversionError::DmaTransfer));
    let result = engine.service();
    take_errors();
    result
}

#[test]
fn resets_stop_after_repeated_fatal_faults() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    for streak in 1..=MAX_FATAL_RESETS {
        assert_eq!(fail_dma(&mut engine), Err(AcqError::Fatal));
        assert_eq!(engine.fatal_streak(), streak);
        engine.reset().unwrap();
    }
    assert_eq!(engine.port().resets, MAX_FATAL_RESETS as usize);

    assert_eq!(fail_dma(&mut engine), Err(AcqError::Fatal));
    let armed = engine.port().armed.len();
    assert_eq!(engine.reset(), Err(AcqError::Fatal));
    assert_eq!(engine.state(), State::Faulted);
    assert_eq!(engine.port().resets, MAX_FATAL_RESETS as usize);
    assert_eq!(engine.port().armed.len(), armed);
}

#[test]
fn full_buffer_clears_fatal_streak() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    for _ in 0..MAX_FATAL_RESETS {
        fail_dma(&mut engine).unwrap_err();
        engine.reset().unwrap();
    }
    engine.port_mut().raise(Event::TransferComplete);
    engine.service().unwrap();
    take_batches();
    assert_eq!(engine.fatal_streak(), 0);

    fail_dma(&mut engine).unwrap_err();
    engine.reset().unwrap();
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
}

#[test]
fn failed_peripheral_reset_counts_toward_limit() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();
    fail_dma(&mut engine).unwrap_err();

    engine.port_mut().fail_reset = true;
    for _ in 0..MAX_FATAL_RESETS {
        assert_eq!(engine.reset(), Err(AcqError::Fatal));
    }
    let attempts = engine.port().halts;
    assert_eq!(engine.reset(), Err(AcqError::Fatal));
    assert_eq!(engine.port().halts, attempts);
}

// ============================================================================
// Stall detection
// ============================================================================

#[test]
fn stall_check_without_run_does_nothing() {
    let mut engine = Engine::new(SimPort::new());
    assert_eq!(engine.check_stall(STALL_TIMEOUT_MS * 2), Ok(()));
    assert!(take_errors().is_empty());
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn quiet_run_below_timeout_is_left_alone() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    assert_eq!(engine.check_stall(STALL_TIMEOUT_MS - 1), Ok(()));
    assert!(take_errors().is_empty());
    assert!(engine.port().recovered.is_empty());
}

#[test]
fn stalled_run_times_out_and_recovers() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    assert_eq!(engine.check_stall(STALL_TIMEOUT_MS / 2), Ok(()));
    assert_eq!(engine.check_stall(STALL_TIMEOUT_MS / 2), Ok(()));
    assert_eq!(take_errors(), vec![ConversionError::Timeout]);
    assert_eq!(engine.port().recovered, vec![ConversionError::Timeout]);
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));

    // the recovered run delivers again
    engine
        .port_mut()
        .raise_with(4, &[5, 6, 7, 8], Event::TransferComplete);
    engine.service().unwrap();
    assert_eq!(take_batches(), vec![(vec![0, 0, 0, 0, 5, 6, 7, 8], 4)]);

    // the clock starts over after a timeout
    assert_eq!(engine.check_stall(STALL_TIMEOUT_MS - 1), Ok(()));
    assert!(take_errors().is_empty());
}

#[test]
fn completions_restart_stall_clock() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();

    for event in [Event::HalfTransfer, Event::TransferComplete] {
        engine.check_stall(STALL_TIMEOUT_MS - 1).unwrap();
        engine.port_mut().raise(event);
        engine.service().unwrap();
    }
    engine.check_stall(STALL_TIMEOUT_MS - 1).unwrap();
    take_batches();
    assert!(take_errors().is_empty());
}

#[test]
fn unrecoverable_stall_faults_run() {
    let mut buffer = [0u16; 8];
    let mut engine = Engine::new(SimPort::new());
    engine.start_continuous(&STREAM, &mut buffer, 4).unwrap();
    engine.port_mut().fail_recover = true;

    assert_eq!(engine.check_stall(STALL_TIMEOUT_MS), Err(AcqError::Fatal));
    assert_eq!(take_errors(), vec![ConversionError::Timeout]);
    assert_eq!(engine.state(), State::Faulted);
    assert_eq!(engine.fatal_streak(), 1);

    engine.port_mut().fail_recover = false;
    engine.reset().unwrap();
    assert_eq!(engine.state(), State::Converting(Trigger::Continuous));
}
