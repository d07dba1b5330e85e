//! Host-side timer simulator
//!
//! [`SimTimer`] implements [`CounterTimer`] in memory so the clock and alarm
//! logic can be driven tick by tick on the host. Register writes latch
//! immediately; [`CounterTimer::wait_for_sync`] only counts calls.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use counter_rtc_hal::{ClockSource, CompareChannel, CounterTimer, SyncRegister, TimerInterrupt};

use crate::alarm::{AlarmHandler, AlarmId};
use crate::{InterruptQueue, Rtc};

const fn irq_index(irq: TimerInterrupt) -> usize {
    match irq {
        TimerInterrupt::Overflow => 0,
        TimerInterrupt::CompareA => 1,
        TimerInterrupt::CompareB => 2,
    }
}

const fn channel_index(channel: CompareChannel) -> usize {
    match channel {
        CompareChannel::A => 0,
        CompareChannel::B => 1,
    }
}

/// In-memory 8-bit counter with two compare channels
///
/// Compare matches and overflows latch their pending flag whether or not the
/// interrupt is enabled, as the hardware does.
#[derive(Debug, Clone)]
pub struct SimTimer {
    counter: u8,
    compare: [u8; 2],
    enabled: [bool; 3],
    pending: [bool; 3],
    running: bool,
    prescaler: u8,
    clock_source: Option<ClockSource>,
    asynchronous: bool,
    prescaler_resets: u32,
    sync_waits: u32,
}

impl SimTimer {
    pub const fn new() -> Self {
        Self {
            counter: 0,
            compare: [0; 2],
            enabled: [false; 3],
            pending: [false; 3],
            running: false,
            prescaler: 0,
            clock_source: None,
            asynchronous: false,
            prescaler_resets: 0,
            sync_waits: 0,
        }
    }

    /// Advance the counter by one tick and raise the enabled interrupts that
    /// are pending.
    ///
    /// Raised interrupts stay pending until [`acknowledge`](Self::acknowledge)
    /// takes them, so a flag cleared in between drops the interrupt.
    pub fn tick(&mut self, queue: &mut InterruptQueue) {
        if !self.running {
            return;
        }
        self.counter = self.counter.wrapping_add(1);

        if self.counter == 0 {
            self.pending[irq_index(TimerInterrupt::Overflow)] = true;
        }
        for channel in [CompareChannel::A, CompareChannel::B] {
            if self.counter == self.compare[channel_index(channel)] {
                self.pending[irq_index(channel.interrupt())] = true;
            }
        }

        for irq in TimerInterrupt::BY_PRIORITY {
            let i = irq_index(irq);
            if self.pending[i] && self.enabled[i] {
                queue.raise(irq);
            }
        }
    }

    /// Vector entry: clear the flag of `irq` and report whether it was still
    /// pending and enabled.
    pub fn acknowledge(&mut self, irq: TimerInterrupt) -> bool {
        let i = irq_index(irq);
        let taken = self.pending[i] && self.enabled[i];
        if taken {
            self.pending[i] = false;
        }
        taken
    }

    pub fn counter_value(&self) -> u8 {
        self.counter
    }

    pub fn compare_value(&self, channel: CompareChannel) -> u8 {
        self.compare[channel_index(channel)]
    }

    pub fn is_enabled(&self, irq: TimerInterrupt) -> bool {
        self.enabled[irq_index(irq)]
    }

    pub fn is_pending(&self, irq: TimerInterrupt) -> bool {
        self.pending[irq_index(irq)]
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Clock-select bits last configured
    pub fn prescaler(&self) -> u8 {
        self.prescaler
    }

    pub fn clock_source(&self) -> Option<ClockSource> {
        self.clock_source
    }

    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub fn prescaler_resets(&self) -> u32 {
        self.prescaler_resets
    }

    pub fn sync_waits(&self) -> u32 {
        self.sync_waits
    }
}

impl Default for SimTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterTimer for SimTimer {
    fn configure(&mut self, prescaler: u8, clock_source: ClockSource, asynchronous: bool) {
        self.prescaler = prescaler;
        self.clock_source = Some(clock_source);
        self.asynchronous = asynchronous;
        self.running = true;
    }

    fn counter(&mut self) -> u8 {
        self.counter
    }

    fn set_counter(&mut self, value: u8) {
        self.counter = value;
    }

    fn set_compare(&mut self, channel: CompareChannel, value: u8) {
        self.compare[channel_index(channel)] = value;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn reset_prescaler(&mut self) {
        self.prescaler_resets += 1;
    }

    fn enable_interrupt(&mut self, irq: TimerInterrupt) {
        self.enabled[irq_index(irq)] = true;
    }

    fn disable_interrupt(&mut self, irq: TimerInterrupt) {
        self.enabled[irq_index(irq)] = false;
    }

    fn clear_pending(&mut self, irq: TimerInterrupt) {
        self.pending[irq_index(irq)] = false;
    }

    fn wait_for_sync(&mut self, _register: SyncRegister) {
        self.sync_waits += 1;
    }
}

/// Dispatch queued interrupts highest priority first, skipping any whose
/// flag was cleared or whose enable was dropped since it was raised.
pub fn deliver(rtc: &Rtc<'_, SimTimer>, queue: &mut InterruptQueue) {
    while let Some(irq) = queue.pop() {
        if rtc.with_timer(|timer| timer.acknowledge(irq)) {
            rtc.dispatch(irq);
        }
    }
}

/// Run the simulated counter for `ticks` ticks, delivering interrupts after
/// each one.
pub fn advance(rtc: &Rtc<'_, SimTimer>, ticks: u32) {
    let mut queue = InterruptQueue::new();
    for _ in 0..ticks {
        rtc.with_timer(|timer| timer.tick(&mut queue));
        deliver(rtc, &mut queue);
    }
}

/// Alarm handler that counts its calls
#[derive(Debug, Default)]
pub struct RecordingHandler {
    calls: AtomicU32,
    late_calls: AtomicU32,
    last_late: AtomicBool,
}

impl RecordingHandler {
    pub const fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            late_calls: AtomicU32::new(0),
            last_late: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn late_calls(&self) -> u32 {
        self.late_calls.load(Ordering::SeqCst)
    }

    /// `late` flag of the most recent call
    pub fn was_late(&self) -> bool {
        self.last_late.load(Ordering::SeqCst)
    }
}

impl AlarmHandler for RecordingHandler {
    fn on_alarm(&self, _alarm: AlarmId, late: bool) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if late {
            self.late_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.last_late.store(late, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_latches_disabled_matches() {
        let mut timer = SimTimer::new();
        let mut queue = InterruptQueue::new();
        timer.configure(0b001, ClockSource::Crystal, true);
        timer.set_compare(CompareChannel::B, 3);

        for _ in 0..3 {
            timer.tick(&mut queue);
        }
        assert!(timer.is_pending(TimerInterrupt::CompareB));
        assert!(queue.is_empty());

        timer.enable_interrupt(TimerInterrupt::CompareB);
        timer.tick(&mut queue);
        assert_eq!(queue.pop(), Some(TimerInterrupt::CompareB));
        assert!(timer.is_pending(TimerInterrupt::CompareB));
        assert!(timer.acknowledge(TimerInterrupt::CompareB));
        assert!(!timer.is_pending(TimerInterrupt::CompareB));
        assert!(!timer.acknowledge(TimerInterrupt::CompareB));
    }

    #[test]
    fn test_cleared_flag_is_not_acknowledged() {
        let mut timer = SimTimer::new();
        let mut queue = InterruptQueue::new();
        timer.configure(0b001, ClockSource::Crystal, true);
        timer.enable_interrupt(TimerInterrupt::Overflow);
        timer.set_counter(255);
        timer.tick(&mut queue);
        assert_eq!(queue.len(), 1);

        timer.clear_pending(TimerInterrupt::Overflow);
        assert!(!timer.acknowledge(TimerInterrupt::Overflow));
    }

    #[test]
    fn test_stopped_timer_holds_count() {
        let mut timer = SimTimer::new();
        let mut queue = InterruptQueue::new();
        timer.tick(&mut queue);
        assert_eq!(timer.counter_value(), 0);

        timer.start();
        timer.set_counter(255);
        timer.enable_interrupt(TimerInterrupt::Overflow);
        timer.tick(&mut queue);
        assert_eq!(timer.counter_value(), 0);
        assert_eq!(queue.pop(), Some(TimerInterrupt::Overflow));
    }
}
