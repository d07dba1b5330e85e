//! Interrupt entry points
//!
//! Board code forwards the timer vectors to [`Rtc::on_overflow`] and
//! [`Rtc::on_compare`]. Where the vectors are not taken directly (polled
//! flags, a simulator), interrupts are collected in an [`InterruptQueue`]
//! and drained by [`Rtc::service`] in hardware priority order.

use counter_rtc_hal::{CompareChannel, CounterTimer, TimerInterrupt};
use heapless::binary_heap::{BinaryHeap, Max};

use super::Rtc;
use crate::alarm::{AlarmId, AlarmSlot, Handler};
use crate::time::Time;

/// Raised timer interrupts, popped highest priority first
///
/// Like hardware pending flags, raising an interrupt that is already pending
/// has no further effect.
#[derive(Debug)]
pub struct InterruptQueue {
    pending: BinaryHeap<TimerInterrupt, Max, 3>,
}

impl InterruptQueue {
    pub const fn new() -> Self {
        Self {
            pending: BinaryHeap::new(),
        }
    }

    pub fn raise(&mut self, irq: TimerInterrupt) {
        if self.pending.iter().any(|pending| *pending == irq) {
            return;
        }
        // Holds one entry per source, so this cannot overflow
        let _ = self.pending.push(irq);
    }

    pub fn pop(&mut self) -> Option<TimerInterrupt> {
        self.pending.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for InterruptQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: CounterTimer> Rtc<'a, T> {
    /// Overflow interrupt: commit one more block, re-arm for it and deliver
    /// the alarms it makes due.
    ///
    /// Alarms whose compare point is the block boundary itself fire on time.
    /// Active alarms whose block has already passed missed their compare
    /// match and fire late.
    pub fn on_overflow(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let interval = inner.rate.overflow_interval();
            inner.committed += interval;
            inner.schedule_block(0);
        });

        // Each alarm is re-checked as it is taken: an earlier callback may
        // have rescheduled or cleared it.
        for alarm in AlarmId::ALL {
            let handler = self.take_if(alarm, |slot, committed| {
                slot.block.start == committed && slot.block.compare == 0
            });
            Self::call(handler, alarm, false);
        }
        for alarm in AlarmId::ALL {
            let handler = self.take_if(alarm, |slot, committed| slot.block.start < committed);
            Self::call(handler, alarm, true);
        }
    }

    fn take_if(
        &self,
        alarm: AlarmId,
        due: impl FnOnce(&AlarmSlot<'a>, Time) -> bool,
    ) -> Option<Handler<'a>> {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().take_if(alarm, due))
    }

    /// Compare-match interrupt for `channel`
    ///
    /// A match on a channel that is not armed is ignored.
    pub fn on_compare(&self, channel: CompareChannel) {
        let alarm = AlarmId::from(channel);
        let handler =
            critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().take_due(alarm, true));
        if handler.is_none() {
            trace!("Compare {} ignored", alarm.index());
        }
        Self::call(handler, alarm, false);
    }

    /// Route one timer interrupt to its handler
    pub fn dispatch(&self, irq: TimerInterrupt) {
        match irq {
            TimerInterrupt::Overflow => self.on_overflow(),
            TimerInterrupt::CompareA => self.on_compare(CompareChannel::A),
            TimerInterrupt::CompareB => self.on_compare(CompareChannel::B),
        }
    }

    /// Dispatch every queued interrupt, highest priority first
    pub fn service(&self, queue: &mut InterruptQueue) {
        while let Some(irq) = queue.pop() {
            self.dispatch(irq);
        }
    }
}
