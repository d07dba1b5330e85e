//! Alarm scheduling against the overflow blocks
//!
//! An alarm is *armed* (compare interrupt enabled) only while the counter is
//! inside the block that contains its target and before its compare tick.
//! Every other active alarm waits for the overflow handler to re-evaluate
//! it, and is delivered late by the overflow sweep once its block has gone
//! by without a match.

use counter_rtc_hal::CounterTimer;

use super::{Inner, Rtc};
use crate::alarm::{AlarmId, AlarmInfo, AlarmSlot, Handler};
use crate::error::RtcError;
use crate::time::Time;

impl<'a, T: CounterTimer> Inner<'a, T> {
    /// Load the compare channel and enable its interrupt.
    ///
    /// A match latched while the channel was idle is discarded first.
    pub(super) fn arm(&mut self, alarm: AlarmId) {
        let channel = alarm.channel();
        let compare = self.alarms[alarm.index()].block.compare;

        self.timer.wait_for_sync(channel.sync_register());
        self.timer.set_compare(channel, compare);
        self.timer.clear_pending(channel.interrupt());
        self.timer.enable_interrupt(channel.interrupt());
        self.alarms[alarm.index()].armed = true;
        trace!("Alarm {} armed at count {}", alarm.index(), compare);
    }

    pub(super) fn disarm(&mut self, alarm: AlarmId) {
        let irq = alarm.channel().interrupt();
        self.timer.disable_interrupt(irq);
        self.timer.clear_pending(irq);
        self.alarms[alarm.index()].armed = false;
    }

    /// Whether `slot` is due later in the running block, given the counter
    fn due_this_block(&self, slot: &AlarmSlot<'_>, count: u8) -> bool {
        slot.block.start == self.committed && slot.block.compare > count
    }

    /// Arm the alarms that fall later in the current block and disarm the
    /// rest.
    pub(super) fn schedule_block(&mut self, count: u8) {
        for alarm in AlarmId::ALL {
            let slot = self.alarms[alarm.index()];
            if slot.active && self.due_this_block(&slot, count) {
                self.arm(alarm);
            } else if slot.armed {
                self.disarm(alarm);
            }
        }
    }

    /// Deactivate an alarm and hand back its callback.
    ///
    /// Returns `None` if the alarm already fired or was cancelled, or if
    /// `only_armed` is set and its compare channel was not loaded.
    pub(super) fn take_due(&mut self, alarm: AlarmId, only_armed: bool) -> Option<Handler<'a>> {
        let slot = self.alarms[alarm.index()];
        if only_armed && !slot.armed {
            return None;
        }
        self.disarm(alarm);
        if !slot.active {
            return None;
        }
        self.alarms[alarm.index()].active = false;
        slot.handler
    }

    /// Deactivate an active alarm and hand back its callback if `due` holds
    /// for its slot and the committed time at this moment.
    pub(super) fn take_if(
        &mut self,
        alarm: AlarmId,
        due: impl FnOnce(&AlarmSlot<'a>, Time) -> bool,
    ) -> Option<Handler<'a>> {
        let slot = self.alarms[alarm.index()];
        if !slot.active || !due(&slot, self.committed) {
            return None;
        }
        self.disarm(alarm);
        self.alarms[alarm.index()].active = false;
        slot.handler
    }
}

impl<'a, T: CounterTimer> Rtc<'a, T> {
    /// Whether alarm `n` is waiting to fire; `false` for an unknown alarm
    pub fn is_alarm_active(&self, n: u8) -> bool {
        let Ok(alarm) = AlarmId::try_from(n) else {
            return false;
        };
        critical_section::with(|cs| self.inner.borrow(cs).borrow().alarms[alarm.index()].active)
    }

    /// Whether alarm `n` is still waiting although its target has been
    /// reached; `false` for an unknown alarm
    pub fn is_alarm_expired(&self, n: u8) -> bool {
        let Ok(alarm) = AlarmId::try_from(n) else {
            return false;
        };
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let now = inner.now();
            let slot = &inner.alarms[alarm.index()];
            slot.active && now >= slot.target
        })
    }

    /// Snapshot of alarm `n`
    pub fn alarm(&self, n: u8) -> Result<AlarmInfo<'a>, RtcError> {
        let alarm = AlarmId::try_from(n)?;
        Ok(critical_section::with(|cs| {
            self.inner.borrow(cs).borrow().alarms[alarm.index()].info()
        }))
    }

    /// Schedule alarm `n` for `target`.
    ///
    /// An alarm whose target is not in the future fires before this returns,
    /// with `late` set. Passing no handler cancels the alarm and reports
    /// [`RtcError::NoCallback`].
    pub fn set_alarm(
        &self,
        n: u8,
        target: Time,
        handler: Option<Handler<'a>>,
    ) -> Result<(), RtcError> {
        let alarm = AlarmId::try_from(n).inspect_err(|_| {
            warn!("set_alarm: no such alarm {}", n);
        })?;
        let Some(handler) = handler else {
            self.clear_alarm(n)?;
            return Err(RtcError::NoCallback);
        };

        let fire_now = critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let block = inner.rate.block_params(target);

            inner.disarm(alarm);
            inner.alarms[alarm.index()] = AlarmSlot {
                target,
                block,
                active: true,
                armed: false,
                handler: Some(handler),
            };

            let count = inner.synced_counter();
            let slot = inner.alarms[alarm.index()];
            if inner.due_this_block(&slot, count) {
                inner.arm(alarm);
                // The counter may have crossed the compare point while the
                // channel was being loaded.
                target <= inner.now()
            } else if target > inner.now() {
                trace!(
                    "Alarm {} deferred to block at {}",
                    n,
                    block.start.seconds()
                );
                false
            } else {
                true
            }
        });

        if fire_now {
            self.run_alarm(alarm, true);
        }
        Ok(())
    }

    /// Cancel alarm `n`. Cancelling an inactive alarm is a no-op.
    pub fn clear_alarm(&self, n: u8) -> Result<(), RtcError> {
        let alarm = AlarmId::try_from(n)?;
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            inner.disarm(alarm);
            inner.alarms[alarm.index()] = AlarmSlot::EMPTY;
        });
        Ok(())
    }

    /// Fire `alarm` if it is still active.
    ///
    /// The alarm is deactivated inside the critical section and its handler
    /// then runs outside it, so an alarm fires at most once per
    /// [`set_alarm`](Self::set_alarm) and the handler may re-arm it.
    pub fn run_alarm(&self, alarm: AlarmId, late: bool) {
        let handler =
            critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().take_due(alarm, false));
        Self::call(handler, alarm, late);
    }

    pub(super) fn call(handler: Option<Handler<'a>>, alarm: AlarmId, late: bool) {
        let Some(handler) = handler else {
            return;
        };
        if late {
            warn!("Alarm {} fired late", alarm.index());
        } else {
            trace!("Alarm {} fired", alarm.index());
        }
        handler.on_alarm(alarm, late);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmState, NUM_ALARMS};
    use crate::config::RtcConfig;
    use crate::sim::{advance, RecordingHandler, SimTimer};
    use core::sync::atomic::{AtomicU32, Ordering};
    use counter_rtc_hal::{CompareChannel, TimerInterrupt};

    fn started<'a>() -> Rtc<'a, SimTimer> {
        let rtc = Rtc::new(SimTimer::new());
        rtc.begin(&RtcConfig::default()).unwrap();
        rtc
    }

    #[test]
    fn test_alarm_fires_on_compare_match() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        rtc.set_alarm(0, Time::new(1, 16_384), Some(&recorder)).unwrap();
        rtc.with_timer(|timer| {
            assert_eq!(timer.compare_value(CompareChannel::A), 192);
            assert!(timer.is_enabled(TimerInterrupt::CompareA));
        });

        advance(&rtc, 191);
        assert_eq!(recorder.calls(), 0);
        assert!(!rtc.is_alarm_expired(0));

        advance(&rtc, 1);
        assert_eq!(recorder.calls(), 1);
        assert!(!recorder.was_late());
        assert!(!rtc.is_alarm_active(0));
        rtc.with_timer(|timer| assert!(!timer.is_enabled(TimerInterrupt::CompareA)));
    }

    #[test]
    fn test_second_alarm_uses_channel_b() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        rtc.set_alarm(1, Time::new(0, 16_384), Some(&recorder)).unwrap();
        rtc.with_timer(|timer| {
            assert_eq!(timer.compare_value(CompareChannel::B), 64);
            assert!(timer.is_enabled(TimerInterrupt::CompareB));
            assert!(!timer.is_enabled(TimerInterrupt::CompareA));
        });

        advance(&rtc, 64);
        assert_eq!(recorder.calls(), 1);
        assert!(!rtc.is_alarm_active(1));
    }

    #[test]
    fn test_cancelled_alarm_never_fires() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        rtc.set_alarm(0, Time::new(1, 0), Some(&recorder)).unwrap();
        advance(&rtc, 64);

        rtc.clear_alarm(0).unwrap();
        assert!(!rtc.is_alarm_active(0));
        rtc.with_timer(|timer| assert!(!timer.is_enabled(TimerInterrupt::CompareA)));

        advance(&rtc, 1_000);
        assert_eq!(recorder.calls(), 0);
        // Clearing again is harmless
        rtc.clear_alarm(0).unwrap();
    }

    #[test]
    fn test_past_alarm_fires_immediately() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        advance(&rtc, 256);

        rtc.set_alarm(0, Time::new(1, 0), Some(&recorder)).unwrap();
        assert_eq!(recorder.calls(), 1);
        assert!(recorder.was_late());
        assert!(!rtc.is_alarm_active(0));

        // A target equal to the current time is not in the future either
        rtc.set_alarm(1, rtc.get_time(), Some(&recorder)).unwrap();
        assert_eq!(recorder.calls(), 2);
        assert_eq!(recorder.late_calls(), 2);
    }

    #[test]
    fn test_multi_block_alarm() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        rtc.set_alarm(0, Time::new(7, 0), Some(&recorder)).unwrap();
        assert_eq!(rtc.alarm(0).unwrap().state, AlarmState::ArmedFuture);

        advance(&rtc, 768);
        assert_eq!(rtc.get_time(), Time::new(6, 0));
        assert_eq!(rtc.alarm(0).unwrap().state, AlarmState::ArmedThisBlock);
        assert_eq!(recorder.calls(), 0);

        advance(&rtc, 127);
        assert_eq!(recorder.calls(), 0);
        advance(&rtc, 1);
        assert_eq!(recorder.calls(), 1);
        assert!(!recorder.was_late());
        assert_eq!(rtc.alarm(0).unwrap().state, AlarmState::Inactive);
    }

    #[test]
    fn test_alarms_are_independent() {
        let first = RecordingHandler::new();
        let second = RecordingHandler::new();
        let rtc = started();
        rtc.set_alarm(0, Time::new(0, 16_384), Some(&first)).unwrap();
        rtc.set_alarm(1, Time::new(0, 8_192), Some(&second)).unwrap();

        advance(&rtc, 32);
        assert_eq!((first.calls(), second.calls()), (0, 1));
        assert!(rtc.is_alarm_active(0));
        advance(&rtc, 32);
        assert_eq!((first.calls(), second.calls()), (1, 1));
    }

    #[test]
    fn test_rejects_unknown_alarm() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        let n = NUM_ALARMS as u8;
        assert_eq!(
            rtc.set_alarm(n, Time::new(1, 0), Some(&recorder)),
            Err(RtcError::InvalidAlarm(n))
        );
        assert_eq!(rtc.clear_alarm(n), Err(RtcError::InvalidAlarm(n)));
        assert!(rtc.alarm(n).is_err());
        assert!(!rtc.is_alarm_active(n));
        assert!(!rtc.is_alarm_expired(n));
    }

    #[test]
    fn test_missing_handler_cancels() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        rtc.set_alarm(0, Time::new(1, 0), Some(&recorder)).unwrap();

        assert_eq!(
            rtc.set_alarm(0, Time::new(1, 0), None),
            Err(RtcError::NoCallback)
        );
        assert!(!rtc.is_alarm_active(0));
        advance(&rtc, 512);
        assert_eq!(recorder.calls(), 0);
    }

    #[test]
    fn test_alarm_snapshot() {
        let recorder = RecordingHandler::new();
        let rtc = started();
        let info = rtc.alarm(1).unwrap();
        assert!(!info.active);
        assert!(info.handler.is_none());

        rtc.set_alarm(1, Time::new(5, 100), Some(&recorder)).unwrap();
        let info = rtc.alarm(1).unwrap();
        assert!(info.active);
        assert!(info.handler.is_some());
        assert_eq!(info.target, Time::new(5, 100));
        assert_eq!(info.state, AlarmState::ArmedFuture);
    }

    #[test]
    fn test_closure_handler() {
        let hits = AtomicU32::new(0);
        let handler = |alarm: AlarmId, late: bool| {
            assert_eq!(alarm, AlarmId::Alarm0);
            assert!(!late);
            hits.fetch_add(1, Ordering::SeqCst);
        };
        let rtc = started();
        rtc.set_alarm(0, Time::new(0, 256), Some(&handler)).unwrap();
        advance(&rtc, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    static RTC: Rtc<'static, SimTimer> = Rtc::new(SimTimer::new());
    static FIRED: AtomicU32 = AtomicU32::new(0);
    static FIRED_LATE: AtomicU32 = AtomicU32::new(0);

    fn every_second(alarm: AlarmId, late: bool) {
        let n = FIRED.fetch_add(1, Ordering::SeqCst) + 1;
        if late {
            FIRED_LATE.fetch_add(1, Ordering::SeqCst);
        }
        if n < 3 {
            RTC.set_alarm(alarm.index() as u8, Time::new(n as i32 + 1, 0), Some(&every_second))
                .unwrap();
        }
    }

    #[test]
    fn test_handler_rearms_itself() {
        RTC.begin(&RtcConfig::default()).unwrap();
        RTC.set_alarm(0, Time::new(1, 0), Some(&every_second)).unwrap();

        advance(&RTC, 128);
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
        assert!(RTC.is_alarm_active(0));

        advance(&RTC, 128);
        assert_eq!(FIRED.load(Ordering::SeqCst), 2);
        advance(&RTC, 128);
        assert_eq!(FIRED.load(Ordering::SeqCst), 3);
        assert!(!RTC.is_alarm_active(0));

        advance(&RTC, 1_024);
        assert_eq!(FIRED.load(Ordering::SeqCst), 3);
        assert_eq!(FIRED_LATE.load(Ordering::SeqCst), 0);
    }
}
