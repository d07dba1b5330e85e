//! Counter-extended real-time clock
//!
//! ## Architecture
//! - The 8-bit hardware counter holds the ticks elapsed since the last
//!   overflow; the *committed* time is the time at which the counter was
//!   last zero.
//! - The overflow interrupt advances the committed time by one block and
//!   re-evaluates the alarm table.
//! - Current time is `committed + counter * fractions_per_tick`.
//! - Committed time is always a multiple of the overflow interval; alarm
//!   block matching relies on this.
//!
//! All mutable state (peripheral, committed time, alarm table) sits behind
//! one `critical_section::Mutex`, and every public method takes `&self`, so a
//! single `Rtc` can live in a `static` shared by foreground code and the
//! interrupt trampolines:
//!
//! ```ignore
//! static RTC: Rtc<'static, Timer2> = Rtc::new(Timer2::new());
//!
//! RTC.begin(&RtcConfig::default())?;
//! RTC.set_time(Time::new(1_700_000_000, 0));
//!
//! #[interrupt]
//! fn TIMER2_OVF() {
//!     RTC.on_overflow();
//! }
//! ```

mod isr;
mod scheduler;

pub use isr::InterruptQueue;

use core::cell::RefCell;

use counter_rtc_hal::{CounterTimer, SyncRegister, TimerInterrupt};
use critical_section::Mutex;

use crate::alarm::{AlarmId, AlarmSlot, NUM_ALARMS};
use crate::config::RtcConfig;
use crate::error::RtcError;
use crate::ticks::TickRate;
use crate::time::Time;

/// Real-time clock and alarm engine on top of a [`CounterTimer`]
pub struct Rtc<'a, T> {
    inner: Mutex<RefCell<Inner<'a, T>>>,
}

/// State shared with interrupt handlers; only touched inside a critical
/// section
struct Inner<'a, T> {
    timer: T,
    rate: TickRate,
    committed: Time,
    alarms: [AlarmSlot<'a>; NUM_ALARMS],
}

impl<'a, T: CounterTimer> Rtc<'a, T> {
    /// Wrap a timer peripheral. Nothing is configured until
    /// [`begin`](Self::begin).
    pub const fn new(timer: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                timer,
                rate: TickRate::DEFAULT,
                committed: Time::ZERO,
                alarms: [AlarmSlot::EMPTY; NUM_ALARMS],
            })),
        }
    }

    /// Wrap a timer peripheral and [`begin`](Self::begin) with `config`
    pub fn with_config(timer: T, config: &RtcConfig) -> Result<Self, RtcError> {
        let rtc = Self::new(timer);
        rtc.begin(config)?;
        Ok(rtc)
    }

    /// Configure the timer and reset the clock to zero with no alarms.
    ///
    /// Rejects a frequency that is not a power of two without touching any
    /// state.
    pub fn begin(&self, config: &RtcConfig) -> Result<(), RtcError> {
        let rate = TickRate::new(config.frequency).inspect_err(|_| {
            error!("RTC frequency {} Hz is not a power of two", config.frequency);
        })?;
        let clock_select = config.clock_select();

        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            inner.rate = rate;
            inner.committed = Time::ZERO;
            inner.alarms = [AlarmSlot::EMPTY; NUM_ALARMS];

            let timer = &mut inner.timer;
            for irq in TimerInterrupt::BY_PRIORITY {
                timer.disable_interrupt(irq);
                timer.clear_pending(irq);
            }

            timer.stop();
            timer.set_counter(0);
            for alarm in AlarmId::ALL {
                timer.set_compare(alarm.channel(), 0);
            }
            timer.configure(clock_select, config.clock_source, true);

            for register in SyncRegister::ALL {
                timer.wait_for_sync(register);
            }

            for irq in TimerInterrupt::BY_PRIORITY {
                timer.clear_pending(irq);
            }
            // No alarms yet: overflow only
            timer.enable_interrupt(TimerInterrupt::Overflow);
        });

        info!(
            "RTC started: {} Hz, {} fractions/tick, overflow every {}",
            rate.frequency(),
            rate.fractions_per_tick(),
            rate.overflow_interval()
        );
        Ok(())
    }

    /// Tick parameters in effect
    pub fn tick_rate(&self) -> TickRate {
        critical_section::with(|cs| self.inner.borrow(cs).borrow().rate)
    }

    /// Current time, quantised to the counter tick
    ///
    /// Non-decreasing between calls unless the time is set.
    pub fn get_time(&self) -> Time {
        let (count, committed, rate) = critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let count = inner.synced_counter();
            (count, inner.committed, inner.rate)
        });
        committed + rate.ticks_to_time(count as u32)
    }

    /// Set the current time, rounded down to a tick boundary
    pub fn set_time(&self, time: Time) {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().set_time(time));
    }

    /// Set the current time and return the time it replaced, as one atomic
    /// exchange
    pub fn replace_time(&self, time: Time) -> Time {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let previous = inner.now();
            inner.set_time(time);
            previous
        })
    }

    /// Run `f` on the timer peripheral inside a critical section
    pub fn with_timer<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut().timer))
    }
}

impl<T: CounterTimer> Inner<'_, T> {
    /// Counter value once any pending asynchronous write has landed
    fn synced_counter(&mut self) -> u8 {
        self.timer.wait_for_sync(SyncRegister::Counter);
        self.timer.counter()
    }

    fn now(&mut self) -> Time {
        let count = self.synced_counter();
        self.committed + self.rate.ticks_to_time(count as u32)
    }

    /// Split `time` into a block-aligned committed time and a counter
    /// preset, then reload the stopped counter.
    fn set_time(&mut self, time: Time) {
        let params = self.rate.block_params(time);

        self.timer.wait_for_sync(SyncRegister::Control);
        self.timer.stop();
        self.timer.reset_prescaler();
        // An overflow latched against the old count must not advance the
        // new committed time.
        self.timer.clear_pending(TimerInterrupt::Overflow);

        self.committed = params.start;

        self.timer.wait_for_sync(SyncRegister::Counter);
        self.timer.wait_for_sync(SyncRegister::Control);
        self.timer.set_counter(params.compare);
        self.timer.start();

        debug!(
            "Time set: seconds={} fraction={} count={}",
            self.committed.seconds(),
            self.committed.fraction(),
            params.compare
        );

        // Compare channels loaded for the old block are meaningless now;
        // overdue alarms are caught by the next overflow sweep.
        self.schedule_block(params.compare);
    }
}
