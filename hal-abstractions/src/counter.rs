//! 8-bit asynchronous counter/timer peripheral
//!
//! Models a timer such as the AVR Timer/Counter2 clocked from a 32.768 kHz
//! crystal: an 8-bit up-counter that free-runs in its own clock domain, two
//! compare channels, and an overflow interrupt. Writes to its registers take
//! several asynchronous-clock cycles to latch, which is what
//! [`CounterTimer::wait_for_sync`] waits out.

/// Clock feeding the counter's prescaler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// Watch crystal across the oscillator pins
    Crystal,
    /// External clock signal driven into the oscillator input
    External,
}

/// Hardware compare channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompareChannel {
    A,
    B,
}

impl CompareChannel {
    /// Interrupt raised when this channel matches the counter
    pub const fn interrupt(self) -> TimerInterrupt {
        match self {
            Self::A => TimerInterrupt::CompareA,
            Self::B => TimerInterrupt::CompareB,
        }
    }

    /// Register that must be synchronised before this channel is rewritten
    pub const fn sync_register(self) -> SyncRegister {
        match self {
            Self::A => SyncRegister::CompareA,
            Self::B => SyncRegister::CompareB,
        }
    }
}

/// Interrupt sources of the timer
///
/// `Ord` follows hardware priority: compare A outranks compare B, which
/// outranks overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerInterrupt {
    Overflow,
    CompareA,
    CompareB,
}

impl TimerInterrupt {
    /// All sources, highest priority first
    pub const BY_PRIORITY: [TimerInterrupt; 3] = [Self::CompareA, Self::CompareB, Self::Overflow];

    /// Relative priority; larger preempts smaller
    pub const fn priority(self) -> u8 {
        match self {
            Self::CompareA => 2,
            Self::CompareB => 1,
            Self::Overflow => 0,
        }
    }
}

impl PartialOrd for TimerInterrupt {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerInterrupt {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.priority().cmp(&other.priority())
    }
}

/// Registers whose writes complete asynchronously
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncRegister {
    Counter,
    CompareA,
    CompareB,
    Control,
}

impl SyncRegister {
    pub const ALL: [SyncRegister; 4] = [Self::Counter, Self::CompareA, Self::CompareB, Self::Control];
}

/// Timer peripheral used by the RTC core
///
/// Every method is called from inside a critical section, so
/// implementations need no locking of their own. The core issues no other
/// hardware operations.
pub trait CounterTimer {
    /// Select clock source and prescaler and enable asynchronous operation.
    ///
    /// `prescaler` is the raw 3-bit clock-select field (`0b001` = no
    /// division). The counter starts running once this returns.
    fn configure(&mut self, prescaler: u8, clock_source: ClockSource, asynchronous: bool);

    /// Current counter value
    fn counter(&mut self) -> u8;

    /// Preset the counter
    fn set_counter(&mut self, value: u8);

    /// Load a compare channel
    fn set_compare(&mut self, channel: CompareChannel, value: u8);

    /// Stop the counter clock
    fn stop(&mut self);

    /// Restart the counter clock with the configured prescaler
    fn start(&mut self);

    /// Reset the asynchronous prescaler divider
    fn reset_prescaler(&mut self);

    fn enable_interrupt(&mut self, irq: TimerInterrupt);

    fn disable_interrupt(&mut self, irq: TimerInterrupt);

    /// Drop a pending (latched but not yet serviced) interrupt
    fn clear_pending(&mut self, irq: TimerInterrupt);

    /// Spin until the last write to `register` has latched in the
    /// asynchronous clock domain
    fn wait_for_sync(&mut self, register: SyncRegister);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_priority_order() {
        assert!(TimerInterrupt::CompareA > TimerInterrupt::CompareB);
        assert!(TimerInterrupt::CompareB > TimerInterrupt::Overflow);

        let mut sorted = [
            TimerInterrupt::Overflow,
            TimerInterrupt::CompareA,
            TimerInterrupt::CompareB,
        ];
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(sorted, TimerInterrupt::BY_PRIORITY);
    }

    #[test]
    fn test_channel_mapping() {
        assert_eq!(CompareChannel::A.interrupt(), TimerInterrupt::CompareA);
        assert_eq!(CompareChannel::B.interrupt(), TimerInterrupt::CompareB);
        assert_eq!(CompareChannel::B.sync_register(), SyncRegister::CompareB);
    }
}
