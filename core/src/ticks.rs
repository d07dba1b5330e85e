//! Tick and overflow-block arithmetic
//!
//! The counter is 8 bits wide, so one overflow interval ("block") is always
//! 256 ticks. Tick frequency, fractions per tick and the block length are all
//! powers of two; every conversion here is a shift or a mask.
//!
//! A block is either a whole number of seconds (tick rates up to 128 Hz) or
//! a power-of-two part of one second (faster rates). Block alignment works on
//! the seconds in the first case and on the fraction in the second.

use crate::error::RtcError;
use crate::time::{Time, FRACTIONS_PER_SECOND_LOG2};

/// Width of the hardware counter
pub const COUNTER_BITS: u32 = 8;

/// Ticks per overflow interval
pub const TICKS_PER_BLOCK: u32 = 1 << COUNTER_BITS;

const COUNTER_MASK: u32 = TICKS_PER_BLOCK - 1;

/// Start of the block containing a time, and the counter value inside that
/// block which corresponds to the time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockParams {
    pub start: Time,
    pub compare: u8,
}

/// Power-of-two tick parameters derived from the counter frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickRate {
    frequency_log2: u32,
    fractions_per_tick_log2: u32,
    overflow_fractions_log2: u32,
    overflow_interval: Time,
}

impl TickRate {
    /// 32.768 kHz crystal divided by 256
    pub const DEFAULT: TickRate = TickRate::from_log2(7);

    /// Derive tick parameters for `frequency` Hz.
    ///
    /// Fails unless `frequency` is `2^n` for `n` in `0..=15`.
    pub const fn new(frequency: u16) -> Result<Self, RtcError> {
        if !frequency.is_power_of_two() {
            return Err(RtcError::InvalidFrequency(frequency));
        }
        Ok(Self::from_log2(frequency.trailing_zeros()))
    }

    const fn from_log2(frequency_log2: u32) -> Self {
        let fractions_per_tick_log2 = FRACTIONS_PER_SECOND_LOG2 - frequency_log2;
        let overflow_fractions_log2 = fractions_per_tick_log2 + COUNTER_BITS;
        Self {
            frequency_log2,
            fractions_per_tick_log2,
            overflow_fractions_log2,
            overflow_interval: Time::from_fractions(1 << overflow_fractions_log2),
        }
    }

    /// Ticks per second
    pub const fn frequency(&self) -> u16 {
        1 << self.frequency_log2
    }

    pub const fn fractions_per_tick(&self) -> u32 {
        1 << self.fractions_per_tick_log2
    }

    /// Fraction units per overflow interval
    pub const fn overflow_fractions(&self) -> u32 {
        1 << self.overflow_fractions_log2
    }

    /// Length of one overflow interval
    pub const fn overflow_interval(&self) -> Time {
        self.overflow_interval
    }

    /// Duration of `ticks` counter steps
    pub const fn ticks_to_time(&self, ticks: u32) -> Time {
        Time::from_fractions((ticks as i64) << self.fractions_per_tick_log2)
    }

    /// Whole ticks in `fraction` units, rounded down
    pub const fn fraction_to_ticks(&self, fraction: u32) -> u32 {
        fraction >> self.fractions_per_tick_log2
    }

    /// Locate `target` relative to the overflow blocks.
    ///
    /// `start` is a multiple of the overflow interval and `compare` is the
    /// tick within that block, so `start + compare ticks` equals `target`
    /// rounded down to a tick boundary.
    pub fn block_params(&self, target: Time) -> BlockParams {
        let (seconds, fraction) = target.floor_parts();
        let interval = self.overflow_interval;

        let (start, in_block) = if interval.seconds() > 0 {
            // Multi-second blocks: align the seconds, the remainder seconds
            // plus the fraction give the position inside the block.
            let mask = interval.seconds() - 1;
            let rem = seconds & mask;
            let offset = ((rem as u32) << FRACTIONS_PER_SECOND_LOG2) | fraction;
            (Time::new(seconds - rem, 0), offset)
        } else {
            let rem = fraction & (interval.fraction() as u32 - 1);
            (Time::new(seconds, (fraction - rem) as i32), rem)
        };

        BlockParams {
            start,
            compare: (self.fraction_to_ticks(in_block) & COUNTER_MASK) as u8,
        }
    }
}

impl Default for TickRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}
