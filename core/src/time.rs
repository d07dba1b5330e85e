//! Fixed-point time representation
//!
//! A [`Time`] is a whole number of seconds plus a fraction counted in
//! `1/32768` s units. The fraction base is a power of two so that every
//! conversion to and from timer ticks is a shift or a mask, and repeated
//! overflow/compare arithmetic never accumulates rounding drift.
//!
//! ## Sign convention
//! After normalisation `|fraction| < FRACTIONS_PER_SECOND` and both fields
//! carry the same sign (either may be zero). Non-negative times therefore
//! always have `0 <= fraction < FRACTIONS_PER_SECOND`; half a second before
//! zero is `(0, -16384)`.
//!
//! Seconds wrap at the `i32` range.

use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Fraction units per second
pub const FRACTIONS_PER_SECOND: i32 = 1 << FRACTIONS_PER_SECOND_LOG2;

/// Base-2 logarithm of [`FRACTIONS_PER_SECOND`]
pub const FRACTIONS_PER_SECOND_LOG2: u32 = 15;

const FRACTION_MASK: i32 = FRACTIONS_PER_SECOND - 1;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Seconds and `1/32768` s fractions
///
/// Ordering is lexicographic on `(seconds, fraction)`, which matches
/// numeric ordering for normalised values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Time {
    seconds: i32,
    fraction: i32,
}

impl Time {
    pub const ZERO: Time = Time {
        seconds: 0,
        fraction: 0,
    };

    /// Create a normalised time; `fraction` may lie outside one second
    pub const fn new(seconds: i32, fraction: i32) -> Self {
        let (seconds, fraction) = normalize(seconds, fraction);
        Self { seconds, fraction }
    }

    /// Create a time from a signed count of fraction units
    pub const fn from_fractions(fractions: i64) -> Self {
        // Arithmetic shift and mask give the floor form, which `new`
        // turns into the sign-consistent one.
        let seconds = (fractions >> FRACTIONS_PER_SECOND_LOG2) as i32;
        let fraction = (fractions & FRACTION_MASK as i64) as i32;
        Self::new(seconds, fraction)
    }

    /// Create a time from microseconds, rounding towards negative infinity
    /// to the nearest fraction unit
    pub const fn from_micros(micros: i64) -> Self {
        let seconds = micros.div_euclid(MICROS_PER_SECOND);
        let sub = micros.rem_euclid(MICROS_PER_SECOND);
        let fraction = (sub << FRACTIONS_PER_SECOND_LOG2) / MICROS_PER_SECOND;
        Self::new(seconds as i32, fraction as i32)
    }

    pub const fn seconds(&self) -> i32 {
        self.seconds
    }

    pub const fn fraction(&self) -> i32 {
        self.fraction
    }

    /// Replace the seconds and renormalise
    pub fn set_seconds(&mut self, seconds: i32) {
        *self = Self::new(seconds, self.fraction);
    }

    /// Replace the fraction and renormalise
    pub fn set_fraction(&mut self, fraction: i32) {
        *self = Self::new(self.seconds, fraction);
    }

    /// Sub-second part in microseconds, truncated towards zero
    pub const fn subsec_micros(&self) -> i32 {
        ((self.fraction as i64 * MICROS_PER_SECOND) / FRACTIONS_PER_SECOND as i64) as i32
    }

    /// Total fraction units
    pub const fn as_fractions(&self) -> i64 {
        ((self.seconds as i64) << FRACTIONS_PER_SECOND_LOG2) + self.fraction as i64
    }

    pub const fn is_negative(&self) -> bool {
        self.seconds < 0 || self.fraction < 0
    }

    /// Component-wise absolute value
    ///
    /// Normalised times are sign-consistent, so for them this is the true
    /// magnitude. It is not a magnitude for hand-built mixed-sign pairs.
    pub const fn abs(&self) -> Self {
        Self::new(self.seconds.wrapping_abs(), self.fraction.wrapping_abs())
    }

    /// Split into `(seconds, fraction)` with `0 <= fraction < 32768`,
    /// flooring negative times
    pub(crate) const fn floor_parts(&self) -> (i32, u32) {
        if self.fraction < 0 {
            (
                self.seconds.wrapping_sub(1),
                (self.fraction + FRACTIONS_PER_SECOND) as u32,
            )
        } else {
            (self.seconds, self.fraction as u32)
        }
    }
}

/// Fold the fraction into `(-32768, 32768)` and make its sign agree with
/// the seconds
const fn normalize(mut seconds: i32, mut fraction: i32) -> (i32, i32) {
    if fraction >= FRACTIONS_PER_SECOND {
        seconds = seconds.wrapping_add(fraction >> FRACTIONS_PER_SECOND_LOG2);
        fraction &= FRACTION_MASK;
    } else if fraction < 0 {
        let f = fraction.unsigned_abs();
        seconds = seconds.wrapping_sub((f >> FRACTIONS_PER_SECOND_LOG2) as i32);
        fraction = -((f & FRACTION_MASK as u32) as i32);
    }

    // Residual fraction is now within one second; borrow or carry one unit
    // if the signs disagree.
    if seconds < 0 && fraction > 0 {
        seconds += 1;
        fraction -= FRACTIONS_PER_SECOND;
    } else if seconds > 0 && fraction < 0 {
        seconds -= 1;
        fraction += FRACTIONS_PER_SECOND;
    }
    (seconds, fraction)
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Self) {
        *self = Self::new(
            self.seconds.wrapping_add(rhs.seconds),
            self.fraction + rhs.fraction,
        );
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Self) {
        *self += -rhs;
    }
}

impl Add for Time {
    type Output = Time;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(mut self, rhs: Self) -> Self::Output {
        self -= rhs;
        self
    }
}

impl Neg for Time {
    type Output = Time;

    fn neg(self) -> Self::Output {
        Self::new(self.seconds.wrapping_neg(), -self.fraction)
    }
}

impl core::fmt::Display for Time {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}.{:06}",
            sign,
            self.seconds.unsigned_abs(),
            self.subsec_micros().unsigned_abs()
        )
    }
}
