//! RTC error types

/// RTC operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RtcError {
    /// Tick frequency is not a power of two in `1..=32768` Hz
    InvalidFrequency(u16),
    /// Alarm index outside `0..NUM_ALARMS`
    InvalidAlarm(u8),
    /// Alarm requested without a handler; the alarm was cleared instead
    NoCallback,
}

impl core::fmt::Display for RtcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidFrequency(hz) => write!(f, "Frequency {} Hz is not a power of two", hz),
            Self::InvalidAlarm(n) => write!(f, "No such alarm: {}", n),
            Self::NoCallback => write!(f, "Alarm has no callback"),
        }
    }
}

// Implement core::error::Error for no_std compatibility
impl core::error::Error for RtcError {}
