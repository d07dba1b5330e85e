//! RTC configuration

use counter_rtc_hal::ClockSource;

/// Clock-select field value for an undivided counter clock
const CLOCK_SELECT_DIV1: u8 = 0b001;

const CLOCK_SELECT_MASK: u8 = 0b111;

/// Timer and tick configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcConfig {
    /// Resulting counter tick rate in Hz; must be a power of two
    pub frequency: u16,
    /// Oscillator feeding the counter
    pub clock_source: ClockSource,
    /// Raw 3-bit clock-select (prescaler) field
    pub prescaler: u8,
}

impl Default for RtcConfig {
    /// 32.768 kHz crystal divided by 256: 128 Hz ticks, 2 s overflow blocks
    fn default() -> Self {
        Self {
            frequency: 128,
            clock_source: ClockSource::Crystal,
            prescaler: 0b110,
        }
    }
}

impl RtcConfig {
    /// Configuration for an undivided counter at `frequency` Hz
    pub const fn new(frequency: u16) -> Self {
        Self {
            frequency,
            clock_source: ClockSource::Crystal,
            prescaler: CLOCK_SELECT_DIV1,
        }
    }

    pub const fn with_clock_source(mut self, clock_source: ClockSource) -> Self {
        self.clock_source = clock_source;
        self
    }

    pub const fn with_prescaler(mut self, prescaler: u8) -> Self {
        self.prescaler = prescaler;
        self
    }

    /// Clock-select bits written to the timer
    ///
    /// A stopped counter never lets asynchronous register writes latch, so
    /// "no clock" is replaced by the undivided clock.
    pub const fn clock_select(&self) -> u8 {
        match self.prescaler & CLOCK_SELECT_MASK {
            0 => CLOCK_SELECT_DIV1,
            bits => bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RtcConfig::default();
        assert_eq!(config.frequency, 128);
        assert_eq!(config.clock_source, ClockSource::Crystal);
        assert_eq!(config.clock_select(), 0b110);
    }

    #[test]
    fn test_clock_select_forced_running() {
        assert_eq!(RtcConfig::new(32_768).clock_select(), 0b001);
        assert_eq!(RtcConfig::new(32_768).with_prescaler(0).clock_select(), 0b001);
        assert_eq!(RtcConfig::new(1).with_prescaler(0xFF).clock_select(), 0b111);
    }

    #[test]
    fn test_builder() {
        let config = RtcConfig::new(1_024)
            .with_clock_source(ClockSource::External)
            .with_prescaler(0b011);
        assert_eq!(config.frequency, 1_024);
        assert_eq!(config.clock_source, ClockSource::External);
        assert_eq!(config.clock_select(), 0b011);
    }
}
