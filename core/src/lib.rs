//! Real-time clock and alarms on an 8-bit asynchronous counter
//!
//! Extends a free-running 8-bit hardware counter into a wide fixed-point
//! clock by counting overflows in software, and schedules two alarms on its
//! compare channels. Alarms that miss their compare match are still
//! delivered, late, by the next overflow.
//!
//! The crate has NO hardware dependencies: the peripheral is reached through
//! [`counter_rtc_hal::CounterTimer`], implemented by board code.

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

// Must come first so the logging macros are visible to later modules
#[macro_use]
mod fmt;

pub mod alarm;
pub mod config;
pub mod error;
mod rtc;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod ticks;
pub mod time;

pub use alarm::{AlarmHandler, AlarmId, AlarmInfo, AlarmState, Handler, NUM_ALARMS};
pub use config::RtcConfig;
pub use counter_rtc_hal::{ClockSource, CompareChannel, CounterTimer, SyncRegister, TimerInterrupt};
pub use error::RtcError;
pub use rtc::{InterruptQueue, Rtc};
pub use ticks::{BlockParams, TickRate};
pub use time::{Time, FRACTIONS_PER_SECOND};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
