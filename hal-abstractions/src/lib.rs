//! Hardware abstraction traits for counter-based real-time clocks
//!
//! This crate defines the traits that abstract over the timer peripheral
//! driving the RTC core. BSPs implement these traits; the core never touches
//! registers directly.

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

pub mod counter;

pub use counter::{ClockSource, CompareChannel, CounterTimer, SyncRegister, TimerInterrupt};
