//! Alarm identifiers, handlers and the alarm table

use counter_rtc_hal::CompareChannel;

use crate::error::RtcError;
use crate::ticks::BlockParams;
use crate::time::Time;

/// Number of alarms, one per hardware compare channel
pub const NUM_ALARMS: usize = 2;

/// Alarm slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmId {
    Alarm0,
    Alarm1,
}

impl AlarmId {
    pub const ALL: [AlarmId; NUM_ALARMS] = [Self::Alarm0, Self::Alarm1];

    pub const fn index(self) -> usize {
        match self {
            Self::Alarm0 => 0,
            Self::Alarm1 => 1,
        }
    }

    /// Compare channel that fires this alarm
    pub const fn channel(self) -> CompareChannel {
        match self {
            Self::Alarm0 => CompareChannel::A,
            Self::Alarm1 => CompareChannel::B,
        }
    }
}

impl TryFrom<u8> for AlarmId {
    type Error = RtcError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            0 => Ok(Self::Alarm0),
            1 => Ok(Self::Alarm1),
            _ => Err(RtcError::InvalidAlarm(n)),
        }
    }
}

impl From<CompareChannel> for AlarmId {
    fn from(channel: CompareChannel) -> Self {
        match channel {
            CompareChannel::A => Self::Alarm0,
            CompareChannel::B => Self::Alarm1,
        }
    }
}

/// Alarm callback
///
/// Runs from interrupt context with interrupts enabled, or from the caller
/// of `set_alarm` when the target has already passed. It may call back into
/// the RTC, including re-arming its own alarm. State the callback needs
/// travels in the implementing value itself.
pub trait AlarmHandler {
    /// `late` is set when the alarm fired after its deadline instead of from
    /// its compare match.
    fn on_alarm(&self, alarm: AlarmId, late: bool);
}

impl<F> AlarmHandler for F
where
    F: Fn(AlarmId, bool),
{
    fn on_alarm(&self, alarm: AlarmId, late: bool) {
        self(alarm, late)
    }
}

/// Borrowed alarm callback as stored in the alarm table
pub type Handler<'a> = &'a (dyn AlarmHandler + Sync);

/// Scheduling state of an alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmState {
    Inactive,
    /// Waiting for the overflow block that contains the target
    ArmedFuture,
    /// Compare channel loaded for the current block
    ArmedThisBlock,
}

/// Snapshot of one alarm
#[derive(Clone, Copy)]
pub struct AlarmInfo<'a> {
    pub target: Time,
    pub handler: Option<Handler<'a>>,
    pub active: bool,
    pub state: AlarmState,
}

impl core::fmt::Debug for AlarmInfo<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlarmInfo")
            .field("target", &self.target)
            .field("has_handler", &self.handler.is_some())
            .field("active", &self.active)
            .field("state", &self.state)
            .finish()
    }
}

/// One entry of the alarm table
#[derive(Clone, Copy)]
pub(crate) struct AlarmSlot<'a> {
    pub target: Time,
    pub block: BlockParams,
    pub active: bool,
    /// Compare interrupt enabled for this alarm
    pub armed: bool,
    pub handler: Option<Handler<'a>>,
}

impl<'a> AlarmSlot<'a> {
    pub const EMPTY: Self = AlarmSlot {
        target: Time::ZERO,
        block: BlockParams {
            start: Time::ZERO,
            compare: 0,
        },
        active: false,
        armed: false,
        handler: None,
    };

    pub fn state(&self) -> AlarmState {
        match (self.active, self.armed) {
            (false, _) => AlarmState::Inactive,
            (true, false) => AlarmState::ArmedFuture,
            (true, true) => AlarmState::ArmedThisBlock,
        }
    }

    pub fn info(&self) -> AlarmInfo<'a> {
        AlarmInfo {
            target: self.target,
            handler: self.handler,
            active: self.active,
            state: self.state(),
        }
    }
}
