//! Run-time tunables. Defaults come from the `config` crate.

use fugit::{HertzU32, MicrosDurationU64};
use thiserror::Error;

use crate::codec::Channel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tunables {
    /// Frame length in slots, the same for both channels.
    pub max_slots: u16,
    pub slot_rate: HertzU32,
    /// START HIGH window at boot and after restart.
    pub start_default: u16,
    /// STOP LOW prefix at boot and after restart.
    pub stop_default: u16,
    pub auto_tick: MicrosDurationU64,
    pub auto_at_boot: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TunablesError {
    #[error("frame length must be at least one slot")]
    EmptyFrame,
    #[error("slot rate must be non-zero")]
    ZeroSlotRate,
    #[error("{} default {value} exceeds frame length {max_slots}", .channel.name())]
    DefaultOutOfRange {
        channel: Channel,
        value: u16,
        max_slots: u16,
    },
    #[error("auto interval must be non-zero")]
    ZeroAutoTick,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_slots: config::MAX_SLOTS,
            slot_rate: HertzU32::from_raw(config::SLOT_RATE_HZ),
            start_default: config::DEFAULT_START_HIGH,
            stop_default: config::DEFAULT_STOP_LOW_PREFIX,
            auto_tick: MicrosDurationU64::millis(config::AUTO_TICK_MILLIS as u64),
            auto_at_boot: config::AUTO_AT_BOOT,
        }
    }
}

impl Tunables {
    pub fn validate(&self) -> Result<(), TunablesError> {
        if self.max_slots == 0 {
            return Err(TunablesError::EmptyFrame);
        }
        if self.slot_rate.raw() == 0 {
            return Err(TunablesError::ZeroSlotRate);
        }
        for channel in Channel::ALL {
            let value = self.default_for(channel);
            if value > self.max_slots {
                return Err(TunablesError::DefaultOutOfRange {
                    channel,
                    value,
                    max_slots: self.max_slots,
                });
            }
        }
        if self.auto_tick.ticks() == 0 {
            return Err(TunablesError::ZeroAutoTick);
        }
        Ok(())
    }

    pub fn default_for(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Start => self.start_default,
            Channel::Stop => self.stop_default,
        }
    }

    /// Slot duration in nanoseconds, rounded down.
    pub fn slot_nanos(&self) -> u32 {
        1_000_000_000 / self.slot_rate.raw()
    }

    /// Frame period in nanoseconds, not counting any per-frame overhead of the backend.
    pub fn frame_nanos(&self) -> u64 {
        self.max_slots as u64 * 1_000_000_000 / self.slot_rate.raw() as u64
    }

    pub fn frame_rate_hz(&self) -> u32 {
        self.slot_rate.raw() / self.max_slots as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let tunables = Tunables::default();
        assert_eq!(tunables.validate(), Ok(()));
        assert_eq!(tunables.max_slots, 50);
        assert_eq!(tunables.auto_tick.to_millis(), 1000);
    }

    #[test]
    fn rejects_default_past_frame_end() {
        let tunables = Tunables {
            stop_default: 51,
            ..Tunables::default()
        };
        assert_eq!(
            tunables.validate(),
            Err(TunablesError::DefaultOutOfRange {
                channel: Channel::Stop,
                value: 51,
                max_slots: 50
            })
        );
        assert_eq!(
            tunables.validate().unwrap_err().to_string(),
            "STOP default 51 exceeds frame length 50"
        );
    }

    #[test]
    fn rejects_empty_frame() {
        let tunables = Tunables {
            max_slots: 0,
            start_default: 0,
            stop_default: 0,
            ..Tunables::default()
        };
        assert_eq!(tunables.validate(), Err(TunablesError::EmptyFrame));
    }

    #[test]
    fn timing_follows_slot_rate() {
        let tunables = Tunables {
            max_slots: 50,
            slot_rate: HertzU32::from_raw(50_000_000),
            ..Tunables::default()
        };
        assert_eq!(tunables.slot_nanos(), 20);
        assert_eq!(tunables.frame_nanos(), 1000);
        assert_eq!(tunables.frame_rate_hz(), 1_000_000);
    }
}
