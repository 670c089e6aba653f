//! Length controller: the per-channel split and the auto mode flag.
//!
//! Each channel has one length, the length of its *first* phase (START: HIGH window, STOP: LOW
//! prefix), always in `0..=max_slots`. Manual steps clamp and report `None` when they would leave
//! the range. Auto ticks wrap instead, `max_slots` -> 0.

use crate::codec::{Channel, FrameWord};
use crate::status::StatusLine;
use crate::tunables::Tunables;

/// Session state owned by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    lengths: [u16; 2],
    auto: bool,
}

impl Session {
    pub fn length(&self, channel: Channel) -> u16 {
        self.lengths[channel.index()]
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }
}

/// A new word to stage, together with the line describing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Update {
    pub channel: Channel,
    pub word: FrameWord,
    pub status: StatusLine,
}

pub struct LengthController {
    max_slots: u16,
    defaults: [u16; 2],
    auto_at_boot: bool,
    session: Session,
}

impl LengthController {
    pub fn new(tunables: &Tunables) -> Self {
        let max_slots = tunables.max_slots;
        let defaults = Channel::ALL.map(|channel| tunables.default_for(channel).min(max_slots));
        Self {
            max_slots,
            defaults,
            auto_at_boot: tunables.auto_at_boot,
            session: Session {
                lengths: defaults,
                auto: tunables.auto_at_boot,
            },
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn increment(&mut self, channel: Channel) -> Option<Update> {
        let length = self.session.length(channel);
        if length >= self.max_slots {
            return None;
        }
        Some(self.set(channel, length + 1))
    }

    pub fn decrement(&mut self, channel: Channel) -> Option<Update> {
        let length = self.session.length(channel);
        if length == 0 {
            return None;
        }
        Some(self.set(channel, length - 1))
    }

    /// Returns whether the flag changed.
    pub fn set_auto(&mut self, on: bool) -> bool {
        let changed = self.session.auto != on;
        self.session.auto = on;
        changed
    }

    /// Advance both channels by one slot, wrapping past `max_slots` to 0. STOP first.
    pub fn auto_tick(&mut self) -> [Update; 2] {
        let modulus = self.max_slots as u32 + 1;
        [Channel::Stop, Channel::Start].map(|channel| {
            let next = (self.session.length(channel) as u32 + 1) % modulus;
            self.set(channel, next as u16)
        })
    }

    /// Back to the boot defaults, auto flag included. STOP first.
    pub fn reset(&mut self) -> [Update; 2] {
        self.session.auto = self.auto_at_boot;
        [Channel::Stop, Channel::Start].map(|channel| {
            let length = self.defaults[channel.index()];
            self.set(channel, length)
        })
    }

    /// The word and status line for the current length, without changing anything.
    pub fn current(&self, channel: Channel) -> Update {
        self.update_for(channel, self.session.length(channel))
    }

    fn set(&mut self, channel: Channel, length: u16) -> Update {
        self.session.lengths[channel.index()] = length;
        self.update_for(channel, length)
    }

    fn update_for(&self, channel: Channel, length: u16) -> Update {
        Update {
            channel,
            word: channel.word(length, self.max_slots),
            status: StatusLine {
                channel,
                length,
                max_slots: self.max_slots,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn controller(max_slots: u16, start: u16, stop: u16) -> LengthController {
        LengthController::new(&Tunables {
            max_slots,
            start_default: start,
            stop_default: stop,
            ..Tunables::default()
        })
    }

    #[test]
    fn five_increments_from_one() {
        let mut controller = controller(50, 1, 1);
        let mut last = None;
        for _ in 0..5 {
            last = controller.increment(Channel::Start);
        }
        let update = last.unwrap();
        assert_eq!(update.word.decode(), (44, 6));
        assert_eq!(controller.session().length(Channel::Start), 6);
    }

    #[test]
    fn increment_saturates_at_frame_length() {
        let mut controller = controller(50, 1, 1);
        while controller.increment(Channel::Start).is_some() {}
        assert_eq!(controller.session().length(Channel::Start), 50);
        assert_eq!(controller.increment(Channel::Start), None);
        assert_eq!(controller.session().length(Channel::Start), 50);
        assert_eq!(controller.current(Channel::Start).word.decode(), (0, 50));
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let mut controller = controller(50, 1, 1);
        assert!(controller.decrement(Channel::Stop).is_some());
        assert_eq!(controller.decrement(Channel::Stop), None);
        assert_eq!(controller.current(Channel::Stop).word.decode(), (0, 50));
    }

    #[test]
    fn random_steps_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut controller = controller(50, 1, 1);
        for _ in 0..5_000 {
            let channel = if rng.random_bool(0.5) {
                Channel::Start
            } else {
                Channel::Stop
            };
            let update = if rng.random_bool(0.5) {
                controller.increment(channel)
            } else {
                controller.decrement(channel)
            };
            let length = controller.session().length(channel);
            assert!(length <= 50);
            if let Some(update) = update {
                let (low, high) = update.word.decode();
                assert_eq!(low + high, 50);
                assert_eq!(update.status.length, length);
            }
        }
    }

    #[test]
    fn auto_ticks_wrap() {
        let mut controller = controller(50, 1, 1);
        for n in 1..=120u32 {
            controller.auto_tick();
            let expected = ((1 + n) % 51) as u16;
            assert_eq!(controller.session().length(Channel::Start), expected);
            assert_eq!(controller.session().length(Channel::Stop), expected);
        }
    }

    #[test]
    fn auto_tick_stages_stop_before_start() {
        let mut controller = controller(10, 10, 3);
        let [first, second] = controller.auto_tick();
        assert_eq!(first.channel, Channel::Stop);
        assert_eq!(first.status.length, 4);
        assert_eq!(second.channel, Channel::Start);
        assert_eq!(second.status.length, 0);
        assert_eq!(second.word.decode(), (10, 0));
    }

    #[test]
    fn reset_restores_defaults_and_auto() {
        let mut controller = LengthController::new(&Tunables {
            auto_at_boot: true,
            ..Tunables::default()
        });
        assert!(controller.session().is_auto());
        controller.set_auto(false);
        controller.increment(Channel::Start);
        controller.reset();
        assert!(controller.session().is_auto());
        assert_eq!(controller.session().length(Channel::Start), 1);
    }

    #[test]
    fn auto_toggle_reports_changes_only() {
        let mut controller = controller(50, 0, 0);
        assert!(controller.set_auto(true));
        assert!(!controller.set_auto(true));
    }
}
