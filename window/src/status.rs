//! Human readable status output.
//!
//! Everything here renders through `core::fmt`, so the same text ends up on the USB serial
//! port, in the host log and in tests.

use core::fmt;

use crate::codec::{Channel, Level};
use crate::tunables::Tunables;

const FILLED: char = '■';
const EMPTY: char = '□';

/// Control hint, printed at start-up and for unrecognized input.
pub const USAGE: &str = "use: STOP 'w'/'s' (LOW prefix +/-) | START 'i'/'k' (HIGH +/-) | 'a' auto | ^C stop | ^D restart";

/// One channel's split as a bar in emission order plus the numbers.
///
/// ```text
/// START: [■□□□□]  HIGH=1/5
/// STOP : [□■■■■]  LOWprefix=1/5
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub channel: Channel,
    pub length: u16,
    pub max_slots: u16,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.length.min(self.max_slots);
        let rest = self.max_slots - first;
        let first_glyph = match self.channel.polarity().first_level() {
            Level::High => FILLED,
            Level::Low => EMPTY,
        };
        let rest_glyph = if first_glyph == FILLED { EMPTY } else { FILLED };

        let (label, field) = match self.channel {
            Channel::Start => ("START", "HIGH"),
            Channel::Stop => ("STOP ", "LOWprefix"),
        };
        write!(f, "{}: [", label)?;
        for _ in 0..first {
            write!(f, "{}", first_glyph)?;
        }
        for _ in 0..rest {
            write!(f, "{}", rest_glyph)?;
        }
        write!(f, "]  {}={}/{}", field, first, self.max_slots)
    }
}

/// Start-up information: pins, frame timing and the key map.
pub struct Banner<'a> {
    pub tunables: &'a Tunables,
    /// (sync, start, stop) pin numbers, if the backend has pins.
    pub pins: Option<(u8, u8, u8)>,
    /// Frame rate reported by the backend, if it differs from the nominal one.
    pub frame_rate_hz: Option<u32>,
}

impl fmt::Display for Banner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pins {
            Some((sync, start, stop)) => write!(
                f,
                "SYNC on GPIO{}. START GPIO{} and STOP GPIO{} start together.\r\n",
                sync, start, stop
            )?,
            None => write!(f, "START and STOP start together.\r\n")?,
        }
        write!(
            f,
            "frame ~ {} Hz, slot ~ {} ns.\r\n{}",
            self.frame_rate_hz
                .unwrap_or_else(|| self.tunables.frame_rate_hz()),
            self.tunables.slot_nanos(),
            USAGE
        )
    }
}
