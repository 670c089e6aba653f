//! Frame Word codec.
//!
//! A frame word carries both span lengths of one frame in a single 32-bit value:
//!
//! ```text
//!  31            16 15             0
//! ┌────────────────┬────────────────┐
//! │    low_len     │    high_len    │
//! └────────────────┴────────────────┘
//! ```
//!
//! Both channels use this packing. What differs is the order in which the halves are emitted:
//! a HIGH-first channel takes the low half first, a LOW-first channel the high half first. On
//! the PIO this is the OSR shift direction; in software it is [`Polarity::spans`].
//!
//! The codec does not validate. Bounds are the length controller's business.

use bytemuck::{Pod, Zeroable};

/// Output pin level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Which level a channel emits first within its frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    /// HIGH span, then LOW span (START style).
    HighFirst,
    /// LOW span, then HIGH span (STOP style).
    LowFirst,
}

/// A contiguous run of slots held at one level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub level: Level,
    pub slots: u16,
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameWord(u32);

impl FrameWord {
    pub const fn encode(low_len: u16, high_len: u16) -> Self {
        Self(((low_len as u32) << 16) | high_len as u32)
    }

    pub const fn decode(self) -> (u16, u16) {
        ((self.0 >> 16) as u16, self.0 as u16)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Total slots this word describes.
    pub fn total(self) -> u32 {
        let (low, high) = self.decode();
        low as u32 + high as u32
    }
}

impl From<FrameWord> for u32 {
    fn from(word: FrameWord) -> u32 {
        word.0
    }
}

impl Polarity {
    /// The two spans of `word` in emission order.
    pub fn spans(self, word: FrameWord) -> [Span; 2] {
        let (low, high) = word.decode();
        let high = Span {
            level: Level::High,
            slots: high,
        };
        let low = Span {
            level: Level::Low,
            slots: low,
        };
        match self {
            Polarity::HighFirst => [high, low],
            Polarity::LowFirst => [low, high],
        }
    }

    pub fn first_level(self) -> Level {
        match self {
            Polarity::HighFirst => Level::High,
            Polarity::LowFirst => Level::Low,
        }
    }
}

/// The two generator channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// Channel A.
    Start,
    /// Channel B.
    Stop,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Start, Channel::Stop];

    pub fn polarity(self) -> Polarity {
        match self {
            Channel::Start => Polarity::HighFirst,
            Channel::Stop => Polarity::LowFirst,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Channel::Start => 0,
            Channel::Stop => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Start => "START",
            Channel::Stop => "STOP",
        }
    }

    /// Frame word for a first-phase length of `len` out of `max_slots`.
    ///
    /// START counts its HIGH window, STOP counts its LOW prefix. `len` is clamped to
    /// `max_slots`.
    pub fn word(self, len: u16, max_slots: u16) -> FrameWord {
        let first = len.min(max_slots);
        let rest = max_slots - first;
        match self {
            Channel::Start => FrameWord::encode(rest, first),
            Channel::Stop => FrameWord::encode(first, rest),
        }
    }
}
