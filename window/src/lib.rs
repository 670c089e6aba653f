//! # window
//!
//! Core of the dual-channel pulse-window generator.
//!
//! Two channels (START and STOP) each repeat a frame of fixed length split into a HIGH span and
//! a LOW span. The split is changed at run time through a single-slot mailbox that the generator
//! only looks at on its own frame boundary, so a frame is never torn.
//!
//! ```text
//! Interpreter ──▶ Lifecycle ──▶ LengthController ──▶ FrameWord ──▶ Mailbox ──▶ ChannelGenerator
//!                     │                                                          ▲
//!                     └──────────────▶ Synchronizer ──▶ sync line ───────────────┘
//! ```
//!
//! Nothing in here allocates or blocks; the crate is `no_std` outside of tests.

#![cfg_attr(not(test), no_std)]

pub mod codec;
pub mod command;
pub mod controller;
pub mod generator;
pub mod lifecycle;
pub mod mailbox;
pub mod status;
pub mod sync;
pub mod tunables;

pub use codec::{Channel, FrameWord, Level, Polarity, Span};
pub use command::{Command, CommandError, Input, Interpreter, LineAssembler};
pub use controller::{LengthController, Session, Update};
pub use generator::{Activation, ChannelGenerator, Slot};
pub use lifecycle::{Backend, Flow, Lifecycle, Phase};
pub use mailbox::{Adopter, Mailbox, Poster};
pub use status::{Banner, StatusLine};
pub use sync::{LineDriver, LineProbe, SyncLine, Synchronizer};
pub use tunables::{Tunables, TunablesError};

/// Control-domain clock. Same type as the RP2040 timer's instant.
pub type Instant = fugit::TimerInstantU64<1_000_000>;
