//! Single-slot, latest-wins mailbox between the control domain and one generator.
//!
//! The control side posts frame words whenever it likes; the generator takes at most one per
//! frame boundary. A post overwrites any word that has not been taken yet. There is no queue and
//! no backpressure, so neither side can ever wait on the other.
//!
//! Only loads and stores are used (no read-modify-write), which keeps this usable on
//! Cortex-M0+ where atomic CAS does not exist. Correctness relies on the take side clearing the
//! pending flag *before* reading the word, and the post side writing the word *before* raising
//! the flag; all accesses are `SeqCst` so these two orders are globally visible.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::codec::FrameWord;

pub struct Mailbox {
    word: AtomicU32,
    pending: AtomicBool,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
            pending: AtomicBool::new(false),
        }
    }

    /// Split into the writer and reader handle.
    ///
    /// Taking `&mut self` means only one pair can exist at a time, which is what makes this a
    /// single-writer, single-reader slot.
    pub fn split(&mut self) -> (Poster<'_>, Adopter<'_>) {
        let this = &*self;
        (Poster { mailbox: this }, Adopter { mailbox: this })
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-domain side of a [`Mailbox`].
pub struct Poster<'a> {
    mailbox: &'a Mailbox,
}

impl Poster<'_> {
    /// Stage `word`, replacing whatever was staged before and not yet taken.
    pub fn post(&mut self, word: FrameWord) {
        self.mailbox.word.store(word.raw(), Ordering::SeqCst);
        self.mailbox.pending.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.mailbox.is_pending()
    }
}

/// Generator side of a [`Mailbox`].
pub struct Adopter<'a> {
    mailbox: &'a Mailbox,
}

impl Adopter<'_> {
    /// Take the latest staged word, if one arrived since the last take.
    #[inline]
    pub fn take(&mut self) -> Option<FrameWord> {
        if !self.mailbox.pending.load(Ordering::SeqCst) {
            return None;
        }
        self.mailbox.pending.store(false, Ordering::SeqCst);
        Some(FrameWord::from_raw(self.mailbox.word.load(Ordering::SeqCst)))
    }
}
