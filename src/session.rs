//! The ranging session a double-sided exchange runs on
//!
//! A session owns the token that allows one exchange at a time, a ring of
//! frame buffers the exchange writes its timestamps into, and the
//! configuration and counters of the handlers working on it.

use core::num::Wrapping;

use crate::{
    frame::{Frame, MessageCode},
    stats::{Stat, Stats},
    Config,
};

/// Gate that allows one exchange per session
///
/// Taken by whoever starts an exchange, and handed back by the state machine
/// on every path that ends it. Whoever waits for an exchange to finish
/// observes it becoming available again.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Token {
    /// No exchange in progress
    Available,
    /// An exchange is in progress
    Busy,
}

/// A ranging session with a ring of `N` frames
#[derive(Debug)]
pub struct Session<const N: usize> {
    token: Token,
    frames: [Frame; N],
    idx: u16,
    awaiting: Option<MessageCode>,
    seq_num: Wrapping<u8>,
    config: Config,
    stats: Stats,
}

impl<const N: usize> Session<N> {
    /// Fails to build for rings of fewer than two slots, as an exchange always
    /// works on two neighbouring ones
    const RING_LEN_CHECK: () = assert!(N >= 2, "a session needs at least two frame slots");

    /// Creates an idle session
    ///
    /// `N` must be at least 2, which is checked at compile time.
    pub fn new(config: Config) -> Self {
        let () = Self::RING_LEN_CHECK;

        Session {
            token: Token::Available,
            frames: [Frame::default(); N],
            idx: 0,
            awaiting: None,
            seq_num: Wrapping(0),
            config,
            stats: Stats::default(),
        }
    }

    /// The state of the token
    pub fn token(&self) -> Token {
        self.token
    }

    /// Whether an exchange is in progress
    pub fn is_busy(&self) -> bool {
        self.token == Token::Busy
    }

    /// The message code the exchange in progress waits for next
    pub fn awaiting(&self) -> Option<MessageCode> {
        self.awaiting
    }

    /// The rolling ring index
    pub fn idx(&self) -> u16 {
        self.idx
    }

    /// Returns the frame in the slot for `idx`, modulo the ring size
    pub fn frame(&self, idx: u16) -> &Frame {
        &self.frames[idx as usize % N]
    }

    /// The slot the exchange is currently working on
    pub fn current(&self) -> &Frame {
        self.frame(self.idx)
    }

    /// The slot before the current one
    pub fn previous(&self) -> &Frame {
        self.frame(self.idx.wrapping_sub(1))
    }

    /// The session configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Changes the configuration
    ///
    /// Takes effect with the next frame that is sent.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// The session counters
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub(crate) fn frame_mut(&mut self, idx: u16) -> &mut Frame {
        &mut self.frames[idx as usize % N]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Frame {
        self.frame_mut(self.idx)
    }

    /// Takes the token for a new exchange that waits for `awaiting` first
    pub(crate) fn acquire(&mut self, awaiting: MessageCode) -> bool {
        if self.is_busy() {
            return false;
        }
        self.token = Token::Busy;
        self.awaiting = Some(awaiting);
        true
    }

    /// Hands the token back, ending the exchange
    ///
    /// Returns `false` if there was no exchange to end.
    pub(crate) fn release(&mut self) -> bool {
        self.awaiting = None;
        match self.token {
            Token::Busy => {
                self.token = Token::Available;
                true
            }
            Token::Available => false,
        }
    }

    pub(crate) fn await_next(&mut self, code: MessageCode) {
        self.awaiting = Some(code);
    }

    /// Moves the ring index to the next slot
    pub(crate) fn advance(&mut self) -> u16 {
        self.idx = self.idx.wrapping_add(1);
        self.idx
    }

    pub(crate) fn next_seq_num(&mut self) -> u8 {
        self.seq_num += Wrapping(1);
        self.seq_num.0
    }

    pub(crate) fn incr(&mut self, stat: Stat) {
        self.stats.incr(stat);
    }
}
