//! Double-sided two-way ranging for DW1000-class UWB transceivers
//!
//! Two nodes measure the distance between them by exchanging four frames and
//! timestamping each transmission and reception with their own 40-bit clocks.
//! The [`DsTwr`] state machine drives one side of that exchange: it reacts to
//! frames the radio driver hands it, stamps timestamps into the frames of a
//! [`Session`], and asks the driver for precisely delayed replies.
//!
//! The radio driver is represented by the [`Radio`] trait, and calls into the
//! state machine through [`MacInterface`]. Nothing in this crate blocks or
//! keeps time; receive timeouts are armed in the driver.
//!
//! The distance itself is left to whoever listens for completed exchanges
//! (see [`Listener`]). Both timestamp sets they receive are complete, so the
//! usual double-sided formula can be applied directly.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod frame;
pub mod listener;
pub mod phy;
pub mod radio;
pub mod session;
pub mod stats;
pub mod time;
pub mod twr_ds;

pub use ieee802154::mac::ShortAddress;

pub use crate::{
    config::{ClockSync, Config, Role},
    error::{Error, FrameError},
    frame::{Frame, Layout, MessageCode},
    listener::{Completed, Listener, Listeners},
    radio::{AfterTx, MacInterface, ProtocolId, Radio, RxFrame, RxMode, SendTime},
    session::{Session, Token},
    stats::{Stat, Stats},
    time::{Duration, Instant},
    twr_ds::DsTwr,
};
