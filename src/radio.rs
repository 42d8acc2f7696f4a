//! Interface to the radio driver
//!
//! The ranging handlers don't talk to hardware. The driver implements
//! [`Radio`] to schedule transmissions and report timestamps, and calls into
//! the handler sets it has registered through [`MacInterface`] whenever a
//! frame was received, the radio was reset, or a transmission could not be
//! scheduled.

use core::fmt;

use ieee802154::mac::ShortAddress;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::time::{Duration, Instant};

/// The time at which a transmission will start
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendTime {
    /// As fast as possible
    Now,
    /// At the given instant, with its low 9 bits ignored by the hardware
    Delayed(Instant),
}

/// What the radio should do after a transmission
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AfterTx {
    /// Go idle
    Idle,
    /// Turn on the receiver, and give up on the reply after the given number
    /// of UWB microseconds
    WaitForResponse {
        /// Receive timeout
        timeout: u32,
    },
}

/// Receiver settings that matter to the handlers
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RxMode {
    /// Both receive buffers are in use
    pub double_buffered: bool,
    /// The receiver is re-enabled automatically after each frame
    pub rx_auto_reenable: bool,
}

/// A radio driver, as seen by the ranging handlers
pub trait Radio {
    /// Error reported when a transmission or reception can't be started
    type Error: fmt::Debug;

    /// This node's short address
    fn short_address(&self) -> ShortAddress;

    /// This node's transmit antenna delay
    fn tx_antenna_delay(&self) -> Duration;

    /// When the last frame actually left the antenna
    ///
    /// Read from the transmit timestamp register, so it is only known after
    /// the transmission.
    fn tx_timestamp(&mut self) -> Instant;

    /// On-air duration of a frame of `len` bytes, in UWB microseconds
    fn frame_duration(&self, len: usize) -> u16;

    /// Current receiver settings
    fn rx_mode(&self) -> RxMode;

    /// Starts sending `frame`
    ///
    /// An error means the transmission could not be scheduled, for example
    /// because the delayed send time had already passed.
    fn start_tx(&mut self, frame: &[u8], time: SendTime, after: AfterTx)
        -> Result<(), Self::Error>;

    /// Turns on the receiver, with an optional timeout in UWB microseconds
    fn start_rx(&mut self, timeout: Option<u32>) -> Result<(), Self::Error>;

    /// Turns the receiver off, discarding any pending receive timeout
    fn stop_rx(&mut self);
}

/// A frame delivered by the driver's receive-complete event
#[derive(Clone, Copy, Debug)]
pub struct RxFrame<'a> {
    /// The frame payload as received
    pub bytes: &'a [u8],

    /// When the frame arrived
    pub rx_timestamp: Instant,

    /// Whether the leading-edge detection produced a usable timestamp
    pub timestamp_valid: bool,

    /// Carrier frequency offset estimate measured for this frame
    pub carrier_integrator: i32,
}

/// Identifies a handler set registered with the driver
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ProtocolId {
    /// Generic ranging
    Rng = 0x0010,
    /// Single-sided two-way ranging
    RngSs = 0x0011,
    /// Double-sided two-way ranging
    RngDs = 0x0012,
    /// Simultaneous ranging with multiple nodes
    Nrng = 0x0013,
    /// Clock calibration beacon
    Ccp = 0x0020,
}

/// A set of handlers the driver calls on radio events
///
/// Several handler sets can be registered with one radio. The driver decides
/// in what order it offers an event to them. Each hook returns whether the
/// handler set dealt with the event.
pub trait MacInterface<R: Radio> {
    /// Identifies this handler set
    fn id(&self) -> ProtocolId;

    /// A frame was received
    fn rx_complete(&mut self, radio: &mut R, frame: &RxFrame) -> bool;

    /// The radio was reset, abandoning whatever it was doing
    fn reset(&mut self, radio: &mut R) -> bool;

    /// A transmission requested by someone else could not be scheduled
    fn start_tx_error(&mut self, radio: &mut R) -> bool;
}
