//! Session-wide exchange configuration
//!
//! Both delays are in UWB microseconds (65536 system time units, about
//! 1.026 us), the unit of the transceiver's receive timeout register.

use serde::{Deserialize, Serialize};

use crate::time::Duration;

/// Default for [`Config::tx_holdoff_delay`]
pub const TX_HOLDOFF: u32 = 0x0300;

/// Default for [`Config::rx_timeout_delay`]
pub const RX_TIMEOUT: u16 = 0x0030;

/// Whether wireless clock synchronization is correcting the clocks
///
/// Decides what goes into the carrier-integrator field of outgoing ranging
/// frames.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSync {
    /// Clocks are free-running; frames carry the measured carrier integrator
    Disabled,
    /// Clocks are aligned by another process; frames carry zero
    Enabled,
}

impl Default for ClockSync {
    fn default() -> Self {
        ClockSync::Disabled
    }
}

/// The side of the exchange a node is on
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Sent the initial request
    Requester,
    /// Answered the initial request
    Responder,
}

impl ClockSync {
    /// Returns the carrier-integrator value to stamp into an outgoing frame
    ///
    /// The responder stores the negated measurement, the requester the raw
    /// one. Both store zero while clock synchronization is active.
    pub fn carrier_integrator(&self, measured: i32, role: Role) -> i32 {
        match (self, role) {
            (ClockSync::Enabled, _) => 0,
            (ClockSync::Disabled, Role::Requester) => measured,
            (ClockSync::Disabled, Role::Responder) => measured.wrapping_neg(),
        }
    }
}

/// Configuration of a ranging session
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct Config {
    /// Minimum delay between receiving a frame and sending the reply
    ///
    /// Gives the transceiver time to arm the delayed transmission.
    pub tx_holdoff_delay: u32,

    /// How long to wait for the next message, on top of its duration and the
    /// remote holdoff
    pub rx_timeout_delay: u16,

    /// Carrier-integrator policy
    pub clock_sync: ClockSync,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tx_holdoff_delay: TX_HOLDOFF,
            rx_timeout_delay: RX_TIMEOUT,
            clock_sync: ClockSync::default(),
        }
    }
}

impl Config {
    /// Buffer size that fits an encoded configuration
    pub const ENCODED_LEN: usize = 16;

    /// Decodes a configuration that was stored with [`Config::encode`]
    ///
    /// A blob shorter than an encoded configuration is rejected with
    /// [`ssmarshal::Error::EndOfStream`].
    pub fn decode(bytes: &[u8]) -> Result<Self, ssmarshal::Error> {
        // ssmarshal debug-asserts on running out of input, so the length is
        // checked up front. Every configuration encodes to the same size.
        let mut buf = [0; Self::ENCODED_LEN];
        if bytes.len() < Config::default().encode(&mut buf)? {
            return Err(ssmarshal::Error::EndOfStream);
        }

        let (config, _) = ssmarshal::deserialize::<Config>(bytes)?;
        Ok(config)
    }

    /// Encodes this configuration into `buf`, returning the number of bytes
    /// written
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, ssmarshal::Error> {
        ssmarshal::serialize(buf, self)
    }

    /// The holdoff as a duration in system time
    pub fn tx_holdoff(&self) -> Duration {
        Duration::from_uwb_micros(self.tx_holdoff_delay)
    }

    /// The receive timeout to arm after sending a frame whose reply takes
    /// `frame_duration` to transmit
    pub fn rx_timeout(&self, frame_duration: u16) -> u32 {
        frame_duration as u32 + self.rx_timeout_delay as u32 + self.tx_holdoff_delay
    }
}
