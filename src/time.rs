//! Time-related types based on the transceiver's 40-bit system time

use core::ops::Add;
use serde::{Deserialize, Serialize};

/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Mask applied to a delayed transmission time
///
/// The transceiver ignores the low 9 bits of the delayed transmit register, so
/// a frame scheduled at any instant actually leaves at that instant with those
/// bits cleared.
pub const TX_TIME_MASK: u64 = 0xfffffffe00;

/// Represents an instant in time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses. One
/// unit is 1 / (128 * 499.2 MHz), roughly 15.65 ps.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use twr_ds::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// let valid_instant   = Instant::new(TIME_MAX);
    /// let invalid_instant = Instant::new(TIME_MAX + 1);
    ///
    /// assert!(valid_instant.is_some());
    /// assert!(invalid_instant.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Creates an `Instant` from a raw register value, discarding bits above 40
    pub fn from_register(value: u64) -> Self {
        Instant(value & TIME_MAX)
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the low 32 bits, as carried in ranging frames
    pub fn low_u32(&self) -> u32 {
        self.0 as u32
    }

    /// Returns the instant a delayed transmission scheduled for `self` will
    /// actually start at
    pub fn tx_schedulable(&self) -> Instant {
        Instant(self.0 & TX_TIME_MASK)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both `Instant` and `Duration` are guaranteed to contain 40-bit
        // numbers, so this addition will never overflow.
        Instant((self.value() + rhs.value()) % (TIME_MAX + 1))
    }
}

/// A duration between two instants in system time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates a `Duration` from a number of UWB microseconds
    ///
    /// A UWB microsecond is 65536 system time units (about 1.026 us). This is
    /// the unit of the holdoff and timeout settings.
    pub fn from_uwb_micros(micros: u32) -> Self {
        // 32 bits shifted by 16 fit within 48 bits, so clamp to the 40-bit
        // range the same way the hardware register would.
        Duration(((micros as u64) << 16) & TIME_MAX)
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }
}
