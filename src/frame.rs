//! Wire format of the double-sided ranging messages
//!
//! All four messages share one record. Which fields are on the wire depends on
//! the message's [`Layout`]:
//!
//! | Field                    | Request | Response | Final |
//! |--------------------------|---------|----------|-------|
//! | `code`, `seq_num`        | x       | x        | x     |
//! | `dst_address`, `src_address` | x   | x        | x     |
//! | `reception_timestamp`    |         | x        | x     |
//! | `transmission_timestamp` |         | x        | x     |
//! | `carrier_integrator`     |         | x        | x     |
//! | `request_timestamp`      |         |          | x     |
//! | `response_timestamp`     |         |          | x     |
//!
//! Multi-byte fields are little-endian, in the order listed above.
//!
//! A [`Frame`] is used as a ring slot: receiving a shorter layout into it only
//! overwrites the fields that layout carries, and leaves the rest as they were.

use core::convert::TryFrom;

use byte::{check_len, BytesExt, TryRead, TryWrite, LE};
use ieee802154::mac::ShortAddress;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::FrameError;

/// Message code of a double-sided ranging frame
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageCode {
    /// Initial request, sent by the requester
    DsTwr = 0x30,
    /// First response, sent by the responder
    DsTwrT1 = 0x31,
    /// Second request, sent by the requester, carrying its first round trip
    DsTwrT2 = 0x32,
    /// Final report, sent by the responder
    DsTwrFinal = 0x33,
}

impl MessageCode {
    /// The layout a frame with this code is sent with
    pub fn layout(&self) -> Layout {
        match self {
            MessageCode::DsTwr => Layout::Request,
            MessageCode::DsTwrT1 => Layout::Response,
            MessageCode::DsTwrT2 | MessageCode::DsTwrFinal => Layout::Final,
        }
    }
}

/// The three frame sizes that occur in an exchange
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Layout {
    /// Header only
    Request,
    /// Header, reception and transmission timestamps, carrier integrator
    Response,
    /// Response layout plus request and response timestamps
    Final,
}

impl Layout {
    /// Length of the header in bytes
    pub const HEADER_LEN: usize = 6;

    /// Length of the largest layout in bytes
    pub const MAX_LEN: usize = 26;

    /// Length of this layout in bytes
    pub fn len(&self) -> usize {
        match self {
            Layout::Request => Self::HEADER_LEN,
            Layout::Response => 18,
            Layout::Final => Self::MAX_LEN,
        }
    }
}

/// A double-sided ranging frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Frame {
    /// Identifies the stage of the exchange
    pub code: MessageCode,
    /// Sequence number
    pub seq_num: u8,
    /// Address of the recipient
    pub dst_address: ShortAddress,
    /// Address of the sender
    pub src_address: ShortAddress,
    /// When the sender received the frame it is replying to
    pub reception_timestamp: u32,
    /// When the sender transmits this frame
    pub transmission_timestamp: u32,
    /// Carrier frequency offset estimate of the sender
    pub carrier_integrator: i32,
    /// When the previous round trip started, in local time of its initiator
    pub request_timestamp: u32,
    /// When the previous round trip ended, in local time of its initiator
    pub response_timestamp: u32,
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            code: MessageCode::DsTwr,
            seq_num: 0,
            dst_address: ShortAddress(0),
            src_address: ShortAddress(0),
            reception_timestamp: 0,
            transmission_timestamp: 0,
            carrier_integrator: 0,
            request_timestamp: 0,
            response_timestamp: 0,
        }
    }
}

impl Frame {
    /// Reads the message code of a received frame without decoding the rest
    pub fn peek_code(bytes: &[u8]) -> Result<MessageCode, FrameError> {
        let raw = *bytes.first().ok_or(FrameError::Length {
            expected: Layout::HEADER_LEN,
            actual: bytes.len(),
        })?;
        MessageCode::try_from(raw).map_err(|_| FrameError::UnknownCode(raw))
    }

    /// Loads a received frame image into this slot
    ///
    /// `bytes` must be exactly as long as `layout`. Only the fields present in
    /// `layout` are overwritten. If an error is returned, the slot is left
    /// untouched.
    pub fn load(&mut self, bytes: &[u8], layout: Layout) -> Result<(), FrameError> {
        if bytes.len() != layout.len() {
            return Err(FrameError::Length {
                expected: layout.len(),
                actual: bytes.len(),
            });
        }

        let offset = &mut 0;
        let header: Header = bytes.read(offset)?;
        let response: Option<ResponseFields> = match layout {
            Layout::Request => None,
            Layout::Response | Layout::Final => Some(bytes.read(offset)?),
        };
        let round_trip: Option<RoundTrip> = match layout {
            Layout::Final => Some(bytes.read(offset)?),
            Layout::Request | Layout::Response => None,
        };

        self.code = header.code;
        self.seq_num = header.seq_num;
        self.dst_address = header.dst_address;
        self.src_address = header.src_address;
        if let Some(response) = response {
            self.reception_timestamp = response.reception_timestamp;
            self.transmission_timestamp = response.transmission_timestamp;
            self.carrier_integrator = response.carrier_integrator;
        }
        if let Some(round_trip) = round_trip {
            self.request_timestamp = round_trip.request_timestamp;
            self.response_timestamp = round_trip.response_timestamp;
        }

        Ok(())
    }

    /// Encodes the fields present in `layout` into `buf`
    ///
    /// Returns the number of bytes written, which is always `layout.len()`.
    pub fn encode(&self, buf: &mut [u8], layout: Layout) -> Result<usize, FrameError> {
        let offset = &mut 0;
        buf.write(
            offset,
            Header {
                code: self.code,
                seq_num: self.seq_num,
                dst_address: self.dst_address,
                src_address: self.src_address,
            },
        )?;
        if layout != Layout::Request {
            buf.write(
                offset,
                ResponseFields {
                    reception_timestamp: self.reception_timestamp,
                    transmission_timestamp: self.transmission_timestamp,
                    carrier_integrator: self.carrier_integrator,
                },
            )?;
        }
        if layout == Layout::Final {
            buf.write(
                offset,
                RoundTrip {
                    request_timestamp: self.request_timestamp,
                    response_timestamp: self.response_timestamp,
                },
            )?;
        }

        Ok(*offset)
    }
}

struct Header {
    code: MessageCode,
    seq_num: u8,
    dst_address: ShortAddress,
    src_address: ShortAddress,
}

impl<'a> TryRead<'a> for Header {
    fn try_read(bytes: &'a [u8], _: ()) -> byte::Result<(Self, usize)> {
        check_len(bytes, Layout::HEADER_LEN)?;
        let offset = &mut 0;
        let code = MessageCode::try_from(bytes.read_with::<u8>(offset, LE)?).map_err(|_| {
            byte::Error::BadInput {
                err: "unknown message code",
            }
        })?;
        let seq_num = bytes.read_with(offset, LE)?;
        let dst_address = ShortAddress(bytes.read_with(offset, LE)?);
        let src_address = ShortAddress(bytes.read_with(offset, LE)?);

        Ok((
            Header {
                code,
                seq_num,
                dst_address,
                src_address,
            },
            *offset,
        ))
    }
}

impl TryWrite for Header {
    fn try_write(self, bytes: &mut [u8], _: ()) -> byte::Result<usize> {
        check_len(bytes, Layout::HEADER_LEN)?;
        let offset = &mut 0;
        bytes.write_with::<u8>(offset, self.code.into(), LE)?;
        bytes.write_with(offset, self.seq_num, LE)?;
        bytes.write_with(offset, self.dst_address.0, LE)?;
        bytes.write_with(offset, self.src_address.0, LE)?;
        Ok(*offset)
    }
}

struct ResponseFields {
    reception_timestamp: u32,
    transmission_timestamp: u32,
    carrier_integrator: i32,
}

impl<'a> TryRead<'a> for ResponseFields {
    fn try_read(bytes: &'a [u8], _: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let reception_timestamp = bytes.read_with(offset, LE)?;
        let transmission_timestamp = bytes.read_with(offset, LE)?;
        let carrier_integrator = bytes.read_with(offset, LE)?;

        Ok((
            ResponseFields {
                reception_timestamp,
                transmission_timestamp,
                carrier_integrator,
            },
            *offset,
        ))
    }
}

impl TryWrite for ResponseFields {
    fn try_write(self, bytes: &mut [u8], _: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write_with(offset, self.reception_timestamp, LE)?;
        bytes.write_with(offset, self.transmission_timestamp, LE)?;
        bytes.write_with(offset, self.carrier_integrator, LE)?;
        Ok(*offset)
    }
}

struct RoundTrip {
    request_timestamp: u32,
    response_timestamp: u32,
}

impl<'a> TryRead<'a> for RoundTrip {
    fn try_read(bytes: &'a [u8], _: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let request_timestamp = bytes.read_with(offset, LE)?;
        let response_timestamp = bytes.read_with(offset, LE)?;

        Ok((
            RoundTrip {
                request_timestamp,
                response_timestamp,
            },
            *offset,
        ))
    }
}

impl TryWrite for RoundTrip {
    fn try_write(self, bytes: &mut [u8], _: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write_with(offset, self.request_timestamp, LE)?;
        bytes.write_with(offset, self.response_timestamp, LE)?;
        Ok(*offset)
    }
}
