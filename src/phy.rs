//! PHY parameters that determine how long a frame is on air
//!
//! The receive timeout armed after each ranging transmission has to cover the
//! duration of the frame the other side is going to send back. That duration
//! depends on the PHY configuration the radio uses, which is described here.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The bitrate at which a message is transmitted
pub enum BitRate {
    /// 110 kilobits per second.
    /// This is an unofficial extension from decawave.
    Kbps110 = 0b00,
    /// 850 kilobits per second.
    Kbps850 = 0b01,
    /// 6.8 megabits per second.
    Kbps6800 = 0b10,
}

impl Default for BitRate {
    fn default() -> Self {
        BitRate::Kbps6800
    }
}

impl BitRate {
    /// Duration of one PHY header bit, in picoseconds
    ///
    /// The PHY header is sent at 850 kbps unless the data rate is 110 kbps.
    fn phr_symbol_ps(&self) -> u64 {
        match self {
            BitRate::Kbps110 => 8_205_130,
            BitRate::Kbps850 | BitRate::Kbps6800 => 1_025_640,
        }
    }

    /// Duration of one payload bit, in picoseconds
    fn data_symbol_ps(&self) -> u64 {
        match self {
            BitRate::Kbps110 => 8_205_130,
            BitRate::Kbps850 => 1_025_640,
            BitRate::Kbps6800 => 128_210,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The PRF value
pub enum PulseRepetitionFrequency {
    /// 16 megahertz
    Mhz16 = 0b01,
    /// 64 megahertz
    Mhz64 = 0b10,
}

impl Default for PulseRepetitionFrequency {
    fn default() -> Self {
        PulseRepetitionFrequency::Mhz16
    }
}

impl PulseRepetitionFrequency {
    /// Duration of one preamble symbol, in picoseconds
    fn preamble_symbol_ps(&self) -> u64 {
        match self {
            PulseRepetitionFrequency::Mhz16 => 993_590,
            PulseRepetitionFrequency::Mhz64 => 1_017_630,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// An enum that specifies the length of the preamble.
///
/// Longer preambles improve the reception quality and thus range.
/// This comes at the cost of longer transmission times and thus power consumption and bandwidth use.
pub enum PreambleLength {
    /// 64 bits of preamble.
    Bits64,
    /// 128 bits of preamble.
    Bits128,
    /// 256 bits of preamble.
    Bits256,
    /// 512 bits of preamble.
    Bits512,
    /// 1024 bits of preamble.
    Bits1024,
    /// 1536 bits of preamble.
    Bits1536,
    /// 2048 bits of preamble.
    Bits2048,
    /// 4096 bits of preamble.
    Bits4096,
}

impl Default for PreambleLength {
    fn default() -> Self {
        PreambleLength::Bits128
    }
}

impl PreambleLength {
    /// Number of preamble symbols
    pub fn symbols(&self) -> u64 {
        match self {
            PreambleLength::Bits64 => 64,
            PreambleLength::Bits128 => 128,
            PreambleLength::Bits256 => 256,
            PreambleLength::Bits512 => 512,
            PreambleLength::Bits1024 => 1024,
            PreambleLength::Bits1536 => 1536,
            PreambleLength::Bits2048 => 2048,
            PreambleLength::Bits4096 => 4096,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// An enum that allows the selection between different SFD sequences
pub enum SfdSequence {
    /// The standard sequence defined by the IEEE standard.
    IEEE,
    /// A sequence defined by Decawave that is supposed to be more robust.
    /// This is an unofficial addition.
    Decawave,
}

impl Default for SfdSequence {
    fn default() -> Self {
        SfdSequence::IEEE
    }
}

/// Number of PHY header bits
const PHR_BITS: u64 = 21;

/// Reed-Solomon adds 48 parity bits per block of up to 330 data bits
const RS_BLOCK_BITS: u64 = 330;
const RS_PARITY_BITS: u64 = 48;

/// PHY configuration of a transmission
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhyConfig {
    /// Sets the bitrate of the transmission
    pub bitrate: BitRate,
    /// Sets the PRF value of the transmission
    pub pulse_repetition_frequency: PulseRepetitionFrequency,
    /// The length of the preamble
    pub preamble_length: PreambleLength,
    /// The SFD sequence that is used to transmit a frame.
    pub sfd_sequence: SfdSequence,
}

impl PhyConfig {
    /// Number of SFD symbols for this bitrate and sequence
    fn sfd_symbols(&self) -> u64 {
        match (self.bitrate, self.sfd_sequence) {
            (BitRate::Kbps110, _) => 64,
            (BitRate::Kbps850, SfdSequence::Decawave) => 16,
            _ => 8,
        }
    }

    /// Returns the on-air duration of a frame of `len` bytes, in UWB
    /// microseconds, rounded up
    ///
    /// Covers the synchronisation header (preamble and SFD), the PHY header and
    /// the Reed-Solomon encoded payload.
    pub fn frame_duration(&self, len: usize) -> u16 {
        let shr_ps = (self.preamble_length.symbols() + self.sfd_symbols())
            * self.pulse_repetition_frequency.preamble_symbol_ps();
        let phr_ps = PHR_BITS * self.bitrate.phr_symbol_ps();

        let data_bits = len as u64 * 8;
        let rs_blocks = (data_bits + RS_BLOCK_BITS - 1) / RS_BLOCK_BITS;
        let data_ps = (data_bits + RS_PARITY_BITS * rs_blocks) * self.bitrate.data_symbol_ps();

        let total_ps = shr_ps + phr_ps + data_ps;
        let micros = (total_ps + 999_999) / 1_000_000;

        if micros > u16::MAX as u64 {
            u16::MAX
        } else {
            micros as u16
        }
    }
}
