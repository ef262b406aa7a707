//! LCLS1 BSA stream frame layout.
//!
//! Each read from the link-node stream delivers exactly one frame of
//! [`FRAME_SIZE`] bytes made of 32-bit little-endian words:
//!
//! ```text
//! word   offset  field
//! ----   ------  ---------------------------------
//!  0       0     header
//!  1       4     timestamp high word
//!  2       8     timestamp low word
//!  3..8   12     dmod[6]   (mode / diagnostic)
//!  9      36     edefInit
//! 10      40     edefMajor
//! 11      44     edefMinor
//! 12      48     edefAvgDn
//! 13..36  52     data[24]
//! ```
//!
//! Decoding reads fixed offsets into named fields; it never reinterprets
//! the buffer in place. A buffer of any other length is rejected as a whole.

use std::fmt;

use crate::error::FrameError;
use crate::timestamp::BsaTimestamp;

/// Width of one stream word in bytes.
pub const WORD_SIZE: usize = 4;
/// Number of mode/diagnostic words.
pub const DMOD_WORDS: usize = 6;
/// Number of data words, one per BSA channel.
pub const DATA_WORDS: usize = 24;
/// Total number of words in a frame.
pub const FRAME_WORDS: usize = 1 + 2 + DMOD_WORDS + 4 + DATA_WORDS;
/// Total frame size in bytes.
pub const FRAME_SIZE: usize = FRAME_WORDS * WORD_SIZE;

const HEADER_WORD: usize = 0;
const TIMESTAMP_HIGH_WORD: usize = 1;
const TIMESTAMP_LOW_WORD: usize = 2;
const DMOD_WORD: usize = 3;
const EDEF_INIT_WORD: usize = DMOD_WORD + DMOD_WORDS;
const EDEF_MAJOR_WORD: usize = EDEF_INIT_WORD + 1;
const EDEF_MINOR_WORD: usize = EDEF_INIT_WORD + 2;
const EDEF_AVG_DONE_WORD: usize = EDEF_INIT_WORD + 3;
const DATA_WORD: usize = EDEF_INIT_WORD + 4;

/// One decoded stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamFrame {
    /// Frame header word
    pub header: u32,
    /// Timestamp word at the "high" position
    pub timestamp_high: u32,
    /// Timestamp word at the "low" position
    pub timestamp_low: u32,
    /// Mode / diagnostic words
    pub dmod: [u32; DMOD_WORDS],
    /// Event definition: init
    pub edef_init: u32,
    /// Event definition: major
    pub edef_major: u32,
    /// Event definition: minor
    pub edef_minor: u32,
    /// Event definition: average done
    pub edef_avg_done: u32,
    /// BSA channel data, indexed by channel
    pub data: [u32; DATA_WORDS],
}

#[inline]
fn word(buf: &[u8], index: usize) -> u32 {
    let start = index * WORD_SIZE;
    let mut bytes = [0u8; WORD_SIZE];
    bytes.copy_from_slice(&buf[start..start + WORD_SIZE]);
    u32::from_le_bytes(bytes)
}

/// Decode a frame from a buffer holding exactly [`FRAME_SIZE`] bytes.
pub fn decode(buf: &[u8]) -> Result<StreamFrame, FrameError> {
    if buf.len() != FRAME_SIZE {
        return Err(FrameError::SizeMismatch {
            got: buf.len(),
            expected: FRAME_SIZE,
        });
    }

    Ok(StreamFrame {
        header: word(buf, HEADER_WORD),
        timestamp_high: word(buf, TIMESTAMP_HIGH_WORD),
        timestamp_low: word(buf, TIMESTAMP_LOW_WORD),
        dmod: std::array::from_fn(|i| word(buf, DMOD_WORD + i)),
        edef_init: word(buf, EDEF_INIT_WORD),
        edef_major: word(buf, EDEF_MAJOR_WORD),
        edef_minor: word(buf, EDEF_MINOR_WORD),
        edef_avg_done: word(buf, EDEF_AVG_DONE_WORD),
        data: std::array::from_fn(|i| word(buf, DATA_WORD + i)),
    })
}

impl StreamFrame {
    /// Encode the frame into its wire representation.
    ///
    /// Used to build replay files and test fixtures.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut words = [0u32; FRAME_WORDS];
        words[HEADER_WORD] = self.header;
        words[TIMESTAMP_HIGH_WORD] = self.timestamp_high;
        words[TIMESTAMP_LOW_WORD] = self.timestamp_low;
        words[DMOD_WORD..DMOD_WORD + DMOD_WORDS].copy_from_slice(&self.dmod);
        words[EDEF_INIT_WORD] = self.edef_init;
        words[EDEF_MAJOR_WORD] = self.edef_major;
        words[EDEF_MINOR_WORD] = self.edef_minor;
        words[EDEF_AVG_DONE_WORD] = self.edef_avg_done;
        words[DATA_WORD..DATA_WORD + DATA_WORDS].copy_from_slice(&self.data);

        let mut buf = [0u8; FRAME_SIZE];
        for (chunk, w) in buf.chunks_exact_mut(WORD_SIZE).zip(words.iter()) {
            chunk.copy_from_slice(&w.to_le_bytes());
        }
        buf
    }

    /// Channel value as archived: the raw data word widened to `f64`.
    pub fn value(&self, channel: usize) -> Option<f64> {
        self.data.get(channel).map(|&w| f64::from(w))
    }
}

/// Human-readable dump of a frame, printed periodically in debug mode.
pub struct FrameDump<'a> {
    /// Decoded frame
    pub frame: &'a StreamFrame,
    /// Timestamp after word-order correction
    pub timestamp: BsaTimestamp,
    /// Running frame counter
    pub counter: u64,
}

impl fmt::Display for FrameDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fr = self.frame;
        writeln!(f, "Stream data:")?;
        writeln!(f, "===================")?;
        writeln!(f, "Header     = 0x{:x}", fr.header)?;
        writeln!(
            f,
            "Time stamp = 0x{:x}, {:x}",
            self.timestamp.seconds_past_epoch, self.timestamp.nanoseconds
        )?;
        for dmod in &fr.dmod {
            writeln!(f, "DMOD       = 0x{:x}", dmod)?;
        }
        writeln!(f, "edefInit   = 0x{:x}", fr.edef_init)?;
        writeln!(f, "edefMajor  = 0x{:x}", fr.edef_major)?;
        writeln!(f, "edefMinor  = 0x{:x}", fr.edef_minor)?;
        writeln!(f, "edefAvgDn  = 0x{:x}", fr.edef_avg_done)?;
        for (i, d) in fr.data.iter().enumerate() {
            writeln!(f, "DATA[{:2}]   = {}", i, d)?;
        }
        writeln!(f, "===================")?;
        write!(f, "Stream received counter = {}", self.counter)
    }
}
