//! Timestamp reconstruction for stream frames.
//!
//! The link-node firmware delivers the frame timestamp as two 32-bit words.
//! Current firmware swaps their order, so the word at the "high" position
//! carries seconds past the EPICS epoch and the word at the "low" position
//! carries nanoseconds. [`TimestampPolicy::SwappedWords`] compensates for
//! this and is the default. Once the firmware is fixed upstream, select
//! [`TimestampPolicy::NativeOrder`] in the stream configuration.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds between the UNIX epoch and the EPICS epoch (1990-01-01 UTC).
pub const EPICS_EPOCH_OFFSET_SECS: i64 = 631_152_000;

/// A corrected BSA timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BsaTimestamp {
    /// Seconds past the EPICS epoch
    pub seconds_past_epoch: u32,
    /// Nanoseconds within the second
    pub nanoseconds: u32,
}

impl BsaTimestamp {
    /// Create a timestamp from its two parts.
    pub fn new(seconds_past_epoch: u32, nanoseconds: u32) -> Self {
        Self {
            seconds_past_epoch,
            nanoseconds,
        }
    }

    /// Convert to wall-clock UTC time.
    ///
    /// Returns `None` if the nanosecond field is out of range.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let secs = EPICS_EPOCH_OFFSET_SECS + i64::from(self.seconds_past_epoch);
        Utc.timestamp_opt(secs, self.nanoseconds).single()
    }
}

impl fmt::Display for BsaTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds_past_epoch, self.nanoseconds)
    }
}

/// How the two timestamp words of a frame map onto seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Firmware word-swap workaround: the high word holds seconds,
    /// the low word holds nanoseconds.
    #[default]
    SwappedWords,
    /// Unswapped firmware: the low word holds seconds,
    /// the high word holds nanoseconds.
    NativeOrder,
}

impl TimestampPolicy {
    /// Reassemble a timestamp from the frame's two words.
    pub fn correct(self, timestamp_high: u32, timestamp_low: u32) -> BsaTimestamp {
        match self {
            Self::SwappedWords => BsaTimestamp::new(timestamp_high, timestamp_low),
            Self::NativeOrder => BsaTimestamp::new(timestamp_low, timestamp_high),
        }
    }
}
