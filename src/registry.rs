//! BSA channel registry.
//!
//! The 24 data words of a frame are archived under fixed logical names. The
//! order of [`CHANNEL_NAMES`] matches the order of the data words in the
//! firmware stream, and the archived name of each channel is
//! `"<record prefix>:<logical name>"`.

use tracing::info;

use crate::archive::{ChannelHandle, ChannelRegistrar};
use crate::error::{BsaError, Result};
use crate::frame::DATA_WORDS;

/// Number of BSA channels per frame.
pub const CHANNEL_COUNT: usize = DATA_WORDS;

/// Category part of the logical channel names.
pub const CHANNEL_CATEGORY: &str = "LC1_BSA";

/// Logical channel names, indexed by data word.
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = [
    "LC1_BSA_00",
    "LC1_BSA_01",
    "LC1_BSA_02",
    "LC1_BSA_03",
    "LC1_BSA_04",
    "LC1_BSA_05",
    "LC1_BSA_06",
    "LC1_BSA_07",
    "LC1_BSA_08",
    "LC1_BSA_09",
    "LC1_BSA_10",
    "LC1_BSA_11",
    "LC1_BSA_12",
    "LC1_BSA_13",
    "LC1_BSA_14",
    "LC1_BSA_15",
    "LC1_BSA_16",
    "LC1_BSA_17",
    "LC1_BSA_18",
    "LC1_BSA_19",
    "LC1_BSA_20",
    "LC1_BSA_21",
    "LC1_BSA_22",
    "LC1_BSA_23",
];

/// Full archived name of a logical channel.
pub fn full_name(prefix: &str, logical: &str) -> String {
    format!("{prefix}:{logical}")
}

/// Full archived names of every channel under `prefix`, in index order.
pub fn channel_names(prefix: &str) -> Vec<String> {
    CHANNEL_NAMES
        .iter()
        .map(|logical| full_name(prefix, logical))
        .collect()
}

/// One registered channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Position of the data word in the frame
    pub index: usize,
    /// Archived name, `<prefix>:<logical>`
    pub name: String,
    /// Handle issued by the archiving facility
    pub handle: ChannelHandle,
}

/// Immutable mapping from data-word index to archiving handle.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    prefix: String,
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    /// Register all channels of `stream` under `prefix`.
    ///
    /// Fails on the first channel the facility rejects; no registry is
    /// returned in that case.
    pub fn register(stream: &str, prefix: &str, registrar: &dyn ChannelRegistrar) -> Result<Self> {
        if prefix.is_empty() {
            return Err(BsaError::EmptyRecordPrefix);
        }

        let channels = CHANNEL_NAMES
            .iter()
            .enumerate()
            .map(|(index, logical)| {
                let name = full_name(prefix, logical);
                let handle = registrar.register_channel(&name)?;
                Ok(Channel {
                    index,
                    name,
                    handle,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let registry = Self {
            prefix: prefix.to_string(),
            channels,
        };
        registry.log_channel_ids(stream);
        Ok(registry)
    }

    fn log_channel_ids(&self, stream: &str) {
        info!(
            stream,
            prefix = %self.prefix,
            count = self.channels.len(),
            "Registered LCLS1 BSA channels"
        );
        for ch in &self.channels {
            info!(index = ch.index, handle = ch.handle.0, "  {}", ch.name);
        }
    }

    /// Record prefix the channels were registered under.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the registry holds no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Handle of the channel bound to data word `index`.
    pub fn handle(&self, index: usize) -> Option<ChannelHandle> {
        self.channels.get(index).map(|c| c.handle)
    }

    /// Channels in index order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;

    #[test]
    fn test_names_follow_convention() {
        for (i, name) in CHANNEL_NAMES.iter().enumerate() {
            assert_eq!(*name, format!("{CHANNEL_CATEGORY}_{i:02}"));
        }
    }

    #[test]
    fn test_register_binds_in_declaration_order() {
        let archive = MemoryArchive::new();
        let registry = ChannelRegistry::register("udp://x", "MPLN:LI21:MP01", &archive).unwrap();

        assert_eq!(registry.len(), CHANNEL_COUNT);
        assert_eq!(registry.prefix(), "MPLN:LI21:MP01");
        assert_eq!(archive.registered(), channel_names("MPLN:LI21:MP01"));
        assert_eq!(archive.registered()[0], "MPLN:LI21:MP01:LC1_BSA_00");

        for ch in registry.channels() {
            assert_eq!(registry.handle(ch.index), Some(ch.handle));
            assert_eq!(archive.channel_name(ch.handle), Some(ch.name.clone()));
        }
        assert_eq!(registry.handle(CHANNEL_COUNT), None);
    }

    #[test]
    fn test_registration_failure_propagates() {
        let archive = MemoryArchive::new();
        archive.reject_channel("P:LC1_BSA_05");

        let err = ChannelRegistry::register("s", "P", &archive).unwrap_err();
        match err {
            BsaError::Registration { channel, .. } => assert_eq!(channel, "P:LC1_BSA_05"),
            other => panic!("unexpected error: {other:?}"),
        }
        // Registration stops at the failing channel.
        assert_eq!(archive.registered().len(), 5);
    }

    #[test]
    fn test_empty_prefix_is_rejected() {
        let archive = MemoryArchive::new();
        assert!(matches!(
            ChannelRegistry::register("s", "", &archive),
            Err(BsaError::EmptyRecordPrefix)
        ));
        assert!(archive.registered().is_empty());
    }
}
