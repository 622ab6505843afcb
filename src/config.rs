use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::storage::index::ENT_WIDTH;

/// Top-level configuration handed to the store and index by their owner.
///
/// Only the `segment` table exists today. Loading it (file, env, flags)
/// belongs to whoever bootstraps the process; this crate only consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
}

/// Per-segment limits.
///
/// ## Fields:
/// - `max_store_bytes`: store size at which the owner should roll over.
///   Read only by the owner; the Store itself never caps its size.
/// - `max_index_bytes`: fixed capacity reserved for the mapped index
/// - `initial_offset`: first absolute offset of a fresh log, also owner-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    pub max_store_bytes: u64,
    pub max_index_bytes: u64,
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024,
            max_index_bytes: 1024,
            initial_offset: 0,
        }
    }
}

impl SegmentConfig {
    /// Check the limits before any file is touched.
    ///
    /// # Errors
    /// - `max_index_bytes` smaller than one index entry
    /// - `max_index_bytes` not addressable as a mapping on this platform
    pub fn validate(&self) -> Result<()> {
        if self.max_index_bytes < ENT_WIDTH {
            return Err(StorageError::InvalidConfig(format!(
                "max_index_bytes {} is smaller than one index entry ({} bytes)",
                self.max_index_bytes, ENT_WIDTH
            )));
        }

        if usize::try_from(self.max_index_bytes).is_err() {
            return Err(StorageError::InvalidConfig(format!(
                "max_index_bytes {} cannot be mapped on this platform",
                self.max_index_bytes
            )));
        }

        Ok(())
    }

    /// Number of whole entries the index can hold.
    pub fn max_index_entries(&self) -> u64 {
        self.max_index_bytes / ENT_WIDTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.segment.validate().is_ok());
        assert_eq!(config.segment.max_index_entries(), 1024 / 12);
    }

    #[test]
    fn test_capacity_below_one_entry_rejected() {
        let segment = SegmentConfig {
            max_index_bytes: 11,
            ..SegmentConfig::default()
        };

        match segment.validate() {
            Err(StorageError::InvalidConfig(msg)) => assert!(msg.contains("11")),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_exactly_one_entry_accepted() {
        let segment = SegmentConfig {
            max_index_bytes: 12,
            ..SegmentConfig::default()
        };
        assert!(segment.validate().is_ok());
        assert_eq!(segment.max_index_entries(), 1);
    }
}
