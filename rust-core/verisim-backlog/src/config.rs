// SPDX-License-Identifier: PMPL-1.0-or-later
//! Backlog configuration.
//!
//! Defaults:
//! - buffer_capacity: 4096 weight units
//! - cursor_page_size: 256 rows
//! - max_storage_bytes: unbounded
//! - table_name: "redo_log"

use serde::{Deserialize, Serialize};

use crate::error::{BacklogError, BacklogResult};

/// Configuration for a [`crate::BufferedLog`] and its durable tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklogConfig {
    /// Weight threshold at which the in-memory buffer is flushed.
    pub buffer_capacity: u64,
    /// Number of durable rows a cursor fetches per round trip.
    pub cursor_page_size: usize,
    /// Quota of the durable medium in bytes. `None` means unbounded.
    pub max_storage_bytes: Option<u64>,
    /// Name of the durable table holding the backlog rows.
    pub table_name: String,
}

impl BacklogConfig {
    /// Config with the given buffer capacity and defaults for the rest.
    pub fn with_capacity(buffer_capacity: u64) -> Self {
        Self {
            buffer_capacity,
            ..Default::default()
        }
    }

    /// Parse a JSON document into a validated config.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> BacklogResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BacklogError::InvalidConfig(format!("parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the backlog cannot operate with.
    pub fn validate(&self) -> BacklogResult<()> {
        if self.buffer_capacity == 0 {
            return Err(BacklogError::InvalidConfig(
                "buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.cursor_page_size == 0 {
            return Err(BacklogError::InvalidConfig(
                "cursor_page_size must be greater than zero".to_string(),
            ));
        }
        if self.table_name.trim().is_empty() {
            return Err(BacklogError::InvalidConfig(
                "table_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            cursor_page_size: 256,
            max_storage_bytes: None,
            table_name: "redo_log".to_string(),
        }
    }
}
