//! Durable bot settings.
//!
//! A single logical record of admin-managed configuration, persisted as one
//! row per key so concurrent writes to different keys never touch each other.

pub mod sqlite;

use {async_trait::async_trait, serde::Serialize};

pub use sqlite::SqliteSettingsStore;

/// Crate-wide result type for settings operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// The admin-managed settings record.
///
/// Every field is optional: the record logically always exists, and a key
/// that was never written reads as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Channel a user must belong to before receiving content.
    /// `None` disables the gate entirely.
    pub force_channel_id: Option<i64>,
    /// Invite link shown to users who have not joined the force channel.
    pub force_channel_link: Option<String>,
    /// Channel holding the deliverable items. The archive *is* the catalog:
    /// items are addressed by their message id in this channel.
    pub archive_channel_id: Option<i64>,
}

/// Closed set of settings keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsKey {
    ForceChannelId,
    ForceChannelLink,
    ArchiveChannelId,
}

impl SettingsKey {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForceChannelId => "force_channel_id",
            Self::ForceChannelLink => "force_channel_link",
            Self::ArchiveChannelId => "archive_channel_id",
        }
    }
}

impl std::fmt::Display for SettingsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent storage for the settings record.
///
/// `set` is an idempotent per-key upsert, last-write-wins. There is no
/// multi-key transaction: each admin command writes only the keys it owns,
/// and a stale read racing a write is accepted behavior.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self) -> Result<Settings>;

    /// Upsert one key. `None` clears it.
    async fn set(&self, key: SettingsKey, value: Option<String>) -> Result<()>;

    async fn set_channel(&self, key: SettingsKey, channel_id: i64) -> Result<()> {
        self.set(key, Some(channel_id.to_string())).await
    }
}

impl Settings {
    /// Fold one stored key/value pair into the record. Values that fail to
    /// parse read as unset rather than erroring: a corrupt row must never
    /// make `get()` fail for callers.
    pub fn apply(&mut self, key: &str, value: &str) {
        match key {
            "force_channel_id" => self.force_channel_id = value.parse().ok(),
            "force_channel_link" => self.force_channel_link = Some(value.to_string()),
            "archive_channel_id" => self.archive_channel_id = value.parse().ok(),
            _ => {}
        }
    }
}
