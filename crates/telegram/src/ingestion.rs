//! Admin-side capture of media items into the archive channel.

use {
    mediavault_store::SettingsStore,
    tracing::{info, warn},
};

use crate::{
    config::IngestPolicy,
    error::Result,
    payload,
    retrieval::load_settings,
    transport::Transport,
};

pub(crate) const MSG_NO_ARCHIVE: &str =
    "❌ No archive channel is configured. Run /setdb <channel_id> first.";
pub(crate) const MSG_WRONG_CHANNEL: &str =
    "❌ Rejected: this forward does not originate from the configured archive channel.";
pub(crate) const MSG_STRICT_UPLOAD: &str =
    "❌ Rejected: forward the file from the archive channel instead of uploading it directly.";
pub(crate) const MSG_STORE_FAILED: &str = "❌ Failed to store the file in the archive channel.";

/// A media message (video/document/audio) submitted by an administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSubmission {
    /// Id of the submission in the admin's chat with the bot.
    pub message_id: i32,
    /// Forward provenance, when the platform reports a channel origin.
    pub forwarded_from: Option<ForwardOrigin>,
}

/// Channel origin of a forwarded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOrigin {
    pub chat_id: i64,
    /// The message's original id in the origin channel.
    pub message_id: i32,
}

/// Catalog one admin submission and reply with its share link.
///
/// A forward claiming to come from the archive is only accepted when its
/// origin channel matches the configured archive id; content with an
/// unverifiable origin is never silently accepted. Fresh uploads are copied
/// into the archive first under [`IngestPolicy::Permissive`], rejected under
/// [`IngestPolicy::Strict`].
pub async fn ingest(
    transport: &dyn Transport,
    store: &dyn SettingsStore,
    policy: IngestPolicy,
    bot_username: &str,
    admin_chat: i64,
    submission: MediaSubmission,
) -> Result<()> {
    let settings = load_settings(store).await;
    let Some(archive) = settings.archive_channel_id else {
        return transport.send_text(admin_chat, MSG_NO_ARCHIVE).await;
    };

    let item_id = match submission.forwarded_from {
        Some(origin) if origin.chat_id == archive => origin.message_id,
        Some(origin) => {
            warn!(
                origin_chat = origin.chat_id,
                archive, "rejected forward from foreign channel"
            );
            return transport.send_text(admin_chat, MSG_WRONG_CHANNEL).await;
        }
        None => match policy {
            IngestPolicy::Strict => {
                return transport.send_text(admin_chat, MSG_STRICT_UPLOAD).await;
            }
            IngestPolicy::Permissive => {
                // Store the fresh upload in the archive; the replica's id
                // becomes the item reference.
                match transport
                    .copy_message(archive, admin_chat, submission.message_id)
                    .await
                {
                    Ok(stored_id) => stored_id,
                    Err(e) => {
                        warn!(archive, error = %e, "failed to replicate upload into archive");
                        return transport.send_text(admin_chat, MSG_STORE_FAILED).await;
                    }
                }
            }
        },
    };

    info!(item_id, archive, "cataloged media item");
    let link = payload::deep_link(bot_username, item_id);
    transport
        .send_text(admin_chat, &format!("✅ Stored.\nShare link: {link}"))
        .await
}
