//! Membership-gated delivery of a single archived item.

use {
    mediavault_store::{Settings, SettingsStore},
    tracing::{debug, warn},
};

use crate::{error::Result, payload::Payload, transport::Transport};

pub(crate) const MSG_ACTIVATED: &str = "✅ You're all set. Open a share link to receive a file.";
pub(crate) const MSG_NOT_CONFIGURED: &str =
    "❌ No archive channel has been configured yet. Ask an admin to run /setdb.";
pub(crate) const MSG_NOT_FOUND: &str =
    "❌ File not found. The link may be wrong or the file was deleted.";

/// Load the settings record, treating storage failure as an unset record.
/// The absorbed error is logged here so the policy stays visible.
pub(crate) async fn load_settings(store: &dyn SettingsStore) -> Settings {
    match store.get().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "settings unavailable, reading as unset");
            Settings::default()
        }
    }
}

/// Deliver the item addressed by `payload` to `chat_id`.
///
/// Replication failure (deleted item, bad id, transient transport error) is
/// terminal for this request: the user gets a not-found message, nothing is
/// retried.
pub async fn deliver(
    transport: &dyn Transport,
    store: &dyn SettingsStore,
    chat_id: i64,
    payload: Payload,
) -> Result<()> {
    let item_id = match payload {
        Payload::Activate => return transport.send_text(chat_id, MSG_ACTIVATED).await,
        Payload::Item(id) => id,
    };

    let settings = load_settings(store).await;
    let Some(archive) = settings.archive_channel_id else {
        return transport.send_text(chat_id, MSG_NOT_CONFIGURED).await;
    };

    match transport.copy_message(chat_id, archive, item_id).await {
        Ok(_) => {
            debug!(chat_id, item_id, "delivered archive item");
            Ok(())
        }
        Err(e) => {
            warn!(chat_id, item_id, error = %e, "item replication failed");
            transport.send_text(chat_id, MSG_NOT_FOUND).await
        }
    }
}
