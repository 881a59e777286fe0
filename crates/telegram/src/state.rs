use std::sync::Arc;

use {mediavault_store::SettingsStore, tokio_util::sync::CancellationToken};

use crate::{access::AdminSet, config::BotConfig, transport::Transport};

/// Shared runtime state handed to every handler.
pub struct BotState {
    pub transport: Arc<dyn Transport>,
    pub settings: Arc<dyn SettingsStore>,
    pub admins: AdminSet,
    pub config: BotConfig,
    /// Bot username, used to synthesize deep links.
    pub bot_username: String,
    pub cancel: CancellationToken,
}
