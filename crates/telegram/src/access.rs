use std::collections::HashSet;

use {mediavault_store::Settings, tracing::warn};

use crate::transport::Transport;

/// Immutable administrator allow-list, loaded once at process start.
#[derive(Debug, Clone, Default)]
pub struct AdminSet {
    ids: HashSet<u64>,
}

impl AdminSet {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, user_id: u64) -> bool {
        self.ids.contains(&user_id)
    }
}

/// Outcome of the membership gate.
///
/// `FailedOpen` is kept distinct from `Joined` so logs and tests can tell a
/// verified membership from an absorbed transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinCheck {
    /// Admin, ungated deployment, or verified member.
    Joined,
    /// Verified non-member.
    NotJoined,
    /// The membership query itself failed. Access is granted anyway: a
    /// misconfigured gate (bot not admin in the force channel, wrong id)
    /// must not lock out every user. Deliberate availability-over-strictness
    /// tradeoff, not a bug.
    FailedOpen,
}

impl JoinCheck {
    /// Whether content may be delivered.
    #[must_use]
    pub fn allows(self) -> bool {
        !matches!(self, Self::NotJoined)
    }
}

/// Run the gate for `user_id` against the current settings.
pub async fn check_membership(
    transport: &dyn Transport,
    settings: &Settings,
    admins: &AdminSet,
    user_id: u64,
) -> JoinCheck {
    let Some(force_channel) = settings.force_channel_id else {
        return JoinCheck::Joined;
    };
    if admins.contains(user_id) {
        return JoinCheck::Joined;
    }

    match transport.chat_member_status(force_channel, user_id).await {
        Ok(status) if status.is_joined() => JoinCheck::Joined,
        Ok(_) => JoinCheck::NotJoined,
        Err(e) => {
            warn!(force_channel, user_id, error = %e, "membership query failed, failing open");
            JoinCheck::FailedOpen
        }
    }
}
