//! Deep-link payload codec.
//!
//! A start payload is either the sentinel `only` ("activate, deliver
//! nothing") or the decimal message id of an archived item. Recheck buttons
//! carry the same payload behind a `check_` prefix.

/// Sentinel payload meaning "no item requested".
pub const ACTIVATE_TOKEN: &str = "only";

const RECHECK_PREFIX: &str = "check";

/// Decoded start payload or callback action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Bare `/start` or the `only` sentinel.
    Activate,
    /// Request for the archive item with this message id.
    Item(i32),
}

impl Payload {
    /// Parse a start payload. Anything that is neither the sentinel nor a
    /// decimal integer is invalid and handled as "not found" upstream.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        if token == ACTIVATE_TOKEN {
            return Some(Self::Activate);
        }
        token.parse().ok().map(Self::Item)
    }

    /// Parse callback data of the form `check_<payload>`. Everything after
    /// the first `_` is the payload.
    #[must_use]
    pub fn parse_callback(data: &str) -> Option<Self> {
        let (prefix, token) = data.split_once('_')?;
        if prefix != RECHECK_PREFIX {
            return None;
        }
        Self::parse(token)
    }

    /// Callback data for the recheck button re-running this payload.
    #[must_use]
    pub fn recheck_action(&self) -> String {
        format!("{RECHECK_PREFIX}_{self}")
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activate => f.write_str(ACTIVATE_TOKEN),
            Self::Item(id) => write!(f, "{id}"),
        }
    }
}

/// Shareable deep link for an archived item.
#[must_use]
pub fn deep_link(bot_username: &str, item_id: i32) -> String {
    format!("https://t.me/{bot_username}?start={item_id}")
}
