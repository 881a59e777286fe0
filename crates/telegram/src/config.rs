use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// What the ingestion flow accepts from administrators.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestPolicy {
    /// Accept forwards from the archive channel *and* fresh uploads, storing
    /// the latter into the archive first. Generalizes `Strict` and removes
    /// the wrong-channel foot-gun.
    #[default]
    Permissive,
    /// Only accept items already forwarded from the archive channel.
    Strict,
}

/// Configuration for the bot process.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Administrator user ids. Loaded once at startup; there is no runtime
    /// admin management.
    pub admin_ids: Vec<u64>,

    /// Ingestion policy for admin media submissions.
    pub ingest_policy: IngestPolicy,

    /// Hard-floor delay between backup copy attempts, in seconds.
    pub backup_delay_secs: u64,

    /// Pause before the polling loop resumes after a stream-level error.
    pub recovery_pause_secs: u64,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("admin_ids", &self.admin_ids)
            .field("ingest_policy", &self.ingest_policy)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            admin_ids: Vec::new(),
            ingest_policy: IngestPolicy::default(),
            backup_delay_secs: 3,
            recovery_pause_secs: 5,
        }
    }
}
