use sqlx::SqlitePool;

use crate::{Result, Settings, SettingsKey, SettingsStore};

/// SQLite-backed settings store.
///
/// One row per key in the `settings` table. The record-level invariant
/// (absence reads as all-unset) falls out naturally: `get()` folds whatever
/// rows exist into a default record.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

impl SqliteSettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the settings table schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self) -> Result<Settings> {
        let rows = sqlx::query_as::<_, SettingRow>("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        let mut settings = Settings::default();
        for row in rows {
            settings.apply(&row.key, &row.value);
        }
        Ok(settings)
    }

    async fn set(&self, key: SettingsKey, value: Option<String>) -> Result<()> {
        match value {
            Some(value) => {
                sqlx::query(
                    r#"INSERT INTO settings (key, value) VALUES (?, ?)
                       ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
                )
                .bind(key.as_str())
                .bind(value)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM settings WHERE key = ?")
                    .bind(key.as_str())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteSettingsStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        SqliteSettingsStore::init(&pool).await.unwrap();
        SqliteSettingsStore::new(pool)
    }

    #[tokio::test]
    async fn empty_store_reads_as_default_record() {
        let store = store().await;
        let settings = store.get().await.expect("get");
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn set_is_an_upsert() {
        let store = store().await;
        store
            .set_channel(SettingsKey::ArchiveChannelId, -100111)
            .await
            .expect("first write");
        store
            .set_channel(SettingsKey::ArchiveChannelId, -100222)
            .await
            .expect("second write");
        let settings = store.get().await.expect("get");
        assert_eq!(settings.archive_channel_id, Some(-100222));
    }

    #[tokio::test]
    async fn writes_to_different_keys_are_independent() {
        let store = store().await;
        store
            .set_channel(SettingsKey::ForceChannelId, -100333)
            .await
            .expect("force id");
        store
            .set(
                SettingsKey::ForceChannelLink,
                Some("https://t.me/joinme".into()),
            )
            .await
            .expect("force link");
        store
            .set_channel(SettingsKey::ArchiveChannelId, -100444)
            .await
            .expect("archive id");

        // Overwriting one key leaves the others untouched.
        store
            .set_channel(SettingsKey::ForceChannelId, -100555)
            .await
            .expect("force id again");

        let settings = store.get().await.expect("get");
        assert_eq!(settings.force_channel_id, Some(-100555));
        assert_eq!(settings.force_channel_link.as_deref(), Some("https://t.me/joinme"));
        assert_eq!(settings.archive_channel_id, Some(-100444));
    }

    #[tokio::test]
    async fn clearing_a_key_reads_as_unset() {
        let store = store().await;
        store
            .set_channel(SettingsKey::ForceChannelId, -100666)
            .await
            .expect("set");
        store
            .set(SettingsKey::ForceChannelId, None)
            .await
            .expect("clear");
        let settings = store.get().await.expect("get");
        assert_eq!(settings.force_channel_id, None);
    }
}
