//! Read-through cache for runtime settings

use crate::error::ApiError;
use crate::storage::Storage;
use oversight_types::Settings;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Cached {
    settings: Settings,
    refreshed_at: Instant,
}

/// Serves settings from memory for `ttl`, then re-reads storage.
/// Writes go to storage first and replace the cached value.
pub struct SettingsCache {
    storage: Arc<dyn Storage>,
    defaults: Settings,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
}

impl SettingsCache {
    pub fn new(storage: Arc<dyn Storage>, defaults: Settings, ttl: Duration) -> Self {
        Self {
            storage,
            defaults,
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Result<Settings, ApiError> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.refreshed_at.elapsed() < self.ttl {
                    return Ok(entry.settings.clone());
                }
            }
        }

        let settings = self
            .storage
            .load_settings()
            .await?
            .unwrap_or_else(|| self.defaults.clone());

        let mut cached = self.cached.write().await;
        *cached = Some(Cached {
            settings: settings.clone(),
            refreshed_at: Instant::now(),
        });
        tracing::debug!("Settings cache refreshed");
        Ok(settings)
    }

    pub async fn update(&self, settings: Settings) -> Result<Settings, ApiError> {
        settings.validate().map_err(ApiError::Validation)?;
        self.storage.save_settings(&settings).await?;

        let mut cached = self.cached.write().await;
        *cached = Some(Cached {
            settings: settings.clone(),
            refreshed_at: Instant::now(),
        });
        Ok(settings)
    }

    /// Drop the cached value so the next read goes to storage
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStorage, SettingsStorage};

    #[tokio::test]
    async fn falls_back_to_defaults() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let cache = SettingsCache::new(storage, Settings::default(), Duration::from_secs(60));
        assert_eq!(cache.get().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn serves_cached_value_until_invalidated() {
        let storage = Arc::new(InMemoryStorage::new());
        let cache = SettingsCache::new(
            storage.clone() as Arc<dyn Storage>,
            Settings::default(),
            Duration::from_secs(60),
        );
        cache.get().await.unwrap();

        let changed = Settings {
            lock_ttl_minutes: 5,
            ..Settings::default()
        };
        storage.save_settings(&changed).await.unwrap();
        assert_eq!(cache.get().await.unwrap().lock_ttl_minutes, 30);

        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap().lock_ttl_minutes, 5);
    }

    #[tokio::test]
    async fn zero_ttl_always_reads_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let cache = SettingsCache::new(
            storage.clone() as Arc<dyn Storage>,
            Settings::default(),
            Duration::ZERO,
        );
        cache.get().await.unwrap();
        storage
            .save_settings(&Settings {
                auto_approve_max_minor: 1,
                ..Settings::default()
            })
            .await
            .unwrap();
        assert_eq!(cache.get().await.unwrap().auto_approve_max_minor, 1);
    }

    #[tokio::test]
    async fn update_writes_through_and_validates() {
        let storage = Arc::new(InMemoryStorage::new());
        let cache = SettingsCache::new(
            storage.clone() as Arc<dyn Storage>,
            Settings::default(),
            Duration::from_secs(60),
        );

        let invalid = Settings {
            lock_ttl_minutes: 0,
            ..Settings::default()
        };
        assert!(matches!(
            cache.update(invalid).await,
            Err(ApiError::Validation(_))
        ));

        let valid = Settings {
            auto_approve_max_percent_bp: 250,
            ..Settings::default()
        };
        cache.update(valid.clone()).await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap(), Some(valid.clone()));
        assert_eq!(cache.get().await.unwrap(), valid);
    }
}
