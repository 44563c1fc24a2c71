//! Process-wide license expiration setting.
//!
//! The in-memory value is authoritative: it is loaded once at startup,
//! served from memory on every read, and persisted in the background on
//! every admin update. A failed persist is logged, never surfaced.

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use orglicense_core::AppResult;
use orglicense_licensing::{
    validate_expiration_minutes, DEFAULT_EXPIRATION_MINUTES, EXPIRATION_MINUTES_KEY,
};

use crate::store::Store;

#[derive(Clone)]
pub struct ExpirationSettings {
    minutes: Arc<Mutex<u32>>,
    store: Arc<dyn Store>,
}

impl ExpirationSettings {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            minutes: Arc::new(Mutex::new(DEFAULT_EXPIRATION_MINUTES)),
            store,
        }
    }

    /// Load the persisted value once at startup.
    ///
    /// Absent, unparseable, or non-positive values fall back to the default;
    /// so does a store failure.
    pub async fn initialize(&self) {
        match self.store.get_setting(EXPIRATION_MINUTES_KEY).await {
            Ok(Some(raw)) => match raw.parse::<u32>() {
                Ok(minutes) if minutes > 0 => {
                    *self.minutes.lock().unwrap() = minutes;
                    info!(minutes, "loaded license expiration setting");
                }
                _ => {
                    warn!(value = %raw, default = DEFAULT_EXPIRATION_MINUTES,
                        "unparseable license expiration setting, using default");
                }
            },
            Ok(None) => {
                info!(default = DEFAULT_EXPIRATION_MINUTES, "using default license expiration");
            }
            Err(err) => {
                warn!(error = %err, default = DEFAULT_EXPIRATION_MINUTES,
                    "failed to load license expiration setting, using default");
            }
        }
    }

    /// Current window in minutes; never does I/O.
    pub fn minutes(&self) -> u32 {
        *self.minutes.lock().unwrap()
    }

    /// Update the in-memory value synchronously and persist asynchronously.
    pub fn set_minutes(&self, minutes: i64) -> AppResult<u32> {
        let minutes = validate_expiration_minutes(minutes)?;
        *self.minutes.lock().unwrap() = minutes;

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store
                .put_setting(EXPIRATION_MINUTES_KEY, &minutes.to_string())
                .await
            {
                Ok(()) => info!(minutes, "persisted license expiration setting"),
                Err(err) => error!(error = %err, "failed to persist license expiration setting"),
            }
        });

        Ok(minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::store::{InMemoryStore, SettingStore};

    #[tokio::test]
    async fn defaults_to_ten_minutes() {
        let settings = ExpirationSettings::new(Arc::new(InMemoryStore::new()));
        settings.initialize().await;
        assert_eq!(settings.minutes(), 10);
    }

    #[tokio::test]
    async fn initialize_reads_the_persisted_value() {
        let store = Arc::new(InMemoryStore::new());
        store.put_setting(EXPIRATION_MINUTES_KEY, "45").await.unwrap();

        let settings = ExpirationSettings::new(store);
        settings.initialize().await;
        assert_eq!(settings.minutes(), 45);
    }

    #[tokio::test]
    async fn garbage_in_the_store_falls_back_to_default() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_setting(EXPIRATION_MINUTES_KEY, "soon")
            .await
            .unwrap();

        let settings = ExpirationSettings::new(store);
        settings.initialize().await;
        assert_eq!(settings.minutes(), 10);
    }

    #[tokio::test]
    async fn set_minutes_is_visible_immediately_and_persisted_eventually() {
        let store = Arc::new(InMemoryStore::new());
        let settings = ExpirationSettings::new(store.clone());
        settings.initialize().await;

        settings.set_minutes(30).unwrap();
        assert_eq!(settings.minutes(), 30);

        // Persistence is async; poll briefly.
        for _ in 0..50 {
            if store
                .get_setting(EXPIRATION_MINUTES_KEY)
                .await
                .unwrap()
                .as_deref()
                == Some("30")
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("setting was not persisted");
    }

    #[tokio::test]
    async fn set_minutes_validates_bounds() {
        let settings = ExpirationSettings::new(Arc::new(InMemoryStore::new()));
        assert!(settings.set_minutes(0).is_err());
        assert!(settings.set_minutes(1_000_000).is_err());
    }
}
