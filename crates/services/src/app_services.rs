use std::sync::Arc;

use chrono::{DateTime, Utc};
use lesson_core::model::UserId;
use storage::repository::Storage;
use tracing::info;

use crate::Clock;
use crate::error::AppServicesError;
use crate::playback::MediaBackend;
use crate::sessions::{ViewerService, ViewerSettings};

/// Identity of the signed-in viewer. Sessions are opened on its behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    user_id: UserId,
    logged_in_at: DateTime<Utc>,
}

impl UserSession {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn logged_in_at(&self) -> DateTime<Utc> {
        self.logged_in_at
    }

    /// End the login. Any open lesson sessions should be closed first.
    pub fn logout(self) {
        info!(user = %self.user_id, "logged out");
    }
}

/// Assembles app-facing services on top of a storage backend.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    storage: Storage,
    viewer: Arc<ViewerService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        backend: Arc<dyn MediaBackend>,
        settings: ViewerSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock, backend, settings))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock, backend: Arc<dyn MediaBackend>) -> Self {
        Self::from_storage(Storage::in_memory(), clock, backend, ViewerSettings::default())
    }

    #[must_use]
    pub fn from_storage(
        storage: Storage,
        clock: Clock,
        backend: Arc<dyn MediaBackend>,
        settings: ViewerSettings,
    ) -> Self {
        let viewer = Arc::new(ViewerService::new(clock, &storage, backend).with_settings(settings));
        Self {
            clock,
            storage,
            viewer,
        }
    }

    #[must_use]
    pub fn login(&self, user_id: UserId) -> UserSession {
        let session = UserSession {
            user_id,
            logged_in_at: self.clock.now(),
        };
        info!(user = %user_id, "logged in");
        session
    }

    #[must_use]
    pub fn viewer(&self) -> Arc<ViewerService> {
        Arc::clone(&self.viewer)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }
}
