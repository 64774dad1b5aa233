use std::sync::{Mutex, MutexGuard};

use actix_web::web;
use tracing::error;

use crate::error::{AppError, StorageError};
use crate::schemas::Session;
use crate::storage::{self, KeyValueStore};

pub struct AppState {
    session: Mutex<Session>,
    store: Box<dyn KeyValueStore>,
}

impl AppState {
    /// Loads the stored session once at startup.
    pub fn load(store: Box<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let session = storage::load_session(store.as_ref())?;
        Ok(AppState {
            session: Mutex::new(session),
            store,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Runs `operation` on a copy of the session, saves the copy and only then
    /// swaps it in. A rejected operation or failed save changes nothing.
    pub fn mutate<T, E>(
        &self,
        operation: impl FnOnce(&mut Session) -> Result<T, E>,
    ) -> Result<T, AppError>
    where
        AppError: From<E>,
    {
        let mut current = self.lock();
        let mut next = current.clone();
        let value = operation(&mut next)?;
        if let Err(err) = storage::save_session(self.store(), &next) {
            error!(error = %err, "failed to save session");
            return Err(err.into());
        }
        *current = next;
        Ok(value)
    }
}

/// [`AppState::mutate`] on actix's blocking pool, keeping file io off the
/// request workers.
pub async fn mutate_blocking<T, E, F>(
    state: &web::Data<AppState>,
    operation: F,
) -> Result<T, AppError>
where
    F: FnOnce(&mut Session) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    AppError: From<E>,
{
    let state = state.clone();
    web::block(move || state.mutate(operation)).await?
}
