// src/coalescer.rs

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::errors::AppError;

pub type SharedRequest<T> = Shared<BoxFuture<'static, Result<T, AppError>>>;

type Registry<T> = Arc<Mutex<HashMap<String, SharedRequest<T>>>>;

/// Łączy równoległe żądania o ten sam klucz w jedno wywołanie sieciowe.
///
/// Wpis znika z rejestru, gdy operacja się zakończy (sukcesem lub błędem),
/// niezależnie od tego, który z oczekujących ją dokończył.
pub struct InFlight<T> {
    pending: Registry<T>,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> std::fmt::Debug for InFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("pending", &lock(&self.pending).len())
            .finish()
    }
}

fn lock<T>(registry: &Registry<T>) -> MutexGuard<'_, HashMap<String, SharedRequest<T>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Zwraca trwające żądanie dla `key` albo uruchamia nowe przez `factory`.
    pub fn get<F, Fut>(&self, key: &str, factory: F) -> SharedRequest<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(existing) = pending.get(key) {
            tracing::debug!("Dołączam do trwającego żądania '{}'", key);
            return existing.clone();
        }

        tracing::debug!("Nowe żądanie '{}'", key);
        let registry = Arc::clone(&self.pending);
        let owned_key = key.to_string();
        let operation = factory();
        let shared = async move {
            let outcome = operation.await;
            lock(&registry).remove(&owned_key);
            outcome
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), shared.clone());
        shared
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }
}
