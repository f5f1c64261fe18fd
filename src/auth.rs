// src/auth.rs

use std::future::Future;

use crate::{errors::AppError, services::SessionApi};

/// Wykonuje operację wymagającą sesji. Przy wygasłej sesji robi dokładnie jedno
/// ciche odświeżenie i jedną ponowną próbę; jej wynik jest ostateczny.
pub async fn with_session_retry<T, F, Fut>(session: &dyn SessionApi, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let err = match op().await {
        Err(err) if err.is_session_expired() => err,
        outcome => return outcome,
    };

    tracing::warn!("Sesja wygasła ({}). Próba odświeżenia...", err);
    if let Err(refresh_err) = session.refresh().await {
        tracing::error!("Nie udało się odświeżyć sesji: {}", refresh_err);
        return Err(err);
    }

    tracing::info!("Sesja odświeżona, ponawiam operację");
    let retried = op().await;
    if let Err(retry_err) = &retried {
        tracing::error!("Ponowiona operacja nie powiodła się: {}", retry_err);
    }
    retried
}
