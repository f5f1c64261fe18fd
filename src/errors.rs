// src/errors.rs

use thiserror::Error;

/// Kody błędów, po których wywołujący może rozpoznać rodzaj awarii.
pub const CODE_MISSING_ADDRESS: &str = "MISSING_ADDRESS";

// Błąd musi być `Clone`, bo połączone (coalesced) żądania dzielą jeden wynik.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Błąd sieci: {0}")]
    Network(String),

    #[error("Sesja wygasła: {0}")]
    SessionExpired(String),

    #[error("Brak adresu dostawy")]
    MissingAddress,

    #[error("Nie znaleziono zasobu")]
    NotFound,

    #[error("Wystąpił konflikt: {0}")]
    Conflict(String),

    #[error("Błąd API (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Nieprawidłowa odpowiedź serwera: {0}")]
    InvalidResponse(String),

    #[error("Błąd walidacji danych: {0}")]
    Validation(String),

    #[error("Błąd konfiguracji: {0}")]
    Config(String),
}

impl AppError {
    /// Stabilny kod błędu dla warstwy interfejsu.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Network(_) => "NETWORK",
            AppError::SessionExpired(_) => "SESSION_EXPIRED",
            AppError::MissingAddress => CODE_MISSING_ADDRESS,
            AppError::NotFound => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Api { .. } => "API_ERROR",
            AppError::InvalidResponse(_) => "INVALID_RESPONSE",
            AppError::Validation(_) => "VALIDATION",
            AppError::Config(_) => "CONFIG",
        }
    }

    /// Czy błąd oznacza wygasłą sesję (HTTP 401 albo komunikat o wygasłym tokenie).
    pub fn is_session_expired(&self) -> bool {
        match self {
            AppError::SessionExpired(_) => true,
            AppError::Api { status: 401, .. } => true,
            AppError::Api { message, .. } | AppError::Network(message) => {
                mentions_expired_token(message)
            }
            _ => false,
        }
    }
}

pub(crate) fn mentions_expired_token(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["jwt expired", "token expired", "session expired", "token has expired"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Błąd klienta HTTP: {:?}", err);
        if err.is_decode() {
            return AppError::InvalidResponse(err.to_string());
        }
        match err.status().map(|status| status.as_u16()) {
            Some(401) => AppError::SessionExpired(err.to_string()),
            Some(404) => AppError::NotFound,
            Some(status) => AppError::Api {
                status,
                message: err.to_string(),
            },
            None => AppError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("Błąd deserializacji JSON: {:?}", err);
        AppError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Config(format!("Nieprawidłowy adres URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_status_counts_as_expired_session() {
        let err = AppError::Api {
            status: 401,
            message: "Unauthorized".to_string(),
        };
        assert!(err.is_session_expired());
    }

    #[test]
    fn expired_jwt_message_counts_as_expired_session() {
        let err = AppError::Api {
            status: 500,
            message: "TokenExpiredError: jwt expired".to_string(),
        };
        assert!(err.is_session_expired());
        assert!(!AppError::Conflict("jwt expired".to_string()).is_session_expired());
    }

    #[test]
    fn missing_address_has_its_own_code() {
        assert_eq!(AppError::MissingAddress.code(), CODE_MISSING_ADDRESS);
        assert_ne!(
            AppError::Api {
                status: 500,
                message: "boom".to_string()
            }
            .code(),
            CODE_MISSING_ADDRESS
        );
    }
}
