// src/state.rs

use std::env;

use url::Url;

use crate::errors::AppError;

const DEFAULT_USER_KEY: &str = "current";

/// Sposób wysyłania zmiany ilości pojedynczej pozycji.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineUpdateMode {
    /// Backend zna tylko podmianę całej listy produktów (`PUT /api/cart/:id`).
    #[default]
    FullReplace,
    /// Backend obsługuje `PATCH` pojedynczej pozycji.
    PerLine,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub user_key: String,
    pub line_update_mode: LineUpdateMode,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            user_key: DEFAULT_USER_KEY.to_string(),
            line_update_mode: LineUpdateMode::default(),
        })
    }

    /// Wczytuje konfigurację ze zmiennych środowiskowych (po `dotenvy::dotenv()`).
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = env::var("SHOP_API_URL")
            .map_err(|_| AppError::Config("SHOP_API_URL must be set".to_string()))?;
        let mut config = Self::new(&base_url)?;

        if let Ok(user_key) = env::var("SHOP_USER_KEY") {
            if !user_key.trim().is_empty() {
                config.user_key = user_key.trim().to_string();
            }
        }

        config.line_update_mode = match env::var("SHOP_CART_LINE_PATCH").as_deref() {
            Ok("1") | Ok("true") | Ok("yes") => LineUpdateMode::PerLine,
            _ => LineUpdateMode::FullReplace,
        };

        tracing::debug!(
            "Konfiguracja API: url={}, user_key={}, tryb={:?}",
            config.base_url,
            config.user_key,
            config.line_update_mode
        );
        Ok(config)
    }

    /// Pełny adres endpointu, np. `endpoint("/api/cart/me")`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}
