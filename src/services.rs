// src/services.rs

//! Granice z zewnętrznymi usługami: koszyk, zamówienia, sesja i płatności.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{
    errors::AppError,
    models::{AddLinePayload, Order, ReplaceLinePayload, ServerCart},
};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CartApi: Send + Sync {
    /// Wszyscy kandydaci na koszyk bieżącego użytkownika (może być 0, 1 lub więcej).
    async fn get_my_cart(&self) -> Result<Vec<ServerCart>, AppError>;

    /// Dodaje partię pozycji (zawsze tablica, nawet dla jednej pozycji).
    async fn add_lines(&self, lines: Vec<AddLinePayload>) -> Result<(), AppError>;

    /// Pełna podmiana listy produktów koszyka.
    async fn replace_lines(
        &self,
        cart_id: &str,
        lines: Vec<ReplaceLinePayload>,
    ) -> Result<(), AppError>;

    /// Zmiana jednej pozycji; używane tylko gdy backend ją obsługuje.
    async fn patch_line(&self, cart_id: &str, line: ReplaceLinePayload) -> Result<(), AppError>;

    async fn delete_line(&self, cart_id: &str, product_id: &str) -> Result<(), AppError>;

    /// Tworzy nowy, pusty koszyk.
    async fn create_empty_cart(&self) -> Result<ServerCart, AppError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn list_orders(&self) -> Result<Vec<Order>, AppError>;

    async fn create_order(&self, cart_id: &str) -> Result<Order, AppError>;

    async fn delete_order(&self, order_id: &str) -> Result<(), AppError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Ciche odświeżenie sesji (ciasteczko).
    async fn refresh(&self) -> Result<(), AppError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentApi: Send + Sync {
    /// Zwraca adres przekierowania do bramki płatności.
    async fn initiate_payment(&self, order_id: &str) -> Result<String, AppError>;
}
