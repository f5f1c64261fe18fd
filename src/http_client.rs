// src/http_client.rs

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use urlencoding::encode;

use crate::{
    errors::{AppError, CODE_MISSING_ADDRESS, mentions_expired_token},
    models::{
        AddLinePayload, ApiErrorBody, CreateOrderPayload, InitiatePaymentPayload, ListEnvelope,
        Order, PaymentRedirect, ReplaceLinePayload, ServerCart,
    },
    services::{CartApi, OrderApi, PaymentApi, SessionApi},
    state::ApiConfig,
};

// Kody, którymi serwis zamówień sygnalizuje brak adresu dostawy.
const MISSING_ADDRESS_CODES: [&str; 3] = [CODE_MISSING_ADDRESS, "NO_ADDRESS", "ADDRESS_REQUIRED"];

/// Klient HTTP sklepu. Sesja żyje w ciasteczkach, więc jeden klient
/// (jeden słoik ciasteczek) musi być współdzielony przez wszystkie wywołania.
#[derive(Debug, Clone)]
pub struct HttpApi {
    config: ApiConfig,
    http: Client,
}

impl HttpApi {
    pub fn new(config: ApiConfig) -> Result<Self, AppError> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, AppError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Błąd sieci podczas '{}': {:?}", what, e);
            AppError::Network(format!("{}: {}", what, e))
        })?;

        if response.status().is_success() {
            tracing::debug!("'{}' zakończone statusem {}", what, response.status());
            Ok(response)
        } else {
            Err(error_from_response(response, what).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, AppError> {
        let response = self.send(request, what).await?;
        let mut body = response.text().await?;
        if body.trim().is_empty() {
            body = "null".to_string();
        }
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Błąd deserializacji odpowiedzi '{}': {}", what, e);
            AppError::InvalidResponse(format!("{}: {}", what, e))
        })
    }
}

/// Zamienia odpowiedź z błędem na `AppError`, rozpoznając wygasłą sesję i brak adresu.
async fn error_from_response(response: Response, what: &str) -> AppError {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Brak treści błędu".to_string());
    let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .clone()
        .or(body.error.clone())
        .unwrap_or_else(|| text.clone());

    tracing::warn!(
        "'{}' zakończone błędem: Status={}, Treść={}",
        what,
        status,
        text
    );

    if body
        .code
        .as_deref()
        .is_some_and(|code| MISSING_ADDRESS_CODES.contains(&code))
    {
        return AppError::MissingAddress;
    }

    match status {
        StatusCode::UNAUTHORIZED => AppError::SessionExpired(message),
        _ if mentions_expired_token(&message) => AppError::SessionExpired(message),
        StatusCode::NOT_FOUND => AppError::NotFound,
        StatusCode::CONFLICT => AppError::Conflict(message),
        _ => AppError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl CartApi for HttpApi {
    async fn get_my_cart(&self) -> Result<Vec<ServerCart>, AppError> {
        let request = self.http.get(self.config.endpoint("/api/cart/me"));
        // Serwer może zwrócić `null`, gdy użytkownik nie ma koszyka.
        let envelope: Option<ListEnvelope<ServerCart>> =
            self.send_json(request, "GET /api/cart/me").await?;
        Ok(envelope.map(ListEnvelope::into_vec).unwrap_or_default())
    }

    async fn add_lines(&self, lines: Vec<AddLinePayload>) -> Result<(), AppError> {
        let request = self
            .http
            .post(self.config.endpoint("/api/cart/me"))
            .json(&lines);
        self.send(request, "POST /api/cart/me").await?;
        Ok(())
    }

    async fn replace_lines(
        &self,
        cart_id: &str,
        lines: Vec<ReplaceLinePayload>,
    ) -> Result<(), AppError> {
        let url = self
            .config
            .endpoint(&format!("/api/cart/{}", encode(cart_id)));
        self.send(self.http.put(url).json(&lines), "PUT /api/cart/:id")
            .await?;
        Ok(())
    }

    async fn patch_line(&self, cart_id: &str, line: ReplaceLinePayload) -> Result<(), AppError> {
        let url = self.config.endpoint(&format!(
            "/api/cart/{}/product/{}",
            encode(cart_id),
            encode(&line.product_id)
        ));
        self.send(
            self.http.patch(url).json(&line),
            "PATCH /api/cart/:id/product/:productId",
        )
        .await?;
        Ok(())
    }

    async fn delete_line(&self, cart_id: &str, product_id: &str) -> Result<(), AppError> {
        let url = self.config.endpoint(&format!(
            "/api/cart/{}/product/{}",
            encode(cart_id),
            encode(product_id)
        ));
        self.send(
            self.http.delete(url),
            "DELETE /api/cart/:cartId/product/:productId",
        )
        .await?;
        Ok(())
    }

    async fn create_empty_cart(&self) -> Result<ServerCart, AppError> {
        let empty: [AddLinePayload; 0] = [];
        let request = self
            .http
            .post(self.config.endpoint("/api/cart"))
            .json(&empty);
        self.send_json(request, "POST /api/cart").await
    }
}

#[async_trait]
impl OrderApi for HttpApi {
    async fn list_orders(&self) -> Result<Vec<Order>, AppError> {
        let request = self.http.get(self.config.endpoint("/api/order"));
        let envelope: Option<ListEnvelope<Order>> =
            self.send_json(request, "GET /api/order").await?;
        Ok(envelope.map(ListEnvelope::into_vec).unwrap_or_default())
    }

    async fn create_order(&self, cart_id: &str) -> Result<Order, AppError> {
        let payload = CreateOrderPayload {
            cart_id: cart_id.to_string(),
        };
        let request = self
            .http
            .post(self.config.endpoint("/api/order"))
            .json(&payload);
        self.send_json(request, "POST /api/order").await
    }

    async fn delete_order(&self, order_id: &str) -> Result<(), AppError> {
        let url = self
            .config
            .endpoint(&format!("/api/order/{}", encode(order_id)));
        self.send(self.http.delete(url), "DELETE /api/order/:id")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionApi for HttpApi {
    async fn refresh(&self) -> Result<(), AppError> {
        let request = self.http.post(self.config.endpoint("/api/auth/refresh"));
        self.send(request, "POST /api/auth/refresh").await?;
        tracing::info!("Sesja odświeżona");
        Ok(())
    }
}

#[async_trait]
impl PaymentApi for HttpApi {
    async fn initiate_payment(&self, order_id: &str) -> Result<String, AppError> {
        let payload = InitiatePaymentPayload {
            order_id: order_id.to_string(),
        };
        let request = self
            .http
            .post(self.config.endpoint("/api/payment/initiate"))
            .json(&payload);
        let redirect: PaymentRedirect = self
            .send_json(request, "POST /api/payment/initiate")
            .await?;
        Ok(redirect.url)
    }
}
