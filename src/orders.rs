// src/orders.rs

use std::sync::Arc;

use crate::{
    auth::with_session_retry,
    cart::CartEngine,
    errors::AppError,
    models::{CartState, Order, OrderStatus},
    services::{OrderApi, PaymentApi, SessionApi},
    store::Store,
};

/// Zamiana koszyka w zamówienie i cykl życia zamówienia po stronie klienta.
///
/// Użytkownik ma najwyżej jedno zamówienie w stanie `pending`/`initiated`;
/// nowe powstaje dopiero po usunięciu poprzedniego.
pub struct OrderEngine {
    order_api: Arc<dyn OrderApi>,
    payment_api: Arc<dyn PaymentApi>,
    session: Arc<dyn SessionApi>,
    cart: Arc<CartEngine>,
    store: Arc<Store<Vec<Order>>>,
}

impl std::fmt::Debug for OrderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderEngine")
            .field("cart", &self.cart)
            .field("orders", &self.store.snapshot().len())
            .finish()
    }
}

impl OrderEngine {
    pub fn new(
        order_api: Arc<dyn OrderApi>,
        payment_api: Arc<dyn PaymentApi>,
        session: Arc<dyn SessionApi>,
        cart: Arc<CartEngine>,
    ) -> Self {
        Self {
            order_api,
            payment_api,
            session,
            cart,
            store: Arc::new(Store::new(Vec::new())),
        }
    }

    pub fn store(&self) -> &Arc<Store<Vec<Order>>> {
        &self.store
    }

    pub fn orders(&self) -> Vec<Order> {
        self.store.snapshot()
    }

    pub fn live_order(&self) -> Option<Order> {
        self.store
            .snapshot()
            .into_iter()
            .find(|order| order.status.is_live())
    }

    pub async fn fetch_orders(&self) -> Result<Vec<Order>, AppError> {
        let api = self.order_api.as_ref();
        let orders = with_session_retry(self.session.as_ref(), || api.list_orders()).await?;
        tracing::debug!("Pobrano {} zamówień", orders.len());
        self.store.replace(orders.clone());
        Ok(orders)
    }

    async fn reconcile_orders(&self) {
        self.store.invalidate();
        if let Err(err) = self.fetch_orders().await {
            tracing::warn!("Nie udało się odświeżyć listy zamówień: {}", err);
        }
    }

    async fn reconcile_cart(&self) {
        if let Err(err) = self.cart.fetch_cart().await {
            tracing::warn!("Nie udało się odświeżyć koszyka po zamówieniu: {}", err);
        }
    }

    /// Składa zamówienie z bieżącego koszyka silnika koszyka.
    pub async fn checkout(&self) -> Result<Order, AppError> {
        let cart_id = match self.cart.cart_id() {
            Some(cart_id) => cart_id,
            None => self.cart.fetch_cart().await?.cart_id.ok_or_else(|| {
                AppError::Validation("Brak koszyka do złożenia zamówienia".to_string())
            })?,
        };
        self.create_from_cart(&cart_id).await
    }

    pub async fn create_from_cart(&self, cart_id: &str) -> Result<Order, AppError> {
        let _reconciling = self.store.begin_reconcile();
        let api = self.order_api.as_ref();

        // Warunek wstępny: żadnego żywego zamówienia. Lista z serwera, nie z pamięci podręcznej.
        let existing = self.fetch_orders().await?;
        for stale in existing.iter().filter(|order| order.status.is_live()) {
            let stale_id = stale.id();
            tracing::info!(
                "Usuwam poprzednie zamówienie {} ({}) przed utworzeniem nowego",
                stale_id,
                stale.status
            );
            with_session_retry(self.session.as_ref(), || api.delete_order(stale_id))
                .await
                .inspect_err(|err| {
                    tracing::error!(
                        "Nie można usunąć poprzedniego zamówienia {}: {}",
                        stale_id,
                        err
                    );
                })?;
            self.store
                .patch(|orders| orders.retain(|order| order.id() != stale_id));
        }

        let created =
            match with_session_retry(self.session.as_ref(), || api.create_order(cart_id)).await {
                Ok(order) => order,
                Err(err) => {
                    match &err {
                        AppError::MissingAddress => {
                            tracing::warn!("Zamówienie odrzucone: brak adresu dostawy")
                        }
                        other => tracing::error!("Nie udało się utworzyć zamówienia: {}", other),
                    }
                    self.reconcile_orders().await;
                    return Err(err);
                }
            };
        tracing::info!(
            "Utworzono zamówienie {} z koszyka {} na kwotę {}",
            created.id(),
            cart_id,
            created.amount
        );

        // Równoległe odświeżenie mogło już wstawić to zamówienie.
        self.store.patch(|orders| {
            if !orders.iter().any(|order| order.id() == created.id()) {
                orders.insert(0, created.clone());
            }
        });

        // Serwer mógł skonsumować pozycje koszyka.
        self.reconcile_orders().await;
        self.reconcile_cart().await;
        Ok(created)
    }

    pub async fn delete_order(&self, order_id: &str) -> Result<(), AppError> {
        let _reconciling = self.store.begin_reconcile();
        let snapshot = self.store.snapshot();

        if let Some(order) = snapshot.iter().find(|order| order.id() == order_id) {
            if !order.status.is_live() {
                tracing::warn!(
                    "Próba usunięcia zamówienia {} w stanie {}",
                    order_id,
                    order.status
                );
                return Err(AppError::Conflict(format!(
                    "Zamówienia w stanie '{}' nie można usunąć",
                    order.status
                )));
            }
        }

        self.store
            .patch(|orders| orders.retain(|order| order.id() != order_id));

        let api = self.order_api.as_ref();
        let outcome =
            with_session_retry(self.session.as_ref(), || api.delete_order(order_id)).await;
        if let Err(err) = &outcome {
            tracing::warn!(
                "Usunięcie zamówienia {} nie powiodło się ({}). Przywracam listę.",
                order_id,
                err
            );
            self.store.restore(snapshot);
        }

        self.reconcile_orders().await;
        outcome
    }

    /// Zwraca adres przekierowania do bramki płatności.
    pub async fn initiate_payment(&self, order_id: &str) -> Result<String, AppError> {
        let api = self.payment_api.as_ref();
        let redirect =
            with_session_retry(self.session.as_ref(), || api.initiate_payment(order_id)).await?;
        tracing::info!("Płatność zamówienia {} rozpoczęta", order_id);
        self.reconcile_orders().await;
        Ok(redirect)
    }

    /// Wywoływane po potwierdzeniu płatności. Zakłada nowy pusty koszyk, żeby
    /// kolejne produkty nie trafiały do koszyka opłaconego zamówienia.
    pub async fn confirm_payment(&self, order_id: &str) -> Result<CartState, AppError> {
        self.store.patch(|orders| {
            match orders.iter_mut().find(|order| order.id() == order_id) {
                Some(order) if order.status.can_transition_to(OrderStatus::Paid) => {
                    order.status = OrderStatus::Paid;
                }
                Some(order) => tracing::debug!(
                    "Zamówienie {} ma już status {}; pomijam zmianę statusu",
                    order_id,
                    order.status
                ),
                None => tracing::warn!("Potwierdzono płatność nieznanego zamówienia {}", order_id),
            }
        });

        let fresh_cart = self.cart.start_new_cart().await?;
        tracing::info!(
            "Zamówienie {} opłacone; nowy koszyk {:?}",
            order_id,
            fresh_cart.cart_id
        );
        self.reconcile_orders().await;
        Ok(fresh_cart)
    }
}
