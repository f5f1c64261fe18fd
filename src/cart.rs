// src/cart.rs

//! Optymistyczne mutacje koszyka: zmiana lokalna → wywołanie sieciowe →
//! potwierdzenie albo wycofanie → zawsze ponowny odczyt z serwera.

use std::sync::Arc;

use crate::{
    auth::with_session_retry,
    cart_utils::{build_cart_state, summarize},
    coalescer::InFlight,
    errors::AppError,
    merge::merge_guest_lines,
    models::{
        AddLinePayload, CartBadge, CartLine, CartState, CartSummary, ReplaceLinePayload,
        ServerCart,
    },
    services::{CartApi, SessionApi},
    size_note,
    state::LineUpdateMode,
    store::Store,
};

pub struct CartEngine {
    cart_api: Arc<dyn CartApi>,
    session: Arc<dyn SessionApi>,
    store: Arc<Store<CartState>>,
    in_flight: InFlight<Vec<ServerCart>>,
    user_key: String,
    update_mode: LineUpdateMode,
}

impl std::fmt::Debug for CartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartEngine")
            .field("user_key", &self.user_key)
            .field("update_mode", &self.update_mode)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl CartEngine {
    pub fn new(
        cart_api: Arc<dyn CartApi>,
        session: Arc<dyn SessionApi>,
        user_key: impl Into<String>,
    ) -> Self {
        Self {
            cart_api,
            session,
            store: Arc::new(Store::new(CartState::default())),
            in_flight: InFlight::new(),
            user_key: user_key.into(),
            update_mode: LineUpdateMode::default(),
        }
    }

    pub fn with_update_mode(mut self, update_mode: LineUpdateMode) -> Self {
        self.update_mode = update_mode;
        self
    }

    /// Wstrzyknięcie własnego magazynu (np. współdzielonego z interfejsem).
    pub fn with_store(mut self, store: Arc<Store<CartState>>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<Store<CartState>> {
        &self.store
    }

    pub fn lines(&self) -> Vec<CartLine> {
        self.store.snapshot().to_lines()
    }

    pub fn cart_id(&self) -> Option<String> {
        self.store.snapshot().cart_id
    }

    pub fn summary(&self) -> CartSummary {
        summarize(self.store.snapshot().lines.values())
    }

    /// W trakcie uzgadniania pokazujemy stan przejściowy zamiast chwilowo błędnej liczby.
    pub fn badge(&self) -> CartBadge {
        if self.store.is_reconciling() {
            CartBadge::Reconciling
        } else {
            CartBadge::Count(self.summary().total_quantity)
        }
    }

    fn request_key(&self) -> String {
        format!("getMyCart:{}", self.user_key)
    }

    /// Surowi kandydaci z serwera; równoległe wywołania dzielą jedno żądanie.
    pub async fn load_server_carts(&self) -> Result<Vec<ServerCart>, AppError> {
        let cart_api = Arc::clone(&self.cart_api);
        let session = Arc::clone(&self.session);
        self.in_flight
            .get(&self.request_key(), move || async move {
                let api = cart_api.as_ref();
                with_session_retry(session.as_ref(), move || api.get_my_cart()).await
            })
            .await
    }

    /// Pobiera koszyk, normalizuje go i podmienia stan lokalny.
    pub async fn fetch_cart(&self) -> Result<CartState, AppError> {
        let _reconciling = self.store.begin_reconcile();
        let candidates = self.load_server_carts().await?;
        let state = build_cart_state(&candidates);
        tracing::debug!(
            "Koszyk {:?} uzgodniony: {} pozycji",
            state.cart_id,
            state.lines.len()
        );
        self.store.replace(state.clone());
        Ok(state)
    }

    // Wartość optymistyczna jest tylko tymczasowa: ostatnie słowo ma serwer.
    async fn reconcile(&self) {
        self.store.invalidate();
        // Odczyt trwający od przed zapisu nie widzi mutacji: czekamy na niego i czytamy od nowa.
        if self.in_flight.is_pending(&self.request_key()) {
            tracing::debug!("Czekam na wcześniejszy odczyt koszyka przed uzgodnieniem");
            let _ = self.load_server_carts().await;
        }
        if let Err(err) = self.fetch_cart().await {
            tracing::warn!("Nie udało się uzgodnić koszyka po mutacji: {}", err);
        }
    }

    async fn settle(
        &self,
        operation: &str,
        snapshot: CartState,
        outcome: Result<(), AppError>,
    ) -> Result<(), AppError> {
        match &outcome {
            Ok(()) => tracing::debug!("Mutacja '{}' potwierdzona przez serwer", operation),
            Err(err) => {
                tracing::warn!(
                    "Mutacja '{}' nie powiodła się ({}). Przywracam stan sprzed zmiany.",
                    operation,
                    err
                );
                self.store.restore(snapshot);
            }
        }
        self.reconcile().await;
        outcome
    }

    pub async fn add_line(
        &self,
        product_id: &str,
        quantity: u32,
        price: Option<f64>,
        size_note: Option<&str>,
    ) -> Result<(), AppError> {
        validate_product_id(product_id)?;
        if quantity == 0 {
            return Err(AppError::Validation(
                "Ilość dodawanego produktu musi być większa od zera".to_string(),
            ));
        }

        let _reconciling = self.store.begin_reconcile();
        let note = size_note.map(str::trim).filter(|note| !note.is_empty());
        let added_sizes = note.map(size_note::decode).unwrap_or_default();

        let snapshot = self.store.snapshot();
        let applied = self.store.patch(|state| -> Result<(), AppError> {
            match state.lines.get_mut(product_id) {
                Some(line) => {
                    line.quantity = line.quantity.checked_add(quantity).ok_or_else(|| {
                        AppError::Validation(format!(
                            "Ilość produktu {} przekracza dopuszczalny zakres",
                            product_id
                        ))
                    })?;
                    if price.is_some() {
                        line.price = price;
                    }
                    if !added_sizes.is_empty() {
                        let merged = size_note::merge(
                            line.size_breakdown.as_deref().unwrap_or_default(),
                            &added_sizes,
                        );
                        line.product_note = Some(size_note::encode(&merged));
                        line.size_breakdown = Some(merged);
                    }
                    Ok(())
                }
                None => {
                    let mut line = CartLine::new(product_id, quantity);
                    line.price = price;
                    line.product_note = note.map(str::to_string);
                    if !added_sizes.is_empty() {
                        line.size_breakdown = Some(added_sizes.clone());
                    }
                    state.lines.insert(product_id.to_string(), line);
                    Ok(())
                }
            }
        });
        if let Err(err) = applied {
            tracing::warn!("Odrzucono dodanie {} x {}: {}", quantity, product_id, err);
            return Err(err);
        }
        tracing::info!("Dodaję {} x {} do koszyka", quantity, product_id);

        let payload = vec![AddLinePayload {
            product: product_id.to_string(),
            quantity,
            product_note: note.map(size_note::to_fragments).unwrap_or_default(),
        }];
        let api = self.cart_api.as_ref();
        let outcome =
            with_session_retry(self.session.as_ref(), || api.add_lines(payload.clone())).await;

        self.settle("add", snapshot, outcome).await
    }

    /// Ustawia ilość pozycji; `quantity <= 0` usuwa ją z koszyka.
    pub async fn update_quantity(
        &self,
        cart_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Result<(), AppError> {
        let _reconciling = self.store.begin_reconcile();
        let snapshot = self.store.snapshot();
        if !snapshot.lines.contains_key(product_id) {
            tracing::warn!("Produktu {} nie ma w lokalnym koszyku", product_id);
            return Err(AppError::NotFound);
        }

        let changed_line = self.store.patch(|state| {
            if quantity <= 0 {
                state.lines.shift_remove(product_id);
                return None;
            }
            let line = state.lines.get_mut(product_id)?;
            line.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
            Some(ReplaceLinePayload::from(&*line))
        });
        tracing::info!("Zmiana ilości produktu {} na {}", product_id, quantity);

        let api = self.cart_api.as_ref();
        let outcome = match (self.update_mode, changed_line) {
            (LineUpdateMode::PerLine, Some(line)) => {
                with_session_retry(self.session.as_ref(), || {
                    api.patch_line(cart_id, line.clone())
                })
                .await
            }
            (LineUpdateMode::PerLine, None) => {
                with_session_retry(self.session.as_ref(), || {
                    api.delete_line(cart_id, product_id)
                })
                .await
            }
            (LineUpdateMode::FullReplace, _) => {
                // Backend zna tylko podmianę całej tablicy: wysyłamy wszystkie znane pozycje.
                let payload: Vec<ReplaceLinePayload> = self
                    .store
                    .snapshot()
                    .lines
                    .values()
                    .map(ReplaceLinePayload::from)
                    .collect();
                with_session_retry(self.session.as_ref(), || {
                    api.replace_lines(cart_id, payload.clone())
                })
                .await
            }
        };

        self.settle("update_quantity", snapshot, outcome).await
    }

    pub async fn remove_line(&self, cart_id: &str, product_id: &str) -> Result<(), AppError> {
        let _reconciling = self.store.begin_reconcile();
        let snapshot = self.store.snapshot();
        self.store.patch(|state| state.lines.shift_remove(product_id));
        tracing::info!("Usuwam produkt {} z koszyka {}", product_id, cart_id);

        let api = self.cart_api.as_ref();
        let outcome = with_session_retry(self.session.as_ref(), || {
            api.delete_line(cart_id, product_id)
        })
        .await;

        self.settle("remove", snapshot, outcome).await
    }

    /// Podmienia cały koszyk na podaną listę (prymityw dla scalania koszyka gościa).
    pub async fn replace_lines(&self, cart_id: &str, lines: Vec<CartLine>) -> Result<(), AppError> {
        for line in &lines {
            validate_product_id(&line.product_id)?;
            if line.quantity == 0 {
                return Err(AppError::Validation(format!(
                    "Pozycja {} ma zerową ilość",
                    line.product_id
                )));
            }
        }

        let _reconciling = self.store.begin_reconcile();
        let snapshot = self.store.snapshot();
        let replacement = CartState::from_lines(Some(cart_id.to_string()), lines);
        let payload: Vec<ReplaceLinePayload> = replacement
            .lines
            .values()
            .map(ReplaceLinePayload::from)
            .collect();
        self.store.patch(|state| *state = replacement);
        tracing::info!(
            "Pełna podmiana koszyka {} ({} pozycji)",
            cart_id,
            payload.len()
        );

        let api = self.cart_api.as_ref();
        let outcome = with_session_retry(self.session.as_ref(), || {
            api.replace_lines(cart_id, payload.clone())
        })
        .await;

        self.settle("replace", snapshot, outcome).await
    }

    /// Scalanie koszyka gościa po zalogowaniu.
    pub async fn merge_guest_cart(&self, guest_lines: Vec<CartLine>) -> Result<(), AppError> {
        let current = self.fetch_cart().await?;
        let server_lines = current.to_lines();

        let Some(cart_id) = current.cart_id else {
            // Użytkownik nie ma jeszcze koszyka: wysyłamy pozycje gościa jedną partią.
            let payload: Vec<AddLinePayload> = merge_guest_lines(&[], &guest_lines)
                .iter()
                .map(|line| AddLinePayload {
                    product: line.product_id.clone(),
                    quantity: line.quantity,
                    product_note: line
                        .product_note
                        .as_deref()
                        .map(size_note::to_fragments)
                        .unwrap_or_default(),
                })
                .collect();
            if payload.is_empty() {
                return Ok(());
            }
            let _reconciling = self.store.begin_reconcile();
            let snapshot = self.store.snapshot();
            let api = self.cart_api.as_ref();
            let outcome =
                with_session_retry(self.session.as_ref(), || api.add_lines(payload.clone()))
                    .await;
            return self.settle("merge", snapshot, outcome).await;
        };

        let merged = merge_guest_lines(&server_lines, &guest_lines);
        if merged == server_lines {
            tracing::debug!("Koszyk gościa nie wnosi nowych pozycji");
            return Ok(());
        }
        self.replace_lines(&cart_id, merged).await
    }

    /// Tworzy nowy pusty koszyk (tylko utworzenie, bez scalania).
    pub async fn start_new_cart(&self) -> Result<CartState, AppError> {
        let _reconciling = self.store.begin_reconcile();
        let api = self.cart_api.as_ref();
        let cart = with_session_retry(self.session.as_ref(), || api.create_empty_cart()).await?;
        let state = build_cart_state(&[cart]);
        tracing::info!("Utworzono nowy koszyk {:?}", state.cart_id);
        self.store.replace(state.clone());
        Ok(state)
    }
}

fn validate_product_id(product_id: &str) -> Result<(), AppError> {
    let trimmed = product_id.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
        return Err(AppError::Validation(format!(
            "Niepoprawne ID produktu: '{}'",
            product_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        models::{ProductNote, Reference, ServerCartLine, SizeCount},
        services::MockSessionApi,
    };

    /// Backend w pamięci, który naprawdę stosuje zmiany i zapisuje wywołania.
    #[derive(Default)]
    struct FakeCartApi {
        server: Mutex<ServerCart>,
        reads: AtomicUsize,
        fail_reads: AtomicBool,
        read_gated: AtomicBool,
        read_gate: Notify,
        quantity_cap: Mutex<Option<u32>>,
        fail_next_write: Mutex<Option<AppError>>,
        gated: AtomicBool,
        gate: Notify,
        added: Mutex<Vec<Vec<AddLinePayload>>>,
        replaced: Mutex<Vec<Vec<ReplaceLinePayload>>>,
        patched: Mutex<Vec<ReplaceLinePayload>>,
        deleted: Mutex<Vec<(String, String)>>,
    }

    impl FakeCartApi {
        fn with_lines(lines: &[(&str, i64)]) -> Arc<Self> {
            let api = Self::default();
            {
                let mut server = api.server.lock().expect("lock");
                server.mongo_id = Some("cart-1".to_string());
                server.products = lines
                    .iter()
                    .map(|(id, quantity)| server_line(id, *quantity))
                    .collect();
            }
            Arc::new(api)
        }

        fn fail_next(&self, err: AppError) {
            *self.fail_next_write.lock().expect("lock") = Some(err);
        }

        async fn before_write(&self) -> Result<(), AppError> {
            if self.gated.load(Ordering::SeqCst) {
                self.gate.notified().await;
            }
            match self.fail_next_write.lock().expect("lock").take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn server_line(id: &str, quantity: i64) -> ServerCartLine {
        ServerCartLine {
            product: Some(Reference::Id(id.to_string())),
            quantity,
            ..Default::default()
        }
    }

    #[async_trait]
    impl CartApi for FakeCartApi {
        async fn get_my_cart(&self) -> Result<Vec<ServerCart>, AppError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            // Odczyt widzi stan z chwili rozpoczęcia, nawet gdy odpowiedź przychodzi później.
            let seen = self.server.lock().expect("lock").clone();
            if self.read_gated.load(Ordering::SeqCst) {
                self.read_gate.notified().await;
            }
            tokio::task::yield_now().await;
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(AppError::Network("odczyt niedostępny".to_string()));
            }
            Ok(vec![seen])
        }

        async fn add_lines(&self, lines: Vec<AddLinePayload>) -> Result<(), AppError> {
            self.before_write().await?;
            self.added.lock().expect("lock").push(lines.clone());
            let mut server = self.server.lock().expect("lock");
            for line in lines {
                let existing = server.products.iter_mut().find(|raw| {
                    raw.product == Some(Reference::Id(line.product.clone()))
                });
                match existing {
                    Some(raw) => raw.quantity += i64::from(line.quantity),
                    None => {
                        let mut raw = server_line(&line.product, i64::from(line.quantity));
                        raw.product_note = Some(ProductNote::Many(line.product_note));
                        server.products.push(raw);
                    }
                }
            }
            Ok(())
        }

        async fn replace_lines(
            &self,
            _cart_id: &str,
            lines: Vec<ReplaceLinePayload>,
        ) -> Result<(), AppError> {
            self.before_write().await?;
            self.replaced.lock().expect("lock").push(lines.clone());
            let cap = *self.quantity_cap.lock().expect("lock");
            self.server.lock().expect("lock").products = lines
                .iter()
                .map(|line| {
                    let quantity = cap.map_or(line.quantity, |cap| line.quantity.min(cap));
                    server_line(&line.product_id, i64::from(quantity))
                })
                .collect();
            Ok(())
        }

        async fn patch_line(
            &self,
            _cart_id: &str,
            line: ReplaceLinePayload,
        ) -> Result<(), AppError> {
            self.before_write().await?;
            self.patched.lock().expect("lock").push(line.clone());
            let mut server = self.server.lock().expect("lock");
            if let Some(raw) = server
                .products
                .iter_mut()
                .find(|raw| raw.product == Some(Reference::Id(line.product_id.clone())))
            {
                raw.quantity = i64::from(line.quantity);
            }
            Ok(())
        }

        async fn delete_line(&self, cart_id: &str, product_id: &str) -> Result<(), AppError> {
            self.before_write().await?;
            self.deleted
                .lock()
                .expect("lock")
                .push((cart_id.to_string(), product_id.to_string()));
            self.server
                .lock()
                .expect("lock")
                .products
                .retain(|raw| raw.product != Some(Reference::Id(product_id.to_string())));
            Ok(())
        }

        async fn create_empty_cart(&self) -> Result<ServerCart, AppError> {
            self.before_write().await?;
            let mut server = self.server.lock().expect("lock");
            *server = ServerCart {
                mongo_id: Some("cart-2".to_string()),
                ..Default::default()
            };
            Ok(server.clone())
        }
    }

    fn engine(api: &Arc<FakeCartApi>) -> CartEngine {
        // Brak oczekiwań: każda próba odświeżenia sesji zakończy test błędem.
        CartEngine::new(api.clone(), Arc::new(MockSessionApi::new()), "current")
    }

    fn quantities(engine: &CartEngine) -> Vec<(String, u32)> {
        engine
            .lines()
            .into_iter()
            .map(|line| (line.product_id, line.quantity))
            .collect()
    }

    #[tokio::test]
    async fn update_to_zero_submits_remaining_lines_and_reconciles() {
        let api = FakeCartApi::with_lines(&[("A", 2), ("B", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        engine
            .update_quantity("cart-1", "B", 0)
            .await
            .expect("aktualizacja");

        let replaced = api.replaced.lock().expect("lock").clone();
        assert_eq!(
            replaced,
            vec![vec![ReplaceLinePayload {
                product_id: "A".to_string(),
                quantity: 2,
                price: None,
                product_note: None,
            }]]
        );
        assert_eq!(quantities(&engine), vec![("A".to_string(), 2)]);
        assert!(!engine.store().is_stale());
    }

    #[tokio::test]
    async fn failed_update_restores_exact_snapshot() {
        let api = FakeCartApi::with_lines(&[("A", 2), ("B", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");
        let before = engine.lines();

        api.fail_next(AppError::Api {
            status: 500,
            message: "boom".to_string(),
        });
        api.fail_reads.store(true, Ordering::SeqCst);

        let result = engine.update_quantity("cart-1", "A", 5).await;

        assert!(matches!(result, Err(AppError::Api { status: 500, .. })));
        assert_eq!(engine.lines(), before);
        assert!(engine.store().is_stale());
    }

    #[tokio::test]
    async fn failed_remove_restores_line() {
        let api = FakeCartApi::with_lines(&[("A", 2), ("B", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        api.fail_next(AppError::Network("offline".to_string()));
        api.fail_reads.store(true, Ordering::SeqCst);
        let result = engine.remove_line("cart-1", "A").await;

        assert_eq!(result, Err(AppError::Network("offline".to_string())));
        assert_eq!(
            quantities(&engine),
            vec![("A".to_string(), 2), ("B".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn remove_calls_targeted_delete() {
        let api = FakeCartApi::with_lines(&[("A", 2), ("B", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        engine.remove_line("cart-1", "A").await.expect("usunięcie");

        assert_eq!(
            api.deleted.lock().expect("lock").clone(),
            vec![("cart-1".to_string(), "A".to_string())]
        );
        assert_eq!(quantities(&engine), vec![("B".to_string(), 1)]);
    }

    #[tokio::test]
    async fn add_is_visible_before_server_confirms() {
        let api = FakeCartApi::with_lines(&[("A", 1)]);
        api.gated.store(true, Ordering::SeqCst);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        let mutation = engine.add_line("B", 3, Some(10.0), Some("2 S, 1 M"));
        let observer = async {
            tokio::task::yield_now().await;
            let optimistic = engine.lines();
            let badge = engine.badge();
            api.gate.notify_one();
            (optimistic, badge)
        };
        let (result, (optimistic, badge)) = tokio::join!(mutation, observer);

        result.expect("dodanie");
        assert_eq!(badge, CartBadge::Reconciling);
        assert_eq!(optimistic.len(), 2);
        assert_eq!(optimistic[1].product_id, "B");
        assert_eq!(
            optimistic[1].size_breakdown,
            Some(vec![SizeCount::new("S", 2), SizeCount::new("M", 1)])
        );

        let added = api.added.lock().expect("lock").clone();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0][0].product_note, vec!["2 S", "1 M"]);
        assert_eq!(engine.badge(), CartBadge::Count(4));
    }

    #[tokio::test]
    async fn failed_add_rolls_back_like_other_mutations() {
        let api = FakeCartApi::with_lines(&[("A", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        api.fail_next(AppError::Conflict("Produkt niedostępny".to_string()));
        api.fail_reads.store(true, Ordering::SeqCst);
        let result = engine.add_line("A", 2, None, None).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(quantities(&engine), vec![("A".to_string(), 1)]);
    }

    #[tokio::test]
    async fn per_line_mode_patches_only_changed_line() {
        let api = FakeCartApi::with_lines(&[("A", 2), ("B", 1)]);
        let engine = engine(&api).with_update_mode(LineUpdateMode::PerLine);
        engine.fetch_cart().await.expect("odczyt koszyka");

        engine
            .update_quantity("cart-1", "B", 4)
            .await
            .expect("aktualizacja");
        engine
            .update_quantity("cart-1", "A", -1)
            .await
            .expect("usunięcie");

        assert!(api.replaced.lock().expect("lock").is_empty());
        assert_eq!(api.patched.lock().expect("lock")[0].product_id, "B");
        assert_eq!(
            api.deleted.lock().expect("lock").clone(),
            vec![("cart-1".to_string(), "A".to_string())]
        );
        assert_eq!(quantities(&engine), vec![("B".to_string(), 4)]);
    }

    #[tokio::test]
    async fn unknown_line_update_is_rejected_without_network() {
        let api = FakeCartApi::with_lines(&[("A", 2)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        let result = engine.update_quantity("cart-1", "Z", 3).await;

        assert_eq!(result, Err(AppError::NotFound));
        assert!(api.replaced.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_read() {
        let api = FakeCartApi::with_lines(&[("A", 2)]);
        let engine = engine(&api);

        let (first, second, third) =
            tokio::join!(engine.fetch_cart(), engine.fetch_cart(), engine.fetch_cart());

        assert_eq!(api.reads.load(Ordering::SeqCst), 1);
        let first = first.expect("odczyt");
        assert_eq!(second.expect("odczyt"), first);
        assert_eq!(third.expect("odczyt"), first);
    }

    #[tokio::test]
    async fn guest_merge_keeps_server_lines() {
        let api = FakeCartApi::with_lines(&[("A", 2)]);
        let engine = engine(&api);

        engine
            .merge_guest_cart(vec![CartLine::new("A", 9), CartLine::new("C", 1)])
            .await
            .expect("scalanie");

        assert_eq!(
            quantities(&engine),
            vec![("A".to_string(), 2), ("C".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn new_cart_replaces_local_state() {
        let api = FakeCartApi::with_lines(&[("A", 2)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        let state = engine.start_new_cart().await.expect("nowy koszyk");

        assert_eq!(state.cart_id.as_deref(), Some("cart-2"));
        assert!(engine.lines().is_empty());
        assert_eq!(engine.cart_id().as_deref(), Some("cart-2"));
    }

    #[tokio::test]
    async fn invalid_product_id_is_rejected() {
        let api = FakeCartApi::with_lines(&[]);
        let engine = engine(&api);
        let result = engine.add_line("undefined", 1, None, None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn add_overflow_is_rejected_without_touching_store() {
        let api = FakeCartApi::with_lines(&[("A", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        let result = engine.add_line("A", u32::MAX, None, None).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(quantities(&engine), vec![("A".to_string(), 1)]);
        assert!(api.added.lock().expect("lock").is_empty());
        assert!(!engine.store().is_reconciling());
    }

    #[tokio::test]
    async fn badge_saturates_for_huge_server_quantities() {
        let api = FakeCartApi::with_lines(&[("A", i64::from(u32::MAX)), ("B", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        assert_eq!(engine.badge(), CartBadge::Count(u32::MAX));
        assert_eq!(engine.summary().total_items, 2);
    }

    #[tokio::test]
    async fn server_answer_replaces_optimistic_quantity() {
        let api = FakeCartApi::with_lines(&[("A", 1), ("B", 1)]);
        *api.quantity_cap.lock().expect("lock") = Some(3);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");

        engine
            .update_quantity("cart-1", "A", 10)
            .await
            .expect("aktualizacja");

        assert_eq!(api.replaced.lock().expect("lock")[0][0].quantity, 10);
        assert_eq!(
            quantities(&engine),
            vec![("A".to_string(), 3), ("B".to_string(), 1)]
        );
        assert!(!engine.store().is_stale());
    }

    #[tokio::test]
    async fn reconcile_waits_out_read_started_before_write() {
        let api = FakeCartApi::with_lines(&[("A", 1)]);
        let engine = engine(&api);
        engine.fetch_cart().await.expect("odczyt koszyka");
        api.read_gated.store(true, Ordering::SeqCst);

        let early_read = engine.fetch_cart();
        let mutation = async {
            while api.reads.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
            engine.update_quantity("cart-1", "A", 5).await
        };
        let release = async {
            while api.replaced.lock().expect("lock").is_empty() {
                tokio::task::yield_now().await;
            }
            api.read_gated.store(false, Ordering::SeqCst);
            api.read_gate.notify_one();
        };
        let (early, updated, ()) = tokio::join!(early_read, mutation, release);

        assert_eq!(early.expect("odczyt").lines["A"].quantity, 1);
        updated.expect("aktualizacja");
        assert_eq!(api.reads.load(Ordering::SeqCst), 3);
        assert_eq!(quantities(&engine), vec![("A".to_string(), 5)]);
        assert!(!engine.store().is_stale());
    }
}
