// src/cart_utils.rs

use indexmap::IndexMap;

use crate::{
    models::{CartLine, CartState, CartSummary, Reference, ServerCart, ServerCartLine},
    size_note,
};

/// Wybiera aktywny koszyk spośród kandydatów: najnowszy `updated_at`,
/// przy remisie pierwszy napotkany. Koszyki bez daty przegrywają z datowanymi.
/// Dokumenty nigdy nie są scalane po stronie klienta.
pub fn select_active_cart(candidates: &[ServerCart]) -> Option<&ServerCart> {
    let mut active: Option<&ServerCart> = None;
    for candidate in candidates {
        active = match active {
            None => Some(candidate),
            Some(current) if candidate.updated_at > current.updated_at => Some(candidate),
            Some(current) => Some(current),
        };
    }
    if candidates.len() > 1 {
        tracing::debug!(
            "Serwer zwrócił {} koszyki; aktywny: {:?}",
            candidates.len(),
            active.and_then(ServerCart::id)
        );
    }
    active
}

/// Zamienia koszyk z serwera na listę lokalnych pozycji, po jednej na produkt.
pub fn normalize_cart(cart: &ServerCart) -> Vec<CartLine> {
    let mut lines: IndexMap<String, CartLine> = IndexMap::with_capacity(cart.products.len());

    for raw in &cart.products {
        let Some(line) = normalize_line(raw) else {
            continue;
        };
        if lines.contains_key(&line.product_id) {
            tracing::warn!(
                "Koszyk {:?} zawiera zduplikowany produkt {}; zostaje ostatnia pozycja",
                cart.id(),
                line.product_id
            );
        }
        // Ostatnia pozycja wygrywa; ilości nie są sumowane.
        lines.insert(line.product_id.clone(), line);
    }

    lines.into_values().collect()
}

/// Wybiera aktywny koszyk i buduje z niego stan lokalny.
pub fn build_cart_state(candidates: &[ServerCart]) -> CartState {
    match select_active_cart(candidates) {
        Some(cart) => CartState::from_lines(cart.id().map(str::to_string), normalize_cart(cart)),
        None => CartState::default(),
    }
}

fn normalize_line(raw: &ServerCartLine) -> Option<CartLine> {
    let (product_id, populated) = match raw.product.as_ref()? {
        Reference::Id(id) => (id.trim(), None),
        Reference::Populated(product) => (product.id().unwrap_or_default().trim(), Some(product)),
    };

    if is_corrupted_id(product_id) {
        tracing::warn!("Pomijam pozycję koszyka z niepoprawnym ID produktu: '{}'", product_id);
        return None;
    }
    let quantity = match u32::try_from(raw.quantity) {
        Ok(quantity) if quantity >= 1 => quantity,
        _ => {
            tracing::warn!(
                "Pomijam pozycję produktu {} z ilością {}",
                product_id,
                raw.quantity
            );
            return None;
        }
    };

    let mut line = CartLine::new(product_id, quantity);
    line.price = raw.price.or(populated.and_then(|product| product.price));

    if let Some(product) = populated {
        line.name = product.name.clone();
        line.image = product.images.first().cloned();
        if !product.sizes.is_empty() {
            line.available_sizes = Some(product.sizes.clone());
        }
    }

    if let Some(note) = &raw.product_note {
        let breakdown = size_note::decode_fragments(&note.fragments());
        if !breakdown.is_empty() {
            line.size_breakdown = Some(breakdown);
        }
        let raw_note = note.raw();
        if !raw_note.is_empty() {
            line.product_note = Some(raw_note);
        }
    }

    Some(line)
}

fn is_corrupted_id(product_id: &str) -> bool {
    product_id.is_empty() || product_id == "null" || product_id == "undefined"
}

pub fn summarize<'a>(lines: impl IntoIterator<Item = &'a CartLine>) -> CartSummary {
    let mut summary = CartSummary::default();
    for line in lines {
        summary.total_items += 1;
        summary.total_quantity = summary.total_quantity.saturating_add(line.quantity);
        summary.total_price += line.price.unwrap_or(0.0) * f64::from(line.quantity);
    }
    summary
}
