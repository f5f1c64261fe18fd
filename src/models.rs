// src/models.rs
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

// --- ROZMIARY ---

/// Jedna pozycja rozbicia rozmiarów, np. `2 small`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeCount {
    pub size_label: String,
    pub count: u32,
}

impl SizeCount {
    pub fn new(size_label: impl Into<String>, count: u32) -> Self {
        Self {
            size_label: size_label.into(),
            count,
        }
    }
}

/// Uporządkowane rozbicie ilości pozycji na rozmiary.
pub type SizeBreakdown = Vec<SizeCount>;

// --- LOKALNY KOSZYK ---

/// Pozycja koszyka trzymana po stronie klienta. Klucz: `product_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
    pub price: Option<f64>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub size_breakdown: Option<SizeBreakdown>,
    pub product_note: Option<String>,
    pub available_sizes: Option<Vec<String>>,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price: None,
            name: None,
            image: None,
            size_breakdown: None,
            product_note: None,
            available_sizes: None,
        }
    }
}

/// Stan lokalnego koszyka: identyfikator koszyka na serwerze i pozycje w kolejności wstawienia.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CartState {
    pub cart_id: Option<String>,
    pub lines: IndexMap<String, CartLine>,
}

impl CartState {
    pub fn from_lines(cart_id: Option<String>, lines: Vec<CartLine>) -> Self {
        Self {
            cart_id,
            lines: lines
                .into_iter()
                .map(|line| (line.product_id.clone(), line))
                .collect(),
        }
    }

    pub fn to_lines(&self) -> Vec<CartLine> {
        self.lines.values().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CartSummary {
    pub total_items: usize,
    pub total_quantity: u32,
    pub total_price: f64,
}

/// Co interfejs pokazuje przy ikonie koszyka.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartBadge {
    /// Trwa uzgadnianie z serwerem; zamiast liczby pokazujemy stan przejściowy.
    Reconciling,
    Count(u32),
}

// --- KOSZYK NA SERWERZE ---

/// Referencja, która może być gołym identyfikatorem albo wypełnionym obiektem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference<T> {
    Id(String),
    Populated(T),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, alias = "availableSizes")]
    pub sizes: Vec<String>,
}

impl ProductRef {
    pub fn id(&self) -> Option<&str> {
        self.mongo_id.as_deref().or(self.id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Notatka rozmiarów: serwer wysyła albo jeden napis, albo tablicę fragmentów.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductNote {
    One(String),
    Many(Vec<String>),
}

impl ProductNote {
    pub fn fragments(&self) -> Vec<&str> {
        match self {
            ProductNote::One(note) => vec![note.as_str()],
            ProductNote::Many(fragments) => fragments.iter().map(String::as_str).collect(),
        }
    }

    /// Surowy napis do wyświetlenia lub ponownego wysłania.
    pub fn raw(&self) -> String {
        match self {
            ProductNote::One(note) => note.trim().to_string(),
            ProductNote::Many(fragments) => fragments
                .iter()
                .map(|fragment| fragment.trim())
                .filter(|fragment| !fragment.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCartLine {
    #[serde(default)]
    pub product: Option<Reference<ProductRef>>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub product_note: Option<ProductNote>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCart {
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user: Option<Reference<UserRef>>,
    #[serde(default)]
    pub products: Vec<ServerCartLine>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServerCart {
    pub fn id(&self) -> Option<&str> {
        self.mongo_id.as_deref().or(self.id.as_deref())
    }
}

/// Odpowiedź listująca: pojedynczy dokument, tablica albo `{ data: [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Wrapped { data: Vec<T> },
    Many(Vec<T>),
    One(T),
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Wrapped { data } => data,
            ListEnvelope::Many(items) => items,
            ListEnvelope::One(item) => vec![item],
        }
    }
}

// --- ZAMÓWIENIA ---

/// Status zamówienia
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OrderStatus {
    Pending,   // Utworzone, czeka na płatność
    Initiated, // Płatność rozpoczęta
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Zamówienie "żywe" (nieopłacone). Użytkownik może mieć najwyżej jedno takie.
    pub fn is_live(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Initiated)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Initiated)
                | (Pending, Paid)
                | (Initiated, Paid)
                | (Paid, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Initiated, Cancelled)
        )
    }
}

/// Reprezentuje zamówienie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user: Option<Reference<UserRef>>,
    #[serde(default)]
    pub cart: Option<Reference<ServerCart>>,
    #[serde(default)]
    pub amount: f64,
    // Adres jest dla rdzenia nieprzezroczysty (napis albo obiekt).
    #[serde(default)]
    pub address: Option<serde_json::Value>,
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn id(&self) -> &str {
        self.mongo_id
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or_default()
    }
}

// --- STRUKTURY PAYLOAD ---

/// Element tablicy wysyłanej w `POST /api/cart/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLinePayload {
    pub product: String,
    pub quantity: u32,
    pub product_note: Vec<String>,
}

/// Element tablicy wysyłanej w `PUT /api/cart/:id` (pełna podmiana).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceLinePayload {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_note: Option<Vec<String>>,
}

impl From<&CartLine> for ReplaceLinePayload {
    fn from(line: &CartLine) -> Self {
        ReplaceLinePayload {
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            price: line.price,
            product_note: line
                .product_note
                .as_deref()
                .map(crate::size_note::to_fragments)
                .filter(|fragments| !fragments.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    pub cart_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentPayload {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRedirect {
    #[serde(alias = "redirectUrl")]
    pub url: String,
}

/// Treść odpowiedzi z błędem.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
