// src/lib.rs

//! Klient koszyka i zamówień sklepu: lokalny, optymistyczny stan koszyka
//! uzgadniany z serwerem, który pozostaje jedynym źródłem prawdy.

pub mod auth;
pub mod cart;
pub mod cart_utils;
pub mod coalescer;
pub mod errors;
pub mod http_client;
pub mod merge;
pub mod models;
pub mod orders;
pub mod services;
pub mod size_note;
pub mod state;
pub mod store;

pub use cart::CartEngine;
pub use errors::AppError;
pub use http_client::HttpApi;
pub use orders::OrderEngine;
pub use state::{ApiConfig, LineUpdateMode};
