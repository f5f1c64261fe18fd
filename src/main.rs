// src/main.rs

use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_cart::{
    ApiConfig, AppError, CartEngine, HttpApi, OrderEngine,
    models::{CartBadge, Order},
};

#[derive(Debug, Parser)]
#[command(name = "storefront-cart", version, about = "Koszyk i zamówienia sklepu z linii poleceń")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pokazuje bieżący koszyk
    Cart,
    /// Dodaje produkt do koszyka
    Add {
        product_id: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
        #[arg(long)]
        price: Option<f64>,
        /// Rozmiary, np. "2 S, 1 M"
        #[arg(long)]
        sizes: Option<String>,
    },
    /// Ustawia ilość pozycji (0 usuwa pozycję)
    SetQty {
        product_id: String,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Usuwa pozycję z koszyka
    Remove { product_id: String },
    /// Lista zamówień
    Orders,
    /// Składa zamówienie z bieżącego koszyka
    Checkout,
    /// Rozpoczyna płatność i wypisuje adres przekierowania
    Pay { order_id: String },
    /// Obsługuje potwierdzenie płatności (nowy pusty koszyk)
    ConfirmPayment { order_id: String },
    /// Tworzy nowy pusty koszyk
    NewCart,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Logi idą na stderr, stdout zostaje dla wyników polecenia.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_cart=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match ApiConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Nie można wczytać konfiguracji: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run(cli.command, config).await {
        if matches!(err, AppError::MissingAddress) {
            eprintln!("Uzupełnij adres dostawy w profilu, a potem ponów zamówienie.");
        }
        tracing::error!("Polecenie nie powiodło się [{}]: {}", err.code(), err);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: ApiConfig) -> Result<(), AppError> {
    let api = Arc::new(HttpApi::new(config.clone())?);
    let cart = Arc::new(
        CartEngine::new(api.clone(), api.clone(), config.user_key.clone())
            .with_update_mode(config.line_update_mode),
    );
    let orders = OrderEngine::new(api.clone(), api.clone(), api, cart.clone());

    match command {
        Command::Cart => {
            cart.fetch_cart().await?;
            print_cart(&cart);
        }
        Command::Add {
            product_id,
            quantity,
            price,
            sizes,
        } => {
            cart.fetch_cart().await?;
            cart.add_line(&product_id, quantity, price, sizes.as_deref())
                .await?;
            print_cart(&cart);
        }
        Command::SetQty {
            product_id,
            quantity,
        } => {
            let cart_id = require_cart_id(&cart).await?;
            cart.update_quantity(&cart_id, &product_id, quantity)
                .await?;
            print_cart(&cart);
        }
        Command::Remove { product_id } => {
            let cart_id = require_cart_id(&cart).await?;
            cart.remove_line(&cart_id, &product_id).await?;
            print_cart(&cart);
        }
        Command::Orders => {
            for order in orders.fetch_orders().await? {
                print_order(&order);
            }
        }
        Command::Checkout => {
            cart.fetch_cart().await?;
            let order = orders.checkout().await?;
            print_order(&order);
        }
        Command::Pay { order_id } => {
            let redirect = orders.initiate_payment(&order_id).await?;
            println!("{}", redirect);
        }
        Command::ConfirmPayment { order_id } => {
            orders.fetch_orders().await?;
            let fresh = orders.confirm_payment(&order_id).await?;
            println!(
                "Nowy koszyk: {}",
                fresh.cart_id.as_deref().unwrap_or("(brak ID)")
            );
        }
        Command::NewCart => {
            let fresh = cart.start_new_cart().await?;
            println!(
                "Nowy koszyk: {}",
                fresh.cart_id.as_deref().unwrap_or("(brak ID)")
            );
        }
    }
    Ok(())
}

async fn require_cart_id(cart: &CartEngine) -> Result<String, AppError> {
    cart.fetch_cart()
        .await?
        .cart_id
        .ok_or(AppError::NotFound)
}

fn print_cart(cart: &CartEngine) {
    println!(
        "Koszyk {}",
        cart.cart_id().as_deref().unwrap_or("(brak koszyka)")
    );
    for line in cart.lines() {
        println!(
            "  {:<24} x{:<4} {:>10} {}",
            line.name.as_deref().unwrap_or(&line.product_id),
            line.quantity,
            line.price
                .map(|price| format!("{:.2}", price))
                .unwrap_or_else(|| "-".to_string()),
            line.product_note.as_deref().unwrap_or_default()
        );
    }
    let summary = cart.summary();
    match cart.badge() {
        CartBadge::Reconciling => println!("  (trwa uzgadnianie koszyka)"),
        CartBadge::Count(count) => println!(
            "  Razem: {} szt., {} pozycji, {:.2}",
            count, summary.total_items, summary.total_price
        ),
    }
}

fn print_order(order: &Order) {
    println!(
        "{}\t{}\t{:.2}\t{}",
        order.id(),
        order.status,
        order.amount,
        order
            .created_at
            .map(|created| created.to_rfc3339())
            .unwrap_or_default()
    );
}
