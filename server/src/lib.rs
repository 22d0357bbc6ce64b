//! axum serving half of the binding layer plus a demonstration orders
//! service that the client crate is tested against.

pub mod extract;
pub mod orders;

use axum::Router;
use tokio::net::TcpListener;

pub use extract::{Failure, PackedArgs};
pub use orders::{orders_api, Delivery, Order, OrderFailure, OrderLine};

pub fn app() -> Router {
    orders::routes()
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}
