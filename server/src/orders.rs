//! Demonstration orders service and its matching interface declaration.
//!
//! `create` takes two independently typed bodies in one request (the packed
//! case), `set_note` takes a single body, and every lookup miss travels back
//! as an `OrderFailure` rather than a bare status code.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use bindrpc_core::{codec, Direction, InterfaceDecl, MethodDecl, ParamDecl, RemoteFailure, ReturnKind, RpcError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::extract::{Failure, PackedArgs};

const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub street: String,
    #[serde(default)]
    pub express: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub lines: Vec<OrderLine>,
    pub delivery: Delivery,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderFailure {
    #[error("order {id} not found")]
    NotFound { id: u64 },

    #[error("order {id} already exists")]
    AlreadyExists { id: u64 },

    #[error("an order needs at least one line")]
    NoLines,
}

impl RemoteFailure for OrderFailure {
    const KIND: &'static str = "orders.failure";
}

pub type Db = Arc<RwLock<BTreeMap<u64, Order>>>;

pub fn routes() -> Router {
    let db: Db = Arc::new(RwLock::new(BTreeMap::new()));
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order).post(create_order).delete(remove_order))
        .route("/orders/{id}/note", put(set_note))
        .with_state(db)
}

/// Client-side declaration of the routes above.
pub fn orders_api() -> InterfaceDecl {
    InterfaceDecl::new("Orders")
        .base_path("/orders")
        .produces("application/json")
        .method(
            MethodDecl::post("create")
                .path("/{id}")
                .param(ParamDecl::path("id"))
                .param(ParamDecl::body("lines"))
                .param(ParamDecl::body("delivery")),
        )
        .method(MethodDecl::get("get").path("/{id}").param(ParamDecl::path("id")))
        .method(
            MethodDecl::get("list")
                .param(ParamDecl::pageable("page"))
                .param(ParamDecl::query_map("filters")),
        )
        .method(
            MethodDecl::put("set_note")
                .path("/{id}/note")
                .param(ParamDecl::path("id"))
                .param(ParamDecl::body("note")),
        )
        .method(
            MethodDecl::delete("remove")
                .path("/{id}")
                .param(ParamDecl::path("id"))
                .returns(ReturnKind::Unit),
        )
        .method(MethodDecl::new("line_count").default_impl(|client, args| {
            let order: Order = client.call("get", args)?;
            let total: u32 = order.lines.iter().map(|line| line.quantity).sum();
            codec::to_arg(&total).map_err(RpcError::from)
        }))
}

async fn create_order(
    State(db): State<Db>,
    Path(id): Path<u64>,
    args: PackedArgs,
) -> Result<(StatusCode, Json<Order>), Failure> {
    let lines: Vec<OrderLine> = args.required(1)?;
    let delivery: Delivery = args.required(2)?;
    if lines.is_empty() {
        return Err(OrderFailure::NoLines.into());
    }

    let mut orders = db.write().await;
    if orders.contains_key(&id) {
        return Err(OrderFailure::AlreadyExists { id }.into());
    }
    let order = Order {
        id,
        lines,
        delivery,
        note: None,
    };
    orders.insert(id, order.clone());
    info!(id, lines = order.lines.len(), "order created");
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<Order>, Failure> {
    let orders = db.read().await;
    let order = orders.get(&id).cloned().ok_or(OrderFailure::NotFound { id })?;
    Ok(Json(order))
}

/// `page`, `size` and `sort=id,ASC|DESC` page through the orders; `sku`
/// keeps orders containing that SKU. Unknown parameters are ignored.
async fn list_orders(State(db): State<Db>, Query(params): Query<Vec<(String, String)>>) -> Json<Vec<Order>> {
    let mut page = 0;
    let mut size = DEFAULT_PAGE_SIZE;
    let mut direction = Direction::Asc;
    let mut sku = None;
    for (name, value) in &params {
        match name.as_str() {
            "page" => page = value.parse().unwrap_or(page),
            "size" => size = value.parse().unwrap_or(size),
            "sort" if value.eq_ignore_ascii_case("id,desc") => direction = Direction::Desc,
            "sku" => sku = Some(value.as_str()),
            _ => {}
        }
    }

    let orders = db.read().await;
    let matching = orders
        .values()
        .filter(|order| sku.map_or(true, |sku| order.lines.iter().any(|line| line.sku == sku)));
    let ordered: Vec<&Order> = match direction {
        Direction::Asc => matching.collect(),
        Direction::Desc => matching.rev().collect(),
    };
    Json(ordered.into_iter().skip(page * size).take(size).cloned().collect())
}

async fn set_note(State(db): State<Db>, Path(id): Path<u64>, args: PackedArgs) -> Result<Json<Order>, Failure> {
    let note: Option<String> = args.arg(1)?;
    let mut orders = db.write().await;
    let order = orders.get_mut(&id).ok_or(OrderFailure::NotFound { id })?;
    order.note = note;
    Ok(Json(order.clone()))
}

async fn remove_order(State(db): State<Db>, Path(id): Path<u64>) -> Result<StatusCode, Failure> {
    let mut orders = db.write().await;
    orders.remove(&id).ok_or(OrderFailure::NotFound { id })?;
    info!(id, "order removed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindrpc_core::spec::parse_interface;
    use bindrpc_core::Verb;

    #[test]
    fn order_failure_keeps_its_fields() {
        let json = serde_json::to_value(OrderFailure::NotFound { id: 9 }).unwrap();
        assert_eq!(json, serde_json::json!({"NotFound": {"id": 9}}));
    }

    #[test]
    fn delivery_defaults_to_standard() {
        let delivery: Delivery = serde_json::from_str(r#"{"street":"1 Main St"}"#).unwrap();
        assert!(!delivery.express);
    }

    #[test]
    fn declaration_matches_routes() {
        let specs = parse_interface(&orders_api()).unwrap();
        let shape: Vec<_> = specs
            .iter()
            .map(|s| (s.method_name(), s.verb(), s.path_template()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("create", Verb::Post, "/orders/{id}"),
                ("get", Verb::Get, "/orders/{id}"),
                ("list", Verb::Get, "/orders"),
                ("set_note", Verb::Put, "/orders/{id}/note"),
                ("remove", Verb::Delete, "/orders/{id}"),
            ]
        );
        assert_eq!(specs[0].body_indices().iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }
}
