//! Full client lifecycle against the live orders service.
//!
//! # Design
//! Starts the service on a random port, binds `orders_api()` with the stock
//! `ureq` transport, and drives every method over real HTTP. Checks that
//! packing, pageable expansion, default methods, and typed failure
//! propagation agree between the two halves.

use bindrpc_core::{
    call_args, ClientBuilder, ClientConfig, Direction, Pageable, RequestIdInterceptor, RpcError, TransportErrorKind,
    Value,
};
use bindrpc_server::{orders_api, Delivery, Order, OrderFailure, OrderLine};
use serde_json::json;

fn spawn_server() -> std::net::SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            bindrpc_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn lines(sku: &str, quantity: u32) -> Vec<OrderLine> {
    vec![OrderLine {
        sku: sku.to_string(),
        quantity,
    }]
}

fn delivery() -> Delivery {
    Delivery {
        street: "1 Main St".to_string(),
        express: false,
    }
}

#[test]
fn order_lifecycle() {
    // Step 1: start the service and bind the client.
    let addr = spawn_server();
    let config = ClientConfig::new("orders", &format!("http://{addr}"));
    let client = ClientBuilder::from_config(&config)
        .interceptor(RequestIdInterceptor)
        .register_failure::<OrderFailure>()
        .bind(&orders_api(), &config)
        .unwrap();

    // Step 2: list is empty.
    let orders: Vec<Order> = client
        .call("list", &call_args![Pageable::new(0, 10), None::<Value>].unwrap())
        .unwrap();
    assert!(orders.is_empty(), "expected empty list");

    // Step 3: create with two packed bodies.
    let created: Order = client
        .call("create", &call_args![1, lines("book", 2), delivery()].unwrap())
        .unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.lines, lines("book", 2));
    assert_eq!(created.delivery, delivery());
    client
        .invoke("create", &call_args![2, lines("pen", 5), delivery()].unwrap())
        .unwrap();

    // Step 4: creating the same id again is a typed failure.
    let err = client
        .invoke("create", &call_args![1, lines("book", 1), delivery()].unwrap())
        .unwrap_err();
    let RpcError::Propagated(failure) = err else {
        panic!("expected propagated failure, got {err:?}");
    };
    assert_eq!(failure.downcast_ref::<OrderFailure>(), Some(&OrderFailure::AlreadyExists { id: 1 }));

    // Step 5: get and the local default method.
    let fetched: Order = client.call("get", &call_args![1].unwrap()).unwrap();
    assert_eq!(fetched, created);
    let count: u32 = client.call("line_count", &call_args![2].unwrap()).unwrap();
    assert_eq!(count, 5);

    // Step 6: single-body update.
    let noted: Order = client
        .call("set_note", &call_args![1, "leave at door"].unwrap())
        .unwrap();
    assert_eq!(noted.note.as_deref(), Some("leave at door"));

    // Step 7: pageable plus query map.
    let page = Pageable::new(0, 1).sorted("id", Direction::Desc);
    let newest: Vec<Order> = client.call("list", &call_args![page, None::<Value>].unwrap()).unwrap();
    assert_eq!(newest.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);
    let books: Vec<Order> = client
        .call("list", &call_args![Pageable::new(0, 10), json!({"sku": "book"})].unwrap())
        .unwrap();
    assert_eq!(books.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);

    // Step 8: remove, then every lookup is a typed not-found failure.
    assert_eq!(client.invoke("remove", &call_args![1].unwrap()).unwrap(), Value::Null);
    let err = client.invoke("get", &call_args![1].unwrap()).unwrap_err();
    assert!(
        matches!(&err, RpcError::Propagated(f) if f.is::<OrderFailure>()),
        "expected OrderFailure, got {err:?}"
    );
    let err = client.invoke("remove", &call_args![1].unwrap()).unwrap_err();
    assert!(matches!(err, RpcError::Propagated(_)));
}

#[test]
fn unregistered_failure_kind_is_a_status_error() {
    let addr = spawn_server();
    let config = ClientConfig::new("orders", &format!("http://{addr}"));
    let client = ClientBuilder::from_config(&config).bind(&orders_api(), &config).unwrap();

    let err = client.invoke("get", &call_args![99].unwrap()).unwrap_err();
    assert!(matches!(err, RpcError::Status { status: 500, .. }), "got {err:?}");
}

#[test]
fn unreachable_target_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new("orders", &format!("http://{addr}"));
    let client = ClientBuilder::from_config(&config).bind(&orders_api(), &config).unwrap();
    let err = client.invoke("get", &call_args![1].unwrap()).unwrap_err();
    assert!(matches!(
        err.transport_kind(),
        Some(TransportErrorKind::Connect | TransportErrorKind::Io)
    ));
}
