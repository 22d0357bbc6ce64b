//! Client and serving side wired together without a network.
//!
//! # Design
//! The transport is a closure that plays the server: it rebuilds the
//! arguments with `ArgumentUnpacker` and answers either with a JSON body or
//! with a failure envelope written by `write_failure`. This exercises
//! packing, unpacking, and failure propagation end to end while staying
//! deterministic.

use std::sync::Arc;

use bindrpc_core::failure::write_failure;
use bindrpc_core::{
    call_args, ArgumentUnpacker, ClientBuilder, ClientConfig, FailureEnvelope, HttpResponse, InterfaceDecl,
    JsonCodec, MethodDecl, ParamDecl, RemoteFailure, RequestPlan, RpcError, TransportError, UnpackError,
    BODY_META_HEADER,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Shipping {
    street: String,
    express: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Billing {
    card: String,
}

#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[error("card {card} was declined")]
struct CardDeclined {
    card: String,
}

impl RemoteFailure for CardDeclined {
    const KIND: &'static str = "billing.card_declined";
}

fn checkout_api() -> InterfaceDecl {
    InterfaceDecl::new("Checkout").method(
        MethodDecl::post("checkout")
            .path("/carts/{cart}/checkout")
            .param(ParamDecl::path("cart"))
            .param(ParamDecl::body("shipping"))
            .param(ParamDecl::body("billing")),
    )
}

fn serve(plan: &RequestPlan) -> Result<HttpResponse, TransportError> {
    let unpacker = ArgumentUnpacker::new(
        Arc::new(JsonCodec),
        plan.header(BODY_META_HEADER),
        plan.body.clone().unwrap_or_default(),
    );
    let mut response = HttpResponse::default();

    let shipping = unpacker.required::<Shipping>(1);
    let billing = unpacker.required::<Billing>(2);
    let (shipping, billing) = match (shipping, billing) {
        (Ok(shipping), Ok(billing)) => (shipping, billing),
        (Err(e), _) | (_, Err(e)) => {
            write_failure(&mut response, &FailureEnvelope::from_failure(&e));
            return Ok(response);
        }
    };
    if billing.card.starts_with("0000") {
        let failure = CardDeclined { card: billing.card };
        write_failure(&mut response, &FailureEnvelope::from_failure(&failure));
        return Ok(response);
    }

    let body = serde_json::json!({
        "url": plan.url,
        "street": shipping.street,
        "express": shipping.express,
        "card": billing.card,
    });
    Ok(HttpResponse::new(200, serde_json::to_vec(&body).unwrap()))
}

fn client() -> bindrpc_core::BoundClient {
    ClientBuilder::new(serve)
        .register_failure::<CardDeclined>()
        .bind(&checkout_api(), &ClientConfig::new("checkout", "http://shop.test"))
        .unwrap()
}

#[test]
fn packed_arguments_reach_the_server_intact() {
    let shipping = Shipping {
        street: "1 Main St".to_string(),
        express: true,
    };
    let billing = Billing {
        card: "4111".to_string(),
    };
    let args = call_args![7, shipping, billing].unwrap();
    let echoed = client().invoke("checkout", &args).unwrap();
    assert_eq!(echoed["url"], "http://shop.test/carts/7/checkout");
    assert_eq!(echoed["street"], "1 Main St");
    assert_eq!(echoed["express"], true);
    assert_eq!(echoed["card"], "4111");
}

#[test]
fn typed_failure_crosses_the_boundary() {
    let args = call_args![
        7,
        Shipping {
            street: "1 Main St".to_string(),
            express: false
        },
        Billing {
            card: "0000-1".to_string()
        }
    ]
    .unwrap();
    let err = client().invoke("checkout", &args).unwrap_err();
    let RpcError::Propagated(failure) = err else {
        panic!("expected propagated failure, got {err:?}");
    };
    assert_eq!(failure.kind(), CardDeclined::KIND);
    assert_eq!(failure.message(), "card 0000-1 was declined");
    assert_eq!(
        failure.downcast_ref::<CardDeclined>(),
        Some(&CardDeclined {
            card: "0000-1".to_string()
        })
    );
}

#[test]
fn missing_packed_argument_is_reported_by_the_server() {
    let args = call_args![
        7,
        Shipping {
            street: "1 Main St".to_string(),
            express: false
        },
        None::<Billing>
    ]
    .unwrap();
    let err = client().invoke("checkout", &args).unwrap_err();
    let RpcError::Propagated(failure) = err else {
        panic!("expected propagated failure, got {err:?}");
    };
    assert_eq!(failure.downcast_ref::<UnpackError>(), Some(&UnpackError::Missing { index: 2 }));
}

#[test]
fn arity_mismatch_never_reaches_the_transport() {
    let err = client().invoke("checkout", &call_args![7].unwrap()).unwrap_err();
    assert!(matches!(err, RpcError::Argument(_)));
}
