//! Request handling that never reaches the database

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use tally_shared::{DocumentStatus, WorkflowStatus};

use crate::build_router;
use crate::services::tracker::derive_workflow_status;
use crate::services::settlement::apply_payment;
use crate::tests::helpers::send_json;
use crate::tests::offline_state;

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(offline_state());
    let (status, body) = send_json(app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_receipt_requires_company_id() {
    let app = build_router(offline_state());
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/create-intercompany-receipt",
        Some(json!({ "invoiceId": 5, "amount": "100.00" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "companyId is required");
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_receipt_rejects_zero_amount() {
    let app = build_router(offline_state());
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/create-intercompany-receipt",
        Some(json!({ "companyId": 17, "invoiceId": 5, "amount": 0 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "amount must be greater than zero");
}

#[tokio::test]
async fn test_payment_rejects_unknown_method() {
    let app = build_router(offline_state());
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/create-intercompany-payment",
        Some(json!({ "companyId": 3, "billId": 9, "amount": 10, "paymentMethod": "barter" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("paymentMethod must be one of"));
}

#[tokio::test]
async fn test_order_list_requires_company_id() {
    let app = build_router(offline_state());
    let (status, body) = send_json(app, Method::GET, "/api/sales-orders", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "companyId is required");
}

#[tokio::test]
async fn test_reference_lookup_requires_reference() {
    let app = build_router(offline_state());
    let (status, body) = send_json(
        app,
        Method::GET,
        "/api/transactions/reference-lookup-fixed?reference=%20&companyId=4",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "reference is required");
}

#[tokio::test]
async fn test_process_from_orders_requires_both_orders() {
    let app = build_router(offline_state());
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/auto-invoicing/process-from-orders",
        Some(json!({ "sourceOrderId": 12 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "targetOrderId is required");
}

#[tokio::test]
async fn test_credit_note_rejects_inconsistent_line() {
    let app = build_router(offline_state());
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/credit-notes",
        Some(json!({
            "company_id": 17,
            "amount": 500,
            "products": [
                { "product_id": 1, "quantity": 2, "unit_price": 100, "total_amount": 200 },
                { "product_id": 2, "quantity": 3, "unit_price": 100, "total_amount": 250 }
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].get("products[1].total_amount").is_some());
    assert!(body["details"].get("products[0].total_amount").is_none());
}

#[tokio::test]
async fn test_adjustment_requires_both_companies() {
    let app = build_router(offline_state());
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/intercompany-adjustment",
        Some(json!({ "source_company_id": 3, "amount": 750 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "target_company_id is required");
}

#[test]
fn test_installments_walk_status_forward() {
    let total = dec!(1000.00);
    let mut paid = Decimal::ZERO;
    let mut status = DocumentStatus::Open;

    for (amount, expected) in [
        (dec!(250.00), DocumentStatus::Partial),
        (dec!(500.00), DocumentStatus::Partial),
        (dec!(250.00), DocumentStatus::Paid),
    ] {
        let applied = assert_ok!(apply_payment(total, paid, status, amount));
        assert_eq!(applied.status, expected);
        assert_eq!(applied.amount_paid + applied.balance_due, total);
        paid = applied.amount_paid;
        status = applied.status;
    }

    assert_err!(apply_payment(total, paid, status, dec!(0.01)));
}

#[test]
fn test_overpayment_leaves_amounts_untouched() {
    let err = apply_payment(dec!(100.00), dec!(60.00), DocumentStatus::Partial, dec!(40.01)).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_workflow_labels_follow_document_links() {
    assert_eq!(derive_workflow_status(false, false, None), WorkflowStatus::Ordered);
    assert_eq!(derive_workflow_status(true, false, Some(false)), WorkflowStatus::Invoiced);
    assert_eq!(derive_workflow_status(true, true, Some(false)), WorkflowStatus::PartiallyPaid);
    assert_eq!(derive_workflow_status(true, true, Some(true)), WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_job_log_starts_empty() {
    let app = build_router(offline_state());
    let (status, body) = send_json(app, Method::GET, "/api/jobs/executions", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_unknown_job_is_rejected() {
    let state = offline_state();
    let (status, body) = send_json(build_router(state.clone()), Method::POST, "/api/jobs/nightly_close/run", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown job: nightly_close");
    assert!(state.job_logs.recent().await.is_empty());
}
