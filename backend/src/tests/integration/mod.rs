//! End-to-end flows against a real Postgres.
//!
//! Run with `cargo test -- --ignored` and either Docker available or
//! `TEST_DATABASE_URL` pointing at a scratch database.

use axum::http::{Method, StatusCode};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use serial_test::serial;

use crate::build_router;
use crate::config::{AccountingConfig, AutoInvoicingConfig, MissingAccountPolicy};
use crate::jobs::scheduler::JobStatus;
use crate::jobs::{run_job_now, AutoInvoicingJob, ExecutionLog};
use crate::services::orders::{self, IntercompanyOrderCreated};
use crate::tests::fixtures::{seed_company, seed_company_with_id, seed_order_pair, single_line};
use crate::tests::helpers::{account_balance, count_where, entry_totals, posted_balance, send_json};
use crate::tests::{test_config, TestContext};

async fn issue(ctx: &TestContext, created: &IntercompanyOrderCreated) -> (StatusCode, Value) {
    send_json(
        build_router(ctx.state()),
        Method::POST,
        "/api/auto-invoicing/process-from-orders",
        Some(json!({
            "sourceOrderId": created.orders.sales_order.id,
            "targetOrderId": created.orders.purchase_order.id,
        })),
    )
    .await
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        other => other.to_string().parse().expect("decimal number"),
    }
}

async fn assert_ledger_balanced(ctx: &TestContext, company_id: i32) {
    for (entry_id, debit, credit, lines) in entry_totals(&ctx.db_pool, company_id).await {
        assert!(lines >= 2, "entry {} has {} lines", entry_id, lines);
        assert_eq!(debit, credit, "entry {} is unbalanced", entry_id);
    }
    for code in ["1000", "1100", "2000", "4000", "5000"] {
        assert_eq!(
            account_balance(&ctx.db_pool, company_id, code).await,
            posted_balance(&ctx.db_pool, company_id, code).await,
            "account {} drifted from its postings",
            code
        );
    }
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_issuance_posts_both_sides() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(1000.00))).await;

    let (status, body) = issue(&ctx, &created).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["journalPosted"], true);
    assert_eq!(body["invoice"]["company_id"], seller.id);
    assert_eq!(body["bill"]["company_id"], buyer.id);
    assert_eq!(body["bill"]["reference_invoice_id"], body["invoice"]["id"]);
    assert_eq!(decimal(&body["invoice"]["total"]), dec!(1000.00));

    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1100").await, dec!(1000.00));
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "4000").await, dec!(1000.00));
    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "5000").await, dec!(1000.00));
    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "2000").await, dec!(1000.00));

    let (status, view) = send_json(
        build_router(ctx.state()),
        Method::GET,
        &format!("/api/intercompany-transactions/{}", created.transaction.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["workflow_status"], "Invoiced (Pending Payment)");

    assert_ledger_balanced(&ctx, seller.id).await;
    assert_ledger_balanced(&ctx, buyer.id).await;
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_second_issuance_reports_existing_invoice() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(80.00))).await;

    let (status, first) = issue(&ctx, &created).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = issue(&ctx, &created).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(second["success"], false);
    assert_eq!(second["error"], "Invoice already exists");
    assert_eq!(second["invoiceId"], first["invoice"]["id"]);

    assert_eq!(count_where(&ctx.db_pool, "invoices", "sales_order_id", created.orders.sales_order.id).await, 1);
    assert_eq!(count_where(&ctx.db_pool, "bills", "purchase_order_id", created.orders.purchase_order.id).await, 1);
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1100").await, dec!(80.00));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_full_receipt_moves_cash_and_receivable() {
    let ctx = TestContext::new().await;
    let seller = seed_company_with_id(&ctx.db_pool, 17).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(1000.00))).await;

    let (status, issued) = issue(&ctx, &created).await;
    assert_eq!(status, StatusCode::CREATED, "{}", issued);

    let cash_before = account_balance(&ctx.db_pool, 17, "1000").await;
    let receivable_before = account_balance(&ctx.db_pool, 17, "1100").await;

    let (status, body) = send_json(
        build_router(ctx.state()),
        Method::POST,
        "/api/create-intercompany-receipt",
        Some(json!({
            "companyId": 17,
            "invoiceId": issued["invoice"]["id"],
            "amount": "1000.00",
            "paymentMethod": "Wire",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["invoice"]["status"], "Paid");
    assert_eq!(decimal(&body["invoice"]["balance_due"]), Decimal::ZERO);
    assert!(body["journalEntryId"].is_number());
    assert_eq!(body["transaction"]["source_receipt_id"], body["receipt"]["id"]);

    assert_eq!(account_balance(&ctx.db_pool, 17, "1000").await - cash_before, dec!(1000.00));
    assert_eq!(receivable_before - account_balance(&ctx.db_pool, 17, "1100").await, dec!(1000.00));
    assert_ledger_balanced(&ctx, 17).await;
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_overpayment_is_rejected_without_side_effects() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(300.00))).await;
    let (_, issued) = issue(&ctx, &created).await;
    let invoice_id = issued["invoice"]["id"].clone();

    let (status, partial) = send_json(
        build_router(ctx.state()),
        Method::POST,
        "/api/create-intercompany-receipt",
        Some(json!({ "companyId": seller.id, "invoiceId": invoice_id, "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(partial["invoice"]["status"], "Partial");

    let (status, _) = send_json(
        build_router(ctx.state()),
        Method::POST,
        "/api/create-intercompany-receipt",
        Some(json!({ "companyId": seller.id, "invoiceId": invoice_id, "amount": "200.01" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, wrong_owner) = send_json(
        build_router(ctx.state()),
        Method::POST,
        "/api/create-intercompany-receipt",
        Some(json!({ "companyId": buyer.id, "invoiceId": invoice_id, "amount": 10 })),
    )
    .await;
    assert!(status.is_client_error(), "{}", wrong_owner);

    let receipts = count_where(&ctx.db_pool, "receipts", "company_id", seller.id).await;
    assert_eq!(receipts, 1);
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1000").await, dec!(100.00));
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1100").await, dec!(200.00));
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_settle_pays_both_sides() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(450.00))).await;
    issue(&ctx, &created).await;

    let (status, body) = send_json(
        build_router(ctx.state()),
        Method::POST,
        &format!("/api/intercompany-transactions/{}/settle", created.transaction.id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["receipt"]["invoice"]["status"], "Paid");
    assert_eq!(body["data"]["payment"]["bill"]["status"], "Paid");

    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "2000").await, Decimal::ZERO);
    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "1000").await, dec!(-450.00));

    let (_, view) = send_json(
        build_router(ctx.state()),
        Method::GET,
        &format!("/api/intercompany-transactions/{}", created.transaction.id),
        None,
    )
    .await;
    assert_eq!(view["workflow_status"], "Completed");

    let (status, again) = send_json(
        build_router(ctx.state()),
        Method::POST,
        &format!("/api/intercompany-transactions/{}/settle", created.transaction.id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["error"], "Invoice is already fully paid");

    assert_ledger_balanced(&ctx, seller.id).await;
    assert_ledger_balanced(&ctx, buyer.id).await;
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_credit_note_number_and_posting() {
    let ctx = TestContext::new().await;
    let company = seed_company(&ctx.db_pool).await;

    let (status, body) = send_json(
        build_router(ctx.state()),
        Method::POST,
        "/api/credit-notes",
        Some(json!({
            "company_id": company.id,
            "amount": "1000.00",
            "reason": "Damaged goods",
            "products": [{ "product_id": 4, "quantity": 10, "unit_price": 100, "total_amount": 1000 }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let pattern = Regex::new(&format!(r"^CN-{}-\d{{13}}$", company.id)).unwrap();
    assert!(pattern.is_match(body["credit_note_number"].as_str().unwrap()));
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    assert_eq!(decimal(&body["amount"]), dec!(1000.00));
    assert_eq!(account_balance(&ctx.db_pool, company.id, "4000").await, dec!(-1000.00));
    assert_eq!(account_balance(&ctx.db_pool, company.id, "1100").await, dec!(-1000.00));
    assert_ledger_balanced(&ctx, company.id).await;
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_adjustment_creates_one_of_each_document() {
    let ctx = TestContext::new().await;
    let source = seed_company(&ctx.db_pool).await;
    let target = seed_company(&ctx.db_pool).await;

    let (status, body) = send_json(
        build_router(ctx.state()),
        Method::POST,
        "/api/intercompany-adjustment",
        Some(json!({
            "source_company_id": source.id,
            "target_company_id": target.id,
            "amount": 750,
            "reason": "Price correction"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["creditNote"]["company_id"], source.id);
    assert_eq!(body["debitNote"]["company_id"], target.id);
    assert_eq!(body["adjustment"]["credit_note_id"], body["creditNote"]["id"]);

    assert_eq!(count_where(&ctx.db_pool, "credit_notes", "company_id", source.id).await, 1);
    assert_eq!(count_where(&ctx.db_pool, "debit_notes", "company_id", target.id).await, 1);
    assert_eq!(
        count_where(&ctx.db_pool, "intercompany_adjustments", "source_company_id", source.id).await,
        1
    );
    assert_eq!(account_balance(&ctx.db_pool, source.id, "1100").await, dec!(-750.00));
    assert_eq!(account_balance(&ctx.db_pool, target.id, "5000").await, dec!(750.00));
    assert_ledger_balanced(&ctx, source.id).await;
    assert_ledger_balanced(&ctx, target.id).await;
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_reference_lookup_honours_company_filter() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(55.00))).await;
    let (_, issued) = issue(&ctx, &created).await;
    let invoice_number = issued["invoice"]["invoice_number"].as_str().unwrap().to_string();

    let (status, found) = send_json(
        build_router(ctx.state()),
        Method::GET,
        &format!(
            "/api/transactions/reference-lookup-fixed?reference={}&companyId={}",
            invoice_number, seller.id
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["invoices"].as_array().unwrap().len(), 1);

    let (_, filtered) = send_json(
        build_router(ctx.state()),
        Method::GET,
        &format!(
            "/api/transactions/reference-lookup-fixed?reference={}&companyId={}",
            invoice_number, buyer.id
        ),
        None,
    )
    .await;
    assert!(filtered["invoices"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_missing_accounts_follow_policy() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    sqlx::query("DELETE FROM accounts WHERE company_id = $1")
        .bind(buyer.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(20.00))).await;

    let (status, body) = issue(&ctx, &created).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_ACCOUNT");
    assert_eq!(count_where(&ctx.db_pool, "invoices", "sales_order_id", created.orders.sales_order.id).await, 0);

    let lenient = AccountingConfig {
        missing_account_policy: MissingAccountPolicy::Skip,
        ..AccountingConfig::default()
    };
    let (status, body) = send_json(
        build_router(ctx.state_with(lenient)),
        Method::POST,
        "/api/auto-invoicing/process-from-orders",
        Some(json!({
            "sourceOrderId": created.orders.sales_order.id,
            "targetOrderId": created.orders.purchase_order.id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["journalPosted"], false);
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1100").await, dec!(20.00));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_auto_invoicing_job_picks_up_pending_transactions() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(125.00))).await;

    let job = AutoInvoicingJob::new(
        ctx.db_pool.clone(),
        &AccountingConfig::default(),
        &AutoInvoicingConfig { enabled: true, batch_size: 500, ..AutoInvoicingConfig::default() },
    );
    let result = job.run().await.expect("job runs");
    assert!(result.documents_issued >= 1);

    let invoice_id: Option<i32> =
        sqlx::query_scalar("SELECT source_invoice_id FROM intercompany_transactions WHERE id = $1")
            .bind(created.transaction.id)
            .fetch_one(&ctx.db_pool)
            .await
            .unwrap();
    assert!(invoice_id.is_some());

    job.run().await.expect("job runs");
    assert_eq!(count_where(&ctx.db_pool, "invoices", "sales_order_id", created.orders.sales_order.id).await, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_manual_job_run_is_logged() {
    let ctx = TestContext::new().await;
    let config = test_config(AccountingConfig::default());
    let logs = ExecutionLog::new();

    run_job_now(ctx.db_pool.clone(), &config, &logs, "auto_invoicing").await.expect("job runs");
    assert!(run_job_now(ctx.db_pool.clone(), &config, &logs, "nightly_close").await.is_err());

    let logs = logs.recent().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].job_name, "Auto Invoicing");
    assert_ne!(logs[0].status, JobStatus::Failed);
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_receivables_and_payables_reports() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(640.00))).await;
    issue(&ctx, &created).await;

    let (status, ar) = send_json(
        build_router(ctx.state()),
        Method::GET,
        &format!("/api/accounts-receivable/comprehensive-fixed?companyId={}", seller.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&ar["total_outstanding"]), dec!(640.00));
    assert_eq!(decimal(&ar["aging"]["current"]), dec!(640.00));
    assert_eq!(ar["by_counterparty"][0]["counterparty_id"], buyer.id);

    let (_, ap) = send_json(
        build_router(ctx.state()),
        Method::GET,
        &format!("/api/accounts-payable/comprehensive-fixed?companyId={}", buyer.id),
        None,
    )
    .await;
    assert_eq!(decimal(&ap["total_outstanding"]), dec!(640.00));
    assert_eq!(ap["open_count"], 1);
}

async fn post(ctx: &TestContext, uri: &str, body: Value) -> (StatusCode, Value) {
    send_json(build_router(ctx.state()), Method::POST, uri, Some(body)).await
}

async fn view(ctx: &TestContext, transaction_id: i32) -> Value {
    let (status, body) = send_json(
        build_router(ctx.state()),
        Method::GET,
        &format!("/api/intercompany-transactions/{}", transaction_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_bill_payment_moves_payable_and_cash() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(400.00))).await;
    let (_, issued) = issue(&ctx, &created).await;
    let bill_id = issued["bill"]["id"].clone();

    let (status, body) = post(
        &ctx,
        "/api/create-intercompany-payment",
        json!({ "companyId": buyer.id, "billId": bill_id, "amount": "150.00", "paymentMethod": "Wire" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["bill"]["status"], "Partial");
    assert_eq!(decimal(&body["bill"]["balance_due"]), dec!(250.00));
    assert!(body["journalEntryId"].is_number());
    assert_eq!(body["transaction"]["target_payment_id"], body["payment"]["id"]);

    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "2000").await, dec!(250.00));
    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "1000").await, dec!(-150.00));

    // A bill payment alone does not move the seller side
    assert_eq!(view(&ctx, created.transaction.id).await["workflow_status"], "Invoiced (Pending Payment)");

    let (status, _) = post(
        &ctx,
        "/api/create-intercompany-payment",
        json!({ "companyId": seller.id, "billId": bill_id, "amount": "10.00" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(count_where(&ctx.db_pool, "bill_payments", "company_id", buyer.id).await, 1);
    assert_ledger_balanced(&ctx, buyer.id).await;
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_receipt_only_attaches_to_its_own_transaction() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let invoiced = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(200.00))).await;
    let other_invoiced = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(90.00))).await;
    let pending = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(60.00))).await;
    let (_, issued) = issue(&ctx, &invoiced).await;
    issue(&ctx, &other_invoiced).await;
    let invoice_id = issued["invoice"]["id"].clone();

    for foreign in [other_invoiced.transaction.id, pending.transaction.id] {
        let (status, body) = post(
            &ctx,
            "/api/create-intercompany-receipt",
            json!({ "companyId": seller.id, "invoiceId": invoice_id, "transactionId": foreign, "amount": 50 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }
    assert_eq!(count_where(&ctx.db_pool, "receipts", "company_id", seller.id).await, 0);

    let untouched = view(&ctx, pending.transaction.id).await;
    assert_eq!(untouched["workflow_status"], "Ordered (Pending Invoice)");
    assert!(untouched["source_receipt_id"].is_null());

    let (status, body) = post(
        &ctx,
        "/api/create-intercompany-receipt",
        json!({
            "companyId": seller.id,
            "invoiceId": invoice_id,
            "transactionId": invoiced.transaction.id,
            "amount": 50,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["transaction"]["id"], invoiced.transaction.id);
    assert_eq!(body["transaction"]["source_receipt_id"], body["receipt"]["id"]);
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_unlinked_transaction_adopts_invoice_from_its_order() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(120.00))).await;
    let (_, issued) = issue(&ctx, &created).await;

    sqlx::query("UPDATE intercompany_transactions SET source_invoice_id = NULL WHERE id = $1")
        .bind(created.transaction.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let (status, body) = post(
        &ctx,
        "/api/create-intercompany-receipt",
        json!({
            "companyId": seller.id,
            "invoiceId": issued["invoice"]["id"],
            "transactionId": created.transaction.id,
            "amount": "120.00",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["transaction"]["source_invoice_id"], issued["invoice"]["id"]);
    assert_eq!(view(&ctx, created.transaction.id).await["workflow_status"], "Completed");
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_partial_receipt_reports_partially_paid() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(300.00))).await;
    let (_, issued) = issue(&ctx, &created).await;

    let (status, body) = post(
        &ctx,
        "/api/create-intercompany-receipt",
        json!({ "companyId": seller.id, "invoiceId": issued["invoice"]["id"], "amount": "100.00" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let current = view(&ctx, created.transaction.id).await;
    assert_eq!(current["workflow_status"], "Partially Paid");
    assert_eq!(current["payment_status"], "Partial");
    assert_eq!(decimal(&current["invoice_balance_due"]), dec!(200.00));
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_debit_note_checks_bill_owner() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(500.00))).await;
    let (_, issued) = issue(&ctx, &created).await;
    let bill_id = issued["bill"]["id"].clone();

    let (status, body) = post(
        &ctx,
        "/api/debit-notes",
        json!({ "company_id": buyer.id, "vendor_id": seller.id, "bill_id": bill_id, "amount": "50.00", "reason": "Freight" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["bill_id"], bill_id);
    let pattern = Regex::new(&format!(r"^DN-{}-\d{{13}}$", buyer.id)).unwrap();
    assert!(pattern.is_match(body["debit_note_number"].as_str().unwrap()));
    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "2000").await, dec!(550.00));
    assert_eq!(account_balance(&ctx.db_pool, buyer.id, "5000").await, dec!(550.00));

    let (status, body) = post(
        &ctx,
        "/api/debit-notes",
        json!({ "company_id": seller.id, "bill_id": bill_id, "amount": "50.00" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bill does not belong to this company");

    let (status, _) = post(
        &ctx,
        "/api/debit-notes",
        json!({ "company_id": buyer.id, "bill_id": i32::MAX, "amount": "50.00" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(count_where(&ctx.db_pool, "debit_notes", "company_id", buyer.id).await, 1);
    assert_eq!(count_where(&ctx.db_pool, "debit_notes", "company_id", seller.id).await, 0);
    assert_ledger_balanced(&ctx, buyer.id).await;
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_process_transaction_by_id() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(75.00))).await;
    let uri = format!("/api/auto-invoicing/process-transaction/{}", created.transaction.id);

    let (status, body) = post(&ctx, &uri, json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["transactionId"], created.transaction.id);
    assert_eq!(body["invoice"]["sales_order_id"], created.orders.sales_order.id);
    assert_eq!(body["bill"]["purchase_order_id"], created.orders.purchase_order.id);

    let (status, again) = post(&ctx, &uri, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["code"], "ALREADY_INVOICED");
    assert_eq!(again["invoiceId"], body["invoice"]["id"]);

    let (status, _) = post(&ctx, &format!("/api/auto-invoicing/process-transaction/{}", i32::MAX), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_orders_between_other_companies_are_not_paired() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let outsider = seed_company(&ctx.db_pool).await;
    let today = chrono::Utc::now().date_naive();

    let mut tx = ctx.db_pool.begin().await.unwrap();
    let (sales_order, _) = orders::create_sales_order(&mut tx, seller.id, buyer.id, today, &single_line(dec!(210.00)))
        .await
        .unwrap();
    let (foreign_po, _) = orders::create_purchase_order(&mut tx, outsider.id, seller.id, today, &single_line(dec!(210.00)))
        .await
        .unwrap();
    let (short_po, _) = orders::create_purchase_order(&mut tx, buyer.id, seller.id, today, &single_line(dec!(200.00)))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    for purchase_order_id in [foreign_po.id, short_po.id] {
        let (status, body) = post(
            &ctx,
            "/api/auto-invoicing/process-from-orders",
            json!({ "sourceOrderId": sales_order.id, "targetOrderId": purchase_order_id }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }
    assert_eq!(count_where(&ctx.db_pool, "invoices", "sales_order_id", sales_order.id).await, 0);
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1100").await, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_existing_bill_with_other_total_blocks_issuance() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(340.00))).await;

    sqlx::query(
        "INSERT INTO bills (company_id, bill_number, purchase_order_id, vendor_id, bill_date, due_date, total, balance_due)
         VALUES ($1, $2, $3, $4, CURRENT_DATE, CURRENT_DATE, 300.00, 300.00)"
    )
    .bind(buyer.id)
    .bind(format!("MANUAL-{}", created.orders.purchase_order.id))
    .bind(created.orders.purchase_order.id)
    .bind(seller.id)
    .execute(&ctx.db_pool)
    .await
    .unwrap();

    let (status, body) = issue(&ctx, &created).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert!(body["error"].as_str().unwrap().contains("does not match invoice total"));
    assert_eq!(count_where(&ctx.db_pool, "invoices", "sales_order_id", created.orders.sales_order.id).await, 0);
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1100").await, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_settle_rejects_diverging_balances() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let created = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(260.00))).await;
    let (_, issued) = issue(&ctx, &created).await;

    let (status, _) = post(
        &ctx,
        "/api/create-intercompany-payment",
        json!({ "companyId": buyer.id, "billId": issued["bill"]["id"], "amount": "60.00" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post(
        &ctx,
        &format!("/api/intercompany-transactions/{}/settle", created.transaction.id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert!(body["error"].as_str().unwrap().starts_with("Invoice and bill balances differ"));
    assert_eq!(count_where(&ctx.db_pool, "receipts", "company_id", seller.id).await, 0);
    assert_eq!(account_balance(&ctx.db_pool, seller.id, "1100").await, dec!(260.00));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker or TEST_DATABASE_URL"]
async fn test_failing_transaction_does_not_block_the_batch() {
    let ctx = TestContext::new().await;
    let seller = seed_company(&ctx.db_pool).await;
    let buyer = seed_company(&ctx.db_pool).await;
    let broken = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(10.00))).await;
    let valid = seed_order_pair(&ctx.db_pool, seller.id, buyer.id, &single_line(dec!(20.00))).await;

    // Without lines the pair cannot be invoiced
    sqlx::query("DELETE FROM sales_order_items WHERE sales_order_id = $1")
        .bind(broken.orders.sales_order.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();
    // Oldest pending rows in the database, failing one first
    for (transaction, created_at) in [(&broken, "2000-01-01 00:00:00+00"), (&valid, "2000-01-01 00:00:01+00")] {
        sqlx::query("UPDATE intercompany_transactions SET created_at = $2::TIMESTAMPTZ WHERE id = $1")
            .bind(transaction.transaction.id)
            .bind(created_at)
            .execute(&ctx.db_pool)
            .await
            .unwrap();
    }

    let job = AutoInvoicingJob::new(
        ctx.db_pool.clone(),
        &AccountingConfig::default(),
        &AutoInvoicingConfig { enabled: true, batch_size: 1, ..AutoInvoicingConfig::default() },
    );

    let first = job.run().await.expect("job runs");
    assert_eq!(first.errors.len(), 1);
    assert!(first.errors[0].starts_with(&format!("transaction {}", broken.transaction.id)));

    let second = job.run().await.expect("job runs");
    assert_eq!(second.documents_issued, 1, "{:?}", second.errors);
    assert_eq!(count_where(&ctx.db_pool, "invoices", "sales_order_id", valid.orders.sales_order.id).await, 1);

    let (attempts, last_error): (i32, Option<String>) = sqlx::query_as(
        "SELECT invoice_attempts, last_invoice_error FROM intercompany_transactions WHERE id = $1"
    )
    .bind(broken.transaction.id)
    .fetch_one(&ctx.db_pool)
    .await
    .unwrap();
    assert_eq!(attempts, 1);
    assert!(last_error.is_some());
}
