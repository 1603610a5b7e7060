//! Invoice generation integration tests.

mod common;

use common::{dec, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
async fn subscription_invoice_computes_iva_totals() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Generation Test").await;
    let package_id = app.create_package("1000").await;
    let subscription_id = app.create_subscription(customer_id, package_id).await;

    let body = app
        .generate_invoice(&json!({
            "customer_id": customer_id,
            "subscription_id": subscription_id,
            "include_unbilled_addons": false,
        }))
        .await;

    assert_eq!(dec(&body["subtotal"]), dec(&json!("1000")));
    assert_eq!(dec(&body["iva"]), dec(&json!("160.00")));
    assert_eq!(dec(&body["total"]), dec(&json!("1160.00")));

    let invoice_id = body["invoice_id"].as_str().expect("missing invoice_id");
    let detail = app.get(&format!("/invoices/{}", invoice_id)).await;
    assert_eq!(detail.status(), 200);
    let detail: Value = detail.json().await.expect("invalid body");

    let items = detail["items"].as_array().expect("expected items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["item_type"].as_str(), Some("subscription"));
    assert_eq!(dec(&items[0]["quantity"]), Decimal::ONE);
    assert_eq!(detail["status"].as_str(), Some("draft"));
    assert_eq!(dec(&detail["amount_due"]), dec(&json!("1160.00")));
}

#[tokio::test]
async fn billed_addons_are_not_billed_twice() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Addon Exclusion Test").await;
    let addon_id = app.create_addon("200").await;
    app.create_purchase(customer_id, addon_id, 2).await;

    let first = app
        .generate_invoice(&json!({ "customer_id": customer_id }))
        .await;
    assert_eq!(dec(&first["subtotal"]), dec(&json!("400")));

    // The purchase was billed on the first invoice; the second sees nothing.
    let second = app
        .generate_invoice(&json!({ "customer_id": customer_id }))
        .await;
    assert_eq!(dec(&second["subtotal"]), Decimal::ZERO);
    assert_eq!(dec(&second["total"]), Decimal::ZERO);

    let unbilled = app
        .get(&format!("/addon-purchases/unbilled?customer_id={}", customer_id))
        .await;
    let body: Value = unbilled.json().await.expect("invalid body");
    assert!(body.as_array().expect("expected array").is_empty());
}

#[tokio::test]
async fn lines_are_assembled_in_fixed_order() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Line Order Test").await;
    let package_id = app.create_package("1000").await;
    let subscription_id = app.create_subscription(customer_id, package_id).await;
    let addon_id = app.create_addon("150").await;
    app.create_purchase(customer_id, addon_id, 1).await;

    let body = app
        .generate_invoice(&json!({
            "customer_id": customer_id,
            "subscription_id": subscription_id,
            "billing_period_start": "2026-08-01",
            "billing_period_end": "2026-08-31",
            "custom_items": [
                { "description": "Rush fee", "unit_price": 500.0 },
            ],
        }))
        .await;

    // 1000 + 150 + 500 = 1650; IVA 264; total 1914.
    assert_eq!(dec(&body["subtotal"]), dec(&json!("1650")));
    assert_eq!(dec(&body["iva"]), dec(&json!("264.00")));
    assert_eq!(dec(&body["total"]), dec(&json!("1914.00")));

    let invoice_id = body["invoice_id"].as_str().expect("missing invoice_id");
    let detail: Value = app
        .get(&format!("/invoices/{}", invoice_id))
        .await
        .json()
        .await
        .expect("invalid body");

    let items = detail["items"].as_array().expect("expected items");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["item_type"].as_str(), Some("subscription"));
    assert_eq!(items[1]["item_type"].as_str(), Some("addon"));
    assert_eq!(items[2]["item_type"].as_str(), Some("custom"));
    for (order, item) in items.iter().enumerate() {
        assert_eq!(item["display_order"].as_i64(), Some(order as i64));
    }

    // Custom items default to quantity 1.
    assert_eq!(dec(&items[2]["quantity"]), Decimal::ONE);
    // The subscription line carries the billing period in its description.
    assert!(items[0]["description"]
        .as_str()
        .expect("missing description")
        .ends_with("2026-08-01"));
}

#[tokio::test]
async fn unknown_subscription_is_skipped_with_no_subscription_line() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Skipped Subscription Test").await;
    let body = app
        .generate_invoice(&json!({
            "customer_id": customer_id,
            "subscription_id": Uuid::new_v4(),
            "include_unbilled_addons": false,
        }))
        .await;

    assert_eq!(dec(&body["subtotal"]), Decimal::ZERO);
    assert_eq!(dec(&body["total"]), Decimal::ZERO);
}

#[tokio::test]
async fn generation_posts_three_balanced_journal_rows() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Journal Test").await;
    let package_id = app.create_package("1000").await;
    let subscription_id = app.create_subscription(customer_id, package_id).await;

    let body = app
        .generate_invoice(&json!({
            "customer_id": customer_id,
            "subscription_id": subscription_id,
            "include_unbilled_addons": false,
        }))
        .await;
    let invoice_id =
        Uuid::parse_str(body["invoice_id"].as_str().expect("missing invoice_id")).expect("bad id");

    let rows = app.journal_rows("invoice_generated", invoice_id).await;
    assert_eq!(rows.len(), 3);

    let debits: Decimal = rows.iter().map(|r| r.1).sum();
    let credits: Decimal = rows.iter().map(|r| r.2).sum();
    assert_eq!(debits, credits);
    assert_eq!(debits, dec(&json!("1160.00")));

    // Receivable debit against the customer's zero-padded sub-account.
    let receivable = format!("1103-{:04}", customer_id);
    assert!(rows.iter().any(|r| r.0 == receivable && r.1 > Decimal::ZERO));
    assert!(rows.iter().any(|r| r.0 == "4100" && r.2 == dec(&json!("1000"))));
    assert!(rows.iter().any(|r| r.0 == "2104" && r.2 == dec(&json!("160.00"))));
}

#[tokio::test]
#[serial]
async fn invoice_numbers_increase_within_a_year() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Numbering Test").await;

    let first = app
        .generate_invoice(&json!({ "customer_id": customer_id, "include_unbilled_addons": false }))
        .await;
    let second = app
        .generate_invoice(&json!({ "customer_id": customer_id, "include_unbilled_addons": false }))
        .await;

    let parse_number = |v: &Value| -> (String, i64) {
        let number = v["invoice_number"].as_str().expect("missing number");
        let mut parts = number.splitn(3, '-');
        let prefix = parts.next().expect("missing prefix").to_string();
        let year = parts.next().expect("missing year").to_string();
        let seq = parts
            .next()
            .expect("missing sequence")
            .parse::<i64>()
            .expect("bad sequence");
        (format!("{}-{}", prefix, year), seq)
    };

    let (first_scope, first_seq) = parse_number(&first);
    let (second_scope, second_seq) = parse_number(&second);

    assert!(first_scope.starts_with("INV-"));
    assert_eq!(first_scope, second_scope);
    assert!(second_seq > first_seq);
}
