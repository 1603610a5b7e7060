//! Catalog and subscription integration tests.

mod common;

use common::{dec, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn create_package_returns_created_package() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let name = format!("Package {}", Uuid::new_v4());
    let response = app
        .post_json(
            "/packages",
            &json!({
                "name": name,
                "base_price": 4500.0,
                "billing_cycle": "monthly",
                "posts_per_month": 12,
                "stories_per_week": 3,
                "platforms_included": ["instagram", "tiktok"],
                "features": { "reports": true },
            }),
        )
        .await;

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("invalid body");
    assert_eq!(body["name"].as_str(), Some(name.as_str()));
    assert_eq!(dec(&body["base_price"]), dec(&json!("4500")));
    assert_eq!(body["billing_cycle"].as_str(), Some("monthly"));
    assert_eq!(body["is_active"].as_bool(), Some(true));
}

#[tokio::test]
async fn duplicate_package_name_is_rejected_with_conflict() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let name = format!("Package {}", Uuid::new_v4());
    let body = json!({ "name": name, "base_price": 100.0 });

    let first = app.post_json("/packages", &body).await;
    assert_eq!(first.status(), 201);

    let second = app.post_json("/packages", &body).await;
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn package_without_name_is_rejected() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post_json("/packages", &json!({ "name": "", "base_price": 100.0 }))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn missing_actor_header_is_unauthorized() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .client
        .get(app.api("/packages"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn create_addon_and_filter_by_category() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let category = format!("cat-{}", Uuid::new_v4());
    let name = format!("Addon {}", Uuid::new_v4());
    let response = app
        .post_json(
            "/addons",
            &json!({
                "name": name,
                "price": 350.0,
                "category": category,
                "requires_approval": true,
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let listed = app.get(&format!("/addons?category={}", category)).await;
    assert_eq!(listed.status(), 200);
    let body: Value = listed.json().await.expect("invalid body");
    let addons = body.as_array().expect("expected array");
    assert_eq!(addons.len(), 1);
    assert_eq!(addons[0]["name"].as_str(), Some(name.as_str()));
}

#[tokio::test]
async fn subscription_gets_next_billing_date_one_month_out() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Subscriptions Test").await;
    let package_id = app.create_package("2500").await;

    let response = app
        .post_json(
            "/subscriptions",
            &json!({
                "customer_id": customer_id,
                "service_package_id": package_id,
                "start_date": "2026-01-15",
            }),
        )
        .await;

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("invalid body");
    assert_eq!(body["start_date"].as_str(), Some("2026-01-15"));
    assert_eq!(body["next_billing_date"].as_str(), Some("2026-02-15"));
    assert_eq!(body["status"].as_str(), Some("active"));
}

#[tokio::test]
async fn subscription_against_unknown_package_is_not_found() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Unknown Package Test").await;
    let response = app
        .post_json(
            "/subscriptions",
            &json!({
                "customer_id": customer_id,
                "service_package_id": Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn subscription_list_reports_effective_price() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Effective Price Test").await;
    let package_id = app.create_package("2500").await;

    let response = app
        .post_json(
            "/subscriptions",
            &json!({
                "customer_id": customer_id,
                "service_package_id": package_id,
                "custom_monthly_price": 1999.0,
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let listed = app
        .get(&format!("/subscriptions?customer_id={}", customer_id))
        .await;
    assert_eq!(listed.status(), 200);
    let body: Value = listed.json().await.expect("invalid body");
    let subscriptions = body.as_array().expect("expected array");
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(
        dec(&subscriptions[0]["effective_price"]),
        dec(&json!("1999"))
    );
    assert_eq!(
        subscriptions[0]["customer_name"].as_str(),
        Some("Effective Price Test")
    );
}

#[tokio::test]
async fn purchase_snapshots_the_addon_price() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let customer_id = app.create_customer("Snapshot Test").await;
    let addon_id = app.create_addon("350").await;

    let response = app
        .post_json(
            "/addon-purchases",
            &json!({
                "customer_id": customer_id,
                "addon_id": addon_id,
                "quantity": 3,
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("invalid body");
    assert_eq!(dec(&body["unit_price"]), dec(&json!("350")));
    assert_eq!(dec(&body["total_price"]), dec(&json!("1050")));
    assert_eq!(body["status"].as_str(), Some("approved"));

    let unbilled = app
        .get(&format!("/addon-purchases/unbilled?customer_id={}", customer_id))
        .await;
    assert_eq!(unbilled.status(), 200);
    let body: Value = unbilled.json().await.expect("invalid body");
    assert_eq!(body.as_array().expect("expected array").len(), 1);
}
