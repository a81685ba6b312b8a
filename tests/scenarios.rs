//! End-to-end scenarios driving `Orchestrator::run_for_shop` against a real
//! Postgres schema and a canned `FakeTransport`, per SPEC_FULL.md §8.
//!
//! Every test is `#[ignore]`-gated: it needs `TEST_DATABASE_URL` pointed at a
//! disposable Postgres instance. Run with `cargo test -- --ignored`.

mod common;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use shopee_order_sync::api_client::transport::fake::FakeTransport;
use shopee_order_sync::api_client::transport::Transport;
use shopee_order_sync::api_client::{ShopeeClient, PRODUCTION_BASE_URL, SANDBOX_BASE_URL};
use shopee_order_sync::db::Database;
use shopee_order_sync::orchestrator::Orchestrator;
use shopee_order_sync::token_manager::TokenManager;

fn client_with(transport: Arc<FakeTransport>) -> ShopeeClient {
    ShopeeClient::new(transport as Arc<dyn Transport>, "http://fake.local", 1, "partner-secret")
}

fn orchestrator_with(pool: sqlx::PgPool, client: ShopeeClient, max_retry_count: u32, order_batch_size: usize) -> Orchestrator {
    orchestrator_with_sandbox(pool, client, false, max_retry_count, order_batch_size)
}

fn orchestrator_with_sandbox(
    pool: sqlx::PgPool,
    client: ShopeeClient,
    process_sandbox: bool,
    max_retry_count: u32,
    order_batch_size: usize,
) -> Orchestrator {
    Orchestrator::new(Database::from_pool(pool), client, process_sandbox, Arc::new(TokenManager::new()), max_retry_count, order_batch_size)
}

fn order_list_envelope(order_sn: &str) -> serde_json::Value {
    json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{"order_sn": order_sn}], "more": false, "next_cursor": "" }
    })
}

fn empty_order_list_envelope() -> serde_json::Value {
    json!({
        "error": "",
        "message": "",
        "response": { "order_list": [], "more": false, "next_cursor": "" }
    })
}

#[tokio::test]
#[ignore]
async fn s1_empty_order_list_writes_nothing() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;

    let transport = Arc::new(FakeTransport::new().with_response("/api/v2/order/get_order_list", empty_order_list_envelope()));
    let client = client_with(transport);
    let orchestrator = orchestrator_with(pool.clone(), client, 2, 50);

    let stats = orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");
    assert_eq!(stats.total, 0);
    assert_eq!(stats.success, 0);
    assert_eq!(stats.failed, 0);

    let count: i64 = sqlx::query(r#"SELECT count(*) AS c FROM "order" WHERE marketplace_shop_id = $1"#)
        .bind(seeded.marketplace_shop_id)
        .fetch_one(&pool)
        .await
        .expect("count query")
        .get("c");
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore]
async fn s2_single_fresh_order_with_no_shipping() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;
    let order_sn = format!("sn-{}-s2", seeded.marketplace_shop_id);

    let detail = json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{
            "order_sn": order_sn.clone(),
            "order_status": "READY_TO_SHIP",
            "region": "SG",
            "currency": "SGD",
            "item_list": [{
                "item_id": 111,
                "model_sku": "SKU1",
                "item_name": "T-Shirt",
                "model_quantity_purchased": 2,
                "model_discounted_price": "9.99"
            }]
        }] }
    });

    let transport = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail),
    );
    let client = client_with(transport);
    let orchestrator = orchestrator_with(pool.clone(), client, 2, 50);

    let stats = orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);

    let row = sqlx::query(r#"SELECT id, action_status FROM "order" WHERE order_num = $1"#)
        .bind(&order_sn)
        .fetch_one(&pool)
        .await
        .expect("order row");
    let order_id: Uuid = row.get("id");
    let action_status: String = row.get("action_status");
    assert_eq!(action_status, "READY_TO_PRINT");

    let logistic = sqlx::query("SELECT carrier_name, tracking_number FROM logistic WHERE toms_order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .expect("logistic row exists");
    let carrier: Option<String> = logistic.get("carrier_name");
    let tracking: Option<String> = logistic.get("tracking_number");
    assert!(carrier.is_none());
    assert!(tracking.is_none());

    let item = sqlx::query("SELECT sku, item_name, quantity FROM order_item WHERE toms_order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .expect("single item row");
    let sku: String = item.get("sku");
    let quantity: i32 = item.get("quantity");
    assert_eq!(sku, "SKU1");
    assert_eq!(quantity, 2);
}

#[tokio::test]
#[ignore]
async fn s3_reingest_wholesale_replaces_items() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;
    let order_sn = format!("sn-{}-s3", seeded.marketplace_shop_id);

    let detail_with_item = |item_id: i64, sku: &str| {
        json!({
            "error": "",
            "message": "",
            "response": { "order_list": [{
                "order_sn": order_sn.clone(),
                "order_status": "READY_TO_SHIP",
                "item_list": [{"item_id": item_id, "model_sku": sku, "model_quantity_purchased": 1}]
            }] }
        })
    };

    let transport_a = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail_with_item(1, "SKU-A")),
    );
    let client_a = client_with(transport_a);
    let orchestrator_a = orchestrator_with(pool.clone(), client_a, 2, 50);
    orchestrator_a.run_for_shop(seeded.shop_key).await.expect("first run should succeed");

    let first_order_id: Uuid = sqlx::query(r#"SELECT id FROM "order" WHERE order_num = $1"#)
        .bind(&order_sn)
        .fetch_one(&pool)
        .await
        .expect("order exists")
        .get("id");

    let transport_b = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail_with_item(2, "SKU-B")),
    );
    let client_b = client_with(transport_b);
    let orchestrator_b = orchestrator_with(pool.clone(), client_b, 2, 50);
    orchestrator_b.run_for_shop(seeded.shop_key).await.expect("second run should succeed");

    let second_order_id: Uuid = sqlx::query(r#"SELECT id FROM "order" WHERE order_num = $1"#)
        .bind(&order_sn)
        .fetch_one(&pool)
        .await
        .expect("order still exists")
        .get("id");
    assert_eq!(first_order_id, second_order_id, "re-ingest must resolve to the same order id");

    let items: Vec<String> = sqlx::query("SELECT sku FROM order_item WHERE toms_order_id = $1")
        .bind(second_order_id)
        .fetch_all(&pool)
        .await
        .expect("items query")
        .into_iter()
        .map(|r| r.get::<String, _>("sku"))
        .collect();
    assert_eq!(items, vec!["SKU-B".to_string()], "items must be wholesale-replaced, not merged");
}

#[tokio::test]
#[ignore]
async fn s4_tracking_arrives_transitions_order_to_shipped() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;
    let order_sn = format!("sn-{}-s4", seeded.marketplace_shop_id);

    let detail = json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{
            "order_sn": order_sn.clone(),
            "order_status": "PROCESSED",
            "item_list": [{"item_id": 1, "model_sku": "SKU1", "model_quantity_purchased": 1}]
        }] }
    });
    let tracking_number_resp = json!({
        "error": "",
        "message": "",
        "response": { "tracking_number": "TRACK-S4" }
    });
    let tracking_info_resp = json!({
        "error": "",
        "message": "",
        "response": { "shipping_provider_name": "DHL" }
    });

    let transport = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail)
            .with_response("/api/v2/logistics/get_tracking_number", tracking_number_resp)
            .with_response("/api/v2/logistics/get_tracking_info", tracking_info_resp),
    );
    let client = client_with(transport);
    let orchestrator = orchestrator_with(pool.clone(), client, 2, 50);
    orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");

    let row = sqlx::query(r#"SELECT id, status FROM "order" WHERE order_num = $1"#)
        .bind(&order_sn)
        .fetch_one(&pool)
        .await
        .expect("order row");
    let order_id: Uuid = row.get("id");
    let status: String = row.get("status");
    assert_eq!(status, "SHIPPED");

    let logistic = sqlx::query("SELECT tracking_number, carrier_name FROM logistic WHERE toms_order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .expect("logistic row");
    let tracking: Option<String> = logistic.get("tracking_number");
    let carrier: Option<String> = logistic.get("carrier_name");
    assert_eq!(tracking.as_deref(), Some("TRACK-S4"));
    assert_eq!(carrier.as_deref(), Some("DHL"));

    let item_tracking: Option<String> = sqlx::query("SELECT tracking_number FROM order_item WHERE toms_order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .expect("item row")
        .get("tracking_number");
    assert_eq!(item_tracking.as_deref(), Some("TRACK-S4"));
}

#[tokio::test]
#[ignore]
async fn s5_carrier_preserved_and_unchanged_tracking_is_a_no_op() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;
    let order_sn = format!("sn-{}-s5", seeded.marketplace_shop_id);

    let detail_with_carrier = json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{
            "order_sn": order_sn.clone(),
            "order_status": "PROCESSED",
            "shipping_carrier": "OriginalCarrier",
            "item_list": [{"item_id": 1, "model_sku": "SKU1", "model_quantity_purchased": 1}]
        }] }
    });
    let tracking_number_resp = json!({ "error": "", "message": "", "response": { "tracking_number": "TRACK-S5" } });
    let tracking_info_resp = json!({ "error": "", "message": "", "response": { "shipping_provider_name": "OriginalCarrier" } });

    let transport_a = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail_with_carrier)
            .with_response("/api/v2/logistics/get_tracking_number", tracking_number_resp.clone())
            .with_response("/api/v2/logistics/get_tracking_info", tracking_info_resp),
    );
    let client_a = client_with(transport_a);
    let orchestrator_a = orchestrator_with(pool.clone(), client_a, 2, 50);
    orchestrator_a.run_for_shop(seeded.shop_key).await.expect("first run should succeed");

    // Second ingest: the marketplace now reports a null carrier, and the
    // tracking number is unchanged from what is already on file.
    let detail_without_carrier = json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{
            "order_sn": order_sn.clone(),
            "order_status": "PROCESSED",
            "item_list": [{"item_id": 1, "model_sku": "SKU1", "model_quantity_purchased": 1}]
        }] }
    });
    let transport_b = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail_without_carrier)
            .with_response("/api/v2/logistics/get_tracking_number", tracking_number_resp),
    );
    let client_b = client_with(transport_b.clone());
    let orchestrator_b = orchestrator_with(pool.clone(), client_b, 2, 50);
    orchestrator_b.run_for_shop(seeded.shop_key).await.expect("second run should succeed");

    let order_id: Uuid = sqlx::query(r#"SELECT id FROM "order" WHERE order_num = $1"#)
        .bind(&order_sn)
        .fetch_one(&pool)
        .await
        .expect("order row")
        .get("id");
    let logistic = sqlx::query("SELECT carrier_name, tracking_number FROM logistic WHERE toms_order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .expect("logistic row");
    let carrier: Option<String> = logistic.get("carrier_name");
    let tracking: Option<String> = logistic.get("tracking_number");
    assert_eq!(carrier.as_deref(), Some("OriginalCarrier"), "carrier must survive a null incoming value");
    assert_eq!(tracking.as_deref(), Some("TRACK-S5"));

    let seen = transport_b.seen.lock().await;
    assert!(
        !seen.iter().any(|r| r.url.contains("get_tracking_info")),
        "an unchanged tracking number must not trigger a detailed tracking-info lookup"
    );
}

#[tokio::test]
#[ignore]
async fn s6_expired_token_is_refreshed_before_order_calls() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop_with_expiry(&pool, Utc::now() - chrono::Duration::hours(1)).await;

    let refresh_resp = json!({
        "error": "",
        "message": "",
        "response": { "access_token": "new-access-token", "refresh_token": "new-refresh-token", "expire_in": 3600 }
    });

    let transport = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/auth/access_token/get", refresh_resp)
            .with_response("/api/v2/order/get_order_list", empty_order_list_envelope()),
    );
    let client = client_with(transport.clone());
    let orchestrator = orchestrator_with(pool.clone(), client, 2, 50);
    orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");

    let seen = transport.seen.lock().await;
    assert!(seen.iter().any(|r| r.url.contains("access_token/get")), "an expired token must be refreshed");

    let access_token: Option<String> = sqlx::query("SELECT access_token FROM shop WHERE shop_key = $1")
        .bind(seeded.shop_key)
        .fetch_one(&pool)
        .await
        .expect("shop row")
        .get("access_token");
    assert_eq!(access_token.as_deref(), Some("new-access-token"));
}

#[tokio::test]
#[ignore]
async fn s7_marketplace_error_envelope_aborts_without_writes() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;

    let error_envelope = json!({ "error": "error_param", "message": "invalid time range", "response": null });
    let transport = Arc::new(FakeTransport::new().with_response("/api/v2/order/get_order_list", error_envelope));
    let client = client_with(transport);
    let orchestrator = orchestrator_with(pool.clone(), client, 0, 50);

    let result = orchestrator.run_for_shop(seeded.shop_key).await;
    assert!(result.is_err(), "a marketplace error envelope must surface as an error");

    let count: i64 = sqlx::query(r#"SELECT count(*) AS c FROM "order" WHERE marketplace_shop_id = $1"#)
        .bind(seeded.marketplace_shop_id)
        .fetch_one(&pool)
        .await
        .expect("count query")
        .get("c");
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore]
async fn s8_company_sandbox_flag_overrides_process_flag() {
    let pool = common::connect_test_db().await;
    // Company opts explicitly out of sandbox; the process itself runs with
    // the sandbox flag on. The company's column must win.
    let seeded = common::seed_shop_with_company_sandbox(&pool, Utc::now() + chrono::Duration::hours(1), Some(false)).await;

    let transport = Arc::new(FakeTransport::new().with_response("/api/v2/order/get_order_list", empty_order_list_envelope()));
    let client = client_with(transport.clone());
    let orchestrator = orchestrator_with_sandbox(pool.clone(), client, true, 2, 50);
    orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");

    let seen = transport.seen.lock().await;
    assert!(
        seen.iter().all(|r| r.url.starts_with(PRODUCTION_BASE_URL)),
        "company.issandbox = Some(false) must win over a sandboxed process flag"
    );
}

#[tokio::test]
#[ignore]
async fn s9_company_with_no_opinion_falls_back_to_process_flag() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop_with_company_sandbox(&pool, Utc::now() + chrono::Duration::hours(1), None).await;

    let transport = Arc::new(FakeTransport::new().with_response("/api/v2/order/get_order_list", empty_order_list_envelope()));
    let client = client_with(transport.clone());
    let orchestrator = orchestrator_with_sandbox(pool.clone(), client, true, 2, 50);
    orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");

    let seen = transport.seen.lock().await;
    assert!(
        seen.iter().all(|r| r.url.starts_with(SANDBOX_BASE_URL)),
        "a company with no sandbox opinion must fall back to the process-wide flag"
    );
}

#[tokio::test]
#[ignore]
async fn s10_tracking_checkpoint_populates_logistic_history() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;
    let order_sn = format!("sn-{}-s10", seeded.marketplace_shop_id);

    let detail = json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{
            "order_sn": order_sn.clone(),
            "order_status": "PROCESSED",
            "item_list": [{"item_id": 1, "model_sku": "SKU1", "model_quantity_purchased": 1}]
        }] }
    });
    let tracking_number_resp = json!({ "error": "", "message": "", "response": { "tracking_number": "TRACK-S10" } });
    let tracking_info_resp = json!({
        "error": "",
        "message": "",
        "response": {
            "shipping_provider_name": "DHL",
            "logistics_status": "LOGISTICS_PICKUP_DONE",
            "description": "Picked up by courier",
            "update_time": 1_700_000_000
        }
    });

    let transport = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail)
            .with_response("/api/v2/logistics/get_tracking_number", tracking_number_resp)
            .with_response("/api/v2/logistics/get_tracking_info", tracking_info_resp),
    );
    let client = client_with(transport);
    let orchestrator = orchestrator_with(pool.clone(), client, 2, 50);
    orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");

    let logistic_id: Uuid = sqlx::query(
        r#"SELECT l.id FROM logistic l JOIN "order" o ON o.id = l.toms_order_id WHERE o.order_num = $1"#,
    )
    .bind(&order_sn)
    .fetch_one(&pool)
    .await
    .expect("logistic row")
    .get("id");

    let history = sqlx::query("SELECT tracking_number, status, description FROM logistic_history WHERE toms_logistic_id = $1")
        .bind(logistic_id)
        .fetch_one(&pool)
        .await
        .expect("a logistic_history row must exist after a tracking checkpoint is observed");
    let tracking_number: String = history.get("tracking_number");
    let status: String = history.get("status");
    let description: Option<String> = history.get("description");
    assert_eq!(tracking_number, "TRACK-S10");
    assert_eq!(status, "LOGISTICS_PICKUP_DONE");
    assert_eq!(description.as_deref(), Some("Picked up by courier"));
}

#[tokio::test]
#[ignore]
async fn s11_item_fields_carried_through_to_order_item() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;
    let order_sn = format!("sn-{}-s11", seeded.marketplace_shop_id);

    let detail = json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{
            "order_sn": order_sn.clone(),
            "order_status": "READY_TO_SHIP",
            "item_list": [{
                "item_id": 222,
                "model_sku": "SKU2",
                "promo_sku": "PROMO-SKU2",
                "item_name": "Shoes",
                "model_name": "Size 42 / Black",
                "model_quantity_purchased": 1,
                "model_discounted_price": "19.99",
                "model_original_price": "29.99",
                "weight": "1.250",
                "image_info": { "image_url": "https://cdn.example/shoes.jpg" }
            }]
        }] }
    });

    let transport = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail),
    );
    let client = client_with(transport);
    let orchestrator = orchestrator_with(pool.clone(), client, 2, 50);
    orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");

    let row = sqlx::query(
        "SELECT promo_sku, option_name, original_price, weight, image_url FROM order_item oi \
         JOIN \"order\" o ON o.id = oi.toms_order_id WHERE o.order_num = $1",
    )
    .bind(&order_sn)
    .fetch_one(&pool)
    .await
    .expect("item row");
    let promo_sku: Option<String> = row.get("promo_sku");
    let option_name: Option<String> = row.get("option_name");
    let original_price: Option<rust_decimal::Decimal> = row.get("original_price");
    let weight: rust_decimal::Decimal = row.get("weight");
    let image_url: Option<String> = row.get("image_url");
    assert_eq!(promo_sku.as_deref(), Some("PROMO-SKU2"));
    assert_eq!(option_name.as_deref(), Some("Size 42 / Black"));
    assert_eq!(original_price, Some("29.99".parse().unwrap()));
    assert_eq!(weight, "1.250".parse().unwrap());
    assert_eq!(image_url.as_deref(), Some("https://cdn.example/shoes.jpg"));
}

#[tokio::test]
#[ignore]
async fn s12_item_without_weight_defaults_to_zero() {
    let pool = common::connect_test_db().await;
    let seeded = common::seed_shop(&pool).await;
    let order_sn = format!("sn-{}-s12", seeded.marketplace_shop_id);

    let detail = json!({
        "error": "",
        "message": "",
        "response": { "order_list": [{
            "order_sn": order_sn.clone(),
            "order_status": "READY_TO_SHIP",
            "item_list": [{"item_id": 333, "model_sku": "SKU3", "model_quantity_purchased": 1}]
        }] }
    });

    let transport = Arc::new(
        FakeTransport::new()
            .with_response("/api/v2/order/get_order_list", order_list_envelope(&order_sn))
            .with_response("/api/v2/order/get_order_detail", detail),
    );
    let client = client_with(transport);
    let orchestrator = orchestrator_with(pool.clone(), client, 2, 50);
    orchestrator.run_for_shop(seeded.shop_key).await.expect("run should succeed");

    let weight: rust_decimal::Decimal = sqlx::query(
        "SELECT weight FROM order_item oi JOIN \"order\" o ON o.id = oi.toms_order_id WHERE o.order_num = $1",
    )
    .bind(&order_sn)
    .fetch_one(&pool)
    .await
    .expect("item row")
    .get("weight");
    assert_eq!(weight, rust_decimal::Decimal::ZERO);
}
