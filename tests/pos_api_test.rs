//! POS endpoints: charge initiation, status throttling and sandbox fixtures

mod common;

use common::{bearer, get_request, json_request, TestApp};
use flouci_developers::config::Environment;
use flouci_developers::services::sandbox::{CARD_TRACKING_ID, WALLET_TRACKING_ID};
use http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const STATUS_PATH: &str = "/partners/transactions/fetch_gps_transaction_status";

#[tokio::test]
async fn test_single_pos_charge() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    Mock::given(method("POST"))
        .and(path("/api/partners/pos/transactions"))
        .and(body_partial_json(json!({
            "merchant_id": 4242,
            "service_code": "024",
            "payment_method": "card",
            "amount_in_millimes": 25000,
            "developer_tracking_id": "order-1"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "flouci_transaction_id": "7d1f0c9e-3c55-4a5e-9d52-1e4a2f7c9b10"
        })))
        .expect(1)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/init_pos_transaction",
            Some(&bearer(&application)),
            &json!({
                "id_terminal": "T-001",
                "serial_number": "SN-001",
                "amount_in_millimes": 25000,
                "developer_tracking_id": "order-1"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["status_code"], 201);
}

#[tokio::test]
async fn test_multi_segment_pos_charge() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    Mock::given(method("POST"))
        .and(path("/api/partners/pos/transactions"))
        .and(body_partial_json(json!({"parent_payment_id": "parent-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"queued": true})))
        .expect(2)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/init_pos_transaction",
            Some(&bearer(&application)),
            &json!({
                "id_terminal": "T-001",
                "serial_number": "SN-001",
                "is_multi_payment": true,
                "parent_payment_id": "parent-1",
                "payment_segments": [
                    {"amount_in_millimes": 10000, "payment_method": "card", "developer_tracking_id": "seg-1"},
                    {"amount_in_millimes": 5000, "payment_method": "wallet", "developer_tracking_id": "seg-2"}
                ]
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let segments = body.as_array().unwrap();
    assert_eq!(segments.len(), 2);
    assert!(segments.iter().all(|s| s["success"] == true));
}

#[tokio::test]
async fn test_pos_request_shape_is_validated() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    Mock::given(method("POST"))
        .and(path("/api/partners/pos/transactions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(0)
        .mount(&app.backend)
        .await;

    for body in [
        // single payment without its fields
        json!({"id_terminal": "T-001", "serial_number": "SN-001"}),
        // both shapes at once
        json!({
            "id_terminal": "T-001",
            "serial_number": "SN-001",
            "is_multi_payment": true,
            "amount_in_millimes": 25000,
            "payment_segments": [
                {"amount_in_millimes": 10000, "payment_method": "card", "developer_tracking_id": "seg-1"}
            ]
        }),
        // below the POS minimum
        json!({
            "id_terminal": "T-001",
            "serial_number": "SN-001",
            "amount_in_millimes": 500,
            "developer_tracking_id": "order-1"
        }),
        json!({
            "id_terminal": "T-001",
            "serial_number": "SN-001",
            "amount_in_millimes": 25000,
            "developer_tracking_id": "order-1",
            "payment_method": "cash"
        }),
    ] {
        let (status, response) = app
            .send(json_request(
                Method::POST,
                "/partners/transactions/init_pos_transaction",
                Some(&bearer(&application)),
                &body,
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(response["success"], false);
    }
}

#[tokio::test]
async fn test_status_fixture_and_throttle() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    Mock::given(method("GET"))
        .and(path("/api/partners/pos/transaction_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&app.backend)
        .await;

    let uri = format!("{}?developer_tracking_id={}", STATUS_PATH, WALLET_TRACKING_ID);

    let (status, body) = app
        .send(get_request(&uri, Some(&bearer(&application))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transactions"][0]["payment_method"], "wallet");

    let (status, body) = app
        .send(get_request(&uri, Some(&bearer(&application))))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_status_goes_upstream_in_production() {
    let app = TestApp::spawn_in(Environment::Prod).await;
    let application = app.application(true, false).await;
    let flouci_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/partners/pos/transaction_status"))
        .and(query_param("merchant_id", "4242"))
        .and(query_param("flouci_transaction_id", flouci_id.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"transactions": []})))
        .expect(1)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(get_request(
            &format!("{}?flouci_transaction_id={}", STATUS_PATH, flouci_id),
            Some(&bearer(&application)),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transactions"], json!([]));
}

#[tokio::test]
async fn test_status_needs_an_identifier() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    let (status, _) = app
        .send(get_request(STATUS_PATH, Some(&bearer(&application))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_fixtures_outside_production() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/cancel_pos_transaction",
            Some(&bearer(&application)),
            &json!({
                "id_terminal": "T-001",
                "serial_number": "SN-001",
                "reason": "customer changed mind",
                "developer_tracking_id": CARD_TRACKING_ID
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_cancel_refunds_upstream() {
    let app = TestApp::spawn_in(Environment::Prod).await;
    let application = app.application(true, false).await;

    Mock::given(method("POST"))
        .and(path("/api/partners/pos/refund"))
        .and(body_partial_json(json!({
            "merchant_id": 4242,
            "developer_tracking_id": WALLET_TRACKING_ID
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Refund started"})),
        )
        .expect(1)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/cancel_pos_transaction",
            Some(&bearer(&application)),
            &json!({
                "id_terminal": "T-001",
                "serial_number": "SN-001",
                "reason": "duplicate",
                "developer_tracking_id": WALLET_TRACKING_ID
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Refund started");
}
