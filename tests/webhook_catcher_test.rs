//! Upstream send-money callbacks and developer webhook delivery

mod common;

use axum::body::Body;
use chrono::Utc;
use common::{json_request, TestApp, SIGNATURE_SECRET};
use flouci_developers::auth::signature::{generate_request_signature, SIGNATURE_HEADER};
use flouci_developers::models::{
    OperationPayload, OperationStatus, OperationType, PartnerTransaction,
};
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATCHER_PATH: &str = "/partners/internal/send_money_catcher";

async fn pending_operation(app: &TestApp, webhook: Option<String>) -> Uuid {
    let now = Utc::now();
    let operation_id = Uuid::new_v4();
    app.store
        .insert_transaction(PartnerTransaction {
            operation_id,
            operation_type: OperationType::Payment,
            sender_id: Some(Uuid::new_v4()),
            receiver_id: None,
            amount_in_millimes: 5000,
            operation_payload: OperationPayload {
                merchant_id: 4242,
                product: Some("005".to_string()),
                webhook,
                webhook_sent: None,
            }
            .to_value(),
            operation_status: OperationStatus::DataApiPending,
            blockchain_ref: None,
            time_created: now,
            time_modified: now,
        })
        .await;
    operation_id
}

fn signed_callback(id: &str, result: Value) -> Request<Body> {
    let signature = generate_request_signature(SIGNATURE_SECRET, "POST", CATCHER_PATH, id);
    let mut request = json_request(
        Method::POST,
        CATCHER_PATH,
        None,
        &json!({"id": id, "result": result}),
    );
    request
        .headers_mut()
        .insert(SIGNATURE_HEADER, signature.parse().unwrap());
    request
}

async fn status_of(app: &TestApp, operation_id: Uuid) -> OperationStatus {
    app.store
        .transactions()
        .await
        .into_iter()
        .find(|t| t.operation_id == operation_id)
        .map(|t| t.operation_status)
        .unwrap()
}

#[tokio::test]
async fn test_approval_settles_and_notifies_once() {
    let app = TestApp::spawn().await;
    let developer = MockServer::start().await;
    let operation_id =
        pending_operation(&app, Some(format!("{}/paid", developer.uri()))).await;

    Mock::given(method("GET"))
        .and(path("/paid"))
        .and(query_param("operation_id", operation_id.to_string().as_str()))
        .and(query_param("payment_id", operation_id.to_string().as_str()))
        .and(query_param("success", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&developer)
        .await;

    let id = operation_id.to_string();
    let (status, body) = app
        .send(signed_callback(
            &id,
            json!({"success": true, "transactionId": "0xabc"}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "message": format!("Operation {} validated", id)})
    );

    let row = app.store.transactions().await.remove(0);
    assert_eq!(row.operation_status, OperationStatus::Approved);
    assert_eq!(row.blockchain_ref.as_deref(), Some("0xabc"));
    assert_eq!(row.payload().webhook_sent, Some(true));

    // A replay finds nothing to settle and sends no second webhook
    let (status, body) = app
        .send(signed_callback(&id, json!({"success": true})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(status_of(&app, operation_id).await, OperationStatus::Approved);
}

#[tokio::test]
async fn test_decline_aborts_operation() {
    let app = TestApp::spawn().await;
    let operation_id = pending_operation(&app, None).await;
    let id = operation_id.to_string();

    let (status, body) = app
        .send(signed_callback(
            &id,
            json!({"success": false, "error": "INSUFFICIENT_FUNDS"}),
        ))
        .await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(
        body,
        json!({"success": false, "message": format!("Operation {} aborted", id)})
    );
    assert_eq!(status_of(&app, operation_id).await, OperationStatus::Declined);
}

#[tokio::test]
async fn test_unreachable_webhook_still_approves() {
    let app = TestApp::spawn().await;
    let developer = MockServer::start().await;
    let operation_id =
        pending_operation(&app, Some(format!("{}/paid", developer.uri()))).await;

    Mock::given(method("GET"))
        .and(path("/paid"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&developer)
        .await;

    let (status, _) = app
        .send(signed_callback(
            &operation_id.to_string(),
            json!({"success": true}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    let row = app.store.transactions().await.remove(0);
    assert_eq!(row.operation_status, OperationStatus::Approved);
    assert_eq!(row.payload().webhook_sent, None);
}

#[tokio::test]
async fn test_bad_signature_changes_nothing() {
    let app = TestApp::spawn().await;
    let operation_id = pending_operation(&app, None).await;

    let mut request = json_request(
        Method::POST,
        CATCHER_PATH,
        None,
        &json!({"id": operation_id, "result": {"success": true}}),
    );
    request
        .headers_mut()
        .insert(SIGNATURE_HEADER, "deadbeef".parse().unwrap());

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(
        status_of(&app, operation_id).await,
        OperationStatus::DataApiPending
    );
}

#[tokio::test]
async fn test_signature_is_bound_to_the_route() {
    let app = TestApp::spawn().await;
    let operation_id = pending_operation(&app, None).await;
    let id = operation_id.to_string();

    // Signed for the partners path, delivered on the api path
    let signature = generate_request_signature(SIGNATURE_SECRET, "POST", CATCHER_PATH, &id);
    let mut request = json_request(
        Method::POST,
        "/api/internal/send_money_catcher",
        None,
        &json!({"id": id, "result": {"success": true}}),
    );
    request
        .headers_mut()
        .insert(SIGNATURE_HEADER, signature.parse().unwrap());

    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_result_is_rejected() {
    let app = TestApp::spawn().await;
    let operation_id = pending_operation(&app, None).await;

    let (status, _) = app
        .send(signed_callback(
            &operation_id.to_string(),
            json!({"success": "yes"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(signed_callback("not-a-uuid", json!({"success": true})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(
        status_of(&app, operation_id).await,
        OperationStatus::DataApiPending
    );
}

#[tokio::test]
async fn test_unknown_operation_is_not_found() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .send(signed_callback(
            &Uuid::new_v4().to_string(),
            json!({"success": true}),
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["message"],
        "Transaction with this operation_id does not exist."
    );
}
