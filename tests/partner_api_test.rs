//! Partner endpoints: account linking, lookups and payment initiation

mod common;

use common::{bearer, get_request, json_request, TestApp};
use flouci_developers::models::OperationStatus;
use http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_link_account_flow() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let auth = bearer(&application);
    let session_id = Uuid::new_v4();
    let account_tracking_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/api/partners/initiate_link_account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "OTP sent",
            "body": {
                "session_id": session_id,
                "name": "Amine",
                "phone_number": "22123456"
            }
        })))
        .expect(1)
        .mount(&app.backend)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/partners/confirm_link_account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "tracking_id": account_tracking_id
        })))
        .expect(1)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/accounts/initiate_link_account",
            Some(&auth),
            &json!({"phone_number": "22123456"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["session_id"], session_id.to_string());
    assert_eq!(body["name"], "Amine");

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/accounts/confirm_link_account",
            Some(&auth),
            &json!({
                "phone_number": "22123456",
                "session_id": session_id,
                "otp": "123456"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let links = app.store.linked_accounts().await;
    assert_eq!(links.len(), 1);
    assert!(links[0].is_active);
    assert_eq!(links[0].account_tracking_id, account_tracking_id);
    assert_eq!(body["tracking_id"], links[0].partner_tracking_id.to_string());

    // Already linked: answered locally, the upstream mock stays at one call
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/accounts/initiate_link_account",
            Some(&auth),
            &json!({"phone_number": "22123456"}),
        ))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"success": false, "message": "Account already linked."}));
}

#[tokio::test]
async fn test_confirm_link_rejected_upstream() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    Mock::given(method("POST"))
        .and(path("/api/partners/confirm_link_account"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({
            "success": false,
            "message": "Wrong OTP"
        })))
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/accounts/confirm_link_account",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "session_id": Uuid::new_v4(),
                "otp": "000000"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body, json!({"success": false, "message": "Wrong OTP"}));
    assert!(app.store.linked_accounts().await.is_empty());
}

#[tokio::test]
async fn test_partner_routes_require_partner_access() {
    let app = TestApp::spawn().await;
    let application = app.application(false, false).await;
    let user = app.linked_user(&application, "22123456").await;

    Mock::given(method("POST"))
        .and(path("/api/partners/send_money"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/initiate_payment",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "tracking_id": user.partner_tracking_id,
                "amount_in_millimes": 5000,
                "product": "005"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert!(app.store.transactions().await.is_empty());
}

#[tokio::test]
async fn test_missing_bearer_is_rejected() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/accounts/is_flouci",
            None,
            &json!({"phone_number": "22123456"}),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_initiate_payment_records_operation() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let user = app.linked_user(&application, "22123456").await;

    Mock::given(method("POST"))
        .and(path("/api/partners/send_money"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": "PENDING"
        })))
        .expect(1)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/initiate_payment",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "tracking_id": user.partner_tracking_id,
                "amount_in_millimes": 5000,
                "product": "005",
                "webhook": "https://shop.example.com/paid"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "PENDING");

    let rows = app.store.transactions().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(body["operation_id"], rows[0].operation_id.to_string());
    assert_eq!(rows[0].operation_status, OperationStatus::DataApiPending);
    assert_eq!(rows[0].amount_in_millimes, 5000);
    assert_eq!(rows[0].sender_id, Some(user.partner_tracking_id));
}

#[tokio::test]
async fn test_initiate_payment_declined_upstream() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let user = app.linked_user(&application, "22123456").await;

    Mock::given(method("POST"))
        .and(path("/api/partners/send_money"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({
            "success": false,
            "message": "Insufficient balance"
        })))
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/v1/transactions/initiate_payment",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "tracking_id": user.partner_tracking_id,
                "amount_in_millimes": 5000,
                "product": "005"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Insufficient balance");
    assert!(body["operation_id"].is_string());

    let rows = app.store.transactions().await;
    assert_eq!(rows[0].operation_status, OperationStatus::Declined);
}

#[tokio::test]
async fn test_v1_initiate_payment_hides_hash() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let user = app.linked_user(&application, "22123456").await;

    Mock::given(method("POST"))
        .and(path("/api/partners/send_money"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "hash": "a1b2c3"
        })))
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/v1/transactions/initiate_payment",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "tracking_id": user.partner_tracking_id,
                "amount_in_millimes": 5000,
                "product": "005"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("hash").is_none());
    assert!(body["operation_id"].is_string());
}

#[tokio::test]
async fn test_initiate_payment_below_minimum() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let user = app.linked_user(&application, "22123456").await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/initiate_payment",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "tracking_id": user.partner_tracking_id,
                "amount_in_millimes": 50,
                "product": "005"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(app.store.transactions().await.is_empty());
}

#[tokio::test]
async fn test_unknown_partner_user_is_rejected() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let user = app.linked_user(&application, "22123456").await;

    let (status, _) = app
        .send(get_request(
            &format!(
                "/partners/transactions/balance?phone_number=22999999&tracking_id={}",
                user.partner_tracking_id
            ),
            Some(&bearer(&application)),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_balance_passes_upstream_through() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let user = app.linked_user(&application, "22123456").await;

    Mock::given(method("GET"))
        .and(path("/api/partners/balance"))
        .and(query_param(
            "tracking_id",
            user.account_tracking_id.to_string().as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balance": 12000})))
        .expect(1)
        .mount(&app.backend)
        .await;

    let (status, body) = app
        .send(get_request(
            &format!(
                "/partners/v1/transactions/balance?phone_number=22123456&tracking_id={}",
                user.partner_tracking_id
            ),
            Some(&bearer(&application)),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"balance": 12000, "success": true, "status_code": 200})
    );
}

#[tokio::test]
async fn test_authenticate_unlinked_user() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/partners/accounts/authenticate",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "tracking_id": Uuid::new_v4()
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_history_lists_pending_operation() {
    let app = TestApp::spawn().await;
    let application = app.application(true, false).await;
    let user = app.linked_user(&application, "22123456").await;

    Mock::given(method("POST"))
        .and(path("/api/partners/send_money"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&app.backend)
        .await;

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/partners/transactions/initiate_payment",
            Some(&bearer(&application)),
            &json!({
                "phone_number": "22123456",
                "tracking_id": user.partner_tracking_id,
                "amount_in_millimes": 2500,
                "product": "005"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let operation_id = app.store.transactions().await[0].operation_id;

    let (status, body) = app
        .send(get_request(
            &format!(
                "/partners/transactions/history?phone_number=22123456&tracking_id={}&operation_status=DATA_API_PENDING",
                user.partner_tracking_id
            ),
            Some(&bearer(&application)),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["operation_id"], operation_id.to_string());
    assert!(body["next"].is_null());

    // Default status filter is APPROVED
    let (_, body) = app
        .send(get_request(
            &format!(
                "/partners/transactions/history?phone_number=22123456&tracking_id={}",
                user.partner_tracking_id
            ),
            Some(&bearer(&application)),
        ))
        .await;
    assert_eq!(body["count"], 0);
}
