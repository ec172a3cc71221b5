//! Canned POS answers served outside production for reserved developer
//! tracking ids, so integrators can exercise every payment method.

use serde_json::{json, Value};

pub const WALLET_TRACKING_ID: &str = "040b4cb8-92b8-4824-b59f-de1fbbb8c37w";
pub const CARD_TRACKING_ID: &str = "040b4cb8-92b8-4824-b59f-de1fbbb8c37c";
pub const CHECK_TRACKING_ID: &str = "040b4cb8-92b8-4824-b59f-de1fbbb8c37d";
pub const NFC_TRACKING_ID: &str = "040b4cb8-92b8-4824-b59f-de1fbbb8c37e";

fn transaction(
    developer_tracking_id: &str,
    flouci_transaction_id: &str,
    payment_method: &str,
    payment_details: Value,
    amount_in_millimes: i64,
) -> Value {
    json!({
        "success": true,
        "transactions": [{
            "developer_tracking_id": developer_tracking_id,
            "flouci_transaction_id": flouci_transaction_id,
            "payment_status": "PS",
            "payment_method": payment_method,
            "payment_details": payment_details,
            "amount_in_millimes": amount_in_millimes,
            "currency": "TND",
        }],
        "status_code": 200,
    })
}

/// Status fixture for a reserved tracking id
pub fn pos_status(developer_tracking_id: &str) -> Option<Value> {
    let fixture = match developer_tracking_id {
        WALLET_TRACKING_ID => transaction(
            developer_tracking_id,
            "479448021765032989835915737944",
            "wallet",
            json!({"wallet_id": "1024010000000001146", "auth_code": "A222BA"}),
            135_000,
        ),
        CARD_TRACKING_ID => transaction(
            developer_tracking_id,
            "479448021765032989835915737940",
            "card",
            json!({"pan": 12345, "expiration": "202415", "auth_code": "121204"}),
            125_000,
        ),
        CHECK_TRACKING_ID => transaction(
            developer_tracking_id,
            "479448021765032989835915737942",
            "check",
            json!({"check_number": 1002345, "bank_code": "24"}),
            145_000,
        ),
        NFC_TRACKING_ID => transaction(
            developer_tracking_id,
            "479448021765032989835915737947",
            "nfc",
            json!({
                "transaction_number": "3f7272ad-fabd-4765-821c-7dc896710d18",
                "tvr": "0000008001",
                "acquirer_bank": "RAJB",
                "operation_type": "PAYMENT",
                "rrn": "000240241857",
                "kernel_id": "02",
                "finish_date": "2024-04-16 18:15:56.296286347",
                "cryptogram_information_data": "80",
                "created_date": "2024-04-16 21:17:08 GMT+03:00",
                "application_id": "A0000000041010",
                "stan": "000728",
                "cvm": "010002",
                "auth_code": "121204",
                "tsn": "704923",
                "application_cryptogram": "14D29EC3B9528093",
                "status": "Approved",
                "credit_number_length": 16,
                "credit_number": "0345",
                "amount": "1.010",
                "pan": "44050586",
                "scheme": "MC",
            }),
            245_000,
        ),
        _ => return None,
    };

    Some(fixture)
}

/// Cancel fixture: HTTP status plus body
pub fn pos_cancel(developer_tracking_id: &str) -> Option<(u16, Value)> {
    match developer_tracking_id {
        WALLET_TRACKING_ID => Some((
            200,
            json!({
                "success": true,
                "message": "Remboursement initié avec succès",
                "status_code": 200,
            }),
        )),
        CARD_TRACKING_ID => Some((
            409,
            json!({
                "success": false,
                "message": "Le remboursement n'est pas possible pour cette transaction",
                "status_code": 409,
            }),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_fixtures_cover_every_method() {
        for (id, method, amount) in [
            (WALLET_TRACKING_ID, "wallet", 135_000),
            (CARD_TRACKING_ID, "card", 125_000),
            (CHECK_TRACKING_ID, "check", 145_000),
            (NFC_TRACKING_ID, "nfc", 245_000),
        ] {
            let fixture = pos_status(id).unwrap();
            let tx = &fixture["transactions"][0];
            assert_eq!(tx["payment_method"], method);
            assert_eq!(tx["amount_in_millimes"], amount);
            assert_eq!(tx["developer_tracking_id"], id);
        }
        assert!(pos_status("unknown").is_none());
    }

    #[test]
    fn test_cancel_fixtures() {
        assert_eq!(pos_cancel(WALLET_TRACKING_ID).unwrap().0, 200);
        assert_eq!(pos_cancel(CARD_TRACKING_ID).unwrap().0, 409);
        assert!(pos_cancel(NFC_TRACKING_ID).is_none());
    }
}
