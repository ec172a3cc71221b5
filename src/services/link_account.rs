//! Two-step OTP linking of a phone number to an internal account

use crate::backend::BackendClient;
use crate::database::repository::LinkedAccountRepository;
use crate::error::AppResult;
use crate::logging::mask_phone;
use crate::models::{Application, LinkedAccount};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum InitiateOutcome {
    /// The phone, or the account behind it, is already actively linked
    AlreadyLinked,
    /// OTP sent
    Started {
        status_code: u16,
        session_id: Option<String>,
        name: Option<String>,
        phone_number: Option<String>,
        message: Option<String>,
    },
    Failed {
        status_code: u16,
    },
}

#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Linked {
        status_code: u16,
        account: LinkedAccount,
    },
    /// Wrong or expired code; status and message come from upstream
    Rejected {
        status_code: u16,
        message: Option<String>,
    },
}

pub struct LinkAccountService {
    linked_accounts: Arc<dyn LinkedAccountRepository>,
    backend: BackendClient,
}

impl LinkAccountService {
    pub fn new(linked_accounts: Arc<dyn LinkedAccountRepository>, backend: BackendClient) -> Self {
        Self {
            linked_accounts,
            backend,
        }
    }

    /// Start an OTP session. Nothing is written locally.
    pub async fn initiate(
        &self,
        application: &Application,
        phone_number: &str,
    ) -> AppResult<InitiateOutcome> {
        let merchant_id = application.merchant_id;

        if self
            .linked_accounts
            .find_active_by_phone(phone_number, merchant_id)
            .await?
            .is_some()
        {
            info!(phone = %mask_phone(phone_number), merchant_id, "phone already linked");
            return Ok(InitiateOutcome::AlreadyLinked);
        }

        let upstream = match self
            .backend
            .initiate_link_account(phone_number, merchant_id)
            .await
        {
            Ok(upstream) => upstream,
            Err(failure) => {
                warn!(
                    phone = %mask_phone(phone_number),
                    merchant_id,
                    status_code = failure.status_code,
                    "link initiation refused upstream"
                );
                return Ok(InitiateOutcome::Failed {
                    status_code: failure.status_code,
                });
            }
        };

        let initiation = upstream.data;
        if let Some(tracking_id) = initiation.body.tracking_id {
            if self
                .linked_accounts
                .find_active_by_account(tracking_id, merchant_id)
                .await?
                .is_some()
            {
                info!(merchant_id, "account already linked under another phone");
                return Ok(InitiateOutcome::AlreadyLinked);
            }
        }

        Ok(InitiateOutcome::Started {
            status_code: upstream.status_code,
            session_id: initiation.body.session_id,
            name: initiation.body.name,
            phone_number: initiation.body.phone_number,
            message: initiation.message,
        })
    }

    /// Check the OTP and record the link, reactivating a previous one for the
    /// same phone and account.
    pub async fn confirm(
        &self,
        application: &Application,
        phone_number: &str,
        session_id: Uuid,
        otp: &str,
    ) -> AppResult<ConfirmOutcome> {
        let merchant_id = application.merchant_id;

        let upstream = match self
            .backend
            .confirm_link_account(phone_number, session_id, otp, merchant_id)
            .await
        {
            Ok(upstream) => upstream,
            Err(failure) => {
                warn!(
                    phone = %mask_phone(phone_number),
                    merchant_id,
                    status_code = failure.status_code,
                    "link confirmation refused upstream"
                );
                return Ok(ConfirmOutcome::Rejected {
                    status_code: failure.status_code,
                    message: failure.message,
                });
            }
        };

        let outcome = self
            .linked_accounts
            .link(
                phone_number,
                upstream.data.tracking_id,
                merchant_id,
                Some(application.id),
            )
            .await?;

        info!(
            phone = %mask_phone(phone_number),
            merchant_id,
            partner_tracking_id = %outcome.account.partner_tracking_id,
            created = outcome.created,
            reactivated = outcome.reactivated,
            "account linked"
        );

        Ok(ConfirmOutcome::Linked {
            status_code: upstream.status_code,
            account: outcome.account,
        })
    }
}
