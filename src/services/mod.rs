//! Business flows behind the HTTP handlers

pub mod history;
pub mod ledger;
pub mod link_account;
pub mod notifier;
pub mod sandbox;

pub use history::HistoryService;
pub use ledger::PaymentLedger;
pub use link_account::LinkAccountService;
pub use notifier::WebhookNotifier;
