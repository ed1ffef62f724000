pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod persistence;
pub mod pricing;
pub mod reconciler;
pub mod store;
pub mod types;
