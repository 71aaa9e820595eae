pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod ledger;
pub mod output;
pub mod progress;
pub mod remote;
pub mod store;
