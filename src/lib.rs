pub mod commons;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod sanitize;
pub mod store;
pub mod trim;
