pub mod aggregator;
pub mod app;
pub mod aria;
pub mod config;
pub mod deposition;
pub mod domain;
pub mod error;
pub mod output;
pub mod smartem;
pub mod store;
