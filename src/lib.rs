pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod failures;
pub mod fetch;
pub mod layout;
pub mod output;
pub mod retry;
pub mod scheduler;
