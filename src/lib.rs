pub mod analyzers;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod exit;
pub mod jsonpath;
pub mod k8s;
pub mod loader;
pub mod scan;
pub mod search;
pub mod ui;
