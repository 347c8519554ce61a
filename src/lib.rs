pub mod alerts;
pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod replay;
pub mod scanner;
pub mod sources;
#[cfg(test)]
pub mod test_helpers;
